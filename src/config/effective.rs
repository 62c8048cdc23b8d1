//! Effective configuration: the per-field merge of the precedence layers.
//!
//! Layers, lowest to highest priority:
//! 1. The active account record
//! 2. Process environment (`JAYZ_*`)
//! 3. Per-invocation overrides (command-line flags)
//!
//! A higher layer wins a field only when its value is present and non-empty.

use chrono::{DateTime, Utc};

use super::document::{AccountRecord, TokenType};
use super::env::{Overrides, non_empty};

/// Flat settings resolved for one invocation. Never persisted as such.
#[derive(Clone, Default, PartialEq)]
pub struct EffectiveConfig {
    /// Name of the account the lowest layer came from.
    pub account_name: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub tenant_id: Option<String>,
    pub subscription_id: Option<String>,
    pub authority_host: Option<String>,
    pub token_type: Option<TokenType>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_on: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for EffectiveConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectiveConfig")
            .field("account_name", &self.account_name)
            .field("client_id", &self.client_id)
            .field("has_client_secret", &self.client_secret.is_some())
            .field("tenant_id", &self.tenant_id)
            .field("subscription_id", &self.subscription_id)
            .field("authority_host", &self.authority_host)
            .field("token_type", &self.token_type)
            .field("has_access_token", &self.access_token.is_some())
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

impl EffectiveConfig {
    /// Merge the account layer with override layers given lowest first.
    pub fn resolve(account: Option<(&str, &AccountRecord)>, layers: &[&Overrides]) -> Self {
        let mut merged = account
            .map(|(name, record)| Self::from_account(name, record))
            .unwrap_or_default();
        for layer in layers {
            merged.overlay(layer);
        }
        merged
    }

    fn from_account(name: &str, record: &AccountRecord) -> Self {
        Self {
            account_name: Some(name.to_string()),
            client_id: non_empty(Some(record.client_id.clone())),
            client_secret: non_empty(record.client_secret.clone()),
            tenant_id: non_empty(Some(record.tenant_id.clone())),
            subscription_id: non_empty(record.subscription_id.clone()),
            authority_host: non_empty(record.authority_host.clone()),
            token_type: record.token_type,
            access_token: non_empty(record.access_token.clone()),
            refresh_token: non_empty(record.refresh_token.clone()),
            expires_on: record.expires_on,
        }
    }

    fn overlay(&mut self, layer: &Overrides) {
        let layer = layer.clone().cleaned();
        let pick = |slot: &mut Option<String>, value: Option<String>| {
            if value.is_some() {
                *slot = value;
            }
        };
        pick(&mut self.client_id, layer.client_id);
        pick(&mut self.client_secret, layer.client_secret);
        pick(&mut self.tenant_id, layer.tenant_id);
        pick(&mut self.subscription_id, layer.subscription_id);
        pick(&mut self.authority_host, layer.authority_host);
    }

    /// Both identifiers needed to address the identity provider, if present.
    pub fn client_and_tenant(&self) -> Option<(&str, &str)> {
        Some((self.client_id.as_deref()?, self.tenant_id.as_deref()?))
    }
}
