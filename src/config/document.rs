//! Persisted configuration document and account records.
//!
//! The on-disk shape is a JSON object with an `accounts` map, an optional
//! `defaultAccount`, and (for files written before multi-account support)
//! bare top-level credential fields. Reading always yields the multi-account
//! shape; see [`ConfigDocument::migrate_legacy`].

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Account name given to credentials found at the document root.
pub const LEGACY_ACCOUNT_NAME: &str = "default";

/// How an account's tokens were obtained, which decides how they are renewed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenType {
    /// Authorization code + PKCE through the system browser.
    #[serde(rename = "browser_oauth")]
    BrowserOAuth,
    /// Device authorization grant completed out-of-band.
    #[serde(rename = "device_code")]
    DeviceCode,
    /// Client-credential grant with an application secret.
    #[serde(rename = "client_secret")]
    ClientSecret,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::BrowserOAuth => "browser_oauth",
            TokenType::DeviceCode => "device_code",
            TokenType::ClientSecret => "client_secret",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "browser_oauth" => Some(TokenType::BrowserOAuth),
            "device_code" => Some(TokenType::DeviceCode),
            "client_secret" => Some(TokenType::ClientSecret),
            _ => None,
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn lenient_token_type<'de, D>(deserializer: D) -> Result<Option<TokenType>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| {
        let parsed = TokenType::parse(&value);
        if parsed.is_none() {
            tracing::warn!(token_type = %value, "Ignoring unknown tokenType in config");
        }
        parsed
    }))
}

/// One identity the operator has logged in with.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRecord {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority_host: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_token_type"
    )]
    pub token_type: Option<TokenType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_on: Option<DateTime<Utc>>,
}

impl fmt::Debug for AccountRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountRecord")
            .field("client_id", &self.client_id)
            .field("tenant_id", &self.tenant_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[redacted]"))
            .field("subscription_id", &self.subscription_id)
            .field("authority_host", &self.authority_host)
            .field("token_type", &self.token_type)
            .field("access_token", &self.access_token.as_ref().map(|_| "[redacted]"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[redacted]"))
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

impl AccountRecord {
    pub fn new(client_id: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            tenant_id: tenant_id.into(),
            ..Default::default()
        }
    }

    /// Shallow field overwrite; fields present in `patch` win.
    pub fn apply(&mut self, patch: &AccountPatch) {
        if let Some(v) = &patch.client_id {
            self.client_id = v.clone();
        }
        if let Some(v) = &patch.tenant_id {
            self.tenant_id = v.clone();
        }
        overwrite(&mut self.client_secret, &patch.client_secret);
        overwrite(&mut self.subscription_id, &patch.subscription_id);
        overwrite(&mut self.authority_host, &patch.authority_host);
        if patch.token_type.is_some() {
            self.token_type = patch.token_type;
        }
        overwrite(&mut self.access_token, &patch.access_token);
        overwrite(&mut self.refresh_token, &patch.refresh_token);
        if patch.expires_on.is_some() {
            self.expires_on = patch.expires_on;
        }
    }

    /// View safe to print: secret masked, refresh token truncated, access token dropped.
    pub fn redacted(&self) -> serde_json::Value {
        let mut view = self.clone();
        view.access_token = None;
        if view.client_secret.is_some() {
            view.client_secret = Some("***".to_string());
        }
        if let Some(refresh) = &view.refresh_token {
            let head: String = refresh.chars().take(6).collect();
            view.refresh_token = Some(format!("{}…", head));
        }
        serde_json::to_value(view).unwrap_or(serde_json::Value::Null)
    }
}

fn overwrite(slot: &mut Option<String>, value: &Option<String>) {
    if let Some(v) = value {
        *slot = Some(v.clone());
    }
}

/// Partial account update. Every field is optional; absent fields are left alone.
///
/// Also doubles as the shape of legacy top-level credential fields.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority_host: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_token_type"
    )]
    pub token_type: Option<TokenType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_on: Option<DateTime<Utc>>,
}

impl fmt::Debug for AccountPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountPatch")
            .field("client_id", &self.client_id)
            .field("tenant_id", &self.tenant_id)
            .field("has_client_secret", &self.client_secret.is_some())
            .field("subscription_id", &self.subscription_id)
            .field("authority_host", &self.authority_host)
            .field("token_type", &self.token_type)
            .field("has_access_token", &self.access_token.is_some())
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

impl AccountPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn subscription(subscription_id: impl Into<String>) -> Self {
        Self {
            subscription_id: Some(subscription_id.into()),
            ..Default::default()
        }
    }

    /// Fold `other` into `self`; fields present in `other` win.
    pub fn merge(&mut self, other: AccountPatch) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() { self.$field = other.$field; })*
            };
        }
        take!(
            client_id,
            tenant_id,
            client_secret,
            subscription_id,
            authority_host,
            token_type,
            access_token,
            refresh_token,
            expires_on
        );
    }
}

impl From<AccountRecord> for AccountPatch {
    fn from(record: AccountRecord) -> Self {
        let non_empty = |s: String| if s.is_empty() { None } else { Some(s) };
        Self {
            client_id: non_empty(record.client_id),
            tenant_id: non_empty(record.tenant_id),
            client_secret: record.client_secret,
            subscription_id: record.subscription_id,
            authority_host: record.authority_host,
            token_type: record.token_type,
            access_token: record.access_token,
            refresh_token: record.refresh_token,
            expires_on: record.expires_on,
        }
    }
}

impl From<AccountPatch> for AccountRecord {
    fn from(patch: AccountPatch) -> Self {
        let mut record = AccountRecord::default();
        record.apply(&patch);
        record
    }
}

/// The sole persisted artifact.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigDocument {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub accounts: BTreeMap<String, AccountRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_account: Option<String>,
    /// Bare top-level credential fields (pre multi-account files and the
    /// bootstrap write before any account exists).
    #[serde(flatten)]
    pub legacy: AccountPatch,
}

impl ConfigDocument {
    /// Parse persisted JSON into the multi-account shape.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        let document: ConfigDocument = serde_json::from_str(text)?;
        Ok(document.migrate_legacy().normalized())
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        let mut text = serde_json::to_string_pretty(self)?;
        text.push('\n');
        Ok(text)
    }

    /// Turn bare top-level credentials into a single implicit account.
    ///
    /// Only applies when the document has no accounts yet; otherwise the
    /// root fields are left untouched.
    pub fn migrate_legacy(mut self) -> Self {
        if self.legacy.is_empty() || !self.accounts.is_empty() {
            return self;
        }
        let legacy = std::mem::take(&mut self.legacy);
        self.accounts
            .insert(LEGACY_ACCOUNT_NAME.to_string(), AccountRecord::from(legacy));
        self.default_account = Some(LEGACY_ACCOUNT_NAME.to_string());
        self
    }

    /// Restore the default-account invariant: a set default always names an
    /// existing account, and accounts never exist without a default.
    pub fn normalized(mut self) -> Self {
        let dangling = self
            .default_account
            .as_ref()
            .is_some_and(|name| !self.accounts.contains_key(name));
        if dangling || self.default_account.is_none() {
            self.default_account = self.accounts.keys().next().cloned();
        }
        self
    }

    pub fn active(&self) -> Option<(&str, &AccountRecord)> {
        let name = self.default_account.as_deref()?;
        self.accounts.get(name).map(|record| (name, record))
    }

    pub fn active_mut(&mut self) -> Option<&mut AccountRecord> {
        let name = self.default_account.as_deref()?;
        self.accounts.get_mut(name)
    }
}
