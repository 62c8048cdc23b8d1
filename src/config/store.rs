//! Configuration store trait.

use super::document::{AccountPatch, ConfigDocument};
use super::effective::EffectiveConfig;
use super::env::Overrides;
use super::ConfigResult;

/// Persistence for the configuration document.
///
/// Implementors only move raw JSON text in and out; parsing, legacy
/// migration and patch semantics are shared by the provided methods.
#[async_trait::async_trait]
pub trait ConfigStore: Send + Sync {
    /// Store name for logging
    fn name(&self) -> &str;

    /// Raw persisted contents, `None` when nothing has been written yet.
    async fn load(&self) -> ConfigResult<Option<String>>;

    /// Replace the persisted contents in a single operation.
    async fn persist(&self, contents: &str) -> ConfigResult<()>;

    /// Load the document. A missing, unreadable or unparsable file reads as
    /// an empty document.
    async fn read(&self) -> ConfigDocument {
        let contents = match self.load().await {
            Ok(Some(contents)) => contents,
            Ok(None) => return ConfigDocument::default(),
            Err(e) => {
                tracing::warn!(store = self.name(), error = %e, "Config unreadable, using empty document");
                return ConfigDocument::default();
            }
        };

        match ConfigDocument::from_json(&contents) {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!(store = self.name(), error = %e, "Config unparsable, using empty document");
                ConfigDocument::default()
            }
        }
    }

    /// Persist a whole document.
    async fn save_document(&self, document: &ConfigDocument) -> ConfigResult<()> {
        let contents = document.to_json()?;
        self.persist(&contents).await
    }

    /// Merge `patch` into the default account, or into the document root
    /// when no account exists yet.
    async fn write(&self, patch: AccountPatch) -> ConfigResult<()> {
        let mut document = self.read().await;
        match document.active_mut() {
            Some(account) => account.apply(&patch),
            None => document.legacy.merge(patch),
        }
        self.save_document(&document).await
    }

    /// Effective settings with an explicit environment layer.
    async fn merge_layers(&self, env: &Overrides, flags: &Overrides) -> EffectiveConfig {
        let document = self.read().await;
        EffectiveConfig::resolve(document.active(), &[env, flags])
    }

    /// Effective settings using the process environment.
    async fn merge_effective(&self, flags: &Overrides) -> EffectiveConfig {
        self.merge_layers(&Overrides::from_env(), flags).await
    }
}
