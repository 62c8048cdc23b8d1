//! Named account management over a [`ConfigStore`].

use std::sync::Arc;

use crate::config::{
    AccountPatch, AccountRecord, ConfigStore, LEGACY_ACCOUNT_NAME, MemoryConfigStore, TokenType,
};
use crate::{Error, Result};

/// Synthesized account name: `{spn|user}-{tenant[..8]}-{client[..6]}`.
pub fn account_name_for(record: &AccountRecord) -> String {
    let prefix = match record.token_type {
        Some(TokenType::ClientSecret) => "spn",
        _ => "user",
    };
    let tenant: String = record.tenant_id.chars().take(8).collect();
    let client: String = record.client_id.chars().take(6).collect();
    format!("{}-{}-{}", prefix, tenant, client)
}

fn conflicts(existing: &AccountRecord, incoming: &AccountRecord) -> bool {
    let differs = |stored: &str, new: &str| !stored.is_empty() && !new.is_empty() && stored != new;
    differs(&existing.client_id, &incoming.client_id) || differs(&existing.tenant_id, &incoming.tenant_id)
}

/// `record` only carries settings written by `init` for the same identifiers as `login`.
fn is_placeholder(record: &AccountRecord, login: &AccountRecord) -> bool {
    record.token_type.is_none()
        && record.access_token.is_none()
        && record.refresh_token.is_none()
        && record.client_id == login.client_id
        && record.tenant_id == login.tenant_id
}

pub struct AccountManager {
    store: Arc<dyn ConfigStore>,
}

impl AccountManager {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryConfigStore::new()))
    }

    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }

    /// Account names in lexicographic order.
    pub async fn list(&self) -> Vec<String> {
        self.store.read().await.accounts.into_keys().collect()
    }

    pub async fn get(&self, name: &str) -> Option<AccountRecord> {
        self.store.read().await.accounts.remove(name)
    }

    /// Name and record of the default account.
    pub async fn active(&self) -> Option<(String, AccountRecord)> {
        let mut document = self.store.read().await;
        let name = document.default_account.take()?;
        let record = document.accounts.remove(&name)?;
        Some((name, record))
    }

    pub async fn default_name(&self) -> Option<String> {
        self.store.read().await.default_account
    }

    /// Insert `record` or merge it into the existing entry.
    ///
    /// The account becomes the default when none is set. Merging a record
    /// for a different application or tenant fails with
    /// [`Error::AccountConflict`].
    pub async fn save(&self, name: &str, record: AccountRecord) -> Result<AccountRecord> {
        self.store_record(name, record, false).await
    }

    /// Save the result of a login under `name`.
    ///
    /// Settings merge like [`save`](Self::save), but the token fields are
    /// replaced outright: whatever the new flow did not produce is cleared.
    /// A token-less `default` entry left behind by `init` for the same
    /// application and tenant is folded into `name`.
    pub async fn save_login(&self, name: &str, record: AccountRecord) -> Result<AccountRecord> {
        self.store_record(name, record, true).await
    }

    async fn store_record(&self, name: &str, record: AccountRecord, login: bool) -> Result<AccountRecord> {
        let mut document = self.store.read().await;

        let saved = match document.accounts.get_mut(name) {
            Some(existing) => {
                if conflicts(existing, &record) {
                    return Err(Error::AccountConflict {
                        name: name.to_string(),
                    });
                }
                existing.apply(&AccountPatch::from(record.clone()));
                if login {
                    existing.token_type = record.token_type;
                    existing.access_token = record.access_token;
                    existing.refresh_token = record.refresh_token;
                    existing.expires_on = record.expires_on;
                }
                existing.clone()
            }
            None => {
                document.accounts.insert(name.to_string(), record.clone());
                record
            }
        };

        if login && name != LEGACY_ACCOUNT_NAME {
            let placeholder = document
                .accounts
                .get(LEGACY_ACCOUNT_NAME)
                .is_some_and(|bootstrap| is_placeholder(bootstrap, &saved));
            if placeholder {
                document.accounts.remove(LEGACY_ACCOUNT_NAME);
                if document.default_account.as_deref() == Some(LEGACY_ACCOUNT_NAME) {
                    document.default_account = Some(name.to_string());
                }
                tracing::debug!(account = name, "Folded initialized settings into account");
            }
        }

        if document.default_account.is_none() {
            document.default_account = Some(name.to_string());
        }

        self.store.save_document(&document).await?;
        tracing::debug!(account = name, "Account saved");
        Ok(saved)
    }

    /// Delete an account, promoting the first remaining one if it was the default.
    pub async fn remove(&self, name: &str) -> Result<()> {
        let mut document = self.store.read().await;
        if document.accounts.remove(name).is_none() {
            return Err(Error::UnknownAccount {
                name: name.to_string(),
            });
        }

        if document.default_account.as_deref() == Some(name) {
            document.default_account = document.accounts.keys().next().cloned();
            tracing::info!(
                removed = name,
                promoted = document.default_account.as_deref(),
                "Default account removed"
            );
        }

        self.store.save_document(&document).await?;
        Ok(())
    }

    pub async fn set_default(&self, name: &str) -> Result<()> {
        let mut document = self.store.read().await;
        if !document.accounts.contains_key(name) {
            return Err(Error::UnknownAccount {
                name: name.to_string(),
            });
        }
        document.default_account = Some(name.to_string());
        self.store.save_document(&document).await?;
        Ok(())
    }

    /// Merge `patch` into the default account.
    pub async fn update_active(&self, patch: AccountPatch) -> Result<AccountRecord> {
        let mut document = self.store.read().await;
        let Some(record) = document.active_mut() else {
            return Err(Error::NoActiveAccount);
        };
        record.apply(&patch);
        let updated = record.clone();
        self.store.save_document(&document).await?;
        Ok(updated)
    }
}

impl Default for AccountManager {
    fn default() -> Self {
        Self::in_memory()
    }
}
