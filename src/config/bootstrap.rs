//! Initial configuration: record application/tenant identifiers before any
//! login has happened.

use super::document::AccountPatch;
use super::env::Overrides;
use super::store::ConfigStore;
use crate::{Error, Result};

/// Persist identifiers for the default account.
///
/// Values come from the active account, overlaid by `flags`, with gaps
/// filled from `env`. Both identifiers must be known afterwards.
pub async fn bootstrap(
    store: &dyn ConfigStore,
    flags: &Overrides,
    env: &Overrides,
) -> Result<AccountPatch> {
    let document = store.read().await;
    let mut patch = document
        .active()
        .map(|(_, record)| {
            let mut current = AccountPatch::from(record.clone());
            // Tokens are not part of the bootstrap write
            current.token_type = None;
            current.access_token = None;
            current.refresh_token = None;
            current.expires_on = None;
            current
        })
        .unwrap_or_default();

    let flags = flags.clone().cleaned();
    let env = env.clone().cleaned();
    let overlay = |slot: &mut Option<String>, flag: Option<String>, env: Option<String>| {
        if flag.is_some() {
            *slot = flag;
        } else if slot.is_none() {
            *slot = env;
        }
    };
    overlay(&mut patch.client_id, flags.client_id, env.client_id);
    overlay(&mut patch.tenant_id, flags.tenant_id, env.tenant_id);
    overlay(&mut patch.client_secret, flags.client_secret, env.client_secret);
    overlay(&mut patch.subscription_id, flags.subscription_id, env.subscription_id);
    overlay(&mut patch.authority_host, flags.authority_host, env.authority_host);

    if patch.client_id.is_none() {
        return Err(Error::MissingClientConfig {
            flow: "Init",
            field: "clientId",
        });
    }
    if patch.tenant_id.is_none() {
        return Err(Error::MissingClientConfig {
            flow: "Init",
            field: "tenantId",
        });
    }

    store.write(patch.clone()).await?;
    tracing::info!(
        client_id = patch.client_id.as_deref().unwrap_or_default(),
        tenant_id = patch.tenant_id.as_deref().unwrap_or_default(),
        "Configuration initialized"
    );
    Ok(patch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfigStore;

    #[tokio::test]
    async fn test_bootstrap_from_flags() {
        let store = MemoryConfigStore::new();
        let flags = Overrides::default().client_id("c").tenant_id("t");

        let patch = bootstrap(&store, &flags, &Overrides::default()).await.unwrap();
        assert_eq!(patch.client_id.as_deref(), Some("c"));

        let document = store.read().await;
        let (_, record) = document.active().unwrap();
        assert_eq!(record.client_id, "c");
        assert_eq!(record.tenant_id, "t");
        assert_eq!(record.token_type, None);
    }

    #[tokio::test]
    async fn test_env_fills_gaps_only() {
        let store = MemoryConfigStore::with_contents(
            r#"{"accounts":{"a":{"clientId":"file-c","tenantId":"file-t"}},"defaultAccount":"a"}"#,
        );
        let env = Overrides::default()
            .client_id("env-c")
            .subscription_id("env-sub");

        let patch = bootstrap(&store, &Overrides::default(), &env).await.unwrap();
        assert_eq!(patch.client_id.as_deref(), Some("file-c"));
        assert_eq!(patch.subscription_id.as_deref(), Some("env-sub"));
    }

    #[tokio::test]
    async fn test_missing_tenant_fails_without_writing() {
        let store = MemoryConfigStore::new();
        let flags = Overrides::default().client_id("c");

        let err = bootstrap(&store, &flags, &Overrides::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::MissingClientConfig {
                field: "tenantId",
                ..
            }
        ));
        assert_eq!(store.contents().await, None);
    }

    #[tokio::test]
    async fn test_bootstrap_keeps_existing_tokens() {
        let store = MemoryConfigStore::with_contents(
            r#"{"accounts":{"a":{"clientId":"c","tenantId":"t","tokenType":"device_code","accessToken":"at"}},"defaultAccount":"a"}"#,
        );
        let flags = Overrides::default().subscription_id("s");
        bootstrap(&store, &flags, &Overrides::default()).await.unwrap();

        let document = store.read().await;
        let (_, record) = document.active().unwrap();
        assert_eq!(record.access_token.as_deref(), Some("at"));
        assert_eq!(record.subscription_id.as_deref(), Some("s"));
    }
}
