//! Login flows and token acquisition.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;

use super::authority::Authority;
use super::credential::AccessToken;
use super::interaction::{Interaction, SystemInteraction};
use super::loopback::LoopbackServer;
use super::pkce::PkcePair;
use super::token::{DeviceCodeResponse, DevicePoll, TokenClient, TokenResponse};
use crate::account::{AccountManager, account_name_for};
use crate::config::{AccountPatch, AccountRecord, ConfigStore, EffectiveConfig, Overrides, TokenType};
use crate::{Error, Result};

/// Fixed loopback port registered as the redirect URI.
pub const REDIRECT_PORT: u16 = 63265;
/// Device codes without an advertised lifetime are abandoned after this.
const DEFAULT_DEVICE_CODE_LIFETIME: Duration = Duration::from_secs(900);
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Where a successful login is saved.
#[derive(Debug, Clone)]
pub struct LoginOptions {
    /// Account name; synthesized from the identifiers when absent.
    pub account: Option<String>,
    /// Mark the account as the default after saving.
    pub make_default: bool,
}

impl Default for LoginOptions {
    fn default() -> Self {
        Self {
            account: None,
            make_default: true,
        }
    }
}

impl LoginOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            account: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn make_default(mut self, make_default: bool) -> Self {
        self.make_default = make_default;
        self
    }
}

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct LoggedIn {
    pub name: String,
    pub account: AccountRecord,
}

/// Builder for [`AuthEngine`].
pub struct AuthEngineBuilder {
    store: Arc<dyn ConfigStore>,
    env: Option<Overrides>,
    redirect_port: u16,
    callback_timeout: Option<Duration>,
    interaction: Option<Arc<dyn Interaction>>,
    http: Option<reqwest::Client>,
}

impl AuthEngineBuilder {
    fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self {
            store,
            env: None,
            redirect_port: REDIRECT_PORT,
            callback_timeout: None,
            interaction: None,
            http: None,
        }
    }

    /// Replace the process environment layer.
    pub fn env(mut self, env: Overrides) -> Self {
        self.env = Some(env);
        self
    }

    pub fn redirect_port(mut self, port: u16) -> Self {
        self.redirect_port = port;
        self
    }

    /// Bound the browser wait. Unbounded unless set.
    pub fn callback_timeout(mut self, timeout: Duration) -> Self {
        self.callback_timeout = Some(timeout);
        self
    }

    pub fn interaction(mut self, interaction: Arc<dyn Interaction>) -> Self {
        self.interaction = Some(interaction);
        self
    }

    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http = Some(client);
        self
    }

    pub fn build(self) -> Result<AuthEngine> {
        let http = match self.http {
            Some(client) => client,
            None => reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?,
        };

        Ok(AuthEngine {
            accounts: AccountManager::new(Arc::clone(&self.store)),
            store: self.store,
            env: self.env.unwrap_or_else(Overrides::from_env),
            redirect_port: self.redirect_port,
            callback_timeout: self.callback_timeout,
            interaction: self
                .interaction
                .unwrap_or_else(|| Arc::new(SystemInteraction)),
            tokens: TokenClient::new(http),
        })
    }
}

/// Runs the three login flows and hands out access tokens.
pub struct AuthEngine {
    store: Arc<dyn ConfigStore>,
    accounts: AccountManager,
    env: Overrides,
    redirect_port: u16,
    callback_timeout: Option<Duration>,
    interaction: Arc<dyn Interaction>,
    tokens: TokenClient,
}

impl std::fmt::Debug for AuthEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthEngine")
            .field("store", &self.store.name())
            .field("env", &self.env)
            .field("redirect_port", &self.redirect_port)
            .field("callback_timeout", &self.callback_timeout)
            .finish_non_exhaustive()
    }
}

fn require<'a>(value: &'a Option<String>, flow: &'static str, field: &'static str) -> Result<&'a str> {
    value
        .as_deref()
        .ok_or(Error::MissingClientConfig { flow, field })
}

impl AuthEngine {
    pub fn builder(store: Arc<dyn ConfigStore>) -> AuthEngineBuilder {
        AuthEngineBuilder::new(store)
    }

    pub fn accounts(&self) -> &AccountManager {
        &self.accounts
    }

    /// Settings for this invocation: active account, environment, then `flags`.
    pub async fn effective(&self, flags: &Overrides) -> EffectiveConfig {
        self.store.merge_layers(&self.env, flags).await
    }

    /// Authorization code + PKCE through the system browser.
    pub async fn login_with_browser(&self, flags: &Overrides, options: LoginOptions) -> Result<LoggedIn> {
        let cfg = self.effective(flags).await;
        let client_id = require(&cfg.client_id, "Browser", "clientId")?;
        let tenant_id = require(&cfg.tenant_id, "Browser", "tenantId")?;
        let authority = Authority::new(tenant_id, cfg.authority_host.as_deref());

        let server = LoopbackServer::bind(self.redirect_port).await?;
        let redirect_uri = server.redirect_uri();
        let pkce = PkcePair::generate();
        let url = authority
            .authorize_url(client_id, &redirect_uri, &pkce)
            .map_err(|e| Error::Config(format!("invalid authority host: {}", e)))?;

        self.interaction.show_message("Opening browser for login...");
        if let Err(e) = self.interaction.open_browser(url.as_str()) {
            tracing::warn!(error = %e, "Could not launch browser");
            self.interaction.show_url(url.as_str());
        }

        let code = match self.callback_timeout {
            Some(limit) => server.wait_timeout(limit).await?,
            None => server.wait().await?,
        };

        let response = self
            .tokens
            .exchange_code(
                &authority,
                client_id,
                cfg.client_secret.as_deref(),
                &code,
                &redirect_uri,
                &pkce.verifier,
            )
            .await?;

        let record = AccountRecord {
            client_secret: cfg.client_secret.clone(),
            token_type: Some(TokenType::BrowserOAuth),
            expires_on: response.expires_on(Utc::now()),
            refresh_token: response.refresh_token.filter(|t| !t.is_empty()),
            access_token: Some(response.access_token),
            ..Self::base_record(&cfg, client_id, tenant_id)
        };
        self.persist_login(record, options).await
    }

    /// Device authorization grant; the operator completes sign-in elsewhere.
    pub async fn login_with_device_code(&self, flags: &Overrides, options: LoginOptions) -> Result<LoggedIn> {
        let cfg = self.effective(flags).await;
        let client_id = require(&cfg.client_id, "Device code", "clientId")?;
        let tenant_id = require(&cfg.tenant_id, "Device code", "tenantId")?;
        let authority = Authority::new(tenant_id, cfg.authority_host.as_deref());

        let response = self.device_code_grant(&authority, client_id).await?;
        let record = AccountRecord {
            token_type: Some(TokenType::DeviceCode),
            expires_on: response.expires_on(Utc::now()),
            access_token: Some(response.access_token),
            ..Self::base_record(&cfg, client_id, tenant_id)
        };
        self.persist_login(record, options).await
    }

    /// Client-credential grant. The secret is kept for later re-acquisition.
    pub async fn login_with_client_secret(&self, flags: &Overrides, options: LoginOptions) -> Result<LoggedIn> {
        let cfg = self.effective(flags).await;
        let (client_id, client_secret, tenant_id) =
            match (&cfg.client_id, &cfg.client_secret, &cfg.tenant_id) {
                (None, _, _) => return Err(Error::MissingRequiredField { field: "clientId" }),
                (_, None, _) => return Err(Error::MissingRequiredField { field: "clientSecret" }),
                (_, _, None) => return Err(Error::MissingRequiredField { field: "tenantId" }),
                (Some(c), Some(s), Some(t)) => (c.as_str(), s.as_str(), t.as_str()),
            };
        let authority = Authority::new(tenant_id, cfg.authority_host.as_deref());

        let response = self
            .tokens
            .client_credentials(&authority, client_id, client_secret)
            .await?;
        let record = AccountRecord {
            client_secret: Some(client_secret.to_string()),
            token_type: Some(TokenType::ClientSecret),
            expires_on: response.expires_on(Utc::now()),
            access_token: Some(response.access_token),
            ..Self::base_record(&cfg, client_id, tenant_id)
        };
        self.persist_login(record, options).await
    }

    /// A valid token for the management API, renewing as the account's
    /// token type dictates.
    pub async fn get_access_token(&self, flags: &Overrides) -> Result<AccessToken> {
        let cfg = self.effective(flags).await;
        let Some((client_id, tenant_id)) = cfg.client_and_tenant() else {
            return Err(Error::NotLoggedIn);
        };
        let authority = Authority::new(tenant_id, cfg.authority_host.as_deref());

        tracing::debug!(
            account = cfg.account_name.as_deref(),
            token_type = cfg.token_type.map(|t| t.as_str()),
            "Acquiring access token"
        );

        match cfg.token_type {
            Some(TokenType::ClientSecret) => {
                let secret = cfg
                    .client_secret
                    .as_deref()
                    .ok_or(Error::MissingRequiredField {
                        field: "clientSecret",
                    })?;
                let response = self
                    .tokens
                    .client_credentials(&authority, client_id, secret)
                    .await?;
                let expires_on = response.expires_on(Utc::now());
                Ok(AccessToken::new(response.access_token, expires_on))
            }
            Some(TokenType::BrowserOAuth) => match cfg.refresh_token.as_deref() {
                Some(refresh_token) => {
                    self.refresh(&cfg, &authority, client_id, refresh_token)
                        .await
                }
                None => Err(Error::UnsupportedTokenState {
                    reason: Some("no refresh token stored"),
                }),
            },
            Some(TokenType::DeviceCode) => {
                let response = self.device_code_grant(&authority, client_id).await?;
                let expires_on = response.expires_on(Utc::now());
                self.store
                    .write(AccountPatch {
                        access_token: Some(response.access_token.clone()),
                        expires_on,
                        ..Default::default()
                    })
                    .await?;
                Ok(AccessToken::new(response.access_token, expires_on))
            }
            None => Err(Error::UnsupportedTokenState { reason: None }),
        }
    }

    async fn refresh(
        &self,
        cfg: &EffectiveConfig,
        authority: &Authority,
        client_id: &str,
        refresh_token: &str,
    ) -> Result<AccessToken> {
        let response = self
            .tokens
            .refresh(authority, client_id, cfg.client_secret.as_deref(), refresh_token)
            .await?;
        let expires_on = response.expires_on(Utc::now());

        let rotated = response.refresh_token.filter(|t| !t.is_empty());
        if rotated.is_some() {
            tracing::debug!("Provider rotated the refresh token");
        }

        self.store
            .write(AccountPatch {
                access_token: Some(response.access_token.clone()),
                refresh_token: Some(rotated.unwrap_or_else(|| refresh_token.to_string())),
                expires_on,
                ..Default::default()
            })
            .await?;

        Ok(AccessToken::new(response.access_token, expires_on))
    }

    async fn device_code_grant(&self, authority: &Authority, client_id: &str) -> Result<TokenResponse> {
        let device = self.tokens.request_device_code(authority, client_id).await?;
        self.interaction.show_message(&device.instructions());
        self.poll_device_code(authority, client_id, &device).await
    }

    async fn poll_device_code(
        &self,
        authority: &Authority,
        client_id: &str,
        device: &DeviceCodeResponse,
    ) -> Result<TokenResponse> {
        let lifetime = device
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_DEVICE_CODE_LIFETIME);
        let started = Instant::now();
        let deadline = started
            .checked_add(lifetime)
            .or_else(|| started.checked_add(DEFAULT_DEVICE_CODE_LIFETIME))
            .unwrap_or(started);
        let mut interval = device.poll_interval();

        loop {
            tokio::time::sleep(interval).await;
            if Instant::now() >= deadline {
                return Err(Error::DeviceCodeExpired);
            }

            match self
                .tokens
                .poll_device_code(authority, client_id, &device.device_code)
                .await?
            {
                DevicePoll::Complete(response) => return Ok(response),
                poll => {
                    interval = poll.next_interval(interval);
                    tracing::debug!(?poll, interval_secs = interval.as_secs(), "Device code pending");
                }
            }
        }
    }

    /// Identifiers and settings every new record carries.
    fn base_record(cfg: &EffectiveConfig, client_id: &str, tenant_id: &str) -> AccountRecord {
        AccountRecord {
            subscription_id: cfg.subscription_id.clone(),
            authority_host: cfg.authority_host.clone(),
            ..AccountRecord::new(client_id, tenant_id)
        }
    }

    async fn persist_login(&self, record: AccountRecord, options: LoginOptions) -> Result<LoggedIn> {
        let name = options
            .account
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| account_name_for(&record));

        let account = self.accounts.save_login(&name, record).await?;
        if options.make_default {
            self.accounts.set_default(&name).await?;
        }

        tracing::info!(
            account = %name,
            token_type = account.token_type.map(|t| t.as_str()),
            "Login saved"
        );
        Ok(LoggedIn { name, account })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfigStore;

    fn engine(store: MemoryConfigStore) -> AuthEngine {
        AuthEngine::builder(Arc::new(store))
            .env(Overrides::default())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_empty_config_not_logged_in() {
        let engine = engine(MemoryConfigStore::new());
        let err = engine.get_access_token(&Overrides::default()).await.unwrap_err();
        assert!(matches!(err, Error::NotLoggedIn));
    }

    #[tokio::test]
    async fn test_browser_account_without_refresh_token() {
        let store = MemoryConfigStore::with_contents(
            r#"{"accounts":{"a":{"clientId":"c","tenantId":"t","tokenType":"browser_oauth"}},"defaultAccount":"a"}"#,
        );
        let err = engine(store)
            .get_access_token(&Overrides::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedTokenState { reason: Some(_) }));
        assert!(err.requires_login());
    }

    #[tokio::test]
    async fn test_unknown_token_type_unsupported() {
        let store = MemoryConfigStore::with_contents(
            r#"{"clientId":"c","tenantId":"t","tokenType":"managed_identity","refreshToken":"rt"}"#,
        );
        let err = engine(store)
            .get_access_token(&Overrides::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedTokenState { reason: None }));
    }

    #[tokio::test]
    async fn test_browser_login_requires_ids() {
        let engine = engine(MemoryConfigStore::new());
        let err = engine
            .login_with_browser(&Overrides::default().client_id("c"), LoginOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::MissingClientConfig {
                flow: "Browser",
                field: "tenantId"
            }
        ));
    }

    #[tokio::test]
    async fn test_client_secret_login_names_first_missing_field() {
        let engine = engine(MemoryConfigStore::new());
        let flags = Overrides::default().client_id("c").tenant_id("t");
        let err = engine
            .login_with_client_secret(&flags, LoginOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::MissingRequiredField {
                field: "clientSecret"
            }
        ));

        let err = engine
            .login_with_client_secret(&Overrides::default(), LoginOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingRequiredField { field: "clientId" }));
    }

    #[test]
    fn test_login_options_default() {
        let options = LoginOptions::default();
        assert!(options.make_default);
        assert!(options.account.is_none());

        let named = LoginOptions::named("work").make_default(false);
        assert_eq!(named.account.as_deref(), Some("work"));
        assert!(!named.make_default);
    }
}
