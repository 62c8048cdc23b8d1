//! # jayz
//!
//! Credential broker for the jayz cloud-management CLI.
//!
//! This crate owns the token lifecycle: it logs an operator in against the
//! identity provider, persists the resulting tokens as named accounts in a
//! layered configuration store, and hands valid access tokens to the rest of
//! the CLI on demand.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use jayz::{AuthEngine, FileConfigStore, LoginOptions, Overrides};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), jayz::Error> {
//!     let store = Arc::new(FileConfigStore::at_default_location()?);
//!     let engine = AuthEngine::builder(store).build()?;
//!
//!     let flags = Overrides::default()
//!         .client_id("00000000-0000-0000-0000-000000000000")
//!         .tenant_id("contoso.onmicrosoft.com");
//!     let logged_in = engine.login_with_browser(&flags, LoginOptions::default()).await?;
//!     println!("saved account {}", logged_in.name);
//!
//!     let token = engine.get_access_token(&Overrides::default()).await?;
//!     println!("expires at {:?}", token.expires_on());
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod account;
pub mod auth;
pub mod config;
pub mod subscription;

pub use account::{AccountManager, account_name_for};
pub use auth::{
    AccessToken, AuthEngine, AuthEngineBuilder, Authority, CallbackOutcome, Interaction,
    LoggedIn, LoginOptions, LoopbackServer, PkcePair, SystemInteraction,
};
pub use config::{
    AccountPatch, AccountRecord, ConfigDocument, ConfigError, ConfigStore, EffectiveConfig,
    FileConfigStore, MemoryConfigStore, Overrides, TokenType, bootstrap,
};
pub use subscription::{Subscription, SubscriptionClient, filter_subscriptions};

/// Error type for jayz operations.
///
/// Every variant renders as a single line that can be shown to the operator
/// as-is before the command exits non-zero.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A login flow is missing the application or tenant identifier.
    #[error(
        "{flow} login requires {field} (pass --{flag}, set {env}, or add it to config.json)",
        flag = .field.replace("Id", "-id"),
        env = env_var_for(.field)
    )]
    MissingClientConfig {
        flow: &'static str,
        field: &'static str,
    },

    /// The client-credential flow is missing one of its inputs.
    #[error("Missing {field} (env, file, or flag)")]
    MissingRequiredField { field: &'static str },

    /// The loopback redirect port is already bound by another process.
    #[error("Port {port} is in use. Close the app using it and retry.")]
    PortInUse { port: u16 },

    /// The application registration is a confidential client.
    #[error(
        "Token exchange failed: invalid_client. Your app is configured as a confidential client. \
         Either set JAYZ_CLIENT_SECRET (or --client-secret) and add a Web redirect '{redirect_uri}' \
         to the app registration, or switch to --mode secret."
    )]
    ConfidentialClientMismatch { redirect_uri: String },

    /// The identity provider rejected a token request.
    #[error("Token exchange failed (HTTP {status}): {body}")]
    TokenExchangeFailed { status: u16, body: String },

    /// The identity provider rejected a refresh-token grant.
    #[error("Refresh token failed (HTTP {status}): {body}")]
    RefreshFailed { status: u16, body: String },

    /// The stored account cannot produce a token without a new login.
    #[error("Unsupported token state{}. Please run `jayz login` again.", reason_suffix(.reason))]
    UnsupportedTokenState { reason: Option<&'static str> },

    /// No tenant/client is configured at any precedence layer.
    #[error("Not logged in. Run: jayz login")]
    NotLoggedIn,

    /// The named account does not exist.
    #[error("No such account: {name}")]
    UnknownAccount { name: String },

    /// An operation needs a default account but none is set.
    #[error("No active account. Run `jayz login` or `jayz account use <name>`.")]
    NoActiveAccount,

    /// An existing account belongs to a different application or tenant.
    #[error("Account '{name}' already exists for a different client or tenant; choose another --account name")]
    AccountConflict { name: String },

    /// The browser login reported an error or the redirect could not be read.
    #[error("Login failed: {0}")]
    AuthorizationFailed(String),

    /// The device code expired before the user finished signing in.
    #[error("Device code expired before sign-in completed; run the login again")]
    DeviceCodeExpired,

    /// The opt-in callback timeout elapsed.
    #[error("Timed out after {:.0}s waiting for the browser login to complete", .0.as_secs_f64())]
    CallbackTimeout(std::time::Duration),

    /// The management API returned a non-success response.
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// Network connectivity or request failed.
    #[error("Network request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON serialization or deserialization failed.
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// File system operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be loaded or saved.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Error category for unified error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Required settings are missing or inconsistent
    Configuration,
    /// A local resource (port, file) is unavailable
    Environment,
    /// The identity provider or management API rejected a request
    Provider,
    /// Stored state is stale or absent; the user must log in again
    LocalState,
    /// Network failures that may succeed if the whole operation is retried
    Transient,
    /// Internal errors (IO, JSON)
    Internal,
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::MissingClientConfig { .. }
            | Error::MissingRequiredField { .. }
            | Error::ConfidentialClientMismatch { .. }
            | Error::AccountConflict { .. }
            | Error::Config(_) => ErrorCategory::Configuration,

            Error::PortInUse { .. } => ErrorCategory::Environment,

            Error::TokenExchangeFailed { .. }
            | Error::RefreshFailed { .. }
            | Error::AuthorizationFailed(_)
            | Error::Api { .. } => ErrorCategory::Provider,

            Error::UnsupportedTokenState { .. }
            | Error::NotLoggedIn
            | Error::UnknownAccount { .. }
            | Error::NoActiveAccount
            | Error::DeviceCodeExpired
            | Error::CallbackTimeout(_) => ErrorCategory::LocalState,

            Error::Network(_) => ErrorCategory::Transient,

            Error::Json(_) | Error::Io(_) => ErrorCategory::Internal,
        }
    }

    pub fn is_configuration_error(&self) -> bool {
        self.category() == ErrorCategory::Configuration
    }

    /// Whether the caller may retry the whole operation unchanged.
    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Transient
    }

    /// Whether the remedy is a fresh `jayz login`.
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            Error::NotLoggedIn
                | Error::UnsupportedTokenState { .. }
                | Error::RefreshFailed { .. }
                | Error::DeviceCodeExpired
        )
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::TokenExchangeFailed { status, .. }
            | Error::RefreshFailed { status, .. }
            | Error::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

fn reason_suffix(reason: &Option<&'static str>) -> String {
    reason.map(|r| format!(" ({})", r)).unwrap_or_default()
}

fn env_var_for(field: &str) -> &'static str {
    match field {
        "clientId" => config::env::CLIENT_ID,
        "tenantId" => config::env::TENANT_ID,
        "clientSecret" => config::env::CLIENT_SECRET,
        "subscriptionId" => config::env::SUBSCRIPTION_ID,
        _ => config::env::AUTHORITY_HOST,
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        match err {
            config::ConfigError::Io(e) => Error::Io(e),
            config::ConfigError::Serialization(e) => Error::Json(e),
            config::ConfigError::NoConfigDir => {
                Error::Config("could not determine the home directory".into())
            }
            config::ConfigError::Store { message } => Error::Config(message),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
