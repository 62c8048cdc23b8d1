//! Layered configuration store.
//!
//! The persisted [`ConfigDocument`] holds named accounts. Each invocation sees
//! an [`EffectiveConfig`] merged from the active account, the `JAYZ_*`
//! environment and per-invocation flags, in that order of increasing
//! priority.
//!
//! ```rust,no_run
//! use jayz::config::{ConfigStore, FileConfigStore, Overrides};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = FileConfigStore::at_default_location()?;
//! let flags = Overrides::default().subscription_id("1234");
//! let effective = store.merge_effective(&flags).await;
//! println!("{:?}", effective.client_and_tenant());
//! # Ok(())
//! # }
//! ```

pub mod bootstrap;
pub mod document;
pub mod effective;
pub mod env;
pub mod file;
pub mod memory;
pub mod store;

pub use bootstrap::bootstrap;
pub use document::{AccountPatch, AccountRecord, ConfigDocument, LEGACY_ACCOUNT_NAME, TokenType};
pub use effective::EffectiveConfig;
pub use env::Overrides;
pub use file::FileConfigStore;
pub use memory::MemoryConfigStore;
pub use store::ConfigStore;

use thiserror::Error;

/// Errors that can occur in configuration operations
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The home directory could not be determined
    #[error("Could not determine the home directory")]
    NoConfigDir,

    /// Store-specific failure
    #[error("Store error: {message}")]
    Store {
        /// Error message
        message: String,
    },
}

/// Result type for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Store {
            message: "disk full".to_string(),
        };
        assert!(err.to_string().contains("disk full"));
    }
}
