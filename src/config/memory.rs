//! In-Memory Configuration Store
//!
//! Holds the serialized document in memory so tests exercise the same
//! parse/migrate path as the file store without touching the filesystem.

use std::sync::Arc;

use tokio::sync::RwLock;

use super::ConfigResult;
use super::store::ConfigStore;

/// In-memory configuration store
#[derive(Debug, Default, Clone)]
pub struct MemoryConfigStore {
    contents: Arc<RwLock<Option<String>>>,
}

impl MemoryConfigStore {
    /// Create an empty store (as if the file did not exist)
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-seeded with raw JSON
    pub fn with_contents(contents: impl Into<String>) -> Self {
        Self {
            contents: Arc::new(RwLock::new(Some(contents.into()))),
        }
    }

    /// Current raw contents
    pub async fn contents(&self) -> Option<String> {
        self.contents.read().await.clone()
    }

    /// Parsed view of the raw contents, without migration
    pub async fn raw_json(&self) -> Option<serde_json::Value> {
        let contents = self.contents().await?;
        serde_json::from_str(&contents).ok()
    }
}

#[async_trait::async_trait]
impl ConfigStore for MemoryConfigStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn load(&self) -> ConfigResult<Option<String>> {
        Ok(self.contents.read().await.clone())
    }

    async fn persist(&self, contents: &str) -> ConfigResult<()> {
        *self.contents.write().await = Some(contents.to_string());
        Ok(())
    }
}
