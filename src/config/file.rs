//! File-based Configuration Store
//!
//! Persists the document as pretty JSON at `~/.config/jayz/config.json`.
//! Writes go to a sibling temp file that is renamed over the target, so a
//! crash mid-write leaves either the old or the new document.

use std::path::{Path, PathBuf};

use super::store::ConfigStore;
use super::{ConfigError, ConfigResult};

/// Directory under the home directory that holds the config file.
pub const CONFIG_DIR: &str = ".config/jayz";
/// File name of the config document.
pub const CONFIG_FILE: &str = "config.json";

/// File-based configuration store
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    /// Create a store backed by an explicit path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `~/.config/jayz/config.json`
    pub fn at_default_location() -> ConfigResult<Self> {
        Ok(Self::new(Self::default_path()?))
    }

    pub fn default_path() -> ConfigResult<PathBuf> {
        let dirs = directories::BaseDirs::new().ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.home_dir().join(CONFIG_DIR).join(CONFIG_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| CONFIG_FILE.into());
        name.push(format!(".{}.tmp", std::process::id()));
        self.path.with_file_name(name)
    }
}

#[async_trait::async_trait]
impl ConfigStore for FileConfigStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn load(&self) -> ConfigResult<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(&self, contents: &str) -> ConfigResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp = self.temp_path();
        if let Err(e) = tokio::fs::write(&temp, contents).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }
        restrict_permissions(&temp).await;

        if let Err(e) = tokio::fs::rename(&temp, &self.path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }

        tracing::debug!(path = %self.path.display(), "Config saved");
        Ok(())
    }
}

/// Owner-only read/write. Failure is logged, not fatal.
#[cfg(unix)]
async fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    let perms = std::fs::Permissions::from_mode(0o600);
    if let Err(e) = tokio::fs::set_permissions(path, perms).await {
        tracing::warn!(path = %path.display(), error = %e, "Could not restrict config file permissions");
    }
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AccountPatch, TokenType};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_file_reads_empty() {
        let dir = tempdir().unwrap();
        let store = FileConfigStore::new(dir.path().join("nope.json"));

        assert_eq!(store.load().await.unwrap(), None);
        assert!(store.read().await.accounts.is_empty());
    }

    #[tokio::test]
    async fn test_write_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("jayz").join("config.json");
        let store = FileConfigStore::new(&path);

        store
            .write(AccountPatch {
                client_id: Some("c".into()),
                tenant_id: Some("t".into()),
                token_type: Some(TokenType::DeviceCode),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(path.exists());
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.ends_with('\n'));
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["tokenType"], "device_code");
    }

    #[tokio::test]
    async fn test_no_temp_file_left_behind() {
        let dir = tempdir().unwrap();
        let store = FileConfigStore::new(dir.path().join("config.json"));
        store.write(AccountPatch::subscription("s")).await.unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["config.json".to_string()]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = FileConfigStore::new(&path);
        store.write(AccountPatch::subscription("s")).await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_corrupt_file_reads_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{{{{").unwrap();

        let store = FileConfigStore::new(&path);
        assert!(store.read().await.accounts.is_empty());
    }

    #[test]
    fn test_default_path_shape() {
        if let Ok(path) = FileConfigStore::default_path() {
            assert!(path.ends_with(".config/jayz/config.json"));
        }
    }
}
