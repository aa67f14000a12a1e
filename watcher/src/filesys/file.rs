//! File operations

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tokio::fs;
use tokio::io::AsyncReadExt;

use crate::errors::WatchError;

/// A file wrapper with path
#[derive(Debug, Clone)]
pub struct File {
    path: PathBuf,
}

impl File {
    /// Create a new file reference
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the file exists
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path).await.is_ok()
    }

    /// Read file contents as string
    pub async fn read_string(&self) -> Result<String, WatchError> {
        let mut file = fs::File::open(&self.path).await?;
        let mut contents = String::new();
        file.read_to_string(&mut contents).await?;
        Ok(contents)
    }

    /// Read file as JSON
    pub async fn read_json<T: DeserializeOwned>(&self) -> Result<T, WatchError> {
        let contents = self.read_string().await?;
        let value = serde_json::from_str(&contents)?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::settings::Settings;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("daowatch-{}-{}", std::process::id(), name))
    }

    #[tokio::test]
    async fn test_read_json() {
        let path = temp_path("settings.json");
        tokio::fs::write(&path, r#"{"polling": {"waiting_interval_ms": 50}}"#)
            .await
            .unwrap();

        let file = File::new(&path);
        assert!(file.exists().await);
        let settings: Settings = file.read_json().await.unwrap();
        assert_eq!(settings.polling.waiting_interval_ms, 50);

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_file() {
        let file = File::new(temp_path("missing.json"));
        assert!(!file.exists().await);
        let result = file.read_json::<Settings>().await;
        assert!(matches!(result, Err(WatchError::IoError(_))));
    }
}
