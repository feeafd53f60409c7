//! File-backed settings store
//!
//! One pretty-printed JSON document per tenant: `{root}/{name}.json`. Writes go to a
//! sibling temp file first and are renamed into place, so a concurrent reader sees
//! either the old or the new snapshot.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

use super::{StateStore, StoreError};
use crate::domain::TenantSettings;

pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        debug!(?root, "FileStore::new: called");
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the document for `name`
    fn settings_file(&self, name: &str) -> Result<PathBuf, StoreError> {
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(format!("{}.json", name)))
    }

    /// Names of every tenant with a stored document
    pub async fn names(&self) -> Result<Vec<String>, StoreError> {
        debug!(root = ?self.root, "FileStore::names: called");
        if !fs::try_exists(&self.root).await? {
            return Ok(vec![]);
        }

        let mut names = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json")
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
            {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

#[async_trait]
impl StateStore for FileStore {
    async fn try_load(&self, name: &str) -> Result<Option<TenantSettings>, StoreError> {
        debug!(%name, "FileStore::try_load: called");
        let path = self.settings_file(name)?;

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(?path, "FileStore::try_load: no document");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Some(serde_json::from_str(&content)?))
    }

    async fn save(&self, settings: &TenantSettings) -> Result<(), StoreError> {
        debug!(name = %settings.name, state = %settings.state, "FileStore::save: called");
        let path = self.settings_file(&settings.name)?;
        fs::create_dir_all(&self.root).await?;

        let content = serde_json::to_string_pretty(settings)?;
        let tmp = self.root.join(format!(".{}.{}.tmp", settings.name, Uuid::now_v7()));

        let mut file = fs::File::create(&tmp).await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        drop(file);

        fs::rename(&tmp, &path).await?;
        debug!(?path, "FileStore::save: document written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TenantState;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_document_is_none() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().join("tenants"));
        assert!(store.try_load("alpha").await.unwrap().is_none());
        assert!(store.names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_overwrites_previous_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());

        let v1 = TenantSettings::new("alpha")
            .with_state(TenantState::Running)
            .with_value("v", 1);
        store.save(&v1).await.unwrap();
        let v2 = v1.clone().with_value("v", 2);
        store.save(&v2).await.unwrap();

        assert_eq!(store.try_load("alpha").await.unwrap(), Some(v2));
        assert_eq!(store.names().await.unwrap(), vec!["alpha".to_string()]);
    }

    #[tokio::test]
    async fn test_rejects_path_like_names() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());

        for name in ["../escape", "a/b", "", ".hidden"] {
            assert!(matches!(
                store.try_load(name).await,
                Err(StoreError::InvalidName(_))
            ));
        }
        assert!(matches!(
            store.save(&TenantSettings::new("a/b")).await,
            Err(StoreError::InvalidName(_))
        ));
    }

    #[tokio::test]
    async fn test_corrupt_document_is_an_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("alpha.json"), "{ not json").unwrap();
        let store = FileStore::new(dir.path());

        assert!(matches!(
            store.try_load("alpha").await,
            Err(StoreError::Serialization(_))
        ));
    }
}
