use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use uuid::Uuid;

use super::BlobStore;
use crate::{Error, Result};

/// Local filesystem blob store.
///
/// Each key maps to a file below `root`. Writes go to a hidden sibling file
/// first and are renamed into place, so readers never observe a torn object.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    /// Create a store rooted at `root`. The directory is created lazily on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a key onto a path below the root, rejecting keys that would escape it.
    fn resolve_path(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let is_plain = !key.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !is_plain {
            return Err(Error::InvalidInput(format!("invalid blob key: {key:?}")));
        }
        Ok(self.root.join(relative))
    }

    /// Convert a path below the root back into a `/`-separated key.
    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Option<Vec<&str>> = relative
            .components()
            .map(|component| match component {
                Component::Normal(part) => part.to_str(),
                _ => None,
            })
            .collect();
        parts.map(|segments| segments.join("/"))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.resolve_path(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(error) if error.kind() == ErrorKind::NotFound => Err(Error::NotFound {
                key: key.to_owned(),
            }),
            Err(error) => Err(error.into()),
        }
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let path = self.resolve_path(key)?;
        let (Some(parent), Some(file_name)) = (path.parent(), path.file_name()) else {
            return Err(Error::InvalidInput(format!("invalid blob key: {key:?}")));
        };
        fs::create_dir_all(parent).await?;

        let staging = parent.join(format!(
            ".{}.{}.tmp",
            file_name.to_string_lossy(),
            Uuid::new_v4()
        ));
        fs::write(&staging, &bytes).await?;
        if let Err(error) = fs::rename(&staging, &path).await {
            drop(fs::remove_file(&staging).await);
            return Err(Error::Storage(format!(
                "Failed to move {} into place: {error}",
                path.display()
            )));
        }

        tracing::debug!(key, bytes = bytes.len(), "Stored blob");
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(directory) = pending.pop() {
            let mut entries = match fs::read_dir(&directory).await {
                Ok(entries) => entries,
                Err(error) if error.kind() == ErrorKind::NotFound => continue,
                Err(error) => return Err(error.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_name().to_string_lossy().starts_with('.') {
                    continue;
                }
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                } else if let Some(key) = self.key_for(&path)
                    && key.starts_with(prefix)
                {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_roundtrip_and_nested_keys() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(temp_dir.path());

        store
            .put("vector-indexes/docs/index.bin", vec![1, 2, 3])
            .await
            .unwrap();
        assert_eq!(
            store.get("vector-indexes/docs/index.bin").await.unwrap(),
            vec![1, 2, 3]
        );
        assert!(temp_dir.path().join("vector-indexes/docs/index.bin").exists());
    }

    #[tokio::test]
    async fn test_missing_blob_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(temp_dir.path());
        assert!(store.get("absent/key").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(temp_dir.path());

        for key in ["../outside", "/etc/passwd", "a/../../b", ""] {
            let error = store.put(key, Vec::new()).await.unwrap_err();
            assert!(matches!(error, Error::InvalidInput(_)), "key {key:?}");
        }
    }

    #[tokio::test]
    async fn test_list_skips_staging_files() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(temp_dir.path());
        store.put("p/a/index.bin", Vec::new()).await.unwrap();
        store.put("p/a/metadata.bin", Vec::new()).await.unwrap();
        store.put("q/other", Vec::new()).await.unwrap();
        fs::write(temp_dir.path().join("p/a/.index.bin.x.tmp"), b"partial").unwrap();

        assert_eq!(
            store.list("p/").await.unwrap(),
            vec!["p/a/index.bin".to_owned(), "p/a/metadata.bin".to_owned()]
        );
    }

    #[tokio::test]
    async fn test_list_on_missing_root_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(temp_dir.path().join("never-created"));
        assert!(store.list("").await.unwrap().is_empty());
    }
}
