use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard};

use async_trait::async_trait;

use super::BlobStore;
use crate::{Error, Result};

/// In-process blob store backed by an ordered map.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    ///
    /// # Errors
    /// Returns an error if the lock is poisoned
    pub fn len(&self) -> Result<usize> {
        Ok(self.read_guard()?.len())
    }

    /// Whether nothing is stored.
    ///
    /// # Errors
    /// Returns an error if the lock is poisoned
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.read_guard()?.is_empty())
    }

    fn read_guard(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, Vec<u8>>>> {
        self.blobs
            .read()
            .map_err(|_| Error::Storage("memory store lock poisoned".to_owned()))
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.read_guard()?
            .get(key)
            .cloned()
            .ok_or_else(|| Error::NotFound {
                key: key.to_owned(),
            })
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        self.blobs
            .write()
            .map_err(|_| Error::Storage("memory store lock poisoned".to_owned()))?
            .insert(key.to_owned(), bytes);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .read_guard()?
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}
