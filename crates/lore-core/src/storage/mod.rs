//! Blob storage: keyed byte objects with whole-object overwrite semantics.

mod bounded;
mod local;
mod memory;

pub use bounded::BoundedBlobStore;
pub use local::LocalBlobStore;
pub use memory::MemoryBlobStore;

use std::sync::Arc;

use async_trait::async_trait;

use crate::Result;

/// Abstract blob storage backend.
///
/// Keys are `/`-separated relative paths such as `vector-indexes/docs/index.bin`.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch the bytes stored under `key`.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotFound`] when nothing is stored under `key`,
    /// or a backend error.
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Store `bytes` under `key`, replacing any previous object.
    ///
    /// # Errors
    /// Returns a backend error if the object could not be written.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()>;

    /// List every key starting with `prefix`, sorted.
    ///
    /// # Errors
    /// Returns a backend error if the listing failed.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

#[async_trait]
impl<S: BlobStore + ?Sized> BlobStore for Arc<S> {
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        (**self).get(key).await
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        (**self).put(key, bytes).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        (**self).list(prefix).await
    }
}
