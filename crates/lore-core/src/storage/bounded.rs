use std::time::Duration;

use async_trait::async_trait;

use super::BlobStore;
use crate::{Result, with_deadline};

/// Wraps a store so every call has a finite budget.
pub struct BoundedBlobStore<S> {
    inner: S,
    timeout: Duration,
}

impl<S: BlobStore> BoundedBlobStore<S> {
    /// Bound every call on `inner` by `timeout`.
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: BlobStore> BlobStore for BoundedBlobStore<S> {
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        with_deadline(&format!("blob get {key}"), self.timeout, self.inner.get(key)).await
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        with_deadline(
            &format!("blob put {key}"),
            self.timeout,
            self.inner.put(key, bytes),
        )
        .await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        with_deadline(
            &format!("blob list {prefix}"),
            self.timeout,
            self.inner.list(prefix),
        )
        .await
    }
}
