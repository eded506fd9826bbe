//! Blob store backends behaving alike through the trait object.

#![cfg(test)]

use std::sync::Arc;
use std::time::Duration;

use lore_core::{BlobStore, BoundedBlobStore, LocalBlobStore, MemoryBlobStore};
use tempfile::TempDir;

async fn exercise(store: Arc<dyn BlobStore>) -> anyhow::Result<()> {
    store.put("vector-indexes/b/index.bin", vec![2]).await?;
    store.put("vector-indexes/a/index.bin", vec![1]).await?;
    store.put("vector-indexes/a/index.bin", vec![3, 3]).await?;
    store.put("tool-packages/lodash/latest.js", b"module.exports = {};".to_vec()).await?;

    assert_eq!(store.get("vector-indexes/a/index.bin").await?, vec![3, 3]);
    assert_eq!(
        store.list("vector-indexes/").await?,
        vec![
            "vector-indexes/a/index.bin".to_owned(),
            "vector-indexes/b/index.bin".to_owned(),
        ]
    );
    assert!(store.get("vector-indexes/c/index.bin").await.unwrap_err().is_not_found());
    Ok(())
}

#[tokio::test]
async fn test_memory_store_contract() -> anyhow::Result<()> {
    exercise(Arc::new(MemoryBlobStore::new())).await
}

#[tokio::test]
async fn test_local_store_contract() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    exercise(Arc::new(LocalBlobStore::new(temp_dir.path()))).await
}

#[tokio::test]
async fn test_bounded_local_store_contract() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let store = BoundedBlobStore::new(
        LocalBlobStore::new(temp_dir.path()),
        Duration::from_secs(5),
    );
    exercise(Arc::new(store)).await
}

#[tokio::test]
async fn test_local_store_survives_reopen() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    LocalBlobStore::new(temp_dir.path())
        .put("docs/metadata.bin", vec![9, 9, 9])
        .await?;

    let reopened = LocalBlobStore::new(temp_dir.path());
    assert_eq!(reopened.get("docs/metadata.bin").await?, vec![9, 9, 9]);
    Ok(())
}
