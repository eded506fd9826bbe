//! Collections persisted on disk through the local blob store.

#![cfg(test)]

use std::fs;

use lore_context::{Chunk, CollectionIndex, VectorIndexStore};
use lore_core::{BlobStore, LocalBlobStore};
use tempfile::TempDir;

fn chunk(text: &str, index: usize) -> Chunk {
    Chunk {
        text: text.to_owned(),
        index,
        source_file: "handbook.pdf".to_owned(),
        source_key: "uploads/handbook.pdf".to_owned(),
        content_type: "application/pdf".to_owned(),
        document_id: "handbook".to_owned(),
        collection_id: "hr".to_owned(),
        created_at_ms: 1_700_000_000_000,
    }
}

#[tokio::test]
async fn test_never_seen_collection_is_empty() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let store = VectorIndexStore::new(LocalBlobStore::new(temp_dir.path()), "vector-indexes", 8);

    let collection = store.load_or_create("brand-new").await;
    assert_eq!(collection.vector_count(), 0);
    assert!(collection.metadata.is_empty());
    assert!(store.collections().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_blobs_land_at_deterministic_keys() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let store = VectorIndexStore::new(LocalBlobStore::new(temp_dir.path()), "vector-indexes", 2);

    let mut collection = CollectionIndex::empty(2);
    collection.append(&[vec![0.5, 0.5]], vec![chunk("leave policy", 0)])?;
    store.persist(&collection, "hr").await?;

    assert!(temp_dir.path().join("vector-indexes/hr/index.bin").is_file());
    assert!(temp_dir.path().join("vector-indexes/hr/metadata.bin").is_file());
    assert_eq!(store.collections().await?, vec!["hr".to_owned()]);

    let reopened =
        VectorIndexStore::new(LocalBlobStore::new(temp_dir.path()), "vector-indexes", 2);
    let loaded = reopened.load("hr").await.unwrap();
    assert_eq!(loaded.metadata[0].text, "leave policy");
    assert_eq!(loaded.index.vector(0), Some(&[0.5, 0.5][..]));
    Ok(())
}

#[tokio::test]
async fn test_count_mismatch_loads_as_degraded() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let blobs = LocalBlobStore::new(temp_dir.path());
    let store = VectorIndexStore::new(blobs.clone(), "vector-indexes", 2);

    let mut two = CollectionIndex::empty(2);
    two.append(
        &[vec![1.0, 0.0], vec![0.0, 1.0]],
        vec![chunk("a", 0), chunk("b", 1)],
    )?;
    store.persist(&two, "hr").await?;

    let mut one = CollectionIndex::empty(2);
    one.append(&[vec![1.0, 0.0]], vec![chunk("a", 0)])?;
    let other = VectorIndexStore::new(blobs.clone(), "scratch", 2);
    other.persist(&one, "hr").await?;
    let stale_metadata = blobs.get("scratch/hr/metadata.bin").await?;
    blobs.put("vector-indexes/hr/metadata.bin", stale_metadata).await?;

    let loaded = store.load("hr").await.unwrap();
    assert!(loaded.is_degraded());
    assert_eq!(loaded.vector_count(), 2);
    assert_eq!(loaded.metadata.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_truncated_index_file_is_absent() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let store = VectorIndexStore::new(LocalBlobStore::new(temp_dir.path()), "vector-indexes", 2);

    let mut collection = CollectionIndex::empty(2);
    collection.append(&[vec![1.0, 2.0]], vec![chunk("a", 0)])?;
    store.persist(&collection, "hr").await?;

    let index_path = temp_dir.path().join("vector-indexes/hr/index.bin");
    let bytes = fs::read(&index_path)?;
    fs::write(&index_path, &bytes[..bytes.len() / 2])?;

    assert!(store.load("hr").await.is_none());
    assert_eq!(store.load_or_create("hr").await.vector_count(), 0);
    Ok(())
}
