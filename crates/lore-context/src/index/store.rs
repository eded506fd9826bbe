//! Per-collection index and metadata pairs persisted as two blobs.

use bincode::config::standard as bincode_config;
use bincode::{Decode, Encode, decode_from_slice, encode_to_vec};
use lore_core::{BlobStore, Error, Result, StorageConfig};
use tokio::task::spawn_blocking;
use tracing::{debug, info, warn};

use super::FlatL2Index;
use crate::models::Chunk;

const INDEX_BLOB: &str = "index.bin";
const METADATA_BLOB: &str = "metadata.bin";

/// Serialized metadata list.
#[derive(Debug, Encode, Decode)]
struct MetadataBlob {
    version: u32,
    chunks: Vec<Chunk>,
}

impl MetadataBlob {
    const VERSION: u32 = 1;
}

/// A collection's vector index and the parallel list of chunk metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionIndex {
    /// Vectors, one row per chunk
    pub index: FlatL2Index,
    /// Chunk metadata, aligned with the index rows
    pub metadata: Vec<Chunk>,
}

impl CollectionIndex {
    /// An empty collection for vectors of length `dimension`.
    pub fn empty(dimension: usize) -> Self {
        Self {
            index: FlatL2Index::new(dimension),
            metadata: Vec::new(),
        }
    }

    /// Number of indexed vectors.
    pub fn vector_count(&self) -> usize {
        self.index.len()
    }

    /// Whether the vector count and the metadata length disagree.
    pub fn is_degraded(&self) -> bool {
        self.index.len() != self.metadata.len()
    }

    /// Cut a degraded pair back to the rows both sides still hold, returning
    /// how many rows were dropped. Rows are positional, so the shorter side
    /// marks the last row whose vector and metadata still agree.
    pub fn repair(&mut self) -> usize {
        let vectors = self.index.len();
        let metadata = self.metadata.len();
        let keep = vectors.min(metadata);
        self.index.truncate(keep);
        self.metadata.truncate(keep);
        vectors.max(metadata) - keep
    }

    /// Append rows in lock-step: `vectors[i]` describes `chunks[i]`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidInput`] if the lengths differ or a vector has the
    /// wrong dimension. The collection is unchanged on error.
    pub fn append(&mut self, vectors: &[Vec<f32>], chunks: Vec<Chunk>) -> Result<()> {
        if vectors.len() != chunks.len() {
            return Err(Error::InvalidInput(format!(
                "{} vectors cannot describe {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }
        self.index.add(vectors)?;
        self.metadata.extend(chunks);
        Ok(())
    }
}

/// Loads and persists [`CollectionIndex`] pairs under
/// `{prefix}/{collection_id}/index.bin` and `{prefix}/{collection_id}/metadata.bin`.
pub struct VectorIndexStore<S: BlobStore> {
    blobs: S,
    prefix: String,
    dimension: usize,
}

impl<S: BlobStore> VectorIndexStore<S> {
    /// Create a store writing under `prefix` for vectors of length `dimension`.
    pub fn new(blobs: S, prefix: impl Into<String>, dimension: usize) -> Self {
        Self {
            blobs,
            prefix: prefix.into().trim_end_matches('/').to_owned(),
            dimension,
        }
    }

    /// Create a store from the storage configuration.
    pub fn from_config(blobs: S, config: &StorageConfig, dimension: usize) -> Self {
        Self::new(blobs, config.index_prefix.clone(), dimension)
    }

    /// Vector length of created collections.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Blob key of a collection's index.
    pub fn index_key(&self, collection_id: &str) -> String {
        format!("{}/{}/{INDEX_BLOB}", self.prefix, collection_id.trim())
    }

    /// Blob key of a collection's metadata list.
    pub fn metadata_key(&self, collection_id: &str) -> String {
        format!("{}/{}/{METADATA_BLOB}", self.prefix, collection_id.trim())
    }

    /// Load a collection, or start an empty one if it cannot be loaded.
    pub async fn load_or_create(&self, collection_id: &str) -> CollectionIndex {
        match self.load(collection_id).await {
            Some(collection) => collection,
            None => {
                debug!(collection_id, "Starting empty collection");
                CollectionIndex::empty(self.dimension)
            }
        }
    }

    /// Load a collection; `None` when it is absent or unreadable.
    pub async fn load(&self, collection_id: &str) -> Option<CollectionIndex> {
        match self.try_load(collection_id).await {
            Ok(collection) => {
                if collection.is_degraded() {
                    warn!(
                        collection_id,
                        vectors = collection.index.len(),
                        metadata = collection.metadata.len(),
                        "Index and metadata counts differ, collection is degraded"
                    );
                }
                Some(collection)
            }
            Err(error) if error.is_not_found() => {
                debug!(collection_id, %error, "Collection not found");
                None
            }
            Err(error) => {
                warn!(collection_id, %error, "Failed to load collection");
                None
            }
        }
    }

    async fn try_load(&self, collection_id: &str) -> Result<CollectionIndex> {
        let collection_id = checked_id(collection_id)?;

        let index_bytes = self.blobs.get(&self.index_key(collection_id)).await?;
        let metadata_bytes = self.blobs.get(&self.metadata_key(collection_id)).await?;

        let (index, metadata) = spawn_blocking(move || -> Result<(FlatL2Index, Vec<Chunk>)> {
            let index = FlatL2Index::from_bytes(&index_bytes)?;
            let (blob, _): (MetadataBlob, usize) =
                decode_from_slice(&metadata_bytes, bincode_config()).map_err(|error| {
                    Error::Encoding(format!("Failed to decode metadata: {error}"))
                })?;
            if blob.version != MetadataBlob::VERSION {
                return Err(Error::Encoding(format!(
                    "Unsupported metadata version {}",
                    blob.version
                )));
            }
            Ok((index, blob.chunks))
        })
        .await
        .map_err(|error| Error::Other(format!("Task join error: {error}")))??;

        if index.dimension() != self.dimension {
            return Err(Error::Storage(format!(
                "Index dimension {} does not match configured {}",
                index.dimension(),
                self.dimension
            )));
        }

        Ok(CollectionIndex { index, metadata })
    }

    /// Write both blobs of a collection.
    ///
    /// # Errors
    /// Returns an error if the pair is degraded, cannot be encoded, or either
    /// upload fails. Callers must not ignore it.
    pub async fn persist(&self, collection: &CollectionIndex, collection_id: &str) -> Result<()> {
        let collection_id = checked_id(collection_id)?;
        if collection.is_degraded() {
            return Err(Error::Storage(format!(
                "Refusing to persist {collection_id}: {} vectors but {} metadata entries",
                collection.index.len(),
                collection.metadata.len()
            )));
        }

        let index_bytes = collection.index.to_bytes()?;
        let metadata = MetadataBlob {
            version: MetadataBlob::VERSION,
            chunks: collection.metadata.clone(),
        };
        let metadata_bytes = encode_to_vec(&metadata, bincode_config())
            .map_err(|error| Error::Encoding(format!("Failed to encode metadata: {error}")))?;

        self.blobs
            .put(&self.index_key(collection_id), index_bytes)
            .await?;
        self.blobs
            .put(&self.metadata_key(collection_id), metadata_bytes)
            .await?;

        info!(
            collection_id,
            vectors = collection.index.len(),
            "Persisted collection"
        );
        Ok(())
    }

    /// Ids of every collection that has an index blob, sorted.
    ///
    /// # Errors
    /// Returns an error if the blob listing fails
    pub async fn collections(&self) -> Result<Vec<String>> {
        let prefix = format!("{}/", self.prefix);
        let mut ids: Vec<String> = self
            .blobs
            .list(&prefix)
            .await?
            .iter()
            .filter_map(|key| key.strip_prefix(&prefix))
            .filter_map(|rest| rest.strip_suffix(INDEX_BLOB))
            .filter_map(|id| id.strip_suffix('/'))
            .filter(|id| !id.is_empty() && !id.contains('/'))
            .map(str::to_owned)
            .collect();
        ids.dedup();
        Ok(ids)
    }
}

fn checked_id(collection_id: &str) -> Result<&str> {
    let trimmed = collection_id.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput(
            "collection id must be a non-empty string".to_owned(),
        ));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lore_core::MemoryBlobStore;

    fn chunk(text: &str, index: usize) -> Chunk {
        Chunk {
            text: text.to_owned(),
            index,
            source_file: "notes.txt".to_owned(),
            source_key: "uploads/notes.txt".to_owned(),
            content_type: "text/plain".to_owned(),
            document_id: "doc-1".to_owned(),
            collection_id: "docs".to_owned(),
            created_at_ms: 0,
        }
    }

    #[tokio::test]
    async fn test_load_or_create_new_collection_is_empty() {
        let store = VectorIndexStore::new(MemoryBlobStore::new(), "vector-indexes", 3);
        let collection = store.load_or_create("never-seen").await;
        assert_eq!(collection.vector_count(), 0);
        assert!(collection.metadata.is_empty());
        assert_eq!(collection.index.dimension(), 3);
        assert!(store.load("never-seen").await.is_none());
    }

    #[tokio::test]
    async fn test_append_persist_load() {
        let store = VectorIndexStore::new(MemoryBlobStore::new(), "vector-indexes/", 2);
        let mut collection = store.load_or_create("docs").await;
        collection
            .append(
                &[vec![1.0, 0.0], vec![0.0, 1.0]],
                vec![chunk("a", 0), chunk("b", 1)],
            )
            .unwrap();
        store.persist(&collection, " docs ").await.unwrap();

        let loaded = store.load("docs").await.unwrap();
        assert_eq!(loaded, collection);
        assert_eq!(store.index_key("docs"), "vector-indexes/docs/index.bin");
    }

    #[tokio::test]
    async fn test_append_requires_lock_step() {
        let mut collection = CollectionIndex::empty(2);
        let error = collection
            .append(&[vec![1.0, 0.0]], vec![chunk("a", 0), chunk("b", 1)])
            .unwrap_err();
        assert!(matches!(error, Error::InvalidInput(_)));
        assert_eq!(collection.vector_count(), 0);
        assert!(collection.metadata.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_index_loads_as_none() {
        let blobs = MemoryBlobStore::new();
        blobs
            .put("vector-indexes/docs/index.bin", b"garbage".to_vec())
            .await
            .unwrap();
        blobs
            .put("vector-indexes/docs/metadata.bin", Vec::new())
            .await
            .unwrap();
        let store = VectorIndexStore::new(blobs, "vector-indexes", 2);

        assert!(store.load("docs").await.is_none());
        assert_eq!(store.load_or_create("docs").await.vector_count(), 0);
    }

    #[test]
    fn test_repair_truncates_to_shorter_side() {
        let mut collection = CollectionIndex::empty(2);
        collection
            .index
            .add(&[vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]])
            .unwrap();
        collection.metadata = vec![chunk("a", 0), chunk("b", 1)];

        assert_eq!(collection.repair(), 1);
        assert!(!collection.is_degraded());
        assert_eq!(collection.vector_count(), 2);
        assert_eq!(collection.index.vector(1), Some(&[0.0, 1.0][..]));

        collection.metadata.push(chunk("c", 2));
        collection.metadata.push(chunk("d", 3));
        assert_eq!(collection.repair(), 2);
        assert_eq!(collection.metadata.len(), 2);
        assert_eq!(collection.repair(), 0);
    }

    #[tokio::test]
    async fn test_persist_refuses_degraded_pair() {
        let store = VectorIndexStore::new(MemoryBlobStore::new(), "vector-indexes", 2);
        let mut collection = CollectionIndex::empty(2);
        collection.index.add(&[vec![1.0, 1.0]]).unwrap();

        assert!(collection.is_degraded());
        assert!(matches!(
            store.persist(&collection, "docs").await,
            Err(Error::Storage(_))
        ));
        assert!(matches!(
            store.persist(&CollectionIndex::empty(2), "  ").await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_collections_lists_index_owners() {
        let blobs = MemoryBlobStore::new();
        for key in [
            "vector-indexes/b/index.bin",
            "vector-indexes/b/metadata.bin",
            "vector-indexes/a/index.bin",
            "vector-indexes/orphan/metadata.bin",
            "tool-packages/x/latest.js",
        ] {
            blobs.put(key, Vec::new()).await.unwrap();
        }
        let store = VectorIndexStore::new(blobs, "vector-indexes", 2);
        assert_eq!(store.collections().await.unwrap(), vec!["a", "b"]);
    }
}
