//! Document ingestion: split, embed, append, persist.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::Utc;
use lore_core::{BlobStore, Error, Result, RetrievalConfig};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

use crate::embedding::{EmbeddingClient, EmbeddingModel, split_text};
use crate::index::VectorIndexStore;
use crate::models::Chunk;

/// Extracted text of one document, bound for a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestRequest {
    /// Target collection
    pub collection_id: String,
    /// Identifier of the document
    pub document_id: String,
    /// Display name of the source file
    pub file_name: String,
    /// Blob key of the source file
    pub file_key: String,
    /// MIME type of the source file
    pub content_type: String,
    /// Extracted document text
    pub text: String,
}

/// Outcome of one ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    /// Collection written to
    pub collection_id: String,
    /// Ingested document
    pub document_id: String,
    /// Chunks added by this ingestion
    pub chunks: usize,
    /// Vectors in the collection afterwards
    pub total_vectors: usize,
    /// Chunks stored with a zero vector after a failed embedding call
    pub fallback_embeddings: usize,
}

/// Adds documents to collections.
///
/// Ingestions into the same collection through one `Ingestor` are serialised,
/// so concurrent documents cannot overwrite each other's chunks. Writers in
/// other processes still race with last-write-wins.
pub struct Ingestor<M: EmbeddingModel, S: BlobStore> {
    embedder: Arc<EmbeddingClient<M>>,
    store: Arc<VectorIndexStore<S>>,
    chunk_size: usize,
    chunk_overlap: usize,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl<M: EmbeddingModel, S: BlobStore> Ingestor<M, S> {
    /// Create an ingestor using the configured chunking.
    pub fn new(
        embedder: Arc<EmbeddingClient<M>>,
        store: Arc<VectorIndexStore<S>>,
        config: &RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Split, embed and append a document, then persist its collection.
    ///
    /// # Errors
    /// Returns [`Error::InvalidInput`] for missing identifiers, and any error
    /// from persisting the collection.
    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestReport> {
        let started = Instant::now();
        let collection_id = required("collection_id", &request.collection_id)?;
        required("document_id", &request.document_id)?;
        required("file_name", &request.file_name)?;

        let pieces = split_text(&request.text, self.chunk_size, self.chunk_overlap);
        if pieces.is_empty() {
            info!(
                collection_id,
                document_id = %request.document_id,
                "Document has no text, nothing to ingest"
            );
            let total_vectors = self
                .store
                .load(collection_id)
                .await
                .map_or(0, |collection| collection.vector_count());
            return Ok(IngestReport {
                collection_id: collection_id.to_owned(),
                document_id: request.document_id,
                chunks: 0,
                total_vectors,
                fallback_embeddings: 0,
            });
        }

        let batch = self.embedder.embed_batch(&pieces).await?;
        let created_at_ms = Utc::now().timestamp_millis();
        let chunks: Vec<Chunk> = pieces
            .into_iter()
            .enumerate()
            .map(|(index, text)| Chunk {
                text,
                index,
                source_file: request.file_name.clone(),
                source_key: request.file_key.clone(),
                content_type: request.content_type.clone(),
                document_id: request.document_id.clone(),
                collection_id: collection_id.to_owned(),
                created_at_ms,
            })
            .collect();
        let chunk_count = chunks.len();

        let lock = self.collection_lock(collection_id)?;
        let written = {
            let _writer = lock.lock().await;
            self.append_and_persist(collection_id, &batch.vectors, chunks)
                .await
        };
        self.release_lock(collection_id, lock);
        let total_vectors = written?;

        let report = IngestReport {
            collection_id: collection_id.to_owned(),
            document_id: request.document_id,
            chunks: chunk_count,
            total_vectors,
            fallback_embeddings: batch.fallbacks,
        };
        info!(
            collection_id,
            document_id = %report.document_id,
            chunks = report.chunks,
            vectors = report.total_vectors,
            fallbacks = report.fallback_embeddings,
            elapsed_secs = started.elapsed().as_secs_f64(),
            "Ingested document"
        );
        Ok(report)
    }

    /// Load, append and persist; returns the collection's vector count.
    async fn append_and_persist(
        &self,
        collection_id: &str,
        vectors: &[Vec<f32>],
        chunks: Vec<Chunk>,
    ) -> Result<usize> {
        let mut collection = self.store.load_or_create(collection_id).await;
        if collection.is_degraded() {
            let dropped = collection.repair();
            warn!(
                collection_id,
                dropped,
                kept = collection.vector_count(),
                "Truncated degraded collection before appending"
            );
        }
        collection.append(vectors, chunks)?;
        self.store.persist(&collection, collection_id).await?;
        Ok(collection.vector_count())
    }

    fn collection_lock(&self, collection_id: &str) -> Result<Arc<AsyncMutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| Error::Other("Ingest lock table poisoned".to_owned()))?;
        Ok(Arc::clone(locks.entry(collection_id.to_owned()).or_default()))
    }

    /// Give back a writer lock, forgetting it once no other ingestion holds it.
    fn release_lock(&self, collection_id: &str, lock: Arc<AsyncMutex<()>>) {
        let Ok(mut locks) = self.locks.lock() else {
            return;
        };
        drop(lock);
        if locks
            .get(collection_id)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            locks.remove(collection_id);
        }
    }
}

fn required<'value>(field: &str, value: &'value str) -> Result<&'value str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput(format!("{field} must not be empty")));
    }
    Ok(trimmed)
}
