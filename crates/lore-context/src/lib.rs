//! Semantic retrieval over per-collection vector indexes.
//!
//! Documents are split into chunks, embedded and appended to a flat L2 index
//! persisted in a [`lore_core::BlobStore`]. Queries are embedded once and
//! searched across any number of collections; the merged results are rendered
//! into a bounded context string for the chat layer.
#![cfg_attr(
    test,
    allow(
        dead_code,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::assertions_on_result_states,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::missing_errors_doc,
        clippy::float_cmp,
        reason = "Allow for tests"
    )
)]

/// Embedding generation and text chunking.
pub mod embedding;
/// Flat vector index and its blob persistence.
pub mod index;
/// Document ingestion into collections.
pub mod ingest;
/// Chunk and search result types.
pub mod models;
/// Multi-collection search and context rendering.
pub mod retrieval;

pub use embedding::{
    EmbeddingBatch, EmbeddingClient, EmbeddingModel, OllamaEmbeddingModel, is_degenerate,
    split_text,
};
pub use index::{CollectionIndex, FlatL2Index, Neighbor, VectorIndexStore};
pub use ingest::{IngestReport, IngestRequest, Ingestor};
pub use models::{Chunk, RetrievalResult};
pub use retrieval::{ContextBudget, RenderedContext, RetrievalEngine, build_context};
