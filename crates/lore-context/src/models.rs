use bincode::{Decode, Encode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// File name reported for chunks that carry none.
pub const UNKNOWN_FILE_NAME: &str = "Unknown";

/// One embedded slice of a source document.
///
/// Row `i` of a collection's vector index describes the chunk at position `i`
/// of its metadata list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct Chunk {
    /// Chunk text as it was embedded
    pub text: String,
    /// Position of the chunk within its source document
    pub index: usize,
    /// Display name of the source file
    pub source_file: String,
    /// Blob key of the source file
    pub source_key: String,
    /// MIME type of the source file
    pub content_type: String,
    /// Identifier of the ingested document
    pub document_id: String,
    /// Collection the chunk belongs to
    pub collection_id: String,
    /// Creation time in milliseconds since the Unix epoch
    pub created_at_ms: i64,
}

impl Chunk {
    /// Creation time, if the stored timestamp is representable.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.created_at_ms)
    }
}

/// A chunk matched by a search, with its distance to the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    /// Collection the chunk was found in
    pub collection_id: String,
    /// Squared L2 distance to the query (lower is more similar)
    pub distance: f32,
    /// Text of the matched chunk
    pub chunk_text: String,
    /// Source file name, or [`UNKNOWN_FILE_NAME`]
    pub file_name: String,
    /// Full stored metadata of the chunk
    pub metadata: Chunk,
}

impl RetrievalResult {
    /// Build a result from a stored chunk.
    pub fn new(collection_id: &str, distance: f32, chunk: Chunk) -> Self {
        let file_name = if chunk.source_file.trim().is_empty() {
            UNKNOWN_FILE_NAME.to_owned()
        } else {
            chunk.source_file.clone()
        };
        Self {
            collection_id: collection_id.to_owned(),
            distance,
            chunk_text: chunk.text.clone(),
            file_name,
            metadata: chunk,
        }
    }
}
