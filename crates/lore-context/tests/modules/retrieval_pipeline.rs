//! Ingest documents, then search and render them, end to end.

#![cfg(test)]

use std::collections::HashMap;
use std::sync::Arc;

use lore_context::{
    Chunk, CollectionIndex, ContextBudget, EmbeddingClient, EmbeddingModel, IngestRequest,
    Ingestor, RetrievalEngine, VectorIndexStore,
};
use lore_core::{EmbeddingConfig, Error, LocalBlobStore, Result, RetrievalConfig};
use tempfile::TempDir;

/// Table-driven model: known texts map to fixed vectors, others to a constant.
struct TableModel {
    table: HashMap<String, Vec<f32>>,
}

impl TableModel {
    fn new(entries: &[(&str, [f32; 2])]) -> Self {
        Self {
            table: entries
                .iter()
                .map(|(text, vector)| ((*text).to_owned(), vector.to_vec()))
                .collect(),
        }
    }
}

impl EmbeddingModel for TableModel {
    fn name(&self) -> &str {
        "table"
    }

    fn dimension(&self) -> usize {
        2
    }

    async fn invoke(&self, text: &str) -> Result<Vec<f32>> {
        self.table
            .get(text)
            .cloned()
            .ok_or_else(|| Error::Embedding(format!("no vector for {text}")))
    }
}

struct Fixture {
    _temp_dir: TempDir,
    store: Arc<VectorIndexStore<LocalBlobStore>>,
    ingestor: Ingestor<TableModel, LocalBlobStore>,
    engine: RetrievalEngine<TableModel, LocalBlobStore>,
}

fn fixture(model: TableModel) -> Fixture {
    let temp_dir = TempDir::new().unwrap();
    let embedding = EmbeddingConfig {
        dimension: 2,
        ..EmbeddingConfig::default()
    };
    let retrieval = RetrievalConfig::default();
    let embedder = Arc::new(EmbeddingClient::new(model, &embedding));
    let store = Arc::new(VectorIndexStore::new(
        LocalBlobStore::new(temp_dir.path()),
        "vector-indexes",
        2,
    ));
    Fixture {
        ingestor: Ingestor::new(Arc::clone(&embedder), Arc::clone(&store), &retrieval),
        engine: RetrievalEngine::new(
            embedder,
            Arc::clone(&store),
            ContextBudget::from(&retrieval),
        ),
        store,
        _temp_dir: temp_dir,
    }
}

fn chunk(text: &str, index: usize) -> Chunk {
    Chunk {
        text: text.to_owned(),
        index,
        source_file: "facts.txt".to_owned(),
        source_key: "uploads/facts.txt".to_owned(),
        content_type: "text/plain".to_owned(),
        document_id: "facts".to_owned(),
        collection_id: "present".to_owned(),
        created_at_ms: 0,
    }
}

fn ids(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| (*name).to_owned()).collect()
}

#[tokio::test]
async fn test_present_and_absent_collections() -> anyhow::Result<()> {
    let fixture = fixture(TableModel::new(&[("query", [1.0, 0.0])]));

    let distances = [0.9_f32, 0.1, 0.5];
    let vectors: Vec<Vec<f32>> = distances
        .iter()
        .map(|distance| vec![1.0 + distance.sqrt(), 0.0])
        .collect();
    let chunks = distances
        .iter()
        .enumerate()
        .map(|(index, distance)| chunk(&format!("chunk at {distance}"), index))
        .collect();
    let mut collection = CollectionIndex::empty(2);
    collection.append(&vectors, chunks)?;
    fixture.store.persist(&collection, "present").await?;

    let results = fixture
        .engine
        .search("query", &ids(&["absent", "present"]), 5)
        .await;

    assert_eq!(results.len(), 3);
    let found: Vec<f32> = results.iter().map(|hit| hit.distance).collect();
    for (actual, expected) in found.iter().zip([0.1_f32, 0.5, 0.9]) {
        assert!((actual - expected).abs() < 1e-5, "{actual} vs {expected}");
    }
    assert!(results.iter().all(|hit| hit.collection_id == "present"));
    assert_eq!(results[0].chunk_text, "chunk at 0.1");
    Ok(())
}

#[tokio::test]
async fn test_ingested_documents_are_searchable() -> anyhow::Result<()> {
    let fixture = fixture(TableModel::new(&[
        ("Rust has no garbage collector.", [0.0, 1.0]),
        ("Python is dynamically typed.", [5.0, 5.0]),
        ("memory management", [0.0, 1.1]),
    ]));

    for (document_id, text) in [
        ("rust", "Rust has no garbage collector."),
        ("python", "Python is dynamically typed."),
    ] {
        let report = fixture
            .ingestor
            .ingest(IngestRequest {
                collection_id: "languages".to_owned(),
                document_id: document_id.to_owned(),
                file_name: format!("{document_id}.md"),
                file_key: format!("uploads/{document_id}.md"),
                content_type: "text/markdown".to_owned(),
                text: text.to_owned(),
            })
            .await?;
        assert_eq!(report.chunks, 1);
        assert_eq!(report.fallback_embeddings, 0);
    }

    let results = fixture
        .engine
        .search("memory management", &ids(&["languages"]), 1)
        .await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].file_name, "rust.md");
    assert_eq!(results[0].metadata.document_id, "rust");

    let rendered = fixture
        .engine
        .context_for("memory management", &ids(&["languages"]), 5)
        .await;
    assert_eq!(rendered.documents, 2);
    let rust_at = rendered.text.find("rust.md").unwrap();
    let python_at = rendered.text.find("python.md").unwrap();
    assert!(rust_at < python_at);
    Ok(())
}

#[tokio::test]
async fn test_unembeddable_query_returns_nothing() -> anyhow::Result<()> {
    let fixture = fixture(TableModel::new(&[("indexed", [1.0, 1.0])]));
    let mut collection = CollectionIndex::empty(2);
    collection.append(&[vec![1.0, 1.0]], vec![chunk("indexed", 0)])?;
    fixture.store.persist(&collection, "present").await?;

    let results = fixture
        .engine
        .search("unknown question", &ids(&["present"]), 5)
        .await;
    assert!(results.is_empty());
    Ok(())
}
