//! Multi-collection semantic search.

mod context;

pub use context::{CONTEXT_LEAD_IN, ContextBudget, RenderedContext, build_context};

use std::sync::Arc;

use futures::future::join_all;
use lore_core::BlobStore;
use tracing::{debug, warn};

use crate::embedding::{EmbeddingClient, EmbeddingModel, is_degenerate};
use crate::index::VectorIndexStore;
use crate::models::RetrievalResult;

/// Embeds queries and searches them across collections.
pub struct RetrievalEngine<M: EmbeddingModel, S: BlobStore> {
    embedder: Arc<EmbeddingClient<M>>,
    store: Arc<VectorIndexStore<S>>,
    budget: ContextBudget,
}

impl<M: EmbeddingModel, S: BlobStore> RetrievalEngine<M, S> {
    /// Create an engine rendering contexts with `budget`.
    pub fn new(
        embedder: Arc<EmbeddingClient<M>>,
        store: Arc<VectorIndexStore<S>>,
        budget: ContextBudget,
    ) -> Self {
        Self {
            embedder,
            store,
            budget,
        }
    }

    /// The `top_k` chunks closest to `query` across `collection_ids`, nearest first.
    ///
    /// Missing, corrupt or empty collections are skipped. Equal distances keep
    /// collection scan order, then per-collection rank.
    pub async fn search(
        &self,
        query: &str,
        collection_ids: &[String],
        top_k: usize,
    ) -> Vec<RetrievalResult> {
        let query = query.trim();
        if query.is_empty() || collection_ids.is_empty() || top_k == 0 {
            return Vec::new();
        }

        let query_vector = match self.embedder.embed_one(query).await {
            Ok(vector) => vector,
            Err(error) => {
                warn!(%error, "Query embedding failed");
                return Vec::new();
            }
        };
        if is_degenerate(&query_vector, self.embedder.dimension()) {
            warn!("Query embedding is degenerate, skipping search");
            return Vec::new();
        }

        let searches = collection_ids
            .iter()
            .map(|collection_id| collection_id.trim())
            .filter(|collection_id| !collection_id.is_empty())
            .map(|collection_id| self.search_collection(collection_id, &query_vector, top_k));
        let mut results: Vec<RetrievalResult> =
            join_all(searches).await.into_iter().flatten().collect();

        results.sort_by(|left, right| left.distance.total_cmp(&right.distance));
        results.truncate(top_k);

        debug!(
            collections = collection_ids.len(),
            results = results.len(),
            "Search complete"
        );
        results
    }

    async fn search_collection(
        &self,
        collection_id: &str,
        query_vector: &[f32],
        top_k: usize,
    ) -> Vec<RetrievalResult> {
        let Some(collection) = self.store.load(collection_id).await else {
            return Vec::new();
        };
        if collection.index.is_empty() {
            debug!(collection_id, "Collection has no vectors");
            return Vec::new();
        }

        let search_k = top_k.min(collection.index.len());
        match collection.index.search(query_vector, search_k) {
            Ok(neighbors) => neighbors
                .into_iter()
                .filter_map(|neighbor| {
                    collection.metadata.get(neighbor.row).map(|chunk| {
                        RetrievalResult::new(collection_id, neighbor.distance, chunk.clone())
                    })
                })
                .collect(),
            Err(error) => {
                warn!(collection_id, %error, "Collection search failed");
                Vec::new()
            }
        }
    }

    /// Search and render the results as prompt context.
    pub async fn context_for(
        &self,
        query: &str,
        collection_ids: &[String],
        top_k: usize,
    ) -> RenderedContext {
        let results = self.search(query, collection_ids, top_k).await;
        self.budget.render(&results)
    }
}
