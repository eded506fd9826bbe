//! Embedding generation and text chunking.

pub mod chunking;
mod client;
mod ollama;

pub use chunking::split_text;
pub use client::{EmbeddingBatch, EmbeddingClient, EmbeddingModel, is_degenerate, truncate_chars};
pub use ollama::OllamaEmbeddingModel;

#[cfg(test)]
pub(crate) use client::FakeEmbeddingModel;
