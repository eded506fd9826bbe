//! Ollama embedding backend.

use lore_core::{EmbeddingConfig, Error, Result};
use ollama_rs::Ollama;
use ollama_rs::generation::embeddings::request::GenerateEmbeddingsRequest;

use super::EmbeddingModel;

/// Embedding model served by a local Ollama instance.
pub struct OllamaEmbeddingModel {
    ollama: Ollama,
    model: String,
    dimension: usize,
}

impl OllamaEmbeddingModel {
    /// Connect to the Ollama instance named in `config`.
    #[expect(
        deprecated,
        reason = "Ollama::new is deprecated in newer ollama-rs 0.3.x releases"
    )]
    pub fn new(config: &EmbeddingConfig) -> Self {
        Self {
            ollama: Ollama::new(config.host.clone(), config.port),
            model: config.model.clone(),
            dimension: config.dimension,
        }
    }

    /// Check that Ollama is reachable and has the model pulled.
    ///
    /// # Errors
    /// Returns an error if Ollama is unreachable or the model is missing
    pub async fn ensure_available(&self) -> Result<()> {
        let models = self.ollama.list_local_models().await.map_err(|error| {
            Error::Embedding(format!("Failed to connect to Ollama: {error}"))
        })?;

        if models.iter().any(|model| model.name.contains(&self.model)) {
            Ok(())
        } else {
            Err(Error::Embedding(format!(
                "Embedding model '{}' not found. Run: ollama pull {}",
                self.model, self.model
            )))
        }
    }
}

impl EmbeddingModel for OllamaEmbeddingModel {
    fn name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn invoke(&self, text: &str) -> Result<Vec<f32>> {
        let request = GenerateEmbeddingsRequest::new(self.model.clone(), text.to_owned().into());

        let response = self
            .ollama
            .generate_embeddings(request)
            .await
            .map_err(|error| Error::Embedding(format!("Embedding generation failed: {error}")))?;

        response
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("No embeddings returned".to_owned()))
    }
}
