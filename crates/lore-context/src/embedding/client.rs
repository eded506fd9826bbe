//! Fault-tolerant embedding client.

use std::future::Future;
use std::time::Duration;
#[cfg(test)]
use std::collections::{HashMap, HashSet};
#[cfg(test)]
use std::sync::Mutex;

use lore_core::{EmbeddingConfig, Error, Result, with_deadline};
use tracing::{debug, warn};

/// A single external text-embedding backend.
pub trait EmbeddingModel: Send + Sync {
    /// Model name, for logging.
    fn name(&self) -> &str;

    /// Length of every vector the model produces.
    fn dimension(&self) -> usize;

    /// Embed one text.
    ///
    /// # Errors
    /// Returns an error if the backend call fails
    fn invoke(&self, text: &str) -> impl Future<Output = Result<Vec<f32>>> + Send;
}

/// Vectors produced by one [`EmbeddingClient::embed_batch`] call.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingBatch {
    /// One vector per input text, in input order
    pub vectors: Vec<Vec<f32>>,
    /// How many texts fell back to a zero vector after a failed call
    pub fallbacks: usize,
}

/// Turns text into fixed-length vectors.
///
/// Every returned vector has exactly `dimension` components. Blank inputs and
/// failed model calls yield zero vectors instead of errors, so callers always
/// get one vector per text.
pub struct EmbeddingClient<M: EmbeddingModel> {
    model: M,
    dimension: usize,
    max_input_chars: usize,
    timeout: Duration,
}

impl<M: EmbeddingModel> EmbeddingClient<M> {
    /// Create a client; the vector length comes from the model.
    pub fn new(model: M, config: &EmbeddingConfig) -> Self {
        let dimension = model.dimension();
        if dimension != config.dimension {
            warn!(
                model = model.name(),
                model_dimension = dimension,
                configured_dimension = config.dimension,
                "Embedding model dimension differs from configuration"
            );
        }
        Self {
            model,
            dimension,
            max_input_chars: config.max_input_chars,
            timeout: config.timeout(),
        }
    }

    /// Length of every produced vector.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Underlying model.
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Embed `texts`, one vector per text in the same order.
    ///
    /// # Errors
    /// Returns [`Error::InvalidInput`] if `texts` is empty. Per-text failures
    /// never surface as errors.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(self.embed_batch(texts).await?.vectors)
    }

    /// Embed a single text.
    ///
    /// # Errors
    /// Never fails for a single text; the signature mirrors [`Self::embed`].
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(&[text.to_owned()]).await?;
        Ok(vectors.pop().unwrap_or_else(|| self.zero_vector()))
    }

    /// Like [`Self::embed`], additionally reporting how many texts fell back.
    ///
    /// # Errors
    /// Returns [`Error::InvalidInput`] if `texts` is empty.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<EmbeddingBatch> {
        if texts.is_empty() {
            return Err(Error::InvalidInput(
                "embedding requires at least one text".to_owned(),
            ));
        }

        let mut batch = EmbeddingBatch {
            vectors: Vec::with_capacity(texts.len()),
            fallbacks: 0,
        };
        for (position, text) in texts.iter().enumerate() {
            if text.trim().is_empty() {
                batch.vectors.push(self.zero_vector());
                continue;
            }
            match self.invoke_bounded(text).await {
                Ok(vector) => batch.vectors.push(vector),
                Err(error) => {
                    warn!(
                        model = self.model.name(),
                        position,
                        %error,
                        "Embedding failed, using zero vector"
                    );
                    batch.fallbacks += 1;
                    batch.vectors.push(self.zero_vector());
                }
            }
        }

        debug!(
            model = self.model.name(),
            texts = texts.len(),
            fallbacks = batch.fallbacks,
            "Embedded batch"
        );
        Ok(batch)
    }

    async fn invoke_bounded(&self, text: &str) -> Result<Vec<f32>> {
        let input = truncate_chars(text, self.max_input_chars);
        let vector =
            with_deadline("embedding call", self.timeout, self.model.invoke(input)).await?;
        if vector.len() != self.dimension {
            return Err(Error::Embedding(format!(
                "expected {} dimensions, model returned {}",
                self.dimension,
                vector.len()
            )));
        }
        Ok(vector)
    }

    fn zero_vector(&self) -> Vec<f32> {
        vec![0.0; self.dimension]
    }
}

/// The first `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    text.char_indices()
        .nth(max_chars)
        .map_or(text, |(byte_offset, _)| &text[..byte_offset])
}

/// Whether `vector` cannot be trusted as a query: wrong length or all zeros.
pub fn is_degenerate(vector: &[f32], dimension: usize) -> bool {
    vector.len() != dimension || vector.iter().all(|component| *component == 0.0)
}

/// Deterministic embedding model for tests.
///
/// Texts registered with [`Self::with_vector`] map to fixed vectors, texts
/// registered with [`Self::failing_on`] fail, and anything else gets a
/// hash-derived vector. Every input the model receives is captured.
#[cfg(test)]
pub(crate) struct FakeEmbeddingModel {
    dimension: usize,
    fixed: HashMap<String, Vec<f32>>,
    failing: HashSet<String>,
    captured: Mutex<Vec<String>>,
}

#[cfg(test)]
impl FakeEmbeddingModel {
    pub(crate) fn new(dimension: usize) -> Self {
        Self {
            dimension,
            fixed: HashMap::new(),
            failing: HashSet::new(),
            captured: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_vector(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.fixed.insert(text.to_owned(), vector);
        self
    }

    pub(crate) fn failing_on(mut self, text: &str) -> Self {
        self.failing.insert(text.to_owned());
        self
    }

    pub(crate) fn captured(&self) -> Vec<String> {
        self.captured.lock().unwrap().clone()
    }

    fn hashed(&self, text: &str) -> Vec<f32> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash as _, Hasher as _};

        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let hash = hasher.finish();
        (0..self.dimension)
            .map(|idx| (hash.wrapping_add(idx as u64) % 1000) as f32 / 1000.0 + 0.001)
            .collect()
    }
}

#[cfg(test)]
impl EmbeddingModel for FakeEmbeddingModel {
    fn name(&self) -> &str {
        "fake"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn invoke(&self, text: &str) -> Result<Vec<f32>> {
        self.captured.lock().unwrap().push(text.to_owned());
        if self.failing.contains(text) {
            return Err(Error::Embedding(format!("refused: {text}")));
        }
        Ok(self
            .fixed
            .get(text)
            .cloned()
            .unwrap_or_else(|| self.hashed(text)))
    }
}
