/// Embedding provider trait and FastEmbed implementation
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitializationError(String),

    #[error("Embedding generation failed: {0}")]
    GenerationError(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Trait for embedding providers
///
/// Allows abstraction over different embedding backends, and lets tests
/// substitute a deterministic encoder that needs no model download.
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text. Empty text is valid input
    /// and produces the model's empty-string embedding.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Generate embeddings for multiple texts, batched for efficiency.
    ///
    /// Output positions correspond one-to-one with input positions; no
    /// filtering is performed, so callers can zip results back onto their
    /// source records.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// FastEmbed provider for local embedding generation
///
/// Uses all-MiniLM-L6-v2 (384 dimensions) by default. Models are downloaded
/// on demand to `~/.cache/huggingface/` on first use; the default model is
/// ~90MB.
pub struct FastEmbedProvider {
    model: Arc<TextEmbedding>,
    model_name: String,
    dimension: usize,
}

impl FastEmbedProvider {
    /// Create a new FastEmbed provider with the specified model.
    ///
    /// Supported models:
    /// - all-MiniLM-L6-v2: 90MB (384 dims) - default
    /// - bge-small-en-v1.5: 130MB (384 dims) - better accuracy
    /// - bge-base-en-v1.5: 440MB (768 dims) - highest accuracy
    pub fn new(model_name: &str) -> Result<Self, EmbeddingError> {
        let embedding_model = match model_name {
            "all-MiniLM-L6-v2" | "all-minilm-l6-v2" => EmbeddingModel::AllMiniLML6V2,
            "bge-small-en-v1.5" => EmbeddingModel::BGESmallENV15,
            "bge-base-en-v1.5" => EmbeddingModel::BGEBaseENV15,
            _ => {
                return Err(EmbeddingError::InitializationError(format!(
                    "Unsupported model: {}. Supported: all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5",
                    model_name
                )));
            }
        };

        let dimension = match embedding_model {
            EmbeddingModel::BGEBaseENV15 => 768,
            _ => 384,
        };

        tracing::info!(
            "Initializing embedding model: {} ({}D, downloaded on first use if not cached)",
            model_name,
            dimension
        );

        let init_options = InitOptions::new(embedding_model).with_show_download_progress(true);

        let model = TextEmbedding::try_new(init_options)
            .map_err(|e| EmbeddingError::InitializationError(e.to_string()))?;

        Ok(Self {
            model: Arc::new(model),
            model_name: model_name.to_string(),
            dimension,
        })
    }

    /// Create provider with the default model (all-MiniLM-L6-v2)
    pub fn with_default_model() -> Result<Self, EmbeddingError> {
        Self::new("all-MiniLM-L6-v2")
    }
}

impl EmbeddingProvider for FastEmbedProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let embeddings = self
            .model
            .embed(vec![text.to_string()], None)
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))?;

        let embedding = embeddings.into_iter().next().ok_or_else(|| {
            EmbeddingError::GenerationError("No embeddings generated".to_string())
        })?;

        if embedding.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }

        Ok(embedding)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let embeddings = self
            .model
            .embed(texts.to_vec(), None)
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))?;

        for embedding in &embeddings {
            if embedding.len() != self.dimension {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: self.dimension,
                    actual: embedding.len(),
                });
            }
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
