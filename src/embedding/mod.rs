//! Text encoding
//!
//! Maps text to fixed-dimension dense vectors for semantic retrieval.
//! - EmbeddingProvider trait for abstraction
//! - FastEmbedProvider for local embedding (all-MiniLM-L6-v2, 384-dim)
//!
//! The model is loaded once at process start; failure to load is fatal.
//! Encoding itself never aborts the pipeline: callers degrade a failed
//! encode to the empty-string embedding.

mod provider;

pub use provider::{EmbeddingError, EmbeddingProvider, FastEmbedProvider};
