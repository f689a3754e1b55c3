//! Persistent vector index of clinical trials
//!
//! Composes the text encoder, the sqlite-backed trial store, and an HNSW
//! search graph into one collection supporting wholesale replacement and
//! k-nearest-neighbor query. The store survives restarts; the graph is
//! rebuilt from it on open.

mod store;
mod vector_index;

pub use store::{StoredEntry, TrialStore};
pub use vector_index::{SearchResult, VectorIndex};

use std::path::Path;
use std::sync::{Arc, RwLock};
use thiserror::Error;

use crate::config::{EmbeddingConfig, IndexingConfig};
use crate::embedding::{EmbeddingError, EmbeddingProvider};
use crate::model::{IndexEntry, MatchCandidate};

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Index initialization failed: {0}")]
    Initialization(String),

    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Insert batch {batch} failed: {source}")]
    BatchInsert { batch: usize, source: rusqlite::Error },

    #[error("Embedding generation failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Stored vector for {nct_id} is corrupt")]
    CorruptVector { nct_id: String },

    #[error("Metadata for {nct_id} failed to (de)serialize: {source}")]
    Metadata {
        nct_id: String,
        source: serde_json::Error,
    },
}

struct IndexState {
    vectors: VectorIndex,
    /// Insertion slot -> registry identifier
    slots: Vec<String>,
}

/// The trial collection: encoder + persistent store + search graph
pub struct TrialIndex {
    provider: Arc<dyn EmbeddingProvider>,
    store: TrialStore,
    state: RwLock<IndexState>,
    indexing: IndexingConfig,
    batch_size: usize,
}

impl TrialIndex {
    /// Open the index at `db_path`, rebuilding the search graph from any
    /// previously persisted entries
    pub fn open(
        provider: Arc<dyn EmbeddingProvider>,
        db_path: &Path,
        indexing: &IndexingConfig,
        embedding: &EmbeddingConfig,
    ) -> Result<Self, IndexError> {
        if provider.dimension() != indexing.vector_dim {
            return Err(IndexError::InvalidDimension {
                expected: indexing.vector_dim,
                actual: provider.dimension(),
            });
        }

        let store = TrialStore::open(db_path)?;
        let entries = store.load_all()?;

        let state = Self::build_state(indexing, &entries)?;

        tracing::info!(
            "Trial index opened with {} persisted entries",
            state.slots.len()
        );

        Ok(Self {
            provider,
            store,
            state: RwLock::new(state),
            indexing: indexing.clone(),
            batch_size: embedding.batch_size.max(1),
        })
    }

    fn build_state(
        indexing: &IndexingConfig,
        entries: &[StoredEntry],
    ) -> Result<IndexState, IndexError> {
        let mut vectors = VectorIndex::new(
            indexing.vector_dim,
            entries.len(),
            indexing.hnsw_ef_construction,
            indexing.hnsw_m,
        );
        let mut slots = Vec::with_capacity(entries.len());

        for entry in entries {
            vectors.insert(slots.len(), &entry.vector)?;
            slots.push(entry.nct_id.clone());
        }

        Ok(IndexState { vectors, slots })
    }

    /// Replace the entire collection with the given entries.
    ///
    /// Documents are encoded in `batch_size` chunks, persisted via the
    /// store's delete-then-insert policy, and the search graph is rebuilt.
    /// Returns the number of entries indexed.
    pub fn upsert_all(&self, entries: &[IndexEntry]) -> Result<usize, IndexError> {
        let mut stored = Vec::with_capacity(entries.len());

        for chunk in entries.chunks(self.batch_size) {
            let texts: Vec<String> = chunk.iter().map(|e| e.document.clone()).collect();
            let vectors = self.provider.embed_batch(&texts)?;

            for (entry, vector) in chunk.iter().zip(vectors) {
                stored.push(StoredEntry {
                    nct_id: entry.nct_id.clone(),
                    document: entry.document.clone(),
                    metadata: entry.metadata.clone(),
                    vector,
                });
            }
        }

        self.store.replace_all(&stored, self.batch_size)?;

        let new_state = Self::build_state(&self.indexing, &stored)?;
        let mut state = self.state.write().unwrap();
        *state = new_state;

        tracing::info!("Reindexed {} trials", state.slots.len());

        Ok(state.slots.len())
    }

    /// Encode `text` and return up to `k` candidates ordered by descending
    /// similarity.
    ///
    /// An encoding failure degrades to the empty-string embedding rather
    /// than aborting the query.
    pub fn query(&self, text: &str, k: usize) -> Result<Vec<MatchCandidate>, IndexError> {
        let vector = match self.provider.embed(text) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("Query encoding failed ({}), degrading to empty text", e);
                self.provider.embed("")?
            }
        };

        let state = self.state.read().unwrap();
        if state.vectors.is_empty() {
            return Ok(Vec::new());
        }

        let hits = state
            .vectors
            .search(&vector, k, self.indexing.hnsw_ef_search)?;

        let mut candidates = Vec::with_capacity(hits.len());
        for hit in hits {
            let Some(nct_id) = state.slots.get(hit.slot) else {
                tracing::warn!("Search returned unknown slot {}", hit.slot);
                continue;
            };

            let Some(entry) = self.store.get(nct_id)? else {
                tracing::warn!("Trial {} missing from store during hydration", nct_id);
                continue;
            };

            candidates.push(MatchCandidate {
                nct_id: entry.nct_id,
                similarity_score: hit.similarity,
                title: entry.metadata.title,
                conditions: entry.metadata.conditions,
                phase: entry.metadata.phase,
                locations: entry.metadata.locations,
                document: entry.document,
            });
        }

        candidates.sort_by(|a, b| {
            b.similarity_score
                .partial_cmp(&a.similarity_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(k);

        Ok(candidates)
    }

    /// Current entry count (diagnostics, not correctness)
    pub fn count(&self) -> Result<usize, IndexError> {
        self.store.count()
    }
}
