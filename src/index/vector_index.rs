//! HNSW vector index for similarity search
//!
//! Approximate nearest-neighbor search over cosine distance. The graph is
//! in-memory only and rebuilt wholesale from the trial store; hnsw_rs has no
//! delete path, which fits the replace-the-collection reindexing policy.

use hnsw_rs::prelude::*;

use super::IndexError;

/// Search result: the insertion slot and its similarity score.
///
/// Similarity is `1 - distance`. Cosine distance can exceed 1, so negative
/// similarity values are possible and callers must tolerate them.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub slot: usize,
    pub similarity: f32,
}

/// HNSW wrapper over cosine distance
pub struct VectorIndex {
    index: Hnsw<'static, f32, DistCosine>,
    dimension: usize,
    len: usize,
}

impl VectorIndex {
    /// Create an empty index sized for roughly `capacity` vectors
    pub fn new(dimension: usize, capacity: usize, ef_construction: usize, m: usize) -> Self {
        let index = Hnsw::<f32, DistCosine>::new(
            m,
            capacity.max(16),
            16, // max layer
            ef_construction,
            DistCosine,
        );

        Self {
            index,
            dimension,
            len: 0,
        }
    }

    /// Insert a vector under the given slot (slots map to trial identifiers
    /// outside this type)
    pub fn insert(&mut self, slot: usize, vector: &[f32]) -> Result<(), IndexError> {
        if vector.len() != self.dimension {
            return Err(IndexError::InvalidDimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        let data = vector.to_vec();
        self.index.insert((&data, slot));
        self.len += 1;

        Ok(())
    }

    /// Search for the k nearest neighbors, ordered by ascending distance
    /// (descending similarity)
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        ef_search: usize,
    ) -> Result<Vec<SearchResult>, IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::InvalidDimension {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        if self.len == 0 || k == 0 {
            return Ok(Vec::new());
        }

        let neighbours = self.index.search(query, k, ef_search);

        Ok(neighbours
            .into_iter()
            .map(|n| SearchResult {
                slot: n.d_id,
                similarity: 1.0 - n.distance,
            })
            .collect())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }
}
