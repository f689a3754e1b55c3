//! Index persistence and replacement semantics over the stub provider
mod common;

use common::{sample_trials, trial, StubProvider, STUB_DIM};
use tempfile::TempDir;
use trialmatch::config::{EmbeddingConfig, IndexingConfig};
use trialmatch::pipeline::EmbeddingPipeline;

fn test_indexing_config() -> IndexingConfig {
    IndexingConfig {
        vector_dim: STUB_DIM,
        hnsw_ef_construction: 200,
        hnsw_m: 16,
        hnsw_ef_search: 50,
    }
}

fn test_embedding_config() -> EmbeddingConfig {
    EmbeddingConfig {
        model: "stub-histogram".to_string(),
        batch_size: 2,
    }
}

fn open_pipeline(dir: &TempDir) -> EmbeddingPipeline {
    EmbeddingPipeline::open(
        StubProvider::arc(),
        &dir.path().join("trials.db"),
        &test_indexing_config(),
        &test_embedding_config(),
    )
    .unwrap()
}

#[test]
fn test_index_and_count() {
    let dir = TempDir::new().unwrap();
    let pipeline = open_pipeline(&dir);

    let indexed = pipeline.reindex(&sample_trials()).unwrap();
    assert_eq!(indexed, 3);
    assert_eq!(pipeline.count().unwrap(), 3);
}

#[test]
fn test_reindex_replaces_previous_collection() {
    let dir = TempDir::new().unwrap();
    let pipeline = open_pipeline(&dir);

    pipeline.reindex(&sample_trials()).unwrap();

    // A second corpus with one overlapping and one new identifier
    let replacement = vec![
        trial("NCT00000001", "Updated Lung Cancer Study", "Lung Cancer"),
        trial("NCT99999999", "A New Study", "Melanoma"),
    ];
    let indexed = pipeline.reindex(&replacement).unwrap();

    assert_eq!(indexed, 2);
    assert_eq!(pipeline.count().unwrap(), 2);

    let patient = common::lung_cancer_patient();
    let candidates = pipeline.search(&patient, 10).unwrap();
    assert_eq!(candidates.len(), 2);
    assert!(candidates.iter().all(|c| c.nct_id != "NCT00000002"));
}

#[test]
fn test_reindex_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let pipeline = open_pipeline(&dir);

    let trials = sample_trials();
    pipeline.reindex(&trials).unwrap();
    pipeline.reindex(&trials).unwrap();
    pipeline.reindex(&trials).unwrap();

    assert_eq!(pipeline.count().unwrap(), trials.len());
}

#[test]
fn test_index_survives_reopen() {
    let dir = TempDir::new().unwrap();

    {
        let pipeline = open_pipeline(&dir);
        pipeline.reindex(&sample_trials()).unwrap();
    }

    // Reopen over the same database: entries and search both work
    let pipeline = open_pipeline(&dir);
    assert_eq!(pipeline.count().unwrap(), 3);

    let candidates = pipeline
        .search(&common::lung_cancer_patient(), 3)
        .unwrap();
    assert!(!candidates.is_empty());
}

#[test]
fn test_search_results_ordered_and_bounded() {
    let dir = TempDir::new().unwrap();
    let pipeline = open_pipeline(&dir);
    pipeline.reindex(&sample_trials()).unwrap();

    let candidates = pipeline.search(&common::lung_cancer_patient(), 2).unwrap();

    assert!(candidates.len() <= 2);
    for pair in candidates.windows(2) {
        assert!(pair[0].similarity_score >= pair[1].similarity_score);
    }
}

#[test]
fn test_search_empty_index() {
    let dir = TempDir::new().unwrap();
    let pipeline = open_pipeline(&dir);

    let candidates = pipeline.search(&common::lung_cancer_patient(), 5).unwrap();
    assert!(candidates.is_empty());
}

#[test]
fn test_candidate_carries_retrieval_fields() {
    let dir = TempDir::new().unwrap();
    let pipeline = open_pipeline(&dir);
    pipeline.reindex(&sample_trials()).unwrap();

    let candidates = pipeline.search(&common::lung_cancer_patient(), 3).unwrap();
    let lung = candidates
        .iter()
        .find(|c| c.nct_id == "NCT00000001")
        .expect("lung cancer trial should be retrievable");

    assert!(lung.title.contains("Lung Cancer"));
    assert!(!lung.document.is_empty());
    assert!(!lung.locations.is_empty());
}
