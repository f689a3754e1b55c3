//! Embedding pipeline: trials and patients into a common text representation
//!
//! Document construction is schema-driven text flattening, not learned. The
//! fixed, labeled template keeps retrieval interpretable, which matters in a
//! domain where hiding an eligible trial costs more than surfacing an
//! irrelevant one.

use std::path::Path;
use std::sync::Arc;

use crate::config::{EmbeddingConfig, IndexingConfig};
use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::index::TrialIndex;
use crate::model::{
    truncate_chars, IndexEntry, MatchCandidate, PatientProfile, TrialMetadata, TrialRecord,
};

/// Metadata string fields are truncated to this many characters before
/// storage; the full text stays in the document field
const METADATA_MAX_CHARS: usize = 500;

/// Segment delimiter for flattened documents and queries
const SEGMENT_DELIMITER: &str = " | ";

/// Build the retrieval document for a trial: fixed field order, labeled
/// segments, empty fields omitted entirely
pub fn build_trial_document(trial: &TrialRecord) -> String {
    let mut segments = Vec::new();

    push_segment(&mut segments, "Title", &trial.title);
    push_segment(&mut segments, "Summary", &trial.summary);
    push_segment(&mut segments, "Conditions", &trial.conditions);
    push_segment(&mut segments, "Phase", &trial.phase);
    push_segment(&mut segments, "Eligibility", &trial.eligibility_criteria);

    // Age range appears when either bound is present, "Any" filling the
    // absent side
    if trial.min_age.is_some() || trial.max_age.is_some() {
        segments.push(format!(
            "Age Range: {} to {}",
            trial.min_age.as_deref().unwrap_or("Any"),
            trial.max_age.as_deref().unwrap_or("Any")
        ));
    }

    push_segment(&mut segments, "Gender", &trial.gender);
    push_segment(&mut segments, "Study Type", &trial.study_type);

    segments.join(SEGMENT_DELIMITER)
}

/// Build the query text for a patient profile.
///
/// Missing optional fields are omitted entirely (no placeholder text) so the
/// embedded query reflects only known information. Biomarkers render the
/// string form verbatim and the map form as "key: value" pairs.
pub fn build_patient_query(patient: &PatientProfile) -> String {
    let mut segments = Vec::new();

    segments.push(format!("Age: {} years old", patient.age));
    push_segment(&mut segments, "Gender", &patient.gender);

    if !patient.conditions.is_empty() {
        segments.push(format!("Conditions: {}", patient.conditions.join()));
    }
    if !patient.medications.is_empty() {
        segments.push(format!(
            "Current medications: {}",
            patient.medications.join()
        ));
    }
    if !patient.previous_treatments.is_empty() {
        segments.push(format!(
            "Previous treatments: {}",
            patient.previous_treatments.join()
        ));
    }

    if !patient.location_city.is_empty() {
        if patient.location_state.is_empty() {
            segments.push(format!("Location: {}", patient.location_city));
        } else {
            segments.push(format!(
                "Location: {}, {}",
                patient.location_city, patient.location_state
            ));
        }
    }

    if let Some(biomarkers) = &patient.biomarkers {
        if !biomarkers.is_empty() {
            segments.push(format!("Biomarkers: {}", biomarkers.render()));
        }
    }

    if let Some(stage) = &patient.stage {
        if !stage.trim().is_empty() {
            segments.push(format!("Stage: {}", stage));
        }
    }

    push_segment(&mut segments, "Performance", &patient.performance_status);

    segments.join(SEGMENT_DELIMITER)
}

fn push_segment(segments: &mut Vec<String>, label: &str, value: &str) {
    let value = value.trim();
    if !value.is_empty() {
        segments.push(format!("{}: {}", label, value));
    }
}

/// Build the index entry for a trial: the retrieval document plus
/// bounded-length display metadata
pub fn build_index_entry(trial: &TrialRecord) -> IndexEntry {
    let bounded = |s: &str| truncate_chars(s, METADATA_MAX_CHARS);

    IndexEntry {
        nct_id: trial.nct_id.clone(),
        document: build_trial_document(trial),
        metadata: TrialMetadata {
            nct_id: trial.nct_id.clone(),
            title: bounded(&trial.title),
            conditions: bounded(&trial.conditions),
            status: bounded(&trial.status),
            phase: bounded(&trial.phase),
            min_age: trial.min_age.clone().unwrap_or_default(),
            max_age: trial.max_age.clone().unwrap_or_default(),
            gender: bounded(&trial.gender),
            locations: bounded(&trial.locations),
        },
    }
}

/// Orchestrates encoding of trials into index entries and of patients into
/// query vectors; owns the trial index
pub struct EmbeddingPipeline {
    index: TrialIndex,
}

impl EmbeddingPipeline {
    /// Open the pipeline over a persistent index at `db_path`
    pub fn open(
        provider: Arc<dyn EmbeddingProvider>,
        db_path: &Path,
        indexing: &IndexingConfig,
        embedding: &EmbeddingConfig,
    ) -> Result<Self> {
        let index = TrialIndex::open(provider, db_path, indexing, embedding)?;
        Ok(Self { index })
    }

    /// Embed the given trials, replacing the whole collection.
    ///
    /// Idempotent on content: reindexing the same set any number of times
    /// yields the same count and identifiers.
    pub fn reindex(&self, trials: &[TrialRecord]) -> Result<usize> {
        let entries: Vec<IndexEntry> = trials.iter().map(build_index_entry).collect();
        tracing::info!("Embedding {} trials", entries.len());
        Ok(self.index.upsert_all(&entries)?)
    }

    /// Find the best-matching trials for a patient, at most `k`, ordered by
    /// descending similarity
    pub fn search(&self, patient: &PatientProfile, k: usize) -> Result<Vec<MatchCandidate>> {
        let query_text = build_patient_query(patient);
        tracing::debug!(
            "Patient {} query: {}",
            patient.patient_id,
            truncate_chars(&query_text, 100)
        );

        let candidates = self.index.query(&query_text, k)?;
        tracing::info!("Found {} matching trials", candidates.len());
        Ok(candidates)
    }

    /// Current index entry count
    pub fn count(&self) -> Result<usize> {
        Ok(self.index.count()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Biomarkers;
    use std::collections::BTreeMap;

    fn sample_trial() -> TrialRecord {
        TrialRecord {
            nct_id: "NCT01234567".to_string(),
            title: "Pembrolizumab in Advanced NSCLC".to_string(),
            summary: "A study of immunotherapy in lung cancer".to_string(),
            conditions: "Non-Small Cell Lung Cancer".to_string(),
            status: "RECRUITING".to_string(),
            phase: "PHASE3".to_string(),
            study_type: "INTERVENTIONAL".to_string(),
            eligibility_criteria: "Adults with confirmed NSCLC".to_string(),
            min_age: Some("18 Years".to_string()),
            max_age: Some("99 Years".to_string()),
            gender: "ALL".to_string(),
            locations: "Boston, MA".to_string(),
            enrollment: 250,
        }
    }

    fn sample_patient() -> PatientProfile {
        serde_json::from_str(
            r#"{
                "patient_id": "P0001",
                "age": 60,
                "gender": "Male",
                "conditions": ["Non-Small Cell Lung Cancer"],
                "medications": ["Carboplatin"],
                "previous_treatments": ["Chemotherapy"],
                "location_city": "Boston",
                "location_state": "MA"
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_trial_document_field_order() {
        let doc = build_trial_document(&sample_trial());

        let title_pos = doc.find("Title:").unwrap();
        let summary_pos = doc.find("Summary:").unwrap();
        let conditions_pos = doc.find("Conditions:").unwrap();
        let phase_pos = doc.find("Phase:").unwrap();
        let eligibility_pos = doc.find("Eligibility:").unwrap();
        let age_pos = doc.find("Age Range:").unwrap();
        let gender_pos = doc.find("Gender:").unwrap();
        let study_pos = doc.find("Study Type:").unwrap();

        assert!(title_pos < summary_pos);
        assert!(summary_pos < conditions_pos);
        assert!(conditions_pos < phase_pos);
        assert!(phase_pos < eligibility_pos);
        assert!(eligibility_pos < age_pos);
        assert!(age_pos < gender_pos);
        assert!(gender_pos < study_pos);
        assert!(doc.contains("Age Range: 18 Years to 99 Years"));
    }

    #[test]
    fn test_trial_document_omits_empty_fields() {
        let mut trial = sample_trial();
        trial.summary = String::new();
        trial.min_age = None;
        trial.max_age = None;

        let doc = build_trial_document(&trial);
        assert!(!doc.contains("Summary:"));
        assert!(!doc.contains("Age Range:"));
        assert!(!doc.contains(" |  | "));
    }

    #[test]
    fn test_trial_document_partial_age_range() {
        let mut trial = sample_trial();
        trial.max_age = None;

        let doc = build_trial_document(&trial);
        assert!(doc.contains("Age Range: 18 Years to Any"));
    }

    #[test]
    fn test_patient_query_basic_fields() {
        let query = build_patient_query(&sample_patient());

        assert!(query.contains("Age: 60 years old"));
        assert!(query.contains("Gender: Male"));
        assert!(query.contains("Conditions: Non-Small Cell Lung Cancer"));
        assert!(query.contains("Current medications: Carboplatin"));
        assert!(query.contains("Previous treatments: Chemotherapy"));
        assert!(query.contains("Location: Boston, MA"));
    }

    #[test]
    fn test_patient_query_biomarker_map() {
        let mut patient = sample_patient();
        let mut biomarkers = BTreeMap::new();
        biomarkers.insert("EGFR".to_string(), "Positive".to_string());
        patient.biomarkers = Some(Biomarkers::Map(biomarkers));

        let query = build_patient_query(&patient);
        assert!(query.contains("EGFR: Positive"));
    }

    #[test]
    fn test_patient_query_biomarker_string() {
        let mut patient = sample_patient();
        patient.biomarkers = Some(Biomarkers::Text("PD-L1: 60%".to_string()));

        let query = build_patient_query(&patient);
        assert!(query.contains("PD-L1: 60%"));
    }

    #[test]
    fn test_patient_query_omits_missing_optionals() {
        let patient: PatientProfile =
            serde_json::from_str(r#"{"age": 45, "gender": "Female"}"#).unwrap();
        let query = build_patient_query(&patient);

        assert!(!query.contains("Biomarkers:"));
        assert!(!query.contains("Stage:"));
        assert!(!query.contains("Performance:"));
        assert!(!query.contains("Location:"));
        assert!(!query.contains("Previous treatments:"));
    }

    #[test]
    fn test_patient_query_stage_and_performance() {
        let mut patient = sample_patient();
        patient.stage = Some("Stage IIIB".to_string());
        patient.performance_status = "ECOG 1".to_string();

        let query = build_patient_query(&patient);
        assert!(query.contains("Stage: Stage IIIB"));
        assert!(query.contains("Performance: ECOG 1"));
    }

    #[test]
    fn test_index_entry_truncates_metadata() {
        let mut trial = sample_trial();
        trial.locations = "X".repeat(2000);

        let entry = build_index_entry(&trial);
        assert_eq!(entry.metadata.locations.chars().count(), 500);
        // Full text stays available through the document field
        assert_eq!(entry.nct_id, "NCT01234567");
    }
}
