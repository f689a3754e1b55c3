//! Shared fixtures for integration tests
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use trialmatch::embedding::{EmbeddingError, EmbeddingProvider};
use trialmatch::model::{
    EligibilityStatus, MatchCandidate, PatientProfile, TrialRecord, Verdict,
};
use trialmatch::reasoner::EligibilityReasoner;

pub const STUB_DIM: usize = 16;

/// Deterministic embedding provider for tests: letter-frequency histograms,
/// so no model download is needed and similar texts land near each other.
pub struct StubProvider;

impl StubProvider {
    pub fn arc() -> Arc<dyn EmbeddingProvider> {
        Arc::new(StubProvider)
    }

    fn histogram(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; STUB_DIM];
        for c in text.to_lowercase().chars().filter(|c| c.is_alphanumeric()) {
            let bucket = (c as usize) % STUB_DIM;
            v[bucket] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        } else {
            // Keep zero-length inputs representable
            v[0] = 1.0;
        }
        v
    }
}

impl EmbeddingProvider for StubProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(Self::histogram(text))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| Self::histogram(t)).collect())
    }

    fn dimension(&self) -> usize {
        STUB_DIM
    }

    fn model_name(&self) -> &str {
        "stub-histogram"
    }
}

/// Reasoner that records call counts and returns scripted statuses
pub struct MockReasoner {
    calls: AtomicUsize,
    statuses: Vec<EligibilityStatus>,
}

impl MockReasoner {
    pub fn new(statuses: Vec<EligibilityStatus>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            statuses,
        }
    }

    pub fn always(status: EligibilityStatus) -> Self {
        Self::new(vec![status])
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl EligibilityReasoner for MockReasoner {
    fn assess(&self, _patient: &PatientProfile, candidate: &MatchCandidate) -> Verdict {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let status = self.statuses[n % self.statuses.len()];
        Verdict {
            status,
            match_reasons: vec![format!("scripted verdict for {}", candidate.nct_id)],
            concerns: vec![],
            questions_for_doctor: vec![],
            explanation: "scripted".to_string(),
        }
    }
}

pub fn trial(nct_id: &str, title: &str, conditions: &str) -> TrialRecord {
    TrialRecord {
        nct_id: nct_id.to_string(),
        title: title.to_string(),
        summary: format!("A study of {}", title),
        conditions: conditions.to_string(),
        status: "RECRUITING".to_string(),
        phase: "PHASE2".to_string(),
        study_type: "INTERVENTIONAL".to_string(),
        eligibility_criteria: "Adults with confirmed diagnosis".to_string(),
        gender: "ALL".to_string(),
        min_age: Some("18 Years".to_string()),
        max_age: Some("99 Years".to_string()),
        locations: "Boston, MA".to_string(),
        enrollment: 100,
    }
}

pub fn sample_trials() -> Vec<TrialRecord> {
    vec![
        trial(
            "NCT00000001",
            "Pembrolizumab in Advanced Non-Small Cell Lung Cancer",
            "Non-Small Cell Lung Cancer",
        ),
        trial(
            "NCT00000002",
            "Trastuzumab for HER2-Positive Breast Cancer",
            "Breast Cancer",
        ),
        trial(
            "NCT00000003",
            "Metformin Extension Study in Type 2 Diabetes",
            "Type 2 Diabetes",
        ),
    ]
}

pub fn lung_cancer_patient() -> PatientProfile {
    serde_json::from_str(
        r#"{
            "patient_id": "P0001",
            "age": 62,
            "gender": "Male",
            "conditions": ["Non-Small Cell Lung Cancer"],
            "medications": ["Carboplatin"],
            "previous_treatments": ["Chemotherapy"],
            "location_city": "Boston",
            "location_state": "MA",
            "willing_to_travel": true,
            "biomarkers": {"PD-L1": "60%"},
            "stage": "Stage IIIB",
            "performance_status": "ECOG 1"
        }"#,
    )
    .unwrap()
}
