//! Matching orchestration
//!
//! Retrieval then per-candidate eligibility assessment, with a hard
//! similarity floor between the two stages, plus the grouped text report.

use std::fmt::Write as _;

use crate::model::{EligibilityStatus, MatchResult, PatientProfile, TrialRecord};
use crate::pipeline::EmbeddingPipeline;
use crate::reasoner::EligibilityReasoner;
use crate::Result;

const REPORT_TITLE_MAX_CHARS: usize = 80;
const REPORT_MAX_REASONS: usize = 3;
const REPORT_MAX_CONCERNS: usize = 2;

/// End-to-end matcher: owns the embedding pipeline and the reasoner
pub struct TrialMatcher {
    pipeline: EmbeddingPipeline,
    reasoner: Box<dyn EligibilityReasoner>,
}

impl TrialMatcher {
    pub fn new(pipeline: EmbeddingPipeline, reasoner: Box<dyn EligibilityReasoner>) -> Self {
        Self { pipeline, reasoner }
    }

    /// Rebuild the index from a replacement corpus of trials
    pub fn reindex(&self, trials: &[TrialRecord]) -> Result<usize> {
        self.pipeline.reindex(trials)
    }

    /// Number of indexed trials
    pub fn indexed_count(&self) -> Result<usize> {
        self.pipeline.count()
    }

    /// Match a patient against the indexed trials.
    ///
    /// Retrieves up to `n_trials` candidates, drops those scoring below
    /// `min_similarity` without assessing them, and assesses the remainder
    /// in retrieval order. The reasoner is total, so each surviving
    /// candidate yields exactly one result.
    pub fn match_patient(
        &self,
        patient: &PatientProfile,
        n_trials: usize,
        min_similarity: f32,
    ) -> Result<Vec<MatchResult>> {
        let candidates = self.pipeline.search(patient, n_trials)?;
        if candidates.is_empty() {
            tracing::info!("No candidate trials found for {}", patient.patient_id);
            return Ok(Vec::new());
        }

        tracing::info!(
            "Analyzing {} candidate trials for {}",
            candidates.len(),
            patient.patient_id
        );

        let mut results = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if candidate.similarity_score < min_similarity {
                tracing::debug!(
                    "Skipping {} (similarity {:.3} below floor {:.3})",
                    candidate.nct_id,
                    candidate.similarity_score,
                    min_similarity
                );
                continue;
            }

            let verdict = self.reasoner.assess(patient, &candidate);
            tracing::debug!("{}: {}", candidate.nct_id, verdict.status);
            results.push(MatchResult::from_parts(&candidate, verdict));
        }

        Ok(results)
    }
}

/// Render the patient-facing text report.
///
/// Results are grouped by status in fixed section order; within each
/// section the retrieval order is preserved.
pub fn generate_report(patient: &PatientProfile, results: &[MatchResult]) -> String {
    let mut report = String::new();

    let _ = writeln!(report, "{}", "=".repeat(70));
    let _ = writeln!(report, "CLINICAL TRIAL MATCHING REPORT");
    let _ = writeln!(report, "{}", "=".repeat(70));
    let _ = writeln!(
        report,
        "Generated: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M")
    );
    let _ = writeln!(report);
    let _ = writeln!(report, "PATIENT: {}", patient.patient_id);
    let _ = writeln!(report, "Age: {} | Gender: {}", patient.age, patient.gender);
    let _ = writeln!(report, "Condition: {}", patient.conditions.join());
    if let Some(biomarkers) = &patient.biomarkers {
        if !biomarkers.is_empty() {
            let _ = writeln!(report, "Biomarkers: {}", biomarkers.render());
        }
    }
    let _ = writeln!(report);
    let _ = writeln!(report, "TRIALS ANALYZED: {}", results.len());
    let _ = writeln!(report);

    for status in EligibilityStatus::ALL {
        let section: Vec<&MatchResult> =
            results.iter().filter(|r| r.eligibility_status == status).collect();
        if section.is_empty() {
            continue;
        }

        let _ = writeln!(report, "{}", "-".repeat(70));
        let _ = writeln!(report, "{} ({})", section_heading(status), section.len());
        let _ = writeln!(report, "{}", "-".repeat(70));

        for result in section {
            write_result(&mut report, result);
        }
    }

    let _ = writeln!(report, "{}", "=".repeat(70));
    let _ = writeln!(report, "SUMMARY");
    let _ = writeln!(report, "{}", "=".repeat(70));
    for status in EligibilityStatus::ALL {
        let count = results.iter().filter(|r| r.eligibility_status == status).count();
        let _ = writeln!(report, "{}: {} trials", summary_label(status), count);
    }
    let _ = writeln!(report);
    let _ = writeln!(report, "NEXT STEPS:");
    let _ = writeln!(report, "1. Review this report with your oncologist");
    let _ = writeln!(report, "2. Contact trial coordinators for eligible trials");
    let _ = writeln!(report, "3. Prepare questions listed for each trial");
    let _ = writeln!(report, "4. Verify trial status on clinicaltrials.gov");

    report
}

fn write_result(report: &mut String, result: &MatchResult) {
    let title = crate::model::truncate_chars(&result.title, REPORT_TITLE_MAX_CHARS);

    let _ = writeln!(report);
    let _ = writeln!(report, "  {} ({})", title, result.nct_id);
    let _ = writeln!(
        report,
        "  Similarity: {:.1}%",
        result.similarity_score * 100.0
    );

    write_bullets(report, "Why this matches", &result.match_reasons, REPORT_MAX_REASONS);
    write_bullets(report, "Concerns", &result.concerns, REPORT_MAX_CONCERNS);

    if !result.explanation.is_empty() {
        let _ = writeln!(report, "  Summary: {}", result.explanation);
    }
}

fn write_bullets(report: &mut String, label: &str, items: &[String], max: usize) {
    if items.is_empty() {
        return;
    }
    let _ = writeln!(report, "  {}:", label);
    for item in items.iter().take(max) {
        let _ = writeln!(report, "    - {}", item);
    }
}

fn section_heading(status: EligibilityStatus) -> &'static str {
    match status {
        EligibilityStatus::Eligible => "ELIGIBLE TRIALS",
        EligibilityStatus::LikelyEligible => "LIKELY ELIGIBLE TRIALS",
        EligibilityStatus::NeedsReview => "TRIALS NEEDING REVIEW",
        EligibilityStatus::NotEligible => "NOT ELIGIBLE TRIALS",
    }
}

fn summary_label(status: EligibilityStatus) -> &'static str {
    match status {
        EligibilityStatus::Eligible => "Eligible",
        EligibilityStatus::LikelyEligible => "Likely Eligible",
        EligibilityStatus::NeedsReview => "Needs Review",
        EligibilityStatus::NotEligible => "Not Eligible",
    }
}
