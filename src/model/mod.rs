//! Data model for trials, patients, and match results
//!
//! External collaborators (the registry fetcher, the synthetic-patient
//! generator, user-entry forms) supply JSON-shaped records. Everything here
//! is an explicit serde type with documented defaults so that boundary data
//! is validated once, on entry, instead of being passed around as loose maps.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A clinical trial record as flattened from the registry API.
///
/// Immutable once indexed; reindexing replaces the entire collection rather
/// than patching individual entries. Every field except `nct_id` is optional
/// in the input and defaults when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialRecord {
    /// Registry identifier (e.g. "NCT01234567"), unique per trial
    pub nct_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub summary: String,
    /// Conditions studied, flattened to a display string
    #[serde(default)]
    pub conditions: String,
    /// Recruitment status (e.g. "RECRUITING")
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub phase: String,
    #[serde(default)]
    pub study_type: String,
    #[serde(default)]
    pub eligibility_criteria: String,
    /// Unit-qualified minimum age (e.g. "18 Years"), absent when unrestricted
    #[serde(default)]
    pub min_age: Option<String>,
    /// Unit-qualified maximum age, absent when unrestricted
    #[serde(default)]
    pub max_age: Option<String>,
    #[serde(default)]
    pub gender: String,
    /// Site locations flattened to a display string
    #[serde(default)]
    pub locations: String,
    #[serde(default)]
    pub enrollment: u64,
}

/// A patient profile from the generator or direct user input.
///
/// Read-only input to the pipeline; never persisted by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientProfile {
    #[serde(default)]
    pub patient_id: String,
    pub age: u32,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub conditions: TextList,
    #[serde(default)]
    pub medications: TextList,
    #[serde(default)]
    pub allergies: TextList,
    #[serde(default)]
    pub previous_treatments: TextList,
    #[serde(default)]
    pub location_city: String,
    #[serde(default)]
    pub location_state: String,
    #[serde(default)]
    pub location_country: String,
    #[serde(default)]
    pub willing_to_travel: bool,
    #[serde(default)]
    pub diagnosis_date: String,
    #[serde(default)]
    pub stage: Option<String>,
    /// Biomarkers arrive either pre-formatted ("PD-L1: 60%") or as a
    /// name-to-value map; both forms must be accepted
    #[serde(default)]
    pub biomarkers: Option<Biomarkers>,
    #[serde(default)]
    pub comorbidities: TextList,
    /// Performance-status code (e.g. ECOG score)
    #[serde(default)]
    pub performance_status: String,
    #[serde(default)]
    pub notes: String,
}

/// A field that user-entry forms supply as free text and the generator
/// supplies as a list of strings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TextList {
    One(String),
    Many(Vec<String>),
}

impl TextList {
    /// Render as a single comma-separated display string
    pub fn join(&self) -> String {
        match self {
            TextList::One(s) => s.trim().to_string(),
            TextList::Many(items) => items
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            TextList::One(s) => s.trim().is_empty(),
            TextList::Many(items) => items.iter().all(|s| s.trim().is_empty()),
        }
    }
}

impl Default for TextList {
    fn default() -> Self {
        TextList::Many(Vec::new())
    }
}

impl From<&str> for TextList {
    fn from(s: &str) -> Self {
        TextList::One(s.to_string())
    }
}

impl From<Vec<String>> for TextList {
    fn from(items: Vec<String>) -> Self {
        TextList::Many(items)
    }
}

/// Biomarker input: either a pre-formatted string or a name-to-value map.
///
/// The map form uses a BTreeMap so rendered query text is deterministic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Biomarkers {
    Text(String),
    Map(BTreeMap<String, String>),
}

impl Biomarkers {
    /// Render for query text and prompts: the string form verbatim, the map
    /// form as "key: value" pairs joined by commas
    pub fn render(&self) -> String {
        match self {
            Biomarkers::Text(s) => s.trim().to_string(),
            Biomarkers::Map(map) => map
                .iter()
                .map(|(k, v)| format!("{}: {}", k, v))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Biomarkers::Text(s) => s.trim().is_empty(),
            Biomarkers::Map(map) => map.is_empty(),
        }
    }
}

/// Coarse eligibility verdict from the reasoning service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EligibilityStatus {
    #[serde(rename = "ELIGIBLE")]
    Eligible,
    #[serde(rename = "LIKELY_ELIGIBLE")]
    LikelyEligible,
    #[serde(rename = "NOT_ELIGIBLE")]
    NotEligible,
    #[serde(rename = "NEEDS_REVIEW")]
    NeedsReview,
}

impl EligibilityStatus {
    /// Report presentation order: most to least actionable for the patient
    pub const ALL: [EligibilityStatus; 4] = [
        EligibilityStatus::Eligible,
        EligibilityStatus::LikelyEligible,
        EligibilityStatus::NeedsReview,
        EligibilityStatus::NotEligible,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EligibilityStatus::Eligible => "ELIGIBLE",
            EligibilityStatus::LikelyEligible => "LIKELY_ELIGIBLE",
            EligibilityStatus::NotEligible => "NOT_ELIGIBLE",
            EligibilityStatus::NeedsReview => "NEEDS_REVIEW",
        }
    }

    /// Parse a status label; unknown or malformed labels map to NEEDS_REVIEW
    /// so a sloppy reasoning response can never produce an invalid status
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_uppercase().as_str() {
            "ELIGIBLE" => EligibilityStatus::Eligible,
            "LIKELY_ELIGIBLE" => EligibilityStatus::LikelyEligible,
            "NOT_ELIGIBLE" => EligibilityStatus::NotEligible,
            _ => EligibilityStatus::NeedsReview,
        }
    }
}

impl fmt::Display for EligibilityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured verdict from the eligibility reasoner.
///
/// Always fully populated: missing keys in the reasoning response are
/// defaulted, and call failures are converted into fallback verdicts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub status: EligibilityStatus,
    pub match_reasons: Vec<String>,
    pub concerns: Vec<String>,
    pub questions_for_doctor: Vec<String>,
    pub explanation: String,
}

/// Bounded-length display metadata stored alongside each indexed trial.
///
/// Values are truncated copies of trial fields; full text lives in the
/// document field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialMetadata {
    pub nct_id: String,
    pub title: String,
    pub conditions: String,
    pub status: String,
    pub phase: String,
    pub min_age: String,
    pub max_age: String,
    pub gender: String,
    pub locations: String,
}

/// One entry of the trial collection: the retrieval document plus display
/// metadata, keyed by the registry identifier
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub nct_id: String,
    pub document: String,
    pub metadata: TrialMetadata,
}

/// A retrieved trial candidate with its similarity score.
///
/// `similarity_score` is `1 - distance` and is not bounded to [0, 1];
/// negative values are possible and must be tolerated. The document field
/// carries the full retrieval text and substitutes for fetching eligibility
/// criteria from a separate store.
#[derive(Debug, Clone, Serialize)]
pub struct MatchCandidate {
    pub nct_id: String,
    pub similarity_score: f32,
    pub title: String,
    pub conditions: String,
    pub phase: String,
    pub locations: String,
    pub document: String,
}

/// Final per-trial result: retrieval fields combined with the verdict
#[derive(Debug, Clone, Serialize)]
pub struct MatchResult {
    pub nct_id: String,
    pub title: String,
    pub similarity_score: f32,
    pub eligibility_status: EligibilityStatus,
    pub match_reasons: Vec<String>,
    pub concerns: Vec<String>,
    pub questions_for_doctor: Vec<String>,
    pub explanation: String,
}

impl MatchResult {
    pub fn from_parts(candidate: &MatchCandidate, verdict: Verdict) -> Self {
        Self {
            nct_id: candidate.nct_id.clone(),
            title: candidate.title.clone(),
            similarity_score: candidate.similarity_score,
            eligibility_status: verdict.status,
            match_reasons: verdict.match_reasons,
            concerns: verdict.concerns,
            questions_for_doctor: verdict.questions_for_doctor,
            explanation: verdict.explanation,
        }
    }
}

/// Truncate a string to at most `max_chars` characters, respecting UTF-8
/// boundaries
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}
