//! LLM-backed eligibility assessment
//!
//! One chat-completion request per candidate trial, expecting a strict
//! five-key JSON object. Every failure mode converges on a valid Verdict:
//! malformed JSON recovers through brace extraction, missing keys are
//! defaulted, transport errors yield a fallback verdict, and an absent
//! credential skips the network entirely (demo mode). `assess` never fails
//! past this boundary.

use anyhow::{anyhow, Context};
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::OnceLock;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::model::{truncate_chars, EligibilityStatus, MatchCandidate, PatientProfile, Verdict};

/// Bounded lengths for prompt fields and diagnostics
const ELIGIBILITY_TEXT_MAX_CHARS: usize = 1000;
const LOCATIONS_MAX_CHARS: usize = 500;
const RAW_EXPLANATION_MAX_CHARS: usize = 200;
const ERROR_TEXT_MAX_CHARS: usize = 100;

const SYSTEM_INSTRUCTION: &str = "You are a medical expert who helps patients understand \
     clinical trial eligibility. Always respond in valid JSON format.";

/// Eligibility reasoner boundary.
///
/// Implementations must be total: any input, including a failing reasoning
/// service, produces a fully populated Verdict.
pub trait EligibilityReasoner: Send + Sync {
    fn assess(&self, patient: &PatientProfile, candidate: &MatchCandidate) -> Verdict;
}

impl<T: EligibilityReasoner + ?Sized> EligibilityReasoner for std::sync::Arc<T> {
    fn assess(&self, patient: &PatientProfile, candidate: &MatchCandidate) -> Verdict {
        (**self).assess(patient, candidate)
    }
}

struct LiveClient {
    http: reqwest::blocking::Client,
    api_key: String,
}

/// Reasoner over an OpenAI-compatible chat-completions endpoint (Groq by
/// default). Constructed once; a missing credential selects demo mode for
/// the lifetime of the process.
pub struct GroqReasoner {
    client: Option<LiveClient>,
    api_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    request_delay: Duration,
}

impl GroqReasoner {
    /// Build from configuration. `llm.enabled = false` or an unset/empty
    /// credential environment variable selects demo mode.
    pub fn from_config(config: &LlmConfig) -> Self {
        let client = if !config.enabled {
            tracing::info!("LLM analysis disabled in configuration, running in demo mode");
            None
        } else {
            match std::env::var(&config.api_key_env) {
                Ok(key) if !key.trim().is_empty() => {
                    let http = reqwest::blocking::Client::builder()
                        .timeout(Duration::from_secs(30))
                        .build();
                    match http {
                        Ok(http) => {
                            tracing::info!("Reasoning client initialized ({})", config.model);
                            Some(LiveClient { http, api_key: key })
                        }
                        Err(e) => {
                            tracing::warn!(
                                "Failed to build HTTP client ({}), running in demo mode",
                                e
                            );
                            None
                        }
                    }
                }
                _ => {
                    tracing::warn!(
                        "No API key found in {}, running in demo mode without LLM explanations",
                        config.api_key_env
                    );
                    None
                }
            }
        };

        Self {
            client,
            api_url: config.api_url.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            request_delay: Duration::from_millis(config.request_delay_ms),
        }
    }

    /// Whether live reasoning calls will be made
    pub fn is_live(&self) -> bool {
        self.client.is_some()
    }

    fn call(&self, client: &LiveClient, prompt: &str) -> anyhow::Result<String> {
        let payload = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_INSTRUCTION },
                { "role": "user", "content": prompt },
            ],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        let response: ChatResponse = client
            .http
            .post(&self.api_url)
            .bearer_auth(&client.api_key)
            .json(&payload)
            .send()
            .context("reasoning request failed")?
            .error_for_status()
            .context("reasoning service returned an error")?
            .json()
            .context("failed to decode reasoning response")?;

        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("missing text in reasoning response"))
    }
}

impl EligibilityReasoner for GroqReasoner {
    fn assess(&self, patient: &PatientProfile, candidate: &MatchCandidate) -> Verdict {
        let Some(client) = &self.client else {
            return demo_verdict();
        };

        // Fixed inter-call delay toward the external quota; throttling, not
        // backoff, and applied only on the live path
        if !self.request_delay.is_zero() {
            std::thread::sleep(self.request_delay);
        }

        let prompt = render_prompt(patient, candidate);

        match self.call(client, &prompt) {
            Ok(text) => parse_verdict(&text),
            Err(e) => {
                tracing::warn!("LLM analysis error for {}: {:#}", candidate.nct_id, e);
                call_failure_verdict(&format!("{:#}", e))
            }
        }
    }
}

/// Render the fixed-structure analysis prompt.
///
/// The candidate's document text stands in for full eligibility criteria;
/// it already embeds the trial's age range and gender restriction.
fn render_prompt(patient: &PatientProfile, candidate: &MatchCandidate) -> String {
    let biomarkers = patient
        .biomarkers
        .as_ref()
        .map(|b| b.render())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "Not specified".to_string());

    let list_or = |list: &crate::model::TextList, fallback: &str| {
        if list.is_empty() {
            fallback.to_string()
        } else {
            list.join()
        }
    };

    format!(
        "You are a clinical trial matching expert. Analyze if this patient is eligible for the trial.\n\
         \n\
         PATIENT PROFILE:\n\
         - Age: {age} years old\n\
         - Gender: {gender}\n\
         - Primary Condition: {conditions}\n\
         - Current Medications: {medications}\n\
         - Previous Treatments: {treatments}\n\
         - Biomarkers: {biomarkers}\n\
         - Performance Status: {performance}\n\
         - Location: {city}, {state}\n\
         - Willing to Travel: {travel}\n\
         \n\
         CLINICAL TRIAL:\n\
         - Title: {title}\n\
         - NCT ID: {nct_id}\n\
         - Conditions Studied: {trial_conditions}\n\
         - Phase: {phase}\n\
         - Eligibility Criteria: {eligibility}\n\
         - Locations: {locations}\n\
         \n\
         TASK:\n\
         1. Determine eligibility status: ELIGIBLE, LIKELY_ELIGIBLE, NOT_ELIGIBLE, or NEEDS_REVIEW\n\
         2. List specific reasons why the patient matches or doesn't match\n\
         3. Identify any concerns or missing information\n\
         4. Suggest questions the patient should ask their doctor\n\
         5. Provide a brief, clear explanation in simple language\n\
         \n\
         Respond in JSON format:\n\
         {{\n\
             \"eligibility_status\": \"ELIGIBLE/LIKELY_ELIGIBLE/NOT_ELIGIBLE/NEEDS_REVIEW\",\n\
             \"match_reasons\": [\"reason1\", \"reason2\"],\n\
             \"concerns\": [\"concern1\", \"concern2\"],\n\
             \"questions_for_doctor\": [\"question1\", \"question2\"],\n\
             \"explanation\": \"Simple language explanation for the patient\"\n\
         }}\n\
         NO Preamble.\n",
        age = patient.age,
        gender = if patient.gender.is_empty() {
            "Not specified"
        } else {
            patient.gender.as_str()
        },
        conditions = list_or(&patient.conditions, "Not specified"),
        medications = list_or(&patient.medications, "None listed"),
        treatments = list_or(&patient.previous_treatments, "None listed"),
        biomarkers = biomarkers,
        performance = if patient.performance_status.is_empty() {
            "Not specified"
        } else {
            patient.performance_status.as_str()
        },
        city = patient.location_city,
        state = patient.location_state,
        travel = patient.willing_to_travel,
        title = candidate.title,
        nct_id = candidate.nct_id,
        trial_conditions = candidate.conditions,
        phase = candidate.phase,
        eligibility = truncate_chars(&candidate.document, ELIGIBILITY_TEXT_MAX_CHARS),
        locations = truncate_chars(&candidate.locations, LOCATIONS_MAX_CHARS),
    )
}

/// Parse the reasoning response into a Verdict.
///
/// Direct JSON decoding first; on failure, the first brace-delimited object
/// in the text is extracted and decoded. Missing keys are defaulted. Total
/// failure yields the parse-failure verdict carrying the raw text.
fn parse_verdict(text: &str) -> Verdict {
    match decode_json_object(text) {
        Some(value) => verdict_from_value(&value),
        None => {
            tracing::warn!("Could not parse LLM response as JSON");
            parse_failure_verdict(text)
        }
    }
}

fn decode_json_object(text: &str) -> Option<Value> {
    static OBJECT_RE: OnceLock<Regex> = OnceLock::new();

    let direct: Option<Value> = serde_json::from_str(text).ok();
    let value = direct.or_else(|| {
        // Reasoning models sometimes wrap the object in prose despite the
        // no-preamble instruction
        let re = OBJECT_RE.get_or_init(|| Regex::new(r"(?s)\{.*\}").unwrap());
        re.find(text)
            .and_then(|m| serde_json::from_str(m.as_str()).ok())
    })?;

    value.is_object().then_some(value)
}

fn verdict_from_value(value: &Value) -> Verdict {
    let status = value
        .get("eligibility_status")
        .and_then(Value::as_str)
        .map(EligibilityStatus::from_label)
        .unwrap_or(EligibilityStatus::NeedsReview);

    Verdict {
        status,
        match_reasons: string_list(value.get("match_reasons")),
        concerns: string_list(value.get("concerns")),
        questions_for_doctor: string_list(value.get("questions_for_doctor")),
        // The upstream default here was the status sentinel string; a
        // readable message replaces it (status defaulting is unchanged)
        explanation: value
            .get("explanation")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| {
                "The analysis did not include an explanation. Please review the eligibility \
                 details with your doctor."
                    .to_string()
            }),
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}

fn parse_failure_verdict(raw_text: &str) -> Verdict {
    let explanation = if raw_text.trim().is_empty() {
        "Analysis unavailable".to_string()
    } else {
        truncate_chars(raw_text, RAW_EXPLANATION_MAX_CHARS)
    };

    Verdict {
        status: EligibilityStatus::NeedsReview,
        match_reasons: vec!["Analysis completed but format unclear".to_string()],
        concerns: vec!["Response parsing issue".to_string()],
        questions_for_doctor: vec![
            "Please review the full trial details with your doctor".to_string()
        ],
        explanation,
    }
}

fn call_failure_verdict(error_text: &str) -> Verdict {
    Verdict {
        status: EligibilityStatus::NeedsReview,
        match_reasons: vec!["Automated analysis unavailable".to_string()],
        concerns: vec![format!(
            "Technical issue: {}",
            truncate_chars(error_text, ERROR_TEXT_MAX_CHARS)
        )],
        questions_for_doctor: vec![
            "Please review this trial with your healthcare provider".to_string()
        ],
        explanation: "Unable to complete automated analysis. Please consult your doctor."
            .to_string(),
    }
}

/// The fixed verdict returned when no reasoning service is configured
fn demo_verdict() -> Verdict {
    Verdict {
        status: EligibilityStatus::NeedsReview,
        match_reasons: vec!["Semantic similarity detected".to_string()],
        concerns: vec!["LLM analysis not available in demo mode".to_string()],
        questions_for_doctor: vec!["Please review this trial with your doctor".to_string()],
        explanation: "This trial appears relevant based on semantic matching. Automated \
                      analysis is unavailable; please consult your healthcare provider for a \
                      detailed eligibility assessment."
            .to_string(),
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}
