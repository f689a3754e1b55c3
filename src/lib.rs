//! Trialmatch - Clinical Trial Matching Pipeline
//!
//! Matches patient medical profiles against clinical-trial records using
//! semantic retrieval over a persistent vector index, followed by an
//! LLM-backed eligibility assessment that produces structured, explainable
//! verdicts. A missing API credential switches the assessment into a fixed
//! demo mode; a human clinician must verify every verdict either way.

pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod index;
pub mod matching;
pub mod model;
pub mod pipeline;
pub mod reasoner;

pub use error::{Result, TrialMatchError};
