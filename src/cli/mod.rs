//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "trialmatch",
    version,
    about = "Semantic clinical trial matching with AI-assisted eligibility analysis",
    long_about = "Trialmatch embeds clinical trial descriptions into a persistent vector index, \
                  retrieves the trials semantically closest to a patient profile, and runs an \
                  LLM eligibility assessment over each candidate to produce a patient-facing \
                  matching report."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/trialmatch/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Embed a trial corpus and (re)build the vector index
    Index {
        /// Path to a JSON file holding an array of trial records
        trials: PathBuf,
    },

    /// Match a patient profile against the indexed trials
    Match {
        /// Path to a JSON file holding the patient profile
        patient: PathBuf,

        /// Number of candidate trials to retrieve
        #[arg(short = 'n', long)]
        top: Option<usize>,

        /// Minimum similarity score; candidates below it are skipped
        #[arg(long)]
        min_similarity: Option<f32>,

        /// Write the text report to a file instead of stdout
        #[arg(short, long)]
        report: Option<PathBuf>,

        /// Emit results as JSON instead of the text report
        #[arg(long)]
        json: bool,
    },

    /// Show index and configuration status
    Status,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
