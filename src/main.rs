use std::path::{Path, PathBuf};
use std::sync::Arc;

use trialmatch::cli::{Cli, Commands, ConfigAction};
use trialmatch::config::Config;
use trialmatch::embedding::FastEmbedProvider;
use trialmatch::error::{Result, TrialMatchError};
use trialmatch::matching::{generate_report, TrialMatcher};
use trialmatch::model::{MatchResult, PatientProfile, TrialRecord};
use trialmatch::pipeline::EmbeddingPipeline;
use trialmatch::reasoner::GroqReasoner;

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Index { trials } => {
            cmd_index(cli.config, &trials)?;
        }
        Commands::Match {
            patient,
            top,
            min_similarity,
            report,
            json,
        } => {
            cmd_match(cli.config, &patient, top, min_similarity, report, json)?;
        }
        Commands::Status => {
            cmd_status(cli.config)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_filter = if verbose {
        "trialmatch=debug"
    } else {
        "trialmatch=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    fmt().with_env_filter(filter).with_target(false).init();
}

fn cmd_index(config_path: Option<PathBuf>, trials_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;

    let trials: Vec<TrialRecord> = read_json_file(trials_path, "trial corpus")?;
    if trials.is_empty() {
        println!("No trials found in {}", trials_path.display());
        return Ok(());
    }

    tracing::info!("Indexing {} trials", trials.len());

    let matcher = build_matcher(&config)?;
    let indexed = matcher.reindex(&trials)?;

    println!("✓ Indexed {} trials", indexed);
    println!("  Store: {}", config.store_path().display());
    Ok(())
}

fn cmd_match(
    config_path: Option<PathBuf>,
    patient_path: &Path,
    top: Option<usize>,
    min_similarity: Option<f32>,
    report_path: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let config = load_config(config_path)?;

    let patient: PatientProfile = read_json_file(patient_path, "patient profile")?;
    let n_trials = top.unwrap_or(config.matching.top_k);
    let floor = min_similarity.unwrap_or(config.matching.min_similarity);

    let matcher = build_matcher(&config)?;
    if matcher.indexed_count()? == 0 {
        println!("The trial index is empty. Run 'trialmatch index <trials.json>' first.");
        return Ok(());
    }

    let results = matcher.match_patient(&patient, n_trials, floor)?;

    if json {
        print_results_json(&results)?;
        return Ok(());
    }

    let report = generate_report(&patient, &results);
    match report_path {
        Some(path) => {
            std::fs::write(&path, &report).map_err(|e| TrialMatchError::Io {
                source: e,
                context: format!("Failed to write report: {:?}", path),
            })?;
            println!("✓ Report written to {}", path.display());
        }
        None => println!("{}", report),
    }
    Ok(())
}

fn cmd_status(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;

    println!("Trialmatch status");
    println!("  Embedding model: {}", config.embedding.model);
    println!("  Vector dimension: {}", config.indexing.vector_dim);
    println!("  Store: {}", config.store_path().display());

    let reasoner = GroqReasoner::from_config(&config.llm);
    let mode = if reasoner.is_live() {
        format!("live ({})", config.llm.model)
    } else {
        "demo (no credential)".to_string()
    };
    println!("  Reasoning: {}", mode);

    let db = config.store_path();
    if db.exists() {
        let matcher = build_matcher(&config)?;
        println!("  Indexed trials: {}", matcher.indexed_count()?);
    } else {
        println!("  Indexed trials: 0 (no index yet)");
    }
    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            let json =
                serde_json::to_string_pretty(&config).map_err(|e| TrialMatchError::Json {
                    source: e,
                    context: "Failed to serialize config".to_string(),
                })?;
            println!("{}", json);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| TrialMatchError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            let config = Config::default();
            config.save(&path)?;

            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'trialmatch config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        return Ok(config);
    }

    Config::load(&path)
}

fn build_matcher(config: &Config) -> Result<TrialMatcher> {
    let provider = Arc::new(FastEmbedProvider::new(&config.embedding.model)?);
    let pipeline = EmbeddingPipeline::open(
        provider,
        &config.store_path(),
        &config.indexing,
        &config.embedding,
    )?;
    let reasoner = Box::new(GroqReasoner::from_config(&config.llm));
    Ok(TrialMatcher::new(pipeline, reasoner))
}

fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| TrialMatchError::Io {
        source: e,
        context: format!("Failed to read {} from {:?}", what, path),
    })?;
    serde_json::from_str(&content).map_err(|e| TrialMatchError::Json {
        source: e,
        context: format!("Failed to parse {} from {:?}", what, path),
    })
}

fn print_results_json(results: &[MatchResult]) -> Result<()> {
    let json = serde_json::to_string_pretty(results).map_err(|e| TrialMatchError::Json {
        source: e,
        context: "Failed to serialize match results".to_string(),
    })?;
    println!("{}", json);
    Ok(())
}
