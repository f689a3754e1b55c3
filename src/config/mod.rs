//! Configuration management for trialmatch
//!
//! Handles loading, validation, and defaults for the matching pipeline.
//! Configuration lives in a TOML file; individual values can be overridden
//! through `TRIALMATCH_SECTION__KEY` environment variables.

use crate::error::{Result, TrialMatchError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub indexing: IndexingConfig,
    pub llm: LlmConfig,
    pub matching: MatchingConfig,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the persistent trial index
    pub data_dir: PathBuf,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model: String,
    /// Entries per insert batch during reindexing (bounds memory and
    /// request size)
    pub batch_size: usize,
}

/// Vector index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    pub vector_dim: usize,
    pub hnsw_ef_construction: usize,
    pub hnsw_m: usize,
    pub hnsw_ef_search: usize,
}

/// Reasoning-service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub enabled: bool,
    pub provider: String,
    /// Environment variable holding the API credential; absent or empty
    /// selects demo mode rather than failing
    pub api_key_env: String,
    pub api_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Fixed inter-call delay applied before each live call (throttling for
    /// external quotas, not backoff)
    pub request_delay_ms: u64,
}

/// Matching defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Trials retrieved per patient query
    pub top_k: usize,
    /// Hard similarity floor; candidates below it are never assessed
    pub min_similarity: f32,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(TrialMatchError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| TrialMatchError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| TrialMatchError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: TRIALMATCH_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("TRIALMATCH_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "LLM__ENABLED" => {
                self.llm.enabled =
                    value
                        .parse()
                        .map_err(|_| TrialMatchError::InvalidConfigValue {
                            path: path.to_string(),
                            message: format!("Cannot parse '{}' as boolean", value),
                        })?;
            }
            "LLM__MODEL" => {
                self.llm.model = value.to_string();
            }
            "LLM__API_URL" => {
                self.llm.api_url = value.to_string();
            }
            "EMBEDDING__MODEL" => {
                self.embedding.model = value.to_string();
            }
            "MATCHING__MIN_SIMILARITY" => {
                self.matching.min_similarity =
                    value
                        .parse()
                        .map_err(|_| TrialMatchError::InvalidConfigValue {
                            path: path.to_string(),
                            message: format!("Cannot parse '{}' as float", value),
                        })?;
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            TrialMatchError::Config("Cannot determine config directory".to_string())
        })?;

        Ok(config_dir.join("trialmatch").join("config.toml"))
    }

    /// Get the default data directory
    pub fn default_data_dir() -> Result<PathBuf> {
        let home_dir = dirs::home_dir()
            .ok_or_else(|| TrialMatchError::Config("Cannot determine home directory".to_string()))?;

        Ok(home_dir.join(".trialmatch"))
    }

    /// Path of the sqlite trial store inside the data directory, with a
    /// leading `~/` expanded against the user's home directory
    pub fn store_path(&self) -> PathBuf {
        expand_home(&self.storage.data_dir).join("trials.db")
    }
}

fn expand_home(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    path.to_path_buf()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            storage: StorageConfig {
                data_dir: PathBuf::from("~/.trialmatch"),
            },
            embedding: EmbeddingConfig {
                model: "all-MiniLM-L6-v2".to_string(),
                batch_size: 32,
            },
            indexing: IndexingConfig {
                vector_dim: 384,
                hnsw_ef_construction: 200,
                hnsw_m: 16,
                hnsw_ef_search: 64,
            },
            llm: LlmConfig {
                enabled: true,
                provider: "groq".to_string(),
                api_key_env: "GROQ_API_KEY".to_string(),
                api_url: "https://api.groq.com/openai/v1/chat/completions".to_string(),
                model: "llama-3.3-70b-versatile".to_string(),
                temperature: 0.3,
                max_tokens: 500,
                request_delay_ms: 500,
            },
            matching: MatchingConfig {
                top_k: 5,
                min_similarity: -0.5,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_roundtrip() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.embedding.model, config.embedding.model);
        assert_eq!(parsed.llm.api_key_env, "GROQ_API_KEY");
        assert_eq!(parsed.matching.top_k, 5);
    }

    #[test]
    fn test_store_path() {
        let mut config = Config::default();
        config.storage.data_dir = PathBuf::from("/tmp/tm");
        assert_eq!(config.store_path(), PathBuf::from("/tmp/tm/trials.db"));
    }

    #[test]
    fn test_store_path_expands_home() {
        let config = Config::default();
        if let Some(home) = dirs::home_dir() {
            assert_eq!(config.store_path(), home.join(".trialmatch/trials.db"));
        }
    }

    // Environment variables are process-global, so every override case lives
    // in this one test
    #[test]
    fn test_env_overrides() {
        std::env::set_var("TRIALMATCH_LLM__ENABLED", "false");
        std::env::set_var("TRIALMATCH_MATCHING__MIN_SIMILARITY", "0.25");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert!(!config.llm.enabled);
        assert_eq!(config.matching.min_similarity, 0.25);

        // An unparsable value is warned and skipped, never fatal
        std::env::set_var("TRIALMATCH_MATCHING__MIN_SIMILARITY", "not-a-float");
        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(
            config.matching.min_similarity,
            Config::default().matching.min_similarity
        );

        // Unknown keys are ignored
        std::env::set_var("TRIALMATCH_NO_SUCH__KEY", "1");
        let mut config = Config::default();
        config.apply_env_overrides();
        assert!(!config.llm.enabled);

        std::env::remove_var("TRIALMATCH_LLM__ENABLED");
        std::env::remove_var("TRIALMATCH_MATCHING__MIN_SIMILARITY");
        std::env::remove_var("TRIALMATCH_NO_SUCH__KEY");
    }
}
