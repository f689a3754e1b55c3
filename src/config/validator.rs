use crate::config::Config;
use crate::error::{Result, TrialMatchError, ValidationError};

/// Configuration validator
///
/// Collects every violation before failing so a broken file is fixed in one
/// pass. A missing API credential is deliberately not a validation error:
/// the reasoner falls back to demo mode instead.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_storage(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_indexing(config, &mut errors);
        Self::validate_llm(config, &mut errors);
        Self::validate_matching(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(TrialMatchError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_storage(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.storage.data_dir.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.data_dir",
                "Data directory path cannot be empty",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }

        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }
    }

    fn validate_indexing(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.indexing.vector_dim == 0 {
            errors.push(ValidationError::new(
                "indexing.vector_dim",
                "Vector dimension must be greater than 0",
            ));
        }

        if config.indexing.hnsw_ef_construction == 0 {
            errors.push(ValidationError::new(
                "indexing.hnsw_ef_construction",
                "HNSW ef_construction must be greater than 0",
            ));
        }

        if config.indexing.hnsw_m == 0 {
            errors.push(ValidationError::new(
                "indexing.hnsw_m",
                "HNSW M must be greater than 0",
            ));
        }

        if config.indexing.hnsw_ef_search == 0 {
            errors.push(ValidationError::new(
                "indexing.hnsw_ef_search",
                "HNSW ef_search must be greater than 0",
            ));
        }
    }

    fn validate_llm(config: &Config, errors: &mut Vec<ValidationError>) {
        let temp = config.llm.temperature;
        if !(0.0..=2.0).contains(&temp) {
            errors.push(ValidationError::new(
                "llm.temperature",
                format!("Temperature must be between 0.0 and 2.0, got {}", temp),
            ));
        }

        let provider = &config.llm.provider;
        let valid_providers = ["groq", "openai"];
        if !valid_providers.contains(&provider.as_str()) {
            errors.push(ValidationError::new(
                "llm.provider",
                format!(
                    "Provider must be one of {:?}, got '{}'",
                    valid_providers, provider
                ),
            ));
        }

        if config.llm.api_url.is_empty() {
            errors.push(ValidationError::new("llm.api_url", "API URL cannot be empty"));
        }

        if config.llm.api_key_env.is_empty() {
            errors.push(ValidationError::new(
                "llm.api_key_env",
                "API key environment variable name cannot be empty",
            ));
        }

        if config.llm.max_tokens == 0 {
            errors.push(ValidationError::new(
                "llm.max_tokens",
                "max_tokens must be greater than 0",
            ));
        }
    }

    fn validate_matching(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.matching.top_k == 0 {
            errors.push(ValidationError::new(
                "matching.top_k",
                "top_k must be greater than 0",
            ));
        }

        let floor = config.matching.min_similarity;
        if !(-1.0..=1.0).contains(&floor) {
            errors.push(ValidationError::new(
                "matching.min_similarity",
                format!("min_similarity must be within [-1.0, 1.0], got {}", floor),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config() {
        let config = Config::default();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_invalid_temperature() {
        let mut config = Config::default();
        config.llm.temperature = 3.5;
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_invalid_provider() {
        let mut config = Config::default();
        config.llm.provider = "carrier-pigeon".to_string();
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_zero_batch_size() {
        let mut config = Config::default();
        config.embedding.batch_size = 0;
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_similarity_floor_out_of_range() {
        let mut config = Config::default();
        config.matching.min_similarity = -2.0;
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_missing_api_key_is_not_an_error() {
        // Demo mode handles absent credentials; validation must pass.
        let mut config = Config::default();
        config.llm.api_key_env = "TRIALMATCH_TEST_KEY_THAT_IS_NOT_SET".to_string();
        assert!(ConfigValidator::validate(&config).is_ok());
    }
}
