use crate::config::types::{Config, ExtractorConfig, OutputConfig, PipelineConfig, UserAgentConfig};
use crate::ConfigError;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_pipeline_config(&config.pipeline)?;
    validate_extractor_config(&config.extractor)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates pipeline configuration
fn validate_pipeline_config(config: &PipelineConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_requests < 1 || config.max_concurrent_requests > 100 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_requests must be between 1 and 100, got {}",
            config.max_concurrent_requests
        )));
    }

    if config.max_retries < 1 {
        return Err(ConfigError::Validation(format!(
            "max_retries must be >= 1, got {}",
            config.max_retries
        )));
    }

    if config.timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "timeout_ms must be >= 100ms, got {}ms",
            config.timeout_ms
        )));
    }

    if config.max_redirects > 20 {
        return Err(ConfigError::Validation(format!(
            "max_redirects must be <= 20, got {}",
            config.max_redirects
        )));
    }

    Ok(())
}

/// Validates extractor configuration
fn validate_extractor_config(config: &ExtractorConfig) -> Result<(), ConfigError> {
    validate_identifier(config.bare_global_name())?;

    if config.heuristic_candidates < 1 {
        return Err(ConfigError::Validation(
            "heuristic_candidates must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if let Some(custom) = &config.custom {
        if custom.trim().is_empty() {
            return Err(ConfigError::Validation(
                "custom user agent cannot be empty".to_string(),
            ));
        }
    }
    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Validates a JavaScript identifier (the global the state is assigned to)
fn validate_identifier(name: &str) -> Result<(), ConfigError> {
    let mut chars = name.chars();

    let Some(first) = chars.next() else {
        return Err(ConfigError::Validation(
            "global_name cannot be empty".to_string(),
        ));
    };

    if !(first.is_ascii_alphabetic() || first == '_' || first == '$') {
        return Err(ConfigError::Validation(format!(
            "global_name must start with a letter, '_' or '$', got '{}'",
            name
        )));
    }

    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$') {
        return Err(ConfigError::Validation(format!(
            "global_name must be a plain identifier, got '{}'",
            name
        )));
    }

    Ok(())
}
