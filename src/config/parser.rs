use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::str::FromStr;

pub const ENV_REQUEST_DELAY_MS: &str = "STATE_HARVEST_REQUEST_DELAY_MS";
pub const ENV_MAX_RETRIES: &str = "STATE_HARVEST_MAX_RETRIES";
pub const ENV_TIMEOUT_MS: &str = "STATE_HARVEST_TIMEOUT_MS";
pub const ENV_MAX_CONCURRENT_REQUESTS: &str = "STATE_HARVEST_MAX_CONCURRENT_REQUESTS";
pub const ENV_DATABASE_PATH: &str = "STATE_HARVEST_DATABASE_PATH";

/// Loads and parses a configuration file from the given path
///
/// Environment overrides are applied on top of the file before validation.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use state_harvest::config::load_config;
///
/// let config = load_config(Path::new("harvest.toml")).unwrap();
/// println!("Retry budget: {}", config.pipeline.max_retries);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content, |key| std::env::var(key).ok())
}

/// Builds a configuration from defaults plus environment overrides
///
/// Used when no configuration file is given.
pub fn default_config() -> Result<Config, ConfigError> {
    let mut config = Config::default();
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate(&config)?;
    Ok(config)
}

/// Parses TOML content, applies overrides from `lookup`, and validates
///
/// `lookup` resolves an environment variable name to its value.
pub fn parse_config<F>(content: &str, lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config: Config = toml::from_str(content)?;
    apply_env_overrides(&mut config, lookup)?;
    validate(&config)?;
    Ok(config)
}

/// Applies `STATE_HARVEST_*` overrides to a configuration
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = parse_override(&lookup, ENV_REQUEST_DELAY_MS)? {
        config.pipeline.request_delay_ms = value;
    }
    if let Some(value) = parse_override(&lookup, ENV_MAX_RETRIES)? {
        config.pipeline.max_retries = value;
    }
    if let Some(value) = parse_override(&lookup, ENV_TIMEOUT_MS)? {
        config.pipeline.timeout_ms = value;
    }
    if let Some(value) = parse_override(&lookup, ENV_MAX_CONCURRENT_REQUESTS)? {
        config.pipeline.max_concurrent_requests = value;
    }
    if let Some(path) = lookup(ENV_DATABASE_PATH) {
        tracing::debug!("Database path overridden by {}", ENV_DATABASE_PATH);
        config.output.database_path = path;
    }
    Ok(())
}

fn parse_override<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };

    let value = raw
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::EnvOverride {
            key: key.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        })?;

    tracing::debug!("{} overridden from environment", key);
    Ok(Some(value))
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Logged at startup so runs made with different settings can be told apart.
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_load_valid_config() {
        let config_content = r#"
[pipeline]
request-delay-ms = 250
max-retries = 4
timeout-ms = 5000
max-concurrent-requests = 2

[extractor]
global-name = "window.__INITIAL_STATE__"
evaluate-functions = false

[user-agent]
impersonate = true

[output]
database-path = "./test.db"
"#;

        let file = create_temp_config(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.pipeline.request_delay_ms, 250);
        assert_eq!(config.pipeline.max_retries, 4);
        assert_eq!(config.pipeline.max_concurrent_requests, 2);
        assert_eq!(config.pipeline.max_redirects, 5);
        assert_eq!(config.extractor.bare_global_name(), "__INITIAL_STATE__");
        assert!(!config.extractor.evaluate_functions);
        assert_eq!(config.extractor.heuristic_candidates, 3);
        assert!(config.user_agent.impersonate);
        assert_eq!(config.output.database_path, "./test.db");
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("", no_env).unwrap();

        assert_eq!(config.pipeline.request_delay_ms, 1000);
        assert_eq!(config.pipeline.max_retries, 3);
        assert_eq!(config.pipeline.timeout_ms, 10_000);
        assert_eq!(config.pipeline.max_concurrent_requests, 5);
        assert_eq!(config.extractor.global_name, "__NUXT__");
        assert!(config.extractor.evaluate_functions);
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/harvest.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let config_content = r#"
[pipeline]
max-concurrent-requests = 0
"#;
        let result = parse_config(config_content, no_env);
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }

    #[test]
    fn test_env_overrides_win_over_file() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_MAX_RETRIES, "7"),
            (ENV_REQUEST_DELAY_MS, " 20 "),
            (ENV_DATABASE_PATH, "/tmp/override.db"),
        ]);

        let config = parse_config(
            "[pipeline]\nmax-retries = 2\n",
            |key| env.get(key).map(|v| v.to_string()),
        )
        .unwrap();

        assert_eq!(config.pipeline.max_retries, 7);
        assert_eq!(config.pipeline.request_delay_ms, 20);
        assert_eq!(config.output.database_path, "/tmp/override.db");
    }

    #[test]
    fn test_invalid_env_override() {
        let result = parse_config("", |key| {
            (key == ENV_TIMEOUT_MS).then(|| "soon".to_string())
        });
        assert!(matches!(result, Err(ConfigError::EnvOverride { .. })));
    }

    #[test]
    fn test_env_override_is_validated() {
        let result = parse_config("", |key| {
            (key == ENV_MAX_RETRIES).then(|| "0".to_string())
        });
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        let hash1 = compute_config_hash(file1.path()).unwrap();
        let hash2 = compute_config_hash(file2.path()).unwrap();

        assert_ne!(hash1, hash2);
    }
}
