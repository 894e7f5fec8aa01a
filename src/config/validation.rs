//! Configuration errors and string helpers.

use thiserror::Error;

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse YAML configuration.
    #[error("failed to parse YAML config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// Configuration validation failed.
    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `${VAR:-default}` syntax.
///
/// # Errors
/// Returns `ConfigError::ValidationError` naming every referenced variable
/// that is unset and has no default.
pub fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    static ENV_VAR_REGEX: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();

    let regex = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("failed to compile env var regex")
    });

    let mut missing = Vec::new();
    let expanded = regex
        .replace_all(input, |caps: &regex::Captures| {
            let var_name = &caps[1];
            match (std::env::var(var_name), caps.get(2)) {
                (Ok(value), _) => value,
                (Err(_), Some(default)) => default.as_str().to_string(),
                (Err(_), None) => {
                    missing.push(var_name.to_string());
                    String::new()
                }
            }
        })
        .into_owned();

    if missing.is_empty() {
        Ok(expanded)
    } else {
        Err(ConfigError::ValidationError(format!(
            "environment variable not set and no default given: {}",
            missing.join(", ")
        )))
    }
}
