use crate::augment::REASONING_EFFORT_LEVELS;

use super::{AppConfig, ConfigError};

/// Validate a loaded configuration.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] describing the first problem found.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.server.timeout == 0 {
        return Err(ConfigError::Validation(
            "server.timeout must be greater than zero".to_string(),
        ));
    }
    if config.upstream.name.trim().is_empty() {
        return Err(ConfigError::Validation(
            "upstream.name must not be empty".to_string(),
        ));
    }
    if !config.upstream.base_url.trim().is_empty()
        && url::Url::parse(config.upstream.base_url.trim()).is_err()
    {
        return Err(ConfigError::Validation(format!(
            "upstream.base_url is not a valid URL: {}",
            config.upstream.base_url
        )));
    }
    let effort = config.features.reasoning_effort.as_str();
    if !REASONING_EFFORT_LEVELS.contains(&effort) {
        return Err(ConfigError::Validation(format!(
            "features.reasoning_effort must be one of {REASONING_EFFORT_LEVELS:?}, got '{effort}'"
        )));
    }
    Ok(())
}
