pub mod validation;

use serde::{Deserialize, Serialize};

use self::validation::validate_config;

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    /// Upstream request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_http_pool_max_idle_per_host")]
    pub http_pool_max_idle_per_host: usize,
    #[serde(default = "default_http_pool_idle_timeout_secs")]
    pub http_pool_idle_timeout_secs: u64,
    #[serde(default)]
    pub base_path: String,
    /// Fixed worker thread count; `1` selects a current-thread runtime.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_worker_threads: Option<usize>,
    /// Key file used to decrypt `ENC:`-prefixed credentials.
    #[serde(default = "default_secret_key_file")]
    pub secret_key_file: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            timeout: default_timeout(),
            http_pool_max_idle_per_host: default_http_pool_max_idle_per_host(),
            http_pool_idle_timeout_secs: default_http_pool_idle_timeout_secs(),
            base_path: String::new(),
            runtime_worker_threads: None,
            secret_key_file: default_secret_key_file(),
        }
    }
}

fn default_port() -> u16 {
    8100
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_timeout() -> u64 {
    180
}
fn default_http_pool_max_idle_per_host() -> usize {
    16
}
fn default_http_pool_idle_timeout_secs() -> u64 {
    15
}
fn default_secret_key_file() -> String {
    ".secret_key".to_string()
}

/// The single upstream this proxy fronts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    pub name: String,
    /// Base URL of the OpenAI-compatible API, e.g. `https://api.openai.com/v1`.
    #[serde(default)]
    pub base_url: String,
    /// API key, plaintext or `ENC:`-prefixed ciphertext.
    #[serde(default)]
    pub api_key: String,
    /// Models known to emit reasoning; drives extraction on the
    /// non-streaming path.
    #[serde(default)]
    pub reasoning_models: Vec<String>,
}

/// Feature toggles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_json: bool,
    /// Effort level sent to providers that take one: low, medium, high.
    #[serde(default = "default_reasoning_effort")]
    pub reasoning_effort: String,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            reasoning_effort: default_reasoning_effort(),
        }
    }
}

fn default_log_level() -> String {
    "INFO".to_string()
}
fn default_reasoning_effort() -> String {
    crate::augment::DEFAULT_REASONING_EFFORT.to_string()
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
}

/// Load and validate the configuration from a YAML file.
///
/// # Errors
///
/// Returns [`ConfigError`] when the file cannot be read, parsed, or fails
/// validation.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_yaml::from_str(&raw)?;
    validate_config(&config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_yaml_round_trips_with_defaults() {
        let yaml = "\
upstream:
  name: openai
  base_url: https://api.openai.com/v1
  api_key: sk-test
";
        let config: AppConfig = serde_yaml::from_str(yaml).expect("parse");
        assert_eq!(config.server.port, 8100);
        assert_eq!(config.features.reasoning_effort, "medium");
        assert_eq!(config.upstream.name, "openai");
        assert!(config.upstream.reasoning_models.is_empty());
    }

    #[test]
    fn reasoning_models_parse() {
        let yaml = "\
upstream:
  name: router
  base_url: https://openrouter.ai/api/v1
  api_key: sk-test
  reasoning_models:
    - deepseek/deepseek-r1
features:
  log_level: DEBUG
  reasoning_effort: high
";
        let config: AppConfig = serde_yaml::from_str(yaml).expect("parse");
        assert_eq!(config.upstream.reasoning_models, vec!["deepseek/deepseek-r1"]);
        assert_eq!(config.features.reasoning_effort, "high");
    }
}
