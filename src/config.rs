use crate::ml::TrainingConfig;
use crate::scheduler::SchedulerConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use validator::Validate;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Config {
    /// HTTP server configuration
    #[validate(nested)]
    pub server: ServerConfig,

    /// State backend configuration
    pub state: StateConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Filter/action pass configuration
    #[serde(default)]
    #[validate(nested)]
    pub pipeline: PipelineConfig,

    /// Classifier training configuration
    #[serde(default)]
    #[validate(nested)]
    pub training: TrainingConfig,

    /// Accept/reject token configuration
    #[validate(nested)]
    pub tokens: TokenConfig,
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/post-curator.toml".to_string());

        config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::with_name(&config_path).required(false))
            // Override with environment variables (prefix: POST_CURATOR_)
            .add_source(
                config::Environment::with_prefix("POST_CURATOR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Load and validate in one step
    pub fn load_validated() -> crate::error::Result<Self> {
        let config = Self::load()?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults embedded in the binary, without file or environment overrides
    pub fn embedded_defaults() -> crate::error::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            .build()?
            .try_deserialize::<Config>()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Externally reachable base URL used when building accept/reject links
    #[validate(url)]
    pub public_base_url: String,

    /// Request timeout (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// State backend type
    #[serde(default)]
    pub backend: StateBackend,

    /// Path for the embedded database
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StateBackend {
    #[default]
    Sled,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub prometheus_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            prometheus_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PipelineConfig {
    /// Items per single-item action pass, least recently attempted first
    #[serde(default = "default_action_batch_size")]
    #[validate(range(min = 1, max = 1000))]
    pub action_batch_size: usize,

    /// Items classified per classification pass
    #[serde(default = "default_classification_batch_size")]
    #[validate(range(min = 1))]
    pub classification_batch_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            action_batch_size: default_action_batch_size(),
            classification_batch_size: default_classification_batch_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TokenConfig {
    /// Secret used to sign accept/reject tokens
    #[validate(length(min = 16))]
    pub secret: String,

    /// Tokens older than this are refused; `None` disables expiry
    #[serde(default = "default_token_max_age")]
    pub max_age_secs: Option<u64>,
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_action_batch_size() -> usize {
    10
}

fn default_classification_batch_size() -> usize {
    200
}

fn default_token_max_age() -> Option<u64> {
    Some(7 * 24 * 3600)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        assert_eq!(default_http_port(), 8080);
        assert_eq!(default_action_batch_size(), 10);
        assert_eq!(default_log_level(), "info");
        assert!(default_true());
    }

    #[test]
    fn test_embedded_defaults_parse_and_validate() {
        let config = Config::embedded_defaults().unwrap();
        assert_eq!(config.state.backend, StateBackend::Sled);
        assert_eq!(config.pipeline.action_batch_size, 10);
        assert!((config.training.validation_fraction - 0.1).abs() < 1e-9);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_short_token_secret_rejected() {
        let mut config = Config::embedded_defaults().unwrap();
        config.tokens.secret = "short".to_string();
        assert!(config.validate().is_err());
    }
}
