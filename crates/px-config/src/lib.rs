//! Proactor Configuration System
//!
//! TOML-based configuration with environment variable override support.
//! The `[strategy]` table maps directly onto [`px_common::StrategyConfig`].

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use px_common::StrategyConfig;

mod loader;

pub use loader::ConfigLoader;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Root application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub strategy: StrategyConfig,
    pub pipeline: PipelineConfig,

    /// Enable development mode
    pub dev_mode: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            strategy: StrategyConfig::default(),
            pipeline: PipelineConfig::default(),
            dev_mode: false,
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub port: u16,
    pub host: String,
    pub cors_origins: Vec<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
            cors_origins: vec!["http://localhost:4200".to_string()],
        }
    }
}

/// Pipeline (flow) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Name of the pipeline, used in component locations
    pub name: String,
    /// Register the orchestrator bean on the process-wide management server.
    /// When off the bean lives on a server private to the pipeline.
    pub management_enabled: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: "main".to_string(),
            management_enabled: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration using the standard search paths and env overrides
    pub fn load() -> Result<Self, ConfigError> {
        ConfigLoader::new().load()
    }

    /// Reject settings the strategy cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let strategy = &self.strategy;

        if strategy.max_concurrency == Some(0) {
            return Err(ConfigError::ValidationError(
                "strategy.max_concurrency must be at least 1 (omit it for unbounded)".to_string(),
            ));
        }
        if strategy.parallelism == 0 {
            return Err(ConfigError::ValidationError(
                "strategy.parallelism must be at least 1".to_string(),
            ));
        }
        if strategy.subscriber_count == 0 {
            return Err(ConfigError::ValidationError(
                "strategy.subscriber_count must be at least 1".to_string(),
            ));
        }
        if strategy.buffer_size == 0 {
            return Err(ConfigError::ValidationError(
                "strategy.buffer_size must be at least 1".to_string(),
            ));
        }
        for (name, pool) in [
            ("light_pool", &strategy.light_pool),
            ("blocking_pool", &strategy.blocking_pool),
            ("cpu_intensive_pool", &strategy.cpu_intensive_pool),
        ] {
            if pool.concurrency == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "strategy.{}.concurrency must be at least 1",
                    name
                )));
            }
            if pool.queue_capacity == Some(0) {
                return Err(ConfigError::ValidationError(format!(
                    "strategy.{}.queue_capacity must be at least 1",
                    name
                )));
            }
        }
        if self.pipeline.name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "pipeline.name must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Example configuration with every key and its default
    pub fn example_toml() -> String {
        r#"# Proactor configuration

dev_mode = false

[http]
port = 8080
host = "0.0.0.0"
cors_origins = ["http://localhost:4200"]

[pipeline]
name = "main"
management_enabled = true

[strategy]
name_prefix = "pipeline"
# max_concurrency = 64          # omit for unbounded
max_concurrency_eager_check = true
parallelism = 1
subscriber_count = 1
buffer_size = 256
busy_retry_interval_ms = 2
busy_retry_max_attempts = 1000

[strategy.light_pool]
concurrency = 16
# queue_capacity = 50           # default: max(concurrency * 2, 50)

[strategy.blocking_pool]
concurrency = 64

[strategy.cpu_intensive_pool]
concurrency = 4
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.http.port, 8080);
        assert_eq!(config.pipeline.name, "main");
        assert_eq!(config.strategy.max_concurrency, None);
    }

    #[test]
    fn test_example_toml_parses() {
        let config: AppConfig = toml::from_str(&AppConfig::example_toml()).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.strategy.light_pool.concurrency, 16);
        assert_eq!(config.strategy.busy_retry_interval_ms, 2);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[strategy]
max_concurrency = 10
subscriber_count = 2

[strategy.blocking_pool]
concurrency = 8
queue_capacity = 16
"#
        )
        .unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.strategy.max_concurrency, Some(10));
        assert_eq!(config.strategy.subscriber_count, 2);
        assert_eq!(config.strategy.parallelism, 1);
        assert_eq!(config.strategy.blocking_pool.concurrency, 8);
        assert_eq!(config.strategy.blocking_pool.queue_capacity, Some(16));
        assert_eq!(config.strategy.cpu_intensive_pool.concurrency, 4);
    }

    #[test]
    fn test_validation_rejects_zero_concurrency() {
        let mut config = AppConfig::default();
        config.strategy.max_concurrency = Some(0);
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));

        let mut config = AppConfig::default();
        config.strategy.blocking_pool.concurrency = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("blocking_pool"));
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[strategy\nparallelism = ").unwrap();
        assert!(matches!(
            AppConfig::from_file(file.path()),
            Err(ConfigError::ParseError(_))
        ));
    }
}
