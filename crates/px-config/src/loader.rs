//! Configuration loader with file and environment variable support

use crate::{AppConfig, ConfigError};
use std::env;
use std::path::PathBuf;
use tracing::{info, warn};

/// Standard config file search paths
const CONFIG_PATHS: &[&str] = &[
    "config.toml",
    "proactor.toml",
    "./config/config.toml",
    "./config/proactor.toml",
    "/etc/proactor/config.toml",
];

/// Configuration loader
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
    search_standard_paths: bool,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            config_path: None,
            search_standard_paths: true,
        }
    }

    /// Create a loader with a specific config file path
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config_path: Some(path.into()),
            search_standard_paths: true,
        }
    }

    /// Only consider the explicit path and `PROACTOR_CONFIG`
    pub fn without_standard_paths(mut self) -> Self {
        self.search_standard_paths = false;
        self
    }

    /// Load configuration from file (if found) with environment variable overrides
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut config = AppConfig::default();

        if let Some(path) = self.find_config_file() {
            info!(?path, "Loading configuration from file");
            config = AppConfig::from_file(&path)?;
        }

        self.apply_env_overrides(&mut config);
        config.validate()?;

        Ok(config)
    }

    /// Find the configuration file to use
    fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Some(path.clone());
            }
            warn!(?path, "Configured config file does not exist");
        }

        if let Ok(path) = env::var("PROACTOR_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        if !self.search_standard_paths {
            return None;
        }

        CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&self, config: &mut AppConfig) {
        // HTTP
        if let Ok(val) = env::var("PROACTOR_HTTP_PORT") {
            if let Ok(port) = val.parse() {
                config.http.port = port;
            }
        }
        if let Ok(val) = env::var("PROACTOR_HTTP_HOST") {
            config.http.host = val;
        }
        if let Ok(val) = env::var("PROACTOR_CORS_ORIGINS") {
            config.http.cors_origins = val.split(',').map(|s| s.trim().to_string()).collect();
        }

        // Pipeline
        if let Ok(val) = env::var("PROACTOR_PIPELINE_NAME") {
            config.pipeline.name = val;
        }
        if let Ok(val) = env::var("PROACTOR_MANAGEMENT_ENABLED") {
            config.pipeline.management_enabled = val.parse().unwrap_or(true);
        }

        // Strategy
        if let Ok(val) = env::var("PROACTOR_MAX_CONCURRENCY") {
            if val.eq_ignore_ascii_case("unbounded") {
                config.strategy.max_concurrency = None;
            } else if let Ok(max) = val.parse() {
                config.strategy.max_concurrency = Some(max);
            }
        }
        if let Ok(val) = env::var("PROACTOR_MAX_CONCURRENCY_EAGER_CHECK") {
            config.strategy.max_concurrency_eager_check = val.parse().unwrap_or(true);
        }
        if let Ok(val) = env::var("PROACTOR_PARALLELISM") {
            if let Ok(parallelism) = val.parse() {
                config.strategy.parallelism = parallelism;
            }
        }
        if let Ok(val) = env::var("PROACTOR_SUBSCRIBER_COUNT") {
            if let Ok(count) = val.parse() {
                config.strategy.subscriber_count = count;
            }
        }
        if let Ok(val) = env::var("PROACTOR_BUFFER_SIZE") {
            if let Ok(size) = val.parse() {
                config.strategy.buffer_size = size;
            }
        }
        if let Ok(val) = env::var("PROACTOR_LIGHT_POOL_CONCURRENCY") {
            if let Ok(concurrency) = val.parse() {
                config.strategy.light_pool.concurrency = concurrency;
            }
        }
        if let Ok(val) = env::var("PROACTOR_BLOCKING_POOL_CONCURRENCY") {
            if let Ok(concurrency) = val.parse() {
                config.strategy.blocking_pool.concurrency = concurrency;
            }
        }
        if let Ok(val) = env::var("PROACTOR_CPU_INTENSIVE_POOL_CONCURRENCY") {
            if let Ok(concurrency) = val.parse() {
                config.strategy.cpu_intensive_pool.concurrency = concurrency;
            }
        }

        // General
        if let Ok(val) = env::var("PROACTOR_DEV_MODE") {
            config.dev_mode = val.parse().unwrap_or(false);
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
