use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid max_attempts: {0}. Cannot be 0")]
    InvalidMaxAttempts(u32),

    #[error("Invalid sweep_interval_secs: {0}. Must be at least 1")]
    InvalidSweepInterval(u64),

    #[error("Invalid stall_threshold_mins: {0}. Must be at least 1")]
    InvalidStallThreshold(u64),

    #[error("Invalid channel capacity: {0}. Must be at least 1")]
    InvalidChannelCapacity(usize),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .drover/config.yaml (project config, created by init)
    /// 3. .drover/local.yaml (project local overrides, optional)
    /// 4. Environment variables (DROVER_* prefix, highest priority)
    ///
    /// Configuration is always project-local (pwd/.drover/) so multiple
    /// coordination pools can coexist on one machine.
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".drover/config.yaml"))
            .merge(Yaml::file(".drover/local.yaml"))
            .merge(Env::prefixed("DROVER_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(
                config.database.max_connections,
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        if config.executor.max_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts(config.executor.max_attempts));
        }
        if config.monitor.sweep_interval_secs == 0 {
            return Err(ConfigError::InvalidSweepInterval(
                config.monitor.sweep_interval_secs,
            ));
        }
        if config.monitor.stall_threshold_mins == 0 {
            return Err(ConfigError::InvalidStallThreshold(
                config.monitor.stall_threshold_mins,
            ));
        }
        if config.channel.capacity == 0 {
            return Err(ConfigError::InvalidChannelCapacity(config.channel.capacity));
        }

        Ok(())
    }
}
