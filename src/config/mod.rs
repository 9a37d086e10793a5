//! Configuration management for vidharvest
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use vidharvest::config::Config;
//!
//! let config = Config::load(None).expect("Failed to load configuration");
//! println!("Storage root: {}", config.storage.root.display());
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `VIDHARVEST__<section>__<key>`
//!
//! Examples:
//! - `VIDHARVEST__STORAGE__ROOT=/var/lib/vidharvest`
//! - `VIDHARVEST__PIPELINE__CHECK_THRESHOLD=12h`
//! - `VIDHARVEST__DOWNLOADS__ENABLED=true`
//!
//! Credentials come only from `YOUTUBE_API_KEY` / `YOUTUBE_ACCESS_TOKEN`.
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/vidharvest.toml`.
//! This can be overridden using `--config` or the `VIDHARVEST_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use crate::humanize::HumanDuration;
pub use models::{
    ApiConfig, Config, DownloadConfig, PipelineConfig, ScheduleConfig, StorageConfig,
    TelemetryConfig,
};
pub use validation::{MAX_PAGE_SIZE, ValidationError};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`VIDHARVEST__*`)
    /// 2. TOML file (`explicit_path`, `VIDHARVEST_CONFIG`, or `config/vidharvest.toml`)
    /// 3. Default values
    pub fn load(explicit_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config = sources::load(explicit_path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path, without secrets
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }
}
