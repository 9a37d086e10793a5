use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "VIDHARVEST_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/vidharvest.toml";
const ENV_PREFIX: &str = "VIDHARVEST";
const ENV_SEPARATOR: &str = "__";

/// Resolve the config file path: explicit override, then `VIDHARVEST_CONFIG`, then the default
pub fn config_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load(explicit_path: Option<PathBuf>) -> Result<Config, ConfigError> {
    // Load .env file if it exists (ignore errors if file doesn't exist)
    let _ = dotenvy::dotenv();

    let mut config = load_from_sources(config_path(explicit_path))?;

    load_secrets(&mut config);

    Ok(config)
}

/// Credentials are never stored in TOML files, only in environment
fn load_secrets(config: &mut Config) {
    if let Ok(api_key) = env::var("YOUTUBE_API_KEY") {
        config.api.api_key = Some(api_key).filter(|key| !key.is_empty());
    }
    if let Ok(token) = env::var("YOUTUBE_ACCESS_TOKEN") {
        config.api.access_token = Some(token).filter(|token| !token.is_empty());
    }
}

/// Load configuration from a specific path and environment
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // VIDHARVEST__PIPELINE__MAX_ATTEMPTS -> pipeline.max_attempts
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}
