use crate::humanize::HumanDuration;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub downloads: DownloadConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// On-disk layout. Everything lives under `root`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

impl StorageConfig {
    /// Descriptor store (queues, archive, dead letters, leases)
    pub fn queue_path(&self) -> PathBuf {
        self.root.join("queue")
    }

    /// Catalog keyspace (subscriptions, channel info)
    pub fn catalog_path(&self) -> PathBuf {
        self.root.join("catalog")
    }

    /// Vault root: subscription page snapshots and per-channel video records
    pub fn vault_path(&self) -> PathBuf {
        self.root.join("json")
    }

    /// All directories that must exist before any stage runs
    pub fn required_paths(&self) -> Vec<PathBuf> {
        vec![
            self.root.clone(),
            self.queue_path(),
            self.catalog_path(),
            self.vault_path(),
        ]
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
        }
    }
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("data")
}

/// External API client configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Playlist items fetched per video-enumeration descriptor
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: HumanDuration,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: HumanDuration,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// API key (loaded from environment, not from config file)
    #[serde(skip)]
    pub api_key: Option<String>,
    /// OAuth access token (loaded from environment, not from config file)
    #[serde(skip)]
    pub access_token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            page_size: default_page_size(),
            connect_timeout: default_connect_timeout(),
            request_timeout: default_request_timeout(),
            user_agent: default_user_agent(),
            api_key: None,
            access_token: None,
        }
    }
}

fn default_base_url() -> String {
    "https://www.googleapis.com/youtube/v3".to_string()
}

fn default_page_size() -> u32 {
    50
}

fn default_connect_timeout() -> HumanDuration {
    HumanDuration::from_secs(10)
}

fn default_request_timeout() -> HumanDuration {
    HumanDuration::from_secs(60)
}

fn default_user_agent() -> String {
    "vidharvest/0.1.0".to_string()
}

/// Staging and draining policy
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// A channel whose last check is older than this is due for a refresh
    #[serde(default = "default_check_threshold")]
    pub check_threshold: HumanDuration,
    /// Minimum delay after each external call
    #[serde(default = "default_throttle")]
    pub throttle: HumanDuration,
    /// Transient failures tolerated before a descriptor is dead-lettered
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_lease_ttl")]
    pub lease_ttl: HumanDuration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            check_threshold: default_check_threshold(),
            throttle: default_throttle(),
            max_attempts: default_max_attempts(),
            lease_ttl: default_lease_ttl(),
        }
    }
}

fn default_check_threshold() -> HumanDuration {
    HumanDuration::from_secs(24 * 60 * 60)
}

fn default_throttle() -> HumanDuration {
    HumanDuration::from_secs(2)
}

fn default_max_attempts() -> u32 {
    5
}

fn default_lease_ttl() -> HumanDuration {
    HumanDuration::from_secs(2 * 60 * 60)
}

/// Service-mode cadences
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScheduleConfig {
    /// Subscription and channel-check chain
    #[serde(default = "default_daily_interval")]
    pub daily_interval: HumanDuration,
    /// Video enumeration, detail and download chain
    #[serde(default = "default_frequent_interval")]
    pub frequent_interval: HumanDuration,
    #[serde(default = "default_run_on_start")]
    pub run_on_start: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            daily_interval: default_daily_interval(),
            frequent_interval: default_frequent_interval(),
            run_on_start: default_run_on_start(),
        }
    }
}

fn default_daily_interval() -> HumanDuration {
    HumanDuration::from_secs(24 * 60 * 60)
}

fn default_frequent_interval() -> HumanDuration {
    HumanDuration::from_secs(60 * 60)
}

fn default_run_on_start() -> bool {
    true
}

/// External downloader process
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownloadConfig {
    /// When enabled, fetched video details chain a VideoFetch descriptor
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_binary")]
    pub binary: String,
    #[serde(default = "default_output_template")]
    pub output_template: String,
    #[serde(default)]
    pub extra_args: Vec<String>,
    #[serde(default = "default_download_timeout")]
    pub timeout: HumanDuration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            binary: default_binary(),
            output_template: default_output_template(),
            extra_args: Vec::new(),
            timeout: default_download_timeout(),
        }
    }
}

fn default_binary() -> String {
    "yt-dlp".to_string()
}

fn default_output_template() -> String {
    "media/%(channel_id)s/%(id)s.%(ext)s".to_string()
}

fn default_download_timeout() -> HumanDuration {
    HumanDuration::from_secs(2 * 60 * 60)
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// Used when RUST_LOG is unset
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.storage.root, PathBuf::from("data"));
        assert_eq!(config.api.page_size, 50);
        assert_eq!(config.pipeline.throttle.as_duration(), Duration::from_secs(2));
        assert_eq!(
            config.pipeline.check_threshold.as_duration(),
            Duration::from_secs(86_400)
        );
        assert!(!config.downloads.enabled);
    }

    #[test]
    fn test_storage_layout() {
        let storage = StorageConfig {
            root: PathBuf::from("/srv/harvest"),
        };

        assert_eq!(storage.queue_path(), PathBuf::from("/srv/harvest/queue"));
        assert_eq!(storage.vault_path(), PathBuf::from("/srv/harvest/json"));
        assert_eq!(storage.required_paths().len(), 4);
    }
}
