//! Startup: storage layout, stores, API client and pipeline assembly

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::catalog::{CatalogError, FjallCatalog};
use crate::config::{Config, StorageConfig};
use crate::observability::Metrics;
use crate::pipeline::{Pipeline, PipelineSettings};
use crate::platform::{PlatformError, YouTubeClient};
use crate::queue::{DescriptorStore, QueueError};
use crate::storage::{StorageError, VideoVault};

/// Exit status when required storage paths cannot be created
pub const EXIT_STORAGE_PATHS: u8 = 2;
pub const EXIT_FAILURE: u8 = 1;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("cannot create storage path {path}: {source}")]
    Paths {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open descriptor store: {0}")]
    Queue(#[from] QueueError),

    #[error("failed to open catalog: {0}")]
    Catalog(#[from] CatalogError),

    #[error("failed to open vault: {0}")]
    Vault(#[from] StorageError),

    #[error("failed to build API client: {0}")]
    Platform(#[from] PlatformError),
}

impl BootstrapError {
    pub fn exit_code(&self) -> u8 {
        match self {
            BootstrapError::Paths { .. } => EXIT_STORAGE_PATHS,
            _ => EXIT_FAILURE,
        }
    }
}

pub type Result<T> = std::result::Result<T, BootstrapError>;

/// Create every directory the stores need; fails before any stage can run
pub fn ensure_paths(storage: &StorageConfig) -> Result<()> {
    for path in storage.required_paths() {
        std::fs::create_dir_all(&path).map_err(|source| BootstrapError::Paths {
            path: path.clone(),
            source,
        })?;
    }
    Ok(())
}

/// Open only the descriptor store (for inspection commands)
pub fn open_queue(config: &Config) -> Result<DescriptorStore> {
    ensure_paths(&config.storage)?;
    Ok(DescriptorStore::open(config.storage.queue_path())?)
}

/// Fully wired pipeline over on-disk stores and the HTTP client
pub fn bootstrap(config: &Config) -> Result<Arc<Pipeline>> {
    ensure_paths(&config.storage)?;

    let queue = Arc::new(DescriptorStore::open(config.storage.queue_path())?);
    let catalog = Arc::new(FjallCatalog::open(config.storage.catalog_path())?);
    let vault = VideoVault::local(config.storage.vault_path())?;
    let platform = Arc::new(YouTubeClient::new(&config.api)?);

    info!(root = %config.storage.root.display(), "Stores opened");

    Ok(Arc::new(Pipeline::new(
        queue,
        platform,
        catalog,
        vault,
        Arc::new(Metrics::new()),
        PipelineSettings::from_config(config),
    )))
}
