//! Task-kind specific logic between the platform API, the catalog and the vault
//!
//! Queue-driven harvesters implement [`TaskHandler`](crate::worker::TaskHandler)
//! and are drained by the runner. The subscription ingester and the detail
//! harvester scan their inputs directly instead.

pub mod channels;
pub mod details;
pub mod downloads;
pub mod subscriptions;
pub mod videos;

pub use channels::ChannelCheckHandler;
pub use details::{DetailHarvester, DetailReport};
pub use downloads::{DownloadError, DownloadHandler, DownloadStatus, Downloader};
pub use subscriptions::{FetchReport, ImportReport, SubscriptionIngester};
pub use videos::VideoCheckHandler;

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::platform::PlatformError;
use crate::queue::QueueError;
use crate::storage::StorageError;

/// Errors that abort a whole scan-style harvest
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
}

pub type Result<T> = std::result::Result<T, HarvestError>;
