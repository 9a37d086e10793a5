//! Queue draining
//!
//! A [`Runner`] drains one queue at a time, handing each descriptor to the
//! [`TaskHandler`] registered for that task kind. Handlers do exactly one unit
//! of external work; the runner owns what happens to the descriptor afterwards.

pub mod runner;
pub mod throttle;

pub use runner::{BatchManifest, ManifestEntry, Runner};
pub use throttle::RateLimiter;

use async_trait::async_trait;
use thiserror::Error;

use crate::catalog::CatalogError;
use crate::platform::PlatformError;
use crate::queue::{Descriptor, Outcome, QueueError, TaskKind};
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum TaskError {
    /// Catalog context the task needs is absent; the descriptor is left untouched
    #[error("prerequisite missing: {0}")]
    PrerequisiteMissing(String),

    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("download failed: {0}")]
    Download(String),
}

impl TaskError {
    /// Whether the failure happened after reaching the external API
    pub fn reached_platform(&self) -> bool {
        matches!(self, TaskError::Platform(e) if e.sent_request())
    }
}

/// Result of one processed descriptor, archived with it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    pub success: bool,
    pub message: String,
    /// An external call was made, so the runner throttles afterwards
    pub external_call: bool,
}

impl TaskOutcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            external_call: true,
        }
    }

    /// Terminal failure: archived, not retried
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            external_call: true,
        }
    }

    /// Mark an outcome reached without calling out
    pub fn without_call(mut self) -> Self {
        self.external_call = false;
        self
    }

    pub fn into_outcome(self) -> Outcome {
        Outcome {
            success: self.success,
            message: self.message,
        }
    }
}

/// Per-task-kind unit of work
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Queue this handler consumes
    fn kind(&self) -> TaskKind;

    async fn handle(&self, descriptor: &Descriptor) -> Result<TaskOutcome, TaskError>;
}
