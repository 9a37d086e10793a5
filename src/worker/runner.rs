//! Runner - drains one queue, one descriptor at a time

use std::sync::Arc;

use tracing::{error, info, warn};

use super::throttle::RateLimiter;
use super::{TaskError, TaskHandler};
use crate::observability::Metrics;
use crate::queue::{Descriptor, DescriptorStore, FailureDisposition, TaskKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub subject_id: String,
    pub success: bool,
}

/// Ordered per-descriptor outcomes of one drain; logged, never persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchManifest {
    pub kind: TaskKind,
    pub entries: Vec<ManifestEntry>,
}

impl BatchManifest {
    fn new(kind: TaskKind) -> Self {
        Self {
            kind,
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.entries.iter().filter(|entry| entry.success).count()
    }

    pub fn failed(&self) -> usize {
        self.len() - self.succeeded()
    }

    pub fn outcomes(&self) -> Vec<bool> {
        self.entries.iter().map(|entry| entry.success).collect()
    }
}

pub struct Runner {
    queue: Arc<DescriptorStore>,
    limiter: RateLimiter,
    max_attempts: u32,
    metrics: Arc<Metrics>,
}

impl Runner {
    pub fn new(
        queue: Arc<DescriptorStore>,
        limiter: RateLimiter,
        max_attempts: u32,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            queue,
            limiter,
            max_attempts,
            metrics,
        }
    }

    /// Process every descriptor currently queued for the handler's kind
    ///
    /// Descriptors enqueued while the drain is in progress wait for the next
    /// run. No single failure stops the batch.
    pub async fn drain(&self, handler: &dyn TaskHandler) -> BatchManifest {
        let kind = handler.kind();
        let pending = self.snapshot(kind);
        let mut manifest = BatchManifest::new(kind);

        info!(%kind, pending = pending.len(), "Draining queue");

        for descriptor in pending {
            let success = self.process(handler, &descriptor).await;
            manifest.entries.push(ManifestEntry {
                subject_id: descriptor.subject_id,
                success,
            });
        }

        info!(
            %kind,
            processed = manifest.len(),
            succeeded = manifest.succeeded(),
            failed = manifest.failed(),
            outcomes = ?manifest.outcomes(),
            "Batch finished"
        );

        manifest
    }

    /// Collect pending descriptors up front; store iterators are not held across awaits
    fn snapshot(&self, kind: TaskKind) -> Vec<Descriptor> {
        self.queue
            .list_pending(kind)
            .filter_map(|item| match item {
                Ok(descriptor) => Some(descriptor),
                Err(e) => {
                    error!(%kind, error = %e, "Skipping unreadable descriptor");
                    None
                }
            })
            .collect()
    }

    async fn process(&self, handler: &dyn TaskHandler, descriptor: &Descriptor) -> bool {
        let kind = descriptor.kind;
        let subject_id = descriptor.subject_id.as_str();

        match handler.handle(descriptor).await {
            Ok(outcome) => {
                let external_call = outcome.external_call;
                let success = outcome.success;

                let archived = match self.queue.complete(kind, subject_id, outcome.into_outcome()) {
                    Ok(_) => {
                        self.metrics.descriptor_completed();
                        true
                    }
                    Err(e) => {
                        error!(%kind, subject_id, error = %e, "Failed to archive descriptor");
                        false
                    }
                };

                if external_call {
                    self.metrics.api_call();
                    self.limiter.throttle().await;
                }

                if !success {
                    warn!(%kind, subject_id, "Descriptor archived as failed");
                }
                archived && success
            }
            Err(TaskError::PrerequisiteMissing(reason)) => {
                warn!(%kind, subject_id, reason = %reason, "Prerequisite missing, leaving descriptor queued");
                self.metrics.prerequisite_missing();
                false
            }
            Err(err) => {
                warn!(%kind, subject_id, error = %err, "Descriptor failed");

                match self
                    .queue
                    .record_failure(kind, subject_id, &err.to_string(), self.max_attempts)
                {
                    Ok(FailureDisposition::Requeued { attempts }) => {
                        info!(%kind, subject_id, attempts, "Descriptor left for retry");
                        self.metrics.descriptor_requeued();
                    }
                    Ok(FailureDisposition::DeadLettered { .. }) => {
                        self.metrics.descriptor_dead_lettered();
                    }
                    Err(e) => {
                        error!(%kind, subject_id, error = %e, "Failed to record failure");
                    }
                }

                if err.reached_platform() {
                    self.metrics.api_call();
                    self.limiter.throttle().await;
                }
                false
            }
        }
    }
}
