//! Staging: decides which entities are due and writes their descriptors

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info};

use crate::catalog::{CatalogError, CatalogStore};
use crate::queue::{DescriptorStore, QueueError, TaskKind};

#[derive(Debug, Error)]
pub enum StagerError {
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("threshold out of range: {0:?}")]
    InvalidThreshold(std::time::Duration),
}

pub type Result<T> = std::result::Result<T, StagerError>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StagingReport {
    /// New descriptors written
    pub enqueued: usize,
    /// Subjects that were already queued
    pub restaged: usize,
    /// Subjects not yet due
    pub skipped: usize,
}

impl StagingReport {
    fn record(&mut self, created: bool) {
        if created {
            self.enqueued += 1;
        } else {
            self.restaged += 1;
        }
    }
}

pub struct Stager {
    catalog: Arc<dyn CatalogStore>,
    queue: Arc<DescriptorStore>,
}

impl Stager {
    pub fn new(catalog: Arc<dyn CatalogStore>, queue: Arc<DescriptorStore>) -> Self {
        Self { catalog, queue }
    }

    /// Enqueue a ChannelCheck for every subscription whose channel is unknown
    /// or was last checked strictly before `now - threshold`
    pub fn stage_channel_checks(
        &self,
        now: DateTime<Utc>,
        threshold: std::time::Duration,
    ) -> Result<StagingReport> {
        let threshold = chrono::Duration::from_std(threshold)
            .map_err(|_| StagerError::InvalidThreshold(threshold))?;
        // A threshold reaching past the calendar makes nothing stale
        let cutoff = now
            .checked_sub_signed(threshold)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let mut report = StagingReport::default();

        for subscription in self.catalog.list_all_subscriptions()? {
            let channel_id = subscription.external_id.as_str();

            let due = match self.catalog.find_channel_info_by_external_id(channel_id)? {
                None => true,
                Some(info) => info.last_check < cutoff,
            };

            if !due {
                debug!(channel_id, "Channel checked recently, skipping");
                report.skipped += 1;
                continue;
            }

            let created = self
                .queue
                .enqueue(TaskKind::ChannelCheck, channel_id, BTreeMap::new())?;
            report.record(created);
        }

        info!(
            enqueued = report.enqueued,
            restaged = report.restaged,
            skipped = report.skipped,
            cutoff = %cutoff,
            "Channel checks staged"
        );
        Ok(report)
    }

    /// Enqueue a VideoForChannelCheck for every known channel, unconditionally
    pub fn stage_video_checks(&self) -> Result<StagingReport> {
        let mut report = StagingReport::default();

        for info in self.catalog.list_all_channel_infos()? {
            let created =
                self.queue
                    .enqueue(TaskKind::VideoForChannelCheck, &info.id, BTreeMap::new())?;
            report.record(created);
        }

        info!(
            enqueued = report.enqueued,
            restaged = report.restaged,
            "Video checks staged"
        );
        Ok(report)
    }
}
