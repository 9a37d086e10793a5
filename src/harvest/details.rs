use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};

use super::Result;
use crate::observability::Metrics;
use crate::platform::{PlatformError, VideoPlatform};
use crate::queue::{CONTEXT_CHANNEL_ID, DescriptorStore, TaskKind};
use crate::storage::VideoVault;
use crate::worker::RateLimiter;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailReport {
    pub fetched: usize,
    /// Detail record already present; no call made
    pub skipped: usize,
    /// Platform no longer knows the video; a tombstone was stored
    pub missing: usize,
    pub failed: usize,
    /// VideoFetch descriptors enqueued for the download stage
    pub chained: usize,
}

/// Fetches the detail record of every enumerated video at most once
pub struct DetailHarvester {
    platform: Arc<dyn VideoPlatform>,
    vault: VideoVault,
    queue: Arc<DescriptorStore>,
    limiter: RateLimiter,
    metrics: Arc<Metrics>,
    chain_downloads: bool,
}

impl DetailHarvester {
    pub fn new(
        platform: Arc<dyn VideoPlatform>,
        vault: VideoVault,
        queue: Arc<DescriptorStore>,
        limiter: RateLimiter,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            platform,
            vault,
            queue,
            limiter,
            metrics,
            chain_downloads: false,
        }
    }

    /// Enqueue a VideoFetch descriptor for every newly written detail record
    pub fn with_download_chaining(mut self, enabled: bool) -> Self {
        self.chain_downloads = enabled;
        self
    }

    /// Scan every channel namespace in the vault
    pub async fn run(&self) -> Result<DetailReport> {
        let mut report = DetailReport::default();

        for channel_id in self.vault.list_channels().await? {
            self.harvest_channel(&channel_id, &mut report).await?;
        }

        info!(
            fetched = report.fetched,
            skipped = report.skipped,
            missing = report.missing,
            failed = report.failed,
            chained = report.chained,
            "Video details harvested"
        );
        Ok(report)
    }

    async fn harvest_channel(&self, channel_id: &str, report: &mut DetailReport) -> Result<()> {
        for video_id in self.vault.list_videos(channel_id).await? {
            if self.vault.has_video_details(channel_id, &video_id).await? {
                self.metrics.memo_skip();
                report.skipped += 1;
                continue;
            }

            let fetched = self.platform.get_video(&video_id).await;
            let sent = fetched
                .as_ref()
                .map_or_else(PlatformError::sent_request, |_| true);
            if sent {
                self.metrics.api_call();
            }

            match fetched {
                Ok(Some(details)) => {
                    // The detail record is the memo, so the chained descriptor goes first
                    if self.chain_downloads {
                        let context = BTreeMap::from([(
                            CONTEXT_CHANNEL_ID.to_string(),
                            channel_id.to_string(),
                        )]);
                        self.queue.enqueue(TaskKind::VideoFetch, &video_id, context)?;
                        report.chained += 1;
                    }

                    self.vault
                        .put_video_details(channel_id, &video_id, &details)
                        .await?;
                    report.fetched += 1;
                    debug!(channel_id, video_id = %video_id, "Stored video details");
                }
                Ok(None) => {
                    warn!(channel_id, video_id = %video_id, "Video not found on platform, storing tombstone");
                    let tombstone = json!({"missing": true, "checked_at": Utc::now()});
                    self.vault
                        .put_video_details(channel_id, &video_id, &tombstone)
                        .await?;
                    report.missing += 1;
                }
                Err(e) => {
                    warn!(channel_id, video_id = %video_id, error = %e, "Failed to fetch video details");
                    report.failed += 1;
                }
            }

            if sent {
                self.limiter.throttle().await;
            }
        }
        Ok(())
    }
}
