//! Stage graph and the component wiring that executes it
//!
//! Stages form one chain: each stage's output is the next stage's input.
//! Every stage execution holds the run lease named after the stage, so two
//! overlapping invocations never drain the same queue at once.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::ValueEnum;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::catalog::CatalogStore;
use crate::config::Config;
use crate::harvest::{
    ChannelCheckHandler, DetailHarvester, DetailReport, DownloadHandler, Downloader, FetchReport,
    HarvestError, ImportReport, SubscriptionIngester, VideoCheckHandler,
};
use crate::observability::Metrics;
use crate::platform::VideoPlatform;
use crate::queue::{DescriptorStore, QueueError, RunLease};
use crate::stager::{Stager, StagerError, StagingReport};
use crate::storage::VideoVault;
use crate::worker::{BatchManifest, RateLimiter, Runner, TaskHandler};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum)]
pub enum Stage {
    /// Page through the subscription listing into snapshots
    FetchSubs,
    /// Upsert subscriptions from the snapshots
    SubsToDb,
    StageChannelCheck,
    RunChannelCheck,
    StageVideoForChannelCheck,
    RunVideoForChannelCheck,
    FetchVideoDetails,
    RunDownloads,
}

impl Stage {
    /// Pipeline order
    pub const ALL: [Stage; 8] = [
        Stage::FetchSubs,
        Stage::SubsToDb,
        Stage::StageChannelCheck,
        Stage::RunChannelCheck,
        Stage::StageVideoForChannelCheck,
        Stage::RunVideoForChannelCheck,
        Stage::FetchVideoDetails,
        Stage::RunDownloads,
    ];

    /// Subscription and channel metadata chain
    pub const DAILY: [Stage; 4] = [
        Stage::FetchSubs,
        Stage::SubsToDb,
        Stage::StageChannelCheck,
        Stage::RunChannelCheck,
    ];

    /// Video enumeration, detail and download chain
    pub const FREQUENT: [Stage; 4] = [
        Stage::StageVideoForChannelCheck,
        Stage::RunVideoForChannelCheck,
        Stage::FetchVideoDetails,
        Stage::RunDownloads,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::FetchSubs => "fetch-subs",
            Stage::SubsToDb => "subs-to-db",
            Stage::StageChannelCheck => "stage-channel-check",
            Stage::RunChannelCheck => "run-channel-check",
            Stage::StageVideoForChannelCheck => "stage-video-for-channel-check",
            Stage::RunVideoForChannelCheck => "run-video-for-channel-check",
            Stage::FetchVideoDetails => "fetch-video-details",
            Stage::RunDownloads => "run-downloads",
        }
    }

    /// Stage whose output this stage consumes
    pub fn depends_on(&self) -> Option<Stage> {
        match self {
            Stage::FetchSubs => None,
            Stage::SubsToDb => Some(Stage::FetchSubs),
            Stage::StageChannelCheck => Some(Stage::SubsToDb),
            Stage::RunChannelCheck => Some(Stage::StageChannelCheck),
            Stage::StageVideoForChannelCheck => Some(Stage::RunChannelCheck),
            Stage::RunVideoForChannelCheck => Some(Stage::StageVideoForChannelCheck),
            Stage::FetchVideoDetails => Some(Stage::RunVideoForChannelCheck),
            Stage::RunDownloads => Some(Stage::FetchVideoDetails),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("harvest failed: {0}")]
    Harvest(#[from] HarvestError),

    #[error("staging failed: {0}")]
    Staging(#[from] StagerError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("prerequisite stage {0} failed")]
    PrerequisiteFailed(Stage),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// What a stage execution produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Fetched(FetchReport),
    Imported(ImportReport),
    Staged(StagingReport),
    Drained(BatchManifest),
    Details(DetailReport),
    /// Another run holds this stage's lease
    LeaseHeld,
    /// Downloads are switched off in the configuration
    Disabled,
}

/// Per-stage results of a multi-stage run, in execution order
#[derive(Debug, Default)]
pub struct RunSummary {
    pub results: Vec<(Stage, Result<StageOutcome>)>,
}

impl RunSummary {
    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(|(_, result)| result.is_ok())
    }

    pub fn get(&self, stage: Stage) -> Option<&Result<StageOutcome>> {
        self.results
            .iter()
            .find(|(candidate, _)| *candidate == stage)
            .map(|(_, result)| result)
    }
}

/// Releases a run lease when dropped, including on cancellation
struct LeaseGuard<'a> {
    queue: &'a DescriptorStore,
    lease: RunLease,
}

impl Drop for LeaseGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.queue.release_lease(&self.lease) {
            error!(stage = %self.lease.stage, error = %e, "Failed to release lease");
        }
    }
}

/// Tunables the pipeline reads from [`Config`]
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub check_threshold: Duration,
    pub throttle: Duration,
    pub max_attempts: u32,
    pub lease_ttl: Duration,
    pub page_size: u32,
    /// Present when the download stage is enabled
    pub downloader: Option<Downloader>,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            check_threshold: config.pipeline.check_threshold.as_duration(),
            throttle: config.pipeline.throttle.as_duration(),
            max_attempts: config.pipeline.max_attempts,
            lease_ttl: config.pipeline.lease_ttl.as_duration(),
            page_size: config.api.page_size,
            downloader: config
                .downloads
                .enabled
                .then(|| Downloader::new(&config.downloads)),
        }
    }
}

pub struct Pipeline {
    queue: Arc<DescriptorStore>,
    platform: Arc<dyn VideoPlatform>,
    catalog: Arc<dyn CatalogStore>,
    vault: VideoVault,
    metrics: Arc<Metrics>,
    settings: PipelineSettings,
    limiter: RateLimiter,
    runner: Runner,
    stager: Stager,
}

impl Pipeline {
    pub fn new(
        queue: Arc<DescriptorStore>,
        platform: Arc<dyn VideoPlatform>,
        catalog: Arc<dyn CatalogStore>,
        vault: VideoVault,
        metrics: Arc<Metrics>,
        settings: PipelineSettings,
    ) -> Self {
        let limiter = RateLimiter::new(settings.throttle);
        let runner = Runner::new(
            queue.clone(),
            limiter,
            settings.max_attempts,
            metrics.clone(),
        );
        let stager = Stager::new(catalog.clone(), queue.clone());

        Self {
            queue,
            platform,
            catalog,
            vault,
            metrics,
            settings,
            limiter,
            runner,
            stager,
        }
    }

    pub fn queue(&self) -> &Arc<DescriptorStore> {
        &self.queue
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Flush the catalog, then the descriptor store
    pub fn persist(&self) -> Result<()> {
        self.catalog.persist().map_err(HarvestError::from)?;
        self.queue.persist()?;
        Ok(())
    }

    /// Run one stage under its lease
    ///
    /// `threshold` overrides the configured staleness threshold for
    /// `stage-channel-check`.
    pub async fn run_stage(&self, stage: Stage, threshold: Option<Duration>) -> Result<StageOutcome> {
        let Some(lease) = self
            .queue
            .acquire_lease(stage.as_str(), self.settings.lease_ttl)?
        else {
            warn!(%stage, "Stage already running elsewhere, skipping");
            return Ok(StageOutcome::LeaseHeld);
        };
        let _guard = LeaseGuard {
            queue: &self.queue,
            lease,
        };

        info!(%stage, "Stage started");
        let outcome = self.execute(stage, threshold).await?;
        self.persist()?;
        self.metrics.snapshot().log(stage.as_str());

        Ok(outcome)
    }

    /// Run the selected stages in pipeline order
    ///
    /// A stage is skipped when its prerequisite was selected in this run and failed.
    pub async fn run_stages(&self, stages: &[Stage], threshold: Option<Duration>) -> RunSummary {
        let mut ordered = stages.to_vec();
        ordered.sort();
        ordered.dedup();

        let mut summary = RunSummary::default();
        for stage in ordered {
            let prerequisite_failed = stage.depends_on().and_then(|dependency| {
                summary
                    .get(dependency)
                    .filter(|result| result.is_err())
                    .map(|_| dependency)
            });

            let result = match prerequisite_failed {
                Some(dependency) => {
                    warn!(%stage, %dependency, "Skipping stage, prerequisite failed");
                    Err(PipelineError::PrerequisiteFailed(dependency))
                }
                None => self.run_stage(stage, threshold).await,
            };

            if let Err(e) = &result {
                error!(%stage, error = %e, "Stage failed");
            }
            summary.results.push((stage, result));
        }
        summary
    }

    async fn execute(&self, stage: Stage, threshold: Option<Duration>) -> Result<StageOutcome> {
        let outcome = match stage {
            Stage::FetchSubs => StageOutcome::Fetched(self.ingester().fetch_pages().await?),
            Stage::SubsToDb => StageOutcome::Imported(self.ingester().import_snapshots().await?),
            Stage::StageChannelCheck => {
                let threshold = threshold.unwrap_or(self.settings.check_threshold);
                StageOutcome::Staged(self.stager.stage_channel_checks(Utc::now(), threshold)?)
            }
            Stage::RunChannelCheck => {
                let handler = ChannelCheckHandler::new(self.platform.clone(), self.catalog.clone());
                StageOutcome::Drained(self.drain(&handler).await)
            }
            Stage::StageVideoForChannelCheck => {
                StageOutcome::Staged(self.stager.stage_video_checks()?)
            }
            Stage::RunVideoForChannelCheck => {
                let handler = VideoCheckHandler::new(
                    self.platform.clone(),
                    self.catalog.clone(),
                    self.vault.clone(),
                    self.settings.page_size,
                );
                StageOutcome::Drained(self.drain(&handler).await)
            }
            Stage::FetchVideoDetails => {
                let harvester = DetailHarvester::new(
                    self.platform.clone(),
                    self.vault.clone(),
                    self.queue.clone(),
                    self.limiter,
                    self.metrics.clone(),
                )
                .with_download_chaining(self.settings.downloader.is_some());
                StageOutcome::Details(harvester.run().await?)
            }
            Stage::RunDownloads => match &self.settings.downloader {
                Some(downloader) => {
                    let handler = DownloadHandler::new(downloader.clone());
                    StageOutcome::Drained(self.drain(&handler).await)
                }
                None => {
                    info!("Downloads disabled, leaving VideoFetch queue untouched");
                    StageOutcome::Disabled
                }
            },
        };
        Ok(outcome)
    }

    async fn drain(&self, handler: &dyn TaskHandler) -> BatchManifest {
        self.runner.drain(handler).await
    }

    fn ingester(&self) -> SubscriptionIngester {
        SubscriptionIngester::new(
            self.platform.clone(),
            self.catalog.clone(),
            self.vault.clone(),
            self.limiter,
            self.metrics.clone(),
        )
    }
}
