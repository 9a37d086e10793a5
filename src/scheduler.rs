//! Service mode: recurring stage chains
//!
//! Two cadences drive the pipeline. Within a chain each stage starts when the
//! previous one finishes, and a finished daily chain triggers the frequent
//! chain straight away since fresh channel info unlocks video checks.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::config::ScheduleConfig;
use crate::pipeline::{Pipeline, RunSummary, Stage};

pub struct Scheduler {
    pipeline: Arc<Pipeline>,
    daily_interval: Duration,
    frequent_interval: Duration,
    run_on_start: bool,
}

impl Scheduler {
    pub fn new(pipeline: Arc<Pipeline>, config: &ScheduleConfig) -> Self {
        Self {
            pipeline,
            daily_interval: config.daily_interval.as_duration(),
            frequent_interval: config.frequent_interval.as_duration(),
            run_on_start: config.run_on_start,
        }
    }

    /// Run chains on their cadences until `shutdown` resolves
    ///
    /// A chain interrupted by shutdown leaves its current descriptor queued and
    /// releases its lease.
    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut daily = self.interval(self.daily_interval);
        let mut frequent = self.interval(self.frequent_interval);
        tokio::pin!(shutdown);

        info!(
            daily = ?self.daily_interval,
            frequent = ?self.frequent_interval,
            run_on_start = self.run_on_start,
            "Scheduler started"
        );

        loop {
            let chain = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = daily.tick() => {
                    // The daily run already covers the frequent chain
                    frequent.reset();
                    Stage::ALL.as_slice()
                }
                _ = frequent.tick() => Stage::FREQUENT.as_slice(),
            };

            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    warn!("Shutdown during a chain, remaining stages skipped");
                    break;
                }
                summary = self.run_chain(chain) => {
                    if !summary.all_succeeded() {
                        warn!("Chain finished with failed stages");
                    }
                }
            }
        }

        info!("Scheduler stopped");
    }

    async fn run_chain(&self, chain: &[Stage]) -> RunSummary {
        info!(stages = chain.len(), first = %chain[0], "Chain triggered");
        self.pipeline.run_stages(chain, None).await
    }

    fn interval(&self, period: Duration) -> Interval {
        let start = if self.run_on_start {
            Instant::now()
        } else {
            Instant::now() + period
        };
        let mut interval = tokio::time::interval_at(start, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    }
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
