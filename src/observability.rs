//! In-process counters for the harvesting pipeline

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics handle shared by the runner and harvesters
#[derive(Debug, Default)]
pub struct Metrics {
    descriptors_completed: AtomicU64,
    descriptors_requeued: AtomicU64,
    descriptors_dead_lettered: AtomicU64,
    prerequisites_missing: AtomicU64,
    memo_skips: AtomicU64,
    api_calls: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn descriptor_completed(&self) {
        self.descriptors_completed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "descriptors_completed", "Metric incremented");
    }

    pub fn descriptor_requeued(&self) {
        self.descriptors_requeued.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "descriptors_requeued", "Metric incremented");
    }

    pub fn descriptor_dead_lettered(&self) {
        self.descriptors_dead_lettered.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "descriptors_dead_lettered", "Metric incremented");
    }

    pub fn prerequisite_missing(&self) {
        self.prerequisites_missing.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "prerequisites_missing", "Metric incremented");
    }

    pub fn memo_skip(&self) {
        self.memo_skips.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "memo_skips", "Metric incremented");
    }

    pub fn api_call(&self) {
        self.api_calls.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "api_calls", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            descriptors_completed: self.descriptors_completed.load(Ordering::Relaxed),
            descriptors_requeued: self.descriptors_requeued.load(Ordering::Relaxed),
            descriptors_dead_lettered: self.descriptors_dead_lettered.load(Ordering::Relaxed),
            prerequisites_missing: self.prerequisites_missing.load(Ordering::Relaxed),
            memo_skips: self.memo_skips.load(Ordering::Relaxed),
            api_calls: self.api_calls.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub descriptors_completed: u64,
    pub descriptors_requeued: u64,
    pub descriptors_dead_lettered: u64,
    pub prerequisites_missing: u64,
    pub memo_skips: u64,
    pub api_calls: u64,
}

impl MetricsSnapshot {
    /// Emit the snapshot as one structured event
    pub fn log(&self, stage: &str) {
        tracing::info!(
            stage,
            completed = self.descriptors_completed,
            requeued = self.descriptors_requeued,
            dead_lettered = self.descriptors_dead_lettered,
            prerequisites_missing = self.prerequisites_missing,
            memo_skips = self.memo_skips,
            api_calls = self.api_calls,
            "Stage metrics"
        );
    }
}
