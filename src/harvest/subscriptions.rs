use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::Result;
use crate::catalog::{CatalogStore, SubscriptionUpdate};
use crate::observability::Metrics;
use crate::platform::{SubscriptionListResponse, VideoPlatform};
use crate::storage::VideoVault;
use crate::worker::RateLimiter;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchReport {
    pub pages: usize,
    pub items: usize,
    /// Snapshots from an earlier pagination that were removed
    pub pruned: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub pages: usize,
    pub upserted: usize,
    pub skipped: usize,
}

/// Mirrors the "my subscriptions" listing into the catalog in two passes:
/// page snapshots first, then an idempotent upsert from those snapshots.
pub struct SubscriptionIngester {
    platform: Arc<dyn VideoPlatform>,
    catalog: Arc<dyn CatalogStore>,
    vault: VideoVault,
    limiter: RateLimiter,
    metrics: Arc<Metrics>,
}

impl SubscriptionIngester {
    pub fn new(
        platform: Arc<dyn VideoPlatform>,
        catalog: Arc<dyn CatalogStore>,
        vault: VideoVault,
        limiter: RateLimiter,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            platform,
            catalog,
            vault,
            limiter,
            metrics,
        }
    }

    /// Follow the listing cursor to the end, snapshotting each page before the next
    ///
    /// Snapshots left over from a previous pagination are pruned only once the
    /// whole listing has been fetched, so a failed run keeps the old set intact.
    pub async fn fetch_pages(&self) -> Result<FetchReport> {
        let previous = self.vault.list_subscription_pages().await?;

        let mut report = FetchReport::default();
        let mut written = HashSet::new();
        let mut seen_tokens = HashSet::new();
        let mut token: Option<String> = None;

        loop {
            let page = self.platform.list_my_subscriptions(token.as_deref()).await?;
            self.metrics.api_call();

            let key = self
                .vault
                .put_subscription_page(token.as_deref(), &page)
                .await?;
            debug!(key = %key, items = page.items.len(), "Stored subscription page");

            report.pages += 1;
            report.items += page.items.len();
            written.insert(key);

            let next = page.next_token().map(str::to_string);
            self.limiter.throttle().await;

            match next {
                Some(next) if !seen_tokens.insert(next.clone()) => {
                    warn!(token = %next, "Listing returned a repeated page token, stopping");
                    break;
                }
                Some(next) => token = Some(next),
                None => break,
            }
        }

        for key in previous.iter().filter(|key| !written.contains(*key)) {
            self.vault.delete(key).await?;
            report.pruned += 1;
        }

        info!(
            pages = report.pages,
            items = report.items,
            pruned = report.pruned,
            "Subscription listing fetched"
        );
        Ok(report)
    }

    /// Upsert one Subscription per listed channel from the stored snapshots
    pub async fn import_snapshots(&self) -> Result<ImportReport> {
        let mut report = ImportReport::default();
        let now = Utc::now();

        for key in self.vault.list_subscription_pages().await? {
            let page: SubscriptionListResponse = self.vault.read_json(&key).await?;
            report.pages += 1;

            for item in page.items {
                let snippet = item.snippet;
                let Some(external_id) = snippet.resource_id.channel_id.filter(|id| !id.is_empty())
                else {
                    warn!(key = %key, item = %item.id, "Subscription item without channel id");
                    report.skipped += 1;
                    continue;
                };

                self.catalog.upsert_subscription(SubscriptionUpdate {
                    external_id,
                    name: snippet.title,
                    description: snippet.description,
                    subscribed_at: snippet.published_at,
                    last_check: now,
                })?;
                report.upserted += 1;
            }
        }

        info!(
            pages = report.pages,
            upserted = report.upserted,
            skipped = report.skipped,
            "Subscriptions imported"
        );
        Ok(report)
    }
}
