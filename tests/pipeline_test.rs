//! End-to-end pipeline tests against a stub platform
//!
//! Stores live in a temp dir (fjall) and an in-memory vault; throttling is off.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

use vidharvest::catalog::{
    CatalogStore, ChannelInfo, FjallCatalog, Subscription, SubscriptionUpdate,
};
use vidharvest::config::Config;
use vidharvest::observability::Metrics;
use vidharvest::pipeline::{Pipeline, PipelineError, PipelineSettings, Stage, StageOutcome};
use vidharvest::platform::{
    self, ChannelResource, PlaylistItemListResponse, PlatformError, SubscriptionListResponse,
    VideoPlatform,
};
use vidharvest::queue::{CONTEXT_CHANNEL_ID, DescriptorStore, TaskKind};
use vidharvest::scheduler::Scheduler;
use vidharvest::storage::VideoVault;

#[derive(Default)]
struct CallCounts {
    subscriptions: AtomicUsize,
    channels: AtomicUsize,
    playlist_items: AtomicUsize,
    videos: AtomicUsize,
}

/// Canned platform responses with per-endpoint call counters
#[derive(Default)]
struct StubPlatform {
    subscription_pages: HashMap<Option<String>, SubscriptionListResponse>,
    fail_subscriptions: bool,
    channels: HashMap<String, ChannelResource>,
    failing_channels: HashSet<String>,
    playlists: HashMap<String, PlaylistItemListResponse>,
    videos: HashMap<String, Value>,
    calls: CallCounts,
}

impl StubPlatform {
    fn with_subscription_page(mut self, token: Option<&str>, page: Value) -> Self {
        let page = serde_json::from_value(page).unwrap();
        self.subscription_pages.insert(token.map(str::to_string), page);
        self
    }

    fn with_channel(mut self, id: &str, name: &str, subscribers: u64, uploads: &str) -> Self {
        let resource = serde_json::from_value(json!({
            "id": id,
            "snippet": {"title": name, "description": "stub channel"},
            "contentDetails": {"relatedPlaylists": {"uploads": uploads}},
            "statistics": {"subscriberCount": subscribers.to_string(), "videoCount": "2"}
        }))
        .unwrap();
        self.channels.insert(id.to_string(), resource);
        self
    }

    fn with_failing_channel(mut self, id: &str) -> Self {
        self.failing_channels.insert(id.to_string());
        self
    }

    fn with_uploads(mut self, playlist_id: &str, channel_id: &str, video_ids: &[&str]) -> Self {
        let items = video_ids
            .iter()
            .map(|video_id| {
                json!({
                    "kind": "youtube#playlistItem",
                    "snippet": {
                        "channelId": channel_id,
                        "title": format!("Video {}", video_id),
                        "resourceId": {"kind": "youtube#video", "videoId": video_id}
                    }
                })
            })
            .collect();
        self.playlists.insert(
            playlist_id.to_string(),
            PlaylistItemListResponse {
                next_page_token: None,
                items,
            },
        );
        for video_id in video_ids {
            self.videos.insert(
                video_id.to_string(),
                json!({"id": video_id, "statistics": {"viewCount": "7"}}),
            );
        }
        self
    }

    fn calls(&self, counter: fn(&CallCounts) -> &AtomicUsize) -> usize {
        counter(&self.calls).load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VideoPlatform for StubPlatform {
    async fn list_my_subscriptions(
        &self,
        page_token: Option<&str>,
    ) -> platform::Result<SubscriptionListResponse> {
        self.calls.subscriptions.fetch_add(1, Ordering::SeqCst);
        if self.fail_subscriptions {
            return Err(PlatformError::MissingCredentials("subscriptions"));
        }
        Ok(self
            .subscription_pages
            .get(&page_token.map(str::to_string))
            .cloned()
            .unwrap_or_default())
    }

    async fn get_channel(&self, channel_id: &str) -> platform::Result<Option<ChannelResource>> {
        self.calls.channels.fetch_add(1, Ordering::SeqCst);
        if self.failing_channels.contains(channel_id) {
            return Err(PlatformError::Timeout);
        }
        Ok(self.channels.get(channel_id).cloned())
    }

    async fn list_playlist_items(
        &self,
        playlist_id: &str,
        _max_results: u32,
        _page_token: Option<&str>,
    ) -> platform::Result<PlaylistItemListResponse> {
        self.calls.playlist_items.fetch_add(1, Ordering::SeqCst);
        Ok(self.playlists.get(playlist_id).cloned().unwrap_or_default())
    }

    async fn get_video(&self, video_id: &str) -> platform::Result<Option<Value>> {
        self.calls.videos.fetch_add(1, Ordering::SeqCst);
        Ok(self.videos.get(video_id).cloned())
    }
}

struct Harness {
    pipeline: Arc<Pipeline>,
    platform: Arc<StubPlatform>,
    catalog: Arc<FjallCatalog>,
    queue: Arc<DescriptorStore>,
    vault: VideoVault,
    _temp: TempDir,
}

fn test_config(extra: &str) -> Config {
    let base = r#"
[pipeline]
throttle = "0s"
max_attempts = 3
lease_ttl = "10m"
"#;
    toml::from_str(&format!("{}\n{}", base, extra)).expect("Failed to parse test config")
}

fn harness(platform: StubPlatform, config: Config) -> Harness {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let queue = Arc::new(DescriptorStore::open(temp.path().join("queue")).unwrap());
    let catalog = Arc::new(FjallCatalog::open(temp.path().join("catalog")).unwrap());
    let vault = VideoVault::in_memory();
    let platform = Arc::new(platform);

    let pipeline = Arc::new(Pipeline::new(
        queue.clone(),
        platform.clone(),
        catalog.clone(),
        vault.clone(),
        Arc::new(Metrics::new()),
        PipelineSettings::from_config(&config),
    ));

    Harness {
        pipeline,
        platform,
        catalog,
        queue,
        vault,
        _temp: temp,
    }
}

fn subscribe(catalog: &FjallCatalog, channel_id: &str) {
    catalog
        .upsert_subscription(SubscriptionUpdate {
            external_id: channel_id.to_string(),
            name: channel_id.to_string(),
            description: String::new(),
            subscribed_at: None,
            last_check: Utc::now(),
        })
        .unwrap();
}

fn channel_info(channel_id: &str, uploads: Option<&str>, hours_ago: i64) -> ChannelInfo {
    ChannelInfo {
        id: channel_id.to_string(),
        name: "Old name".to_string(),
        description: String::new(),
        created_at: None,
        custom_url: None,
        thumbnail_url: None,
        subscriber_count: Some(1),
        video_count: None,
        view_count: None,
        uploads_playlist_id: uploads.map(str::to_string),
        last_check: Utc::now() - ChronoDuration::hours(hours_ago),
    }
}

#[tokio::test]
async fn stale_channel_is_checked_and_replaced() {
    let h = harness(
        StubPlatform::default().with_channel("UC1", "Test", 10, "UU1"),
        test_config(""),
    );
    subscribe(&h.catalog, "UC1");
    h.catalog
        .upsert_channel_info(channel_info("UC1", None, 30))
        .unwrap();

    let staged = h
        .pipeline
        .run_stage(Stage::StageChannelCheck, None)
        .await
        .unwrap();
    assert!(matches!(staged, StageOutcome::Staged(report) if report.enqueued == 1));
    assert_eq!(h.queue.pending_count(TaskKind::ChannelCheck).unwrap(), 1);

    let started = Utc::now();
    let drained = h
        .pipeline
        .run_stage(Stage::RunChannelCheck, None)
        .await
        .unwrap();
    match drained {
        StageOutcome::Drained(manifest) => assert_eq!(manifest.outcomes(), vec![true]),
        other => panic!("unexpected outcome {:?}", other),
    }

    let info = h.catalog.find_channel_info_by_external_id("UC1").unwrap().unwrap();
    assert_eq!(info.name, "Test");
    assert_eq!(info.subscriber_count, Some(10));
    assert_eq!(info.uploads_playlist_id.as_deref(), Some("UU1"));
    assert!(info.last_check >= started);

    assert_eq!(h.queue.pending_count(TaskKind::ChannelCheck).unwrap(), 0);
    let archived = h.queue.archived(TaskKind::ChannelCheck, "UC1").unwrap().unwrap();
    assert!(archived.outcome.unwrap().success);
}

#[tokio::test]
async fn double_staging_keeps_one_descriptor() {
    let h = harness(StubPlatform::default(), test_config(""));
    subscribe(&h.catalog, "UC1");

    h.pipeline.run_stage(Stage::StageChannelCheck, None).await.unwrap();
    h.pipeline.run_stage(Stage::StageChannelCheck, None).await.unwrap();

    assert_eq!(h.queue.pending_count(TaskKind::ChannelCheck).unwrap(), 1);
}

#[tokio::test]
async fn threshold_override_restages_recent_channels() {
    let h = harness(StubPlatform::default(), test_config(""));
    subscribe(&h.catalog, "UC1");
    h.catalog
        .upsert_channel_info(channel_info("UC1", None, 2))
        .unwrap();

    h.pipeline.run_stage(Stage::StageChannelCheck, None).await.unwrap();
    assert_eq!(h.queue.pending_count(TaskKind::ChannelCheck).unwrap(), 0);

    h.pipeline
        .run_stage(Stage::StageChannelCheck, Some(Duration::from_secs(60 * 60)))
        .await
        .unwrap();
    assert_eq!(h.queue.pending_count(TaskKind::ChannelCheck).unwrap(), 1);
}

#[tokio::test]
async fn missing_channel_info_leaves_descriptor_queued() {
    let h = harness(
        StubPlatform::default().with_uploads("UU1", "UC1", &["vid1", "vid2"]),
        test_config(""),
    );
    h.catalog
        .upsert_channel_info(channel_info("UC1", Some("UU1"), 1))
        .unwrap();
    h.queue
        .enqueue(TaskKind::VideoForChannelCheck, "UC0-deleted", BTreeMap::new())
        .unwrap();
    h.queue
        .enqueue(TaskKind::VideoForChannelCheck, "UC1", BTreeMap::new())
        .unwrap();

    let outcome = h
        .pipeline
        .run_stage(Stage::RunVideoForChannelCheck, None)
        .await
        .unwrap();
    match outcome {
        StageOutcome::Drained(manifest) => {
            assert_eq!(manifest.len(), 2);
            assert_eq!(manifest.succeeded(), 1);
        }
        other => panic!("unexpected outcome {:?}", other),
    }

    let orphan = h
        .queue
        .get(TaskKind::VideoForChannelCheck, "UC0-deleted")
        .unwrap()
        .expect("descriptor must stay queued");
    assert_eq!(orphan.attempts, 0);
    assert!(h.queue.archived(TaskKind::VideoForChannelCheck, "UC0-deleted").unwrap().is_none());

    assert_eq!(h.vault.list_videos("UC1").await.unwrap(), vec!["vid1", "vid2"]);
    assert!(h.queue.get(TaskKind::VideoForChannelCheck, "UC1").unwrap().is_none());

    // Retried unchanged once the prerequisite appears
    h.catalog
        .upsert_channel_info(channel_info("UC0-deleted", None, 1))
        .unwrap();
    h.pipeline
        .run_stage(Stage::RunVideoForChannelCheck, None)
        .await
        .unwrap();
    assert_eq!(h.queue.pending_count(TaskKind::VideoForChannelCheck).unwrap(), 0);
}

#[tokio::test]
async fn transient_failure_counts_attempts_then_dead_letters() {
    let h = harness(
        StubPlatform::default()
            .with_channel("UC1", "One", 1, "UU1")
            .with_failing_channel("UC2"),
        test_config(""),
    );
    subscribe(&h.catalog, "UC1");
    subscribe(&h.catalog, "UC2");
    h.pipeline.run_stage(Stage::StageChannelCheck, None).await.unwrap();

    for expected_attempts in 1..=2 {
        h.pipeline.run_stage(Stage::RunChannelCheck, None).await.unwrap();
        let pending = h.queue.get(TaskKind::ChannelCheck, "UC2").unwrap().unwrap();
        assert_eq!(pending.attempts, expected_attempts);
    }
    assert!(h.catalog.find_channel_info_by_external_id("UC1").unwrap().is_some());

    h.pipeline.run_stage(Stage::RunChannelCheck, None).await.unwrap();
    assert!(h.queue.get(TaskKind::ChannelCheck, "UC2").unwrap().is_none());
    assert!(h.queue.dead_lettered(TaskKind::ChannelCheck, "UC2").unwrap().is_some());
}

#[tokio::test]
async fn detail_harvest_is_at_most_once() {
    let h = harness(
        StubPlatform::default().with_uploads("UU1", "UC1", &["vid1", "vid2", "vid3"]),
        test_config(""),
    );
    for video_id in ["vid1", "vid2", "vid3"] {
        h.vault
            .put_video("UC1", video_id, &json!({"snippet": {"resourceId": {"videoId": video_id}}}))
            .await
            .unwrap();
    }

    let first = h.pipeline.run_stage(Stage::FetchVideoDetails, None).await.unwrap();
    assert!(matches!(first, StageOutcome::Details(report) if report.fetched == 3));
    assert_eq!(h.platform.calls(|c| &c.videos), 3);

    let second = h.pipeline.run_stage(Stage::FetchVideoDetails, None).await.unwrap();
    assert!(matches!(second, StageOutcome::Details(report) if report.fetched == 0 && report.skipped == 3));
    assert_eq!(h.platform.calls(|c| &c.videos), 3);

    // Downloads are off by default, so nothing is chained
    assert_eq!(h.queue.pending_count(TaskKind::VideoFetch).unwrap(), 0);
}

#[tokio::test]
async fn vanished_video_is_not_fetched_again() {
    let h = harness(StubPlatform::default(), test_config(""));
    h.vault.put_video("UC1", "deleted", &json!({})).await.unwrap();

    let first = h.pipeline.run_stage(Stage::FetchVideoDetails, None).await.unwrap();
    assert!(matches!(first, StageOutcome::Details(report) if report.missing == 1));
    assert_eq!(h.platform.calls(|c| &c.videos), 1);

    let second = h.pipeline.run_stage(Stage::FetchVideoDetails, None).await.unwrap();
    assert!(matches!(second, StageOutcome::Details(report) if report.skipped == 1 && report.missing == 0));
    assert_eq!(h.platform.calls(|c| &c.videos), 1);
}

/// Records how many ChannelCheck descriptors were still queued at each flush
struct FlushTrackingCatalog {
    inner: FjallCatalog,
    queue: Arc<DescriptorStore>,
    pending_at_flush: Mutex<Vec<usize>>,
}

impl CatalogStore for FlushTrackingCatalog {
    fn find_subscription_by_external_id(
        &self,
        external_id: &str,
    ) -> vidharvest::catalog::Result<Option<Subscription>> {
        self.inner.find_subscription_by_external_id(external_id)
    }

    fn upsert_subscription(
        &self,
        update: SubscriptionUpdate,
    ) -> vidharvest::catalog::Result<Subscription> {
        self.inner.upsert_subscription(update)
    }

    fn find_channel_info_by_external_id(
        &self,
        channel_id: &str,
    ) -> vidharvest::catalog::Result<Option<ChannelInfo>> {
        self.inner.find_channel_info_by_external_id(channel_id)
    }

    fn upsert_channel_info(&self, info: ChannelInfo) -> vidharvest::catalog::Result<()> {
        self.inner.upsert_channel_info(info)
    }

    fn list_all_subscriptions(&self) -> vidharvest::catalog::Result<Vec<Subscription>> {
        self.inner.list_all_subscriptions()
    }

    fn list_all_channel_infos(&self) -> vidharvest::catalog::Result<Vec<ChannelInfo>> {
        self.inner.list_all_channel_infos()
    }

    fn persist(&self) -> vidharvest::catalog::Result<()> {
        let pending = self.queue.pending_count(TaskKind::ChannelCheck).unwrap();
        self.pending_at_flush.lock().unwrap().push(pending);
        self.inner.persist()
    }
}

#[tokio::test]
async fn channel_info_is_flushed_before_descriptor_is_archived() {
    let temp = TempDir::new().unwrap();
    let queue = Arc::new(DescriptorStore::open(temp.path().join("queue")).unwrap());
    let catalog = Arc::new(FlushTrackingCatalog {
        inner: FjallCatalog::open(temp.path().join("catalog")).unwrap(),
        queue: queue.clone(),
        pending_at_flush: Mutex::new(Vec::new()),
    });
    let pipeline = Pipeline::new(
        queue.clone(),
        Arc::new(StubPlatform::default().with_channel("UC1", "Test", 10, "UU1")),
        catalog.clone(),
        VideoVault::in_memory(),
        Arc::new(Metrics::new()),
        PipelineSettings::from_config(&test_config("")),
    );
    queue
        .enqueue(TaskKind::ChannelCheck, "UC1", BTreeMap::new())
        .unwrap();

    pipeline.run_stage(Stage::RunChannelCheck, None).await.unwrap();

    // First flush by the handler while the descriptor is queued, then once at stage end
    let flushes = catalog.pending_at_flush.lock().unwrap().clone();
    assert_eq!(flushes, vec![1, 0]);
    assert!(queue.archived(TaskKind::ChannelCheck, "UC1").unwrap().is_some());
}

#[tokio::test]
async fn full_chain_from_subscription_listing() {
    let platform = StubPlatform::default()
        .with_subscription_page(
            None,
            json!({
                "nextPageToken": "PAGE2",
                "items": [{"id": "s1", "snippet": {"title": "One", "resourceId": {"channelId": "UC1"}}}]
            }),
        )
        .with_subscription_page(
            Some("PAGE2"),
            json!({
                "items": [
                    {"id": "s2", "snippet": {"title": "Two", "resourceId": {"channelId": "UC2"}}},
                    {"id": "s3", "snippet": {"title": "Broken", "resourceId": {}}}
                ]
            }),
        )
        .with_channel("UC1", "One", 5, "UU1")
        .with_channel("UC2", "Two", 6, "UU2")
        .with_uploads("UU1", "UC1", &["a1", "a2"])
        .with_uploads("UU2", "UC2", &["b1"]);
    let h = harness(platform, test_config(""));

    let summary = h.pipeline.run_stages(&Stage::ALL, None).await;
    assert!(summary.all_succeeded(), "{:?}", summary);
    assert!(matches!(summary.get(Stage::RunDownloads), Some(Ok(StageOutcome::Disabled))));

    assert_eq!(h.platform.calls(|c| &c.subscriptions), 2);
    assert_eq!(h.vault.list_subscription_pages().await.unwrap().len(), 2);

    let subscriptions = h.catalog.list_all_subscriptions().unwrap();
    assert_eq!(subscriptions.len(), 2);
    assert_eq!(h.catalog.list_all_channel_infos().unwrap().len(), 2);
    assert_eq!(h.vault.list_channels().await.unwrap(), vec!["UC1", "UC2"]);
    assert!(h.vault.has_video_details("UC1", "a2").await.unwrap());
    assert!(h.vault.has_video_details("UC2", "b1").await.unwrap());

    for kind in [TaskKind::ChannelCheck, TaskKind::VideoForChannelCheck] {
        assert_eq!(h.queue.pending_count(kind).unwrap(), 0);
    }

    // A second pass re-imports without duplicating subscriptions
    h.pipeline.run_stages(&[Stage::FetchSubs, Stage::SubsToDb], None).await;
    let again = h.catalog.list_all_subscriptions().unwrap();
    assert_eq!(again.len(), 2);
    let ids: HashSet<u64> = again.iter().map(|sub| sub.id).collect();
    let original: HashSet<u64> = subscriptions.iter().map(|sub| sub.id).collect();
    assert_eq!(ids, original);
}

#[tokio::test]
async fn stale_subscription_snapshots_are_pruned() {
    let platform = StubPlatform::default().with_subscription_page(None, json!({"items": []}));
    let h = harness(platform, test_config(""));
    h.vault
        .put_subscription_page(Some("OLD"), &json!({"items": []}))
        .await
        .unwrap();

    let outcome = h.pipeline.run_stage(Stage::FetchSubs, None).await.unwrap();

    assert!(matches!(outcome, StageOutcome::Fetched(report) if report.pages == 1 && report.pruned == 1));
    assert_eq!(
        h.vault.list_subscription_pages().await.unwrap(),
        vec!["subs/mysubs-first.json"]
    );
}

#[tokio::test]
async fn failed_prerequisite_skips_dependent_stage() {
    let platform = StubPlatform {
        fail_subscriptions: true,
        ..StubPlatform::default()
    };
    let h = harness(platform, test_config(""));

    let summary = h
        .pipeline
        .run_stages(&[Stage::SubsToDb, Stage::FetchSubs], None)
        .await;

    assert_eq!(summary.results[0].0, Stage::FetchSubs);
    assert!(matches!(summary.get(Stage::FetchSubs), Some(Err(PipelineError::Harvest(_)))));
    assert!(matches!(
        summary.get(Stage::SubsToDb),
        Some(Err(PipelineError::PrerequisiteFailed(Stage::FetchSubs)))
    ));
    assert!(!summary.all_succeeded());
}

#[tokio::test]
async fn held_lease_skips_stage() {
    let h = harness(
        StubPlatform::default().with_channel("UC1", "Test", 10, "UU1"),
        test_config(""),
    );
    subscribe(&h.catalog, "UC1");
    h.pipeline.run_stage(Stage::StageChannelCheck, None).await.unwrap();

    let lease = h
        .queue
        .acquire_lease("run-channel-check", Duration::from_secs(600))
        .unwrap()
        .unwrap();

    let outcome = h.pipeline.run_stage(Stage::RunChannelCheck, None).await.unwrap();
    assert_eq!(outcome, StageOutcome::LeaseHeld);
    assert_eq!(h.queue.pending_count(TaskKind::ChannelCheck).unwrap(), 1);
    assert_eq!(h.platform.calls(|c| &c.channels), 0);

    assert!(h.queue.release_lease(&lease).unwrap());
    h.pipeline.run_stage(Stage::RunChannelCheck, None).await.unwrap();
    assert_eq!(h.queue.pending_count(TaskKind::ChannelCheck).unwrap(), 0);

    // The stage released its own lease when it finished
    assert!(h.queue.acquire_lease("run-channel-check", Duration::from_secs(600)).unwrap().is_some());
}

#[cfg(unix)]
#[tokio::test]
async fn detail_records_chain_downloads_when_enabled() {
    let config = test_config(
        r#"
[downloads]
enabled = true
binary = "sh"
extra_args = ["-c", "exit 0", "downloader"]
timeout = "30s"
"#,
    );
    let h = harness(
        StubPlatform::default().with_uploads("UU1", "UC1", &["vid1"]),
        config,
    );
    h.vault.put_video("UC1", "vid1", &json!({})).await.unwrap();

    h.pipeline.run_stage(Stage::FetchVideoDetails, None).await.unwrap();

    let fetch = h.queue.get(TaskKind::VideoFetch, "vid1").unwrap().unwrap();
    assert_eq!(fetch.context_value(CONTEXT_CHANNEL_ID), Some("UC1"));

    let outcome = h.pipeline.run_stage(Stage::RunDownloads, None).await.unwrap();
    assert!(matches!(outcome, StageOutcome::Drained(manifest) if manifest.outcomes() == vec![true]));
    assert!(h.queue.archived(TaskKind::VideoFetch, "vid1").unwrap().is_some());
}

#[tokio::test]
async fn scheduler_runs_chains_until_shutdown() {
    let platform = StubPlatform::default()
        .with_subscription_page(
            None,
            json!({"items": [{"id": "s1", "snippet": {"title": "One", "resourceId": {"channelId": "UC1"}}}]}),
        )
        .with_channel("UC1", "One", 5, "UU1")
        .with_uploads("UU1", "UC1", &["v1"]);
    let h = harness(platform, test_config(""));
    let config = test_config("");

    Scheduler::new(h.pipeline.clone(), &config.schedule)
        .run(tokio::time::sleep(Duration::from_millis(500)))
        .await;

    assert!(h.catalog.find_channel_info_by_external_id("UC1").unwrap().is_some());
    assert!(h.vault.has_video_details("UC1", "v1").await.unwrap());
    // The daily chain covers the frequent one, so subscriptions were listed once
    assert_eq!(h.platform.calls(|c| &c.subscriptions), 1);
    assert_eq!(h.platform.calls(|c| &c.playlist_items), 1);
}
