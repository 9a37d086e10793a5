//! Keyed JSON storage for subscription page snapshots and per-video records
//! Uses Apache Arrow object_store crate
//!
//! Layout:
//! - `subs/mysubs-{page_token}.json` - raw subscription listing pages
//! - `channels/{channel_id}/{video_id}.json` - one playlist item per enumerated video
//! - `channels/{channel_id}/details-{video_id}.json` - enriched video detail
//!
//! Presence of a detail record is the memo that stops it being fetched again.

use object_store::{ListResult, ObjectStore, local::LocalFileSystem, path::Path as StoragePath};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

const SUBS_PREFIX: &str = "subs";
const SUBS_FILE_PREFIX: &str = "mysubs-";
const CHANNELS_PREFIX: &str = "channels";
const DETAILS_FILE_PREFIX: &str = "details-";
const JSON_SUFFIX: &str = ".json";
/// Snapshot name used for the first listing page, which has no token
const FIRST_PAGE_TOKEN: &str = "first";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object store error: {0}")]
    ObjectStoreError(#[from] object_store::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid key segment: {0:?}")]
    InvalidSegment(String),
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

/// Vault of JSON records wrapping object_store
#[derive(Clone)]
pub struct VideoVault {
    store: Arc<dyn ObjectStore>,
}

impl VideoVault {
    /// Create a vault over any object_store backend
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Vault rooted at an existing local directory
    pub fn local(root: impl AsRef<Path>) -> Result<Self> {
        let store = LocalFileSystem::new_with_prefix(root.as_ref())?;
        Ok(Self::new(Arc::new(store)))
    }

    /// Create in-memory storage for testing/development
    pub fn in_memory() -> Self {
        Self::new(Arc::new(object_store::memory::InMemory::new()))
    }

    /// Key of the snapshot for one subscription listing page
    pub fn subscription_page_key(page_token: Option<&str>) -> Result<String> {
        let token = page_token.unwrap_or(FIRST_PAGE_TOKEN);
        check_segment(token)?;
        Ok(format!("{SUBS_PREFIX}/{SUBS_FILE_PREFIX}{token}{JSON_SUFFIX}"))
    }

    pub async fn put_subscription_page<T: Serialize>(
        &self,
        page_token: Option<&str>,
        page: &T,
    ) -> Result<String> {
        let key = Self::subscription_page_key(page_token)?;
        self.put_json(&key, page).await?;
        Ok(key)
    }

    /// Keys of every stored subscription page snapshot
    pub async fn list_subscription_pages(&self) -> Result<Vec<String>> {
        let listing = self.list_dir(&StoragePath::from(SUBS_PREFIX)).await?;

        let mut keys: Vec<String> = listing
            .objects
            .into_iter()
            .filter(|meta| {
                meta.location
                    .filename()
                    .is_some_and(|name| name.starts_with(SUBS_FILE_PREFIX) && name.ends_with(JSON_SUFFIX))
            })
            .map(|meta| meta.location.to_string())
            .collect();
        keys.sort();
        Ok(keys)
    }

    pub async fn put_video(
        &self,
        channel_id: &str,
        video_id: &str,
        record: &serde_json::Value,
    ) -> Result<()> {
        let key = video_key(channel_id, video_id)?;
        self.put_json(&key, record).await
    }

    pub async fn put_video_details(
        &self,
        channel_id: &str,
        video_id: &str,
        details: &serde_json::Value,
    ) -> Result<()> {
        let key = details_key(channel_id, video_id)?;
        self.put_json(&key, details).await
    }

    pub async fn has_video_details(&self, channel_id: &str, video_id: &str) -> Result<bool> {
        self.exists(&details_key(channel_id, video_id)?).await
    }

    /// Channel namespaces that hold at least one record
    pub async fn list_channels(&self) -> Result<Vec<String>> {
        let listing = self.list_dir(&StoragePath::from(CHANNELS_PREFIX)).await?;

        let mut channels: Vec<String> = listing
            .common_prefixes
            .iter()
            .filter_map(|prefix| prefix.filename().map(str::to_string))
            .collect();
        channels.sort();
        Ok(channels)
    }

    /// Video ids enumerated for a channel; detail records are not included
    pub async fn list_videos(&self, channel_id: &str) -> Result<Vec<String>> {
        check_segment(channel_id)?;
        let prefix = StoragePath::from(format!("{CHANNELS_PREFIX}/{channel_id}"));
        let listing = self.list_dir(&prefix).await?;

        let mut videos: Vec<String> = listing
            .objects
            .iter()
            .filter_map(|meta| meta.location.filename())
            .filter(|name| !name.starts_with(DETAILS_FILE_PREFIX))
            .filter_map(|name| name.strip_suffix(JSON_SUFFIX))
            .map(str::to_string)
            .collect();
        videos.sort();
        Ok(videos)
    }

    /// Serialize and store a JSON document
    pub async fn put_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let path = StoragePath::from(key);
        let data = serde_json::to_vec_pretty(value)?;
        let size = data.len();

        self.store.put(&path, data.into()).await?;

        tracing::debug!(key, size, "Stored record");
        Ok(())
    }

    pub async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let path = StoragePath::from(key);
        let bytes = self.store.get(&path).await?.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Check if key exists
    pub async fn exists(&self, key: &str) -> Result<bool> {
        let path = StoragePath::from(key);

        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// A prefix that was never written lists as empty
    async fn list_dir(&self, prefix: &StoragePath) -> Result<ListResult> {
        match self.store.list_with_delimiter(Some(prefix)).await {
            Ok(listing) => Ok(listing),
            Err(object_store::Error::NotFound { .. }) => Ok(ListResult {
                common_prefixes: Vec::new(),
                objects: Vec::new(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        let path = StoragePath::from(key);

        match self.store.delete(&path).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Reject ids that would escape their namespace
fn check_segment(segment: &str) -> Result<()> {
    if segment.is_empty() || segment.contains('/') || segment.starts_with('.') {
        return Err(StorageError::InvalidSegment(segment.to_string()));
    }
    Ok(())
}

fn video_key(channel_id: &str, video_id: &str) -> Result<String> {
    check_segment(channel_id)?;
    check_segment(video_id)?;
    Ok(format!("{CHANNELS_PREFIX}/{channel_id}/{video_id}{JSON_SUFFIX}"))
}

fn details_key(channel_id: &str, video_id: &str) -> Result<String> {
    check_segment(channel_id)?;
    check_segment(video_id)?;
    Ok(format!(
        "{CHANNELS_PREFIX}/{channel_id}/{DETAILS_FILE_PREFIX}{video_id}{JSON_SUFFIX}"
    ))
}
