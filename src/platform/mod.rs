//! External video platform API
//!
//! The harvesters only see [`VideoPlatform`]; [`YouTubeClient`] is the HTTP
//! implementation. Every error it returns is treated as retry-eligible.

pub mod client;
pub mod models;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use client::YouTubeClient;
pub use models::{
    ChannelResource, PlaylistItemListResponse, SubscriptionItem, SubscriptionListResponse,
    playlist_item_channel_id, playlist_item_video_id,
};

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("HTTP request failed: {0}")]
    Request(String),

    #[error("Request timed out")]
    Timeout,

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("API quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("No credentials configured for {0}")]
    MissingCredentials(&'static str),
}

impl PlatformError {
    /// False when the call failed locally before any request went out
    pub fn sent_request(&self) -> bool {
        !matches!(self, PlatformError::MissingCredentials(_))
    }
}

pub type Result<T> = std::result::Result<T, PlatformError>;

/// Read-only calls the harvesting pipeline makes against the platform
#[async_trait]
pub trait VideoPlatform: Send + Sync {
    /// One page of the authorised user's subscriptions
    async fn list_my_subscriptions(
        &self,
        page_token: Option<&str>,
    ) -> Result<SubscriptionListResponse>;

    /// Channel metadata, or `None` if the channel no longer exists
    async fn get_channel(&self, channel_id: &str) -> Result<Option<ChannelResource>>;

    async fn list_playlist_items(
        &self,
        playlist_id: &str,
        max_results: u32,
        page_token: Option<&str>,
    ) -> Result<PlaylistItemListResponse>;

    /// Full video resource, or `None` if the video is gone
    async fn get_video(&self, video_id: &str) -> Result<Option<Value>>;
}
