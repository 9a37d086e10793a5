//! HTTP client for the YouTube Data API

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use super::models::{
    ChannelListResponse, ChannelResource, PlaylistItemListResponse, SubscriptionListResponse,
    VideoListResponse,
};
use super::{PlatformError, Result, VideoPlatform};
use crate::config::ApiConfig;

const CHANNEL_PARTS: &str = "snippet,contentDetails,statistics";
const VIDEO_PARTS: &str = "snippet,contentDetails,statistics,status,topicDetails";
/// Error reasons the API uses for exhausted quota
const QUOTA_REASONS: [&str; 3] = ["quotaExceeded", "dailyLimitExceeded", "rateLimitExceeded"];

enum Auth {
    /// Endpoint only works for an authorised user
    User,
    /// Public data; an API key is enough
    Public,
}

pub struct YouTubeClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    access_token: Option<String>,
    subscriptions_page_size: u32,
}

impl YouTubeClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout.as_duration())
            .timeout(config.request_timeout.as_duration())
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| PlatformError::Request(e.to_string()))?;

        if config.access_token.is_none() && config.api_key.is_none() {
            warn!("No API key or access token configured, API calls will fail");
        }

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            access_token: config.access_token.clone(),
            subscriptions_page_size: config.page_size,
        })
    }

    fn authorize(&self, request: RequestBuilder, auth: Auth, resource: &'static str) -> Result<RequestBuilder> {
        match (&self.access_token, &self.api_key, auth) {
            (Some(token), _, _) => Ok(request.bearer_auth(token)),
            (None, Some(key), Auth::Public) => Ok(request.query(&[("key", key.as_str())])),
            _ => Err(PlatformError::MissingCredentials(resource)),
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        resource: &'static str,
        params: &[(&str, &str)],
        auth: Auth,
    ) -> Result<T> {
        let url = format!("{}/{}", self.base_url, resource);
        let request = self.authorize(self.client.get(&url).query(params), auth, resource)?;

        debug!(resource, "Calling platform API");

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                PlatformError::Timeout
            } else {
                PlatformError::Request(e.to_string())
            }
        })?;

        let status = response.status();
        let body: Bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                PlatformError::Timeout
            } else {
                PlatformError::Request(format!("Failed to read body: {}", e))
            }
        })?;

        if !status.is_success() {
            return Err(classify_error(status, &body));
        }

        debug!(resource, size = body.len(), "Platform API call completed");
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Map a non-success response to an error, detecting quota exhaustion
fn classify_error(status: StatusCode, body: &[u8]) -> PlatformError {
    let parsed: Option<Value> = serde_json::from_slice(body).ok();
    let error = parsed.as_ref().and_then(|value| value.get("error"));

    let message = error
        .and_then(|error| error.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown").to_string());

    let quota = error
        .and_then(|error| error.get("errors"))
        .and_then(Value::as_array)
        .is_some_and(|errors| {
            errors.iter().any(|entry| {
                entry
                    .get("reason")
                    .and_then(Value::as_str)
                    .is_some_and(|reason| QUOTA_REASONS.contains(&reason))
            })
        });

    if quota {
        PlatformError::QuotaExceeded(message)
    } else {
        PlatformError::Status {
            status: status.as_u16(),
            message,
        }
    }
}

#[async_trait]
impl VideoPlatform for YouTubeClient {
    async fn list_my_subscriptions(
        &self,
        page_token: Option<&str>,
    ) -> Result<SubscriptionListResponse> {
        let max_results = self.subscriptions_page_size.to_string();
        let mut params = vec![
            ("part", "snippet"),
            ("mine", "true"),
            ("maxResults", max_results.as_str()),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }
        self.get_json("subscriptions", &params, Auth::User).await
    }

    async fn get_channel(&self, channel_id: &str) -> Result<Option<ChannelResource>> {
        let params = [("part", CHANNEL_PARTS), ("id", channel_id)];
        let response: ChannelListResponse =
            self.get_json("channels", &params, Auth::Public).await?;
        Ok(response.items.into_iter().next())
    }

    async fn list_playlist_items(
        &self,
        playlist_id: &str,
        max_results: u32,
        page_token: Option<&str>,
    ) -> Result<PlaylistItemListResponse> {
        let max_results = max_results.to_string();
        let mut params = vec![
            ("part", "snippet,contentDetails"),
            ("playlistId", playlist_id),
            ("maxResults", max_results.as_str()),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }
        self.get_json("playlistItems", &params, Auth::Public).await
    }

    async fn get_video(&self, video_id: &str) -> Result<Option<Value>> {
        let params = [("part", VIDEO_PARTS), ("id", video_id)];
        let response: VideoListResponse = self.get_json("videos", &params, Auth::Public).await?;
        Ok(response.items.into_iter().next())
    }
}
