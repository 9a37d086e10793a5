//! Wire models for the video platform's JSON responses
//!
//! Only the fields the harvesters read are typed. Playlist items and video
//! details stay raw JSON, since they are written to the vault as snapshots.

use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One page of the "my subscriptions" listing
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionListResponse {
    #[serde(default)]
    pub next_page_token: Option<String>,
    #[serde(default)]
    pub items: Vec<SubscriptionItem>,
}

impl SubscriptionListResponse {
    /// Cursor for the following page; an empty token means the listing is done
    pub fn next_token(&self) -> Option<&str> {
        self.next_page_token.as_deref().filter(|token| !token.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionItem {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub snippet: SubscriptionSnippet,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSnippet {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// When the subscription was made
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resource_id: ResourceId,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceId {
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub video_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelListResponse {
    #[serde(default)]
    pub items: Vec<ChannelResource>,
}

/// Channel as returned with `part=snippet,contentDetails,statistics`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelResource {
    pub id: String,
    #[serde(default)]
    pub snippet: ChannelSnippet,
    #[serde(default)]
    pub content_details: ChannelContentDetails,
    #[serde(default)]
    pub statistics: ChannelStatistics,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSnippet {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub custom_url: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub thumbnails: Thumbnails,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Thumbnails {
    #[serde(default)]
    pub default: Option<Thumbnail>,
    #[serde(default)]
    pub medium: Option<Thumbnail>,
    #[serde(default)]
    pub high: Option<Thumbnail>,
}

impl Thumbnails {
    /// Smallest available thumbnail
    pub fn best_url(&self) -> Option<&str> {
        [&self.default, &self.medium, &self.high]
            .into_iter()
            .flatten()
            .map(|thumbnail| thumbnail.url.as_str())
            .next()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Thumbnail {
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelContentDetails {
    #[serde(default)]
    pub related_playlists: RelatedPlaylists,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RelatedPlaylists {
    #[serde(default)]
    pub uploads: Option<String>,
}

/// Counts arrive as decimal strings; numbers are accepted too
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStatistics {
    #[serde(default, deserialize_with = "deserialize_count")]
    pub subscriber_count: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_count")]
    pub video_count: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_count")]
    pub view_count: Option<u64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Count {
    Number(u64),
    Text(String),
}

fn deserialize_count<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Count>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Count::Number(n)) => Ok(Some(n)),
        Some(Count::Text(s)) => s.trim().parse().map(Some).map_err(de::Error::custom),
    }
}

/// One page of a playlist listing; items are kept verbatim
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistItemListResponse {
    #[serde(default)]
    pub next_page_token: Option<String>,
    #[serde(default)]
    pub items: Vec<Value>,
}

impl PlaylistItemListResponse {
    pub fn has_more(&self) -> bool {
        self.next_page_token
            .as_deref()
            .is_some_and(|token| !token.is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoListResponse {
    #[serde(default)]
    pub items: Vec<Value>,
}

/// Video id of a playlist item (`snippet.resourceId.videoId`, then `contentDetails.videoId`)
pub fn playlist_item_video_id(item: &Value) -> Option<&str> {
    item.pointer("/snippet/resourceId/videoId")
        .or_else(|| item.pointer("/contentDetails/videoId"))
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
}

/// Channel that published a playlist item (`snippet.channelId`)
pub fn playlist_item_channel_id(item: &Value) -> Option<&str> {
    item.pointer("/snippet/channelId")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_channel_counts_from_strings() {
        let raw = json!({
            "id": "UC1",
            "snippet": {
                "title": "Test",
                "description": "About",
                "customUrl": "@test",
                "publishedAt": "2015-03-01T10:00:00Z",
                "thumbnails": {"medium": {"url": "https://img/m.jpg"}}
            },
            "contentDetails": {"relatedPlaylists": {"uploads": "UU1"}},
            "statistics": {"subscriberCount": "10", "videoCount": 4, "viewCount": "1200"}
        });

        let channel: ChannelResource = serde_json::from_value(raw).unwrap();
        assert_eq!(channel.snippet.title, "Test");
        assert_eq!(channel.statistics.subscriber_count, Some(10));
        assert_eq!(channel.statistics.video_count, Some(4));
        assert_eq!(channel.statistics.view_count, Some(1200));
        assert_eq!(channel.content_details.related_playlists.uploads.as_deref(), Some("UU1"));
        assert_eq!(channel.snippet.thumbnails.best_url(), Some("https://img/m.jpg"));
    }

    #[test]
    fn test_hidden_subscriber_count() {
        let raw = json!({"id": "UC2", "statistics": {"hiddenSubscriberCount": true}});
        let channel: ChannelResource = serde_json::from_value(raw).unwrap();
        assert_eq!(channel.statistics.subscriber_count, None);
        assert!(channel.content_details.related_playlists.uploads.is_none());
    }

    #[test]
    fn test_subscription_page_cursor() {
        let page: SubscriptionListResponse =
            serde_json::from_value(json!({"nextPageToken": "", "items": []})).unwrap();
        assert_eq!(page.next_token(), None);

        let page: SubscriptionListResponse = serde_json::from_value(json!({
            "nextPageToken": "CAUQAA",
            "items": [{
                "id": "sub-1",
                "snippet": {
                    "title": "Chan",
                    "resourceId": {"kind": "youtube#channel", "channelId": "UC1"}
                }
            }]
        }))
        .unwrap();
        assert_eq!(page.next_token(), Some("CAUQAA"));
        assert_eq!(page.items[0].snippet.resource_id.channel_id.as_deref(), Some("UC1"));
    }

    #[test]
    fn test_playlist_item_ids() {
        let item = json!({
            "snippet": {"channelId": "UC1", "resourceId": {"videoId": "vid1"}}
        });
        assert_eq!(playlist_item_video_id(&item), Some("vid1"));
        assert_eq!(playlist_item_channel_id(&item), Some("UC1"));

        let item = json!({"contentDetails": {"videoId": "vid2"}});
        assert_eq!(playlist_item_video_id(&item), Some("vid2"));
        assert_eq!(playlist_item_video_id(&json!({})), None);
    }
}
