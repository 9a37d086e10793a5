use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// "I follow channel X"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Local surrogate id, stable across upserts
    pub id: u64,
    /// External channel id (unique)
    pub external_id: String,
    pub name: String,
    pub description: String,
    pub subscribed_at: Option<DateTime<Utc>>,
    pub last_check: DateTime<Utc>,
}

/// Mutable fields of a subscription, as read from a listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionUpdate {
    pub external_id: String,
    pub name: String,
    pub description: String,
    pub subscribed_at: Option<DateTime<Utc>>,
    pub last_check: DateTime<Utc>,
}

/// Cached channel metadata, keyed by the external channel id
///
/// Always written whole: a check replaces the previous record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub created_at: Option<DateTime<Utc>>,
    pub custom_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub subscriber_count: Option<u64>,
    pub video_count: Option<u64>,
    pub view_count: Option<u64>,
    pub uploads_playlist_id: Option<String>,
    pub last_check: DateTime<Utc>,
}
