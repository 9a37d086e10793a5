use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::catalog::{CatalogStore, ChannelInfo};
use crate::platform::{ChannelResource, VideoPlatform};
use crate::queue::{Descriptor, TaskKind};
use crate::worker::{TaskError, TaskHandler, TaskOutcome};

/// Refreshes one channel's cached metadata per descriptor
pub struct ChannelCheckHandler {
    platform: Arc<dyn VideoPlatform>,
    catalog: Arc<dyn CatalogStore>,
}

impl ChannelCheckHandler {
    pub fn new(platform: Arc<dyn VideoPlatform>, catalog: Arc<dyn CatalogStore>) -> Self {
        Self { platform, catalog }
    }
}

#[async_trait]
impl TaskHandler for ChannelCheckHandler {
    fn kind(&self) -> TaskKind {
        TaskKind::ChannelCheck
    }

    async fn handle(&self, descriptor: &Descriptor) -> Result<TaskOutcome, TaskError> {
        let channel_id = descriptor.subject_id.as_str();

        let Some(resource) = self.platform.get_channel(channel_id).await? else {
            warn!(channel_id, "Channel not found on platform");
            return Ok(TaskOutcome::failure("channel not found on platform"));
        };

        let info = to_channel_info(resource, Utc::now());
        let name = info.name.clone();
        self.catalog.upsert_channel_info(info)?;
        // Durable before the runner archives the descriptor
        self.catalog.persist()?;

        info!(channel_id, name = %name, "Channel info refreshed");
        Ok(TaskOutcome::success(format!("channel info refreshed: {}", name)))
    }
}

/// Map the API resource onto a complete catalog record
pub fn to_channel_info(resource: ChannelResource, checked_at: DateTime<Utc>) -> ChannelInfo {
    let thumbnail_url = resource
        .snippet
        .thumbnails
        .best_url()
        .map(str::to_string);

    ChannelInfo {
        id: resource.id,
        name: resource.snippet.title,
        description: resource.snippet.description,
        created_at: resource.snippet.published_at,
        custom_url: resource.snippet.custom_url,
        thumbnail_url,
        subscriber_count: resource.statistics.subscriber_count,
        video_count: resource.statistics.video_count,
        view_count: resource.statistics.view_count,
        uploads_playlist_id: resource.content_details.related_playlists.uploads,
        last_check: checked_at,
    }
}
