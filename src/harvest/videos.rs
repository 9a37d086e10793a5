use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::catalog::CatalogStore;
use crate::platform::{VideoPlatform, playlist_item_video_id};
use crate::queue::{Descriptor, TaskKind};
use crate::storage::VideoVault;
use crate::worker::{TaskError, TaskHandler, TaskOutcome};

/// Enumerates the newest page of a channel's uploads into per-video records
///
/// One page per descriptor per run. Older uploads beyond the first page are
/// not reached; re-fetched items overwrite their existing records.
pub struct VideoCheckHandler {
    platform: Arc<dyn VideoPlatform>,
    catalog: Arc<dyn CatalogStore>,
    vault: VideoVault,
    page_size: u32,
}

impl VideoCheckHandler {
    pub fn new(
        platform: Arc<dyn VideoPlatform>,
        catalog: Arc<dyn CatalogStore>,
        vault: VideoVault,
        page_size: u32,
    ) -> Self {
        Self {
            platform,
            catalog,
            vault,
            page_size,
        }
    }
}

#[async_trait]
impl TaskHandler for VideoCheckHandler {
    fn kind(&self) -> TaskKind {
        TaskKind::VideoForChannelCheck
    }

    async fn handle(&self, descriptor: &Descriptor) -> Result<TaskOutcome, TaskError> {
        let channel_id = descriptor.subject_id.as_str();

        let Some(info) = self.catalog.find_channel_info_by_external_id(channel_id)? else {
            return Err(TaskError::PrerequisiteMissing(format!(
                "no channel info for {}",
                channel_id
            )));
        };

        let Some(uploads) = info.uploads_playlist_id.as_deref() else {
            info!(channel_id, "Channel has no uploads collection");
            return Ok(TaskOutcome::success("channel has no uploads collection").without_call());
        };

        let page = self
            .platform
            .list_playlist_items(uploads, self.page_size, None)
            .await?;

        let mut stored = 0usize;
        for item in &page.items {
            let Some(video_id) = playlist_item_video_id(item) else {
                warn!(channel_id, "Playlist item without a video id, skipping");
                continue;
            };
            self.vault.put_video(channel_id, video_id, item).await?;
            stored += 1;
        }

        debug!(channel_id, stored, "Stored playlist items");

        let mut message = format!("stored {} videos", stored);
        if page.has_more() {
            warn!(channel_id, stored, "More uploads available beyond the first page");
            message.push_str("; more pages available");
        }

        Ok(TaskOutcome::success(message))
    }
}
