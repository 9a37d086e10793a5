use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Context key carried by VideoFetch descriptors
pub const CONTEXT_CHANNEL_ID: &str = "channel_id";

/// Task kinds, one queue each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
    ChannelCheck,
    VideoForChannelCheck,
    VideoFetch,
}

impl TaskKind {
    pub const ALL: [TaskKind; 3] = [
        TaskKind::ChannelCheck,
        TaskKind::VideoForChannelCheck,
        TaskKind::VideoFetch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::ChannelCheck => "channel-check",
            TaskKind::VideoForChannelCheck => "video-for-channel-check",
            TaskKind::VideoFetch => "video-fetch",
        }
    }

    /// Fjall partition holding pending descriptors of this kind
    pub(crate) fn partition_name(&self) -> &'static str {
        match self {
            TaskKind::ChannelCheck => "queue_channel_check",
            TaskKind::VideoForChannelCheck => "queue_video_for_channel_check",
            TaskKind::VideoFetch => "queue_video_fetch",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result attached to a descriptor once it has been processed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub success: bool,
    pub message: String,
}

impl Outcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// A persisted record of intended work for one subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    pub kind: TaskKind,
    /// Channel id or video id; unique within its queue
    pub subject_id: String,
    pub requested_at: DateTime<Utc>,
    /// Transient failures recorded so far
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    #[serde(default)]
    pub outcome: Option<Outcome>,
    #[serde(default)]
    pub performed_at: Option<DateTime<Utc>>,
}

impl Descriptor {
    pub fn new(kind: TaskKind, subject_id: impl Into<String>) -> Self {
        Self {
            kind,
            subject_id: subject_id.into(),
            requested_at: Utc::now(),
            attempts: 0,
            last_error: None,
            context: BTreeMap::new(),
            outcome: None,
            performed_at: None,
        }
    }

    pub fn with_context(mut self, context: BTreeMap<String, String>) -> Self {
        self.context = context;
        self
    }

    pub fn context_value(&self, key: &str) -> Option<&str> {
        self.context.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_are_distinct() {
        let names: std::collections::HashSet<_> =
            TaskKind::ALL.iter().map(|k| k.partition_name()).collect();
        assert_eq!(names.len(), TaskKind::ALL.len());
        assert_eq!(TaskKind::VideoForChannelCheck.to_string(), "video-for-channel-check");
    }

    #[test]
    fn test_descriptor_json_shape() {
        let descriptor = Descriptor::new(TaskKind::VideoFetch, "vid1").with_context(
            [(CONTEXT_CHANNEL_ID.to_string(), "UC1".to_string())].into(),
        );

        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(json["kind"], "video-fetch");
        assert_eq!(json["subject_id"], "vid1");
        assert!(json["outcome"].is_null());
        assert_eq!(descriptor.context_value(CONTEXT_CHANNEL_ID), Some("UC1"));
    }

    #[test]
    fn test_descriptor_tolerates_minimal_record() {
        let json = r#"{"kind":"channel-check","subject_id":"UC1","requested_at":"2024-05-01T10:00:00Z"}"#;
        let descriptor: Descriptor = serde_json::from_str(json).unwrap();
        assert_eq!(descriptor.attempts, 0);
        assert!(descriptor.context.is_empty());
        assert!(descriptor.performed_at.is_none());
    }
}
