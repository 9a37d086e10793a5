use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Exclusive right to run one stage until `expires_at`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLease {
    pub stage: String,
    pub holder: Uuid,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl RunLease {
    /// None when the expiry falls outside the representable calendar
    pub(crate) fn new(stage: &str, ttl: chrono::Duration, now: DateTime<Utc>) -> Option<Self> {
        Some(Self {
            stage: stage.to_string(),
            holder: Uuid::now_v7(),
            acquired_at: now,
            expires_at: now.checked_add_signed(ttl)?,
        })
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

pub(crate) fn encode_lease_key(stage: &str) -> Vec<u8> {
    format!("lease:{}", stage).into_bytes()
}
