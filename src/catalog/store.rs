use std::path::Path;
use std::sync::Mutex;

use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use tracing::{debug, info};

use super::error::{CatalogError, Result};
use super::keys::{encode_channel_key, encode_meta_key, encode_subscription_key};
use super::models::{ChannelInfo, Subscription, SubscriptionUpdate};
use super::CatalogStore;

const META_NEXT_SUBSCRIPTION_ID: &str = "next_subscription_id";

/// Fjall-backed catalog of subscriptions and channel records
pub struct FjallCatalog {
    keyspace: Keyspace,
    subscriptions: PartitionHandle,
    channels: PartitionHandle,
    metadata: PartitionHandle,
    id_guard: Mutex<()>,
}

impl FjallCatalog {
    /// Open or create a catalog at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening catalog at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;

        let subscriptions =
            keyspace.open_partition("subscriptions", PartitionCreateOptions::default())?;
        let channels = keyspace.open_partition("channels", PartitionCreateOptions::default())?;
        let metadata = keyspace.open_partition("metadata", PartitionCreateOptions::default())?;

        Ok(Self {
            keyspace,
            subscriptions,
            channels,
            metadata,
            id_guard: Mutex::new(()),
        })
    }

    fn next_subscription_id(&self) -> Result<u64> {
        let key = encode_meta_key(META_NEXT_SUBSCRIPTION_ID);
        let current = match self.metadata.get(&key)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes
                    .as_ref()
                    .try_into()
                    .map_err(|_| CatalogError::Corrupt(META_NEXT_SUBSCRIPTION_ID.to_string()))?;
                u64::from_be_bytes(raw)
            }
            None => 1,
        };
        self.metadata.insert(key, (current + 1).to_be_bytes())?;
        Ok(current)
    }
}

impl CatalogStore for FjallCatalog {
    fn find_subscription_by_external_id(&self, external_id: &str) -> Result<Option<Subscription>> {
        match self.subscriptions.get(encode_subscription_key(external_id))? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    fn upsert_subscription(&self, update: SubscriptionUpdate) -> Result<Subscription> {
        if update.external_id.is_empty() {
            return Err(CatalogError::MissingKey("subscription external_id"));
        }

        // Id allocation and the existence check must not interleave
        let _guard = self
            .id_guard
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let id = match self.find_subscription_by_external_id(&update.external_id)? {
            Some(existing) => existing.id,
            None => self.next_subscription_id()?,
        };

        let subscription = Subscription {
            id,
            external_id: update.external_id,
            name: update.name,
            description: update.description,
            subscribed_at: update.subscribed_at,
            last_check: update.last_check,
        };

        self.subscriptions.insert(
            encode_subscription_key(&subscription.external_id),
            serde_json::to_vec(&subscription)?,
        )?;
        debug!(id, external_id = %subscription.external_id, "Upserted subscription");

        Ok(subscription)
    }

    fn find_channel_info_by_external_id(&self, channel_id: &str) -> Result<Option<ChannelInfo>> {
        match self.channels.get(encode_channel_key(channel_id))? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    fn upsert_channel_info(&self, info: ChannelInfo) -> Result<()> {
        if info.id.is_empty() {
            return Err(CatalogError::MissingKey("channel id"));
        }

        self.channels
            .insert(encode_channel_key(&info.id), serde_json::to_vec(&info)?)?;
        debug!(channel_id = %info.id, "Replaced channel info");
        Ok(())
    }

    fn list_all_subscriptions(&self) -> Result<Vec<Subscription>> {
        let mut subscriptions = Vec::new();
        for item in self.subscriptions.iter() {
            let (_, value) = item?;
            subscriptions.push(serde_json::from_slice(&value)?);
        }
        Ok(subscriptions)
    }

    fn list_all_channel_infos(&self) -> Result<Vec<ChannelInfo>> {
        let mut channels = Vec::new();
        for item in self.channels.iter() {
            let (_, value) = item?;
            channels.push(serde_json::from_slice(&value)?);
        }
        Ok(channels)
    }

    fn persist(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }
}
