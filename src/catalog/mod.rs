/// Catalog of followed channels and their cached metadata
///
/// The harvesting pipeline only needs the narrow contract in [`CatalogStore`];
/// [`FjallCatalog`] is the embedded implementation used by the binary.
///
/// ## Usage
///
/// ```rust,ignore
/// use vidharvest::catalog::{CatalogStore, FjallCatalog};
///
/// let catalog = FjallCatalog::open("data/catalog")?;
/// for sub in catalog.list_all_subscriptions()? {
///     println!("{} -> {}", sub.external_id, sub.name);
/// }
/// ```
pub mod error;
pub mod keys;
pub mod models;
pub mod store;

pub use error::{CatalogError, Result};
pub use models::{ChannelInfo, Subscription, SubscriptionUpdate};
pub use store::FjallCatalog;

/// Persistent entities consumed by the stager and harvesters
pub trait CatalogStore: Send + Sync {
    fn find_subscription_by_external_id(&self, external_id: &str) -> Result<Option<Subscription>>;

    /// Insert or update by external id; an existing row keeps its local id
    fn upsert_subscription(&self, update: SubscriptionUpdate) -> Result<Subscription>;

    fn find_channel_info_by_external_id(&self, channel_id: &str) -> Result<Option<ChannelInfo>>;

    /// Replace the whole record for `info.id`
    fn upsert_channel_info(&self, info: ChannelInfo) -> Result<()>;

    fn list_all_subscriptions(&self) -> Result<Vec<Subscription>>;

    fn list_all_channel_infos(&self) -> Result<Vec<ChannelInfo>>;

    /// Make every write so far durable
    fn persist(&self) -> Result<()>;
}
