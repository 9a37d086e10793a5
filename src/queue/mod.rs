//! Durable descriptor queues
//!
//! One queue per task kind plus a completion archive, a dead-letter area and
//! per-stage run leases, all in a single fjall keyspace.

pub mod descriptor;
pub mod lease;
pub mod store;

pub use descriptor::{CONTEXT_CHANNEL_ID, Descriptor, Outcome, TaskKind};
pub use lease::RunLease;
pub use store::{DescriptorStore, FailureDisposition, QueueError, QueueStats};
