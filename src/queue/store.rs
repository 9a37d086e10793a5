use super::descriptor::{Descriptor, Outcome, TaskKind};
use super::lease::{RunLease, encode_lease_key};
use chrono::Utc;
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Descriptor not found: {kind}/{subject_id}")]
    DescriptorNotFound { kind: TaskKind, subject_id: String },

    #[error("Subject id must not be empty")]
    EmptySubject,

    #[error("Lease ttl out of range: {0:?}")]
    InvalidLeaseTtl(Duration),
}

pub type Result<T> = std::result::Result<T, QueueError>;

/// What happened to a descriptor after a transient failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Left in its queue for the next run
    Requeued { attempts: u32 },
    /// Retry ceiling reached; moved out of the queue
    DeadLettered { attempts: u32 },
}

/// DescriptorStore is the durable task table behind every queue
///
/// Architecture:
/// - one partition per task kind: subject_id → Descriptor (JSON)
/// - `archive` partition: "{kind}:{subject_id}" → completed Descriptor (JSON)
/// - `dead_letter` partition: "{kind}:{subject_id}" → Descriptor that hit the retry ceiling
/// - `leases` partition: "lease:{stage}" → RunLease (JSON)
///
/// Moves between partitions (complete, dead-letter) are committed as a single
/// write batch, so a crash leaves the descriptor either queued or archived, never
/// both and never neither.
pub struct DescriptorStore {
    keyspace: Keyspace,
    channel_checks: PartitionHandle,
    video_checks: PartitionHandle,
    video_fetches: PartitionHandle,
    archive: PartitionHandle,
    dead_letter: PartitionHandle,
    leases: PartitionHandle,
    write_guard: Mutex<()>,
    lease_guard: Mutex<()>,
}

impl DescriptorStore {
    /// Open or create a DescriptorStore at the specified path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        info!("Opening DescriptorStore at: {}", path.as_ref().display());

        let keyspace = Config::new(path).open()?;

        let open = |name: &str| keyspace.open_partition(name, PartitionCreateOptions::default());

        let channel_checks = open(TaskKind::ChannelCheck.partition_name())?;
        let video_checks = open(TaskKind::VideoForChannelCheck.partition_name())?;
        let video_fetches = open(TaskKind::VideoFetch.partition_name())?;
        let archive = open("archive")?;
        let dead_letter = open("dead_letter")?;
        let leases = open("leases")?;

        Ok(Self {
            keyspace,
            channel_checks,
            video_checks,
            video_fetches,
            archive,
            dead_letter,
            leases,
            write_guard: Mutex::new(()),
            lease_guard: Mutex::new(()),
        })
    }

    fn queue(&self, kind: TaskKind) -> &PartitionHandle {
        match kind {
            TaskKind::ChannelCheck => &self.channel_checks,
            TaskKind::VideoForChannelCheck => &self.video_checks,
            TaskKind::VideoFetch => &self.video_fetches,
        }
    }

    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_guard
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Write the descriptor for `subject_id`, or refresh its context if already queued
    ///
    /// Returns `true` when a new descriptor was created. Re-staging keeps the
    /// original `requested_at` and attempt count, so the retry ceiling survives
    /// repeated staging passes.
    pub fn enqueue(
        &self,
        kind: TaskKind,
        subject_id: &str,
        context: BTreeMap<String, String>,
    ) -> Result<bool> {
        if subject_id.trim().is_empty() {
            return Err(QueueError::EmptySubject);
        }

        let _guard = self.lock_writes();

        let (descriptor, created) = match self.get(kind, subject_id)? {
            Some(mut existing) => {
                existing.context = context;
                (existing, false)
            }
            None => (Descriptor::new(kind, subject_id).with_context(context), true),
        };

        self.queue(kind)
            .insert(subject_id.as_bytes(), serde_json::to_vec(&descriptor)?)?;

        debug!(%kind, subject_id, created, "Descriptor enqueued");

        Ok(created)
    }

    /// Retrieve a pending descriptor
    pub fn get(&self, kind: TaskKind, subject_id: &str) -> Result<Option<Descriptor>> {
        match self.queue(kind).get(subject_id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Lazily iterate the descriptors currently queued for `kind`
    ///
    /// Order is key order; callers must not rely on it.
    pub fn list_pending(&self, kind: TaskKind) -> impl Iterator<Item = Result<Descriptor>> + '_ {
        self.queue(kind).iter().map(|item| {
            let (_, value) = item?;
            Ok(serde_json::from_slice(&value)?)
        })
    }

    pub fn pending_count(&self, kind: TaskKind) -> Result<usize> {
        Ok(self.queue(kind).len()?)
    }

    /// Archive the descriptor with its outcome and remove it from the queue
    pub fn complete(&self, kind: TaskKind, subject_id: &str, outcome: Outcome) -> Result<Descriptor> {
        let _guard = self.lock_writes();

        let mut descriptor = self.get(kind, subject_id)?.ok_or_else(|| {
            QueueError::DescriptorNotFound {
                kind,
                subject_id: subject_id.to_string(),
            }
        })?;

        descriptor.outcome = Some(outcome);
        descriptor.performed_at = Some(Utc::now());

        let mut batch = self.keyspace.batch();
        batch.insert(
            &self.archive,
            encode_record_key(kind, subject_id),
            serde_json::to_vec(&descriptor)?,
        );
        batch.remove(self.queue(kind), subject_id.as_bytes());
        batch.commit()?;

        debug!(%kind, subject_id, "Descriptor archived");

        Ok(descriptor)
    }

    /// Count a transient failure against the descriptor
    ///
    /// Once `attempts` reaches `max_attempts` the descriptor is moved to the
    /// dead-letter partition instead of being retried again.
    pub fn record_failure(
        &self,
        kind: TaskKind,
        subject_id: &str,
        message: &str,
        max_attempts: u32,
    ) -> Result<FailureDisposition> {
        let _guard = self.lock_writes();

        let mut descriptor = self.get(kind, subject_id)?.ok_or_else(|| {
            QueueError::DescriptorNotFound {
                kind,
                subject_id: subject_id.to_string(),
            }
        })?;

        descriptor.attempts = descriptor.attempts.saturating_add(1);
        descriptor.last_error = Some(message.to_string());
        let attempts = descriptor.attempts;

        if attempts >= max_attempts {
            descriptor.outcome = Some(Outcome::failure(message));
            descriptor.performed_at = Some(Utc::now());

            let mut batch = self.keyspace.batch();
            batch.insert(
                &self.dead_letter,
                encode_record_key(kind, subject_id),
                serde_json::to_vec(&descriptor)?,
            );
            batch.remove(self.queue(kind), subject_id.as_bytes());
            batch.commit()?;

            warn!(%kind, subject_id, attempts, "Descriptor moved to dead letter");
            return Ok(FailureDisposition::DeadLettered { attempts });
        }

        self.queue(kind)
            .insert(subject_id.as_bytes(), serde_json::to_vec(&descriptor)?)?;

        Ok(FailureDisposition::Requeued { attempts })
    }

    /// Completion record for a subject, if it has ever completed
    pub fn archived(&self, kind: TaskKind, subject_id: &str) -> Result<Option<Descriptor>> {
        match self.archive.get(encode_record_key(kind, subject_id))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn dead_lettered(&self, kind: TaskKind, subject_id: &str) -> Result<Option<Descriptor>> {
        match self.dead_letter.get(encode_record_key(kind, subject_id))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Take the run lease for `stage` unless another holder has an unexpired one
    pub fn acquire_lease(&self, stage: &str, ttl: Duration) -> Result<Option<RunLease>> {
        let _guard = self
            .lease_guard
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let now = Utc::now();
        let key = encode_lease_key(stage);

        if let Some(bytes) = self.leases.get(&key)? {
            let current: RunLease = serde_json::from_slice(&bytes)?;
            if !current.is_expired(now) {
                debug!(stage, holder = %current.holder, "Lease held by another run");
                return Ok(None);
            }
            warn!(stage, holder = %current.holder, "Taking over expired lease");
        }

        let lease = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl_chrono| RunLease::new(stage, ttl_chrono, now))
            .ok_or(QueueError::InvalidLeaseTtl(ttl))?;
        self.leases.insert(key, serde_json::to_vec(&lease)?)?;
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;

        debug!(stage, holder = %lease.holder, "Lease acquired");
        Ok(Some(lease))
    }

    /// Drop the lease if it is still ours; returns whether anything was removed
    pub fn release_lease(&self, lease: &RunLease) -> Result<bool> {
        let _guard = self
            .lease_guard
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let key = encode_lease_key(&lease.stage);
        let Some(bytes) = self.leases.get(&key)? else {
            return Ok(false);
        };

        let current: RunLease = serde_json::from_slice(&bytes)?;
        if current.holder != lease.holder {
            warn!(stage = %lease.stage, "Lease was taken over, not releasing");
            return Ok(false);
        }

        self.leases.remove(key)?;
        Ok(true)
    }

    /// Flush all writes to disk
    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }

    /// Queue depths and archive sizes (for the `queues` command)
    pub fn stats(&self) -> Result<QueueStats> {
        let mut pending = Vec::with_capacity(TaskKind::ALL.len());
        for kind in TaskKind::ALL {
            pending.push((kind, self.pending_count(kind)?));
        }

        Ok(QueueStats {
            pending,
            archived: self.archive.len()?,
            dead_lettered: self.dead_letter.len()?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct QueueStats {
    pub pending: Vec<(TaskKind, usize)>,
    pub archived: usize,
    pub dead_lettered: usize,
}

/// Encode an archive / dead-letter key: {kind}:{subject_id}
fn encode_record_key(kind: TaskKind, subject_id: &str) -> Vec<u8> {
    format!("{}:{}", kind.as_str(), subject_id).into_bytes()
}
