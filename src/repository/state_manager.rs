//! Aggregate state manager.
//!
//! Restores aggregates from their latest snapshot and decides when a new
//! snapshot is due. Snapshots live in a dedicated stream per aggregate,
//! appended without a version check; readers always take the most recent.

use std::fmt;
use std::num::NonZeroU64;
use std::sync::Arc;

use async_trait::async_trait;
use futures::TryStreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::aggregate::{snapshot_stream_id, AggregateRoot, Snapshot, VersionedState, SNAPSHOT_EVENT_TYPE};
use crate::config::SnapshotConfig;
use crate::event::EventDescriptor;
use crate::services::Services;
use crate::storage::{EventStore, ExpectedVersion, ReadDirection, StorageError, StreamPosition};

/// Errors raised while restoring or snapshotting an aggregate.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Failed to encode snapshot for '{stream_id}': {source}")]
    Encode {
        stream_id: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Builds an empty aggregate for a key.
pub type AggregateFactory<A> =
    Arc<dyn Fn(&Services, &<A as AggregateRoot>::Key) -> A + Send + Sync>;

/// Restoration and snapshot strategy used by the repository.
#[async_trait]
pub trait AggregateStateManager<A: AggregateRoot>: Send + Sync {
    /// A fresh aggregate at version 0.
    fn new_aggregate(&self, key: &A::Key) -> A;

    /// A fresh aggregate with the latest snapshot installed, if any.
    ///
    /// Events after the snapshot's version are not applied; callers replay
    /// the delta themselves.
    async fn restore_state(&self, key: &A::Key, cancel: &CancellationToken) -> Result<A, StateError>;

    /// Snapshot `aggregate` if the policy says one is due. Returns whether one was written.
    async fn take_snapshot(&self, aggregate: &A, cancel: &CancellationToken) -> Result<bool, StateError>;

    /// Drop every snapshot of an aggregate. Returns whether any existed.
    async fn remove_snapshots(&self, key: &A::Key, cancel: &CancellationToken) -> Result<bool, StateError>;
}

// ============================================================================
// Options
// ============================================================================

/// Snapshot policy and aggregate construction.
pub struct StateManagerOptions<A: AggregateRoot> {
    /// Events between snapshots. `None` disables snapshotting.
    pub snapshot_frequency: Option<NonZeroU64>,
    /// When false, restoration ignores snapshots and replays from the start.
    pub read_snapshots: bool,
    /// When false, no snapshot is ever written.
    pub write_snapshots: bool,
    aggregate_factory: AggregateFactory<A>,
}

impl<A: AggregateRoot> StateManagerOptions<A> {
    /// Options with snapshotting off and `factory` building new aggregates.
    pub fn new(factory: impl Fn(&Services, &A::Key) -> A + Send + Sync + 'static) -> Self {
        Self {
            snapshot_frequency: None,
            read_snapshots: true,
            write_snapshots: true,
            aggregate_factory: Arc::new(factory),
        }
    }

    /// Options taken from the `snapshots` configuration section.
    pub fn from_config(
        config: &SnapshotConfig,
        factory: impl Fn(&Services, &A::Key) -> A + Send + Sync + 'static,
    ) -> Self {
        Self::new(factory)
            .with_snapshot_frequency(config.frequency.unwrap_or(0))
            .with_snapshot_reads(config.read)
            .with_snapshot_writes(config.write)
    }

    /// Snapshot every `frequency` events. Zero disables snapshotting.
    pub fn with_snapshot_frequency(mut self, frequency: u64) -> Self {
        self.snapshot_frequency = NonZeroU64::new(frequency);
        self
    }

    pub fn with_snapshot_reads(mut self, enabled: bool) -> Self {
        self.read_snapshots = enabled;
        self
    }

    pub fn with_snapshot_writes(mut self, enabled: bool) -> Self {
        self.write_snapshots = enabled;
        self
    }
}

impl<A: AggregateRoot> fmt::Debug for StateManagerOptions<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateManagerOptions")
            .field("snapshot_frequency", &self.snapshot_frequency)
            .field("read_snapshots", &self.read_snapshots)
            .field("write_snapshots", &self.write_snapshots)
            .finish_non_exhaustive()
    }
}

/// Whether an aggregate at `version` is due a snapshot.
///
/// The first snapshot is due once `version` reaches `frequency`; later ones
/// once `version` is a full interval past the previous snapshot.
pub fn snapshot_due(version: u64, last_snapshot: Option<u64>, frequency: NonZeroU64) -> bool {
    let threshold = match last_snapshot {
        None => frequency.get(),
        Some(last) => last.saturating_add(frequency.get()),
    };
    version >= threshold
}

// ============================================================================
// Event-sourced state manager
// ============================================================================

/// State manager backed by the snapshot stream of each aggregate.
pub struct EventSourcingStateManager<A: AggregateRoot> {
    store: Arc<dyn EventStore>,
    services: Services,
    options: StateManagerOptions<A>,
}

impl<A: AggregateRoot> EventSourcingStateManager<A> {
    pub fn new(store: Arc<dyn EventStore>, services: Services, options: StateManagerOptions<A>) -> Self {
        Self {
            store,
            services,
            options,
        }
    }

    pub fn options(&self) -> &StateManagerOptions<A> {
        &self.options
    }

    /// The most recent snapshot of an aggregate.
    ///
    /// Returns `None` when snapshot reads are disabled, when none exists, or
    /// when the stored payload cannot be decoded.
    pub async fn latest_snapshot(
        &self,
        key: &A::Key,
        cancel: &CancellationToken,
    ) -> Result<Option<Snapshot<A::State>>, StateError> {
        if !self.options.read_snapshots {
            return Ok(None);
        }
        self.read_latest_snapshot(key, cancel).await
    }

    async fn read_latest_snapshot(
        &self,
        key: &A::Key,
        cancel: &CancellationToken,
    ) -> Result<Option<Snapshot<A::State>>, StateError> {
        let stream_id = snapshot_stream_id::<A>(key);
        let mut records = match self
            .store
            .read(&stream_id, ReadDirection::Backwards, StreamPosition::End, Some(1), cancel)
            .await
        {
            Ok(records) => records,
            Err(StorageError::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let Some(record) = records.try_next().await? else {
            return Ok(None);
        };

        // Corrupt snapshots are a cache miss; the event stream stays authoritative.
        match serde_json::from_value::<Snapshot<A::State>>(record.data) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                warn!(
                    stream_id = %stream_id,
                    offset = record.offset,
                    error = %e,
                    "Ignoring undecodable snapshot"
                );
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl<A: AggregateRoot> AggregateStateManager<A> for EventSourcingStateManager<A> {
    fn new_aggregate(&self, key: &A::Key) -> A {
        (self.options.aggregate_factory)(&self.services, key)
    }

    async fn restore_state(&self, key: &A::Key, cancel: &CancellationToken) -> Result<A, StateError> {
        let mut aggregate = self.new_aggregate(key);

        if let Some(snapshot) = self.latest_snapshot(key, cancel).await? {
            let version = snapshot.version;
            aggregate.restore(snapshot);
            aggregate.state_mut().set_state_version(version);
            debug!(
                aggregate = A::AGGREGATE_TYPE,
                key = %key,
                version,
                "Restored aggregate from snapshot"
            );
        }

        Ok(aggregate)
    }

    async fn take_snapshot(&self, aggregate: &A, cancel: &CancellationToken) -> Result<bool, StateError> {
        let Some(frequency) = self.options.snapshot_frequency else {
            return Ok(false);
        };
        if !self.options.write_snapshots {
            return Ok(false);
        }

        let version = aggregate.state_version();
        let last = self
            .read_latest_snapshot(aggregate.id(), cancel)
            .await?
            .map(|snapshot| snapshot.version);
        if !snapshot_due(version, last, frequency) {
            return Ok(false);
        }

        let stream_id = snapshot_stream_id::<A>(aggregate.id());
        let snapshot = aggregate.create_snapshot();
        let data = serde_json::to_value(&snapshot).map_err(|source| StateError::Encode {
            stream_id: stream_id.clone(),
            source,
        })?;
        self.store
            .append(
                &stream_id,
                vec![EventDescriptor::new(SNAPSHOT_EVENT_TYPE, data)],
                ExpectedVersion::Any,
                cancel,
            )
            .await?;

        info!(
            stream_id = %stream_id,
            version,
            previous = ?last,
            "Snapshot taken"
        );
        Ok(true)
    }

    async fn remove_snapshots(&self, key: &A::Key, cancel: &CancellationToken) -> Result<bool, StateError> {
        match self.store.delete(&snapshot_stream_id::<A>(key), cancel).await {
            Ok(()) => Ok(true),
            Err(StorageError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
