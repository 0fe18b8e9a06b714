//! Event-sourcing repository.
//!
//! Persists aggregates as append-only event streams and rebuilds them by
//! replay. Writes are guarded by expected-version checks in the store; the
//! repository itself takes no locks.
//!
//! Reconstruction has two paths:
//! - no snapshot: replay the whole stream onto a fresh state
//! - snapshot at version v: install it, then replay only events after v
//!
//! Both paths run every stored event through the migration manager first.

use std::sync::Arc;

use futures::TryStreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::aggregate::{stream_id, AggregateRoot, VersionedState};
use crate::aggregator::{AggregatorError, EventAggregator, EventAggregatorFactory, ReduceError};
use crate::bus::{BusError, EventPublisher};
use crate::config::RepositoryConfig;
use crate::event::{DomainEvent, EventDescriptor, EventError};
use crate::migration::{EventMigrationManager, MigrationError};
use crate::storage::{
    EventStore, ExpectedVersion, ReadDirection, RecordStream, StorageError, StreamPosition,
};

mod state_manager;

pub use state_manager::{
    snapshot_due, AggregateFactory, AggregateStateManager, EventSourcingStateManager, StateError,
    StateManagerOptions,
};

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Errors that can occur during repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Storage(StorageError),

    #[error("Failed to build aggregator: {0}")]
    Aggregator(#[from] AggregatorError),

    #[error(transparent)]
    Reduce(#[from] ReduceError),

    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error(transparent)]
    Event(#[from] EventError),

    #[error("Failed to publish committed event: {0}")]
    Publish(#[from] BusError),

    #[error(transparent)]
    State(StateError),
}

impl From<StorageError> for RepositoryError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Cancelled => RepositoryError::Cancelled,
            other => RepositoryError::Storage(other),
        }
    }
}

impl From<StateError> for RepositoryError {
    fn from(e: StateError) -> Self {
        match e {
            StateError::Storage(StorageError::Cancelled) => RepositoryError::Cancelled,
            other => RepositoryError::State(other),
        }
    }
}

impl RepositoryError {
    /// Whether the store rejected a write because the stream moved on.
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, RepositoryError::Storage(e) if e.is_concurrency_conflict())
    }
}

/// Repository behaviour switches.
#[derive(Debug, Clone)]
pub struct RepositoryOptions {
    /// Hand committed events to the publisher. Default: true.
    pub publish_events: bool,
}

impl Default for RepositoryOptions {
    fn default() -> Self {
        Self {
            publish_events: true,
        }
    }
}

impl From<&RepositoryConfig> for RepositoryOptions {
    fn from(config: &RepositoryConfig) -> Self {
        Self {
            publish_events: config.publish_events,
        }
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(RepositoryError::Cancelled);
    }
    Ok(())
}

fn validate_key<A: AggregateRoot>(key: &A::Key) -> Result<()> {
    if key.to_string().trim().is_empty() {
        return Err(RepositoryError::InvalidArgument(format!(
            "{} key is empty",
            A::AGGREGATE_TYPE
        )));
    }
    Ok(())
}

fn describe(events: &[Box<dyn DomainEvent>]) -> Result<Vec<EventDescriptor>> {
    events
        .iter()
        .map(|event| EventDescriptor::from_event(&**event).map_err(RepositoryError::from))
        .collect()
}

/// Repository for one aggregate type.
pub struct EventSourcingRepository<A: AggregateRoot> {
    store: Arc<dyn EventStore>,
    publisher: Option<Arc<dyn EventPublisher>>,
    aggregator: Arc<EventAggregator<A::State, A::Events>>,
    migrations: Arc<EventMigrationManager>,
    state_manager: Arc<dyn AggregateStateManager<A>>,
    options: RepositoryOptions,
}

impl<A: AggregateRoot> EventSourcingRepository<A> {
    /// Create a repository that does not publish.
    ///
    /// Fails if the state's reducer table is invalid.
    pub fn new(
        store: Arc<dyn EventStore>,
        aggregators: &EventAggregatorFactory,
        migrations: Arc<EventMigrationManager>,
        state_manager: Arc<dyn AggregateStateManager<A>>,
    ) -> Result<Self> {
        let aggregator = aggregators.create_aggregator::<A::State, A::Events>()?;
        Ok(Self {
            store,
            publisher: None,
            aggregator,
            migrations,
            state_manager,
            options: RepositoryOptions::default(),
        })
    }

    /// Publish committed events to `publisher`.
    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn with_options(mut self, options: RepositoryOptions) -> Self {
        self.options = options;
        self
    }

    /// Persist a new aggregate.
    ///
    /// Appends the pending events to a stream that must not exist yet, sets
    /// the version to the number appended, then snapshots and publishes.
    pub async fn add(&self, aggregate: &mut A, cancel: &CancellationToken) -> Result<()> {
        check_cancelled(cancel)?;
        validate_key::<A>(aggregate.id())?;
        if aggregate.pending_events().is_empty() {
            return Err(RepositoryError::InvalidArgument(format!(
                "{} '{}' has no pending events",
                A::AGGREGATE_TYPE,
                aggregate.id()
            )));
        }

        self.append(aggregate, ExpectedVersion::NoStream, cancel).await
    }

    /// Persist pending events of an existing aggregate.
    ///
    /// The store rejects the append if the stream no longer holds exactly
    /// `state_version` events. Without pending events this returns at once.
    pub async fn update(&self, aggregate: &mut A, cancel: &CancellationToken) -> Result<()> {
        let expected = aggregate.state_version();
        self.update_expecting(aggregate, expected, cancel).await
    }

    /// Like [`update`](Self::update) with an explicit expected stream length.
    pub async fn update_expecting(
        &self,
        aggregate: &mut A,
        expected_version: u64,
        cancel: &CancellationToken,
    ) -> Result<()> {
        check_cancelled(cancel)?;
        validate_key::<A>(aggregate.id())?;
        if aggregate.pending_events().is_empty() {
            debug!(
                aggregate = A::AGGREGATE_TYPE,
                key = %aggregate.id(),
                "No pending events, skipping update"
            );
            return Ok(());
        }

        self.append(aggregate, ExpectedVersion::Exact(expected_version), cancel)
            .await
    }

    /// Load an aggregate, or `None` if its stream does not exist.
    pub async fn get(&self, key: &A::Key, cancel: &CancellationToken) -> Result<Option<A>> {
        check_cancelled(cancel)?;
        validate_key::<A>(key)?;

        let mut aggregate = self.state_manager.restore_state(key, cancel).await?;
        let from = aggregate.state_version();

        let Some(records) = self
            .open_stream(key, StreamPosition::Offset(from), None, cancel)
            .await?
        else {
            return Ok(None);
        };
        let events = self.migrate_records(records, cancel).await?;
        self.aggregator
            .aggregate_into(&events, aggregate.state_mut())?;

        debug!(
            aggregate = A::AGGREGATE_TYPE,
            key = %key,
            snapshot_version = from,
            replayed = events.len(),
            version = aggregate.state_version(),
            "Loaded aggregate"
        );
        Ok(Some(aggregate))
    }

    /// Load an aggregate as it was after its first `version` events.
    ///
    /// Snapshots are not consulted. A stream shorter than `version` yields
    /// the aggregate at its latest version.
    pub async fn get_at_version(
        &self,
        key: &A::Key,
        version: u64,
        cancel: &CancellationToken,
    ) -> Result<Option<A>> {
        check_cancelled(cancel)?;
        validate_key::<A>(key)?;

        let mut aggregate = self.state_manager.new_aggregate(key);
        if version == 0 {
            return Ok(self.contains(key, cancel).await?.then_some(aggregate));
        }

        let Some(records) = self
            .open_stream(key, StreamPosition::Start, Some(version), cancel)
            .await?
        else {
            return Ok(None);
        };
        let events = self.migrate_records(records, cancel).await?;
        self.aggregator
            .aggregate_into(&events, aggregate.state_mut())?;
        Ok(Some(aggregate))
    }

    /// Whether a stream exists for `key`.
    ///
    /// Only a missing stream yields `false`; other storage failures propagate.
    pub async fn contains(&self, key: &A::Key, cancel: &CancellationToken) -> Result<bool> {
        check_cancelled(cancel)?;
        validate_key::<A>(key)?;

        match self.store.get(&stream_id::<A>(key), cancel).await {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete an aggregate's snapshots, then its stream.
    ///
    /// Returns `false` on any storage failure, including a missing stream.
    /// The two cases are logged at different levels. Snapshots go first so
    /// a surviving snapshot always belongs to a surviving stream.
    pub async fn remove(&self, key: &A::Key, cancel: &CancellationToken) -> Result<bool> {
        check_cancelled(cancel)?;
        validate_key::<A>(key)?;

        let stream_id = stream_id::<A>(key);
        if let Err(e) = self.state_manager.remove_snapshots(key, cancel).await {
            warn!(stream_id = %stream_id, error = %e, "Failed to delete snapshots, keeping stream");
            return Ok(false);
        }

        match self.store.delete(&stream_id, cancel).await {
            Ok(()) => {}
            Err(StorageError::NotFound { .. }) => {
                debug!(stream_id = %stream_id, "Stream already absent");
                return Ok(false);
            }
            Err(e) => {
                warn!(stream_id = %stream_id, error = %e, "Failed to delete stream");
                return Ok(false);
            }
        }

        info!(stream_id = %stream_id, "Aggregate removed");
        Ok(true)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    async fn append(
        &self,
        aggregate: &mut A,
        expected_version: ExpectedVersion,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let stream_id = stream_id::<A>(aggregate.id());
        let descriptors = describe(aggregate.pending_events())?;
        let count = descriptors.len();

        let length = self
            .store
            .append(&stream_id, descriptors, expected_version, cancel)
            .await?;
        aggregate.state_mut().set_state_version(length);
        let committed = aggregate.take_pending_events();

        debug!(
            stream_id = %stream_id,
            expected = %expected_version,
            events = count,
            version = length,
            "Events committed"
        );

        // The events are durable at this point; a failed snapshot only costs replay time.
        if let Err(e) = self.state_manager.take_snapshot(aggregate, cancel).await {
            warn!(stream_id = %stream_id, error = %e, "Snapshot failed");
        }

        self.publish(committed, cancel).await
    }

    async fn publish(&self, committed: Vec<Box<dyn DomainEvent>>, cancel: &CancellationToken) -> Result<()> {
        if !self.options.publish_events {
            return Ok(());
        }
        let Some(publisher) = &self.publisher else {
            return Ok(());
        };

        for event in committed {
            check_cancelled(cancel)?;
            publisher.publish(Arc::from(event), cancel).await?;
        }
        Ok(())
    }

    async fn open_stream(
        &self,
        key: &A::Key,
        position: StreamPosition,
        max_count: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<Option<RecordStream>> {
        let stream_id = stream_id::<A>(key);
        match self
            .store
            .read(&stream_id, ReadDirection::Forwards, position, max_count, cancel)
            .await
        {
            Ok(records) => Ok(Some(records)),
            Err(StorageError::NotFound { .. }) => {
                debug!(stream_id = %stream_id, "Stream not found");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn migrate_records(
        &self,
        mut records: RecordStream,
        cancel: &CancellationToken,
    ) -> Result<Vec<Box<dyn DomainEvent>>> {
        let mut events = Vec::new();
        while let Some(record) = records.try_next().await? {
            check_cancelled(cancel)?;
            events.push(self.migrations.migrate_event_to_latest(record.into_event())?);
        }
        Ok(events)
    }
}
