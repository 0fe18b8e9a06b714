//! Aggregates, their versioned state and snapshots.
//!
//! An aggregate's durable form is the pair of streams named by
//! [`stream_id`] and [`snapshot_stream_id`]. Both names are part of the
//! on-disk contract.

use std::fmt::{Debug, Display};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::aggregator::{EventFamily, ReducerTable};
use crate::event::{DomainEvent, EventMetadata};

/// Event type under which snapshots are appended to the snapshot stream.
pub const SNAPSHOT_EVENT_TYPE: &str = "snapshot";

/// State that counts the events folded into it.
///
/// The version equals the number of events applied since the empty state,
/// including events no reducer handled.
pub trait VersionedState {
    fn state_version(&self) -> u64;

    fn set_state_version(&mut self, version: u64);
}

/// A consistency boundary whose state is derived from its event stream.
///
/// Business operations mutate `state` and queue the resulting events;
/// the repository persists the queue and advances the version.
pub trait AggregateRoot: Send + Sync + Sized + 'static {
    type Key: Clone + Eq + Display + Debug + Send + Sync + 'static;
    type State: ReducerTable<Self::Events> + Clone + Serialize + DeserializeOwned + Send + Sync;
    type Events: EventFamily;

    /// Type name used to derive stream ids.
    const AGGREGATE_TYPE: &'static str;

    fn id(&self) -> &Self::Key;

    fn state(&self) -> &Self::State;

    fn state_mut(&mut self) -> &mut Self::State;

    /// Events produced but not yet persisted, oldest first.
    fn pending_events(&self) -> &[Box<dyn DomainEvent>];

    fn take_pending_events(&mut self) -> Vec<Box<dyn DomainEvent>>;

    fn state_version(&self) -> u64 {
        self.state().state_version()
    }

    /// Capture the current state. Override to trim or annotate snapshots.
    fn create_snapshot(&self) -> Snapshot<Self::State> {
        Snapshot::new(self.state().clone())
    }

    /// Install a snapshot's state. Override when restoring needs more than a copy.
    fn restore(&mut self, snapshot: Snapshot<Self::State>) {
        *self.state_mut() = snapshot.state;
    }
}

/// A full copy of an aggregate's state at a given version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot<S> {
    pub version: u64,
    pub state: S,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EventMetadata>,
}

impl<S: VersionedState> Snapshot<S> {
    pub fn new(state: S) -> Self {
        Self {
            version: state.state_version(),
            state,
            metadata: None,
        }
    }
}

impl<S> Snapshot<S> {
    pub fn with_metadata(mut self, metadata: EventMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Primary stream of an aggregate: `"{type}-{key}"`, type lowercased.
pub fn stream_id<A: AggregateRoot>(key: &A::Key) -> String {
    format!("{}-{}", A::AGGREGATE_TYPE.to_lowercase(), key)
}

/// Snapshot stream of an aggregate: `"{type}-snapshots-{key}"`, type lowercased.
pub fn snapshot_stream_id<A: AggregateRoot>(key: &A::Key) -> String {
    format!("{}-snapshots-{}", A::AGGREGATE_TYPE.to_lowercase(), key)
}
