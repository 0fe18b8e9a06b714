//! Rehydrate - event-sourced aggregate persistence
//!
//! Aggregates are stored as append-only event streams and rebuilt by
//! replaying those streams through a reducer table, optionally starting
//! from a snapshot. Stored events pass through registered migrations
//! before they are reduced, so old payload shapes keep loading.
//!
//! The pieces, bottom-up:
//! - [`event`]: type-erased events and stored records
//! - [`aggregator`]: reducers, the per-state reducer table, and a cache of built aggregators
//! - [`migration`]: event upcasting chains
//! - [`storage`]: the `EventStore` trait and an in-memory store
//! - [`bus`]: publishing committed events
//! - [`repository`]: add/update/get/remove with snapshots and optimistic concurrency

pub mod aggregate;
pub mod aggregator;
pub mod bus;
pub mod config;
pub mod event;
pub mod migration;
pub mod repository;
pub mod services;
pub mod storage;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_utils;

pub use aggregate::{snapshot_stream_id, stream_id, AggregateRoot, Snapshot, VersionedState};
pub use aggregator::{
    AggregatorBuilder, AggregatorError, AnyEvent, EventAggregator, EventAggregatorFactory,
    EventFamily, EventReducer, MemberOf, On, ReduceError, ReducerTable,
};
pub use config::Config;
pub use event::{DomainEvent, Event, EventDescriptor, EventError, EventRecord, RawEvent};
pub use migration::{EventMigrationManager, EventMigrationOptions, MigrationError};
pub use repository::{
    AggregateStateManager, EventSourcingRepository, EventSourcingStateManager, RepositoryError,
    RepositoryOptions, StateManagerOptions,
};
pub use services::Services;
pub use storage::{EventStore, ExpectedVersion, StorageError};
