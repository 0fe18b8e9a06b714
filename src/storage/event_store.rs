//! EventStore trait definition.

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use super::{ExpectedVersion, ReadDirection, Result, StreamDescriptor, StreamPosition};
use crate::event::{EventDescriptor, EventRecord};

/// Lazily produced, ordered records of one stream read.
pub type RecordStream = BoxStream<'static, Result<EventRecord>>;

/// Interface for append-only stream persistence.
///
/// Streams are addressed by id. Offsets are zero-based and a stream's
/// version is the number of events it holds.
///
/// Every operation takes a `CancellationToken`; implementations should
/// return `StorageError::Cancelled` once it fires.
///
/// Implementations:
/// - `MockEventStore`: In-memory store for testing
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append events to a stream, creating it if needed.
    ///
    /// Fails with `StorageError::Concurrency` when the stream's current length
    /// does not satisfy `expected_version`. The check and the write are atomic.
    /// Returns the stream's new length.
    async fn append(
        &self,
        stream_id: &str,
        events: Vec<EventDescriptor>,
        expected_version: ExpectedVersion,
        cancel: &CancellationToken,
    ) -> Result<u64>;

    /// Describe a stream. Fails with `StorageError::NotFound` if it does not exist.
    async fn get(&self, stream_id: &str, cancel: &CancellationToken) -> Result<StreamDescriptor>;

    /// Read up to `max_count` records starting at `position`.
    ///
    /// Fails with `StorageError::NotFound` if the stream does not exist.
    /// A position past either end yields an empty stream.
    async fn read(
        &self,
        stream_id: &str,
        direction: ReadDirection,
        position: StreamPosition,
        max_count: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<RecordStream>;

    /// Delete a stream. Fails with `StorageError::NotFound` if it does not exist.
    async fn delete(&self, stream_id: &str, cancel: &CancellationToken) -> Result<()>;
}
