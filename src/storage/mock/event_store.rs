//! Mock EventStore implementation for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::event::{EventDescriptor, EventRecord};
use crate::storage::{
    EventStore, ExpectedVersion, ReadDirection, RecordStream, Result, StorageError,
    StreamDescriptor, StreamPosition,
};

/// Mock event store that keeps streams in memory.
#[derive(Default)]
pub struct MockEventStore {
    streams: RwLock<HashMap<String, Vec<EventRecord>>>,
    fail_on_append: RwLock<bool>,
    fail_on_read: RwLock<bool>,
    fail_on_delete: RwLock<bool>,
    append_count: AtomicUsize,
}

impl MockEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_append(&self, fail: bool) {
        *self.fail_on_append.write().await = fail;
    }

    pub async fn set_fail_on_read(&self, fail: bool) {
        *self.fail_on_read.write().await = fail;
    }

    pub async fn set_fail_on_delete(&self, fail: bool) {
        *self.fail_on_delete.write().await = fail;
    }

    /// Number of successful appends since creation.
    pub fn append_count(&self) -> usize {
        self.append_count.load(Ordering::SeqCst)
    }

    /// Number of events in a stream, `None` if it does not exist.
    pub async fn stream_len(&self, stream_id: &str) -> Option<u64> {
        self.streams
            .read()
            .await
            .get(stream_id)
            .map(|records| records.len() as u64)
    }

    /// All records of a stream, oldest first.
    pub async fn records(&self, stream_id: &str) -> Vec<EventRecord> {
        self.streams
            .read()
            .await
            .get(stream_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn stream_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.streams.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(StorageError::Cancelled);
    }
    Ok(())
}

fn check_expected_version(
    stream_id: &str,
    expected: ExpectedVersion,
    actual: Option<u64>,
) -> Result<()> {
    let satisfied = match expected {
        ExpectedVersion::Any => true,
        ExpectedVersion::NoStream => actual.is_none(),
        ExpectedVersion::Exact(version) => actual == Some(version),
    };
    if satisfied {
        Ok(())
    } else {
        Err(StorageError::Concurrency {
            stream_id: stream_id.to_string(),
            expected,
            actual,
        })
    }
}

/// Offsets selected by a read, in delivery order, at most `limit` of them.
pub(super) fn select_offsets(
    len: u64,
    direction: ReadDirection,
    position: StreamPosition,
    limit: usize,
) -> Vec<u64> {
    match direction {
        ReadDirection::Forwards => {
            let start = match position {
                StreamPosition::Start => 0,
                StreamPosition::Offset(offset) => offset,
                StreamPosition::End => len,
            };
            (start..len).take(limit).collect()
        }
        ReadDirection::Backwards => {
            let first = match position {
                StreamPosition::Start => None,
                StreamPosition::End => len.checked_sub(1),
                StreamPosition::Offset(offset) if offset < len => Some(offset),
                StreamPosition::Offset(_) => None,
            };
            first
                .map(|first| (0..=first).rev().take(limit).collect())
                .unwrap_or_default()
        }
    }
}

#[async_trait]
impl EventStore for MockEventStore {
    async fn append(
        &self,
        stream_id: &str,
        events: Vec<EventDescriptor>,
        expected_version: ExpectedVersion,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        check_cancelled(cancel)?;
        if stream_id.is_empty() {
            return Err(StorageError::InvalidArgument("stream id is empty".to_string()));
        }
        if events.is_empty() {
            return Err(StorageError::InvalidArgument(format!(
                "no events to append to '{}'",
                stream_id
            )));
        }
        if *self.fail_on_append.read().await {
            return Err(StorageError::Backend("Mock append failure".to_string()));
        }

        let mut streams = self.streams.write().await;
        let actual = streams.get(stream_id).map(|records| records.len() as u64);
        check_expected_version(stream_id, expected_version, actual)?;

        let records = streams.entry(stream_id.to_string()).or_default();
        let mut offset = records.len() as u64;
        for descriptor in events {
            records.push(EventRecord::new(stream_id, offset, descriptor));
            offset += 1;
        }
        self.append_count.fetch_add(1, Ordering::SeqCst);
        Ok(offset)
    }

    async fn get(&self, stream_id: &str, cancel: &CancellationToken) -> Result<StreamDescriptor> {
        check_cancelled(cancel)?;
        if *self.fail_on_read.read().await {
            return Err(StorageError::Backend("Mock read failure".to_string()));
        }
        let streams = self.streams.read().await;
        let records = streams.get(stream_id).ok_or_else(|| StorageError::NotFound {
            stream_id: stream_id.to_string(),
        })?;
        Ok(StreamDescriptor {
            stream_id: stream_id.to_string(),
            length: records.len() as u64,
            first_event_at: records.first().map(|r| r.timestamp),
            last_event_at: records.last().map(|r| r.timestamp),
        })
    }

    async fn read(
        &self,
        stream_id: &str,
        direction: ReadDirection,
        position: StreamPosition,
        max_count: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<RecordStream> {
        check_cancelled(cancel)?;
        if *self.fail_on_read.read().await {
            return Err(StorageError::Backend("Mock read failure".to_string()));
        }
        let streams = self.streams.read().await;
        let records = streams.get(stream_id).ok_or_else(|| StorageError::NotFound {
            stream_id: stream_id.to_string(),
        })?;

        let limit = max_count.map_or(usize::MAX, |count| count as usize);
        let selected: Vec<EventRecord> =
            select_offsets(records.len() as u64, direction, position, limit)
                .into_iter()
                .map(|offset| records[offset as usize].clone())
            .collect();

        Ok(futures::stream::iter(selected.into_iter().map(Ok)).boxed())
    }

    async fn delete(&self, stream_id: &str, cancel: &CancellationToken) -> Result<()> {
        check_cancelled(cancel)?;
        if *self.fail_on_delete.read().await {
            return Err(StorageError::Backend("Mock delete failure".to_string()));
        }
        match self.streams.write().await.remove(stream_id) {
            Some(_) => Ok(()),
            None => Err(StorageError::NotFound {
                stream_id: stream_id.to_string(),
            }),
        }
    }
}
