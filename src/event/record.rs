//! Stream record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::{DomainEvent, EventError, RawEvent};

/// Free-form metadata attached to a stored event.
pub type EventMetadata = Map<String, Value>;

/// An event about to be appended to a stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDescriptor {
    pub event_type: String,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EventMetadata>,
}

impl EventDescriptor {
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: EventMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Describe a domain event for storage.
    pub fn from_event(event: &dyn DomainEvent) -> Result<Self, EventError> {
        Ok(Self::new(event.event_type(), event.to_payload()?))
    }
}

/// An event as persisted in a stream. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub stream_id: String,
    pub id: Uuid,
    /// Zero-based position within the stream.
    pub offset: u64,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EventMetadata>,
}

impl EventRecord {
    pub fn new(stream_id: impl Into<String>, offset: u64, descriptor: EventDescriptor) -> Self {
        Self {
            stream_id: stream_id.into(),
            id: Uuid::new_v4(),
            offset,
            timestamp: Utc::now(),
            event_type: descriptor.event_type,
            data: descriptor.data,
            metadata: descriptor.metadata,
        }
    }

    /// Lift the record into the type-erased event pipeline.
    pub fn into_event(self) -> Box<dyn DomainEvent> {
        Box::new(RawEvent::from(self))
    }
}

impl From<EventRecord> for RawEvent {
    fn from(record: EventRecord) -> Self {
        RawEvent::new(record.event_type, record.data)
    }
}
