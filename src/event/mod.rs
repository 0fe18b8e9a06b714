//! Domain events.
//!
//! This module contains:
//! - `Event` trait: a concrete, serializable event type with a stable tag
//! - `DomainEvent` trait: the type-erased form carried by aggregates,
//!   the aggregator, migrations and the publication sink
//! - `RawEvent`: a stored event whose payload has not been decoded yet
//! - Record types exchanged with the event store

use std::any::Any;
use std::borrow::Cow;
use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

mod record;

pub use record::{EventDescriptor, EventMetadata, EventRecord};

/// Errors raised when a type-erased event is viewed as a concrete type.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("Expected event '{expected}', got '{actual}'")]
    TypeMismatch { expected: String, actual: String },

    #[error("Failed to decode event '{event_type}': {source}")]
    Decode {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode event '{event_type}': {source}")]
    Encode {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A concrete domain event.
///
/// `EVENT_TYPE` is the dispatch key for reducers and migrations and the
/// discriminator written to the event store. It must stay stable for the
/// lifetime of the stored data.
pub trait Event: Serialize + DeserializeOwned + Clone + Debug + Send + Sync + 'static {
    const EVENT_TYPE: &'static str;
}

/// Type-erased domain event.
///
/// Every [`Event`] is a `DomainEvent`. The other implementor is [`RawEvent`],
/// which reports the tag it was stored under.
pub trait DomainEvent: Debug + Send + Sync + 'static {
    /// Dispatch tag of this event.
    fn event_type(&self) -> &str;

    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync>;

    /// Serialize the payload for storage.
    fn to_payload(&self) -> Result<Value, EventError>;
}

impl<E: Event> DomainEvent for E {
    fn event_type(&self) -> &str {
        E::EVENT_TYPE
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync> {
        self
    }

    fn to_payload(&self) -> Result<Value, EventError> {
        serde_json::to_value(self).map_err(|source| EventError::Encode {
            event_type: E::EVENT_TYPE.to_string(),
            source,
        })
    }
}

/// An event read back from a stream, payload still encoded.
///
/// Typed reducers and migrations decode it on demand when its tag matches
/// theirs. A raw event nobody claims is skipped like any other unknown event.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub event_type: String,
    pub data: Value,
}

impl RawEvent {
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
        }
    }

    /// Decode the payload as `E`, regardless of the stored tag.
    pub fn decode<E: DeserializeOwned>(&self) -> Result<E, EventError> {
        serde_json::from_value(self.data.clone()).map_err(|source| EventError::Decode {
            event_type: self.event_type.clone(),
            source,
        })
    }

    fn into_decoded<E: DeserializeOwned>(self) -> Result<E, EventError> {
        let event_type = self.event_type;
        serde_json::from_value(self.data).map_err(|source| EventError::Decode { event_type, source })
    }
}

impl DomainEvent for RawEvent {
    fn event_type(&self) -> &str {
        &self.event_type
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync> {
        self
    }

    fn to_payload(&self) -> Result<Value, EventError> {
        Ok(self.data.clone())
    }
}

/// Borrow `event` as `E`, decoding it if it is a [`RawEvent`] tagged `E::EVENT_TYPE`.
pub fn resolve<E: Event>(event: &dyn DomainEvent) -> Result<Cow<'_, E>, EventError> {
    if let Some(typed) = event.as_any().downcast_ref::<E>() {
        return Ok(Cow::Borrowed(typed));
    }
    match event.as_any().downcast_ref::<RawEvent>() {
        Some(raw) if raw.event_type == E::EVENT_TYPE => raw.decode().map(Cow::Owned),
        _ => Err(EventError::TypeMismatch {
            expected: E::EVENT_TYPE.to_string(),
            actual: event.event_type().to_string(),
        }),
    }
}

/// Take ownership of `event` as `E`, decoding it if it is a matching [`RawEvent`].
pub fn downcast_event<E: Event>(event: Box<dyn DomainEvent>) -> Result<E, EventError> {
    let actual = event.event_type().to_string();
    let mismatch = || EventError::TypeMismatch {
        expected: E::EVENT_TYPE.to_string(),
        actual: actual.clone(),
    };
    match event.into_any().downcast::<E>() {
        Ok(typed) => Ok(*typed),
        Err(other) => match other.downcast::<RawEvent>() {
            Ok(raw) if raw.event_type == E::EVENT_TYPE => (*raw).into_decoded(),
            _ => Err(mismatch()),
        },
    }
}
