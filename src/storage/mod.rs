//! Stream storage.
//!
//! This module contains:
//! - `EventStore` trait: append-only streams with expected-version checks
//! - Read positioning types (`ReadDirection`, `StreamPosition`)
//! - `StorageError`, the storage failure taxonomy
//! - `MockEventStore`: in-memory store for tests and local runs

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{error, info};

mod event_store;
pub mod mock;

pub use event_store::{EventStore, RecordStream};
pub use mock::MockEventStore;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Stream not found: {stream_id}")]
    NotFound { stream_id: String },

    #[error("Concurrency conflict on stream '{stream_id}': expected {expected}, actual {}", display_actual(.actual))]
    Concurrency {
        stream_id: String,
        expected: ExpectedVersion,
        actual: Option<u64>,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

fn display_actual(actual: &Option<u64>) -> String {
    actual.map_or_else(|| "no stream".to_string(), |v| v.to_string())
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }

    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, StorageError::Concurrency { .. })
    }
}

/// The stream length an append assumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// No check.
    Any,
    /// The stream must not exist yet.
    NoStream,
    /// The stream must hold exactly this many events.
    Exact(u64),
}

impl std::fmt::Display for ExpectedVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExpectedVersion::Any => write!(f, "any"),
            ExpectedVersion::NoStream => write!(f, "no stream"),
            ExpectedVersion::Exact(version) => write!(f, "{}", version),
        }
    }
}

/// Direction of a stream read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadDirection {
    Forwards,
    Backwards,
}

/// Where a stream read begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPosition {
    /// First event of the stream.
    Start,
    /// Last event of the stream.
    End,
    /// The event at this zero-based offset.
    Offset(u64),
}

/// Summary of a stored stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamDescriptor {
    pub stream_id: String,
    pub length: u64,
    pub first_event_at: Option<DateTime<Utc>>,
    pub last_event_at: Option<DateTime<Utc>>,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend type. Only "memory" ships with this crate.
    #[serde(rename = "type")]
    pub storage_type: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_type: "memory".to_string(),
        }
    }
}

/// Initialize the event store named by configuration.
pub fn init_storage(config: &StorageConfig) -> Result<Arc<dyn EventStore>> {
    info!(storage_type = %config.storage_type, "Initializing event store");

    match config.storage_type.as_str() {
        "memory" => Ok(Arc::new(MockEventStore::new())),
        other => {
            error!("Unknown storage type: {}", other);
            Err(StorageError::InvalidArgument(format!(
                "unknown storage type: {}",
                other
            )))
        }
    }
}
