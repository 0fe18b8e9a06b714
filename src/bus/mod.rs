//! Publication of committed events.
//!
//! This module contains:
//! - `EventPublisher` trait: the sink the repository hands committed events to
//! - `EventHandler` trait: an in-process subscriber
//! - Implementations: in-process fan-out, Mock

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::event::DomainEvent;

pub mod in_process;
pub mod mock;

pub use in_process::InProcessEventBus;
pub use mock::MockEventBus;

// ============================================================================
// Traits
// ============================================================================

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur during publication.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Handler '{name}' failed: {message}")]
    HandlerFailed { name: String, message: String },

    #[error("Publish cancelled")]
    Cancelled,
}

/// Handler for events delivered in-process.
pub trait EventHandler: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Event types this handler wants. Empty means all.
    fn event_types(&self) -> Vec<String> {
        Vec::new()
    }

    /// Process one committed event.
    fn handle(&self, event: Arc<dyn DomainEvent>) -> BoxFuture<'static, Result<()>>;
}

/// Sink for committed domain events.
///
/// The repository publishes one event at a time, in commit order, and awaits
/// each call before returning to its caller.
///
/// Implementations:
/// - `InProcessEventBus`: Fan-out to registered handlers
/// - `MockEventBus`: Records events for testing
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a single committed event.
    ///
    /// The event is wrapped in Arc so every consumer shares the same
    /// immutable instance.
    async fn publish(&self, event: Arc<dyn DomainEvent>, cancel: &CancellationToken) -> Result<()>;
}
