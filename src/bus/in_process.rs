//! In-process event bus implementation.
//!
//! Routes committed events directly to registered handlers.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::{BusError, EventHandler, EventPublisher, Result};
use crate::event::DomainEvent;

/// In-process event bus.
///
/// Delivers each event to every interested handler, in registration order.
/// The first handler failure aborts delivery and is returned to the publisher.
pub struct InProcessEventBus {
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
}

impl InProcessEventBus {
    /// Create a new in-process event bus.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Register a handler.
    pub async fn subscribe(&self, handler: Box<dyn EventHandler>) {
        let handler: Arc<dyn EventHandler> = handler.into();
        info!(
            handler.name = %handler.name(),
            handler.event_types = ?handler.event_types(),
            "Registered in-process handler"
        );
        self.handlers.write().await.push(handler);
    }

    pub async fn handler_count(&self) -> usize {
        self.handlers.read().await.len()
    }

    /// Check if a handler is interested in this event type.
    fn is_interested(handler_types: &[String], event_type: &str) -> bool {
        handler_types.is_empty() || handler_types.iter().any(|t| t == event_type)
    }
}

impl Default for InProcessEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for InProcessEventBus {
    async fn publish(&self, event: Arc<dyn DomainEvent>, cancel: &CancellationToken) -> Result<()> {
        let event_type = event.event_type().to_string();

        // Collect handlers under read lock, then release before async calls
        let handlers: Vec<_> = {
            let guard = self.handlers.read().await;
            guard
                .iter()
                .filter(|h| Self::is_interested(&h.event_types(), &event_type))
                .cloned()
                .collect()
        };

        for handler in handlers {
            if cancel.is_cancelled() {
                return Err(BusError::Cancelled);
            }
            if let Err(e) = handler.handle(Arc::clone(&event)).await {
                error!(
                    handler.name = %handler.name(),
                    event_type = %event_type,
                    error = %e,
                    "Handler failed"
                );
                return Err(BusError::HandlerFailed {
                    name: handler.name().to_string(),
                    message: e.to_string(),
                });
            }
            debug!(
                handler.name = %handler.name(),
                event_type = %event_type,
                "Event handled"
            );
        }

        Ok(())
    }
}
