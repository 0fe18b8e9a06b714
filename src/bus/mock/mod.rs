//! Mock event bus implementation for testing.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use super::{BusError, EventPublisher, Result};
use crate::event::DomainEvent;

/// Mock event bus for testing.
#[derive(Default)]
pub struct MockEventBus {
    published: RwLock<Vec<Arc<dyn DomainEvent>>>,
    fail_on_publish: RwLock<bool>,
}

impl MockEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_publish(&self, fail: bool) {
        *self.fail_on_publish.write().await = fail;
    }

    pub async fn published_count(&self) -> usize {
        self.published.read().await.len()
    }

    /// Tags of published events, in publication order.
    pub async fn published_types(&self) -> Vec<String> {
        self.published
            .read()
            .await
            .iter()
            .map(|e| e.event_type().to_string())
            .collect()
    }

    pub async fn take_published(&self) -> Vec<Arc<dyn DomainEvent>> {
        std::mem::take(&mut *self.published.write().await)
    }
}

#[async_trait]
impl EventPublisher for MockEventBus {
    async fn publish(&self, event: Arc<dyn DomainEvent>, _cancel: &CancellationToken) -> Result<()> {
        if *self.fail_on_publish.read().await {
            return Err(BusError::Publish("Mock publish failure".to_string()));
        }
        self.published.write().await.push(event);
        Ok(())
    }
}
