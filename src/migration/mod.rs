//! Event migrations.
//!
//! Rewrites events stored under an obsolete shape into their latest shape
//! before they reach a reducer. Each migration handles a single step, keyed
//! by the source event tag; chains such as v1 → v2 → v3 are followed until
//! no further migration applies.
//!
//! ```ignore
//! let migrations = EventMigrationManager::new(services);
//! migrations.register::<OrderPlacedV1, OrderPlacedV2>(|_, v1| OrderPlacedV2 { .. });
//! migrations.register::<OrderPlacedV2, OrderPlaced>(|_, v2| OrderPlaced { .. });
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info};

use crate::aggregator::BoxError;
use crate::event::{downcast_event, DomainEvent, Event};
use crate::services::Services;

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrationError>;

/// Errors raised while migrating an event.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("Migration of '{event_type}' failed: {source}")]
    Handler {
        event_type: String,
        #[source]
        source: BoxError,
    },

    #[error("Migration chain revisits '{event_type}' (chain: {})", .chain.join(" -> "))]
    Cycle { event_type: String, chain: Vec<String> },
}

type MigrationFn =
    dyn Fn(&Services, Box<dyn DomainEvent>) -> std::result::Result<Box<dyn DomainEvent>, BoxError> + Send + Sync;

// ============================================================================
// Options
// ============================================================================

/// Migrations known when the manager is constructed.
#[derive(Default)]
pub struct EventMigrationOptions {
    migrations: HashMap<String, Arc<MigrationFn>>,
}

impl EventMigrationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a typed single-step migration from `Old` to `New`.
    pub fn migrate<Old: Event, New: Event>(
        mut self,
        handler: impl Fn(&Services, Old) -> New + Send + Sync + 'static,
    ) -> Self {
        self.migrations
            .insert(Old::EVENT_TYPE.to_string(), typed_handler(handler));
        self
    }
}

impl fmt::Debug for EventMigrationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventMigrationOptions")
            .field("source_types", &self.migrations.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn typed_handler<Old: Event, New: Event>(
    handler: impl Fn(&Services, Old) -> New + Send + Sync + 'static,
) -> Arc<MigrationFn> {
    Arc::new(
        move |services: &Services,
              event: Box<dyn DomainEvent>|
              -> std::result::Result<Box<dyn DomainEvent>, BoxError> {
            let source = downcast_event::<Old>(event)?;
            Ok(Box::new(handler(services, source)) as Box<dyn DomainEvent>)
        },
    )
}

// ============================================================================
// Manager
// ============================================================================

/// Registry of event migrations keyed by source event tag.
///
/// Safe to share between tasks; registration and migration may interleave.
pub struct EventMigrationManager {
    services: Services,
    migrations: RwLock<HashMap<String, Arc<MigrationFn>>>,
}

impl EventMigrationManager {
    pub fn new(services: Services) -> Self {
        Self::with_options(services, EventMigrationOptions::default())
    }

    pub fn with_options(services: Services, options: EventMigrationOptions) -> Self {
        if !options.migrations.is_empty() {
            info!(
                migrations = options.migrations.len(),
                "Event migrations registered"
            );
        }
        Self {
            services,
            migrations: RwLock::new(options.migrations),
        }
    }

    /// Register `handler` for events tagged `source_type`.
    ///
    /// Replaces any handler previously registered for that tag.
    pub fn register_event_migration<H>(&self, source_type: impl Into<String>, handler: H)
    where
        H: Fn(&Services, Box<dyn DomainEvent>) -> std::result::Result<Box<dyn DomainEvent>, BoxError>
            + Send
            + Sync
            + 'static,
    {
        self.insert(source_type.into(), Arc::new(handler));
    }

    /// Register a typed migration from `Old` to `New`.
    ///
    /// Stored events are decoded into `Old` before `handler` runs.
    pub fn register<Old: Event, New: Event>(
        &self,
        handler: impl Fn(&Services, Old) -> New + Send + Sync + 'static,
    ) {
        self.insert(Old::EVENT_TYPE.to_string(), typed_handler(handler));
    }

    /// Whether a migration is registered for `event_type`.
    pub fn has_migration(&self, event_type: &str) -> bool {
        self.read_migrations().contains_key(event_type)
    }

    /// Apply migrations to `event` until none matches its tag.
    ///
    /// An event with no registered migration is returned unchanged.
    pub fn migrate_event_to_latest(&self, event: Box<dyn DomainEvent>) -> Result<Box<dyn DomainEvent>> {
        let mut event = event;
        let mut chain: Vec<String> = Vec::new();

        loop {
            let event_type = event.event_type().to_string();
            let Some(handler) = self.handler_for(&event_type) else {
                return Ok(event);
            };
            if chain.contains(&event_type) {
                return Err(MigrationError::Cycle { event_type, chain });
            }

            event = handler(&self.services, event).map_err(|source| MigrationError::Handler {
                event_type: event_type.clone(),
                source,
            })?;
            debug!(
                from = %event_type,
                to = %event.event_type(),
                "Migrated event"
            );
            chain.push(event_type);
        }
    }

    fn insert(&self, source_type: String, handler: Arc<MigrationFn>) {
        let mut migrations = self.migrations.write().unwrap_or_else(PoisonError::into_inner);
        if migrations.insert(source_type.clone(), handler).is_some() {
            debug!(source_type = %source_type, "Replaced event migration");
        } else {
            debug!(source_type = %source_type, "Registered event migration");
        }
    }

    // Cloned out so the handler runs without holding the lock.
    fn handler_for(&self, event_type: &str) -> Option<Arc<MigrationFn>> {
        self.read_migrations().get(event_type).cloned()
    }

    fn read_migrations(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<MigrationFn>>> {
        self.migrations.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for EventMigrationManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventMigrationManager")
            .field("migrations", &self.read_migrations().len())
            .finish_non_exhaustive()
    }
}
