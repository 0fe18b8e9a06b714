//! Ambient services handed to migrations and aggregate factories.
//!
//! A small type-keyed registry. Components register what they provide at
//! startup; handlers look services up by type when they run.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Errors raised when resolving a service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("No service registered for type '{type_name}'")]
    Missing { type_name: &'static str },
}

/// Type-keyed service registry. Cheap to clone.
#[derive(Clone, Default)]
pub struct Services {
    entries: Arc<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl Services {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `value`, replacing any earlier value of the same type.
    pub fn with<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        Arc::make_mut(&mut self.entries).insert(TypeId::of::<T>(), Arc::new(value));
        self
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.entries
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|entry| entry.downcast::<T>().ok())
    }

    /// Like [`get`](Self::get), failing when the service is absent.
    pub fn require<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, ServiceError> {
        self.get::<T>().ok_or(ServiceError::Missing {
            type_name: type_name::<T>(),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("registered", &self.entries.len())
            .finish()
    }
}
