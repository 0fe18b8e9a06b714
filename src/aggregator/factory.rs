//! Aggregator cache.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use super::{AggregatorError, AnyEvent, EventAggregator, EventFamily, ReducerTable};

type CacheKey = (TypeId, TypeId);

/// Builds each aggregator once and hands out shared references.
///
/// Entries are keyed by the (state type, event family) pair, so the same
/// state used with two families gets two aggregators.
#[derive(Default)]
pub struct EventAggregatorFactory {
    cache: RwLock<HashMap<CacheKey, Arc<dyn Any + Send + Sync>>>,
}

impl EventAggregatorFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Aggregator for `S` over every event type.
    pub fn create_state_aggregator<S>(&self) -> Result<Arc<EventAggregator<S>>, AggregatorError>
    where
        S: ReducerTable<AnyEvent>,
    {
        self.create_aggregator::<S, AnyEvent>()
    }

    /// Aggregator for `S` restricted to family `F`.
    pub fn create_aggregator<S, F>(&self) -> Result<Arc<EventAggregator<S, F>>, AggregatorError>
    where
        S: ReducerTable<F>,
        F: EventFamily,
    {
        let key = (TypeId::of::<S>(), TypeId::of::<F>());

        if let Some(cached) = self.lookup::<S, F>(&key) {
            return Ok(cached);
        }

        let built: Arc<dyn Any + Send + Sync> = Arc::new(EventAggregator::<S, F>::from_table()?);
        let entry = {
            let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(cache.entry(key).or_insert(built))
        };
        debug!(
            state = type_name::<S>(),
            family = F::NAME,
            "Built event aggregator"
        );

        Ok(downcast(entry))
    }

    /// Number of cached aggregators.
    pub fn len(&self) -> usize {
        self.cache.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup<S, F>(&self, key: &CacheKey) -> Option<Arc<EventAggregator<S, F>>>
    where
        S: ReducerTable<F>,
        F: EventFamily,
    {
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        cache.get(key).cloned().map(downcast)
    }
}

// Entries are only ever inserted under the key derived from their own type.
fn downcast<S, F>(entry: Arc<dyn Any + Send + Sync>) -> Arc<EventAggregator<S, F>>
where
    S: 'static,
    F: 'static,
{
    match entry.downcast::<EventAggregator<S, F>>() {
        Ok(aggregator) => aggregator,
        Err(_) => unreachable!("aggregator cache entry does not match its key"),
    }
}
