//! Event aggregation.
//!
//! Folds ordered events into state through a dispatch table built once per
//! (state type, event family) pair.
//!
//! - `On<E>`: the conventional reducer method, `state.on(&event)`
//! - `EventAggregator`: tag → reducer table plus a state factory
//! - `ReducerTable`: a state type's declaration of its reducers
//! - `EventAggregatorFactory`: lazily built, shared aggregators

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::trace;

use crate::aggregate::VersionedState;
use crate::event::{DomainEvent, Event};

mod factory;
mod reducer;

pub use factory::EventAggregatorFactory;
pub use reducer::{BoxError, EventReducer, ReduceError};

// ============================================================================
// Event families
// ============================================================================

/// A closed set of events an aggregator may dispatch on.
///
/// Restricting an aggregator to a family makes registering a reducer for a
/// foreign event a compile error.
pub trait EventFamily: Send + Sync + 'static {
    const NAME: &'static str;
}

/// Marks `Self` as a member of the event family `F`.
pub trait MemberOf<F: EventFamily>: Event {}

/// The family every event belongs to.
#[derive(Debug)]
pub enum AnyEvent {}

impl EventFamily for AnyEvent {
    const NAME: &'static str = "any";
}

impl<E: Event> MemberOf<AnyEvent> for E {}

/// Conventional reducer: a state type handles `E` in `on`.
pub trait On<E: Event> {
    fn on(&mut self, event: &E);
}

// ============================================================================
// Errors
// ============================================================================

/// Errors raised while building an aggregator.
#[derive(Debug, thiserror::Error)]
pub enum AggregatorError {
    #[error("Duplicate reducer for event '{event_type}' on state '{state_type}'")]
    DuplicateReducer {
        state_type: &'static str,
        event_type: &'static str,
    },
}

// ============================================================================
// Builder
// ============================================================================

type StateFactory<S> = Arc<dyn Fn() -> S + Send + Sync>;

/// Collects reducers for one state type.
pub struct AggregatorBuilder<S, F = AnyEvent> {
    state_factory: StateFactory<S>,
    reducers: Vec<EventReducer<S>>,
    _family: PhantomData<fn() -> F>,
}

impl<S: VersionedState + 'static, F: EventFamily> AggregatorBuilder<S, F> {
    /// Start a table whose empty state comes from `state_factory`.
    pub fn new(state_factory: impl Fn() -> S + Send + Sync + 'static) -> Self {
        Self {
            state_factory: Arc::new(state_factory),
            reducers: Vec::new(),
            _family: PhantomData,
        }
    }

    /// Dispatch `E` to the state's `On<E>` implementation.
    pub fn on<E>(self) -> Self
    where
        E: MemberOf<F>,
        S: On<E>,
    {
        self.on_with::<E>(|state: &mut S, event: &E| state.on(event))
    }

    /// Dispatch `E` to an arbitrary reducer function.
    pub fn on_with<E: MemberOf<F>>(
        mut self,
        reducer: impl Fn(&mut S, &E) + Send + Sync + 'static,
    ) -> Self {
        self.reducers.push(EventReducer::new::<E>(reducer));
        self
    }

    /// Dispatch `E` to a reducer that may fail.
    pub fn try_on_with<E: MemberOf<F>>(
        mut self,
        reducer: impl Fn(&mut S, &E) -> Result<(), BoxError> + Send + Sync + 'static,
    ) -> Self {
        self.reducers.push(EventReducer::fallible::<E>(reducer));
        self
    }

    /// Validate the table. Each event tag may have at most one reducer.
    pub fn build(self) -> Result<EventAggregator<S, F>, AggregatorError> {
        let mut reducers = HashMap::with_capacity(self.reducers.len());
        for reducer in self.reducers {
            let event_type = reducer.event_type();
            if reducers.insert(event_type, reducer).is_some() {
                return Err(AggregatorError::DuplicateReducer {
                    state_type: std::any::type_name::<S>(),
                    event_type,
                });
            }
        }
        Ok(EventAggregator {
            state_factory: self.state_factory,
            reducers,
            _family: PhantomData,
        })
    }
}

/// A state type's reducer table for family `F`.
pub trait ReducerTable<F: EventFamily = AnyEvent>: VersionedState + Sized + 'static {
    fn reducers() -> AggregatorBuilder<Self, F>;
}

// ============================================================================
// Aggregator
// ============================================================================

/// Folds events into state of type `S`.
pub struct EventAggregator<S, F = AnyEvent> {
    state_factory: StateFactory<S>,
    reducers: HashMap<&'static str, EventReducer<S>>,
    _family: PhantomData<fn() -> F>,
}

impl<S: VersionedState + 'static> EventAggregator<S, AnyEvent> {
    pub fn builder(state_factory: impl Fn() -> S + Send + Sync + 'static) -> AggregatorBuilder<S> {
        AggregatorBuilder::new(state_factory)
    }
}

impl<S: VersionedState + 'static, F: EventFamily> EventAggregator<S, F> {
    /// Build the aggregator declared by `S`'s reducer table.
    pub fn from_table() -> Result<Self, AggregatorError>
    where
        S: ReducerTable<F>,
    {
        <S as ReducerTable<F>>::reducers().build()
    }

    /// A fresh empty state from the configured factory.
    pub fn new_state(&self) -> S {
        (self.state_factory)()
    }

    /// Whether a reducer is registered for `event_type`.
    pub fn handles(&self, event_type: &str) -> bool {
        self.reducers.contains_key(event_type)
    }

    /// Fold `events` into `state`, or into a fresh state when `None`.
    pub fn aggregate(&self, events: &[Box<dyn DomainEvent>], state: Option<S>) -> Result<S, ReduceError> {
        let mut state = state.unwrap_or_else(|| self.new_state());
        self.aggregate_into(events, &mut state)?;
        Ok(state)
    }

    /// Fold `events` into an existing state, such as an aggregate's nested state.
    ///
    /// Events without a reducer are skipped. The version advances by
    /// `events.len()` either way.
    pub fn aggregate_into(&self, events: &[Box<dyn DomainEvent>], state: &mut S) -> Result<(), ReduceError> {
        for event in events {
            self.apply(&**event, state)?;
        }
        state.set_state_version(state.state_version() + events.len() as u64);
        Ok(())
    }

    /// Apply one event without touching the version. Returns whether a reducer ran.
    pub fn apply(&self, event: &dyn DomainEvent, state: &mut S) -> Result<bool, ReduceError> {
        match self.reducers.get(event.event_type()) {
            Some(reducer) => {
                reducer.reduce_in_place(event, state)?;
                Ok(true)
            }
            None => {
                trace!(
                    event_type = %event.event_type(),
                    family = F::NAME,
                    "No reducer registered, skipping event"
                );
                Ok(false)
            }
        }
    }
}
