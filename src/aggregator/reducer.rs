//! Single-event reducers.

use std::fmt;

use crate::event::{resolve, DomainEvent, Event, EventError};

/// Boxed error returned by fallible reducers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while folding an event into state.
#[derive(Debug, thiserror::Error)]
pub enum ReduceError {
    #[error(transparent)]
    Event(#[from] EventError),

    #[error("Reducer for '{event_type}' failed: {source}")]
    Reducer {
        event_type: String,
        #[source]
        source: BoxError,
    },
}

type ReduceFn<S> = dyn Fn(&dyn DomainEvent, &mut S) -> Result<(), ReduceError> + Send + Sync;

/// Applies events of one type to one state type.
pub struct EventReducer<S> {
    event_type: &'static str,
    apply: Box<ReduceFn<S>>,
}

impl<S: 'static> EventReducer<S> {
    pub fn new<E: Event>(reducer: impl Fn(&mut S, &E) + Send + Sync + 'static) -> Self {
        Self::fallible::<E>(move |state, event| {
            reducer(state, event);
            Ok(())
        })
    }

    /// Reducer whose failure propagates to the caller of `aggregate`.
    pub fn fallible<E: Event>(
        reducer: impl Fn(&mut S, &E) -> Result<(), BoxError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            event_type: E::EVENT_TYPE,
            apply: Box::new(move |event: &dyn DomainEvent, state: &mut S| -> Result<(), ReduceError> {
                let typed = resolve::<E>(event)?;
                reducer(state, &*typed).map_err(|source| ReduceError::Reducer {
                    event_type: E::EVENT_TYPE.to_string(),
                    source,
                })
            }),
        }
    }

    /// Tag of the events this reducer accepts.
    pub fn event_type(&self) -> &'static str {
        self.event_type
    }

    /// Apply `event` to `state` and hand the state back.
    ///
    /// An event of any other type is rejected without touching `state`.
    pub fn reduce(&self, event: &dyn DomainEvent, mut state: S) -> Result<S, ReduceError> {
        self.reduce_in_place(event, &mut state)?;
        Ok(state)
    }

    pub fn reduce_in_place(&self, event: &dyn DomainEvent, state: &mut S) -> Result<(), ReduceError> {
        (self.apply)(event, state)
    }
}

impl<S> fmt::Debug for EventReducer<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventReducer")
            .field("event_type", &self.event_type)
            .finish_non_exhaustive()
    }
}
