//! Shared fixtures for integration tests.
//!
//! A shopping `Cart` aggregate built only from the public API, plus a
//! repository wired over the in-memory store.

#![allow(dead_code)]

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use rehydrate::bus::MockEventBus;
use rehydrate::repository::{EventSourcingStateManager, StateManagerOptions};
use rehydrate::storage::MockEventStore;
use rehydrate::{
    AggregateRoot, AggregatorBuilder, DomainEvent, Event, EventAggregatorFactory, EventFamily,
    EventMigrationManager, EventSourcingRepository, MemberOf, On, ReducerTable, Services,
    VersionedState,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartOpened {
    pub shopper: String,
}

impl Event for CartOpened {
    const EVENT_TYPE: &'static str = "CartOpened";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineAdded {
    pub sku: String,
    pub quantity: u32,
}

impl Event for LineAdded {
    const EVENT_TYPE: &'static str = "LineAdded";
}

/// Stored before quantities existed; every line meant one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineAddedV1 {
    pub sku: String,
}

impl Event for LineAddedV1 {
    const EVENT_TYPE: &'static str = "LineAdded.v1";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartCheckedOut;

impl Event for CartCheckedOut {
    const EVENT_TYPE: &'static str = "CartCheckedOut";
}

pub enum CartEvents {}

impl EventFamily for CartEvents {
    const NAME: &'static str = "cart";
}

impl MemberOf<CartEvents> for CartOpened {}
impl MemberOf<CartEvents> for LineAdded {}
impl MemberOf<CartEvents> for CartCheckedOut {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CartState {
    pub version: u64,
    pub shopper: Option<String>,
    pub lines: Vec<LineAdded>,
    pub checked_out: bool,
}

impl CartState {
    pub fn units(&self) -> u32 {
        self.lines.iter().map(|line| line.quantity).sum()
    }
}

impl VersionedState for CartState {
    fn state_version(&self) -> u64 {
        self.version
    }

    fn set_state_version(&mut self, version: u64) {
        self.version = version;
    }
}

impl On<CartOpened> for CartState {
    fn on(&mut self, event: &CartOpened) {
        self.shopper = Some(event.shopper.clone());
    }
}

impl On<LineAdded> for CartState {
    fn on(&mut self, event: &LineAdded) {
        self.lines.push(event.clone());
    }
}

impl On<CartCheckedOut> for CartState {
    fn on(&mut self, _: &CartCheckedOut) {
        self.checked_out = true;
    }
}

impl ReducerTable<CartEvents> for CartState {
    fn reducers() -> AggregatorBuilder<Self, CartEvents> {
        AggregatorBuilder::new(CartState::default)
            .on::<CartOpened>()
            .on::<LineAdded>()
            .on::<CartCheckedOut>()
    }
}

#[derive(Debug)]
pub struct Cart {
    id: String,
    state: CartState,
    pending: Vec<Box<dyn DomainEvent>>,
}

impl Cart {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: CartState::default(),
            pending: Vec::new(),
        }
    }

    pub fn open(id: impl Into<String>, shopper: &str) -> Self {
        let mut cart = Self::new(id);
        cart.emit(CartOpened {
            shopper: shopper.to_string(),
        });
        cart
    }

    pub fn add_line(&mut self, sku: &str, quantity: u32) {
        self.emit(LineAdded {
            sku: sku.to_string(),
            quantity,
        });
    }

    pub fn check_out(&mut self) {
        self.emit(CartCheckedOut);
    }

    fn emit<E: Event>(&mut self, event: E)
    where
        CartState: On<E>,
    {
        self.state.on(&event);
        self.pending.push(Box::new(event));
    }
}

impl AggregateRoot for Cart {
    type Key = String;
    type State = CartState;
    type Events = CartEvents;

    const AGGREGATE_TYPE: &'static str = "Cart";

    fn id(&self) -> &String {
        &self.id
    }

    fn state(&self) -> &CartState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut CartState {
        &mut self.state
    }

    fn pending_events(&self) -> &[Box<dyn DomainEvent>] {
        &self.pending
    }

    fn take_pending_events(&mut self) -> Vec<Box<dyn DomainEvent>> {
        std::mem::take(&mut self.pending)
    }
}

/// Everything a test needs to drive and inspect a cart repository.
pub struct Harness {
    pub store: Arc<MockEventStore>,
    pub bus: Arc<MockEventBus>,
    pub migrations: Arc<EventMigrationManager>,
    pub repository: EventSourcingRepository<Cart>,
}

pub fn cart_options(snapshot_frequency: u64) -> StateManagerOptions<Cart> {
    StateManagerOptions::new(|_: &Services, key: &String| Cart::new(key.clone()))
        .with_snapshot_frequency(snapshot_frequency)
}

pub fn repository(
    store: &Arc<MockEventStore>,
    migrations: &Arc<EventMigrationManager>,
    options: StateManagerOptions<Cart>,
) -> EventSourcingRepository<Cart> {
    let state_manager = EventSourcingStateManager::new(store.clone(), Services::new(), options);
    EventSourcingRepository::new(
        store.clone(),
        &EventAggregatorFactory::new(),
        Arc::clone(migrations),
        Arc::new(state_manager),
    )
    .unwrap()
}

pub fn harness(snapshot_frequency: u64) -> Harness {
    let store = Arc::new(MockEventStore::new());
    let bus = Arc::new(MockEventBus::new());
    let migrations = Arc::new(EventMigrationManager::new(Services::new()));
    let repository =
        repository(&store, &migrations, cart_options(snapshot_frequency)).with_publisher(bus.clone());
    Harness {
        store,
        bus,
        migrations,
        repository,
    }
}
