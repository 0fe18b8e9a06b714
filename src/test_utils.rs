//! Test fixtures.
//!
//! An `Order` aggregate with a handful of events, an event it never
//! reduces, and three historical shapes of `OrderPlaced` for migration tests.

use serde::{Deserialize, Serialize};

use crate::aggregate::{AggregateRoot, VersionedState};
use crate::aggregator::{AggregatorBuilder, EventFamily, MemberOf, On, ReducerTable};
use crate::event::{DomainEvent, Event};

// ============================================================================
// Events
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub customer: String,
    pub channel: String,
}

impl Event for OrderPlaced {
    const EVENT_TYPE: &'static str = "OrderPlaced";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemAdded {
    pub sku: String,
    pub quantity: u32,
}

impl Event for ItemAdded {
    const EVENT_TYPE: &'static str = "ItemAdded";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderShipped {
    pub carrier: String,
}

impl Event for OrderShipped {
    const EVENT_TYPE: &'static str = "OrderShipped";
}

/// Emitted for auditing only; `OrderState` has no reducer for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAudited {
    pub note: String,
}

impl Event for OrderAudited {
    const EVENT_TYPE: &'static str = "OrderAudited";
}

/// First stored shape of `OrderPlaced`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPlacedV1 {
    pub customer_name: String,
}

impl Event for OrderPlacedV1 {
    const EVENT_TYPE: &'static str = "OrderPlaced.v1";
}

/// Second stored shape of `OrderPlaced`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPlacedV2 {
    pub customer: String,
}

impl Event for OrderPlacedV2 {
    const EVENT_TYPE: &'static str = "OrderPlaced.v2";
}

pub enum OrderEvents {}

impl EventFamily for OrderEvents {
    const NAME: &'static str = "order";
}

impl MemberOf<OrderEvents> for OrderPlaced {}
impl MemberOf<OrderEvents> for ItemAdded {}
impl MemberOf<OrderEvents> for OrderShipped {}
impl MemberOf<OrderEvents> for OrderAudited {}

// ============================================================================
// State
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderState {
    pub version: u64,
    pub customer: Option<String>,
    pub channel: Option<String>,
    pub items: Vec<(String, u32)>,
    pub carrier: Option<String>,
}

impl OrderState {
    pub fn total_quantity(&self) -> u32 {
        self.items.iter().map(|(_, quantity)| quantity).sum()
    }
}

impl VersionedState for OrderState {
    fn state_version(&self) -> u64 {
        self.version
    }

    fn set_state_version(&mut self, version: u64) {
        self.version = version;
    }
}

impl On<OrderPlaced> for OrderState {
    fn on(&mut self, event: &OrderPlaced) {
        self.customer = Some(event.customer.clone());
        self.channel = Some(event.channel.clone());
    }
}

impl On<ItemAdded> for OrderState {
    fn on(&mut self, event: &ItemAdded) {
        self.items.push((event.sku.clone(), event.quantity));
    }
}

impl On<OrderShipped> for OrderState {
    fn on(&mut self, event: &OrderShipped) {
        self.carrier = Some(event.carrier.clone());
    }
}

impl ReducerTable<OrderEvents> for OrderState {
    fn reducers() -> AggregatorBuilder<Self, OrderEvents> {
        AggregatorBuilder::new(OrderState::default)
            .on::<OrderPlaced>()
            .on::<ItemAdded>()
            .on::<OrderShipped>()
    }
}

// ============================================================================
// Aggregate
// ============================================================================

#[derive(Debug)]
pub struct Order {
    id: String,
    state: OrderState,
    pending: Vec<Box<dyn DomainEvent>>,
}

impl Order {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: OrderState::default(),
            pending: Vec::new(),
        }
    }

    pub fn place(&mut self, customer: &str) {
        self.emit(OrderPlaced {
            customer: customer.to_string(),
            channel: "web".to_string(),
        });
    }

    pub fn add_item(&mut self, sku: &str, quantity: u32) {
        self.emit(ItemAdded {
            sku: sku.to_string(),
            quantity,
        });
    }

    pub fn ship(&mut self, carrier: &str) {
        self.emit(OrderShipped {
            carrier: carrier.to_string(),
        });
    }

    pub fn audit(&mut self, note: &str) {
        self.pending.push(Box::new(OrderAudited {
            note: note.to_string(),
        }));
    }

    fn emit<E: Event>(&mut self, event: E)
    where
        OrderState: On<E>,
    {
        self.state.on(&event);
        self.pending.push(Box::new(event));
    }
}

impl AggregateRoot for Order {
    type Key = String;
    type State = OrderState;
    type Events = OrderEvents;

    const AGGREGATE_TYPE: &'static str = "Order";

    fn id(&self) -> &String {
        &self.id
    }

    fn state(&self) -> &OrderState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut OrderState {
        &mut self.state
    }

    fn pending_events(&self) -> &[Box<dyn DomainEvent>] {
        &self.pending
    }

    fn take_pending_events(&mut self) -> Vec<Box<dyn DomainEvent>> {
        std::mem::take(&mut self.pending)
    }
}

/// An order with `n` items added after placement, all still pending.
pub fn order_with_items(id: &str, n: u32) -> Order {
    let mut order = Order::new(id);
    order.place("alice");
    for i in 0..n {
        order.add_item(&format!("SKU-{i}"), i + 1);
    }
    order
}
