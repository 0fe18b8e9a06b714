//! rehydrate-replay: end-to-end walkthrough
//!
//! Drives a small `Account` aggregate through the repository: open,
//! a run of deposits, a withdrawal, then reloads it from its snapshot
//! and at an earlier version. A legacy `AccountOpened.v1` event is
//! written straight to the store to show migration on load.
//!
//! ## Configuration
//! - REHYDRATE_CONFIG: Path to a YAML config file (optional)
//! - REHYDRATE__SNAPSHOTS__FREQUENCY: Events between snapshots (default here: 5)
//! - REHYDRATE_LOG: tracing filter (default: info)

use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use rehydrate::bus::{EventHandler, InProcessEventBus};
use rehydrate::repository::{EventSourcingStateManager, StateManagerOptions};
use rehydrate::storage::init_storage;
use rehydrate::utils::bootstrap::init_tracing;
use rehydrate::{
    AggregateRoot, AggregatorBuilder, Config, DomainEvent, Event, EventAggregatorFactory,
    EventDescriptor, EventFamily, EventMigrationManager, EventSourcingRepository, EventStore,
    ExpectedVersion, MemberOf, On, ReducerTable, RepositoryOptions, Services, VersionedState,
};

const DEFAULT_SNAPSHOT_FREQUENCY: u64 = 5;

// ============================================================================
// Domain
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AccountOpened {
    owner: String,
    currency: String,
}

impl Event for AccountOpened {
    const EVENT_TYPE: &'static str = "AccountOpened";
}

/// Shape written before accounts carried a currency.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AccountOpenedV1 {
    owner: String,
}

impl Event for AccountOpenedV1 {
    const EVENT_TYPE: &'static str = "AccountOpened.v1";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Deposited {
    amount: i64,
}

impl Event for Deposited {
    const EVENT_TYPE: &'static str = "Deposited";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Withdrawn {
    amount: i64,
}

impl Event for Withdrawn {
    const EVENT_TYPE: &'static str = "Withdrawn";
}

enum AccountEvents {}

impl EventFamily for AccountEvents {
    const NAME: &'static str = "account";
}

impl MemberOf<AccountEvents> for AccountOpened {}
impl MemberOf<AccountEvents> for Deposited {}
impl MemberOf<AccountEvents> for Withdrawn {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct AccountState {
    version: u64,
    owner: Option<String>,
    currency: Option<String>,
    balance: i64,
}

impl VersionedState for AccountState {
    fn state_version(&self) -> u64 {
        self.version
    }

    fn set_state_version(&mut self, version: u64) {
        self.version = version;
    }
}

impl On<AccountOpened> for AccountState {
    fn on(&mut self, event: &AccountOpened) {
        self.owner = Some(event.owner.clone());
        self.currency = Some(event.currency.clone());
    }
}

impl On<Deposited> for AccountState {
    fn on(&mut self, event: &Deposited) {
        self.balance += event.amount;
    }
}

impl On<Withdrawn> for AccountState {
    fn on(&mut self, event: &Withdrawn) {
        self.balance -= event.amount;
    }
}

impl ReducerTable<AccountEvents> for AccountState {
    fn reducers() -> AggregatorBuilder<Self, AccountEvents> {
        AggregatorBuilder::new(AccountState::default)
            .on::<AccountOpened>()
            .on::<Deposited>()
            .on::<Withdrawn>()
    }
}

struct Account {
    id: String,
    state: AccountState,
    pending: Vec<Box<dyn DomainEvent>>,
}

impl Account {
    fn new(id: String) -> Self {
        Self {
            id,
            state: AccountState::default(),
            pending: Vec::new(),
        }
    }

    fn open(&mut self, owner: &str) {
        self.emit(AccountOpened {
            owner: owner.to_string(),
            currency: "EUR".to_string(),
        });
    }

    fn deposit(&mut self, amount: i64) {
        self.emit(Deposited { amount });
    }

    fn withdraw(&mut self, amount: i64) {
        self.emit(Withdrawn { amount });
    }

    fn emit<E: Event>(&mut self, event: E)
    where
        AccountState: On<E>,
    {
        self.state.on(&event);
        self.pending.push(Box::new(event));
    }
}

impl AggregateRoot for Account {
    type Key = String;
    type State = AccountState;
    type Events = AccountEvents;

    const AGGREGATE_TYPE: &'static str = "Account";

    fn id(&self) -> &String {
        &self.id
    }

    fn state(&self) -> &AccountState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut AccountState {
        &mut self.state
    }

    fn pending_events(&self) -> &[Box<dyn DomainEvent>] {
        &self.pending
    }

    fn take_pending_events(&mut self) -> Vec<Box<dyn DomainEvent>> {
        std::mem::take(&mut self.pending)
    }
}

// ============================================================================
// Handler
// ============================================================================

struct LogHandler;

impl EventHandler for LogHandler {
    fn name(&self) -> &str {
        "log"
    }

    fn handle(&self, event: Arc<dyn DomainEvent>) -> BoxFuture<'static, rehydrate::bus::Result<()>> {
        Box::pin(async move {
            info!(event_type = %event.event_type(), "Committed");
            Ok(())
        })
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let mut config = Config::load(None)?;
    if config.snapshots.frequency.is_none() {
        config.snapshots.frequency = Some(DEFAULT_SNAPSHOT_FREQUENCY);
    }

    let cancel = CancellationToken::new();
    let store = init_storage(&config.storage)?;
    let services = Services::new();

    let migrations = Arc::new(EventMigrationManager::new(services.clone()));
    migrations.register::<AccountOpenedV1, AccountOpened>(|_, v1| AccountOpened {
        owner: v1.owner,
        currency: "EUR".to_string(),
    });

    let bus = Arc::new(InProcessEventBus::new());
    bus.subscribe(Box::new(LogHandler)).await;

    let state_manager = EventSourcingStateManager::new(
        Arc::clone(&store),
        services,
        StateManagerOptions::<Account>::from_config(&config.snapshots, |_, key: &String| {
            Account::new(key.clone())
        }),
    );
    let repository = EventSourcingRepository::<Account>::new(
        Arc::clone(&store),
        &EventAggregatorFactory::new(),
        Arc::clone(&migrations),
        Arc::new(state_manager),
    )?
    .with_publisher(bus)
    .with_options(RepositoryOptions::from(&config.repository));

    // Current account: open, twelve deposits, one withdrawal.
    let key = Uuid::new_v4().to_string();
    let mut account = Account::new(key.clone());
    account.open("alice");
    repository.add(&mut account, &cancel).await?;
    for amount in 1..=12 {
        account.deposit(amount * 10);
        repository.update(&mut account, &cancel).await?;
    }
    account.withdraw(100);
    repository.update(&mut account, &cancel).await?;

    let loaded = repository
        .get(&key, &cancel)
        .await?
        .ok_or("account vanished")?;
    info!(
        key = %key,
        version = loaded.state_version(),
        balance = loaded.state().balance,
        "Reloaded account"
    );

    if let Some(earlier) = repository.get_at_version(&key, 5, &cancel).await? {
        info!(
            version = earlier.state_version(),
            balance = earlier.state().balance,
            "Account at version 5"
        );
    }

    // Legacy account stored before the currency field existed.
    let legacy_key = Uuid::new_v4().to_string();
    store
        .append(
            &rehydrate::stream_id::<Account>(&legacy_key),
            vec![
                EventDescriptor::from_event(&AccountOpenedV1 {
                    owner: "bob".to_string(),
                })?,
                EventDescriptor::from_event(&Deposited { amount: 40 })?,
            ],
            ExpectedVersion::NoStream,
            &cancel,
        )
        .await?;
    let legacy = repository
        .get(&legacy_key, &cancel)
        .await?
        .ok_or("legacy account vanished")?;
    info!(
        key = %legacy_key,
        owner = ?legacy.state().owner,
        currency = ?legacy.state().currency,
        balance = legacy.state().balance,
        "Migrated legacy account"
    );

    let removed = repository.remove(&key, &cancel).await?;
    info!(key = %key, removed, "Removed account");

    Ok(())
}
