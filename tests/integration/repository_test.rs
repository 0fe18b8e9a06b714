//! Repository lifecycle tests through the public API.

use serde_json::json;
use tokio_util::sync::CancellationToken;

use rehydrate::{
    snapshot_stream_id, stream_id, AggregateRoot, EventDescriptor, EventStore, ExpectedVersion,
};

use crate::common::{cart_options, harness, repository, Cart, LineAdded, LineAddedV1};

#[tokio::test]
async fn test_cart_lifecycle() {
    let h = harness(4);
    let cancel = CancellationToken::new();
    let key = "cart-1".to_string();

    let mut cart = Cart::open(&key, "alice");
    h.repository.add(&mut cart, &cancel).await.unwrap();

    for quantity in 1..=5 {
        let mut loaded = h.repository.get(&key, &cancel).await.unwrap().unwrap();
        loaded.add_line(&format!("SKU-{quantity}"), quantity);
        h.repository.update(&mut loaded, &cancel).await.unwrap();
    }

    let mut loaded = h.repository.get(&key, &cancel).await.unwrap().unwrap();
    loaded.check_out();
    h.repository.update(&mut loaded, &cancel).await.unwrap();

    let cart = h.repository.get(&key, &cancel).await.unwrap().unwrap();
    assert_eq!(cart.state_version(), 7);
    assert_eq!(cart.state().shopper.as_deref(), Some("alice"));
    assert_eq!(cart.state().units(), 15);
    assert!(cart.state().checked_out);

    assert_eq!(h.store.stream_len(&stream_id::<Cart>(&key)).await, Some(7));
    assert_eq!(
        h.store
            .stream_len(&snapshot_stream_id::<Cart>(&key))
            .await,
        Some(1)
    );
    assert_eq!(h.bus.published_count().await, 7);
}

#[tokio::test]
async fn test_snapshot_and_replay_agree_at_every_version() {
    let h = harness(3);
    let cancel = CancellationToken::new();
    let key = "cart-2".to_string();
    let replay_only = repository(
        &h.store,
        &h.migrations,
        cart_options(0).with_snapshot_reads(false),
    );

    let mut cart = Cart::open(&key, "bob");
    h.repository.add(&mut cart, &cancel).await.unwrap();
    for i in 0..9 {
        cart.add_line("SKU", i + 1);
        h.repository.update(&mut cart, &cancel).await.unwrap();

        let with_snapshots = h.repository.get(&key, &cancel).await.unwrap().unwrap();
        let replayed = replay_only.get(&key, &cancel).await.unwrap().unwrap();
        assert_eq!(with_snapshots.state(), replayed.state());
        assert_eq!(with_snapshots.state(), cart.state());
    }
}

#[tokio::test]
async fn test_history_at_version() {
    let h = harness(2);
    let cancel = CancellationToken::new();
    let key = "cart-3".to_string();
    let mut cart = Cart::open(&key, "carol");
    cart.add_line("A", 1);
    cart.add_line("B", 2);
    cart.add_line("C", 3);
    h.repository.add(&mut cart, &cancel).await.unwrap();

    let at_two = h
        .repository
        .get_at_version(&key, 2, &cancel)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(at_two.state_version(), 2);
    assert_eq!(
        at_two.state().lines,
        vec![LineAdded {
            sku: "A".to_string(),
            quantity: 1
        }]
    );
}

#[tokio::test]
async fn test_legacy_events_are_upcast_on_load() {
    let h = harness(0);
    let cancel = CancellationToken::new();
    let key = "cart-4".to_string();
    h.migrations
        .register::<LineAddedV1, LineAdded>(|_, v1| LineAdded {
            sku: v1.sku,
            quantity: 1,
        });
    h.store
        .append(
            &stream_id::<Cart>(&key),
            vec![
                EventDescriptor::new("CartOpened", json!({"shopper": "dave"})),
                EventDescriptor::new("LineAdded.v1", json!({"sku": "OLD"})),
                EventDescriptor::new("LineAdded", json!({"sku": "NEW", "quantity": 4})),
            ],
            ExpectedVersion::NoStream,
            &cancel,
        )
        .await
        .unwrap();

    let mut cart = h.repository.get(&key, &cancel).await.unwrap().unwrap();
    assert_eq!(cart.state_version(), 3);
    assert_eq!(cart.state().units(), 5);

    // New writes go after the legacy history.
    cart.add_line("NEWER", 1);
    h.repository.update(&mut cart, &cancel).await.unwrap();
    let records = h.store.records(&stream_id::<Cart>(&key)).await;
    assert_eq!(records.len(), 4);
    assert_eq!(records[3].event_type, "LineAdded");
    assert_eq!(records[1].event_type, "LineAdded.v1");
}

#[tokio::test]
async fn test_remove_then_recreate() {
    let h = harness(1);
    let cancel = CancellationToken::new();
    let key = "cart-5".to_string();
    let mut cart = Cart::open(&key, "erin");
    h.repository.add(&mut cart, &cancel).await.unwrap();

    assert!(h.repository.remove(&key, &cancel).await.unwrap());
    assert!(!h.repository.contains(&key, &cancel).await.unwrap());

    let mut again = Cart::open(&key, "frank");
    h.repository.add(&mut again, &cancel).await.unwrap();
    let loaded = h.repository.get(&key, &cancel).await.unwrap().unwrap();
    assert_eq!(loaded.state().shopper.as_deref(), Some("frank"));
    assert_eq!(loaded.state_version(), 1);
}
