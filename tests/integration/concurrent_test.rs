//! Concurrent writer tests.
//!
//! Writers racing on one cart must never lose an event: every conflict is
//! reported, and a reload-and-retry loop eventually lands every write.

use std::sync::Arc;

use tokio::sync::Barrier;
use tokio_util::sync::CancellationToken;

use rehydrate::{stream_id, AggregateRoot};

use crate::common::{harness, Cart};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_writers_with_retry_all_land() {
    let h = harness(5);
    let cancel = CancellationToken::new();
    let key = "cart-race".to_string();
    let mut cart = Cart::open(&key, "alice");
    h.repository.add(&mut cart, &cancel).await.unwrap();

    let repository = Arc::new(h.repository);
    let num_writers = 8;
    let barrier = Arc::new(Barrier::new(num_writers));
    let mut handles = Vec::new();

    for i in 0..num_writers {
        let repository = Arc::clone(&repository);
        let barrier = Arc::clone(&barrier);
        let key = key.clone();
        let cancel = cancel.clone();

        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            let mut conflicts = 0u32;
            loop {
                let mut cart = repository.get(&key, &cancel).await.unwrap().unwrap();
                cart.add_line(&format!("SKU-{i}"), 1);
                match repository.update(&mut cart, &cancel).await {
                    Ok(()) => return conflicts,
                    Err(e) if e.is_concurrency_conflict() => conflicts += 1,
                    Err(e) => panic!("unexpected error: {e}"),
                }
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    let cart = repository.get(&key, &cancel).await.unwrap().unwrap();
    assert_eq!(cart.state_version(), 1 + num_writers as u64);
    assert_eq!(cart.state().units(), num_writers as u32);
    assert_eq!(
        h.store.stream_len(&stream_id::<Cart>(&key)).await,
        Some(1 + num_writers as u64)
    );
}

#[tokio::test]
async fn test_stale_writer_is_rejected_without_side_effects() {
    let h = harness(0);
    let cancel = CancellationToken::new();
    let key = "cart-stale".to_string();
    let mut cart = Cart::open(&key, "bob");
    h.repository.add(&mut cart, &cancel).await.unwrap();

    let mut fresh = h.repository.get(&key, &cancel).await.unwrap().unwrap();
    let mut stale = h.repository.get(&key, &cancel).await.unwrap().unwrap();
    fresh.add_line("A", 1);
    h.repository.update(&mut fresh, &cancel).await.unwrap();
    let published = h.bus.published_count().await;

    stale.add_line("B", 1);
    let err = h.repository.update(&mut stale, &cancel).await.unwrap_err();

    assert!(err.is_concurrency_conflict());
    assert_eq!(stale.state_version(), 1);
    assert_eq!(stale.pending_events().len(), 1);
    assert_eq!(h.bus.published_count().await, published);
}
