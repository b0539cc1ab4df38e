//! End-to-end relay tests: store, service, strategy and sink wired together.

use outbox_config::RelayConfig;
use outbox_database::{InMemoryRecordStore, OutboxStatus, SqliteRecordStore, StoreHandle};
use outbox_relay::{OutboxService, PublishSink, RecordingSink};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;

fn config(claimant: &str) -> RelayConfig {
    RelayConfig {
        poll_interval_ms: 10,
        max_retries: 3,
        initial_backoff_ms: 1,
        max_backoff_ms: 5,
        claimant_id: Some(claimant.to_string()),
        shutdown_timeout_ms: 2000,
        ..RelayConfig::default()
    }
}

async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn count(store: &StoreHandle, status: OutboxStatus) -> usize {
    store.count_by_status(status).await.unwrap()
}

#[tokio::test]
async fn stored_message_starts_pending() {
    let store: StoreHandle = Arc::new(InMemoryRecordStore::new());
    let service =
        OutboxService::polling(store.clone(), Arc::new(RecordingSink::new()), &config("a"))
            .unwrap();

    let record = service
        .store_message("orders", b"{\"orderId\":42}".to_vec())
        .await
        .unwrap();

    let stored = store.get(&record.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OutboxStatus::Pending);
    assert_eq!(stored.retry_count, 0);
    assert_eq!(count(&store, OutboxStatus::Pending).await, 1);
}

#[tokio::test]
async fn successful_publish_completes_first_time() {
    let store: StoreHandle = Arc::new(InMemoryRecordStore::new());
    let sink = Arc::new(RecordingSink::new());
    let service = OutboxService::polling(store.clone(), sink.clone(), &config("a")).unwrap();

    let record = service.store_message("orders", b"ok".to_vec()).await.unwrap();
    service.start().unwrap();
    wait_until(|| {
        let store = store.clone();
        async move { count(&store, OutboxStatus::Completed).await == 1 }
    })
    .await;
    service.stop().await.unwrap();

    let stored = store.get(&record.id).await.unwrap().unwrap();
    assert_eq!(stored.retry_count, 0);
    assert_eq!(sink.published_ids(), vec![record.id]);
}

#[tokio::test]
async fn repeated_failures_end_in_failed() {
    let file = NamedTempFile::new().unwrap();
    let store: StoreHandle = Arc::new(SqliteRecordStore::open(file.path()).await.unwrap());
    let sink = Arc::new(RecordingSink::new());
    sink.set_always_fail(true);
    let service = OutboxService::polling(store.clone(), sink.clone(), &config("a")).unwrap();

    let record = service.store_message("orders", b"bad".to_vec()).await.unwrap();
    service.start().unwrap();
    wait_until(|| {
        let store = store.clone();
        async move { count(&store, OutboxStatus::Failed).await == 1 }
    })
    .await;
    service.stop().await.unwrap();

    let stored = store.get(&record.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OutboxStatus::Failed);
    assert_eq!(stored.retry_count, 3);
    assert_eq!(sink.attempt_count(), 3);
}

#[tokio::test]
async fn change_feed_service_publishes_new_messages() {
    let store = Arc::new(InMemoryRecordStore::new());
    let sink = Arc::new(RecordingSink::new());
    let service = OutboxService::change_feed(
        store.clone(),
        store.clone(),
        sink.clone(),
        &RelayConfig {
            // Polling would take an hour; only the feed can deliver in time.
            poll_interval_ms: 3_600_000,
            ..config("feed")
        },
    )
    .unwrap();
    service.start().unwrap();

    let first = service.store_message("orders", b"1".to_vec()).await.unwrap();
    let second = service.store_message("payments", b"2".to_vec()).await.unwrap();

    let handle: StoreHandle = store.clone();
    wait_until(|| {
        let store = handle.clone();
        async move { count(&store, OutboxStatus::Completed).await == 2 }
    })
    .await;
    service.stop().await.unwrap();

    let published: HashSet<_> = sink.published_ids().into_iter().collect();
    assert!(published.contains(&first.id));
    assert!(published.contains(&second.id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn relays_sharing_a_file_publish_each_record_once() {
    let file = NamedTempFile::new().unwrap();
    let sink = Arc::new(RecordingSink::new());

    let mut services = Vec::new();
    for n in 0..3 {
        let store: StoreHandle = Arc::new(SqliteRecordStore::open(file.path()).await.unwrap());
        let service =
            OutboxService::polling(store, sink.clone(), &config(&format!("relay-{n}"))).unwrap();
        services.push(service);
    }

    for i in 0..60 {
        services[i % 3]
            .store_message("orders", format!("{i}").into_bytes())
            .await
            .unwrap();
    }
    for service in &services {
        service.start().unwrap();
    }

    let observer = services[0].store().clone();
    wait_until(|| {
        let store = observer.clone();
        async move { count(&store, OutboxStatus::Completed).await == 60 }
    })
    .await;
    for service in &services {
        service.stop().await.unwrap();
    }

    let published = sink.published_ids();
    let unique: HashSet<_> = published.iter().cloned().collect();
    assert_eq!(published.len(), 60);
    assert_eq!(unique.len(), 60);
}

#[tokio::test]
async fn sink_is_closed_after_stop() {
    let sink = Arc::new(RecordingSink::new());
    let service = OutboxService::polling(
        Arc::new(InMemoryRecordStore::new()),
        sink.clone(),
        &config("a"),
    )
    .unwrap();
    service.start().unwrap();
    service.stop().await.unwrap();

    let record = outbox_database::OutboxRecord::new("orders", Vec::new());
    assert!(sink.publish(&record).await.is_err());
}
