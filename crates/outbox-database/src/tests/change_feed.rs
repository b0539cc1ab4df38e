//! Tests for insert notifications from the bundled stores.

use super::record_at;
use crate::{
    ChangeFeedSource, ChangeNotification, InMemoryRecordStore, RecordStore, SqliteRecordStore,
};
use futures_util::StreamExt;
use std::time::Duration;
use tokio::time::timeout;

async fn assert_notifies<S>(store: S)
where
    S: RecordStore + ChangeFeedSource,
{
    let mut feed = store.subscribe();
    let record = record_at("orders", 0);
    store.save(&record).await.unwrap();

    let notification = timeout(Duration::from_secs(1), feed.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    match notification {
        ChangeNotification::Inserted(inserted) => {
            assert_eq!(inserted.id, record.id);
            assert_eq!(inserted.payload, record.payload);
        }
        other => panic!("unexpected notification: {other:?}"),
    }

    store.close();
    assert!(timeout(Duration::from_secs(1), feed.next())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn memory_store_notifies_inserts() {
    assert_notifies(InMemoryRecordStore::new()).await;
}

#[tokio::test]
async fn sqlite_store_notifies_inserts() {
    assert_notifies(SqliteRecordStore::open_in_memory().await.unwrap()).await;
}

#[tokio::test]
async fn rejected_save_is_not_notified() {
    let store = InMemoryRecordStore::new();
    let record = record_at("orders", 0);
    store.save(&record).await.unwrap();

    let mut feed = store.subscribe();
    assert!(store.save(&record).await.is_err());
    store.close();
    assert!(feed.next().await.is_none());
}

#[tokio::test]
async fn claims_and_completions_are_not_notified() {
    let store = InMemoryRecordStore::new();
    let record = record_at("orders", 0);
    store.save(&record).await.unwrap();

    let mut feed = store.subscribe();
    store.claim_batch(1, "w").await.unwrap();
    store.mark_completed(&record.id, "w").await.unwrap();
    store.close();
    assert!(feed.next().await.is_none());
}
