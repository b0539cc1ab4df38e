//! Tests for claim ordering and batch limits.

use super::{backends, record_at};
use crate::OutboxStatus;

#[tokio::test]
async fn claims_oldest_first() {
    for (name, store) in backends().await {
        // Saved out of creation order on purpose.
        let newest = record_at("orders", 30);
        let oldest = record_at("orders", 10);
        let middle = record_at("orders", 20);
        for record in [&newest, &oldest, &middle] {
            store.save(record).await.unwrap();
        }

        let claimed = store.claim_batch(10, "w").await.unwrap();
        let ids: Vec<_> = claimed.iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids, vec![oldest.id, middle.id, newest.id], "{name}");
    }
}

#[tokio::test]
async fn equal_timestamps_claim_in_insertion_order() {
    for (name, store) in backends().await {
        let records: Vec<_> = (0..5).map(|_| record_at("orders", 0)).collect();
        for record in &records {
            store.save(record).await.unwrap();
        }

        let claimed = store.claim_batch(5, "w").await.unwrap();
        let claimed_ids: Vec<_> = claimed.iter().map(|r| &r.id).collect();
        let saved_ids: Vec<_> = records.iter().map(|r| &r.id).collect();
        assert_eq!(claimed_ids, saved_ids, "{name}");
    }
}

#[tokio::test]
async fn batch_respects_max_count() {
    for (name, store) in backends().await {
        for i in 0..5 {
            store.save(&record_at("orders", i)).await.unwrap();
        }

        assert_eq!(store.claim_batch(2, "w").await.unwrap().len(), 2, "{name}");
        assert_eq!(store.claim_batch(2, "w").await.unwrap().len(), 2, "{name}");
        assert_eq!(store.claim_batch(2, "w").await.unwrap().len(), 1, "{name}");
        assert!(store.claim_batch(2, "w").await.unwrap().is_empty(), "{name}");
        assert!(store.claim_batch(0, "w").await.unwrap().is_empty(), "{name}");
    }
}

#[tokio::test]
async fn empty_store_claims_nothing() {
    for (name, store) in backends().await {
        assert!(store.claim_batch(10, "w").await.unwrap().is_empty(), "{name}");
    }
}

#[tokio::test]
async fn retried_record_keeps_its_place() {
    for (name, store) in backends().await {
        let first = record_at("orders", 0);
        let second = record_at("orders", 1);
        store.save(&first).await.unwrap();
        store.save(&second).await.unwrap();

        store.claim_batch(1, "w").await.unwrap();
        store.mark_retry_or_failed(&first.id, "w", 3).await.unwrap();

        let next = store.claim_batch(1, "w").await.unwrap();
        assert_eq!(next[0].id, first.id, "{name}");
    }
}

#[tokio::test]
async fn list_by_status_is_oldest_first() {
    for (name, store) in backends().await {
        let late = record_at("orders", 50);
        let early = record_at("orders", 5);
        store.save(&late).await.unwrap();
        store.save(&early).await.unwrap();

        let pending = store.list_by_status(OutboxStatus::Pending, 10).await.unwrap();
        assert_eq!(pending[0].id, early.id, "{name}");
        assert_eq!(pending[1].id, late.id, "{name}");

        let limited = store.list_by_status(OutboxStatus::Pending, 1).await.unwrap();
        assert_eq!(limited.len(), 1, "{name}");
        assert!(store
            .list_by_status(OutboxStatus::Completed, 10)
            .await
            .unwrap()
            .is_empty());
    }
}

#[tokio::test]
async fn claims_ten_oldest_of_fifteen() {
    for (name, store) in backends().await {
        let mut records: Vec<_> = (0..15).map(|i| record_at("orders", i * 10)).collect();
        // Save newest first so insertion order disagrees with creation order.
        for record in records.iter().rev() {
            store.save(record).await.unwrap();
        }

        let claimed = store.claim_batch(10, "w1").await.unwrap();
        records.truncate(10);
        let expected: Vec<_> = records.iter().map(|r| r.id.clone()).collect();
        let actual: Vec<_> = claimed.iter().map(|r| r.id.clone()).collect();
        assert_eq!(actual, expected, "{name}");
        assert!(claimed
            .iter()
            .all(|r| r.status == OutboxStatus::InProgress && r.claimant_id.as_deref() == Some("w1")));
        assert_eq!(store.count_by_status(OutboxStatus::Pending).await.unwrap(), 5, "{name}");
    }
}
