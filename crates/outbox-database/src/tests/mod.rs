//! Store contract tests.
//!
//! Every test in this tree runs against each bundled backend:
//!
//! - `transitions.rs` - status transitions, retry accounting, idempotency
//! - `ordering.rs`    - claim order and batch limits
//! - `concurrency.rs` - competing claimants never share a record
//! - `durability.rs`  - SQLite persistence and multi-handle sharing
//! - `change_feed.rs` - insert notifications

mod change_feed;
mod ordering;

use crate::{InMemoryRecordStore, OutboxRecord, SqliteRecordStore, StoreHandle};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;

/// One fresh, empty store per backend.
async fn backends() -> Vec<(&'static str, StoreHandle)> {
    vec![
        ("memory", Arc::new(InMemoryRecordStore::new()) as StoreHandle),
        (
            "sqlite",
            Arc::new(SqliteRecordStore::open_in_memory().await.unwrap()) as StoreHandle,
        ),
    ]
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

/// A record created `offset_ms` after a fixed base time.
fn record_at(topic: &str, offset_ms: i64) -> OutboxRecord {
    OutboxRecord::with_created_at(
        topic,
        format!("payload-{offset_ms}").into_bytes(),
        base_time() + Duration::milliseconds(offset_ms),
    )
}
