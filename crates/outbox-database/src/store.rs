//! Record store contracts consumed by the relay.
//!
//! Every operation is atomic per record. Backends are selected at
//! composition time and shared as trait objects ([`StoreHandle`]).

use crate::{OutboxRecord, OutboxStatus, RecordId, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use std::sync::Arc;

/// Durable storage for outbox records.
///
/// Several relay instances (possibly in different processes) may share one
/// backend. Mutual exclusion between them rests entirely on
/// [`RecordStore::claim_batch`] being a per-record compare-and-swap, and on
/// every later transition of a claimed record being fenced on the claimant
/// that holds it. A claimant whose claim was swept by
/// [`RecordStore::reclaim_stale`] and taken by someone else gets
/// [`StoreError::ClaimLost`](crate::StoreError::ClaimLost) and changes nothing.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a new record as `Pending` with a zero retry count.
    ///
    /// Fails with `DuplicateId` if the ID is already present.
    async fn save(&self, record: &OutboxRecord) -> StoreResult<()>;

    /// Move up to `max_count` records from `Pending` to `InProgress`, oldest
    /// `created_at` first, stamping `claimed_at` and `claimant_id`.
    ///
    /// Returns the claimed records in claim order. An empty result is not an
    /// error.
    async fn claim_batch(&self, max_count: usize, claimant_id: &str)
        -> StoreResult<Vec<OutboxRecord>>;

    /// `InProgress → Completed` for the claim held by `claimant_id`.
    /// Repeating the call on a completed record is a no-op.
    async fn mark_completed(&self, id: &RecordId, claimant_id: &str) -> StoreResult<()>;

    /// Count one failed attempt: increments `retry_count` and moves the
    /// record to `Failed` when the new count reaches `max_retries`, otherwise
    /// back to `Pending`. Returns the resulting status.
    ///
    /// A `max_retries` of zero is treated as one. Fenced on `claimant_id`.
    async fn mark_retry_or_failed(
        &self,
        id: &RecordId,
        claimant_id: &str,
        max_retries: u32,
    ) -> StoreResult<OutboxStatus>;

    /// `InProgress → Pending` without counting an attempt. Used for claimed
    /// records that were never attempted. Fenced on `claimant_id`.
    async fn release(&self, id: &RecordId, claimant_id: &str) -> StoreResult<()>;

    /// Return every `InProgress` record claimed before `claimed_before` to
    /// `Pending`, leaving its retry count untouched. Returns how many moved.
    async fn reclaim_stale(&self, claimed_before: DateTime<Utc>) -> StoreResult<usize>;

    async fn get(&self, id: &RecordId) -> StoreResult<Option<OutboxRecord>>;

    async fn count_by_status(&self, status: OutboxStatus) -> StoreResult<usize>;

    /// Records in `status`, oldest first.
    async fn list_by_status(&self, status: OutboxStatus, limit: usize)
        -> StoreResult<Vec<OutboxRecord>>;
}

/// Thread-safe handle to a record store backend.
pub type StoreHandle = Arc<dyn RecordStore>;

/// A notification on a change feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeNotification {
    /// A record was durably inserted.
    Inserted(OutboxRecord),
    /// The subscriber fell behind and this many notifications were dropped.
    Missed(u64),
}

/// Stream of insert notifications. Ends when the source is closed.
pub type ChangeFeed = BoxStream<'static, StoreResult<ChangeNotification>>;

/// Push-based notification source for newly inserted records.
pub trait ChangeFeedSource: Send + Sync {
    /// Subscribe to inserts made after this call.
    fn subscribe(&self) -> ChangeFeed;

    /// End every open feed.
    fn close(&self);
}

/// Thread-safe handle to a change feed source.
pub type ChangeFeedHandle = Arc<dyn ChangeFeedSource>;
