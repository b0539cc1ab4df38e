//! SQLite-backed record store.
//!
//! Durable across restarts and shareable between processes that open the
//! same file. Change notifications only cover inserts made through this
//! handle; other writers to the file are picked up by polling.

use crate::live::ChangeHub;
use crate::{
    queries, AsyncDatabase, ChangeFeed, ChangeFeedSource, OutboxRecord, OutboxStatus, RecordId,
    RecordStore, StoreResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;
use tracing::debug;

pub struct SqliteRecordStore {
    db: AsyncDatabase,
    hub: ChangeHub,
}

impl SqliteRecordStore {
    /// Open (creating if needed) the store at `path`.
    pub async fn open(path: &Path) -> StoreResult<Self> {
        Ok(Self::from_database(AsyncDatabase::open(path).await?))
    }

    /// Open a private, non-durable store.
    pub async fn open_in_memory() -> StoreResult<Self> {
        Ok(Self::from_database(AsyncDatabase::open_in_memory().await?))
    }

    pub fn from_database(db: AsyncDatabase) -> Self {
        Self {
            db,
            hub: ChangeHub::new(),
        }
    }

    pub fn database(&self) -> &AsyncDatabase {
        &self.db
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn save(&self, record: &OutboxRecord) -> StoreResult<()> {
        let saved = record.as_saved();
        let to_insert = saved.clone();
        self.db
            .call(move |conn| queries::insert_record(conn, &to_insert))
            .await?;
        debug!(id = %saved.id, topic = %saved.topic, "Saved outbox record");
        self.hub.notify(&saved);
        Ok(())
    }

    async fn claim_batch(
        &self,
        max_count: usize,
        claimant_id: &str,
    ) -> StoreResult<Vec<OutboxRecord>> {
        if max_count == 0 {
            return Ok(Vec::new());
        }
        let claimant_id = claimant_id.to_string();
        self.db
            .call(move |conn| queries::claim_pending(conn, max_count, &claimant_id, Utc::now()))
            .await
    }

    async fn mark_completed(&self, id: &RecordId, claimant_id: &str) -> StoreResult<()> {
        let id = id.clone();
        let claimant_id = claimant_id.to_string();
        self.db
            .call(move |conn| queries::mark_completed(conn, &id, &claimant_id, Utc::now()))
            .await
    }

    async fn mark_retry_or_failed(
        &self,
        id: &RecordId,
        claimant_id: &str,
        max_retries: u32,
    ) -> StoreResult<OutboxStatus> {
        let id = id.clone();
        let claimant_id = claimant_id.to_string();
        self.db
            .call(move |conn| queries::mark_retry_or_failed(conn, &id, &claimant_id, max_retries))
            .await
    }

    async fn release(&self, id: &RecordId, claimant_id: &str) -> StoreResult<()> {
        let id = id.clone();
        let claimant_id = claimant_id.to_string();
        self.db
            .call(move |conn| queries::release(conn, &id, &claimant_id))
            .await
    }

    async fn reclaim_stale(&self, claimed_before: DateTime<Utc>) -> StoreResult<usize> {
        self.db
            .call(move |conn| queries::reclaim_stale(conn, claimed_before))
            .await
    }

    async fn get(&self, id: &RecordId) -> StoreResult<Option<OutboxRecord>> {
        let id = id.clone();
        self.db.call(move |conn| queries::get_record(conn, &id)).await
    }

    async fn count_by_status(&self, status: OutboxStatus) -> StoreResult<usize> {
        self.db
            .call(move |conn| queries::count_by_status(conn, status))
            .await
    }

    async fn list_by_status(
        &self,
        status: OutboxStatus,
        limit: usize,
    ) -> StoreResult<Vec<OutboxRecord>> {
        self.db
            .call(move |conn| queries::list_by_status(conn, status, limit))
            .await
    }
}

impl ChangeFeedSource for SqliteRecordStore {
    fn subscribe(&self) -> ChangeFeed {
        self.hub.subscribe()
    }

    fn close(&self) {
        self.hub.close();
    }
}
