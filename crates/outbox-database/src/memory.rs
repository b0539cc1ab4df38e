//! In-process record store.
//!
//! Suitable for tests and single-process deployments. Records live in a
//! `parking_lot` mutex; every operation holds the lock for its full
//! read-modify-write, so each transition is a compare-and-swap on the
//! record's status.

use crate::live::ChangeHub;
use crate::{
    ChangeFeed, ChangeFeedSource, OutboxRecord, OutboxStatus, RecordId, RecordStore, StoreError,
    StoreResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug)]
struct Entry {
    record: OutboxRecord,
    /// Insertion order, breaks `created_at` ties.
    seq: u64,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<RecordId, Entry>,
    next_seq: u64,
}

impl Inner {
    fn sorted_ids(&self, status: OutboxStatus) -> Vec<RecordId> {
        let mut matching: Vec<&Entry> = self
            .entries
            .values()
            .filter(|entry| entry.record.status == status)
            .collect();
        matching.sort_by(|a, b| {
            a.record
                .created_at
                .cmp(&b.record.created_at)
                .then(a.seq.cmp(&b.seq))
        });
        matching.into_iter().map(|e| e.record.id.clone()).collect()
    }

    /// The record, if it is in progress under `claimant_id`.
    fn claimed_by(
        &mut self,
        id: &RecordId,
        claimant_id: &str,
        to: OutboxStatus,
    ) -> StoreResult<&mut OutboxRecord> {
        let entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if entry.record.status != OutboxStatus::InProgress {
            return Err(StoreError::InvalidTransition {
                id: id.to_string(),
                from: entry.record.status,
                to,
            });
        }
        if entry.record.claimant_id.as_deref() != Some(claimant_id) {
            return Err(StoreError::ClaimLost {
                id: id.to_string(),
                claimant_id: claimant_id.to_string(),
            });
        }
        Ok(&mut entry.record)
    }
}

/// Record store backed by process memory.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    inner: Mutex<Inner>,
    hub: ChangeHub,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records in any status.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn save(&self, record: &OutboxRecord) -> StoreResult<()> {
        let saved = record.as_saved();
        {
            let mut inner = self.inner.lock();
            if inner.entries.contains_key(&saved.id) {
                return Err(StoreError::DuplicateId(saved.id.to_string()));
            }
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.entries.insert(
                saved.id.clone(),
                Entry {
                    record: saved.clone(),
                    seq,
                },
            );
        }
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
        let now = Utc::now();
        let mut inner = self.inner.lock();
        let candidates = inner.sorted_ids(OutboxStatus::Pending);

        let mut claimed = Vec::with_capacity(max_count.min(candidates.len()));
        for id in candidates.into_iter().take(max_count) {
            if let Some(entry) = inner.entries.get_mut(&id) {
                let record = &mut entry.record;
                record.status = OutboxStatus::InProgress;
                record.claimed_at = Some(now);
                record.claimant_id = Some(claimant_id.to_string());
                claimed.push(record.clone());
            }
        }
        Ok(claimed)
    }

    async fn mark_completed(&self, id: &RecordId, claimant_id: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.entries.get(id) {
            if entry.record.status == OutboxStatus::Completed {
                return Ok(());
            }
        }
        let record = inner.claimed_by(id, claimant_id, OutboxStatus::Completed)?;
        record.status = OutboxStatus::Completed;
        record.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn mark_retry_or_failed(
        &self,
        id: &RecordId,
        claimant_id: &str,
        max_retries: u32,
    ) -> StoreResult<OutboxStatus> {
        let limit = max_retries.max(1);
        let mut inner = self.inner.lock();
        let record = inner.claimed_by(id, claimant_id, OutboxStatus::Pending)?;
        record.retry_count = record.retry_count.saturating_add(1);
        record.status = if record.retry_count >= limit {
            OutboxStatus::Failed
        } else {
            OutboxStatus::Pending
        };
        Ok(record.status)
    }

    async fn release(&self, id: &RecordId, claimant_id: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        let record = inner.claimed_by(id, claimant_id, OutboxStatus::Pending)?;
        record.status = OutboxStatus::Pending;
        Ok(())
    }

    async fn reclaim_stale(&self, claimed_before: DateTime<Utc>) -> StoreResult<usize> {
        let mut inner = self.inner.lock();
        let mut reclaimed = 0;
        for entry in inner.entries.values_mut() {
            let record = &mut entry.record;
            let stale = record.status == OutboxStatus::InProgress
                && record.claimed_at.map_or(true, |at| at < claimed_before);
            if stale {
                record.status = OutboxStatus::Pending;
                reclaimed += 1;
            }
        }
        Ok(reclaimed)
    }

    async fn get(&self, id: &RecordId) -> StoreResult<Option<OutboxRecord>> {
        Ok(self
            .inner
            .lock()
            .entries
            .get(id)
            .map(|entry| entry.record.clone()))
    }

    async fn count_by_status(&self, status: OutboxStatus) -> StoreResult<usize> {
        Ok(self
            .inner
            .lock()
            .entries
            .values()
            .filter(|entry| entry.record.status == status)
            .count())
    }

    async fn list_by_status(
        &self,
        status: OutboxStatus,
        limit: usize,
    ) -> StoreResult<Vec<OutboxRecord>> {
        let inner = self.inner.lock();
        Ok(inner
            .sorted_ids(status)
            .into_iter()
            .take(limit)
            .filter_map(|id| inner.entries.get(&id).map(|e| e.record.clone()))
            .collect())
    }
}

impl ChangeFeedSource for InMemoryRecordStore {
    fn subscribe(&self) -> ChangeFeed {
        self.hub.subscribe()
    }

    fn close(&self) {
        self.hub.close();
    }
}
