//! Claim-and-dispatch loop.
//!
//! One invocation of [`Dispatcher::run_once`] drains the store: it claims a
//! batch, publishes each record, records the outcome, and claims again until
//! nothing is pending or the cancellation token fires.
//!
//! ```text
//! claim_batch ──▶ publish ──ok──▶ mark_completed
//!      ▲             │
//!      │           error ──▶ sleep(backoff) ──▶ mark_retry_or_failed
//!      └──────────────────────────────────────────────┘
//! ```

use crate::{BackoffPolicy, RelayResult, SinkHandle};
use chrono::{DateTime, Utc};
use outbox_config::RelayConfig;
use outbox_database::{OutboxRecord, OutboxStatus, StoreHandle};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Dispatcher tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Maximum records per claim.
    pub batch_size: usize,
    /// A record is marked failed once this many attempts have failed.
    pub max_retries: u32,
    /// Stamped on every claimed record.
    pub claimant_id: String,
    /// Claims older than this are returned to pending before each run.
    pub claim_lease: Option<Duration>,
    pub backoff: BackoffPolicy,
}

impl DispatcherConfig {
    pub fn from_relay_config(config: &RelayConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            max_retries: config.max_retries,
            claimant_id: config.resolve_claimant_id(),
            claim_lease: config.claim_lease(),
            backoff: BackoffPolicy::from_config(config),
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self::from_relay_config(&RelayConfig::default())
    }
}

/// Outcome counters for one `run_once` invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub claimed: usize,
    pub completed: usize,
    /// Failed attempts that returned the record to pending.
    pub retried: usize,
    /// Records that exhausted their retries.
    pub failed: usize,
    /// Claimed records handed back unattempted on cancellation.
    pub released: usize,
    /// Stale claims returned to pending by the lease sweep.
    pub reclaimed: usize,
}

impl DispatchReport {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Moves records from the store to the sink.
pub struct Dispatcher {
    store: StoreHandle,
    sink: SinkHandle,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(store: StoreHandle, sink: SinkHandle, config: DispatcherConfig) -> Self {
        Self {
            store,
            sink,
            config,
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    /// Drain pending records until none are left or `cancel` fires.
    ///
    /// Cancellation is observed between records and between batches; a
    /// publish or backoff sleep already under way runs to completion. Claimed
    /// records not yet attempted are released back to pending.
    ///
    /// Claim and lease-sweep failures end the invocation with an error.
    /// Failures to record an outcome are logged and the loop moves on.
    pub async fn run_once(&self, cancel: &CancellationToken) -> RelayResult<DispatchReport> {
        let mut report = DispatchReport::default();

        if let Some(cutoff) = self.lease_cutoff() {
            report.reclaimed = self.store.reclaim_stale(cutoff).await?;
            if report.reclaimed > 0 {
                info!(
                    reclaimed = report.reclaimed,
                    claimant_id = %self.config.claimant_id,
                    "Reclaimed stale claims"
                );
            }
        }

        while !cancel.is_cancelled() {
            let batch = self
                .store
                .claim_batch(self.config.batch_size, &self.config.claimant_id)
                .await?;
            if batch.is_empty() {
                break;
            }
            report.claimed += batch.len();
            debug!(
                claimed = batch.len(),
                claimant_id = %self.config.claimant_id,
                "Claimed batch"
            );

            let mut records = batch.into_iter();
            while let Some(record) = records.next() {
                if cancel.is_cancelled() {
                    report.released += self.release_all(std::iter::once(record).chain(records)).await;
                    return Ok(report);
                }
                self.dispatch(record, &mut report).await;
            }
        }

        Ok(report)
    }

    fn lease_cutoff(&self) -> Option<DateTime<Utc>> {
        let lease = chrono::Duration::from_std(self.config.claim_lease?).ok()?;
        Utc::now().checked_sub_signed(lease)
    }

    async fn dispatch(&self, record: OutboxRecord, report: &mut DispatchReport) {
        match self.sink.publish(&record).await {
            Ok(()) => match self
                .store
                .mark_completed(&record.id, &self.config.claimant_id)
                .await
            {
                Ok(()) => {
                    report.completed += 1;
                    debug!(record_id = %record.id, topic = %record.topic, "Record published");
                }
                Err(e) => {
                    error!(record_id = %record.id, error = %e, "Failed to mark record completed");
                }
            },
            Err(publish_error) => {
                let attempt = record.retry_count.saturating_add(1);
                if attempt < self.config.max_retries.max(1) {
                    let delay = self.config.backoff.delay(attempt);
                    warn!(
                        record_id = %record.id,
                        topic = %record.topic,
                        retry_count = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %publish_error,
                        "Publish failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                } else {
                    warn!(
                        record_id = %record.id,
                        topic = %record.topic,
                        retry_count = attempt,
                        error = %publish_error,
                        "Publish failed on final attempt"
                    );
                }

                match self
                    .store
                    .mark_retry_or_failed(
                        &record.id,
                        &self.config.claimant_id,
                        self.config.max_retries,
                    )
                    .await
                {
                    Ok(OutboxStatus::Failed) => {
                        report.failed += 1;
                        error!(
                            record_id = %record.id,
                            topic = %record.topic,
                            retry_count = attempt,
                            "Retries exhausted, record marked failed"
                        );
                    }
                    Ok(_) => report.retried += 1,
                    Err(e) => {
                        error!(record_id = %record.id, error = %e, "Failed to record publish failure");
                    }
                }
            }
        }
    }

    async fn release_all(&self, records: impl Iterator<Item = OutboxRecord>) -> usize {
        let mut released = 0;
        for record in records {
            match self.store.release(&record.id, &self.config.claimant_id).await {
                Ok(()) => released += 1,
                Err(e) => warn!(record_id = %record.id, error = %e, "Failed to release claim"),
            }
        }
        if released > 0 {
            info!(released, "Released unattempted claims on cancellation");
        }
        released
    }
}
