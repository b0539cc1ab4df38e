//! In-memory sink with scripted failures.

use super::PublishSink;
use crate::{PublishError, PublishResult};
use async_trait::async_trait;
use outbox_database::{OutboxRecord, RecordId};
use parking_lot::Mutex;
use std::time::Duration;

#[derive(Debug, Default)]
struct State {
    published: Vec<OutboxRecord>,
    attempts: Vec<RecordId>,
    fail_next: usize,
    always_fail: bool,
    delay: Option<Duration>,
    closed: bool,
    close_calls: usize,
}

/// Sink that remembers every record it accepts.
///
/// Failures can be scripted with [`RecordingSink::fail_next`] and
/// [`RecordingSink::set_always_fail`]; a publish delay simulates a slow
/// broker.
#[derive(Debug, Default)]
pub struct RecordingSink {
    state: Mutex<State>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` publish calls with a transient error.
    pub fn fail_next(&self, count: usize) {
        self.state.lock().fail_next = count;
    }

    pub fn set_always_fail(&self, always_fail: bool) {
        self.state.lock().always_fail = always_fail;
    }

    /// Hold every publish call for `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().delay = Some(delay);
    }

    /// Records accepted so far, in publish order.
    pub fn published(&self) -> Vec<OutboxRecord> {
        self.state.lock().published.clone()
    }

    pub fn published_ids(&self) -> Vec<RecordId> {
        self.state.lock().published.iter().map(|r| r.id.clone()).collect()
    }

    /// IDs of every publish call, successful or not.
    pub fn attempts(&self) -> Vec<RecordId> {
        self.state.lock().attempts.clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.state.lock().attempts.len()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn close_calls(&self) -> usize {
        self.state.lock().close_calls
    }
}

#[async_trait]
impl PublishSink for RecordingSink {
    async fn publish(&self, record: &OutboxRecord) -> PublishResult<()> {
        let delay = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(PublishError::Closed);
            }
            state.attempts.push(record.id.clone());
            state.delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        if state.always_fail {
            return Err(PublishError::Transient("scripted failure".to_string()));
        }
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(PublishError::Transient("scripted failure".to_string()));
        }
        state.published.push(record.clone());
        Ok(())
    }

    async fn close(&self) -> PublishResult<()> {
        let mut state = self.state.lock();
        state.closed = true;
        state.close_calls += 1;
        Ok(())
    }
}
