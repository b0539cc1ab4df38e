//! Fixed-cadence polling.

use super::{dispatch_once, TriggerStrategy};
use crate::Dispatcher;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Runs the dispatcher immediately and then every `interval`.
///
/// Invocations never overlap: a run that outlasts the interval delays the
/// next tick instead of queueing a burst.
#[derive(Debug, Clone)]
pub struct PollingStrategy {
    interval: Duration,
}

impl PollingStrategy {
    /// A zero interval is raised to one millisecond.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[async_trait]
impl TriggerStrategy for PollingStrategy {
    fn name(&self) -> &'static str {
        "polling"
    }

    async fn run(self: Box<Self>, dispatcher: Arc<Dispatcher>, cancel: CancellationToken) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            interval_ms = self.interval.as_millis() as u64,
            claimant_id = %dispatcher.config().claimant_id,
            "Polling strategy started"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            dispatch_once(&dispatcher, &cancel, "polling").await;
        }

        info!("Polling strategy stopped");
    }
}
