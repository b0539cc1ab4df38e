//! Trigger strategies decide when the dispatcher runs.
//!
//! - [`PollingStrategy`] runs on a fixed cadence
//! - [`ChangeFeedStrategy`] runs whenever the store reports an insert
//!
//! Both run on the service's single worker task and hand all record
//! handling to the [`Dispatcher`].

mod change_feed;
mod polling;

pub use change_feed::ChangeFeedStrategy;
pub use polling::PollingStrategy;

use crate::Dispatcher;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Drives [`Dispatcher::run_once`] until cancelled.
#[async_trait]
pub trait TriggerStrategy: Send + 'static {
    fn name(&self) -> &'static str;

    /// Run until `cancel` fires or the trigger source is exhausted.
    async fn run(self: Box<Self>, dispatcher: Arc<Dispatcher>, cancel: CancellationToken);
}

/// One dispatcher invocation. Errors are logged; the strategy keeps going.
async fn dispatch_once(dispatcher: &Dispatcher, cancel: &CancellationToken, trigger: &'static str) {
    match dispatcher.run_once(cancel).await {
        Ok(report) if report.is_empty() => {}
        Ok(report) => debug!(
            trigger,
            claimed = report.claimed,
            completed = report.completed,
            retried = report.retried,
            failed = report.failed,
            released = report.released,
            reclaimed = report.reclaimed,
            "Dispatch finished"
        ),
        Err(e) => warn!(trigger, error = %e, "Dispatch failed"),
    }
}
