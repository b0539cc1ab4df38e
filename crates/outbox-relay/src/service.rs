//! Service orchestrator.
//!
//! Wires one store, one sink and one trigger strategy, and owns the lifecycle
//! of the single worker task:
//!
//! ```text
//! Idle ──start()──▶ Running ──stop()──▶ Stopped
//!   └──────────────stop()───────────────────┘
//! ```

use crate::{
    ChangeFeedStrategy, Dispatcher, DispatcherConfig, PollingStrategy, RelayError, RelayResult,
    SinkHandle, TriggerStrategy,
};
use outbox_config::RelayConfig;
use outbox_database::{ChangeFeedHandle, OutboxRecord, StoreHandle};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Externally visible lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    Idle,
    Running,
    Stopped,
}

enum State {
    Idle(Box<dyn TriggerStrategy>),
    Running(JoinHandle<()>),
    Stopped,
}

/// Transactional outbox relay service.
pub struct OutboxService {
    store: StoreHandle,
    sink: SinkHandle,
    dispatcher: Arc<Dispatcher>,
    cancel: CancellationToken,
    shutdown_timeout: Duration,
    state: Mutex<State>,
}

impl OutboxService {
    /// Build a service from a validated configuration.
    pub fn new(
        store: StoreHandle,
        sink: SinkHandle,
        strategy: Box<dyn TriggerStrategy>,
        config: &RelayConfig,
    ) -> RelayResult<Self> {
        config.validate()?;
        let dispatcher_config = DispatcherConfig::from_relay_config(config);
        Ok(Self::with_dispatcher_config(
            store,
            sink,
            strategy,
            dispatcher_config,
            config.shutdown_timeout(),
        ))
    }

    pub fn with_dispatcher_config(
        store: StoreHandle,
        sink: SinkHandle,
        strategy: Box<dyn TriggerStrategy>,
        dispatcher_config: DispatcherConfig,
        shutdown_timeout: Duration,
    ) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&store),
            Arc::clone(&sink),
            dispatcher_config,
        ));
        Self {
            store,
            sink,
            dispatcher,
            cancel: CancellationToken::new(),
            shutdown_timeout,
            state: Mutex::new(State::Idle(strategy)),
        }
    }

    /// Polling service at `config.poll_interval_ms`.
    pub fn polling(store: StoreHandle, sink: SinkHandle, config: &RelayConfig) -> RelayResult<Self> {
        let strategy = Box::new(PollingStrategy::new(config.poll_interval()));
        Self::new(store, sink, strategy, config)
    }

    /// Change-feed service. `feed` is usually the same object as `store`.
    pub fn change_feed(
        store: StoreHandle,
        feed: ChangeFeedHandle,
        sink: SinkHandle,
        config: &RelayConfig,
    ) -> RelayResult<Self> {
        let strategy = Box::new(ChangeFeedStrategy::new(feed));
        Self::new(store, sink, strategy, config)
    }

    /// Persist a new pending record for `topic`.
    ///
    /// Delivery failures never surface here; only a failed save does.
    pub async fn store_message(
        &self,
        topic: impl Into<String>,
        payload: impl Into<Vec<u8>>,
    ) -> RelayResult<OutboxRecord> {
        let record = OutboxRecord::new(topic, payload);
        self.store.save(&record).await?;
        debug!(record_id = %record.id, topic = %record.topic, "Stored outbox message");
        Ok(record)
    }

    /// Spawn the worker task. Must be called within a Tokio runtime.
    pub fn start(&self) -> RelayResult<()> {
        let mut state = self.state.lock();
        let strategy = match std::mem::replace(&mut *state, State::Stopped) {
            State::Idle(strategy) => strategy,
            running @ State::Running(_) => {
                *state = running;
                return Err(RelayError::AlreadyStarted);
            }
            State::Stopped => return Err(RelayError::Stopped),
        };

        let name = strategy.name();
        let dispatcher = Arc::clone(&self.dispatcher);
        let cancel = self.cancel.clone();
        let handle = tokio::spawn(strategy.run(dispatcher, cancel));
        *state = State::Running(handle);

        info!(
            strategy = name,
            claimant_id = %self.dispatcher.config().claimant_id,
            "Outbox service started"
        );
        Ok(())
    }

    /// Cancel the worker, wait for it up to the shutdown timeout, then close
    /// the sink. Calling it again is a no-op.
    pub async fn stop(&self) -> RelayResult<()> {
        let previous = std::mem::replace(&mut *self.state.lock(), State::Stopped);
        let handle = match previous {
            State::Stopped => return Ok(()),
            State::Idle(_) => None,
            State::Running(handle) => Some(handle),
        };

        info!("Stopping outbox service");
        self.cancel.cancel();

        if let Some(mut handle) = handle {
            match tokio::time::timeout(self.shutdown_timeout, &mut handle).await {
                Ok(Ok(())) => debug!("Worker finished"),
                Ok(Err(e)) => error!(error = %e, "Worker task failed"),
                Err(_) => {
                    warn!(
                        timeout_ms = self.shutdown_timeout.as_millis() as u64,
                        "Worker did not stop in time, aborting"
                    );
                    handle.abort();
                    let _ = handle.await;
                }
            }
        }

        self.sink.close().await?;
        info!("Outbox service stopped");
        Ok(())
    }

    /// Reports `Stopped` as soon as the worker has exited, including when a
    /// change feed ended on its own. `stop()` is still needed to close the
    /// sink.
    pub fn status(&self) -> ServiceStatus {
        match &*self.state.lock() {
            State::Idle(_) => ServiceStatus::Idle,
            State::Running(handle) if handle.is_finished() => ServiceStatus::Stopped,
            State::Running(_) => ServiceStatus::Running,
            State::Stopped => ServiceStatus::Stopped,
        }
    }

    /// The backing store, for status queries.
    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }
}
