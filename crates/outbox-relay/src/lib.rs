//! # Outbox Relay
//!
//! Relays records written to a transactional outbox to a messaging system.
//!
//! Producers call [`OutboxService::store_message`], which only persists a
//! pending record. A background worker, woken by a [`TriggerStrategy`],
//! claims pending records through the store's atomic claim, publishes them
//! to a [`PublishSink`], and records the outcome with capped exponential
//! backoff between failed attempts.
//!
//! ```text
//! ┌──────────┐ save  ┌─────────────┐ claim  ┌────────────┐ publish ┌──────────┐
//! │ producer │──────▶│ RecordStore │◀──────▶│ Dispatcher │────────▶│   Sink   │
//! └──────────┘       └──────┬──────┘        └─────▲──────┘         └──────────┘
//!                           │ inserts             │ run_once
//!                           └──────────▶ TriggerStrategy
//! ```
//!
//! Delivery is at-least-once: a record may be published again if the relay
//! stops between a successful publish and marking the record completed.
//!
//! ## Example
//!
//! ```ignore
//! use outbox_config::RelayConfig;
//! use outbox_database::SqliteRecordStore;
//! use outbox_relay::{LogSink, OutboxService};
//! use std::sync::Arc;
//!
//! let config = RelayConfig::new()?;
//! let store = Arc::new(SqliteRecordStore::open(path).await?);
//! let service = OutboxService::polling(store, Arc::new(LogSink::new()), &config)?;
//! service.start()?;
//! service.store_message("orders", payload).await?;
//! service.stop().await?;
//! ```

mod backoff;
mod dispatcher;
mod error;
mod service;
mod sink;
mod strategy;

pub use backoff::BackoffPolicy;
pub use dispatcher::{DispatchReport, Dispatcher, DispatcherConfig};
pub use error::{PublishError, PublishResult, RelayError, RelayResult};
pub use service::{OutboxService, ServiceStatus};
pub use sink::{HttpSink, HttpSinkConfig, LogSink, PublishSink, RecordingSink, SinkHandle};
pub use strategy::{ChangeFeedStrategy, PollingStrategy, TriggerStrategy};
