//! Publish sinks: where claimed records are delivered.
//!
//! - [`LogSink`] writes each record to the tracing log
//! - [`RecordingSink`] keeps records in memory with scripted failures
//! - [`HttpSink`] POSTs records to an HTTP endpoint

mod http;
mod log;
mod recording;

pub use http::{HttpSink, HttpSinkConfig};
pub use log::LogSink;
pub use recording::RecordingSink;

use crate::PublishResult;
use async_trait::async_trait;
use outbox_database::OutboxRecord;
use std::sync::Arc;

/// Destination for outbox records.
///
/// A successful `publish` means the messaging system has accepted the record.
/// Implementations must be safe to call from the single dispatcher task
/// while `close` runs from the service.
#[async_trait]
pub trait PublishSink: Send + Sync {
    async fn publish(&self, record: &OutboxRecord) -> PublishResult<()>;

    /// Release resources. Idempotent; later publishes fail with `Closed`.
    async fn close(&self) -> PublishResult<()>;
}

/// Thread-safe handle to a publish sink.
pub type SinkHandle = Arc<dyn PublishSink>;
