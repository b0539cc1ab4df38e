//! Sink that logs records instead of delivering them.

use super::PublishSink;
use crate::{PublishError, PublishResult};
use async_trait::async_trait;
use outbox_database::OutboxRecord;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

#[derive(Debug, Default)]
pub struct LogSink {
    closed: AtomicBool,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PublishSink for LogSink {
    async fn publish(&self, record: &OutboxRecord) -> PublishResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PublishError::Closed);
        }
        info!(
            record_id = %record.id,
            topic = %record.topic,
            payload_len = record.payload.len(),
            retry_count = record.retry_count,
            "Published outbox record"
        );
        Ok(())
    }

    async fn close(&self) -> PublishResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_fails_after_close() {
        let sink = LogSink::new();
        let record = OutboxRecord::new("orders", b"{}".to_vec());
        sink.publish(&record).await.unwrap();

        sink.close().await.unwrap();
        sink.close().await.unwrap();
        assert!(matches!(
            sink.publish(&record).await,
            Err(PublishError::Closed)
        ));
    }
}
