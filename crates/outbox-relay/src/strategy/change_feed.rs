//! Push-triggered dispatch from a change feed.

use super::{dispatch_once, TriggerStrategy};
use crate::Dispatcher;
use async_trait::async_trait;
use futures_util::StreamExt;
use outbox_database::{ChangeFeedHandle, ChangeNotification};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Runs the dispatcher once at start to drain the backlog, then again on
/// every insert notification.
///
/// Stops when cancelled, when the feed ends, or when the feed yields an
/// error.
pub struct ChangeFeedStrategy {
    source: ChangeFeedHandle,
}

impl ChangeFeedStrategy {
    pub fn new(source: ChangeFeedHandle) -> Self {
        Self { source }
    }
}

#[async_trait]
impl TriggerStrategy for ChangeFeedStrategy {
    fn name(&self) -> &'static str {
        "change_feed"
    }

    async fn run(self: Box<Self>, dispatcher: Arc<Dispatcher>, cancel: CancellationToken) {
        // Subscribe before draining so inserts made during the drain are seen.
        let mut feed = self.source.subscribe();
        info!(
            claimant_id = %dispatcher.config().claimant_id,
            "Change feed strategy started"
        );

        dispatch_once(&dispatcher, &cancel, "change_feed").await;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = feed.next() => next,
            };

            match next {
                Some(Ok(ChangeNotification::Inserted(record))) => {
                    debug!(record_id = %record.id, topic = %record.topic, "Insert notification");
                }
                Some(Ok(ChangeNotification::Missed(missed))) => {
                    warn!(missed, "Change feed lagged, draining");
                }
                Some(Err(e)) => {
                    error!(error = %e, "Change feed failed");
                    break;
                }
                None => {
                    info!("Change feed closed");
                    break;
                }
            }

            dispatch_once(&dispatcher, &cancel, "change_feed").await;
        }

        info!("Change feed strategy stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DispatcherConfig, RecordingSink};
    use outbox_database::{
        ChangeFeed, ChangeFeedSource, InMemoryRecordStore, OutboxRecord, OutboxStatus,
        RecordStore, StoreError,
    };
    use std::time::Duration;

    fn start(
        store: Arc<InMemoryRecordStore>,
        sink: Arc<RecordingSink>,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            sink,
            DispatcherConfig::default(),
        ));
        let strategy = Box::new(ChangeFeedStrategy::new(store));
        tokio::spawn(strategy.run(dispatcher, cancel))
    }

    async fn wait_for_completed(store: &InMemoryRecordStore, expected: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while store.count_by_status(OutboxStatus::Completed).await.unwrap() < expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn drains_backlog_on_start() {
        let store = Arc::new(InMemoryRecordStore::new());
        let sink = Arc::new(RecordingSink::new());
        for i in 0..3 {
            store.save(&OutboxRecord::new("orders", vec![i])).await.unwrap();
        }

        let cancel = CancellationToken::new();
        let task = start(store.clone(), sink.clone(), cancel.clone());
        wait_for_completed(&store, 3).await;

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn dispatches_on_insert() {
        let store = Arc::new(InMemoryRecordStore::new());
        let sink = Arc::new(RecordingSink::new());
        let cancel = CancellationToken::new();
        let task = start(store.clone(), sink.clone(), cancel.clone());

        tokio::time::sleep(Duration::from_millis(20)).await;
        let record = OutboxRecord::new("orders", b"pushed".to_vec());
        store.save(&record).await.unwrap();
        wait_for_completed(&store, 1).await;
        assert_eq!(sink.published_ids(), vec![record.id]);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn ends_when_feed_closes() {
        let store = Arc::new(InMemoryRecordStore::new());
        let sink = Arc::new(RecordingSink::new());
        let task = start(store.clone(), sink, CancellationToken::new());

        tokio::time::sleep(Duration::from_millis(20)).await;
        store.close();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }

    /// Feed that fails immediately.
    struct FailingFeed;

    impl ChangeFeedSource for FailingFeed {
        fn subscribe(&self) -> ChangeFeed {
            futures_util::stream::iter(vec![Err(StoreError::Connection(
                "change stream lost".to_string(),
            ))])
            .boxed()
        }

        fn close(&self) {}
    }

    #[tokio::test]
    async fn ends_on_feed_error() {
        let store = Arc::new(InMemoryRecordStore::new());
        let dispatcher = Arc::new(Dispatcher::new(
            store,
            Arc::new(RecordingSink::new()),
            DispatcherConfig::default(),
        ));
        let strategy = Box::new(ChangeFeedStrategy::new(Arc::new(FailingFeed)));

        tokio::time::timeout(
            Duration::from_secs(1),
            strategy.run(dispatcher, CancellationToken::new()),
        )
        .await
        .unwrap();
    }
}
