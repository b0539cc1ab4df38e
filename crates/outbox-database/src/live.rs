//! Change notification hub shared by the bundled stores.
//!
//! Subscribers are notified after the insert is committed. Closing the hub
//! drops the sender, which ends every open feed once buffered notifications
//! have been read.

use crate::{ChangeFeed, ChangeNotification, OutboxRecord};
use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast::{self, error::RecvError};

/// Default number of buffered notifications per subscriber.
pub const DEFAULT_FEED_CAPACITY: usize = 1024;

#[derive(Debug)]
pub struct ChangeHub {
    sender: Mutex<Option<broadcast::Sender<OutboxRecord>>>,
    capacity: usize,
}

impl ChangeHub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_FEED_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Mutex::new(Some(sender)),
            capacity: capacity.max(1),
        }
    }

    /// Open a feed of inserts made after this call.
    ///
    /// Subscribing to a closed hub yields a feed that ends immediately.
    pub fn subscribe(&self) -> ChangeFeed {
        let receiver = match self.sender.lock().as_ref() {
            Some(sender) => sender.subscribe(),
            None => {
                let (sender, receiver) = broadcast::channel(self.capacity);
                drop(sender);
                receiver
            }
        };
        feed_from_receiver(receiver)
    }

    /// Broadcast an inserted record. Having no subscribers is fine.
    pub fn notify(&self, record: &OutboxRecord) {
        if let Some(sender) = self.sender.lock().as_ref() {
            let _ = sender.send(record.clone());
        }
    }

    pub fn close(&self) {
        self.sender.lock().take();
    }

    pub fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }
}

impl Default for ChangeHub {
    fn default() -> Self {
        Self::new()
    }
}

fn feed_from_receiver(receiver: broadcast::Receiver<OutboxRecord>) -> ChangeFeed {
    futures_util::stream::unfold(receiver, |mut receiver| async move {
        match receiver.recv().await {
            Ok(record) => Some((Ok(ChangeNotification::Inserted(record)), receiver)),
            Err(RecvError::Lagged(missed)) => {
                Some((Ok(ChangeNotification::Missed(missed)), receiver))
            }
            Err(RecvError::Closed) => None,
        }
    })
    .boxed()
}
