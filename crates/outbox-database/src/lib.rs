//! Outbox record storage.
//!
//! This crate provides:
//! - The [`RecordStore`] contract with its atomic claim operation
//! - [`InMemoryRecordStore`] for tests and single-process use
//! - [`SqliteRecordStore`], durable and shareable between processes
//! - Insert notifications through [`ChangeFeedSource`]

mod error;
mod executor;
mod live;
mod memory;
pub mod migrations;
mod models;
pub mod queries;
mod sqlite;
mod store;

#[cfg(test)]
mod tests;

pub use error::{StoreError, StoreResult};
pub use executor::AsyncDatabase;
pub use live::{ChangeHub, DEFAULT_FEED_CAPACITY};
pub use memory::InMemoryRecordStore;
pub use migrations::run_migrations;
pub use models::{OutboxRecord, OutboxStatus, RecordId};
pub use sqlite::SqliteRecordStore;
pub use store::{
    ChangeFeed, ChangeFeedHandle, ChangeFeedSource, ChangeNotification, RecordStore, StoreHandle,
};
