//! Configuration and logging for the outbox relay.

mod config;
mod error;
mod logging;

pub use config::{
    RelayConfig, DEFAULT_BATCH_SIZE, DEFAULT_INITIAL_BACKOFF_MS, DEFAULT_LOG_LEVEL,
    DEFAULT_MAX_BACKOFF_MS, DEFAULT_MAX_RETRIES, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_SHUTDOWN_TIMEOUT_MS,
};
pub use error::{ConfigError, ConfigResult};
pub use logging::{init_logging, parse_level, LogConfig, LogFileWriter};
