//! Configuration surface for the outbox relay.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Default polling cadence in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5000;

/// Default per-record retry ceiling.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default maximum number of records per claim.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Default initial backoff delay in milliseconds.
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 1000;

/// Default backoff cap in milliseconds.
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 30_000;

/// Default time `stop()` waits for in-flight work.
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 60_000;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Relay configuration.
///
/// Every field has a default so a partial JSON file is enough:
///
/// ```json
/// { "poll_interval_ms": 1000, "batch_size": 50 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Polling strategy cadence.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Per-record retry ceiling. A record is marked failed when its retry
    /// count reaches this value.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Maximum records per claim.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Backoff delay base.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Backoff delay cap.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Identifier stamped on claimed records. Generated when absent.
    #[serde(default)]
    pub claimant_id: Option<String>,
    /// Claims older than this are considered stalled and returned to pending.
    /// Disabled when absent.
    #[serde(default)]
    pub claim_lease_ms: Option<u64>,
    /// How long `stop()` waits for the worker before aborting it.
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_initial_backoff_ms() -> u64 {
    DEFAULT_INITIAL_BACKOFF_MS
}

fn default_max_backoff_ms() -> u64 {
    DEFAULT_MAX_BACKOFF_MS
}

fn default_shutdown_timeout_ms() -> u64 {
    DEFAULT_SHUTDOWN_TIMEOUT_MS
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            batch_size: DEFAULT_BATCH_SIZE,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
            claimant_id: None,
            claim_lease_ms: None,
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl RelayConfig {
    /// Create a config with default values, then override from environment.
    pub fn new() -> ConfigResult<Self> {
        let mut config = Self::default();
        config.load_from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file, then apply environment overrides.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let mut config = if path.exists() {
            Self::load_from_file(path)?
        } else {
            debug!(path = %path.display(), "Config file missing, using defaults");
            Self::default()
        };
        config.load_from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file, without overrides.
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: RelayConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Override configuration from `OUTBOX_*` environment variables.
    fn load_from_env(&mut self) -> ConfigResult<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a key lookup. Unset keys are left alone.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("OUTBOX_POLL_INTERVAL_MS") {
            self.poll_interval_ms = parse_var("OUTBOX_POLL_INTERVAL_MS", &value)?;
        }
        if let Some(value) = lookup("OUTBOX_MAX_RETRIES") {
            self.max_retries = parse_var("OUTBOX_MAX_RETRIES", &value)?;
        }
        if let Some(value) = lookup("OUTBOX_BATCH_SIZE") {
            self.batch_size = parse_var("OUTBOX_BATCH_SIZE", &value)?;
        }
        if let Some(value) = lookup("OUTBOX_CLAIMANT_ID") {
            self.claimant_id = Some(value);
        }
        if let Some(value) = lookup("OUTBOX_LOG_LEVEL") {
            self.log_level = value;
        }
        Ok(())
    }

    /// Reject values the relay cannot run with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_retries == 0 {
            return Err(ConfigError::Invalid("max_retries must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be at least 1".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_ms must be greater than zero".into(),
            ));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(ConfigError::Invalid(format!(
                "initial_backoff_ms ({}) exceeds max_backoff_ms ({})",
                self.initial_backoff_ms, self.max_backoff_ms
            )));
        }
        if matches!(self.claim_lease_ms, Some(0)) {
            return Err(ConfigError::Invalid(
                "claim_lease_ms must be greater than zero when set".into(),
            ));
        }
        Ok(())
    }

    /// Polling cadence as a Duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Backoff base as a Duration.
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    /// Backoff cap as a Duration.
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    /// Claim lease as a Duration, if enabled.
    pub fn claim_lease(&self) -> Option<Duration> {
        self.claim_lease_ms.map(Duration::from_millis)
    }

    /// Shutdown grace period as a Duration.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// The configured claimant ID, or a fresh `relay-<uuid>` one.
    pub fn resolve_claimant_id(&self) -> String {
        self.claimant_id
            .clone()
            .unwrap_or_else(|| format!("relay-{}", uuid::Uuid::new_v4()))
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> ConfigResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{key} has invalid value {value:?}")))
}
