//! Outbox record model types.

use crate::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque, globally unique record identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Generate a fresh random (UUID v4) identifier.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Wrap an existing identifier.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Processing status of an outbox record.
///
/// ```text
/// Pending ──claim──▶ InProgress ──publish ok──▶ Completed
///    ▲                   │
///    └──retry / release──┤
///                        └──retries exhausted──▶ Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl Default for OutboxStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Completed and Failed records are never mutated again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutboxStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(StoreError::InvalidData(format!(
                "unknown outbox status: {other}"
            ))),
        }
    }
}

/// The unit of work relayed to the messaging system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxRecord {
    pub id: RecordId,
    /// Destination identifier for the publish sink.
    pub topic: String,
    /// Opaque serialized content.
    pub payload: Vec<u8>,
    pub status: OutboxStatus,
    /// Defines claim ordering.
    pub created_at: DateTime<Utc>,
    /// Time of the most recent claim.
    pub claimed_at: Option<DateTime<Utc>>,
    /// Worker that currently (or last) held the claim.
    pub claimant_id: Option<String>,
    /// Failed delivery attempts so far.
    pub retry_count: u32,
    pub completed_at: Option<DateTime<Utc>>,
}

impl OutboxRecord {
    /// Create a new pending record with a fresh ID, stamped now.
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self::with_created_at(topic, payload, Utc::now())
    }

    /// Create a new pending record with an explicit creation time.
    pub fn with_created_at(
        topic: impl Into<String>,
        payload: impl Into<Vec<u8>>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RecordId::new(),
            topic: topic.into(),
            payload: payload.into(),
            status: OutboxStatus::Pending,
            created_at,
            claimed_at: None,
            claimant_id: None,
            retry_count: 0,
            completed_at: None,
        }
    }

    /// The record as it must look right after `save`.
    pub(crate) fn as_saved(&self) -> Self {
        Self {
            status: OutboxStatus::Pending,
            claimed_at: None,
            claimant_id: None,
            retry_count: 0,
            completed_at: None,
            ..self.clone()
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
