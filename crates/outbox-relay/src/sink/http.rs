//! HTTP delivery sink.
//!
//! Each record is POSTed as JSON to `{base_url}/topics/{topic}/messages`,
//! with the topic percent-encoded as a single path segment.
//! Server errors, throttling and transport failures are reported as
//! transient; any other non-success status is permanent.

use super::PublishSink;
use crate::{PublishError, PublishResult};
use async_trait::async_trait;
use base64::Engine;
use outbox_database::OutboxRecord;
use reqwest::{Client, StatusCode, Url};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;

/// Base64 encoding engine for record payloads.
const BASE64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

/// HTTP sink configuration.
#[derive(Debug, Clone)]
pub struct HttpSinkConfig {
    /// Endpoint root. May carry a path prefix.
    pub base_url: String,
    /// Sent as `Authorization: Bearer <token>` when present.
    pub auth_token: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl HttpSinkConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth_token: None,
            timeout_secs: 30,
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }
}

/// Request body for one record.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PublishRequest<'a> {
    id: &'a str,
    topic: &'a str,
    /// Standard base64.
    payload: String,
    created_at: String,
}

impl<'a> PublishRequest<'a> {
    fn from_record(record: &'a OutboxRecord) -> Self {
        Self {
            id: record.id.as_str(),
            topic: &record.topic,
            payload: BASE64.encode(&record.payload),
            created_at: record.created_at.to_rfc3339(),
        }
    }
}

pub struct HttpSink {
    config: HttpSinkConfig,
    client: Client,
    closed: AtomicBool,
}

impl HttpSink {
    pub fn new(config: HttpSinkConfig) -> PublishResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            config,
            client,
            closed: AtomicBool::new(false),
        })
    }

    fn url_for(&self, topic: &str) -> PublishResult<Url> {
        // Dot segments would be dropped from the path rather than encoded.
        if topic.is_empty() || topic == "." || topic == ".." {
            return Err(PublishError::Permanent(format!(
                "topic {topic:?} cannot be used as a path segment"
            )));
        }
        let mut url = Url::parse(&self.config.base_url).map_err(|e| {
            PublishError::Permanent(format!("invalid base URL {}: {e}", self.config.base_url))
        })?;
        url.path_segments_mut()
            .map_err(|()| {
                PublishError::Permanent(format!(
                    "base URL {} cannot carry a path",
                    self.config.base_url
                ))
            })?
            .pop_if_empty()
            .extend(["topics", topic, "messages"]);
        Ok(url)
    }
}

fn classify_status(status: StatusCode, body: String) -> PublishError {
    let message = format!("HTTP {}: {}", status, body);
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        PublishError::Transient(message)
    } else {
        PublishError::Permanent(message)
    }
}

#[async_trait]
impl PublishSink for HttpSink {
    async fn publish(&self, record: &OutboxRecord) -> PublishResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PublishError::Closed);
        }

        let url = self.url_for(&record.topic)?;
        debug!(url = %url, record_id = %record.id, "Publishing record");

        let mut request = self
            .client
            .post(url)
            .json(&PublishRequest::from_record(record));
        if let Some(token) = &self.config.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, body))
    }

    async fn close(&self) -> PublishResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
