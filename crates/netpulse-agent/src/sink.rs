//! Time-series sink: health check, connection lifecycle and measurement writes.

use crate::config::InfluxConfig;
use async_trait::async_trait;
use chrono::Utc;
use netpulse_common::line_protocol;
use netpulse_common::types::{Measurement, SeriesNames};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

/// Connection lifecycle. Only `Connected` permits writes; `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    Disconnected,
    HealthChecked,
    Connected,
    Closed,
}

/// Errors raised by a [`MetricSink`].
///
/// Transport-level failures are transient: the scheduler logs them and moves
/// on. See [`SinkError::is_fatal`] for the ones that end the process.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The endpoint could not be reached.
    #[error("Sink: transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Sink: request timed out: {0}")]
    Timeout(String),

    /// The endpoint answered with an unexpected status.
    #[error("Sink: request rejected: status={status}, body={body}")]
    Rejected { status: u16, body: String },

    /// The endpoint refused the configured token.
    #[error("Sink: credentials rejected (status={0})")]
    Unauthorized(u16),

    #[error("Sink: bucket '{bucket}' not found in org '{org}'")]
    BucketNotFound { bucket: String, org: String },

    #[error("Sink: cannot {operation} while {state:?}")]
    InvalidState {
        operation: &'static str,
        state: SinkState,
    },
}

impl SinkError {
    /// Whether the process can not meaningfully continue after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SinkError::Unauthorized(_) | SinkError::BucketNotFound { .. } | SinkError::InvalidState { .. }
        )
    }

    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SinkError::Timeout(e.to_string())
        } else {
            SinkError::Transport(e)
        }
    }
}

/// The time-series store the scheduler writes to.
///
/// A sink is owned by exactly one scheduler and used serially.
#[async_trait]
pub trait MetricSink: Send {
    /// Lightweight liveness probe. Never fails; problems are logged and reported as `false`.
    async fn health_check(&mut self) -> bool;

    /// Open the write channel. Only valid after a successful health check.
    async fn connect(&mut self) -> Result<(), SinkError>;

    /// Encode and send all records of one measurement. Returns the record count.
    async fn write(&mut self, measurement: &Measurement) -> Result<usize, SinkError>;

    /// Release the write channel. Safe to call more than once.
    async fn close(&mut self);

    /// Retry [`MetricSink::health_check`] every `retry_interval` until it succeeds.
    async fn wait_for_healthy(&mut self, retry_interval: Duration) {
        loop {
            if self.health_check().await {
                tracing::info!("Sink is healthy");
                return;
            }
            tracing::warn!(
                retry_secs = retry_interval.as_secs_f64(),
                "Sink is not healthy, retrying"
            );
            tokio::time::sleep(retry_interval).await;
        }
    }

    /// Wait for health, then connect, retrying transient connect failures.
    ///
    /// Only a fatal error (see [`SinkError::is_fatal`]) is returned.
    async fn connect_when_healthy(&mut self, retry_interval: Duration) -> Result<(), SinkError> {
        loop {
            self.wait_for_healthy(retry_interval).await;
            match self.connect().await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        retry_secs = retry_interval.as_secs_f64(),
                        "Connect failed, retrying"
                    );
                    tokio::time::sleep(retry_interval).await;
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct BucketList {
    #[serde(default)]
    buckets: Vec<serde::de::IgnoredAny>,
}

/// InfluxDB v2 sink writing line protocol over HTTP.
pub struct InfluxSink {
    base_url: String,
    token: String,
    org: String,
    bucket: String,
    names: SeriesNames,
    client: Option<reqwest::Client>,
    state: SinkState,
}

impl InfluxSink {
    pub fn new(config: &InfluxConfig, names: SeriesNames) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(config.write_timeout())
            .build()
            .map_err(SinkError::Transport)?;
        Ok(Self {
            base_url: config.base_url(),
            token: config.token.clone(),
            org: config.org.clone(),
            bucket: config.bucket.clone(),
            names,
            client: Some(client),
            state: SinkState::Disconnected,
        })
    }

    pub fn state(&self) -> SinkState {
        self.state
    }

    fn client(&self, operation: &'static str) -> Result<&reqwest::Client, SinkError> {
        self.client.as_ref().ok_or(SinkError::InvalidState {
            operation,
            state: self.state,
        })
    }

    fn auth_header(&self) -> String {
        format!("Token {}", self.token)
    }
}

#[async_trait]
impl MetricSink for InfluxSink {
    async fn health_check(&mut self) -> bool {
        let Ok(client) = self.client("health check") else {
            return false;
        };
        let url = format!("{}/ping", self.base_url);
        match client.get(&url).send().await {
            Ok(resp) if resp.status() == StatusCode::NO_CONTENT => {
                if self.state == SinkState::Disconnected {
                    self.state = SinkState::HealthChecked;
                }
                true
            }
            Ok(resp) => {
                tracing::warn!(url = %url, status = %resp.status(), "Unexpected health check status");
                false
            }
            Err(e) => {
                let reason = if e.is_timeout() {
                    "timed out"
                } else if e.is_connect() {
                    "connection refused or unreachable"
                } else {
                    "request failed"
                };
                tracing::warn!(url = %url, reason, error = %e, "Health check failed");
                false
            }
        }
    }

    async fn connect(&mut self) -> Result<(), SinkError> {
        if self.state != SinkState::HealthChecked {
            return Err(SinkError::InvalidState {
                operation: "connect",
                state: self.state,
            });
        }

        let resp = self
            .client("connect")?
            .get(format!("{}/api/v2/buckets", self.base_url))
            .query(&[("name", self.bucket.as_str()), ("org", self.org.as_str())])
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .send()
            .await
            .map_err(SinkError::from_reqwest)?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SinkError::Unauthorized(status.as_u16()));
        }
        let bucket_missing = SinkError::BucketNotFound {
            bucket: self.bucket.clone(),
            org: self.org.clone(),
        };
        if status == StatusCode::NOT_FOUND {
            return Err(bucket_missing);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SinkError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        let list: BucketList = resp.json().await.map_err(SinkError::from_reqwest)?;
        if list.buckets.is_empty() {
            return Err(bucket_missing);
        }

        self.state = SinkState::Connected;
        tracing::info!(bucket = %self.bucket, org = %self.org, "Connected to InfluxDB");
        Ok(())
    }

    async fn write(&mut self, measurement: &Measurement) -> Result<usize, SinkError> {
        if self.state != SinkState::Connected {
            return Err(SinkError::InvalidState {
                operation: "write",
                state: self.state,
            });
        }

        let records = measurement.to_records(&self.names);
        let timestamp_ns = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let body = line_protocol::encode(&records, timestamp_ns);
        if body.is_empty() {
            tracing::debug!(kind = measurement.kind(), "Nothing to write");
            return Ok(0);
        }

        let resp = self
            .client("write")?
            .post(format!("{}/api/v2/write", self.base_url))
            .query(&[
                ("org", self.org.as_str()),
                ("bucket", self.bucket.as_str()),
                ("precision", "ns"),
            ])
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await
            .map_err(SinkError::from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SinkError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        tracing::debug!(kind = measurement.kind(), records = records.len(), "Wrote measurement");
        Ok(records.len())
    }

    async fn close(&mut self) {
        if self.state == SinkState::Closed {
            return;
        }
        // Dropping the client releases its pooled connections.
        self.client = None;
        self.state = SinkState::Closed;
        tracing::info!("Sink closed");
    }
}
