//! HTTP delivery of telemetry payloads.
//!
//! A delivery never fails past its own boundary: every attempt ends in one of
//! the three [`DeliveryOutcome`] variants, which the caller folds into the
//! upload counters.

use crate::payload::TelemetryPayload;
pub use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Maximum number of response-body characters kept for diagnostics.
const MAX_BODY_CHARS: usize = 200;

/// Header carrying the per-request correlation ID.
pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// Transport-level failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailureKind {
    Timeout,
    Connect,
    Other,
}

/// Result of a single delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Endpoint answered HTTP 200
    Success,
    /// Endpoint answered with any other status
    Rejected { status: u16, body: String },
    /// No HTTP response was obtained
    TransportFailure {
        kind: TransportFailureKind,
        message: String,
    },
}

impl DeliveryOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DeliveryOutcome::Success)
    }
}

/// Sink for telemetry payloads.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    async fn deliver(&self, payload: &TelemetryPayload) -> DeliveryOutcome;
}

/// Delivery channel posting JSON to the telemetry endpoint.
#[derive(Debug, Clone)]
pub struct HttpDeliveryChannel {
    client: Client,
    endpoint: Url,
    timeout: Duration,
}

impl HttpDeliveryChannel {
    pub fn new(client: Client, endpoint: Url, timeout: Duration) -> Self {
        Self {
            client,
            endpoint,
            timeout,
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl DeliveryChannel for HttpDeliveryChannel {
    #[instrument(skip_all, fields(endpoint = %self.endpoint, hazards = payload.hazards().len()))]
    async fn deliver(&self, payload: &TelemetryPayload) -> DeliveryOutcome {
        let correlation_id = Uuid::new_v4().to_string();
        let started = Instant::now();

        let result = self
            .client
            .post(self.endpoint.clone())
            .timeout(self.timeout)
            .header(CORRELATION_HEADER, &correlation_id)
            .json(payload)
            .send()
            .await;

        let outcome = match result {
            Ok(response) if response.status() == StatusCode::OK => DeliveryOutcome::Success,
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                DeliveryOutcome::Rejected {
                    status,
                    body: truncate_chars(&body, MAX_BODY_CHARS),
                }
            }
            Err(e) => DeliveryOutcome::TransportFailure {
                kind: classify(&e),
                message: e.to_string(),
            },
        };

        let elapsed = started.elapsed();
        metrics::histogram!("telemetry.delivery.duration_seconds").record(elapsed.as_secs_f64());

        match &outcome {
            DeliveryOutcome::Success => {
                debug!(
                    correlation_id = %correlation_id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Payload delivered"
                );
            }
            DeliveryOutcome::Rejected { status, body } => {
                warn!(
                    correlation_id = %correlation_id,
                    status = status,
                    body = %body,
                    "Backend rejected payload"
                );
            }
            DeliveryOutcome::TransportFailure { kind, message } => {
                warn!(
                    correlation_id = %correlation_id,
                    kind = ?kind,
                    error = %message,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Payload delivery failed"
                );
            }
        }

        outcome
    }
}

fn classify(error: &reqwest::Error) -> TransportFailureKind {
    if error.is_timeout() {
        TransportFailureKind::Timeout
    } else if error.is_connect() {
        TransportFailureKind::Connect
    } else {
        TransportFailureKind::Other
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
