//! Backend wake probe.
//!
//! Free-tier hosts put idle services to sleep, and the first request after a
//! sleep can take tens of seconds. The probe polls a liveness route before the
//! capture loop starts so the first real payload does not absorb that delay.

use backoff::backoff::{Backoff, Constant};
use reqwest::{Client, StatusCode, Url};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Errors building a probe.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Invalid endpoint URL {url}: {message}")]
    InvalidUrl { url: String, message: String },
}

/// Derive the liveness URL from the telemetry endpoint.
///
/// The last occurrence of `telemetry_path` in the endpoint path is replaced by
/// `health_path`; when the segment is absent the whole path becomes
/// `health_path`. Query and fragment are dropped.
pub fn derive_health_url(
    endpoint: &str,
    telemetry_path: &str,
    health_path: &str,
) -> Result<Url, ProbeError> {
    let mut url = Url::parse(endpoint).map_err(|e| ProbeError::InvalidUrl {
        url: endpoint.to_string(),
        message: e.to_string(),
    })?;

    let path = url.path().to_string();
    let health = match path.rfind(telemetry_path) {
        Some(idx) if !telemetry_path.is_empty() => format!(
            "{}{}{}",
            &path[..idx],
            health_path,
            &path[idx + telemetry_path.len()..]
        ),
        _ => health_path.to_string(),
    };

    url.set_path(&health);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

/// Polls a liveness URL until it answers HTTP 200 or the wait budget runs out.
#[derive(Debug, Clone)]
pub struct AvailabilityProbe {
    client: Client,
    health_url: Url,
    attempt_timeout: Duration,
    retry_delay: Duration,
}

impl AvailabilityProbe {
    pub fn new(
        client: Client,
        health_url: Url,
        attempt_timeout: Duration,
        retry_delay: Duration,
    ) -> Self {
        Self {
            client,
            health_url,
            attempt_timeout,
            retry_delay,
        }
    }

    pub fn health_url(&self) -> &Url {
        &self.health_url
    }

    /// Returns `true` once the liveness URL answers 200, `false` after
    /// `max_wait` elapses without that.
    pub async fn wait_until_ready(&self, max_wait: Duration) -> bool {
        info!(url = %self.health_url, max_wait_secs = max_wait.as_secs_f64(), "Waking backend");

        let start = Instant::now();
        let mut delays = Constant::new(self.retry_delay);
        let mut attempts = 0u32;

        while start.elapsed() < max_wait {
            attempts += 1;
            let remaining = max_wait.saturating_sub(start.elapsed());

            match self
                .client
                .get(self.health_url.clone())
                .timeout(self.attempt_timeout.min(remaining))
                .send()
                .await
            {
                Ok(response) if response.status() == StatusCode::OK => {
                    info!(
                        attempts = attempts,
                        elapsed_secs = format!("{:.1}", start.elapsed().as_secs_f64()),
                        "Backend awake"
                    );
                    return true;
                }
                Ok(response) => {
                    debug!(attempt = attempts, status = response.status().as_u16(), "Backend not ready");
                }
                Err(e) => {
                    debug!(attempt = attempts, error = %e, "Liveness request failed");
                }
            }

            let remaining = max_wait.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                break;
            }

            let delay = delays.next_backoff().unwrap_or(self.retry_delay);
            info!(
                elapsed_secs = start.elapsed().as_secs(),
                "Still waking backend"
            );
            tokio::time::sleep(delay.min(remaining)).await;
        }

        warn!(
            url = %self.health_url,
            attempts = attempts,
            max_wait_secs = max_wait.as_secs_f64(),
            "Backend did not respond in time, continuing anyway"
        );
        false
    }
}
