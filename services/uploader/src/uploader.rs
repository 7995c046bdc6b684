//! Telemetry uploader: sampling, payload construction and dispatch.
//!
//! In sync mode [`TelemetryUploader::submit`] waits for the HTTP round trip.
//! In async mode it only enqueues into a bounded queue drained by a single
//! background worker, and drops the payload when the queue is full so the
//! capture loop never waits on the network.

use crate::config::{ConfigValidationError, DeliveryMode, UploaderConfig};
use crate::delivery::{DeliveryChannel, DeliveryOutcome, HttpDeliveryChannel};
use crate::detection::{to_hazards, DetectorOutput};
use crate::frame::{EncodeError, Frame, FrameEncoder};
use crate::payload::{GpsLocation, PayloadBuilder, TelemetryPayload};
use crate::probe::{derive_health_url, AvailabilityProbe, ProbeError};
use crate::scheduler::{ScheduleDecision, SendSchedule};
use crate::stats::{StatsCollector, UploadStats};
use crate::worker::{self, WorkerHandle, WorkerState};
use reqwest::{Client, Url};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, trace, warn};

/// Errors surfaced to the caller of the uploader.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Frame encoding failed: {0}")]
    Encoding(#[from] EncodeError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigValidationError),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Failed to create HTTP client: {0}")]
    Client(String),
}

impl From<ProbeError> for UploadError {
    fn from(e: ProbeError) -> Self {
        UploadError::InvalidEndpoint(e.to_string())
    }
}

/// What happened to one submitted frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Not selected by the send interval; no work was done
    Skipped,
    /// Delivered inline (sync mode)
    Delivered(DeliveryOutcome),
    /// Accepted by the background queue (async mode)
    Queued,
    /// Background queue full or closed; payload discarded (async mode)
    Dropped,
}

impl SubmitOutcome {
    /// Whether the payload was delivered successfully or handed to the worker.
    pub fn is_sent(&self) -> bool {
        matches!(
            self,
            SubmitOutcome::Delivered(DeliveryOutcome::Success) | SubmitOutcome::Queued
        )
    }
}

enum Dispatch {
    Inline,
    Queued {
        queue: mpsc::Sender<TelemetryPayload>,
        worker: WorkerHandle,
        shutdown_grace: Duration,
    },
}

/// Streams sampled frames and detections to the telemetry endpoint.
pub struct TelemetryUploader {
    schedule: SendSchedule,
    builder: PayloadBuilder,
    channel: Arc<dyn DeliveryChannel>,
    stats: Arc<StatsCollector>,
    dispatch: Dispatch,
    probe: AvailabilityProbe,
}

impl TelemetryUploader {
    /// Create an uploader posting to the configured endpoint over HTTP.
    ///
    /// Must be called from within a tokio runtime when async mode is configured.
    pub fn new(config: UploaderConfig) -> Result<Self, UploadError> {
        config.validate()?;

        let client = Client::builder()
            .user_agent(concat!("telemetry-uploader/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| UploadError::Client(e.to_string()))?;

        let endpoint = Url::parse(&config.endpoint.url)
            .map_err(|e| UploadError::InvalidEndpoint(e.to_string()))?;
        let channel = HttpDeliveryChannel::new(
            client.clone(),
            endpoint,
            config.endpoint.request_timeout(),
        );

        Self::build(config, client, Arc::new(channel))
    }

    /// Create an uploader delivering through a caller-supplied channel.
    pub fn with_channel(
        config: UploaderConfig,
        channel: Arc<dyn DeliveryChannel>,
    ) -> Result<Self, UploadError> {
        config.validate()?;
        Self::build(config, Client::new(), channel)
    }

    fn build(
        config: UploaderConfig,
        client: Client,
        channel: Arc<dyn DeliveryChannel>,
    ) -> Result<Self, UploadError> {
        let mut encoder = FrameEncoder::new(config.encoding.jpeg_quality);
        if let Some((width, height)) = config.encoding.resize() {
            encoder = encoder.with_resize(width, height);
        }

        let builder = PayloadBuilder::new(
            GpsLocation {
                lat: config.location.lat,
                lon: config.location.lon,
            },
            encoder,
        );

        let health_url = derive_health_url(
            &config.endpoint.url,
            &config.endpoint.telemetry_path,
            &config.endpoint.health_path,
        )?;
        let probe = AvailabilityProbe::new(
            client,
            health_url,
            config.probe.attempt_timeout(),
            config.probe.retry_delay(),
        );

        let stats = Arc::new(StatsCollector::new());

        let dispatch = match config.delivery.mode {
            DeliveryMode::Sync => Dispatch::Inline,
            DeliveryMode::Async => {
                let (queue, rx) = mpsc::channel(config.delivery.queue_capacity);
                let worker = worker::spawn(
                    rx,
                    channel.clone(),
                    stats.clone(),
                    config.delivery.poll_timeout(),
                );
                Dispatch::Queued {
                    queue,
                    worker,
                    shutdown_grace: config.delivery.shutdown_grace(),
                }
            }
        };

        info!(
            endpoint = %config.endpoint.url,
            mode = ?config.delivery.mode,
            send_interval = config.encoding.send_interval,
            jpeg_quality = config.encoding.jpeg_quality,
            queue_capacity = config.delivery.queue_capacity,
            "Telemetry uploader initialized"
        );

        Ok(Self {
            schedule: SendSchedule::new(config.encoding.send_interval),
            builder,
            channel,
            stats,
            dispatch,
            probe,
        })
    }

    /// Submit one frame and its detection result.
    ///
    /// Only encoding failures are returned as errors; delivery failures are
    /// counted and reported through the outcome.
    #[instrument(skip_all)]
    pub async fn submit(
        &self,
        frame: &Frame,
        detections: Option<&dyn DetectorOutput>,
    ) -> Result<SubmitOutcome, UploadError> {
        let frame_number = self.stats.record_frame();

        if self.schedule.decide(frame_number) == ScheduleDecision::Skip {
            trace!(frame_number = frame_number, "Frame skipped by send interval");
            return Ok(SubmitOutcome::Skipped);
        }

        let hazards = to_hazards(detections);
        let hazard_count = hazards.len();
        let payload = self.builder.build(frame, hazards)?;

        debug!(
            frame_number = frame_number,
            hazards = hazard_count,
            image_bytes = payload.image_stream().len(),
            "Payload built"
        );

        match &self.dispatch {
            Dispatch::Inline => {
                let outcome = self.channel.deliver(&payload).await;
                self.stats.record_delivery(&outcome);
                Ok(SubmitOutcome::Delivered(outcome))
            }
            Dispatch::Queued { queue, .. } => match queue.try_send(payload) {
                Ok(()) => Ok(SubmitOutcome::Queued),
                Err(mpsc::error::TrySendError::Full(_)) => {
                    self.stats.record_dropped();
                    debug!(frame_number = frame_number, "Payload queue full, frame dropped");
                    Ok(SubmitOutcome::Dropped)
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    self.stats.record_dropped();
                    warn!(frame_number = frame_number, "Background worker stopped, frame dropped");
                    Ok(SubmitOutcome::Dropped)
                }
            },
        }
    }

    /// Poll the backend liveness route until it is ready or `max_wait` elapses.
    pub async fn wait_until_ready(&self, max_wait: Duration) -> bool {
        self.probe.wait_until_ready(max_wait).await
    }

    pub fn stats(&self) -> UploadStats {
        self.stats.snapshot()
    }

    /// State of the background worker, if running in async mode.
    pub fn worker_state(&self) -> Option<WorkerState> {
        match &self.dispatch {
            Dispatch::Inline => None,
            Dispatch::Queued { worker, .. } => Some(worker.state()),
        }
    }

    /// Stop accepting payloads, let the worker drain within its grace
    /// period, and return the final counters.
    pub async fn shutdown(self) -> UploadStats {
        if let Dispatch::Queued {
            queue,
            worker,
            shutdown_grace,
        } = self.dispatch
        {
            drop(queue);
            worker.stop(shutdown_grace).await;
        }

        let stats = self.stats.snapshot();
        info!(
            frames_processed = stats.frames_processed,
            frames_sent = stats.frames_sent,
            errors = stats.errors,
            dropped = stats.dropped,
            success_rate = format!("{:.1}%", stats.success_rate * 100.0),
            "Telemetry uploader stopped"
        );
        stats
    }
}
