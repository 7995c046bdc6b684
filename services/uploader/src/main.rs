//! Telemetry uploader demo binary
//!
//! Streams frames from a synthetic camera to the configured telemetry
//! endpoint. A simulated "Pothole" hazard appears for part of every detection
//! cycle so the receiving dashboard has alerts to show.
//!
//! # Usage
//!
//! ```text
//! telemetry-uploader [FRAME_LIMIT]
//! ```
//!
//! Without a frame limit the demo runs until Ctrl+C.
//!
//! # Configuration
//!
//! Configuration is loaded from:
//! 1. Configuration files (config/default.toml, config/{env}.toml)
//! 2. Environment variables (prefixed with TELEMETRY_)

use anyhow::{Context, Result};
use std::time::Duration;
use telemetry_uploader::{
    DemoConfig, Detections, DetectorOutput, Frame, LoggingConfig, RawDetection, SubmitOutcome,
    TelemetryUploader, UploadStats, UploaderConfig,
};
use tokio::signal;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Simulated hazard box size in pixels.
const HAZARD_BOX: (u32, u32) = (200, 120);

/// Frames between periodic stats lines.
const STATS_EVERY: u64 = 100;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = load_config()?;

    // Initialize logging
    init_logging(&config.logging)?;

    info!(
        service = "telemetry-uploader",
        version = env!("CARGO_PKG_VERSION"),
        endpoint = %config.endpoint.url,
        "Starting telemetry uploader"
    );

    config.validate()?;

    if let Some(port) = config.metrics.port {
        init_metrics(port)?;
    }

    let frame_limit = parse_frame_limit(std::env::args().nth(1))?;

    let uploader = TelemetryUploader::new(config.clone())
        .context("Failed to create telemetry uploader")?;

    if config.probe.enabled {
        uploader.wait_until_ready(config.probe.max_wait()).await;
    }

    let mut camera = SyntheticCamera::new(&config.demo);

    tokio::select! {
        _ = shutdown_signal() => {
            info!("Initiating graceful shutdown...");
        }
        _ = stream_frames(&uploader, &mut camera, config.demo.fps, frame_limit) => {
            info!("Frame stream finished");
        }
    }

    let stats = uploader.shutdown().await;
    log_final_stats(&stats);

    info!("Shutdown complete");
    Ok(())
}

/// Load configuration, falling back to environment variables only.
fn load_config() -> Result<UploaderConfig> {
    let config = UploaderConfig::load().or_else(|e| {
        warn!(error = %e, "Failed to load config from files, trying environment");
        UploaderConfig::from_env()
    })?;

    Ok(config)
}

/// Initialize the tracing/logging subsystem.
fn init_logging(config: &LoggingConfig) -> Result<()> {
    let level = match config.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("telemetry_uploader={}", level).parse()?)
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?);

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.format == "json" {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber.with(fmt::layer().pretty()).init();
    }

    Ok(())
}

/// Initialize the Prometheus metrics exporter.
fn init_metrics(port: u16) -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

fn parse_frame_limit(arg: Option<String>) -> Result<Option<u64>> {
    arg.map(|raw| {
        raw.parse::<u64>()
            .with_context(|| format!("Invalid frame limit: {}", raw))
    })
    .transpose()
}

/// Wait for Ctrl+C.
async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal"),
        Err(e) => {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}

/// Pace the camera at `fps` and submit every frame.
async fn stream_frames(
    uploader: &TelemetryUploader,
    camera: &mut SyntheticCamera,
    fps: f32,
    frame_limit: Option<u64>,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs_f32(1.0 / fps));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(fps = fps, frame_limit = ?frame_limit, "Streaming started");

    let mut captured = 0u64;
    while frame_limit.map_or(true, |limit| captured < limit) {
        ticker.tick().await;

        let (frame, detections) = camera.capture();
        captured += 1;

        match uploader
            .submit(&frame, detections.as_ref().map(|d| d as &dyn DetectorOutput))
            .await
        {
            Ok(SubmitOutcome::Dropped) => {
                warn!(frame = captured, "Payload dropped, delivery queue full");
            }
            Ok(_) => {}
            Err(e) => {
                error!(frame = captured, error = %e, "Failed to submit frame");
            }
        }

        if captured % STATS_EVERY == 0 {
            info!(stats = %uploader.stats(), "Upload stats");
        }
    }
}

/// Gradient frame source with a periodic simulated hazard.
struct SyntheticCamera {
    width: u32,
    height: u32,
    detection_cycle: u64,
    detection_active: u64,
    started: Instant,
    frame_index: u64,
}

impl SyntheticCamera {
    fn new(config: &DemoConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
            detection_cycle: config.detection_cycle_secs,
            detection_active: config.detection_active_secs,
            started: Instant::now(),
            frame_index: 0,
        }
    }

    fn capture(&mut self) -> (Frame, Option<Detections>) {
        let frame = self.render();
        let detections = self
            .hazard_active(self.started.elapsed())
            .then(|| self.hazard());
        self.frame_index += 1;
        (frame, detections)
    }

    /// BGR gradient that drifts a little every frame.
    fn render(&self) -> Frame {
        let shift = (self.frame_index % 256) as u32;
        let mut data = Vec::with_capacity((self.width * self.height * 3) as usize);

        for y in 0..self.height {
            for x in 0..self.width {
                data.push(((x + shift) % 256) as u8);
                data.push(((y + shift) % 256) as u8);
                data.push(128);
            }
        }

        Frame::bgr(self.width, self.height, data)
    }

    fn hazard_active(&self, elapsed: Duration) -> bool {
        if self.detection_cycle == 0 {
            return false;
        }
        elapsed.as_secs() % self.detection_cycle < self.detection_active
    }

    /// Pothole box centered in the frame.
    fn hazard(&self) -> Detections {
        let cx = f64::from(self.width / 2);
        let cy = f64::from(self.height / 2);
        let half_w = f64::from(HAZARD_BOX.0 / 2);
        let half_h = f64::from(HAZARD_BOX.1 / 2);

        Detections::new(
            vec![RawDetection::new(
                [cx - half_w, cy - half_h, cx + half_w, cy + half_h],
                0.91,
                0,
            )],
            vec!["Pothole".to_string()],
        )
    }
}

/// Log final statistics on shutdown.
fn log_final_stats(stats: &UploadStats) {
    info!("=== Final Statistics ===");
    info!(
        frames_processed = stats.frames_processed,
        frames_sent = stats.frames_sent,
        errors = stats.errors,
        dropped = stats.dropped,
        success_rate = format!("{:.1}%", stats.success_rate * 100.0),
        "Upload final stats"
    );
}
