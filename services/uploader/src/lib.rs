//! Telemetry Uploader - edge camera telemetry for remote hazard monitoring
//!
//! This library streams sampled camera frames, together with the hazards a
//! detector found in them, to a remote HTTP endpoint. It handles:
//!
//! - JPEG encoding of raw frames into base64 data URIs
//! - Normalizing detector output into hazard records
//! - Sampling every Nth frame and delivering it inline or through a
//!   bounded background queue
//! - Waking a sleeping backend before streaming starts
//!
//! # Architecture
//!
//! ```text
//! Frame + Detections -> SendSchedule -> PayloadBuilder -> DeliveryChannel -> Endpoint
//!                                              |                 ^
//!                                              +-> queue -> worker (async mode)
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use telemetry_uploader::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let uploader = TelemetryUploader::new(UploaderConfig::default())?;
//!     uploader.wait_until_ready(std::time::Duration::from_secs(45)).await;
//!
//!     let frame = Frame::bgr(640, 480, vec![0u8; 640 * 480 * 3]);
//!     let outcome = uploader.submit(&frame, None).await?;
//!     println!("{:?}", outcome);
//!
//!     println!("{}", uploader.shutdown().await);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod delivery;
pub mod detection;
pub mod frame;
pub mod payload;
pub mod probe;
pub mod scheduler;
pub mod stats;
pub mod uploader;
pub mod worker;

#[cfg(test)]
mod test_support;

// Re-export main types
pub use config::{
    ConfigValidationError, DeliveryConfig, DeliveryMode, DemoConfig, EncodingConfig,
    EndpointConfig, LocationConfig, LoggingConfig, MetricsConfig, ProbeConfig, UploaderConfig,
};
pub use delivery::{
    async_trait, DeliveryChannel, DeliveryOutcome, HttpDeliveryChannel, TransportFailureKind,
    CORRELATION_HEADER,
};
pub use detection::{to_hazards, DetectorOutput, Detections, RawDetection};
pub use frame::{EncodeError, Frame, FrameEncoder, PixelOrder};
pub use payload::{GpsLocation, HazardRecord, PayloadBuilder, TelemetryPayload};
pub use probe::{derive_health_url, AvailabilityProbe, ProbeError};
pub use scheduler::{ScheduleDecision, SendSchedule};
pub use stats::{StatsCollector, UploadStats};
pub use uploader::{SubmitOutcome, TelemetryUploader, UploadError};
pub use worker::{WorkerHandle, WorkerState};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{DeliveryMode, UploaderConfig};
    pub use crate::delivery::{async_trait, DeliveryChannel, DeliveryOutcome};
    pub use crate::detection::{DetectorOutput, Detections, RawDetection};
    pub use crate::frame::Frame;
    pub use crate::stats::UploadStats;
    pub use crate::uploader::{SubmitOutcome, TelemetryUploader, UploadError};
}
