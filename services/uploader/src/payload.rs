//! Telemetry payload schema and construction.

use crate::frame::{EncodeError, Frame, FrameEncoder};
use chrono::{Local, NaiveDateTime};
use serde::Serialize;

/// Wall-clock format of the `timestamp` field (local time, no zone).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One detected object of interest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HazardRecord {
    #[serde(rename = "class")]
    pub class_id: i64,
    #[serde(rename = "name")]
    pub label: String,
    pub confidence: f64,
    pub xmin: i64,
    pub ymin: i64,
    pub xmax: i64,
    pub ymax: i64,
}

/// Static device position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GpsLocation {
    pub lat: f64,
    pub lon: f64,
}

/// Document posted to the telemetry endpoint for one sampled frame.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryPayload {
    timestamp: String,
    gps_location: GpsLocation,
    hazards: Vec<HazardRecord>,
    image_stream: String,
}

impl TelemetryPayload {
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn gps_location(&self) -> GpsLocation {
        self.gps_location
    }

    pub fn hazards(&self) -> &[HazardRecord] {
        &self.hazards
    }

    pub fn image_stream(&self) -> &str {
        &self.image_stream
    }
}

/// Combines an encoded frame, hazards and location into a payload.
#[derive(Debug, Clone)]
pub struct PayloadBuilder {
    location: GpsLocation,
    encoder: FrameEncoder,
}

impl PayloadBuilder {
    pub fn new(location: GpsLocation, encoder: FrameEncoder) -> Self {
        Self { location, encoder }
    }

    pub fn location(&self) -> GpsLocation {
        self.location
    }

    /// Build a payload stamped with the current local time.
    pub fn build(
        &self,
        frame: &Frame,
        hazards: Vec<HazardRecord>,
    ) -> Result<TelemetryPayload, EncodeError> {
        self.build_at(frame, hazards, Local::now().naive_local())
    }

    /// Build a payload stamped with `at`.
    pub fn build_at(
        &self,
        frame: &Frame,
        hazards: Vec<HazardRecord>,
        at: NaiveDateTime,
    ) -> Result<TelemetryPayload, EncodeError> {
        let image_stream = self.encoder.encode_data_uri(frame)?;

        Ok(TelemetryPayload {
            timestamp: at.format(TIMESTAMP_FORMAT).to_string(),
            gps_location: self.location,
            hazards,
            image_stream,
        })
    }
}
