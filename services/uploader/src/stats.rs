//! Upload counters shared by the producer and the background worker.

use crate::delivery::DeliveryOutcome;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time view of the upload counters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UploadStats {
    pub frames_processed: u64,
    pub frames_sent: u64,
    pub errors: u64,
    pub dropped: u64,
    /// `frames_sent / max(frames_processed, 1)`
    pub success_rate: f64,
}

impl fmt::Display for UploadStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Frames: {} | Sent: {} | Errors: {} | Dropped: {} | Success: {:.1}%",
            self.frames_processed,
            self.frames_sent,
            self.errors,
            self.dropped,
            self.success_rate * 100.0
        )
    }
}

/// Running counters for one uploader instance.
#[derive(Debug, Default)]
pub struct StatsCollector {
    frames_processed: AtomicU64,
    frames_sent: AtomicU64,
    errors: AtomicU64,
    dropped: AtomicU64,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count an incoming frame and return its 1-based sequence number.
    pub(crate) fn record_frame(&self) -> u64 {
        metrics::counter!("telemetry.frames.observed").increment(1);
        self.frames_processed.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Fold one delivery outcome into the counters.
    pub(crate) fn record_delivery(&self, outcome: &DeliveryOutcome) {
        if outcome.is_success() {
            self.frames_sent.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("telemetry.payloads.sent").increment(1);
        } else {
            self.errors.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("telemetry.payloads.failed").increment(1);
        }
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("telemetry.payloads.dropped").increment(1);
    }

    pub fn snapshot(&self) -> UploadStats {
        let frames_processed = self.frames_processed.load(Ordering::Relaxed);
        let frames_sent = self.frames_sent.load(Ordering::Relaxed);

        UploadStats {
            frames_processed,
            frames_sent,
            errors: self.errors.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            success_rate: frames_sent as f64 / frames_processed.max(1) as f64,
        }
    }
}
