//! Configuration management for the telemetry uploader.
//!
//! This module handles loading and validating configuration from environment
//! variables and configuration files.

use config::{Config, ConfigError, Environment, File};
use reqwest::Url;
use serde::Deserialize;
use std::time::Duration;

/// Main configuration for the telemetry uploader.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploaderConfig {
    /// Remote telemetry endpoint
    #[serde(default)]
    pub endpoint: EndpointConfig,

    /// Static device location reported with every payload
    #[serde(default)]
    pub location: LocationConfig,

    /// Frame sampling and JPEG encoding
    #[serde(default)]
    pub encoding: EncodingConfig,

    /// Delivery mode and background queue
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Backend wake probe
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Prometheus exporter
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Synthetic camera used by the bundled binary
    #[serde(default)]
    pub demo: DemoConfig,
}

/// Telemetry endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    /// Full URL of the telemetry endpoint (e.g., "http://10.0.0.5:5000/api/telemetry")
    #[serde(default = "default_endpoint_url")]
    pub url: String,

    /// Request timeout in seconds, sized for a cold-starting backend
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Path segment of `url` that names the telemetry route
    #[serde(default = "default_telemetry_path")]
    pub telemetry_path: String,

    /// Liveness path substituted for `telemetry_path` by the wake probe
    #[serde(default = "default_health_path")]
    pub health_path: String,
}

/// Static GPS position of the device.
#[derive(Debug, Clone, Deserialize)]
pub struct LocationConfig {
    #[serde(default = "default_lat")]
    pub lat: f64,

    #[serde(default = "default_lon")]
    pub lon: f64,
}

/// Sampling and image encoding configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EncodingConfig {
    /// Send every Nth frame (1 = every frame)
    #[serde(default = "default_send_interval")]
    pub send_interval: u64,

    /// JPEG quality (0-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Optional resize width; requires `resize_height`
    #[serde(default)]
    pub resize_width: Option<u32>,

    /// Optional resize height; requires `resize_width`
    #[serde(default)]
    pub resize_height: Option<u32>,
}

/// How payloads reach the delivery channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// `submit` waits for the HTTP round trip
    #[default]
    Sync,
    /// `submit` enqueues and a background worker delivers
    Async,
}

/// Delivery configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default)]
    pub mode: DeliveryMode,

    /// Bounded queue capacity in async mode
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Worker poll timeout in milliseconds
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,

    /// Time the worker may keep draining after shutdown starts
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

/// Backend wake probe configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Total time budget for the probe in seconds
    #[serde(default = "default_probe_max_wait")]
    pub max_wait_secs: u64,

    /// Timeout for a single liveness request in seconds
    #[serde(default = "default_probe_attempt_timeout")]
    pub attempt_timeout_secs: u64,

    /// Delay between liveness requests in seconds
    #[serde(default = "default_probe_retry_delay")]
    pub retry_delay_secs: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Metrics exporter configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsConfig {
    /// Prometheus listener port; exporter disabled when unset
    #[serde(default)]
    pub port: Option<u16>,
}

/// Synthetic camera configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DemoConfig {
    #[serde(default = "default_demo_width")]
    pub width: u32,

    #[serde(default = "default_demo_height")]
    pub height: u32,

    #[serde(default = "default_demo_fps")]
    pub fps: f32,

    /// Length of one simulated detection cycle in seconds
    #[serde(default = "default_detection_cycle")]
    pub detection_cycle_secs: u64,

    /// Seconds per cycle during which the simulated hazard is visible
    #[serde(default = "default_detection_active")]
    pub detection_active_secs: u64,
}

// Default value functions
fn default_endpoint_url() -> String {
    "http://localhost:5000/api/telemetry".to_string()
}
fn default_request_timeout() -> u64 {
    15
}
fn default_telemetry_path() -> String {
    "/api/telemetry".to_string()
}
fn default_health_path() -> String {
    "/health".to_string()
}
fn default_lat() -> f64 {
    28.6139
}
fn default_lon() -> f64 {
    77.2090
}
fn default_send_interval() -> u64 {
    2
}
fn default_jpeg_quality() -> u8 {
    80
}
fn default_queue_capacity() -> usize {
    10
}
fn default_poll_timeout_ms() -> u64 {
    1000
}
fn default_shutdown_grace() -> u64 {
    5
}
fn default_true() -> bool {
    true
}
fn default_probe_max_wait() -> u64 {
    45
}
fn default_probe_attempt_timeout() -> u64 {
    10
}
fn default_probe_retry_delay() -> u64 {
    3
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}
fn default_demo_width() -> u32 {
    640
}
fn default_demo_height() -> u32 {
    480
}
fn default_demo_fps() -> f32 {
    15.0
}
fn default_detection_cycle() -> u64 {
    5
}
fn default_detection_active() -> u64 {
    2
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            url: default_endpoint_url(),
            request_timeout_secs: default_request_timeout(),
            telemetry_path: default_telemetry_path(),
            health_path: default_health_path(),
        }
    }
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            lat: default_lat(),
            lon: default_lon(),
        }
    }
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            send_interval: default_send_interval(),
            jpeg_quality: default_jpeg_quality(),
            resize_width: None,
            resize_height: None,
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            mode: DeliveryMode::default(),
            queue_capacity: default_queue_capacity(),
            poll_timeout_ms: default_poll_timeout_ms(),
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_wait_secs: default_probe_max_wait(),
            attempt_timeout_secs: default_probe_attempt_timeout(),
            retry_delay_secs: default_probe_retry_delay(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            width: default_demo_width(),
            height: default_demo_height(),
            fps: default_demo_fps(),
            detection_cycle_secs: default_detection_cycle(),
            detection_active_secs: default_detection_active(),
        }
    }
}

impl UploaderConfig {
    /// Load configuration from file and environment variables.
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default config file (config/default.toml)
    /// 2. Environment-specific config (config/{env}.toml)
    /// 3. Environment variables (prefixed with TELEMETRY_)
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // e.g., TELEMETRY_ENDPOINT__URL, TELEMETRY_DELIVERY__MODE=async
            .add_source(
                Environment::with_prefix("TELEMETRY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Create configuration from environment variables only.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(
                Environment::with_prefix("TELEMETRY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.endpoint.url.is_empty() {
            return Err(ConfigValidationError::MissingField("endpoint.url".to_string()));
        }
        match Url::parse(&self.endpoint.url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            Ok(_) => {
                return Err(ConfigValidationError::InvalidValue {
                    field: "endpoint.url".to_string(),
                    message: "URL must start with http:// or https://".to_string(),
                });
            }
            Err(e) => {
                return Err(ConfigValidationError::InvalidValue {
                    field: "endpoint.url".to_string(),
                    message: e.to_string(),
                });
            }
        }

        if self.endpoint.request_timeout_secs == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "endpoint.request_timeout_secs".to_string(),
                message: "Timeout must be greater than 0".to_string(),
            });
        }

        if self.encoding.send_interval == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "encoding.send_interval".to_string(),
                message: "Send interval must be at least 1".to_string(),
            });
        }

        if self.encoding.jpeg_quality > 100 {
            return Err(ConfigValidationError::InvalidValue {
                field: "encoding.jpeg_quality".to_string(),
                message: "Quality must be between 0 and 100".to_string(),
            });
        }

        match (self.encoding.resize_width, self.encoding.resize_height) {
            (None, None) => {}
            (Some(w), Some(h)) if w > 0 && h > 0 => {}
            _ => {
                return Err(ConfigValidationError::InvalidValue {
                    field: "encoding.resize_width/height".to_string(),
                    message: "Both dimensions must be set and greater than 0".to_string(),
                });
            }
        }

        if self.delivery.queue_capacity == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "delivery.queue_capacity".to_string(),
                message: "Queue capacity must be at least 1".to_string(),
            });
        }

        if self.delivery.poll_timeout_ms == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "delivery.poll_timeout_ms".to_string(),
                message: "Poll timeout must be greater than 0".to_string(),
            });
        }

        if self.probe.attempt_timeout_secs == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "probe.attempt_timeout_secs".to_string(),
                message: "Timeout must be greater than 0".to_string(),
            });
        }

        if self.demo.width == 0 || self.demo.height == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "demo.width/height".to_string(),
                message: "Dimensions must be greater than 0".to_string(),
            });
        }

        if !self.demo.fps.is_finite() || self.demo.fps <= 0.0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "demo.fps".to_string(),
                message: "FPS must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

impl EndpointConfig {
    /// Get request timeout as Duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl EncodingConfig {
    /// Resize target, when both dimensions are configured.
    pub fn resize(&self) -> Option<(u32, u32)> {
        self.resize_width.zip(self.resize_height)
    }
}

impl DeliveryConfig {
    /// Get worker poll timeout as Duration.
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    /// Get shutdown grace period as Duration.
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl ProbeConfig {
    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = UploaderConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.endpoint.request_timeout(), Duration::from_secs(15));
        assert_eq!(config.delivery.mode, DeliveryMode::Sync);
        assert_eq!(config.encoding.resize(), None);
    }

    #[test]
    fn test_missing_url() {
        let mut config = UploaderConfig::default();
        config.endpoint.url = String::new();
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::MissingField(_))
        ));
    }

    #[test]
    fn test_invalid_url_scheme() {
        let mut config = UploaderConfig::default();
        config.endpoint.url = "rtsp://camera:554/stream".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_zero_send_interval() {
        let mut config = UploaderConfig::default();
        config.encoding.send_interval = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_quality_out_of_range() {
        let mut config = UploaderConfig::default();
        config.encoding.jpeg_quality = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resize_requires_both_dimensions() {
        let mut config = UploaderConfig::default();
        config.encoding.resize_width = Some(320);
        assert!(config.validate().is_err());

        config.encoding.resize_height = Some(240);
        assert!(config.validate().is_ok());
        assert_eq!(config.encoding.resize(), Some((320, 240)));
    }

    #[test]
    fn test_zero_queue_capacity() {
        let mut config = UploaderConfig::default();
        config.delivery.queue_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_delivery_mode_deserialization() {
        let mode: DeliveryMode = serde_json::from_str("\"async\"").unwrap();
        assert_eq!(mode, DeliveryMode::Async);
        let mode: DeliveryMode = serde_json::from_str("\"sync\"").unwrap();
        assert_eq!(mode, DeliveryMode::Sync);
    }

    #[test]
    fn test_partial_section_uses_field_defaults() {
        let config: UploaderConfig = serde_json::from_str(
            r#"{"endpoint": {"url": "https://example.onrender.com/api/telemetry"},
                "delivery": {"mode": "async", "queue_capacity": 5}}"#,
        )
        .unwrap();

        assert_eq!(config.endpoint.request_timeout_secs, 15);
        assert_eq!(config.endpoint.health_path, "/health");
        assert_eq!(config.delivery.queue_capacity, 5);
        assert_eq!(config.delivery.poll_timeout_ms, 1000);
        assert_eq!(config.encoding.send_interval, 2);
        assert!(config.validate().is_ok());
    }
}
