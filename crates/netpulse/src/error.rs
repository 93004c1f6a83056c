//! Error types for the monitoring engine.
//!
//! Validation errors are fatal to starting a session. Probe errors never
//! leave the probe: they are rendered into the failed sample's error text.

use std::time::Duration;

use thiserror::Error;

/// Rejected monitoring parameters
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid scheme '{0}'. Must be http or https")]
    UnsupportedScheme(String),
    #[error("URL must have a valid host")]
    MissingHost,
    #[error("{field} must be a number, got '{value}'")]
    NotANumber { field: &'static str, value: String },
    #[error("Interval must be between {min} and {max} seconds, got {value}")]
    IntervalOutOfRange { value: u64, min: u64, max: u64 },
    #[error("Duration must be at least the interval length ({duration}s < {interval}s)")]
    DurationTooShort { duration: u64, interval: u64 },
    #[error("Latency max value must be between {min} and {max} ms, got {value}")]
    LatencyScaleOutOfRange { value: f64, min: f64, max: f64 },
    #[error("Unsupported HTTP method: {0}")]
    UnsupportedMethod(String),
    #[error("Invalid header '{0}': expected 'Name: value'")]
    InvalidHeader(String),
    #[error("Timeout must be between {min} and {max} ms, got {value}")]
    InvalidTimeout { value: u64, min: u64, max: u64 },
}

/// Failure of a single probe
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Request timed out after {} ms", .0.as_millis())]
    Timeout(Duration),
    #[error("HTTP error! status: {status}")]
    Protocol { status: u16 },
    #[error("Failed to read response body: {0}")]
    Body(String),
}

impl ProbeError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProbeError::Timeout(_))
    }

    /// Classify a transport failure, `timeout` being the bound the request ran under
    pub fn from_reqwest(error: reqwest::Error, timeout: Duration) -> Self {
        if error.is_timeout() {
            return ProbeError::Timeout(timeout);
        }
        if let Some(status) = error.status() {
            return ProbeError::Protocol { status: status.as_u16() };
        }
        if error.is_body() || error.is_decode() {
            return ProbeError::Body(error.to_string());
        }
        ProbeError::Network(error.to_string())
    }
}
