//! Parsing and range checks for monitoring parameters.
//!
//! Raw values arrive as strings from whatever form or command line collects
//! them. A blank numeric field falls back to its default; anything else has to
//! parse and be in range before a session may start.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ValidationError;
use crate::types::{BodySize, DEFAULT_PROBE_TIMEOUT, HttpMethod, MonitorConfig, RequestSpec};

pub const MIN_INTERVAL_SECONDS: u64 = 1;
pub const MAX_INTERVAL_SECONDS: u64 = 10;
pub const MIN_LATENCY_SCALE: f64 = 1.0;
pub const MAX_LATENCY_SCALE: f64 = 1000.0;
pub const MIN_TIMEOUT_MS: u64 = 100;
pub const MAX_TIMEOUT_MS: u64 = 60_000;

const DEFAULT_INTERVAL: u64 = 2;
const DEFAULT_DURATION: u64 = 30;
const DEFAULT_LATENCY_SCALE: f64 = 250.0;

/// Unparsed monitoring parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorParams {
    pub url: String,
    pub interval: String,
    pub duration: String,
    pub latency_max: String,
    pub method: String,
    /// `Name: value` lines
    pub headers: Vec<String>,
    pub body: Option<String>,
    pub timeout_ms: String,
    pub device: Option<String>,
    pub json_size: bool,
}

impl MonitorParams {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), ..Self::default() }
    }

    /// Parse and range-check everything, producing the frozen session config
    pub fn validate(&self) -> Result<MonitorConfig, ValidationError> {
        let target_url = validate_http_endpoint(&self.url)?;

        let interval_seconds = parse_or_default("Interval", &self.interval, DEFAULT_INTERVAL)?;
        validate_interval(interval_seconds)?;

        let duration_seconds = parse_or_default("Duration", &self.duration, DEFAULT_DURATION)?;
        validate_duration(duration_seconds, interval_seconds)?;

        let latency_scale_max =
            parse_or_default("Latency max value", &self.latency_max, DEFAULT_LATENCY_SCALE)?;
        validate_latency_scale(latency_scale_max)?;

        let default_timeout = DEFAULT_PROBE_TIMEOUT.as_millis() as u64;
        let timeout_ms = parse_or_default("Timeout", &self.timeout_ms, default_timeout)?;
        validate_timeout(timeout_ms)?;

        let method: HttpMethod = self.method.parse()?;

        let headers = if self.headers.is_empty() {
            RequestSpec::default().headers
        } else {
            self.headers.iter().map(|line| parse_header(line)).collect::<Result<Vec<_>, _>>()?
        };

        let body = self.body.clone().filter(|body| !body.is_empty());

        Ok(MonitorConfig {
            target_url,
            request: RequestSpec { method, headers, body },
            interval_seconds,
            duration_seconds,
            latency_scale_max,
            probe_timeout: Duration::from_millis(timeout_ms),
            body_size: if self.json_size { BodySize::CompactJson } else { BodySize::Raw },
            device: self.device.clone().filter(|device| !device.trim().is_empty()),
        })
    }
}

impl MonitorConfig {
    /// Re-check the ranges of a config that did not come through `MonitorParams`
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_http_endpoint(self.target_url.as_str())?;
        validate_interval(self.interval_seconds)?;
        validate_duration(self.duration_seconds, self.interval_seconds)?;
        validate_latency_scale(self.latency_scale_max)?;
        validate_timeout(self.probe_timeout.as_millis() as u64)
    }
}

fn parse_or_default<T: std::str::FromStr>(
    field: &'static str,
    raw: &str,
    default: T,
) -> Result<T, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(default);
    }
    trimmed
        .parse()
        .map_err(|_| ValidationError::NotANumber { field, value: raw.to_string() })
}

/// Validate an HTTP/HTTPS URL endpoint
pub fn validate_http_endpoint(target: &str) -> Result<Url, ValidationError> {
    let target = target.trim();
    if target.is_empty() {
        return Err(ValidationError::InvalidUrl("Target cannot be empty".into()));
    }

    let url = Url::parse(target).map_err(|e| {
        if !target.contains("://") {
            ValidationError::InvalidUrl("URL must include scheme (http:// or https://)".into())
        } else {
            ValidationError::InvalidUrl(e.to_string())
        }
    })?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(ValidationError::UnsupportedScheme(other.to_string())),
    }

    if url.host_str().is_none() {
        return Err(ValidationError::MissingHost);
    }

    Ok(url)
}

/// Validate the sampling interval
pub fn validate_interval(interval_seconds: u64) -> Result<(), ValidationError> {
    if !(MIN_INTERVAL_SECONDS..=MAX_INTERVAL_SECONDS).contains(&interval_seconds) {
        return Err(ValidationError::IntervalOutOfRange {
            value: interval_seconds,
            min: MIN_INTERVAL_SECONDS,
            max: MAX_INTERVAL_SECONDS,
        });
    }
    Ok(())
}

/// Validate the session duration against the interval
pub fn validate_duration(duration_seconds: u64, interval_seconds: u64) -> Result<(), ValidationError> {
    if duration_seconds < interval_seconds {
        return Err(ValidationError::DurationTooShort {
            duration: duration_seconds,
            interval: interval_seconds,
        });
    }
    Ok(())
}

/// Validate the latency gauge upper bound
pub fn validate_latency_scale(scale: f64) -> Result<(), ValidationError> {
    if !(MIN_LATENCY_SCALE..=MAX_LATENCY_SCALE).contains(&scale) {
        return Err(ValidationError::LatencyScaleOutOfRange {
            value: scale,
            min: MIN_LATENCY_SCALE,
            max: MAX_LATENCY_SCALE,
        });
    }
    Ok(())
}

/// Validate the probe timeout
pub fn validate_timeout(timeout_ms: u64) -> Result<(), ValidationError> {
    if !(MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS).contains(&timeout_ms) {
        return Err(ValidationError::InvalidTimeout {
            value: timeout_ms,
            min: MIN_TIMEOUT_MS,
            max: MAX_TIMEOUT_MS,
        });
    }
    Ok(())
}

/// Split a `Name: value` header line
pub fn parse_header(line: &str) -> Result<(String, String), ValidationError> {
    let (name, value) = line
        .split_once(':')
        .ok_or_else(|| ValidationError::InvalidHeader(line.to_string()))?;

    let name = name.trim();
    if reqwest::header::HeaderName::from_bytes(name.as_bytes()).is_err() {
        return Err(ValidationError::InvalidHeader(line.to_string()));
    }

    let value = value.trim();
    if reqwest::header::HeaderValue::from_str(value).is_err() {
        return Err(ValidationError::InvalidHeader(line.to_string()));
    }

    Ok((name.to_string(), value.to_string()))
}
