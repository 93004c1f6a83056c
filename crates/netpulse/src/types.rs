use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::Local;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ValidationError;

/// Default probe timeout
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Lifecycle of a monitoring session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Running,
    Completed,
    Cancelled,
}

impl SessionState {
    /// Completed and Cancelled never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Cancelled)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Running => write!(f, "running"),
            SessionState::Completed => write!(f, "completed"),
            SessionState::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Recorded outcome of one probe (a heartbeat)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Local wall-clock time the probe finished
    pub timestamp: String,

    /// Round-trip time in milliseconds, 0 on failure
    #[serde(rename = "latency")]
    pub latency_ms: f64,

    /// Effective payload bandwidth in KB/s, 0 on failure
    #[serde(rename = "bandwidth")]
    pub bandwidth_kbs: f64,

    /// Error message (if the probe failed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Device/location label, passed through untouched
    #[serde(rename = "deviceInfo", default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

impl Sample {
    /// Successful probe
    pub fn success(latency_ms: f64, bandwidth_kbs: f64) -> Self {
        Self {
            timestamp: wall_clock(),
            latency_ms,
            bandwidth_kbs,
            error: None,
            device: None,
        }
    }

    /// Failed probe, zero latency and bandwidth
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            timestamp: wall_clock(),
            latency_ms: 0.0,
            bandwidth_kbs: 0.0,
            error: Some(error.into()),
            device: None,
        }
    }

    /// Attach the device label
    pub fn with_device(mut self, device: Option<String>) -> Self {
        self.device = device;
        self
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

fn wall_clock() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

/// HTTP methods a probe can be issued with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "" | "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            "HEAD" => Ok(HttpMethod::Head),
            "OPTIONS" => Ok(HttpMethod::Options),
            _ => Err(ValidationError::UnsupportedMethod(s.to_string())),
        }
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Options => reqwest::Method::OPTIONS,
        }
    }
}

/// Request issued on every probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSpec {
    /// The HTTP method to use
    pub method: HttpMethod,

    /// Request headers, in send order
    pub headers: Vec<(String, String)>,

    /// Optional request body
    pub body: Option<String>,
}

impl Default for RequestSpec {
    fn default() -> Self {
        Self {
            method: HttpMethod::Get,
            headers: vec![("Accept".to_string(), "application/json".to_string())],
            body: None,
        }
    }
}

/// How the payload size of a response is measured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodySize {
    /// Bytes on the wire after transfer decoding
    #[default]
    Raw,
    /// Length of the body re-serialized as compact JSON
    CompactJson,
}

/// Frozen configuration of one monitoring session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub target_url: Url,
    pub request: RequestSpec,
    pub interval_seconds: u64,
    pub duration_seconds: u64,
    /// Latency gauge upper bound in ms
    pub latency_scale_max: f64,
    #[serde(with = "duration_ms")]
    pub probe_timeout: Duration,
    pub body_size: BodySize,
    pub device: Option<String>,
}

impl MonitorConfig {
    /// Config with reference defaults for everything but the target
    pub fn new(target_url: Url) -> Self {
        Self {
            target_url,
            request: RequestSpec::default(),
            interval_seconds: 2,
            duration_seconds: 30,
            latency_scale_max: 250.0,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            body_size: BodySize::Raw,
            device: None,
        }
    }

    /// Sampling period, never shorter than one second
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds.max(1))
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_seconds)
    }

    pub fn expected_heartbeats(&self) -> usize {
        crate::expected_heartbeats(self.interval_seconds, self.duration_seconds)
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_failure_zeroes_measurements() {
        let sample = Sample::failure("HTTP error! status: 500");
        assert_eq!(sample.latency_ms, 0.0);
        assert_eq!(sample.bandwidth_kbs, 0.0);
        assert!(sample.is_failure());
    }

    #[test]
    fn test_sample_serializes_heartbeat_shape() {
        let sample = Sample::success(50.0, 20.0).with_device(Some("Unix Desktop (Linux)".into()));
        let json = serde_json::to_value(&sample).unwrap();

        assert_eq!(json["latency"], 50.0);
        assert_eq!(json["bandwidth"], 20.0);
        assert_eq!(json["deviceInfo"], "Unix Desktop (Linux)");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!("get".parse::<HttpMethod>().unwrap(), HttpMethod::Get);
        assert_eq!("".parse::<HttpMethod>().unwrap(), HttpMethod::Get);
        assert_eq!(" Patch ".parse::<HttpMethod>().unwrap(), HttpMethod::Patch);
        assert!("TRACE".parse::<HttpMethod>().is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(SessionState::Completed.is_terminal());
        assert!(SessionState::Cancelled.is_terminal());
        assert!(!SessionState::Running.is_terminal());
        assert!(!SessionState::Idle.is_terminal());
    }

    #[test]
    fn test_config_defaults() {
        let config = MonitorConfig::new(Url::parse("https://example.com").unwrap());
        assert_eq!(config.interval(), Duration::from_secs(2));
        assert_eq!(config.expected_heartbeats(), 16);
        assert_eq!(config.probe_timeout, DEFAULT_PROBE_TIMEOUT);
    }
}
