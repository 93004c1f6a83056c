use std::sync::Arc;

use tokio::time::{Instant, timeout};
use tracing::{debug, warn};

use super::prober::{HttpProber, Prober};
use crate::calibrator::BandwidthCalibrator;
use crate::error::ProbeError;
use crate::types::{BodySize, MonitorConfig, Sample};

/// Derived figures of a successful probe
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub latency_ms: f64,
    pub size_bytes: u64,
    pub bandwidth_kbs: f64,
}

/// Effective bandwidth in KB/s, 0 when the latency is not measurable
pub fn bandwidth_kbs(size_bytes: u64, latency_ms: f64) -> f64 {
    if latency_ms <= 0.0 {
        return 0.0;
    }
    size_bytes as f64 / (latency_ms / 1000.0) / 1024.0
}

/// Probe executor - performs exactly one timed request per call, never retries
pub struct ProbeExecutor {
    prober: Arc<dyn Prober>,
}

impl ProbeExecutor {
    pub fn new(prober: Arc<dyn Prober>) -> Self {
        Self { prober }
    }

    /// Executor backed by a fresh reqwest client
    pub fn http() -> Result<Self, ProbeError> {
        Ok(Self::new(Arc::new(HttpProber::new()?)))
    }

    /// Probe the target once and turn the outcome into a sample.
    ///
    /// The payload size of a successful probe is reported to `calibrator`.
    pub async fn execute(&self, config: &MonitorConfig, calibrator: &mut BandwidthCalibrator) -> Sample {
        let sample = match self.measure(config).await {
            Ok(measurement) => {
                calibrator.observe(measurement.size_bytes);
                debug!(
                    url = %config.target_url,
                    latency_ms = measurement.latency_ms,
                    size_bytes = measurement.size_bytes,
                    bandwidth_kbs = measurement.bandwidth_kbs,
                    "Probe succeeded"
                );
                Sample::success(measurement.latency_ms, measurement.bandwidth_kbs)
            }
            Err(error) => {
                warn!(url = %config.target_url, timeout = error.is_timeout(), "Probe failed: {error}");
                Sample::failure(error.to_string())
            }
        };

        sample.with_device(config.device.clone())
    }

    /// Time one request and derive its measurement
    pub async fn measure(&self, config: &MonitorConfig) -> Result<Measurement, ProbeError> {
        let started = Instant::now();

        let response = timeout(
            config.probe_timeout,
            self.prober.fetch(&config.target_url, &config.request, config.probe_timeout),
        )
        .await
        .map_err(|_| ProbeError::Timeout(config.probe_timeout))??;

        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        if !response.is_success() {
            return Err(ProbeError::Protocol { status: response.status });
        }

        let size_bytes = payload_size(&response.body, config.body_size)?;

        Ok(Measurement { latency_ms, size_bytes, bandwidth_kbs: bandwidth_kbs(size_bytes, latency_ms) })
    }
}

fn payload_size(body: &[u8], mode: BodySize) -> Result<u64, ProbeError> {
    match mode {
        BodySize::Raw => Ok(body.len() as u64),
        BodySize::CompactJson => {
            let value: serde_json::Value =
                serde_json::from_slice(body).map_err(|e| ProbeError::Body(e.to_string()))?;
            let compact = serde_json::to_vec(&value).map_err(|e| ProbeError::Body(e.to_string()))?;
            Ok(compact.len() as u64)
        }
    }
}
