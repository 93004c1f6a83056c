//! netpulse - latency and bandwidth monitoring engine
//!
//! This library probes a single HTTP endpoint at a fixed cadence for a
//! bounded duration and turns every probe into a heartbeat sample. Samples
//! feed a running aggregator, a bandwidth scale calibrator and the gauge
//! projection used by dial-style views.

pub mod aggregator;
pub mod calibrator;
pub mod error;
pub mod gauge;
pub mod probe;
pub mod scheduler;
pub mod segments;
pub mod types;
pub mod validation;

// Re-export main types
pub use aggregator::{Averages, SessionAggregator, ViewModel};
pub use calibrator::BandwidthCalibrator;
pub use error::{ProbeError, ValidationError};
pub use gauge::{GaugeGeometry, GaugeReading};
pub use probe::{HttpProber, ProbeExecutor, ProbeResponse, Prober};
pub use scheduler::{MonitoringScheduler, SessionHandle, SessionReport, SessionSnapshot, StatusRecord};
pub use segments::{Metric, Segment, Zone};
pub use types::{BodySize, HttpMethod, MonitorConfig, RequestSpec, Sample, SessionState};
pub use validation::MonitorParams;

/// Stopping rule count: one heartbeat more than `duration / interval`
pub fn expected_heartbeats(interval_seconds: u64, duration_seconds: u64) -> usize {
    if interval_seconds == 0 {
        return 1;
    }
    (duration_seconds / interval_seconds) as usize + 1
}
