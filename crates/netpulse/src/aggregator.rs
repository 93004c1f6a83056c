//! Running and final session statistics.
//!
//! Failed heartbeats count towards the means with zero latency and zero
//! bandwidth. Success-only means and the failure rate are reported next to
//! them so consumers can pick either reading.

use serde::{Deserialize, Serialize};

use crate::types::{Sample, SessionState};

/// Final statistics over a session's samples
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Averages {
    pub samples: usize,
    /// Mean latency over all samples, failures contributing 0
    pub avg_latency_ms: f64,
    /// Mean bandwidth over all samples, failures contributing 0
    pub avg_bandwidth_kbs: f64,
    pub failure_count: usize,
    /// Failed samples over all samples, 0 when there are none
    pub failure_rate: f64,
    /// Mean latency over successful samples only
    pub success_latency_ms: Option<f64>,
    /// Mean bandwidth over successful samples only
    pub success_bandwidth_kbs: Option<f64>,
}

/// Values an external view displays
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ViewModel {
    pub display_latency: f64,
    pub display_bandwidth: f64,
    pub is_running: bool,
}

/// Accumulates statistics as samples are appended
#[derive(Debug, Clone, Default)]
pub struct SessionAggregator {
    count: usize,
    failures: usize,
    latency_sum: f64,
    bandwidth_sum: f64,
    current: Option<(f64, f64)>,
    finalized: Option<Averages>,
}

impl SessionAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an aggregator over an existing log
    pub fn from_samples<'a>(samples: impl IntoIterator<Item = &'a Sample>) -> Self {
        let mut aggregator = Self::new();
        for sample in samples {
            aggregator.record(sample);
        }
        aggregator
    }

    pub fn record(&mut self, sample: &Sample) {
        self.count += 1;
        if sample.is_failure() {
            self.failures += 1;
        }
        self.latency_sum += sample.latency_ms;
        self.bandwidth_sum += sample.bandwidth_kbs;
        self.current = Some((sample.latency_ms, sample.bandwidth_kbs));
    }

    /// Latency and bandwidth of the most recent sample
    pub fn current(&self) -> Option<(f64, f64)> {
        self.current
    }

    /// Statistics over everything recorded so far
    pub fn running(&self) -> Averages {
        let mean = |sum: f64, n: usize| if n == 0 { 0.0 } else { sum / n as f64 };
        let successes = self.count - self.failures;
        // Failures add nothing to the sums
        let success_mean = |sum: f64| (successes > 0).then(|| sum / successes as f64);

        Averages {
            samples: self.count,
            avg_latency_ms: mean(self.latency_sum, self.count),
            avg_bandwidth_kbs: mean(self.bandwidth_sum, self.count),
            failure_count: self.failures,
            failure_rate: mean(self.failures as f64, self.count),
            success_latency_ms: success_mean(self.latency_sum),
            success_bandwidth_kbs: success_mean(self.bandwidth_sum),
        }
    }

    /// Freeze the final statistics
    pub fn finalize(&mut self) -> Averages {
        let averages = self.running();
        self.finalized = Some(averages);
        averages
    }

    /// Current values while running, averages once finalized, zeros otherwise
    pub fn view(&self, state: SessionState) -> ViewModel {
        match state {
            SessionState::Running => {
                let (latency, bandwidth) = self.current.unwrap_or_default();
                ViewModel { display_latency: latency, display_bandwidth: bandwidth, is_running: true }
            }
            SessionState::Completed | SessionState::Cancelled => {
                let averages = self.finalized.unwrap_or_else(|| self.running());
                ViewModel {
                    display_latency: averages.avg_latency_ms,
                    display_bandwidth: averages.avg_bandwidth_kbs,
                    is_running: false,
                }
            }
            SessionState::Idle => ViewModel::default(),
        }
    }
}
