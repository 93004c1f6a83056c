use tracing::trace;

/// Time a payload is expected to arrive in, in seconds
pub const TARGET_TIME_SECONDS: f64 = 0.1;

/// Multiplier applied on top of the target-time bandwidth
pub const HEADROOM: f64 = 2.0;

/// Smallest scale the calibrator ever reports, in KB/s
pub const MIN_SCALE_KBS: f64 = 1.0;

/// Scale shown before the first successful probe, in KB/s
pub const FALLBACK_SCALE_KBS: f64 = 10.0;

/// Tracks the bandwidth gauge's upper bound from observed payload sizes.
///
/// The bound only ever grows during a session so the dial does not jitter
/// when later payloads are smaller.
#[derive(Debug, Clone)]
pub struct BandwidthCalibrator {
    target_time_seconds: f64,
    headroom: f64,
    scale_max: Option<f64>,
}

impl Default for BandwidthCalibrator {
    fn default() -> Self {
        Self::new()
    }
}

impl BandwidthCalibrator {
    pub fn new() -> Self {
        Self::with_target(TARGET_TIME_SECONDS, HEADROOM)
    }

    pub fn with_target(target_time_seconds: f64, headroom: f64) -> Self {
        Self { target_time_seconds, headroom, scale_max: None }
    }

    /// Bandwidth the payload would have if it arrived in the target time, with headroom
    pub fn candidate(&self, size_bytes: u64) -> f64 {
        (size_bytes as f64 / self.target_time_seconds) / 1024.0 * self.headroom
    }

    /// Fold a successful probe's payload size into the scale and return the new scale
    pub fn observe(&mut self, size_bytes: u64) -> f64 {
        let candidate = self.candidate(size_bytes);
        let previous = self.scale_max.unwrap_or(0.0);
        let scale = previous.max(candidate).max(MIN_SCALE_KBS);

        trace!(size_bytes, candidate, previous, scale, "Bandwidth scale observed");

        self.scale_max = Some(scale);
        scale
    }

    /// Current scale in KB/s, `None` before any successful probe
    pub fn scale_max(&self) -> Option<f64> {
        self.scale_max
    }

    /// Scale to draw the dial with
    pub fn display_scale_max(&self) -> f64 {
        self.scale_max.unwrap_or(FALLBACK_SCALE_KBS)
    }

    pub fn reset(&mut self) {
        self.scale_max = None;
    }
}
