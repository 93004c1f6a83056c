//! Colored threshold bands for gauges and heartbeat log lines.

use serde::{Deserialize, Serialize};

/// Color used when there are no segments to pick from
pub const NEUTRAL_COLOR: &str = "#666666";

/// Cumulative fractions of the scale at which each segment ends
const BOUNDARIES: [f64; 5] = [0.2, 0.4, 0.6, 0.8, 1.0];

/// Quality band, best first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    Great,
    Good,
    Moderate,
    SubPar,
    Poor,
}

impl Zone {
    /// All zones in severity order
    pub const ALL: [Zone; 5] = [Zone::Great, Zone::Good, Zone::Moderate, Zone::SubPar, Zone::Poor];

    pub fn color(&self) -> &'static str {
        match self {
            Zone::Great => "#006400",
            Zone::Good => "#4CAF50",
            Zone::Moderate => "#FFC107",
            Zone::SubPar => "#FF5722",
            Zone::Poor => "#D32F2F",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Zone::Great => "Great",
            Zone::Good => "Good",
            Zone::Moderate => "Moderate",
            Zone::SubPar => "Sub Par",
            Zone::Poor => "Poor",
        }
    }
}

/// Which reading a segment set is built for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Lower is better, labelled in percent of the scale
    Latency,
    /// Higher is better, labelled in KB/s
    Bandwidth,
}

/// A colored band ending at `upper_bound`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub upper_bound: f64,
    pub zone: Zone,
    pub label: String,
}

impl Segment {
    pub fn color(&self) -> &'static str {
        self.zone.color()
    }
}

/// Five segments over `[0, scale_max]`, best zone first
pub fn calculate_segments(scale_max: f64) -> Vec<Segment> {
    segments_for(Metric::Latency, scale_max)
}

/// Five segments over `[0, scale_max]` for the given metric.
///
/// Returns an empty set when `scale_max` is not a positive finite number.
pub fn segments_for(metric: Metric, scale_max: f64) -> Vec<Segment> {
    if !scale_max.is_finite() || scale_max <= 0.0 {
        return Vec::new();
    }

    let mut lower = 0.0;
    BOUNDARIES
        .iter()
        .enumerate()
        .map(|(i, fraction)| {
            let upper_bound = if i == BOUNDARIES.len() - 1 { scale_max } else { scale_max * fraction };
            let (zone, label) = match metric {
                Metric::Latency => {
                    let zone = Zone::ALL[i];
                    let label = format!(
                        "{} ({}-{}%)",
                        zone.name(),
                        (lower_fraction(i) * 100.0).round(),
                        (fraction * 100.0).round()
                    );
                    (zone, label)
                }
                Metric::Bandwidth => {
                    let zone = Zone::ALL[BOUNDARIES.len() - 1 - i];
                    let label = if i == 0 {
                        format!("{} (0-{:.2} KB/s)", zone.name(), upper_bound)
                    } else {
                        format!("{} ({:.2}-{:.2} KB/s)", zone.name(), lower, upper_bound)
                    };
                    (zone, label)
                }
            };
            lower = upper_bound;
            Segment { upper_bound, zone, label }
        })
        .collect()
}

fn lower_fraction(index: usize) -> f64 {
    if index == 0 { 0.0 } else { BOUNDARIES[index - 1] }
}

/// Zone a value falls in: the first segment whose bound is at least the value,
/// or the last segment when the value is beyond the scale
pub fn zone_for(value: f64, segments: &[Segment]) -> Option<Zone> {
    segments
        .iter()
        .find(|segment| value <= segment.upper_bound)
        .or_else(|| segments.last())
        .map(|segment| segment.zone)
}

/// Color for a value, neutral when there are no segments
pub fn color_for(value: f64, segments: &[Segment]) -> &'static str {
    zone_for(value, segments).map(|zone| zone.color()).unwrap_or(NEUTRAL_COLOR)
}
