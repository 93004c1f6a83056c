//! Half-circle gauge projection.
//!
//! The dial runs from the 9 o'clock point (value 0) clockwise over the top to
//! the 3 o'clock point (value at or above the scale). Angles are reported in
//! two conventions: needle rotation in degrees (`-180..=0`) and arc position
//! in radians (`π..=2π`, canvas orientation with y pointing down).

use std::f64::consts::PI;

use serde::Serialize;

use crate::segments::{Segment, Zone, NEUTRAL_COLOR, zone_for};

/// Needle position and color for one reading
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GaugeReading {
    /// The reading itself, never clamped
    pub value: f64,
    /// Needle position as a fraction of the scale, clamped to `[0, 1]`
    pub fraction: f64,
    /// Needle rotation, `-180` at zero and `0` at full scale
    pub angle_degrees: f64,
    /// Needle position along the arc, `π` at zero and `2π` at full scale
    pub arc_radians: f64,
    pub zone: Option<Zone>,
}

impl GaugeReading {
    pub fn color_hex(&self) -> &'static str {
        self.zone.map(|zone| zone.color()).unwrap_or(NEUTRAL_COLOR)
    }

    /// Numeric readout with two decimals
    pub fn display_value(&self) -> String {
        format!("{:.2}", self.value)
    }
}

/// Fraction of the scale covered by `value`, clamped to `[0, 1]`
pub fn fraction(value: f64, scale_max: f64) -> f64 {
    if scale_max.is_nan() || scale_max <= 0.0 || value.is_nan() {
        return 0.0;
    }
    (value / scale_max).clamp(0.0, 1.0)
}

/// Project a reading onto the dial
pub fn project(value: f64, scale_max: f64, segments: &[Segment]) -> GaugeReading {
    let fraction = fraction(value, scale_max);
    GaugeReading {
        value,
        fraction,
        angle_degrees: -180.0 + fraction * 180.0,
        arc_radians: PI + fraction * PI,
        zone: zone_for(value, segments),
    }
}

/// Arc position of every segment boundary, for the tick labels
pub fn marker_angles(segments: &[Segment], scale_max: f64) -> Vec<f64> {
    segments
        .iter()
        .map(|segment| PI + fraction(segment.upper_bound, scale_max) * PI)
        .collect()
}

/// Physical layout of a dial
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GaugeGeometry {
    pub center: (f64, f64),
    pub radius: f64,
    /// Extra distance beyond the arc at which boundary labels sit
    pub label_offset: f64,
}

impl Default for GaugeGeometry {
    fn default() -> Self {
        Self { center: (150.0, 160.0), radius: 120.0, label_offset: 20.0 }
    }
}

impl GaugeGeometry {
    /// Point on the arc at `arc_radians`
    pub fn point_on_arc(&self, arc_radians: f64) -> (f64, f64) {
        self.point_at(arc_radians, self.radius)
    }

    /// Anchor point of a boundary label at `arc_radians`
    pub fn label_position(&self, arc_radians: f64) -> (f64, f64) {
        self.point_at(arc_radians, self.radius + self.label_offset)
    }

    fn point_at(&self, arc_radians: f64, radius: f64) -> (f64, f64) {
        (
            self.center.0 + radius * arc_radians.cos(),
            self.center.1 + radius * arc_radians.sin(),
        )
    }
}
