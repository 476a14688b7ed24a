//! Angle snapping for shape drags
//!
//! While the end point of a line, arrow, rectangle or circle is dragged,
//! the drag angle is snapped onto the nearest multiple of the step angle
//! (0°, ±45°, ±90°, ±135°, 180° by default) when it falls within the
//! tolerance. The radius is preserved.

use crate::annotation::PagePoint;
use serde::{Deserialize, Serialize};

/// Configuration for angle snapping
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapConfig {
    /// Enable/disable snapping
    pub enabled: bool,

    /// Maximum distance from a snap angle, in degrees
    pub angle_tolerance_deg: f32,

    /// Spacing between snap angles, in degrees
    pub angle_step_deg: f32,
}

impl Default for SnapConfig {
    fn default() -> Self {
        Self { enabled: true, angle_tolerance_deg: 10.0, angle_step_deg: 45.0 }
    }
}

/// Outcome of snapping a dragged end point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapResult {
    /// End point to use
    pub point: PagePoint,

    /// Whether the point was moved onto a snap angle
    pub snapped: bool,

    /// Final drag angle in degrees, in (-180, 180]
    pub angle_deg: f32,
}

/// Snap `current` onto the nearest snap angle around `start`
pub fn snap_endpoint(start: PagePoint, current: PagePoint, config: &SnapConfig) -> SnapResult {
    let dx = current.x - start.x;
    let dy = current.y - start.y;
    let radius = (dx * dx + dy * dy).sqrt();
    let angle_deg = dy.atan2(dx).to_degrees();

    let unsnapped = SnapResult { point: current, snapped: false, angle_deg };

    if !config.enabled || radius < f32::EPSILON || config.angle_step_deg <= 0.0 {
        return unsnapped;
    }

    let target = (angle_deg / config.angle_step_deg).round() * config.angle_step_deg;
    if (angle_deg - target).abs() > config.angle_tolerance_deg {
        return unsnapped;
    }

    let radians = target.to_radians();
    let point = PagePoint::new(start.x + radius * radians.cos(), start.y + radius * radians.sin());
    let angle_deg = if target <= -180.0 { target + 360.0 } else { target };

    SnapResult { point, snapped: true, angle_deg }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: PagePoint, b: PagePoint) {
        assert!((a.x - b.x).abs() < 1e-3 && (a.y - b.y).abs() < 1e-3, "{a:?} != {b:?}");
    }

    #[test]
    fn test_near_horizontal_snaps_to_axis() {
        let start = PagePoint::new(0.0, 0.0);
        let result = snap_endpoint(start, PagePoint::new(100.0, 8.0), &SnapConfig::default());
        assert!(result.snapped);
        assert_eq!(result.angle_deg, 0.0);
        let radius = (100.0f32 * 100.0 + 8.0 * 8.0).sqrt();
        assert_close(result.point, PagePoint::new(radius, 0.0));
        assert!((result.point.x - 100.32).abs() < 0.01);
    }

    #[test]
    fn test_diagonal_and_vertical_snaps() {
        let start = PagePoint::new(10.0, 10.0);
        let config = SnapConfig::default();

        let diagonal = snap_endpoint(start, PagePoint::new(110.0, 120.0), &config);
        assert!(diagonal.snapped);
        assert!((diagonal.angle_deg - 45.0).abs() < 1e-4);
        let dx = diagonal.point.x - start.x;
        let dy = diagonal.point.y - start.y;
        assert!((dx - dy).abs() < 1e-3);

        let up = snap_endpoint(start, PagePoint::new(15.0, -90.0), &config);
        assert!(up.snapped);
        assert!((up.angle_deg + 90.0).abs() < 1e-4);
        assert!((up.point.x - start.x).abs() < 1e-3);

        let left = snap_endpoint(start, PagePoint::new(-90.0, 12.0), &config);
        assert!(left.snapped);
        assert!((left.angle_deg.abs() - 180.0).abs() < 1e-4);
        assert!((left.point.y - start.y).abs() < 1e-3);
    }

    #[test]
    fn test_outside_tolerance_is_unchanged() {
        let start = PagePoint::new(0.0, 0.0);
        let current = PagePoint::new(100.0, 40.0); // ~21.8°
        let result = snap_endpoint(start, current, &SnapConfig::default());
        assert!(!result.snapped);
        assert_eq!(result.point, current);
    }

    #[test]
    fn test_disabled_and_zero_length() {
        let start = PagePoint::new(5.0, 5.0);
        let disabled = SnapConfig { enabled: false, ..SnapConfig::default() };
        let current = PagePoint::new(100.0, 8.0);
        assert_eq!(snap_endpoint(start, current, &disabled).point, current);

        let zero = snap_endpoint(start, start, &SnapConfig::default());
        assert!(!zero.snapped);
        assert_eq!(zero.point, start);
    }
}
