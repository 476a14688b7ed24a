//! Freehand stroke to shape recognition
//!
//! Heuristic classifier guessing whether a raw point sequence was meant as
//! a line, rectangle or circle. The thresholds are approximate and tunable
//! through [`DetectionConfig`]; a `None` result means "keep the ink".

use crate::annotation::{PagePoint, Rect, ShapeAnnotation, ShapeKind};
use crate::color::Color;
use serde::{Deserialize, Serialize};

/// Shape detection thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Maximum start/end gap for a path to count as closed
    pub close_distance: f32,

    /// Minimum circularity for a closed path to be a circle
    pub circularity_threshold: f32,

    /// Accepted bounding-box aspect range for rectangles
    pub aspect_min: f32,
    pub aspect_max: f32,

    /// Minimum direct-distance / path-length ratio for a line
    pub linearity_threshold: f32,

    /// Paths with fewer points are never classified
    pub min_points: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            close_distance: 50.0,
            circularity_threshold: 0.8,
            aspect_min: 0.5,
            aspect_max: 2.0,
            linearity_threshold: 0.9,
            min_points: 3,
        }
    }
}

/// A recognised shape
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectedShape {
    pub kind: ShapeKind,

    /// Score of the winning heuristic, 0.0 to 1.0
    pub confidence: f32,

    /// Start/end pair describing the shape (corners for closed shapes)
    pub start: PagePoint,
    pub end: PagePoint,
}

impl DetectedShape {
    /// Build the shape annotation replacing the freehand stroke
    pub fn into_shape(self, page_number: u32, color: Color, width: f32) -> ShapeAnnotation {
        ShapeAnnotation::new(page_number, self.kind, self.start, self.end, color, width)
    }
}

/// Classify a freehand path
pub fn detect_shape(points: &[PagePoint], config: &DetectionConfig) -> Option<DetectedShape> {
    if points.len() < config.min_points.max(2) {
        return None;
    }
    let first = points[0];
    let last = points[points.len() - 1];

    if first.distance_to(&last) <= config.close_distance {
        detect_closed(points, config)
    } else {
        detect_open(points, config)
    }
}

fn detect_closed(points: &[PagePoint], config: &DetectionConfig) -> Option<DetectedShape> {
    let bounds = Rect::from_points(points.iter().copied())?;
    let corners = (
        PagePoint::new(bounds.min_x, bounds.min_y),
        PagePoint::new(bounds.max_x, bounds.max_y),
    );

    let circularity = circularity(points);
    if circularity > config.circularity_threshold {
        return Some(DetectedShape {
            kind: ShapeKind::Circle,
            confidence: circularity.clamp(0.0, 1.0),
            start: corners.0,
            end: corners.1,
        });
    }

    if bounds.width() <= f32::EPSILON || bounds.height() <= f32::EPSILON {
        return None;
    }
    let aspect = bounds.width() / bounds.height();
    if aspect < config.aspect_min || aspect > config.aspect_max {
        return None;
    }

    // A drawn rectangle hugs its bounding box, so the enclosed area is close
    // to the box area.
    let fill = polygon_area(points) / (bounds.width() * bounds.height());
    Some(DetectedShape {
        kind: ShapeKind::Rectangle,
        confidence: (1.0 - (1.0 - fill).abs()).clamp(0.0, 1.0),
        start: corners.0,
        end: corners.1,
    })
}

fn detect_open(points: &[PagePoint], config: &DetectionConfig) -> Option<DetectedShape> {
    let first = points[0];
    let last = points[points.len() - 1];

    let length = path_length(points);
    if length <= f32::EPSILON {
        return None;
    }
    let linearity = first.distance_to(&last) / length;
    if linearity > config.linearity_threshold {
        return Some(DetectedShape {
            kind: ShapeKind::Line,
            confidence: linearity.clamp(0.0, 1.0),
            start: first,
            end: last,
        });
    }
    None
}

/// 1 - (std deviation / mean) of the point distances to the centroid
pub fn circularity(points: &[PagePoint]) -> f32 {
    if points.is_empty() {
        return 0.0;
    }
    let n = points.len() as f32;
    let cx = points.iter().map(|p| p.x).sum::<f32>() / n;
    let cy = points.iter().map(|p| p.y).sum::<f32>() / n;
    let centroid = PagePoint::new(cx, cy);

    let distances: Vec<f32> = points.iter().map(|p| p.distance_to(&centroid)).collect();
    let mean = distances.iter().sum::<f32>() / n;
    if mean <= f32::EPSILON {
        return 0.0;
    }
    let variance = distances.iter().map(|d| (d - mean).powi(2)).sum::<f32>() / n;
    1.0 - variance.sqrt() / mean
}

/// Total length of the polyline
pub fn path_length(points: &[PagePoint]) -> f32 {
    points.windows(2).map(|pair| pair[0].distance_to(&pair[1])).sum()
}

/// Shoelace area of the implicitly closed polygon
fn polygon_area(points: &[PagePoint]) -> f32 {
    let mut twice_area = 0.0;
    let mut j = points.len() - 1;
    for i in 0..points.len() {
        twice_area += (points[j].x + points[i].x) * (points[j].y - points[i].y);
        j = i;
    }
    (twice_area / 2.0).abs()
}
