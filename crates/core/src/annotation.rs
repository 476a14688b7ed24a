//! Annotation data model
//!
//! Ink strokes and geometric shapes drawn over a rendered page. Values held
//! by a [`crate::session::DocumentSession`] are in page space (see
//! [`crate::mapping`]); screen-space copies only exist transiently while a
//! gesture is in progress.

use crate::color::Color;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unique identifier for a stroke or shape
///
/// Opaque string, stable across saves. New ids are UUID v4.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotationId(String);

impl AnnotationId {
    /// Generate a fresh id
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for AnnotationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for AnnotationId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A 2D point, in page or screen space depending on context
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PagePoint {
    pub x: f32,
    pub y: f32,
}

impl PagePoint {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    pub fn distance_to(&self, other: &PagePoint) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn offset(&self, dx: f32, dy: f32) -> PagePoint {
        PagePoint::new(self.x + dx, self.y + dy)
    }
}

/// Axis-aligned rectangle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl Rect {
    pub fn new(min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Self {
        Self { min_x, min_y, max_x, max_y }
    }

    /// Smallest rectangle containing both corner points
    pub fn from_corners(a: PagePoint, b: PagePoint) -> Self {
        Self {
            min_x: a.x.min(b.x),
            min_y: a.y.min(b.y),
            max_x: a.x.max(b.x),
            max_y: a.y.max(b.y),
        }
    }

    /// Bounding box of a point sequence, `None` when empty
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = PagePoint>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut rect = Rect::from_corners(first, first);
        for point in iter {
            rect.min_x = rect.min_x.min(point.x);
            rect.min_y = rect.min_y.min(point.y);
            rect.max_x = rect.max_x.max(point.x);
            rect.max_y = rect.max_y.max(point.y);
        }
        Some(rect)
    }

    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f32 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> PagePoint {
        PagePoint::new((self.min_x + self.max_x) / 2.0, (self.min_y + self.max_y) / 2.0)
    }

    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Grow the rectangle by `margin` on every side
    pub fn expand(&self, margin: f32) -> Rect {
        Rect {
            min_x: self.min_x - margin,
            min_y: self.min_y - margin,
            max_x: self.max_x + margin,
            max_y: self.max_y + margin,
        }
    }

    pub fn contains(&self, point: &PagePoint) -> bool {
        point.x >= self.min_x
            && point.x <= self.max_x
            && point.y >= self.min_y
            && point.y <= self.max_y
    }

    pub fn translate(&self, dx: f32, dy: f32) -> Rect {
        Rect {
            min_x: self.min_x + dx,
            min_y: self.min_y + dy,
            max_x: self.max_x + dx,
            max_y: self.max_y + dy,
        }
    }
}

/// One sampled input point of an ink stroke
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrokePoint {
    pub x: f32,
    pub y: f32,
    /// Stylus pressure, 0.0 to 1.0
    pub pressure: f32,
    /// Capture time in milliseconds
    pub timestamp: i64,
}

impl StrokePoint {
    pub fn new(x: f32, y: f32, pressure: f32, timestamp: i64) -> Self {
        Self { x, y, pressure: pressure.clamp(0.0, 1.0), timestamp }
    }

    pub fn position(&self) -> PagePoint {
        PagePoint::new(self.x, self.y)
    }

    /// Same sample moved to another position
    pub fn with_position(&self, position: PagePoint) -> Self {
        Self { x: position.x, y: position.y, ..*self }
    }
}

/// Freehand ink annotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub id: AnnotationId,
    pub points: Vec<StrokePoint>,
    pub color: Color,
    pub width: f32,
    pub is_highlighter: bool,
    pub page_number: u32,
}

impl Stroke {
    /// Create a stroke with a generated id
    pub fn new(page_number: u32, points: Vec<StrokePoint>, color: Color, width: f32) -> Self {
        Self {
            id: AnnotationId::generate(),
            points,
            color,
            width,
            is_highlighter: false,
            page_number,
        }
    }

    pub fn highlighter(mut self, is_highlighter: bool) -> Self {
        self.is_highlighter = is_highlighter;
        self
    }

    pub fn positions(&self) -> impl Iterator<Item = PagePoint> + '_ {
        self.points.iter().map(StrokePoint::position)
    }

    pub fn bounds(&self) -> Option<Rect> {
        Rect::from_points(self.positions())
    }

    /// Move every point by the given delta
    pub fn translate(&mut self, dx: f32, dy: f32) {
        for point in &mut self.points {
            point.x += dx;
            point.y += dy;
        }
    }

    /// Check if a point touches the stroke, accounting for its width
    pub fn hit_test(&self, point: &PagePoint, tolerance: f32) -> bool {
        let reach = tolerance + self.width / 2.0;
        match self.points.as_slice() {
            [] => false,
            [only] => only.position().distance_to(point) <= reach,
            points => points
                .windows(2)
                .any(|pair| point_near_segment(point, &pair[0].position(), &pair[1].position(), reach)),
        }
    }
}

/// Geometric shape kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShapeKind {
    Line,
    Rectangle,
    Circle,
    Arrow,
}

impl ShapeKind {
    /// Persisted type name
    pub fn as_str(&self) -> &'static str {
        match self {
            ShapeKind::Line => "LINE",
            ShapeKind::Rectangle => "RECTANGLE",
            ShapeKind::Circle => "CIRCLE",
            ShapeKind::Arrow => "ARROW",
        }
    }
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown shape type name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown shape type: {0}")]
pub struct UnknownShapeKind(pub String);

impl FromStr for ShapeKind {
    type Err = UnknownShapeKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LINE" => Ok(ShapeKind::Line),
            "RECTANGLE" => Ok(ShapeKind::Rectangle),
            "CIRCLE" => Ok(ShapeKind::Circle),
            "ARROW" => Ok(ShapeKind::Arrow),
            _ => Err(UnknownShapeKind(s.to_owned())),
        }
    }
}

/// Shape annotation defined by a drag from start to end
///
/// Rectangles and circles are inscribed in the start/end bounding box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeAnnotation {
    pub id: AnnotationId,
    pub kind: ShapeKind,
    pub start_x: f32,
    pub start_y: f32,
    pub end_x: f32,
    pub end_y: f32,
    pub color: Color,
    pub width: f32,
    pub is_filled: bool,
    pub page_number: u32,
}

impl ShapeAnnotation {
    /// Create a shape with a generated id
    pub fn new(
        page_number: u32,
        kind: ShapeKind,
        start: PagePoint,
        end: PagePoint,
        color: Color,
        width: f32,
    ) -> Self {
        Self {
            id: AnnotationId::generate(),
            kind,
            start_x: start.x,
            start_y: start.y,
            end_x: end.x,
            end_y: end.y,
            color,
            width,
            is_filled: false,
            page_number,
        }
    }

    pub fn filled(mut self, is_filled: bool) -> Self {
        self.is_filled = is_filled;
        self
    }

    pub fn start(&self) -> PagePoint {
        PagePoint::new(self.start_x, self.start_y)
    }

    pub fn end(&self) -> PagePoint {
        PagePoint::new(self.end_x, self.end_y)
    }

    pub fn set_end(&mut self, end: PagePoint) {
        self.end_x = end.x;
        self.end_y = end.y;
    }

    pub fn bounds(&self) -> Rect {
        Rect::from_corners(self.start(), self.end())
    }

    pub fn center(&self) -> PagePoint {
        self.bounds().center()
    }

    pub fn translate(&mut self, dx: f32, dy: f32) {
        self.start_x += dx;
        self.start_y += dy;
        self.end_x += dx;
        self.end_y += dy;
    }

    /// Check if a point touches the shape outline (or interior when filled)
    pub fn hit_test(&self, point: &PagePoint, tolerance: f32) -> bool {
        let reach = tolerance + self.width / 2.0;
        match self.kind {
            ShapeKind::Line | ShapeKind::Arrow => {
                point_near_segment(point, &self.start(), &self.end(), reach)
            }
            ShapeKind::Rectangle => {
                let bounds = self.bounds();
                if self.is_filled {
                    return bounds.expand(reach).contains(point);
                }
                let corners = [
                    PagePoint::new(bounds.min_x, bounds.min_y),
                    PagePoint::new(bounds.max_x, bounds.min_y),
                    PagePoint::new(bounds.max_x, bounds.max_y),
                    PagePoint::new(bounds.min_x, bounds.max_y),
                ];
                (0..4).any(|i| point_near_segment(point, &corners[i], &corners[(i + 1) % 4], reach))
            }
            ShapeKind::Circle => {
                let bounds = self.bounds();
                let center = bounds.center();
                let rx = bounds.width() / 2.0;
                let ry = bounds.height() / 2.0;
                if rx < 1e-3 || ry < 1e-3 {
                    return point_near_segment(point, &self.start(), &self.end(), reach);
                }
                let dx = (point.x - center.x) / rx;
                let dy = (point.y - center.y) / ry;
                let normalized = (dx * dx + dy * dy).sqrt();
                if self.is_filled && normalized <= 1.0 {
                    return true;
                }
                (normalized - 1.0).abs() * rx.max(ry) <= reach
            }
        }
    }
}

/// All annotations on one page, in creation order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageAnnotations {
    pub strokes: Vec<Stroke>,
    pub shapes: Vec<ShapeAnnotation>,
}

impl PageAnnotations {
    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty() && self.shapes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.strokes.len() + self.shapes.len()
    }

    /// Topmost stroke under the point, as an index into `strokes`
    pub fn stroke_at(&self, point: &PagePoint, tolerance: f32) -> Option<usize> {
        self.strokes.iter().rposition(|stroke| stroke.hit_test(point, tolerance))
    }

    /// Topmost shape under the point, as an index into `shapes`
    pub fn shape_at(&self, point: &PagePoint, tolerance: f32) -> Option<usize> {
        self.shapes.iter().rposition(|shape| shape.hit_test(point, tolerance))
    }
}

/// Point to line-segment distance check
pub(crate) fn point_near_segment(
    point: &PagePoint,
    start: &PagePoint,
    end: &PagePoint,
    tolerance: f32,
) -> bool {
    let dx = end.x - start.x;
    let dy = end.y - start.y;
    let length_sq = dx * dx + dy * dy;

    if length_sq < 1e-6 {
        return point.distance_to(start) <= tolerance;
    }

    let t = ((point.x - start.x) * dx + (point.y - start.y) * dy) / length_sq;
    let t = t.clamp(0.0, 1.0);

    let closest = PagePoint::new(start.x + t * dx, start.y + t * dy);
    point.distance_to(&closest) <= tolerance
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stroke_through(points: &[(f32, f32)]) -> Stroke {
        let points = points
            .iter()
            .enumerate()
            .map(|(i, (x, y))| StrokePoint::new(*x, *y, 0.5, i as i64))
            .collect();
        Stroke::new(0, points, Color::BLACK, 2.0)
    }

    #[test]
    fn test_point_distance() {
        let p1 = PagePoint::new(0.0, 0.0);
        let p2 = PagePoint::new(3.0, 4.0);
        assert!((p1.distance_to(&p2) - 5.0).abs() < 0.001);
    }

    #[test]
    fn test_pressure_is_clamped() {
        assert_eq!(StrokePoint::new(0.0, 0.0, 1.7, 0).pressure, 1.0);
        assert_eq!(StrokePoint::new(0.0, 0.0, -0.2, 0).pressure, 0.0);
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(AnnotationId::generate(), AnnotationId::generate());
    }

    #[test]
    fn test_shape_bounds_and_center() {
        let shape = ShapeAnnotation::new(
            0,
            ShapeKind::Rectangle,
            PagePoint::new(50.0, 80.0),
            PagePoint::new(10.0, 20.0),
            Color::RED,
            2.0,
        );
        let bounds = shape.bounds();
        assert_eq!(bounds, Rect::new(10.0, 20.0, 50.0, 80.0));
        assert_eq!(shape.center(), PagePoint::new(30.0, 50.0));
    }

    #[test]
    fn test_shape_kind_names() {
        for kind in [ShapeKind::Line, ShapeKind::Rectangle, ShapeKind::Circle, ShapeKind::Arrow] {
            assert_eq!(kind.as_str().parse::<ShapeKind>().unwrap(), kind);
        }
        assert!("TRIANGLE".parse::<ShapeKind>().is_err());
    }

    #[test]
    fn test_stroke_hit_test() {
        let stroke = stroke_through(&[(0.0, 0.0), (100.0, 0.0)]);
        assert!(stroke.hit_test(&PagePoint::new(50.0, 3.0), 3.0));
        assert!(!stroke.hit_test(&PagePoint::new(50.0, 20.0), 3.0));
    }

    #[test]
    fn test_stroke_bounds_and_translate() {
        let mut stroke = stroke_through(&[(0.0, 10.0), (30.0, -5.0), (12.0, 40.0)]);
        assert_eq!(stroke.bounds(), Some(Rect::new(0.0, -5.0, 30.0, 40.0)));
        stroke.translate(5.0, 5.0);
        assert_eq!(stroke.bounds(), Some(Rect::new(5.0, 0.0, 35.0, 45.0)));
    }

    #[test]
    fn test_circle_outline_hit() {
        let shape = ShapeAnnotation::new(
            0,
            ShapeKind::Circle,
            PagePoint::new(75.0, 75.0),
            PagePoint::new(125.0, 125.0),
            Color::BLACK,
            2.0,
        );
        assert!(shape.hit_test(&PagePoint::new(125.0, 100.0), 3.0));
        assert!(!shape.hit_test(&PagePoint::new(100.0, 100.0), 3.0));
        assert!(shape.clone().filled(true).hit_test(&PagePoint::new(100.0, 100.0), 3.0));
    }

    #[test]
    fn test_topmost_stroke_wins() {
        let mut page = PageAnnotations::default();
        page.strokes.push(stroke_through(&[(0.0, 0.0), (100.0, 0.0)]));
        page.strokes.push(stroke_through(&[(50.0, -50.0), (50.0, 50.0)]));
        assert_eq!(page.stroke_at(&PagePoint::new(50.0, 0.0), 2.0), Some(1));
        assert_eq!(page.stroke_at(&PagePoint::new(500.0, 0.0), 2.0), None);
    }
}
