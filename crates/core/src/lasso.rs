//! Lasso selection geometry
//!
//! Membership is computed with an even-odd ray-casting test against the
//! user-drawn polygon. The thresholds in [`LassoConfig`] are tunable
//! heuristics.

use crate::annotation::{AnnotationId, PagePoint, Rect, ShapeAnnotation, Stroke};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Lasso selection tuning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LassoConfig {
    /// A stroke is selected when strictly more than this share of its
    /// points lies inside the lasso
    pub stroke_inside_ratio: f32,

    /// Margin added around the selection bounds for the drag handles
    pub bounds_margin: f32,
}

impl Default for LassoConfig {
    fn default() -> Self {
        Self { stroke_inside_ratio: 0.5, bounds_margin: 10.0 }
    }
}

/// Even-odd crossing test
///
/// Polygons with fewer than three vertices contain nothing. The polygon is
/// treated as closed.
pub fn point_in_polygon(point: &PagePoint, polygon: &[PagePoint]) -> bool {
    if polygon.len() < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let a = polygon[i];
        let b = polygon[j];
        if (a.y > point.y) != (b.y > point.y) {
            let crossing_x = (b.x - a.x) * (point.y - a.y) / (b.y - a.y) + a.x;
            if point.x < crossing_x {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Whether a stroke counts as lassoed
pub fn stroke_in_polygon(stroke: &Stroke, polygon: &[PagePoint], inside_ratio: f32) -> bool {
    if stroke.points.is_empty() {
        return false;
    }
    let inside = stroke.positions().filter(|p| point_in_polygon(p, polygon)).count();
    inside as f32 / stroke.points.len() as f32 > inside_ratio
}

/// Whether a shape counts as lassoed
pub fn shape_in_polygon(shape: &ShapeAnnotation, polygon: &[PagePoint]) -> bool {
    point_in_polygon(&shape.center(), polygon)
}

/// Active lasso selection on one page
///
/// Transient: never persisted, cleared on tool change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LassoSelection {
    pub path: Vec<PagePoint>,
    pub stroke_ids: HashSet<AnnotationId>,
    pub shape_ids: HashSet<AnnotationId>,
    /// Union of selected bounds plus the handle margin; `None` when empty
    pub bounds: Option<Rect>,
}

impl LassoSelection {
    /// Compute the selection for a closed lasso path
    pub fn select(
        path: Vec<PagePoint>,
        strokes: &[Stroke],
        shapes: &[ShapeAnnotation],
        config: &LassoConfig,
    ) -> Self {
        let mut stroke_ids = HashSet::new();
        let mut shape_ids = HashSet::new();
        let mut bounds: Option<Rect> = None;

        let mut include = |rect: Rect| {
            bounds = Some(match bounds {
                Some(current) => current.union(&rect),
                None => rect,
            });
        };

        for stroke in strokes {
            if stroke_in_polygon(stroke, &path, config.stroke_inside_ratio) {
                stroke_ids.insert(stroke.id.clone());
                if let Some(rect) = stroke.bounds() {
                    include(rect);
                }
            }
        }

        for shape in shapes {
            if shape_in_polygon(shape, &path) {
                shape_ids.insert(shape.id.clone());
                include(shape.bounds());
            }
        }

        Self {
            path,
            stroke_ids,
            shape_ids,
            bounds: bounds.map(|rect| rect.expand(config.bounds_margin)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.stroke_ids.is_empty() && self.shape_ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.stroke_ids.len() + self.shape_ids.len()
    }

    /// Whether a tap lands inside the selection handles
    pub fn contains(&self, point: &PagePoint) -> bool {
        self.bounds.is_some_and(|bounds| bounds.contains(point))
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Move every selected primitive by a page-space delta
    pub fn translate(
        &mut self,
        strokes: &mut [Stroke],
        shapes: &mut [ShapeAnnotation],
        dx: f32,
        dy: f32,
    ) {
        for stroke in strokes.iter_mut().filter(|s| self.stroke_ids.contains(&s.id)) {
            stroke.translate(dx, dy);
        }
        for shape in shapes.iter_mut().filter(|s| self.shape_ids.contains(&s.id)) {
            shape.translate(dx, dy);
        }
        for point in &mut self.path {
            *point = point.offset(dx, dy);
        }
        self.bounds = self.bounds.map(|bounds| bounds.translate(dx, dy));
    }

    /// Indices of selected strokes within `strokes`
    pub fn stroke_indices(&self, strokes: &[Stroke]) -> Vec<usize> {
        strokes
            .iter()
            .enumerate()
            .filter(|(_, s)| self.stroke_ids.contains(&s.id))
            .map(|(i, _)| i)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{ShapeKind, StrokePoint};
    use crate::color::Color;

    fn square(min: f32, max: f32) -> Vec<PagePoint> {
        vec![
            PagePoint::new(min, min),
            PagePoint::new(max, min),
            PagePoint::new(max, max),
            PagePoint::new(min, max),
        ]
    }

    fn stroke(points: &[(f32, f32)]) -> Stroke {
        Stroke::new(
            0,
            points.iter().map(|(x, y)| StrokePoint::new(*x, *y, 1.0, 0)).collect(),
            Color::BLACK,
            2.0,
        )
    }

    fn shape(start: (f32, f32), end: (f32, f32)) -> ShapeAnnotation {
        ShapeAnnotation::new(
            0,
            ShapeKind::Rectangle,
            PagePoint::new(start.0, start.1),
            PagePoint::new(end.0, end.1),
            Color::BLACK,
            2.0,
        )
    }

    #[test]
    fn test_point_in_square() {
        let polygon = square(0.0, 100.0);
        assert!(point_in_polygon(&PagePoint::new(50.0, 50.0), &polygon));
        assert!(!point_in_polygon(&PagePoint::new(150.0, 50.0), &polygon));
        assert!(!point_in_polygon(&PagePoint::new(-1.0, 50.0), &polygon));
    }

    #[test]
    fn test_concave_polygon() {
        // U shape: the notch between the arms is outside
        let polygon = vec![
            PagePoint::new(0.0, 0.0),
            PagePoint::new(30.0, 0.0),
            PagePoint::new(30.0, 70.0),
            PagePoint::new(70.0, 70.0),
            PagePoint::new(70.0, 0.0),
            PagePoint::new(100.0, 0.0),
            PagePoint::new(100.0, 100.0),
            PagePoint::new(0.0, 100.0),
        ];
        assert!(!point_in_polygon(&PagePoint::new(50.0, 30.0), &polygon));
        assert!(point_in_polygon(&PagePoint::new(15.0, 30.0), &polygon));
        assert!(point_in_polygon(&PagePoint::new(50.0, 85.0), &polygon));
    }

    #[test]
    fn test_degenerate_polygon_contains_nothing() {
        let line = vec![PagePoint::new(0.0, 0.0), PagePoint::new(100.0, 100.0)];
        assert!(!point_in_polygon(&PagePoint::new(50.0, 50.0), &line));
    }

    #[test]
    fn test_stroke_fully_inside_is_selected() {
        let inside = stroke(&[(10.0, 10.0), (20.0, 30.0), (40.0, 40.0)]);
        let outside = stroke(&[(200.0, 200.0), (210.0, 220.0)]);
        let selection = LassoSelection::select(
            square(0.0, 100.0),
            &[inside.clone(), outside.clone()],
            &[],
            &LassoConfig::default(),
        );
        assert!(selection.stroke_ids.contains(&inside.id));
        assert!(!selection.stroke_ids.contains(&outside.id));
    }

    #[test]
    fn test_stroke_needs_more_than_half_inside() {
        // Exactly half inside: not selected
        let half = stroke(&[(10.0, 10.0), (20.0, 20.0), (200.0, 10.0), (210.0, 20.0)]);
        // Three of four inside: selected
        let most = stroke(&[(10.0, 10.0), (20.0, 20.0), (30.0, 30.0), (210.0, 20.0)]);
        let selection = LassoSelection::select(
            square(0.0, 100.0),
            &[half.clone(), most.clone()],
            &[],
            &LassoConfig::default(),
        );
        assert!(!selection.stroke_ids.contains(&half.id));
        assert!(selection.stroke_ids.contains(&most.id));
    }

    #[test]
    fn test_shape_selected_by_center() {
        // Center (90, 90) inside even though the shape overhangs the lasso
        let overhanging = shape((60.0, 60.0), (120.0, 120.0));
        // Center (110, 50) outside even though a corner is inside
        let corner_only = shape((90.0, 40.0), (130.0, 60.0));
        let selection = LassoSelection::select(
            square(0.0, 100.0),
            &[],
            &[overhanging.clone(), corner_only.clone()],
            &LassoConfig::default(),
        );
        assert!(selection.shape_ids.contains(&overhanging.id));
        assert!(!selection.shape_ids.contains(&corner_only.id));
    }

    #[test]
    fn test_bounds_union_with_margin() {
        let a = stroke(&[(10.0, 10.0), (20.0, 20.0)]);
        let b = shape((50.0, 60.0), (80.0, 90.0));
        let selection =
            LassoSelection::select(square(0.0, 100.0), &[a], &[b], &LassoConfig::default());
        assert_eq!(selection.bounds, Some(Rect::new(0.0, 0.0, 90.0, 100.0)));
        assert!(selection.contains(&PagePoint::new(85.0, 95.0)));
        assert!(!selection.contains(&PagePoint::new(95.0, 50.0)));
    }

    #[test]
    fn test_empty_selection_has_no_bounds() {
        let selection =
            LassoSelection::select(square(0.0, 10.0), &[], &[], &LassoConfig::default());
        assert!(selection.is_empty());
        assert_eq!(selection.bounds, None);
        assert!(!selection.contains(&PagePoint::new(5.0, 5.0)));
    }

    #[test]
    fn test_translate_moves_only_selected() {
        let mut strokes = vec![stroke(&[(10.0, 10.0)]), stroke(&[(300.0, 300.0)])];
        let mut shapes = vec![shape((20.0, 20.0), (40.0, 40.0))];
        let mut selection =
            LassoSelection::select(square(0.0, 100.0), &strokes, &shapes, &LassoConfig::default());
        let before = selection.bounds.unwrap();

        selection.translate(&mut strokes, &mut shapes, 5.0, -5.0);

        assert_eq!(strokes[0].points[0].position(), PagePoint::new(15.0, 5.0));
        assert_eq!(strokes[1].points[0].position(), PagePoint::new(300.0, 300.0));
        assert_eq!(shapes[0].start(), PagePoint::new(25.0, 15.0));
        assert_eq!(shapes[0].end(), PagePoint::new(45.0, 35.0));
        assert_eq!(selection.bounds, Some(before.translate(5.0, -5.0)));
    }
}
