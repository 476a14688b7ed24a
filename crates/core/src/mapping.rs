//! Screen-space <-> page-space coordinate mapping
//!
//! Input arrives in on-screen pixels, which depend on:
//! - the fit scale of the rendered bitmap inside its container,
//! - the centering offset of the bitmap inside the container,
//! - the transient pinch-zoom and pan of the viewport,
//! - the fixed render scale used to rasterize the page.
//!
//! Stored annotations are in page space, with all four factors divided out,
//! so they replay correctly at any render scale or screen size.
//!
//! ```text
//! content = (screen - pan) / zoom
//! page    = (content - offset) / (fit_scale * render_scale)
//! ```

use crate::annotation::{PagePoint, ShapeAnnotation, Stroke, StrokePoint};
use serde::{Deserialize, Serialize};

/// Errors from building a transform
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum MappingError {
    /// Page not laid out yet (zero or non-finite scale or size)
    #[error("page layout is not available yet")]
    LayoutPending,
}

/// Layout of a rendered page bitmap inside its container view
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageLayout {
    /// Rendered bitmap size in pixels
    pub bitmap_width: f32,
    pub bitmap_height: f32,

    /// Container view size in pixels
    pub container_width: f32,
    pub container_height: f32,

    /// Scale used to rasterize the page (bitmap pixels per page unit)
    pub render_scale: f32,
}

impl PageLayout {
    pub fn new(
        bitmap_width: f32,
        bitmap_height: f32,
        container_width: f32,
        container_height: f32,
        render_scale: f32,
    ) -> Self {
        Self { bitmap_width, bitmap_height, container_width, container_height, render_scale }
    }

    /// Aspect-preserving scale fitting the bitmap inside the container
    pub fn fit_scale(&self) -> f32 {
        if self.bitmap_width <= 0.0 || self.bitmap_height <= 0.0 {
            return 0.0;
        }
        (self.container_width / self.bitmap_width).min(self.container_height / self.bitmap_height)
    }

    /// Offset of the fitted bitmap's top-left corner inside the container
    pub fn centering_offset(&self) -> (f32, f32) {
        let fit = self.fit_scale();
        (
            (self.container_width - self.bitmap_width * fit) / 2.0,
            (self.container_height - self.bitmap_height * fit) / 2.0,
        )
    }
}

/// Transient pinch-zoom and pan applied on top of the fitted page
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub zoom: f32,
    pub pan_x: f32,
    pub pan_y: f32,
}

impl Viewport {
    pub fn new(zoom: f32, pan_x: f32, pan_y: f32) -> Self {
        Self { zoom, pan_x, pan_y }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self { zoom: 1.0, pan_x: 0.0, pan_y: 0.0 }
    }
}

/// Resolved mapping for one page under one viewport
///
/// Only constructible from a usable layout, so the mapping functions never
/// divide by zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageTransform {
    scale: f32,
    offset_x: f32,
    offset_y: f32,
    zoom: f32,
    pan_x: f32,
    pan_y: f32,
}

fn usable(value: f32) -> bool {
    value.is_finite() && value > 0.0
}

impl PageTransform {
    pub fn new(layout: &PageLayout, viewport: &Viewport) -> Result<Self, MappingError> {
        let dimensions = [
            layout.bitmap_width,
            layout.bitmap_height,
            layout.container_width,
            layout.container_height,
            layout.render_scale,
            viewport.zoom,
        ];
        if !dimensions.into_iter().all(usable) {
            return Err(MappingError::LayoutPending);
        }

        let fit = layout.fit_scale();
        let scale = fit * layout.render_scale;
        if !usable(scale) {
            return Err(MappingError::LayoutPending);
        }

        let (offset_x, offset_y) = layout.centering_offset();
        Ok(Self {
            scale,
            offset_x,
            offset_y,
            zoom: viewport.zoom,
            pan_x: viewport.pan_x,
            pan_y: viewport.pan_y,
        })
    }

    /// Screen pixels per page unit, including zoom
    pub fn screen_scale(&self) -> f32 {
        self.scale * self.zoom
    }

    pub fn to_page(&self, screen: PagePoint) -> PagePoint {
        let content_x = (screen.x - self.pan_x) / self.zoom;
        let content_y = (screen.y - self.pan_y) / self.zoom;
        PagePoint::new(
            (content_x - self.offset_x) / self.scale,
            (content_y - self.offset_y) / self.scale,
        )
    }

    pub fn to_screen(&self, page: PagePoint) -> PagePoint {
        let content_x = page.x * self.scale + self.offset_x;
        let content_y = page.y * self.scale + self.offset_y;
        PagePoint::new(content_x * self.zoom + self.pan_x, content_y * self.zoom + self.pan_y)
    }

    /// Convert a screen-space translation into page space
    pub fn delta_to_page(&self, dx: f32, dy: f32) -> (f32, f32) {
        let factor = self.screen_scale();
        (dx / factor, dy / factor)
    }

    /// Convert a screen-space length (stroke width, tolerance) into page units
    pub fn length_to_page(&self, length: f32) -> f32 {
        length / self.screen_scale()
    }

    pub fn length_to_screen(&self, length: f32) -> f32 {
        length * self.screen_scale()
    }

    pub fn stroke_point_to_page(&self, point: &StrokePoint) -> StrokePoint {
        point.with_position(self.to_page(point.position()))
    }

    pub fn stroke_to_page(&self, stroke: &Stroke) -> Stroke {
        Stroke {
            points: stroke.points.iter().map(|p| self.stroke_point_to_page(p)).collect(),
            width: self.length_to_page(stroke.width),
            ..stroke.clone()
        }
    }

    pub fn stroke_to_screen(&self, stroke: &Stroke) -> Stroke {
        Stroke {
            points: stroke
                .points
                .iter()
                .map(|p| p.with_position(self.to_screen(p.position())))
                .collect(),
            width: self.length_to_screen(stroke.width),
            ..stroke.clone()
        }
    }

    pub fn shape_to_page(&self, shape: &ShapeAnnotation) -> ShapeAnnotation {
        self.map_shape(shape, |p| self.to_page(p), self.length_to_page(shape.width))
    }

    pub fn shape_to_screen(&self, shape: &ShapeAnnotation) -> ShapeAnnotation {
        self.map_shape(shape, |p| self.to_screen(p), self.length_to_screen(shape.width))
    }

    fn map_shape<F>(&self, shape: &ShapeAnnotation, map: F, width: f32) -> ShapeAnnotation
    where
        F: Fn(PagePoint) -> PagePoint,
    {
        let start = map(shape.start());
        let end = map(shape.end());
        ShapeAnnotation {
            start_x: start.x,
            start_y: start.y,
            end_x: end.x,
            end_y: end.y,
            width,
            ..shape.clone()
        }
    }
}
