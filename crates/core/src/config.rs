//! Annotator configuration
//!
//! Aggregates the tunables of the annotation core. Serialisable so it can
//! be embedded in the stored preferences; missing fields fall back to the
//! defaults.

use crate::history::DEFAULT_HISTORY_CAPACITY;
use crate::lasso::LassoConfig;
use crate::recognition::DetectionConfig;
use crate::snapping::SnapConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotatorConfig {
    /// Undo steps retained per page
    pub history_capacity: usize,

    /// Angle snapping while dragging shapes
    pub snap: SnapConfig,

    /// Freehand shape recognition thresholds
    pub detection: DetectionConfig,

    /// Replace recognised freehand strokes with shapes on pointer-up
    pub auto_recognize_shapes: bool,

    /// Lasso selection tuning
    pub lasso: LassoConfig,

    /// Eraser and hit-test reach, in screen pixels
    pub touch_tolerance_px: f32,

    /// Pages rendered ahead of and behind the current page
    pub prefetch_radius: u32,
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            snap: SnapConfig::default(),
            detection: DetectionConfig::default(),
            auto_recognize_shapes: false,
            lasso: LassoConfig::default(),
            touch_tolerance_px: 12.0,
            prefetch_radius: 2,
        }
    }
}

impl AnnotatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    pub fn with_snap(mut self, snap: SnapConfig) -> Self {
        self.snap = snap;
        self
    }

    pub fn with_auto_recognize_shapes(mut self, enabled: bool) -> Self {
        self.auto_recognize_shapes = enabled;
        self
    }

    pub fn with_touch_tolerance(mut self, pixels: f32) -> Self {
        self.touch_tolerance_px = pixels;
        self
    }

    pub fn with_prefetch_radius(mut self, radius: u32) -> Self {
        self.prefetch_radius = radius;
        self
    }
}
