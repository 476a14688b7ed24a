//! PDF Annotator Core Library
//!
//! Annotation model and editing logic for the PDF annotator: strokes and
//! shapes, undo/redo, screen/page coordinate mapping, lasso selection,
//! angle snapping and freehand shape recognition.

pub mod annotation;
pub mod color;
pub mod config;
pub mod history;
pub mod lasso;
pub mod mapping;
pub mod recognition;
pub mod session;
pub mod snapping;

pub use annotation::{
    AnnotationId, PageAnnotations, PagePoint, Rect, ShapeAnnotation, ShapeKind, Stroke,
    StrokePoint, UnknownShapeKind,
};
pub use color::Color;
pub use config::AnnotatorConfig;
pub use history::{UndoRedoManager, UndoableAction, DEFAULT_HISTORY_CAPACITY};
pub use lasso::{LassoConfig, LassoSelection};
pub use mapping::{MappingError, PageLayout, PageTransform, Viewport};
pub use recognition::{detect_shape, DetectedShape, DetectionConfig};
pub use session::{DocumentSession, GestureOutcome, InkStyle, PointerEvent, SessionError, Tool};
pub use snapping::{snap_endpoint, SnapConfig, SnapResult};
