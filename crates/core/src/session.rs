//! Per-document annotation session
//!
//! One [`DocumentSession`] exists per open document and is the single owner
//! of its in-memory annotations, tool state, selection and undo history.
//! UI callbacks hold a reference to it; there is no process-wide state.
//!
//! Pointer input arrives in screen space and is mapped to page space with
//! the page's current [`PageTransform`] before anything is recorded.

use crate::annotation::{
    AnnotationId, PageAnnotations, PagePoint, ShapeAnnotation, ShapeKind, Stroke, StrokePoint,
};
use crate::color::Color;
use crate::config::AnnotatorConfig;
use crate::history::{UndoRedoManager, UndoableAction};
use crate::lasso::LassoSelection;
use crate::mapping::{MappingError, PageLayout, PageTransform, Viewport};
use crate::recognition::detect_shape;
use crate::snapping::snap_endpoint;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Active input tool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Pen,
    Highlighter,
    Shape(ShapeKind),
    Eraser,
    Lasso,
    /// Input is navigation only
    Pan,
}

/// Ink appearance for new annotations
///
/// Widths are in screen pixels and converted to page units when a stroke
/// or shape is committed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InkStyle {
    pub pen_color: Color,
    pub pen_width: f32,
    pub highlighter_color: Color,
    pub highlighter_width: f32,
    pub fill_shapes: bool,
}

impl Default for InkStyle {
    fn default() -> Self {
        Self {
            pen_color: Color::BLACK,
            pen_width: 4.0,
            highlighter_color: Color::HIGHLIGHT_YELLOW,
            highlighter_width: 24.0,
            fill_shapes: false,
        }
    }
}

/// A pointer sample in screen space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub page: u32,
    pub position: PagePoint,
    pub pressure: f32,
    pub timestamp: i64,
}

impl PointerEvent {
    pub fn new(page: u32, x: f32, y: f32) -> Self {
        Self { page, position: PagePoint::new(x, y), pressure: 1.0, timestamp: 0 }
    }

    pub fn with_pressure(mut self, pressure: f32) -> Self {
        self.pressure = pressure;
        self
    }

    pub fn at(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Errors from session operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    /// Page has no usable layout yet; retry once it is laid out
    #[error("page {0} is not laid out yet")]
    LayoutPending(u32),

    /// Event for a different page than the gesture in progress
    #[error("gesture started on page {started} but received event for page {received}")]
    PageMismatch { started: u32, received: u32 },
}

/// What a pointer event did
#[derive(Debug, Clone, PartialEq)]
pub enum GestureOutcome {
    /// Nothing committed (gesture in progress, or nothing to do)
    Pending,
    StrokeAdded(AnnotationId),
    ShapeAdded(AnnotationId),
    /// Number of annotations erased by this event
    Erased(usize),
    /// Number of annotations captured by the lasso
    Selected(usize),
    /// Selection moved by a page-space delta
    SelectionMoved { dx: f32, dy: f32 },
    SelectionCleared,
}

#[derive(Debug, Clone)]
enum Gesture {
    Ink { page: u32, highlighter: bool, points: Vec<StrokePoint> },
    Shape { page: u32, kind: ShapeKind, start: PagePoint, end: PagePoint },
    Erase { page: u32 },
    Lasso { page: u32, path: Vec<PagePoint> },
    Drag { page: u32, origin: PagePoint, current: PagePoint },
}

impl Gesture {
    fn page(&self) -> u32 {
        match self {
            Gesture::Ink { page, .. }
            | Gesture::Shape { page, .. }
            | Gesture::Erase { page }
            | Gesture::Lasso { page, .. }
            | Gesture::Drag { page, .. } => *page,
        }
    }
}

/// Editing state of one open document
#[derive(Debug)]
pub struct DocumentSession {
    document_path: String,
    config: AnnotatorConfig,
    pages: BTreeMap<u32, PageAnnotations>,
    histories: HashMap<u32, UndoRedoManager>,
    layouts: HashMap<u32, PageLayout>,
    viewport: Viewport,
    current_page: u32,
    tool: Tool,
    style: InkStyle,
    selection: Option<(u32, LassoSelection)>,
    gesture: Option<Gesture>,
    dirty: bool,
}

impl DocumentSession {
    /// Start an empty session
    pub fn new(document_path: impl Into<String>, config: AnnotatorConfig) -> Self {
        Self {
            document_path: document_path.into(),
            config,
            pages: BTreeMap::new(),
            histories: HashMap::new(),
            layouts: HashMap::new(),
            viewport: Viewport::default(),
            current_page: 0,
            tool: Tool::Pen,
            style: InkStyle::default(),
            selection: None,
            gesture: None,
            dirty: false,
        }
    }

    /// Start a session from annotations loaded from storage
    pub fn from_annotations(
        document_path: impl Into<String>,
        pages: BTreeMap<u32, PageAnnotations>,
        config: AnnotatorConfig,
    ) -> Self {
        let mut session = Self::new(document_path, config);
        session.pages = pages.into_iter().filter(|(_, page)| !page.is_empty()).collect();
        session
    }

    pub fn document_path(&self) -> &str {
        &self.document_path
    }

    pub fn config(&self) -> &AnnotatorConfig {
        &self.config
    }

    // --- Layout and navigation -------------------------------------------

    /// Record the current layout of a rendered page
    pub fn set_layout(&mut self, page: u32, layout: PageLayout) {
        self.layouts.insert(page, layout);
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Mapping for a page under the current viewport
    pub fn transform(&self, page: u32) -> Result<PageTransform, SessionError> {
        let layout = self.layouts.get(&page).ok_or(SessionError::LayoutPending(page))?;
        PageTransform::new(layout, &self.viewport)
            .map_err(|MappingError::LayoutPending| SessionError::LayoutPending(page))
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    /// Switch pages; drops any selection or gesture on the old page
    pub fn go_to_page(&mut self, page: u32) {
        if page != self.current_page {
            self.selection = None;
            self.gesture = None;
            self.current_page = page;
        }
    }

    // --- Tools -----------------------------------------------------------

    pub fn tool(&self) -> Tool {
        self.tool
    }

    /// Change tool; clears the selection and any in-flight gesture
    pub fn set_tool(&mut self, tool: Tool) {
        self.tool = tool;
        self.selection = None;
        self.gesture = None;
    }

    pub fn style(&self) -> InkStyle {
        self.style
    }

    pub fn set_style(&mut self, style: InkStyle) {
        self.style = style;
    }

    // --- Queries ---------------------------------------------------------

    pub fn page(&self, page: u32) -> Option<&PageAnnotations> {
        self.pages.get(&page)
    }

    pub fn strokes(&self, page: u32) -> &[Stroke] {
        self.pages.get(&page).map(|p| p.strokes.as_slice()).unwrap_or_default()
    }

    pub fn shapes(&self, page: u32) -> &[ShapeAnnotation] {
        self.pages.get(&page).map(|p| p.shapes.as_slice()).unwrap_or_default()
    }

    /// Pages that currently carry annotations
    pub fn annotated_pages(&self) -> impl Iterator<Item = u32> + '_ {
        self.pages.iter().filter(|(_, p)| !p.is_empty()).map(|(page, _)| *page)
    }

    pub fn selection(&self) -> Option<&LassoSelection> {
        self.selection.as_ref().map(|(_, selection)| selection)
    }

    /// Page-space offset of a selection drag in progress, for previews
    pub fn drag_offset(&self) -> Option<(f32, f32)> {
        match &self.gesture {
            Some(Gesture::Drag { origin, current, .. }) => {
                Some((current.x - origin.x, current.y - origin.y))
            }
            _ => None,
        }
    }

    /// Shape being dragged out, in page space, for previews
    pub fn pending_shape(&self) -> Option<(ShapeKind, PagePoint, PagePoint)> {
        match &self.gesture {
            Some(Gesture::Shape { kind, start, end, .. }) => Some((*kind, *start, *end)),
            _ => None,
        }
    }

    // --- Persistence hooks -----------------------------------------------

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_saved(&mut self) {
        self.dirty = false;
    }

    /// Complete annotation set for a save
    ///
    /// Saves replace everything stored for the document, so this always
    /// returns every page, not just the edited ones.
    pub fn snapshot(&self) -> BTreeMap<u32, PageAnnotations> {
        self.pages
            .iter()
            .filter(|(_, page)| !page.is_empty())
            .map(|(number, page)| (*number, page.clone()))
            .collect()
    }

    /// Remove every annotation of the document
    pub fn clear_all(&mut self) {
        if !self.pages.is_empty() {
            self.dirty = true;
        }
        self.pages.clear();
        self.histories.clear();
        self.selection = None;
        self.gesture = None;
    }

    // --- Direct edits ----------------------------------------------------

    /// Add a stroke already in page space, as one undo step
    pub fn add_stroke(&mut self, stroke: Stroke) -> AnnotationId {
        let page = stroke.page_number;
        let id = stroke.id.clone();
        self.execute(page, UndoableAction::AddStroke(stroke));
        id
    }

    /// Add a shape already in page space
    pub fn add_shape(&mut self, shape: ShapeAnnotation) -> AnnotationId {
        let id = shape.id.clone();
        self.pages.entry(shape.page_number).or_default().shapes.push(shape);
        self.dirty = true;
        id
    }

    /// Remove a stroke or shape by id
    pub fn remove(&mut self, id: &AnnotationId) -> bool {
        let found = self.pages.iter().find_map(|(number, page)| {
            if let Some(index) = page.strokes.iter().position(|s| &s.id == id) {
                Some((*number, Some(index)))
            } else {
                page.shapes.iter().any(|s| &s.id == id).then_some((*number, None))
            }
        });

        match found {
            Some((page, Some(index))) => {
                if let Some(action) = UndoableAction::remove_at(self.strokes(page), index) {
                    self.execute(page, action);
                }
                true
            }
            Some((page, None)) => {
                if let Some(annotations) = self.pages.get_mut(&page) {
                    annotations.shapes.retain(|s| &s.id != id);
                }
                self.dirty = true;
                true
            }
            None => false,
        }
    }

    /// Delete every selected annotation; strokes go as one undo step
    pub fn delete_selection(&mut self) -> usize {
        let Some((page, selection)) = self.selection.take() else {
            return 0;
        };

        let indices = selection.stroke_indices(self.strokes(page));
        if !indices.is_empty() {
            let action = UndoableAction::remove_many(self.strokes(page), &indices);
            self.execute(page, action);
        }

        let mut removed_shapes = 0;
        if let Some(annotations) = self.pages.get_mut(&page) {
            let before = annotations.shapes.len();
            annotations.shapes.retain(|s| !selection.shape_ids.contains(&s.id));
            removed_shapes = before - annotations.shapes.len();
        }
        if removed_shapes > 0 {
            self.dirty = true;
        }

        debug!(page, strokes = indices.len(), shapes = removed_shapes, "deleted selection");
        indices.len() + removed_shapes
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    // --- Undo/redo -------------------------------------------------------

    pub fn undo(&mut self) -> bool {
        self.undo_page(self.current_page)
    }

    pub fn redo(&mut self) -> bool {
        self.redo_page(self.current_page)
    }

    pub fn undo_page(&mut self, page: u32) -> bool {
        self.selection = None;
        let Some(history) = self.histories.get_mut(&page) else {
            return false;
        };
        let annotations = self.pages.entry(page).or_default();
        let changed = history.undo(annotations);
        self.dirty |= changed;
        changed
    }

    pub fn redo_page(&mut self, page: u32) -> bool {
        self.selection = None;
        let Some(history) = self.histories.get_mut(&page) else {
            return false;
        };
        let annotations = self.pages.entry(page).or_default();
        let changed = history.redo(annotations);
        self.dirty |= changed;
        changed
    }

    pub fn can_undo(&self) -> bool {
        self.histories.get(&self.current_page).is_some_and(UndoRedoManager::can_undo)
    }

    pub fn can_redo(&self) -> bool {
        self.histories.get(&self.current_page).is_some_and(UndoRedoManager::can_redo)
    }

    fn execute(&mut self, page: u32, action: UndoableAction) {
        let capacity = self.config.history_capacity;
        let history =
            self.histories.entry(page).or_insert_with(|| UndoRedoManager::with_capacity(capacity));
        let annotations = self.pages.entry(page).or_default();
        history.execute(action, annotations);
        self.dirty = true;
    }

    // --- Pointer input ---------------------------------------------------

    pub fn pointer_down(&mut self, event: PointerEvent) -> Result<GestureOutcome, SessionError> {
        let transform = self.transform(event.page)?;
        let point = transform.to_page(event.position);
        self.gesture = None;
        if event.page != self.current_page {
            self.go_to_page(event.page);
        }

        match self.tool {
            Tool::Pan => Ok(GestureOutcome::Pending),
            Tool::Pen | Tool::Highlighter => {
                self.gesture = Some(Gesture::Ink {
                    page: event.page,
                    highlighter: self.tool == Tool::Highlighter,
                    points: vec![StrokePoint::new(point.x, point.y, event.pressure, event.timestamp)],
                });
                Ok(GestureOutcome::Pending)
            }
            Tool::Shape(kind) => {
                self.gesture = Some(Gesture::Shape { page: event.page, kind, start: point, end: point });
                Ok(GestureOutcome::Pending)
            }
            Tool::Eraser => {
                self.gesture = Some(Gesture::Erase { page: event.page });
                Ok(GestureOutcome::Erased(self.erase_at(event.page, point, &transform)))
            }
            Tool::Lasso => {
                let inside = self
                    .selection
                    .as_ref()
                    .is_some_and(|(page, selection)| *page == event.page && selection.contains(&point));
                if inside {
                    self.gesture =
                        Some(Gesture::Drag { page: event.page, origin: point, current: point });
                    return Ok(GestureOutcome::Pending);
                }

                let had_selection = self.selection.take().is_some();
                self.gesture = Some(Gesture::Lasso { page: event.page, path: vec![point] });
                Ok(if had_selection { GestureOutcome::SelectionCleared } else { GestureOutcome::Pending })
            }
        }
    }

    pub fn pointer_move(&mut self, event: PointerEvent) -> Result<GestureOutcome, SessionError> {
        let Some(page) = self.gesture.as_ref().map(Gesture::page) else {
            return Ok(GestureOutcome::Pending);
        };
        if page != event.page {
            return Err(SessionError::PageMismatch { started: page, received: event.page });
        }
        let transform = self.transform(event.page)?;
        let point = transform.to_page(event.position);
        let snap = self.config.snap;

        match &mut self.gesture {
            Some(Gesture::Ink { points, .. }) => {
                points.push(StrokePoint::new(point.x, point.y, event.pressure, event.timestamp));
            }
            Some(Gesture::Shape { start, end, .. }) => {
                *end = snap_endpoint(*start, point, &snap).point;
            }
            Some(Gesture::Erase { page }) => {
                let page = *page;
                return Ok(GestureOutcome::Erased(self.erase_at(page, point, &transform)));
            }
            Some(Gesture::Lasso { path, .. }) => path.push(point),
            Some(Gesture::Drag { current, .. }) => *current = point,
            None => {}
        }
        Ok(GestureOutcome::Pending)
    }

    pub fn pointer_up(&mut self, event: PointerEvent) -> Result<GestureOutcome, SessionError> {
        let Some(gesture) = self.gesture.as_ref() else {
            return Ok(GestureOutcome::Pending);
        };
        if gesture.page() != event.page {
            return Err(SessionError::PageMismatch { started: gesture.page(), received: event.page });
        }
        let transform = self.transform(event.page)?;

        // Final sample is part of the gesture
        let last = self.pointer_move(event)?;

        let Some(gesture) = self.gesture.take() else {
            return Ok(GestureOutcome::Pending);
        };

        match gesture {
            Gesture::Ink { page, highlighter, points } => {
                Ok(self.commit_ink(page, highlighter, points, &transform))
            }
            Gesture::Shape { page, kind, start, end } => {
                if start.distance_to(&end) < f32::EPSILON {
                    return Ok(GestureOutcome::Pending);
                }
                let width = transform.length_to_page(self.style.pen_width);
                let shape = ShapeAnnotation::new(page, kind, start, end, self.style.pen_color, width)
                    .filled(self.style.fill_shapes);
                debug!(page, kind = %kind, "shape committed");
                Ok(GestureOutcome::ShapeAdded(self.add_shape(shape)))
            }
            Gesture::Erase { .. } => match last {
                GestureOutcome::Erased(count) => Ok(GestureOutcome::Erased(count)),
                _ => Ok(GestureOutcome::Erased(0)),
            },
            Gesture::Lasso { page, path } => {
                let annotations = self.pages.get(&page).cloned().unwrap_or_default();
                let selection = LassoSelection::select(
                    path,
                    &annotations.strokes,
                    &annotations.shapes,
                    &self.config.lasso,
                );
                let count = selection.len();
                self.selection = (!selection.is_empty()).then_some((page, selection));
                Ok(GestureOutcome::Selected(count))
            }
            Gesture::Drag { page, origin, current } => {
                let (dx, dy) = (current.x - origin.x, current.y - origin.y);
                if dx == 0.0 && dy == 0.0 {
                    return Ok(GestureOutcome::Pending);
                }
                self.commit_move(page, dx, dy);
                Ok(GestureOutcome::SelectionMoved { dx, dy })
            }
        }
    }

    /// Abort the gesture in progress without committing it
    pub fn cancel_gesture(&mut self) {
        self.gesture = None;
    }

    fn commit_ink(
        &mut self,
        page: u32,
        highlighter: bool,
        points: Vec<StrokePoint>,
        transform: &PageTransform,
    ) -> GestureOutcome {
        if points.is_empty() {
            return GestureOutcome::Pending;
        }

        let (color, width) = if highlighter {
            (self.style.highlighter_color, self.style.highlighter_width)
        } else {
            (self.style.pen_color, self.style.pen_width)
        };
        let width = transform.length_to_page(width);

        if self.config.auto_recognize_shapes && !highlighter {
            let positions: Vec<PagePoint> = points.iter().map(StrokePoint::position).collect();
            if let Some(detected) = detect_shape(&positions, &self.config.detection) {
                debug!(page, kind = %detected.kind, confidence = detected.confidence, "recognised shape");
                let shape = detected.into_shape(page, color, width);
                return GestureOutcome::ShapeAdded(self.add_shape(shape));
            }
        }

        let stroke = Stroke::new(page, points, color, width).highlighter(highlighter);
        GestureOutcome::StrokeAdded(self.add_stroke(stroke))
    }

    fn erase_at(&mut self, page: u32, point: PagePoint, transform: &PageTransform) -> usize {
        let tolerance = transform.length_to_page(self.config.touch_tolerance_px);
        let Some(annotations) = self.pages.get(&page) else {
            return 0;
        };

        if let Some(index) = annotations.stroke_at(&point, tolerance) {
            if let Some(action) = UndoableAction::remove_at(&annotations.strokes, index) {
                self.execute(page, action);
                return 1;
            }
        }

        if let Some(index) = annotations.shape_at(&point, tolerance) {
            if let Some(annotations) = self.pages.get_mut(&page) {
                annotations.shapes.remove(index);
                self.dirty = true;
                return 1;
            }
        }
        0
    }

    /// Commit a selection drag as one undo step: selected strokes are
    /// replaced by moved copies, selected shapes are moved in place
    fn commit_move(&mut self, page: u32, dx: f32, dy: f32) {
        let Some((_, mut selection)) = self.selection.take() else {
            return;
        };
        let strokes = self.strokes(page);
        let indices = selection.stroke_indices(strokes);

        let mut actions = Vec::new();
        if !indices.is_empty() {
            let moved: Vec<Stroke> = indices
                .iter()
                .map(|&index| {
                    let mut stroke = strokes[index].clone();
                    stroke.translate(dx, dy);
                    stroke
                })
                .collect();
            if let UndoableAction::Batch(removals) = UndoableAction::remove_many(strokes, &indices) {
                actions.extend(removals);
            }
            actions.extend(moved.into_iter().map(UndoableAction::AddStroke));
        }
        if !selection.shape_ids.is_empty() {
            actions.push(UndoableAction::MoveShapes {
                ids: selection.shape_ids.iter().cloned().collect(),
                dx,
                dy,
            });
        }
        if !actions.is_empty() {
            self.execute(page, UndoableAction::Batch(actions));
        }

        // Strokes and shapes are already moved; only the lasso outline follows
        selection.translate(&mut [], &mut [], dx, dy);
        debug!(page, dx, dy, count = selection.len(), "selection moved");
        self.selection = Some((page, selection));
    }
}
