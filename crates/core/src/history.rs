//! Undo/redo for a page's annotations
//!
//! Command history over a [`PageAnnotations`] owned by the caller. Stroke
//! additions and removals are recorded, as are shape moves so a lasso drag
//! undoes as one step. The manager never holds a reference to the page or
//! to storage; every operation takes the page it mutates.

use crate::annotation::{AnnotationId, PageAnnotations, Stroke};
use std::collections::VecDeque;
use tracing::trace;

/// Default number of undo steps retained
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// A reversible edit of a page
#[derive(Debug, Clone, PartialEq)]
pub enum UndoableAction {
    /// Append a stroke
    AddStroke(Stroke),

    /// Remove the stroke found at `index`
    RemoveStroke { stroke: Stroke, index: usize },

    /// Translate the shapes with these ids
    MoveShapes { ids: Vec<AnnotationId>, dx: f32, dy: f32 },

    /// Several actions applied as one user-visible step
    Batch(Vec<UndoableAction>),
}

impl UndoableAction {
    /// Build a removal action for the stroke currently at `index`
    pub fn remove_at(strokes: &[Stroke], index: usize) -> Option<Self> {
        strokes
            .get(index)
            .map(|stroke| UndoableAction::RemoveStroke { stroke: stroke.clone(), index })
    }

    /// Removal of several strokes as one batch
    ///
    /// Removals are ordered from the highest index down so each recorded
    /// index is still valid when the batch is replayed.
    pub fn remove_many(strokes: &[Stroke], indices: &[usize]) -> Self {
        let mut sorted: Vec<usize> = indices.to_vec();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        sorted.dedup();
        UndoableAction::Batch(
            sorted
                .into_iter()
                .filter_map(|index| UndoableAction::remove_at(strokes, index))
                .collect(),
        )
    }

    /// Forward effect, returning the action as it actually took place
    ///
    /// Removals of strokes that are gone and moves of shapes that are gone
    /// are dropped, so reverting the result never invents annotations.
    fn apply(&self, page: &mut PageAnnotations) -> Option<UndoableAction> {
        match self {
            UndoableAction::AddStroke(stroke) => {
                page.strokes.push(stroke.clone());
                Some(self.clone())
            }
            UndoableAction::RemoveStroke { stroke, index } => {
                let position = locate(&page.strokes, &stroke.id, *index)?;
                let removed = page.strokes.remove(position);
                Some(UndoableAction::RemoveStroke { stroke: removed, index: position })
            }
            UndoableAction::MoveShapes { ids, dx, dy } => {
                let present: Vec<AnnotationId> = ids
                    .iter()
                    .filter(|id| page.shapes.iter().any(|shape| &shape.id == *id))
                    .cloned()
                    .collect();
                if present.is_empty() {
                    return None;
                }
                move_shapes(page, &present, *dx, *dy);
                Some(UndoableAction::MoveShapes { ids: present, dx: *dx, dy: *dy })
            }
            UndoableAction::Batch(actions) => {
                let applied: Vec<UndoableAction> =
                    actions.iter().filter_map(|action| action.apply(page)).collect();
                (!applied.is_empty()).then_some(UndoableAction::Batch(applied))
            }
        }
    }

    /// Inverse effect
    fn revert(&self, page: &mut PageAnnotations) {
        match self {
            UndoableAction::AddStroke(stroke) => {
                if let Some(position) = page.strokes.iter().rposition(|s| s.id == stroke.id) {
                    page.strokes.remove(position);
                }
            }
            UndoableAction::RemoveStroke { stroke, index } => {
                // Already restored
                if page.strokes.iter().any(|s| s.id == stroke.id) {
                    return;
                }
                let position = (*index).min(page.strokes.len());
                page.strokes.insert(position, stroke.clone());
            }
            UndoableAction::MoveShapes { ids, dx, dy } => move_shapes(page, ids, -dx, -dy),
            UndoableAction::Batch(actions) => {
                for action in actions.iter().rev() {
                    action.revert(page);
                }
            }
        }
    }
}

fn move_shapes(page: &mut PageAnnotations, ids: &[AnnotationId], dx: f32, dy: f32) {
    for shape in page.shapes.iter_mut().filter(|shape| ids.contains(&shape.id)) {
        shape.translate(dx, dy);
    }
}

/// Index of the stroke with `id`, preferring the recorded position
fn locate(strokes: &[Stroke], id: &AnnotationId, hint: usize) -> Option<usize> {
    match strokes.get(hint) {
        Some(stroke) if &stroke.id == id => Some(hint),
        _ => strokes.iter().position(|s| &s.id == id),
    }
}

/// Bounded undo/redo stacks
///
/// New actions clear the redo stack, so history never branches.
#[derive(Debug, Clone)]
pub struct UndoRedoManager {
    undo_stack: VecDeque<UndoableAction>,
    redo_stack: Vec<UndoableAction>,
    capacity: usize,
}

impl UndoRedoManager {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    /// Create a manager keeping at most `capacity` undo steps (minimum 1)
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    /// Apply an action and record it
    ///
    /// An action that changes nothing is not recorded and leaves the redo
    /// stack alone.
    pub fn execute(&mut self, action: UndoableAction, page: &mut PageAnnotations) {
        let Some(applied) = action.apply(page) else {
            trace!("action had no effect");
            return;
        };
        self.undo_stack.push_back(applied);
        while self.undo_stack.len() > self.capacity {
            self.undo_stack.pop_front();
        }
        self.redo_stack.clear();
        trace!(undo = self.undo_stack.len(), "executed action");
    }

    /// Revert the most recent action. Returns `false` if there is none.
    pub fn undo(&mut self, page: &mut PageAnnotations) -> bool {
        let Some(action) = self.undo_stack.pop_back() else {
            return false;
        };
        action.revert(page);
        self.redo_stack.push(action);
        trace!(undo = self.undo_stack.len(), redo = self.redo_stack.len(), "undo");
        true
    }

    /// Re-apply the most recently undone action. Returns `false` if there is none.
    pub fn redo(&mut self, page: &mut PageAnnotations) -> bool {
        let Some(action) = self.redo_stack.pop() else {
            return false;
        };
        if let Some(applied) = action.apply(page) {
            self.undo_stack.push_back(applied);
        }
        trace!(undo = self.undo_stack.len(), redo = self.redo_stack.len(), "redo");
        true
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop all history
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

impl Default for UndoRedoManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{PagePoint, ShapeAnnotation, ShapeKind, StrokePoint};
    use crate::color::Color;

    fn stroke(name: &str) -> Stroke {
        let mut stroke = Stroke::new(
            0,
            vec![StrokePoint::new(0.0, 0.0, 1.0, 0), StrokePoint::new(1.0, 1.0, 1.0, 1)],
            Color::BLACK,
            2.0,
        );
        stroke.id = AnnotationId::from(name);
        stroke
    }

    fn page(strokes: Vec<Stroke>) -> PageAnnotations {
        PageAnnotations { strokes, shapes: Vec::new() }
    }

    fn ids(strokes: &[Stroke]) -> Vec<&str> {
        strokes.iter().map(|s| s.id.as_str()).collect()
    }

    #[test]
    fn test_add_undo_redo_scenario() {
        let mut manager = UndoRedoManager::new();
        let mut list = PageAnnotations::default();

        for name in ["A", "B", "C"] {
            manager.execute(UndoableAction::AddStroke(stroke(name)), &mut list);
        }

        assert!(manager.undo(&mut list));
        assert_eq!(ids(&list.strokes), ["A", "B"]);

        assert!(manager.redo(&mut list));
        assert_eq!(ids(&list.strokes), ["A", "B", "C"]);

        assert!(manager.undo(&mut list));
        assert!(manager.undo(&mut list));
        assert_eq!(ids(&list.strokes), ["A"]);
    }

    #[test]
    fn test_empty_stacks_are_noops() {
        let mut manager = UndoRedoManager::new();
        let mut list = page(vec![stroke("A")]);
        assert!(!manager.undo(&mut list));
        assert!(!manager.redo(&mut list));
        assert_eq!(ids(&list.strokes), ["A"]);
    }

    #[test]
    fn test_new_action_clears_redo() {
        let mut manager = UndoRedoManager::new();
        let mut list = PageAnnotations::default();
        manager.execute(UndoableAction::AddStroke(stroke("A")), &mut list);
        manager.undo(&mut list);
        assert!(manager.can_redo());

        manager.execute(UndoableAction::AddStroke(stroke("B")), &mut list);
        assert!(!manager.can_redo());
        assert!(!manager.redo(&mut list));
        assert_eq!(ids(&list.strokes), ["B"]);
    }

    #[test]
    fn test_remove_restores_original_index() {
        let mut manager = UndoRedoManager::new();
        let mut list = page(vec![stroke("A"), stroke("B"), stroke("C")]);

        let action = UndoableAction::remove_at(&list.strokes, 1).unwrap();
        manager.execute(action, &mut list);
        assert_eq!(ids(&list.strokes), ["A", "C"]);

        manager.undo(&mut list);
        assert_eq!(ids(&list.strokes), ["A", "B", "C"]);
    }

    #[test]
    fn test_batch_replace_is_atomic() {
        let mut manager = UndoRedoManager::new();
        let mut list = page(vec![stroke("A"), stroke("B"), stroke("C"), stroke("D")]);
        let original = list.clone();

        let UndoableAction::Batch(mut actions) = UndoableAction::remove_many(&list.strokes, &[1, 3])
        else {
            unreachable!()
        };
        actions.push(UndoableAction::AddStroke(stroke("X")));
        actions.push(UndoableAction::AddStroke(stroke("Y")));
        manager.execute(UndoableAction::Batch(actions), &mut list);
        assert_eq!(ids(&list.strokes), ["A", "C", "X", "Y"]);
        assert_eq!(manager.undo_len(), 1);

        manager.undo(&mut list);
        assert_eq!(list, original);

        manager.redo(&mut list);
        assert_eq!(ids(&list.strokes), ["A", "C", "X", "Y"]);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut manager = UndoRedoManager::with_capacity(2);
        let mut list = PageAnnotations::default();
        for name in ["A", "B", "C"] {
            manager.execute(UndoableAction::AddStroke(stroke(name)), &mut list);
        }
        assert_eq!(manager.undo_len(), 2);
        assert!(manager.undo(&mut list));
        assert!(manager.undo(&mut list));
        assert!(!manager.undo(&mut list));
        assert_eq!(ids(&list.strokes), ["A"]);
    }

    #[test]
    fn test_undo_all_redo_all_restores_list() {
        let mut manager = UndoRedoManager::new();
        let mut list = page(vec![stroke("seed-1"), stroke("seed-2")]);

        manager.execute(UndoableAction::AddStroke(stroke("A")), &mut list);
        manager.execute(UndoableAction::remove_at(&list.strokes, 0).unwrap(), &mut list);
        manager.execute(UndoableAction::AddStroke(stroke("B")), &mut list);
        manager.execute(UndoableAction::remove_many(&list.strokes, &[0, 2]), &mut list);
        manager.execute(UndoableAction::AddStroke(stroke("C")), &mut list);
        let after = list.clone();

        let mut undone = 0;
        while manager.undo(&mut list) {
            undone += 1;
        }
        assert_eq!(ids(&list.strokes), ["seed-1", "seed-2"]);

        for _ in 0..undone {
            assert!(manager.redo(&mut list));
        }
        assert_eq!(list, after);
    }

    #[test]
    fn test_removal_of_missing_stroke_undoes_to_nothing() {
        let mut manager = UndoRedoManager::new();
        let mut list = page(vec![stroke("A")]);
        let ghost = UndoableAction::RemoveStroke { stroke: stroke("ghost"), index: 0 };
        let duplicate = UndoableAction::RemoveStroke { stroke: stroke("A"), index: 0 };

        manager.execute(ghost, &mut list);
        assert_eq!(ids(&list.strokes), ["A"]);
        assert_eq!(manager.undo_len(), 0);
        assert!(!manager.undo(&mut list));
        assert_eq!(ids(&list.strokes), ["A"]);

        // Stroke already present: revert leaves it alone
        duplicate.revert(&mut list);
        assert_eq!(ids(&list.strokes), ["A"]);
    }

    #[test]
    fn test_shape_move_batches_with_strokes() {
        let mut manager = UndoRedoManager::new();
        let shape = ShapeAnnotation::new(
            0,
            ShapeKind::Rectangle,
            PagePoint::new(40.0, 40.0),
            PagePoint::new(60.0, 70.0),
            Color::BLACK,
            2.0,
        );
        let shape_id = shape.id.clone();
        let mut list = PageAnnotations { strokes: vec![stroke("A")], shapes: vec![shape] };
        let original = list.clone();

        let action = UndoableAction::Batch(vec![
            UndoableAction::remove_at(&list.strokes, 0).unwrap(),
            UndoableAction::AddStroke(stroke("A-moved")),
            UndoableAction::MoveShapes { ids: vec![shape_id], dx: 50.0, dy: 40.0 },
        ]);
        manager.execute(action, &mut list);
        assert_eq!(list.shapes[0].start(), PagePoint::new(90.0, 80.0));
        assert_eq!(ids(&list.strokes), ["A-moved"]);

        manager.undo(&mut list);
        assert_eq!(list, original);

        manager.redo(&mut list);
        assert_eq!(list.shapes[0].end(), PagePoint::new(110.0, 110.0));
    }
}
