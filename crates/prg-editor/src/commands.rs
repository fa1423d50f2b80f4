//! Undo/Redo command stack.
//!
//! Every undoable step is a pair of encoded stage snapshots (before and
//! after). Undo restores `before`, redo restores `after`; the project
//! re-derives all geometry on restore, so no per-mutation inverse exists.
//!
//! Drag gestures use **batching**: the snapshot is captured when the gesture
//! starts and closed when it ends, so the whole drag is one undo step.

use prg_core::Project;

#[derive(Debug, Clone)]
pub struct Command {
    before: Vec<u8>,
    after: Vec<u8>,
    pub description: String,
}

/// Manages undo/redo stacks with batch grouping for drag gestures.
#[derive(Debug)]
pub struct CommandStack {
    undo_stack: Vec<Command>,
    redo_stack: Vec<Command>,
    max_depth: usize,
    /// Batch nesting depth (0 = not batching).
    batch_depth: usize,
    /// Snapshot captured at the start of the outermost batch.
    batch_snapshot: Option<Vec<u8>>,
}

impl CommandStack {
    pub fn new(max_depth: usize) -> Self {
        Self {
            undo_stack: Vec::with_capacity(max_depth.min(256)),
            redo_stack: Vec::new(),
            max_depth,
            batch_depth: 0,
            batch_snapshot: None,
        }
    }

    /// Start a batch group. Mutations until the matching `end_batch` become
    /// one undo step.
    pub fn begin_batch(&mut self, project: &Project) {
        if self.batch_depth == 0 {
            self.batch_snapshot = snapshot(project);
        }
        self.batch_depth += 1;
    }

    /// Close a batch group. When the outermost batch closes and the stage
    /// actually changed, one command is pushed.
    pub fn end_batch(&mut self, project: &Project, description: &str) {
        if self.batch_depth == 0 {
            return;
        }
        self.batch_depth -= 1;
        if self.batch_depth > 0 {
            return;
        }
        if let (Some(before), Some(after)) = (self.batch_snapshot.take(), snapshot(project)) {
            self.push(before, after, description);
        }
    }

    pub fn is_batching(&self) -> bool {
        self.batch_depth > 0
    }

    /// Run `f` against the project as one undo step. Inside a batch the
    /// mutation is folded into the batch instead.
    pub fn execute<T>(
        &mut self,
        project: &mut Project,
        description: &str,
        f: impl FnOnce(&mut Project) -> T,
    ) -> T {
        if self.batch_depth > 0 {
            return f(project);
        }
        let before = snapshot(project);
        let result = f(project);
        if let (Some(before), Some(after)) = (before, snapshot(project)) {
            self.push(before, after, description);
        }
        result
    }

    fn push(&mut self, before: Vec<u8>, after: Vec<u8>, description: &str) {
        if before == after {
            return;
        }
        self.undo_stack.push(Command {
            before,
            after,
            description: description.to_string(),
        });
        if self.undo_stack.len() > self.max_depth {
            self.undo_stack.remove(0);
        }
        // Clear redo stack on new action
        self.redo_stack.clear();
    }

    /// Undo the last command. Returns its description.
    pub fn undo(&mut self, project: &mut Project) -> Option<String> {
        let cmd = self.undo_stack.pop()?;
        if let Err(e) = project.restore_snapshot(&cmd.before) {
            log::warn!("undo of \"{}\" failed: {e}", cmd.description);
            self.undo_stack.push(cmd);
            return None;
        }
        let desc = cmd.description.clone();
        self.redo_stack.push(cmd);
        Some(desc)
    }

    /// Redo the last undone command. Returns its description.
    pub fn redo(&mut self, project: &mut Project) -> Option<String> {
        let cmd = self.redo_stack.pop()?;
        if let Err(e) = project.restore_snapshot(&cmd.after) {
            log::warn!("redo of \"{}\" failed: {e}", cmd.description);
            self.redo_stack.push(cmd);
            return None;
        }
        let desc = cmd.description.clone();
        self.undo_stack.push(cmd);
        Some(desc)
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

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.batch_depth = 0;
        self.batch_snapshot = None;
    }
}

fn snapshot(project: &Project) -> Option<Vec<u8>> {
    match project.snapshot() {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            log::warn!("cannot snapshot stage for history: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prg_core::{Point, Vec2};

    #[test]
    fn undo_redo_single_step() {
        let mut project = Project::default();
        let mut stack = CommandStack::new(10);
        let id = stack
            .execute(&mut project, "add node", |p| p.add_text_node("a", Point::ZERO))
            .unwrap();
        assert!(stack.can_undo());

        assert_eq!(stack.undo(&mut project).as_deref(), Some("add node"));
        assert!(project.get(id).is_none());
        assert!(stack.can_redo());

        assert_eq!(stack.redo(&mut project).as_deref(), Some("add node"));
        assert!(project.get(id).is_some());
    }

    #[test]
    fn batch_collapses_drag_into_one_step() {
        let mut project = Project::default();
        let mut stack = CommandStack::new(10);
        let id = project.add_text_node("a", Point::ZERO).unwrap();

        stack.begin_batch(&project);
        for _ in 0..5 {
            stack
                .execute(&mut project, "move", |p| p.move_entity(id, Vec2::new(10.0, 0.0)))
                .unwrap();
        }
        stack.end_batch(&project, "drag");
        assert_eq!(stack.undo_len(), 1);

        stack.undo(&mut project);
        let rect = project.get(id).unwrap().bounding_rect();
        assert_eq!(rect.origin(), Point::ZERO);
    }

    #[test]
    fn unchanged_stage_pushes_nothing() {
        let mut project = Project::default();
        let mut stack = CommandStack::new(10);
        stack.begin_batch(&project);
        stack.end_batch(&project, "noop");
        stack.execute(&mut project, "noop", |_| ());
        assert!(!stack.can_undo());
    }

    #[test]
    fn depth_is_bounded() {
        let mut project = Project::default();
        let mut stack = CommandStack::new(3);
        for i in 0..5 {
            stack
                .execute(&mut project, "add", |p| p.add_text_node("n", Point::new(i as f64 * 200.0, 0.0)))
                .unwrap();
        }
        assert_eq!(stack.undo_len(), 3);
    }

    #[test]
    fn new_action_clears_redo() {
        let mut project = Project::default();
        let mut stack = CommandStack::new(10);
        stack
            .execute(&mut project, "add", |p| p.add_text_node("a", Point::ZERO))
            .unwrap();
        stack.undo(&mut project);
        assert!(stack.can_redo());
        stack
            .execute(&mut project, "add", |p| p.add_text_node("b", Point::ZERO))
            .unwrap();
        assert!(!stack.can_redo());
    }
}
