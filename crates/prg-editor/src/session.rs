//! Editing session: one project, its camera, history and clipboard.
//!
//! The session is the single entry point a host drives. Pointer events are
//! converted to world space, hit-tested against the stage and fed to the
//! interaction state machine; the resulting actions are applied to the
//! project through the command stack so that every gesture is one undo
//! step. Requests the session cannot satisfy itself (context menus) are
//! handed back to the host.

use crate::clipboard::{CopyEngine, SystemClipboard};
use crate::commands::CommandStack;
use crate::input::{InputEvent, PointerButton};
use crate::interaction::{EntityInteraction, Hit, InteractionAction, InteractionState};
use crate::viewport::{Camera, Viewport};
use prg_core::{ArchiveError, Entity, Point, Project, StageConfig, StageId, Vec2};
use std::path::Path;

/// Something the host has to do on the session's behalf.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionRequest {
    ContextMenu { entity: StageId, screen: Point },
}

pub struct Session {
    project: Project,
    pub camera: Camera,
    history: CommandStack,
    interaction: EntityInteraction,
    copy_engine: CopyEngine,
    clipboard: Box<dyn SystemClipboard>,
    /// Last known pointer position in world coordinates; paste target.
    pointer: Point,
}

impl Session {
    pub fn new(project: Project, clipboard: Box<dyn SystemClipboard>) -> Self {
        let config = project.config();
        let history = CommandStack::new(config.undo_depth);
        let interaction = EntityInteraction::new(config.context_menu_tolerance);
        Self {
            project,
            camera: Camera::default(),
            history,
            interaction,
            copy_engine: CopyEngine::new(),
            clipboard,
            pointer: Point::ZERO,
        }
    }

    /// Open a document file. Unreadable files give an empty project.
    pub fn open(path: &Path, config: StageConfig, clipboard: Box<dyn SystemClipboard>) -> Self {
        let mut session = Self::new(Project::open(path, config), clipboard);
        session.project.drain_events();
        session
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    /// Direct access for edits the session has no command for. These are
    /// not recorded in the history; prefer `execute`.
    pub fn project_mut(&mut self) -> &mut Project {
        &mut self.project
    }

    pub fn interaction_state(&self) -> InteractionState {
        self.interaction.state()
    }

    pub fn pointer(&self) -> Point {
        self.pointer
    }

    pub fn copy_engine(&self) -> &CopyEngine {
        &self.copy_engine
    }

    /// Run a project mutation as one undo step.
    pub fn execute<T>(&mut self, description: &str, f: impl FnOnce(&mut Project) -> T) -> T {
        self.history.execute(&mut self.project, description, f)
    }

    // ─── Pointer input ───────────────────────────────────────────────────

    pub fn handle_input(&mut self, event: &InputEvent) -> Vec<SessionRequest> {
        if let Some(screen) = event.position() {
            self.pointer = self.camera.to_world(screen);
        }

        let hit = match event {
            InputEvent::PointerDown { button, .. } => {
                let hit = self.hit_entity(self.pointer);
                if *button == PointerButton::Primary {
                    self.select_for_drag(hit.map(|h| h.id));
                }
                hit
            }
            _ => None,
        };

        let mut actions = self.interaction.handle(event, hit, &self.camera);

        // Linking has no enter events from the host: synthesize one when
        // the pointer moves over another entity.
        if let (InputEvent::PointerMove { .. }, InteractionState::Linking { entity, .. }) =
            (event, self.interaction.state())
            && let Some(target) = self.link_target(entity, self.pointer)
        {
            let enter = InputEvent::PointerEnter { target };
            actions.extend(self.interaction.handle(&enter, None, &self.camera));
        }

        actions
            .into_iter()
            .filter_map(|action| self.apply(action))
            .collect()
    }

    /// Topmost entity under `world` that `source` may link to. Sections
    /// enclosing the source, and entities inside it, are passed over.
    fn link_target(&self, source: StageId, world: Point) -> Option<StageId> {
        self.project.entities_at(world).into_iter().find(|target| {
            *target != source
                && !self.project.is_entity_in_section(source, *target)
                && !self.project.is_entity_in_section(*target, source)
        })
    }

    fn hit_entity(&self, world: Point) -> Option<Hit> {
        let id = self.project.hit_test_entity(world)?;
        let entity = self.project.entity(id)?;
        Some(Hit {
            id,
            location: entity.rect().origin(),
        })
    }

    /// Pressing an unselected entity makes it the only selection; pressing
    /// empty canvas clears the selection.
    fn select_for_drag(&mut self, id: Option<StageId>) {
        match id {
            Some(id) if self.project.get(id).is_some_and(|o| o.is_selected()) => {}
            Some(id) => {
                self.project.clear_selection();
                self.project.set_selected(id, true);
            }
            None => self.project.clear_selection(),
        }
    }

    fn apply(&mut self, action: InteractionAction) -> Option<SessionRequest> {
        match action {
            InteractionAction::MoveStarted { .. } => {
                self.history.begin_batch(&self.project);
            }
            InteractionAction::MoveEntityTo { entity, location } => {
                self.drag_to(entity, location);
            }
            InteractionAction::MoveFinished { entity } => {
                log::debug!("finished moving {entity}");
                self.history.end_batch(&self.project, "move entities");
            }
            InteractionAction::CreateEdge { from, to } => {
                match self.history.execute(&mut self.project, "connect", |p| p.connect(from, to)) {
                    Ok(Some(edge)) => log::info!("connected {from} -> {to} as {edge}"),
                    Ok(None) => log::debug!("{from} -> {to} already connected"),
                    Err(e) => log::warn!("cannot connect {from} -> {to}: {e}"),
                }
            }
            InteractionAction::OpenContextMenu { entity, screen } => {
                return Some(SessionRequest::ContextMenu { entity, screen });
            }
        }
        None
    }

    /// The dragged entity lands on `location`; the rest of the selection
    /// follows by the same delta.
    fn drag_to(&mut self, entity: StageId, location: Point) {
        let Some(origin) = self.project.entity(entity).map(|e| e.rect().origin()) else {
            log::warn!("dragged entity {entity} is gone");
            return;
        };
        let delta: Vec2 = location - origin;
        if delta == Vec2::ZERO {
            return;
        }
        let selected = self.project.get(entity).is_some_and(|o| o.is_selected());
        if selected {
            self.project.move_selected_entities(delta);
        } else if let Err(e) = self.project.move_entity(entity, delta) {
            log::warn!("cannot move {entity}: {e}");
        }
    }

    // ─── Edit commands ───────────────────────────────────────────────────

    pub fn undo(&mut self) -> Option<String> {
        self.history.undo(&mut self.project)
    }

    pub fn redo(&mut self) -> Option<String> {
        self.history.redo(&mut self.project)
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Returns the number of copied objects; failures are logged.
    pub fn copy(&mut self) -> usize {
        match self.copy_engine.copy(&mut self.project, self.clipboard.as_mut()) {
            Ok(n) => n,
            Err(e) => {
                log::warn!("copy failed: {e}");
                0
            }
        }
    }

    pub fn cut(&mut self) -> usize {
        let engine = &mut self.copy_engine;
        let clipboard = self.clipboard.as_mut();
        let result = self
            .history
            .execute(&mut self.project, "cut", |p| engine.cut(p, clipboard));
        match result {
            Ok(n) => n,
            Err(e) => {
                log::warn!("cut failed: {e}");
                0
            }
        }
    }

    /// Paste at the last pointer position.
    pub fn paste(&mut self) -> Vec<StageId> {
        self.paste_at(self.pointer)
    }

    pub fn paste_at(&mut self, at: Point) -> Vec<StageId> {
        let engine = &mut self.copy_engine;
        let clipboard = self.clipboard.as_mut();
        self.history
            .execute(&mut self.project, "paste", |p| engine.paste(p, clipboard, at))
    }

    pub fn delete_selected(&mut self) -> usize {
        let ids = self.project.selected_ids();
        if ids.is_empty() {
            return 0;
        }
        self.history
            .execute(&mut self.project, "delete", |p| p.remove_many(&ids))
    }

    pub fn select_all(&mut self) {
        for id in self.project.stage().entity_ids() {
            if !self.project.is_hidden_by_collapse(id) {
                self.project.set_selected(id, true);
            }
        }
    }

    pub fn save(&mut self, path: &Path) -> Result<(), ArchiveError> {
        self.project.save(path)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("project", &self.project)
            .field("camera", &self.camera)
            .field("interaction", &self.interaction)
            .finish_non_exhaustive()
    }
}
