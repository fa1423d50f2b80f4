//! The document aggregate.
//!
//! A `Project` exclusively owns the stage, attachments, tags and
//! back-references of one open document. Every mutation goes through it so
//! that the derived state stays consistent in the same call:
//!
//! - section rectangles follow their children (bottom-up),
//! - associations follow their members,
//! - selection outlines follow their object.
//!
//! Renderers observe the project by draining `StageEvent`s.

use crate::archive::{self, ArchiveRef};
use crate::attachment::Attachment;
use crate::association::{Association, Endpoint, Member};
use crate::config::{MonospaceMeasure, RenderToggles, StageConfig, TextMeasure};
use crate::edge::{LineEdge, RATE_CENTER};
use crate::entity::{Details, Entity, TextNode};
use crate::error::{ArchiveError, StageError};
use crate::geometry::{Line, Point, Rect, Vec2, rects_overlap};
use crate::id::{AttachmentId, StageId};
use crate::model::StageObject;
use crate::multi_edge::MultiTargetUndirectedEdge;
use crate::references::References;
use crate::section::Section;
use crate::stage::Stage;
use petgraph::algo::{has_path_connecting, toposort};
use petgraph::graphmap::DiGraphMap;
use petgraph::visit::{Dfs, Reversed};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

/// Save state shown to the user before closing a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectState {
    Unsaved,
    /// Written to the crash-recovery stash but not to the real file.
    Stashed,
    Saved,
}

/// Notifications for the renderer and viewport overlay.
#[derive(Debug, Clone, PartialEq)]
pub enum StageEvent {
    Attached(StageId),
    Detached(StageId),
    OutlineCreated { id: StageId, rect: Rect },
    OutlineRemoved(StageId),
    GeometryChanged(StageId),
    StateChanged(ProjectState),
    RenderTogglesChanged(RenderToggles),
}

/// Selection outlines, at most one per object.
#[derive(Debug, Clone, Default)]
pub struct SelectionOverlay {
    outlines: BTreeMap<StageId, Rect>,
}

impl SelectionOverlay {
    pub fn outline(&self, id: StageId) -> Option<Rect> {
        self.outlines.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.outlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outlines.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (StageId, Rect)> + '_ {
        self.outlines.iter().map(|(id, r)| (*id, *r))
    }

    fn show(&mut self, id: StageId, rect: Rect) {
        self.outlines.insert(id, rect);
    }

    fn hide(&mut self, id: StageId) -> bool {
        self.outlines.remove(&id).is_some()
    }
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    stage: &'a [StageObject],
    tags: &'a [StageId],
}

#[derive(Deserialize)]
struct Snapshot {
    stage: Vec<StageObject>,
    tags: Vec<StageId>,
}

#[derive(Debug)]
pub struct Project {
    stage: Stage,
    tags: Vec<StageId>,
    attachments: BTreeMap<AttachmentId, Attachment>,
    references: References,
    state: ProjectState,
    config: StageConfig,
    measure: Box<dyn TextMeasure>,
    overlay: SelectionOverlay,
    events: Vec<StageEvent>,
}

impl Default for Project {
    fn default() -> Self {
        Self::new(StageConfig::default())
    }
}

impl Project {
    pub fn new(config: StageConfig) -> Self {
        Self {
            stage: Stage::new(),
            tags: Vec::new(),
            attachments: BTreeMap::new(),
            references: References::default(),
            state: ProjectState::Unsaved,
            config,
            measure: Box::new(MonospaceMeasure),
            overlay: SelectionOverlay::default(),
            events: Vec::new(),
        }
    }

    /// Swap the text measurer and re-derive every text-dependent size.
    pub fn with_text_measure(mut self, measure: Box<dyn TextMeasure>) -> Self {
        self.measure = measure;
        for id in self.stage.entity_ids() {
            self.refresh_text_size(id);
        }
        self.recompute_all();
        self
    }

    // ─── Accessors ───────────────────────────────────────────────────────

    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    pub fn get(&self, id: StageId) -> Option<&StageObject> {
        self.stage.get(id)
    }

    pub fn entity(&self, id: StageId) -> Option<&dyn Entity> {
        self.stage.get(id).and_then(StageObject::as_entity)
    }

    pub fn section(&self, id: StageId) -> Option<&Section> {
        self.stage.get(id).and_then(StageObject::as_section)
    }

    pub fn edge(&self, id: StageId) -> Option<&LineEdge> {
        self.stage.get(id).and_then(StageObject::as_edge)
    }

    pub fn tags(&self) -> &[StageId] {
        &self.tags
    }

    pub fn attachments(&self) -> &BTreeMap<AttachmentId, Attachment> {
        &self.attachments
    }

    pub fn attachment(&self, id: AttachmentId) -> Option<&Attachment> {
        self.attachments.get(&id)
    }

    pub fn references(&self) -> &References {
        &self.references
    }

    pub fn references_mut(&mut self) -> &mut References {
        self.touch();
        &mut self.references
    }

    pub fn state(&self) -> ProjectState {
        self.state
    }

    pub fn overlay(&self) -> &SelectionOverlay {
        &self.overlay
    }

    /// Take all queued events, oldest first.
    pub fn drain_events(&mut self) -> Vec<StageEvent> {
        std::mem::take(&mut self.events)
    }

    // ─── State & settings ────────────────────────────────────────────────

    pub fn mark_saved(&mut self) {
        self.set_state(ProjectState::Saved);
    }

    pub fn mark_stashed(&mut self) {
        self.set_state(ProjectState::Stashed);
    }

    fn touch(&mut self) {
        self.set_state(ProjectState::Unsaved);
    }

    fn set_state(&mut self, state: ProjectState) {
        if self.state != state {
            self.state = state;
            self.events.push(StageEvent::StateChanged(state));
        }
    }

    pub fn set_render_toggles(&mut self, toggles: RenderToggles) {
        if self.config.render_toggles != toggles {
            self.config.render_toggles = toggles;
            self.events.push(StageEvent::RenderTogglesChanged(toggles));
        }
    }

    // ─── Adding & removing ───────────────────────────────────────────────

    /// Attach a new object. Associations must reference existing
    /// connectable entities with the right arity; sections must reference
    /// existing entities.
    pub fn add(&mut self, obj: impl Into<StageObject>) -> Result<StageId, StageError> {
        let obj = obj.into();
        let id = obj.uuid();
        if self.stage.contains(id) {
            return Err(StageError::DuplicateId(id));
        }
        if let Some(assoc) = obj.as_association() {
            let count = assoc.members().len();
            if !assoc.accepts_arity(count) {
                return Err(StageError::Arity {
                    kind: obj.kind(),
                    expected: if obj.as_edge().is_some() { "exactly 2" } else { "at least 2" },
                    actual: count,
                });
            }
            for m in assoc.members() {
                self.check_connectable(m.id)?;
            }
        }
        if let Some(section) = obj.as_section() {
            for child in &section.children {
                if *child == id {
                    return Err(StageError::ContainmentCycle {
                        entity: id,
                        section: id,
                    });
                }
                if self.entity(*child).is_none() {
                    return Err(self.not_entity_error(*child));
                }
            }
        }
        self.stage.push(obj)?;
        self.integrate(&[id]);
        log::debug!("added {id}");
        Ok(id)
    }

    pub fn add_text_node(&mut self, text: &str, location: Point) -> Result<StageId, StageError> {
        self.add(TextNode::new(text, location))
    }

    /// Store a binary payload under a fresh id.
    pub fn add_attachment(&mut self, mime: &str, data: Vec<u8>) -> AttachmentId {
        let id = AttachmentId::new();
        self.attachments.insert(id, Attachment::new(mime, data));
        self.touch();
        id
    }

    /// Attach objects that were validated elsewhere (paste, undo). Invalid
    /// associations are dropped and unknown section children released;
    /// returns the ids that made it onto the stage.
    pub fn insert_objects(&mut self, objects: Vec<StageObject>) -> Vec<StageId> {
        let mut inserted = Vec::with_capacity(objects.len());
        for obj in objects {
            let id = obj.uuid();
            match self.stage.push(obj) {
                Ok(id) => inserted.push(id),
                Err(e) => log::warn!("not inserting {id}: {e}"),
            }
        }
        let dropped = self.drop_invalid_associations();
        inserted.retain(|id| !dropped.contains(id));
        self.prune_section_children();
        self.integrate(&inserted);
        inserted
    }

    /// Derive geometry for freshly pushed objects and announce them.
    fn integrate(&mut self, ids: &[StageId]) {
        for id in ids {
            self.refresh_text_size(*id);
        }
        self.after_geometry_change(ids.iter().copied());
        for id in ids {
            self.refresh_association(*id);
            self.events.push(StageEvent::Attached(*id));
        }
        self.touch();
    }

    /// Detach an object. Associations that lose a member below their arity
    /// go with it; sections release (not destroy) their children. Calling
    /// this again for the same id is a no-op returning `false`.
    pub fn remove(&mut self, id: StageId) -> bool {
        if !self.stage.contains(id) {
            return false;
        }
        let parents = self.stage.parents_of(id);
        for p in &parents {
            if let Some(section) = self.stage.get_mut(*p).and_then(StageObject::as_section_mut) {
                section.children.retain(|c| *c != id);
            }
        }
        if self.overlay.hide(id) {
            self.events.push(StageEvent::OutlineRemoved(id));
        }
        let Some(removed) = self.stage.remove(id) else {
            return false;
        };
        self.tags.retain(|t| *t != id);
        self.events.push(StageEvent::Detached(id));
        log::debug!("removed {} {id}", removed.kind());

        if removed.is_entity() {
            for assoc_id in self.stage.associations_of(id) {
                let keep = match self.stage.get_mut(assoc_id).and_then(StageObject::as_association_mut) {
                    Some(assoc) => {
                        assoc.remove_member(id);
                        assoc.accepts_arity(assoc.members().len())
                    }
                    None => continue,
                };
                if keep {
                    self.refresh_association(assoc_id);
                } else {
                    self.remove(assoc_id);
                }
            }
        }
        self.after_geometry_change(parents);
        self.touch();
        true
    }

    /// Remove several objects; returns how many were actually removed.
    pub fn remove_many(&mut self, ids: &[StageId]) -> usize {
        ids.iter().filter(|id| self.remove(**id)).count()
    }

    // ─── Tags ────────────────────────────────────────────────────────────

    pub fn add_tag(&mut self, id: StageId) -> bool {
        if !self.stage.contains(id) || self.tags.contains(&id) {
            return false;
        }
        self.tags.push(id);
        self.touch();
        true
    }

    pub fn remove_tag(&mut self, id: StageId) -> bool {
        let before = self.tags.len();
        self.tags.retain(|t| *t != id);
        let changed = self.tags.len() != before;
        if changed {
            self.touch();
        }
        changed
    }

    // ─── Selection ───────────────────────────────────────────────────────

    /// Select or deselect. Setting the current value is a no-op; otherwise
    /// exactly one outline is created or destroyed. Returns whether anything
    /// changed.
    pub fn set_selected(&mut self, id: StageId, selected: bool) -> bool {
        let pad = self.config.selection_outline_padding;
        let Some(obj) = self.stage.get_mut(id) else {
            return false;
        };
        if obj.is_selected() == selected {
            return false;
        }
        obj.set_selected_flag(selected);
        if selected {
            let rect = obj.bounding_rect().inflate(pad, pad);
            self.overlay.show(id, rect);
            self.events.push(StageEvent::OutlineCreated { id, rect });
        } else if self.overlay.hide(id) {
            self.events.push(StageEvent::OutlineRemoved(id));
        }
        true
    }

    pub fn clear_selection(&mut self) {
        for id in self.selected_ids() {
            self.set_selected(id, false);
        }
    }

    pub fn selected_ids(&self) -> Vec<StageId> {
        self.stage
            .iter()
            .filter(|o| o.is_selected())
            .map(StageObject::uuid)
            .collect()
    }

    pub fn selected_entities(&self) -> Vec<StageId> {
        self.stage
            .iter()
            .filter(|o| o.is_selected() && o.is_entity())
            .map(StageObject::uuid)
            .collect()
    }

    /// Destroy and recreate the outline of a selected object at its current
    /// bounds.
    fn refresh_outline(&mut self, id: StageId) {
        if !self.overlay.hide(id) {
            return;
        }
        self.events.push(StageEvent::OutlineRemoved(id));
        if let Some(obj) = self.stage.get(id) {
            let pad = self.config.selection_outline_padding;
            let rect = obj.bounding_rect().inflate(pad, pad);
            self.overlay.show(id, rect);
            self.events.push(StageEvent::OutlineCreated { id, rect });
        }
    }

    // ─── Editing ─────────────────────────────────────────────────────────

    pub fn set_text(&mut self, id: StageId, text: &str) -> Result<(), StageError> {
        let Some(obj) = self.stage.get_mut(id) else {
            return Err(StageError::MissingObject(id));
        };
        match obj {
            StageObject::TextNode(n) => n.text = text.to_string(),
            StageObject::Section(s) => s.text = text.to_string(),
            StageObject::LineEdge(e) => e.text = text.to_string(),
            StageObject::MultiTargetUndirectedEdge(e) => e.text = text.to_string(),
            other => {
                log::debug!("{} {id} has no text", other.kind());
                return Ok(());
            }
        }
        self.refresh_text_size(id);
        self.after_geometry_change([id]);
        self.refresh_association(id);
        self.touch();
        Ok(())
    }

    pub fn set_details(&mut self, id: StageId, details: Details) -> Result<(), StageError> {
        let entity = self
            .stage
            .get_mut(id)
            .ok_or(StageError::MissingObject(id))?
            .as_entity_mut()
            .ok_or(StageError::NotAnEntity(id))?;
        *entity.details_mut() = details;
        self.touch();
        Ok(())
    }

    /// Change the scale of an image, SVG or reference block by `diff`.
    pub fn scale_texture(&mut self, id: StageId, diff: f64) -> Result<(), StageError> {
        let texture = self
            .stage
            .get_mut(id)
            .ok_or(StageError::MissingObject(id))?
            .as_texture_mut()
            .ok_or(StageError::NotAnEntity(id))?;
        texture.scale_by(diff);
        self.after_geometry_change([id]);
        self.touch();
        Ok(())
    }

    // ─── Moving ──────────────────────────────────────────────────────────

    /// Move an entity by `delta`. Sections carry their whole subtree; parent
    /// sections and attached associations follow. With entity collision
    /// enabled, overlapping unrelated entities are pushed out of the way.
    pub fn move_entity(&mut self, id: StageId, delta: Vec2) -> Result<(), StageError> {
        self.translate_subtree(id, delta)?;
        if self.config.enable_entity_collision {
            self.push_away_overlapping(id);
        }
        self.touch();
        Ok(())
    }

    /// Move so that the entity's rect origin lands on `location`.
    pub fn move_entity_to(&mut self, id: StageId, location: Point) -> Result<(), StageError> {
        let rect = self.entity(id).ok_or(self.not_entity_error(id))?.rect();
        self.move_entity(id, location - rect.origin())
    }

    /// Move every selected entity once, skipping those already carried by a
    /// selected ancestor section.
    pub fn move_selected_entities(&mut self, delta: Vec2) {
        let selected = self.selected_entities();
        let graph = self.containment_graph();
        let roots: Vec<StageId> = selected
            .iter()
            .copied()
            .filter(|id| {
                !selected
                    .iter()
                    .any(|other| other != id && Self::reaches(&graph, *other, *id))
            })
            .collect();
        for id in roots {
            if let Err(e) = self.move_entity(id, delta) {
                log::warn!("cannot move {id}: {e}");
            }
        }
    }

    fn translate_subtree(&mut self, id: StageId, delta: Vec2) -> Result<(), StageError> {
        if self.entity(id).is_none() {
            return Err(self.not_entity_error(id));
        }
        let mut moved: BTreeSet<StageId> = self.descendants(id).into_iter().collect();
        moved.insert(id);
        for m in &moved {
            if let Some(e) = self.stage.get_mut(*m).and_then(StageObject::as_entity_mut) {
                e.translate(delta);
            }
        }
        self.after_geometry_change(moved);
        Ok(())
    }

    fn push_away_overlapping(&mut self, id: StageId) {
        let Some(rect) = self.entity(id).map(|e| e.rect()) else {
            return;
        };
        let graph = self.containment_graph();
        let mut related: BTreeSet<StageId> = Self::ancestors_in(&graph, id).into_iter().collect();
        related.extend(Self::descendants_in(&graph, id));
        related.insert(id);

        for other in self.stage.entity_ids() {
            if related.contains(&other) || self.is_hidden_by_collapse(other) {
                continue;
            }
            // Entities inside an unrelated section move with it.
            if Self::ancestors_in(&graph, other)
                .iter()
                .any(|a| !related.contains(a))
            {
                continue;
            }
            let Some(orect) = self.entity(other).map(|e| e.rect()) else {
                continue;
            };
            if !rects_overlap(rect, orect) {
                continue;
            }
            let push = separation(rect, orect);
            log::trace!("collision: pushing {other} by {push:?}");
            if let Err(e) = self.translate_subtree(other, push) {
                log::warn!("collision push failed for {other}: {e}");
            }
        }
    }

    // ─── Connections ─────────────────────────────────────────────────────

    /// Connect `from` → `to` with a straight centered edge. Returns `None`
    /// when an identical connection already exists or a connect point would
    /// connect to itself.
    pub fn connect(&mut self, from: StageId, to: StageId) -> Result<Option<StageId>, StageError> {
        self.connect_with_rates(from, to, RATE_CENTER, RATE_CENTER)
    }

    pub fn connect_with_rates(
        &mut self,
        from: StageId,
        to: StageId,
        source_rate: Vec2,
        target_rate: Vec2,
    ) -> Result<Option<StageId>, StageError> {
        self.check_connectable(from)?;
        self.check_connectable(to)?;
        if from == to && matches!(self.stage.get(from), Some(StageObject::ConnectPoint(_))) {
            return Ok(None);
        }
        if self.is_connected(from, to) {
            log::debug!("{from} -> {to} already connected");
            return Ok(None);
        }
        let edge = LineEdge::connect(from, to).with_rates(source_rate, target_rate);
        self.add(edge).map(Some)
    }

    /// Join several entities with one undirected hyper-edge. Fewer than two
    /// connectable entities is an error, and nothing is created.
    pub fn create_multi_target_edge(&mut self, ids: &[StageId]) -> Result<StageId, StageError> {
        let mut members: Vec<StageId> = Vec::new();
        for id in ids {
            if self.check_connectable(*id).is_ok() && !members.contains(id) {
                members.push(*id);
            }
        }
        if members.len() < 2 {
            return Err(StageError::TooFewEntities {
                needed: 2,
                actual: members.len(),
            });
        }
        let padding = members
            .iter()
            .flat_map(|m| self.hyper_edges_of(*m))
            .filter_map(|e| self.stage.get(e).and_then(StageObject::as_multi_edge))
            .map(|e| e.padding + 10.0)
            .fold(self.config.multi_edge_padding, f64::max);
        let edge = MultiTargetUndirectedEdge::new(members.into_iter().map(Member::new).collect(), padding)?;
        self.add(edge)
    }

    /// Reverse every edge in `ids`; non-edges are ignored.
    pub fn reverse_edges(&mut self, ids: &[StageId]) -> usize {
        let mut count = 0;
        for id in ids {
            if let Some(StageObject::LineEdge(e)) = self.stage.get_mut(*id) {
                e.reverse();
                count += 1;
                self.refresh_association(*id);
                self.refresh_outline(*id);
            }
        }
        if count > 0 {
            self.touch();
        }
        count
    }

    pub fn change_edge_target(&mut self, edge: StageId, target: StageId) -> Result<(), StageError> {
        self.check_connectable(target)?;
        match self.stage.get_mut(edge) {
            Some(StageObject::LineEdge(e)) => e.set_target(target),
            Some(_) => return Err(StageError::NotConnectable(edge)),
            None => return Err(StageError::MissingObject(edge)),
        }
        self.refresh_association(edge);
        self.refresh_outline(edge);
        self.touch();
        Ok(())
    }

    pub fn edges_from(&self, id: StageId) -> Vec<StageId> {
        self.stage
            .iter()
            .filter_map(StageObject::as_edge)
            .filter(|e| e.source() == Some(id))
            .map(|e| e.uuid)
            .collect()
    }

    pub fn edges_to(&self, id: StageId) -> Vec<StageId> {
        self.stage
            .iter()
            .filter_map(StageObject::as_edge)
            .filter(|e| e.target() == Some(id))
            .map(|e| e.uuid)
            .collect()
    }

    /// Whether a directed edge `from` → `to` exists.
    pub fn is_connected(&self, from: StageId, to: StageId) -> bool {
        self.stage
            .iter()
            .filter_map(StageObject::as_edge)
            .any(|e| e.source() == Some(from) && e.target() == Some(to))
    }

    pub fn hyper_edges_of(&self, id: StageId) -> Vec<StageId> {
        self.stage
            .iter()
            .filter_map(StageObject::as_multi_edge)
            .filter(|e| e.has_member(id))
            .map(|e| e.uuid)
            .collect()
    }

    fn check_connectable(&self, id: StageId) -> Result<(), StageError> {
        let entity = self.entity(id).ok_or(self.not_entity_error(id))?;
        if entity.allow_association() {
            Ok(())
        } else {
            Err(StageError::NotConnectable(id))
        }
    }

    fn not_entity_error(&self, id: StageId) -> StageError {
        if self.stage.contains(id) {
            StageError::NotAnEntity(id)
        } else {
            StageError::MissingObject(id)
        }
    }

    // ─── Sections ────────────────────────────────────────────────────────

    /// Wrap entities in a new section. Entities already inside another
    /// listed section stay where they are; the rest leave their current
    /// parents, and the new section takes their place in a parent they all
    /// shared.
    pub fn pack_into_section(&mut self, ids: &[StageId], title: &str) -> Result<StageId, StageError> {
        let graph = self.containment_graph();
        let mut entities: Vec<StageId> = Vec::new();
        for id in ids {
            if self.entity(*id).is_some() && !entities.contains(id) {
                entities.push(*id);
            }
        }
        let roots: Vec<StageId> = entities
            .iter()
            .copied()
            .filter(|id| {
                !entities
                    .iter()
                    .any(|other| other != id && Self::reaches(&graph, *other, *id))
            })
            .collect();
        if roots.is_empty() {
            return Err(StageError::TooFewEntities {
                needed: 1,
                actual: 0,
            });
        }

        let shared_parents: Vec<StageId> = self
            .stage
            .parents_of(roots[0])
            .into_iter()
            .filter(|p| roots.iter().all(|r| self.stage.parents_of(*r).contains(p)))
            .collect();
        for r in &roots {
            for p in self.stage.parents_of(*r) {
                if let Some(s) = self.stage.get_mut(p).and_then(StageObject::as_section_mut) {
                    s.children.retain(|c| c != r);
                }
            }
        }

        let section = Section::from_entities(title, roots);
        let id = self.add(section)?;
        for p in &shared_parents {
            if let Some(s) = self.stage.get_mut(*p).and_then(StageObject::as_section_mut) {
                s.children.push(id);
            }
        }
        self.after_geometry_change(shared_parents);
        Ok(id)
    }

    /// Make `ids` direct children of `section`.
    pub fn go_in_section(&mut self, ids: &[StageId], section: StageId) -> Result<(), StageError> {
        if self.section(section).is_none() {
            return Err(self.not_section_error(section));
        }
        for id in ids {
            if self.entity(*id).is_none() {
                return Err(self.not_entity_error(*id));
            }
            if *id == section || self.is_entity_in_section(section, *id) {
                return Err(StageError::ContainmentCycle {
                    entity: *id,
                    section,
                });
            }
        }
        if let Some(s) = self.stage.get_mut(section).and_then(StageObject::as_section_mut) {
            for id in ids {
                if !s.children.contains(id) {
                    s.children.push(*id);
                }
            }
        }
        self.after_geometry_change([section]);
        self.touch();
        Ok(())
    }

    /// Release `ids` from `section`. The entities stay on the stage.
    pub fn go_out_section(&mut self, ids: &[StageId], section: StageId) -> Result<(), StageError> {
        let s = self
            .stage
            .get_mut(section)
            .and_then(StageObject::as_section_mut)
            .ok_or(StageError::NotASection(section))?;
        s.children.retain(|c| !ids.contains(c));
        self.after_geometry_change([section]);
        self.touch();
        Ok(())
    }

    pub fn set_collapsed(&mut self, section: StageId, collapsed: bool) -> Result<(), StageError> {
        let s = self
            .stage
            .get_mut(section)
            .and_then(StageObject::as_section_mut)
            .ok_or(StageError::NotASection(section))?;
        if s.is_collapsed == collapsed {
            return Ok(());
        }
        s.is_collapsed = collapsed;
        self.after_geometry_change([section]);
        self.touch();
        Ok(())
    }

    pub fn set_section_hidden(&mut self, section: StageId, hidden: bool) -> Result<(), StageError> {
        let s = self
            .stage
            .get_mut(section)
            .and_then(StageObject::as_section_mut)
            .ok_or(StageError::NotASection(section))?;
        s.is_hidden = hidden;
        self.touch();
        Ok(())
    }

    fn not_section_error(&self, id: StageId) -> StageError {
        if self.stage.contains(id) {
            StageError::NotASection(id)
        } else {
            StageError::MissingObject(id)
        }
    }

    /// Whether `entity` lies anywhere inside `section`, through any depth of
    /// nested sections.
    pub fn is_entity_in_section(&self, entity: StageId, section: StageId) -> bool {
        Self::reaches(&self.containment_graph(), section, entity)
    }

    /// Sections listing `id` as a direct child.
    pub fn parent_sections(&self, id: StageId) -> Vec<StageId> {
        self.stage.parents_of(id)
    }

    /// All sections containing `id`, at any depth.
    pub fn ancestors(&self, id: StageId) -> Vec<StageId> {
        Self::ancestors_in(&self.containment_graph(), id)
    }

    /// Everything inside `section`, at any depth.
    pub fn descendants(&self, section: StageId) -> Vec<StageId> {
        Self::descendants_in(&self.containment_graph(), section)
    }

    /// Hidden because some enclosing section is collapsed.
    pub fn is_hidden_by_collapse(&self, id: StageId) -> bool {
        self.ancestors(id)
            .iter()
            .any(|a| self.section(*a).is_some_and(|s| s.is_collapsed))
    }

    /// Section → child edges for every section on the stage.
    fn containment_graph(&self) -> DiGraphMap<StageId, ()> {
        let mut graph = DiGraphMap::new();
        for obj in self.stage.iter() {
            if let Some(s) = obj.as_section() {
                graph.add_node(s.uuid);
                for c in &s.children {
                    graph.add_edge(s.uuid, *c, ());
                }
            }
        }
        graph
    }

    fn reaches(graph: &DiGraphMap<StageId, ()>, from: StageId, to: StageId) -> bool {
        from != to
            && graph.contains_node(from)
            && graph.contains_node(to)
            && has_path_connecting(graph, from, to, None)
    }

    fn ancestors_in(graph: &DiGraphMap<StageId, ()>, id: StageId) -> Vec<StageId> {
        Self::walk(Reversed(graph), graph, id)
    }

    fn descendants_in(graph: &DiGraphMap<StageId, ()>, id: StageId) -> Vec<StageId> {
        Self::walk(graph, graph, id)
    }

    fn walk<G>(g: G, graph: &DiGraphMap<StageId, ()>, start: StageId) -> Vec<StageId>
    where
        G: petgraph::visit::IntoNeighbors<NodeId = StageId> + petgraph::visit::Visitable,
    {
        if !graph.contains_node(start) {
            return Vec::new();
        }
        let mut dfs = Dfs::new(g, start);
        let mut out = Vec::new();
        while let Some(n) = dfs.next(g) {
            if n != start {
                out.push(n);
            }
        }
        out
    }

    /// Sections in child-before-parent order. Falls back to stage order if
    /// the containment relation has a cycle.
    fn sections_bottom_up(&self, graph: &DiGraphMap<StageId, ()>) -> Vec<StageId> {
        match toposort(graph, None) {
            Ok(mut order) => {
                order.reverse();
                order.retain(|id| self.section(*id).is_some());
                order
            }
            Err(cycle) => {
                log::warn!("section containment cycle through {:?}", cycle.node_id());
                self.stage
                    .iter()
                    .filter_map(StageObject::as_section)
                    .map(|s| s.uuid)
                    .collect()
            }
        }
    }

    // ─── Derived geometry ────────────────────────────────────────────────

    fn refresh_text_size(&mut self, id: StageId) {
        let measure = &*self.measure;
        let config = &self.config;
        match self.stage.get_mut(id) {
            Some(StageObject::TextNode(n)) => n.adjust_size(measure, config),
            Some(StageObject::MultiTargetUndirectedEdge(e)) => e.measure_text(measure, config),
            _ => {}
        }
    }

    fn adjust_section(&mut self, id: StageId) {
        let Some(section) = self.section(id) else {
            return;
        };
        let rects: Vec<Rect> = section
            .children
            .iter()
            .filter_map(|c| self.entity(*c).map(|e| e.rect()))
            .collect();
        let measure = &*self.measure;
        let config = &self.config;
        if let Some(s) = self.stage.get_mut(id).and_then(StageObject::as_section_mut) {
            s.adjust_location_and_size(&rects, measure, config);
        }
    }

    fn refresh_association(&mut self, id: StageId) {
        let Some(obj) = self.stage.get(id) else {
            return;
        };
        let lookup: HashMap<StageId, Endpoint> = obj
            .members()
            .iter()
            .filter_map(|m| self.stage.get(m.id)?.endpoint().map(|e| (m.id, e)))
            .collect();
        if let Some(assoc) = self.stage.get_mut(id).and_then(StageObject::as_association_mut) {
            assoc.on_members_change(&lookup);
        }
    }

    /// Propagate a geometry change of `changed`: re-fit every affected
    /// section bottom-up, then every association touching a changed object,
    /// then their outlines.
    fn after_geometry_change(&mut self, changed: impl IntoIterator<Item = StageId>) {
        let changed: BTreeSet<StageId> = changed.into_iter().collect();
        if changed.is_empty() {
            return;
        }
        let graph = self.containment_graph();
        let mut sections: BTreeSet<StageId> = BTreeSet::new();
        for id in &changed {
            if self.section(*id).is_some() {
                sections.insert(*id);
            }
            sections.extend(Self::ancestors_in(&graph, *id));
        }
        for s in self.sections_bottom_up(&graph) {
            if sections.contains(&s) {
                self.adjust_section(s);
            }
        }

        let mut touched: BTreeSet<StageId> = changed;
        touched.extend(sections);
        let associations: Vec<StageId> = self
            .stage
            .iter()
            .filter(|o| o.members().iter().any(|m| touched.contains(&m.id)))
            .map(StageObject::uuid)
            .collect();
        for a in &associations {
            self.refresh_association(*a);
        }
        touched.extend(associations);

        for id in touched {
            self.refresh_outline(id);
            self.events.push(StageEvent::GeometryChanged(id));
        }
    }

    fn drop_invalid_associations(&mut self) -> Vec<StageId> {
        let mut dropped = Vec::new();
        for id in self.stage.association_ids() {
            let Some(assoc) = self.stage.get(id).and_then(StageObject::as_association) else {
                continue;
            };
            let arity_ok = assoc.accepts_arity(assoc.members().len());
            let members_ok = assoc
                .members()
                .iter()
                .all(|m| self.check_connectable(m.id).is_ok());
            if !(arity_ok && members_ok) {
                log::warn!("dropping association {id} with missing or invalid members");
                self.stage.remove(id);
                self.tags.retain(|t| *t != id);
                dropped.push(id);
            }
        }
        dropped
    }

    fn prune_section_children(&mut self) {
        for id in self.stage.ids() {
            let Some(section) = self.section(id) else {
                continue;
            };
            let valid: Vec<StageId> = section
                .children
                .iter()
                .copied()
                .filter(|c| *c != id && self.entity(*c).is_some())
                .collect();
            if valid.len() != section.children.len() {
                log::warn!("section {id} released {} unknown children", section.children.len() - valid.len());
                if let Some(s) = self.stage.get_mut(id).and_then(StageObject::as_section_mut) {
                    s.children = valid;
                }
            }
        }
    }

    /// Rebuild every derived field: association validity, section children,
    /// label sizes, section rectangles and association paths.
    pub fn recompute_all(&mut self) {
        self.drop_invalid_associations();
        self.prune_section_children();
        for id in self.stage.association_ids() {
            self.refresh_text_size(id);
        }
        let graph = self.containment_graph();
        for s in self.sections_bottom_up(&graph) {
            self.adjust_section(s);
        }
        for id in self.stage.association_ids() {
            self.refresh_association(id);
        }
    }

    // ─── Queries ─────────────────────────────────────────────────────────

    /// Topmost object under `point`. Associations win over entities;
    /// entities inside collapsed sections are not hittable.
    pub fn hit_test(&self, point: Point) -> Option<StageId> {
        let assoc = self
            .stage
            .iter()
            .rev()
            .filter(|o| o.is_association())
            .find(|o| o.collision_box().contains_point(point));
        if let Some(a) = assoc {
            return Some(a.uuid());
        }
        self.stage
            .iter()
            .rev()
            .filter(|o| o.is_entity() && !self.is_hidden_by_collapse(o.uuid()))
            .find(|o| o.collision_box().contains_point(point))
            .map(StageObject::uuid)
    }

    /// Visible entities whose collision box contains `point`, topmost
    /// first. Associations are not considered.
    pub fn entities_at(&self, point: Point) -> Vec<StageId> {
        self.stage
            .iter()
            .rev()
            .filter(|o| o.is_entity() && !self.is_hidden_by_collapse(o.uuid()))
            .filter(|o| o.collision_box().contains_point(point))
            .map(StageObject::uuid)
            .collect()
    }

    /// Topmost visible entity under `point`, ignoring associations drawn
    /// over it.
    pub fn hit_test_entity(&self, point: Point) -> Option<StageId> {
        self.entities_at(point).into_iter().next()
    }

    /// Expanded, visible sections whose frame contains `point`, innermost
    /// first.
    pub fn sections_at(&self, point: Point) -> Vec<StageId> {
        let graph = self.containment_graph();
        let mut hits: Vec<(usize, StageId)> = self
            .stage
            .iter()
            .filter_map(StageObject::as_section)
            .filter(|s| !s.is_collapsed && s.normal_rect().contains(point))
            .filter(|s| !self.is_hidden_by_collapse(s.uuid))
            .map(|s| (Self::ancestors_in(&graph, s.uuid).len(), s.uuid))
            .collect();
        hits.sort_by(|a, b| b.0.cmp(&a.0));
        hits.into_iter().map(|(_, id)| id).collect()
    }

    /// Replace the selection with every visible object touching `rect`.
    pub fn select_by_rect(&mut self, rect: Rect) -> Vec<StageId> {
        let hits: Vec<StageId> = self
            .stage
            .iter()
            .filter(|o| !self.is_hidden_by_collapse(o.uuid()))
            .filter(|o| o.collision_box().intersects_rect(rect))
            .map(StageObject::uuid)
            .collect();
        self.clear_selection();
        for id in &hits {
            self.set_selected(*id, true);
        }
        hits
    }

    /// Associations crossed by a cutting stroke.
    pub fn cut_with_line(&self, line: Line) -> Vec<StageId> {
        self.stage
            .iter()
            .filter(|o| o.is_association())
            .filter(|o| o.collision_box().intersects_line(line))
            .map(StageObject::uuid)
            .collect()
    }

    /// FNV-1a hash of the encoded stage, for change detection by backups.
    /// The value only depends on the encoded bytes, so it is comparable
    /// across runs and builds.
    pub fn stage_hash(&self) -> Result<u64, ArchiveError> {
        const FNV1A_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const FNV1A_PRIME: u64 = 0x0000_0100_0000_01b3;
        let bytes = archive::encode_stage(self.stage.objects())?;
        Ok(bytes.iter().fold(FNV1A_OFFSET, |hash, b| {
            (hash ^ u64::from(*b)).wrapping_mul(FNV1A_PRIME)
        }))
    }

    // ─── Persistence ─────────────────────────────────────────────────────

    pub fn to_archive_bytes(&self) -> Result<Vec<u8>, ArchiveError> {
        archive::write_archive(ArchiveRef {
            stage: self.stage.objects(),
            tags: &self.tags,
            attachments: &self.attachments,
            references: &self.references,
        })
    }

    /// Strict load.
    pub fn try_from_archive_bytes(bytes: &[u8], config: StageConfig) -> Result<Self, ArchiveError> {
        let archive = archive::read_archive(bytes)?;
        let mut project = Project::new(config);
        project.stage = Stage::from_objects(archive.stage);
        project.tags = archive
            .tags
            .into_iter()
            .filter(|t| project.stage.contains(*t))
            .collect();
        project.attachments = archive.attachments;
        project.references = archive.references;
        project.recompute_all();
        project.state = ProjectState::Saved;
        Ok(project)
    }

    /// Fail-soft load: any error leaves a new empty unsaved document.
    pub fn from_archive_bytes(bytes: &[u8], config: StageConfig) -> Self {
        match Self::try_from_archive_bytes(bytes, config.clone()) {
            Ok(p) => p,
            Err(e) => {
                log::warn!("could not load project, starting empty: {e}");
                Project::new(config)
            }
        }
    }

    /// Fail-soft load from disk.
    pub fn open(path: &Path, config: StageConfig) -> Self {
        match std::fs::read(path) {
            Ok(bytes) => Self::from_archive_bytes(&bytes, config),
            Err(e) => {
                log::warn!("could not read {}: {e}", path.display());
                Project::new(config)
            }
        }
    }

    pub fn save(&mut self, path: &Path) -> Result<(), ArchiveError> {
        let bytes = self.to_archive_bytes()?;
        archive::write_atomic(path, &bytes)?;
        log::info!("saved {} ({} bytes)", path.display(), bytes.len());
        self.mark_saved();
        Ok(())
    }

    /// Encoded stage and tags, for undo history.
    pub fn snapshot(&self) -> Result<Vec<u8>, ArchiveError> {
        Ok(rmp_serde::to_vec_named(&SnapshotRef {
            stage: self.stage.objects(),
            tags: &self.tags,
        })?)
    }

    /// Replace stage and tags with a snapshot. Attachments and references
    /// are untouched; the selection is cleared.
    pub fn restore_snapshot(&mut self, bytes: &[u8]) -> Result<(), ArchiveError> {
        let snapshot: Snapshot = rmp_serde::from_slice(bytes)?;
        for (id, _) in self.overlay.iter().collect::<Vec<_>>() {
            self.overlay.hide(id);
            self.events.push(StageEvent::OutlineRemoved(id));
        }
        for id in self.stage.ids() {
            self.events.push(StageEvent::Detached(id));
        }
        self.stage = Stage::from_objects(snapshot.stage);
        self.tags = snapshot.tags;
        self.recompute_all();
        for id in self.stage.ids() {
            self.events.push(StageEvent::Attached(id));
        }
        self.touch();
        Ok(())
    }
}

/// Smallest axis-aligned translation that moves `other` out of `fixed`.
fn separation(fixed: Rect, other: Rect) -> Vec2 {
    let right = fixed.x1 - other.x0;
    let left = other.x1 - fixed.x0;
    let down = fixed.y1 - other.y0;
    let up = other.y1 - fixed.y0;
    let dx = if right < left { right } else { -left };
    let dy = if down < up { down } else { -up };
    if dx.abs() < dy.abs() {
        Vec2::new(dx, 0.0)
    } else {
        Vec2::new(0.0, dy)
    }
}
