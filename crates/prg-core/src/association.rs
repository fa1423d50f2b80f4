//! Associations: relationships between entities.
//!
//! An association holds an ordered member list. Its `position` is derived
//! (the component-wise minimum of the members' anchor points) and its
//! rendered path is rebuilt by `on_members_change` whenever a member moves.

use crate::collision::CollisionBox;
use crate::geometry::{Color, Point, Rect};
use crate::id::StageId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Named attachment point on an entity's bounding box.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Anchor {
    #[default]
    Center,
    Top,
    Bottom,
    Left,
    Right,
}

impl Anchor {
    pub fn resolve(self, rect: Rect) -> Point {
        let c = rect.center();
        match self {
            Anchor::Center => c,
            Anchor::Top => Point::new(c.x, rect.y0),
            Anchor::Bottom => Point::new(c.x, rect.y1),
            Anchor::Left => Point::new(rect.x0, c.y),
            Anchor::Right => Point::new(rect.x1, c.y),
        }
    }
}

/// One endpoint of an association: an entity id plus the anchor used for the
/// derived position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Member {
    pub id: StageId,
    #[serde(default)]
    pub anchor: Anchor,
}

impl Member {
    pub fn new(id: StageId) -> Self {
        Self {
            id,
            anchor: Anchor::Center,
        }
    }

    pub fn with_anchor(id: StageId, anchor: Anchor) -> Self {
        Self { id, anchor }
    }
}

/// What an association needs to know about a member entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Endpoint {
    pub rect: Rect,
    /// See `Entity::honors_precise_rate`.
    pub precise: bool,
}

/// Resolves member ids to their current geometry.
pub trait EndpointLookup {
    fn endpoint(&self, id: StageId) -> Option<Endpoint>;
}

impl EndpointLookup for HashMap<StageId, Endpoint> {
    fn endpoint(&self, id: StageId) -> Option<Endpoint> {
        self.get(&id).copied()
    }
}

pub trait Association {
    fn uuid(&self) -> StageId;

    fn members(&self) -> &[Member];

    fn color(&self) -> Color;

    /// Top-left of the members' anchor points, as of the last recompute.
    fn position(&self) -> Point;

    /// Whether `count` members satisfy this kind's arity.
    fn accepts_arity(&self, count: usize) -> bool;

    /// Recompute the derived position, then rebuild the rendered path.
    fn on_members_change(&mut self, lookup: &dyn EndpointLookup);

    /// Rebuild the rendered path from current member geometry. A no-op when
    /// the member count does not satisfy the arity.
    fn refresh(&mut self, lookup: &dyn EndpointLookup);

    fn collision_box(&self) -> CollisionBox;

    /// Drop every member referencing `id`; returns how many were removed.
    fn remove_member(&mut self, id: StageId) -> usize;

    fn has_member(&self, id: StageId) -> bool {
        self.members().iter().any(|m| m.id == id)
    }
}

/// Component-wise minimum over the anchor-resolved member positions.
/// Members that cannot be resolved are skipped.
pub fn derived_position(members: &[Member], lookup: &dyn EndpointLookup) -> Option<Point> {
    members
        .iter()
        .filter_map(|m| lookup.endpoint(m.id).map(|e| m.anchor.resolve(e.rect)))
        .reduce(|a, b| Point::new(a.x.min(b.x), a.y.min(b.y)))
}
