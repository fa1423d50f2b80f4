//! Undirected hyper-edges joining two or more entities.

use crate::association::{Association, EndpointLookup, Member, derived_position};
use crate::collision::{CollisionBox, Shape};
use crate::config::{StageConfig, TextMeasure};
use crate::error::StageError;
use crate::geometry::{
    Color, Line, Point, Rect, Size, Vec2, bounding_rect, convex_hull, inner_point_by_rate,
    rect_boundary_hit, rect_corners, vec2_list, vec2_tuple,
};
use crate::id::StageId;
use serde::{Deserialize, Serialize};

/// Vertex count of the polygon approximating a circular hull.
pub const CIRCLE_VERTICES: usize = 20;

/// Arrowheads drawn on each spoke.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MultiEdgeArrow {
    /// `<-- hub -->`
    Outer,
    /// `--> hub <--`
    Inner,
    #[default]
    None,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MultiEdgeRenderType {
    /// Spokes from the hub to every member.
    #[default]
    Line,
    /// Convex hull around the members.
    Convex,
    /// Circle around the members.
    Circle,
}

/// Derived shape of a hyper-edge, rebuilt on every member change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HubGeometry {
    pub center: Point,
    /// Label rect, empty when there is no text.
    pub text_rect: Option<Rect>,
    /// One segment per member for the `Line` render type.
    pub spokes: Vec<Line>,
    /// Closed outline for the `Convex` and `Circle` render types.
    pub outline: Vec<Point>,
}

fn center_rate() -> Vec2 {
    Vec2::new(0.5, 0.5)
}

fn default_padding() -> f64 {
    10.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiTargetUndirectedEdge {
    pub uuid: StageId,
    pub members: Vec<Member>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub color: Color,
    /// Per-member inner point, parallel to `members`.
    #[serde(with = "vec2_list", default)]
    pub rect_rates: Vec<Vec2>,
    /// Hub location inside the members' bounding rect.
    #[serde(with = "vec2_tuple", default = "center_rate")]
    pub center_rate: Vec2,
    #[serde(default)]
    pub arrow: MultiEdgeArrow,
    #[serde(default)]
    pub render_type: MultiEdgeRenderType,
    #[serde(default = "default_padding")]
    pub padding: f64,
    #[serde(skip)]
    pub position: Point,
    #[serde(skip)]
    pub geometry: HubGeometry,
    /// Label size, measured by the owning project when the text changes.
    #[serde(skip)]
    pub text_size: Size,
    #[serde(skip)]
    pub selected: bool,
}

impl MultiTargetUndirectedEdge {
    pub const KIND: &'static str = "MultiTargetUndirectedEdge";

    /// Fails unless at least two members are given.
    pub fn new(members: Vec<Member>, padding: f64) -> Result<Self, StageError> {
        if members.len() < 2 {
            return Err(StageError::TooFewEntities {
                needed: 2,
                actual: members.len(),
            });
        }
        Ok(Self {
            uuid: StageId::new(),
            rect_rates: vec![center_rate(); members.len()],
            members,
            text: String::new(),
            color: Color::TRANSPARENT,
            center_rate: center_rate(),
            arrow: MultiEdgeArrow::None,
            render_type: MultiEdgeRenderType::Line,
            padding,
            position: Point::ZERO,
            geometry: HubGeometry::default(),
            text_size: Size::ZERO,
            selected: false,
        })
    }

    pub fn measure_text(&mut self, measure: &dyn TextMeasure, config: &StageConfig) {
        self.text_size = if self.text.is_empty() {
            Size::ZERO
        } else {
            measure.measure(&self.text, config.font_size)
        };
    }

    fn rate_for(&self, index: usize) -> Vec2 {
        self.rect_rates.get(index).copied().unwrap_or_else(center_rate)
    }

    /// Corners of every member rect (and the label) grown by `padding`.
    fn padded_corners(&self, rects: &[Rect]) -> Vec<Point> {
        let mut pts: Vec<Point> = rects
            .iter()
            .flat_map(|r| rect_corners(r.inflate(self.padding, self.padding)))
            .collect();
        if let Some(t) = self.geometry.text_rect {
            pts.extend(rect_corners(t.inflate(self.padding, self.padding)));
        }
        pts
    }
}

impl Association for MultiTargetUndirectedEdge {
    fn uuid(&self) -> StageId {
        self.uuid
    }

    fn members(&self) -> &[Member] {
        &self.members
    }

    fn color(&self) -> Color {
        self.color
    }

    fn position(&self) -> Point {
        self.position
    }

    fn accepts_arity(&self, count: usize) -> bool {
        count >= 2
    }

    fn on_members_change(&mut self, lookup: &dyn EndpointLookup) {
        if self.rect_rates.len() != self.members.len() {
            self.rect_rates.resize(self.members.len(), center_rate());
        }
        if let Some(p) = derived_position(&self.members, lookup) {
            self.position = p;
        }
        self.refresh(lookup);
    }

    fn refresh(&mut self, lookup: &dyn EndpointLookup) {
        if self.members.len() < 2 {
            log::trace!("hyper-edge {} has {} members, skipping refresh", self.uuid, self.members.len());
            return;
        }
        let rects: Vec<Rect> = self
            .members
            .iter()
            .filter_map(|m| lookup.endpoint(m.id).map(|e| e.rect))
            .collect();
        if rects.len() != self.members.len() {
            return;
        }
        let Some(bounds) = bounding_rect(rects.iter().copied()) else {
            return;
        };
        let center = inner_point_by_rate(bounds, self.center_rate);
        self.geometry.center = center;
        self.geometry.text_rect = if self.text.is_empty() {
            None
        } else {
            Some(Rect::from_center_size(center, self.text_size))
        };
        self.geometry.spokes.clear();
        self.geometry.outline.clear();

        match self.render_type {
            MultiEdgeRenderType::Line => {
                for (i, rect) in rects.iter().enumerate() {
                    let inner = inner_point_by_rate(*rect, self.rate_for(i));
                    let outer = rect_boundary_hit(*rect, Line::new(inner, center)).unwrap_or(inner);
                    let hub = self
                        .geometry
                        .text_rect
                        .and_then(|t| rect_boundary_hit(t, Line::new(center, inner)))
                        .unwrap_or(center);
                    self.geometry.spokes.push(Line::new(outer, hub));
                }
            }
            MultiEdgeRenderType::Convex => {
                self.geometry.outline = convex_hull(&self.padded_corners(&rects));
            }
            MultiEdgeRenderType::Circle => {
                let pts = self.padded_corners(&rects);
                let n = pts.len() as f64;
                let c = pts
                    .iter()
                    .fold(Vec2::ZERO, |acc, p| acc + p.to_vec2())
                    / n;
                let c = c.to_point();
                let radius = pts.iter().map(|p| p.distance(c)).fold(0.0, f64::max);
                self.geometry.outline = (0..CIRCLE_VERTICES)
                    .map(|i| {
                        let angle = i as f64 / CIRCLE_VERTICES as f64 * std::f64::consts::TAU;
                        Point::new(c.x + radius * angle.cos(), c.y + radius * angle.sin())
                    })
                    .collect();
            }
        }
    }

    fn collision_box(&self) -> CollisionBox {
        match self.render_type {
            MultiEdgeRenderType::Line => {
                CollisionBox::new(self.geometry.spokes.iter().copied().map(Shape::Line).collect())
            }
            MultiEdgeRenderType::Convex | MultiEdgeRenderType::Circle => {
                let pts = &self.geometry.outline;
                let n = pts.len();
                CollisionBox::new(
                    (0..n)
                        .map(|i| Shape::Line(Line::new(pts[i], pts[(i + 1) % n])))
                        .collect(),
                )
            }
        }
    }

    fn remove_member(&mut self, id: StageId) -> usize {
        let before = self.members.len();
        let mut i = 0;
        while i < self.members.len() {
            if self.members[i].id == id {
                self.members.remove(i);
                if i < self.rect_rates.len() {
                    self.rect_rates.remove(i);
                }
            } else {
                i += 1;
            }
        }
        before - self.members.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::association::Endpoint;
    use std::collections::HashMap;

    fn hub(rects: &[Rect]) -> (MultiTargetUndirectedEdge, HashMap<StageId, Endpoint>) {
        let ids: Vec<StageId> = rects.iter().map(|_| StageId::new()).collect();
        let map = ids
            .iter()
            .zip(rects)
            .map(|(id, rect)| {
                (
                    *id,
                    Endpoint {
                        rect: *rect,
                        precise: false,
                    },
                )
            })
            .collect();
        let edge =
            MultiTargetUndirectedEdge::new(ids.into_iter().map(Member::new).collect(), 10.0).unwrap();
        (edge, map)
    }

    #[test]
    fn fewer_than_two_members_rejected() {
        let err = MultiTargetUndirectedEdge::new(vec![Member::new(StageId::new())], 10.0).unwrap_err();
        assert_eq!(err, StageError::TooFewEntities { needed: 2, actual: 1 });
        assert!(MultiTargetUndirectedEdge::new(Vec::new(), 10.0).is_err());
    }

    #[test]
    fn line_hub_has_one_spoke_per_member() {
        let (mut edge, map) = hub(&[
            Rect::new(0.0, 0.0, 100.0, 100.0),
            Rect::new(300.0, 0.0, 400.0, 100.0),
            Rect::new(150.0, 300.0, 250.0, 400.0),
        ]);
        edge.on_members_change(&map);
        assert_eq!(edge.geometry.center, Point::new(200.0, 200.0));
        assert_eq!(edge.geometry.spokes.len(), 3);
        for spoke in &edge.geometry.spokes {
            assert_eq!(spoke.p1, Point::new(200.0, 200.0));
        }
        assert_eq!(edge.position, Point::new(50.0, 50.0));
    }

    #[test]
    fn convex_outline_wraps_padded_members() {
        let (mut edge, map) = hub(&[
            Rect::new(0.0, 0.0, 100.0, 100.0),
            Rect::new(300.0, 0.0, 400.0, 100.0),
        ]);
        edge.render_type = MultiEdgeRenderType::Convex;
        edge.on_members_change(&map);
        assert_eq!(edge.geometry.outline.len(), 4);
        let cb = edge.collision_box();
        assert_eq!(cb.bounding_rect(), Rect::new(-10.0, -10.0, 410.0, 110.0));
    }

    #[test]
    fn circle_outline_has_fixed_vertex_count() {
        let (mut edge, map) = hub(&[
            Rect::new(0.0, 0.0, 100.0, 100.0),
            Rect::new(300.0, 0.0, 400.0, 100.0),
        ]);
        edge.render_type = MultiEdgeRenderType::Circle;
        edge.on_members_change(&map);
        assert_eq!(edge.geometry.outline.len(), CIRCLE_VERTICES);
    }

    #[test]
    fn removing_member_keeps_rates_parallel() {
        let (mut edge, _) = hub(&[Rect::ZERO, Rect::ZERO, Rect::ZERO]);
        edge.rect_rates[1] = Vec2::new(0.1, 0.1);
        let gone = edge.members[0].id;
        assert_eq!(edge.remove_member(gone), 1);
        assert_eq!(edge.members.len(), 2);
        assert_eq!(edge.rect_rates, vec![Vec2::new(0.1, 0.1), center_rate()]);
    }
}
