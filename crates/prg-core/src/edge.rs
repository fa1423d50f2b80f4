//! Directed two-member edges.
//!
//! Each end carries a rectangle rate: a fractional point inside the endpoint
//! rectangle. The rendered line runs between the points where the
//! inner-point-to-inner-point line leaves each rectangle, except on image and
//! reference-block endpoints where a precise (non-canonical) rate is used
//! verbatim.
//!
//! | Rate          | Meaning                     |
//! |---------------|-----------------------------|
//! | `(0.5, 0.5)`  | center (default)            |
//! | `(0.01, 0.5)` | hugging the left border     |
//! | `(0.99, 0.5)` | hugging the right border    |
//! | `(0.5, 0.01)` | hugging the top border      |
//! | `(0.5, 0.99)` | hugging the bottom border   |

use crate::association::{Association, EndpointLookup, Member, derived_position};
use crate::collision::{CollisionBox, Shape};
use crate::error::StageError;
use crate::geometry::{
    Color, Line, Point, Vec2, inner_point_by_rate, rect_boundary_hit, vec2_tuple,
};
use crate::id::StageId;
use kurbo::{CubicBez, ParamCurve};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

pub const RATE_CENTER: Vec2 = Vec2::new(0.5, 0.5);
pub const RATE_LEFT: Vec2 = Vec2::new(0.01, 0.5);
pub const RATE_RIGHT: Vec2 = Vec2::new(0.99, 0.5);
pub const RATE_TOP: Vec2 = Vec2::new(0.5, 0.01);
pub const RATE_BOTTOM: Vec2 = Vec2::new(0.5, 0.99);

/// Control-point distance factor for curved edges: `k * sqrt(length)`.
pub const CURVE_OFFSET_FACTOR: f64 = 6.25;

const CURVE_COLLISION_SEGMENTS: usize = 16;

fn center_rate() -> Vec2 {
    RATE_CENTER
}

/// Exact comparison against the five canonical rates.
pub fn is_canonical_rate(rate: Vec2) -> bool {
    [RATE_CENTER, RATE_LEFT, RATE_RIGHT, RATE_TOP, RATE_BOTTOM].contains(&rate)
}

/// Outward direction of a border-hugging rate.
fn side_direction(rate: Vec2) -> Option<Vec2> {
    if rate == RATE_LEFT {
        Some(Vec2::new(-1.0, 0.0))
    } else if rate == RATE_RIGHT {
        Some(Vec2::new(1.0, 0.0))
    } else if rate == RATE_TOP {
        Some(Vec2::new(0.0, -1.0))
    } else if rate == RATE_BOTTOM {
        Some(Vec2::new(0.0, 1.0))
    } else {
        None
    }
}

/// Which border an edge end was attached to in documents before rates were
/// stored explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LegacySide {
    Top,
    Bottom,
    Left,
    Right,
    Unknown,
}

impl LegacySide {
    pub fn rate(self) -> Vec2 {
        match self {
            LegacySide::Top => RATE_TOP,
            LegacySide::Bottom => RATE_BOTTOM,
            LegacySide::Left => RATE_LEFT,
            LegacySide::Right => RATE_RIGHT,
            LegacySide::Unknown => RATE_CENTER,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CurveKind {
    #[default]
    Straight,
    Bezier,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EdgePath {
    Line(Line),
    Curve(CubicBez),
}

impl EdgePath {
    pub fn start(&self) -> Point {
        match self {
            EdgePath::Line(l) => l.p0,
            EdgePath::Curve(c) => c.p0,
        }
    }

    pub fn end(&self) -> Point {
        match self {
            EdgePath::Line(l) => l.p1,
            EdgePath::Curve(c) => c.p3,
        }
    }

    /// Point halfway along the parameter range, where the label sits.
    pub fn midpoint(&self) -> Point {
        match self {
            EdgePath::Line(l) => l.eval(0.5),
            EdgePath::Curve(c) => c.eval(0.5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineEdge {
    pub uuid: StageId,
    /// `[source, target]`.
    pub members: SmallVec<[Member; 2]>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub color: Color,
    #[serde(with = "vec2_tuple", default = "center_rate")]
    pub source_rectangle_rate: Vec2,
    #[serde(with = "vec2_tuple", default = "center_rate")]
    pub target_rectangle_rate: Vec2,
    #[serde(default)]
    pub curve: CurveKind,
    #[serde(default, rename = "sourceSide", skip_serializing)]
    pub legacy_source_side: Option<LegacySide>,
    #[serde(default, rename = "targetSide", skip_serializing)]
    pub legacy_target_side: Option<LegacySide>,
    #[serde(skip)]
    pub position: Point,
    #[serde(skip)]
    pub path: Option<EdgePath>,
    #[serde(skip)]
    pub selected: bool,
}

impl LineEdge {
    pub const KIND: &'static str = "LineEdge";

    /// Build from an explicit member list. Anything but exactly two members
    /// is rejected.
    pub fn new(members: impl IntoIterator<Item = Member>) -> Result<Self, StageError> {
        let members: SmallVec<[Member; 2]> = members.into_iter().collect();
        if members.len() != 2 {
            return Err(StageError::Arity {
                kind: Self::KIND,
                expected: "exactly 2",
                actual: members.len(),
            });
        }
        Ok(Self {
            uuid: StageId::new(),
            members,
            text: String::new(),
            color: Color::TRANSPARENT,
            source_rectangle_rate: RATE_CENTER,
            target_rectangle_rate: RATE_CENTER,
            curve: CurveKind::Straight,
            legacy_source_side: None,
            legacy_target_side: None,
            position: Point::ZERO,
            path: None,
            selected: false,
        })
    }

    pub fn connect(source: StageId, target: StageId) -> Self {
        let mut members = SmallVec::new();
        members.push(Member::new(source));
        members.push(Member::new(target));
        Self {
            uuid: StageId::new(),
            members,
            text: String::new(),
            color: Color::TRANSPARENT,
            source_rectangle_rate: RATE_CENTER,
            target_rectangle_rate: RATE_CENTER,
            curve: CurveKind::Straight,
            legacy_source_side: None,
            legacy_target_side: None,
            position: Point::ZERO,
            path: None,
            selected: false,
        }
    }

    pub fn with_rates(mut self, source: Vec2, target: Vec2) -> Self {
        self.source_rectangle_rate = source;
        self.target_rectangle_rate = target;
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn source(&self) -> Option<StageId> {
        self.members.first().map(|m| m.id)
    }

    pub fn target(&self) -> Option<StageId> {
        self.members.get(1).map(|m| m.id)
    }

    /// Point the target end at another entity.
    pub fn set_target(&mut self, id: StageId) {
        if let Some(m) = self.members.get_mut(1) {
            m.id = id;
        }
    }

    /// Swap source and target, rates included.
    pub fn reverse(&mut self) {
        self.members.reverse();
        std::mem::swap(
            &mut self.source_rectangle_rate,
            &mut self.target_rectangle_rate,
        );
    }

    pub fn is_left_to_right(&self) -> bool {
        self.source_rectangle_rate == RATE_RIGHT && self.target_rectangle_rate == RATE_LEFT
    }

    pub fn is_right_to_left(&self) -> bool {
        self.source_rectangle_rate == RATE_LEFT && self.target_rectangle_rate == RATE_RIGHT
    }

    pub fn is_top_to_bottom(&self) -> bool {
        self.source_rectangle_rate == RATE_BOTTOM && self.target_rectangle_rate == RATE_TOP
    }

    pub fn is_bottom_to_top(&self) -> bool {
        self.source_rectangle_rate == RATE_TOP && self.target_rectangle_rate == RATE_BOTTOM
    }

    /// Fill rates from `sourceSide`/`targetSide` of pre-rate documents. Only
    /// rates still at the center default are overwritten.
    pub fn migrate_legacy_sides(&mut self) {
        if let Some(side) = self.legacy_source_side.take()
            && self.source_rectangle_rate == RATE_CENTER
        {
            self.source_rectangle_rate = side.rate();
        }
        if let Some(side) = self.legacy_target_side.take()
            && self.target_rectangle_rate == RATE_CENTER
        {
            self.target_rectangle_rate = side.rate();
        }
    }
}

impl Association for LineEdge {
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
        count == 2
    }

    fn on_members_change(&mut self, lookup: &dyn EndpointLookup) {
        if let Some(p) = derived_position(&self.members, lookup) {
            self.position = p;
        }
        self.refresh(lookup);
    }

    fn refresh(&mut self, lookup: &dyn EndpointLookup) {
        if self.members.len() != 2 {
            log::trace!("edge {} has {} members, skipping refresh", self.uuid, self.members.len());
            return;
        }
        let (Some(src), Some(tgt)) = (
            lookup.endpoint(self.members[0].id),
            lookup.endpoint(self.members[1].id),
        ) else {
            return;
        };
        let src_inner = inner_point_by_rate(src.rect, self.source_rectangle_rate);
        let tgt_inner = inner_point_by_rate(tgt.rect, self.target_rectangle_rate);

        let start = if src.precise && !is_canonical_rate(self.source_rectangle_rate) {
            src_inner
        } else {
            rect_boundary_hit(src.rect, Line::new(src_inner, tgt_inner)).unwrap_or(src_inner)
        };
        let end = if tgt.precise && !is_canonical_rate(self.target_rectangle_rate) {
            tgt_inner
        } else {
            rect_boundary_hit(tgt.rect, Line::new(tgt_inner, src_inner)).unwrap_or(tgt_inner)
        };

        self.path = Some(match self.curve {
            CurveKind::Straight => EdgePath::Line(Line::new(start, end)),
            CurveKind::Bezier => {
                let offset = CURVE_OFFSET_FACTOR * start.distance(end).sqrt();
                let toward = |from: Point, to: Point| {
                    let d = to - from;
                    let len = d.hypot();
                    if len > 0.0 { d / len } else { Vec2::ZERO }
                };
                let d0 = side_direction(self.source_rectangle_rate)
                    .unwrap_or_else(|| toward(start, end));
                let d1 = side_direction(self.target_rectangle_rate)
                    .unwrap_or_else(|| toward(end, start));
                EdgePath::Curve(CubicBez::new(start, start + d0 * offset, end + d1 * offset, end))
            }
        });
    }

    fn collision_box(&self) -> CollisionBox {
        match self.path {
            None => CollisionBox::default(),
            Some(EdgePath::Line(l)) => CollisionBox::new(vec![Shape::Line(l)]),
            Some(EdgePath::Curve(c)) => {
                let n = CURVE_COLLISION_SEGMENTS;
                let shapes = (0..n)
                    .map(|i| {
                        let t0 = i as f64 / n as f64;
                        let t1 = (i + 1) as f64 / n as f64;
                        Shape::Line(Line::new(c.eval(t0), c.eval(t1)))
                    })
                    .collect();
                CollisionBox::new(shapes)
            }
        }
    }

    fn remove_member(&mut self, id: StageId) -> usize {
        let before = self.members.len();
        self.members.retain(|m| m.id != id);
        before - self.members.len()
    }
}
