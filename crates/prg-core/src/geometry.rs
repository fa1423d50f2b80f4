//! 2D helpers layered on top of `kurbo` primitives.
//!
//! Positions and sizes are persisted as `[x, y]` / `[w, h]` tuples and colors
//! as `[r, g, b, a]`; the serde adapters for those wire shapes live here.

pub use kurbo::{Line, Point, Rect, Size, Vec2};

use serde::{Deserialize, Serialize};

// ─── Colors ──────────────────────────────────────────────────────────────

/// RGBA color. Channels `r`, `g`, `b` are 0–255, alpha is 0–1.
/// A fully transparent color means "use the theme default".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const TRANSPARENT: Color = Color::rgba(0.0, 0.0, 0.0, 0.0);

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn is_transparent(&self) -> bool {
        self.a == 0.0
    }

    /// Parse `#RRGGBB` or `#RRGGBBAA` (leading `#` optional).
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        if !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
        match hex.len() {
            6 => Some(Self::rgba(
                channel(0)? as f32,
                channel(2)? as f32,
                channel(4)? as f32,
                1.0,
            )),
            8 => Some(Self::rgba(
                channel(0)? as f32,
                channel(2)? as f32,
                channel(4)? as f32,
                channel(6)? as f32 / 255.0,
            )),
            _ => None,
        }
    }

    /// Format as `#RRGGBB`, or `#RRGGBBAA` when not fully opaque.
    pub fn to_hex(&self) -> String {
        let c = |v: f32| v.round().clamp(0.0, 255.0) as u8;
        if self.a >= 1.0 {
            format!("#{:02X}{:02X}{:02X}", c(self.r), c(self.g), c(self.b))
        } else {
            format!(
                "#{:02X}{:02X}{:02X}{:02X}",
                c(self.r),
                c(self.g),
                c(self.b),
                c(self.a * 255.0)
            )
        }
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::TRANSPARENT
    }
}

impl From<[f32; 4]> for Color {
    fn from([r, g, b, a]: [f32; 4]) -> Self {
        Color::rgba(r, g, b, a)
    }
}

impl From<Color> for [f32; 4] {
    fn from(c: Color) -> Self {
        [c.r, c.g, c.b, c.a]
    }
}

// ─── Tuple serde adapters ────────────────────────────────────────────────

/// `#[serde(with = "point_tuple")]` for `Point` as `[x, y]`.
pub mod point_tuple {
    use super::Point;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(p: &Point, serializer: S) -> Result<S::Ok, S::Error> {
        [p.x, p.y].serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Point, D::Error> {
        let [x, y] = <[f64; 2]>::deserialize(deserializer)?;
        Ok(Point::new(x, y))
    }
}

/// `#[serde(with = "size_tuple")]` for `Size` as `[w, h]`.
pub mod size_tuple {
    use super::Size;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(s: &Size, serializer: S) -> Result<S::Ok, S::Error> {
        [s.width, s.height].serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Size, D::Error> {
        let [w, h] = <[f64; 2]>::deserialize(deserializer)?;
        Ok(Size::new(w, h))
    }
}

/// `#[serde(with = "vec2_tuple")]` for `Vec2` as `[x, y]`.
pub mod vec2_tuple {
    use super::Vec2;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(v: &Vec2, serializer: S) -> Result<S::Ok, S::Error> {
        [v.x, v.y].serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec2, D::Error> {
        let [x, y] = <[f64; 2]>::deserialize(deserializer)?;
        Ok(Vec2::new(x, y))
    }
}

/// `#[serde(with = "vec2_list")]` for `Vec<Vec2>` as `[[x, y], ...]`.
pub mod vec2_list {
    use super::Vec2;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(v: &[Vec2], serializer: S) -> Result<S::Ok, S::Error> {
        let pairs: Vec<[f64; 2]> = v.iter().map(|r| [r.x, r.y]).collect();
        pairs.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Vec2>, D::Error> {
        let pairs = Vec::<[f64; 2]>::deserialize(deserializer)?;
        Ok(pairs.into_iter().map(|[x, y]| Vec2::new(x, y)).collect())
    }
}

// ─── Rectangles ──────────────────────────────────────────────────────────

/// Smallest rectangle covering every input, `None` for an empty input.
pub fn bounding_rect(rects: impl IntoIterator<Item = Rect>) -> Option<Rect> {
    rects.into_iter().reduce(|acc, r| acc.union(r))
}

/// Point inside `rect` located by fractional `rate` (0.5, 0.5 is the center).
pub fn inner_point_by_rate(rect: Rect, rate: Vec2) -> Point {
    Point::new(
        rect.x0 + rect.width() * rate.x,
        rect.y0 + rect.height() * rate.y,
    )
}

/// Rect of `size` whose center sits at `center`.
pub fn rect_centered_at(center: Point, size: Size) -> Rect {
    Rect::from_center_size(center, size)
}

/// Strict overlap test; rects that only share an edge do not overlap.
pub fn rects_overlap(a: Rect, b: Rect) -> bool {
    a.x0 < b.x1 && b.x0 < a.x1 && a.y0 < b.y1 && b.y0 < a.y1
}

/// Inclusive containment, so boundary points count as inside.
pub fn rect_contains(rect: Rect, p: Point) -> bool {
    p.x >= rect.x0 && p.x <= rect.x1 && p.y >= rect.y0 && p.y <= rect.y1
}

pub fn rect_contains_rect(outer: Rect, inner: Rect) -> bool {
    inner.x0 >= outer.x0 && inner.y0 >= outer.y0 && inner.x1 <= outer.x1 && inner.y1 <= outer.y1
}

/// The four boundary segments of a rectangle, clockwise from the top edge.
pub fn rect_edges(rect: Rect) -> [Line; 4] {
    let tl = Point::new(rect.x0, rect.y0);
    let tr = Point::new(rect.x1, rect.y0);
    let br = Point::new(rect.x1, rect.y1);
    let bl = Point::new(rect.x0, rect.y1);
    [
        Line::new(tl, tr),
        Line::new(tr, br),
        Line::new(br, bl),
        Line::new(bl, tl),
    ]
}

pub fn rect_corners(rect: Rect) -> [Point; 4] {
    [
        Point::new(rect.x0, rect.y0),
        Point::new(rect.x1, rect.y0),
        Point::new(rect.x1, rect.y1),
        Point::new(rect.x0, rect.y1),
    ]
}

/// Where `line` crosses the boundary of `rect`. When several sides are
/// crossed the hit closest to `line.p1` wins, which for a center-to-center
/// line is the exit point toward the other shape.
pub fn rect_boundary_hit(rect: Rect, line: Line) -> Option<Point> {
    rect_edges(rect)
        .into_iter()
        .filter_map(|edge| segment_intersection(line, edge))
        .min_by(|a, b| {
            let da = a.distance(line.p1);
            let db = b.distance(line.p1);
            da.total_cmp(&db)
        })
}

pub fn rect_intersects_line(rect: Rect, line: Line) -> bool {
    rect_contains(rect, line.p0)
        || rect_contains(rect, line.p1)
        || rect_edges(rect)
            .into_iter()
            .any(|edge| segment_intersection(line, edge).is_some())
}

// ─── Segments & polygons ─────────────────────────────────────────────────

fn cross(a: Vec2, b: Vec2) -> f64 {
    a.x * b.y - a.y * b.x
}

/// Intersection point of two closed segments, `None` when they miss or are
/// parallel.
pub fn segment_intersection(a: Line, b: Line) -> Option<Point> {
    let r = a.p1 - a.p0;
    let s = b.p1 - b.p0;
    let denom = cross(r, s);
    if denom.abs() < f64::EPSILON {
        return None;
    }
    let qp = b.p0 - a.p0;
    let t = cross(qp, s) / denom;
    let u = cross(qp, r) / denom;
    if (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u) {
        Some(a.p0 + r * t)
    } else {
        None
    }
}

/// Even-odd point-in-polygon test.
pub fn polygon_contains(polygon: &[Point], p: Point) -> bool {
    let mut inside = false;
    let n = polygon.len();
    for i in 0..n {
        let a = polygon[i];
        let b = polygon[(i + n - 1) % n];
        if (a.y > p.y) != (b.y > p.y) && p.x < (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x {
            inside = !inside;
        }
    }
    inside
}

/// Closed polygon outline as segments.
pub fn polygon_edges(polygon: &[Point]) -> impl Iterator<Item = Line> + '_ {
    let n = polygon.len();
    (0..n).map(move |i| Line::new(polygon[i], polygon[(i + 1) % n]))
}

/// Convex hull (Andrew's monotone chain), counter-clockwise without the
/// closing point.
pub fn convex_hull(points: &[Point]) -> Vec<Point> {
    let mut pts: Vec<Point> = points.to_vec();
    pts.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }
    let turn = |o: Point, a: Point, b: Point| cross(a - o, b - o);
    let mut lower: Vec<Point> = Vec::new();
    for &p in &pts {
        while lower.len() >= 2 && turn(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0 {
            lower.pop();
        }
        lower.push(p);
    }
    let mut upper: Vec<Point> = Vec::new();
    for &p in pts.iter().rev() {
        while upper.len() >= 2 && turn(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0 {
            upper.pop();
        }
        upper.push(p);
    }
    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_color_roundtrip() {
        let c = Color::from_hex("#FF8000").unwrap();
        assert_eq!(c, Color::rgba(255.0, 128.0, 0.0, 1.0));
        assert_eq!(c.to_hex(), "#FF8000");
        assert!(Color::from_hex("#12").is_none());
    }

    #[test]
    fn inner_point_uses_fractional_rate() {
        let r = Rect::new(0.0, 0.0, 100.0, 50.0);
        assert_eq!(inner_point_by_rate(r, Vec2::new(0.5, 0.5)), Point::new(50.0, 25.0));
        assert_eq!(inner_point_by_rate(r, Vec2::new(0.99, 0.5)), Point::new(99.0, 25.0));
    }

    #[test]
    fn boundary_hit_on_center_line() {
        let r = Rect::new(0.0, 0.0, 100.0, 100.0);
        let hit = rect_boundary_hit(r, Line::new((50.0, 50.0), (350.0, 50.0))).unwrap();
        assert!((hit.x - 100.0).abs() < 1e-9, "expected right edge, got {hit:?}");
        assert!((hit.y - 50.0).abs() < 1e-9);
    }

    #[test]
    fn crossing_segments() {
        let a = Line::new((0.0, 0.0), (10.0, 10.0));
        let b = Line::new((0.0, 10.0), (10.0, 0.0));
        assert_eq!(segment_intersection(a, b), Some(Point::new(5.0, 5.0)));
        let c = Line::new((20.0, 0.0), (30.0, 0.0));
        assert_eq!(segment_intersection(a, c), None);
    }

    #[test]
    fn hull_of_square_with_interior_point() {
        let pts = [
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
            Point::new(5.0, 5.0),
        ];
        let hull = convex_hull(&pts);
        assert_eq!(hull.len(), 4);
        assert!(!hull.contains(&Point::new(5.0, 5.0)));
        assert!(polygon_contains(&hull, Point::new(5.0, 5.0)));
        assert!(!polygon_contains(&hull, Point::new(15.0, 5.0)));
    }

    #[test]
    fn bounding_rect_of_many() {
        let b = bounding_rect([
            Rect::new(0.0, 0.0, 10.0, 10.0),
            Rect::new(-5.0, 20.0, 3.0, 30.0),
        ]);
        assert_eq!(b, Some(Rect::new(-5.0, 0.0, 10.0, 30.0)));
        assert_eq!(bounding_rect(std::iter::empty()), None);
    }
}
