//! Hit-testing shapes attached to every stage object.
//!
//! A `CollisionBox` is a list of primitive shapes. Selection uses point and
//! rectangle queries, the cutting gesture uses line queries, and section
//! collision avoidance uses the bounding rectangle.

use crate::geometry::{
    Line, Point, Rect, bounding_rect, polygon_contains, polygon_edges, rect_contains,
    rect_corners, rect_edges, rect_intersects_line, rects_overlap, segment_intersection,
};

/// Distance within which a point counts as touching a line shape.
pub const LINE_HIT_TOLERANCE: f64 = 5.0;

#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Rect(Rect),
    Line(Line),
    /// Closed polygon, vertices in order without the repeated first point.
    Polygon(Vec<Point>),
}

impl Shape {
    fn bounds(&self) -> Option<Rect> {
        match self {
            Shape::Rect(r) => Some(*r),
            Shape::Line(l) => Some(Rect::from_points(l.p0, l.p1)),
            Shape::Polygon(pts) => bounding_rect(pts.iter().map(|p| Rect::from_points(*p, *p))),
        }
    }

    fn contains_point(&self, p: Point) -> bool {
        match self {
            Shape::Rect(r) => rect_contains(*r, p),
            Shape::Line(l) => distance_to_segment(*l, p) < LINE_HIT_TOLERANCE,
            Shape::Polygon(pts) => polygon_contains(pts, p),
        }
    }

    fn intersects_rect(&self, rect: Rect) -> bool {
        match self {
            Shape::Rect(r) => rects_overlap(*r, rect),
            Shape::Line(l) => rect_intersects_line(rect, *l),
            Shape::Polygon(pts) => {
                pts.iter().any(|p| rect_contains(rect, *p))
                    || rect_corners(rect).into_iter().any(|c| polygon_contains(pts, c))
                    || polygon_edges(pts).any(|e| rect_intersects_line(rect, e))
            }
        }
    }

    fn intersects_line(&self, line: Line) -> bool {
        match self {
            Shape::Rect(r) => rect_intersects_line(*r, line),
            Shape::Line(l) => segment_intersection(*l, line).is_some(),
            Shape::Polygon(pts) => {
                polygon_contains(pts, line.p0)
                    || polygon_edges(pts).any(|e| segment_intersection(e, line).is_some())
            }
        }
    }
}

fn distance_to_segment(seg: Line, p: Point) -> f64 {
    let d = seg.p1 - seg.p0;
    let len2 = d.hypot2();
    if len2 == 0.0 {
        return p.distance(seg.p0);
    }
    let t = ((p - seg.p0).dot(d) / len2).clamp(0.0, 1.0);
    p.distance(seg.p0 + d * t)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollisionBox {
    pub shapes: Vec<Shape>,
}

impl CollisionBox {
    pub fn new(shapes: Vec<Shape>) -> Self {
        Self { shapes }
    }

    pub fn from_rect(rect: Rect) -> Self {
        Self::new(vec![Shape::Rect(rect)])
    }

    /// Outline of `rect` as four line shapes. The interior is not hittable.
    pub fn from_rect_outline(rect: Rect) -> Self {
        Self::new(rect_edges(rect).into_iter().map(Shape::Line).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Bounding rectangle of every shape. Empty boxes report a zero rect at
    /// the origin.
    pub fn bounding_rect(&self) -> Rect {
        bounding_rect(self.shapes.iter().filter_map(Shape::bounds)).unwrap_or(Rect::ZERO)
    }

    pub fn contains_point(&self, p: Point) -> bool {
        self.shapes.iter().any(|s| s.contains_point(p))
    }

    pub fn intersects_rect(&self, rect: Rect) -> bool {
        self.shapes.iter().any(|s| s.intersects_rect(rect))
    }

    pub fn intersects_line(&self, line: Line) -> bool {
        self.shapes.iter().any(|s| s.intersects_line(line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_box_queries() {
        let b = CollisionBox::from_rect(Rect::new(0.0, 0.0, 100.0, 100.0));
        assert!(b.contains_point(Point::new(50.0, 50.0)));
        assert!(!b.contains_point(Point::new(150.0, 50.0)));
        assert!(b.intersects_rect(Rect::new(90.0, 90.0, 200.0, 200.0)));
        assert!(!b.intersects_rect(Rect::new(100.0, 0.0, 200.0, 100.0)));
        assert!(b.intersects_line(Line::new((-10.0, 50.0), (10.0, 50.0))));
    }

    #[test]
    fn outline_box_has_hollow_interior() {
        let b = CollisionBox::from_rect_outline(Rect::new(0.0, 0.0, 100.0, 100.0));
        assert!(!b.contains_point(Point::new(50.0, 50.0)));
        assert!(b.contains_point(Point::new(0.0, 50.0)));
        assert_eq!(b.bounding_rect(), Rect::new(0.0, 0.0, 100.0, 100.0));
    }

    #[test]
    fn line_shape_tolerance() {
        let b = CollisionBox::new(vec![Shape::Line(Line::new((0.0, 0.0), (100.0, 0.0)))]);
        assert!(b.contains_point(Point::new(50.0, 4.0)));
        assert!(!b.contains_point(Point::new(50.0, 6.0)));
    }

    #[test]
    fn polygon_shape_rect_intersection() {
        let tri = vec![
            Point::new(0.0, 0.0),
            Point::new(100.0, 0.0),
            Point::new(0.0, 100.0),
        ];
        let b = CollisionBox::new(vec![Shape::Polygon(tri)]);
        assert!(b.intersects_rect(Rect::new(10.0, 10.0, 20.0, 20.0)));
        assert!(!b.intersects_rect(Rect::new(80.0, 80.0, 90.0, 90.0)));
    }
}
