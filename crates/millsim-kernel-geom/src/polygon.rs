//! Closed polygons and containment.

use serde::{Deserialize, Serialize};

use crate::{cross2, Point2, EPSILON};

/// A closed 2D polygon.
///
/// Vertices are stored counter-clockwise without repeating the first vertex
/// at the end. Consecutive duplicate vertices are dropped on construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Point2>", into = "Vec<Point2>")]
pub struct Polygon {
    points: Vec<Point2>,
}

impl Polygon {
    /// Create a polygon from its vertices, normalizing winding and closure.
    pub fn new(points: impl IntoIterator<Item = Point2>) -> Self {
        let mut pts: Vec<Point2> = Vec::new();
        for p in points {
            if pts.last().is_some_and(|q: &Point2| (p - q).norm() <= EPSILON) {
                continue;
            }
            pts.push(p);
        }
        while pts.len() > 1 && (pts[0] - pts[pts.len() - 1]).norm() <= EPSILON {
            pts.pop();
        }
        let mut polygon = Self { points: pts };
        if polygon.signed_area() < 0.0 {
            polygon.points.reverse();
        }
        polygon
    }

    /// Axis-aligned rectangle from its corners.
    pub fn rectangle(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self::new([
            Point2::new(min_x, min_y),
            Point2::new(max_x, min_y),
            Point2::new(max_x, max_y),
            Point2::new(min_x, max_y),
        ])
    }

    /// Vertices in counter-clockwise order.
    pub fn points(&self) -> &[Point2] {
        &self.points
    }

    /// Number of vertices.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the polygon has no vertices.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// A polygon is usable when it has at least three vertices and a
    /// non-zero area.
    pub fn is_valid(&self) -> bool {
        self.points.len() >= 3 && self.area() > EPSILON
    }

    /// Signed area. Positive for counter-clockwise.
    pub fn signed_area(&self) -> f64 {
        let n = self.points.len();
        if n < 3 {
            return 0.0;
        }
        let mut area = 0.0;
        for i in 0..n {
            let j = (i + 1) % n;
            area += self.points[i].x * self.points[j].y;
            area -= self.points[j].x * self.points[i].y;
        }
        area / 2.0
    }

    /// Unsigned area.
    pub fn area(&self) -> f64 {
        self.signed_area().abs()
    }

    /// Is the polygon counter-clockwise?
    pub fn is_ccw(&self) -> bool {
        self.signed_area() > 0.0
    }

    /// Perimeter length.
    pub fn perimeter(&self) -> f64 {
        self.edges().map(|(a, b)| (b - a).norm()).sum()
    }

    /// Bounding box as `(min, max)`, or `None` for an empty polygon.
    pub fn bounds(&self) -> Option<(Point2, Point2)> {
        let first = self.points.first()?;
        let mut min = *first;
        let mut max = *first;
        for p in &self.points[1..] {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
        }
        Some((min, max))
    }

    /// Iterate over the closed edge loop as `(start, end)` pairs.
    pub fn edges(&self) -> impl Iterator<Item = (Point2, Point2)> + '_ {
        let n = self.points.len();
        (0..if n >= 2 { n } else { 0 }).map(move |i| (self.points[i], self.points[(i + 1) % n]))
    }

    /// Vertices with the first one repeated at the end.
    pub fn ring(&self) -> Vec<Point2> {
        let mut ring = self.points.clone();
        if let Some(first) = self.points.first() {
            ring.push(*first);
        }
        ring
    }

    /// Even-odd containment test. See [`check_point_in_polygon`].
    pub fn contains(&self, point: &Point2) -> bool {
        check_point_in_polygon(point, self)
    }

    /// True when no two non-adjacent edges intersect.
    pub fn is_simple(&self) -> bool {
        let n = self.points.len();
        if n < 4 {
            return n == 3;
        }
        for i in 0..n {
            let a0 = self.points[i];
            let a1 = self.points[(i + 1) % n];
            for j in (i + 2)..n {
                // Edge n-1 shares a vertex with edge 0.
                if i == 0 && j == n - 1 {
                    continue;
                }
                let b0 = self.points[j];
                let b1 = self.points[(j + 1) % n];
                if segments_intersect(&a0, &a1, &b0, &b1) {
                    return false;
                }
            }
        }
        true
    }
}

impl From<Vec<Point2>> for Polygon {
    fn from(points: Vec<Point2>) -> Self {
        Self::new(points)
    }
}

impl From<Polygon> for Vec<Point2> {
    fn from(polygon: Polygon) -> Self {
        polygon.points
    }
}

/// Even-odd ray-casting containment test.
///
/// Edges are treated as half-open in Y (the lower endpoint is included, the
/// upper excluded) so a vertex on the ray is counted exactly once. Points
/// exactly on the boundary are therefore classified deterministically but
/// arbitrarily: on a left or bottom edge of a rectangle they are inside, on
/// a right or top edge outside.
pub fn check_point_in_polygon(point: &Point2, polygon: &Polygon) -> bool {
    let pts = polygon.points();
    let n = pts.len();
    if n < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let pi = &pts[i];
        let pj = &pts[j];
        if ((pi.y > point.y) != (pj.y > point.y))
            && (point.x < (pj.x - pi.x) * (point.y - pi.y) / (pj.y - pi.y) + pi.x)
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Proper or touching intersection test between segments `a0-a1` and `b0-b1`.
pub fn segments_intersect(a0: &Point2, a1: &Point2, b0: &Point2, b1: &Point2) -> bool {
    let d1 = cross2(&(a1 - a0), &(b0 - a0));
    let d2 = cross2(&(a1 - a0), &(b1 - a0));
    let d3 = cross2(&(b1 - b0), &(a0 - b0));
    let d4 = cross2(&(b1 - b0), &(a1 - b0));

    if ((d1 > EPSILON && d2 < -EPSILON) || (d1 < -EPSILON && d2 > EPSILON))
        && ((d3 > EPSILON && d4 < -EPSILON) || (d3 < -EPSILON && d4 > EPSILON))
    {
        return true;
    }

    let on_segment = |p: &Point2, q: &Point2, r: &Point2| {
        r.x >= p.x.min(q.x) - EPSILON
            && r.x <= p.x.max(q.x) + EPSILON
            && r.y >= p.y.min(q.y) - EPSILON
            && r.y <= p.y.max(q.y) + EPSILON
    };
    (d1.abs() <= EPSILON && on_segment(a0, a1, b0))
        || (d2.abs() <= EPSILON && on_segment(a0, a1, b1))
        || (d3.abs() <= EPSILON && on_segment(b0, b1, a0))
        || (d4.abs() <= EPSILON && on_segment(b0, b1, a1))
}
