//! Polygon offsetting by edge-line intersection.

use serde::{Deserialize, Serialize};

use crate::{cross2, Point2, Polygon, Vec2, EPSILON};

/// Side to which [`offset_contour`] moves the edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OffsetDirection {
    /// Shrink the polygon.
    Inward,
    /// Grow the polygon.
    Outward,
}

/// Corners whose miter vertex would land further than this many offset
/// distances from the original corner are beveled.
const MITER_LIMIT: f64 = 2.0;

/// An infinite line through `origin` running along unit vector `dir`.
#[derive(Debug, Clone, Copy)]
struct Line {
    origin: Point2,
    dir: Vec2,
}

impl Line {
    fn intersect(&self, other: &Line) -> Option<Point2> {
        let denom = cross2(&self.dir, &other.dir);
        if denom.abs() < 1e-12 {
            return None;
        }
        let t = cross2(&(other.origin - self.origin), &other.dir) / denom;
        Some(self.origin + self.dir * t)
    }
}

/// Offset a polygon by moving every edge `distance` along its normal.
///
/// New vertices are the intersections of adjacent offset edge lines. Edges
/// that reverse direction under the offset are dropped and the remaining
/// lines re-intersected, which lets a shrinking polygon lose short edges.
/// Convex corners that would spike further than twice the offset distance
/// are beveled.
///
/// Returns `None` when the result degenerates: fewer than three edges left,
/// adjacent lines parallel, zero area, flipped winding or a
/// self-intersection. A negative distance offsets to the opposite side.
///
/// Offsetting a convex polygon outward and then inward by the same distance
/// reproduces the original vertices. For non-convex polygons, or when a
/// bevel was inserted, the round trip is not exact.
pub fn offset_contour(
    polygon: &Polygon,
    distance: f64,
    direction: OffsetDirection,
) -> Option<Polygon> {
    if !polygon.is_valid() || !distance.is_finite() {
        return None;
    }
    if distance.abs() <= EPSILON {
        return Some(polygon.clone());
    }

    // Inward is the left-hand side of a counter-clockwise edge.
    let shift = match direction {
        OffsetDirection::Inward => distance,
        OffsetDirection::Outward => -distance,
    };

    let edges = merged_edges(polygon);
    if edges.len() < 3 {
        return None;
    }

    let mut lines: Vec<(Line, Line)> = edges
        .iter()
        .map(|base| {
            let normal = Vec2::new(-base.dir.y, base.dir.x);
            let moved = Line {
                origin: base.origin + normal * shift,
                dir: base.dir,
            };
            (*base, moved)
        })
        .collect();

    let vertices = loop {
        if lines.len() < 3 {
            return None;
        }
        if let Some(i) = parallel_neighbour(&lines) {
            let n = lines.len();
            let next = (i + 1) % n;
            let (a, b) = (lines[i].1, lines[next].1);
            if a.dir.dot(&b.dir) < 0.0 {
                // Opposite walls with nothing left between them: the gap closed.
                lines.remove(i.max(next));
                lines.remove(i.min(next));
            } else if cross2(&(b.origin - a.origin), &a.dir).abs() <= EPSILON {
                lines.remove(next);
            } else {
                return None;
            }
            continue;
        }
        let vertices = corner_vertices(&lines)?;
        let n = lines.len();
        let keep: Vec<bool> = (0..n)
            .map(|i| {
                let along = (vertices[(i + 1) % n] - vertices[i]).dot(&lines[i].1.dir);
                along > EPSILON
            })
            .collect();
        if keep.iter().all(|k| *k) {
            break vertices;
        }
        if keep.iter().all(|k| !*k) {
            return None;
        }
        lines = lines
            .into_iter()
            .zip(keep)
            .filter_map(|(l, k)| k.then_some(l))
            .collect();
    };

    let d = distance.abs();
    let limit = MITER_LIMIT * d;
    // Distance along an offset edge from the foot of the corner to where it
    // is `limit` away from the corner.
    let run = (limit * limit - d * d).sqrt();
    let n = lines.len();
    let mut points = Vec::with_capacity(n + 4);
    for i in 0..n {
        let (prev_base, prev) = lines[(i + n - 1) % n];
        let (cur_base, cur) = lines[i];
        let miter = vertices[i];
        let Some(corner) = prev_base.intersect(&cur_base) else {
            points.push(miter);
            continue;
        };

        let n_prev = (prev.origin - prev_base.origin) / d;
        let n_cur = (cur.origin - cur_base.origin) / d;
        let spike = miter - corner;
        if spike.norm() > limit && spike.dot(&(n_prev + n_cur)) > 0.0 {
            points.push(corner + n_prev * d + prev.dir * run);
            points.push(corner + n_cur * d - cur.dir * run);
        } else {
            points.push(miter);
        }
    }

    let result = Polygon::new(points);
    let expected_ccw = polygon.signed_area() > 0.0;
    if result.len() < 3 || result.area() <= EPSILON || !result.is_simple() {
        return None;
    }
    // Polygon::new normalizes winding, so compare against the raw vertex loop.
    if (raw_signed_area(&vertices) > 0.0) != expected_ccw {
        return None;
    }
    Some(result)
}

/// Edge lines of the polygon with collinear neighbours merged.
fn merged_edges(polygon: &Polygon) -> Vec<Line> {
    let mut lines: Vec<Line> = polygon
        .edges()
        .filter_map(|(a, b)| {
            let d = b - a;
            let len = d.norm();
            (len > EPSILON).then(|| Line {
                origin: a,
                dir: d / len,
            })
        })
        .collect();

    let mut i = 0;
    while lines.len() >= 3 && i < lines.len() {
        let n = lines.len();
        let next = (i + 1) % n;
        let a = lines[i].dir;
        let b = lines[next].dir;
        if cross2(&a, &b).abs() < 1e-12 && a.dot(&b) > 0.0 {
            lines.remove(next);
            if next < i {
                i -= 1;
            }
        } else {
            i += 1;
        }
    }
    lines
}

/// Index of the first offset line that is parallel to the next one.
fn parallel_neighbour(lines: &[(Line, Line)]) -> Option<usize> {
    let n = lines.len();
    (0..n).find(|&i| cross2(&lines[i].1.dir, &lines[(i + 1) % n].1.dir).abs() < 1e-12)
}

/// Vertex `i` sits between offset line `i - 1` and offset line `i`.
fn corner_vertices(lines: &[(Line, Line)]) -> Option<Vec<Point2>> {
    let n = lines.len();
    (0..n)
        .map(|i| lines[(i + n - 1) % n].1.intersect(&lines[i].1))
        .collect()
}

fn raw_signed_area(points: &[Point2]) -> f64 {
    let n = points.len();
    let mut area = 0.0;
    for i in 0..n {
        let j = (i + 1) % n;
        area += points[i].x * points[j].y - points[j].x * points[i].y;
    }
    area / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn hexagon(r: f64) -> Polygon {
        Polygon::new((0..6).map(|i| {
            let a = i as f64 * std::f64::consts::PI / 3.0;
            Point2::new(r * a.cos(), r * a.sin())
        }))
    }

    #[test]
    fn test_inward_square() {
        let square = Polygon::rectangle(0.0, 0.0, 10.0, 10.0);
        let inset = offset_contour(&square, 1.0, OffsetDirection::Inward).unwrap();
        assert_abs_diff_eq!(inset.area(), 64.0, epsilon = 1e-9);
        let (min, max) = inset.bounds().unwrap();
        assert_abs_diff_eq!(min.x, 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(max.y, 9.0, epsilon = 1e-9);
    }

    #[test]
    fn test_outward_square() {
        let square = Polygon::rectangle(0.0, 0.0, 10.0, 10.0);
        let grown = offset_contour(&square, 2.0, OffsetDirection::Outward).unwrap();
        assert_abs_diff_eq!(grown.area(), 196.0, epsilon = 1e-9);
    }

    #[test]
    fn test_collapse_returns_none() {
        let rect = Polygon::rectangle(0.0, 0.0, 50.0, 30.0);
        assert!(offset_contour(&rect, 14.9, OffsetDirection::Inward).is_some());
        assert!(offset_contour(&rect, 15.0, OffsetDirection::Inward).is_none());
        assert!(offset_contour(&rect, 20.0, OffsetDirection::Inward).is_none());
    }

    #[test]
    fn test_negative_distance_flips_side() {
        let square = Polygon::rectangle(0.0, 0.0, 10.0, 10.0);
        let a = offset_contour(&square, -1.0, OffsetDirection::Inward).unwrap();
        let b = offset_contour(&square, 1.0, OffsetDirection::Outward).unwrap();
        assert_abs_diff_eq!(a.area(), b.area(), epsilon = 1e-9);
    }

    #[test]
    fn test_round_trip_convex() {
        let hex = hexagon(20.0);
        let grown = offset_contour(&hex, 3.0, OffsetDirection::Outward).unwrap();
        let back = offset_contour(&grown, 3.0, OffsetDirection::Inward).unwrap();
        assert_eq!(back.len(), hex.len());
        for p in hex.points() {
            let nearest = back
                .points()
                .iter()
                .map(|q| (q - p).norm())
                .fold(f64::MAX, f64::min);
            assert!(nearest < 1e-6, "vertex {p:?} drifted by {nearest}");
        }
    }

    #[test]
    fn test_sharp_corner_beveled() {
        let sliver = Polygon::new(vec![
            Point2::new(0.0, 0.0),
            Point2::new(20.0, 0.0),
            Point2::new(0.0, 2.0),
        ]);
        let grown = offset_contour(&sliver, 1.0, OffsetDirection::Outward).unwrap();
        assert!(grown.len() > 3);
        // An unbeveled miter at the sharp tip would reach x ~ 40.
        let (_, max) = grown.bounds().unwrap();
        assert!(max.x < 20.0 + MITER_LIMIT + 1e-6);
        assert!(grown.contains(&Point2::new(19.0, 0.0)));
    }

    #[test]
    fn test_bevel_points_on_limit_circle() {
        let sliver = Polygon::new(vec![
            Point2::new(0.0, 0.0),
            Point2::new(20.0, 0.0),
            Point2::new(0.0, 2.0),
        ]);
        let grown = offset_contour(&sliver, 1.0, OffsetDirection::Outward).unwrap();
        assert_eq!(grown.len(), 4);
        let tip = Point2::new(20.0, 0.0);
        let on_circle = grown
            .points()
            .iter()
            .filter(|p| ((*p - tip).norm() - MITER_LIMIT).abs() < 1e-9)
            .count();
        assert_eq!(on_circle, 2);
    }

    fn slotted_block() -> Polygon {
        Polygon::new(vec![
            Point2::new(40.0, 20.0),
            Point2::new(60.0, 20.0),
            Point2::new(60.0, 40.0),
            Point2::new(52.0, 40.0),
            Point2::new(52.0, 25.0),
            Point2::new(48.0, 25.0),
            Point2::new(48.0, 40.0),
            Point2::new(40.0, 40.0),
        ])
    }

    #[test]
    fn test_outward_offset_closes_narrow_slot() {
        let grown = offset_contour(&slotted_block(), 5.0, OffsetDirection::Outward).unwrap();
        assert_eq!(grown.len(), 4);
        assert_abs_diff_eq!(grown.area(), 900.0, epsilon = 1e-9);
        let (min, max) = grown.bounds().unwrap();
        assert_abs_diff_eq!(min.x, 35.0, epsilon = 1e-9);
        assert_abs_diff_eq!(min.y, 15.0, epsilon = 1e-9);
        assert_abs_diff_eq!(max.x, 65.0, epsilon = 1e-9);
        assert_abs_diff_eq!(max.y, 45.0, epsilon = 1e-9);
        assert!(grown.contains(&Point2::new(50.0, 35.0)));
    }

    #[test]
    fn test_outward_offset_keeps_wide_slot() {
        let grown = offset_contour(&slotted_block(), 1.0, OffsetDirection::Outward).unwrap();
        assert_eq!(grown.len(), 8);
        assert!(!grown.contains(&Point2::new(50.0, 35.0)));
        assert!(grown.contains(&Point2::new(50.0, 25.5)));
    }

    #[test]
    fn test_concave_inset_stays_simple() {
        let l_shape = Polygon::new(vec![
            Point2::new(0.0, 0.0),
            Point2::new(20.0, 0.0),
            Point2::new(20.0, 10.0),
            Point2::new(10.0, 10.0),
            Point2::new(10.0, 20.0),
            Point2::new(0.0, 20.0),
        ]);
        let inset = offset_contour(&l_shape, 2.0, OffsetDirection::Inward).unwrap();
        assert!(inset.is_simple());
        assert!(inset.area() < l_shape.area());
        assert!(inset.contains(&Point2::new(5.0, 5.0)));
        assert!(!inset.contains(&Point2::new(15.0, 15.0)));
    }

    #[test]
    fn test_degenerate_input() {
        let line = Polygon::new(vec![Point2::new(0.0, 0.0), Point2::new(1.0, 0.0)]);
        assert!(offset_contour(&line, 1.0, OffsetDirection::Outward).is_none());
        let square = Polygon::rectangle(0.0, 0.0, 1.0, 1.0);
        assert!(offset_contour(&square, f64::NAN, OffsetDirection::Outward).is_none());
    }
}
