//! Raster line generation and segment clipping.

use crate::{cross2, Point2, Polygon, Vec2, EPSILON};

/// A straight segment as `[start, end]`.
pub type Segment2 = [Point2; 2];

/// Generate parallel lines at `angle` (radians) spaced `spacing` apart.
///
/// Lines cover the boundary's bounding box and run past it on both ends,
/// so every line fully crosses the region; they are not clipped. Lines are
/// ordered along the perpendicular direction, the first one half a spacing
/// in from the box edge.
pub fn generate_parallel_paths(boundary: &Polygon, spacing: f64, angle: f64) -> Vec<Segment2> {
    let Some((min, max)) = boundary.bounds() else {
        return Vec::new();
    };
    if !(spacing > EPSILON) || !spacing.is_finite() || !angle.is_finite() {
        return Vec::new();
    }

    let (sin_a, cos_a) = angle.sin_cos();
    let dir = Vec2::new(cos_a, sin_a);
    let perp = Vec2::new(-sin_a, cos_a);

    let corners = [
        Point2::new(min.x, min.y),
        Point2::new(max.x, min.y),
        Point2::new(max.x, max.y),
        Point2::new(min.x, max.y),
    ];

    let mut perp_min = f64::MAX;
    let mut perp_max = f64::MIN;
    let mut along_min = f64::MAX;
    let mut along_max = f64::MIN;
    for corner in &corners {
        let perp_proj = corner.coords.dot(&perp);
        let along_proj = corner.coords.dot(&dir);
        perp_min = perp_min.min(perp_proj);
        perp_max = perp_max.max(perp_proj);
        along_min = along_min.min(along_proj);
        along_max = along_max.max(along_proj);
    }
    along_min -= spacing;
    along_max += spacing;

    let mut lines = Vec::new();
    let mut offset = perp_min + spacing / 2.0;
    while offset < perp_max {
        let origin = Point2::from(perp * offset);
        lines.push([origin + dir * along_min, origin + dir * along_max]);
        offset += spacing;
    }
    lines
}

/// Clip segment `a -> b` to the inside of `boundary` and the outside of
/// every obstacle.
///
/// Returns the surviving pieces ordered from `a` to `b`. Adjacent pieces
/// that touch are merged.
pub fn clip_line_to_polygon(
    a: &Point2,
    b: &Point2,
    boundary: &Polygon,
    obstacles: &[Polygon],
) -> Vec<Segment2> {
    let d = b - a;
    if d.norm() <= EPSILON || boundary.len() < 3 {
        return Vec::new();
    }

    let mut params = vec![0.0, 1.0];
    for polygon in std::iter::once(boundary).chain(obstacles.iter()) {
        for (p, q) in polygon.edges() {
            if let Some(t) = segment_param(a, &d, &p, &q) {
                params.push(t);
            }
        }
    }
    params.sort_by(|x, y| x.total_cmp(y));
    params.dedup_by(|x, y| (*x - *y).abs() <= EPSILON);

    let mut spans: Vec<(f64, f64)> = Vec::new();
    for w in params.windows(2) {
        let (t0, t1) = (w[0], w[1]);
        if t1 - t0 <= EPSILON {
            continue;
        }
        let mid = a + d * ((t0 + t1) / 2.0);
        let keep = boundary.contains(&mid) && !obstacles.iter().any(|o| o.contains(&mid));
        if !keep {
            continue;
        }
        match spans.last_mut() {
            Some(last) if (last.1 - t0).abs() <= EPSILON => last.1 = t1,
            _ => spans.push((t0, t1)),
        }
    }

    spans
        .into_iter()
        .map(|(t0, t1)| [a + d * t0, a + d * t1])
        .collect()
}

/// Parameter along `a + t*d` where it meets segment `p-q`, if within both.
fn segment_param(a: &Point2, d: &Vec2, p: &Point2, q: &Point2) -> Option<f64> {
    let e = q - p;
    let denom = cross2(d, &e);
    if denom.abs() < 1e-12 {
        return None;
    }
    let ap = p - a;
    let t = cross2(&ap, &e) / denom;
    let u = cross2(&ap, d) / denom;
    ((-EPSILON..=1.0 + EPSILON).contains(&t) && (-EPSILON..=1.0 + EPSILON).contains(&u))
        .then(|| t.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parallel_paths_horizontal() {
        let rect = Polygon::rectangle(0.0, 0.0, 10.0, 4.0);
        let lines = generate_parallel_paths(&rect, 1.0, 0.0);
        assert_eq!(lines.len(), 4);
        for (i, [p0, p1]) in lines.iter().enumerate() {
            assert!((p0.y - (0.5 + i as f64)).abs() < 1e-9);
            assert!((p1.y - p0.y).abs() < 1e-9);
            assert!(p0.x < 0.0 && p1.x > 10.0);
        }
    }

    #[test]
    fn test_parallel_paths_angled_spacing() {
        let rect = Polygon::rectangle(0.0, 0.0, 10.0, 10.0);
        let angle = 45f64.to_radians();
        let lines = generate_parallel_paths(&rect, 2.0, angle);
        assert!(lines.len() >= 7);
        let perp = Vec2::new(-angle.sin(), angle.cos());
        for w in lines.windows(2) {
            let gap = (w[1][0] - w[0][0]).dot(&perp);
            assert!((gap - 2.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_parallel_paths_bad_spacing() {
        let rect = Polygon::rectangle(0.0, 0.0, 10.0, 10.0);
        assert!(generate_parallel_paths(&rect, 0.0, 0.0).is_empty());
        assert!(generate_parallel_paths(&rect, f64::NAN, 0.0).is_empty());
    }

    #[test]
    fn test_clip_to_boundary() {
        let rect = Polygon::rectangle(0.0, 0.0, 10.0, 10.0);
        let pieces =
            clip_line_to_polygon(&Point2::new(-5.0, 5.0), &Point2::new(15.0, 5.0), &rect, &[]);
        assert_eq!(pieces.len(), 1);
        assert!((pieces[0][0].x - 0.0).abs() < 1e-9);
        assert!((pieces[0][1].x - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_clip_with_obstacle() {
        let rect = Polygon::rectangle(0.0, 0.0, 10.0, 10.0);
        let hole = Polygon::rectangle(4.0, 4.0, 6.0, 6.0);
        let pieces =
            clip_line_to_polygon(&Point2::new(-1.0, 5.0), &Point2::new(11.0, 5.0), &rect, &[hole]);
        assert_eq!(pieces.len(), 2);
        assert!((pieces[0][1].x - 4.0).abs() < 1e-9);
        assert!((pieces[1][0].x - 6.0).abs() < 1e-9);
        // Order follows a -> b.
        assert!(pieces[0][0].x < pieces[1][0].x);
    }

    #[test]
    fn test_clip_reverse_direction() {
        let rect = Polygon::rectangle(0.0, 0.0, 10.0, 10.0);
        let pieces =
            clip_line_to_polygon(&Point2::new(12.0, 2.0), &Point2::new(-2.0, 2.0), &rect, &[]);
        assert_eq!(pieces.len(), 1);
        assert!((pieces[0][0].x - 10.0).abs() < 1e-9);
        assert!((pieces[0][1].x - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_clip_miss() {
        let rect = Polygon::rectangle(0.0, 0.0, 10.0, 10.0);
        let pieces =
            clip_line_to_polygon(&Point2::new(-5.0, 20.0), &Point2::new(15.0, 20.0), &rect, &[]);
        assert!(pieces.is_empty());
    }

    #[test]
    fn test_clip_concave_boundary() {
        let u = Polygon::new(vec![
            Point2::new(0.0, 0.0),
            Point2::new(3.0, 0.0),
            Point2::new(3.0, 3.0),
            Point2::new(2.0, 3.0),
            Point2::new(2.0, 1.0),
            Point2::new(1.0, 1.0),
            Point2::new(1.0, 3.0),
            Point2::new(0.0, 3.0),
        ]);
        let pieces = clip_line_to_polygon(&Point2::new(-1.0, 2.0), &Point2::new(4.0, 2.0), &u, &[]);
        assert_eq!(pieces.len(), 2);
    }
}
