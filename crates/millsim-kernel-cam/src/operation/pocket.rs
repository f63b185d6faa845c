//! Multi-level pocket clearing.

use millsim_kernel_geom::{
    clip_line_to_polygon, generate_parallel_paths, offset_contour, optimize_path_connections,
    OffsetDirection, Path2, Point2, Polygon,
};
use tracing::debug;

use super::{stitch, Level, MAX_OFFSET_PASSES};
use crate::{PocketStrategy, Toolpath, ToolpathParameters};

/// Cutting levels from `start_z` down to `start_z - pocket_depth`.
///
/// Levels step down by `step_down` while the remaining depth exceeds
/// `final_pass_depth`; the bottom is always appended once, so the last step
/// is a dedicated finishing pass.
pub fn compute_z_levels(
    start_z: f64,
    pocket_depth: f64,
    step_down: f64,
    final_pass_depth: f64,
) -> Vec<f64> {
    let bottom = start_z - pocket_depth;
    let mut levels = Vec::new();
    if step_down > 0.0 {
        let threshold = bottom + final_pass_depth;
        let mut k = 0usize;
        loop {
            let z = start_z - k as f64 * step_down;
            if z <= threshold + 1e-9 {
                break;
            }
            levels.push(z);
            k += 1;
        }
    }
    levels.push(bottom);
    levels
}

pub(crate) fn generate(boundary: &Polygon, params: &ToolpathParameters) -> Toolpath {
    let levels: Vec<Level> = compute_z_levels(
        params.start_z,
        params.pocket_depth,
        params.step_down,
        params.final_pass_depth,
    )
    .into_iter()
    .map(|z| Level {
        z,
        paths: level_paths(boundary, params, z),
    })
    .collect();
    stitch(&levels, params)
}

/// 2D cutting paths for one pocket level.
pub(crate) fn level_paths(boundary: &Polygon, params: &ToolpathParameters, z: f64) -> Vec<Path2> {
    let radius = params.tool.radius();
    let step = params.stepover_distance();

    // Tool center must stay a radius away from every active island.
    let islands: Vec<Polygon> = params
        .islands
        .iter()
        .filter(|island| island.is_active_at(z))
        .filter_map(|island| keep_out_zone(&island.polygon, radius))
        .collect();

    match params.pocket_strategy {
        PocketStrategy::Zigzag => {
            raster_passes(boundary, radius, step, params.raster_angle, &islands)
        }
        PocketStrategy::Spiral => {
            optimize_path_connections(offset_passes(boundary, radius, step, &islands))
        }
        PocketStrategy::Hybrid => {
            let mut paths = offset_passes(boundary, radius, step, &islands);
            paths.extend(raster_passes(boundary, radius, step, params.raster_angle, &islands));
            optimize_path_connections(paths)
        }
    }
}

/// Region the tool center must avoid around an island.
///
/// Falls back to the island's bounding box grown by `radius` when the
/// outline itself cannot be offset, so the tool never runs on the raw edge.
fn keep_out_zone(island: &Polygon, radius: f64) -> Option<Polygon> {
    if let Some(zone) = offset_contour(island, radius, OffsetDirection::Outward) {
        return Some(zone);
    }
    let (min, max) = island.bounds()?;
    debug!(vertices = island.len(), "island offset failed, keeping tool off its bounding box");
    Some(Polygon::rectangle(min.x - radius, min.y - radius, max.x + radius, max.y + radius))
}

/// Rings inset by `radius + k * step` until the inset degenerates.
fn offset_passes(boundary: &Polygon, radius: f64, step: f64, islands: &[Polygon]) -> Vec<Path2> {
    let mut paths = Vec::new();
    for k in 0..MAX_OFFSET_PASSES {
        let distance = radius + k as f64 * step;
        let Some(ring) = offset_contour(boundary, distance, OffsetDirection::Inward) else {
            break;
        };
        if islands.is_empty() {
            paths.push(Path2::closed(ring.points().to_vec()));
        } else {
            paths.extend(split_ring(&ring, boundary, islands));
        }
    }
    paths
}

/// Cut a ring where it crosses islands, joining the surviving edge pieces.
fn split_ring(ring: &Polygon, boundary: &Polygon, islands: &[Polygon]) -> Vec<Path2> {
    const JOIN_TOL: f64 = 1e-6;

    let mut pieces: Vec<Vec<Point2>> = Vec::new();
    let mut whole = true;
    for (a, b) in ring.edges() {
        let clipped = clip_line_to_polygon(&a, &b, boundary, islands);
        let edge_intact =
            clipped.len() == 1
                && (clipped[0][0] - a).norm() <= JOIN_TOL
                && (clipped[0][1] - b).norm() <= JOIN_TOL;
        whole &= edge_intact;
        for [p, q] in clipped {
            let joins = |current: &Vec<Point2>| {
                current.last().is_some_and(|last| (last - p).norm() <= JOIN_TOL)
            };
            match pieces.last_mut() {
                Some(current) if joins(current) => current.push(q),
                _ => pieces.push(vec![p, q]),
            }
        }
    }

    if whole {
        return vec![Path2::closed(ring.points().to_vec())];
    }

    // The ring's first and last pieces may meet at the seam.
    if pieces.len() > 1 {
        let ends = (
            pieces.first().and_then(|f| f.first()),
            pieces.last().and_then(|l| l.last()),
        );
        let seam = match ends {
            (Some(start), Some(end)) => (start - end).norm() <= JOIN_TOL,
            _ => false,
        };
        if seam {
            let first = pieces.remove(0);
            if let Some(last) = pieces.last_mut() {
                last.extend(first.into_iter().skip(1));
            }
        }
    }

    pieces.into_iter().filter(|p| p.len() >= 2).map(Path2::open).collect()
}

/// Raster lines across the tool-center region, alternating direction.
fn raster_passes(
    boundary: &Polygon,
    radius: f64,
    step: f64,
    angle_deg: f64,
    islands: &[Polygon],
) -> Vec<Path2> {
    let Some(region) = offset_contour(boundary, radius, OffsetDirection::Inward) else {
        return Vec::new();
    };

    let mut paths = Vec::new();
    let mut reverse = false;
    for [a, b] in generate_parallel_paths(&region, step, angle_deg.to_radians()) {
        let mut pieces = clip_line_to_polygon(&a, &b, &region, islands);
        if pieces.is_empty() {
            continue;
        }
        if reverse {
            pieces.reverse();
            for piece in &mut pieces {
                piece.swap(0, 1);
            }
        }
        reverse = !reverse;
        paths.extend(pieces.into_iter().map(|[p, q]| Path2::open(vec![p, q])));
    }
    paths
}
