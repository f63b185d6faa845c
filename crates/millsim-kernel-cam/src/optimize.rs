//! Post-processing that re-chains cutting runs.

use millsim_kernel_geom::{xy, Point3};

use crate::Toolpath;

/// A stretch of the toolpath below clearance height.
struct Run {
    level: f64,
    points: Vec<Point3>,
}

/// Re-chain cutting runs to shorten clearance-height travel.
///
/// The toolpath is split wherever it rises to `clearance_height`. Each run
/// below clearance is kept intact, entry move included. Runs are reordered
/// greedily, but only among runs that cut at the same level, so deeper
/// levels are never machined before shallower ones. Clearance travel is
/// rebuilt around the new order.
pub fn optimize_path(toolpath: &Toolpath, clearance_height: f64) -> Toolpath {
    let mut runs = split_runs(toolpath.points(), clearance_height);
    if runs.len() < 2 {
        return toolpath.clone();
    }

    let mut ordered: Vec<Run> = Vec::with_capacity(runs.len());
    let mut current = runs.remove(0);
    loop {
        let exit = current.points.last().map(xy);
        let level = current.level;
        ordered.push(current);
        if runs.is_empty() {
            break;
        }
        let next = exit
            .and_then(|exit| {
                runs.iter()
                    .enumerate()
                    .filter(|(_, run)| (run.level - level).abs() <= 1e-9)
                    .map(|(i, run)| {
                        let gap = run.points.first().map_or(f64::MAX, |p| (xy(p) - exit).norm());
                        (i, gap)
                    })
                    .min_by(|a, b| a.1.total_cmp(&b.1))
                    .map(|(i, _)| i)
            })
            .unwrap_or(0);
        current = runs.remove(next);
    }

    let mut points = Vec::with_capacity(toolpath.len());
    for run in &ordered {
        if let (Some(first), Some(last)) = (run.points.first(), run.points.last()) {
            points.push(Point3::new(first.x, first.y, clearance_height));
            points.extend_from_slice(&run.points);
            points.push(Point3::new(last.x, last.y, clearance_height));
        }
    }
    points.dedup_by(|a, b| (*a - *b).norm() <= 1e-12);
    Toolpath::new(points)
}

fn split_runs(points: &[Point3], clearance_height: f64) -> Vec<Run> {
    let mut runs = Vec::new();
    let mut current: Vec<Point3> = Vec::new();
    for p in points {
        if p.z < clearance_height - 1e-9 {
            current.push(*p);
        } else if !current.is_empty() {
            runs.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs.into_iter()
        .map(|points| Run {
            level: points.iter().map(|p| p.z).fold(f64::MAX, f64::min),
            points,
        })
        .collect()
}
