//! Toolpath generation for contour and pocket operations.

use millsim_kernel_geom::{xy, Path2, Point3, Polygon};
use tracing::debug;

use crate::{CamError, Result, Toolpath, ToolpathKind, ToolpathParameters};

mod contour;
mod entry;
mod pocket;

pub use entry::{helix_entry, plunge_entry, ramp_entry, HELIX_SEGMENTS_PER_REV};
pub use pocket::compute_z_levels;

/// Upper bound on offset rings per level.
pub const MAX_OFFSET_PASSES: usize = 100;

/// Plans tool-center paths inside or around a 2D boundary.
///
/// The generator only holds the boundary; strategy, entry kind and every
/// other choice come from the [`ToolpathParameters`] of each call, so one
/// generator can serve many requests.
#[derive(Debug, Clone)]
pub struct ToolpathGenerator {
    boundary: Polygon,
}

impl ToolpathGenerator {
    /// Create a generator for a boundary.
    pub fn new(boundary: Polygon) -> Result<Self> {
        if !boundary.is_valid() {
            return Err(CamError::EmptyBoundary);
        }
        Ok(Self { boundary })
    }

    /// The boundary being machined.
    pub fn boundary(&self) -> &Polygon {
        &self.boundary
    }

    /// Generate the toolpath for an operation.
    pub fn generate_toolpath(&self, params: &ToolpathParameters) -> Result<Toolpath> {
        params.validate()?;
        let toolpath = match params.kind {
            ToolpathKind::Contour => contour::generate(&self.boundary, params),
            ToolpathKind::Pocket => pocket::generate(&self.boundary, params),
            kind @ (ToolpathKind::Drill
                 | ToolpathKind::Surface
                 | ToolpathKind::Thread
                 | ToolpathKind::Chamfer) => {
                return Err(CamError::UnsupportedOperation(kind));
            }
        };
        debug!(
            kind = params.kind.name(),
            strategy = ?params.pocket_strategy,
            entry = ?params.entry,
            points = toolpath.len(),
            "generated toolpath"
        );
        Ok(toolpath)
    }

    /// 2D cutting paths of a pocket at one level, before stitching.
    pub fn pocket_level_paths(&self, params: &ToolpathParameters, z: f64) -> Result<Vec<Path2>> {
        params.validate()?;
        Ok(pocket::level_paths(&self.boundary, params, z))
    }
}

/// Cutting paths that share one Z.
pub(crate) struct Level {
    pub z: f64,
    pub paths: Vec<Path2>,
}

/// Join levels into one 3D path with clearance travel and entry moves.
pub(crate) fn stitch(levels: &[Level], params: &ToolpathParameters) -> Toolpath {
    let clearance = params.clearance_height;
    let mut out: Vec<Point3> = Vec::new();
    let mut previous_z: Option<f64> = None;

    for level in levels {
        if level.paths.is_empty() {
            continue;
        }
        let entry_top =
            (previous_z.unwrap_or(params.start_z) + params.retract_height).min(clearance);

        for path in &level.paths {
            let cut = path.traversal();
            let Some(&start) = cut.first() else { continue };

            let continues = out.last().is_some_and(|last| {
                (last.z - level.z).abs() <= 1e-9 && (xy(last) - start).norm() <= params.tolerance
            });
            if !continues {
                if let Some(&last) = out.last() {
                    push(&mut out, Point3::new(last.x, last.y, clearance));
                }
                push(&mut out, Point3::new(start.x, start.y, clearance));
                for p in entry::entry_move(params, &cut, entry_top, level.z) {
                    push(&mut out, p);
                }
            }
            for p in &cut[1..] {
                push(&mut out, Point3::new(p.x, p.y, level.z));
            }
        }

        if let Some(&last) = out.last() {
            push(&mut out, Point3::new(last.x, last.y, clearance));
        }
        previous_z = Some(level.z);
    }
    Toolpath::new(out)
}

fn push(out: &mut Vec<Point3>, p: Point3) {
    if out.last().is_some_and(|last| (last - p).norm() <= 1e-12) {
        return;
    }
    out.push(p);
}
