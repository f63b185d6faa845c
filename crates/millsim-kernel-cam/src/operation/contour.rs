//! Single-depth profile around a boundary.

use millsim_kernel_geom::{
    offset_contour, optimize_path_connections, OffsetDirection, Path2, Polygon,
};

use super::{stitch, Level, MAX_OFFSET_PASSES};
use crate::{ContourSide, Toolpath, ToolpathParameters};

pub(crate) fn generate(boundary: &Polygon, params: &ToolpathParameters) -> Toolpath {
    let paths = optimize_path_connections(contour_rings(boundary, params));
    let level = Level {
        z: params.bottom_z(),
        paths,
    };
    stitch(&[level], params)
}

/// Tool-center rings, nearest the boundary first.
pub(crate) fn contour_rings(boundary: &Polygon, params: &ToolpathParameters) -> Vec<Path2> {
    let radius = params.tool.radius();
    let step = params.stepover_distance();
    let (direction, passes) = match params.contour_side {
        ContourSide::Outside => (OffsetDirection::Outward, params.contour_passes),
        ContourSide::Inside => (OffsetDirection::Inward, MAX_OFFSET_PASSES),
    };

    (0..passes)
        .map_while(|k| offset_contour(boundary, radius + k as f64 * step, direction))
        .map(|ring| Path2::closed(ring.points().to_vec()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ToolParameters;

    #[test]
    fn test_outside_contour_single_ring() {
        let boundary = Polygon::rectangle(0.0, 0.0, 50.0, 30.0);
        let params = ToolpathParameters::default().with_tool(ToolParameters::end_mill(6.0));
        let rings = contour_rings(&boundary, &params);
        assert_eq!(rings.len(), 1);
        for p in &rings[0].points {
            let on_x = (p.x + 3.0).abs() < 1e-9 || (p.x - 53.0).abs() < 1e-9;
            let on_y = (p.y + 3.0).abs() < 1e-9 || (p.y - 33.0).abs() < 1e-9;
            assert!(on_x && on_y);
        }
    }

    #[test]
    fn test_outside_contour_passes() {
        let boundary = Polygon::rectangle(0.0, 0.0, 50.0, 30.0);
        let params = ToolpathParameters {
            contour_passes: 3,
            ..Default::default()
        };
        assert_eq!(contour_rings(&boundary, &params).len(), 3);
    }

    #[test]
    fn test_inside_contour_until_degenerate() {
        let boundary = Polygon::rectangle(0.0, 0.0, 50.0, 30.0);
        let params = ToolpathParameters::default()
            .with_tool(ToolParameters::end_mill(4.0))
            .with_contour_side(ContourSide::Inside);
        // Insets at 2, 4, ..., 14 survive; 16 overruns the 30 mm side.
        assert_eq!(contour_rings(&boundary, &params).len(), 7);
    }
}
