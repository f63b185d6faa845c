#![warn(missing_docs)]

//! 2D geometry kernel for millsim toolpath planning.
//!
//! Thin nalgebra aliases plus the handful of polygon operations the planner
//! is built on: contour offsetting, parallel raster lines, point-in-polygon,
//! segment clipping against a boundary with obstacles, and greedy chaining
//! of disjoint paths.
//!
//! # Example
//!
//! ```
//! use millsim_kernel_geom::{offset_contour, OffsetDirection, Point2, Polygon};
//!
//! let square = Polygon::rectangle(0.0, 0.0, 10.0, 10.0);
//! let inset = offset_contour(&square, 1.0, OffsetDirection::Inward).unwrap();
//! assert!((inset.area() - 64.0).abs() < 1e-9);
//! assert!(inset.contains(&Point2::new(5.0, 5.0)));
//! ```

mod chain;
mod clip;
mod offset;
mod polygon;

pub use chain::{optimize_path_connections, Path2};
pub use clip::{clip_line_to_polygon, generate_parallel_paths, Segment2};
pub use offset::{offset_contour, OffsetDirection};
pub use polygon::{check_point_in_polygon, segments_intersect, Polygon};

use nalgebra::{Vector2, Vector3};

/// A point in the XY plane.
pub type Point2 = nalgebra::Point2<f64>;

/// A vector in the XY plane.
pub type Vec2 = Vector2<f64>;

/// A point in 3D machine space.
pub type Point3 = nalgebra::Point3<f64>;

/// A vector in 3D machine space.
pub type Vec3 = Vector3<f64>;

/// Geometric tolerance used for degeneracy tests (mm).
pub const EPSILON: f64 = 1e-9;

/// 2D cross product (z component of the 3D cross product).
#[inline]
pub fn cross2(a: &Vec2, b: &Vec2) -> f64 {
    a.x * b.y - a.y * b.x
}

/// Drop the Z coordinate of a point.
#[inline]
pub fn xy(p: &Point3) -> Point2 {
    Point2::new(p.x, p.y)
}
