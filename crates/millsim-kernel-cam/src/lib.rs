#![warn(missing_docs)]

//! Toolpath planning for millsim.
//!
//! Turns a 2D boundary, optional islands and machining parameters into an
//! ordered sequence of 3D tool-center points.
//!
//! # Operations
//!
//! - [`ToolpathKind::Contour`] - single-depth profile inside or outside the boundary
//! - [`ToolpathKind::Pocket`] - multi-level clearing with zigzag, spiral or hybrid
//!   passes, per-level island avoidance and plunge/ramp/helix entry
//!
//! # Example
//!
//! ```
//! use millsim_kernel_cam::{
//!     EntryKind, PocketStrategy, ToolParameters, ToolpathGenerator, ToolpathParameters,
//! };
//! use millsim_kernel_geom::Polygon;
//!
//! let generator = ToolpathGenerator::new(Polygon::rectangle(0.0, 0.0, 100.0, 50.0)).unwrap();
//!
//! let params = ToolpathParameters::default()
//!     .with_tool(ToolParameters::end_mill(10.0))
//!     .with_strategy(PocketStrategy::Hybrid)
//!     .with_entry(EntryKind::Helix)
//!     .with_depths(0.0, 10.0, 4.0, 1.0);
//!
//! let toolpath = generator.generate_toolpath(&params).unwrap();
//! assert_eq!(toolpath.min_z(), Some(-10.0));
//! ```

mod error;
mod operation;
mod optimize;
mod params;
mod tool;
mod toolpath;

// Re-exports
pub use error::{CamError, Result};
pub use operation::{
    compute_z_levels, helix_entry, plunge_entry, ramp_entry, ToolpathGenerator,
    HELIX_SEGMENTS_PER_REV,
    MAX_OFFSET_PASSES,
};
pub use optimize::optimize_path;
pub use params::{ContourSide, EntryKind, Island, PocketStrategy, ToolpathKind, ToolpathParameters};
pub use tool::{CuttingParameters, ToolKind, ToolParameters};
pub use toolpath::Toolpath;
