#![warn(missing_docs)]

//! Stock simulation for millsim.
//!
//! Tracks which parts of a raw stock block still hold material while a tool
//! follows a toolpath. Occupancy lives in an adaptive voxel octree whose
//! leaves refine where small tools cut and merge back where larger ones pass.
//!
//! # Features
//!
//! - Rectangular and cylindrical stock with a size-adaptive octree
//! - Disc-footprint material removal at each tool position
//! - Parallel toolpath simulation with progress snapshots and cancellation
//! - Island verification against the untouched stock
//! - Boundary quad meshes of the current and original material
//!
//! # Example
//!
//! ```
//! use millsim_kernel_cam::Toolpath;
//! use millsim_kernel_geom::Point3;
//! use millsim_kernel_stocksim::{MaterialSimulator, SimulationOptions, StockParameters};
//!
//! let sim = MaterialSimulator::new(StockParameters::rectangular(100.0, 50.0, 25.0)).unwrap();
//! let toolpath = Toolpath::new(vec![
//!     Point3::new(10.0, 25.0, 20.0),
//!     Point3::new(90.0, 25.0, 20.0),
//! ]);
//!
//! let report = sim
//!     .simulate_toolpath(&toolpath, 10.0, &[], &SimulationOptions::default())
//!     .unwrap();
//! assert!(report.removed_volume > 0.0);
//! ```

mod field;
mod mesh;
mod octree;
mod report;
mod simulator;
mod stock;

pub use field::VoxelField;
pub use mesh::BoundaryMesh;
pub use octree::{AdaptiveVoxelGrid, NodeInfo, NodeKey, Occupancy, VoxelNode};
pub use report::{MachiningMetrics, SimulationReport};
pub use simulator::{MaterialSimulator, SimulationOptions, SimulationProgress};
pub use stock::{StockParameters, StockShape};

use thiserror::Error;

/// Errors from stock simulation operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StockSimError {
    /// Invalid stock bounds (zero, negative or non-finite dimensions).
    #[error("invalid stock bounds: {0}")]
    InvalidBounds(String),

    /// Inconsistent voxel sizes or refinement threshold.
    #[error("invalid resolution: {0}")]
    InvalidResolution(String),

    /// Tool diameter is not a positive finite number.
    #[error("invalid tool diameter: {0}")]
    InvalidTool(f64),

    /// Tool position has a non-finite coordinate.
    #[error("invalid tool position")]
    InvalidPosition,

    /// Feed rate is not a positive finite number.
    #[error("invalid feed rate: {0}")]
    InvalidFeedrate(f64),

    /// Point lies outside the octree.
    #[error("point outside the stock grid")]
    OutOfBounds,

    /// A simulation worker panicked.
    #[error("simulation worker panicked: {0}")]
    WorkerPanic(String),

    /// The run was cancelled before finishing.
    #[error("simulation cancelled")]
    Cancelled,

    /// The worker pool could not be created.
    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),
}

/// Result type for stock simulation operations.
pub type Result<T> = std::result::Result<T, StockSimError>;
