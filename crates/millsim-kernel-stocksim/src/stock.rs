//! Raw stock description.

use millsim_kernel_geom::Point3;
use serde::{Deserialize, Serialize};

use crate::{Result, StockSimError};

/// Shape of the raw stock.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StockShape {
    /// Axis-aligned block with its minimum corner at the stock origin.
    Rectangular {
        /// Extent along X.
        length: f64,
        /// Extent along Y.
        width: f64,
        /// Extent along Z.
        height: f64,
    },
    /// Upright cylinder whose base circle is centered on the stock origin.
    Cylindrical {
        /// Cylinder diameter.
        diameter: f64,
        /// Extent along Z.
        height: f64,
    },
}

impl Default for StockShape {
    fn default() -> Self {
        Self::Rectangular {
            length: 100.0,
            width: 100.0,
            height: 25.0,
        }
    }
}

/// Stock geometry plus the voxel resolution policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StockParameters {
    /// Stock shape and dimensions.
    pub shape: StockShape,
    /// Base voxel edge length.
    pub voxel_size: f64,
    /// Stock origin: the minimum corner of a block, the base center of a cylinder.
    pub origin: [f64; 3],
    /// Smallest node edge the octree may create.
    pub min_voxel_size: f64,
    /// Parents at or above this edge length are never coarsened back.
    pub max_voxel_size: f64,
    /// A leaf is refined when the tool diameter is below this fraction of its size.
    pub refinement_threshold: f64,
}

impl Default for StockParameters {
    fn default() -> Self {
        Self::new(StockShape::default(), 1.0)
    }
}

impl StockParameters {
    /// Stock with default resolution bounds derived from `voxel_size`.
    pub fn new(shape: StockShape, voxel_size: f64) -> Self {
        Self {
            shape,
            voxel_size,
            origin: [0.0; 3],
            min_voxel_size: voxel_size / 4.0,
            max_voxel_size: voxel_size * 8.0,
            refinement_threshold: 0.5,
        }
    }

    /// Rectangular block of `length x width x height`.
    pub fn rectangular(length: f64, width: f64, height: f64) -> Self {
        Self::new(StockShape::Rectangular { length, width, height }, 1.0)
    }

    /// Upright cylinder.
    pub fn cylindrical(diameter: f64, height: f64) -> Self {
        Self::new(StockShape::Cylindrical { diameter, height }, 1.0)
    }

    /// Set the base voxel size, rescaling the resolution bounds with it.
    pub fn with_voxel_size(mut self, voxel_size: f64) -> Self {
        self.voxel_size = voxel_size;
        self.min_voxel_size = voxel_size / 4.0;
        self.max_voxel_size = voxel_size * 8.0;
        self
    }

    /// Set the stock origin.
    pub fn with_origin(mut self, origin: [f64; 3]) -> Self {
        self.origin = origin;
        self
    }

    /// Set the smallest and largest voxel sizes.
    pub fn with_voxel_limits(mut self, min_voxel_size: f64, max_voxel_size: f64) -> Self {
        self.min_voxel_size = min_voxel_size;
        self.max_voxel_size = max_voxel_size;
        self
    }

    /// Set the refinement threshold.
    pub fn with_refinement_threshold(mut self, threshold: f64) -> Self {
        self.refinement_threshold = threshold;
        self
    }

    /// Reject degenerate shapes and inconsistent resolution bounds.
    pub fn validate(&self) -> Result<()> {
        let dims: &[(&str, f64)] = match self.shape {
            StockShape::Rectangular { length, width, height } => {
                &[("length", length), ("width", width), ("height", height)]
            }
            StockShape::Cylindrical { diameter, height } => {
                &[("diameter", diameter), ("height", height)]
            }
        };
        for &(name, value) in dims {
            if !(value.is_finite() && value > 0.0) {
                return Err(StockSimError::InvalidBounds(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        if self.origin.iter().any(|c| !c.is_finite()) {
            return Err(StockSimError::InvalidBounds("origin must be finite".into()));
        }

        if !(self.voxel_size.is_finite() && self.voxel_size > 0.0) {
            return Err(StockSimError::InvalidResolution(format!(
                "voxel size must be positive, got {}",
                self.voxel_size
            )));
        }
        if !(self.min_voxel_size > 0.0 && self.min_voxel_size <= self.voxel_size) {
            return Err(StockSimError::InvalidResolution(format!(
                "min voxel size {} must be in (0, {}]",
                self.min_voxel_size, self.voxel_size
            )));
        }
        if !(self.max_voxel_size.is_finite() && self.max_voxel_size >= self.voxel_size) {
            return Err(StockSimError::InvalidResolution(format!(
                "max voxel size {} must be at least {}",
                self.max_voxel_size, self.voxel_size
            )));
        }
        if !(self.refinement_threshold > 0.0 && self.refinement_threshold <= 1.0) {
            return Err(StockSimError::InvalidResolution(format!(
                "refinement threshold {} must be in (0, 1]",
                self.refinement_threshold
            )));
        }
        Ok(())
    }

    /// Axis-aligned bounds of the stock as `(min, max)`.
    pub fn bounds(&self) -> (Point3, Point3) {
        let [ox, oy, oz] = self.origin;
        match self.shape {
            StockShape::Rectangular { length, width, height } => {
                (Point3::new(ox, oy, oz), Point3::new(ox + length, oy + width, oz + height))
            }
            StockShape::Cylindrical { diameter, height } => {
                let r = diameter / 2.0;
                (Point3::new(ox - r, oy - r, oz), Point3::new(ox + r, oy + r, oz + height))
            }
        }
    }

    /// Whether a point lies in the stock material.
    pub fn contains(&self, p: &Point3) -> bool {
        let (min, max) = self.bounds();
        let in_box = (0..3).all(|a| p[a] >= min[a] && p[a] <= max[a]);
        match self.shape {
            StockShape::Rectangular { .. } => in_box,
            StockShape::Cylindrical { diameter, .. } => {
                let r = diameter / 2.0;
                let (dx, dy) = (p.x - self.origin[0], p.y - self.origin[1]);
                in_box && dx * dx + dy * dy <= r * r
            }
        }
    }

    /// Nominal stock volume.
    pub fn volume(&self) -> f64 {
        match self.shape {
            StockShape::Rectangular { length, width, height } => length * width * height,
            StockShape::Cylindrical { diameter, height } => {
                std::f64::consts::PI * diameter * diameter / 4.0 * height
            }
        }
    }
}
