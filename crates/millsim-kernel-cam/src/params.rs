//! Toolpath request parameters.

use millsim_kernel_geom::Polygon;
use serde::{Deserialize, Serialize};

use crate::tool::positive;
use crate::{CamError, CuttingParameters, Result, ToolParameters};

/// Operation to plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolpathKind {
    /// Single-depth profile around or inside the boundary.
    Contour,
    /// Multi-level area clearing.
    #[default]
    Pocket,
    /// Hole drilling.
    Drill,
    /// 3D surface finishing.
    Surface,
    /// Thread milling.
    Thread,
    /// Edge chamfering.
    Chamfer,
}

impl ToolpathKind {
    /// Human readable name.
    pub fn name(&self) -> &'static str {
        match self {
            ToolpathKind::Contour => "Contour",
            ToolpathKind::Pocket => "Pocket",
            ToolpathKind::Drill => "Drill",
            ToolpathKind::Surface => "Surface",
            ToolpathKind::Thread => "Thread",
            ToolpathKind::Chamfer => "Chamfer",
        }
    }
}

/// How a pocket level is cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PocketStrategy {
    /// Parallel raster passes with alternating direction.
    #[default]
    Zigzag,
    /// Successive boundary-offset rings.
    Spiral,
    /// Boundary-offset rings followed by raster passes.
    Hybrid,
}

/// How the tool descends to a new cutting level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Straight vertical move.
    #[default]
    Plunge,
    /// Back-and-forth linear descent along the first cut.
    Ramp,
    /// Circular descent around the path start.
    Helix,
}

/// Which side of the boundary a contour runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContourSide {
    /// Profile around the outside of the part.
    #[default]
    Outside,
    /// Profile the inside wall of an opening.
    Inside,
}

/// Region inside a pocket that keeps its material over a depth range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Island {
    /// Outline of the preserved region.
    pub polygon: Polygon,
    /// Lowest level at which the island is protected.
    pub z_min: f64,
    /// Highest level at which the island is protected.
    pub z_max: f64,
}

impl Island {
    /// Create an island protected over `[z_min, z_max]`.
    pub fn new(polygon: Polygon, z_min: f64, z_max: f64) -> Self {
        Self {
            polygon,
            z_min,
            z_max,
        }
    }

    /// Is a pass at `z` inside the protected range? Both ends inclusive.
    pub fn is_active_at(&self, z: f64) -> bool {
        z >= self.z_min - 1e-9 && z <= self.z_max + 1e-9
    }
}

/// Everything the planner needs for one toolpath request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolpathParameters {
    /// Operation to plan.
    pub kind: ToolpathKind,
    /// Cutter.
    pub tool: ToolParameters,
    /// Feeds and speeds.
    pub cutting: CuttingParameters,
    /// Geometric tolerance in mm.
    pub tolerance: f64,
    /// Lateral step between passes as a fraction of tool diameter.
    pub stepover: f64,
    /// Pocket clearing strategy.
    pub pocket_strategy: PocketStrategy,
    /// Raster direction in degrees (0 = along X).
    pub raster_angle: f64,
    /// Regions to leave standing.
    pub islands: Vec<Island>,
    /// Top of the cut.
    pub start_z: f64,
    /// Total depth below `start_z`.
    pub pocket_depth: f64,
    /// Maximum depth per level.
    pub step_down: f64,
    /// Maximum depth of the dedicated last level.
    pub final_pass_depth: f64,
    /// Entry move kind.
    pub entry: EntryKind,
    /// Ramp descent angle in degrees.
    pub ramp_angle: f64,
    /// Helix diameter as a fraction of tool diameter.
    pub helix_diameter: f64,
    /// Helix descent angle in degrees.
    pub helix_angle: f64,
    /// Explicit helix revolution count.
    pub helix_revolutions: Option<f64>,
    /// Safe height for repositioning moves.
    pub clearance_height: f64,
    /// Height above the last cut level at which entry moves begin.
    pub retract_height: f64,
    /// Side of the boundary for contours.
    pub contour_side: ContourSide,
    /// Number of outside contour rings.
    pub contour_passes: usize,
}

impl Default for ToolpathParameters {
    fn default() -> Self {
        Self {
            kind: ToolpathKind::Pocket,
            tool: ToolParameters::default(),
            cutting: CuttingParameters::default(),
            tolerance: 0.01,
            stepover: 0.5,
            pocket_strategy: PocketStrategy::Zigzag,
            raster_angle: 0.0,
            islands: Vec::new(),
            start_z: 0.0,
            pocket_depth: 10.0,
            step_down: 1.0,
            final_pass_depth: 0.5,
            entry: EntryKind::Plunge,
            ramp_angle: 3.0,
            helix_diameter: 0.8,
            helix_angle: 5.0,
            helix_revolutions: None,
            clearance_height: 10.0,
            retract_height: 2.0,
            contour_side: ContourSide::Outside,
            contour_passes: 1,
        }
    }
}

impl ToolpathParameters {
    /// Create parameters for an operation kind with default values.
    pub fn new(kind: ToolpathKind) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }

    /// Set the tool.
    pub fn with_tool(mut self, tool: ToolParameters) -> Self {
        self.tool = tool;
        self
    }

    /// Set the pocket strategy.
    pub fn with_strategy(mut self, strategy: PocketStrategy) -> Self {
        self.pocket_strategy = strategy;
        self
    }

    /// Set the entry move kind.
    pub fn with_entry(mut self, entry: EntryKind) -> Self {
        self.entry = entry;
        self
    }

    /// Set the depth ladder.
    pub fn with_depths(
        mut self,
        start_z: f64,
        pocket_depth: f64,
        step_down: f64,
        final_pass_depth: f64,
    ) -> Self {
        self.start_z = start_z;
        self.pocket_depth = pocket_depth;
        self.step_down = step_down;
        self.final_pass_depth = final_pass_depth;
        self
    }

    /// Set stepover as a fraction of tool diameter.
    pub fn with_stepover(mut self, stepover: f64) -> Self {
        self.stepover = stepover;
        self
    }

    /// Set the raster angle in degrees.
    pub fn with_raster_angle(mut self, degrees: f64) -> Self {
        self.raster_angle = degrees;
        self
    }

    /// Set the contour side.
    pub fn with_contour_side(mut self, side: ContourSide) -> Self {
        self.contour_side = side;
        self
    }

    /// Add an island.
    pub fn with_island(mut self, island: Island) -> Self {
        self.islands.push(island);
        self
    }

    /// Island protected over the whole pocket depth, `start_z - pocket_depth`
    /// up to `start_z`.
    pub fn island(&self, polygon: Polygon) -> Island {
        Island::new(polygon, self.start_z - self.pocket_depth, self.start_z)
    }

    /// Lateral step between passes in mm.
    pub fn stepover_distance(&self) -> f64 {
        self.stepover * self.tool.diameter
    }

    /// Z of the pocket floor.
    pub fn bottom_z(&self) -> f64 {
        self.start_z - self.pocket_depth
    }

    /// Check every parameter the planner relies on.
    pub fn validate(&self) -> Result<()> {
        self.tool.validate()?;
        self.cutting.validate()?;

        let invalid = CamError::InvalidParameter;
        positive("tolerance", self.tolerance).map_err(invalid)?;
        positive("step down", self.step_down).map_err(invalid)?;
        if !(self.stepover > 0.0 && self.stepover <= 1.0) {
            return Err(invalid(format!("stepover must be in (0, 1], got {}", self.stepover)));
        }
        for (name, value) in [
            ("pocket depth", self.pocket_depth),
            ("final pass depth", self.final_pass_depth),
            ("retract height", self.retract_height),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(invalid(format!("{name} must be non-negative, got {value}")));
            }
        }
        if !self.start_z.is_finite() || !self.raster_angle.is_finite() {
            return Err(invalid("start z and raster angle must be finite".into()));
        }
        if !(self.clearance_height > self.start_z) {
            return Err(invalid(format!(
                "clearance height {} must be above start z {}",
                self.clearance_height, self.start_z
            )));
        }
        for (name, value) in [("ramp angle", self.ramp_angle), ("helix angle", self.helix_angle)] {
            if !(value > 0.0 && value < 90.0) {
                return Err(invalid(format!("{name} must be in (0, 90) degrees, got {value}")));
            }
        }
        if !(self.helix_diameter > 0.0 && self.helix_diameter <= 1.0) {
            return Err(invalid(format!(
                "helix diameter fraction must be in (0, 1], got {}",
                self.helix_diameter
            )));
        }
        if let Some(revs) = self.helix_revolutions {
            positive("helix revolutions", revs).map_err(invalid)?;
        }
        if self.contour_passes == 0 {
            return Err(invalid("contour passes must be at least 1".into()));
        }
        for island in &self.islands {
            if !island.polygon.is_valid() || !(island.z_min <= island.z_max) {
                return Err(invalid("island needs a valid polygon and z_min <= z_max".into()));
            }
        }
        Ok(())
    }
}
