//! Planned tool-center paths.

use millsim_kernel_geom::{xy, Point3};
use serde::{Deserialize, Serialize};

/// An ordered sequence of tool-center positions.
///
/// Built once by the planner; re-planning produces a new value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Toolpath {
    points: Vec<Point3>,
}

impl Toolpath {
    /// Wrap a point sequence.
    pub fn new(points: Vec<Point3>) -> Self {
        Self { points }
    }

    /// Waypoints in travel order.
    pub fn points(&self) -> &[Point3] {
        &self.points
    }

    /// Number of waypoints.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the toolpath has no waypoints.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Consecutive waypoint pairs.
    pub fn segments(&self) -> impl Iterator<Item = (&Point3, &Point3)> {
        self.points.windows(2).map(|w| (&w[0], &w[1]))
    }

    /// Total travel length.
    pub fn length(&self) -> f64 {
        self.segments().map(|(a, b)| (b - a).norm()).sum()
    }

    /// Travel length in the XY plane with every waypoint at or above `z`.
    pub fn travel_length_above(&self, z: f64) -> f64 {
        self.segments()
            .filter(|(a, b)| a.z >= z - 1e-9 && b.z >= z - 1e-9)
            .map(|(a, b)| (xy(b) - xy(a)).norm())
            .sum()
    }

    /// Lowest Z reached.
    pub fn min_z(&self) -> Option<f64> {
        self.points.iter().map(|p| p.z).reduce(f64::min)
    }

    /// Take the waypoints.
    pub fn into_points(self) -> Vec<Point3> {
        self.points
    }
}

impl From<Vec<Point3>> for Toolpath {
    fn from(points: Vec<Point3>) -> Self {
        Self::new(points)
    }
}
