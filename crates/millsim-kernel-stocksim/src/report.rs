//! Machining metrics and per-run reports.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Snapshot of the simulator's state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MachiningMetrics {
    /// Volume cleared so far.
    pub removed_volume: f64,
    /// Volume still present.
    pub material_volume: f64,
    /// Leaves split so far.
    pub refinement_count: usize,
    /// Nodes merged so far.
    pub coarsening_count: usize,
    /// Leaves in the octree.
    pub leaf_count: usize,
    /// Nodes in the octree.
    pub node_count: usize,
    /// Leaf cells still holding material.
    pub occupied_cells: usize,
    /// Toolpath length simulated so far, in mm.
    pub distance_traveled: f64,
    /// Estimated cutting time so far at the configured feed rates.
    pub machining_time: Duration,
}

/// What happened during one toolpath simulation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    /// Points in the simulated toolpath.
    pub toolpath_points: usize,
    /// Tool positions sampled along the path.
    pub samples: usize,
    /// Work units the path was split into.
    pub chunks: usize,
    /// Worker threads used.
    pub workers: usize,
    /// Sample spacing along the path.
    pub sample_spacing: f64,
    /// Cells cleared by this run.
    pub cells_cleared: usize,
    /// Volume cleared by this run.
    pub removed_volume: f64,
    /// Leaves split by this run.
    pub refinements: usize,
    /// Nodes merged by this run.
    pub coarsenings: usize,
    /// Island cells that lost material.
    pub island_violations: usize,
    /// Length of the toolpath in mm.
    pub distance_traveled: f64,
    /// Toolpath length over the feed rate.
    pub machining_time: Duration,
    /// Wall time of the whole run.
    pub total_time: Duration,
    /// Wall time per phase.
    pub operation_times: BTreeMap<String, Duration>,
    /// State after the run.
    pub metrics: MachiningMetrics,
}

impl SimulationReport {
    pub(crate) fn record(&mut self, operation: &str, elapsed: Duration) {
        *self.operation_times.entry(operation.to_string()).or_default() += elapsed;
    }

    /// Tool positions processed per second.
    pub fn samples_per_second(&self) -> f64 {
        let secs = self.total_time.as_secs_f64();
        if secs > 0.0 {
            self.samples as f64 / secs
        } else {
            0.0
        }
    }

    /// Human-readable summary.
    pub fn generate_report(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Simulation report");
        let _ = writeln!(out, "  toolpath points:   {}", self.toolpath_points);
        let _ = writeln!(
            out,
            "  samples:           {} (spacing {:.4})",
            self.samples, self.sample_spacing
        );
        let _ = writeln!(out, "  chunks / workers:  {} / {}", self.chunks, self.workers);
        let _ = writeln!(out, "  cells cleared:     {}", self.cells_cleared);
        let _ = writeln!(out, "  removed volume:    {:.3}", self.removed_volume);
        let _ = writeln!(out, "  refinements:       {}", self.refinements);
        let _ = writeln!(out, "  coarsenings:       {}", self.coarsenings);
        let _ = writeln!(out, "  island violations: {}", self.island_violations);
        let _ = writeln!(
            out,
            "  path length:       {:.3} mm, machining time {:.1} s",
            self.distance_traveled,
            self.machining_time.as_secs_f64()
        );
        let _ = writeln!(
            out,
            "  total time:        {:.3} ms ({:.0} samples/s)",
            self.total_time.as_secs_f64() * 1e3,
            self.samples_per_second()
        );
        for (operation, elapsed) in &self.operation_times {
            let _ = writeln!(out, "    {operation:<16} {:.3} ms", elapsed.as_secs_f64() * 1e3);
        }
        let m = &self.metrics;
        let _ = writeln!(
            out,
            "  octree:            {} nodes, {} leaves, {} occupied cells",
            m.node_count, m.leaf_count, m.occupied_cells
        );
        let _ = writeln!(
            out,
            "  stock volume:      {:.3} remaining, {:.3} removed in total",
            m.material_volume, m.removed_volume
        );
        out
    }
}
