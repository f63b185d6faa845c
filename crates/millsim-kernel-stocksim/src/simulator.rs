//! Toolpath-driven material removal.

use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Sender, TrySendError};
use millsim_kernel_cam::{CuttingParameters, Island, Toolpath};
use millsim_kernel_geom::{xy, Point3, Vec3};
use parking_lot::Mutex;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::{
    AdaptiveVoxelGrid, BoundaryMesh, MachiningMetrics, Result, SimulationReport, StockParameters,
    StockSimError,
    VoxelField,
};

/// Occupancy snapshot sent while a toolpath is being simulated.
#[derive(Debug, Clone)]
pub struct SimulationProgress {
    /// Chunks finished so far.
    pub chunks_done: usize,
    /// Chunks in the run.
    pub chunks_total: usize,
    /// Stock occupancy at the time of the snapshot.
    pub field: VoxelField,
}

/// Knobs for [`MaterialSimulator::simulate_toolpath`].
#[derive(Debug, Clone)]
pub struct SimulationOptions {
    /// Worker threads.
    pub workers: usize,
    /// Contiguous path chunks handed to each worker.
    pub chunks_per_worker: usize,
    /// Send a snapshot every this many finished chunks.
    pub progress_every: usize,
    /// Receiver of best-effort progress snapshots; full channels drop them.
    pub progress: Option<Sender<SimulationProgress>>,
    /// Checked before each chunk starts.
    pub cancel: Option<Arc<AtomicBool>>,
    /// Feed rate in mm/min used to estimate machining time.
    pub feedrate: f64,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            workers: num_cpus::get().saturating_sub(1).max(1),
            chunks_per_worker: 4,
            progress_every: 1,
            progress: None,
            cancel: None,
            feedrate: CuttingParameters::default().feedrate,
        }
    }
}

impl SimulationOptions {
    /// Set the worker count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set how many chunks each worker gets.
    pub fn with_chunks_per_worker(mut self, chunks: usize) -> Self {
        self.chunks_per_worker = chunks;
        self
    }

    /// Stream snapshots to `sender` every `every` chunks.
    pub fn with_progress(mut self, sender: Sender<SimulationProgress>, every: usize) -> Self {
        self.progress = Some(sender);
        self.progress_every = every;
        self
    }

    /// Stop starting new chunks once `flag` is set.
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Set the feed rate in mm/min.
    pub fn with_feedrate(mut self, feedrate: f64) -> Self {
        self.feedrate = feedrate;
        self
    }

    fn worker_count(&self) -> usize {
        self.workers.max(1)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct ChunkStats {
    samples: usize,
    cleared: usize,
}

/// Distance and time accumulated over every finished run.
#[derive(Debug, Default, Clone, Copy)]
struct Travel {
    distance: f64,
    time: Duration,
}

/// Simulates cutting a stock block along toolpaths.
///
/// The simulator owns the adaptive octree plus a pristine base-resolution
/// field of the stock, used to check islands and draw the original outline.
#[derive(Debug)]
pub struct MaterialSimulator {
    stock: StockParameters,
    grid: AdaptiveVoxelGrid,
    original: VoxelField,
    axes: [Vec<f64>; 3],
    travel: Mutex<Travel>,
}

impl MaterialSimulator {
    /// Create a simulator for a stock.
    pub fn new(stock: StockParameters) -> Result<Self> {
        let grid = AdaptiveVoxelGrid::new(&stock)?;
        let (min, max) = stock.bounds();
        let extent = max - min;
        let dims = [extent.x, extent.y, extent.z]
            .map(|e| ((e / stock.voxel_size - 1e-9).ceil() as usize).max(1));
        let original = grid.sample_field(min, stock.voxel_size, dims);
        let axes = [0, 1, 2].map(|axis| {
            (0..dims[axis])
                .map(|i| min[axis] + (i as f64 + 0.5) * stock.voxel_size)
                .collect::<Vec<f64>>()
        });
        info!(
            shape = ?stock.shape,
            voxel_size = stock.voxel_size,
            cells = original.occupied_count(),
            "created material simulator"
        );
        Ok(Self {
            stock,
            grid,
            original,
            axes,
            travel: Mutex::new(Travel::default()),
        })
    }

    /// Stock description.
    pub fn stock(&self) -> &StockParameters {
        &self.stock
    }

    /// The underlying octree.
    pub fn grid(&self) -> &AdaptiveVoxelGrid {
        &self.grid
    }

    /// Occupancy before any material was removed.
    pub fn original_field(&self) -> &VoxelField {
        &self.original
    }

    /// Cell-center coordinates of the base grid along X, Y and Z.
    pub fn sampling_axes(&self) -> &[Vec<f64>; 3] {
        &self.axes
    }

    /// Current occupancy sampled on the base grid.
    pub fn occupancy_field(&self) -> VoxelField {
        self.grid
            .sample_field(self.original.origin(), self.original.resolution(), self.original.dims())
    }

    /// Clear the tool footprint at one position.
    ///
    /// The footprint is the same for every approach direction, and islands
    /// are checked once a whole toolpath has run, so `direction` and
    /// `islands` do not affect the result.
    pub fn remove_material(
        &self,
        position: &Point3,
        _direction: &Vec3,
        tool_diameter: f64,
        _islands: &[Island],
    ) -> Result<usize> {
        self.grid.remove_material(position, tool_diameter)
    }

    /// Cut along a toolpath on a pool of workers.
    ///
    /// Segments are split into contiguous chunks and sampled no farther
    /// apart than the leaf resolution the tool cuts in. Chunks run in any
    /// order; removal is idempotent, so the result matches a sequential run.
    /// If any chunk fails or the run is cancelled, the first error is
    /// returned after all chunks have finished and material already removed
    /// stays removed.
    pub fn simulate_toolpath(
        &self,
        toolpath: &Toolpath,
        tool_diameter: f64,
        islands: &[Island],
        options: &SimulationOptions,
    ) -> Result<SimulationReport> {
        if !(tool_diameter.is_finite() && tool_diameter > 0.0) {
            return Err(StockSimError::InvalidTool(tool_diameter));
        }
        if !(options.feedrate.is_finite() && options.feedrate > 0.0) {
            return Err(StockSimError::InvalidFeedrate(options.feedrate));
        }
        let started = Instant::now();
        let before = self.metrics();
        let points = toolpath.points();
        let spacing = self.grid.tool_resolution(tool_diameter);
        let workers = options.worker_count();
        let items = if points.len() == 1 { 1 } else { points.len().saturating_sub(1) };
        let chunks = chunk_ranges(items, workers * options.chunks_per_worker.max(1));

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| StockSimError::ThreadPool(e.to_string()))?;

        let removal = Instant::now();
        let finished = AtomicUsize::new(0);
        let results: Vec<Result<ChunkStats>> = pool.install(|| {
            chunks
                .par_iter()
                .map(|range| {
                    if options.is_cancelled() {
                        return Err(StockSimError::Cancelled);
                    }
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                        self.run_chunk(points, range.clone(), tool_diameter, spacing)
                    }));
                    let result = outcome.unwrap_or_else(|payload| {
                        Err(StockSimError::WorkerPanic(panic_message(payload.as_ref())))
                    });
                    let done = finished.fetch_add(1, Ordering::Relaxed) + 1;
                    self.send_progress(options, done, chunks.len());
                    result
                })
                .collect()
        });
        let removal_time = removal.elapsed();

        let mut stats = ChunkStats::default();
        let mut failure: Option<StockSimError> = None;
        for result in results {
            match result {
                Ok(chunk) => {
                    stats.samples += chunk.samples;
                    stats.cleared += chunk.cleared;
                }
                Err(e) => {
                    let replaces = failure.as_ref().is_none_or(|f| {
                        *f == StockSimError::Cancelled && e != StockSimError::Cancelled
                    });
                    if replaces {
                        failure = Some(e);
                    }
                }
            }
        }
        if let Some(e) = failure {
            warn!(error = %e, "toolpath simulation stopped");
            return Err(e);
        }

        let check = Instant::now();
        let island_violations = self.verify_islands(islands);
        let check_time = check.elapsed();

        let distance = toolpath.length();
        let machining_time = Duration::from_secs_f64(distance / options.feedrate * 60.0);
        {
            let mut travel = self.travel.lock();
            travel.distance += distance;
            travel.time += machining_time;
        }

        let metrics = self.metrics();
        let mut report = SimulationReport {
            toolpath_points: points.len(),
            samples: stats.samples,
            chunks: chunks.len(),
            workers,
            sample_spacing: spacing,
            cells_cleared: stats.cleared,
            removed_volume: metrics.removed_volume - before.removed_volume,
            refinements: metrics.refinement_count - before.refinement_count,
            coarsenings: metrics.coarsening_count - before.coarsening_count,
            island_violations,
            distance_traveled: distance,
            machining_time,
            total_time: started.elapsed(),
            operation_times: Default::default(),
            metrics,
        };
        report.record("removal", removal_time);
        report.record("island_check", check_time);
        info!(
            samples = report.samples,
            chunks = report.chunks,
            removed = report.removed_volume,
            elapsed_ms = report.total_time.as_secs_f64() * 1e3,
            "simulated toolpath"
        );
        Ok(report)
    }

    fn run_chunk(
        &self,
        points: &[Point3],
        range: Range<usize>,
        tool_diameter: f64,
        spacing: f64,
    ) -> Result<ChunkStats> {
        let mut stats = ChunkStats::default();
        let mut cut = |p: &Point3| -> Result<()> {
            stats.cleared += self.grid.remove_material(p, tool_diameter)?;
            stats.samples += 1;
            Ok(())
        };

        if points.len() == 1 {
            cut(&points[0])?;
            return Ok(stats);
        }
        for seg in range.clone() {
            let (a, b) = (points[seg], points[seg + 1]);
            let steps = (((b - a).norm() / spacing).ceil() as usize).max(1);
            for s in 0..steps {
                cut(&(a + (b - a) * (s as f64 / steps as f64)))?;
            }
        }
        if let Some(end) = points.get(range.end) {
            cut(end)?;
        }
        debug!(segments = range.len(), samples = stats.samples, "finished chunk");
        Ok(stats)
    }

    fn send_progress(&self, options: &SimulationOptions, done: usize, total: usize) {
        let Some(sender) = &options.progress else { return };
        if done % options.progress_every.max(1) != 0 && done != total {
            return;
        }
        if sender.is_full() {
            return;
        }
        let snapshot = SimulationProgress {
            chunks_done: done,
            chunks_total: total,
            field: self.occupancy_field(),
        };
        if let Err(TrySendError::Disconnected(_)) = sender.try_send(snapshot) {
            debug!("progress receiver dropped");
        }
    }

    /// Count island cells that held material originally and are now empty.
    ///
    /// A cell belongs to an island when its center lies inside the island
    /// polygon and within the island's Z range.
    pub fn verify_islands(&self, islands: &[Island]) -> usize {
        let mut total = 0;
        for (index, island) in islands.iter().enumerate() {
            let [xs, ys, zs] = &self.axes;
            let violations = self
                .original
                .occupied_cells()
                .map(|[i, j, k]| Point3::new(xs[i], ys[j], zs[k]))
                .filter(|c| {
                    c.z >= island.z_min && c.z <= island.z_max && island.polygon.contains(&xy(c))
                })
                .filter(|c| !self.grid.is_occupied(c))
                .count();
            if violations > 0 {
                warn!(island = index, cells = violations, "material removed inside island");
            }
            total += violations;
        }
        total
    }

    /// Current counters and octree size.
    pub fn metrics(&self) -> MachiningMetrics {
        let travel = *self.travel.lock();
        MachiningMetrics {
            distance_traveled: travel.distance,
            machining_time: travel.time,
            removed_volume: self.grid.removed_volume(),
            material_volume: self.grid.material_volume(),
            refinement_count: self.grid.refinement_count(),
            coarsening_count: self.grid.coarsening_count(),
            leaf_count: self.grid.leaf_count(),
            node_count: self.grid.node_count(),
            occupied_cells: self.grid.occupied_cell_count(),
        }
    }

    /// Boundary of the remaining material.
    pub fn visualize(&self) -> BoundaryMesh {
        BoundaryMesh::from_tree(&self.grid.view(), self.grid.finest_resolution())
    }

    /// Boundary of the untouched stock.
    pub fn original_outline(&self) -> BoundaryMesh {
        BoundaryMesh::from_field(&self.original)
    }
}

/// Split `0..len` into at most `count` contiguous, nearly equal ranges.
fn chunk_ranges(len: usize, count: usize) -> Vec<Range<usize>> {
    if len == 0 {
        return Vec::new();
    }
    let count = count.clamp(1, len);
    let (base, extra) = (len / count, len % count);
    let mut ranges = Vec::with_capacity(count);
    let mut start = 0;
    for i in 0..count {
        let end = start + base + usize::from(i < extra);
        ranges.push(start..end);
        start = end;
    }
    ranges
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use millsim_kernel_cam::{ToolParameters, ToolpathGenerator, ToolpathParameters};
    use approx::assert_relative_eq;
    use millsim_kernel_geom::Polygon;

    fn loop_path() -> Toolpath {
        Toolpath::new(vec![
            Point3::new(10.0, 10.0, 20.0),
            Point3::new(10.0, 40.0, 20.0),
            Point3::new(90.0, 40.0, 20.0),
            Point3::new(90.0, 10.0, 20.0),
            Point3::new(10.0, 10.0, 20.0),
        ])
    }

    fn pocket_stock() -> StockParameters {
        StockParameters::rectangular(60.0, 40.0, 20.0).with_origin([0.0, 0.0, -20.0])
    }

    fn pocket_path() -> (ToolpathParameters, Toolpath) {
        let generator = ToolpathGenerator::new(Polygon::rectangle(10.0, 10.0, 50.0, 30.0)).unwrap();
        let params = ToolpathParameters::default()
            .with_tool(ToolParameters::end_mill(6.0))
            .with_depths(0.0, 4.0, 2.0, 0.5);
        let toolpath = generator.generate_toolpath(&params).unwrap();
        (params, toolpath)
    }

    #[test]
    fn test_chunk_ranges_cover() {
        assert_eq!(chunk_ranges(10, 3), vec![0..4, 4..7, 7..10]);
        assert_eq!(chunk_ranges(2, 8), vec![0..1, 1..2]);
        assert!(chunk_ranges(0, 4).is_empty());
    }

    #[test]
    fn test_new_rejects_bad_stock() {
        let result = MaterialSimulator::new(StockParameters::rectangular(-1.0, 10.0, 10.0));
        assert!(matches!(result, Err(StockSimError::InvalidBounds(_))));
    }

    #[test]
    fn test_original_field_matches_stock() {
        let sim = MaterialSimulator::new(StockParameters::rectangular(100.0, 50.0, 25.0)).unwrap();
        assert_eq!(sim.original_field().dims(), [100, 50, 25]);
        assert_eq!(sim.original_field().occupied_count(), 125_000);
        assert_eq!(sim.occupancy_field(), *sim.original_field());
        assert!((sim.original_outline().area() - 2.0 * (5000.0 + 2500.0 + 1250.0)).abs() < 1e-6);
    }

    #[test]
    fn test_single_removal_pass_through() {
        let sim = MaterialSimulator::new(StockParameters::rectangular(100.0, 50.0, 25.0)).unwrap();
        let cleared = sim
            .remove_material(&Point3::new(50.0, 25.0, 20.0), &Vec3::z(), 10.0, &[])
            .unwrap();
        assert!(cleared > 0);
        assert!(!sim.occupancy_field().is_occupied_at(&Point3::new(50.5, 25.5, 20.5)));
        let metrics = sim.metrics();
        assert!((metrics.removed_volume - cleared as f64).abs() < 1e-9);
        assert!((metrics.material_volume + metrics.removed_volume - 125_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_loop_keeps_island() {
        let sim = MaterialSimulator::new(StockParameters::rectangular(100.0, 50.0, 25.0)).unwrap();
        let island = Island::new(Polygon::rectangle(40.0, 20.0, 60.0, 30.0), 0.0, 25.0);
        let report = sim
            .simulate_toolpath(
                &loop_path(),
                10.0,
                &[island],
                &SimulationOptions::default().with_workers(2),
            )
            .unwrap();
        assert_eq!(report.island_violations, 0);
        assert!(report.removed_volume > 0.0);
        assert!(report.samples >= 4 * 30);

        let field = sim.occupancy_field();
        assert!(!field.is_occupied_at(&Point3::new(50.5, 40.5, 20.5)));
        assert!(!field.is_occupied_at(&Point3::new(10.5, 25.5, 20.5)));
        assert!(field.is_occupied_at(&Point3::new(50.5, 25.5, 20.5)));
        assert!(field.is_occupied_at(&Point3::new(50.5, 40.5, 19.5)));
        // Removal only ever clears cells.
        assert_eq!(field.removed_since(sim.original_field()), 0);
        assert_eq!(sim.original_field().removed_since(&field), report.cells_cleared);
        assert!((report.removed_volume - report.cells_cleared as f64).abs() < 1e-9);
    }

    #[test]
    fn test_island_violation_reported() {
        let sim = MaterialSimulator::new(StockParameters::rectangular(100.0, 50.0, 25.0)).unwrap();
        let island = Island::new(Polygon::rectangle(5.0, 20.0, 15.0, 30.0), 0.0, 25.0);
        let report = sim
            .simulate_toolpath(&loop_path(), 10.0, &[island], &SimulationOptions::default())
            .unwrap();
        assert!(report.island_violations > 0);
        assert_eq!(sim.verify_islands(&[]), 0);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let (_, toolpath) = pocket_path();
        let sequential = MaterialSimulator::new(pocket_stock()).unwrap();
        let parallel = MaterialSimulator::new(pocket_stock()).unwrap();

        sequential
            .simulate_toolpath(&toolpath, 6.0, &[], &SimulationOptions::default().with_workers(1))
            .unwrap();
        let report = parallel
            .simulate_toolpath(
                &toolpath,
                6.0,
                &[],
                &SimulationOptions::default().with_workers(4).with_chunks_per_worker(8),
            )
            .unwrap();
        assert!(report.chunks > 1);

        let fine = |sim: &MaterialSimulator| {
            let grid = sim.grid();
            let res = grid.tool_resolution(6.0);
            let (min, max) = grid.stock_bounds();
            let dims = [max.x - min.x, max.y - min.y, max.z - min.z]
                .map(|e| (e / res).round() as usize);
            grid.sample_field(min, res, dims)
        };
        assert_eq!(fine(&sequential), fine(&parallel));
        assert_eq!(sequential.metrics().removed_volume, parallel.metrics().removed_volume);
    }

    #[test]
    fn test_pocket_cuts_inside_walls() {
        let (_, toolpath) = pocket_path();
        let sim = MaterialSimulator::new(pocket_stock()).unwrap();
        let report = sim
            .simulate_toolpath(&toolpath, 6.0, &[], &SimulationOptions::default())
            .unwrap();
        assert!((report.sample_spacing - 0.5).abs() < 1e-12);

        let grid = sim.grid();
        assert!(!grid.is_occupied(&Point3::new(30.0, 20.0, -1.9)));
        assert!(!grid.is_occupied(&Point3::new(30.0, 20.0, -3.9)));
        assert!(grid.is_occupied(&Point3::new(30.0, 20.0, -4.6)));
        assert!(grid.is_occupied(&Point3::new(5.0, 5.0, -1.9)));

        // Nothing outside the pocket boundary is touched.
        let field = sim.occupancy_field();
        let original = sim.original_field();
        for [i, j, k] in original.occupied_cells() {
            let c = original.cell_center(i, j, k);
            if c.x < 10.0 || c.x > 50.0 || c.y < 10.0 || c.y > 30.0 {
                assert!(field.get(i, j, k), "gouged wall at {c:?}");
            }
        }
    }

    #[test]
    fn test_progress_snapshots() {
        let (_, toolpath) = pocket_path();
        let sim = MaterialSimulator::new(pocket_stock()).unwrap();
        let (tx, rx) = crossbeam_channel::unbounded();
        let options = SimulationOptions::default().with_workers(2).with_progress(tx, 1);
        let report = sim.simulate_toolpath(&toolpath, 6.0, &[], &options).unwrap();

        let snapshots: Vec<SimulationProgress> = rx.try_iter().collect();
        assert_eq!(snapshots.len(), report.chunks);
        assert!(snapshots.iter().all(|s| s.chunks_total == report.chunks));
        assert_eq!(snapshots.iter().map(|s| s.chunks_done).max(), Some(report.chunks));
    }

    #[test]
    fn test_full_progress_channel_does_not_block() {
        let (_, toolpath) = pocket_path();
        let sim = MaterialSimulator::new(pocket_stock()).unwrap();
        let (tx, rx) = crossbeam_channel::bounded(1);
        let options = SimulationOptions::default().with_progress(tx, 1);
        assert!(sim.simulate_toolpath(&toolpath, 6.0, &[], &options).is_ok());
        assert_eq!(rx.try_iter().count(), 1);
    }

    #[test]
    fn test_cancelled_before_start() {
        let sim = MaterialSimulator::new(StockParameters::rectangular(100.0, 50.0, 25.0)).unwrap();
        let flag = Arc::new(AtomicBool::new(true));
        let options = SimulationOptions::default().with_cancel(flag);
        let result = sim.simulate_toolpath(&loop_path(), 10.0, &[], &options);
        assert_eq!(result, Err(StockSimError::Cancelled));
        assert!((sim.metrics().removed_volume).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_tool_rejected() {
        let sim = MaterialSimulator::new(StockParameters::rectangular(10.0, 10.0, 10.0)).unwrap();
        let result = sim.simulate_toolpath(&loop_path(), -1.0, &[], &SimulationOptions::default());
        assert_eq!(result, Err(StockSimError::InvalidTool(-1.0)));
    }

    #[test]
    fn test_empty_and_single_point_paths() {
        let sim = MaterialSimulator::new(StockParameters::rectangular(20.0, 20.0, 10.0)).unwrap();
        let empty = sim
            .simulate_toolpath(&Toolpath::default(), 4.0, &[], &SimulationOptions::default())
            .unwrap();
        assert_eq!(empty.samples, 0);
        assert_eq!(empty.chunks, 0);

        let single = Toolpath::new(vec![Point3::new(10.0, 10.0, 5.0)]);
        let report = sim
            .simulate_toolpath(&single, 4.0, &[], &SimulationOptions::default())
            .unwrap();
        assert_eq!(report.samples, 1);
        assert!(report.cells_cleared > 0);
    }

    #[test]
    fn test_travel_and_machining_time() {
        let sim = MaterialSimulator::new(StockParameters::rectangular(100.0, 50.0, 25.0)).unwrap();
        let options = SimulationOptions::default().with_feedrate(1200.0);
        let report = sim.simulate_toolpath(&loop_path(), 10.0, &[], &options).unwrap();
        // 30 + 80 + 30 + 80 mm at 1200 mm/min.
        assert_relative_eq!(report.distance_traveled, 220.0, epsilon = 1e-9);
        assert_relative_eq!(report.machining_time.as_secs_f64(), 11.0, epsilon = 1e-9);
        assert!(report.generate_report().contains("machining time"));

        sim.simulate_toolpath(&loop_path(), 10.0, &[], &options).unwrap();
        let metrics = sim.metrics();
        assert_relative_eq!(metrics.distance_traveled, 440.0, epsilon = 1e-9);
        assert_relative_eq!(metrics.machining_time.as_secs_f64(), 22.0, epsilon = 1e-9);
    }

    #[test]
    fn test_invalid_feedrate_rejected() {
        let sim = MaterialSimulator::new(StockParameters::rectangular(10.0, 10.0, 10.0)).unwrap();
        let options = SimulationOptions::default().with_feedrate(0.0);
        let result = sim.simulate_toolpath(&loop_path(), 2.0, &[], &options);
        assert_eq!(result, Err(StockSimError::InvalidFeedrate(0.0)));
        assert_eq!(sim.metrics().distance_traveled, 0.0);
    }

    #[test]
    fn test_sampling_axes_cell_centers() {
        let sim = MaterialSimulator::new(StockParameters::rectangular(100.0, 50.0, 25.0)).unwrap();
        let [xs, ys, zs] = sim.sampling_axes();
        assert_eq!([xs.len(), ys.len(), zs.len()], sim.original_field().dims());
        assert_relative_eq!(xs[0], 0.5);
        assert_relative_eq!(ys[49], 49.5);
        assert_relative_eq!(zs[24], 24.5);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("boom"));
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }

    #[test]
    fn test_visualize_after_cut() {
        let sim = MaterialSimulator::new(StockParameters::rectangular(20.0, 20.0, 10.0)).unwrap();
        let before = sim.visualize().area();
        sim.remove_material(&Point3::new(10.0, 10.0, 5.2), &Vec3::z(), 4.0, &[]).unwrap();
        let after = sim.visualize();
        assert!(after.area() > before);
        assert!(after.vector_area().norm() < 1e-9);
    }
}
