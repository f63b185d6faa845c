//! Adaptive voxel octree holding the stock occupancy.
//!
//! Nodes live in a slot-map arena; children are referenced by key and each
//! node keeps a back-reference to its parent. Only leaves own occupancy
//! bits. Leaf resolution follows node size: roughly sixteen cells per edge,
//! clamped between the finest allowed voxel and the base voxel size.
//!
//! Structural changes (refine, coarsen) take the arena write lock. Clearing
//! cells only needs the read lock plus the leaf's own mutex, so tool
//! positions in different leaves are processed concurrently.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use bit_vec::BitVec;
use millsim_kernel_geom::{Point3, Vec3};
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use slotmap::{new_key_type, SlotMap};
use tracing::{debug, trace};

use crate::{Result, StockParameters, StockSimError, VoxelField};

new_key_type! {
    /// Handle to a node of an [`AdaptiveVoxelGrid`].
    pub struct NodeKey;
}

/// Target number of cells along a leaf edge.
const CELLS_PER_EDGE: f64 = 16.0;

const EPS: f64 = 1e-9;

/// Occupancy bits of a leaf, indexed `(k * dim + j) * dim + i`.
#[derive(Debug, Clone, PartialEq)]
pub struct Occupancy {
    dim: usize,
    resolution: f64,
    cells: BitVec,
    occupied: usize,
}

impl Occupancy {
    fn from_fn(
        dim: usize,
        resolution: f64,
        mut occupied: impl FnMut(usize, usize, usize) -> bool,
    ) -> Self {
        let mut cells = BitVec::from_elem(dim * dim * dim, false);
        let mut count = 0;
        for k in 0..dim {
            for j in 0..dim {
                for i in 0..dim {
                    if occupied(i, j, k) {
                        cells.set((k * dim + j) * dim + i, true);
                        count += 1;
                    }
                }
            }
        }
        Self {
            dim,
            resolution,
            cells,
            occupied: count,
        }
    }

    /// Cells along each edge.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Cell edge length.
    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// Number of cells still holding material.
    pub fn occupied_count(&self) -> usize {
        self.occupied
    }

    fn index(&self, i: usize, j: usize, k: usize) -> usize {
        (k * self.dim + j) * self.dim + i
    }

    /// Occupancy of cell `(i, j, k)`.
    pub fn get(&self, i: usize, j: usize, k: usize) -> bool {
        self.cells.get(self.index(i, j, k)).unwrap_or(false)
    }

    /// Cell indices of `p` relative to a leaf whose minimum corner is `min`.
    fn cell_of(&self, min: &Point3, p: &Point3) -> [usize; 3] {
        let last = self.dim.saturating_sub(1);
        let rel = (p - min) / self.resolution;
        [rel.x, rel.y, rel.z].map(|c| (c.floor().max(0.0) as usize).min(last))
    }

    fn at_point(&self, min: &Point3, p: &Point3) -> bool {
        let [i, j, k] = self.cell_of(min, p);
        self.get(i, j, k)
    }

    /// Clear cells of one Z layer whose centers lie within `radius` of `(x, y)`.
    fn clear_disc(&mut self, min: &Point3, position: &Point3, radius: f64) -> usize {
        if self.occupied == 0 {
            return 0;
        }
        let res = self.resolution;
        let last = self.dim as f64 - 1.0;
        let [_, _, k] = self.cell_of(min, position);
        let span = |lo: f64, hi: f64| {
            let first = lo.ceil().max(0.0);
            let end = hi.floor().min(last);
            (first <= end).then(|| first as usize..=end as usize)
        };
        let (Some(is), Some(js)) = (
            span(
                (position.x - radius - min.x) / res - 0.5,
                (position.x + radius - min.x) / res - 0.5,
            ),
            span(
                (position.y - radius - min.y) / res - 0.5,
                (position.y + radius - min.y) / res - 0.5,
            ),
        ) else {
            return 0;
        };

        let r2 = radius * radius + EPS;
        let mut cleared = 0;
        for j in js {
            let dy = min.y + (j as f64 + 0.5) * res - position.y;
            for i in is.clone() {
                let dx = min.x + (i as f64 + 0.5) * res - position.x;
                if dx * dx + dy * dy > r2 {
                    continue;
                }
                let idx = self.index(i, j, k);
                if self.cells.get(idx).unwrap_or(false) {
                    self.cells.set(idx, false);
                    cleared += 1;
                }
            }
        }
        self.occupied -= cleared;
        cleared
    }
}

/// A node of the voxel octree.
#[derive(Debug)]
pub struct VoxelNode {
    center: Point3,
    size: f64,
    level: u32,
    parent: Option<NodeKey>,
    /// Children in Morton order: bit 0 is +x, bit 1 is +y, bit 2 is +z.
    children: Option<[NodeKey; 8]>,
    occupancy: Mutex<Option<Occupancy>>,
}

impl VoxelNode {
    /// Center of the node's cube.
    pub fn center(&self) -> Point3 {
        self.center
    }

    /// Edge length of the node's cube.
    pub fn size(&self) -> f64 {
        self.size
    }

    /// Depth below the root.
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Parent node, `None` for the root.
    pub fn parent(&self) -> Option<NodeKey> {
        self.parent
    }

    /// Child nodes of an internal node.
    pub fn children(&self) -> Option<[NodeKey; 8]> {
        self.children
    }

    /// Whether the node is a leaf.
    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    /// Minimum corner of the node's cube.
    pub fn min_corner(&self) -> Point3 {
        self.center - Vec3::repeat(self.size / 2.0)
    }

    fn contains(&self, p: &Point3) -> bool {
        let min = self.min_corner();
        (0..3).all(|a| p[a] >= min[a] && p[a] < min[a] + self.size)
    }

    fn octant_of(&self, p: &Point3) -> usize {
        (p.x >= self.center.x) as usize
            | ((p.y >= self.center.y) as usize) << 1
            | ((p.z >= self.center.z) as usize) << 2
    }

    /// Whether the tool disc at `position` reaches this node.
    fn touches_disc(&self, position: &Point3, radius: f64) -> bool {
        let min = self.min_corner();
        let max = min + Vec3::repeat(self.size);
        if position.z < min.z || position.z >= max.z {
            return false;
        }
        let dx = (min.x - position.x).max(position.x - max.x).max(0.0);
        let dy = (min.y - position.y).max(position.y - max.y).max(0.0);
        dx * dx + dy * dy <= radius * radius
    }

    fn occupied_count(&self) -> usize {
        self.occupancy.lock().as_ref().map_or(0, Occupancy::occupied_count)
    }
}

fn octant_offset(octant: usize) -> Vec3 {
    let sign = |bit: usize| if octant & bit != 0 { 1.0 } else { -1.0 };
    Vec3::new(sign(1), sign(2), sign(4))
}

/// Read-only snapshot of a node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeInfo {
    /// Center of the node's cube.
    pub center: Point3,
    /// Edge length.
    pub size: f64,
    /// Depth below the root.
    pub level: u32,
    /// Parent node.
    pub parent: Option<NodeKey>,
    /// Children of an internal node.
    pub children: Option<[NodeKey; 8]>,
    /// Cell size of a leaf.
    pub resolution: Option<f64>,
    /// Occupied cells of a leaf.
    pub occupied_cells: usize,
}

/// Result of merging eight leaves into their parent.
struct Merge {
    occupancy: Occupancy,
    lossless: bool,
    lost_units: u64,
}

/// Octree of stock occupancy with size-adaptive leaf resolution.
///
/// The root cube starts at the stock's minimum corner and spans the
/// largest stock dimension rounded up to a power-of-two multiple of the
/// base voxel size. Cells outside the stock shape start empty.
#[derive(Debug)]
pub struct AdaptiveVoxelGrid {
    nodes: RwLock<SlotMap<NodeKey, VoxelNode>>,
    root: NodeKey,
    stock_min: Point3,
    stock_max: Point3,
    voxel_size: f64,
    max_voxel_size: f64,
    refinement_threshold: f64,
    finest: f64,
    removed_units: AtomicU64,
    refinements: AtomicUsize,
    coarsenings: AtomicUsize,
}

impl AdaptiveVoxelGrid {
    /// Build the grid for a stock.
    pub fn new(params: &StockParameters) -> Result<Self> {
        params.validate()?;
        let (stock_min, stock_max) = params.bounds();
        let largest = (stock_max - stock_min).max();

        let voxel_size = params.voxel_size;
        let mut root_size = voxel_size;
        while root_size < largest - EPS {
            root_size *= 2.0;
        }
        let mut finest = voxel_size;
        while finest / 2.0 >= params.min_voxel_size - EPS {
            finest /= 2.0;
        }

        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(VoxelNode {
            center: stock_min + Vec3::repeat(root_size / 2.0),
            size: root_size,
            level: 0,
            parent: None,
            children: None,
            occupancy: Mutex::new(None),
        });

        let grid = Self {
            nodes: RwLock::new(nodes),
            root,
            stock_min,
            stock_max,
            voxel_size,
            max_voxel_size: params.max_voxel_size,
            refinement_threshold: params.refinement_threshold,
            finest,
            removed_units: AtomicU64::new(0),
            refinements: AtomicUsize::new(0),
            coarsenings: AtomicUsize::new(0),
        };
        grid.build_initial(params);
        debug!(
            root_size,
            finest,
            leaves = grid.leaf_count(),
            cells = grid.occupied_cell_count(),
            "built voxel grid"
        );
        Ok(grid)
    }

    /// Split the root down to base-resolution leaves and fill them from the stock shape.
    fn build_initial(&self, params: &StockParameters) {
        let mut nodes = self.nodes.write();
        let mut stack = vec![self.root];
        while let Some(key) = stack.pop() {
            let Some(node) = nodes.get(key) else { continue };
            let (center, size, level) = (node.center, node.size, node.level);
            if size > CELLS_PER_EDGE * self.voxel_size + EPS {
                let mut children = [NodeKey::default(); 8];
                for (octant, slot) in children.iter_mut().enumerate() {
                    *slot = nodes.insert(VoxelNode {
                        center: center + octant_offset(octant) * (size / 4.0),
                        size: size / 2.0,
                        level: level + 1,
                        parent: Some(key),
                        children: None,
                        occupancy: Mutex::new(None),
                    });
                }
                if let Some(node) = nodes.get_mut(key) {
                    node.children = Some(children);
                }
                stack.extend(children);
            } else {
                let min = center - Vec3::repeat(size / 2.0);
                let res = self.resolution_for(size);
                let occupancy = Occupancy::from_fn(self.cells_for(size), res, |i, j, k| {
                    params.contains(&cell_center(&min, res, i, j, k))
                });
                if let Some(node) = nodes.get_mut(key) {
                    *node.occupancy.get_mut() = Some(occupancy);
                }
            }
        }
    }

    /// Key of the root node.
    pub fn root(&self) -> NodeKey {
        self.root
    }

    /// Minimum and maximum corner of the root cube.
    pub fn root_bounds(&self) -> (Point3, Point3) {
        let nodes = self.nodes.read();
        match nodes.get(self.root) {
            Some(root) => (root.min_corner(), root.min_corner() + Vec3::repeat(root.size)),
            None => (self.stock_min, self.stock_max),
        }
    }

    /// Axis-aligned stock bounds.
    pub fn stock_bounds(&self) -> (Point3, Point3) {
        (self.stock_min, self.stock_max)
    }

    /// Base voxel size.
    pub fn voxel_size(&self) -> f64 {
        self.voxel_size
    }

    /// Smallest cell size any leaf may use.
    pub fn finest_resolution(&self) -> f64 {
        self.finest
    }

    /// Cell size of a leaf with edge `size`.
    pub fn resolution_for(&self, size: f64) -> f64 {
        (size / CELLS_PER_EDGE).clamp(self.finest, self.voxel_size)
    }

    fn cells_for(&self, size: f64) -> usize {
        ((size / self.resolution_for(size)).round() as usize).max(1)
    }

    fn can_refine(&self, size: f64) -> bool {
        size / 2.0 >= self.finest - EPS
    }

    /// Cell size of the leaves a tool of this diameter ends up cutting in.
    pub fn tool_resolution(&self, tool_diameter: f64) -> f64 {
        let (min, max) = self.root_bounds();
        let mut size = (max - min).x;
        while tool_diameter < size * self.refinement_threshold && self.can_refine(size) {
            size /= 2.0;
        }
        self.resolution_for(size)
    }

    /// Snapshot of a node.
    pub fn node(&self, key: NodeKey) -> Option<NodeInfo> {
        let nodes = self.nodes.read();
        let node = nodes.get(key)?;
        let occupancy = node.occupancy.lock();
        Some(NodeInfo {
            center: node.center,
            size: node.size,
            level: node.level,
            parent: node.parent,
            children: node.children,
            resolution: occupancy.as_ref().map(Occupancy::resolution),
            occupied_cells: occupancy.as_ref().map_or(0, Occupancy::occupied_count),
        })
    }

    /// Leaf containing a point.
    pub fn get_node_at_point(&self, p: &Point3) -> Result<NodeKey> {
        let nodes = self.nodes.read();
        Self::leaf_key_at(&nodes, self.root, p).ok_or(StockSimError::OutOfBounds)
    }

    fn leaf_key_at(
        nodes: &SlotMap<NodeKey, VoxelNode>,
        root: NodeKey,
        p: &Point3,
    ) -> Option<NodeKey> {
        let mut key = root;
        let mut node = nodes.get(key)?;
        if !node.contains(p) {
            return None;
        }
        while let Some(children) = node.children {
            key = children[node.octant_of(p)];
            node = nodes.get(key)?;
        }
        Some(key)
    }

    /// Split a leaf into eight children carrying over its occupancy.
    ///
    /// No-op for internal nodes and for leaves whose children would fall
    /// below the minimum voxel size. Returns whether the node was split.
    pub fn refine(&self, key: NodeKey) -> bool {
        let mut nodes = self.nodes.write();
        self.refine_node(&mut nodes, key)
    }

    fn refine_node(&self, nodes: &mut SlotMap<NodeKey, VoxelNode>, key: NodeKey) -> bool {
        let Some(node) = nodes.get_mut(key) else { return false };
        if !node.is_leaf() || !self.can_refine(node.size) {
            return false;
        }
        let Some(source) = node.occupancy.get_mut().take() else { return false };
        let (center, size, level, min) = (node.center, node.size, node.level, node.min_corner());

        let child_size = size / 2.0;
        let res = self.resolution_for(child_size);
        let dim = self.cells_for(child_size);
        let mut children = [NodeKey::default(); 8];
        for (octant, slot) in children.iter_mut().enumerate() {
            let child_center = center + octant_offset(octant) * (size / 4.0);
            let child_min = child_center - Vec3::repeat(child_size / 2.0);
            let occupancy = Occupancy::from_fn(dim, res, |i, j, k| {
                source.at_point(&min, &cell_center(&child_min, res, i, j, k))
            });
            *slot = nodes.insert(VoxelNode {
                center: child_center,
                size: child_size,
                level: level + 1,
                parent: Some(key),
                children: None,
                occupancy: Mutex::new(Some(occupancy)),
            });
        }
        if let Some(node) = nodes.get_mut(key) {
            node.children = Some(children);
        }
        self.refinements.fetch_add(1, Ordering::Relaxed);
        trace!(size, level, "refined leaf");
        true
    }

    /// Merge the eight leaf children of a node back into it.
    ///
    /// A parent cell keeps material only if every child cell it covers does;
    /// any material dropped this way counts as removed. No-op unless the
    /// node is internal with only leaf children. Returns whether it merged.
    pub fn coarsen(&self, key: NodeKey) -> bool {
        let mut nodes = self.nodes.write();
        match self.merge_children(&nodes, key) {
            Some(merge) => {
                self.apply_merge(&mut nodes, key, merge);
                true
            }
            None => false,
        }
    }

    fn merge_children(&self, nodes: &SlotMap<NodeKey, VoxelNode>, key: NodeKey) -> Option<Merge> {
        let node = nodes.get(key)?;
        let children = node.children?;
        if children.iter().any(|c| nodes.get(*c).is_none_or(|child| !child.is_leaf())) {
            return None;
        }

        let min = node.min_corner();
        let res = self.resolution_for(node.size);
        let dim = self.cells_for(node.size);
        let mut all = BitVec::from_elem(dim * dim * dim, true);
        let mut any = BitVec::from_elem(dim * dim * dim, false);
        let mut child_units = 0u64;
        let mut parent = Occupancy::from_fn(dim, res, |_, _, _| false);

        for child in children.iter().filter_map(|c| nodes.get(*c)) {
            let guard = child.occupancy.lock();
            let Some(occupancy) = guard.as_ref() else { continue };
            let child_min = child.min_corner();
            let units = self.volume_units(occupancy.resolution);
            for k in 0..occupancy.dim {
                for j in 0..occupancy.dim {
                    for i in 0..occupancy.dim {
                        let center = cell_center(&child_min, occupancy.resolution, i, j, k);
                        let [pi, pj, pk] = parent.cell_of(&min, &center);
                        let idx = parent.index(pi, pj, pk);
                        if occupancy.get(i, j, k) {
                            any.set(idx, true);
                            child_units += units;
                        } else {
                            all.set(idx, false);
                        }
                    }
                }
            }
        }

        let lossless = all == any;
        parent.occupied = all.iter().filter(|b| *b).count();
        parent.cells = all;
        let kept = parent.occupied as u64 * self.volume_units(res);
        Some(Merge {
            occupancy: parent,
            lossless,
            lost_units: child_units.saturating_sub(kept),
        })
    }

    fn apply_merge(&self, nodes: &mut SlotMap<NodeKey, VoxelNode>, key: NodeKey, merge: Merge) {
        let Some(children) = nodes.get_mut(key).and_then(|node| node.children.take()) else {
            return;
        };
        for child in children {
            nodes.remove(child);
        }
        if let Some(node) = nodes.get_mut(key) {
            *node.occupancy.get_mut() = Some(merge.occupancy);
            trace!(
                size = node.size,
                level = node.level,
                lossless = merge.lossless,
                "coarsened node"
            );
        }
        self.removed_units.fetch_add(merge.lost_units, Ordering::Relaxed);
        self.coarsenings.fetch_add(1, Ordering::Relaxed);
    }

    /// Volume of one cell in units of the finest cell.
    fn volume_units(&self, resolution: f64) -> u64 {
        ((resolution / self.finest).round() as u64).pow(3)
    }

    fn footprint_hits_stock(&self, position: &Point3, radius: f64) -> bool {
        if position.z < self.stock_min.z || position.z > self.stock_max.z {
            return false;
        }
        let dx = (self.stock_min.x - position.x).max(position.x - self.stock_max.x).max(0.0);
        let dy = (self.stock_min.y - position.y).max(position.y - self.stock_max.y).max(0.0);
        dx * dx + dy * dy <= radius * radius
    }

    fn footprint_leaves(
        &self,
        nodes: &SlotMap<NodeKey, VoxelNode>,
        position: &Point3,
        radius: f64,
    ) -> Vec<NodeKey> {
        let mut leaves = Vec::new();
        let mut stack = vec![self.root];
        while let Some(key) = stack.pop() {
            let Some(node) = nodes.get(key) else { continue };
            if !node.touches_disc(position, radius) {
                continue;
            }
            match node.children {
                Some(children) => stack.extend(children),
                None => leaves.push(key),
            }
        }
        leaves
    }

    fn needs_refinement(
        &self,
        nodes: &SlotMap<NodeKey, VoxelNode>,
        key: NodeKey,
        tool_diameter: f64,
    ) -> bool {
        nodes.get(key).is_some_and(|node| {
            node.is_leaf()
                && tool_diameter < node.size * self.refinement_threshold
                && self.can_refine(node.size)
                && node.occupied_count() > 0
        })
    }

    /// Parents worth merging back once a tool of this diameter has passed.
    fn coarsen_candidate(&self, node: &VoxelNode, tool_diameter: f64) -> bool {
        node.size < self.max_voxel_size - EPS
            && tool_diameter >= node.size * self.refinement_threshold
            && node.children.is_some()
    }

    /// Clear the tool footprint at `position`.
    ///
    /// Every cell whose center lies within `tool_diameter / 2` of the
    /// position in XY, in the single Z layer containing the tool tip, loses
    /// its material. Leaves that are coarse relative to the tool are refined
    /// first; afterwards parents of the touched leaves are merged back when
    /// that loses nothing. A footprint that misses the stock is a no-op.
    /// Returns the number of cells cleared.
    pub fn remove_material(&self, position: &Point3, tool_diameter: f64) -> Result<usize> {
        if !(tool_diameter.is_finite() && tool_diameter > 0.0) {
            return Err(StockSimError::InvalidTool(tool_diameter));
        }
        if !position.iter().all(|c| c.is_finite()) {
            return Err(StockSimError::InvalidPosition);
        }
        let radius = tool_diameter / 2.0;
        if !self.footprint_hits_stock(position, radius) {
            return Ok(0);
        }

        loop {
            let nodes = self.nodes.read();
            let leaves = self.footprint_leaves(&nodes, position, radius);
            let pending: Vec<NodeKey> = leaves
                .iter()
                .copied()
                .filter(|key| self.needs_refinement(&nodes, *key, tool_diameter))
                .collect();

            if pending.is_empty() {
                let mut cleared = 0;
                let mut parents: Vec<NodeKey> = Vec::new();
                for node in leaves.iter().filter_map(|key| nodes.get(*key)) {
                    let mut guard = node.occupancy.lock();
                    if let Some(occupancy) = guard.as_mut() {
                        let count = occupancy.clear_disc(&node.min_corner(), position, radius);
                        self.removed_units
                            .fetch_add(
                                count as u64 * self.volume_units(occupancy.resolution),
                                Ordering::Relaxed,
                            );
                        cleared += count;
                    }
                    drop(guard);
                    if let Some(parent) = node.parent.filter(|p| !parents.contains(p)) {
                        let candidate = nodes
                            .get(parent)
                            .is_some_and(|p| self.coarsen_candidate(p, tool_diameter));
                        if candidate {
                            parents.push(parent);
                        }
                    }
                }
                drop(nodes);
                if !parents.is_empty() {
                    self.coarsen_lossless(&parents, tool_diameter);
                }
                return Ok(cleared);
            }

            drop(nodes);
            let mut nodes = self.nodes.write();
            for key in pending {
                if self.needs_refinement(&nodes, key, tool_diameter) {
                    self.refine_node(&mut nodes, key);
                }
            }
        }
    }

    fn coarsen_lossless(&self, parents: &[NodeKey], tool_diameter: f64) {
        let mut nodes = self.nodes.write();
        for &key in parents {
            if !nodes.get(key).is_some_and(|node| self.coarsen_candidate(node, tool_diameter)) {
                continue;
            }
            if let Some(merge) = self.merge_children(&nodes, key).filter(|m| m.lossless) {
                self.apply_merge(&mut nodes, key, merge);
            }
        }
    }

    /// Whether material remains at a point. Points outside the root are empty.
    pub fn is_occupied(&self, p: &Point3) -> bool {
        self.view().occupied_at(p)
    }

    /// Sample the occupancy at the centers of a uniform grid.
    pub fn sample_field(&self, origin: Point3, resolution: f64, dims: [usize; 3]) -> VoxelField {
        let view = self.view();
        VoxelField::from_fn(origin, resolution, dims, |p| view.occupied_at(p))
    }

    pub(crate) fn view(&self) -> TreeView<'_> {
        TreeView {
            root: self.root,
            nodes: self.nodes.read(),
        }
    }

    /// Number of nodes in the arena.
    pub fn node_count(&self) -> usize {
        self.nodes.read().len()
    }

    /// Number of leaves.
    pub fn leaf_count(&self) -> usize {
        self.nodes.read().values().filter(|n| n.is_leaf()).count()
    }

    /// Cells still holding material, across all leaves.
    pub fn occupied_cell_count(&self) -> usize {
        self.nodes.read().values().map(VoxelNode::occupied_count).sum()
    }

    /// Volume of the material still present.
    pub fn material_volume(&self) -> f64 {
        let nodes = self.nodes.read();
        nodes
            .values()
            .filter_map(|n| {
                n.occupancy
                    .lock()
                    .as_ref()
                    .map(|o| o.occupied as f64 * o.resolution.powi(3))
            })
            .sum()
    }

    /// Volume cleared so far, including material dropped by coarsening.
    pub fn removed_volume(&self) -> f64 {
        self.removed_units.load(Ordering::Relaxed) as f64 * self.finest.powi(3)
    }

    /// Leaves split so far.
    pub fn refinement_count(&self) -> usize {
        self.refinements.load(Ordering::Relaxed)
    }

    /// Nodes merged so far.
    pub fn coarsening_count(&self) -> usize {
        self.coarsenings.load(Ordering::Relaxed)
    }
}

fn cell_center(min: &Point3, res: f64, i: usize, j: usize, k: usize) -> Point3 {
    Point3::new(
        min.x + (i as f64 + 0.5) * res,
        min.y + (j as f64 + 0.5) * res,
        min.z + (k as f64 + 0.5) * res,
    )
}

/// A leaf's geometry and a copy of its cells.
#[derive(Debug, Clone)]
pub(crate) struct LeafCells {
    pub min: Point3,
    pub occupancy: Occupancy,
}

impl LeafCells {
    pub fn center(&self, i: usize, j: usize, k: usize) -> Point3 {
        cell_center(&self.min, self.occupancy.resolution, i, j, k)
    }
}

/// Read access to the tree for queries spanning many leaves.
pub(crate) struct TreeView<'a> {
    root: NodeKey,
    nodes: RwLockReadGuard<'a, SlotMap<NodeKey, VoxelNode>>,
}

impl TreeView<'_> {
    fn leaf_at(&self, p: &Point3) -> Option<&VoxelNode> {
        AdaptiveVoxelGrid::leaf_key_at(&self.nodes, self.root, p)
            .and_then(|key| self.nodes.get(key))
    }

    /// Occupancy at a point; outside the root is empty.
    pub fn occupied_at(&self, p: &Point3) -> bool {
        self.leaf_at(p).is_some_and(|leaf| {
            let min = leaf.min_corner();
            leaf.occupancy.lock().as_ref().is_some_and(|o| o.at_point(&min, p))
        })
    }

    /// Cell size of the leaf containing a point.
    pub fn resolution_at(&self, p: &Point3) -> Option<f64> {
        self.leaf_at(p)
            .and_then(|leaf| leaf.occupancy.lock().as_ref().map(Occupancy::resolution))
    }

    /// Copies of all leaves holding material.
    pub fn occupied_leaves(&self) -> Vec<LeafCells> {
        self.nodes
            .values()
            .filter_map(|node| {
                let guard = node.occupancy.lock();
                let occupancy = guard.as_ref().filter(|o| o.occupied > 0)?;
                Some(LeafCells {
                    min: node.min_corner(),
                    occupancy: occupancy.clone(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn block(length: f64, width: f64, height: f64) -> AdaptiveVoxelGrid {
        AdaptiveVoxelGrid::new(&StockParameters::rectangular(length, width, height)).unwrap()
    }

    fn assert_conserved(grid: &AdaptiveVoxelGrid, initial: f64) {
        let total = grid.material_volume() + grid.removed_volume();
        assert!((total - initial).abs() < 1e-9, "{total} != {initial}");
    }

    #[test]
    fn test_initial_occupancy_matches_stock() {
        let grid = block(10.0, 6.0, 4.0);
        assert_eq!(grid.leaf_count(), 1);
        assert_eq!(grid.occupied_cell_count(), 240);
        assert!(grid.is_occupied(&Point3::new(9.5, 5.5, 3.5)));
        assert!(!grid.is_occupied(&Point3::new(10.5, 0.5, 0.5)));
        assert!(!grid.is_occupied(&Point3::new(-1.0, 0.5, 0.5)));
    }

    #[test]
    fn test_root_pre_split_to_base_leaves() {
        let grid = block(100.0, 50.0, 25.0);
        let (min, max) = grid.root_bounds();
        assert!(((max - min).x - 128.0).abs() < 1e-12);
        assert_eq!(grid.leaf_count(), 512);
        let leaf = grid.get_node_at_point(&Point3::new(50.0, 25.0, 20.0)).unwrap();
        let info = grid.node(leaf).unwrap();
        assert!((info.size - 16.0).abs() < 1e-12);
        assert_eq!(info.resolution, Some(1.0));
        assert_eq!(info.level, 3);
        assert_abs_diff_eq!(grid.material_volume(), 125_000.0, epsilon = 1e-9);
    }

    #[test]
    fn test_cylinder_outside_cleared() {
        let params = StockParameters::cylindrical(20.0, 5.0).with_origin([10.0, 10.0, 0.0]);
        let grid = AdaptiveVoxelGrid::new(&params).unwrap();
        let volume = grid.material_volume();
        assert!((volume - params.volume()).abs() < params.volume() * 0.03);
        assert!(grid.is_occupied(&Point3::new(10.5, 10.5, 2.5)));
        assert!(!grid.is_occupied(&Point3::new(0.5, 0.5, 2.5)));
        assert!(!grid.is_occupied(&Point3::new(19.5, 19.5, 2.5)));
    }

    #[test]
    fn test_remove_clears_disc_in_one_layer() {
        let grid = block(100.0, 50.0, 25.0);
        let cleared = grid.remove_material(&Point3::new(50.0, 25.0, 20.0), 10.0).unwrap();

        let mut expected = 0;
        for i in 0..100 {
            for j in 0..50 {
                let dx = i as f64 + 0.5 - 50.0;
                let dy = j as f64 + 0.5 - 25.0;
                if dx * dx + dy * dy <= 25.0 {
                    expected += 1;
                }
            }
        }
        assert_eq!(cleared, expected);
        assert!((grid.removed_volume() - expected as f64).abs() < 1e-9);
        assert_eq!(grid.refinement_count(), 0);

        assert!(!grid.is_occupied(&Point3::new(50.5, 25.5, 20.5)));
        assert!(!grid.is_occupied(&Point3::new(46.5, 27.5, 20.5)));
        assert!(grid.is_occupied(&Point3::new(50.5, 25.5, 19.5)));
        assert!(grid.is_occupied(&Point3::new(50.5, 25.5, 21.5)));
        assert!(grid.is_occupied(&Point3::new(56.0, 25.5, 20.5)));
        assert_conserved(&grid, 125_000.0);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let grid = block(40.0, 40.0, 10.0);
        let p = Point3::new(20.0, 20.0, 5.0);
        assert!(grid.remove_material(&p, 6.0).unwrap() > 0);
        let occupied = grid.occupied_cell_count();
        assert_eq!(grid.remove_material(&p, 6.0).unwrap(), 0);
        assert_eq!(grid.occupied_cell_count(), occupied);
    }

    #[test]
    fn test_small_tool_refines() {
        let grid = block(32.0, 32.0, 16.0);
        let p = Point3::new(16.3, 16.3, 10.2);
        let cleared = grid.remove_material(&p, 1.0).unwrap();

        let leaf = grid.node(grid.get_node_at_point(&p).unwrap()).unwrap();
        assert!((leaf.size - 2.0).abs() < 1e-12);
        assert_eq!(leaf.resolution, Some(0.25));
        assert!(grid.refinement_count() > 0);
        assert_eq!(cleared, 13);
        assert!((grid.removed_volume() - 13.0 * 0.25f64.powi(3)).abs() < 1e-12);
        assert_conserved(&grid, 32.0 * 32.0 * 16.0);
        assert!((grid.tool_resolution(1.0) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_refine_and_coarsen_round_trip() {
        let grid = block(16.0, 16.0, 16.0);
        let root = grid.root();
        assert!(grid.refine(root));
        assert!(!grid.refine(root));
        assert_eq!(grid.leaf_count(), 8);
        let info = grid.node(root).unwrap();
        let children = info.children.unwrap();
        for child in children {
            let child = grid.node(child).unwrap();
            assert_eq!(child.parent, Some(root));
            assert_eq!(child.level, 1);
            assert!((child.size - 8.0).abs() < 1e-12);
        }
        assert!((grid.material_volume() - 4096.0).abs() < 1e-9);

        assert!(grid.coarsen(root));
        assert!(!grid.coarsen(root));
        assert_eq!(grid.leaf_count(), 1);
        assert_eq!(grid.node_count(), 1);
        assert!((grid.removed_volume()).abs() < 1e-12);
        assert_eq!(grid.coarsening_count(), 1);
    }

    #[test]
    fn test_refine_stops_at_min_size() {
        let params = StockParameters::rectangular(1.0, 1.0, 1.0).with_voxel_limits(0.5, 8.0);
        let grid = AdaptiveVoxelGrid::new(&params).unwrap();
        let root = grid.root();
        assert!(grid.refine(root));
        let child = grid.node(root).unwrap().children.unwrap()[0];
        assert!(!grid.refine(child));
        assert!((grid.node(child).unwrap().size - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_lossy_coarsen_counts_as_removed() {
        let grid = block(16.0, 16.0, 16.0);
        let root = grid.root();
        grid.refine(root);
        let cleared = grid.remove_material(&Point3::new(2.1, 2.1, 2.1), 4.0).unwrap();
        assert!(cleared > 0);
        assert_eq!(grid.refinement_count(), 1);
        let before = grid.material_volume();

        assert!(grid.coarsen(root));
        assert!(grid.material_volume() < before);
        assert_conserved(&grid, 4096.0);
        // The layer above the cut shared coarse cells with it.
        assert!(!grid.is_occupied(&Point3::new(2.9, 2.9, 2.8)));
    }

    #[test]
    fn test_auto_coarsen_after_larger_tool() {
        let grid = block(16.0, 16.0, 16.0);
        let p = Point3::new(6.3, 6.3, 5.2);
        grid.remove_material(&p, 1.0).unwrap();
        let fine = grid.node(grid.get_node_at_point(&p).unwrap()).unwrap();
        assert!((fine.size - 2.0).abs() < 1e-12);
        assert_eq!(grid.coarsening_count(), 0);

        grid.remove_material(&p, 4.0).unwrap();
        let merged = grid.node(grid.get_node_at_point(&p).unwrap()).unwrap();
        assert!((merged.size - 4.0).abs() < 1e-12);
        assert_eq!(grid.coarsening_count(), 1);
        assert_conserved(&grid, 4096.0);
        assert!(!grid.is_occupied(&Point3::new(6.3, 7.8, 5.1)));
    }

    #[test]
    fn test_node_lookup_out_of_bounds() {
        let grid = block(10.0, 10.0, 10.0);
        assert!(grid.get_node_at_point(&Point3::new(5.0, 5.0, 5.0)).is_ok());
        assert_eq!(
            grid.get_node_at_point(&Point3::new(-0.1, 5.0, 5.0)),
            Err(StockSimError::OutOfBounds)
        );
    }

    #[test]
    fn test_remove_outside_stock_is_noop() {
        let grid = block(10.0, 10.0, 10.0);
        assert_eq!(grid.remove_material(&Point3::new(500.0, 500.0, 5.0), 4.0), Ok(0));
        assert_eq!(grid.remove_material(&Point3::new(5.0, 5.0, 50.0), 4.0), Ok(0));
        assert!((grid.removed_volume()).abs() < 1e-12);
    }

    #[test]
    fn test_remove_rejects_bad_input() {
        let grid = block(10.0, 10.0, 10.0);
        assert_eq!(
            grid.remove_material(&Point3::new(5.0, 5.0, 5.0), 0.0),
            Err(StockSimError::InvalidTool(0.0))
        );
        assert_eq!(
            grid.remove_material(&Point3::new(f64::NAN, 5.0, 5.0), 2.0),
            Err(StockSimError::InvalidPosition)
        );
    }
}
