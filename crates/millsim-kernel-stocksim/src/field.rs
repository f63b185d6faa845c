//! Dense occupancy snapshots.

use bit_vec::BitVec;
use millsim_kernel_geom::Point3;

/// A uniform occupancy grid sampled from the stock.
///
/// Cell `(i, j, k)` spans `origin + [i, j, k] * resolution` to one
/// resolution step beyond; it is set when material remains at its center.
#[derive(Debug, Clone, PartialEq)]
pub struct VoxelField {
    origin: Point3,
    resolution: f64,
    dims: [usize; 3],
    cells: BitVec,
}

impl VoxelField {
    /// An empty field.
    pub fn new(origin: Point3, resolution: f64, dims: [usize; 3]) -> Self {
        Self {
            origin,
            resolution,
            dims,
            cells: BitVec::from_elem(dims[0] * dims[1] * dims[2], false),
        }
    }

    /// Field filled from a per-cell-center predicate.
    pub fn from_fn(
        origin: Point3,
        resolution: f64,
        dims: [usize; 3],
        mut occupied: impl FnMut(&Point3) -> bool,
    ) -> Self {
        let mut field = Self::new(origin, resolution, dims);
        for k in 0..dims[2] {
            for j in 0..dims[1] {
                for i in 0..dims[0] {
                    if occupied(&field.cell_center(i, j, k)) {
                        let idx = field.index(i, j, k);
                        field.cells.set(idx, true);
                    }
                }
            }
        }
        field
    }

    /// Minimum corner.
    pub fn origin(&self) -> Point3 {
        self.origin
    }

    /// Cell edge length.
    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// Cell counts along X, Y and Z.
    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    fn index(&self, i: usize, j: usize, k: usize) -> usize {
        (k * self.dims[1] + j) * self.dims[0] + i
    }

    /// Center of cell `(i, j, k)`.
    pub fn cell_center(&self, i: usize, j: usize, k: usize) -> Point3 {
        Point3::new(
            self.origin.x + (i as f64 + 0.5) * self.resolution,
            self.origin.y + (j as f64 + 0.5) * self.resolution,
            self.origin.z + (k as f64 + 0.5) * self.resolution,
        )
    }

    /// Occupancy of a cell; out-of-range indices are empty.
    pub fn get(&self, i: usize, j: usize, k: usize) -> bool {
        if i >= self.dims[0] || j >= self.dims[1] || k >= self.dims[2] {
            return false;
        }
        self.cells.get(self.index(i, j, k)).unwrap_or(false)
    }

    /// Occupancy of the cell containing a point.
    pub fn is_occupied_at(&self, p: &Point3) -> bool {
        let rel = (p - self.origin) / self.resolution;
        if rel.iter().any(|c| *c < 0.0) {
            return false;
        }
        self.get(rel.x.floor() as usize, rel.y.floor() as usize, rel.z.floor() as usize)
    }

    /// Number of set cells.
    pub fn occupied_count(&self) -> usize {
        self.cells.iter().filter(|b| *b).count()
    }

    /// Material volume represented by the field.
    pub fn volume(&self) -> f64 {
        self.occupied_count() as f64 * self.resolution.powi(3)
    }

    /// Cells set here but clear in `other`.
    ///
    /// Both fields must share a layout; otherwise every set cell counts.
    pub fn removed_since(&self, other: &VoxelField) -> usize {
        if self.dims != other.dims {
            return self.occupied_count();
        }
        self.cells
            .iter()
            .zip(other.cells.iter())
            .filter(|(before, after)| *before && !*after)
            .count()
    }

    /// Iterate over `(i, j, k)` of every set cell.
    pub fn occupied_cells(&self) -> impl Iterator<Item = [usize; 3]> + '_ {
        let [nx, ny, _] = self.dims;
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, set)| *set)
            .map(move |(idx, _)| [idx % nx, (idx / nx) % ny, idx / (nx * ny)])
    }
}
