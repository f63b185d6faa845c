//! Boundary quads of the remaining material.

use millsim_kernel_geom::{Point3, Vec3};
use serde::{Deserialize, Serialize};

use crate::octree::TreeView;
use crate::VoxelField;

/// Axis and sign of the six cell faces.
const FACES: [(usize, bool); 6] = [
    (0, false),
    (0, true),
    (1, false),
    (1, true),
    (2, false),
    (2, true),
];

/// Quad mesh of the faces between material and empty space.
///
/// Each face has its own four vertices, wound counter-clockwise when seen
/// from outside the material.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundaryMesh {
    /// Vertex positions.
    pub vertices: Vec<Point3>,
    /// Quads as indices into `vertices`.
    pub faces: Vec<[u32; 4]>,
}

impl BoundaryMesh {
    /// Number of quads.
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Whether the mesh has no faces.
    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// Total surface area.
    pub fn area(&self) -> f64 {
        self.faces
            .iter()
            .map(|f| {
                let v = f.map(|i| self.vertices[i as usize]);
                (v[1] - v[0]).norm() * (v[3] - v[0]).norm()
            })
            .sum()
    }

    /// Sum of area-weighted face normals; zero for a closed surface.
    pub fn vector_area(&self) -> Vec3 {
        self.faces
            .iter()
            .map(|f| {
                let v = f.map(|i| self.vertices[i as usize]);
                (v[1] - v[0]).cross(&(v[3] - v[0]))
            })
            .sum()
    }

    /// Axis-aligned square face of edge `size` centered at `center`.
    fn push_quad(&mut self, center: Point3, size: f64, axis: usize, positive: bool) {
        let (u, v) = (unit((axis + 1) % 3), unit((axis + 2) % 3));
        let h = size / 2.0;
        let mut corners = [
            center - u * h - v * h,
            center + u * h - v * h,
            center + u * h + v * h,
            center - u * h + v * h,
        ];
        if !positive {
            corners.reverse();
        }
        let base = self.vertices.len() as u32;
        self.vertices.extend(corners);
        self.faces.push([base, base + 1, base + 2, base + 3]);
    }

    /// Faces of a uniform field.
    pub fn from_field(field: &VoxelField) -> Self {
        let mut mesh = Self::default();
        let res = field.resolution();
        for [i, j, k] in field.occupied_cells() {
            let center = field.cell_center(i, j, k);
            for (axis, positive) in FACES {
                let mut n = [i, j, k];
                let exposed = match step(n[axis], positive) {
                    Some(next) => {
                        n[axis] = next;
                        !field.get(n[0], n[1], n[2])
                    }
                    None => true,
                };
                if exposed {
                    let face = face_center(center, res, axis, positive);
                    mesh.push_quad(face, res, axis, positive);
                }
            }
        }
        mesh
    }

    /// Faces of the octree's leaves.
    ///
    /// Faces against a finer neighbor leaf are split until they match the
    /// neighbor's cells, so only the exposed part is emitted.
    pub(crate) fn from_tree(view: &TreeView<'_>, finest: f64) -> Self {
        let mut mesh = Self::default();
        let probe = finest / 4.0;
        for leaf in view.occupied_leaves() {
            let occupancy = &leaf.occupancy;
            let (dim, res) = (occupancy.dim(), occupancy.resolution());
            for k in 0..dim {
                for j in 0..dim {
                    for i in 0..dim {
                        if !occupancy.get(i, j, k) {
                            continue;
                        }
                        let center = leaf.center(i, j, k);
                        for (axis, positive) in FACES {
                            let mut n = [i, j, k];
                            match step(n[axis], positive).filter(|next| *next < dim) {
                                Some(next) => {
                                    n[axis] = next;
                                    if !occupancy.get(n[0], n[1], n[2]) {
                                        let face = face_center(center, res, axis, positive);
                                        mesh.push_quad(face, res, axis, positive);
                                    }
                                }
                                None => mesh.push_across(
                                    view,
                                    face_center(center, res, axis, positive),
                                    res,
                                    axis,
                                    positive,
                                    probe,
                                ),
                            }
                        }
                    }
                }
            }
        }
        mesh
    }

    fn push_across(
        &mut self,
        view: &TreeView<'_>,
        center: Point3,
        size: f64,
        axis: usize,
        positive: bool,
        probe: f64,
    ) {
        let sign = if positive { 1.0 } else { -1.0 };
        let across = center + unit(axis) * (sign * probe);
        match view.resolution_at(&across) {
            None => self.push_quad(center, size, axis, positive),
            Some(res) if res < size - 1e-9 => {
                let (u, v) = (unit((axis + 1) % 3), unit((axis + 2) % 3));
                let q = size / 4.0;
                for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                    let sub = center + u * (su * q) + v * (sv * q);
                    self.push_across(view, sub, size / 2.0, axis, positive, probe);
                }
            }
            Some(_) => {
                if !view.occupied_at(&across) {
                    self.push_quad(center, size, axis, positive);
                }
            }
        }
    }
}

fn unit(axis: usize) -> Vec3 {
    let mut v = Vec3::zeros();
    v[axis] = 1.0;
    v
}

fn step(index: usize, positive: bool) -> Option<usize> {
    if positive {
        Some(index + 1)
    } else {
        index.checked_sub(1)
    }
}

fn face_center(cell_center: Point3, res: f64, axis: usize, positive: bool) -> Point3 {
    let sign = if positive { 0.5 } else { -0.5 };
    cell_center + unit(axis) * (sign * res)
}
