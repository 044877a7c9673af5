//! Bilinear quadrilateral elements on a uniform grid.
use crate::error::Error;
use crate::field::{Field, FieldValue, FieldWriteGuard, NumericFieldValue};
use crate::grid::Grid;
use crate::quadrature::quadrilateral_gauss;
use itertools::izip;
use nalgebra::SMatrix;
use nalgebra_sparse::CsrMatrix;

/// Number of nodes per element.
pub const NK: usize = 4;

/// Number of quadrature points per element.
pub const NQ: usize = 4;

/// Grid offsets of the local nodes, counter-clockwise from the lower left corner.
pub const NODE_OFFSETS: [(usize, usize); NK] = [(0, 0), (1, 0), (1, 1), (0, 1)];

/// Value and gradient of a shape function at a point.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ShapeGerm {
    pub val: f64,
    pub dx: f64,
    pub dy: f64,
}

/// Element-local matrix for vector-valued unknowns, laid out as `[u_0, v_0, u_1, v_1, ...]`.
pub type ElementMatrix = SMatrix<f64, { 2 * NK }, { 2 * NK }>;

/// Shape functions and weights at the quadrature points of an element.
///
/// All elements of a uniform grid are translates of each other, so the table is computed once.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementQuadrature {
    germs: [[ShapeGerm; NK]; NQ],
    weights: [f64; NQ],
}

impl ElementQuadrature {
    pub fn new(grid: &Grid) -> Self {
        let (dx, dy) = (grid.dx(), grid.dy());
        let (weights, points) = quadrilateral_gauss(2);
        debug_assert_eq!(points.len(), NQ);

        // The map from the reference element [-1, 1]^2 to [0, dx] x [0, dy] has the constant
        // Jacobian diag(dx / 2, dy / 2)
        let jacobian_det = 0.25 * dx * dy;
        let mut germs = [[ShapeGerm {
            val: 0.0,
            dx: 0.0,
            dy: 0.0,
        }; NK]; NQ];
        let mut jxw = [0.0; NQ];

        for (q, (w, xi)) in izip!(&weights, &points).enumerate() {
            jxw[q] = w * jacobian_det;
            for (k, &(a, b)) in NODE_OFFSETS.iter().enumerate() {
                // Reference node coordinates alpha, beta in {-1, 1}
                let alpha = 2.0 * a as f64 - 1.0;
                let beta = 2.0 * b as f64 - 1.0;
                germs[q][k] = ShapeGerm {
                    val: (1.0 + alpha * xi[0]) * (1.0 + beta * xi[1]) / 4.0,
                    dx: alpha * (1.0 + beta * xi[1]) / 4.0 * 2.0 / dx,
                    dy: beta * (1.0 + alpha * xi[0]) / 4.0 * 2.0 / dy,
                };
            }
        }

        Self { germs, weights: jxw }
    }

    /// Shape function germs, indexed by `[q][k]`.
    pub fn germs(&self) -> &[[ShapeGerm; NK]; NQ] {
        &self.germs
    }

    /// Quadrature weights scaled by the Jacobian determinant of the element map.
    pub fn weights(&self) -> &[f64; NQ] {
        &self.weights
    }

    /// Interpolates nodal values to the quadrature points.
    pub fn values<V: NumericFieldValue>(&self, nodal: &[V; NK]) -> [V; NQ] {
        let mut result = [V::zero(); NQ];
        for (r, germs_q) in result.iter_mut().zip(&self.germs) {
            for (germ, &value) in germs_q.iter().zip(nodal) {
                *r += value * germ.val;
            }
        }
        result
    }

    /// Interpolates nodal values and their x and y derivatives to the quadrature points.
    pub fn values_and_gradients<V: NumericFieldValue>(&self, nodal: &[V; NK]) -> ([V; NQ], [V; NQ], [V; NQ]) {
        let mut values = [V::zero(); NQ];
        let mut d_dx = [V::zero(); NQ];
        let mut d_dy = [V::zero(); NQ];
        for q in 0..NQ {
            for (germ, &value) in self.germs[q].iter().zip(nodal) {
                values[q] += value * germ.val;
                d_dx[q] += value * germ.dx;
                d_dy[q] += value * germ.dy;
            }
        }
        (values, d_dx, d_dy)
    }
}

/// Maps the local nodes of one element to grid nodes.
///
/// Local nodes may be marked as constrained, in which case contributions to their rows (and,
/// for matrices, columns) are dropped when scattering into global storage.
#[derive(Debug, Clone, PartialEq)]
pub struct DofMap {
    ghosted: [(isize, isize); NK],
    nodes: [usize; NK],
    constrained: [bool; NK],
}

impl DofMap {
    /// The map for element `(i, j)` of `grid`.
    ///
    /// # Panics
    ///
    /// Panics if `(i, j)` is not an element of the grid.
    pub fn new(grid: &Grid, i: usize, j: usize) -> Self {
        assert!(i < grid.num_elements_x() && j < grid.num_elements_y());
        let mut ghosted = [(0, 0); NK];
        let mut nodes = [0; NK];
        for (k, &(a, b)) in NODE_OFFSETS.iter().enumerate() {
            ghosted[k] = ((i + a) as isize, (j + b) as isize);
            // Elements past the last node only exist in periodic directions
            nodes[k] = grid.node_index((i + a) % grid.mx(), (j + b) % grid.my());
        }
        Self {
            ghosted,
            nodes,
            constrained: [false; NK],
        }
    }

    /// Canonical index of local node `k`.
    pub fn node(&self, k: usize) -> usize {
        self.nodes[k]
    }

    pub fn nodes(&self) -> &[usize; NK] {
        &self.nodes
    }

    pub fn mark_constrained(&mut self, k: usize) {
        self.constrained[k] = true;
    }

    pub fn is_constrained(&self, k: usize) -> bool {
        self.constrained[k]
    }

    /// Reads the values of the element nodes through the ghost halo of `field`.
    pub fn extract<V: FieldValue>(&self, field: &Field<V>) -> [V; NK] {
        let mut local = [V::zero(); NK];
        for (value, &(i, j)) in local.iter_mut().zip(&self.ghosted) {
            *value = field.get_ghosted(i, j);
        }
        local
    }

    /// Adds an element vector to the global vector, skipping constrained nodes.
    pub fn add_local_residual<V: NumericFieldValue>(&self, local: &[V; NK], global: &mut FieldWriteGuard<V>) {
        for k in 0..NK {
            if !self.constrained[k] {
                global.add_to_node(self.nodes[k], local[k]);
            }
        }
    }

    /// Adds an element matrix for vector unknowns to a CSR matrix with block size 2.
    ///
    /// Rows and columns of constrained nodes are skipped.
    pub fn add_local_jacobian(&self, local: &ElementMatrix, matrix: &mut CsrMatrix<f64>) -> Result<(), Error> {
        for k in 0..NK {
            if self.constrained[k] {
                continue;
            }
            for c in 0..2 {
                let row = 2 * self.nodes[k] + c;
                let mut csr_row = matrix.row_mut(row);
                let (cols, values) = csr_row.cols_and_values_mut();
                for l in 0..NK {
                    if self.constrained[l] {
                        continue;
                    }
                    for d in 0..2 {
                        let col = 2 * self.nodes[l] + d;
                        let idx = cols
                            .binary_search(&col)
                            .map_err(|_| Error::MissingMatrixEntry { row, col })?;
                        values[idx] += local[(2 * k + c, 2 * l + d)];
                    }
                }
            }
        }
        Ok(())
    }
}

