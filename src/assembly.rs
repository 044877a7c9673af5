//! Assembly of the SSA residual and its Jacobian with respect to the velocity.
//!
//! The weak form at a quadrature point with strain rate `D = (u_x, v_y, (u_y + v_x) / 2)` is
//!
//! ```text
//! R_k = sum_q w_q [ nuH (phi_x (2 D0 + D1) + phi_y D2,  phi_y (2 D1 + D0) + phi_x D2)
//!                   + beta phi u - phi tau_d ],
//! ```
//!
//! where `nuH = 2 H nu(B, gamma)` is the vertically integrated viscosity. No boundary terms
//! appear, so edges without Dirichlet constraints are stress-free.
use crate::coefficients::{CoefficientCache, QuadratureCoefficients};
use crate::config::SsaConfig;
use crate::dirichlet::DirichletData;
use crate::element::{DofMap, ElementMatrix, ElementQuadrature, NK, NQ};
use crate::error::Error;
use crate::field::{Field, ELEMENT_STENCIL_WIDTH};
use crate::flow_law::{secondinvariant_2d, strain_rate, FlowLaw, IsothermalGlen, StrainRate};
use crate::grid::Grid;
use crate::inputs::SsaInputs;
use nalgebra::Vector2;
use nalgebra_sparse::pattern::SparsityPattern;
use nalgebra_sparse::CsrMatrix;
use std::collections::BTreeSet;

/// Builds the sparsity pattern coupling every pair of nodes that share an element, with
/// `block_size` unknowns per node.
pub fn assemble_pattern(grid: &Grid, block_size: usize) -> Result<SparsityPattern, Error> {
    // Collecting into a BTreeSet stores each entry exactly once, in row-major order
    let mut matrix_entries = BTreeSet::new();
    for (i, j) in grid.elements() {
        let dofmap = DofMap::new(grid, i, j);
        for &node_i in dofmap.nodes() {
            for &node_j in dofmap.nodes() {
                for s_i in 0..block_size {
                    for s_j in 0..block_size {
                        matrix_entries.insert((block_size * node_i + s_i, block_size * node_j + s_j));
                    }
                }
            }
        }
    }

    let num_rows = block_size * grid.num_nodes();
    let mut offsets = Vec::with_capacity(num_rows + 1);
    let mut column_indices = Vec::with_capacity(matrix_entries.len());

    offsets.push(0);
    for (i, j) in matrix_entries {
        while i + 1 > offsets.len() {
            offsets.push(column_indices.len());
        }
        column_indices.push(j);
    }
    while offsets.len() < (num_rows + 1) {
        offsets.push(column_indices.len());
    }

    SparsityPattern::try_from_offsets_and_indices(num_rows, num_rows, offsets, column_indices)
        .map_err(|err| Error::SparseFormat(err.to_string().into()))
}

/// Local derivative of the viscous stress of a test function, `A_k` in the weak form.
fn stress_germ(dx: f64, dy: f64, d: &StrainRate) -> Vector2<f64> {
    Vector2::new(dx * (2.0 * d[0] + d[1]) + dy * d[2], dy * (2.0 * d[1] + d[0]) + dx * d[2])
}

/// Element-wise assembler of the SSA operators on a fixed grid and fixed static inputs.
#[derive(Debug, Clone)]
pub struct SsaAssembler {
    inputs: SsaInputs,
    quadrature: ElementQuadrature,
    coefficients: CoefficientCache,
    flow_law: IsothermalGlen,
    min_thickness: f64,
    dirichlet_scale: f64,
    pattern: SparsityPattern,
}

impl SsaAssembler {
    pub fn new(inputs: SsaInputs, config: &SsaConfig) -> Result<Self, Error> {
        config.validate()?;
        let quadrature = ElementQuadrature::new(inputs.grid());
        let coefficients = CoefficientCache::new(&inputs, &quadrature);
        let pattern = assemble_pattern(inputs.grid(), 2)?;
        Ok(Self {
            inputs,
            quadrature,
            coefficients,
            flow_law: config.flow_law,
            min_thickness: config.min_thickness,
            dirichlet_scale: config.dirichlet_scale,
            pattern,
        })
    }

    pub fn grid(&self) -> &Grid {
        self.inputs.grid()
    }

    pub fn inputs(&self) -> &SsaInputs {
        &self.inputs
    }

    pub fn quadrature(&self) -> &ElementQuadrature {
        &self.quadrature
    }

    pub fn coefficients(&self) -> &CoefficientCache {
        &self.coefficients
    }

    pub fn flow_law(&self) -> &IsothermalGlen {
        &self.flow_law
    }

    pub fn sparsity_pattern(&self) -> &SparsityPattern {
        &self.pattern
    }

    /// Refreshes the hardness in the coefficient cache.
    pub fn set_hardness(&mut self, hardness: &Field<f64>) -> Result<(), Error> {
        hardness.check_grid(self.inputs.grid())?;
        self.coefficients.set_hardness(hardness, &self.quadrature)
    }

    pub fn velocity_constraints(&self) -> DirichletData<'_, Vector2<f64>> {
        DirichletData::new(
            self.inputs.dirichlet_mask(),
            self.inputs.dirichlet_values(),
            self.dirichlet_scale,
        )
    }

    pub fn design_constraints(&self) -> DirichletData<'_, f64> {
        DirichletData::new(self.inputs.fixed_design_locations(), None, 1.0)
    }

    /// A zero matrix with the sparsity pattern of the state Jacobian.
    pub fn new_state_jacobian(&self) -> Result<CsrMatrix<f64>, Error> {
        let values = vec![0.0; self.pattern.nnz()];
        CsrMatrix::try_from_pattern_and_values(self.pattern.clone(), values)
            .map_err(|err| Error::SparseFormat(err.to_string().into()))
    }

    /// Returns `nuH = 2 H nu(B, gamma)` and `d(nuH)/d(gamma)`, both zero below the
    /// thickness floor.
    pub(crate) fn viscosity_times_thickness(
        &self,
        coefficients: &QuadratureCoefficients,
        hardness: f64,
        gamma: f64,
    ) -> (f64, f64) {
        if coefficients.thickness < self.min_thickness {
            return (0.0, 0.0);
        }
        let (nu, dnu) = self.flow_law.effective_viscosity(hardness, gamma);
        let h2 = 2.0 * coefficients.thickness;
        (h2 * nu, h2 * dnu)
    }

    pub(crate) fn check_hardness(&self) -> Result<(), Error> {
        if self.coefficients.has_hardness() {
            Ok(())
        } else {
            Err(Error::DesignNotSet)
        }
    }

    /// Velocity at the nodes of an element with Dirichlet values injected, and its
    /// interpolation to the quadrature points.
    pub(crate) fn element_velocity(
        &self,
        dofmap: &mut DofMap,
        u: &Field<Vector2<f64>>,
        constraints: &DirichletData<Vector2<f64>>,
    ) -> ([Vector2<f64>; NQ], [StrainRate; NQ]) {
        let mut u_e = dofmap.extract(u);
        constraints.constrain(dofmap);
        constraints.update(dofmap, &mut u_e);
        let (u_q, du_dx, du_dy) = self.quadrature.values_and_gradients(&u_e);
        let mut d_q = [[0.0; 3]; NQ];
        for (d, du_dx, du_dy) in itertools::izip!(&mut d_q, &du_dx, &du_dy) {
            *d = strain_rate(du_dx, du_dy);
        }
        (u_q, d_q)
    }

    /// Computes the residual `R(u)` for the current hardness.
    ///
    /// The residual vanishes at constrained nodes; the value of `u` there is ignored and the
    /// prescribed value is used instead.
    pub fn assemble_residual(&self, u: &Field<Vector2<f64>>, residual: &mut Field<Vector2<f64>>) -> Result<(), Error> {
        self.check_hardness()?;
        let grid = self.grid();
        u.check_grid(grid)?;
        residual.check_grid(grid)?;

        let u = u.ghosted(ELEMENT_STENCIL_WIDTH);
        let constraints = self.velocity_constraints();
        let germs = self.quadrature.germs();
        let jxw = self.quadrature.weights();

        let mut r_global = residual.write();
        r_global.zero();

        for (i, j) in grid.elements() {
            let mut dofmap = DofMap::new(grid, i, j);
            let (u_q, d_q) = self.element_velocity(&mut dofmap, &u, &constraints);
            let coefficients = self.coefficients.element(grid.element_index(i, j));

            let mut r_e = [Vector2::zeros(); NK];
            for q in 0..NQ {
                let c = &coefficients[q];
                let d = &d_q[q];
                let (nu_h, _) = self.viscosity_times_thickness(c, c.hardness, secondinvariant_2d(d));
                for (r, germ) in r_e.iter_mut().zip(&germs[q]) {
                    let basal = u_q[q] * (c.basal_drag * germ.val);
                    let forcing = c.driving_stress * germ.val;
                    *r += (stress_germ(germ.dx, germ.dy, d) * nu_h + basal - forcing) * jxw[q];
                }
            }
            dofmap.add_local_residual(&r_e, &mut r_global);
        }

        constraints.fix_residual_homogeneous(&mut r_global);
        Ok(())
    }

    /// Computes the Jacobian `dR/du` at `u` for the current hardness.
    ///
    /// Constrained rows and columns are zero except for the Dirichlet scale on the diagonal,
    /// so the matrix is symmetric.
    pub fn assemble_jacobian_state(&self, u: &Field<Vector2<f64>>, matrix: &mut CsrMatrix<f64>) -> Result<(), Error> {
        self.check_hardness()?;
        let grid = self.grid();
        u.check_grid(grid)?;
        let n = 2 * grid.num_nodes();
        if matrix.nrows() != n || matrix.ncols() != n {
            return Err(Error::SizeMismatch {
                expected: n,
                actual: matrix.nrows(),
            });
        }

        let u = u.ghosted(ELEMENT_STENCIL_WIDTH);
        let constraints = self.velocity_constraints();
        let germs = self.quadrature.germs();
        let jxw = self.quadrature.weights();

        matrix.values_mut().fill(0.0);

        for (i, j) in grid.elements() {
            let mut dofmap = DofMap::new(grid, i, j);
            let (_, d_q) = self.element_velocity(&mut dofmap, &u, &constraints);
            let coefficients = self.coefficients.element(grid.element_index(i, j));

            let mut k_e = ElementMatrix::zeros();
            for q in 0..NQ {
                let c = &coefficients[q];
                let d = &d_q[q];
                let (nu_h, dnu_h) = self.viscosity_times_thickness(c, c.hardness, secondinvariant_2d(d));
                let w = jxw[q];
                let a = germs[q].map(|germ| stress_germ(germ.dx, germ.dy, d));

                for (k, phi) in germs[q].iter().enumerate() {
                    for (l, psi) in germs[q].iter().enumerate() {
                        let mass = c.basal_drag * phi.val * psi.val;
                        k_e[(2 * k, 2 * l)] += w
                            * (nu_h * (2.0 * phi.dx * psi.dx + 0.5 * phi.dy * psi.dy)
                                + dnu_h * a[k].x * a[l].x
                                + mass);
                        k_e[(2 * k, 2 * l + 1)] +=
                            w * (nu_h * (phi.dx * psi.dy + 0.5 * phi.dy * psi.dx) + dnu_h * a[k].x * a[l].y);
                        k_e[(2 * k + 1, 2 * l)] +=
                            w * (nu_h * (phi.dy * psi.dx + 0.5 * phi.dx * psi.dy) + dnu_h * a[k].y * a[l].x);
                        k_e[(2 * k + 1, 2 * l + 1)] += w
                            * (nu_h * (2.0 * phi.dy * psi.dy + 0.5 * phi.dx * psi.dx)
                                + dnu_h * a[k].y * a[l].y
                                + mass);
                    }
                }
            }
            dofmap.add_local_jacobian(&k_e, matrix)?;
        }

        constraints.fix_jacobian(matrix);
        Ok(())
    }
}
