//! The Jacobian of the SSA residual with respect to the design variable.
//!
//! With `B = phi(zeta)` and a flow law linear in `B`, a perturbation `dzeta` changes the
//! integrated viscosity by `d(nuH) = 2 H nu(1, gamma) phi'(zeta) dzeta`, and the residual by
//! the viscous term of the weak form with `nuH` replaced by `d(nuH)`.
use crate::assembly::SsaAssembler;
use crate::element::{DofMap, NK, NQ};
use crate::error::Error;
use crate::field::{Field, ELEMENT_STENCIL_WIDTH};
use crate::flow_law::secondinvariant_2d;
use crate::parameterization::DesignParameterization;
use nalgebra::Vector2;

/// A design variable together with the hardness it induces.
///
/// The generation identifies the design; operators derived from it are reused for as long as
/// the generation does not change.
#[derive(Debug, Clone, PartialEq)]
pub struct DesignState {
    generation: u64,
    zeta: Field<f64>,
    hardness: Field<f64>,
    hardness_derivative: Field<f64>,
}

impl DesignState {
    pub fn new(zeta: &Field<f64>, parameterization: &DesignParameterization, generation: u64) -> Self {
        let zeta = zeta.with_stencil_width(ELEMENT_STENCIL_WIDTH);
        let (hardness, hardness_derivative) = parameterization.to_hardness_fields(&zeta);
        Self {
            generation,
            zeta,
            hardness,
            hardness_derivative,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn zeta(&self) -> &Field<f64> {
        &self.zeta
    }

    /// `B = phi(zeta)` at every node.
    pub fn hardness(&self) -> &Field<f64> {
        &self.hardness
    }

    /// `dB/dzeta = phi'(zeta)` at every node.
    pub fn hardness_derivative(&self) -> &Field<f64> {
        &self.hardness_derivative
    }
}

impl SsaAssembler {
    /// Computes `du = (dR/dzeta) dzeta` at the state `u`.
    ///
    /// `dzeta` is taken as zero at fixed design locations, and `du` vanishes at constrained
    /// velocity nodes.
    pub fn apply_jacobian_design(
        &self,
        design: &DesignState,
        u: &Field<Vector2<f64>>,
        dzeta: &Field<f64>,
        du: &mut Field<Vector2<f64>>,
    ) -> Result<(), Error> {
        let grid = self.grid();
        u.check_grid(grid)?;
        dzeta.check_grid(grid)?;
        du.check_grid(grid)?;
        design.zeta().check_grid(grid)?;

        let u = u.ghosted(ELEMENT_STENCIL_WIDTH);
        let dzeta = dzeta.ghosted(ELEMENT_STENCIL_WIDTH);
        let velocity_constraints = self.velocity_constraints();
        let fixed_zeta = self.design_constraints();
        let germs = self.quadrature().germs();
        let jxw = self.quadrature().weights();

        let mut du_global = du.write();
        du_global.zero();

        for (i, j) in grid.elements() {
            let mut dofmap = DofMap::new(grid, i, j);
            let (_, d_q) = self.element_velocity(&mut dofmap, &u, &velocity_constraints);

            let mut dzeta_e = dofmap.extract(&*dzeta);
            fixed_zeta.update_homogeneous(&dofmap, &mut dzeta_e);

            // Change of hardness at the nodes, then at the quadrature points
            let db_dzeta_e = dofmap.extract(design.hardness_derivative());
            let mut db_e = [0.0; NK];
            for k in 0..NK {
                db_e[k] = db_dzeta_e[k] * dzeta_e[k];
            }
            let db_q = self.quadrature().values(&db_e);

            let coefficients = self.coefficients().element(grid.element_index(i, j));
            let mut du_e = [Vector2::zeros(); NK];
            for q in 0..NQ {
                let d = &d_q[q];
                let (d_nu_h, _) = self.viscosity_times_thickness(&coefficients[q], db_q[q], secondinvariant_2d(d));
                for (r, germ) in du_e.iter_mut().zip(&germs[q]) {
                    r.x += jxw[q] * d_nu_h * (germ.dx * (2.0 * d[0] + d[1]) + germ.dy * d[2]);
                    r.y += jxw[q] * d_nu_h * (germ.dy * (2.0 * d[1] + d[0]) + germ.dx * d[2]);
                }
            }
            dofmap.add_local_residual(&du_e, &mut du_global);
        }

        velocity_constraints.fix_residual_homogeneous(&mut du_global);
        Ok(())
    }

    /// Computes `dzeta = (dR/dzeta)^T du` at the state `u`.
    ///
    /// `du` is taken as zero at constrained velocity nodes, and `dzeta` vanishes at fixed
    /// design locations.
    pub fn apply_jacobian_design_transpose(
        &self,
        design: &DesignState,
        u: &Field<Vector2<f64>>,
        du: &Field<Vector2<f64>>,
        dzeta: &mut Field<f64>,
    ) -> Result<(), Error> {
        let grid = self.grid();
        u.check_grid(grid)?;
        du.check_grid(grid)?;
        dzeta.check_grid(grid)?;
        design.zeta().check_grid(grid)?;

        let u = u.ghosted(ELEMENT_STENCIL_WIDTH);
        let du = du.ghosted(ELEMENT_STENCIL_WIDTH);
        let velocity_constraints = self.velocity_constraints();
        let germs = self.quadrature().germs();
        let jxw = self.quadrature().weights();

        let mut dzeta_global = dzeta.write();
        dzeta_global.zero();

        for (i, j) in grid.elements() {
            // Design rows are not constrained by the velocity mask, so only the velocity
            // dofmap gets its constrained nodes marked
            let dofmap = DofMap::new(grid, i, j);
            let mut velocity_dofmap = dofmap.clone();

            let mut du_e = dofmap.extract(&*du);
            velocity_constraints.update_homogeneous(&dofmap, &mut du_e);
            let (_, ddu_dx, ddu_dy) = self.quadrature().values_and_gradients(&du_e);

            let (_, d_q) = self.element_velocity(&mut velocity_dofmap, &u, &velocity_constraints);

            let coefficients = self.coefficients().element(grid.element_index(i, j));
            let mut dzeta_e = [0.0; NK];
            for q in 0..NQ {
                let d = &d_q[q];
                let (d_nu_h_db, _) = self.viscosity_times_thickness(&coefficients[q], 1.0, secondinvariant_2d(d));
                let contraction = ddu_dx[q].x * (2.0 * d[0] + d[1])
                    + ddu_dy[q].x * d[2]
                    + ddu_dy[q].y * (2.0 * d[1] + d[0])
                    + ddu_dx[q].y * d[2];
                for (r, germ) in dzeta_e.iter_mut().zip(&germs[q]) {
                    *r += jxw[q] * d_nu_h_db * germ.val * contraction;
                }
            }
            dofmap.add_local_residual(&dzeta_e, &mut dzeta_global);
        }

        // Chain rule from hardness back to the design variable
        let db_dzeta = design.hardness_derivative();
        for node in 0..grid.num_nodes() {
            let value = dzeta_global.get_node(node) * db_dzeta.get_node(node);
            dzeta_global.set_node(node, value);
        }

        self.design_constraints().fix_residual_homogeneous(&mut dzeta_global);
        Ok(())
    }
}
