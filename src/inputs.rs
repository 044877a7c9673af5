//! Static model inputs of the SSA forward problem.
use crate::error::Error;
use crate::field::{Field, ELEMENT_STENCIL_WIDTH};
use crate::grid::Grid;
use nalgebra::Vector2;

/// Density of ice in kg / m^3.
pub const ICE_DENSITY: f64 = 910.0;

/// Gravitational acceleration in m / s^2.
pub const STANDARD_GRAVITY: f64 = 9.81;

/// Ice geometry, basal resistance, forcing and constraints of one SSA problem.
///
/// All fields are stored with a halo of [`ELEMENT_STENCIL_WIDTH`] so that element assembly
/// can read them directly.
#[derive(Debug, Clone)]
pub struct SsaInputs {
    thickness: Field<f64>,
    basal_drag: Field<f64>,
    driving_stress: Field<Vector2<f64>>,
    dirichlet_mask: Option<Field<bool>>,
    dirichlet_values: Option<Field<Vector2<f64>>>,
    fixed_design_locations: Option<Field<bool>>,
}

impl SsaInputs {
    /// Inputs with the given ice thickness `H`, linear basal drag coefficient `beta >= 0` and
    /// driving stress, without constraints.
    pub fn new(
        thickness: &Field<f64>,
        basal_drag: &Field<f64>,
        driving_stress: &Field<Vector2<f64>>,
    ) -> Result<Self, Error> {
        let grid = thickness.grid();
        basal_drag.check_grid(grid)?;
        driving_stress.check_grid(grid)?;
        if let Some(beta) = basal_drag.values().find(|beta| !(*beta >= 0.0)) {
            return Err(Error::InvalidParameter(format!(
                "basal drag coefficient must be non-negative, got {}",
                beta
            )));
        }
        Ok(Self {
            thickness: thickness.with_stencil_width(ELEMENT_STENCIL_WIDTH),
            basal_drag: basal_drag.with_stencil_width(ELEMENT_STENCIL_WIDTH),
            driving_stress: driving_stress.with_stencil_width(ELEMENT_STENCIL_WIDTH),
            dirichlet_mask: None,
            dirichlet_values: None,
            fixed_design_locations: None,
        })
    }

    /// Prescribes the velocity at the nodes where `mask` is set.
    ///
    /// Without `values` the prescribed velocity is zero.
    pub fn with_dirichlet(mut self, mask: &Field<bool>, values: Option<&Field<Vector2<f64>>>) -> Result<Self, Error> {
        mask.check_grid(self.grid())?;
        if let Some(values) = values {
            values.check_grid(self.grid())?;
        }
        self.dirichlet_mask = Some(mask.with_stencil_width(ELEMENT_STENCIL_WIDTH));
        self.dirichlet_values = values.map(|v| v.with_stencil_width(ELEMENT_STENCIL_WIDTH));
        Ok(self)
    }

    /// Freezes the design variable at the nodes where `mask` is set.
    pub fn with_fixed_design_locations(mut self, mask: &Field<bool>) -> Result<Self, Error> {
        mask.check_grid(self.grid())?;
        self.fixed_design_locations = Some(mask.with_stencil_width(ELEMENT_STENCIL_WIDTH));
        Ok(self)
    }

    pub fn grid(&self) -> &Grid {
        self.thickness.grid()
    }

    pub fn thickness(&self) -> &Field<f64> {
        &self.thickness
    }

    pub fn basal_drag(&self) -> &Field<f64> {
        &self.basal_drag
    }

    pub fn driving_stress(&self) -> &Field<Vector2<f64>> {
        &self.driving_stress
    }

    pub fn dirichlet_mask(&self) -> Option<&Field<bool>> {
        self.dirichlet_mask.as_ref()
    }

    pub fn dirichlet_values(&self) -> Option<&Field<Vector2<f64>>> {
        self.dirichlet_values.as_ref()
    }

    pub fn fixed_design_locations(&self) -> Option<&Field<bool>> {
        self.fixed_design_locations.as_ref()
    }
}

/// Computes the driving stress `-rho g H grad(s)` from thickness and surface elevation.
///
/// Uses centered differences, one-sided at the edges of non-periodic directions.
pub fn driving_stress_from_geometry(thickness: &Field<f64>, surface: &Field<f64>) -> Result<Field<Vector2<f64>>, Error> {
    let grid = thickness.grid();
    surface.check_grid(grid)?;
    let surface = surface.ghosted(ELEMENT_STENCIL_WIDTH);
    let (mx, my) = (grid.mx() as isize, grid.my() as isize);

    // Derivative along one direction, given the node index k in that direction
    let derivative = |k: isize, m: isize, periodic: bool, h: f64, at: &dyn Fn(isize) -> f64| {
        if periodic || (k > 0 && k < m - 1) {
            (at(k + 1) - at(k - 1)) / (2.0 * h)
        } else if k == 0 {
            (at(1) - at(0)) / h
        } else {
            (at(m - 1) - at(m - 2)) / h
        }
    };

    let periodicity = grid.periodicity();
    Ok(Field::from_fn(grid, ELEMENT_STENCIL_WIDTH, |i, j| {
        let (i, j) = (i as isize, j as isize);
        let ds_dx = derivative(i, mx, periodicity.x(), grid.dx(), &|k| surface.get_ghosted(k, j));
        let ds_dy = derivative(j, my, periodicity.y(), grid.dy(), &|k| surface.get_ghosted(i, k));
        let pressure = ICE_DENSITY * STANDARD_GRAVITY * thickness.get(i as usize, j as usize);
        Vector2::new(-pressure * ds_dx, -pressure * ds_dy)
    }))
}
