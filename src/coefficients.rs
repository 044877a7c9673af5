//! Material coefficients at the quadrature points of every element.
use crate::element::{DofMap, ElementQuadrature, NQ};
use crate::error::Error;
use crate::field::{Field, ELEMENT_STENCIL_WIDTH};
use crate::inputs::SsaInputs;
use log::trace;
use nalgebra::Vector2;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct QuadratureCoefficients {
    pub thickness: f64,
    pub basal_drag: f64,
    pub driving_stress: Vector2<f64>,
    pub hardness: f64,
}

/// Coefficients interpolated to the quadrature points, stored per element.
///
/// The static inputs are interpolated once. The hardness depends on the design variable and
/// is refreshed by [`CoefficientCache::set_hardness`]; until then it is unset.
#[derive(Debug, Clone, PartialEq)]
pub struct CoefficientCache {
    coefficients: Vec<[QuadratureCoefficients; NQ]>,
    has_hardness: bool,
}

impl CoefficientCache {
    pub fn new(inputs: &SsaInputs, quadrature: &ElementQuadrature) -> Self {
        let grid = inputs.grid();
        let coefficients = grid
            .elements()
            .map(|(i, j)| {
                let dofmap = DofMap::new(grid, i, j);
                let thickness = quadrature.values(&dofmap.extract(inputs.thickness()));
                let basal_drag = quadrature.values(&dofmap.extract(inputs.basal_drag()));
                let driving_stress = quadrature.values(&dofmap.extract(inputs.driving_stress()));
                let mut element = [QuadratureCoefficients {
                    thickness: 0.0,
                    basal_drag: 0.0,
                    driving_stress: Vector2::zeros(),
                    hardness: 0.0,
                }; NQ];
                for (q, c) in element.iter_mut().enumerate() {
                    c.thickness = thickness[q];
                    c.basal_drag = basal_drag[q];
                    c.driving_stress = driving_stress[q];
                }
                element
            })
            .collect();
        Self {
            coefficients,
            has_hardness: false,
        }
    }

    /// Interpolates the nodal hardness to the quadrature points of every element.
    pub fn set_hardness(&mut self, hardness: &Field<f64>, quadrature: &ElementQuadrature) -> Result<(), Error> {
        let grid = hardness.grid().clone();
        if grid.num_elements() != self.coefficients.len() {
            return Err(Error::GridMismatch);
        }
        let hardness = hardness.ghosted(ELEMENT_STENCIL_WIDTH);
        for (i, j) in grid.elements() {
            let dofmap = DofMap::new(&grid, i, j);
            let hardness_q = quadrature.values(&dofmap.extract(&*hardness));
            let element = &mut self.coefficients[grid.element_index(i, j)];
            for (c, b) in element.iter_mut().zip(hardness_q) {
                c.hardness = b;
            }
        }
        self.has_hardness = true;
        trace!("Cached hardness at {} quadrature points", NQ * self.coefficients.len());
        Ok(())
    }

    pub fn has_hardness(&self) -> bool {
        self.has_hardness
    }

    pub fn num_elements(&self) -> usize {
        self.coefficients.len()
    }

    pub fn element(&self, element_index: usize) -> &[QuadratureCoefficients; NQ] {
        &self.coefficients[element_index]
    }
}
