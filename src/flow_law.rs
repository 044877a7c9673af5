//! Constitutive relations for the vertically averaged ice viscosity.
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

/// Seconds per year, used for the default regularization.
pub const SECONDS_PER_YEAR: f64 = 3.15569259747e7;

/// Components `(u_x, v_y, (u_y + v_x) / 2)` of the symmetric 2D strain rate tensor.
pub type StrainRate = [f64; 3];

pub fn strain_rate(du_dx: &Vector2<f64>, du_dy: &Vector2<f64>) -> StrainRate {
    [du_dx.x, du_dy.y, 0.5 * (du_dy.x + du_dx.y)]
}

/// The second invariant of the strain rate, treating it as the in-plane part of an
/// incompressible 3D strain rate.
pub fn secondinvariant_2d(d: &StrainRate) -> f64 {
    d[0] * d[0] + d[1] * d[1] + d[0] * d[1] + d[2] * d[2]
}

pub trait FlowLaw {
    /// Returns the effective viscosity `nu(B, gamma)` and its derivative with respect to the
    /// second invariant `gamma` of the strain rate.
    ///
    /// Implementations must be linear in the hardness `B`.
    fn effective_viscosity(&self, hardness: f64, gamma: f64) -> (f64, f64);
}

/// Glen's flow law with constant exponent, `nu = B / 2 (eps + gamma)^((1 - n) / (2 n))`.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsothermalGlen {
    pub exponent: f64,
    /// Schoof regularization `eps` of the strain rate invariant, in s^-2.
    pub regularization: f64,
}

impl Default for IsothermalGlen {
    fn default() -> Self {
        // (1 m/year / 1000 km)^2
        let v = 1.0 / SECONDS_PER_YEAR;
        let l = 1000.0e3;
        Self {
            exponent: 3.0,
            regularization: (v / l) * (v / l),
        }
    }
}

impl FlowLaw for IsothermalGlen {
    fn effective_viscosity(&self, hardness: f64, gamma: f64) -> (f64, f64) {
        let n = self.exponent;
        let power = (1.0 - n) / (2.0 * n);
        let s = self.regularization + gamma;
        let nu = 0.5 * hardness * s.powf(power);
        // A Newtonian law (n = 1) does not depend on the strain rate at all
        let dnu = if power == 0.0 { 0.0 } else { power * nu / s };
        (nu, dnu)
    }
}
