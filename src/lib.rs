//! Finite element forward and adjoint sensitivities for the shallow shelf approximation (SSA)
//! of ice flow, with the ice hardness as design variable.
//!
//! The velocity `u` on a structured 2D grid solves the nonlinear SSA momentum balance
//! `R(u, zeta) = 0`, where the design variable `zeta` determines the hardness `B = phi(zeta)`.
//! [`forward::SsaForwardProblem`] solves for `u` and applies the derivative of the map
//! `zeta -> u` and its transpose, which is what gradient-based inversions for the hardness need.
pub mod assembly;
pub mod coefficients;
pub mod config;
pub mod design;
pub mod dirichlet;
pub mod element;
pub mod error;
pub mod field;
pub mod flow_law;
pub mod forward;
pub mod grid;
pub mod inputs;
pub mod parameterization;
pub mod quadrature;
pub mod solve;
pub mod two_block;

pub mod sparse {
    pub use ssafem_sparse::*;
}

pub mod optimize {
    pub use ssafem_optimize::*;
}

pub use error::Error;

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;
