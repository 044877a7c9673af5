/// Vector function traits and numerical differentiation
pub mod calculus;
/// Newton's method with optional line search
pub mod newton;

use nalgebra::RealField;
use std::error::Error;

/// Scalar types supported by the solvers.
pub trait Real: RealField + Copy {}

impl<T: RealField + Copy> Real for T {}

/// Error type returned by user-supplied functions and Jacobian solvers.
pub type BoxedError = Box<dyn Error + Send + Sync>;
