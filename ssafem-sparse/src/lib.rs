//! Sparse linear solvers used by `ssafem`.
//!
//! The solvers operate on anything implementing [`LinearOperator`](cg::LinearOperator), which
//! includes dense `nalgebra` matrices and `nalgebra-sparse` CSR matrices. A solve never fails
//! silently: every solve reports a [`ConvergenceReason`], and it is up to the caller to decide
//! what to do with a diverged solve.

pub mod cg;
pub mod jacobi;

mod reason;

pub use reason::ConvergenceReason;

pub extern crate nalgebra_sparse;
