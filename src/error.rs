use ssafem_optimize::newton::NewtonError;
use ssafem_optimize::BoxedError;
use ssafem_sparse::ConvergenceReason;
use std::error::Error as StdError;
use std::fmt;
use std::fmt::{Display, Formatter};

/// Library-wide error type.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// The grid description is not usable (too few nodes, non-positive spacing, ...).
    InvalidGrid(String),
    /// A configuration value or a function argument is outside its valid range.
    InvalidParameter(String),
    /// Two fields (or a field and the engine) live on different grids.
    GridMismatch,
    /// A flat vector does not have the length required by its destination.
    SizeMismatch { expected: usize, actual: usize },
    /// An operation that needs the design variable was called before `set_design`.
    DesignNotSet,
    /// An operation that needs a solved state was called before `linearize_at`.
    NotLinearized,
    /// The iterative linear solver terminated with a divergence reason.
    LinearSolveFailed {
        reason: ConvergenceReason,
        iterations: usize,
    },
    /// The linear operator or preconditioner could not be applied.
    LinearSolverError(BoxedError),
    /// The nonlinear (Newton) solve of the state equation failed.
    NonlinearSolveFailed(NewtonError),
    /// An assembled entry does not exist in the sparsity pattern of the state Jacobian.
    MissingMatrixEntry { row: usize, col: usize },
    /// The sparsity pattern or CSR data could not be constructed.
    SparseFormat(BoxedError),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidGrid(msg) => write!(f, "Invalid grid: {}", msg),
            Self::InvalidParameter(msg) => write!(f, "Invalid parameter: {}", msg),
            Self::GridMismatch => write!(f, "Fields are defined on different grids"),
            Self::SizeMismatch { expected, actual } => {
                write!(f, "Size mismatch: expected length {}, got {}", expected, actual)
            }
            Self::DesignNotSet => write!(f, "The design variable has not been set"),
            Self::NotLinearized => write!(f, "The forward problem has not been linearized"),
            Self::LinearSolveFailed { reason, iterations } => write!(
                f,
                "Linear solve failed to converge after {} iterations (reason {})",
                iterations, reason
            ),
            Self::LinearSolverError(err) => write!(f, "Linear solver error: {}", err),
            Self::NonlinearSolveFailed(err) => write!(f, "Nonlinear solve failed: {}", err),
            Self::MissingMatrixEntry { row, col } => {
                write!(f, "Entry ({}, {}) is not part of the sparsity pattern", row, col)
            }
            Self::SparseFormat(err) => write!(f, "Invalid sparse matrix data: {}", err),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::LinearSolverError(err) | Self::SparseFormat(err) => Some(err.as_ref()),
            Self::NonlinearSolveFailed(err) => Some(err),
            _ => None,
        }
    }
}

impl From<NewtonError> for Error {
    fn from(err: NewtonError) -> Self {
        Self::NonlinearSolveFailed(err)
    }
}
