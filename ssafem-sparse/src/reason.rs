use std::fmt;

/// The reason an iterative solve terminated.
///
/// Mirrors the convention of Krylov solver libraries: reasons are either *converged*
/// (positive) or *diverged* (negative). A diverged reason means that the returned solution
/// must not be trusted.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ConvergenceReason {
    /// `||r|| <= rtol * ||b||`.
    ConvergedRtol,
    /// `||r|| <= atol`.
    ConvergedAtol,
    /// The right-hand side is identically zero, so the solution is zero.
    ConvergedZeroRhs,
    /// The maximum number of iterations was reached.
    DivergedIterations,
    /// The residual grew by more than a factor `dtol` relative to the initial residual.
    DivergedDtol,
    /// The residual is not finite.
    DivergedNanOrInf,
    /// The operator is not positive definite.
    DivergedIndefiniteMatrix,
    /// The preconditioner is not positive definite.
    DivergedIndefinitePreconditioner,
}

impl ConvergenceReason {
    pub fn is_converged(&self) -> bool {
        use ConvergenceReason::*;
        matches!(self, ConvergedRtol | ConvergedAtol | ConvergedZeroRhs)
    }

    pub fn is_diverged(&self) -> bool {
        !self.is_converged()
    }

    /// Signed integer code: positive for converged, negative for diverged.
    pub fn code(&self) -> i32 {
        use ConvergenceReason::*;
        match self {
            ConvergedRtol => 2,
            ConvergedAtol => 3,
            ConvergedZeroRhs => 9,
            DivergedIterations => -3,
            DivergedDtol => -4,
            DivergedIndefinitePreconditioner => -8,
            DivergedNanOrInf => -9,
            DivergedIndefiniteMatrix => -10,
        }
    }
}

impl fmt::Display for ConvergenceReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ConvergenceReason::*;
        let name = match self {
            ConvergedRtol => "CONVERGED_RTOL",
            ConvergedAtol => "CONVERGED_ATOL",
            ConvergedZeroRhs => "CONVERGED_ZERO_RHS",
            DivergedIterations => "DIVERGED_ITS",
            DivergedDtol => "DIVERGED_DTOL",
            DivergedNanOrInf => "DIVERGED_NANORINF",
            DivergedIndefiniteMatrix => "DIVERGED_INDEFINITE_MAT",
            DivergedIndefinitePreconditioner => "DIVERGED_INDEFINITE_PC",
        };
        write!(f, "{}", name)
    }
}
