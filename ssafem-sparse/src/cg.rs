use crate::ConvergenceReason;
use core::fmt;
use log::trace;
use nalgebra::{ClosedAdd, ClosedMul, DVector, DVectorView, DVectorViewMut, RealField, Scalar};
use nalgebra_sparse::ops::serial::spmm_csr_dense;
use nalgebra_sparse::ops::Op;
use nalgebra_sparse::CsrMatrix;
use num::{One, Zero};
use numeric_literals::replace_float_literals;
use std::error::Error;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

pub type BoxedError = Box<dyn Error + Send + Sync>;

pub trait LinearOperator<T: Scalar> {
    fn apply(&self, y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), BoxedError>;
}

impl<'a, T, A> LinearOperator<T> for &'a A
where
    T: Scalar,
    A: ?Sized + LinearOperator<T>,
{
    fn apply(&self, y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), BoxedError> {
        <A as LinearOperator<T>>::apply(self, y, x)
    }
}

impl<T> LinearOperator<T> for CsrMatrix<T>
where
    T: Scalar + Zero + One + ClosedMul + ClosedAdd,
{
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), BoxedError> {
        spmm_csr_dense(T::zero(), &mut y, T::one(), Op::NoOp(self), Op::NoOp(&x));
        Ok(())
    }
}

pub struct IdentityOperator;

impl<T: Scalar> LinearOperator<T> for IdentityOperator {
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), BoxedError> {
        y.copy_from(&x);
        Ok(())
    }
}

/// Norms available to a stopping criterion at a given CG iteration.
#[derive(Debug, Copy, Clone)]
pub struct CgProgress<T> {
    pub iteration: usize,
    pub rhs_norm: T,
    pub initial_residual_norm: T,
    /// Norm of the *approximate* residual maintained by the CG recurrence.
    pub residual_norm: T,
}

pub trait CgStoppingCriterion<T: Scalar> {
    /// Returns `Some(reason)` if the iteration should stop.
    fn check(&self, progress: &CgProgress<T>) -> Option<ConvergenceReason>;
}

/// Residual tolerances in the usual Krylov convention.
///
/// Stops with success when `||r|| <= max(rtol * ||b||, atol)` and with failure when
/// `||r|| >= dtol * ||r_0||` or the residual is no longer finite.
///
/// Note that we use the *approximate* residual given by Conjugate-Gradient. For ill-conditioned
/// problems, it is possible that CG's residual converges, but the real residual does not.
#[derive(Debug, Copy, Clone)]
pub struct ResidualCriterion<T: Scalar> {
    pub rtol: T,
    pub atol: T,
    pub dtol: T,
}

impl<T: RealField + Copy> ResidualCriterion<T> {
    pub fn new(rtol: T, atol: T, dtol: T) -> Self {
        Self { rtol, atol, dtol }
    }

    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    pub fn relative(rtol: T) -> Self {
        Self {
            rtol,
            atol: 0.0,
            dtol: 1e5,
        }
    }
}

impl Default for ResidualCriterion<f64> {
    fn default() -> Self {
        Self::new(1e-8, 1e-50, 1e5)
    }
}

impl<T> CgStoppingCriterion<T> for ResidualCriterion<T>
where
    T: RealField + Copy,
{
    fn check(&self, progress: &CgProgress<T>) -> Option<ConvergenceReason> {
        let r = progress.residual_norm;
        if !r.is_finite() {
            Some(ConvergenceReason::DivergedNanOrInf)
        } else if r <= self.rtol * progress.rhs_norm {
            Some(ConvergenceReason::ConvergedRtol)
        } else if r <= self.atol {
            Some(ConvergenceReason::ConvergedAtol)
        } else if r >= self.dtol * progress.initial_residual_norm {
            Some(ConvergenceReason::DivergedDtol)
        } else {
            None
        }
    }
}

/// Vectors reused across solves of systems with the same dimension.
#[derive(Debug, Clone)]
pub struct CgWorkspace<T: Scalar> {
    residual: DVector<T>,
    preconditioned: DVector<T>,
    direction: DVector<T>,
    operator_direction: DVector<T>,
}

impl<T: Scalar + Zero> Default for CgWorkspace<T> {
    fn default() -> Self {
        Self {
            residual: DVector::zeros(0),
            preconditioned: DVector::zeros(0),
            direction: DVector::zeros(0),
            operator_direction: DVector::zeros(0),
        }
    }
}

impl<T: Scalar + Zero> CgWorkspace<T> {
    fn resize(&mut self, dim: usize) {
        for v in [
            &mut self.residual,
            &mut self.preconditioned,
            &mut self.direction,
            &mut self.operator_direction,
        ] {
            v.resize_vertically_mut(dim, T::zero());
        }
    }
}

#[derive(Debug)]
enum OwnedOrMutRef<'a, T> {
    Owned(T),
    MutRef(&'a mut T),
}

impl<'a, T> Deref for OwnedOrMutRef<'a, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        match self {
            Self::Owned(owned) => owned,
            Self::MutRef(mutref) => mutref,
        }
    }
}

impl<'a, T> DerefMut for OwnedOrMutRef<'a, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self {
            Self::Owned(owned) => owned,
            Self::MutRef(mutref) => mutref,
        }
    }
}

/// Preconditioned Conjugate Gradient for symmetric positive definite operators.
///
/// Built with a small builder API:
///
/// ```ignore
/// let output = ConjugateGradient::new()
///     .with_operator(&a)
///     .with_preconditioner(&p)
///     .with_stopping_criterion(ResidualCriterion::default())
///     .with_max_iter(100)
///     .solve_with_guess(&b, &mut x)?;
/// ```
#[derive(Debug)]
pub struct ConjugateGradient<'a, T, A, P, Criterion>
where
    T: Scalar,
{
    workspace: OwnedOrMutRef<'a, CgWorkspace<T>>,
    operator: A,
    preconditioner: P,
    stopping_criterion: Criterion,
    max_iter: Option<usize>,
}

impl<'a, T: Scalar + Zero> ConjugateGradient<'a, T, (), IdentityOperator, ()> {
    pub fn new() -> Self {
        Self {
            workspace: OwnedOrMutRef::Owned(CgWorkspace::default()),
            operator: (),
            preconditioner: IdentityOperator,
            stopping_criterion: (),
            max_iter: None,
        }
    }
}

impl<'a, T: Scalar> ConjugateGradient<'a, T, (), IdentityOperator, ()> {
    pub fn with_workspace(workspace: &'a mut CgWorkspace<T>) -> Self {
        Self {
            workspace: OwnedOrMutRef::MutRef(workspace),
            operator: (),
            preconditioner: IdentityOperator,
            stopping_criterion: (),
            max_iter: None,
        }
    }
}

impl<'a, T: Scalar, P, Criterion> ConjugateGradient<'a, T, (), P, Criterion> {
    pub fn with_operator<A>(self, operator: A) -> ConjugateGradient<'a, T, A, P, Criterion> {
        ConjugateGradient {
            workspace: self.workspace,
            operator,
            preconditioner: self.preconditioner,
            stopping_criterion: self.stopping_criterion,
            max_iter: self.max_iter,
        }
    }
}

impl<'a, T: Scalar, A, P, Criterion> ConjugateGradient<'a, T, A, P, Criterion> {
    pub fn with_preconditioner<P2>(self, preconditioner: P2) -> ConjugateGradient<'a, T, A, P2, Criterion> {
        ConjugateGradient {
            workspace: self.workspace,
            operator: self.operator,
            preconditioner,
            stopping_criterion: self.stopping_criterion,
            max_iter: self.max_iter,
        }
    }

    pub fn with_max_iter(self, max_iter: usize) -> Self {
        Self {
            max_iter: Some(max_iter),
            ..self
        }
    }
}

impl<'a, T: Scalar, A, P> ConjugateGradient<'a, T, A, P, ()> {
    pub fn with_stopping_criterion<Criterion>(
        self,
        stopping_criterion: Criterion,
    ) -> ConjugateGradient<'a, T, A, P, Criterion> {
        ConjugateGradient {
            workspace: self.workspace,
            operator: self.operator,
            preconditioner: self.preconditioner,
            stopping_criterion,
            max_iter: self.max_iter,
        }
    }
}

/// Failure to *apply* the operator or preconditioner.
///
/// This is distinct from a solve that ran but did not converge, which is reported through
/// [`CgOutput::reason`].
#[derive(Debug)]
#[non_exhaustive]
pub enum SolveErrorKind {
    OperatorError(BoxedError),
    PreconditionerError(BoxedError),
}

impl fmt::Display for SolveErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OperatorError(err) => {
                write!(f, "Error applying operator: ")?;
                err.fmt(f)
            }
            Self::PreconditionerError(err) => {
                write!(f, "Error applying preconditioner: ")?;
                err.fmt(f)
            }
        }
    }
}

#[non_exhaustive]
#[derive(Debug)]
pub struct SolveError<T> {
    pub output: CgOutput<T>,
    pub kind: SolveErrorKind,
}

impl<T> SolveError<T> {
    fn new(output: CgOutput<T>, kind: SolveErrorKind) -> Self {
        Self { output, kind }
    }
}

impl<T> fmt::Display for SolveError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CG solve failed after {} iterations. ", self.output.num_iterations)?;
        write!(f, "Error: {}", self.kind)
    }
}

impl<T: fmt::Debug> std::error::Error for SolveError<T> {}

#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct CgOutput<T> {
    /// Number of iterations of the solver.
    ///
    /// Corresponds to the number of updates made to the (initial) solution vector,
    pub num_iterations: usize,
    /// Why the iteration stopped. Always inspect this: a diverged reason is still an `Ok` output.
    pub reason: ConvergenceReason,
    marker: PhantomData<T>,
}

impl<'a, T, A, P, Criterion> ConjugateGradient<'a, T, A, P, Criterion>
where
    T: RealField + Copy,
    A: LinearOperator<T>,
    P: LinearOperator<T>,
    Criterion: CgStoppingCriterion<T>,
{
    /// Solves `A x = b` starting from the initial guess in `x`.
    ///
    /// Returns `Err` only if the operator or preconditioner cannot be applied. Breakdown and
    /// the iteration cap are reported through the convergence reason of the output.
    pub fn solve_with_guess<'b>(
        &mut self,
        b: impl Into<DVectorView<'b, T>>,
        x: impl Into<DVectorViewMut<'b, T>>,
    ) -> Result<CgOutput<T>, SolveError<T>> {
        use SolveErrorKind::*;
        let b = b.into();
        let mut x = x.into();
        assert_eq!(b.len(), x.len());

        let mut output = CgOutput {
            num_iterations: 0,
            reason: ConvergenceReason::DivergedIterations,
            marker: PhantomData,
        };

        let rhs_norm = b.norm();
        if rhs_norm == T::zero() {
            x.fill(T::zero());
            output.reason = ConvergenceReason::ConvergedZeroRhs;
            return Ok(output);
        }

        let workspace = &mut *self.workspace;
        workspace.resize(x.len());
        let CgWorkspace {
            residual: r,
            preconditioned: z,
            direction: p,
            operator_direction: ap,
        } = workspace;

        // r = b - A x
        if let Err(err) = self.operator.apply((&mut *r).into(), (&x).into()) {
            return Err(SolveError::new(output, OperatorError(err)));
        }
        r.zip_apply(&b, |ax_i, b_i| *ax_i = b_i - *ax_i);

        if let Err(err) = self.preconditioner.apply((&mut *z).into(), (&*r).into()) {
            return Err(SolveError::new(output, PreconditionerError(err)));
        }
        p.copy_from(&*z);

        let mut z_dot_r = z.dot(&*r);
        let initial_residual_norm = r.norm();

        loop {
            let progress = CgProgress {
                iteration: output.num_iterations,
                rhs_norm,
                initial_residual_norm,
                residual_norm: r.norm(),
            };
            if let Some(reason) = self.stopping_criterion.check(&progress) {
                output.reason = reason;
                break;
            }
            if self.max_iter.map_or(false, |max_iter| output.num_iterations >= max_iter) {
                output.reason = ConvergenceReason::DivergedIterations;
                break;
            }

            if let Err(err) = self.operator.apply((&mut *ap).into(), (&*p).into()) {
                return Err(SolveError::new(output, OperatorError(err)));
            }
            let curvature = p.dot(&*ap);
            if curvature <= T::zero() {
                output.reason = ConvergenceReason::DivergedIndefiniteMatrix;
                break;
            }
            if z_dot_r <= T::zero() {
                output.reason = ConvergenceReason::DivergedIndefinitePreconditioner;
                break;
            }

            let alpha = z_dot_r / curvature;
            x.axpy(alpha, &*p, T::one());
            r.axpy(-alpha, &*ap, T::one());
            output.num_iterations += 1;

            if let Err(err) = self.preconditioner.apply((&mut *z).into(), (&*r).into()) {
                return Err(SolveError::new(output, PreconditionerError(err)));
            }
            let z_dot_r_next = z.dot(&*r);
            let beta = z_dot_r_next / z_dot_r;
            // p <- z + beta p
            p.axpy(T::one(), &*z, beta);
            z_dot_r = z_dot_r_next;
        }

        trace!("CG terminated with {} after {} iterations", output.reason, output.num_iterations);
        Ok(output)
    }
}
