use crate::calculus::{DifferentiableVectorFunction, VectorFunction};
use crate::{BoxedError, Real};
use itertools::iterate;
use log::debug;
use nalgebra::{DVectorView, DVectorViewMut, Scalar};
use numeric_literals::replace_float_literals;
use std::error::Error;
use std::fmt;
use std::fmt::Display;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct NewtonSettings<T> {
    pub max_iterations: Option<usize>,
    /// Converged when `|F(u)|_2 <= max(absolute_tolerance, relative_tolerance * |F(u_0)|_2)`.
    pub absolute_tolerance: T,
    pub relative_tolerance: T,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct NewtonOutput<T> {
    pub iterations: usize,
    pub initial_residual_norm: T,
    pub residual_norm: T,
}

#[derive(Debug)]
pub enum NewtonError {
    /// The procedure failed because the maximum number of iterations was reached.
    MaximumIterationsReached(usize),
    /// Evaluating the function failed.
    FunctionError(BoxedError),
    /// The procedure failed because solving the Jacobian system failed.
    JacobianError(BoxedError),
    /// The line search failed to produce a valid step direction.
    LineSearchError(BoxedError),
    /// The residual norm became NaN or infinite at the given iteration.
    NonFiniteResidual(usize),
}

impl Display for NewtonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            &NewtonError::MaximumIterationsReached(maxit) => {
                write!(f, "Failed to converge within maximum number of iterations ({}).", maxit)
            }
            &NewtonError::FunctionError(ref err) => {
                write!(f, "Failed to evaluate function. Error: {}", err)
            }
            &NewtonError::JacobianError(ref err) => {
                write!(f, "Failed to solve Jacobian system. Error: {}", err)
            }
            &NewtonError::LineSearchError(ref err) => {
                write!(f, "Line search failed to produce valid step direction. Error: {}", err)
            }
            &NewtonError::NonFiniteResidual(iter) => {
                write!(f, "Residual norm is not finite at iteration {}.", iter)
            }
        }
    }
}

impl Error for NewtonError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            NewtonError::MaximumIterationsReached(_) | NewtonError::NonFiniteResidual(_) => None,
            NewtonError::FunctionError(err) | NewtonError::JacobianError(err) | NewtonError::LineSearchError(err) => {
                Some(err.as_ref())
            }
        }
    }
}

/// Attempts to solve the non-linear equation F(u) = 0.
///
/// No heap allocation is performed by the iteration itself.
/// On entry `x` holds the initial guess, on return it holds the last iterate
/// and `f` holds `F(x)`.
pub fn newton<'a, T, F>(
    function: F,
    x: impl Into<DVectorViewMut<'a, T>>,
    f: impl Into<DVectorViewMut<'a, T>>,
    dx: impl Into<DVectorViewMut<'a, T>>,
    settings: NewtonSettings<T>,
) -> Result<NewtonOutput<T>, NewtonError>
where
    T: Real,
    F: DifferentiableVectorFunction<T>,
{
    newton_line_search(function, x, f, dx, settings, &mut NoLineSearch {})
}

/// Same as `newton`, but allows specifying a line search.
#[replace_float_literals(T::from_f64(literal).unwrap())]
pub fn newton_line_search<'a, T, F>(
    mut function: F,
    x: impl Into<DVectorViewMut<'a, T>>,
    f: impl Into<DVectorViewMut<'a, T>>,
    dx: impl Into<DVectorViewMut<'a, T>>,
    settings: NewtonSettings<T>,
    line_search: &mut impl LineSearch<T, F>,
) -> Result<NewtonOutput<T>, NewtonError>
where
    T: Real,
    F: DifferentiableVectorFunction<T>,
{
    let mut x = x.into();
    let mut f = f.into();
    let mut minus_dx = dx.into();

    assert_eq!(x.nrows(), f.nrows());
    assert_eq!(minus_dx.nrows(), f.nrows());

    function
        .eval_into(&mut f, &DVectorView::from(&x))
        .map_err(NewtonError::FunctionError)?;

    let initial_residual_norm = f.norm();
    if !initial_residual_norm.is_finite() {
        return Err(NewtonError::NonFiniteResidual(0));
    }
    let tolerance = T::max(settings.absolute_tolerance, settings.relative_tolerance * initial_residual_norm);
    debug!("Newton initial residual norm: {}, tolerance: {}", initial_residual_norm, tolerance);

    let mut iter = 0;

    while f.norm() > tolerance {
        if settings
            .max_iterations
            .map(|max_iter| iter == max_iter)
            .unwrap_or(false)
        {
            return Err(NewtonError::MaximumIterationsReached(iter));
        }

        // Solve the system J dx = -f   <=>   J (-dx) = f
        function
            .solve_jacobian_system(&mut minus_dx, &DVectorView::from(&x), &DVectorView::from(&f))
            .map_err(NewtonError::JacobianError)?;

        // Flip sign to make it consistent with line search
        minus_dx *= -1.0;
        let dx = &minus_dx;

        let step_length = line_search
            .step(
                &mut function,
                DVectorViewMut::from(&mut f),
                DVectorViewMut::from(&mut x),
                DVectorView::from(dx),
            )
            .map_err(NewtonError::LineSearchError)?;
        debug!(
            "Newton step length at iter {}: {}, residual norm: {}",
            iter,
            step_length,
            f.norm()
        );
        iter += 1;

        if !f.norm().is_finite() {
            return Err(NewtonError::NonFiniteResidual(iter));
        }
    }

    Ok(NewtonOutput {
        iterations: iter,
        initial_residual_norm,
        residual_norm: f.norm(),
    })
}

pub trait LineSearch<T: Scalar, F: VectorFunction<T>> {
    fn step(
        &mut self,
        function: &mut F,
        f: DVectorViewMut<T>,
        x: DVectorViewMut<T>,
        direction: DVectorView<T>,
    ) -> Result<T, BoxedError>;
}

/// Trivial implementation of line search. Equivalent to a single, full Newton step.
#[derive(Clone, Debug)]
pub struct NoLineSearch;

impl<T, F> LineSearch<T, F> for NoLineSearch
where
    T: Real,
    F: VectorFunction<T>,
{
    fn step(
        &mut self,
        function: &mut F,
        mut f: DVectorViewMut<T>,
        mut x: DVectorViewMut<T>,
        direction: DVectorView<T>,
    ) -> Result<T, BoxedError> {
        let p = direction;
        x.axpy(T::one(), &p, T::one());
        function.eval_into(&mut f, &DVectorView::from(&x))?;
        Ok(T::one())
    }
}

/// Standard backtracking line search using the Armijo condition.
///
/// See Jorge & Nocedal (2006), Numerical Optimization, Chapter 3.1.
#[derive(Clone, Debug)]
pub struct BacktrackingLineSearch<T> {
    /// Sufficient decrease parameter in (0, 1).
    pub sufficient_decrease: T,
    pub min_step_length: T,
}

impl Default for BacktrackingLineSearch<f64> {
    fn default() -> Self {
        Self {
            sufficient_decrease: 1e-4,
            min_step_length: 1e-6,
        }
    }
}

impl<T, F> LineSearch<T, F> for BacktrackingLineSearch<T>
where
    T: Real,
    F: VectorFunction<T>,
{
    #[replace_float_literals(T::from_f64(literal).unwrap())]
    fn step(
        &mut self,
        function: &mut F,
        mut f: DVectorViewMut<T>,
        mut x: DVectorViewMut<T>,
        direction: DVectorView<T>,
    ) -> Result<T, BoxedError> {
        // We seek to solve
        //  F(x) = 0
        // by minimizing
        //  g(x) = (1/2) || F(x) ||^2
        // and the sufficient decrease condition becomes
        //  g(x_k + alpha * p_k) <= g(x_k) + c * alpha * (grad g)^T * p_k
        //                       ~= (1 - c * alpha) * g(x_k)
        // where p_k is the (exact) Newton step, so that grad F^T p_k ~= - F(x_k).
        let c = self.sufficient_decrease;
        let alpha_min = self.min_step_length;

        let p = direction;
        let g_initial = 0.5 * f.magnitude_squared();

        // Start out with some alphas that don't decrease too quickly, then
        // decrease them much faster if the first few iterations don't let us take a step.
        let initial_alphas = [0.0, 1.0, 0.75, 0.5];
        let mut alpha_iter = initial_alphas
            .iter()
            .copied()
            .chain(iterate(0.25, |alpha_i| 0.25 * *alpha_i));

        let mut alpha_prev = 0.0;
        let mut alpha = 1.0;
        alpha_iter.nth(1);

        loop {
            let delta_alpha = alpha - alpha_prev;

            // x^{k + 1} = x^0 + alpha^k * p  implies  x^{k + 1} = x^k + (alpha^k - alpha^{k - 1}) * p
            x.axpy(delta_alpha, &p, T::one());
            function.eval_into(&mut f, &DVectorView::from(&x))?;

            let g = 0.5 * f.magnitude_squared();
            if g <= (1.0 - c * alpha) * g_initial {
                break;
            } else if alpha < alpha_min {
                return Err(Box::from(format!(
                    "Failed to produce valid step direction. \
                    Alpha {} is smaller than minimum allowed alpha {}.",
                    alpha, alpha_min
                )));
            } else {
                alpha_prev = alpha;
                // The alpha sequence is infinite
                alpha = alpha_iter.next().unwrap_or(0.0);
            }
        }

        Ok(alpha)
    }
}
