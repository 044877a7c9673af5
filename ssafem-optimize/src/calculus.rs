use crate::{BoxedError, Real};
use nalgebra::{DMatrix, DMatrixViewMut, DVector, DVectorView, DVectorViewMut, Scalar};
use numeric_literals::replace_float_literals;

/// A function $F: \mathbb{R}^n \rightarrow \mathbb{R}^n$.
///
/// Evaluation may fail, for example when the function is defined through a discretization
/// that rejects its input. Failures are propagated by the solvers, never swallowed.
pub trait VectorFunction<T>
where
    T: Scalar,
{
    fn dimension(&self) -> usize;
    fn eval_into(&mut self, f: &mut DVectorViewMut<T>, x: &DVectorView<T>) -> Result<(), BoxedError>;
}

impl<T, X> VectorFunction<T> for &mut X
where
    T: Scalar,
    X: VectorFunction<T>,
{
    fn dimension(&self) -> usize {
        X::dimension(self)
    }

    fn eval_into(&mut self, f: &mut DVectorViewMut<T>, x: &DVectorView<T>) -> Result<(), BoxedError> {
        X::eval_into(self, f, x)
    }
}

pub trait DifferentiableVectorFunction<T>: VectorFunction<T>
where
    T: Scalar,
{
    /// Solve `J(x) sol = rhs`, where `J(x)` is the Jacobian of the function at `x`.
    fn solve_jacobian_system(
        &mut self,
        sol: &mut DVectorViewMut<T>,
        x: &DVectorView<T>,
        rhs: &DVectorView<T>,
    ) -> Result<(), BoxedError>;
}

impl<T, X> DifferentiableVectorFunction<T> for &mut X
where
    T: Scalar,
    X: DifferentiableVectorFunction<T>,
{
    fn solve_jacobian_system(
        &mut self,
        sol: &mut DVectorViewMut<T>,
        x: &DVectorView<T>,
        rhs: &DVectorView<T>,
    ) -> Result<(), BoxedError> {
        X::solve_jacobian_system(self, sol, x, rhs)
    }
}

/// Approximates the Jacobian of the function $f: \mathbb{R}^n \rightarrow \mathbb{R}^m$
/// with central finite differences.
///
/// The Jacobian matrix is the $m \times n$ matrix whose entries are given by
/// $$ J_{ij} := \pd{f_i}{x_j}.$$
///
/// The parameter `h` determines the step size of the finite difference approximation.
/// The vector `x` is used as scratch space, but upon returning its content is unchanged.
pub fn approximate_jacobian_fd<'a, T>(
    m: usize,
    f: impl FnMut(DVectorView<T>, DVectorViewMut<T>),
    x: impl Into<DVectorViewMut<'a, T>>,
    h: T,
) -> DMatrix<T>
where
    T: Real,
{
    let x = x.into();
    let n = x.len();
    let mut jacobian = DMatrix::zeros(m, n);
    approximate_jacobian_fd_into_(DMatrixViewMut::from(&mut jacobian), f, x, h);
    jacobian
}

#[replace_float_literals(T::from_f64(literal).unwrap())]
fn approximate_jacobian_fd_into_<T>(
    mut j: DMatrixViewMut<T>,
    mut f: impl FnMut(DVectorView<T>, DVectorViewMut<T>),
    mut x: DVectorViewMut<T>,
    h: T,
) where
    T: Real,
{
    let m = j.nrows();
    let n = x.len();
    assert_eq!(n, j.ncols());

    let mut f_plus = DVector::zeros(m);
    let mut f_minus = DVector::zeros(m);

    for i in 0..n {
        // df_dxi ~ (f(x + h e_i) - f(x - h e_i)) / (2 h)
        let xi = x[i];
        x[i] = xi + h;
        f(DVectorView::from(&x), DVectorViewMut::from(&mut f_plus));
        x[i] = xi - h;
        f(DVectorView::from(&x), DVectorViewMut::from(&mut f_minus));
        x[i] = xi;

        let mut df_dxi = j.column_mut(i);
        df_dxi.copy_from(&f_plus);
        df_dxi -= &f_minus;
        df_dxi /= 2.0 * h;
    }
}

/// Approximates the directional derivative $\lim_{h \to 0} (f(x + h d) - f(x - h d)) / 2h$
/// of a function $f: \mathbb{R}^n \rightarrow \mathbb{R}^m$ with central differences.
#[replace_float_literals(T::from_f64(literal).unwrap())]
pub fn approximate_directional_derivative_fd<T>(
    m: usize,
    mut f: impl FnMut(DVectorView<T>, DVectorViewMut<T>),
    x: DVectorView<T>,
    direction: DVectorView<T>,
    h: T,
) -> DVector<T>
where
    T: Real,
{
    assert_eq!(x.len(), direction.len());
    let mut f_plus = DVector::zeros(m);
    let mut f_minus = DVector::zeros(m);

    let x_plus = &x + &direction * h;
    let x_minus = &x - &direction * h;
    f(DVectorView::from(&x_plus), DVectorViewMut::from(&mut f_plus));
    f(DVectorView::from(&x_minus), DVectorViewMut::from(&mut f_minus));

    (f_plus - f_minus) / (2.0 * h)
}
