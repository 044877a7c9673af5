use crate::cg::{BoxedError, LinearOperator};
use nalgebra::{DVector, DVectorView, DVectorViewMut, RealField};
use nalgebra_sparse::CsrMatrix;

/// Point-Jacobi preconditioner `P = diag(A)^{-1}`.
///
/// Rows with a zero (or missing) diagonal entry are left unscaled.
#[derive(Debug, Clone)]
pub struct JacobiPreconditioner<T: RealField> {
    inverse_diagonal: DVector<T>,
}

impl<T: RealField + Copy> JacobiPreconditioner<T> {
    pub fn from_csr(matrix: &CsrMatrix<T>) -> Self {
        assert_eq!(matrix.nrows(), matrix.ncols(), "Matrix must be square");
        let inverse_diagonal = DVector::from_iterator(
            matrix.nrows(),
            matrix.row_iter().enumerate().map(|(i, row)| {
                let d = row
                    .col_indices()
                    .binary_search(&i)
                    .map(|idx| row.values()[idx])
                    .unwrap_or(T::zero());
                if d == T::zero() {
                    T::one()
                } else {
                    T::one() / d
                }
            }),
        );
        Self { inverse_diagonal }
    }

    pub fn inverse_diagonal(&self) -> &DVector<T> {
        &self.inverse_diagonal
    }
}

impl<T: RealField + Copy> LinearOperator<T> for JacobiPreconditioner<T> {
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), BoxedError> {
        if x.len() != self.inverse_diagonal.len() {
            return Err(Box::from(format!(
                "Jacobi preconditioner has dimension {}, but input has dimension {}",
                self.inverse_diagonal.len(),
                x.len()
            )));
        }
        y.copy_from(&x);
        y.component_mul_assign(&self.inverse_diagonal);
        Ok(())
    }
}
