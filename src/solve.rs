//! Reusable preconditioned linear solves with the state Jacobian.
use crate::config::LinearSolverSettings;
use crate::error::Error;
use log::{debug, trace};
use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;
use ssafem_sparse::cg::{CgOutput, CgWorkspace, ConjugateGradient, ResidualCriterion};
use ssafem_sparse::jacobi::JacobiPreconditioner;

/// A state Jacobian with its preconditioner, rebuilt only when its key changes.
///
/// The key identifies the linearization point the operator was assembled at. Solves with the
/// same key reuse the matrix, the preconditioner and the solver workspace. The transpose used
/// for adjoint solves is formed on first use and dropped on every rebuild.
#[derive(Debug)]
pub struct LinearSolveCache {
    settings: LinearSolverSettings,
    matrix: CsrMatrix<f64>,
    preconditioner: JacobiPreconditioner<f64>,
    transpose: Option<CsrMatrix<f64>>,
    key: Option<u64>,
    workspace: CgWorkspace<f64>,
}

impl LinearSolveCache {
    /// `matrix` provides the sparsity pattern; its values are overwritten on the first update.
    pub fn new(matrix: CsrMatrix<f64>, settings: LinearSolverSettings) -> Self {
        let preconditioner = JacobiPreconditioner::from_csr(&matrix);
        Self {
            settings,
            matrix,
            preconditioner,
            transpose: None,
            key: None,
            workspace: CgWorkspace::default(),
        }
    }

    pub fn settings(&self) -> &LinearSolverSettings {
        &self.settings
    }

    pub fn key(&self) -> Option<u64> {
        self.key
    }

    pub fn matrix(&self) -> &CsrMatrix<f64> {
        &self.matrix
    }

    pub fn invalidate(&mut self) {
        self.key = None;
    }

    /// Reassembles the operator with `assemble` unless it was last built for `key`.
    ///
    /// Returns whether the operator was rebuilt. If `assemble` fails the cache is left invalid.
    pub fn update_operator<F>(&mut self, key: u64, assemble: F) -> Result<bool, Error>
    where
        F: FnOnce(&mut CsrMatrix<f64>) -> Result<(), Error>,
    {
        if self.key == Some(key) {
            trace!("Reusing state Jacobian for key {}", key);
            return Ok(false);
        }
        self.rebuild_operator(assemble)?;
        self.key = Some(key);
        Ok(true)
    }

    /// Reassembles the operator unconditionally and leaves it without a key.
    pub fn rebuild_operator<F>(&mut self, assemble: F) -> Result<(), Error>
    where
        F: FnOnce(&mut CsrMatrix<f64>) -> Result<(), Error>,
    {
        self.key = None;
        self.transpose = None;
        assemble(&mut self.matrix)?;
        self.preconditioner = JacobiPreconditioner::from_csr(&self.matrix);
        trace!("Rebuilt state Jacobian with {} non-zeros", self.matrix.nnz());
        Ok(())
    }

    /// Solves `J x = rhs`, using `x` as the initial guess.
    pub fn solve(&mut self, rhs: &DVector<f64>, x: &mut DVector<f64>) -> Result<CgOutput<f64>, Error> {
        let Self {
            settings,
            matrix,
            preconditioner,
            workspace,
            ..
        } = self;
        solve_with(matrix, preconditioner, workspace, settings, rhs, x)
    }

    /// Solves `J^T x = rhs`, using `x` as the initial guess.
    pub fn solve_transpose(&mut self, rhs: &DVector<f64>, x: &mut DVector<f64>) -> Result<CgOutput<f64>, Error> {
        let Self {
            settings,
            matrix,
            preconditioner,
            transpose,
            workspace,
            ..
        } = self;
        // J and J^T share their diagonal, and with it the preconditioner
        let transpose = transpose.get_or_insert_with(|| matrix.transpose());
        solve_with(transpose, preconditioner, workspace, settings, rhs, x)
    }
}

fn solve_with(
    matrix: &CsrMatrix<f64>,
    preconditioner: &JacobiPreconditioner<f64>,
    workspace: &mut CgWorkspace<f64>,
    settings: &LinearSolverSettings,
    rhs: &DVector<f64>,
    x: &mut DVector<f64>,
) -> Result<CgOutput<f64>, Error> {
    if rhs.len() != matrix.nrows() {
        return Err(Error::SizeMismatch {
            expected: matrix.nrows(),
            actual: rhs.len(),
        });
    }
    if x.len() != matrix.ncols() {
        return Err(Error::SizeMismatch {
            expected: matrix.ncols(),
            actual: x.len(),
        });
    }

    let output = ConjugateGradient::with_workspace(workspace)
        .with_operator(matrix)
        .with_preconditioner(preconditioner)
        .with_stopping_criterion(ResidualCriterion::new(settings.rtol, settings.atol, settings.dtol))
        .with_max_iter(settings.max_iterations)
        .solve_with_guess(rhs, x)
        .map_err(|err| Error::LinearSolverError(Box::new(err)))?;

    if output.reason.is_diverged() {
        return Err(Error::LinearSolveFailed {
            reason: output.reason,
            iterations: output.num_iterations,
        });
    }
    debug!(
        "Linear solve converged in {} iterations (reason {})",
        output.num_iterations, output.reason
    );
    Ok(output)
}
