use matrixcompare::assert_matrix_eq;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use ssafem::config::LinearSolverSettings;
use ssafem::solve::LinearSolveCache;
use ssafem::sparse::ConvergenceReason;
use ssafem::Error;

/// A tridiagonal SPD matrix with all entries of the pattern zero.
fn tridiagonal_pattern(n: usize) -> CsrMatrix<f64> {
    let mut coo = CooMatrix::new(n, n);
    for i in 0..n {
        coo.push(i, i, 0.0);
        if i > 0 {
            coo.push(i, i - 1, 0.0);
            coo.push(i - 1, i, 0.0);
        }
    }
    CsrMatrix::from(&coo)
}

/// Fills the pattern with `diagonal` on the diagonal and -1 off the diagonal.
fn fill(matrix: &mut CsrMatrix<f64>, diagonal: f64) {
    let n = matrix.nrows();
    for i in 0..n {
        let mut row = matrix.row_mut(i);
        let (cols, values) = row.cols_and_values_mut();
        for (&col, value) in cols.iter().zip(values) {
            *value = if col == i { diagonal } else { -1.0 };
        }
    }
}

#[test]
fn operator_is_only_rebuilt_for_new_keys() {
    let mut cache = LinearSolveCache::new(tridiagonal_pattern(5), LinearSolverSettings::default());
    assert_eq!(cache.key(), None);

    let mut assembly_count = 0;
    let mut assemble = |matrix: &mut CsrMatrix<f64>| -> Result<(), Error> {
        assembly_count += 1;
        fill(matrix, 4.0);
        Ok(())
    };
    assert!(cache.update_operator(1, &mut assemble).unwrap());
    assert!(!cache.update_operator(1, &mut assemble).unwrap());
    assert!(cache.update_operator(2, &mut assemble).unwrap());
    cache.invalidate();
    assert!(cache.update_operator(2, &mut assemble).unwrap());
    assert_eq!(assembly_count, 3);
    assert_eq!(cache.key(), Some(2));
}

#[test]
fn failed_assembly_leaves_cache_invalid() {
    let mut cache = LinearSolveCache::new(tridiagonal_pattern(3), LinearSolverSettings::default());
    cache.update_operator(1, |m| Ok(fill(m, 4.0))).unwrap();
    let result = cache.update_operator(2, |_| Err(Error::DesignNotSet));
    assert!(matches!(result, Err(Error::DesignNotSet)));
    assert_eq!(cache.key(), None);
}

#[test]
fn solves_with_matrix_and_transpose() {
    let n = 6;
    let mut cache = LinearSolveCache::new(tridiagonal_pattern(n), LinearSolverSettings::default());
    cache.update_operator(7, |m| Ok(fill(m, 3.0))).unwrap();

    let dense = DMatrix::from(cache.matrix());
    let expected = DVector::from_fn(n, |i, _| (i as f64) - 2.0);
    let rhs = &dense * &expected;

    let mut x = DVector::zeros(n);
    let output = cache.solve(&rhs, &mut x).unwrap();
    assert!(output.reason.is_converged());
    assert_matrix_eq!(x, expected, comp = abs, tol = 1e-10);

    let mut y = DVector::zeros(n);
    cache.solve_transpose(&rhs, &mut y).unwrap();
    assert_matrix_eq!(y, expected, comp = abs, tol = 1e-10);
}

#[test]
fn zero_rhs_converges_immediately() {
    let mut cache = LinearSolveCache::new(tridiagonal_pattern(4), LinearSolverSettings::default());
    cache.rebuild_operator(|m| Ok(fill(m, 3.0))).unwrap();
    let mut x = DVector::from_element(4, 1.0);
    let output = cache.solve(&DVector::zeros(4), &mut x).unwrap();
    assert_eq!(output.reason, ConvergenceReason::ConvergedZeroRhs);
    assert_eq!(x, DVector::zeros(4));
}

#[test]
fn iteration_cap_is_reported_as_failure() {
    let settings = LinearSolverSettings {
        max_iterations: 1,
        ..LinearSolverSettings::default()
    };
    let n = 20;
    let mut cache = LinearSolveCache::new(tridiagonal_pattern(n), settings);
    cache.rebuild_operator(|m| Ok(fill(m, 2.0))).unwrap();

    let rhs = DVector::from_fn(n, |i, _| (i % 3) as f64);
    let mut x = DVector::zeros(n);
    let result = cache.solve(&rhs, &mut x);
    assert!(matches!(
        result,
        Err(Error::LinearSolveFailed {
            reason: ConvergenceReason::DivergedIterations,
            ..
        })
    ));
}

#[test]
fn mismatched_sizes_are_rejected() {
    let mut cache = LinearSolveCache::new(tridiagonal_pattern(4), LinearSolverSettings::default());
    let mut x = DVector::zeros(4);
    let result = cache.solve(&DVector::zeros(3), &mut x);
    assert!(matches!(result, Err(Error::SizeMismatch { expected: 4, actual: 3 })));
}
