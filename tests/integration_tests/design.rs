use super::{
    left_edge, random_inputs, random_scalar_field, random_vector_field, relative_difference, rng, test_config,
    test_grid,
};
use nalgebra::{DVectorView, DVectorViewMut, Vector2};
use ssafem::config::SsaConfig;
use ssafem::field::Field;
use ssafem::forward::SsaForwardProblem;
use ssafem::grid::Periodicity;
use ssafem::inputs::SsaInputs;
use ssafem::parameterization::DesignParameterization;
use ssafem_optimize::calculus::approximate_directional_derivative_fd;

fn config_with(parameterization: DesignParameterization) -> SsaConfig {
    SsaConfig {
        design_parameterization: parameterization,
        ..test_config()
    }
}

#[test]
fn design_jacobian_matches_finite_differences() {
    let parameterizations = [
        DesignParameterization::Identity { scale: 1.0 },
        DesignParameterization::Exp { scale: 2.0 },
        DesignParameterization::TruncatedIdentity { scale: 1.0, d0: 0.2 },
    ];
    for (seed, parameterization) in parameterizations.into_iter().enumerate() {
        let grid = test_grid(Periodicity::X);
        let mut rng = rng(100 + seed as u64);
        let inputs = random_inputs(&grid, &mut rng)
            .with_dirichlet(&left_edge(&grid), None)
            .unwrap();
        let mut problem = SsaForwardProblem::new(inputs, config_with(parameterization)).unwrap();

        let zeta = random_scalar_field(&grid, &mut rng, 0.5..1.5);
        let dzeta = random_scalar_field(&grid, &mut rng, -1.0..1.0);
        let u = random_vector_field(&grid, &mut rng, -1.0..1.0);

        let n = 2 * grid.num_nodes();
        let du_fd = {
            let residual = |x: DVectorView<f64>, mut f: DVectorViewMut<f64>| {
                let zeta = Field::from_dvector(&grid, 0, &x.clone_owned()).unwrap();
                problem.set_design(&zeta).unwrap();
                let mut r = Field::new(&grid, 0);
                problem.assemble_residual(&u, &mut r).unwrap();
                f.copy_from(&r.to_dvector());
            };
            let zeta = zeta.to_dvector();
            let dzeta = dzeta.to_dvector();
            approximate_directional_derivative_fd(n, residual, (&zeta).into(), (&dzeta).into(), 1e-6)
        };

        problem.set_design(&zeta).unwrap();
        let mut du = Field::new(&grid, 1);
        problem.apply_jacobian_design(&u, &dzeta, &mut du).unwrap();
        let du = du.to_dvector();

        assert!((&du - &du_fd).norm() <= 1e-6 * (du.norm() + du_fd.norm()));
    }
}

fn problem_with_constraints(seed: u64) -> (SsaForwardProblem, Field<bool>) {
    let grid = test_grid(Periodicity::None);
    let mut rng = rng(seed);
    let fixed = Field::from_fn(&grid, 0, |i, j| i + 1 == grid.mx() || j == 0);
    let values = random_vector_field(&grid, &mut rng, -1.0..1.0);
    let inputs = random_inputs(&grid, &mut rng)
        .with_dirichlet(&left_edge(&grid), Some(&values))
        .unwrap()
        .with_fixed_design_locations(&fixed)
        .unwrap();
    let config = config_with(DesignParameterization::Exp { scale: 1.0 });
    let mut problem = SsaForwardProblem::new(inputs, config).unwrap();
    problem
        .set_design(&random_scalar_field(&grid, &mut rng, -0.5..0.5))
        .unwrap();
    (problem, fixed)
}

#[test]
fn design_jacobian_transpose_is_adjoint() {
    let (problem, _) = problem_with_constraints(200);
    let grid = problem.grid().clone();
    let mut rng = rng(201);

    for _ in 0..3 {
        let u = random_vector_field(&grid, &mut rng, -1.0..1.0);
        let dzeta = random_scalar_field(&grid, &mut rng, -1.0..1.0);
        let du = random_vector_field(&grid, &mut rng, -1.0..1.0);

        let mut jd_dzeta = Field::new(&grid, 1);
        problem.apply_jacobian_design(&u, &dzeta, &mut jd_dzeta).unwrap();
        let mut jdt_du = Field::new(&grid, 1);
        problem.apply_jacobian_design_transpose(&u, &du, &mut jdt_du).unwrap();

        let lhs = du.dot(&jd_dzeta).unwrap();
        let rhs = jdt_du.dot(&dzeta).unwrap();
        assert!(relative_difference(lhs, rhs) < 1e-12);
    }
}

#[test]
fn fixed_design_locations_do_not_contribute() {
    let (problem, fixed) = problem_with_constraints(300);
    let grid = problem.grid().clone();
    let mut rng = rng(301);
    let u = random_vector_field(&grid, &mut rng, -1.0..1.0);

    // A perturbation supported on the fixed locations has no effect
    let dzeta = Field::from_fn(&grid, 0, |i, j| if fixed.get(i, j) { 1.0 } else { 0.0 });
    let mut du = Field::new(&grid, 1);
    problem.apply_jacobian_design(&u, &dzeta, &mut du).unwrap();
    assert!(du.values().all(|v| v == Vector2::zeros()));

    // and the transpose vanishes there
    let du = random_vector_field(&grid, &mut rng, -1.0..1.0);
    let mut dzeta = Field::new(&grid, 1);
    problem.apply_jacobian_design_transpose(&u, &du, &mut dzeta).unwrap();
    for (i, j) in grid.nodes() {
        if fixed.get(i, j) {
            assert_eq!(dzeta.get(i, j), 0.0);
        }
    }
    assert!(dzeta.norm() > 0.0);
}

#[test]
fn design_jacobian_vanishes_at_constrained_velocity_nodes() {
    let (problem, _) = problem_with_constraints(400);
    let grid = problem.grid().clone();
    let mut rng = rng(401);
    let u = random_vector_field(&grid, &mut rng, -1.0..1.0);
    let dzeta = random_scalar_field(&grid, &mut rng, -1.0..1.0);

    let mut du = Field::new(&grid, 1);
    problem.apply_jacobian_design(&u, &dzeta, &mut du).unwrap();
    for j in 0..grid.my() {
        assert_eq!(du.get(0, j), Vector2::zeros());
        assert_ne!(du.get(1, j), Vector2::zeros());
    }
}

#[test]
fn ghostless_perturbations_are_accepted() {
    let (problem, _) = problem_with_constraints(500);
    let grid = problem.grid().clone();
    let mut rng = rng(501);
    let u = random_vector_field(&grid, &mut rng, -1.0..1.0);
    let dzeta = random_scalar_field(&grid, &mut rng, -1.0..1.0);
    let du = random_vector_field(&grid, &mut rng, -1.0..1.0);
    let (dzeta_copy, du_copy) = (dzeta.clone(), du.clone());

    let mut out_ghostless = Field::new(&grid, 0);
    let mut out_ghosted = Field::new(&grid, 1);
    problem.apply_jacobian_design(&u, &dzeta, &mut out_ghostless).unwrap();
    problem
        .apply_jacobian_design(&u.with_stencil_width(1), &dzeta.with_stencil_width(1), &mut out_ghosted)
        .unwrap();
    assert_eq!(out_ghostless.to_dvector(), out_ghosted.to_dvector());

    let mut out_ghostless = Field::new(&grid, 0);
    let mut out_ghosted = Field::new(&grid, 1);
    problem
        .apply_jacobian_design_transpose(&u, &du, &mut out_ghostless)
        .unwrap();
    problem
        .apply_jacobian_design_transpose(&u, &du.with_stencil_width(1), &mut out_ghosted)
        .unwrap();
    assert_eq!(out_ghostless.to_dvector(), out_ghosted.to_dvector());

    // The caller's fields are left alone
    assert_eq!(dzeta, dzeta_copy);
    assert_eq!(du, du_copy);
}

#[test]
fn design_jacobian_vanishes_below_thickness_floor() {
    let grid = test_grid(Periodicity::None);
    let mut rng = rng(600);
    let thickness = Field::from_fn(&grid, 0, |i, _| if i < 3 { 0.1 } else { 1.5 });
    let basal_drag = random_scalar_field(&grid, &mut rng, 0.5..1.5);
    let driving_stress = random_vector_field(&grid, &mut rng, -1.0..1.0);
    let inputs = SsaInputs::new(&thickness, &basal_drag, &driving_stress).unwrap();
    let mut problem = SsaForwardProblem::new(inputs, test_config()).unwrap();
    problem.set_design(&Field::from_element(&grid, 0, 1.0)).unwrap();
    let u = random_vector_field(&grid, &mut rng, -1.0..1.0);

    // Only the elements left of x = 2 dx lie entirely in thin ice
    let dzeta = Field::from_fn(&grid, 0, |i, _| if i < 2 { 1.0 } else { 0.0 });
    let mut du = Field::new(&grid, 1);
    problem.apply_jacobian_design(&u, &dzeta, &mut du).unwrap();
    assert!(du.values().all(|v| v == Vector2::zeros()));

    let dzeta = Field::from_element(&grid, 0, 1.0);
    problem.apply_jacobian_design(&u, &dzeta, &mut du).unwrap();
    assert!(du.norm() > 0.0);
}
