use super::{
    boundary, left_edge, random_inputs, random_scalar_field, random_vector_field, relative_difference, rng,
    test_config, test_grid,
};
use nalgebra::Vector2;
use ssafem::config::SsaConfig;
use ssafem::field::Field;
use ssafem::forward::SsaForwardProblem;
use ssafem::grid::{Grid, Periodicity};
use ssafem::inputs::SsaInputs;
use ssafem::parameterization::DesignParameterization;
use ssafem::Error;
use ssafem_optimize::newton::NewtonError;

fn config() -> SsaConfig {
    SsaConfig {
        design_parameterization: DesignParameterization::Exp { scale: 1.0 },
        ..test_config()
    }
}

/// A problem with prescribed velocity on the left edge and fixed design on the right edge.
fn constrained_problem(grid: &Grid, seed: u64) -> SsaForwardProblem {
    constrained_problem_with_config(grid, seed, config())
}

fn constrained_problem_with_config(grid: &Grid, seed: u64, config: SsaConfig) -> SsaForwardProblem {
    let mut rng = rng(seed);
    let values = random_vector_field(grid, &mut rng, -0.5..0.5);
    let fixed = Field::from_fn(grid, 0, |i, _| i + 1 == grid.mx());
    let inputs = random_inputs(grid, &mut rng)
        .with_dirichlet(&left_edge(grid), Some(&values))
        .unwrap()
        .with_fixed_design_locations(&fixed)
        .unwrap();
    SsaForwardProblem::new(inputs, config).unwrap()
}

#[test]
fn operators_require_design_and_linearization() {
    let grid = test_grid(Periodicity::None);
    let mut problem = constrained_problem(&grid, 1);
    assert!(problem.design().is_none());
    assert_eq!(problem.design_generation(), 0);

    let u = Field::new(&grid, 1);
    let mut residual = Field::new(&grid, 1);
    let dzeta = Field::<f64>::new(&grid, 1);
    let mut du = Field::new(&grid, 1);
    let mut dzeta_out = Field::new(&grid, 1);
    assert!(matches!(problem.assemble_residual(&u, &mut residual), Err(Error::DesignNotSet)));
    assert!(matches!(
        problem.apply_jacobian_design(&u, &dzeta, &mut du),
        Err(Error::DesignNotSet)
    ));
    assert!(matches!(
        problem.apply_linearization(&dzeta, &mut du),
        Err(Error::NotLinearized)
    ));

    problem.set_design(&Field::from_element(&grid, 0, 0.2)).unwrap();
    assert!(!problem.is_linearized());
    assert!(problem.assemble_residual(&u, &mut residual).is_ok());
    assert!(matches!(
        problem.apply_linearization_transpose(&du, &mut dzeta_out),
        Err(Error::NotLinearized)
    ));
}

#[test]
fn design_on_other_grid_is_rejected() {
    let grid = test_grid(Periodicity::None);
    let other = Grid::new(3, 3, 1.0, 1.0, Periodicity::None).unwrap();
    let mut problem = constrained_problem(&grid, 2);
    let result = problem.set_design(&Field::from_element(&other, 0, 0.0));
    assert!(matches!(result, Err(Error::GridMismatch)));
    assert!(problem.design().is_none());
}

#[test]
fn linearize_at_solves_the_state_equation() {
    let grid = test_grid(Periodicity::None);
    let mut problem = constrained_problem(&grid, 3);
    let zeta = random_scalar_field(&grid, &mut rng(4), -0.5..0.5);

    let output = problem.linearize_at(&zeta).unwrap();
    assert!(problem.is_linearized());
    assert!(output.iterations > 0);
    assert!(output.residual_norm <= output.initial_residual_norm);

    let mut residual = Field::new(&grid, 1);
    problem.assemble_residual(problem.velocity(), &mut residual).unwrap();
    assert!(residual.norm() <= 1e-10 * output.initial_residual_norm + 1e-12);

    // The prescribed values are part of the solution
    let values = problem.assembler().inputs().dirichlet_values().unwrap();
    for j in 0..grid.my() {
        assert_eq!(problem.velocity().get(0, j), values.get(0, j));
    }

    // Solving again at the same design starts from the solution
    let generation = problem.design_generation();
    let output = problem.linearize_at(&zeta).unwrap();
    assert!(output.iterations <= 1);
    assert_eq!(problem.design_generation(), generation);
}

#[test]
fn nonlinear_solve_failure_is_reported() {
    let grid = test_grid(Periodicity::None);
    let mut config = config();
    config.nonlinear_solver.max_iterations = 0;
    let inputs = random_inputs(&grid, &mut rng(5));
    let mut problem = SsaForwardProblem::new(inputs, config).unwrap();

    let result = problem.linearize_at(&Field::from_element(&grid, 0, 0.0));
    assert!(matches!(
        result,
        Err(Error::NonlinearSolveFailed(NewtonError::MaximumIterationsReached(0)))
    ));
    assert!(!problem.is_linearized());
    assert!(problem.design().is_some());
    assert!(problem.velocity().values().all(|v| v == Vector2::zeros()));
}

#[test]
fn non_finite_residual_is_reported() {
    let grid = test_grid(Periodicity::None);
    let inputs = random_inputs(&grid, &mut rng(5));
    let mut problem = SsaForwardProblem::new(inputs, config()).unwrap();

    // exp(1000) overflows, so the viscosity and with it the residual are not finite
    let result = problem.linearize_at(&Field::from_element(&grid, 0, 1000.0));
    assert!(matches!(
        result,
        Err(Error::NonlinearSolveFailed(NewtonError::NonFiniteResidual(0)))
    ));
    assert!(!problem.is_linearized());
    assert!(problem.velocity().values().all(|v| v == Vector2::zeros()));
}

#[test]
fn unregularized_flow_law_is_rejected() {
    let grid = test_grid(Periodicity::None);
    let inputs = random_inputs(&grid, &mut rng(5));
    let mut config = config();
    config.flow_law.regularization = 0.0;
    let result = SsaForwardProblem::new(inputs, config);
    assert!(matches!(result, Err(Error::InvalidParameter(_))));
}

#[test]
fn linearization_matches_finite_differences() {
    let grid = test_grid(Periodicity::X);
    // Forward solves well below the finite difference error
    let mut config = config();
    config.nonlinear_solver.rtol = 1e-13;
    config.nonlinear_solver.atol = 1e-13;
    let mut problem = constrained_problem_with_config(&grid, 6, config);
    let mut rng = rng(7);
    let zeta = random_scalar_field(&grid, &mut rng, -0.5..0.5);
    let dzeta = random_scalar_field(&grid, &mut rng, -1.0..1.0);

    let h = 1e-4;
    let perturbed = |sign: f64| {
        Field::from_fn(&grid, 0, |i, j| zeta.get(i, j) + sign * h * dzeta.get(i, j))
    };
    problem.linearize_at(&perturbed(1.0)).unwrap();
    let u_plus = problem.velocity().to_dvector();
    problem.linearize_at(&perturbed(-1.0)).unwrap();
    let u_minus = problem.velocity().to_dvector();
    let du_fd = (u_plus - u_minus) / (2.0 * h);

    problem.linearize_at(&zeta).unwrap();
    let mut du = Field::new(&grid, 1);
    problem.apply_linearization(&dzeta, &mut du).unwrap();
    let du = du.to_dvector();

    assert!((&du - &du_fd).norm() <= 1e-5 * (du.norm() + du_fd.norm()));
}

#[test]
fn linearization_and_transpose_are_dual() {
    for periodicity in [Periodicity::None, Periodicity::XY] {
        let grid = test_grid(periodicity);
        let mut problem = constrained_problem(&grid, 8);
        let mut rng = rng(9);
        problem
            .linearize_at(&random_scalar_field(&grid, &mut rng, -0.5..0.5))
            .unwrap();

        for _ in 0..3 {
            let dzeta = random_scalar_field(&grid, &mut rng, -1.0..1.0);
            let du1 = random_vector_field(&grid, &mut rng, -1.0..1.0);

            let mut du = Field::new(&grid, 1);
            problem.apply_linearization(&dzeta, &mut du).unwrap();
            let mut dzeta1 = Field::new(&grid, 1);
            problem.apply_linearization_transpose(&du1, &mut dzeta1).unwrap();

            let lhs = du1.dot(&du).unwrap();
            let rhs = dzeta1.dot(&dzeta).unwrap();
            assert!(relative_difference(lhs, rhs) < 1e-7);
        }
    }
}

#[test]
fn linearization_respects_constraints() {
    let grid = test_grid(Periodicity::None);
    let mut problem = constrained_problem(&grid, 10);
    let mut rng = rng(11);
    problem
        .linearize_at(&random_scalar_field(&grid, &mut rng, -0.5..0.5))
        .unwrap();

    let dzeta = random_scalar_field(&grid, &mut rng, -1.0..1.0);
    let mut du = Field::new(&grid, 1);
    problem.apply_linearization(&dzeta, &mut du).unwrap();
    for j in 0..grid.my() {
        assert_eq!(du.get(0, j), Vector2::zeros());
    }

    let du1 = random_vector_field(&grid, &mut rng, -1.0..1.0);
    let mut dzeta1 = Field::new(&grid, 1);
    problem.apply_linearization_transpose(&du1, &mut dzeta1).unwrap();
    for j in 0..grid.my() {
        assert_eq!(dzeta1.get(grid.mx() - 1, j), 0.0);
    }

    // Velocity perturbations at constrained nodes are ignored
    let mut du2 = du1.clone();
    {
        let mut guard = du2.write();
        for j in 0..grid.my() {
            guard.set(0, j, Vector2::new(1e3, -1e3));
        }
    }
    let mut dzeta2 = Field::new(&grid, 1);
    problem.apply_linearization_transpose(&du2, &mut dzeta2).unwrap();
    assert_eq!(dzeta1, dzeta2);
}

#[test]
fn setting_the_same_design_twice_is_idempotent() {
    let grid = test_grid(Periodicity::None);
    let mut problem = constrained_problem(&grid, 12);
    let mut rng = rng(13);
    let zeta = random_scalar_field(&grid, &mut rng, -0.5..0.5);
    let u = random_vector_field(&grid, &mut rng, -1.0..1.0);

    problem.set_design(&zeta).unwrap();
    let coefficients = problem.assembler().coefficients().clone();
    let generation = problem.design_generation();
    let mut first = problem.assembler().new_state_jacobian().unwrap();
    problem.assemble_jacobian_state(&u, &mut first).unwrap();

    problem.set_design(&zeta.with_stencil_width(1)).unwrap();
    assert_eq!(problem.assembler().coefficients(), &coefficients);
    assert_eq!(problem.design_generation(), generation);
    let mut second = problem.assembler().new_state_jacobian().unwrap();
    problem.assemble_jacobian_state(&u, &mut second).unwrap();
    assert_eq!(first.values(), second.values());

    // A linearization survives setting the same design
    problem.linearize_at(&zeta).unwrap();
    problem.set_design(&zeta).unwrap();
    assert!(problem.is_linearized());

    // but not a new one
    let other = Field::from_fn(&grid, 0, |i, j| zeta.get(i, j) + 0.1);
    problem.set_design(&other).unwrap();
    assert!(!problem.is_linearized());
    assert_eq!(problem.design_generation(), generation + 1);
}

#[test]
fn zero_forcing_gives_trivial_equilibrium() {
    let grid = test_grid(Periodicity::None);
    let mut rng = rng(14);
    let thickness = random_scalar_field(&grid, &mut rng, 1.0..2.0);
    let basal_drag = random_scalar_field(&grid, &mut rng, 0.5..1.5);
    let no_forcing = Field::from_element(&grid, 0, Vector2::zeros());
    let inputs = SsaInputs::new(&thickness, &basal_drag, &no_forcing)
        .unwrap()
        .with_dirichlet(&boundary(&grid), None)
        .unwrap();
    let mut problem = SsaForwardProblem::new(inputs, config()).unwrap();

    let output = problem
        .linearize_at(&Field::from_element(&grid, 0, 0.3))
        .unwrap();
    assert_eq!(output.iterations, 0);
    assert!(problem.velocity().values().all(|v| v == Vector2::zeros()));

    let dzeta = random_scalar_field(&grid, &mut rng, -1.0..1.0);
    let mut du = Field::from_element(&grid, 1, Vector2::new(1.0, 1.0));
    problem.apply_linearization(&dzeta, &mut du).unwrap();
    assert!(du.values().all(|v| v == Vector2::zeros()));
}
