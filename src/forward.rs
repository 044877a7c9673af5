//! Forward and adjoint sensitivities of the SSA velocity with respect to the design variable.
//!
//! The velocity `u` solves `R(u, zeta) = 0`. At a solution the implicit function theorem gives
//!
//! ```text
//! du/dzeta = -(dR/du)^-1 (dR/dzeta),
//! ```
//!
//! which [`SsaForwardProblem::apply_linearization`] applies to a design perturbation, and
//! whose transpose [`SsaForwardProblem::apply_linearization_transpose`] applies to a velocity
//! perturbation.
use crate::assembly::SsaAssembler;
use crate::config::SsaConfig;
use crate::design::DesignState;
use crate::error::Error;
use crate::field::{Field, ELEMENT_STENCIL_WIDTH};
use crate::grid::Grid;
use crate::inputs::SsaInputs;
use crate::solve::LinearSolveCache;
use log::{debug, info};
use nalgebra::{DVector, DVectorView, DVectorViewMut, Vector2};
use nalgebra_sparse::CsrMatrix;
use ssafem_optimize::calculus::{DifferentiableVectorFunction, VectorFunction};
use ssafem_optimize::newton::{newton_line_search, BacktrackingLineSearch, NewtonOutput, NewtonSettings};
use ssafem_optimize::BoxedError;

#[derive(Debug, Clone)]
enum ProblemState {
    Uninitialized,
    /// The design is known but the velocity has not been solved for it.
    DesignSet(DesignState),
    /// The velocity solves the state equation for the design.
    Linearized(DesignState),
}

/// The SSA forward problem as a map from design variable to velocity, with its derivatives.
///
/// The problem owns its inputs, the current velocity and the state Jacobian. Operators that
/// need a design fail with [`Error::DesignNotSet`] before [`set_design`](Self::set_design) or
/// [`linearize_at`](Self::linearize_at) has been called; the linearized operators fail with
/// [`Error::NotLinearized`] until a forward solve has succeeded for the current design.
#[derive(Debug)]
pub struct SsaForwardProblem {
    config: SsaConfig,
    assembler: SsaAssembler,
    state: ProblemState,
    generation: u64,
    /// Changes whenever the design or the velocity changes.
    revision: u64,
    velocity: Field<Vector2<f64>>,
    linear_solver: LinearSolveCache,
    newton_solver: LinearSolveCache,
}

impl SsaForwardProblem {
    pub fn new(inputs: SsaInputs, config: SsaConfig) -> Result<Self, Error> {
        let assembler = SsaAssembler::new(inputs, &config)?;
        let velocity = Field::new(assembler.grid(), ELEMENT_STENCIL_WIDTH);
        let linear_solver = LinearSolveCache::new(assembler.new_state_jacobian()?, config.linear_solver);
        let newton_solver = LinearSolveCache::new(assembler.new_state_jacobian()?, config.linear_solver);
        Ok(Self {
            config,
            assembler,
            state: ProblemState::Uninitialized,
            generation: 0,
            revision: 0,
            velocity,
            linear_solver,
            newton_solver,
        })
    }

    pub fn grid(&self) -> &Grid {
        self.assembler.grid()
    }

    pub fn config(&self) -> &SsaConfig {
        &self.config
    }

    pub fn assembler(&self) -> &SsaAssembler {
        &self.assembler
    }

    /// The current velocity. Zero until the first successful forward solve.
    pub fn velocity(&self) -> &Field<Vector2<f64>> {
        &self.velocity
    }

    pub fn design(&self) -> Option<&DesignState> {
        match &self.state {
            ProblemState::Uninitialized => None,
            ProblemState::DesignSet(design) | ProblemState::Linearized(design) => Some(design),
        }
    }

    pub fn is_linearized(&self) -> bool {
        matches!(self.state, ProblemState::Linearized(_))
    }

    /// The generation of the current design, or zero if none is set.
    pub fn design_generation(&self) -> u64 {
        self.design().map(DesignState::generation).unwrap_or(0)
    }

    /// Sets the design variable and refreshes the hardness at the quadrature points.
    ///
    /// The state equation is not solved. Setting the design that is already set leaves the
    /// problem unchanged, including a linearization.
    pub fn set_design(&mut self, zeta: &Field<f64>) -> Result<(), Error> {
        self.update_design(zeta).map(|_| ())
    }

    /// Returns whether the design changed.
    fn update_design(&mut self, zeta: &Field<f64>) -> Result<bool, Error> {
        zeta.check_grid(self.grid())?;
        if let Some(design) = self.design() {
            if design.zeta().values().eq(zeta.values()) {
                debug!("Design generation {} is unchanged", design.generation());
                return Ok(false);
            }
        }

        let design = DesignState::new(zeta, &self.config.design_parameterization, self.generation + 1);
        // The old design stays in place if the coefficients cannot be refreshed
        self.assembler.set_hardness(design.hardness())?;
        self.generation = design.generation();
        self.revision += 1;
        self.state = ProblemState::DesignSet(design);
        debug!("Set design generation {}", self.generation);
        Ok(true)
    }

    /// Sets the design and solves the state equation `R(u, zeta) = 0` for the velocity.
    ///
    /// Newton's method starts from the current velocity. On failure the velocity is left
    /// unchanged and the problem is not linearized.
    pub fn linearize_at(&mut self, zeta: &Field<f64>) -> Result<NewtonOutput<f64>, Error> {
        self.update_design(zeta)?;

        let Self {
            config,
            assembler,
            state,
            revision,
            velocity,
            newton_solver,
            ..
        } = self;

        let design = match state {
            ProblemState::Uninitialized => return Err(Error::DesignNotSet),
            ProblemState::DesignSet(design) | ProblemState::Linearized(design) => design.clone(),
        };

        let mut initial_guess = velocity.clone();
        assembler.velocity_constraints().fix_values(&mut initial_guess.write());

        let mut x = initial_guess.to_dvector();
        let mut f = DVector::zeros(x.len());
        let mut dx = DVector::zeros(x.len());
        let settings = NewtonSettings {
            max_iterations: Some(config.nonlinear_solver.max_iterations),
            absolute_tolerance: config.nonlinear_solver.atol,
            relative_tolerance: config.nonlinear_solver.rtol,
        };
        let equation = StateEquation::new(assembler, newton_solver);
        let output = newton_line_search(
            equation,
            &mut x,
            &mut f,
            &mut dx,
            settings,
            &mut BacktrackingLineSearch::default(),
        )?;

        initial_guess.copy_from_dvector(&x)?;
        assembler.velocity_constraints().fix_values(&mut initial_guess.write());
        if initial_guess != *velocity {
            *revision += 1;
            *velocity = initial_guess;
        }
        *state = ProblemState::Linearized(design);

        info!(
            "SSA forward solve converged in {} Newton iterations (residual norm {:e} -> {:e})",
            output.iterations, output.initial_residual_norm, output.residual_norm
        );
        Ok(output)
    }

    /// Computes the residual `R(u)` for the current design.
    pub fn assemble_residual(&self, u: &Field<Vector2<f64>>, residual: &mut Field<Vector2<f64>>) -> Result<(), Error> {
        self.assembler.assemble_residual(u, residual)
    }

    /// Computes the state Jacobian `dR/du` at `u` for the current design into a matrix with the
    /// pattern of [`SsaAssembler::new_state_jacobian`].
    pub fn assemble_jacobian_state(&self, u: &Field<Vector2<f64>>, matrix: &mut CsrMatrix<f64>) -> Result<(), Error> {
        self.assembler.assemble_jacobian_state(u, matrix)
    }

    /// Computes `du = (dR/dzeta) dzeta` at the state `u` for the current design.
    pub fn apply_jacobian_design(
        &self,
        u: &Field<Vector2<f64>>,
        dzeta: &Field<f64>,
        du: &mut Field<Vector2<f64>>,
    ) -> Result<(), Error> {
        let design = self.design().ok_or(Error::DesignNotSet)?;
        self.assembler.apply_jacobian_design(design, u, dzeta, du)
    }

    /// Computes `dzeta = (dR/dzeta)^T du` at the state `u` for the current design.
    pub fn apply_jacobian_design_transpose(
        &self,
        u: &Field<Vector2<f64>>,
        du: &Field<Vector2<f64>>,
        dzeta: &mut Field<f64>,
    ) -> Result<(), Error> {
        let design = self.design().ok_or(Error::DesignNotSet)?;
        self.assembler.apply_jacobian_design_transpose(design, u, du, dzeta)
    }

    /// Computes `du = -(dR/du)^-1 (dR/dzeta) dzeta` at the current linearization point.
    pub fn apply_linearization(&mut self, dzeta: &Field<f64>, du: &mut Field<Vector2<f64>>) -> Result<(), Error> {
        let Self {
            assembler,
            state,
            revision,
            velocity,
            linear_solver,
            ..
        } = self;
        let ProblemState::Linearized(design) = state else {
            return Err(Error::NotLinearized);
        };
        let (assembler, velocity) = (&*assembler, &*velocity);

        assembler.apply_jacobian_design(design, velocity, dzeta, du)?;
        let rhs = du.to_dvector();

        linear_solver.update_operator(*revision, |matrix| assembler.assemble_jacobian_state(velocity, matrix))?;
        let mut solution = DVector::zeros(rhs.len());
        linear_solver.solve(&rhs, &mut solution)?;

        solution.neg_mut();
        du.copy_from_dvector(&solution)
    }

    /// Computes `dzeta = -(dR/dzeta)^T (dR/du)^-T du` at the current linearization point.
    ///
    /// `du` is taken as zero at constrained velocity nodes.
    pub fn apply_linearization_transpose(
        &mut self,
        du: &Field<Vector2<f64>>,
        dzeta: &mut Field<f64>,
    ) -> Result<(), Error> {
        let Self {
            assembler,
            state,
            revision,
            velocity,
            linear_solver,
            ..
        } = self;
        let ProblemState::Linearized(design) = state else {
            return Err(Error::NotLinearized);
        };
        let (assembler, velocity) = (&*assembler, &*velocity);
        du.check_grid(assembler.grid())?;

        let mut rhs = du.to_dvector();
        let constraints = assembler.velocity_constraints();
        for node in 0..assembler.grid().num_nodes() {
            if constraints.is_constrained(node) {
                rhs[2 * node] = 0.0;
                rhs[2 * node + 1] = 0.0;
            }
        }

        linear_solver.update_operator(*revision, |matrix| assembler.assemble_jacobian_state(velocity, matrix))?;
        let mut adjoint = DVector::zeros(rhs.len());
        linear_solver.solve_transpose(&rhs, &mut adjoint)?;
        let adjoint = Field::from_dvector(assembler.grid(), ELEMENT_STENCIL_WIDTH, &adjoint)?;

        assembler.apply_jacobian_design_transpose(design, velocity, &adjoint, dzeta)?;
        dzeta.scale(-1.0);
        Ok(())
    }
}

/// The state equation `R(u) = 0` for a fixed design, as seen by Newton's method.
struct StateEquation<'a> {
    assembler: &'a SsaAssembler,
    solver: &'a mut LinearSolveCache,
    velocity: Field<Vector2<f64>>,
    residual: Field<Vector2<f64>>,
    rhs: DVector<f64>,
    solution: DVector<f64>,
}

impl<'a> StateEquation<'a> {
    fn new(assembler: &'a SsaAssembler, solver: &'a mut LinearSolveCache) -> Self {
        let grid = assembler.grid();
        let n = 2 * grid.num_nodes();
        Self {
            assembler,
            solver,
            velocity: Field::new(grid, ELEMENT_STENCIL_WIDTH),
            residual: Field::new(grid, ELEMENT_STENCIL_WIDTH),
            rhs: DVector::zeros(n),
            solution: DVector::zeros(n),
        }
    }

    fn set_velocity(&mut self, x: &DVectorView<f64>) -> Result<(), Error> {
        self.velocity.copy_from_dvector(&x.clone_owned())
    }
}

impl<'a> VectorFunction<f64> for StateEquation<'a> {
    fn dimension(&self) -> usize {
        self.velocity.flat_len()
    }

    fn eval_into(&mut self, f: &mut DVectorViewMut<f64>, x: &DVectorView<f64>) -> Result<(), BoxedError> {
        self.set_velocity(x)?;
        self.assembler.assemble_residual(&self.velocity, &mut self.residual)?;
        f.copy_from(&self.residual.to_dvector());
        Ok(())
    }
}

impl<'a> DifferentiableVectorFunction<f64> for StateEquation<'a> {
    fn solve_jacobian_system(
        &mut self,
        sol: &mut DVectorViewMut<f64>,
        x: &DVectorView<f64>,
        rhs: &DVectorView<f64>,
    ) -> Result<(), BoxedError> {
        self.set_velocity(x)?;
        let assembler = self.assembler;
        let velocity = &self.velocity;
        self.solver
            .rebuild_operator(|matrix| assembler.assemble_jacobian_state(velocity, matrix))?;

        self.rhs.copy_from(rhs);
        self.solution.fill(0.0);
        self.solver.solve(&self.rhs, &mut self.solution)?;
        sol.copy_from(&self.solution);
        Ok(())
    }
}
