//! The cheap/expensive escalation solver.
//!
//! A solve first runs FGMRES preconditioned with a single multigrid V-cycle for the velocity
//! block (the cheap phase). If that does not converge within its iteration cap, the solve
//! restarts from the original guess with inner velocity solves (the expensive phase). If the
//! expensive phase fails too, the coordinator writes the convergence histories and every
//! worker returns an error.
use crate::coefficients::{CellAveraging, CoefficientModel, CoefficientTable};
use crate::comm::{Communicator, SerialCommunicator};
use crate::discretization::StokesDiscretization;
use crate::error::{InnerSolveError, StokesSolveError};
use crate::layout::BlockVector;
use crate::multigrid::VelocityMultigrid;
use crate::normalize::PostSolveNormalizer;
use crate::operator::{condense_rhs, BlockSystem, StokesBlockOperator, StokesOperator};
use crate::preconditioner::{BlockSchurPreconditioner, VelocitySolveMode};
use crate::schur::SchurComplementApproximation;
use core::fmt;
use fenris_krylov::control::SolverControl;
use fenris_krylov::fgmres::{Fgmres, FgmresError, FgmresErrorKind};
use log::{debug, error, info, warn};
use nalgebra::storage::StorageMut;
use nalgebra::{DVector, Dyn, Matrix, U1};
use std::path::PathBuf;

pub mod diagnostics;
pub mod direct;
mod settings;

pub use settings::StokesSolverSettings;

/// What the unknown of a solve represents.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum SolveMode {
    /// The unknown is the solution itself and the caller's vector is the initial guess.
    #[default]
    Picard,
    /// The unknown is an update to the current solution. The guess is zero and the pressure
    /// gauge is not applied.
    NewtonUpdate,
}

/// Phases of the escalation state machine.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SolverPhase {
    Cheap,
    Expensive,
    Direct,
}

impl SolverPhase {
    pub fn name(&self) -> &'static str {
        match self {
            SolverPhase::Cheap => "cheap",
            SolverPhase::Expensive => "expensive",
            SolverPhase::Direct => "direct",
        }
    }
}

impl fmt::Display for SolverPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The fixed factor between the scaled pressure unknown and the physical pressure.
///
/// The solver works with `p / ps`, which balances the velocity and pressure blocks when `ps`
/// is a typical viscosity divided by a typical length.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PressureScaling(f64);

impl PressureScaling {
    pub fn new(value: f64) -> Self {
        assert!(
            value.is_finite() && value > 0.0,
            "Pressure scaling must be positive, got {value}"
        );
        Self(value)
    }

    /// Mean active viscosity divided by the largest extent of the domain.
    pub fn from_coefficients(discretization: &StokesDiscretization, coefficients: &CoefficientTable) -> Self {
        let viscosity = coefficients.active();
        let mean = viscosity.sum() / viscosity.len() as f64;
        let extents = discretization.hierarchy().active().extents();
        Self::new(mean / extents.x.max(extents.y))
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Scaled pressure to physical pressure.
    pub fn scale<S: StorageMut<f64, Dyn, U1>>(&self, pressure: &mut Matrix<f64, Dyn, U1, S>) {
        *pressure *= self.0;
    }

    /// Physical pressure to scaled pressure.
    pub fn unscale<S: StorageMut<f64, Dyn, U1>>(&self, pressure: &mut Matrix<f64, Dyn, U1, S>) {
        *pressure /= self.0;
    }
}

/// Right-hand side and Dirichlet data of a saddle-point system.
#[derive(Debug, Clone, PartialEq)]
pub struct StokesSystem {
    pub rhs: BlockVector,
    /// Velocity values on constrained dofs. Other entries are ignored.
    pub boundary_values: DVector<f64>,
}

impl StokesSystem {
    /// A system with homogeneous Dirichlet data.
    pub fn homogeneous(rhs: BlockVector) -> Self {
        let boundary_values = DVector::zeros(rhs.layout().n_velocity());
        Self { rhs, boundary_values }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolveReport {
    /// `‖b - K x₀‖` for the initial guess `x₀`.
    pub initial_nonlinear_residual: f64,
    /// The residual norm at which the outer iteration stopped.
    pub final_linear_residual: f64,
    pub cheap_iterations: usize,
    pub expensive_iterations: usize,
    /// Accumulated inner velocity block iterations over both phases.
    pub a_block_iterations: usize,
    /// Accumulated inner Schur complement iterations over both phases.
    pub s_block_iterations: usize,
    /// The phase that produced the solution.
    pub phase: SolverPhase,
}

/// Everything that depends on the current coefficients.
#[derive(Debug)]
struct CoefficientState {
    coefficients: CoefficientTable,
    pressure_scaling: PressureScaling,
    operator: StokesOperator,
    multigrid: VelocityMultigrid,
    schur: SchurComplementApproximation,
}

struct PhaseResult {
    solution: DVector<f64>,
    outcome: Result<usize, FgmresError<f64>>,
    final_residual: f64,
    history: Vec<(usize, f64)>,
    a_block_iterations: usize,
    s_block_iterations: usize,
}

pub struct StokesSolver<C = SerialCommunicator> {
    discretization: StokesDiscretization,
    settings: StokesSolverSettings,
    normalizer: PostSolveNormalizer,
    comm: C,
    state: Option<CoefficientState>,
}

impl StokesSolver<SerialCommunicator> {
    pub fn new(discretization: StokesDiscretization, settings: StokesSolverSettings) -> Self {
        Self::with_communicator(discretization, settings, SerialCommunicator)
    }
}

impl<C: Communicator> StokesSolver<C> {
    pub fn with_communicator(discretization: StokesDiscretization, settings: StokesSolverSettings, comm: C) -> Self {
        let normalizer = PostSolveNormalizer::identity(&discretization);
        Self {
            discretization,
            settings,
            normalizer,
            comm,
            state: None,
        }
    }

    pub fn with_normalizer(self, normalizer: PostSolveNormalizer) -> Self {
        Self { normalizer, ..self }
    }

    pub fn discretization(&self) -> &StokesDiscretization {
        &self.discretization
    }

    pub fn settings(&self) -> &StokesSolverSettings {
        &self.settings
    }

    pub fn normalizer(&self) -> &PostSolveNormalizer {
        &self.normalizer
    }

    pub fn communicator(&self) -> &C {
        &self.comm
    }

    /// The operator built from the current coefficients, if any.
    pub fn operator(&self) -> Option<&StokesOperator> {
        self.state.as_ref().map(|state| &state.operator)
    }

    pub fn pressure_scaling(&self) -> Option<PressureScaling> {
        self.state.as_ref().map(|state| state.pressure_scaling)
    }

    pub fn coefficients(&self) -> Option<&CoefficientTable> {
        self.state.as_ref().map(|state| &state.coefficients)
    }

    /// Rebuilds the operator, the multigrid hierarchy and the Schur complement approximation.
    pub fn update_coefficients(&mut self, coefficients: CoefficientTable) {
        assert_eq!(
            coefficients.n_levels(),
            self.discretization.n_levels(),
            "Coefficient table does not match the discretization"
        );
        let pressure_scaling = match self.settings.pressure_scaling {
            Some(ps) => PressureScaling::new(ps),
            None => PressureScaling::from_coefficients(&self.discretization, &coefficients),
        };
        let ps = pressure_scaling.value();
        let active = self.discretization.active();
        let kind = self.settings.operator;

        let operator = StokesOperator::new(kind, active.clone(), &coefficients, ps);
        let multigrid = VelocityMultigrid::new(&self.discretization, &coefficients, &self.settings.multigrid, kind);
        let schur = SchurComplementApproximation::new(
            active.clone(),
            &coefficients,
            ps,
            kind,
            self.settings.mass_preconditioner,
        );
        debug!(
            "Stokes solver setup for coefficient generation {} with pressure scaling {:e}",
            coefficients.generation(),
            ps
        );

        self.state = Some(CoefficientState {
            coefficients,
            pressure_scaling,
            operator,
            multigrid,
            schur,
        });
    }

    /// Evaluates a coefficient model and rebuilds everything that depends on it.
    pub fn update_coefficient_model(
        &mut self,
        model: &dyn CoefficientModel,
        averaging: CellAveraging,
    ) -> eyre::Result<()> {
        let coefficients = CoefficientTable::evaluate(&self.discretization, model, averaging)?;
        self.update_coefficients(coefficients);
        Ok(())
    }

    /// Solves the system and writes the physical solution to `solution`.
    ///
    /// In [`SolveMode::Picard`], `solution` holds the initial guess on entry.
    ///
    /// # Panics
    ///
    /// Panics if no coefficients have been set, or if the vectors do not match the block
    /// layout of the active level.
    pub fn solve(
        &mut self,
        system: &StokesSystem,
        solution: &mut BlockVector,
        mode: SolveMode,
    ) -> Result<SolveReport, StokesSolveError> {
        let Some(state) = &self.state else {
            panic!("StokesSolver::solve called before coefficients were set");
        };
        let operator = &state.operator;
        let layout = operator.layout();
        layout.assert_matches(&system.rhs.layout(), "StokesSolver::solve (rhs)");
        layout.assert_matches(&solution.layout(), "StokesSolver::solve (solution)");
        let ps = state.pressure_scaling;
        let constraints = operator.constraints();

        let rhs = condense_rhs(operator, &system.rhs, &system.boundary_values);

        let guess = match mode {
            SolveMode::Picard => {
                let mut guess = solution.clone();
                self.normalizer.denormalize_pressure(&mut guess.pressure_mut());
                ps.unscale(&mut guess.pressure_mut());
                constraints.set_zero(&mut guess.velocity_mut());
                guess
            }
            SolveMode::NewtonUpdate => operator.initialize_vector(),
        };

        let mut residual = operator.initialize_vector();
        let (initial_nonlinear_residual, tolerance_base) = match mode {
            SolveMode::Picard => {
                operator.residual(&mut residual, &guess, &rhs);
                let initial = residual.norm();
                // Only the part of the right-hand side not balanced by the current pressure
                let mut zero_velocity = guess.clone();
                zero_velocity.velocity_mut().fill(0.0);
                operator.residual(&mut residual, &zero_velocity, &rhs);
                (initial, residual.norm())
            }
            SolveMode::NewtonUpdate => {
                let norm = rhs.norm();
                (norm, norm)
            }
        };

        let (mut result, report) = if self.settings.do_direct_solve {
            self.solve_direct(state, &rhs, initial_nonlinear_residual)?
        } else {
            let tolerance = self.settings.linear_stokes_solver_tolerance * tolerance_base;
            self.solve_iterative(state, &rhs, &guess, tolerance, initial_nonlinear_residual)?
        };

        constraints.distribute(&mut result.velocity_mut(), &system.boundary_values);
        ps.scale(&mut result.pressure_mut());
        self.normalizer.remove_nullspace(&mut result);
        if mode == SolveMode::Picard {
            self.normalizer.reset_pressure_adjustment();
            self.normalizer.normalize_pressure(&mut result);
        }
        solution.copy_from(&result);
        Ok(report)
    }

    fn solve_direct(
        &self,
        state: &CoefficientState,
        rhs: &BlockVector,
        initial_nonlinear_residual: f64,
    ) -> Result<(BlockVector, SolveReport), StokesSolveError> {
        let operator = &state.operator;
        debug!("Solving the Stokes system directly with {} unknowns", operator.layout().len());
        let result = direct::solve(operator, rhs.as_vector());
        let failed = self.comm.any(result.is_err());
        let x = match result {
            Ok(x) if !failed => x,
            result => {
                if !self.comm.is_coordinator() {
                    return Err(StokesSolveError::Quiet);
                }
                let err = result.err().unwrap_or_else(|| {
                    StokesSolveError::DirectSolveFailed(String::from("the direct solve failed on another worker"))
                });
                error!("{}", err);
                return Err(err);
            }
        };
        let x = BlockVector::from_vector(operator.layout(), x);
        let mut residual = operator.initialize_vector();
        operator.residual(&mut residual, &x, rhs);

        let report = SolveReport {
            initial_nonlinear_residual,
            final_linear_residual: residual.norm(),
            cheap_iterations: 0,
            expensive_iterations: 0,
            a_block_iterations: 0,
            s_block_iterations: 0,
            phase: SolverPhase::Direct,
        };
        Ok((x, report))
    }

    fn run_phase(
        &self,
        state: &CoefficientState,
        phase: SolverPhase,
        rhs: &BlockVector,
        guess: &BlockVector,
        tolerance: f64,
    ) -> PhaseResult {
        let settings = &self.settings;
        let (mode, restart, max_steps) = match phase {
            SolverPhase::Cheap => (
                VelocitySolveMode::SingleVCycle,
                settings.cheap_gmres_restart_length,
                settings.n_cheap_stokes_solver_steps,
            ),
            _ => (
                VelocitySolveMode::InnerSolve,
                settings.expensive_gmres_restart_length,
                settings.n_expensive_stokes_solver_steps,
            ),
        };
        debug!("Starting {} phase with tolerance {:e}", phase, tolerance);

        let preconditioner = BlockSchurPreconditioner::new(
            &state.operator,
            &state.multigrid,
            &state.schur,
            mode,
            settings.inner_solve_settings(),
        );
        let mut control = SolverControl::new(max_steps, tolerance).with_history();
        let mut solution = guess.as_vector().clone();
        let outcome = Fgmres::new(restart)
            .solve(
                &BlockSystem(&state.operator),
                &preconditioner,
                rhs.as_vector(),
                &mut solution,
                &mut control,
            )
            .map(|output| output.num_iterations);

        PhaseResult {
            solution,
            final_residual: control.last_value().unwrap_or(f64::NAN),
            history: control.history().to_vec(),
            outcome,
            a_block_iterations: preconditioner.n_iterations_a(),
            s_block_iterations: preconditioner.n_iterations_s(),
        }
    }

    fn solve_iterative(
        &self,
        state: &CoefficientState,
        rhs: &BlockVector,
        guess: &BlockVector,
        tolerance: f64,
        initial_nonlinear_residual: f64,
    ) -> Result<(BlockVector, SolveReport), StokesSolveError> {
        let layout = state.operator.layout();
        let mut cheap: Option<PhaseResult> = None;
        let mut phase = if self.settings.n_cheap_stokes_solver_steps == 0 {
            debug!("Cheap Stokes phase disabled");
            SolverPhase::Expensive
        } else {
            SolverPhase::Cheap
        };

        loop {
            let result = self.run_phase(state, phase, rhs, guess, tolerance);
            self.report_inner_failure(&result);
            let failed = self.comm.any(result.outcome.is_err());

            if !failed {
                let (cheap_iterations, expensive_iterations) = match (phase, &cheap) {
                    (SolverPhase::Cheap, _) => (phase_iterations(&result), 0),
                    (_, Some(cheap)) => (phase_iterations(cheap), phase_iterations(&result)),
                    (_, None) => (0, phase_iterations(&result)),
                };
                let (cheap_a, cheap_s) = cheap
                    .as_ref()
                    .map(|c| (c.a_block_iterations, c.s_block_iterations))
                    .unwrap_or((0, 0));
                info!("{}+{} iterations.", cheap_iterations, expensive_iterations);

                let report = SolveReport {
                    initial_nonlinear_residual,
                    final_linear_residual: result.final_residual,
                    cheap_iterations,
                    expensive_iterations,
                    a_block_iterations: cheap_a + result.a_block_iterations,
                    s_block_iterations: cheap_s + result.s_block_iterations,
                    phase,
                };
                return Ok((BlockVector::from_vector(layout, result.solution), report));
            }

            match phase {
                SolverPhase::Cheap => {
                    warn!(
                        "Cheap Stokes solve did not converge after {} iterations (residual {:e}, tolerance {:e}), \
                         switching to the expensive solver",
                        phase_iterations(&result),
                        result.final_residual,
                        tolerance
                    );
                    cheap = Some(result);
                    phase = SolverPhase::Expensive;
                }
                _ => return Err(self.fail(cheap.as_ref(), &result)),
            }
        }
    }

    /// Writes the convergence history of a failed inner solve on the coordinator.
    fn report_inner_failure(&self, result: &PhaseResult) {
        let Err(err) = &result.outcome else {
            return;
        };
        let FgmresErrorKind::PreconditionerError(inner) = &err.kind else {
            return;
        };
        let Some(inner) = inner.downcast_ref::<InnerSolveError>() else {
            return;
        };
        if !self.comm.is_coordinator() {
            return;
        }
        let file_name = diagnostics::phase_history_file_name(inner.block.short_name());
        let directory = self.settings.diagnostics_directory();
        let history = inner.residual_history.iter().copied().enumerate();
        match diagnostics::write_history(&directory, &file_name, history) {
            Ok(path) => error!("{} See {} for its convergence history.", inner, path.display()),
            Err(io_err) => error!("{} Writing its convergence history failed: {}", inner, io_err),
        }
    }

    fn fail(&self, cheap: Option<&PhaseResult>, expensive: &PhaseResult) -> StokesSolveError {
        if !self.comm.is_coordinator() {
            return StokesSolveError::Quiet;
        }

        let directory = self.settings.diagnostics_directory();
        let mut history_files: Vec<PathBuf> = Vec::new();
        let phases = cheap
            .map(|c| (SolverPhase::Cheap, c))
            .into_iter()
            .chain(std::iter::once((SolverPhase::Expensive, expensive)));
        for (phase, result) in phases {
            let file_name = diagnostics::phase_history_file_name(phase.name());
            match diagnostics::write_history(&directory, &file_name, result.history.iter().copied()) {
                Ok(path) => history_files.push(path),
                Err(err) => return StokesSolveError::Diagnostics(err),
            }
        }

        let cause = match &expensive.outcome {
            Err(err) => err.kind.to_string(),
            Ok(_) => String::from("the solve failed on another worker"),
        };
        let err = StokesSolveError::Fatal {
            phase: SolverPhase::Expensive,
            residual: expensive.final_residual,
            iterations: phase_iterations(expensive),
            history_files,
            cause,
        };
        error!("{}", err);
        err
    }
}

fn phase_iterations(result: &PhaseResult) -> usize {
    match &result.outcome {
        Ok(iterations) => *iterations,
        Err(err) => err.output.num_iterations,
    }
}
