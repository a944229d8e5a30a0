use crate::multigrid::MultigridSettings;
use crate::operator::OperatorKind;
use crate::preconditioner::InnerSolveSettings;
use crate::schur::MassPreconditionerKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration of [`StokesSolver`](super::StokesSolver).
///
/// Missing fields take their default values when deserializing, so partial documents such
/// as `{ "n_cheap_stokes_solver_steps": 0 }` are valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StokesSolverSettings {
    /// Iteration cap of the cheap phase. Zero skips the cheap phase.
    pub n_cheap_stokes_solver_steps: usize,
    /// Iteration cap of the expensive phase.
    pub n_expensive_stokes_solver_steps: usize,
    /// Outer tolerance relative to the residual of the guess with zero velocity.
    pub linear_stokes_solver_tolerance: f64,
    /// Relative tolerance of the inner velocity block solve of the expensive phase.
    pub a_block_tolerance: f64,
    /// Relative tolerance of the inner Schur complement solve.
    pub s_block_tolerance: f64,
    pub cheap_gmres_restart_length: usize,
    pub expensive_gmres_restart_length: usize,
    pub max_a_block_iterations: usize,
    pub max_s_block_iterations: usize,
    /// Absolute threshold below which the pressure input of the preconditioner is treated
    /// as zero.
    pub near_zero_pressure_threshold: f64,
    /// Replaces the iterative solver by a dense factorization. Only viable for small problems.
    pub do_direct_solve: bool,
    pub operator: OperatorKind,
    pub mass_preconditioner: MassPreconditionerKind,
    pub multigrid: MultigridSettings,
    /// Fixed pressure scaling. If unset, the mean active viscosity divided by the largest
    /// domain extent is used.
    pub pressure_scaling: Option<f64>,
    /// Directory receiving the convergence history of failed solves. Defaults to the
    /// working directory.
    pub output_directory: Option<PathBuf>,
}

impl Default for StokesSolverSettings {
    fn default() -> Self {
        let inner = InnerSolveSettings::default();
        Self {
            n_cheap_stokes_solver_steps: 200,
            n_expensive_stokes_solver_steps: 1000,
            linear_stokes_solver_tolerance: 1e-7,
            a_block_tolerance: inner.a_block_tolerance,
            s_block_tolerance: inner.s_block_tolerance,
            cheap_gmres_restart_length: 50,
            expensive_gmres_restart_length: 100,
            max_a_block_iterations: inner.max_a_block_iterations,
            max_s_block_iterations: inner.max_s_block_iterations,
            near_zero_pressure_threshold: inner.near_zero_pressure_threshold,
            do_direct_solve: false,
            operator: OperatorKind::default(),
            mass_preconditioner: MassPreconditionerKind::default(),
            multigrid: MultigridSettings::default(),
            pressure_scaling: None,
            output_directory: None,
        }
    }
}

impl StokesSolverSettings {
    pub fn inner_solve_settings(&self) -> InnerSolveSettings {
        InnerSolveSettings {
            a_block_tolerance: self.a_block_tolerance,
            s_block_tolerance: self.s_block_tolerance,
            max_a_block_iterations: self.max_a_block_iterations,
            max_s_block_iterations: self.max_s_block_iterations,
            near_zero_pressure_threshold: self.near_zero_pressure_threshold,
        }
    }

    /// The directory diagnostics are written to.
    pub fn diagnostics_directory(&self) -> PathBuf {
        self.output_directory
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }
}
