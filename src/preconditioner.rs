//! Block-triangular preconditioner for the saddle-point system.
use crate::error::{Block, InnerSolveError};
use crate::multigrid::VelocityMultigrid;
use crate::operator::{StokesBlockOperator, VelocityBlock};
use crate::schur::SchurComplementApproximation;
use fenris_krylov::cg::{ConjugateGradient, RelativeResidualCriterion};
use fenris_krylov::LinearOperator;
use log::{debug, error};
use nalgebra::{DVector, DVectorView, DVectorViewMut};
use std::cell::Cell;
use std::error::Error;

/// How the velocity block is inverted inside the preconditioner.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum VelocitySolveMode {
    /// A single multigrid V-cycle.
    SingleVCycle,
    /// Multigrid-preconditioned CG to the velocity block tolerance.
    InnerSolve,
}

/// Tolerances and caps of the inner solves.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct InnerSolveSettings {
    pub a_block_tolerance: f64,
    pub s_block_tolerance: f64,
    pub max_a_block_iterations: usize,
    pub max_s_block_iterations: usize,
    /// Pressure inputs with a norm at or below this value skip the Schur complement solve.
    pub near_zero_pressure_threshold: f64,
}

impl Default for InnerSolveSettings {
    fn default() -> Self {
        Self {
            a_block_tolerance: 1e-2,
            s_block_tolerance: 1e-6,
            max_a_block_iterations: 10000,
            max_s_block_iterations: 1000,
            near_zero_pressure_threshold: 1e-50,
        }
    }
}

/// Applies the inverse of the block-triangular approximation
///
/// ```text
/// [ A  Bᵀ ]
/// [ 0  -S ]
/// ```
///
/// where `A⁻¹` is a multigrid V-cycle (or an inner CG solve preconditioned with it) and
/// `S⁻¹` is an inner CG solve with the viscosity-weighted pressure mass matrix.
///
/// Inner iteration counts accumulate over all applications.
pub struct BlockSchurPreconditioner<'a, O: ?Sized> {
    operator: &'a O,
    multigrid: &'a VelocityMultigrid,
    schur: &'a SchurComplementApproximation,
    mode: VelocitySolveMode,
    settings: InnerSolveSettings,
    n_iterations_a: Cell<usize>,
    n_iterations_s: Cell<usize>,
}

impl<'a, O> BlockSchurPreconditioner<'a, O>
where
    O: ?Sized + StokesBlockOperator,
{
    /// # Panics
    ///
    /// Panics if the components were built from different coefficient tables, or if their
    /// sizes do not match the operator's block layout.
    pub fn new(
        operator: &'a O,
        multigrid: &'a VelocityMultigrid,
        schur: &'a SchurComplementApproximation,
        mode: VelocitySolveMode,
        settings: InnerSolveSettings,
    ) -> Self {
        let generation = operator.generation();
        assert_eq!(
            multigrid.generation(),
            generation,
            "Multigrid hierarchy was built from a different coefficient table than the operator"
        );
        assert_eq!(
            schur.generation(),
            generation,
            "Schur complement approximation was built from a different coefficient table than the operator"
        );
        assert_eq!(
            multigrid.n_dofs(),
            operator.layout().n_velocity(),
            "Multigrid size does not match the velocity block"
        );
        Self {
            operator,
            multigrid,
            schur,
            mode,
            settings,
            n_iterations_a: Cell::new(0),
            n_iterations_s: Cell::new(0),
        }
    }

    pub fn mode(&self) -> VelocitySolveMode {
        self.mode
    }

    /// Accumulated velocity block iterations. A single V-cycle counts as one iteration.
    pub fn n_iterations_a(&self) -> usize {
        self.n_iterations_a.get()
    }

    /// Accumulated Schur complement CG iterations.
    pub fn n_iterations_s(&self) -> usize {
        self.n_iterations_s.get()
    }

    fn solve_pressure(&self, mut dst_p: DVectorViewMut<f64>, src_p: DVectorView<f64>) -> Result<(), InnerSolveError> {
        let src_norm = src_p.norm();
        if src_norm <= self.settings.near_zero_pressure_threshold {
            debug!("Pressure input norm {:e} is negligible, skipping Schur complement solve", src_norm);
            dst_p.fill(0.0);
            return Ok(());
        }

        let tolerance = self.settings.s_block_tolerance;
        let result = self.schur.solve(
            (&mut dst_p).into(),
            src_p,
            tolerance,
            self.settings.max_s_block_iterations,
        );
        match result {
            Ok(output) => {
                self.n_iterations_s
                    .set(self.n_iterations_s.get() + output.num_iterations);
            }
            Err(err) => {
                let iterations = err.output.num_iterations;
                self.n_iterations_s.set(self.n_iterations_s.get() + iterations);
                error!(
                    "Schur complement solve failed after {} iterations (tolerance {:e}): {}",
                    iterations, tolerance, err.kind
                );
                return Err(InnerSolveError {
                    block: Block::Pressure,
                    tolerance,
                    iterations,
                    residual_history: err.output.residual_norms,
                    cause: err.kind.to_string(),
                });
            }
        }
        dst_p.neg_mut();
        Ok(())
    }

    fn solve_velocity(&self, mut dst_u: DVectorViewMut<f64>, rhs_u: &DVector<f64>) -> Result<(), Box<dyn Error>> {
        match self.mode {
            VelocitySolveMode::SingleVCycle => {
                self.multigrid.vcycle(dst_u, rhs_u.into())?;
                self.n_iterations_a.set(self.n_iterations_a.get() + 1);
            }
            VelocitySolveMode::InnerSolve => {
                let tolerance = self.settings.a_block_tolerance;
                dst_u.fill(0.0);
                let result = ConjugateGradient::new()
                    .with_operator(VelocityBlock(self.operator))
                    .with_preconditioner(self.multigrid)
                    .with_stopping_criterion(RelativeResidualCriterion::new(tolerance))
                    .with_max_iter(self.settings.max_a_block_iterations)
                    .solve_with_guess(rhs_u, dst_u);
                match result {
                    Ok(output) => {
                        self.n_iterations_a
                            .set(self.n_iterations_a.get() + output.num_iterations);
                    }
                    Err(err) => {
                        let iterations = err.output.num_iterations;
                        self.n_iterations_a.set(self.n_iterations_a.get() + iterations);
                        error!(
                            "Velocity block solve failed after {} iterations (tolerance {:e}): {}",
                            iterations, tolerance, err.kind
                        );
                        return Err(Box::new(InnerSolveError {
                            block: Block::Velocity,
                            tolerance,
                            iterations,
                            residual_history: err.output.residual_norms,
                            cause: err.kind.to_string(),
                        }));
                    }
                }
            }
        }
        Ok(())
    }
}

impl<'a, O> LinearOperator<f64> for BlockSchurPreconditioner<'a, O>
where
    O: ?Sized + StokesBlockOperator,
{
    fn apply(&self, mut dst: DVectorViewMut<f64>, src: DVectorView<f64>) -> Result<(), Box<dyn Error>> {
        let layout = self.operator.layout();
        let (src_u, src_p) = layout.split(&src);
        let (dst_u, mut dst_p) = layout.split_mut(&mut dst);

        self.solve_pressure((&mut dst_p).into(), src_p)?;

        // u_rhs = src_u - Bᵀ dst_p
        let mut rhs_u = DVector::zeros(layout.n_velocity());
        self.operator.apply_gradient((&mut rhs_u).into(), (&dst_p).into());
        rhs_u.zip_apply(&src_u, |g_i, s_i| *g_i = s_i - *g_i);

        self.solve_velocity(dst_u, &rhs_u)
    }
}
