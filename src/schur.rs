//! Approximation of the pressure Schur complement by a viscosity-weighted mass matrix.
//!
//! For the Stokes system `[A Bᵀ; B 0]` with pressure scaling `ps`, the Schur complement
//! `B A⁻¹ Bᵀ` is spectrally equivalent to the pressure mass matrix weighted by `ps² / η`.
use crate::coefficients::CoefficientTable;
use crate::discretization::LevelData;
use crate::operator::assembled::{assemble_mass_matrix, csr_diagonal};
use crate::operator::{MatrixFreeMassOperator, OperatorKind};
use fenris_krylov::cg::{CgOutput, ConjugateGradient, RelativeResidualCriterion, SolveError};
use fenris_krylov::chebyshev::{ChebyshevSettings, ChebyshevSmoother};
use fenris_krylov::{DiagonalOperator, LinearOperator};
use log::debug;
use nalgebra::{DVector, DVectorView, DVectorViewMut};
use nalgebra_sparse::CsrMatrix;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::Arc;

/// Preconditioner of the inner mass-matrix solve.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MassPreconditionerKind {
    #[default]
    Chebyshev,
    Diagonal,
}

#[derive(Debug, Clone)]
pub enum MassOperator {
    MatrixFree(MatrixFreeMassOperator),
    Assembled(CsrMatrix<f64>),
}

impl MassOperator {
    pub fn diagonal(&self) -> DVector<f64> {
        match self {
            Self::MatrixFree(op) => op.diagonal(),
            Self::Assembled(matrix) => csr_diagonal(matrix),
        }
    }
}

impl LinearOperator<f64> for MassOperator {
    fn apply(&self, y: DVectorViewMut<f64>, x: DVectorView<f64>) -> Result<(), Box<dyn Error>> {
        match self {
            Self::MatrixFree(op) => op.apply(y, x),
            Self::Assembled(matrix) => matrix.apply(y, x),
        }
    }
}

#[derive(Debug, Clone)]
enum MassPreconditioner {
    Chebyshev(ChebyshevSmoother<f64>),
    Diagonal(DiagonalOperator<f64>),
}

#[derive(Debug, Clone)]
pub struct SchurComplementApproximation {
    operator: MassOperator,
    preconditioner: MassPreconditioner,
    generation: u64,
}

impl SchurComplementApproximation {
    pub fn new(
        level: Arc<LevelData>,
        coefficients: &CoefficientTable,
        pressure_scaling: f64,
        kind: OperatorKind,
        preconditioner: MassPreconditionerKind,
    ) -> Self {
        let ps2 = pressure_scaling * pressure_scaling;
        let coefficient = coefficients.viscosity(level.level).map(|eta| ps2 / eta);
        let n_dofs = level.n_pressure_dofs();
        let operator = match kind {
            OperatorKind::MatrixFree => MassOperator::MatrixFree(MatrixFreeMassOperator::new(level, coefficient)),
            OperatorKind::Assembled => MassOperator::Assembled(assemble_mass_matrix(&level, &coefficient)),
        };

        let inverse_diagonal = DiagonalOperator::from_inverse_of(&operator.diagonal());
        let preconditioner = match preconditioner {
            MassPreconditionerKind::Chebyshev => {
                let settings = ChebyshevSettings::coarse_solver(n_dofs);
                MassPreconditioner::Chebyshev(ChebyshevSmoother::new(&operator, inverse_diagonal, &settings))
            }
            MassPreconditionerKind::Diagonal => MassPreconditioner::Diagonal(inverse_diagonal),
        };
        debug!("Schur complement approximation with {} pressure dofs", n_dofs);

        Self {
            operator,
            preconditioner,
            generation: coefficients.generation(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn operator(&self) -> &MassOperator {
        &self.operator
    }

    /// Solves `M dst = src` with preconditioned CG to `‖r‖ ≤ tolerance ‖src‖`, starting
    /// from zero.
    pub fn solve(
        &self,
        mut dst: DVectorViewMut<f64>,
        src: DVectorView<f64>,
        tolerance: f64,
        max_iterations: usize,
    ) -> Result<CgOutput<f64>, SolveError<f64>> {
        dst.fill(0.0);
        let criterion = RelativeResidualCriterion::new(tolerance);
        match &self.preconditioner {
            MassPreconditioner::Chebyshev(smoother) => ConjugateGradient::new()
                .with_operator(&self.operator)
                .with_preconditioner(smoother.as_preconditioner(&self.operator))
                .with_stopping_criterion(criterion)
                .with_max_iter(max_iterations)
                .solve_with_guess(src, dst),
            MassPreconditioner::Diagonal(diagonal) => ConjugateGradient::new()
                .with_operator(&self.operator)
                .with_preconditioner(diagonal)
                .with_stopping_criterion(criterion)
                .with_max_iter(max_iterations)
                .solve_with_guess(src, dst),
        }
    }
}
