//! Geometric multigrid for the velocity block.
use crate::coefficients::CoefficientTable;
use crate::discretization::{LevelData, StokesDiscretization};
use crate::operator::assembled::{assemble_velocity_matrix, csr_diagonal};
use crate::operator::{MatrixFreeVelocityOperator, OperatorKind};
use fenris_krylov::chebyshev::{ChebyshevSettings, ChebyshevSmoother};
use fenris_krylov::operator::apply_operator;
use fenris_krylov::{DiagonalOperator, LinearOperator};
use log::debug;
use nalgebra::{DVector, DVectorView, DVectorViewMut};
use nalgebra_sparse::CsrMatrix;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::Arc;

pub mod transfer;

pub use transfer::Transfer;

/// Chebyshev parameters of the multigrid hierarchy.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultigridSettings {
    /// Number of Chebyshev corrections per smoothing step on levels above the coarsest.
    pub smoother_degree: usize,
    /// Ratio between the largest and smallest smoothed eigenvalue.
    pub smoothing_range: f64,
    /// Lanczos iterations used to estimate the largest eigenvalue on levels above the coarsest.
    pub eig_cg_n_iterations: usize,
    /// Target relative accuracy of the Chebyshev coarse solve.
    pub coarse_smoothing_range: f64,
}

impl Default for MultigridSettings {
    fn default() -> Self {
        Self {
            smoother_degree: 4,
            smoothing_range: 15.0,
            eig_cg_n_iterations: 10,
            coarse_smoothing_range: 1e-3,
        }
    }
}

impl MultigridSettings {
    /// Chebyshev settings for the given level. The coarsest level runs the smoother as a
    /// solver, with the degree chosen to reach the coarse accuracy and an eigenvalue estimate
    /// using as many iterations as there are unknowns.
    pub fn chebyshev_settings(&self, level: usize, n_dofs: usize) -> ChebyshevSettings<f64> {
        if level == 0 {
            ChebyshevSettings {
                degree: None,
                smoothing_range: self.coarse_smoothing_range,
                eig_cg_n_iterations: n_dofs,
            }
        } else {
            ChebyshevSettings {
                degree: Some(self.smoother_degree),
                smoothing_range: self.smoothing_range,
                eig_cg_n_iterations: self.eig_cg_n_iterations,
            }
        }
    }
}

/// The velocity operator of a single level.
#[derive(Debug, Clone)]
pub enum LevelOperator {
    MatrixFree(MatrixFreeVelocityOperator),
    Assembled(CsrMatrix<f64>),
}

impl LevelOperator {
    pub fn new(kind: OperatorKind, level: Arc<LevelData>, viscosity: &DVector<f64>) -> Self {
        match kind {
            OperatorKind::MatrixFree => Self::MatrixFree(MatrixFreeVelocityOperator::new(level, viscosity.clone())),
            OperatorKind::Assembled => Self::Assembled(assemble_velocity_matrix(&level, viscosity)),
        }
    }

    pub fn diagonal(&self) -> DVector<f64> {
        match self {
            Self::MatrixFree(op) => op.diagonal(),
            Self::Assembled(matrix) => csr_diagonal(matrix),
        }
    }
}

impl LinearOperator<f64> for LevelOperator {
    fn apply(&self, y: DVectorViewMut<f64>, x: DVectorView<f64>) -> Result<(), Box<dyn Error>> {
        match self {
            Self::MatrixFree(op) => op.apply(y, x),
            Self::Assembled(matrix) => matrix.apply(y, x),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MultigridLevel {
    data: Arc<LevelData>,
    operator: LevelOperator,
    smoother: ChebyshevSmoother<f64>,
}

impl MultigridLevel {
    pub fn data(&self) -> &Arc<LevelData> {
        &self.data
    }

    pub fn operator(&self) -> &LevelOperator {
        &self.operator
    }

    pub fn smoother(&self) -> &ChebyshevSmoother<f64> {
        &self.smoother
    }
}

/// A V-cycle preconditioner for the velocity block of the active level.
///
/// Level 0 is solved approximately by a high-degree Chebyshev iteration, all other levels
/// are pre- and post-smoothed with a fixed-degree Chebyshev smoother. Setup does not fail:
/// if the eigenvalue estimate breaks down, the smoother falls back to an assumed spectrum.
#[derive(Debug, Clone)]
pub struct VelocityMultigrid {
    levels: Vec<MultigridLevel>,
    transfers: Vec<Transfer>,
    generation: u64,
}

impl VelocityMultigrid {
    pub fn new(
        discretization: &StokesDiscretization,
        coefficients: &CoefficientTable,
        settings: &MultigridSettings,
        kind: OperatorKind,
    ) -> Self {
        assert_eq!(
            coefficients.n_levels(),
            discretization.n_levels(),
            "Coefficient table and discretization have different numbers of levels"
        );

        let levels: Vec<_> = (0..discretization.n_levels())
            .map(|l| {
                let data = Arc::clone(discretization.level(l));
                let operator = LevelOperator::new(kind, Arc::clone(&data), coefficients.viscosity(l));
                let inverse_diagonal = DiagonalOperator::from_inverse_of(&operator.diagonal());
                let chebyshev = settings.chebyshev_settings(l, data.n_velocity_dofs());
                let smoother = ChebyshevSmoother::new(&operator, inverse_diagonal, &chebyshev);
                debug!(
                    "Multigrid level {}: {} velocity dofs, Chebyshev degree {}",
                    l,
                    data.n_velocity_dofs(),
                    smoother.degree()
                );
                MultigridLevel {
                    data,
                    operator,
                    smoother,
                }
            })
            .collect();

        let transfers = levels
            .windows(2)
            .map(|pair| Transfer::new(&pair[0].data, &pair[1].data))
            .collect();

        Self {
            levels,
            transfers,
            generation: coefficients.generation(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn n_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, level: usize) -> &MultigridLevel {
        &self.levels[level]
    }

    pub fn transfer(&self, coarse_level: usize) -> &Transfer {
        &self.transfers[coarse_level]
    }

    pub fn n_dofs(&self) -> usize {
        self.levels[self.levels.len() - 1].data.n_velocity_dofs()
    }

    /// One V-cycle from a zero initial guess: `dst ≈ A⁻¹ src`.
    ///
    /// Constrained entries of `dst` are copied from `src`.
    pub fn vcycle(&self, mut dst: DVectorViewMut<f64>, src: DVectorView<f64>) -> Result<(), Box<dyn Error>> {
        assert_eq!(src.len(), self.n_dofs(), "V-cycle input has the wrong length");
        assert_eq!(dst.len(), self.n_dofs(), "V-cycle output has the wrong length");
        let top = self.levels.len() - 1;
        self.vcycle_level(top, (&mut dst).into(), src)?;
        self.levels[top].data.constraints.distribute(&mut dst, &src);
        Ok(())
    }

    fn vcycle_level(&self, l: usize, mut x: DVectorViewMut<f64>, b: DVectorView<f64>) -> Result<(), Box<dyn Error>> {
        let level = &self.levels[l];
        if l == 0 {
            return level.smoother.smooth(&level.operator, x, b, true);
        }

        level.smoother.smooth(&level.operator, &mut x, b, true)?;

        let mut residual = DVector::zeros(b.len());
        apply_operator(&mut residual, &level.operator, &x)?;
        residual.zip_apply(&b, |ax_i, b_i| *ax_i = b_i - *ax_i);

        let transfer = &self.transfers[l - 1];
        let coarse = &self.levels[l - 1];
        let mut coarse_rhs = transfer.restrict((&residual).into());
        coarse.data.constraints.set_zero(&mut coarse_rhs);
        let mut coarse_correction = DVector::zeros(coarse_rhs.len());
        self.vcycle_level(l - 1, (&mut coarse_correction).into(), (&coarse_rhs).into())?;
        transfer.prolongate_add((&mut x).into(), (&coarse_correction).into());

        level.smoother.smooth(&level.operator, &mut x, b, false)
    }
}

impl LinearOperator<f64> for VelocityMultigrid {
    fn apply(&self, y: DVectorViewMut<f64>, x: DVectorView<f64>) -> Result<(), Box<dyn Error>> {
        self.vcycle(y, x)
    }
}
