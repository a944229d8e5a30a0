//! Operators that evaluate the cell integrals on the fly instead of storing matrices.
//!
//! Cell contributions are computed in parallel and accumulated into the global vector
//! serially afterwards.
use super::kernels::{
    apply_divergence_cell, apply_gradient_cell, apply_mass_cell, apply_viscous_cell, PressureCellVector,
    VelocityCellVector,
};
use super::StokesBlockOperator;
use crate::coefficients::CoefficientTable;
use crate::discretization::element::{PRESSURE_NODES_PER_CELL, VELOCITY_DOFS_PER_CELL};
use crate::discretization::{LevelData, VelocityConstraints};
use crate::layout::BlockLayout;
use fenris_krylov::LinearOperator;
use nalgebra::{DVector, DVectorView, DVectorViewMut};
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use std::error::Error;
use std::sync::Arc;

/// Whether constrained entries of an input velocity vector take part in the evaluation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum ConstrainedInput {
    Ignore,
    Use,
}

fn gather_velocity(level: &LevelData, cell: usize, src: &[f64], input: ConstrainedInput) -> VelocityCellVector {
    let constraints = &level.constraints;
    level.cell_velocity_dofs(cell).map(|dof| match input {
        ConstrainedInput::Ignore if constraints.is_constrained(dof) => 0.0,
        _ => src[dof],
    })
}

fn gather_pressure(level: &LevelData, cell: usize, src: &[f64]) -> PressureCellVector {
    level.cell_pressure_dofs(cell).map(|dof| src[dof])
}

/// Adds cell vectors into the free velocity rows of `dst`, which is zeroed first.
fn scatter_velocity(level: &LevelData, cell_values: &[VelocityCellVector], dst: &mut DVectorViewMut<f64>) {
    dst.fill(0.0);
    for (cell, local) in cell_values.iter().enumerate() {
        for (dof, value) in level.cell_velocity_dofs(cell).iter().zip(local) {
            if !level.constraints.is_constrained(*dof) {
                dst[*dof] += value;
            }
        }
    }
}

fn scatter_pressure(level: &LevelData, cell_values: &[PressureCellVector], dst: &mut DVectorViewMut<f64>) {
    dst.fill(0.0);
    for (cell, local) in cell_values.iter().enumerate() {
        for (dof, value) in level.cell_pressure_dofs(cell).iter().zip(local) {
            dst[*dof] += value;
        }
    }
}

/// The viscous velocity block `∫ 2η ε(u) : ε(v)` on one level, with identity rows for
/// constrained degrees of freedom.
#[derive(Debug, Clone)]
pub struct MatrixFreeVelocityOperator {
    level: Arc<LevelData>,
    viscosity: DVector<f64>,
}

impl MatrixFreeVelocityOperator {
    pub fn new(level: Arc<LevelData>, viscosity: DVector<f64>) -> Self {
        assert_eq!(
            viscosity.len(),
            level.grid.n_cells(),
            "Need one viscosity per cell of level {}",
            level.level
        );
        Self { level, viscosity }
    }

    pub fn level(&self) -> &Arc<LevelData> {
        &self.level
    }

    pub fn n_dofs(&self) -> usize {
        self.level.n_velocity_dofs()
    }

    /// `dst = A src` on the free rows. Constrained rows of `dst` are set to zero.
    pub(crate) fn apply_free_rows(&self, mut dst: DVectorViewMut<f64>, src: DVectorView<f64>, input: ConstrainedInput) {
        assert_eq!(src.len(), self.n_dofs());
        assert_eq!(dst.len(), self.n_dofs());
        let level = &*self.level;
        let src = src.as_slice();
        let cell_values: Vec<_> = (0..level.grid.n_cells())
            .into_par_iter()
            .map(|cell| {
                let u = gather_velocity(level, cell, src, input);
                apply_viscous_cell(&level.quadrature, self.viscosity[cell], &u)
            })
            .collect();
        scatter_velocity(level, &cell_values, &mut dst);
    }

    /// `dst = A src` with identity rows for constrained dofs.
    pub fn apply_block(&self, mut dst: DVectorViewMut<f64>, src: DVectorView<f64>) {
        self.apply_free_rows((&mut dst).into(), src, ConstrainedInput::Ignore);
        for dof in self.level.constraints.constrained_dofs() {
            dst[dof] = src[dof];
        }
    }

    pub fn diagonal(&self) -> DVector<f64> {
        let level = &*self.level;
        let cell_diagonals: Vec<VelocityCellVector> = (0..level.grid.n_cells())
            .into_par_iter()
            .map(|cell| {
                let mut diagonal = [0.0; VELOCITY_DOFS_PER_CELL];
                for (i, d_i) in diagonal.iter_mut().enumerate() {
                    let mut unit = [0.0; VELOCITY_DOFS_PER_CELL];
                    unit[i] = 1.0;
                    *d_i = apply_viscous_cell(&level.quadrature, self.viscosity[cell], &unit)[i];
                }
                diagonal
            })
            .collect();

        let mut diagonal = DVector::zeros(self.n_dofs());
        scatter_velocity(level, &cell_diagonals, &mut (&mut diagonal).into());
        for dof in level.constraints.constrained_dofs() {
            diagonal[dof] = 1.0;
        }
        diagonal
    }
}

impl LinearOperator<f64> for MatrixFreeVelocityOperator {
    fn apply(&self, y: DVectorViewMut<f64>, x: DVectorView<f64>) -> Result<(), Box<dyn Error>> {
        self.apply_block(y, x);
        Ok(())
    }
}

/// The coupling blocks `Bᵀ` (gradient) and `B` (divergence) on one level.
#[derive(Debug, Clone)]
pub struct MatrixFreeCouplingOperator {
    level: Arc<LevelData>,
    pressure_scaling: f64,
}

impl MatrixFreeCouplingOperator {
    pub fn new(level: Arc<LevelData>, pressure_scaling: f64) -> Self {
        Self { level, pressure_scaling }
    }

    /// `dst_u = Bᵀ src_p`, zero on constrained velocity rows.
    pub fn apply_gradient(&self, mut dst_u: DVectorViewMut<f64>, src_p: DVectorView<f64>) {
        let level = &*self.level;
        assert_eq!(src_p.len(), level.n_pressure_dofs());
        assert_eq!(dst_u.len(), level.n_velocity_dofs());
        let src = src_p.as_slice();
        let cell_values: Vec<_> = (0..level.grid.n_cells())
            .into_par_iter()
            .map(|cell| {
                let p = gather_pressure(level, cell, src);
                apply_gradient_cell(&level.quadrature, self.pressure_scaling, &p)
            })
            .collect();
        scatter_velocity(level, &cell_values, &mut dst_u);
    }

    /// `dst_p = B src_u`.
    pub(crate) fn apply_divergence(&self, mut dst_p: DVectorViewMut<f64>, src_u: DVectorView<f64>, input: ConstrainedInput) {
        let level = &*self.level;
        assert_eq!(src_u.len(), level.n_velocity_dofs());
        assert_eq!(dst_p.len(), level.n_pressure_dofs());
        let src = src_u.as_slice();
        let cell_values: Vec<_> = (0..level.grid.n_cells())
            .into_par_iter()
            .map(|cell| {
                let u = gather_velocity(level, cell, src, input);
                apply_divergence_cell(&level.quadrature, self.pressure_scaling, &u)
            })
            .collect();
        scatter_pressure(level, &cell_values, &mut dst_p);
    }
}

/// The pressure mass matrix weighted by a per-cell coefficient.
#[derive(Debug, Clone)]
pub struct MatrixFreeMassOperator {
    level: Arc<LevelData>,
    coefficient: DVector<f64>,
}

impl MatrixFreeMassOperator {
    pub fn new(level: Arc<LevelData>, coefficient: DVector<f64>) -> Self {
        assert_eq!(coefficient.len(), level.grid.n_cells(), "Need one coefficient per cell");
        Self { level, coefficient }
    }

    pub fn diagonal(&self) -> DVector<f64> {
        let level = &*self.level;
        let cell_diagonals: Vec<PressureCellVector> = (0..level.grid.n_cells())
            .into_par_iter()
            .map(|cell| {
                let mut diagonal = [0.0; PRESSURE_NODES_PER_CELL];
                for (i, d_i) in diagonal.iter_mut().enumerate() {
                    let mut unit = [0.0; PRESSURE_NODES_PER_CELL];
                    unit[i] = 1.0;
                    *d_i = apply_mass_cell(&level.quadrature, self.coefficient[cell], &unit)[i];
                }
                diagonal
            })
            .collect();
        let mut diagonal = DVector::zeros(level.n_pressure_dofs());
        scatter_pressure(level, &cell_diagonals, &mut (&mut diagonal).into());
        diagonal
    }
}

impl LinearOperator<f64> for MatrixFreeMassOperator {
    fn apply(&self, mut y: DVectorViewMut<f64>, x: DVectorView<f64>) -> Result<(), Box<dyn Error>> {
        let level = &*self.level;
        assert_eq!(x.len(), level.n_pressure_dofs());
        let src = x.as_slice();
        let cell_values: Vec<_> = (0..level.grid.n_cells())
            .into_par_iter()
            .map(|cell| {
                let p = gather_pressure(level, cell, src);
                apply_mass_cell(&level.quadrature, self.coefficient[cell], &p)
            })
            .collect();
        scatter_pressure(level, &cell_values, &mut y);
        Ok(())
    }
}

/// The saddle-point operator evaluated cell by cell.
#[derive(Debug, Clone)]
pub struct MatrixFreeStokesOperator {
    velocity: MatrixFreeVelocityOperator,
    coupling: MatrixFreeCouplingOperator,
    generation: u64,
}

impl MatrixFreeStokesOperator {
    pub fn new(level: Arc<LevelData>, coefficients: &CoefficientTable, pressure_scaling: f64) -> Self {
        let viscosity = coefficients.viscosity(level.level).clone();
        Self {
            velocity: MatrixFreeVelocityOperator::new(Arc::clone(&level), viscosity),
            coupling: MatrixFreeCouplingOperator::new(level, pressure_scaling),
            generation: coefficients.generation(),
        }
    }

    pub fn velocity_operator(&self) -> &MatrixFreeVelocityOperator {
        &self.velocity
    }
}

impl StokesBlockOperator for MatrixFreeStokesOperator {
    fn layout(&self) -> BlockLayout {
        self.velocity.level().layout()
    }

    fn generation(&self) -> u64 {
        self.generation
    }

    fn pressure_scaling(&self) -> f64 {
        self.coupling.pressure_scaling
    }

    fn constraints(&self) -> &VelocityConstraints {
        &self.velocity.level().constraints
    }

    fn apply_velocity(&self, dst: DVectorViewMut<f64>, src: DVectorView<f64>) {
        self.velocity.apply_block(dst, src);
    }

    fn apply_gradient(&self, dst: DVectorViewMut<f64>, src: DVectorView<f64>) {
        self.coupling.apply_gradient(dst, src);
    }

    fn apply_divergence(&self, dst: DVectorViewMut<f64>, src: DVectorView<f64>) {
        self.coupling.apply_divergence(dst, src, ConstrainedInput::Ignore);
    }

    fn apply_boundary_lift(&self, dst_u: DVectorViewMut<f64>, dst_p: DVectorViewMut<f64>, g: DVectorView<f64>) {
        let constrained = self.constraints().constrained_part(&g);
        self.velocity
            .apply_free_rows(dst_u, (&constrained).into(), ConstrainedInput::Use);
        self.coupling
            .apply_divergence(dst_p, (&constrained).into(), ConstrainedInput::Use);
    }
}
