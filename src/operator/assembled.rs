//! Sparse assembly of the Stokes blocks on one level.
use super::kernels::{apply_gradient_cell, apply_mass_cell, apply_viscous_cell, cell_matrix};
use super::StokesBlockOperator;
use crate::coefficients::CoefficientTable;
use crate::discretization::element::{PRESSURE_NODES_PER_CELL, VELOCITY_DOFS_PER_CELL};
use crate::discretization::{LevelData, VelocityConstraints};
use crate::layout::BlockLayout;
use nalgebra::{DVector, DVectorView, DVectorViewMut, SMatrix};
use nalgebra_sparse::ops::serial::spmm_csr_dense;
use nalgebra_sparse::ops::Op;
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use std::sync::Arc;

/// Which entries of a cell matrix enter the global matrix.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Columns {
    /// Only columns of unconstrained velocity dofs.
    Free,
    /// Only columns of constrained velocity dofs.
    Constrained,
}

fn keep_velocity_column(level: &LevelData, dof: usize, columns: Columns) -> bool {
    match columns {
        Columns::Free => !level.constraints.is_constrained(dof),
        Columns::Constrained => level.constraints.is_constrained(dof),
    }
}

fn merge(mut a: CooMatrix<f64>, b: CooMatrix<f64>) -> CooMatrix<f64> {
    for (i, j, v) in b.triplet_iter() {
        a.push(i, j, *v);
    }
    a
}

/// Assembles `Σ_cells scale(cell) * local` over all cells, skipping entries rejected by `keep`.
fn assemble_cells<const R: usize, const C: usize>(
    level: &LevelData,
    (n_rows, n_cols): (usize, usize),
    local: &SMatrix<f64, R, C>,
    scale: impl Fn(usize) -> f64 + Sync,
    row_dofs: impl Fn(usize) -> [usize; R] + Sync,
    col_dofs: impl Fn(usize) -> [usize; C] + Sync,
    keep: impl Fn(usize, usize) -> bool + Sync,
) -> CsrMatrix<f64> {
    let coo = (0..level.grid.n_cells())
        .into_par_iter()
        .fold(
            || CooMatrix::new(n_rows, n_cols),
            |mut coo, cell| {
                let s = scale(cell);
                let rows = row_dofs(cell);
                let cols = col_dofs(cell);
                for (i, &row) in rows.iter().enumerate() {
                    for (j, &col) in cols.iter().enumerate() {
                        let value = s * local[(i, j)];
                        if value != 0.0 && keep(row, col) {
                            coo.push(row, col, value);
                        }
                    }
                }
                coo
            },
        )
        .reduce(|| CooMatrix::new(n_rows, n_cols), merge);
    CsrMatrix::from(&coo)
}

fn reference_viscous_matrix(level: &LevelData) -> SMatrix<f64, VELOCITY_DOFS_PER_CELL, VELOCITY_DOFS_PER_CELL> {
    // All cells of a level share their geometry, so the cell matrix is linear in the viscosity
    cell_matrix(|u| apply_viscous_cell(&level.quadrature, 1.0, u))
}

fn reference_gradient_matrix(level: &LevelData) -> SMatrix<f64, VELOCITY_DOFS_PER_CELL, PRESSURE_NODES_PER_CELL> {
    cell_matrix(|p| apply_gradient_cell(&level.quadrature, 1.0, p))
}

fn velocity_block(level: &LevelData, viscosity: &DVector<f64>, columns: Columns) -> CsrMatrix<f64> {
    let n = level.n_velocity_dofs();
    let local = reference_viscous_matrix(level);
    assemble_cells(
        level,
        (n, n),
        &local,
        |cell| viscosity[cell],
        |cell| level.cell_velocity_dofs(cell),
        |cell| level.cell_velocity_dofs(cell),
        |row, col| !level.constraints.is_constrained(row) && keep_velocity_column(level, col, columns),
    )
}

/// The velocity block with identity rows and columns for constrained dofs.
pub fn assemble_velocity_matrix(level: &LevelData, viscosity: &DVector<f64>) -> CsrMatrix<f64> {
    assert_eq!(viscosity.len(), level.grid.n_cells(), "Need one viscosity per cell");
    let free = velocity_block(level, viscosity, Columns::Free);
    let mut identity = CooMatrix::new(free.nrows(), free.ncols());
    for dof in level.constraints.constrained_dofs() {
        identity.push(dof, dof, 1.0);
    }
    &free + &CsrMatrix::from(&identity)
}

/// Couples constrained velocity values into the free velocity rows.
pub fn assemble_velocity_lift_matrix(level: &LevelData, viscosity: &DVector<f64>) -> CsrMatrix<f64> {
    velocity_block(level, viscosity, Columns::Constrained)
}

fn gradient_block(level: &LevelData, pressure_scaling: f64) -> CsrMatrix<f64> {
    let local = reference_gradient_matrix(level);
    assemble_cells(
        level,
        (level.n_velocity_dofs(), level.n_pressure_dofs()),
        &local,
        |_| pressure_scaling,
        |cell| level.cell_velocity_dofs(cell),
        |cell| level.cell_pressure_dofs(cell),
        |_, _| true,
    )
}

/// `Bᵀ` with the rows of constrained velocity dofs removed.
pub fn assemble_gradient_matrix(level: &LevelData, pressure_scaling: f64) -> CsrMatrix<f64> {
    let full = gradient_block(level, pressure_scaling);
    filter_rows(&full, |row| !level.constraints.is_constrained(row))
}

/// `B` restricted to the columns of constrained velocity dofs.
pub fn assemble_divergence_lift_matrix(level: &LevelData, pressure_scaling: f64) -> CsrMatrix<f64> {
    let full = gradient_block(level, pressure_scaling);
    filter_rows(&full, |row| level.constraints.is_constrained(row)).transpose()
}

/// The pressure mass matrix `∫ k p q` with a per-cell coefficient `k`.
pub fn assemble_mass_matrix(level: &LevelData, coefficient: &DVector<f64>) -> CsrMatrix<f64> {
    assert_eq!(coefficient.len(), level.grid.n_cells(), "Need one coefficient per cell");
    let n = level.n_pressure_dofs();
    let local: SMatrix<f64, PRESSURE_NODES_PER_CELL, PRESSURE_NODES_PER_CELL> =
        cell_matrix(|p| apply_mass_cell(&level.quadrature, 1.0, p));
    assemble_cells(
        level,
        (n, n),
        &local,
        |cell| coefficient[cell],
        |cell| level.cell_pressure_dofs(cell),
        |cell| level.cell_pressure_dofs(cell),
        |_, _| true,
    )
}

fn filter_rows(matrix: &CsrMatrix<f64>, keep_row: impl Fn(usize) -> bool) -> CsrMatrix<f64> {
    let mut coo = CooMatrix::new(matrix.nrows(), matrix.ncols());
    for (i, j, v) in matrix.triplet_iter() {
        if keep_row(i) {
            coo.push(i, j, *v);
        }
    }
    CsrMatrix::from(&coo)
}

/// The diagonal of a square CSR matrix, with zeros for missing entries.
pub fn csr_diagonal(matrix: &CsrMatrix<f64>) -> DVector<f64> {
    assert_eq!(matrix.nrows(), matrix.ncols(), "Matrix must be square");
    let mut diagonal = DVector::zeros(matrix.nrows());
    for (i, j, v) in matrix.triplet_iter() {
        if i == j {
            diagonal[i] += *v;
        }
    }
    diagonal
}

/// The saddle-point operator stored as sparse matrices.
#[derive(Debug, Clone)]
pub struct AssembledStokesOperator {
    level: Arc<LevelData>,
    velocity: CsrMatrix<f64>,
    velocity_lift: CsrMatrix<f64>,
    gradient: CsrMatrix<f64>,
    divergence: CsrMatrix<f64>,
    divergence_lift: CsrMatrix<f64>,
    pressure_scaling: f64,
    generation: u64,
}

impl AssembledStokesOperator {
    pub fn new(level: Arc<LevelData>, coefficients: &CoefficientTable, pressure_scaling: f64) -> Self {
        let viscosity = coefficients.viscosity(level.level);
        let gradient = assemble_gradient_matrix(&level, pressure_scaling);
        let divergence = gradient.transpose();
        Self {
            velocity: assemble_velocity_matrix(&level, viscosity),
            velocity_lift: assemble_velocity_lift_matrix(&level, viscosity),
            divergence_lift: assemble_divergence_lift_matrix(&level, pressure_scaling),
            gradient,
            divergence,
            level,
            pressure_scaling,
            generation: coefficients.generation(),
        }
    }

    pub fn velocity_matrix(&self) -> &CsrMatrix<f64> {
        &self.velocity
    }

    pub fn gradient_matrix(&self) -> &CsrMatrix<f64> {
        &self.gradient
    }

    pub fn divergence_matrix(&self) -> &CsrMatrix<f64> {
        &self.divergence
    }
}

fn csr_apply(matrix: &CsrMatrix<f64>, mut y: DVectorViewMut<f64>, x: DVectorView<f64>) {
    spmm_csr_dense(0.0, &mut y, 1.0, Op::NoOp(matrix), Op::NoOp(&x));
}

impl StokesBlockOperator for AssembledStokesOperator {
    fn layout(&self) -> BlockLayout {
        self.level.layout()
    }

    fn generation(&self) -> u64 {
        self.generation
    }

    fn pressure_scaling(&self) -> f64 {
        self.pressure_scaling
    }

    fn constraints(&self) -> &VelocityConstraints {
        &self.level.constraints
    }

    fn apply_velocity(&self, dst: DVectorViewMut<f64>, src: DVectorView<f64>) {
        csr_apply(&self.velocity, dst, src);
    }

    fn apply_gradient(&self, dst: DVectorViewMut<f64>, src: DVectorView<f64>) {
        csr_apply(&self.gradient, dst, src);
    }

    fn apply_divergence(&self, dst: DVectorViewMut<f64>, src: DVectorView<f64>) {
        csr_apply(&self.divergence, dst, src);
    }

    fn apply_boundary_lift(&self, dst_u: DVectorViewMut<f64>, dst_p: DVectorViewMut<f64>, g: DVectorView<f64>) {
        csr_apply(&self.velocity_lift, dst_u, g);
        csr_apply(&self.divergence_lift, dst_p, g);
    }
}
