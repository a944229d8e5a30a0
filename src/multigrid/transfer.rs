//! Prolongation and restriction of Q2 velocity fields between consecutive levels.
use crate::discretization::element::q2_phi_1d;
use crate::discretization::LevelData;
use nalgebra::{DVector, DVectorView, DVectorViewMut};
use nalgebra_sparse::ops::serial::spmm_csr_dense;
use nalgebra_sparse::ops::Op;
use nalgebra_sparse::{CooMatrix, CsrMatrix};

const WEIGHT_TOLERANCE: f64 = 1e-12;

/// Weights `(coarse node, weight)` expressing fine node `k` of a 1D Q2 mesh in terms of the
/// nodes of the coarse mesh it refines.
fn prolongation_weights_1d(k: usize) -> Vec<(usize, f64)> {
    if k % 2 == 0 {
        // Coincides with a coarse node
        return vec![(k / 2, 1.0)];
    }
    let c = k / 4;
    let m = k % 4;
    let xi = -1.0 + 0.5 * m as f64;
    [-1.0, 0.0, 1.0]
        .iter()
        .enumerate()
        .map(|(local, &alpha)| (2 * c + local, q2_phi_1d(alpha, xi)))
        .filter(|(_, w)| w.abs() >= WEIGHT_TOLERANCE)
        .collect()
}

/// The transfer between level `ℓ` (coarse) and `ℓ + 1` (fine).
///
/// Prolongation interpolates the coarse Q2 field at the fine nodes, restriction is its
/// transpose. Rows of constrained fine dofs and columns of constrained coarse dofs are left
/// out, so that transferred corrections never touch constrained entries.
#[derive(Debug, Clone)]
pub struct Transfer {
    prolongation: CsrMatrix<f64>,
    restriction: CsrMatrix<f64>,
}

impl Transfer {
    pub fn new(coarse: &LevelData, fine: &LevelData) -> Self {
        assert_eq!(fine.level, coarse.level + 1, "Transfer needs consecutive levels");
        let [coarse_nx, coarse_ny] = coarse.grid.velocity_nodes_per_dim();
        let [fine_nx, fine_ny] = fine.grid.velocity_nodes_per_dim();
        assert_eq!(fine_nx, 2 * coarse_nx - 1, "Fine grid must refine the coarse grid");
        assert_eq!(fine_ny, 2 * coarse_ny - 1, "Fine grid must refine the coarse grid");

        let weights_x: Vec<_> = (0..fine_nx).map(prolongation_weights_1d).collect();
        let weights_y: Vec<_> = (0..fine_ny).map(prolongation_weights_1d).collect();

        let mut coo = CooMatrix::new(fine.n_velocity_dofs(), coarse.n_velocity_dofs());
        for ky in 0..fine_ny {
            for kx in 0..fine_nx {
                let fine_node = fine.grid.velocity_node_index(kx, ky);
                for &(cy, wy) in &weights_y[ky] {
                    for &(cx, wx) in &weights_x[kx] {
                        let w = wx * wy;
                        if w.abs() < WEIGHT_TOLERANCE {
                            continue;
                        }
                        let coarse_node = coarse.grid.velocity_node_index(cx, cy);
                        for component in 0..2 {
                            let row = 2 * fine_node + component;
                            let col = 2 * coarse_node + component;
                            if !fine.constraints.is_constrained(row) && !coarse.constraints.is_constrained(col) {
                                coo.push(row, col, w);
                            }
                        }
                    }
                }
            }
        }

        let prolongation = CsrMatrix::from(&coo);
        let restriction = prolongation.transpose();
        Self {
            prolongation,
            restriction,
        }
    }

    pub fn n_fine(&self) -> usize {
        self.prolongation.nrows()
    }

    pub fn n_coarse(&self) -> usize {
        self.prolongation.ncols()
    }

    pub fn prolongation(&self) -> &CsrMatrix<f64> {
        &self.prolongation
    }

    /// `fine += P coarse`
    pub fn prolongate_add(&self, mut fine: DVectorViewMut<f64>, coarse: DVectorView<f64>) {
        spmm_csr_dense(1.0, &mut fine, 1.0, Op::NoOp(&self.prolongation), Op::NoOp(&coarse));
    }

    /// `coarse = Pᵀ fine`
    pub fn restrict(&self, fine: DVectorView<f64>) -> DVector<f64> {
        let mut coarse = DVector::zeros(self.n_coarse());
        spmm_csr_dense(0.0, &mut coarse, 1.0, Op::NoOp(&self.restriction), Op::NoOp(&fine));
        coarse
    }
}
