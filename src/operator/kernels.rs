//! Cell-level evaluation of the Stokes bilinear forms.
//!
//! Local velocity dof `2 * a + c` is component `c` of local velocity node `a`, local
//! pressure dof `b` is local pressure node `b`.
use crate::discretization::element::{PRESSURE_NODES_PER_CELL, VELOCITY_DOFS_PER_CELL, VELOCITY_NODES_PER_CELL};
use crate::discretization::CellQuadrature;
use itertools::izip;
use nalgebra::{Matrix2, SMatrix, Vector2};

pub type VelocityCellVector = [f64; VELOCITY_DOFS_PER_CELL];
pub type PressureCellVector = [f64; PRESSURE_NODES_PER_CELL];

fn velocity_gradient(u: &VelocityCellVector, gradients: &[Vector2<f64>; VELOCITY_NODES_PER_CELL]) -> Matrix2<f64> {
    // grad u = sum_a u_a ⊗ grad phi_a
    let mut grad_u = Matrix2::zeros();
    for (a, grad_phi) in gradients.iter().enumerate() {
        let u_a = Vector2::new(u[2 * a], u[2 * a + 1]);
        grad_u += u_a * grad_phi.transpose();
    }
    grad_u
}

fn pressure_value(p: &PressureCellVector, values: &[f64; PRESSURE_NODES_PER_CELL]) -> f64 {
    p.iter().zip(values).map(|(p_b, psi_b)| p_b * psi_b).sum()
}

/// `∫ 2η ε(u) : ε(v)` for all local test functions `v`.
pub fn apply_viscous_cell(quadrature: &CellQuadrature, viscosity: f64, u: &VelocityCellVector) -> VelocityCellVector {
    let mut out = [0.0; VELOCITY_DOFS_PER_CELL];
    for (jxw, gradients) in izip!(&quadrature.jxw, &quadrature.velocity_gradients) {
        let grad_u = velocity_gradient(u, gradients);
        let eps = 0.5 * (grad_u + grad_u.transpose());
        // ε(u) : ε(v) = ε(u) : grad v since ε(u) is symmetric
        let sigma = 2.0 * viscosity * jxw * eps;
        for (a, grad_phi) in gradients.iter().enumerate() {
            let contribution = sigma * grad_phi;
            out[2 * a] += contribution.x;
            out[2 * a + 1] += contribution.y;
        }
    }
    out
}

/// `-ps ∫ p div v` for all local velocity test functions `v`.
pub fn apply_gradient_cell(quadrature: &CellQuadrature, pressure_scaling: f64, p: &PressureCellVector) -> VelocityCellVector {
    let mut out = [0.0; VELOCITY_DOFS_PER_CELL];
    for (jxw, gradients, psi) in izip!(&quadrature.jxw, &quadrature.velocity_gradients, &quadrature.pressure_values) {
        let weight = -pressure_scaling * jxw * pressure_value(p, psi);
        for (a, grad_phi) in gradients.iter().enumerate() {
            out[2 * a] += weight * grad_phi.x;
            out[2 * a + 1] += weight * grad_phi.y;
        }
    }
    out
}

/// `-ps ∫ q div u` for all local pressure test functions `q`.
pub fn apply_divergence_cell(quadrature: &CellQuadrature, pressure_scaling: f64, u: &VelocityCellVector) -> PressureCellVector {
    let mut out = [0.0; PRESSURE_NODES_PER_CELL];
    for (jxw, gradients, psi) in izip!(&quadrature.jxw, &quadrature.velocity_gradients, &quadrature.pressure_values) {
        let div_u: f64 = gradients
            .iter()
            .enumerate()
            .map(|(a, grad_phi)| u[2 * a] * grad_phi.x + u[2 * a + 1] * grad_phi.y)
            .sum();
        let weight = -pressure_scaling * jxw * div_u;
        for (out_b, psi_b) in out.iter_mut().zip(psi) {
            *out_b += weight * psi_b;
        }
    }
    out
}

/// `∫ k p q` for all local pressure test functions `q`, with a constant cell coefficient `k`.
pub fn apply_mass_cell(quadrature: &CellQuadrature, coefficient: f64, p: &PressureCellVector) -> PressureCellVector {
    let mut out = [0.0; PRESSURE_NODES_PER_CELL];
    for (jxw, psi) in izip!(&quadrature.jxw, &quadrature.pressure_values) {
        let weight = coefficient * jxw * pressure_value(p, psi);
        for (out_b, psi_b) in out.iter_mut().zip(psi) {
            *out_b += weight * psi_b;
        }
    }
    out
}

/// The matrix of a linear cell kernel, obtained by applying it to unit vectors.
pub fn cell_matrix<const R: usize, const C: usize>(kernel: impl Fn(&[f64; C]) -> [f64; R]) -> SMatrix<f64, R, C> {
    let mut matrix = SMatrix::<f64, R, C>::zeros();
    for j in 0..C {
        let mut unit = [0.0; C];
        unit[j] = 1.0;
        let column = kernel(&unit);
        for (i, value) in column.iter().enumerate() {
            matrix[(i, j)] = *value;
        }
    }
    matrix
}
