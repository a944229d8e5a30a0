//! Taylor–Hood (Q2 velocity, Q1 pressure) reference element and per-level quadrature data.
use super::grid::UniformGrid;
use nalgebra::{Point2, Vector2};

pub const VELOCITY_NODES_PER_CELL: usize = 9;
pub const VELOCITY_DOFS_PER_CELL: usize = 2 * VELOCITY_NODES_PER_CELL;
pub const PRESSURE_NODES_PER_CELL: usize = 4;
pub const QUADRATURE_POINTS_PER_CELL: usize = 9;

/// Quadratic Lagrange basis function on `{-1, 0, 1}` that is one at `alpha`.
pub(crate) fn q2_phi_1d(alpha: f64, xi: f64) -> f64 {
    let alpha2 = alpha * alpha;
    let a = 1.5 * alpha2 - 1.0;
    let b = alpha / 2.0;
    let c = 1.0 - alpha2;
    a * xi * xi + b * xi + c
}

fn q2_phi_grad_1d(alpha: f64, xi: f64) -> f64 {
    let alpha2 = alpha * alpha;
    let a = 1.5 * alpha2 - 1.0;
    let b = alpha / 2.0;
    2.0 * a * xi + b
}

/// Linear Lagrange basis function on `{-1, 1}` that is one at `alpha`.
fn q1_phi_1d(alpha: f64, xi: f64) -> f64 {
    0.5 * (1.0 + alpha * xi)
}

/// 3-point Gauss rule tensorized on `[-1, 1]²`. Point `3 * j + i` combines the 1D points
/// `i` and `j`.
pub fn gauss_3x3() -> ([Point2<f64>; QUADRATURE_POINTS_PER_CELL], [f64; QUADRATURE_POINTS_PER_CELL]) {
    let s = (3.0f64 / 5.0).sqrt();
    let points_1d = [-s, 0.0, s];
    let weights_1d = [5.0 / 9.0, 8.0 / 9.0, 5.0 / 9.0];

    let mut points = [Point2::origin(); QUADRATURE_POINTS_PER_CELL];
    let mut weights = [0.0; QUADRATURE_POINTS_PER_CELL];
    for j in 0..3 {
        for i in 0..3 {
            points[3 * j + i] = Point2::new(points_1d[i], points_1d[j]);
            weights[3 * j + i] = weights_1d[i] * weights_1d[j];
        }
    }
    (points, weights)
}

/// Reference coordinate of local velocity node `a` along each axis.
fn velocity_node_alpha(a: usize) -> (f64, f64) {
    ((a % 3) as f64 - 1.0, (a / 3) as f64 - 1.0)
}

/// Reference coordinate of local pressure node `b` along each axis.
fn pressure_node_alpha(b: usize) -> (f64, f64) {
    (2.0 * (b % 2) as f64 - 1.0, 2.0 * (b / 2) as f64 - 1.0)
}

pub fn velocity_basis(xi: &Point2<f64>) -> [f64; VELOCITY_NODES_PER_CELL] {
    let mut phi = [0.0; VELOCITY_NODES_PER_CELL];
    for (a, phi_a) in phi.iter_mut().enumerate() {
        let (alpha, beta) = velocity_node_alpha(a);
        *phi_a = q2_phi_1d(alpha, xi.x) * q2_phi_1d(beta, xi.y);
    }
    phi
}

pub fn velocity_basis_gradients(xi: &Point2<f64>) -> [Vector2<f64>; VELOCITY_NODES_PER_CELL] {
    let mut grads = [Vector2::zeros(); VELOCITY_NODES_PER_CELL];
    for (a, grad_a) in grads.iter_mut().enumerate() {
        let (alpha, beta) = velocity_node_alpha(a);
        *grad_a = Vector2::new(
            q2_phi_grad_1d(alpha, xi.x) * q2_phi_1d(beta, xi.y),
            q2_phi_1d(alpha, xi.x) * q2_phi_grad_1d(beta, xi.y),
        );
    }
    grads
}

pub fn pressure_basis(xi: &Point2<f64>) -> [f64; PRESSURE_NODES_PER_CELL] {
    let mut psi = [0.0; PRESSURE_NODES_PER_CELL];
    for (b, psi_b) in psi.iter_mut().enumerate() {
        let (alpha, beta) = pressure_node_alpha(b);
        *psi_b = q1_phi_1d(alpha, xi.x) * q1_phi_1d(beta, xi.y);
    }
    psi
}

/// Basis values and physical gradients at the Gauss points of one grid level.
///
/// All cells of a uniform grid are translates of each other, so a single table serves
/// every cell of the level.
#[derive(Debug, Clone, PartialEq)]
pub struct CellQuadrature {
    pub reference_points: [Point2<f64>; QUADRATURE_POINTS_PER_CELL],
    /// Quadrature weight times Jacobian determinant.
    pub jxw: [f64; QUADRATURE_POINTS_PER_CELL],
    /// `velocity_values[q][a]`
    pub velocity_values: [[f64; VELOCITY_NODES_PER_CELL]; QUADRATURE_POINTS_PER_CELL],
    /// `velocity_gradients[q][a]`, with respect to physical coordinates.
    pub velocity_gradients: [[Vector2<f64>; VELOCITY_NODES_PER_CELL]; QUADRATURE_POINTS_PER_CELL],
    /// `pressure_values[q][b]`
    pub pressure_values: [[f64; PRESSURE_NODES_PER_CELL]; QUADRATURE_POINTS_PER_CELL],
}

impl CellQuadrature {
    pub fn for_grid(grid: &UniformGrid) -> Self {
        let (points, weights) = gauss_3x3();
        let h = grid.cell_size();
        // The reference map is x = x_0 + (xi + 1) h / 2
        let jacobian_det = 0.25 * h.x * h.y;
        let inverse_jacobian = Vector2::new(2.0 / h.x, 2.0 / h.y);

        let mut jxw = [0.0; QUADRATURE_POINTS_PER_CELL];
        let mut velocity_values = [[0.0; VELOCITY_NODES_PER_CELL]; QUADRATURE_POINTS_PER_CELL];
        let mut velocity_gradients = [[Vector2::zeros(); VELOCITY_NODES_PER_CELL]; QUADRATURE_POINTS_PER_CELL];
        let mut pressure_values = [[0.0; PRESSURE_NODES_PER_CELL]; QUADRATURE_POINTS_PER_CELL];

        for (q, xi) in points.iter().enumerate() {
            jxw[q] = weights[q] * jacobian_det;
            velocity_values[q] = velocity_basis(xi);
            let reference_gradients = velocity_basis_gradients(xi);
            for a in 0..VELOCITY_NODES_PER_CELL {
                velocity_gradients[q][a] = reference_gradients[a].component_mul(&inverse_jacobian);
            }
            pressure_values[q] = pressure_basis(xi);
        }

        Self {
            reference_points: points,
            jxw,
            velocity_values,
            velocity_gradients,
            pressure_values,
        }
    }

    /// Physical coordinates of the quadrature points of a cell.
    pub fn quadrature_points(&self, grid: &UniformGrid, cell: usize) -> [Point2<f64>; QUADRATURE_POINTS_PER_CELL] {
        self.reference_points
            .map(|xi| grid.map_reference_coords(cell, &xi))
    }
}
