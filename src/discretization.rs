//! A minimal Taylor–Hood discretization on a hierarchy of uniform rectangular grids.
//!
//! This provides the degree-of-freedom numbering, quadrature data and boundary constraints
//! consumed by the operators, multigrid hierarchy and normalizer.
use crate::layout::BlockLayout;
use itertools::izip;
use nalgebra::{DVector, Point2, Vector2};
use std::sync::Arc;

pub mod constraints;
pub mod element;
pub mod grid;

pub use constraints::{BoundaryConditions, BoundaryKind, VelocityConstraints};
pub use element::CellQuadrature;
pub use grid::{GridHierarchy, Side, UniformGrid};

/// Everything the operators need to know about one grid level.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelData {
    pub level: usize,
    pub grid: UniformGrid,
    pub quadrature: CellQuadrature,
    pub constraints: VelocityConstraints,
}

impl LevelData {
    pub fn n_velocity_dofs(&self) -> usize {
        self.grid.n_velocity_dofs()
    }

    pub fn n_pressure_dofs(&self) -> usize {
        self.grid.n_pressure_nodes()
    }

    pub fn layout(&self) -> BlockLayout {
        BlockLayout::new(self.n_velocity_dofs(), self.n_pressure_dofs())
    }

    /// Global velocity degrees of freedom of a cell. Local dof `2 * a + c` is component `c`
    /// of local node `a`.
    pub fn cell_velocity_dofs(&self, cell: usize) -> [usize; element::VELOCITY_DOFS_PER_CELL] {
        let nodes = self.grid.cell_velocity_nodes(cell);
        let mut dofs = [0; element::VELOCITY_DOFS_PER_CELL];
        for (a, node) in nodes.iter().enumerate() {
            dofs[2 * a] = 2 * node;
            dofs[2 * a + 1] = 2 * node + 1;
        }
        dofs
    }

    pub fn cell_pressure_dofs(&self, cell: usize) -> [usize; element::PRESSURE_NODES_PER_CELL] {
        self.grid.cell_pressure_nodes(cell)
    }
}

#[derive(Debug, Clone)]
pub struct StokesDiscretization {
    hierarchy: GridHierarchy,
    boundary: BoundaryConditions,
    levels: Vec<Arc<LevelData>>,
    pressure_volume_weights: DVector<f64>,
    pressure_surface_weights: DVector<f64>,
}

impl StokesDiscretization {
    pub fn new(coarse: UniformGrid, n_levels: usize, boundary: BoundaryConditions) -> Self {
        let hierarchy = GridHierarchy::new(coarse, n_levels);
        let levels: Vec<_> = hierarchy
            .iter()
            .enumerate()
            .map(|(level, grid)| {
                Arc::new(LevelData {
                    level,
                    grid: grid.clone(),
                    quadrature: CellQuadrature::for_grid(grid),
                    constraints: VelocityConstraints::from_boundary(grid, &boundary),
                })
            })
            .collect();

        let active = &levels[levels.len() - 1];
        let pressure_volume_weights = compute_pressure_volume_weights(active);
        let pressure_surface_weights = compute_pressure_surface_weights(&active.grid);

        Self {
            hierarchy,
            boundary,
            levels,
            pressure_volume_weights,
            pressure_surface_weights,
        }
    }

    pub fn hierarchy(&self) -> &GridHierarchy {
        &self.hierarchy
    }

    pub fn boundary_conditions(&self) -> &BoundaryConditions {
        &self.boundary
    }

    pub fn n_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, level: usize) -> &Arc<LevelData> {
        &self.levels[level]
    }

    pub fn active_level(&self) -> usize {
        self.levels.len() - 1
    }

    pub fn active(&self) -> &Arc<LevelData> {
        &self.levels[self.active_level()]
    }

    pub fn layout(&self) -> BlockLayout {
        self.active().layout()
    }

    /// `∫ ψ_b` over the domain for every pressure basis function `ψ_b`.
    pub fn pressure_volume_weights(&self) -> &DVector<f64> {
        &self.pressure_volume_weights
    }

    /// `∫ ψ_b` over the top side of the domain for every pressure basis function `ψ_b`.
    pub fn pressure_surface_weights(&self) -> &DVector<f64> {
        &self.pressure_surface_weights
    }

    /// Nodal interpolation of a velocity field on the active level.
    pub fn interpolate_velocity(&self, u: impl Fn(&Point2<f64>) -> Vector2<f64>) -> DVector<f64> {
        let grid = &self.active().grid;
        let mut values = DVector::zeros(grid.n_velocity_dofs());
        for node in 0..grid.n_velocity_nodes() {
            let u_node = u(&grid.velocity_node_position(node));
            values[2 * node] = u_node.x;
            values[2 * node + 1] = u_node.y;
        }
        values
    }

    /// Nodal interpolation of a pressure field on the active level.
    pub fn interpolate_pressure(&self, p: impl Fn(&Point2<f64>) -> f64) -> DVector<f64> {
        let grid = &self.active().grid;
        DVector::from_fn(grid.n_pressure_nodes(), |node, _| p(&grid.pressure_node_position(node)))
    }

    /// Interpolated boundary values: the constrained entries of the interpolant, zero elsewhere.
    pub fn boundary_values(&self, u: impl Fn(&Point2<f64>) -> Vector2<f64>) -> DVector<f64> {
        let values = self.interpolate_velocity(u);
        self.active().constraints.constrained_part(&values)
    }

    /// Load vector `∫ f · v` of a body force on the active level.
    pub fn assemble_body_force(&self, f: impl Fn(&Point2<f64>) -> Vector2<f64>) -> DVector<f64> {
        let level = self.active();
        let quadrature = &level.quadrature;
        let mut load = DVector::zeros(level.n_velocity_dofs());
        for cell in 0..level.grid.n_cells() {
            let points = quadrature.quadrature_points(&level.grid, cell);
            let dofs = level.cell_velocity_dofs(cell);
            for (x, jxw, phi) in izip!(&points, &quadrature.jxw, &quadrature.velocity_values) {
                let f_x = f(x);
                for (a, phi_a) in phi.iter().enumerate() {
                    load[dofs[2 * a]] += jxw * phi_a * f_x.x;
                    load[dofs[2 * a + 1]] += jxw * phi_a * f_x.y;
                }
            }
        }
        load
    }
}

fn compute_pressure_volume_weights(level: &LevelData) -> DVector<f64> {
    let quadrature = &level.quadrature;
    let mut weights = DVector::zeros(level.n_pressure_dofs());
    for cell in 0..level.grid.n_cells() {
        let dofs = level.cell_pressure_dofs(cell);
        for (jxw, psi) in izip!(&quadrature.jxw, &quadrature.pressure_values) {
            for (b, psi_b) in psi.iter().enumerate() {
                weights[dofs[b]] += jxw * psi_b;
            }
        }
    }
    weights
}

fn compute_pressure_surface_weights(grid: &UniformGrid) -> DVector<f64> {
    let mut weights = DVector::zeros(grid.n_pressure_nodes());
    let [nx, ny] = grid.pressure_nodes_per_dim();
    let hx = grid.cell_size().x;
    // Bilinear functions restricted to the top side are 1D hat functions
    for i in 0..nx - 1 {
        weights[grid.pressure_node_index(i, ny - 1)] += 0.5 * hx;
        weights[grid.pressure_node_index(i + 1, ny - 1)] += 0.5 * hx;
    }
    weights
}
