use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

/// A side of the rectangular domain.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
    Bottom,
    Top,
}

impl Side {
    pub const ALL: [Side; 4] = [Side::Left, Side::Right, Side::Bottom, Side::Top];

    /// The velocity component normal to this side.
    pub fn normal_component(&self) -> usize {
        match self {
            Side::Left | Side::Right => 0,
            Side::Bottom | Side::Top => 1,
        }
    }
}

/// An axis-aligned rectangle split into `nx × ny` equally sized cells.
///
/// Cells are numbered row by row starting at the bottom left. The grid carries two node
/// lattices: the `(2nx + 1) × (2ny + 1)` lattice of biquadratic velocity nodes, and the
/// `(nx + 1) × (ny + 1)` lattice of bilinear pressure nodes. Both are numbered row by row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniformGrid {
    origin: Point2<f64>,
    extents: Vector2<f64>,
    cells: [usize; 2],
}

impl UniformGrid {
    pub fn new(origin: Point2<f64>, extents: Vector2<f64>, cells_x: usize, cells_y: usize) -> Self {
        assert!(cells_x > 0 && cells_y > 0, "A grid needs at least one cell in each direction");
        assert!(
            extents.x > 0.0 && extents.y > 0.0,
            "Grid extents must be positive, got {:?}",
            extents
        );
        Self {
            origin,
            extents,
            cells: [cells_x, cells_y],
        }
    }

    pub fn unit_square(cells_per_dim: usize) -> Self {
        Self::new(Point2::origin(), Vector2::new(1.0, 1.0), cells_per_dim, cells_per_dim)
    }

    /// The grid obtained by splitting every cell into four.
    pub fn refined(&self) -> Self {
        Self::new(self.origin, self.extents, 2 * self.cells[0], 2 * self.cells[1])
    }

    pub fn origin(&self) -> &Point2<f64> {
        &self.origin
    }

    pub fn extents(&self) -> &Vector2<f64> {
        &self.extents
    }

    pub fn cells_per_dim(&self) -> [usize; 2] {
        self.cells
    }

    pub fn n_cells(&self) -> usize {
        self.cells[0] * self.cells[1]
    }

    pub fn cell_size(&self) -> Vector2<f64> {
        Vector2::new(
            self.extents.x / self.cells[0] as f64,
            self.extents.y / self.cells[1] as f64,
        )
    }

    pub fn area(&self) -> f64 {
        self.extents.x * self.extents.y
    }

    pub fn cell_index(&self, i: usize, j: usize) -> usize {
        debug_assert!(i < self.cells[0] && j < self.cells[1]);
        j * self.cells[0] + i
    }

    pub fn cell_coords(&self, cell: usize) -> (usize, usize) {
        (cell % self.cells[0], cell / self.cells[0])
    }

    /// The lower left corner of the cell.
    pub fn cell_origin(&self, cell: usize) -> Point2<f64> {
        let (i, j) = self.cell_coords(cell);
        let h = self.cell_size();
        self.origin + Vector2::new(i as f64 * h.x, j as f64 * h.y)
    }

    /// Maps reference coordinates in `[-1, 1]²` to physical coordinates in the cell.
    pub fn map_reference_coords(&self, cell: usize, xi: &Point2<f64>) -> Point2<f64> {
        let h = self.cell_size();
        let offset = Vector2::new(0.5 * (xi.x + 1.0) * h.x, 0.5 * (xi.y + 1.0) * h.y);
        self.cell_origin(cell) + offset
    }

    /// The four cells of the refined grid covering the given cell of this grid.
    pub fn children(&self, cell: usize) -> [usize; 4] {
        let (i, j) = self.cell_coords(cell);
        let fine_nx = 2 * self.cells[0];
        let fine = |di: usize, dj: usize| (2 * j + dj) * fine_nx + 2 * i + di;
        [fine(0, 0), fine(1, 0), fine(0, 1), fine(1, 1)]
    }

    pub fn velocity_nodes_per_dim(&self) -> [usize; 2] {
        [2 * self.cells[0] + 1, 2 * self.cells[1] + 1]
    }

    pub fn n_velocity_nodes(&self) -> usize {
        let [nx, ny] = self.velocity_nodes_per_dim();
        nx * ny
    }

    /// Two velocity degrees of freedom per node, interleaved.
    pub fn n_velocity_dofs(&self) -> usize {
        2 * self.n_velocity_nodes()
    }

    pub fn velocity_node_index(&self, ix: usize, iy: usize) -> usize {
        iy * self.velocity_nodes_per_dim()[0] + ix
    }

    pub fn velocity_node_coords(&self, node: usize) -> (usize, usize) {
        let nx = self.velocity_nodes_per_dim()[0];
        (node % nx, node / nx)
    }

    pub fn velocity_node_position(&self, node: usize) -> Point2<f64> {
        let (ix, iy) = self.velocity_node_coords(node);
        let h = self.cell_size();
        self.origin + Vector2::new(0.5 * ix as f64 * h.x, 0.5 * iy as f64 * h.y)
    }

    /// Global velocity node indices of a cell. Local node `3 * j + i` sits at
    /// reference coordinates `(i - 1, j - 1)`.
    pub fn cell_velocity_nodes(&self, cell: usize) -> [usize; 9] {
        let (ci, cj) = self.cell_coords(cell);
        let mut nodes = [0; 9];
        for j in 0..3 {
            for i in 0..3 {
                nodes[3 * j + i] = self.velocity_node_index(2 * ci + i, 2 * cj + j);
            }
        }
        nodes
    }

    pub fn pressure_nodes_per_dim(&self) -> [usize; 2] {
        [self.cells[0] + 1, self.cells[1] + 1]
    }

    pub fn n_pressure_nodes(&self) -> usize {
        let [nx, ny] = self.pressure_nodes_per_dim();
        nx * ny
    }

    pub fn pressure_node_index(&self, ix: usize, iy: usize) -> usize {
        iy * self.pressure_nodes_per_dim()[0] + ix
    }

    pub fn pressure_node_position(&self, node: usize) -> Point2<f64> {
        let nx = self.pressure_nodes_per_dim()[0];
        let (ix, iy) = (node % nx, node / nx);
        let h = self.cell_size();
        self.origin + Vector2::new(ix as f64 * h.x, iy as f64 * h.y)
    }

    /// Global pressure node indices of a cell. Local node `2 * j + i` sits at
    /// reference coordinates `(2i - 1, 2j - 1)`.
    pub fn cell_pressure_nodes(&self, cell: usize) -> [usize; 4] {
        let (ci, cj) = self.cell_coords(cell);
        [
            self.pressure_node_index(ci, cj),
            self.pressure_node_index(ci + 1, cj),
            self.pressure_node_index(ci, cj + 1),
            self.pressure_node_index(ci + 1, cj + 1),
        ]
    }

    /// Velocity nodes lying on the given side, in increasing order.
    pub fn velocity_nodes_on_side(&self, side: Side) -> Vec<usize> {
        let [nx, ny] = self.velocity_nodes_per_dim();
        match side {
            Side::Left => (0..ny).map(|iy| self.velocity_node_index(0, iy)).collect(),
            Side::Right => (0..ny).map(|iy| self.velocity_node_index(nx - 1, iy)).collect(),
            Side::Bottom => (0..nx).map(|ix| self.velocity_node_index(ix, 0)).collect(),
            Side::Top => (0..nx).map(|ix| self.velocity_node_index(ix, ny - 1)).collect(),
        }
    }
}

/// A sequence of uniformly refined grids. Level 0 is the coarsest grid and the last
/// level is the active grid on which the solution lives.
#[derive(Debug, Clone, PartialEq)]
pub struct GridHierarchy {
    levels: Vec<UniformGrid>,
}

impl GridHierarchy {
    pub fn new(coarse: UniformGrid, n_levels: usize) -> Self {
        assert!(n_levels > 0, "A grid hierarchy needs at least one level");
        let mut levels = vec![coarse];
        while levels.len() < n_levels {
            let next = levels[levels.len() - 1].refined();
            levels.push(next);
        }
        Self { levels }
    }

    pub fn n_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, level: usize) -> &UniformGrid {
        &self.levels[level]
    }

    pub fn active(&self) -> &UniformGrid {
        &self.levels[self.levels.len() - 1]
    }

    pub fn iter(&self) -> impl Iterator<Item = &UniformGrid> {
        self.levels.iter()
    }
}
