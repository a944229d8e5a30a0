//! Per-cell viscosity tables on every level of the grid hierarchy.
use crate::discretization::{StokesDiscretization, UniformGrid};
use eyre::eyre;
use log::debug;
use nalgebra::{DVector, Point2};
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Supplies viscosities at points inside a cell of the active grid.
pub trait CoefficientModel: Sync {
    /// Writes the viscosity at each of `points` into `viscosity`.
    fn evaluate_viscosity(&self, cell: usize, points: &[Point2<f64>], viscosity: &mut [f64]);
}

/// A viscosity model given by a function of position.
#[derive(Debug, Clone)]
pub struct PointwiseViscosity<F>(pub F);

impl<F> CoefficientModel for PointwiseViscosity<F>
where
    F: Fn(&Point2<f64>) -> f64 + Sync,
{
    fn evaluate_viscosity(&self, _cell: usize, points: &[Point2<f64>], viscosity: &mut [f64]) {
        for (x, eta) in points.iter().zip(viscosity) {
            *eta = (self.0)(x);
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ConstantViscosity(pub f64);

impl CoefficientModel for ConstantViscosity {
    fn evaluate_viscosity(&self, _cell: usize, _points: &[Point2<f64>], viscosity: &mut [f64]) {
        viscosity.fill(self.0);
    }
}

/// How several positive values are collapsed into one representative value.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CellAveraging {
    #[default]
    Arithmetic,
    Harmonic,
    Geometric,
    PickLargest,
}

impl CellAveraging {
    /// # Panics
    ///
    /// Panics if `values` is empty.
    pub fn average(&self, values: &[f64]) -> f64 {
        assert!(!values.is_empty(), "Cannot average an empty set of values");
        let n = values.len() as f64;
        match self {
            CellAveraging::Arithmetic => values.iter().sum::<f64>() / n,
            CellAveraging::Harmonic => n / values.iter().map(|v| 1.0 / v).sum::<f64>(),
            CellAveraging::Geometric => (values.iter().map(|v| v.ln()).sum::<f64>() / n).exp(),
            CellAveraging::PickLargest => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

fn next_generation() -> u64 {
    NEXT_GENERATION.fetch_add(1, Ordering::Relaxed)
}

/// One viscosity value per cell on every level, tagged with a unique generation.
///
/// Operators and preconditioners built from a table record its generation, so that
/// objects built from different coefficient updates are never combined.
#[derive(Debug, Clone, PartialEq)]
pub struct CoefficientTable {
    generation: u64,
    averaging: CellAveraging,
    levels: Vec<DVector<f64>>,
}

impl CoefficientTable {
    /// Evaluates the model at the quadrature points of every active cell, averages per
    /// cell and restricts the cell values down the hierarchy.
    pub fn evaluate(
        discretization: &StokesDiscretization,
        model: &dyn CoefficientModel,
        averaging: CellAveraging,
    ) -> eyre::Result<Self> {
        let active = discretization.active();
        let cell_values = (0..active.grid.n_cells())
            .into_par_iter()
            .map(|cell| {
                let points = active.quadrature.quadrature_points(&active.grid, cell);
                let mut viscosity = [0.0; crate::discretization::element::QUADRATURE_POINTS_PER_CELL];
                model.evaluate_viscosity(cell, &points, &mut viscosity);
                match viscosity.iter().find(|eta| !(eta.is_finite() && **eta > 0.0)) {
                    Some(eta) => Err(eyre!("Invalid viscosity {} at a quadrature point of cell {}", eta, cell)),
                    None => Ok(averaging.average(&viscosity)),
                }
            })
            .collect::<eyre::Result<Vec<_>>>()?;

        Self::from_active_values(discretization, DVector::from_vec(cell_values), averaging)
    }

    /// Builds a table from already averaged viscosities on the active level.
    pub fn from_active_values(
        discretization: &StokesDiscretization,
        active_values: DVector<f64>,
        averaging: CellAveraging,
    ) -> eyre::Result<Self> {
        let hierarchy = discretization.hierarchy();
        let n_active_cells = hierarchy.active().n_cells();
        if active_values.len() != n_active_cells {
            return Err(eyre!(
                "Expected {} cell viscosities, got {}",
                n_active_cells,
                active_values.len()
            ));
        }
        if let Some((cell, eta)) = active_values
            .iter()
            .enumerate()
            .find(|(_, eta)| !(eta.is_finite() && **eta > 0.0))
        {
            return Err(eyre!("Invalid viscosity {} in cell {}", eta, cell));
        }

        let n_levels = hierarchy.n_levels();
        let mut levels = vec![active_values];
        for level in (0..n_levels - 1).rev() {
            let fine = &levels[levels.len() - 1];
            let coarse = restrict_cell_values(hierarchy.level(level), fine, averaging);
            levels.push(coarse);
        }
        levels.reverse();

        let generation = next_generation();
        debug!("Coefficient table generation {} on {} levels", generation, n_levels);
        Ok(Self {
            generation,
            averaging,
            levels,
        })
    }

    pub fn constant(discretization: &StokesDiscretization, viscosity: f64) -> eyre::Result<Self> {
        let n_cells = discretization.hierarchy().active().n_cells();
        Self::from_active_values(
            discretization,
            DVector::repeat(n_cells, viscosity),
            CellAveraging::Arithmetic,
        )
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn averaging(&self) -> CellAveraging {
        self.averaging
    }

    pub fn n_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn viscosity(&self, level: usize) -> &DVector<f64> {
        &self.levels[level]
    }

    pub fn active(&self) -> &DVector<f64> {
        &self.levels[self.levels.len() - 1]
    }
}

/// Averages the values of the four children of every cell of `coarse`.
pub fn restrict_cell_values(coarse: &UniformGrid, fine_values: &DVector<f64>, averaging: CellAveraging) -> DVector<f64> {
    assert_eq!(
        fine_values.len(),
        4 * coarse.n_cells(),
        "Fine values must belong to the refinement of the coarse grid"
    );
    DVector::from_fn(coarse.n_cells(), |cell, _| {
        let children = coarse.children(cell).map(|child| fine_values[child]);
        averaging.average(&children)
    })
}
