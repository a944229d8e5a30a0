//! Removal of nullspace components and pressure gauge fixing after a solve.
use crate::discretization::StokesDiscretization;
use crate::layout::BlockVector;
use log::debug;
use nalgebra::storage::StorageMut;
use nalgebra::{DVector, Dyn, Matrix, Point2, U1};
use serde::{Deserialize, Serialize};

/// The invariant subspaces of the problem that are projected out of every solution.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NullspaceDescriptor {
    /// Constant pressure.
    pub constant_pressure: bool,
    /// Constant velocity in x and y direction, respectively.
    pub translations: [bool; 2],
    /// Rigid rotation about the center of the domain.
    pub rotation: bool,
}

impl NullspaceDescriptor {
    pub fn is_empty(&self) -> bool {
        !(self.constant_pressure || self.translations[0] || self.translations[1] || self.rotation)
    }
}

/// The pressure gauge.
#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum PressureNormalization {
    /// Leave the pressure as computed.
    #[default]
    None,
    /// Zero mean pressure over the domain.
    Volume,
    /// Prescribed mean pressure along the top side of the domain.
    Surface { surface_pressure: f64 },
}

/// Applies the nullspace projection and the pressure gauge to solutions, and remembers the
/// last pressure adjustment so that it can be undone before the solution is reused as a
/// guess.
#[derive(Debug, Clone)]
pub struct PostSolveNormalizer {
    nullspace: NullspaceDescriptor,
    normalization: PressureNormalization,
    /// Orthonormal velocity nullspace basis.
    velocity_modes: Vec<DVector<f64>>,
    pressure_mode: Option<DVector<f64>>,
    volume_weights: DVector<f64>,
    surface_weights: DVector<f64>,
    pressure_adjustment: f64,
}

impl PostSolveNormalizer {
    pub fn new(
        discretization: &StokesDiscretization,
        nullspace: NullspaceDescriptor,
        normalization: PressureNormalization,
    ) -> Self {
        let grid = &discretization.active().grid;
        let center = Point2::from(grid.origin().coords + grid.extents() * 0.5);
        let n_velocity = grid.n_velocity_dofs();
        let n_pressure = grid.n_pressure_nodes();

        let mut candidates = Vec::new();
        for component in 0..2 {
            if nullspace.translations[component] {
                candidates.push(DVector::from_fn(n_velocity, |i, _| if i % 2 == component { 1.0 } else { 0.0 }));
            }
        }
        if nullspace.rotation {
            let mut mode = DVector::zeros(n_velocity);
            for node in 0..grid.n_velocity_nodes() {
                let r = grid.velocity_node_position(node) - center;
                mode[2 * node] = -r.y;
                mode[2 * node + 1] = r.x;
            }
            candidates.push(mode);
        }

        let pressure_mode = nullspace
            .constant_pressure
            .then(|| DVector::repeat(n_pressure, 1.0 / (n_pressure as f64).sqrt()));

        Self {
            nullspace,
            normalization,
            velocity_modes: orthonormalize(candidates),
            pressure_mode,
            volume_weights: discretization.pressure_volume_weights().clone(),
            surface_weights: discretization.pressure_surface_weights().clone(),
            pressure_adjustment: 0.0,
        }
    }

    /// A normalizer that leaves solutions unchanged.
    pub fn identity(discretization: &StokesDiscretization) -> Self {
        Self::new(discretization, NullspaceDescriptor::default(), PressureNormalization::None)
    }

    pub fn nullspace(&self) -> &NullspaceDescriptor {
        &self.nullspace
    }

    pub fn normalization(&self) -> PressureNormalization {
        self.normalization
    }

    pub fn velocity_modes(&self) -> &[DVector<f64>] {
        &self.velocity_modes
    }

    /// The total constant added to the pressure by [`normalize_pressure`](Self::normalize_pressure)
    /// since the last reset.
    pub fn pressure_adjustment(&self) -> f64 {
        self.pressure_adjustment
    }

    /// Forgets the tracked adjustment. Called when a new raw solution replaces the
    /// normalized one.
    pub fn reset_pressure_adjustment(&mut self) {
        self.pressure_adjustment = 0.0;
    }

    /// Subtracts the projection of the solution onto every nullspace mode.
    pub fn remove_nullspace(&self, solution: &mut BlockVector) {
        {
            let mut u = solution.velocity_mut();
            for mode in &self.velocity_modes {
                let coefficient = mode.dot(&u);
                u.axpy(-coefficient, mode, 1.0);
            }
        }
        if let Some(mode) = &self.pressure_mode {
            let mut p = solution.pressure_mut();
            let coefficient = mode.dot(&p);
            p.axpy(-coefficient, mode, 1.0);
        }
    }

    /// Shifts the pressure by a constant to satisfy the pressure gauge and returns the shift.
    ///
    /// The shift is added to the tracked adjustment, so repeated normalization of the same
    /// solution is still undone by a single [`denormalize_pressure`](Self::denormalize_pressure).
    pub fn normalize_pressure(&mut self, solution: &mut BlockVector) -> f64 {
        let adjustment = {
            let p = solution.pressure();
            match self.normalization {
                PressureNormalization::None => 0.0,
                PressureNormalization::Volume => -weighted_mean(&self.volume_weights, &p),
                PressureNormalization::Surface { surface_pressure } => {
                    surface_pressure - weighted_mean(&self.surface_weights, &p)
                }
            }
        };
        solution.pressure_mut().add_scalar_mut(adjustment);
        self.pressure_adjustment += adjustment;
        debug!(
            "Pressure normalization adjustment {:e} (total {:e})",
            adjustment, self.pressure_adjustment
        );
        adjustment
    }

    /// Removes the tracked pressure adjustment from `pressure`.
    pub fn denormalize_pressure<S>(&self, pressure: &mut Matrix<f64, Dyn, U1, S>)
    where
        S: StorageMut<f64, Dyn, U1>,
    {
        pressure.add_scalar_mut(-self.pressure_adjustment);
    }
}

fn weighted_mean<S>(weights: &DVector<f64>, p: &Matrix<f64, Dyn, U1, S>) -> f64
where
    S: nalgebra::storage::Storage<f64, Dyn, U1>,
{
    weights.dot(p) / weights.sum()
}

/// Gram-Schmidt orthonormalization, dropping candidates that are (numerically) linearly
/// dependent on the previous ones.
fn orthonormalize(candidates: Vec<DVector<f64>>) -> Vec<DVector<f64>> {
    let mut basis: Vec<DVector<f64>> = Vec::with_capacity(candidates.len());
    for mut v in candidates {
        let original_norm = v.norm();
        for q in &basis {
            let coefficient = q.dot(&v);
            v.axpy(-coefficient, q, 1.0);
        }
        let norm = v.norm();
        if norm > 1e-12 * original_norm {
            basis.push(v / norm);
        }
    }
    basis
}
