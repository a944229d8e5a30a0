use super::grid::{Side, UniformGrid};
use nalgebra::storage::{Storage, StorageMut};
use nalgebra::{DVector, Dyn, Matrix, U1};
use serde::{Deserialize, Serialize};

/// Velocity boundary condition on one side of the domain.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoundaryKind {
    /// Both velocity components are prescribed.
    Prescribed,
    /// Only the normal component is prescribed, the tangential component is free.
    FreeSlip,
    /// No velocity constraint.
    Open,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryConditions {
    pub left: BoundaryKind,
    pub right: BoundaryKind,
    pub bottom: BoundaryKind,
    pub top: BoundaryKind,
}

impl BoundaryConditions {
    pub fn all(kind: BoundaryKind) -> Self {
        Self {
            left: kind,
            right: kind,
            bottom: kind,
            top: kind,
        }
    }

    pub fn kind(&self, side: Side) -> BoundaryKind {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
            Side::Bottom => self.bottom,
            Side::Top => self.top,
        }
    }
}

impl Default for BoundaryConditions {
    fn default() -> Self {
        Self::all(BoundaryKind::Prescribed)
    }
}

/// The set of constrained velocity degrees of freedom on one grid level.
///
/// Operators treat constrained rows as identity rows and ignore constrained entries of
/// their input in all coupling terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VelocityConstraints {
    constrained: Vec<bool>,
    n_constrained: usize,
}

impl VelocityConstraints {
    pub fn from_boundary(grid: &UniformGrid, boundary: &BoundaryConditions) -> Self {
        let mut constrained = vec![false; grid.n_velocity_dofs()];
        for side in Side::ALL {
            let components: &[usize] = match boundary.kind(side) {
                BoundaryKind::Prescribed => &[0, 1],
                BoundaryKind::FreeSlip => match side.normal_component() {
                    0 => &[0],
                    _ => &[1],
                },
                BoundaryKind::Open => &[],
            };
            for node in grid.velocity_nodes_on_side(side) {
                for &c in components {
                    constrained[2 * node + c] = true;
                }
            }
        }
        let n_constrained = constrained.iter().filter(|&&c| c).count();
        Self {
            constrained,
            n_constrained,
        }
    }

    /// Constraints for a system without any constrained degree of freedom.
    pub fn none(n_dofs: usize) -> Self {
        Self {
            constrained: vec![false; n_dofs],
            n_constrained: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.constrained.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constrained.is_empty()
    }

    pub fn n_constrained(&self) -> usize {
        self.n_constrained
    }

    pub fn is_constrained(&self, dof: usize) -> bool {
        self.constrained[dof]
    }

    pub fn mask(&self) -> &[bool] {
        &self.constrained
    }

    pub fn constrained_dofs(&self) -> impl Iterator<Item = usize> + '_ {
        self.constrained
            .iter()
            .enumerate()
            .filter_map(|(dof, &c)| c.then_some(dof))
    }

    pub fn set_zero<S>(&self, v: &mut Matrix<f64, Dyn, U1, S>)
    where
        S: StorageMut<f64, Dyn, U1>,
    {
        assert_eq!(v.len(), self.len());
        for dof in self.constrained_dofs() {
            v[dof] = 0.0;
        }
    }

    /// Overwrites the constrained entries of `dst` with those of `src`.
    pub fn distribute<S1, S2>(&self, dst: &mut Matrix<f64, Dyn, U1, S1>, src: &Matrix<f64, Dyn, U1, S2>)
    where
        S1: StorageMut<f64, Dyn, U1>,
        S2: Storage<f64, Dyn, U1>,
    {
        assert_eq!(dst.len(), self.len());
        assert_eq!(src.len(), self.len());
        for dof in self.constrained_dofs() {
            dst[dof] = src[dof];
        }
    }

    /// Copy of `v` with the unconstrained entries set to zero.
    pub fn constrained_part<S>(&self, v: &Matrix<f64, Dyn, U1, S>) -> DVector<f64>
    where
        S: Storage<f64, Dyn, U1>,
    {
        assert_eq!(v.len(), self.len());
        DVector::from_fn(self.len(), |i, _| if self.constrained[i] { v[i] } else { 0.0 })
    }
}
