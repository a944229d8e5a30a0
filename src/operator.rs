//! The coupled velocity-pressure operator.
//!
//! [`StokesBlockOperator`] is implemented by a matrix-free and an assembled variant, selected
//! at setup time through [`OperatorKind`]. Both treat constrained velocity rows as identity
//! rows and ignore constrained velocity entries in the coupling terms, so the operator acts on
//! the homogeneous part of the solution. Dirichlet data enter through [`condense_rhs`].
use crate::coefficients::CoefficientTable;
use crate::discretization::{LevelData, VelocityConstraints};
use crate::layout::{BlockLayout, BlockVector};
use fenris_krylov::LinearOperator;
use nalgebra::{DVector, DVectorView, DVectorViewMut};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::Arc;

pub mod assembled;
pub mod kernels;
pub mod matrix_free;

pub use assembled::AssembledStokesOperator;
pub use matrix_free::{MatrixFreeMassOperator, MatrixFreeStokesOperator, MatrixFreeVelocityOperator};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OperatorKind {
    #[default]
    MatrixFree,
    Assembled,
}

pub trait StokesBlockOperator {
    fn layout(&self) -> BlockLayout;

    /// Generation of the coefficient table the operator was built from.
    fn generation(&self) -> u64;

    fn pressure_scaling(&self) -> f64;

    fn constraints(&self) -> &VelocityConstraints;

    /// `dst = A src`, with `dst_i = src_i` on constrained rows.
    fn apply_velocity(&self, dst: DVectorViewMut<f64>, src: DVectorView<f64>);

    /// `dst = Bᵀ src`, zero on constrained rows.
    fn apply_gradient(&self, dst: DVectorViewMut<f64>, src: DVectorView<f64>);

    /// `dst = B src`, ignoring constrained entries of `src`.
    fn apply_divergence(&self, dst: DVectorViewMut<f64>, src: DVectorView<f64>);

    /// The action of the constrained entries of `g` on the free rows: `A g` restricted to free
    /// rows (zero on constrained rows) and `B g`.
    fn apply_boundary_lift(&self, dst_u: DVectorViewMut<f64>, dst_p: DVectorViewMut<f64>, g: DVectorView<f64>);

    /// `dst = K src` for flat vectors with this operator's layout.
    fn apply_flat(&self, mut dst: DVectorViewMut<f64>, src: DVectorView<f64>) {
        let layout = self.layout();
        let (src_u, src_p) = layout.split(&src);
        let (mut dst_u, dst_p) = layout.split_mut(&mut dst);

        let mut gradient = DVector::zeros(layout.n_velocity());
        self.apply_gradient((&mut gradient).into(), src_p);
        self.apply_velocity((&mut dst_u).into(), src_u);
        dst_u += &gradient;
        self.apply_divergence(dst_p, src_u);
    }

    fn apply(&self, dst: &mut BlockVector, src: &BlockVector) {
        let layout = self.layout();
        layout.assert_matches(&dst.layout(), "StokesBlockOperator::apply (dst)");
        layout.assert_matches(&src.layout(), "StokesBlockOperator::apply (src)");
        self.apply_flat(dst.as_vector_mut().into(), src.as_vector().into());
    }

    /// `dst = b - K x`, returning `‖dst‖₂`.
    fn residual(&self, dst: &mut BlockVector, x: &BlockVector, b: &BlockVector) -> f64 {
        self.layout()
            .assert_matches(&b.layout(), "StokesBlockOperator::residual (b)");
        self.apply(dst, x);
        dst.as_vector_mut()
            .zip_apply(b.as_vector(), |kx_i, b_i| *kx_i = b_i - *kx_i);
        dst.norm()
    }

    fn initialize_vector(&self) -> BlockVector {
        BlockVector::zeros(self.layout())
    }

    fn as_linear_operator(&self) -> BlockSystem<Self>
    where
        Self: Sized,
    {
        BlockSystem(self)
    }
}

/// The full saddle-point operator as a [`LinearOperator`] on flat vectors.
#[derive(Debug, Copy, Clone)]
pub struct BlockSystem<'a, O: ?Sized>(pub &'a O);

impl<'a, O: ?Sized + StokesBlockOperator> LinearOperator<f64> for BlockSystem<'a, O> {
    fn apply(&self, y: DVectorViewMut<f64>, x: DVectorView<f64>) -> Result<(), Box<dyn Error>> {
        self.0.apply_flat(y, x);
        Ok(())
    }
}

/// The velocity block of a saddle-point operator as a [`LinearOperator`].
#[derive(Debug, Copy, Clone)]
pub struct VelocityBlock<'a, O: ?Sized>(pub &'a O);

impl<'a, O: ?Sized + StokesBlockOperator> LinearOperator<f64> for VelocityBlock<'a, O> {
    fn apply(&self, y: DVectorViewMut<f64>, x: DVectorView<f64>) -> Result<(), Box<dyn Error>> {
        self.0.apply_velocity(y, x);
        Ok(())
    }
}

/// One of the two operator implementations.
#[derive(Debug, Clone)]
pub enum StokesOperator {
    MatrixFree(MatrixFreeStokesOperator),
    Assembled(AssembledStokesOperator),
}

impl StokesOperator {
    pub fn new(
        kind: OperatorKind,
        level: Arc<LevelData>,
        coefficients: &CoefficientTable,
        pressure_scaling: f64,
    ) -> Self {
        assert!(
            pressure_scaling.is_finite() && pressure_scaling > 0.0,
            "Pressure scaling must be positive, got {pressure_scaling}"
        );
        match kind {
            OperatorKind::MatrixFree => {
                Self::MatrixFree(MatrixFreeStokesOperator::new(level, coefficients, pressure_scaling))
            }
            OperatorKind::Assembled => Self::Assembled(AssembledStokesOperator::new(level, coefficients, pressure_scaling)),
        }
    }

    pub fn kind(&self) -> OperatorKind {
        match self {
            Self::MatrixFree(_) => OperatorKind::MatrixFree,
            Self::Assembled(_) => OperatorKind::Assembled,
        }
    }

    fn inner(&self) -> &dyn StokesBlockOperator {
        match self {
            Self::MatrixFree(op) => op,
            Self::Assembled(op) => op,
        }
    }
}

impl StokesBlockOperator for StokesOperator {
    fn layout(&self) -> BlockLayout {
        self.inner().layout()
    }

    fn generation(&self) -> u64 {
        self.inner().generation()
    }

    fn pressure_scaling(&self) -> f64 {
        self.inner().pressure_scaling()
    }

    fn constraints(&self) -> &VelocityConstraints {
        self.inner().constraints()
    }

    fn apply_velocity(&self, dst: DVectorViewMut<f64>, src: DVectorView<f64>) {
        self.inner().apply_velocity(dst, src)
    }

    fn apply_gradient(&self, dst: DVectorViewMut<f64>, src: DVectorView<f64>) {
        self.inner().apply_gradient(dst, src)
    }

    fn apply_divergence(&self, dst: DVectorViewMut<f64>, src: DVectorView<f64>) {
        self.inner().apply_divergence(dst, src)
    }

    fn apply_boundary_lift(&self, dst_u: DVectorViewMut<f64>, dst_p: DVectorViewMut<f64>, g: DVectorView<f64>) {
        self.inner().apply_boundary_lift(dst_u, dst_p, g)
    }
}

/// Moves the Dirichlet data `g` to the right-hand side.
///
/// Returns `f_u - A g` on free velocity rows, zero on constrained velocity rows and
/// `f_p - B g` on the pressure rows. Solving with the condensed right-hand side and then
/// distributing `g` into the constrained entries gives the solution of the inhomogeneous
/// problem.
pub fn condense_rhs<O>(operator: &O, rhs: &BlockVector, boundary_values: &DVector<f64>) -> BlockVector
where
    O: ?Sized + StokesBlockOperator,
{
    let layout = operator.layout();
    layout.assert_matches(&rhs.layout(), "condense_rhs");
    assert_eq!(
        boundary_values.len(),
        layout.n_velocity(),
        "Boundary values must have one entry per velocity dof"
    );

    let mut lift = operator.initialize_vector();
    {
        let (lift_u, lift_p) = lift.split_mut();
        operator.apply_boundary_lift(lift_u, lift_p, boundary_values.into());
    }

    let mut condensed = rhs.clone();
    *condensed.as_vector_mut() -= lift.as_vector();
    operator.constraints().set_zero(&mut condensed.velocity_mut());
    condensed
}
