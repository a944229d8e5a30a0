use nalgebra::base::constraint::AreMultipliable;
use nalgebra::constraint::{DimEq, ShapeConstraint};
use nalgebra::storage::Storage;
use nalgebra::{ClosedAdd, ClosedMul, DVector, DVectorView, DVectorViewMut, Dim, Dyn, Matrix, Scalar, U1};
use nalgebra_sparse::ops::serial::spmm_csr_dense;
use nalgebra_sparse::ops::Op;
use nalgebra_sparse::CsrMatrix;
use num::{One, Zero};
use std::error::Error;

use crate::Real;

/// A linear map `y = A x` between vectors of equal length.
///
/// Operator application is allowed to fail, which is used by compound operators
/// (e.g. preconditioners that run inner iterative solves) to report failures to
/// the outer iteration.
pub trait LinearOperator<T: Scalar> {
    fn apply(&self, y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>>;
}

impl<'a, T, A> LinearOperator<T> for &'a A
where
    T: Scalar,
    A: ?Sized + LinearOperator<T>,
{
    fn apply(&self, y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        <A as LinearOperator<T>>::apply(self, y, x)
    }
}

impl<T, R, C, S> LinearOperator<T> for Matrix<T, R, C, S>
where
    T: Scalar + One + Zero + ClosedMul + ClosedAdd,
    R: Dim,
    C: Dim,
    S: Storage<T, R, C>,
    ShapeConstraint: DimEq<Dyn, R> + DimEq<C, Dyn> + AreMultipliable<R, C, Dyn, U1>,
{
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        y.gemv(T::one(), self, &x, T::zero());
        Ok(())
    }
}

impl<T> LinearOperator<T> for CsrMatrix<T>
where
    T: Scalar + Zero + One + ClosedMul + ClosedAdd,
{
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        spmm_csr_dense(T::zero(), &mut y, T::one(), Op::NoOp(self), Op::NoOp(&x));
        Ok(())
    }
}

#[derive(Debug, Copy, Clone, Default)]
pub struct IdentityOperator;

impl<T: Scalar> LinearOperator<T> for IdentityOperator {
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        y.copy_from(&x);
        Ok(())
    }
}

/// The operator `y_i = d_i x_i`.
///
/// Most commonly used as a Jacobi preconditioner, in which case `d` holds the
/// inverse of the diagonal of the system operator.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagonalOperator<T: Scalar> {
    diagonal: DVector<T>,
}

impl<T: Scalar> DiagonalOperator<T> {
    pub fn new(diagonal: DVector<T>) -> Self {
        Self { diagonal }
    }

    pub fn diagonal(&self) -> &DVector<T> {
        &self.diagonal
    }
}

impl<T: Real> DiagonalOperator<T> {
    /// Jacobi preconditioner for an operator with the given diagonal.
    ///
    /// Zero diagonal entries are mapped to zero rather than infinity.
    pub fn from_inverse_of(diagonal: &DVector<T>) -> Self {
        let inverse = diagonal.map(|d_i| if d_i == T::zero() { T::zero() } else { T::one() / d_i });
        Self { diagonal: inverse }
    }
}

impl<T> LinearOperator<T> for DiagonalOperator<T>
where
    T: Scalar + ClosedMul,
{
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        assert_eq!(y.len(), self.diagonal.len(), "Output dimension mismatch.");
        assert_eq!(x.len(), self.diagonal.len(), "Input dimension mismatch.");
        y.zip_zip_apply(&x, &self.diagonal, |y_i, x_i, d_i| *y_i = d_i * x_i);
        Ok(())
    }
}

/// y = Ax
pub fn apply_operator<'a, T, A>(
    y: impl Into<DVectorViewMut<'a, T>>,
    a: &A,
    x: impl Into<DVectorView<'a, T>>,
) -> Result<(), Box<dyn Error>>
where
    T: Scalar,
    A: ?Sized + LinearOperator<T>,
{
    a.apply(y.into(), x.into())
}
