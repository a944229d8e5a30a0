//! Krylov solvers and smoothers for (preconditioned) linear systems.
//!
//! Everything in this crate operates on `nalgebra` column vectors through the
//! [`LinearOperator`](operator::LinearOperator) abstraction, so that assembled
//! sparse matrices, matrix-free operators and compound preconditioners can be
//! used interchangeably.

use nalgebra::RealField;

pub use nalgebra;
pub use nalgebra_sparse;

/// Preconditioned conjugate gradients for symmetric positive definite operators.
pub mod cg;
/// Chebyshev polynomial smoothing and Lanczos eigenvalue estimation.
pub mod chebyshev;
/// Iteration control and convergence history.
pub mod control;
/// Flexible restarted GMRES.
pub mod fgmres;
/// The linear operator abstraction and some elementary operators.
pub mod operator;

pub use operator::{DiagonalOperator, IdentityOperator, LinearOperator};

/// Scalar types supported by the solvers in this crate.
pub trait Real: RealField + Copy {}

impl<T: RealField + Copy> Real for T {}
