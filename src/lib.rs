//! Block-preconditioned iterative solvers for the saddle-point systems of (nearly)
//! incompressible Stokes flow.
//!
//! The system
//!
//! ```text
//! [ A  Bᵀ ] [ u ]   [ f ]
//! [ B  0  ] [ p ] = [ g ]
//! ```
//!
//! is solved with flexible GMRES, preconditioned by an approximate block-triangular
//! factorization in which the velocity block is approximately inverted by a geometric
//! multigrid V-cycle and the pressure Schur complement is replaced by an inverse-viscosity
//! weighted mass matrix. A cheap configuration is tried first, and the solver escalates to
//! an expensive configuration with inner Krylov solves when the cheap one fails.

pub mod coefficients;
pub mod comm;
pub mod discretization;
pub mod error;
pub mod layout;
pub mod multigrid;
pub mod normalize;
pub mod operator;
pub mod preconditioner;
pub mod schur;
pub mod solver;

pub extern crate fenris_krylov;
pub extern crate nalgebra;
pub extern crate nalgebra_sparse;

pub use layout::{BlockLayout, BlockVector, PRESSURE_BLOCK, VELOCITY_BLOCK};
pub use solver::{SolveMode, SolveReport, StokesSolver, StokesSolverSettings, StokesSystem};
