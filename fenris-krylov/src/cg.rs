//! Preconditioned conjugate gradients for symmetric positive definite operators.
//!
//! Besides the solution, a solve records the residual norm of every convergence check and
//! the CG coefficients, from which Lanczos-type eigenvalue estimates are built.
use crate::operator::{apply_operator, IdentityOperator, LinearOperator};
use crate::Real;
use core::fmt;
use nalgebra::{DVector, DVectorView, DVectorViewMut, Scalar};
use std::error::Error;

pub trait CgStoppingCriterion<T: Scalar> {
    /// Decides convergence from the norm of the right-hand side and the norm of the
    /// (approximate) residual after `iteration` updates.
    fn has_converged(&self, b_norm: T, residual_norm: T, iteration: usize) -> bool;
}

/// Relative residual tolerance ||r|| <= tol * ||b||.
///
/// The residual is the recursively updated CG residual, which can drift from the true
/// residual for ill-conditioned problems.
#[derive(Debug, Copy, Clone)]
pub struct RelativeResidualCriterion<T: Scalar> {
    tol: T,
}

impl<T: Scalar> RelativeResidualCriterion<T> {
    pub fn new(tol: T) -> Self {
        Self { tol }
    }
}

impl<T: Real> CgStoppingCriterion<T> for RelativeResidualCriterion<T> {
    fn has_converged(&self, b_norm: T, residual_norm: T, _iteration: usize) -> bool {
        residual_norm <= self.tol * b_norm
    }
}

/// Never reports convergence. Combined with a maximum number of iterations, this runs
/// a fixed number of CG steps, which is what Lanczos-type eigenvalue estimation wants.
#[derive(Debug, Copy, Clone, Default)]
pub struct FixedIterationCriterion;

impl<T: Real> CgStoppingCriterion<T> for FixedIterationCriterion {
    fn has_converged(&self, _b_norm: T, residual_norm: T, _iteration: usize) -> bool {
        // An exactly vanishing residual means the Krylov space is exhausted
        residual_norm == T::zero()
    }
}

#[derive(Debug)]
pub struct ConjugateGradient<A, P, Criterion> {
    operator: A,
    preconditioner: P,
    stopping_criterion: Criterion,
    max_iter: Option<usize>,
}

impl ConjugateGradient<(), IdentityOperator, ()> {
    pub fn new() -> Self {
        Self {
            operator: (),
            preconditioner: IdentityOperator,
            stopping_criterion: (),
            max_iter: None,
        }
    }
}

impl Default for ConjugateGradient<(), IdentityOperator, ()> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P, Criterion> ConjugateGradient<(), P, Criterion> {
    pub fn with_operator<A>(self, operator: A) -> ConjugateGradient<A, P, Criterion> {
        ConjugateGradient {
            operator,
            preconditioner: self.preconditioner,
            stopping_criterion: self.stopping_criterion,
            max_iter: self.max_iter,
        }
    }
}

impl<A, P, Criterion> ConjugateGradient<A, P, Criterion> {
    pub fn with_preconditioner<P2>(self, preconditioner: P2) -> ConjugateGradient<A, P2, Criterion> {
        ConjugateGradient {
            operator: self.operator,
            preconditioner,
            stopping_criterion: self.stopping_criterion,
            max_iter: self.max_iter,
        }
    }

    pub fn with_max_iter(self, max_iter: usize) -> Self {
        Self {
            max_iter: Some(max_iter),
            ..self
        }
    }
}

impl<A, P> ConjugateGradient<A, P, ()> {
    pub fn with_stopping_criterion<Criterion>(self, stopping_criterion: Criterion) -> ConjugateGradient<A, P, Criterion> {
        ConjugateGradient {
            operator: self.operator,
            preconditioner: self.preconditioner,
            stopping_criterion,
            max_iter: self.max_iter,
        }
    }
}

#[derive(Debug)]
#[non_exhaustive]
pub enum SolveErrorKind {
    OperatorError(Box<dyn Error>),
    PreconditionerError(Box<dyn Error>),
    IndefiniteOperator,
    IndefinitePreconditioner,
    MaxIterationsReached { max_iter: usize },
}

impl fmt::Display for SolveErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OperatorError(err) => {
                write!(f, "Error applying operator: ")?;
                err.fmt(f)
            }
            Self::PreconditionerError(err) => {
                write!(f, "Error applying preconditioner: ")?;
                err.fmt(f)
            }
            Self::IndefiniteOperator => write!(f, "Operator appears to be indefinite"),
            Self::IndefinitePreconditioner => write!(f, "Indefinite preconditioner"),
            Self::MaxIterationsReached { max_iter } => {
                write!(f, "Max iterations ({}) reached.", max_iter)
            }
        }
    }
}

#[non_exhaustive]
#[derive(Debug)]
pub struct SolveError<T> {
    pub output: CgOutput<T>,
    pub kind: SolveErrorKind,
}

impl<T> SolveError<T> {
    fn new(output: CgOutput<T>, kind: SolveErrorKind) -> Self {
        Self { output, kind }
    }
}

impl<T> fmt::Display for SolveError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CG solve failed after {} iterations. ", self.output.num_iterations)?;
        write!(f, "Error: {}", self.kind)
    }
}

impl<T: fmt::Debug> std::error::Error for SolveError<T> {}

#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct CgOutput<T> {
    /// Number of iterations of the solver.
    ///
    /// Corresponds to the number of updates made to the (initial) solution vector,
    pub num_iterations: usize,
    /// Norms of the (approximate) residual, one per convergence check.
    pub residual_norms: Vec<T>,
    /// Step lengths `alpha_k` of each completed iteration.
    pub alphas: Vec<T>,
    /// Direction update coefficients `beta_k` of each completed iteration.
    pub betas: Vec<T>,
}

impl<T> CgOutput<T> {
    fn empty() -> Self {
        Self {
            num_iterations: 0,
            residual_norms: Vec::new(),
            alphas: Vec::new(),
            betas: Vec::new(),
        }
    }
}

impl<A, P, Criterion> ConjugateGradient<A, P, Criterion> {
    pub fn solve_with_guess<'b, T>(
        &self,
        b: impl Into<DVectorView<'b, T>>,
        x: impl Into<DVectorViewMut<'b, T>>,
    ) -> Result<CgOutput<T>, SolveError<T>>
    where
        T: Real,
        A: LinearOperator<T>,
        P: LinearOperator<T>,
        Criterion: CgStoppingCriterion<T>,
    {
        self.solve_with_guess_(b.into(), x.into())
    }

    fn solve_with_guess_<T>(&self, b: DVectorView<T>, mut x: DVectorViewMut<T>) -> Result<CgOutput<T>, SolveError<T>>
    where
        T: Real,
        A: LinearOperator<T>,
        P: LinearOperator<T>,
        Criterion: CgStoppingCriterion<T>,
    {
        use SolveErrorKind::*;
        assert_eq!(b.len(), x.len());

        let mut output = CgOutput::empty();
        let b_norm = b.norm();
        if b_norm == T::zero() {
            x.fill(T::zero());
            output.residual_norms.push(T::zero());
            return Ok(output);
        }

        let n = x.len();
        let mut r = DVector::zeros(n);
        let mut z = DVector::zeros(n);
        let mut a_p = DVector::zeros(n);

        // r = b - Ax
        if let Err(err) = apply_operator(&mut r, &self.operator, &x) {
            return Err(SolveError::new(output, OperatorError(err)));
        }
        r.zip_apply(&b, |ax_i, b_i| *ax_i = b_i - *ax_i);

        // z = Pr, p = z
        if let Err(err) = apply_operator(&mut z, &self.preconditioner, &r) {
            return Err(SolveError::new(output, PreconditionerError(err)));
        }
        let mut p = z.clone();
        let mut z_dot_r = z.dot(&r);

        loop {
            let residual_norm = r.norm();
            output.residual_norms.push(residual_norm);
            if self
                .stopping_criterion
                .has_converged(b_norm, residual_norm, output.num_iterations)
            {
                break;
            }
            if let Some(max_iter) = self.max_iter {
                if output.num_iterations >= max_iter {
                    return Err(SolveError::new(output, MaxIterationsReached { max_iter }));
                }
            }

            if let Err(err) = apply_operator(&mut a_p, &self.operator, &p) {
                return Err(SolveError::new(output, OperatorError(err)));
            }
            let p_dot_ap = p.dot(&a_p);
            if p_dot_ap <= T::zero() {
                return Err(SolveError::new(output, IndefiniteOperator));
            }
            if z_dot_r <= T::zero() {
                return Err(SolveError::new(output, IndefinitePreconditioner));
            }

            let alpha = z_dot_r / p_dot_ap;
            x.axpy(alpha, &p, T::one());
            r.axpy(-alpha, &a_p, T::one());
            output.num_iterations += 1;
            output.alphas.push(alpha);

            if let Err(err) = apply_operator(&mut z, &self.preconditioner, &r) {
                return Err(SolveError::new(output, PreconditionerError(err)));
            }
            let z_dot_r_next = z.dot(&r);
            let beta = z_dot_r_next / z_dot_r;
            output.betas.push(beta);

            // p <- z + beta p
            p.axpy(T::one(), &z, beta);
            z_dot_r = z_dot_r_next;
        }

        Ok(output)
    }
}
