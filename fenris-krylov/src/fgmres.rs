use crate::control::{ControlState, SolverControl};
use crate::operator::{apply_operator, LinearOperator};
use crate::Real;
use core::fmt;
use log::debug;
use nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut, Scalar};
use std::error::Error;

/// Restarted flexible GMRES with right preconditioning.
///
/// Since the preconditioned directions `z_j = P v_j` are stored explicitly, the
/// preconditioner may change from one application to the next. This is what makes it
/// possible to use preconditioners that themselves run inner iterative solves.
#[derive(Debug, Clone)]
pub struct Fgmres<T: Scalar> {
    restart: usize,
    basis: Vec<DVector<T>>,
    directions: Vec<DVector<T>>,
    hessenberg: DMatrix<T>,
    cosines: Vec<T>,
    sines: Vec<T>,
    rhs: Vec<T>,
    w: DVector<T>,
}

#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct FgmresOutput<T> {
    /// Total number of Krylov iterations over all restart cycles.
    pub num_iterations: usize,
    /// The last residual norm seen by the solver control.
    pub residual_norm: T,
    pub num_restarts: usize,
}

#[derive(Debug)]
#[non_exhaustive]
pub enum FgmresErrorKind {
    OperatorError(Box<dyn Error>),
    PreconditionerError(Box<dyn Error>),
    /// The iteration cap was hit, or the residual became non-finite.
    NoConvergence,
}

impl fmt::Display for FgmresErrorKind {
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
            Self::NoConvergence => write!(f, "Iteration did not converge"),
        }
    }
}

#[derive(Debug)]
pub struct FgmresError<T> {
    pub output: FgmresOutput<T>,
    pub kind: FgmresErrorKind,
}

impl<T: fmt::Debug> fmt::Display for FgmresError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FGMRES failed after {} iterations (residual {:?}). Error: {}",
            self.output.num_iterations, self.output.residual_norm, self.kind
        )
    }
}

impl<T: fmt::Debug> Error for FgmresError<T> {}

impl<T: Real> Fgmres<T> {
    pub fn new(restart: usize) -> Self {
        assert!(restart > 0, "Restart length must be positive.");
        Self {
            restart,
            basis: Vec::new(),
            directions: Vec::new(),
            hessenberg: DMatrix::zeros(restart + 1, restart),
            cosines: vec![T::zero(); restart],
            sines: vec![T::zero(); restart],
            rhs: vec![T::zero(); restart + 1],
            w: DVector::zeros(0),
        }
    }

    pub fn restart(&self) -> usize {
        self.restart
    }

    fn prepare(&mut self, dim: usize) {
        let resize = |vectors: &mut Vec<DVector<T>>, count: usize| {
            vectors.resize_with(count, || DVector::zeros(dim));
            for v in vectors.iter_mut() {
                v.resize_vertically_mut(dim, T::zero());
            }
        };
        resize(&mut self.basis, self.restart + 1);
        resize(&mut self.directions, self.restart);
        self.w.resize_vertically_mut(dim, T::zero());
    }

    /// Solves `A x = b` starting from the given `x`.
    ///
    /// Convergence is decided by `control`, which sees the initial residual norm at step 0
    /// and the (Givens-estimated) residual norm after every iteration.
    pub fn solve<'b, A, P>(
        &mut self,
        operator: &A,
        preconditioner: &P,
        b: impl Into<DVectorView<'b, T>>,
        x: impl Into<DVectorViewMut<'b, T>>,
        control: &mut SolverControl<T>,
    ) -> Result<FgmresOutput<T>, FgmresError<T>>
    where
        A: ?Sized + LinearOperator<T>,
        P: ?Sized + LinearOperator<T>,
    {
        self.solve_(operator, preconditioner, b.into(), x.into(), control)
    }

    fn solve_<A, P>(
        &mut self,
        operator: &A,
        preconditioner: &P,
        b: DVectorView<T>,
        mut x: DVectorViewMut<T>,
        control: &mut SolverControl<T>,
    ) -> Result<FgmresOutput<T>, FgmresError<T>>
    where
        A: ?Sized + LinearOperator<T>,
        P: ?Sized + LinearOperator<T>,
    {
        use FgmresErrorKind::*;
        assert_eq!(b.len(), x.len());
        self.prepare(x.len());

        let mut output = FgmresOutput {
            num_iterations: 0,
            residual_norm: T::zero(),
            num_restarts: 0,
        };

        loop {
            // r = b - Ax, stored in v_0
            let v0 = &mut self.basis[0];
            if let Err(err) = apply_operator(&mut *v0, operator, &x) {
                return Err(FgmresError { output, kind: OperatorError(err) });
            }
            v0.zip_apply(&b, |ax_i, b_i| *ax_i = b_i - *ax_i);
            let beta = v0.norm();

            output.residual_norm = beta;
            match control.check(output.num_iterations, beta) {
                ControlState::Success => break,
                ControlState::Failure => return Err(FgmresError { output, kind: NoConvergence }),
                ControlState::Iterate => {}
            }

            *v0 /= beta;
            self.hessenberg.fill(T::zero());
            self.rhs.iter_mut().for_each(|g_i| *g_i = T::zero());
            self.rhs[0] = beta;

            let mut cycle_len = 0;
            let mut state = ControlState::Iterate;
            for j in 0..self.restart {
                if let Err(err) = apply_operator(&mut self.directions[j], preconditioner, &self.basis[j]) {
                    return Err(FgmresError {
                        output,
                        kind: PreconditionerError(err),
                    });
                }
                if let Err(err) = apply_operator(&mut self.w, operator, &self.directions[j]) {
                    return Err(FgmresError { output, kind: OperatorError(err) });
                }

                // Modified Gram-Schmidt
                for i in 0..=j {
                    let h_ij = self.w.dot(&self.basis[i]);
                    self.hessenberg[(i, j)] = h_ij;
                    self.w.axpy(-h_ij, &self.basis[i], T::one());
                }
                let h_next = self.w.norm();
                self.hessenberg[(j + 1, j)] = h_next;

                self.rotate_column(j);

                cycle_len = j + 1;
                output.num_iterations += 1;
                output.residual_norm = self.rhs[j + 1].abs();
                state = control.check(output.num_iterations, output.residual_norm);

                let breakdown = h_next == T::zero();
                if !breakdown {
                    let v_next = &mut self.basis[j + 1];
                    v_next.copy_from(&self.w);
                    *v_next /= h_next;
                }

                if state != ControlState::Iterate || breakdown {
                    break;
                }
            }

            self.update_solution(&mut x, cycle_len);

            match state {
                ControlState::Success => break,
                ControlState::Failure => return Err(FgmresError { output, kind: NoConvergence }),
                ControlState::Iterate => {
                    output.num_restarts += 1;
                    debug!(
                        "FGMRES restart after {} iterations, residual estimate {:?}",
                        output.num_iterations, output.residual_norm
                    );
                }
            }
        }

        Ok(output)
    }

    /// Applies the accumulated Givens rotations to column `j` of the Hessenberg matrix, then
    /// computes and applies a new rotation that eliminates the subdiagonal entry.
    fn rotate_column(&mut self, j: usize) {
        let h = &mut self.hessenberg;
        for i in 0..j {
            let (c, s) = (self.cosines[i], self.sines[i]);
            let upper = h[(i, j)];
            let lower = h[(i + 1, j)];
            h[(i, j)] = c * upper + s * lower;
            h[(i + 1, j)] = c * lower - s * upper;
        }

        let diag = h[(j, j)];
        let sub = h[(j + 1, j)];
        let denom = diag.hypot(sub);
        let (c, s) = if denom == T::zero() {
            (T::one(), T::zero())
        } else {
            (diag / denom, sub / denom)
        };
        self.cosines[j] = c;
        self.sines[j] = s;
        h[(j, j)] = c * diag + s * sub;
        h[(j + 1, j)] = T::zero();

        let g_j = self.rhs[j];
        self.rhs[j] = c * g_j;
        self.rhs[j + 1] = -s * g_j;
    }

    /// x <- x + Z y, where y solves the leading k x k triangular system H y = g.
    fn update_solution(&self, x: &mut DVectorViewMut<T>, k: usize) {
        let mut y = vec![T::zero(); k];
        for i in (0..k).rev() {
            let mut sum = self.rhs[i];
            for l in (i + 1)..k {
                sum -= self.hessenberg[(i, l)] * y[l];
            }
            let h_ii = self.hessenberg[(i, i)];
            y[i] = if h_ii == T::zero() { T::zero() } else { sum / h_ii };
        }
        for (y_i, z_i) in y.iter().zip(&self.directions) {
            x.axpy(*y_i, z_i, T::one());
        }
    }
}
