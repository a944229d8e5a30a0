use crate::cg::{CgOutput, ConjugateGradient, FixedIterationCriterion};
use crate::operator::{apply_operator, DiagonalOperator, LinearOperator};
use crate::Real;
use core::fmt;
use log::{debug, warn};
use nalgebra::{convert, try_convert, DMatrix, DVector, DVectorView, DVectorViewMut, Scalar, SymmetricEigen};
use numeric_literals::replace_float_literals;
use std::error::Error;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ChebyshevSettings<T> {
    /// Number of corrections per application. `None` derives the degree from
    /// `smoothing_range`, which then acts as the target relative error and must be
    /// smaller than one.
    pub degree: Option<usize>,
    /// Ratio between the largest and smallest eigenvalue to be smoothed when larger
    /// than one, or the target relative error of a solve when smaller than one.
    pub smoothing_range: T,
    /// Number of CG iterations used to estimate the eigenvalue range.
    pub eig_cg_n_iterations: usize,
}

impl ChebyshevSettings<f64> {
    pub fn smoother() -> Self {
        Self {
            degree: Some(4),
            smoothing_range: 15.0,
            eig_cg_n_iterations: 10,
        }
    }

    pub fn coarse_solver(n_dofs: usize) -> Self {
        Self {
            degree: None,
            smoothing_range: 1e-3,
            eig_cg_n_iterations: n_dofs,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct EigenvalueEstimate<T> {
    pub min: T,
    pub max: T,
    pub cg_iterations: usize,
}

#[derive(Debug)]
pub enum EigenvalueEstimationError {
    /// CG did not complete a single iteration.
    NoIterations,
    /// The Lanczos matrix produced non-finite or non-positive eigenvalues.
    InvalidSpectrum,
}

impl fmt::Display for EigenvalueEstimationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoIterations => write!(f, "CG did not perform any iterations"),
            Self::InvalidSpectrum => write!(f, "Lanczos matrix has an invalid spectrum"),
        }
    }
}

impl Error for EigenvalueEstimationError {}

/// Deterministic start vector with zero mean.
fn lanczos_start_vector<T: Real>(n: usize) -> DVector<T> {
    let mut state: u64 = 0x2545_f491_4f6c_dd1d;
    let mut v = DVector::from_fn(n, |_, _| {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let unit = (state >> 11) as f64 / (1u64 << 53) as f64;
        convert::<f64, T>(unit - 0.5)
    });
    if n > 0 {
        let mean = v.sum() / convert::<f64, T>(n as f64);
        v.add_scalar_mut(-mean);
    }
    v
}

/// Builds the Lanczos tridiagonal matrix from the CG coefficients.
fn lanczos_matrix<T: Real>(output: &CgOutput<T>) -> DMatrix<T> {
    let alphas = &output.alphas;
    let betas = &output.betas;
    let k = alphas.len();
    let mut t = DMatrix::zeros(k, k);
    for i in 0..k {
        t[(i, i)] = T::one() / alphas[i];
        if i > 0 {
            t[(i, i)] += betas[i - 1] / alphas[i - 1];
            let off_diag = betas[i - 1].sqrt() / alphas[i - 1];
            t[(i, i - 1)] = off_diag;
            t[(i - 1, i)] = off_diag;
        }
    }
    t
}

/// Estimates the extremal eigenvalues of `D⁻¹A` with a Jacobi-preconditioned CG run,
/// interpreting the CG coefficients as a Lanczos process.
pub fn estimate_eigenvalues<T, A>(
    operator: &A,
    inverse_diagonal: &DiagonalOperator<T>,
    n_iterations: usize,
) -> Result<EigenvalueEstimate<T>, EigenvalueEstimationError>
where
    T: Real,
    A: ?Sized + LinearOperator<T>,
{
    let n = inverse_diagonal.diagonal().len();
    let b = lanczos_start_vector::<T>(n);
    let mut x = DVector::zeros(n);

    let output = ConjugateGradient::new()
        .with_operator(operator)
        .with_preconditioner(inverse_diagonal)
        .with_stopping_criterion(FixedIterationCriterion)
        .with_max_iter(n_iterations.min(n))
        .solve_with_guess(&b, &mut x)
        // Breakdown still leaves usable coefficients from the completed iterations
        .unwrap_or_else(|err| err.output);

    if output.alphas.is_empty() {
        return Err(EigenvalueEstimationError::NoIterations);
    }

    let eigenvalues = SymmetricEigen::new(lanczos_matrix(&output)).eigenvalues;
    let min = eigenvalues.min();
    let max = eigenvalues.max();
    if !(min.is_finite() && max.is_finite()) || max <= T::zero() {
        return Err(EigenvalueEstimationError::InvalidSpectrum);
    }

    Ok(EigenvalueEstimate {
        min,
        max,
        cg_iterations: output.num_iterations,
    })
}

/// Chebyshev polynomial smoother for `A x = b`, preconditioned with a (Jacobi) diagonal.
///
/// The smoother does not own the operator. Callers pass the same operator to
/// [`ChebyshevSmoother::new`] and [`ChebyshevSmoother::smooth`].
#[derive(Debug, Clone)]
pub struct ChebyshevSmoother<T: Scalar> {
    inverse_diagonal: DiagonalOperator<T>,
    degree: usize,
    lower: T,
    upper: T,
    max_eigenvalue: T,
}

impl<T: Real> ChebyshevSmoother<T> {
    #[replace_float_literals(convert::<f64, T>(literal))]
    pub fn new<A>(operator: &A, inverse_diagonal: DiagonalOperator<T>, settings: &ChebyshevSettings<T>) -> Self
    where
        A: ?Sized + LinearOperator<T>,
    {
        let range = settings.smoothing_range;
        assert!(range > 0.0, "Smoothing range must be positive.");
        assert!(
            settings.degree.is_some() || range < 1.0,
            "Automatic Chebyshev degree requires a smoothing range below one."
        );

        let (max_eigenvalue, min_eigenvalue) =
            match estimate_eigenvalues(operator, &inverse_diagonal, settings.eig_cg_n_iterations) {
                Ok(estimate) => (estimate.max, Some(estimate.min)),
                Err(err) => {
                    warn!("Chebyshev eigenvalue estimation failed ({}), assuming a maximum eigenvalue of 2", err);
                    (2.0, None)
                }
            };

        let upper = 1.2 * max_eigenvalue;
        let lower = if range > 1.0 {
            max_eigenvalue / range
        } else {
            match min_eigenvalue {
                Some(min) if min > 0.0 => T::min(0.9 * max_eigenvalue, min),
                _ => max_eigenvalue * range,
            }
        };

        let degree = match settings.degree {
            Some(degree) => degree.max(1),
            None => {
                let ratio = upper / lower;
                let sigma = (1.0 - (1.0 / ratio).sqrt()) / (1.0 + (1.0 / ratio).sqrt());
                let eps = range;
                let steps = ((1.0 / eps + (1.0 / (eps * eps) - 1.0).sqrt()).ln() / (1.0 / sigma).ln()).floor();
                1 + try_convert::<T, f64>(steps)
                    .filter(|s| s.is_finite() && s.is_sign_positive())
                    .map(|s| s as usize)
                    .unwrap_or(0)
            }
        };

        debug!(
            "Chebyshev setup: degree {}, eigenvalue interval [{:?}, {:?}]",
            degree, lower, upper
        );

        Self {
            inverse_diagonal,
            degree,
            lower,
            upper,
            max_eigenvalue,
        }
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    /// The estimated (or assumed) largest eigenvalue of `D⁻¹A`.
    pub fn max_eigenvalue(&self) -> T {
        self.max_eigenvalue
    }

    /// The interval `[lower, upper]` on which the residual polynomial is minimized.
    pub fn interval(&self) -> (T, T) {
        (self.lower, self.upper)
    }

    /// Runs `degree` Chebyshev corrections on `x`. If `start_from_zero` is set, the
    /// contents of `x` are ignored and the iteration starts from the zero vector.
    #[replace_float_literals(convert::<f64, T>(literal))]
    pub fn smooth<'b, A>(
        &self,
        operator: &A,
        x: impl Into<DVectorViewMut<'b, T>>,
        b: impl Into<DVectorView<'b, T>>,
        start_from_zero: bool,
    ) -> Result<(), Box<dyn Error>>
    where
        A: ?Sized + LinearOperator<T>,
    {
        let mut x = x.into();
        let b = b.into();
        assert_eq!(x.len(), b.len());
        assert_eq!(x.len(), self.inverse_diagonal.diagonal().len());

        let theta = 0.5 * (self.upper + self.lower);
        let delta = 0.5 * (self.upper - self.lower);
        let sigma = theta / delta;
        let mut rho = 1.0 / sigma;

        let mut r = DVector::zeros(b.len());
        if start_from_zero {
            x.fill(0.0);
            r.copy_from(&b);
        } else {
            apply_operator(&mut r, operator, &x)?;
            r.zip_apply(&b, |ax_i, b_i| *ax_i = b_i - *ax_i);
        }

        // d = D⁻¹ r / θ
        let mut d = DVector::zeros(b.len());
        apply_operator(&mut d, &self.inverse_diagonal, &r)?;
        d /= theta;
        let mut z = DVector::zeros(b.len());

        for k in 0..self.degree {
            x += &d;
            if k + 1 == self.degree {
                break;
            }

            apply_operator(&mut r, operator, &x)?;
            r.zip_apply(&b, |ax_i, b_i| *ax_i = b_i - *ax_i);
            apply_operator(&mut z, &self.inverse_diagonal, &r)?;

            let rho_next = 1.0 / (2.0 * sigma - rho);
            let d_scale = rho_next * rho;
            let z_scale = 2.0 * rho_next / delta;
            d.zip_apply(&z, |d_i, z_i| *d_i = d_scale * *d_i + z_scale * z_i);
            rho = rho_next;
        }

        Ok(())
    }

    pub fn as_preconditioner<'a, A: ?Sized>(&'a self, operator: &'a A) -> ChebyshevPreconditioner<'a, T, A> {
        ChebyshevPreconditioner {
            smoother: self,
            operator,
        }
    }
}

/// A Chebyshev smoother started from zero, viewed as a linear operator `y ≈ A⁻¹ x`.
#[derive(Debug)]
pub struct ChebyshevPreconditioner<'a, T: Scalar, A: ?Sized> {
    smoother: &'a ChebyshevSmoother<T>,
    operator: &'a A,
}

impl<'a, T, A> LinearOperator<T> for ChebyshevPreconditioner<'a, T, A>
where
    T: Real,
    A: ?Sized + LinearOperator<T>,
{
    fn apply(&self, y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        self.smoother.smooth(self.operator, y, x, true)
    }
}
