use crate::{dense, laplacian_1d};
use fenris_krylov::cg::{ConjugateGradient, RelativeResidualCriterion};
use fenris_krylov::chebyshev::{estimate_eigenvalues, ChebyshevSettings, ChebyshevSmoother};
use fenris_krylov::DiagonalOperator;
use matrixcompare::assert_matrix_eq;
use nalgebra::{DVector, SymmetricEigen};

fn jacobi_of(n: usize) -> DiagonalOperator<f64> {
    DiagonalOperator::from_inverse_of(&DVector::repeat(n, 2.0))
}

#[test]
fn lanczos_estimate_matches_exact_spectrum_when_run_to_completion() {
    let n = 12;
    let a = laplacian_1d(n);
    let estimate = estimate_eigenvalues(&a, &jacobi_of(n), n).unwrap();

    // D⁻¹A = A / 2, whose spectrum is known in closed form
    let exact = SymmetricEigen::new(dense(&a) * 0.5).eigenvalues;
    assert!((estimate.max - exact.max()).abs() <= 1e-8);
    assert!((estimate.min - exact.min()).abs() <= 1e-8);
}

#[test]
fn lanczos_estimate_is_bounded_by_spectrum() {
    let n = 60;
    let a = laplacian_1d(n);
    let estimate = estimate_eigenvalues(&a, &jacobi_of(n), 10).unwrap();
    let exact = SymmetricEigen::new(dense(&a) * 0.5).eigenvalues;
    assert_eq!(estimate.cg_iterations, 10);
    assert!(estimate.max <= exact.max() + 1e-12);
    assert!(estimate.max > 0.8 * exact.max());
    assert!(estimate.min >= exact.min() - 1e-12);
}

#[test]
fn smoother_reduces_high_frequency_error() {
    let n = 64;
    let a = laplacian_1d(n);
    let smoother = ChebyshevSmoother::new(&a, jacobi_of(n), &ChebyshevSettings::smoother());
    assert_eq!(smoother.degree(), 4);

    // Oscillatory error, zero right-hand side
    let b = DVector::zeros(n);
    let mut x = DVector::from_fn(n, |i, _| if i % 2 == 0 { 1.0 } else { -1.0 });
    let before = x.norm();
    smoother.smooth(&a, &mut x, &b, false).unwrap();
    // Modes inside the smoothing interval are damped to at most 1 / T_4(θ/δ) ≈ 0.28
    assert!(x.norm() < 0.3 * before);
}

#[test]
fn coarse_chebyshev_solves_to_relative_accuracy() {
    let n = 9;
    let a = laplacian_1d(n);
    let settings = ChebyshevSettings::coarse_solver(n);
    let smoother = ChebyshevSmoother::new(&a, jacobi_of(n), &settings);
    assert!(smoother.degree() > 4);

    let x_exact = DVector::from_fn(n, |i, _| 1.0 + i as f64);
    let b = &a * &x_exact;
    let mut x = DVector::zeros(n);
    smoother.smooth(&a, &mut x, &b, true).unwrap();

    let error = &x - &x_exact;
    assert!(error.norm() <= 1e-2 * x_exact.norm());
}

#[test]
fn chebyshev_preconditioned_cg_matches_direct_solution() {
    let n = 30;
    let a = laplacian_1d(n);
    let smoother = ChebyshevSmoother::new(&a, jacobi_of(n), &ChebyshevSettings::smoother());
    let b = DVector::from_fn(n, |i, _| (i as f64).sqrt());

    let mut x = DVector::zeros(n);
    ConjugateGradient::new()
        .with_operator(&a)
        .with_preconditioner(smoother.as_preconditioner(&a))
        .with_stopping_criterion(RelativeResidualCriterion::new(1e-12))
        .solve_with_guess(&b, &mut x)
        .unwrap();

    let x_direct = dense(&a).lu().solve(&b).unwrap();
    assert_matrix_eq!(x, x_direct, comp = abs, tol = 1e-8);
}
