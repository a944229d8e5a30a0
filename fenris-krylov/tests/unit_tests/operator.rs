use crate::{dense, laplacian_1d};
use fenris_krylov::operator::apply_operator;
use fenris_krylov::{DiagonalOperator, IdentityOperator};
use matrixcompare::assert_matrix_eq;
use nalgebra::{dvector, DVector};

#[test]
fn csr_and_dense_operators_agree() {
    let a = laplacian_1d(6);
    let a_dense = dense(&a);
    let x = DVector::from_fn(6, |i, _| (i as f64).sin());

    let mut y_sparse = DVector::zeros(6);
    let mut y_dense = DVector::zeros(6);
    apply_operator(&mut y_sparse, &a, &x).unwrap();
    apply_operator(&mut y_dense, &a_dense, &x).unwrap();

    let expected = &a_dense * &x;
    assert_matrix_eq!(y_sparse, y_dense, comp = abs, tol = 1e-14);
    assert_matrix_eq!(y_dense, expected, comp = abs, tol = 1e-14);
}

#[test]
fn identity_operator_copies() {
    let x = dvector![1.0, -2.0, 3.0];
    let mut y = DVector::zeros(3);
    apply_operator(&mut y, &IdentityOperator, &x).unwrap();
    assert_eq!(y, x);
}

#[test]
fn diagonal_operator_from_inverse_skips_zeros() {
    let d = dvector![2.0, 0.0, 4.0];
    let jacobi = DiagonalOperator::from_inverse_of(&d);
    assert_eq!(jacobi.diagonal(), &dvector![0.5, 0.0, 0.25]);

    let mut y = DVector::zeros(3);
    apply_operator(&mut y, &jacobi, &dvector![1.0, 1.0, 1.0]).unwrap();
    assert_eq!(y, dvector![0.5, 0.0, 0.25]);
}
