//! Dense direct solve of the saddle-point system for small problems.
use crate::error::StokesSolveError;
use crate::operator::StokesBlockOperator;
use nalgebra::{DMatrix, DVector};

const SINGULAR_VALUE_EPS: f64 = 1e-12;

/// Builds the dense matrix of the operator column by column.
pub fn dense_matrix<O: ?Sized + StokesBlockOperator>(operator: &O) -> DMatrix<f64> {
    let n = operator.layout().len();
    let mut matrix = DMatrix::zeros(n, n);
    let mut unit = DVector::zeros(n);
    for j in 0..n {
        unit[j] = 1.0;
        operator.apply_flat(matrix.column_mut(j).into(), (&unit).into());
        unit[j] = 0.0;
    }
    matrix
}

/// Solves `K x = b` with an SVD pseudo-inverse. Singular values below a relative threshold
/// are discarded, which makes the solve well defined when the pressure is only determined
/// up to a constant.
pub fn solve<O: ?Sized + StokesBlockOperator>(operator: &O, b: &DVector<f64>) -> Result<DVector<f64>, StokesSolveError> {
    let matrix = dense_matrix(operator);
    let svd = matrix.svd(true, true);
    let max_singular_value = svd.singular_values.max();
    if !max_singular_value.is_finite() {
        return Err(StokesSolveError::DirectSolveFailed(String::from(
            "System matrix contains non-finite values",
        )));
    }
    let eps = SINGULAR_VALUE_EPS * max_singular_value;
    svd.solve(b, eps)
        .map_err(|msg| StokesSolveError::DirectSolveFailed(msg.to_string()))
}
