use crate::{channel, layered_viscosity, prescribed_box};
use fenris_stokes::coefficients::CoefficientTable;
use fenris_stokes::discretization::StokesDiscretization;
use fenris_stokes::layout::BlockVector;
use fenris_stokes::operator::{condense_rhs, OperatorKind, StokesBlockOperator, StokesOperator};
use matrixcompare::assert_matrix_eq;
use nalgebra::{DVector, Vector2};
use proptest::collection::vec;
use proptest::prelude::*;

fn build(kind: OperatorKind, discretization: &StokesDiscretization, coefficients: &CoefficientTable) -> StokesOperator {
    StokesOperator::new(kind, discretization.active().clone(), coefficients, 0.7)
}

fn block_vector(discretization: &StokesDiscretization, values: &[f64]) -> BlockVector {
    let layout = discretization.layout();
    BlockVector::from_vector(layout, DVector::from_fn(layout.len(), |i, _| values[i % values.len()]))
}

#[test]
fn operator_kind_is_recorded() {
    let discretization = prescribed_box(1);
    let coefficients = CoefficientTable::constant(&discretization, 1.0).unwrap();
    for kind in [OperatorKind::MatrixFree, OperatorKind::Assembled] {
        let operator = build(kind, &discretization, &coefficients);
        assert_eq!(operator.kind(), kind);
        assert_eq!(operator.generation(), coefficients.generation());
        assert_eq!(operator.pressure_scaling(), 0.7);
        assert_eq!(operator.layout(), discretization.layout());
    }
}

#[test]
#[should_panic(expected = "Pressure scaling must be positive")]
fn non_positive_pressure_scaling_panics() {
    let discretization = prescribed_box(1);
    let coefficients = CoefficientTable::constant(&discretization, 1.0).unwrap();
    StokesOperator::new(OperatorKind::MatrixFree, discretization.active().clone(), &coefficients, 0.0);
}

#[test]
fn constrained_rows_are_identity_rows() {
    let discretization = channel(2);
    let coefficients = layered_viscosity(&discretization);
    let x = block_vector(&discretization, &[0.3, -1.2, 0.8, 2.0, -0.4]);
    for kind in [OperatorKind::MatrixFree, OperatorKind::Assembled] {
        let operator = build(kind, &discretization, &coefficients);
        let mut y = operator.initialize_vector();
        operator.apply(&mut y, &x);
        for dof in operator.constraints().constrained_dofs() {
            assert_eq!(y.velocity()[dof], x.velocity()[dof]);
        }
    }
}

#[test]
fn coupling_ignores_constrained_velocity_entries() {
    let discretization = prescribed_box(2);
    let coefficients = layered_viscosity(&discretization);
    let mut x = operator_input_on_constrained_dofs(&discretization);
    x.pressure_mut().fill(0.0);
    for kind in [OperatorKind::MatrixFree, OperatorKind::Assembled] {
        let operator = build(kind, &discretization, &coefficients);
        let mut y = operator.initialize_vector();
        operator.apply(&mut y, &x);
        assert!(y.pressure().norm() == 0.0);
        for dof in 0..discretization.layout().n_velocity() {
            if !operator.constraints().is_constrained(dof) {
                assert_eq!(y.velocity()[dof], 0.0);
            }
        }
    }
}

fn operator_input_on_constrained_dofs(discretization: &StokesDiscretization) -> BlockVector {
    let g = discretization.boundary_values(|x| Vector2::new(1.0 + x.y, x.x * x.x));
    BlockVector::from_parts(&g, &DVector::zeros(discretization.layout().n_pressure()))
}

#[test]
fn operator_is_symmetric() {
    let discretization = channel(2);
    let coefficients = layered_viscosity(&discretization);
    let x = block_vector(&discretization, &[0.3, -1.2, 0.8, 2.0, -0.4]);
    let y = block_vector(&discretization, &[1.0, 0.1, -0.7]);
    for kind in [OperatorKind::MatrixFree, OperatorKind::Assembled] {
        let operator = build(kind, &discretization, &coefficients);
        let mut kx = operator.initialize_vector();
        let mut ky = operator.initialize_vector();
        operator.apply(&mut kx, &x);
        operator.apply(&mut ky, &y);
        let lhs = y.as_vector().dot(kx.as_vector());
        let rhs = x.as_vector().dot(ky.as_vector());
        assert!((lhs - rhs).abs() <= 1e-12 * lhs.abs().max(1.0));
    }
}

#[test]
fn condensed_rhs_vanishes_on_constrained_rows() {
    let discretization = prescribed_box(2);
    let coefficients = layered_viscosity(&discretization);
    let g = discretization.boundary_values(|x| Vector2::new(x.y, -x.x));
    let rhs = block_vector(&discretization, &[1.0, 2.0, -0.5]);

    let mut condensed_by_kind = Vec::new();
    for kind in [OperatorKind::MatrixFree, OperatorKind::Assembled] {
        let operator = build(kind, &discretization, &coefficients);
        let condensed = condense_rhs(&operator, &rhs, &g);
        for dof in operator.constraints().constrained_dofs() {
            assert_eq!(condensed.velocity()[dof], 0.0);
        }
        condensed_by_kind.push(condensed);
    }
    assert_matrix_eq!(
        condensed_by_kind[0].as_vector(),
        condensed_by_kind[1].as_vector(),
        comp = abs,
        tol = 1e-10
    );
}

#[test]
fn divergence_free_field_has_zero_discrete_divergence() {
    let discretization = prescribed_box(2);
    let coefficients = CoefficientTable::constant(&discretization, 1.0).unwrap();
    let velocity = |x: &nalgebra::Point2<f64>| Vector2::new(x.y * (1.0 - x.y), 0.0);
    let g = discretization.boundary_values(velocity);
    let mut u_free = discretization.interpolate_velocity(velocity);
    discretization.active().constraints.set_zero(&mut u_free);

    for kind in [OperatorKind::MatrixFree, OperatorKind::Assembled] {
        let operator = build(kind, &discretization, &coefficients);
        let zero_rhs = operator.initialize_vector();
        // -B g
        let condensed = condense_rhs(&operator, &zero_rhs, &g);
        let x = BlockVector::from_parts(&u_free, &DVector::zeros(discretization.layout().n_pressure()));
        let mut kx = operator.initialize_vector();
        operator.apply(&mut kx, &x);
        assert_matrix_eq!(kx.pressure(), condensed.pressure(), comp = abs, tol = 1e-11);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn residual_is_rhs_minus_operator_action(
        x_values in vec(-10.0f64..10.0, 1..40),
        b_values in vec(-10.0f64..10.0, 1..40),
        assembled in any::<bool>(),
    ) {
        let discretization = channel(1);
        let coefficients = layered_viscosity(&discretization);
        let kind = if assembled { OperatorKind::Assembled } else { OperatorKind::MatrixFree };
        let operator = build(kind, &discretization, &coefficients);
        let x = block_vector(&discretization, &x_values);
        let b = block_vector(&discretization, &b_values);

        let mut residual = operator.initialize_vector();
        let norm = operator.residual(&mut residual, &x, &b);
        let mut kx = operator.initialize_vector();
        operator.apply(&mut kx, &x);
        let expected = b.as_vector() - kx.as_vector();
        assert_matrix_eq!(residual.as_vector(), expected, comp = abs, tol = 1e-12);
        prop_assert!((norm - expected.norm()).abs() <= 1e-12 * norm.max(1.0));
    }

    #[test]
    fn assembled_and_matrix_free_operators_agree(
        x_values in vec(-1.0f64..1.0, 1..60),
    ) {
        let discretization = channel(2);
        let coefficients = layered_viscosity(&discretization);
        let x = block_vector(&discretization, &x_values);
        let matrix_free = build(OperatorKind::MatrixFree, &discretization, &coefficients);
        let assembled = build(OperatorKind::Assembled, &discretization, &coefficients);

        let mut y_mf = matrix_free.initialize_vector();
        let mut y_asm = assembled.initialize_vector();
        matrix_free.apply(&mut y_mf, &x);
        assembled.apply(&mut y_asm, &x);
        assert_matrix_eq!(y_mf.as_vector(), y_asm.as_vector(), comp = abs, tol = 1e-10);
    }
}
