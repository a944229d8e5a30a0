use crate::{layered_viscosity, prescribed_box};
use fenris_krylov::cg::{ConjugateGradient, RelativeResidualCriterion};
use fenris_krylov::LinearOperator;
use fenris_stokes::coefficients::CoefficientTable;
use fenris_stokes::discretization::{BoundaryConditions, BoundaryKind, StokesDiscretization, UniformGrid};
use fenris_stokes::multigrid::{LevelOperator, MultigridSettings, Transfer, VelocityMultigrid};
use fenris_stokes::operator::OperatorKind;
use matrixcompare::assert_matrix_eq;
use nalgebra::{DVector, Point2, Vector2};
use std::sync::Arc;

fn biquadratic(x: &Point2<f64>) -> Vector2<f64> {
    Vector2::new(x.x * x.x * x.y - 0.5 * x.y, 1.0 - x.x * x.y * x.y + 2.0 * x.x)
}

fn interpolate(discretization: &StokesDiscretization, level: usize) -> DVector<f64> {
    let grid = &discretization.level(level).grid;
    let mut values = DVector::zeros(grid.n_velocity_dofs());
    for node in 0..grid.n_velocity_nodes() {
        let u = biquadratic(&grid.velocity_node_position(node));
        values[2 * node] = u.x;
        values[2 * node + 1] = u.y;
    }
    values
}

#[test]
fn prolongation_reproduces_biquadratic_fields() {
    let grid = UniformGrid::new(Point2::new(-1.0, 0.5), Vector2::new(2.0, 1.5), 3, 2);
    let discretization = StokesDiscretization::new(grid, 2, BoundaryConditions::all(BoundaryKind::Open));
    let transfer = Transfer::new(discretization.level(0), discretization.level(1));
    assert_eq!(transfer.n_coarse(), discretization.level(0).n_velocity_dofs());
    assert_eq!(transfer.n_fine(), discretization.level(1).n_velocity_dofs());

    let coarse = interpolate(&discretization, 0);
    let mut fine = DVector::zeros(transfer.n_fine());
    transfer.prolongate_add((&mut fine).into(), (&coarse).into());
    assert_matrix_eq!(fine, interpolate(&discretization, 1), comp = abs, tol = 1e-12);
}

#[test]
fn restriction_is_transpose_of_prolongation() {
    let discretization = prescribed_box(2);
    let transfer = Transfer::new(discretization.level(0), discretization.level(1));
    let fine = DVector::from_fn(transfer.n_fine(), |i, _| ((i * 7) % 11) as f64 - 5.0);
    let coarse = DVector::from_fn(transfer.n_coarse(), |i, _| ((i * 3) % 5) as f64 * 0.5);

    let mut prolongated = DVector::zeros(transfer.n_fine());
    transfer.prolongate_add((&mut prolongated).into(), (&coarse).into());
    let restricted = transfer.restrict((&fine).into());
    let lhs = fine.dot(&prolongated);
    let rhs = restricted.dot(&coarse);
    assert!((lhs - rhs).abs() <= 1e-12 * lhs.abs().max(1.0));
}

#[test]
fn transfer_never_touches_constrained_dofs() {
    let discretization = prescribed_box(2);
    let (coarse_level, fine_level) = (discretization.level(0), discretization.level(1));
    let transfer = Transfer::new(coarse_level, fine_level);
    for (row, col, _) in transfer.prolongation().triplet_iter() {
        assert!(!fine_level.constraints.is_constrained(row));
        assert!(!coarse_level.constraints.is_constrained(col));
    }
}

#[test]
fn level_operator_diagonals_agree() {
    let discretization = prescribed_box(2);
    let coefficients = layered_viscosity(&discretization);
    let level = Arc::clone(discretization.active());
    let viscosity = coefficients.active();
    let matrix_free = LevelOperator::new(OperatorKind::MatrixFree, Arc::clone(&level), viscosity);
    let assembled = LevelOperator::new(OperatorKind::Assembled, level, viscosity);
    assert_matrix_eq!(matrix_free.diagonal(), assembled.diagonal(), comp = abs, tol = 1e-12);
}

#[test]
fn vcycle_iteration_reduces_the_residual() {
    let discretization = prescribed_box(3);
    let coefficients = CoefficientTable::constant(&discretization, 1.0).unwrap();
    let multigrid = VelocityMultigrid::new(
        &discretization,
        &coefficients,
        &MultigridSettings::default(),
        OperatorKind::MatrixFree,
    );
    assert_eq!(multigrid.n_levels(), 3);
    assert_eq!(multigrid.generation(), coefficients.generation());

    let operator = multigrid.level(2).operator();
    let n = multigrid.n_dofs();
    let mut b = discretization.assemble_body_force(|x| Vector2::new(x.y.sin(), 1.0 - x.x));
    discretization.active().constraints.set_zero(&mut b);

    let mut x = DVector::zeros(n);
    let mut residual = b.clone();
    let initial = residual.norm();
    let mut correction = DVector::zeros(n);
    for _ in 0..8 {
        multigrid
            .vcycle((&mut correction).into(), (&residual).into())
            .unwrap();
        x += &correction;
        operator.apply((&mut residual).into(), (&x).into()).unwrap();
        residual = &b - &residual;
    }
    assert!(residual.norm() < 1e-3 * initial, "{} vs {}", residual.norm(), initial);
}

#[test]
fn multigrid_preconditioned_cg_converges_with_variable_viscosity() {
    let discretization = prescribed_box(3);
    let coefficients = layered_viscosity(&discretization);
    for kind in [OperatorKind::MatrixFree, OperatorKind::Assembled] {
        let multigrid = VelocityMultigrid::new(&discretization, &coefficients, &MultigridSettings::default(), kind);
        let operator = multigrid.level(2).operator();
        let mut b = discretization.assemble_body_force(|x| Vector2::new(1.0, x.x * x.y));
        discretization.active().constraints.set_zero(&mut b);

        let mut x = DVector::zeros(multigrid.n_dofs());
        let output = ConjugateGradient::new()
            .with_operator(operator)
            .with_preconditioner(&multigrid)
            .with_stopping_criterion(RelativeResidualCriterion::new(1e-8))
            .with_max_iter(60)
            .solve_with_guess(&b, &mut x)
            .unwrap();
        assert!(output.num_iterations < 60);
    }
}

#[test]
fn vcycle_copies_constrained_entries() {
    let discretization = prescribed_box(2);
    let coefficients = layered_viscosity(&discretization);
    let multigrid = VelocityMultigrid::new(
        &discretization,
        &coefficients,
        &MultigridSettings::default(),
        OperatorKind::Assembled,
    );
    let constraints = &discretization.active().constraints;
    let src = DVector::from_fn(multigrid.n_dofs(), |i, _| 1.0 + (i % 5) as f64);
    let mut dst = DVector::zeros(multigrid.n_dofs());
    multigrid.vcycle((&mut dst).into(), (&src).into()).unwrap();
    for dof in constraints.constrained_dofs() {
        assert_eq!(dst[dof], src[dof]);
    }
}

#[test]
fn coarse_level_uses_solver_settings() {
    let settings = MultigridSettings::default();
    let coarse = settings.chebyshev_settings(0, 42);
    assert_eq!(coarse.degree, None);
    assert_eq!(coarse.eig_cg_n_iterations, 42);
    assert_eq!(coarse.smoothing_range, settings.coarse_smoothing_range);

    let fine = settings.chebyshev_settings(2, 42);
    assert_eq!(fine.degree, Some(settings.smoother_degree));
    assert_eq!(fine.eig_cg_n_iterations, settings.eig_cg_n_iterations);
}
