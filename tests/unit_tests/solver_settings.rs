use crate::prescribed_box;
use fenris_stokes::coefficients::{CellAveraging, CoefficientTable};
use fenris_stokes::operator::OperatorKind;
use fenris_stokes::schur::MassPreconditionerKind;
use fenris_stokes::solver::{PressureScaling, SolverPhase, StokesSolverSettings};
use matrixcompare::assert_matrix_eq;
use nalgebra::DVector;
use proptest::collection::vec;
use proptest::prelude::*;
use std::path::PathBuf;

#[test]
fn default_settings() {
    let settings = StokesSolverSettings::default();
    assert_eq!(settings.n_cheap_stokes_solver_steps, 200);
    assert_eq!(settings.n_expensive_stokes_solver_steps, 1000);
    assert_eq!(settings.linear_stokes_solver_tolerance, 1e-7);
    assert_eq!(settings.cheap_gmres_restart_length, 50);
    assert_eq!(settings.expensive_gmres_restart_length, 100);
    assert_eq!(settings.near_zero_pressure_threshold, 1e-50);
    assert!(!settings.do_direct_solve);
    assert_eq!(settings.operator, OperatorKind::MatrixFree);
    assert_eq!(settings.pressure_scaling, None);
    assert_eq!(settings.diagnostics_directory(), PathBuf::from("."));

    let inner = settings.inner_solve_settings();
    assert_eq!(inner.a_block_tolerance, settings.a_block_tolerance);
    assert_eq!(inner.max_s_block_iterations, settings.max_s_block_iterations);
}

#[test]
fn partial_json_keeps_remaining_defaults() {
    let json = r#"{
        "n_cheap_stokes_solver_steps": 0,
        "operator": "Assembled",
        "mass_preconditioner": "Diagonal",
        "multigrid": { "smoother_degree": 2 },
        "output_directory": "out"
    }"#;
    let settings: StokesSolverSettings = serde_json::from_str(json).unwrap();
    assert_eq!(settings.n_cheap_stokes_solver_steps, 0);
    assert_eq!(settings.operator, OperatorKind::Assembled);
    assert_eq!(settings.mass_preconditioner, MassPreconditionerKind::Diagonal);
    assert_eq!(settings.multigrid.smoother_degree, 2);
    assert_eq!(settings.multigrid.smoothing_range, 15.0);
    assert_eq!(settings.n_expensive_stokes_solver_steps, 1000);
    assert_eq!(settings.diagnostics_directory(), PathBuf::from("out"));
}

#[test]
fn settings_survive_serialization() {
    let settings = StokesSolverSettings {
        do_direct_solve: true,
        pressure_scaling: Some(0.25),
        ..StokesSolverSettings::default()
    };
    let json = serde_json::to_string(&settings).unwrap();
    let parsed: StokesSolverSettings = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, settings);
}

#[test]
fn phase_names() {
    assert_eq!(SolverPhase::Cheap.to_string(), "cheap");
    assert_eq!(SolverPhase::Expensive.name(), "expensive");
    assert_eq!(SolverPhase::Direct.name(), "direct");
}

#[test]
fn pressure_scaling_from_coefficients() {
    let discretization = prescribed_box(2);
    let n_cells = discretization.active().grid.n_cells();
    let values = DVector::from_fn(n_cells, |i, _| if i % 2 == 0 { 1.0 } else { 3.0 });
    let coefficients = CoefficientTable::from_active_values(&discretization, values, CellAveraging::Harmonic).unwrap();
    let scaling = PressureScaling::from_coefficients(&discretization, &coefficients);
    assert!((scaling.value() - 2.0).abs() < 1e-14);
}

#[test]
#[should_panic(expected = "Pressure scaling must be positive")]
fn negative_pressure_scaling_panics() {
    PressureScaling::new(-1.0);
}

proptest! {
    #[test]
    fn unscale_inverts_scale(
        ps in 1e-6f64..1e6,
        values in vec(-1e3f64..1e3, 1..20),
    ) {
        let scaling = PressureScaling::new(ps);
        let original = DVector::from_vec(values);
        let mut p = original.clone();
        scaling.scale(&mut p);
        scaling.unscale(&mut p);
        assert_matrix_eq!(p, original, comp = abs, tol = 1e-10);
    }
}
