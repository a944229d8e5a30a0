use crate::{diagnostics_directory, PoiseuilleProblem};
use fenris_stokes::comm::Communicator;
use fenris_stokes::coefficients::CoefficientTable;
use fenris_stokes::discretization::{BoundaryConditions, StokesDiscretization, UniformGrid};
use fenris_stokes::error::StokesSolveError;
use fenris_stokes::solver::SolverPhase;
use fenris_stokes::{BlockVector, SolveMode, StokesSolver, StokesSolverSettings, StokesSystem};
use nalgebra::Vector2;
use std::fs;

/// The second of two workers, where the first worker always agrees with the local outcome.
struct SecondWorker;

impl Communicator for SecondWorker {
    fn rank(&self) -> usize {
        1
    }

    fn size(&self) -> usize {
        2
    }

    fn any(&self, flag: bool) -> bool {
        flag
    }
}

fn hopeless_settings(name: &str) -> StokesSolverSettings {
    StokesSolverSettings {
        n_cheap_stokes_solver_steps: 1,
        n_expensive_stokes_solver_steps: 1,
        linear_stokes_solver_tolerance: 1e-14,
        output_directory: Some(diagnostics_directory(name)),
        ..StokesSolverSettings::default()
    }
}

#[test]
fn coordinator_reports_fatal_failure_with_histories() {
    let settings = hopeless_settings("coordinator");
    let directory = settings.diagnostics_directory();
    let mut problem = PoiseuilleProblem::new(settings);
    let mut solution = problem.zero_guess();
    let err = problem
        .solver
        .solve(&problem.system, &mut solution, SolveMode::Picard)
        .unwrap_err();

    match err {
        StokesSolveError::Fatal {
            phase,
            iterations,
            history_files,
            ..
        } => {
            assert_eq!(phase, SolverPhase::Expensive);
            assert_eq!(iterations, 1);
            assert_eq!(
                history_files,
                vec![
                    directory.join("solver_history_cheap.txt"),
                    directory.join("solver_history_expensive.txt")
                ]
            );
            for file in &history_files {
                let contents = fs::read_to_string(file).unwrap();
                let lines: Vec<_> = contents.lines().collect();
                // Initial residual and one iteration
                assert_eq!(lines.len(), 2);
                assert!(lines[0].starts_with("0 "));
                assert!(lines[1].starts_with("1 "));
            }
        }
        other => panic!("Expected a fatal failure, got {:?}", other),
    }
    // The guess is left untouched
    assert_eq!(solution, problem.zero_guess());
}

#[test]
fn other_workers_fail_quietly() {
    let settings = hopeless_settings("worker");
    let directory = settings.diagnostics_directory();
    let discretization = StokesDiscretization::new(UniformGrid::unit_square(1), 2, BoundaryConditions::default());
    let coefficients = CoefficientTable::constant(&discretization, 1.0).unwrap();
    let layout = discretization.layout();
    let system = StokesSystem {
        rhs: BlockVector::zeros(layout),
        boundary_values: discretization.boundary_values(|x| Vector2::new(x.y * (1.0 - x.y), 0.0)),
    };

    let mut solver = StokesSolver::with_communicator(discretization, settings, SecondWorker);
    solver.update_coefficients(coefficients);
    assert!(!solver.communicator().is_coordinator());
    let mut solution = BlockVector::zeros(layout);
    let err = solver
        .solve(&system, &mut solution, SolveMode::Picard)
        .unwrap_err();
    assert!(matches!(err, StokesSolveError::Quiet));
    assert!(!directory.exists());
}

#[test]
fn failed_inner_solve_writes_block_history() {
    let settings = StokesSolverSettings {
        n_cheap_stokes_solver_steps: 0,
        a_block_tolerance: 1e-14,
        max_a_block_iterations: 1,
        ..hopeless_settings("inner")
    };
    let directory = settings.diagnostics_directory();
    let mut problem = PoiseuilleProblem::new(settings);
    let mut solution = problem.zero_guess();
    let err = problem
        .solver
        .solve(&problem.system, &mut solution, SolveMode::Picard)
        .unwrap_err();

    let history = directory.join("solver_history_A.txt");
    assert!(history.exists());
    let message = err.to_string();
    assert!(message.contains("expensive"), "{}", message);
    assert!(message.contains("preconditioner"), "{}", message);
}
