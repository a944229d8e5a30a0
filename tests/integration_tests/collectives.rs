use crate::{diagnostics_directory, poiseuille_velocity};
use fenris_stokes::comm::Communicator;
use fenris_stokes::coefficients::CoefficientTable;
use fenris_stokes::discretization::{BoundaryConditions, StokesDiscretization, UniformGrid};
use fenris_stokes::error::StokesSolveError;
use fenris_stokes::solver::SolverPhase;
use fenris_stokes::{BlockVector, SolveMode, StokesSolver, StokesSolverSettings, StokesSystem};
use std::cell::Cell;

/// Counts agreement calls. If `remote_failure` is set, some other worker always reports a failure.
struct CountingCommunicator {
    rank: usize,
    remote_failure: bool,
    any_calls: Cell<usize>,
}

impl CountingCommunicator {
    fn new(rank: usize, remote_failure: bool) -> Self {
        Self {
            rank,
            remote_failure,
            any_calls: Cell::new(0),
        }
    }
}

impl Communicator for CountingCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        2
    }

    fn any(&self, flag: bool) -> bool {
        self.any_calls.set(self.any_calls.get() + 1);
        flag || self.remote_failure
    }
}

fn channel_solver(
    settings: StokesSolverSettings,
    comm: CountingCommunicator,
) -> (StokesSolver<CountingCommunicator>, StokesSystem) {
    let discretization = StokesDiscretization::new(UniformGrid::unit_square(1), 2, BoundaryConditions::default());
    let coefficients = CoefficientTable::constant(&discretization, 1.0).unwrap();
    let system = StokesSystem {
        rhs: BlockVector::zeros(discretization.layout()),
        boundary_values: discretization.boundary_values(poiseuille_velocity),
    };
    let settings = StokesSolverSettings {
        pressure_scaling: Some(1.0),
        ..settings
    };
    let mut solver = StokesSolver::with_communicator(discretization, settings, comm);
    solver.update_coefficients(coefficients);
    (solver, system)
}

#[test]
fn successful_solves_agree_on_their_outcome_once() {
    for do_direct_solve in [false, true] {
        let settings = StokesSolverSettings {
            do_direct_solve,
            ..StokesSolverSettings::default()
        };
        let (mut solver, system) = channel_solver(settings, CountingCommunicator::new(0, false));
        let mut solution = BlockVector::zeros(system.rhs.layout());
        let report = solver
            .solve(&system, &mut solution, SolveMode::Picard)
            .unwrap();
        assert_ne!(report.phase, SolverPhase::Expensive);
        assert_eq!(solver.communicator().any_calls.get(), 1, "direct: {}", do_direct_solve);
    }
}

#[test]
fn direct_solve_fails_on_every_worker_when_one_fails() {
    for rank in [0, 1] {
        let settings = StokesSolverSettings {
            do_direct_solve: true,
            ..StokesSolverSettings::default()
        };
        let (mut solver, system) = channel_solver(settings, CountingCommunicator::new(rank, true));
        let mut solution = BlockVector::zeros(system.rhs.layout());
        let err = solver
            .solve(&system, &mut solution, SolveMode::Picard)
            .unwrap_err();

        assert_eq!(solver.communicator().any_calls.get(), 1);
        if rank == 0 {
            assert!(matches!(err, StokesSolveError::DirectSolveFailed(_)), "{:?}", err);
        } else {
            assert!(matches!(err, StokesSolveError::Quiet), "{:?}", err);
        }
        assert_eq!(solution, BlockVector::zeros(system.rhs.layout()));
    }
}

#[test]
fn iterative_solve_escalates_when_another_worker_fails() {
    let settings = StokesSolverSettings {
        output_directory: Some(diagnostics_directory("remote-failure")),
        ..StokesSolverSettings::default()
    };
    let (mut solver, system) = channel_solver(settings, CountingCommunicator::new(0, true));
    let mut solution = BlockVector::zeros(system.rhs.layout());
    let err = solver
        .solve(&system, &mut solution, SolveMode::Picard)
        .unwrap_err();

    // One agreement per phase
    assert_eq!(solver.communicator().any_calls.get(), 2);
    match err {
        StokesSolveError::Fatal { phase, .. } => assert_eq!(phase, SolverPhase::Expensive),
        other => panic!("Expected a fatal failure, got {:?}", other),
    }
}
