//! Poiseuille flow through a channel with a variable viscosity.
//!
//! Usage: `cargo run --release --example poiseuille [settings.json]`
use eyre::eyre;
use fenris_stokes::coefficients::{CellAveraging, CoefficientModel, ConstantViscosity, PointwiseViscosity};
use fenris_stokes::discretization::{BoundaryConditions, StokesDiscretization, UniformGrid};
use fenris_stokes::nalgebra::{Point2, Vector2};
use fenris_stokes::normalize::{NullspaceDescriptor, PostSolveNormalizer, PressureNormalization};
use fenris_stokes::{BlockVector, SolveMode, StokesSolver, StokesSolverSettings, StokesSystem};
use std::fs;

fn main() -> eyre::Result<()> {
    let settings: StokesSolverSettings = match std::env::args().nth(1) {
        Some(path) => {
            let json = fs::read_to_string(&path).map_err(|err| eyre!("Cannot read settings file {}: {}", path, err))?;
            serde_json::from_str(&json)?
        }
        None => StokesSolverSettings::default(),
    };

    let grid = UniformGrid::new(Point2::origin(), Vector2::new(4.0, 1.0), 4, 1);
    let discretization = StokesDiscretization::new(grid, 4, BoundaryConditions::default());
    let nullspace = NullspaceDescriptor {
        constant_pressure: true,
        ..NullspaceDescriptor::default()
    };
    let normalizer = PostSolveNormalizer::new(&discretization, nullspace, PressureNormalization::Volume);

    let inflow = |x: &Point2<f64>| Vector2::new(4.0 * x.y * (1.0 - x.y), 0.0);
    let layout = discretization.layout();
    let system = StokesSystem {
        rhs: BlockVector::zeros(layout),
        boundary_values: discretization.boundary_values(inflow),
    };
    println!(
        "{} velocity and {} pressure unknowns on {} levels",
        layout.n_velocity(),
        layout.n_pressure(),
        discretization.n_levels()
    );

    let mut solver = StokesSolver::new(discretization, settings).with_normalizer(normalizer);
    let mut solution = BlockVector::zeros(layout);

    // Viscosity increasing towards the walls, then a uniform fluid for comparison
    let models: Vec<(&str, Box<dyn CoefficientModel>)> = vec![
        (
            "layered",
            Box::new(PointwiseViscosity(|x: &Point2<f64>| 1.0 + 10.0 * (2.0 * x.y - 1.0).powi(2))),
        ),
        ("uniform", Box::new(ConstantViscosity(1.0))),
    ];
    for (name, model) in &models {
        solver.update_coefficient_model(model.as_ref(), CellAveraging::Harmonic)?;
        let report = solver.solve(&system, &mut solution, SolveMode::Picard)?;
        println!(
            "{name}: {}+{} iterations ({} A, {} S), residual {:.3e} -> {:.3e} in the {} phase",
            report.cheap_iterations,
            report.expensive_iterations,
            report.a_block_iterations,
            report.s_block_iterations,
            report.initial_nonlinear_residual,
            report.final_linear_residual,
            report.phase
        );
    }

    let exact = solver
        .discretization()
        .interpolate_pressure(|x: &Point2<f64>| 8.0 * (2.0 - x.x));
    let pressure_error = (&solution.pressure() - &exact).amax();
    println!("Max pressure error of the uniform solution: {:.3e}", pressure_error);
    Ok(())
}
