use crate::{channel, prescribed_box};
use fenris_stokes::discretization::Side;
use nalgebra::Vector2;

#[test]
fn level_sizes_follow_refinement() {
    let discretization = prescribed_box(3);
    assert_eq!(discretization.n_levels(), 3);
    assert_eq!(discretization.active_level(), 2);

    let sizes: Vec<_> = (0..3)
        .map(|l| {
            let level = discretization.level(l);
            (level.grid.n_cells(), level.n_velocity_dofs(), level.n_pressure_dofs())
        })
        .collect();
    assert_eq!(sizes, vec![(4, 50, 9), (16, 162, 25), (64, 578, 81)]);
    assert_eq!(discretization.layout().len(), 578 + 81);
}

#[test]
fn prescribed_boundary_constrains_both_components() {
    let discretization = prescribed_box(2);
    let level = discretization.active();
    // 9 x 9 velocity nodes, 32 of them on the boundary
    assert_eq!(level.constraints.n_constrained(), 64);
    for side in Side::ALL {
        for node in level.grid.velocity_nodes_on_side(side) {
            assert!(level.constraints.is_constrained(2 * node));
            assert!(level.constraints.is_constrained(2 * node + 1));
        }
    }
    let center = level.grid.velocity_node_index(4, 4);
    assert!(!level.constraints.is_constrained(2 * center));
}

#[test]
fn mixed_boundary_constrains_expected_components() {
    let discretization = channel(1);
    let level = discretization.active();
    let grid = &level.grid;
    let constraints = &level.constraints;

    let inflow = grid.velocity_node_index(0, 1);
    assert!(constraints.is_constrained(2 * inflow) && constraints.is_constrained(2 * inflow + 1));

    // Free slip: only the normal component
    let bottom = grid.velocity_node_index(2, 0);
    assert!(!constraints.is_constrained(2 * bottom));
    assert!(constraints.is_constrained(2 * bottom + 1));

    let outflow = grid.velocity_node_index(4, 1);
    assert!(!constraints.is_constrained(2 * outflow));
    assert!(!constraints.is_constrained(2 * outflow + 1));

    // Corner shared by the open outflow and a free-slip wall
    let corner = grid.velocity_node_index(4, 2);
    assert!(!constraints.is_constrained(2 * corner));
    assert!(constraints.is_constrained(2 * corner + 1));
}

#[test]
fn pressure_weights_integrate_constants() {
    let discretization = channel(2);
    assert!((discretization.pressure_volume_weights().sum() - 2.0).abs() < 1e-12);
    assert!((discretization.pressure_surface_weights().sum() - 2.0).abs() < 1e-12);
    assert!(discretization.pressure_volume_weights().iter().all(|w| *w > 0.0));
}

#[test]
fn body_force_load_integrates_constant_force() {
    let discretization = prescribed_box(2);
    let load = discretization.assemble_body_force(|_| Vector2::new(0.0, -3.0));
    let x_total: f64 = load.iter().step_by(2).sum();
    let y_total: f64 = load.iter().skip(1).step_by(2).sum();
    assert!(x_total.abs() < 1e-12);
    assert!((y_total + 3.0).abs() < 1e-12);
}

#[test]
fn boundary_values_vanish_on_free_dofs() {
    let discretization = prescribed_box(1);
    let constraints = &discretization.active().constraints;
    let g = discretization.boundary_values(|x| Vector2::new(1.0 + x.x, x.y));
    for (dof, value) in g.iter().enumerate() {
        if !constraints.is_constrained(dof) {
            assert_eq!(*value, 0.0);
        }
    }
    let left_bottom = discretization.active().grid.velocity_node_index(0, 0);
    assert_eq!(g[2 * left_bottom], 1.0);
}
