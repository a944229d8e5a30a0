use crate::prescribed_box;
use fenris_stokes::coefficients::{
    restrict_cell_values, CellAveraging, CoefficientTable, ConstantViscosity, PointwiseViscosity,
};
use fenris_stokes::discretization::UniformGrid;
use nalgebra::{DVector, Point2};
use proptest::collection::vec;
use proptest::prelude::*;

const ALL_AVERAGING: [CellAveraging; 4] = [
    CellAveraging::Arithmetic,
    CellAveraging::Harmonic,
    CellAveraging::Geometric,
    CellAveraging::PickLargest,
];

#[test]
fn averaging_of_two_values() {
    let values = [1.0, 4.0];
    assert_eq!(CellAveraging::Arithmetic.average(&values), 2.5);
    assert!((CellAveraging::Harmonic.average(&values) - 1.6).abs() < 1e-14);
    assert!((CellAveraging::Geometric.average(&values) - 2.0).abs() < 1e-14);
    assert_eq!(CellAveraging::PickLargest.average(&values), 4.0);
}

#[test]
fn constant_table_is_constant_on_every_level() {
    let discretization = prescribed_box(3);
    let table = CoefficientTable::constant(&discretization, 2.5).unwrap();
    assert_eq!(table.n_levels(), 3);
    for l in 0..3 {
        let viscosity = table.viscosity(l);
        assert_eq!(viscosity.len(), discretization.level(l).grid.n_cells());
        assert!(viscosity.iter().all(|eta| (eta - 2.5).abs() < 1e-14));
    }
}

#[test]
fn evaluate_matches_constant_model() {
    let discretization = prescribed_box(2);
    let table =
        CoefficientTable::evaluate(&discretization, &ConstantViscosity(3.0), CellAveraging::Geometric).unwrap();
    assert_eq!(table.averaging(), CellAveraging::Geometric);
    assert!(table.active().iter().all(|eta| (eta - 3.0).abs() < 1e-12));
}

#[test]
fn evaluate_rejects_non_positive_viscosity() {
    let discretization = prescribed_box(2);
    let model = PointwiseViscosity(|x: &Point2<f64>| if x.x > 0.75 { -1.0 } else { 1.0 });
    assert!(CoefficientTable::evaluate(&discretization, &model, CellAveraging::Arithmetic).is_err());

    let model = PointwiseViscosity(|_: &Point2<f64>| f64::NAN);
    assert!(CoefficientTable::evaluate(&discretization, &model, CellAveraging::Arithmetic).is_err());
}

#[test]
fn from_active_values_rejects_wrong_length() {
    let discretization = prescribed_box(2);
    let values = DVector::repeat(3, 1.0);
    assert!(CoefficientTable::from_active_values(&discretization, values, CellAveraging::Arithmetic).is_err());
}

#[test]
fn every_table_gets_a_new_generation() {
    let discretization = prescribed_box(1);
    let generations: Vec<_> = (0..5)
        .map(|_| CoefficientTable::constant(&discretization, 1.0).unwrap().generation())
        .collect();
    for pair in generations.windows(2) {
        assert!(pair[1] > pair[0]);
    }
}

proptest! {
    #[test]
    fn restricted_values_are_bounded_by_children(
        values in vec(1e-3f64..1e3, 16),
        averaging_index in 0..4usize,
    ) {
        let averaging = ALL_AVERAGING[averaging_index];
        let coarse = UniformGrid::unit_square(2);
        let fine = DVector::from_vec(values);
        let restricted = restrict_cell_values(&coarse, &fine, averaging);
        prop_assert_eq!(restricted.len(), 4);
        for cell in 0..coarse.n_cells() {
            let children = coarse.children(cell).map(|child| fine[child]);
            let min = children.iter().copied().fold(f64::INFINITY, f64::min);
            let max = children.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            prop_assert!(restricted[cell] >= min * (1.0 - 1e-12));
            prop_assert!(restricted[cell] <= max * (1.0 + 1e-12));
        }
    }
}
