use fenris_stokes::layout::{BlockLayout, BlockVector};
use nalgebra::DVector;

#[test]
fn block_ranges_are_contiguous() {
    let layout = BlockLayout::new(6, 3);
    assert_eq!(layout.len(), 9);
    assert_eq!(layout.velocity_range(), 0..6);
    assert_eq!(layout.pressure_range(), 6..9);
    assert!(!layout.is_empty());
    assert!(BlockLayout::new(0, 0).is_empty());
}

#[test]
fn block_vector_views_alias_the_flat_storage() {
    let u = DVector::from_vec(vec![1.0, 2.0, 3.0, 4.0]);
    let p = DVector::from_vec(vec![5.0, 6.0]);
    let mut v = BlockVector::from_parts(&u, &p);
    assert_eq!(v.layout(), BlockLayout::new(4, 2));
    assert_eq!(v.velocity(), u);
    assert_eq!(v.pressure(), p);

    v.pressure_mut().fill(-1.0);
    {
        let (mut v_u, _) = v.split_mut();
        v_u[0] = 10.0;
    }
    assert_eq!(
        v.as_vector(),
        &DVector::from_vec(vec![10.0, 2.0, 3.0, 4.0, -1.0, -1.0])
    );

    let layout = v.layout();
    let flat = DVector::from_vec(vec![0.0, 1.0, 2.0]);
    let (a, b) = BlockLayout::new(1, 2).split(&flat);
    assert_eq!(a.as_slice(), &[0.0]);
    assert_eq!(b.as_slice(), &[1.0, 2.0]);
    assert_eq!(layout.n_pressure(), 2);
}

#[test]
fn copy_from_and_norm() {
    let layout = BlockLayout::new(2, 1);
    let mut a = BlockVector::zeros(layout);
    let mut b = BlockVector::zeros(layout);
    b.fill(2.0);
    a.copy_from(&b);
    assert_eq!(a, b);
    assert!((a.norm() - 12f64.sqrt()).abs() < 1e-14);
}

#[test]
fn from_block_indices_accepts_standard_numbering() {
    assert_eq!(BlockLayout::from_block_indices(0, 1, 4, 2), BlockLayout::new(4, 2));
}

#[test]
#[should_panic(expected = "velocity block must be block 0")]
fn from_block_indices_rejects_swapped_blocks() {
    BlockLayout::from_block_indices(1, 0, 4, 2);
}

#[test]
#[should_panic]
fn mismatched_layouts_panic() {
    BlockLayout::new(4, 2).assert_matches(&BlockLayout::new(4, 3), "test");
}
