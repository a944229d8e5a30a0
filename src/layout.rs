//! The two-block layout of saddle-point vectors.
use nalgebra::storage::{Storage, StorageMut};
use nalgebra::{DVector, DVectorView, DVectorViewMut, Dyn, Matrix, U1};
use std::ops::Range;

/// Index of the velocity block in every block vector and block operator.
pub const VELOCITY_BLOCK: usize = 0;
/// Index of the pressure block in every block vector and block operator.
pub const PRESSURE_BLOCK: usize = 1;

/// Sizes of the velocity and pressure blocks.
///
/// Block vectors store the velocity block first, followed by the pressure block,
/// in a single contiguous vector.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct BlockLayout {
    n_velocity: usize,
    n_pressure: usize,
}

impl BlockLayout {
    pub fn new(n_velocity: usize, n_pressure: usize) -> Self {
        Self { n_velocity, n_pressure }
    }

    /// Constructs a layout from an externally supplied block numbering.
    ///
    /// # Panics
    ///
    /// Panics unless the velocity block is block 0 and the pressure block is block 1.
    pub fn from_block_indices(velocity_block: usize, pressure_block: usize, n_velocity: usize, n_pressure: usize) -> Self {
        assert_eq!(
            velocity_block, VELOCITY_BLOCK,
            "The velocity block must be block {VELOCITY_BLOCK}, got block {velocity_block}"
        );
        assert_eq!(
            pressure_block, PRESSURE_BLOCK,
            "The pressure block must be block {PRESSURE_BLOCK}, got block {pressure_block}"
        );
        Self::new(n_velocity, n_pressure)
    }

    pub fn n_velocity(&self) -> usize {
        self.n_velocity
    }

    pub fn n_pressure(&self) -> usize {
        self.n_pressure
    }

    pub fn len(&self) -> usize {
        self.n_velocity + self.n_pressure
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn velocity_range(&self) -> Range<usize> {
        0..self.n_velocity
    }

    pub fn pressure_range(&self) -> Range<usize> {
        self.n_velocity..self.len()
    }

    /// # Panics
    ///
    /// Panics if the layouts differ.
    pub fn assert_matches(&self, other: &BlockLayout, context: &str) {
        assert_eq!(self, other, "Block layout mismatch in {context}");
    }

    /// Splits a flat vector with this layout into its velocity and pressure parts.
    pub fn split<'a, S>(&self, v: &'a Matrix<f64, Dyn, U1, S>) -> (DVectorView<'a, f64>, DVectorView<'a, f64>)
    where
        S: Storage<f64, Dyn, U1, RStride = U1, CStride = Dyn>,
    {
        assert_eq!(v.len(), self.len(), "Vector length does not match block layout");
        (v.rows_range(self.velocity_range()), v.rows_range(self.pressure_range()))
    }

    pub fn split_mut<'a, S>(
        &self,
        v: &'a mut Matrix<f64, Dyn, U1, S>,
    ) -> (DVectorViewMut<'a, f64>, DVectorViewMut<'a, f64>)
    where
        S: StorageMut<f64, Dyn, U1, RStride = U1, CStride = Dyn>,
    {
        assert_eq!(v.len(), self.len(), "Vector length does not match block layout");
        v.rows_range_pair_mut(self.velocity_range(), self.pressure_range())
    }
}

/// A (velocity, pressure) pair stored contiguously according to a [`BlockLayout`].
#[derive(Debug, Clone, PartialEq)]
pub struct BlockVector {
    layout: BlockLayout,
    data: DVector<f64>,
}

impl BlockVector {
    pub fn zeros(layout: BlockLayout) -> Self {
        Self {
            layout,
            data: DVector::zeros(layout.len()),
        }
    }

    pub fn from_parts(velocity: &DVector<f64>, pressure: &DVector<f64>) -> Self {
        let layout = BlockLayout::new(velocity.len(), pressure.len());
        let mut v = Self::zeros(layout);
        v.velocity_mut().copy_from(velocity);
        v.pressure_mut().copy_from(pressure);
        v
    }

    pub fn from_vector(layout: BlockLayout, data: DVector<f64>) -> Self {
        assert_eq!(data.len(), layout.len(), "Vector length does not match block layout");
        Self { layout, data }
    }

    pub fn layout(&self) -> BlockLayout {
        self.layout
    }

    pub fn as_vector(&self) -> &DVector<f64> {
        &self.data
    }

    pub fn as_vector_mut(&mut self) -> &mut DVector<f64> {
        &mut self.data
    }

    pub fn into_vector(self) -> DVector<f64> {
        self.data
    }

    pub fn velocity(&self) -> DVectorView<f64> {
        self.data.rows_range(self.layout.velocity_range())
    }

    pub fn pressure(&self) -> DVectorView<f64> {
        self.data.rows_range(self.layout.pressure_range())
    }

    pub fn velocity_mut(&mut self) -> DVectorViewMut<f64> {
        let range = self.layout.velocity_range();
        self.data.rows_range_mut(range)
    }

    pub fn pressure_mut(&mut self) -> DVectorViewMut<f64> {
        let range = self.layout.pressure_range();
        self.data.rows_range_mut(range)
    }

    pub fn split_mut(&mut self) -> (DVectorViewMut<f64>, DVectorViewMut<f64>) {
        let layout = self.layout;
        layout.split_mut(&mut self.data)
    }

    pub fn norm(&self) -> f64 {
        self.data.norm()
    }

    pub fn fill(&mut self, value: f64) {
        self.data.fill(value);
    }

    pub fn copy_from(&mut self, other: &BlockVector) {
        self.layout.assert_matches(&other.layout, "BlockVector::copy_from");
        self.data.copy_from(&other.data);
    }
}
