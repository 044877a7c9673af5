//! Nodal fields on a [`Grid`] with an optional ghost halo.
//!
//! A field stores one value per node of the grid plus a halo of `stencil_width` ghost nodes on
//! every side. Ghost values are copies of their periodic images and are refreshed with
//! [`Field::update_ghosts`]; in non-periodic directions they hold zero. Element assembly reads
//! nodes through the halo, so it needs fields with a stencil width of at least
//! [`ELEMENT_STENCIL_WIDTH`].
use crate::error::Error;
use crate::grid::Grid;
use nalgebra::{DVector, Vector2};
use std::borrow::Cow;
use std::fmt::Debug;
use std::ops::{Add, AddAssign, Mul};

/// Number of ghost nodes needed to read every node of every element.
pub const ELEMENT_STENCIL_WIDTH: usize = 1;

/// A value that can be stored at the nodes of a field.
pub trait FieldValue: Copy + Debug + PartialEq + 'static {
    fn zero() -> Self;
}

impl FieldValue for f64 {
    fn zero() -> Self {
        0.0
    }
}

impl FieldValue for bool {
    fn zero() -> Self {
        false
    }
}

impl FieldValue for Vector2<f64> {
    fn zero() -> Self {
        Vector2::zeros()
    }
}

/// Field values with a linear structure and a fixed number of scalar components per node.
///
/// Scalar fields have block size 1 and vector fields block size 2; flat vectors interleave the
/// components of each node.
pub trait NumericFieldValue: FieldValue + Add<Output = Self> + AddAssign + Mul<f64, Output = Self> {
    const BLOCK_SIZE: usize;

    fn component(&self, c: usize) -> f64;
    fn component_mut(&mut self, c: usize) -> &mut f64;
    fn dot(&self, other: &Self) -> f64;
}

impl NumericFieldValue for f64 {
    const BLOCK_SIZE: usize = 1;

    fn component(&self, c: usize) -> f64 {
        debug_assert_eq!(c, 0);
        *self
    }

    fn component_mut(&mut self, c: usize) -> &mut f64 {
        debug_assert_eq!(c, 0);
        self
    }

    fn dot(&self, other: &Self) -> f64 {
        self * other
    }
}

impl NumericFieldValue for Vector2<f64> {
    const BLOCK_SIZE: usize = 2;

    fn component(&self, c: usize) -> f64 {
        self[c]
    }

    fn component_mut(&mut self, c: usize) -> &mut f64 {
        &mut self[c]
    }

    fn dot(&self, other: &Self) -> f64 {
        self.x * other.x + self.y * other.y
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field<V> {
    grid: Grid,
    stencil_width: usize,
    data: Vec<V>,
}

impl<V: FieldValue> Field<V> {
    /// A field with all values (ghosts included) set to zero.
    pub fn new(grid: &Grid, stencil_width: usize) -> Self {
        let len = (grid.mx() + 2 * stencil_width) * (grid.my() + 2 * stencil_width);
        Self {
            grid: grid.clone(),
            stencil_width,
            data: vec![V::zero(); len],
        }
    }

    pub fn ghostless(grid: &Grid) -> Self {
        Self::new(grid, 0)
    }

    /// A field whose value at node `(i, j)` is `f(i, j)`, with updated ghosts.
    pub fn from_fn(grid: &Grid, stencil_width: usize, mut f: impl FnMut(usize, usize) -> V) -> Self {
        let mut field = Self::new(grid, stencil_width);
        {
            let mut guard = field.write();
            for (i, j) in grid.nodes() {
                guard.set(i, j, f(i, j));
            }
        }
        field
    }

    pub fn from_element(grid: &Grid, stencil_width: usize, value: V) -> Self {
        Self::from_fn(grid, stencil_width, |_, _| value)
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn stencil_width(&self) -> usize {
        self.stencil_width
    }

    fn offset(&self, i: isize, j: isize) -> usize {
        let w = self.stencil_width as isize;
        let stride = self.grid.mx() as isize + 2 * w;
        debug_assert!(i >= -w && i < self.grid.mx() as isize + w);
        debug_assert!(j >= -w && j < self.grid.my() as isize + w);
        ((j + w) * stride + (i + w)) as usize
    }

    /// The value at an owned node.
    pub fn get(&self, i: usize, j: usize) -> V {
        self.data[self.offset(i as isize, j as isize)]
    }

    /// The value at an owned node given by its canonical index.
    pub fn get_node(&self, node: usize) -> V {
        let mx = self.grid.mx();
        self.get(node % mx, node / mx)
    }

    /// The value at a node that may lie in the ghost halo.
    ///
    /// # Panics
    ///
    /// Panics if `(i, j)` lies beyond the halo.
    pub fn get_ghosted(&self, i: isize, j: isize) -> V {
        let w = self.stencil_width as isize;
        assert!(
            i >= -w && i < self.grid.mx() as isize + w && j >= -w && j < self.grid.my() as isize + w,
            "node ({}, {}) lies outside the halo of width {}",
            i,
            j,
            w
        );
        self.data[self.offset(i, j)]
    }

    /// Iterates over the values at owned nodes in canonical order.
    pub fn values(&self) -> impl Iterator<Item = V> + '_ {
        self.grid.nodes().map(move |(i, j)| self.get(i, j))
    }

    /// Scoped write access. Ghosts are refreshed when the returned guard is dropped.
    pub fn write(&mut self) -> FieldWriteGuard<'_, V> {
        FieldWriteGuard { field: self }
    }

    /// Fills the halo from the periodic images of the owned nodes.
    pub fn update_ghosts(&mut self) {
        let w = self.stencil_width as isize;
        if w == 0 {
            return;
        }
        let (mx, my) = (self.grid.mx() as isize, self.grid.my() as isize);
        for j in -w..my + w {
            for i in -w..mx + w {
                let is_owned = (0..mx).contains(&i) && (0..my).contains(&j);
                if is_owned {
                    continue;
                }
                let value = match self.grid.wrap(i, j) {
                    Some((ii, jj)) => self.get(ii, jj),
                    None => V::zero(),
                };
                let offset = self.offset(i, j);
                self.data[offset] = value;
            }
        }
    }

    /// A copy of this field with the given stencil width and updated ghosts.
    pub fn with_stencil_width(&self, stencil_width: usize) -> Self {
        Self::from_fn(&self.grid, stencil_width, |i, j| self.get(i, j))
    }

    /// This field if it has at least `stencil_width` ghosts, otherwise a ghosted local copy.
    pub fn ghosted(&self, stencil_width: usize) -> Cow<'_, Self> {
        if self.stencil_width >= stencil_width {
            Cow::Borrowed(self)
        } else {
            Cow::Owned(self.with_stencil_width(stencil_width))
        }
    }

    /// Copies the owned values of `other`, which must live on the same grid.
    ///
    /// The stencil widths of the two fields may differ.
    pub fn copy_from(&mut self, other: &Field<V>) -> Result<(), Error> {
        if self.grid != other.grid {
            return Err(Error::GridMismatch);
        }
        let mut guard = self.write();
        for (i, j) in other.grid.nodes() {
            guard.set(i, j, other.get(i, j));
        }
        Ok(())
    }

    pub fn fill(&mut self, value: V) {
        self.data.iter_mut().for_each(|v| *v = value);
        // Ghosts in non-periodic directions stay zero
        self.update_ghosts();
    }

    /// Checks that this field lives on `grid`.
    pub fn check_grid(&self, grid: &Grid) -> Result<(), Error> {
        if &self.grid == grid {
            Ok(())
        } else {
            Err(Error::GridMismatch)
        }
    }
}

impl<V: NumericFieldValue> Field<V> {
    pub fn scale(&mut self, factor: f64) {
        self.data.iter_mut().for_each(|v| *v = *v * factor);
    }

    /// The Euclidean inner product over owned nodes.
    pub fn dot(&self, other: &Field<V>) -> Result<f64, Error> {
        self.check_grid(&other.grid)?;
        Ok(self
            .grid
            .nodes()
            .map(|(i, j)| self.get(i, j).dot(&other.get(i, j)))
            .sum())
    }

    pub fn norm(&self) -> f64 {
        self.values().map(|v| v.dot(&v)).sum::<f64>().sqrt()
    }

    /// Length of the flat representation of this field.
    pub fn flat_len(&self) -> usize {
        V::BLOCK_SIZE * self.grid.num_nodes()
    }

    /// The owned values as a flat vector, components of each node interleaved.
    pub fn to_dvector(&self) -> DVector<f64> {
        let b = V::BLOCK_SIZE;
        let mut vector = DVector::zeros(self.flat_len());
        for (node, value) in self.values().enumerate() {
            for c in 0..b {
                vector[b * node + c] = value.component(c);
            }
        }
        vector
    }

    /// Overwrites the owned values from a flat vector with interleaved components.
    pub fn copy_from_dvector(&mut self, vector: &DVector<f64>) -> Result<(), Error> {
        if vector.len() != self.flat_len() {
            return Err(Error::SizeMismatch {
                expected: self.flat_len(),
                actual: vector.len(),
            });
        }
        let b = V::BLOCK_SIZE;
        let grid = self.grid.clone();
        let mut guard = self.write();
        for (node, (i, j)) in grid.nodes().enumerate() {
            let mut value = V::zero();
            for c in 0..b {
                *value.component_mut(c) = vector[b * node + c];
            }
            guard.set(i, j, value);
        }
        Ok(())
    }

    pub fn from_dvector(grid: &Grid, stencil_width: usize, vector: &DVector<f64>) -> Result<Self, Error> {
        let mut field = Self::new(grid, stencil_width);
        field.copy_from_dvector(vector)?;
        Ok(field)
    }
}

/// Write access to the owned nodes of a [`Field`].
///
/// Dropping the guard, on any exit path, refreshes the ghost halo.
#[derive(Debug)]
pub struct FieldWriteGuard<'a, V: FieldValue> {
    field: &'a mut Field<V>,
}

impl<'a, V: FieldValue> FieldWriteGuard<'a, V> {
    pub fn grid(&self) -> &Grid {
        &self.field.grid
    }

    pub fn get(&self, i: usize, j: usize) -> V {
        self.field.get(i, j)
    }

    pub fn get_node(&self, node: usize) -> V {
        self.field.get_node(node)
    }

    pub fn set(&mut self, i: usize, j: usize, value: V) {
        let offset = self.field.offset(i as isize, j as isize);
        self.field.data[offset] = value;
    }

    pub fn set_node(&mut self, node: usize, value: V) {
        let mx = self.field.grid.mx();
        self.set(node % mx, node / mx, value);
    }

    /// Sets every owned value to zero.
    pub fn zero(&mut self) {
        let grid = self.field.grid.clone();
        for (i, j) in grid.nodes() {
            self.set(i, j, V::zero());
        }
    }
}

impl<'a, V: NumericFieldValue> FieldWriteGuard<'a, V> {
    pub fn add_to_node(&mut self, node: usize, value: V) {
        let mx = self.field.grid.mx();
        let offset = self.field.offset((node % mx) as isize, (node / mx) as isize);
        self.field.data[offset] += value;
    }
}

impl<'a, V: FieldValue> Drop for FieldWriteGuard<'a, V> {
    fn drop(&mut self) {
        self.field.update_ghosts();
    }
}
