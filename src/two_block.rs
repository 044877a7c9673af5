//! Vectors composed of two blocks, such as a velocity and a design variable.
//!
//! `scatter` moves data out of the composite vector into the blocks, `gather` moves the
//! blocks into the composite vector.
use crate::error::Error;
use nalgebra::{DVector, DVectorView, DVectorViewMut, Scalar};
use num::Zero;
use std::ops::Range;

/// Placement of two blocks `a` and `b` in a composite vector laid out as `[a | b]`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TwoBlockLayout {
    a_len: usize,
    b_len: usize,
}

impl TwoBlockLayout {
    pub fn new(a_len: usize, b_len: usize) -> Self {
        Self { a_len, b_len }
    }

    pub fn len(&self) -> usize {
        self.a_len + self.b_len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn a_len(&self) -> usize {
        self.a_len
    }

    pub fn b_len(&self) -> usize {
        self.b_len
    }

    /// Positions of the first block in the composite vector.
    pub fn a_index_set(&self) -> Range<usize> {
        0..self.a_len
    }

    /// Positions of the second block in the composite vector.
    pub fn b_index_set(&self) -> Range<usize> {
        self.a_len..self.len()
    }

    /// Copies both blocks of the composite vector `ab` into `a` and `b`.
    pub fn scatter<T: Scalar>(&self, ab: &DVector<T>, a: &mut DVector<T>, b: &mut DVector<T>) -> Result<(), Error> {
        self.check_composite(ab.len())?;
        check_len(self.a_len, a.len())?;
        check_len(self.b_len, b.len())?;
        a.copy_from(&ab.rows_range(self.a_index_set()));
        b.copy_from(&ab.rows_range(self.b_index_set()));
        Ok(())
    }

    pub fn scatter_to_a<T: Scalar>(&self, ab: &DVector<T>, a: &mut DVector<T>) -> Result<(), Error> {
        self.check_composite(ab.len())?;
        check_len(self.a_len, a.len())?;
        a.copy_from(&ab.rows_range(self.a_index_set()));
        Ok(())
    }

    pub fn scatter_to_b<T: Scalar>(&self, ab: &DVector<T>, b: &mut DVector<T>) -> Result<(), Error> {
        self.check_composite(ab.len())?;
        check_len(self.b_len, b.len())?;
        b.copy_from(&ab.rows_range(self.b_index_set()));
        Ok(())
    }

    /// Allocates copies of both blocks of the composite vector `ab`.
    pub fn scatter_new<T: Scalar>(&self, ab: &DVector<T>) -> Result<(DVector<T>, DVector<T>), Error> {
        self.check_composite(ab.len())?;
        let a = ab.rows_range(self.a_index_set()).clone_owned();
        let b = ab.rows_range(self.b_index_set()).clone_owned();
        Ok((a, b))
    }

    /// Copies `a` and `b` into their blocks of the composite vector `ab`.
    pub fn gather<T: Scalar>(&self, a: &DVector<T>, b: &DVector<T>, ab: &mut DVector<T>) -> Result<(), Error> {
        self.check_composite(ab.len())?;
        check_len(self.a_len, a.len())?;
        check_len(self.b_len, b.len())?;
        ab.rows_range_mut(self.a_index_set()).copy_from(a);
        ab.rows_range_mut(self.b_index_set()).copy_from(b);
        Ok(())
    }

    pub fn gather_from_a<T: Scalar>(&self, a: &DVector<T>, ab: &mut DVector<T>) -> Result<(), Error> {
        self.check_composite(ab.len())?;
        check_len(self.a_len, a.len())?;
        ab.rows_range_mut(self.a_index_set()).copy_from(a);
        Ok(())
    }

    pub fn gather_from_b<T: Scalar>(&self, b: &DVector<T>, ab: &mut DVector<T>) -> Result<(), Error> {
        self.check_composite(ab.len())?;
        check_len(self.b_len, b.len())?;
        ab.rows_range_mut(self.b_index_set()).copy_from(b);
        Ok(())
    }

    /// Allocates a composite vector holding `a` and `b`.
    pub fn gather_new<T: Scalar + Zero>(&self, a: &DVector<T>, b: &DVector<T>) -> Result<DVector<T>, Error> {
        let mut ab = DVector::zeros(self.len());
        self.gather(a, b, &mut ab)?;
        Ok(ab)
    }

    fn check_composite(&self, actual: usize) -> Result<(), Error> {
        check_len(self.len(), actual)
    }
}

/// A composite vector `[a | b]` that owns its storage.
#[derive(Debug, Clone, PartialEq)]
pub struct TwoBlockVector<T: Scalar> {
    data: DVector<T>,
    layout: TwoBlockLayout,
}

impl<T: Scalar + Zero> TwoBlockVector<T> {
    /// A zero vector with blocks of the given lengths.
    pub fn zeros(a_len: usize, b_len: usize) -> Self {
        Self {
            data: DVector::zeros(a_len + b_len),
            layout: TwoBlockLayout::new(a_len, b_len),
        }
    }

    /// Allocates a composite vector and gathers `a` and `b` into it.
    pub fn from_blocks(a: &DVector<T>, b: &DVector<T>) -> Self {
        let mut vector = Self::zeros(a.len(), b.len());
        vector.a_block_mut().copy_from(a);
        vector.b_block_mut().copy_from(b);
        vector
    }
}

impl<T: Scalar> TwoBlockVector<T> {
    /// Interprets `data` as a composite vector whose first block has `a_len` entries.
    pub fn from_vector(data: DVector<T>, a_len: usize) -> Result<Self, Error> {
        if a_len > data.len() {
            return Err(Error::SizeMismatch {
                expected: a_len,
                actual: data.len(),
            });
        }
        let layout = TwoBlockLayout::new(a_len, data.len() - a_len);
        Ok(Self { data, layout })
    }

    pub fn layout(&self) -> &TwoBlockLayout {
        &self.layout
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn a_len(&self) -> usize {
        self.layout.a_len()
    }

    pub fn b_len(&self) -> usize {
        self.layout.b_len()
    }

    pub fn a_index_set(&self) -> Range<usize> {
        self.layout.a_index_set()
    }

    pub fn b_index_set(&self) -> Range<usize> {
        self.layout.b_index_set()
    }

    pub fn as_vector(&self) -> &DVector<T> {
        &self.data
    }

    pub fn into_vector(self) -> DVector<T> {
        self.data
    }

    pub fn a_block(&self) -> DVectorView<T> {
        self.data.rows_range(self.a_index_set())
    }

    pub fn b_block(&self) -> DVectorView<T> {
        self.data.rows_range(self.b_index_set())
    }

    pub fn a_block_mut(&mut self) -> DVectorViewMut<T> {
        let range = self.a_index_set();
        self.data.rows_range_mut(range)
    }

    pub fn b_block_mut(&mut self) -> DVectorViewMut<T> {
        let range = self.b_index_set();
        self.data.rows_range_mut(range)
    }

    /// Copies the blocks of the composite vector into `a` and `b`.
    pub fn scatter(&self, a: &mut DVector<T>, b: &mut DVector<T>) -> Result<(), Error> {
        self.layout.scatter(&self.data, a, b)
    }

    pub fn scatter_to_a(&self, a: &mut DVector<T>) -> Result<(), Error> {
        self.layout.scatter_to_a(&self.data, a)
    }

    pub fn scatter_to_b(&self, b: &mut DVector<T>) -> Result<(), Error> {
        self.layout.scatter_to_b(&self.data, b)
    }

    /// Allocates copies of the two blocks.
    pub fn scatter_new(&self) -> (DVector<T>, DVector<T>) {
        (self.a_block().clone_owned(), self.b_block().clone_owned())
    }

    /// Copies `a` and `b` into their blocks of the composite vector.
    pub fn gather(&mut self, a: &DVector<T>, b: &DVector<T>) -> Result<(), Error> {
        self.layout.gather(a, b, &mut self.data)
    }

    pub fn gather_from_a(&mut self, a: &DVector<T>) -> Result<(), Error> {
        self.layout.gather_from_a(a, &mut self.data)
    }

    pub fn gather_from_b(&mut self, b: &DVector<T>) -> Result<(), Error> {
        self.layout.gather_from_b(b, &mut self.data)
    }
}

fn check_len(expected: usize, actual: usize) -> Result<(), Error> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::SizeMismatch { expected, actual })
    }
}
