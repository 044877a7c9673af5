//! Dirichlet constraints on scalar and vector fields.
use crate::element::{DofMap, NK};
use crate::field::{Field, FieldWriteGuard, NumericFieldValue};
use nalgebra_sparse::CsrMatrix;

/// Borrowed view of a constraint mask and, optionally, the prescribed values.
///
/// Without values the constraint is homogeneous. A missing or all-false mask makes every
/// operation a no-op; this is determined once on construction.
#[derive(Debug, Clone)]
pub struct DirichletData<'a, V: NumericFieldValue> {
    mask: Option<&'a Field<bool>>,
    values: Option<&'a Field<V>>,
    weight: f64,
    active: bool,
}

impl<'a, V: NumericFieldValue> DirichletData<'a, V> {
    /// `weight` is the diagonal entry placed on constrained rows of a Jacobian.
    pub fn new(mask: Option<&'a Field<bool>>, values: Option<&'a Field<V>>, weight: f64) -> Self {
        let active = mask.map(|m| m.values().any(|constrained| constrained)).unwrap_or(false);
        Self {
            mask,
            values,
            weight,
            active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn is_constrained(&self, node: usize) -> bool {
        match self.mask {
            Some(mask) if self.active => mask.get_node(node),
            _ => false,
        }
    }

    /// Marks the constrained nodes of the current element.
    pub fn constrain(&self, dofmap: &mut DofMap) {
        if !self.active {
            return;
        }
        for k in 0..NK {
            if self.is_constrained(dofmap.node(k)) {
                dofmap.mark_constrained(k);
            }
        }
    }

    /// Overwrites element values at constrained nodes with the prescribed values.
    pub fn update(&self, dofmap: &DofMap, local: &mut [V; NK]) {
        if !self.active {
            return;
        }
        for k in 0..NK {
            let node = dofmap.node(k);
            if self.is_constrained(node) {
                local[k] = self.values.map(|values| values.get_node(node)).unwrap_or_else(V::zero);
            }
        }
    }

    /// Zeroes element values at constrained nodes.
    pub fn update_homogeneous(&self, dofmap: &DofMap, local: &mut [V; NK]) {
        if !self.active {
            return;
        }
        for k in 0..NK {
            if self.is_constrained(dofmap.node(k)) {
                local[k] = V::zero();
            }
        }
    }

    /// Sets a global vector to zero at constrained nodes.
    pub fn fix_residual_homogeneous(&self, global: &mut FieldWriteGuard<V>) {
        if !self.active {
            return;
        }
        let num_nodes = global.grid().num_nodes();
        for node in 0..num_nodes {
            if self.is_constrained(node) {
                global.set_node(node, V::zero());
            }
        }
    }

    /// Sets a global vector to the prescribed values at constrained nodes.
    pub fn fix_values(&self, global: &mut FieldWriteGuard<V>) {
        if !self.active {
            return;
        }
        let num_nodes = global.grid().num_nodes();
        for node in 0..num_nodes {
            if self.is_constrained(node) {
                let value = self.values.map(|values| values.get_node(node)).unwrap_or_else(V::zero);
                global.set_node(node, value);
            }
        }
    }

    /// Places the weight on the diagonal of every constrained row.
    ///
    /// Element assembly skips constrained rows and columns, so those rows end up as scaled
    /// identity rows.
    pub fn fix_jacobian(&self, matrix: &mut CsrMatrix<f64>) {
        if !self.active {
            return;
        }
        let b = V::BLOCK_SIZE;
        let num_nodes = matrix.nrows() / b;
        for node in 0..num_nodes {
            if !self.is_constrained(node) {
                continue;
            }
            for c in 0..b {
                let row_index = b * node + c;
                let mut row = matrix.row_mut(row_index);
                let (cols, values) = row.cols_and_values_mut();
                for (&col, value) in cols.iter().zip(values) {
                    *value = if col == row_index { self.weight } else { 0.0 };
                }
            }
        }
    }
}
