//! Miscellaneous utility structs.

use std::fmt::Debug;

/// A sparse vector of fixed dimension, with entries ordered by index.
#[derive(Clone, Default, PartialEq)]
pub struct SparseVector {
    dim: usize,
    entries: Vec<(usize, f64)>,
}

/// A sparse matrix as one sparse vector per row.
pub type Jacobian = Vec<SparseVector>;

impl SparseVector {
    /// Creates an all-zero vector.
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            entries: vec![],
        }
    }

    /// Creates a vector from entries, which must be in increasing index order.
    pub fn from_sorted(dim: usize, entries: Vec<(usize, f64)>) -> Self {
        debug_assert!(entries.windows(2).all(|w| w[0].0 < w[1].0));
        debug_assert!(entries.last().map_or(true, |(idx, _)| *idx < dim));
        Self { dim, entries }
    }

    /// The dimension of the vector.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// The number of stored entries.
    pub fn nnz(&self) -> usize {
        self.entries.len()
    }

    /// Gets the value at an index; unstored entries are zero.
    pub fn get(&self, index: usize) -> f64 {
        self.entries
            .binary_search_by_key(&index, |(idx, _)| *idx)
            .map(|pos| self.entries[pos].1)
            .unwrap_or(0.0)
    }

    /// Iterates over the stored `(index, value)` entries.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.entries.iter().copied()
    }

    /// The dot product with a dense vector of the same dimension.
    pub fn dot(&self, dense: &[f64]) -> f64 {
        debug_assert_eq!(dense.len(), self.dim);
        self.entries.iter().map(|(idx, value)| value * dense[*idx]).sum()
    }

    pub fn to_dense(&self) -> Vec<f64> {
        let mut dense = vec![0.0; self.dim];
        for (idx, value) in &self.entries {
            dense[*idx] = *value;
        }
        dense
    }
}

impl Debug for SparseVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SparseVector({}, {} stored)", self.dim, self.entries.len())
    }
}
