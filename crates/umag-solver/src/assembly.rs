//! Global sparse system.
//!
//! Element contributions land in a coordinate map so repeated (row, col)
//! pairs accumulate in any order; one conversion to CSR per solve. The
//! system has `2 * NOD` unknowns: rows `[0, NOD)` test against the first
//! tangent basis vector of each node, rows `[NOD, 2*NOD)` against the
//! second.

use std::collections::HashMap;

use nalgebra::DVector;
use nalgebra_sparse::{CooMatrix, CsrMatrix};

use crate::error::{Result, SolverError};

#[derive(Debug, Clone)]
pub struct SparseSystem {
    size: usize,
    entries: HashMap<(usize, usize), f64>,
    rhs: DVector<f64>,
}

impl SparseSystem {
    pub fn new(size: usize) -> Self {
        SparseSystem {
            size,
            entries: HashMap::new(),
            rhs: DVector::zeros(size),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        *self.entries.entry((row, col)).or_insert(0.0) += value;
    }

    #[inline]
    pub fn add_rhs(&mut self, row: usize, value: f64) {
        self.rhs[row] += value;
    }

    pub fn rhs(&self) -> &DVector<f64> {
        &self.rhs
    }

    /// Zero the system for the next assembly pass; capacity is kept.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.rhs.fill(0.0);
    }

    /// Convert the accumulated entries to CSR.
    ///
    /// Entries are filtered relative to the largest magnitude; element
    /// matrices scale with element volume, so an absolute cutoff would be
    /// meaningless across mesh sizes.
    pub fn to_csr(&self) -> Result<CsrMatrix<f64>> {
        let vmax = self
            .entries
            .values()
            .fold(0.0_f64, |m, v| m.max(v.abs()));
        let tolerance = 1e-14 * vmax;

        let mut rows = Vec::with_capacity(self.entries.len());
        let mut cols = Vec::with_capacity(self.entries.len());
        let mut values = Vec::with_capacity(self.entries.len());
        for (&(i, j), &v) in &self.entries {
            if v.abs() > tolerance || i == j {
                rows.push(i);
                cols.push(j);
                values.push(v);
            }
        }

        let coo = CooMatrix::try_from_triplets(self.size, self.size, rows, cols, values)
            .map_err(|_| SolverError::IndexOutOfBounds)?;
        Ok(CsrMatrix::from(&coo))
    }

    /// Every row needs a nonzero diagonal for Jacobi preconditioning; a
    /// missing one means a node belongs to no element.
    pub fn validate(&self) -> Result<()> {
        let vmax = self
            .entries
            .values()
            .fold(0.0_f64, |m, v| m.max(v.abs()));
        for i in 0..self.size {
            let diag = self.entries.get(&(i, i)).copied().unwrap_or(0.0);
            if diag.abs() <= 1e-14 * vmax {
                return Err(SolverError::ZeroDiagonal(i));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_entries_accumulate() {
        let mut sys = SparseSystem::new(4);
        sys.add(1, 2, 0.5);
        sys.add(1, 2, 0.25);
        sys.add(1, 1, 1.0);
        let csr = sys.to_csr().unwrap();
        assert_eq!(csr.get_entry(1, 2).map(|e| e.into_value()), Some(0.75));
    }

    #[test]
    fn clear_resets_rhs_and_entries() {
        let mut sys = SparseSystem::new(3);
        sys.add(0, 0, 2.0);
        sys.add_rhs(0, 1.5);
        sys.clear();
        assert_eq!(sys.rhs()[0], 0.0);
        assert_eq!(sys.to_csr().unwrap().nnz(), 0);
    }

    #[test]
    fn validate_catches_missing_diagonal() {
        let mut sys = SparseSystem::new(2);
        sys.add(0, 0, 1e-20);
        sys.add(0, 1, 1e-20);
        // row 1 never touched
        assert!(sys.validate().is_err());
    }

    #[test]
    fn relative_filter_keeps_small_scales() {
        // entries of the order of a cubic-nanometer element volume
        let mut sys = SparseSystem::new(2);
        sys.add(0, 0, 3e-27);
        sys.add(1, 1, 2e-27);
        sys.add(0, 1, 1e-45); // genuinely negligible
        let csr = sys.to_csr().unwrap();
        assert_eq!(csr.nnz(), 2);
    }
}
