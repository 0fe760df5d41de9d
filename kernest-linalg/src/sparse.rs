#![allow(clippy::needless_range_loop)]
//! Sparse matrix operations backed by sprs.
//!
//! CSR storage for large symmetric kernels whose PSD regularization
//! only needs the leading part of the spectrum. The engine touches
//! sparse kernels exclusively through matrix-vector products.

use sprs::{CsMatI, TriMat};

use crate::dense::DenseMatrix;

/// A sparse matrix wrapper around sprs CSR format.
#[derive(Debug, Clone)]
pub struct SparseMatrix {
    inner: CsMatI<f64, usize>,
    nrows: usize,
    ncols: usize,
}

impl SparseMatrix {
    /// Create a sparse matrix from COO (coordinate) triplets.
    pub fn from_triplets(
        nrows: usize,
        ncols: usize,
        rows: &[usize],
        cols: &[usize],
        vals: &[f64],
    ) -> Self {
        assert_eq!(rows.len(), cols.len());
        assert_eq!(rows.len(), vals.len());
        let mut tri = TriMat::new((nrows, ncols));
        for i in 0..rows.len() {
            tri.add_triplet(rows[i], cols[i], vals[i]);
        }
        Self {
            inner: tri.to_csr(),
            nrows,
            ncols,
        }
    }

    /// Cast a dense matrix to sparse, keeping only non-zero entries.
    pub fn from_dense(m: &DenseMatrix) -> Self {
        let nrows = m.nrows();
        let ncols = m.ncols();
        let mut tri = TriMat::new((nrows, ncols));
        for j in 0..ncols {
            for i in 0..nrows {
                let v = m.get(i, j);
                if v != 0.0 {
                    tri.add_triplet(i, j, v);
                }
            }
        }
        Self {
            inner: tri.to_csr(),
            nrows,
            ncols,
        }
    }

    /// Number of rows.
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    /// Number of columns.
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Number of explicitly stored entries.
    pub fn nnz(&self) -> usize {
        self.inner.nnz()
    }

    /// Element at (row, col); 0.0 if not stored.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        match self.inner.get(row, col) {
            Some(&v) => v,
            None => 0.0,
        }
    }

    /// Sparse matrix-vector product `self * v`.
    pub fn mat_vec(&self, v: &[f64]) -> Vec<f64> {
        assert_eq!(v.len(), self.ncols);
        let indptr = self.inner.indptr();
        let indptr = indptr.as_slice().unwrap();
        let indices = self.inner.indices();
        let data = self.inner.data();
        let mut out = vec![0.0; self.nrows];
        for i in 0..self.nrows {
            let mut s = 0.0;
            for idx in indptr[i]..indptr[i + 1] {
                s += data[idx] * v[indices[idx]];
            }
            out[i] = s;
        }
        out
    }

    /// Borrow the underlying sprs matrix.
    pub fn as_sprs(&self) -> &CsMatI<f64, usize> {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_triplets() {
        let m = SparseMatrix::from_triplets(2, 2, &[0, 1], &[0, 1], &[3.0, 7.0]);
        assert_eq!(m.nnz(), 2);
        assert_eq!(m.get(0, 0), 3.0);
        assert_eq!(m.get(1, 1), 7.0);
        assert_eq!(m.get(0, 1), 0.0);
    }

    #[test]
    fn test_mat_vec() {
        let m =
            SparseMatrix::from_triplets(3, 3, &[0, 1, 2, 0], &[0, 1, 2, 2], &[1.0, 2.0, 3.0, 0.5]);
        let out = m.mat_vec(&[1.0, 1.0, 1.0]);
        assert!((out[0] - 1.5).abs() < 1e-12);
        assert!((out[1] - 2.0).abs() < 1e-12);
        assert!((out[2] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_from_dense_round_trip() {
        let d = DenseMatrix::from_row_major(2, 3, &[1.0, 0.0, 2.0, 0.0, 3.0, 0.0]);
        let s = SparseMatrix::from_dense(&d);
        assert_eq!(s.nnz(), 3);
        for i in 0..2 {
            for j in 0..3 {
                assert_eq!(s.get(i, j), d.get(i, j));
            }
        }
    }
}
