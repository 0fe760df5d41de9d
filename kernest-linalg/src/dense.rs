#![allow(clippy::needless_range_loop)]
//! Dense matrix operations backed by faer.
//!
//! Wraps faer's column-major `Mat<f64>` with the operations the
//! estimation engine leans on: matrix-vector products on both sides,
//! weighted Gram matrices, row/column scaling, and the Hadamard/trace
//! reductions used by the moment-matching formulas.

use faer::Mat;

/// A dense matrix wrapper around faer's `Mat<f64>`.
///
/// Column-major layout, matching the conventions of the linear-algebra
/// library the reference implementation was written against.
#[derive(Debug, Clone)]
pub struct DenseMatrix {
    inner: Mat<f64>,
}

impl DenseMatrix {
    /// Create a matrix filled with zeros.
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self {
            inner: Mat::zeros(nrows, ncols),
        }
    }

    /// Create an identity matrix of size n x n.
    pub fn identity(n: usize) -> Self {
        let inner = Mat::from_fn(n, n, |i, j| if i == j { 1.0 } else { 0.0 });
        Self { inner }
    }

    /// Create a matrix from a flat slice in row-major order.
    pub fn from_row_major(nrows: usize, ncols: usize, data: &[f64]) -> Self {
        assert_eq!(data.len(), nrows * ncols);
        let inner = Mat::from_fn(nrows, ncols, |i, j| data[i * ncols + j]);
        Self { inner }
    }

    /// Create a matrix from a flat vec in column-major order.
    pub fn from_col_major(nrows: usize, ncols: usize, data: Vec<f64>) -> Self {
        assert_eq!(data.len(), nrows * ncols);
        let inner = Mat::from_fn(nrows, ncols, |i, j| data[j * nrows + i]);
        Self { inner }
    }

    /// Number of rows.
    pub fn nrows(&self) -> usize {
        self.inner.nrows()
    }

    /// Number of columns.
    pub fn ncols(&self) -> usize {
        self.inner.ncols()
    }

    /// Element at (row, col).
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.inner.read(row, col)
    }

    /// Set element at (row, col).
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.inner.write(row, col, value);
    }

    /// Borrow the underlying faer matrix.
    pub fn as_faer(&self) -> &Mat<f64> {
        &self.inner
    }

    /// Wrap a faer matrix.
    pub fn from_faer(mat: Mat<f64>) -> Self {
        Self { inner: mat }
    }

    /// Matrix-vector product `self * v`.
    pub fn mat_vec(&self, v: &[f64]) -> Vec<f64> {
        assert_eq!(self.ncols(), v.len());
        let n = self.nrows();
        let mut out = vec![0.0; n];
        for j in 0..self.ncols() {
            let vj = v[j];
            for i in 0..n {
                out[i] += self.inner.read(i, j) * vj;
            }
        }
        out
    }

    /// Transposed matrix-vector product `self' * v`.
    pub fn t_mat_vec(&self, v: &[f64]) -> Vec<f64> {
        assert_eq!(self.nrows(), v.len());
        let p = self.ncols();
        let mut out = vec![0.0; p];
        for j in 0..p {
            let mut s = 0.0;
            for i in 0..self.nrows() {
                s += self.inner.read(i, j) * v[i];
            }
            out[j] = s;
        }
        out
    }

    /// Matrix-matrix product `self * other`.
    pub fn mat_mul(&self, other: &DenseMatrix) -> DenseMatrix {
        assert_eq!(self.ncols(), other.nrows());
        DenseMatrix {
            inner: &self.inner * &other.inner,
        }
    }

    /// Transpose.
    pub fn transpose(&self) -> DenseMatrix {
        DenseMatrix {
            inner: self.inner.transpose().to_owned(),
        }
    }

    /// Extract column j.
    pub fn col(&self, j: usize) -> Vec<f64> {
        (0..self.nrows()).map(|i| self.inner.read(i, j)).collect()
    }

    /// Diagonal entries.
    pub fn diag(&self) -> Vec<f64> {
        let n = self.nrows().min(self.ncols());
        (0..n).map(|i| self.inner.read(i, i)).collect()
    }

    /// Trace of a square matrix.
    pub fn trace(&self) -> f64 {
        self.diag().iter().sum()
    }

    /// Scale row i by `factors[i]`, i.e. `diag(factors) * self`.
    pub fn scale_rows(&self, factors: &[f64]) -> DenseMatrix {
        assert_eq!(factors.len(), self.nrows());
        let inner = Mat::from_fn(self.nrows(), self.ncols(), |i, j| {
            factors[i] * self.inner.read(i, j)
        });
        DenseMatrix { inner }
    }

    /// Scale column j by `factors[j]`, i.e. `self * diag(factors)`.
    pub fn scale_cols(&self, factors: &[f64]) -> DenseMatrix {
        assert_eq!(factors.len(), self.ncols());
        let inner = Mat::from_fn(self.nrows(), self.ncols(), |i, j| {
            self.inner.read(i, j) * factors[j]
        });
        DenseMatrix { inner }
    }

    /// Weighted Gram matrix `self' * diag(w) * self` (p x p, symmetric).
    pub fn xtwx(&self, w: &[f64]) -> DenseMatrix {
        let n = self.nrows();
        let p = self.ncols();
        assert_eq!(w.len(), n);
        let mut out = DenseMatrix::zeros(p, p);
        for j in 0..p {
            for k in j..p {
                let mut s = 0.0;
                for i in 0..n {
                    s += self.inner.read(i, j) * w[i] * self.inner.read(i, k);
                }
                out.set(j, k, s);
                if j != k {
                    out.set(k, j, s);
                }
            }
        }
        out
    }

    /// Weighted projection `self' * diag(w) * v` (length p).
    pub fn xtwv(&self, w: &[f64], v: &[f64]) -> Vec<f64> {
        let n = self.nrows();
        assert_eq!(w.len(), n);
        assert_eq!(v.len(), n);
        let p = self.ncols();
        let mut out = vec![0.0; p];
        for j in 0..p {
            let mut s = 0.0;
            for i in 0..n {
                s += self.inner.read(i, j) * w[i] * v[i];
            }
            out[j] = s;
        }
        out
    }

    /// Elementwise (Hadamard) product summed over all entries:
    /// `sum_ij self[i,j] * other[i,j]`.
    pub fn hadamard_sum(&self, other: &DenseMatrix) -> f64 {
        assert_eq!(self.nrows(), other.nrows());
        assert_eq!(self.ncols(), other.ncols());
        let mut s = 0.0;
        for j in 0..self.ncols() {
            for i in 0..self.nrows() {
                s += self.inner.read(i, j) * other.inner.read(i, j);
            }
        }
        s
    }

    /// `trace(self * other)` without forming the product:
    /// `sum_ij self[i,j] * other[j,i]`.
    pub fn trace_product(&self, other: &DenseMatrix) -> f64 {
        assert_eq!(self.ncols(), other.nrows());
        assert_eq!(self.nrows(), other.ncols());
        let mut s = 0.0;
        for j in 0..self.ncols() {
            for i in 0..self.nrows() {
                s += self.inner.read(i, j) * other.inner.read(j, i);
            }
        }
        s
    }

    /// Whether every entry is finite.
    pub fn is_finite(&self) -> bool {
        for j in 0..self.ncols() {
            for i in 0..self.nrows() {
                if !self.inner.read(i, j).is_finite() {
                    return false;
                }
            }
        }
        true
    }

    /// Dot product of two slices.
    pub fn dot(a: &[f64], b: &[f64]) -> f64 {
        assert_eq!(a.len(), b.len());
        a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
    }
}
