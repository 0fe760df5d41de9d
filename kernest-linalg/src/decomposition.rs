#![allow(clippy::needless_range_loop)]
//! Matrix decompositions and small solvers.
//!
//! Cholesky for the GLS normal equations, a full symmetric
//! eigendecomposition wrapping faer's divide-and-conquer solver, a
//! Lanczos iteration for the leading eigenpairs of a sparse symmetric
//! operator, and the closed-form solvers for the (at most 2x2)
//! average-information system.

use rand::Rng;
use rand::SeedableRng;
use thiserror::Error;

use crate::dense::DenseMatrix;
use crate::sparse::SparseMatrix;

#[derive(Error, Debug)]
pub enum LinalgError {
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("matrix is not positive definite")]
    NotPositiveDefinite,

    #[error("singular matrix encountered")]
    Singular,

    #[error("decomposition produced non-finite values")]
    NonFinite,
}

/// Fixed seed for the Lanczos start vector, so repeated projections of
/// the same kernel reproduce bit-identical spectra.
const LANCZOS_SEED: u64 = 0x6b65726e;

/// Relative residual tolerance for accepting a Ritz pair.
const LANCZOS_TOL: f64 = 1e-9;

/// Cholesky factorization A = L * L' of a symmetric positive definite
/// matrix, with the lower factor stored packed row by row.
pub struct CholeskyDecomp {
    n: usize,
    l: Vec<f64>,
}

impl CholeskyDecomp {
    pub fn new(a: &DenseMatrix) -> Result<Self, LinalgError> {
        let n = a.nrows();
        if a.ncols() != n {
            return Err(LinalgError::DimensionMismatch {
                expected: n,
                got: a.ncols(),
            });
        }
        if !a.is_finite() {
            return Err(LinalgError::NonFinite);
        }

        let mut l = vec![0.0; n * (n + 1) / 2];
        let at = |buf: &[f64], i: usize, j: usize| buf[i * (i + 1) / 2 + j];

        for i in 0..n {
            for j in 0..=i {
                let mut s = a.get(i, j);
                for k in 0..j {
                    s -= at(&l, i, k) * at(&l, j, k);
                }
                if i == j {
                    if s <= 0.0 {
                        return Err(LinalgError::NotPositiveDefinite);
                    }
                    l[i * (i + 1) / 2 + j] = s.sqrt();
                } else {
                    l[i * (i + 1) / 2 + j] = s / at(&l, j, j);
                }
            }
        }

        Ok(CholeskyDecomp { n, l })
    }

    /// Solve L * L' * x = b.
    pub fn solve(&self, b: &[f64]) -> Vec<f64> {
        let n = self.n;
        assert_eq!(b.len(), n);
        let at = |i: usize, j: usize| self.l[i * (i + 1) / 2 + j];

        // L * y = b
        let mut y = vec![0.0; n];
        for i in 0..n {
            let mut s = b[i];
            for j in 0..i {
                s -= at(i, j) * y[j];
            }
            y[i] = s / at(i, i);
        }

        // L' * x = y
        let mut x = vec![0.0; n];
        for i in (0..n).rev() {
            let mut s = y[i];
            for j in (i + 1)..n {
                s -= at(j, i) * x[j];
            }
            x[i] = s / at(i, i);
        }
        x
    }

    /// Inverse of the factored matrix, column by column.
    pub fn inverse(&self) -> DenseMatrix {
        let n = self.n;
        let mut inv = DenseMatrix::zeros(n, n);
        let mut e = vec![0.0; n];
        for j in 0..n {
            e[j] = 1.0;
            let col = self.solve(&e);
            e[j] = 0.0;
            for i in 0..n {
                inv.set(i, j, col[i]);
            }
        }
        inv
    }
}

/// Full symmetric eigendecomposition, eigenvalues in ascending order
/// with eigenvectors in matching columns.
pub struct SymmetricEigen {
    pub values: Vec<f64>,
    pub vectors: DenseMatrix,
}

/// Eigendecomposition of a symmetric matrix via faer's self-adjoint
/// solver (lower triangle is referenced).
pub fn symmetric_eigen(a: &DenseMatrix) -> Result<SymmetricEigen, LinalgError> {
    let n = a.nrows();
    if a.ncols() != n {
        return Err(LinalgError::DimensionMismatch {
            expected: n,
            got: a.ncols(),
        });
    }

    let eig = a.as_faer().selfadjoint_eigendecomposition(faer::Side::Lower);
    let s = eig.s();
    let u = eig.u();

    let raw: Vec<f64> = (0..n).map(|i| s.column_vector().read(i)).collect();
    if raw.iter().any(|v| !v.is_finite()) {
        return Err(LinalgError::NonFinite);
    }

    // Sort eigenpairs ascending so the ordering never depends on the
    // backend.
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| raw[i].partial_cmp(&raw[j]).unwrap());

    let values: Vec<f64> = order.iter().map(|&i| raw[i]).collect();
    let mut vectors = DenseMatrix::zeros(n, n);
    for (col, &src) in order.iter().enumerate() {
        for i in 0..n {
            vectors.set(i, col, u.read(i, src));
        }
    }
    if !vectors.is_finite() {
        return Err(LinalgError::NonFinite);
    }

    Ok(SymmetricEigen { values, vectors })
}

/// Leading `k` eigenpairs of a sparse symmetric matrix by Lanczos
/// iteration with full reorthogonalization.
///
/// Returns eigenvalues in ascending order (the k algebraically largest)
/// and an nrows x k matrix of Ritz vectors. With k equal to the matrix
/// dimension the Krylov basis spans the whole space and the result is a
/// complete decomposition.
pub fn lanczos_top_eigen(
    a: &SparseMatrix,
    k: usize,
) -> Result<(Vec<f64>, DenseMatrix), LinalgError> {
    let m = a.nrows();
    if a.ncols() != m {
        return Err(LinalgError::DimensionMismatch {
            expected: m,
            got: a.ncols(),
        });
    }
    if k == 0 || k > m {
        return Err(LinalgError::DimensionMismatch { expected: m, got: k });
    }

    let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(LANCZOS_SEED);
    let mut basis: Vec<Vec<f64>> = vec![random_unit(&mut rng, m)];
    let mut alphas: Vec<f64> = Vec::new();
    let mut betas: Vec<f64> = Vec::new();

    // Checking Ritz residuals is an O(dim^3) tridiagonal solve, so only
    // do it every few steps.
    let check_every = k.max(8);

    let dim = loop {
        let j = alphas.len();
        let mut w = a.mat_vec(&basis[j]);
        if w.iter().any(|v| !v.is_finite()) {
            return Err(LinalgError::NonFinite);
        }
        if j > 0 {
            let b = betas[j - 1];
            for (wi, vi) in w.iter_mut().zip(basis[j - 1].iter()) {
                *wi -= b * vi;
            }
        }
        let alpha = DenseMatrix::dot(&w, &basis[j]);
        for (wi, vi) in w.iter_mut().zip(basis[j].iter()) {
            *wi -= alpha * vi;
        }
        reorthogonalize(&mut w, &basis);
        alphas.push(alpha);

        let beta = norm2(&w);
        let dim = j + 1;
        if dim == m {
            break dim;
        }

        if dim >= k && dim % check_every == 0 {
            let tri = tridiagonal(&alphas, &betas);
            let eig = symmetric_eigen(&tri)?;
            if ritz_converged(&eig, beta, k, dim) {
                break dim;
            }
        }

        let scale = alphas
            .iter()
            .chain(betas.iter())
            .fold(0.0f64, |acc, v| acc.max(v.abs()));
        if beta <= 1e-12 * scale.max(1e-300) {
            // Invariant subspace found; restart the recurrence in a
            // fresh direction orthogonal to the current basis.
            let mut r = random_unit(&mut rng, m);
            reorthogonalize(&mut r, &basis);
            let rn = norm2(&r);
            if rn <= 1e-12 {
                break dim;
            }
            for v in r.iter_mut() {
                *v /= rn;
            }
            betas.push(0.0);
            basis.push(r);
        } else {
            for v in w.iter_mut() {
                *v /= beta;
            }
            betas.push(beta);
            basis.push(w);
        }
    };

    // Solve the projected tridiagonal problem and lift the top-k Ritz
    // pairs back to the original space.
    if dim < k {
        return Err(LinalgError::Singular);
    }
    let tri = tridiagonal(&alphas[..dim], &betas[..dim - 1]);
    let eig = symmetric_eigen(&tri)?;

    let take = k;
    let first = dim - take;
    let values: Vec<f64> = eig.values[first..].to_vec();
    let mut vectors = DenseMatrix::zeros(m, take);
    for (col, src) in (first..dim).enumerate() {
        for i in 0..m {
            let mut s = 0.0;
            for l in 0..dim {
                s += basis[l][i] * eig.vectors.get(l, src);
            }
            vectors.set(i, col, s);
        }
    }
    if !vectors.is_finite() || values.iter().any(|v| !v.is_finite()) {
        return Err(LinalgError::NonFinite);
    }

    Ok((values, vectors))
}

fn random_unit(rng: &mut rand_chacha::ChaCha8Rng, m: usize) -> Vec<f64> {
    let mut v: Vec<f64> = (0..m).map(|_| rng.gen::<f64>() - 0.5).collect();
    let n = norm2(&v).max(1e-300);
    for x in v.iter_mut() {
        *x /= n;
    }
    v
}

fn norm2(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

/// Two-pass classical Gram-Schmidt against the whole basis.
fn reorthogonalize(w: &mut [f64], basis: &[Vec<f64>]) {
    for _ in 0..2 {
        for v in basis {
            let c = DenseMatrix::dot(w, v);
            for (wi, vi) in w.iter_mut().zip(v.iter()) {
                *wi -= c * vi;
            }
        }
    }
}

fn tridiagonal(alphas: &[f64], betas: &[f64]) -> DenseMatrix {
    let d = alphas.len();
    let mut t = DenseMatrix::zeros(d, d);
    for i in 0..d {
        t.set(i, i, alphas[i]);
        if i + 1 < d {
            t.set(i, i + 1, betas[i]);
            t.set(i + 1, i, betas[i]);
        }
    }
    t
}

/// Residual bound |beta * s_last| for the k largest Ritz pairs.
fn ritz_converged(eig: &SymmetricEigen, beta: f64, k: usize, dim: usize) -> bool {
    let take = k.min(dim);
    let first = dim - take;
    let scale = eig.values[first..]
        .iter()
        .fold(0.0f64, |acc, v| acc.max(v.abs()))
        .max(1e-300);
    (first..dim).all(|c| beta * eig.vectors.get(dim - 1, c).abs() <= LANCZOS_TOL * scale)
}

/// Exact solve of the small symmetric average-information system
/// (1x1 or 2x2). Fails with `Singular` when the determinant is
/// negligible relative to the matrix scale.
pub fn solve_sym_small(a: &DenseMatrix, b: &[f64]) -> Result<Vec<f64>, LinalgError> {
    let k = check_small(a, b)?;
    match k {
        1 => {
            let a00 = a.get(0, 0);
            if a00 == 0.0 {
                return Err(LinalgError::Singular);
            }
            Ok(vec![b[0] / a00])
        }
        _ => {
            let (a00, a01, a11) = (a.get(0, 0), a.get(0, 1), a.get(1, 1));
            let det = a00 * a11 - a01 * a01;
            let scale = a00.abs().max(a11.abs()).max(a01.abs());
            if det.abs() <= f64::EPSILON * scale * scale {
                return Err(LinalgError::Singular);
            }
            Ok(vec![
                (a11 * b[0] - a01 * b[1]) / det,
                (-a01 * b[0] + a00 * b[1]) / det,
            ])
        }
    }
}

/// Minimum-norm least-squares solve of the same small system via the
/// spectral pseudo-inverse. Fails with `Singular` only when the whole
/// spectrum is negligible.
pub fn solve_sym_small_pinv(a: &DenseMatrix, b: &[f64]) -> Result<Vec<f64>, LinalgError> {
    let k = check_small(a, b)?;
    if k == 1 {
        let a00 = a.get(0, 0);
        if a00 == 0.0 {
            return Err(LinalgError::Singular);
        }
        return Ok(vec![b[0] / a00]);
    }

    let (a00, a01, a11) = (a.get(0, 0), a.get(0, 1), a.get(1, 1));
    // Closed-form 2x2 symmetric eigenpairs.
    let mid = 0.5 * (a00 + a11);
    let rad = (0.25 * (a00 - a11) * (a00 - a11) + a01 * a01).sqrt();
    let lams = [mid - rad, mid + rad];
    let scale = lams[0].abs().max(lams[1].abs());
    if !(scale > 0.0) || !scale.is_finite() {
        return Err(LinalgError::Singular);
    }

    let mut x = vec![0.0, 0.0];
    let mut used = false;
    for &lam in &lams {
        if lam.abs() <= 1e-12 * scale {
            continue;
        }
        // Eigenvector of [[a00,a01],[a01,a11]] for lam; pick the better
        // conditioned of the two analytic forms.
        let v = if (lam - a00).abs() > (lam - a11).abs() {
            [a01, lam - a00]
        } else {
            [lam - a11, a01]
        };
        let vn = (v[0] * v[0] + v[1] * v[1]).sqrt();
        if vn <= 1e-300 {
            // Diagonal matrix: the eigenvector is a coordinate axis.
            let idx = if (lam - a00).abs() <= (lam - a11).abs() { 0 } else { 1 };
            x[idx] += b[idx] / lam;
            used = true;
            continue;
        }
        let u = [v[0] / vn, v[1] / vn];
        let proj = (u[0] * b[0] + u[1] * b[1]) / lam;
        x[0] += proj * u[0];
        x[1] += proj * u[1];
        used = true;
    }
    if !used {
        return Err(LinalgError::Singular);
    }
    Ok(x)
}

fn check_small(a: &DenseMatrix, b: &[f64]) -> Result<usize, LinalgError> {
    let k = a.nrows();
    if a.ncols() != k || b.len() != k {
        return Err(LinalgError::DimensionMismatch {
            expected: k,
            got: a.ncols().max(b.len()),
        });
    }
    if k == 0 || k > 2 {
        return Err(LinalgError::DimensionMismatch { expected: 2, got: k });
    }
    if !a.is_finite() || b.iter().any(|v| !v.is_finite()) {
        return Err(LinalgError::NonFinite);
    }
    Ok(k)
}
