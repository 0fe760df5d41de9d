//! Sparse kernel projection using only the leading eigenpairs.
//!
//! For a large sparse kernel the full spectrum is unnecessary: the
//! caller supplies a rank budget `num_top` and the projection is built
//! from the `num_top` algebraically largest eigenpairs, computed by
//! Lanczos iteration over sparse matrix-vector products.

use tracing::debug;

use kernest_linalg::decomposition::lanczos_top_eigen;
use kernest_linalg::SparseMatrix;

use crate::error::EngineError;
use crate::kernel::dense::PsdProjection;
use crate::EIGENVALUE_FLOOR;

/// Project a sparse symmetric kernel from its top `num_top` eigenpairs.
///
/// `num_top` must lie in [1, m] for an m x m kernel; at `num_top == m`
/// the Krylov basis spans the whole space and the result agrees with
/// the dense projector. Returns the floored eigenvalues (ascending),
/// the m x num_top eigenvector block, and the reconstructed dense
/// kernel.
pub fn project_psd_top(m: &SparseMatrix, num_top: usize) -> Result<PsdProjection, EngineError> {
    let n = m.nrows();
    if m.ncols() != n {
        return Err(EngineError::InvalidArgument(format!(
            "kernel must be square, got {}x{}",
            n,
            m.ncols()
        )));
    }
    if num_top == 0 || num_top > n {
        return Err(EngineError::InvalidArgument(format!(
            "rank budget num_top = {} outside [1, {}]",
            num_top, n
        )));
    }

    let (mut values, vectors) = lanczos_top_eigen(m, num_top)?;
    let clipped = values.iter().filter(|&&v| v < EIGENVALUE_FLOOR).count();
    for v in values.iter_mut() {
        if *v < EIGENVALUE_FLOOR {
            *v = EIGENVALUE_FLOOR;
        }
    }
    if clipped > 0 {
        debug!(
            "floored {} of {} leading kernel eigenvalues",
            clipped, num_top
        );
    }

    let kernel = vectors.scale_cols(&values).mat_mul(&vectors.transpose());

    Ok(PsdProjection {
        eigenvalues: values,
        eigenvectors: vectors,
        kernel,
    })
}
