//! Dense kernel projection onto the PSD cone.

use tracing::debug;

use kernest_linalg::decomposition::symmetric_eigen;
use kernest_linalg::DenseMatrix;

use crate::error::EngineError;
use crate::EIGENVALUE_FLOOR;

/// Clipped eigendecomposition of a kernel matrix.
#[derive(Debug, Clone)]
pub struct PsdProjection {
    /// Floored eigenvalues, ascending.
    pub eigenvalues: Vec<f64>,
    /// Eigenvectors, one column per retained eigenpair.
    pub eigenvectors: DenseMatrix,
    /// Reconstructed kernel V * diag(eigenvalues) * V'.
    pub kernel: DenseMatrix,
}

/// Project a symmetric kernel onto the set of matrices whose
/// eigenvalues are all at least [`EIGENVALUE_FLOOR`].
///
/// The full spectrum is computed, every eigenvalue below the floor is
/// replaced by the floor, and the kernel is rebuilt from the clipped
/// spectrum. The caller's matrix is not modified.
pub fn project_psd(m: &DenseMatrix) -> Result<PsdProjection, EngineError> {
    if m.nrows() != m.ncols() {
        return Err(EngineError::InvalidArgument(format!(
            "kernel must be square, got {}x{}",
            m.nrows(),
            m.ncols()
        )));
    }

    let eig = symmetric_eigen(m)?;
    let mut values = eig.values;
    let clipped = values.iter().filter(|&&v| v < EIGENVALUE_FLOOR).count();
    for v in values.iter_mut() {
        if *v < EIGENVALUE_FLOOR {
            *v = EIGENVALUE_FLOOR;
        }
    }
    if clipped > 0 {
        debug!("floored {} of {} kernel eigenvalues", clipped, values.len());
    }

    let kernel = eig
        .vectors
        .scale_cols(&values)
        .mat_mul(&eig.vectors.transpose());

    Ok(PsdProjection {
        eigenvalues: values,
        eigenvectors: eig.vectors,
        kernel,
    })
}
