//! Kernel score test with an explicit covariate matrix.
//!
//! P is rebuilt from (d, tau) with the same formula the solver uses,
//! not taken from the caller, so the test always reflects the tau it
//! was handed.

use kernest_linalg::decomposition::CholeskyDecomp;
use kernest_linalg::DenseMatrix;

use crate::error::EngineError;
use crate::reml::{validate_weights, working_precision};
use crate::score_test::moments::{from_traces, TestMoments};

/// Score statistic and moment-matching parameters for one kernel.
///
/// `py` is the projected response from the fitted null model; `tau`
/// must be the variance components that produced it.
pub fn test_kernel(
    y: &[f64],
    py: &[f64],
    x: &DenseMatrix,
    cov_mat: &DenseMatrix,
    d: &[f64],
    tau: [f64; 2],
) -> Result<TestMoments, EngineError> {
    let n = y.len();
    if py.len() != n {
        return Err(EngineError::InvalidArgument(format!(
            "projected response has length {}, response has length {}",
            py.len(),
            n
        )));
    }
    if x.nrows() != n {
        return Err(EngineError::InvalidArgument(format!(
            "design matrix has {} rows, response has length {}",
            x.nrows(),
            n
        )));
    }
    if cov_mat.nrows() != n || cov_mat.ncols() != n {
        return Err(EngineError::InvalidArgument(format!(
            "kernel is {}x{}, expected {}x{}",
            cov_mat.nrows(),
            cov_mat.ncols(),
            n,
            n
        )));
    }
    validate_weights(y, d)?;

    let hinv = working_precision(d, tau);
    let hinv_x = x.scale_rows(&hinv);
    let xt_hinv_x = x.xtwx(&hinv);
    let cov = CholeskyDecomp::new(&xt_hinv_x)?.inverse();

    let correction = hinv_x.mat_mul(&cov).mat_mul(&hinv_x.transpose());
    let mut proj = DenseMatrix::zeros(n, n);
    for j in 0..n {
        for i in 0..n {
            let diag = if i == j { hinv[i] } else { 0.0 };
            proj.set(i, j, diag - correction.get(i, j));
        }
    }

    let pk = proj.mat_mul(cov_mat);
    let trace_pkp = pk.hadamard_sum(&proj);
    let info_mp1 = 0.5 * pk.trace_product(&pk);
    let sum_pp = proj.hadamard_sum(&proj);
    let ee = pk.trace() / 2.0;

    let pkpy = pk.mat_vec(py);
    let s0 = 0.5 * DenseMatrix::dot(y, &pkpy);

    from_traces(s0, ee, info_mp1, trace_pkp, sum_pp)
}
