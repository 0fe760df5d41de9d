//! AI-REML Newton step with an explicit covariate matrix.
//!
//! Works with the full n x n residual-forming operator
//! `P = diag(Hinv) - HinvX (X'HinvX)^{-1} HinvX'` and dense quadratic
//! forms. For the intercept-only design the rank-1 specialization in
//! [`super::intercept`] produces the same trajectory at a fraction of
//! the cost.

use tracing::warn;

use kernest_linalg::decomposition::{solve_sym_small, solve_sym_small_pinv, CholeskyDecomp};
use kernest_linalg::{DenseMatrix, LinalgError};

use crate::error::EngineError;
use crate::reml::{apply_boundary, validate_weights, working_precision};

/// Output of one Newton step under the general design.
#[derive(Debug, Clone)]
pub struct CovariateStep {
    /// Updated variance components, both non-negative.
    pub tau: [f64; 2],
    /// GLS residual-forming operator P for the updated-from tau.
    pub proj: DenseMatrix,
    /// (X' Hinv X)^{-1}, the GLS covariance of alpha.
    pub cov: DenseMatrix,
    /// GLS coefficient estimate.
    pub alpha: Vec<f64>,
    /// P * y.
    pub py: Vec<f64>,
    /// Working response.
    pub eta: Vec<f64>,
}

/// Perform exactly one boundary-constrained AI Newton step.
///
/// Components flagged in `fixtau` are held at their incoming value;
/// with every component fixed the update is skipped entirely and tau is
/// returned unchanged alongside the derived GLS quantities.
pub fn ai_step(
    y: &[f64],
    x: &DenseMatrix,
    d: &[f64],
    tau: [f64; 2],
    fixtau: [bool; 2],
    tol: f64,
) -> Result<CovariateStep, EngineError> {
    let n = y.len();
    if x.nrows() != n {
        return Err(EngineError::InvalidArgument(format!(
            "design matrix has {} rows, response has length {}",
            x.nrows(),
            n
        )));
    }
    if x.ncols() == 0 {
        return Err(EngineError::InvalidArgument(
            "design matrix must have at least one column".into(),
        ));
    }
    validate_weights(y, d)?;

    let hinv = working_precision(d, tau);
    let hinv_x = x.scale_rows(&hinv);
    let xt_hinv_x = x.xtwx(&hinv);
    let cov = CholeskyDecomp::new(&xt_hinv_x)?.inverse();

    // P = diag(Hinv) - HinvX (X'HinvX)^{-1} HinvX'
    let correction = hinv_x.mat_mul(&cov).mat_mul(&hinv_x.transpose());
    let mut proj = DenseMatrix::zeros(n, n);
    for j in 0..n {
        for i in 0..n {
            let diag = if i == j { hinv[i] } else { 0.0 };
            proj.set(i, j, diag - correction.get(i, j));
        }
    }

    let xt_hinv_y = x.xtwv(&hinv, y);
    let alpha = cov.mat_vec(&xt_hinv_y);
    let hinv_x_alpha = hinv_x.mat_vec(&alpha);
    let eta: Vec<f64> = (0..n)
        .map(|i| y[i] - tau[0] * (hinv[i] * y[i] - hinv_x_alpha[i]) / d[i])
        .collect();
    let py = proj.mat_vec(y);

    let free: Vec<usize> = (0..2).filter(|&i| !fixtau[i]).collect();
    let tau = if free.is_empty() {
        tau
    } else {
        let num_free = free.len();
        let trace_p = proj.trace();
        let mut aimat = DenseMatrix::zeros(num_free, num_free);
        let mut score = vec![0.0; num_free];
        for i in 0..num_free {
            let papy = proj.mat_vec(&py);
            score[i] = DenseMatrix::dot(y, &papy) - trace_p;
            for j in 0..=i {
                let q = DenseMatrix::dot(&py, &papy);
                aimat.set(i, j, q);
                if j != i {
                    aimat.set(j, i, q);
                }
            }
        }

        let dtau = solve_ai(&aimat, &score)?;
        apply_boundary(tau, &dtau, &free, tol)
    };

    Ok(CovariateStep {
        tau,
        proj,
        cov,
        alpha,
        py,
        eta,
    })
}

/// Solve the average-information system, falling back to the
/// minimum-norm solution when the system is exactly singular.
pub(crate) fn solve_ai(aimat: &DenseMatrix, score: &[f64]) -> Result<Vec<f64>, EngineError> {
    match solve_sym_small(aimat, score) {
        Ok(dtau) => Ok(dtau),
        Err(LinalgError::Singular) => {
            warn!("average-information matrix is singular; taking the minimum-norm Newton step");
            Ok(solve_sym_small_pinv(aimat, score)?)
        }
        Err(e) => Err(e.into()),
    }
}
