//! AI-REML Newton step specialized to an intercept-only design.
//!
//! With X a single constant column, X'HinvX collapses to a scalar sum
//! and P becomes a diagonal matrix minus a rank-1 correction, so no
//! n x n storage or O(n^3) solve is ever needed. The tau trajectory
//! matches the general solver on the same inputs up to floating-point
//! rounding.

use kernest_linalg::DenseMatrix;

use crate::error::EngineError;
use crate::reml::covariates::solve_ai;
use crate::reml::{apply_boundary, validate_weights, working_precision};

/// Output of one Newton step under the intercept-only design.
#[derive(Debug, Clone)]
pub struct InterceptStep {
    /// Updated variance components, both non-negative.
    pub tau: [f64; 2],
    /// Diagonal of P; the off-diagonal part is the implicit rank-1
    /// correction -HinvX HinvX' / (X'HinvX).
    pub p_diag: Vec<f64>,
    /// 1 / (X'HinvX), the GLS variance of alpha.
    pub cov: f64,
    /// GLS intercept estimate.
    pub alpha: f64,
    /// P * y, assembled without materializing P.
    pub py: Vec<f64>,
    /// Working response.
    pub eta: Vec<f64>,
}

/// Perform exactly one boundary-constrained AI Newton step for the
/// intercept-only design. Same contract and boundary policy as
/// [`super::covariates::ai_step`].
pub fn ai_step(
    y: &[f64],
    d: &[f64],
    tau: [f64; 2],
    fixtau: [bool; 2],
    tol: f64,
) -> Result<InterceptStep, EngineError> {
    validate_weights(y, d)?;
    let n = y.len();

    let hinv = working_precision(d, tau);
    let s: f64 = hinv.iter().sum();
    if !(s > 0.0) || !s.is_finite() {
        return Err(EngineError::NumericalFailure(
            "intercept precision sum is not positive".into(),
        ));
    }
    let cov = 1.0 / s;

    let uy = DenseMatrix::dot(&hinv, y);
    let alpha = cov * uy;
    let eta: Vec<f64> = (0..n)
        .map(|i| y[i] - tau[0] * (hinv[i] * y[i] - hinv[i] * alpha) / d[i])
        .collect();
    let py: Vec<f64> = (0..n).map(|i| hinv[i] * y[i] - hinv[i] * cov * uy).collect();
    let p_diag: Vec<f64> = hinv.iter().map(|&h| h - h * h * cov).collect();

    let free: Vec<usize> = (0..2).filter(|&i| !fixtau[i]).collect();
    let tau = if free.is_empty() {
        tau
    } else {
        let num_free = free.len();
        let trace_p: f64 = p_diag.iter().sum();
        let mut aimat = DenseMatrix::zeros(num_free, num_free);
        let mut score = vec![0.0; num_free];
        for i in 0..num_free {
            // P v = Hinv v - HinvX * cov * (HinvX' v), applied lazily.
            let upy = DenseMatrix::dot(&hinv, &py);
            let papy: Vec<f64> = (0..n).map(|r| hinv[r] * py[r] - hinv[r] * cov * upy).collect();
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

    Ok(InterceptStep {
        tau,
        p_diag,
        cov,
        alpha,
        py,
        eta,
    })
}
