//! Boundary-constrained AI-REML estimation of the two variance
//! components.
//!
//! `tau[0]` scales the heteroskedastic noise term derived from the
//! per-observation weights, `tau[1]` the homogeneous random effect.
//! One call performs exactly one Average-Information Newton step;
//! iteration to convergence lives in [`fit`].

pub mod covariates;
pub mod fit;
pub mod intercept;

use tracing::debug;

use crate::error::EngineError;
use crate::NOISE_RIDGE;

/// Step-halving floor. A feasible point is always reached long before
/// this; the floor only guards against pathological float inputs.
const MIN_STEP: f64 = 1e-10;

/// Diagonal of H^{-1} for the current variance components:
/// `1 / (tau0 / (d + eps) + tau1 + eps)` with the fixed ridge eps.
pub(crate) fn working_precision(d: &[f64], tau: [f64; 2]) -> Vec<f64> {
    d.iter()
        .map(|&di| 1.0 / (tau[0] / (di + NOISE_RIDGE) + tau[1] + NOISE_RIDGE))
        .collect()
}

/// Apply one Newton proposal under the non-negativity boundary.
///
/// Components that sat below `tol` before the step and remain below it
/// afterwards are snapped to zero; the step is then halved until every
/// component is non-negative, re-snapping at each halving, and any
/// component still below `tol` is finally set to exactly zero.
pub(crate) fn apply_boundary(tau0: [f64; 2], dtau: &[f64], free: &[usize], tol: f64) -> [f64; 2] {
    let zero = [tau0[0] < tol, tau0[1] < tol];

    let propose = |step: f64| -> [f64; 2] {
        let mut tau = tau0;
        for (k, &i) in free.iter().enumerate() {
            tau[i] = tau0[i] + step * dtau[k];
        }
        for i in 0..2 {
            if zero[i] && tau[i] < tol {
                tau[i] = 0.0;
            }
        }
        tau
    };

    let mut tau = propose(1.0);
    let mut step = 1.0;
    while tau.iter().any(|&t| t < 0.0) && step > MIN_STEP {
        step *= 0.5;
        tau = propose(step);
    }
    if step < 1.0 {
        debug!("halved Newton step to {:.3e} to stay feasible", step);
    }

    for t in tau.iter_mut() {
        if *t < tol {
            *t = 0.0;
        }
    }
    tau
}

/// Shape and sign checks shared by both solver variants.
pub(crate) fn validate_weights(y: &[f64], d: &[f64]) -> Result<(), EngineError> {
    if d.len() != y.len() {
        return Err(EngineError::InvalidArgument(format!(
            "weight vector has length {}, response has length {}",
            d.len(),
            y.len()
        )));
    }
    if d.iter().any(|&v| v < 0.0) {
        return Err(EngineError::InvalidArgument(
            "weight vector contains negative entries".into(),
        ));
    }
    Ok(())
}
