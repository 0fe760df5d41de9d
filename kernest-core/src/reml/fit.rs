//! Convergence driver for the single-step AI solvers.
//!
//! The leaf operations perform one Newton step per call; this module
//! threads tau through repeated steps until the relative change drops
//! below tolerance, dispatching to the matrix-free intercept solver or
//! the general one depending on the covariate structure.

use tracing::{debug, warn};

use kernest_linalg::DenseMatrix;

use crate::error::EngineError;
use crate::reml::{covariates, intercept};
use crate::score_test;
use crate::score_test::moments::TestMoments;

/// Covariate structure of the model, selecting between the two
/// interchangeable solver strategies.
#[derive(Debug, Clone)]
pub enum Design {
    /// Intercept only: an implicit all-ones column, handled by the
    /// rank-1 specialization.
    Intercept,
    /// Explicit n x p covariate matrix (first column conventionally the
    /// intercept).
    Covariates(DenseMatrix),
}

/// Configuration for the outer Newton loop.
#[derive(Debug, Clone)]
pub struct FitConfig {
    /// Maximum number of AI steps.
    pub max_iter: usize,
    /// Convergence threshold on the relative tau change; also the
    /// boundary snap tolerance handed to each step.
    pub tol: f64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            max_iter: 50,
            tol: 1e-5,
        }
    }
}

/// Result of fitting the variance components to convergence.
#[derive(Debug, Clone)]
pub struct FitOutcome {
    /// Final variance components, both non-negative.
    pub tau: [f64; 2],
    /// GLS coefficient estimate at the final tau (length 1 for the
    /// intercept-only design).
    pub alpha: Vec<f64>,
    /// P * y at the final tau.
    pub py: Vec<f64>,
    /// Working response at the final tau.
    pub eta: Vec<f64>,
    /// Number of AI steps taken.
    pub iterations: usize,
    /// Whether the relative change dropped below tolerance.
    pub converged: bool,
}

impl Design {
    /// One AI step under this design, reduced to the fields the outer
    /// loop threads forward.
    fn step(
        &self,
        y: &[f64],
        d: &[f64],
        tau: [f64; 2],
        fixtau: [bool; 2],
        tol: f64,
    ) -> Result<([f64; 2], Vec<f64>, Vec<f64>, Vec<f64>), EngineError> {
        match self {
            Design::Intercept => {
                let s = intercept::ai_step(y, d, tau, fixtau, tol)?;
                Ok((s.tau, vec![s.alpha], s.py, s.eta))
            }
            Design::Covariates(x) => {
                let s = covariates::ai_step(y, x, d, tau, fixtau, tol)?;
                Ok((s.tau, s.alpha, s.py, s.eta))
            }
        }
    }

    /// Score-test moments for a fitted unit under this design.
    pub fn kernel_moments(
        &self,
        y: &[f64],
        py: &[f64],
        cov_mat: &DenseMatrix,
        d: &[f64],
        tau: [f64; 2],
    ) -> Result<TestMoments, EngineError> {
        match self {
            Design::Intercept => score_test::intercept::test_kernel(y, py, cov_mat, d, tau),
            Design::Covariates(x) => score_test::covariates::test_kernel(y, py, x, cov_mat, d, tau),
        }
    }
}

/// Fit the variance components by iterating AI steps to convergence.
///
/// Convergence is declared when
/// `max_i |tau_new[i] - tau_old[i]| / (|tau_new[i]| + |tau_old[i]| + tol)`
/// falls below `tol`. Exceeding `max_iter` is not an error; the outcome
/// is returned with `converged = false`.
pub fn fit(
    design: &Design,
    y: &[f64],
    d: &[f64],
    tau_init: [f64; 2],
    fixtau: [bool; 2],
    config: &FitConfig,
) -> Result<FitOutcome, EngineError> {
    if config.max_iter == 0 {
        return Err(EngineError::InvalidArgument(
            "max_iter must be at least 1".into(),
        ));
    }

    let mut tau = tau_init;
    let mut iterations = 0;

    loop {
        let (tau_new, alpha, py, eta) = design.step(y, d, tau, fixtau, config.tol)?;
        iterations += 1;

        let change = (0..2)
            .map(|i| (tau_new[i] - tau[i]).abs() / (tau_new[i].abs() + tau[i].abs() + config.tol))
            .fold(0.0f64, f64::max);
        debug!(
            "AI step {}: tau=[{:.6}, {:.6}], change={:.2e}",
            iterations, tau_new[0], tau_new[1], change
        );

        tau = tau_new;
        let converged = change < config.tol;
        if converged || iterations == config.max_iter {
            if !converged {
                warn!(
                    "variance components did not converge after {} iterations",
                    iterations
                );
            }
            return Ok(FitOutcome {
                tau,
                alpha,
                py,
                eta,
                iterations,
                converged,
            });
        }
    }
}
