//! Embarrassingly-parallel driver over many independent units.
//!
//! Every unit (one response vector, one initial tau) is fitted and
//! tested against the shared kernel on its own; a failing unit is
//! recorded as failed and the batch continues. Units share only
//! read-only inputs, so the fan-out needs no synchronization beyond
//! collecting results.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use kernest_linalg::DenseMatrix;

use crate::error::EngineError;
use crate::reml::fit::{fit, Design, FitConfig};
use crate::score_test::moments::TestMoments;

/// Per-unit input: the response plus the unit's starting point for the
/// variance components.
#[derive(Debug, Clone)]
pub struct UnitInput {
    pub y: Vec<f64>,
    pub tau: [f64; 2],
    pub fixtau: [bool; 2],
}

/// Per-unit output: the fitted components and the kernel test summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitReport {
    pub tau: [f64; 2],
    pub iterations: usize,
    pub converged: bool,
    pub moments: TestMoments,
    pub pvalue: f64,
}

/// Fit and test every unit against the shared kernel.
///
/// Results come back in unit order, one `Result` per unit; an error in
/// one unit never aborts the others.
pub fn analyze_units(
    design: &Design,
    d: &[f64],
    cov_mat: &DenseMatrix,
    units: &[UnitInput],
    config: &FitConfig,
) -> Vec<Result<UnitReport, EngineError>> {
    info!("analyzing {} units", units.len());

    let results: Vec<Result<UnitReport, EngineError>> = units
        .par_iter()
        .map(|unit| {
            let fitted = fit(design, &unit.y, d, unit.tau, unit.fixtau, config)?;
            let moments = design.kernel_moments(&unit.y, &fitted.py, cov_mat, d, fitted.tau)?;
            let pvalue = moments.pvalue()?;
            Ok(UnitReport {
                tau: fitted.tau,
                iterations: fitted.iterations,
                converged: fitted.converged,
                moments,
                pvalue,
            })
        })
        .collect();

    let failed = results.iter().filter(|r| r.is_err()).count();
    if failed > 0 {
        warn!("{} of {} units failed", failed, units.len());
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use rand::SeedableRng;

    fn shared_kernel(n: usize) -> DenseMatrix {
        let mut k = DenseMatrix::zeros(n, n);
        for i in 0..n {
            for j in 0..n {
                let dist = i.abs_diff(j) as f64;
                k.set(i, j, (-dist / 3.0).exp());
            }
        }
        k
    }

    fn random_units(n: usize, count: usize, seed: u64) -> Vec<UnitInput> {
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(seed);
        (0..count)
            .map(|_| UnitInput {
                y: (0..n).map(|_| rng.gen::<f64>() - 0.5).collect(),
                tau: [0.5, 0.5],
                fixtau: [false, false],
            })
            .collect()
    }

    #[test]
    fn test_batch_order_and_success() {
        let n = 15;
        let d = vec![1.0; n];
        let kernel = shared_kernel(n);
        let units = random_units(n, 6, 42);

        let results = analyze_units(
            &Design::Intercept,
            &d,
            &kernel,
            &units,
            &FitConfig::default(),
        );
        assert_eq!(results.len(), 6);
        for (i, r) in results.iter().enumerate() {
            let report = r.as_ref().unwrap_or_else(|e| panic!("unit {}: {}", i, e));
            assert!(report.tau[0] >= 0.0 && report.tau[1] >= 0.0);
            assert!((0.0..=1.0).contains(&report.pvalue));
        }
    }

    #[test]
    fn test_failed_unit_does_not_abort_batch() {
        let n = 10;
        let d = vec![1.0; n];
        let kernel = shared_kernel(n);

        let mut units = random_units(n, 3, 7);
        // Wrong response length makes the middle unit fail validation.
        units[1].y = vec![0.0; n - 1];

        let results = analyze_units(
            &Design::Intercept,
            &d,
            &kernel,
            &units,
            &FitConfig::default(),
        );
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(matches!(
            results[1],
            Err(EngineError::InvalidArgument(_))
        ));
        assert!(results[2].is_ok());
    }
}
