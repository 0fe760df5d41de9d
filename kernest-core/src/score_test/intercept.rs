//! Kernel score test specialized to an intercept-only design.
//!
//! P is never materialized: it acts as diag(Hinv) minus the rank-1
//! correction HinvX HinvX' / (X'HinvX), and PK is assembled from the
//! kernel with one row scaling and one rank-1 update. Matches the
//! general path exactly in exact arithmetic on a constant column.

use kernest_linalg::DenseMatrix;

use crate::error::EngineError;
use crate::reml::{validate_weights, working_precision};
use crate::score_test::moments::{from_traces, TestMoments};

/// Score statistic and moment-matching parameters for one kernel under
/// the intercept-only design.
pub fn test_kernel(
    y: &[f64],
    py: &[f64],
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
    let s: f64 = hinv.iter().sum();
    if !(s > 0.0) || !s.is_finite() {
        return Err(EngineError::NumericalFailure(
            "intercept precision sum is not positive".into(),
        ));
    }

    // PK = diag(Hinv) K - HinvX (HinvX' K) / (X'HinvX)
    let uk = cov_mat.t_mat_vec(&hinv);
    let mut pk = cov_mat.scale_rows(&hinv);
    for j in 0..n {
        for i in 0..n {
            pk.set(i, j, pk.get(i, j) - hinv[i] * uk[j] / s);
        }
    }

    let ee = pk.trace() / 2.0;
    let info_mp1 = 0.5 * pk.trace_product(&pk);

    // trace(PK P) and ||P||_F^2 through the diagonal-minus-rank-1 form
    // of P, without forming it.
    let pk_u = pk.mat_vec(&hinv);
    let trace_pkp = pk
        .diag()
        .iter()
        .zip(hinv.iter())
        .map(|(pkii, h)| pkii * h)
        .sum::<f64>()
        - DenseMatrix::dot(&hinv, &pk_u) / s;

    let sum_h2: f64 = hinv.iter().map(|h| h * h).sum();
    let sum_h3: f64 = hinv.iter().map(|h| h * h * h).sum();
    let sum_pp = sum_h2 - 2.0 * sum_h3 / s + sum_h2 * sum_h2 / (s * s);

    let pkpy = pk.mat_vec(py);
    let s0 = 0.5 * DenseMatrix::dot(y, &pkpy);

    from_traces(s0, ee, info_mp1, trace_pkp, sum_pp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reml::intercept::ai_step;
    use crate::score_test::covariates;

    fn gaussian_kernel(n: usize, bandwidth: f64) -> DenseMatrix {
        let mut k = DenseMatrix::zeros(n, n);
        for i in 0..n {
            for j in 0..n {
                let dist = i.abs_diff(j) as f64;
                k.set(i, j, (-dist * dist / (2.0 * bandwidth * bandwidth)).exp());
            }
        }
        k
    }

    #[test]
    fn test_matches_general_path_on_constant_column() {
        let n = 7;
        let y: Vec<f64> = (0..n).map(|i| 0.15 * (i as f64) - 0.5).collect();
        let d: Vec<f64> = (0..n).map(|i| 0.8 + 0.1 * (i as f64)).collect();
        let tau = [0.6, 0.25];
        let k = gaussian_kernel(n, 1.5);

        let fitted = ai_step(&y, &d, tau, [true, true], 1e-4).unwrap();

        let fast = test_kernel(&y, &fitted.py, &k, &d, tau).unwrap();
        let x = DenseMatrix::from_col_major(n, 1, vec![1.0; n]);
        let full = covariates::test_kernel(&y, &fitted.py, &x, &k, &d, tau).unwrap();

        assert!((fast.s0 - full.s0).abs() < 1e-9, "s0: {} vs {}", fast.s0, full.s0);
        assert!((fast.ee - full.ee).abs() < 1e-9);
        assert!((fast.info_mp1 - full.info_mp1).abs() < 1e-9);
        assert!((fast.df - full.df).abs() < 1e-7);
        assert!((fast.kk - full.kk).abs() < 1e-9);
    }

    #[test]
    fn test_zero_kernel_is_numerical_failure() {
        let n = 5;
        let y = vec![0.1, -0.2, 0.3, 0.0, -0.1];
        let d = vec![1.0; n];
        let tau = [0.5, 0.5];
        let fitted = ai_step(&y, &d, tau, [true, true], 1e-4).unwrap();
        let k = DenseMatrix::zeros(n, n);
        assert!(matches!(
            test_kernel(&y, &fitted.py, &k, &d, tau),
            Err(EngineError::NumericalFailure(_))
        ));
    }

    #[test]
    fn test_moment_identity() {
        let n = 6;
        let y = vec![0.4, -0.3, 0.2, 0.1, -0.2, 0.05];
        let d = vec![1.0; n];
        let tau = [0.7, 0.3];
        let fitted = ai_step(&y, &d, tau, [true, true], 1e-4).unwrap();
        let k = gaussian_kernel(n, 2.0);
        let m = test_kernel(&y, &fitted.py, &k, &d, tau).unwrap();
        assert!((m.df * m.kk - m.ee).abs() < 1e-10);
    }
}
