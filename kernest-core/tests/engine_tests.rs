//! End-to-end scenarios for the estimation and testing engine:
//! projection, single AI steps, boundary handling, and the full
//! project-fit-test pipeline.

use kernest_core::batch::{analyze_units, UnitInput};
use kernest_core::kernel::dense::project_psd;
use kernest_core::kernel::sparse::project_psd_top;
use kernest_core::reml::covariates;
use kernest_core::reml::fit::{fit, Design, FitConfig};
use kernest_core::reml::intercept;
use kernest_core::score_test;
use kernest_core::{EngineError, EIGENVALUE_FLOOR, NOISE_RIDGE};
use kernest_linalg::{DenseMatrix, SparseMatrix};

/// Hinv diagonal as the solvers build it.
fn working_precision(d: &[f64], tau: [f64; 2]) -> Vec<f64> {
    d.iter()
        .map(|&di| 1.0 / (tau[0] / (di + NOISE_RIDGE) + tau[1] + NOISE_RIDGE))
        .collect()
}

fn ones_column(n: usize) -> DenseMatrix {
    DenseMatrix::from_col_major(n, 1, vec![1.0; n])
}

fn exp_kernel(n: usize, scale: f64) -> DenseMatrix {
    let mut k = DenseMatrix::zeros(n, n);
    for i in 0..n {
        for j in 0..n {
            let dist = i.abs_diff(j) as f64;
            k.set(i, j, (-dist / scale).exp());
        }
    }
    k
}

#[test]
fn single_ai_step_reference_scenario() {
    // n = 4, unit weights, intercept design, both components free.
    let y = vec![0.1, -0.2, 0.05, 0.15];
    let d = vec![1.0; 4];
    let x = ones_column(4);
    let tau = [1.0, 1.0];

    let step = covariates::ai_step(&y, &x, &d, tau, [false, false], 1e-4).unwrap();

    assert!(step.tau[0] >= 0.0, "tau0 = {}", step.tau[0]);
    assert!(step.tau[1] >= 0.0, "tau1 = {}", step.tau[1]);

    // trace(P) = sum(Hinv) - sum(HinvX^2) / (X'HinvX) for the
    // constant-column design.
    let hinv = working_precision(&d, tau);
    let s: f64 = hinv.iter().sum();
    let expected_trace = s - hinv.iter().map(|h| h * h).sum::<f64>() / s;
    assert!(
        (step.proj.trace() - expected_trace).abs() < 1e-6,
        "trace(P) = {}, expected {}",
        step.proj.trace(),
        expected_trace
    );
}

#[test]
fn infeasible_newton_step_is_halved_to_feasibility() {
    // A nearly-zero response makes the score strongly negative while the
    // average information stays tiny, so the raw Newton step drives the
    // free component far below zero.
    let n = 6;
    let y = vec![1e-3, -2e-3, 5e-4, 1.5e-3, -1e-3, 8e-4];
    let d = vec![1.0; n];
    let x = ones_column(n);
    let tau = [1.0, 1.0];
    let tol = 1e-4;

    // Reproduce the raw Newton proposal from a frozen step at the same tau.
    let frozen = covariates::ai_step(&y, &x, &d, tau, [true, true], tol).unwrap();
    let papy = frozen.proj.mat_vec(&frozen.py);
    let score = DenseMatrix::dot(&y, &papy) - frozen.proj.trace();
    let ai = DenseMatrix::dot(&frozen.py, &papy);
    let dtau = score / ai;
    assert!(
        tau[0] + dtau < 0.0,
        "scenario did not produce an infeasible raw step (dtau = {})",
        dtau
    );

    // Only component 0 free: the solver must halve until feasible.
    let stepped = covariates::ai_step(&y, &x, &d, tau, [false, true], tol).unwrap();
    assert!(stepped.tau[0] >= 0.0);
    assert!(stepped.tau[0] < tau[0], "step did not move the component");

    // The result must sit on the halving trajectory tau0 + dtau / 2^k
    // (unless the landing point fell below tol and was snapped to zero).
    if stepped.tau[0] > 0.0 {
        let mut matched = false;
        let mut proposal = dtau;
        for _ in 1..=80 {
            proposal *= 0.5;
            if (stepped.tau[0] - (tau[0] + proposal)).abs() < 1e-9 {
                matched = true;
                break;
            }
        }
        assert!(matched, "tau0 = {} is not a halved step", stepped.tau[0]);
    }
}

#[test]
fn below_tolerance_component_is_snapped_to_exact_zero() {
    let n = 6;
    let y = vec![1e-3, -2e-3, 5e-4, 1.5e-3, -1e-3, 8e-4];
    let d = vec![1.0; n];
    let x = ones_column(n);
    // Component 1 starts below tol and the step pushes it further down.
    let tau = [1.0, 5e-5];
    let tol = 1e-4;

    let stepped = covariates::ai_step(&y, &x, &d, tau, [true, false], tol).unwrap();
    assert_eq!(stepped.tau[1], 0.0, "expected exact zero, got {}", stepped.tau[1]);
}

#[test]
fn intercept_and_covariate_solvers_agree_along_the_trajectory() {
    let n = 12;
    let y: Vec<f64> = (0..n).map(|i| (i as f64 * 0.7).sin() * 0.3).collect();
    let d: Vec<f64> = (0..n).map(|i| 0.6 + 0.05 * i as f64).collect();
    let x = ones_column(n);
    let mut tau_fast = [0.9, 0.4];
    let mut tau_full = [0.9, 0.4];

    for _ in 0..5 {
        let fast = intercept::ai_step(&y, &d, tau_fast, [false, false], 1e-4).unwrap();
        let full = covariates::ai_step(&y, &x, &d, tau_full, [false, false], 1e-4).unwrap();
        tau_fast = fast.tau;
        tau_full = full.tau;
        for i in 0..2 {
            assert!(
                (tau_fast[i] - tau_full[i]).abs() < 1e-7,
                "trajectories diverged: tau[{}] {} vs {}",
                i,
                tau_fast[i],
                tau_full[i]
            );
        }
    }
}

#[test]
fn score_test_paths_agree_on_constant_column() {
    let n = 10;
    let y: Vec<f64> = (0..n).map(|i| (i as f64 * 1.3).cos() * 0.2).collect();
    let d = vec![1.0; n];
    let kernel = exp_kernel(n, 2.0);

    let fitted = fit(
        &Design::Intercept,
        &y,
        &d,
        [0.5, 0.5],
        [false, false],
        &FitConfig::default(),
    )
    .unwrap();

    let fast =
        score_test::intercept::test_kernel(&y, &fitted.py, &kernel, &d, fitted.tau).unwrap();
    let x = ones_column(n);
    let full =
        score_test::covariates::test_kernel(&y, &fitted.py, &x, &kernel, &d, fitted.tau).unwrap();

    assert!((fast.s0 - full.s0).abs() < 1e-8);
    assert!((fast.ee - full.ee).abs() < 1e-8);
    assert!((fast.info_mp1 - full.info_mp1).abs() < 1e-8);
    assert!((fast.df - full.df).abs() < 1e-6);
    assert!((fast.kk - full.kk).abs() < 1e-8);
}

#[test]
fn zero_kernel_cannot_be_tested() {
    let n = 8;
    let y: Vec<f64> = (0..n).map(|i| 0.1 * i as f64 - 0.3).collect();
    let d = vec![1.0; n];
    let fitted = intercept::ai_step(&y, &d, [0.5, 0.5], [true, true], 1e-4).unwrap();
    let zero = DenseMatrix::zeros(n, n);
    assert!(matches!(
        score_test::intercept::test_kernel(&y, &fitted.py, &zero, &d, [0.5, 0.5]),
        Err(EngineError::NumericalFailure(_))
    ));
}

#[test]
fn projection_pipeline_dense_and_sparse_agree() {
    let n = 9;
    // An indefinite perturbation of a smooth kernel.
    let mut raw = exp_kernel(n, 1.5);
    raw.set(0, n - 1, -0.9);
    raw.set(n - 1, 0, -0.9);

    let dense = project_psd(&raw).unwrap();
    for &v in &dense.eigenvalues {
        assert!(v >= EIGENVALUE_FLOOR);
    }

    let sparse = project_psd_top(&SparseMatrix::from_dense(&raw), n).unwrap();
    for i in 0..n {
        assert!(
            (dense.eigenvalues[i] - sparse.eigenvalues[i]).abs() < 1e-6,
            "eigenvalue {}: {} vs {}",
            i,
            dense.eigenvalues[i],
            sparse.eigenvalues[i]
        );
        for j in 0..n {
            assert!(
                (dense.kernel.get(i, j) - sparse.kernel.get(i, j)).abs() < 1e-5,
                "kernel[{},{}]: {} vs {}",
                i,
                j,
                dense.kernel.get(i, j),
                sparse.kernel.get(i, j)
            );
        }
    }
}

#[test]
fn full_pipeline_project_fit_test() {
    let n = 14;
    let y: Vec<f64> = (0..n).map(|i| ((i * i) as f64 * 0.37).sin() * 0.4).collect();
    let d: Vec<f64> = (0..n).map(|i| 0.8 + 0.02 * i as f64).collect();

    let kernel = project_psd(&exp_kernel(n, 2.5)).unwrap().kernel;

    let fitted = fit(
        &Design::Intercept,
        &y,
        &d,
        [1.0, 1.0],
        [false, false],
        &FitConfig::default(),
    )
    .unwrap();
    assert!(fitted.tau[0] >= 0.0 && fitted.tau[1] >= 0.0);

    let moments = score_test::intercept::test_kernel(&y, &fitted.py, &kernel, &d, fitted.tau)
        .unwrap();
    let p = moments.pvalue().unwrap();
    assert!((0.0..=1.0).contains(&p), "p = {}", p);
}

#[test]
fn batch_driver_survives_bad_units() {
    let n = 12;
    let d = vec![1.0; n];
    let kernel = project_psd(&exp_kernel(n, 2.0)).unwrap().kernel;

    let good = |seed: usize| UnitInput {
        y: (0..n).map(|i| ((i + seed) as f64 * 0.91).sin() * 0.3).collect(),
        tau: [0.5, 0.5],
        fixtau: [false, false],
    };
    let units = vec![
        good(1),
        UnitInput {
            y: vec![0.0; n + 1], // shape mismatch
            tau: [0.5, 0.5],
            fixtau: [false, false],
        },
        good(2),
    ];

    let results = analyze_units(
        &Design::Intercept,
        &d,
        &kernel,
        &units,
        &FitConfig::default(),
    );
    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    assert!(results[1].is_err());
    assert!(results[2].is_ok());
    let report = results[0].as_ref().unwrap();
    assert!((0.0..=1.0).contains(&report.pvalue));
}
