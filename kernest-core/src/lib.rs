//! kernest-core: per-unit estimation and testing for a two-component
//! linear mixed model.
//!
//! For each of many independent response vectors sharing one design,
//! the engine regularizes a candidate kernel matrix to be positive
//! semi-definite, fits the two variance components by boundary-
//! constrained Average-Information Newton steps, and computes a kernel
//! score statistic with the Satterthwaite moment-matching parameters
//! that map it onto a scaled chi-square.

pub mod batch;
pub mod error;
pub mod kernel;
pub mod reml;
pub mod score_test;

pub use error::EngineError;

/// Ridge added to the per-observation weights and to the working
/// variance before inversion. Fixed by the algorithm, not configurable.
pub const NOISE_RIDGE: f64 = 1e-5;

/// Floor applied to eigenvalues during PSD projection of a kernel.
pub const EIGENVALUE_FLOOR: f64 = 1e-8;
