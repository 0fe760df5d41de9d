//! Kernel score tests on a fitted null model.
//!
//! Given the projection output of an AI-REML fit, computes the score
//! statistic for the hypothesis that a candidate kernel contributes no
//! variance, together with the Satterthwaite moment-matching
//! parameters for its scaled chi-square null approximation.

pub mod covariates;
pub mod intercept;
pub mod moments;
