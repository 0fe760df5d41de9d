//! Engine-level error taxonomy.
//!
//! Every operation is single-shot and fails fast: a failure aborts only
//! the current unit's call and carries no partial results. Callers
//! driving many units are expected to record the failed unit and move
//! on to the next.

use kernest_linalg::LinalgError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Malformed input: shape mismatches, negative weights, a rank
    /// budget outside the admissible range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The inputs were well-formed but the numerics degenerated: a
    /// non-convergent eigendecomposition, a rank-deficient design, a
    /// degenerate average-information matrix, or non-positive adjusted
    /// information in the score test.
    #[error("numerical failure: {0}")]
    NumericalFailure(String),
}

impl From<LinalgError> for EngineError {
    fn from(err: LinalgError) -> Self {
        match err {
            LinalgError::DimensionMismatch { .. } => EngineError::InvalidArgument(err.to_string()),
            _ => EngineError::NumericalFailure(err.to_string()),
        }
    }
}
