//! Moment-matching outputs and their scaled chi-square p-value.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF};

use crate::error::EngineError;

/// Score statistic and Satterthwaite parameters for one kernel test.
///
/// Under the null the statistic `s0` is approximately distributed as
/// `kk * chi-square(df)`; `ee` and `info_mp1` are the raw first and
/// second moment terms the approximation was matched from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TestMoments {
    /// Score statistic (1/2) y' PK Py.
    pub s0: f64,
    /// Scale term trace(PK) / 2.
    pub ee: f64,
    /// First information term (1/2) trace(PK PK).
    pub info_mp1: f64,
    /// Matched degrees of freedom.
    pub df: f64,
    /// Scale correction factor.
    pub kk: f64,
}

impl TestMoments {
    /// Tail probability of the matched scaled chi-square,
    /// `P(kk * chi2_df >= s0)`.
    pub fn pvalue(&self) -> Result<f64, EngineError> {
        if !(self.kk > 0.0) || !(self.df > 0.0) {
            return Err(EngineError::NumericalFailure(format!(
                "moment parameters do not define a distribution (kk = {}, df = {})",
                self.kk, self.df
            )));
        }
        let chi2 = ChiSquared::new(self.df).map_err(|e| {
            EngineError::NumericalFailure(format!("chi-square with df = {}: {}", self.df, e))
        })?;
        Ok((1.0 - chi2.cdf(self.s0 / self.kk)).clamp(0.0, 1.0))
    }
}

/// Assemble the moment set from the raw trace quantities.
///
/// `trace_pkp` is trace(PK P) and `sum_pp` the squared Frobenius norm
/// of P; together they project out the information already spent
/// estimating tau. Non-positive adjusted information means the test is
/// undefined for this kernel.
pub(crate) fn from_traces(
    s0: f64,
    ee: f64,
    info_mp1: f64,
    trace_pkp: f64,
    sum_pp: f64,
) -> Result<TestMoments, EngineError> {
    let new_info = info_mp1 - 0.5 * trace_pkp * trace_pkp / sum_pp;
    if !(new_info > 0.0) {
        return Err(EngineError::NumericalFailure(format!(
            "adjusted information is not positive ({})",
            new_info
        )));
    }
    let kk = new_info / (2.0 * ee);
    let df = 2.0 * ee * ee / new_info;
    Ok(TestMoments {
        s0,
        ee,
        info_mp1,
        df,
        kk,
    })
}
