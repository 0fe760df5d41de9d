//! PSD regularization of candidate kernel matrices.
//!
//! A kernel handed to the fitting and testing routines must be
//! positive definite or the downstream GLS solves go singular. The
//! projectors here floor the spectrum at [`crate::EIGENVALUE_FLOOR`]
//! and rebuild the kernel from the clipped eigenpairs.

pub mod dense;
pub mod sparse;
