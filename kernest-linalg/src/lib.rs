//! kernest-linalg: linear algebra for the kernest estimation engine.
//!
//! Provides dense and sparse matrix wrappers plus the symmetric
//! decompositions the engine relies on: Cholesky for the GLS normal
//! equations, full symmetric eigendecomposition for dense kernel
//! regularization, and a Lanczos solver for the leading eigenpairs
//! of sparse kernels.

pub mod dense;
pub mod decomposition;
pub mod sparse;

pub use decomposition::LinalgError;
pub use dense::DenseMatrix;
pub use sparse::SparseMatrix;
