//! Support vector machine training with a generalized SMO solver
//!
//! Fits C-SVC, nu-SVC, one-class SVM, epsilon-SVR and nu-SVR models using the
//! working set selection of Fan, Chen and Lin (2005), shrinking, and an LRU cache
//! of kernel rows bounded by a byte budget. Multi-class problems are split into
//! one-vs-one sub-problems.

pub mod api;
pub mod cache;
pub mod core;
pub mod kernel;
pub mod matrix;
pub mod model;
pub mod optimizer;
pub mod persistence;
pub mod probability;
pub mod problem;
pub mod solver;
pub mod utils;

// Re-export main types for convenience
pub use crate::api::{EvaluationMetrics, RegressionMetrics, TrainedModel, SVM};
pub use crate::cache::{CacheStats, RowCache};
pub use crate::core::error::{Result, SVMError};
pub use crate::core::traits::*;
pub use crate::core::types::*;
pub use crate::kernel::{
    Kernel, KernelDescriptor, LinearKernel, PolynomialKernel, RBFKernel, SigmoidKernel,
    StoredKernel,
};
pub use crate::matrix::{KernelMatrix, SvcKernelMatrix, SvrKernelMatrix};
pub use crate::model::{ModelInfo, SubModel, SupportVector};
pub use crate::optimizer::{SVMOptimizer, TrainedSVM};
pub use crate::persistence::SerializableModel;
pub use crate::problem::{Problem, ProblemInfo, SubProblem};
pub use crate::solver::{SolutionInfo, SolverConfig, SolverVariant};

// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
