//! Error types for SVM training and prediction

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SVMError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid dataset: {0}")]
    InvalidDataset(String),

    #[error("Invalid label: {0}")]
    InvalidLabel(f64),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Empty dataset")]
    EmptyDataset,

    #[error("Specified nu = {nu} is infeasible for classes {first} and {second}")]
    InfeasibleNu { nu: f64, first: i32, second: i32 },

    #[error("Class weight given for unknown label {0}")]
    UnknownClassWeight(i32),

    #[error("Unsupported kernel: {0}")]
    UnsupportedKernel(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type Result<T> = std::result::Result<T, SVMError>;
