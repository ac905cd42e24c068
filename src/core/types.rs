//! Core type definitions for SVM training

use crate::core::{Result, SVMError};
use serde::{Deserialize, Serialize};

/// Dense feature vector
///
/// The solver never looks inside a feature vector; only kernels do.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector {
    values: Vec<f64>,
}

impl FeatureVector {
    /// Create a new feature vector
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    /// Number of components
    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Check if vector has no components
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get the value at a specific index (0 if out of range)
    pub fn get(&self, index: usize) -> f64 {
        self.values.get(index).copied().unwrap_or(0.0)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Dot product, treating missing trailing components as zero
    pub fn dot(&self, other: &FeatureVector) -> f64 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| a * b)
            .sum()
    }

    /// Compute squared L2 norm
    pub fn norm_squared(&self) -> f64 {
        self.values.iter().map(|&v| v * v).sum()
    }

    /// Squared Euclidean distance, treating missing trailing components as zero
    pub fn squared_distance(&self, other: &FeatureVector) -> f64 {
        let n = self.dim().max(other.dim());
        (0..n)
            .map(|i| {
                let diff = self.get(i) - other.get(i);
                diff * diff
            })
            .sum()
    }
}

impl From<Vec<f64>> for FeatureVector {
    fn from(values: Vec<f64>) -> Self {
        Self::new(values)
    }
}

impl From<&[f64]> for FeatureVector {
    fn from(values: &[f64]) -> Self {
        Self::new(values.to_vec())
    }
}

/// Training sample with features and target
#[derive(Clone, Debug)]
pub struct Sample {
    pub features: FeatureVector,
    /// Class label for classification, target value for regression
    pub label: f64,
}

impl Sample {
    /// Create a new sample
    pub fn new(features: FeatureVector, label: f64) -> Self {
        Self { features, label }
    }
}

/// Prediction result containing label and decision values
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Predicted class label, or the regression estimate
    pub label: f64,
    /// Raw decision value of every sub-model, in sub-model order
    pub decision_values: Vec<f64>,
}

impl Prediction {
    /// Create a new prediction
    pub fn new(label: f64, decision_values: Vec<f64>) -> Self {
        Self {
            label,
            decision_values,
        }
    }

    /// Largest absolute decision value
    pub fn confidence(&self) -> f64 {
        self.decision_values
            .iter()
            .fold(0.0, |acc: f64, v| acc.max(v.abs()))
    }
}

/// Training formulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SvmType {
    CSvc,
    NuSvc,
    OneClass,
    EpsilonSvr,
    NuSvr,
}

impl SvmType {
    /// True for C-SVC and nu-SVC
    pub fn is_classification(&self) -> bool {
        matches!(self, SvmType::CSvc | SvmType::NuSvc)
    }

    /// True for epsilon-SVR and nu-SVR
    pub fn is_regression(&self) -> bool {
        matches!(self, SvmType::EpsilonSvr | SvmType::NuSvr)
    }

    fn uses_c(&self) -> bool {
        matches!(self, SvmType::CSvc | SvmType::EpsilonSvr | SvmType::NuSvr)
    }

    fn uses_nu(&self) -> bool {
        matches!(self, SvmType::NuSvc | SvmType::OneClass | SvmType::NuSvr)
    }
}

/// User-facing training configuration
#[derive(Debug, Clone)]
pub struct SvmConfig {
    pub svm_type: SvmType,
    /// Regularization parameter (upper bound for alpha)
    pub c: f64,
    /// Fraction bound on margin errors and support vectors for the nu formulations
    pub nu: f64,
    /// Width of the epsilon-insensitive tube for epsilon-SVR
    pub p: f64,
    /// Tolerance of the stopping criterion
    pub epsilon: f64,
    /// Kernel row cache size in bytes
    pub cache_size: usize,
    /// Enable shrinking heuristic
    pub shrinking: bool,
    /// Fit probability calibration alongside the model
    pub probability: bool,
    /// Per-class multipliers for C, keyed by class label
    pub class_weights: Vec<(i32, f64)>,
    /// Iteration cap per sub-problem; `None` uses `max(10_000_000, 100 * len)`
    pub max_iterations: Option<usize>,
    /// Seed for fold shuffling; `None` draws from entropy
    pub seed: Option<u64>,
}

impl Default for SvmConfig {
    fn default() -> Self {
        Self {
            svm_type: SvmType::CSvc,
            c: 1.0,
            nu: 0.5,
            p: 0.1,
            epsilon: 0.001,
            cache_size: 100_000_000, // 100MB
            shrinking: true,
            probability: false,
            class_weights: Vec::new(),
            max_iterations: None,
            seed: None,
        }
    }
}

impl SvmConfig {
    /// Check the hyperparameters for the configured formulation
    pub fn validate(&self) -> Result<()> {
        if self.cache_size == 0 {
            return Err(SVMError::InvalidParameter(
                "cache_size must be positive".to_string(),
            ));
        }
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            return Err(SVMError::InvalidParameter(format!(
                "epsilon must be positive, got {}",
                self.epsilon
            )));
        }
        if self.svm_type.uses_c() && !(self.c.is_finite() && self.c > 0.0) {
            return Err(SVMError::InvalidParameter(format!(
                "C must be positive, got {}",
                self.c
            )));
        }
        if self.svm_type.uses_nu() && !(self.nu > 0.0 && self.nu <= 1.0) {
            return Err(SVMError::InvalidParameter(format!(
                "nu must be in (0, 1], got {}",
                self.nu
            )));
        }
        if self.svm_type == SvmType::EpsilonSvr && !(self.p.is_finite() && self.p >= 0.0) {
            return Err(SVMError::InvalidParameter(format!(
                "p must be non-negative, got {}",
                self.p
            )));
        }
        if let Some(&(label, weight)) = self
            .class_weights
            .iter()
            .find(|(_, w)| !(w.is_finite() && *w > 0.0))
        {
            return Err(SVMError::InvalidParameter(format!(
                "weight for class {label} must be positive, got {weight}"
            )));
        }
        if self.probability && self.svm_type == SvmType::OneClass {
            return Err(SVMError::InvalidParameter(
                "one-class SVM probability output not supported".to_string(),
            ));
        }
        if self.max_iterations == Some(0) {
            return Err(SVMError::InvalidParameter(
                "max_iterations must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
