//! High-level API for Support Vector Machine operations
//!
//! This module provides a user-friendly interface for common SVM tasks,
//! including training, prediction, cross-validation and model evaluation.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use smosvm::api::SVM;
//! use smosvm::core::{FeatureVector, Sample};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let samples = vec![
//!     Sample::new(FeatureVector::new(vec![2.0, 1.0]), 1.0),
//!     Sample::new(FeatureVector::new(vec![-2.0, -1.0]), -1.0),
//! ];
//!
//! // Train a model on data
//! let model = SVM::new().with_c(1.0).with_epsilon(0.001).train_samples(&samples)?;
//!
//! // Make predictions
//! let prediction = model.predict(&FeatureVector::new(vec![1.0, 0.5]));
//! let accuracy = model.evaluate(&samples);
//! println!("label {} (accuracy on training data {:.2})", prediction.label, accuracy);
//! # Ok(())
//! # }
//! ```

use crate::core::{Dataset, FeatureVector, Prediction, Result, SVMModel, Sample, SvmConfig, SvmType};
use crate::kernel::{Kernel, LinearKernel};
use crate::model::ModelInfo;
use crate::optimizer::{SVMOptimizer, TrainedSVM};
use crate::problem::Problem;

/// High-level SVM interface with builder pattern
pub struct SVM<K: Kernel = LinearKernel> {
    kernel: K,
    config: SvmConfig,
}

impl SVM<LinearKernel> {
    /// Create a new SVM with linear kernel and default parameters
    pub fn new() -> Self {
        Self {
            kernel: LinearKernel::new(),
            config: SvmConfig::default(),
        }
    }
}

impl Default for SVM<LinearKernel> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Kernel> SVM<K> {
    /// Create SVM with custom kernel
    pub fn with_kernel(kernel: K) -> Self {
        Self {
            kernel,
            config: SvmConfig::default(),
        }
    }

    /// Replace the whole configuration
    pub fn with_config(mut self, config: SvmConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the training formulation
    pub fn with_type(mut self, svm_type: SvmType) -> Self {
        self.config.svm_type = svm_type;
        self
    }

    /// Set regularization parameter C
    pub fn with_c(mut self, c: f64) -> Self {
        self.config.c = c;
        self
    }

    /// Set nu for nu-SVC, one-class and nu-SVR
    pub fn with_nu(mut self, nu: f64) -> Self {
        self.config.nu = nu;
        self
    }

    /// Set the tube width of epsilon-SVR
    pub fn with_p(mut self, p: f64) -> Self {
        self.config.p = p;
        self
    }

    /// Set convergence tolerance
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.config.epsilon = epsilon;
        self
    }

    /// Set maximum number of iterations per sub-problem
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = Some(max_iterations);
        self
    }

    /// Set kernel cache size in bytes
    pub fn with_cache_size(mut self, cache_size: usize) -> Self {
        self.config.cache_size = cache_size;
        self
    }

    /// Enable or disable the shrinking heuristic
    pub fn with_shrinking(mut self, shrinking: bool) -> Self {
        self.config.shrinking = shrinking;
        self
    }

    /// Fit probability calibration
    pub fn with_probability(mut self, probability: bool) -> Self {
        self.config.probability = probability;
        self
    }

    /// Multiply C by `weight` for the instances of class `label`
    pub fn with_class_weight(mut self, label: i32, weight: f64) -> Self {
        self.config.class_weights.push((label, weight));
        self
    }

    /// Seed the fold shuffling of calibration and cross-validation
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    /// Get the configuration
    pub fn config(&self) -> &SvmConfig {
        &self.config
    }

    /// Train on a dataset
    pub fn train<D: Dataset + ?Sized>(self, dataset: &D) -> Result<TrainedModel<K>> {
        let optimizer = SVMOptimizer::new(self.kernel, self.config);
        let model = optimizer.train(dataset)?;
        Ok(TrainedModel { model })
    }

    /// Train on samples
    pub fn train_samples(self, samples: &[Sample]) -> Result<TrainedModel<K>> {
        let optimizer = SVMOptimizer::new(self.kernel, self.config);
        let model = optimizer.train_samples(samples)?;
        Ok(TrainedModel { model })
    }

    /// Train on a prepared problem
    pub fn train_problem(self, problem: &Problem) -> Result<TrainedModel<K>> {
        let optimizer = SVMOptimizer::new(self.kernel, self.config);
        let model = optimizer.train_problem(problem)?;
        Ok(TrainedModel { model })
    }

    /// Out-of-fold prediction for every sample of the dataset
    pub fn cross_validate<D: Dataset + ?Sized>(
        self,
        dataset: &D,
        folds: usize,
    ) -> Result<Vec<f64>> {
        let problem = Problem::from_dataset(dataset)?;
        SVMOptimizer::new(self.kernel, self.config).cross_validate(&problem, folds)
    }
}

/// Trained SVM model with high-level prediction interface
pub struct TrainedModel<K: Kernel> {
    model: TrainedSVM<K>,
}

impl<K: Kernel> TrainedModel<K> {
    /// Wrap a model built from a stored [`ModelInfo`]
    pub fn from_info(kernel: K, info: ModelInfo) -> Self {
        Self {
            model: TrainedSVM::from_info(kernel, info),
        }
    }

    /// Predict a single feature vector
    pub fn predict(&self, x: &FeatureVector) -> Prediction {
        self.model.predict(x)
    }

    /// Predict multiple samples
    pub fn predict_batch(&self, samples: &[Sample]) -> Vec<Prediction> {
        self.model.predict_batch(samples)
    }

    /// Predict from dataset
    pub fn predict_dataset<D: Dataset + ?Sized>(&self, dataset: &D) -> Vec<Prediction> {
        (0..dataset.len())
            .map(|i| self.model.predict(&dataset.get_sample(i).features))
            .collect()
    }

    /// Label and class probabilities of a calibrated classifier
    pub fn predict_probability(&self, x: &FeatureVector) -> Option<(f64, Vec<f64>)> {
        self.model.predict_probability(x)
    }

    /// Evaluate accuracy on a dataset
    pub fn evaluate<D: Dataset + ?Sized>(&self, dataset: &D) -> f64 {
        let predictions = self.predict_dataset(dataset);
        let labels = dataset.get_labels();
        if labels.is_empty() {
            return 0.0;
        }

        let correct = predictions
            .iter()
            .zip(labels.iter())
            .filter(|(pred, &actual)| pred.label == actual)
            .count();

        correct as f64 / labels.len() as f64
    }

    /// Confusion counts with the first class label of the model as positive
    pub fn evaluate_detailed<D: Dataset + ?Sized>(&self, dataset: &D) -> EvaluationMetrics {
        let positive = self
            .model
            .info()
            .class_labels
            .first()
            .map_or(1.0, |&l| f64::from(l));
        let mut metrics = EvaluationMetrics::for_positive(positive);
        for (pred, actual) in self.predict_dataset(dataset).iter().zip(dataset.get_labels()) {
            metrics.record(pred.label, actual);
        }
        metrics
    }

    /// Mean squared error and squared correlation of regression predictions
    pub fn evaluate_regression<D: Dataset + ?Sized>(&self, dataset: &D) -> RegressionMetrics {
        let predicted: Vec<f64> = self.predict_dataset(dataset).iter().map(|p| p.label).collect();
        RegressionMetrics::from_predictions(&predicted, &dataset.get_labels())
    }

    /// Get model information
    pub fn info(&self) -> &ModelInfo {
        self.model.info()
    }

    /// True unless some sub-problem stopped at the iteration cap
    pub fn converged(&self) -> bool {
        self.model.converged()
    }

    /// Get the underlying trained model
    pub fn inner(&self) -> &TrainedSVM<K> {
        &self.model
    }
}

/// Binary confusion counts against one positive label
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationMetrics {
    pub positive_label: f64,
    pub true_positives: usize,
    pub true_negatives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

impl EvaluationMetrics {
    fn for_positive(positive_label: f64) -> Self {
        Self {
            positive_label,
            true_positives: 0,
            true_negatives: 0,
            false_positives: 0,
            false_negatives: 0,
        }
    }

    fn record(&mut self, predicted: f64, actual: f64) {
        let counter = match (predicted == self.positive_label, actual == self.positive_label) {
            (true, true) => &mut self.true_positives,
            (false, false) => &mut self.true_negatives,
            (true, false) => &mut self.false_positives,
            (false, true) => &mut self.false_negatives,
        };
        *counter += 1;
    }

    fn total(&self) -> usize {
        self.true_positives + self.true_negatives + self.false_positives + self.false_negatives
    }

    /// (TP + TN) / total
    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positives + self.true_negatives, self.total())
    }

    /// TP / (TP + FP)
    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    /// TP / (TP + FN)
    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    /// Harmonic mean of precision and recall
    pub fn f1_score(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }

    /// TN / (TN + FP)
    pub fn specificity(&self) -> f64 {
        ratio(self.true_negatives, self.true_negatives + self.false_positives)
    }
}

/// Regression quality
#[derive(Debug, Clone, PartialEq)]
pub struct RegressionMetrics {
    pub mean_squared_error: f64,
    /// Squared Pearson correlation between predictions and targets
    pub squared_correlation: f64,
}

impl RegressionMetrics {
    pub fn from_predictions(predicted: &[f64], actual: &[f64]) -> Self {
        let n = predicted.len().min(actual.len());
        if n == 0 {
            return Self {
                mean_squared_error: 0.0,
                squared_correlation: 0.0,
            };
        }

        let (mut error, mut sum_v, mut sum_y, mut sum_vv, mut sum_yy, mut sum_vy) =
            (0.0, 0.0, 0.0, 0.0, 0.0, 0.0);
        for (&v, &y) in predicted.iter().zip(actual) {
            error += (v - y) * (v - y);
            sum_v += v;
            sum_y += y;
            sum_vv += v * v;
            sum_yy += y * y;
            sum_vy += v * y;
        }

        let n = n as f64;
        let numerator = n * sum_vy - sum_v * sum_y;
        let denominator = (n * sum_vv - sum_v * sum_v) * (n * sum_yy - sum_y * sum_y);
        Self {
            mean_squared_error: error / n,
            squared_correlation: if denominator > 0.0 {
                numerator * numerator / denominator
            } else {
                0.0
            },
        }
    }
}
