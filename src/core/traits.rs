//! Core traits for SVM training and prediction

use crate::core::{FeatureVector, Prediction, Sample};

/// Dataset abstraction for efficient data access
pub trait Dataset: Send + Sync {
    /// Number of samples in the dataset
    fn len(&self) -> usize;

    /// Number of features (dimensionality)
    fn dim(&self) -> usize;

    /// Get a single sample by index
    ///
    /// # Panics
    /// Panics if index >= len()
    fn get_sample(&self, i: usize) -> Sample;

    /// Get multiple samples at once
    fn get_batch(&self, indices: &[usize]) -> Vec<Sample> {
        indices.iter().map(|&i| self.get_sample(i)).collect()
    }

    /// Get all labels as a vector
    fn get_labels(&self) -> Vec<f64>;

    /// Check if the dataset is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Dataset for Vec<Sample> {
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn dim(&self) -> usize {
        self.iter().map(|s| s.features.dim()).max().unwrap_or(0)
    }

    fn get_sample(&self, i: usize) -> Sample {
        self[i].clone()
    }

    fn get_labels(&self) -> Vec<f64> {
        self.iter().map(|s| s.label).collect()
    }
}

/// Trained SVM model
pub trait SVMModel: Send + Sync {
    /// Predict a single feature vector
    fn predict(&self, x: &FeatureVector) -> Prediction;

    /// Predict multiple samples
    fn predict_batch(&self, samples: &[Sample]) -> Vec<Prediction> {
        samples.iter().map(|s| self.predict(&s.features)).collect()
    }

    /// Number of distinct support vectors across all sub-models
    fn n_support_vectors(&self) -> usize;
}
