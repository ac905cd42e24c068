//! RBF (Radial Basis Function) kernel implementation
//!
//! The RBF kernel is defined as: K(x, y) = exp(-γ * ||x - y||²)
//! where γ (gamma) is a hyperparameter that controls the kernel width.

use crate::core::FeatureVector;
use crate::kernel::{Kernel, KernelDescriptor};

/// RBF (Radial Basis Function) kernel: K(x, y) = exp(-γ * ||x - y||²)
///
/// The gamma parameter controls the "reach" of each training example:
/// - High gamma: close points have high influence (potential overfitting)
/// - Low gamma: distant points have influence (potential underfitting)
#[derive(Debug, Clone, Copy)]
pub struct RBFKernel {
    gamma: f64,
}

impl RBFKernel {
    /// Create a new RBF kernel with specified gamma parameter
    ///
    /// # Panics
    /// Panics if gamma is not positive
    pub fn new(gamma: f64) -> Self {
        assert!(gamma > 0.0, "Gamma must be positive, got: {}", gamma);
        Self { gamma }
    }

    /// Create RBF kernel with gamma = 1.0 / n_features
    pub fn with_auto_gamma(n_features: usize) -> Self {
        assert!(n_features > 0, "Number of features must be positive");
        Self::new(1.0 / n_features as f64)
    }

    /// Get the gamma parameter
    pub fn gamma(&self) -> f64 {
        self.gamma
    }
}

impl Default for RBFKernel {
    /// Default RBF kernel with gamma = 1.0
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl Kernel for RBFKernel {
    fn compute(&self, x: &FeatureVector, y: &FeatureVector) -> f64 {
        (-self.gamma * x.squared_distance(y)).exp()
    }

    fn descriptor(&self) -> KernelDescriptor {
        KernelDescriptor::Rbf { gamma: self.gamma }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rbf_kernel_creation() {
        assert_eq!(RBFKernel::new(0.5).gamma(), 0.5);
        assert_eq!(RBFKernel::with_auto_gamma(10).gamma(), 0.1);
        assert_eq!(RBFKernel::default().gamma(), 1.0);
    }

    #[test]
    #[should_panic(expected = "Gamma must be positive")]
    fn test_rbf_kernel_invalid_gamma() {
        RBFKernel::new(-0.5);
    }

    #[test]
    fn test_rbf_kernel_identical_vectors() {
        let kernel = RBFKernel::new(1.0);
        let x = FeatureVector::new(vec![1.0, 2.0, 3.0]);

        assert!((kernel.compute(&x, &x) - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_rbf_kernel_different_gammas() {
        let x = FeatureVector::new(vec![1.0]);
        let y = FeatureVector::new(vec![3.0]);

        let low = RBFKernel::new(0.1).compute(&x, &y);
        let high = RBFKernel::new(10.0).compute(&x, &y);

        assert!(low > high);
        assert!((low - (-0.1 * 4.0_f64).exp()).abs() < 1e-10);
        assert!((high - (-10.0 * 4.0_f64).exp()).abs() < 1e-10);
    }

    #[test]
    fn test_rbf_kernel_symmetry() {
        let kernel = RBFKernel::new(0.5);
        let x = FeatureVector::new(vec![1.0, 0.0, 2.0]);
        let y = FeatureVector::new(vec![0.0, 1.0, 3.0]);

        assert_eq!(kernel.compute(&x, &y), kernel.compute(&y, &x));
    }
}
