//! Sigmoid (Tanh) Kernel Implementation
//!
//! K(x, y) = tanh(γ * <x, y> + r)
//!
//! The sigmoid kernel is not positive semi-definite for all parameter values.
//! The solver copes with the resulting non-positive curvature, but the fitted
//! model may be poor for unlucky choices of γ and r.

use crate::core::FeatureVector;
use crate::kernel::{Kernel, KernelDescriptor};

/// Sigmoid (Hyperbolic Tangent) kernel
#[derive(Debug, Clone)]
pub struct SigmoidKernel {
    /// Scaling parameter for the dot product (must be positive)
    pub gamma: f64,
    /// Bias/offset parameter
    pub coef0: f64,
}

impl SigmoidKernel {
    /// Creates a new Sigmoid kernel with specified parameters
    ///
    /// # Panics
    /// Panics if gamma is not positive
    pub fn new(gamma: f64, coef0: f64) -> Self {
        assert!(gamma > 0.0, "Gamma must be positive, got: {}", gamma);
        Self { gamma, coef0 }
    }
}

impl Kernel for SigmoidKernel {
    fn compute(&self, x: &FeatureVector, y: &FeatureVector) -> f64 {
        (self.gamma * x.dot(y) + self.coef0).tanh()
    }

    fn descriptor(&self) -> KernelDescriptor {
        KernelDescriptor::Sigmoid {
            gamma: self.gamma,
            coef0: self.coef0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sigmoid_kernel_value() {
        let kernel = SigmoidKernel::new(0.5, -1.0);
        let x = FeatureVector::new(vec![1.0, 2.0]);
        let y = FeatureVector::new(vec![2.0, 1.0]);

        assert_relative_eq!(kernel.compute(&x, &y), (0.5_f64 * 4.0 - 1.0).tanh());
    }

    #[test]
    fn test_sigmoid_kernel_bounded() {
        let kernel = SigmoidKernel::new(10.0, 0.0);
        let x = FeatureVector::new(vec![100.0]);
        let y = FeatureVector::new(vec![-100.0]);

        let value = kernel.compute(&x, &y);
        assert!((-1.0..=1.0).contains(&value));
    }

    #[test]
    #[should_panic(expected = "Gamma must be positive")]
    fn test_sigmoid_kernel_invalid_gamma() {
        SigmoidKernel::new(0.0, 1.0);
    }
}
