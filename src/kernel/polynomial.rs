//! Polynomial Kernel Implementation
//!
//! The polynomial kernel is defined as:
//! K(x, y) = (γ * <x, y> + r)^d
//!
//! Where:
//! - γ (gamma): scaling factor for the dot product
//! - r (coef0): independent term in the polynomial
//! - d (degree): degree of the polynomial

use crate::core::FeatureVector;
use crate::kernel::{Kernel, KernelDescriptor};

/// Polynomial kernel with configurable degree, gamma, and coefficient
#[derive(Debug, Clone)]
pub struct PolynomialKernel {
    /// Scaling factor for the dot product
    pub gamma: f64,
    /// Independent term in the polynomial
    pub coef0: f64,
    /// Degree of the polynomial
    pub degree: u32,
}

impl PolynomialKernel {
    /// Creates a new polynomial kernel with the specified parameters
    ///
    /// # Examples
    /// ```
    /// use smosvm::kernel::PolynomialKernel;
    ///
    /// // Quadratic kernel: (x·y + 1)²
    /// let quad_kernel = PolynomialKernel::new(2, 1.0, 1.0);
    /// assert_eq!(quad_kernel.degree, 2);
    /// ```
    ///
    /// # Panics
    /// Panics if degree is zero or gamma is not positive
    pub fn new(degree: u32, gamma: f64, coef0: f64) -> Self {
        assert!(degree > 0, "Polynomial degree must be positive");
        assert!(gamma > 0.0, "Gamma must be positive");

        Self {
            gamma,
            coef0,
            degree,
        }
    }

    /// Creates a quadratic kernel: (γ * <x,y> + 1)²
    pub fn quadratic(gamma: f64) -> Self {
        Self::new(2, gamma, 1.0)
    }

    /// Creates a polynomial kernel with gamma = 1.0 / n_features
    pub fn auto(degree: u32, n_features: usize) -> Self {
        Self::new(degree, 1.0 / n_features.max(1) as f64, 1.0)
    }
}

impl Kernel for PolynomialKernel {
    fn compute(&self, x: &FeatureVector, y: &FeatureVector) -> f64 {
        (self.gamma * x.dot(y) + self.coef0).powi(self.degree as i32)
    }

    fn descriptor(&self) -> KernelDescriptor {
        KernelDescriptor::Polynomial {
            degree: self.degree,
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
    fn test_polynomial_kernel_creation() {
        let kernel = PolynomialKernel::new(3, 0.5, 1.0);
        assert_eq!(kernel.degree, 3);
        assert_eq!(kernel.gamma, 0.5);
        assert_eq!(kernel.coef0, 1.0);

        let auto = PolynomialKernel::auto(2, 4);
        assert_eq!(auto.gamma, 0.25);
    }

    #[test]
    fn test_quadratic_kernel_value() {
        let kernel = PolynomialKernel::quadratic(1.0);
        let x = FeatureVector::new(vec![1.0, 2.0]);
        let y = FeatureVector::new(vec![3.0, 1.0]);

        // (5 + 1)^2
        assert_relative_eq!(kernel.compute(&x, &y), 36.0);
    }

    #[test]
    fn test_odd_degree_keeps_sign() {
        let kernel = PolynomialKernel::new(3, 1.0, 0.0);
        let x = FeatureVector::new(vec![1.0]);
        let y = FeatureVector::new(vec![-2.0]);

        assert_relative_eq!(kernel.compute(&x, &y), -8.0);
    }

    #[test]
    #[should_panic(expected = "Polynomial degree must be positive")]
    fn test_zero_degree() {
        PolynomialKernel::new(0, 1.0, 1.0);
    }
}
