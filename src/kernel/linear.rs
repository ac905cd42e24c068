//! Linear kernel implementation

use crate::core::FeatureVector;
use crate::kernel::{Kernel, KernelDescriptor};

/// Linear kernel: K(x, y) = x^T * y
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearKernel;

impl LinearKernel {
    /// Create a new linear kernel
    pub fn new() -> Self {
        Self
    }
}

impl Kernel for LinearKernel {
    fn compute(&self, x: &FeatureVector, y: &FeatureVector) -> f64 {
        x.dot(y)
    }

    fn descriptor(&self) -> KernelDescriptor {
        KernelDescriptor::Linear
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_kernel_basic() {
        let kernel = LinearKernel::new();

        let x = FeatureVector::new(vec![1.0, 0.0, 2.0]);
        let y = FeatureVector::new(vec![0.0, 1.0, 2.0]);

        assert_eq!(kernel.compute(&x, &y), 4.0);
    }

    #[test]
    fn test_linear_kernel_identical() {
        let kernel = LinearKernel::new();
        let x = FeatureVector::new(vec![1.0, 2.0, 3.0]);

        // x^T * x = 1^2 + 2^2 + 3^2 = 14
        assert_eq!(kernel.compute(&x, &x), 14.0);
    }

    #[test]
    fn test_linear_kernel_descriptor() {
        assert_eq!(LinearKernel::new().descriptor(), KernelDescriptor::Linear);
    }
}
