//! Kernel trait definition

use crate::core::FeatureVector;
use crate::kernel::KernelDescriptor;

/// Kernel function trait
///
/// A kernel function K(x, y) must be symmetric and deterministic. Mercer's condition
/// is not checked; non-PSD kernels are tolerated by the solver through a curvature floor.
pub trait Kernel: Send + Sync {
    /// Compute kernel value K(x, y)
    fn compute(&self, x: &FeatureVector, y: &FeatureVector) -> f64;

    /// Describe the kernel for persisted models
    ///
    /// Kernels that cannot be rebuilt from their description keep the default.
    fn descriptor(&self) -> KernelDescriptor {
        KernelDescriptor::Custom {
            name: std::any::type_name::<Self>().to_string(),
        }
    }
}
