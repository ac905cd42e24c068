//! Serializable kernel descriptions
//!
//! Persisted models record which kernel produced them. `StoredKernel` is the
//! evaluable form rebuilt from a description when a model is loaded.

use crate::core::{FeatureVector, Result, SVMError};
use crate::kernel::{Kernel, LinearKernel, PolynomialKernel, RBFKernel, SigmoidKernel};
use serde::{Deserialize, Serialize};

/// Kernel type and parameters as stored in a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KernelDescriptor {
    Linear,
    Rbf { gamma: f64 },
    Polynomial { degree: u32, gamma: f64, coef0: f64 },
    Sigmoid { gamma: f64, coef0: f64 },
    /// User kernel; cannot be rebuilt from the model file
    Custom { name: String },
}

/// Built-in kernel reconstructed from a [`KernelDescriptor`]
#[derive(Debug, Clone)]
pub enum StoredKernel {
    Linear(LinearKernel),
    Rbf(RBFKernel),
    Polynomial(PolynomialKernel),
    Sigmoid(SigmoidKernel),
}

impl TryFrom<&KernelDescriptor> for StoredKernel {
    type Error = SVMError;

    fn try_from(descriptor: &KernelDescriptor) -> Result<Self> {
        let positive = |gamma: f64| {
            if gamma > 0.0 && gamma.is_finite() {
                Ok(gamma)
            } else {
                Err(SVMError::UnsupportedKernel(format!(
                    "gamma must be positive, got {gamma}"
                )))
            }
        };

        match descriptor {
            KernelDescriptor::Linear => Ok(StoredKernel::Linear(LinearKernel::new())),
            KernelDescriptor::Rbf { gamma } => {
                Ok(StoredKernel::Rbf(RBFKernel::new(positive(*gamma)?)))
            }
            KernelDescriptor::Polynomial {
                degree,
                gamma,
                coef0,
            } => {
                if *degree == 0 {
                    return Err(SVMError::UnsupportedKernel(
                        "polynomial degree must be positive".to_string(),
                    ));
                }
                Ok(StoredKernel::Polynomial(PolynomialKernel::new(
                    *degree,
                    positive(*gamma)?,
                    *coef0,
                )))
            }
            KernelDescriptor::Sigmoid { gamma, coef0 } => Ok(StoredKernel::Sigmoid(
                SigmoidKernel::new(positive(*gamma)?, *coef0),
            )),
            KernelDescriptor::Custom { name } => Err(SVMError::UnsupportedKernel(format!(
                "custom kernel {name} cannot be restored from a model file"
            ))),
        }
    }
}

impl Kernel for StoredKernel {
    fn compute(&self, x: &FeatureVector, y: &FeatureVector) -> f64 {
        match self {
            StoredKernel::Linear(k) => k.compute(x, y),
            StoredKernel::Rbf(k) => k.compute(x, y),
            StoredKernel::Polynomial(k) => k.compute(x, y),
            StoredKernel::Sigmoid(k) => k.compute(x, y),
        }
    }

    fn descriptor(&self) -> KernelDescriptor {
        match self {
            StoredKernel::Linear(k) => k.descriptor(),
            StoredKernel::Rbf(k) => k.descriptor(),
            StoredKernel::Polynomial(k) => k.descriptor(),
            StoredKernel::Sigmoid(k) => k.descriptor(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Constant;

    impl Kernel for Constant {
        fn compute(&self, _x: &FeatureVector, _y: &FeatureVector) -> f64 {
            1.0
        }
    }

    #[test]
    fn test_descriptor_round_trip() {
        let descriptors = vec![
            KernelDescriptor::Linear,
            KernelDescriptor::Rbf { gamma: 0.5 },
            KernelDescriptor::Polynomial {
                degree: 3,
                gamma: 1.0,
                coef0: 0.5,
            },
            KernelDescriptor::Sigmoid {
                gamma: 0.1,
                coef0: -1.0,
            },
        ];

        for descriptor in descriptors {
            let kernel = StoredKernel::try_from(&descriptor).expect("Should rebuild");
            assert_eq!(kernel.descriptor(), descriptor);
        }
    }

    #[test]
    fn test_custom_kernel_cannot_be_restored() {
        let descriptor = Constant.descriptor();
        assert!(matches!(descriptor, KernelDescriptor::Custom { .. }));
        assert!(matches!(
            StoredKernel::try_from(&descriptor),
            Err(SVMError::UnsupportedKernel(_))
        ));
    }

    #[test]
    fn test_invalid_gamma_is_rejected() {
        let descriptor = KernelDescriptor::Rbf { gamma: -1.0 };
        assert!(StoredKernel::try_from(&descriptor).is_err());
    }

    #[test]
    fn test_descriptor_json_shape() {
        let json = serde_json::to_string(&KernelDescriptor::Rbf { gamma: 2.0 })
            .expect("Should serialize");
        assert_eq!(json, r#"{"type":"rbf","gamma":2.0}"#);
    }
}
