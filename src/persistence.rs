//! Model serialization and persistence
//!
//! Models are stored as pretty-printed JSON: the full [`ModelInfo`] plus a small
//! metadata block. Models trained with a built-in kernel can be turned back into
//! a predictor; custom kernels cannot be restored from their description.

use crate::api::TrainedModel;
use crate::core::{Result, SVMError};
use crate::kernel::{Kernel, StoredKernel};
use crate::model::ModelInfo;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Serializable representation of a trained SVM model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializableModel {
    pub info: ModelInfo,
    /// Model metadata
    pub metadata: ModelMetadata,
}

/// Model metadata for tracking and validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Library version used to create the model
    pub library_version: String,
    /// Number of distinct support vectors
    pub n_support_vectors: usize,
    /// Creation timestamp (RFC 3339)
    pub created_at: String,
    /// Whether every sub-problem converged during training
    pub converged: bool,
}

impl SerializableModel {
    /// Create a serializable model from a trained model
    pub fn from_trained_model<K: Kernel>(model: &TrainedModel<K>) -> Self {
        let info = model.info().clone();
        Self {
            metadata: ModelMetadata {
                library_version: env!("CARGO_PKG_VERSION").to_string(),
                n_support_vectors: info.n_support_vectors(),
                created_at: chrono::Utc::now().to_rfc3339(),
                converged: model.converged(),
            },
            info,
        }
    }

    /// Write the model as JSON
    pub fn to_writer<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer_pretty(writer, self)
            .map_err(|e| SVMError::SerializationError(e.to_string()))
    }

    /// Read a model from JSON and check its internal references
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let model: Self = serde_json::from_reader(reader)
            .map_err(|e| SVMError::SerializationError(e.to_string()))?;
        model.info.validate()?;
        Ok(model)
    }

    /// Save model to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path).map_err(SVMError::IoError)?;
        let mut writer = BufWriter::new(file);
        self.to_writer(&mut writer)?;
        writer.flush().map_err(SVMError::IoError)?;
        Ok(())
    }

    /// Load model from file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path).map_err(SVMError::IoError)?;
        Self::from_reader(BufReader::new(file))
    }

    /// Convert back to a trained model evaluating the stored kernel
    pub fn to_trained_model(&self) -> Result<TrainedModel<StoredKernel>> {
        let kernel = StoredKernel::try_from(&self.info.kernel)?;
        Ok(TrainedModel::from_info(kernel, self.info.clone()))
    }

    /// Human-readable model summary
    pub fn summary(&self) -> String {
        let info = &self.info;
        let mut lines = vec![
            "=== SVM Model Summary ===".to_string(),
            format!("Type: {:?}", info.svm_type),
            format!("Kernel: {:?}", info.kernel),
        ];
        if !info.class_labels.is_empty() {
            lines.push(format!("Classes: {:?}", info.class_labels));
            lines.push(format!("Support Vectors per Class: {:?}", info.n_sv_per_class));
        }
        lines.push(format!("Support Vectors: {}", self.metadata.n_support_vectors));
        lines.push(format!("Sub-models: {}", info.submodels.len()));
        lines.extend(info.submodels.iter().enumerate().map(|(k, sub)| {
            format!("  [{k}] rho = {:.6}, nSV = {}", sub.rho, sub.support_vectors.len())
        }));
        lines.extend([
            format!("Converged: {}", self.metadata.converged),
            format!("Library Version: {}", self.metadata.library_version),
            format!("Created: {}", self.metadata.created_at),
            "Training Parameters:".to_string(),
            format!("  C: {}", info.c),
            format!("  nu: {}", info.nu),
            format!("  p: {}", info.p),
            format!("  Epsilon: {}", info.epsilon),
        ]);
        lines.join("\n")
    }

    /// Print model summary
    pub fn print_summary(&self) {
        println!("{}", self.summary());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::SVM;
    use crate::core::{FeatureVector, Sample, SvmType};
    use crate::kernel::{KernelDescriptor, RBFKernel};
    use tempfile::NamedTempFile;

    fn samples() -> Vec<Sample> {
        vec![
            Sample::new(FeatureVector::new(vec![2.0, 0.0]), 1.0),
            Sample::new(FeatureVector::new(vec![1.0, 1.0]), 1.0),
            Sample::new(FeatureVector::new(vec![-2.0, 0.0]), -1.0),
            Sample::new(FeatureVector::new(vec![-1.0, -1.0]), -1.0),
        ]
    }

    struct Doubled;

    impl Kernel for Doubled {
        fn compute(&self, x: &FeatureVector, y: &FeatureVector) -> f64 {
            2.0 * x.dot(y)
        }
    }

    #[test]
    fn test_model_serialization() -> Result<()> {
        let model = SVM::with_kernel(RBFKernel::new(0.5)).train_samples(&samples())?;
        let serializable = SerializableModel::from_trained_model(&model);

        // Test saving and loading
        let temp_file = NamedTempFile::new().expect("Failed to create temp file");
        serializable.save_to_file(temp_file.path())?;

        let loaded = SerializableModel::load_from_file(temp_file.path())?;

        assert_eq!(loaded.info, serializable.info);
        assert_eq!(loaded.info.kernel, KernelDescriptor::Rbf { gamma: 0.5 });
        assert_eq!(loaded.metadata.n_support_vectors, model.info().n_support_vectors());
        assert!(loaded.metadata.converged);

        Ok(())
    }

    #[test]
    fn test_restored_model_predicts_identically() -> Result<()> {
        let model = SVM::with_kernel(RBFKernel::new(0.5)).train_samples(&samples())?;
        let mut buffer = Vec::new();
        SerializableModel::from_trained_model(&model).to_writer(&mut buffer)?;

        let restored = SerializableModel::from_reader(buffer.as_slice())?.to_trained_model()?;
        for x in [[0.5, 0.5], [-0.3, 0.9], [3.0, -2.0]] {
            let x = FeatureVector::new(x.to_vec());
            let original = model.predict(&x);
            let again = restored.predict(&x);
            assert_eq!(original.label, again.label);
            assert_eq!(original.decision_values, again.decision_values);
        }
        Ok(())
    }

    #[test]
    fn test_custom_kernel_cannot_be_restored() -> Result<()> {
        let model = SVM::with_kernel(Doubled).train_samples(&samples())?;
        let serializable = SerializableModel::from_trained_model(&model);
        assert!(matches!(
            serializable.info.kernel,
            KernelDescriptor::Custom { .. }
        ));
        assert!(matches!(
            serializable.to_trained_model(),
            Err(SVMError::UnsupportedKernel(_))
        ));
        Ok(())
    }

    #[test]
    fn test_malformed_input_is_rejected() {
        let result = SerializableModel::from_reader("{ not json".as_bytes());
        assert!(matches!(result, Err(SVMError::SerializationError(_))));

        let missing = NamedTempFile::new()
            .expect("Failed to create temp file")
            .path()
            .with_extension("missing");
        assert!(matches!(
            SerializableModel::load_from_file(missing),
            Err(SVMError::IoError(_))
        ));
    }

    #[test]
    fn test_summary_mentions_type_and_classes() -> Result<()> {
        let model = SVM::new().train_samples(&samples())?;
        let summary = SerializableModel::from_trained_model(&model).summary();
        assert!(summary.contains(&format!("{:?}", SvmType::CSvc)));
        assert!(summary.contains("Classes: [1, -1]"));
        assert!(summary.contains("Sub-models: 1"));
        assert!(summary.contains("  [0] rho = "));
        assert!(summary.ends_with(&format!("  Epsilon: {}", model.info().epsilon)));
        Ok(())
    }
}
