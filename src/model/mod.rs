//! Trained model representation
//!
//! A [`ModelInfo`] pools the support vectors of every sub-model once, keyed by
//! their instance index in the training problem; each [`SubModel`] lists the
//! coefficients it applies to that pool.

use crate::core::{FeatureVector, Prediction, Result, SVMError, SvmType};
use crate::kernel::{Kernel, KernelDescriptor};
use crate::optimizer::SubModelFit;
use crate::probability::{multiclass_probability, sigmoid_predict, Calibration, MIN_PROB};
use crate::problem::ProblemInfo;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// One coefficient of a sub-model's decision function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportVector {
    /// Key into [`ModelInfo::sv`]
    pub index: usize,
    /// Class the instance belongs to; zero for one-class and regression
    pub class_index: usize,
    /// `y_i * alpha_i` for classification, `alpha_i - alpha*_i` for regression
    pub coefficient: f64,
}

/// Decision function of one sub-problem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubModel {
    /// Class pair `(i, j)`; positive decision values vote for `i`
    pub classes: Option<(usize, usize)>,
    pub support_vectors: Vec<SupportVector>,
    pub rho: f64,
    /// Sigmoid `A` for classification, Laplace sigma for regression
    pub prob_a: Option<f64>,
    /// Sigmoid `B`
    pub prob_b: Option<f64>,
}

/// Everything needed to evaluate a trained model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub svm_type: SvmType,
    pub kernel: KernelDescriptor,
    pub c: f64,
    pub nu: f64,
    pub p: f64,
    pub epsilon: f64,
    /// Class labels by class index; empty for one-class and regression
    pub class_labels: Vec<i32>,
    /// Distinct support vectors per class index
    pub n_sv_per_class: Vec<usize>,
    /// Support vector pool keyed by training instance index
    pub sv: BTreeMap<usize, FeatureVector>,
    pub submodels: Vec<SubModel>,
}

impl ModelInfo {
    /// Collect the non-zero coefficients of every fit into one model
    pub fn assemble<K: Kernel>(info: &ProblemInfo<K>, fits: &[SubModelFit]) -> Self {
        let config = &info.config;
        let classification = config.svm_type.is_classification();
        let mut members: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); info.n_classes()];
        let mut sv = BTreeMap::new();
        let mut submodels = Vec::with_capacity(fits.len());

        for fit in fits {
            let mut support_vectors = Vec::new();
            for (k, (&instance, &coefficient)) in fit
                .sub
                .instances
                .iter()
                .zip(&fit.decision.alpha)
                .enumerate()
            {
                if coefficient == 0.0 {
                    continue;
                }
                let class_index = match fit.sub.classes {
                    Some((i, _)) if fit.sub.y[k] > 0.0 => i,
                    Some((_, j)) => j,
                    None => 0,
                };
                sv.entry(instance)
                    .or_insert_with(|| info.problem.x(instance).clone());
                if classification {
                    members[class_index].insert(instance);
                }
                support_vectors.push(SupportVector {
                    index: instance,
                    class_index,
                    coefficient,
                });
            }

            let (prob_a, prob_b) = match fit.calibration {
                Some(Calibration::Sigmoid { a, b }) => (Some(a), Some(b)),
                Some(Calibration::Laplace { sigma }) => (Some(sigma), None),
                None => (None, None),
            };
            submodels.push(SubModel {
                classes: fit.sub.classes,
                support_vectors,
                rho: fit.decision.rho,
                prob_a,
                prob_b,
            });
        }

        Self {
            svm_type: config.svm_type,
            kernel: info.kernel.descriptor(),
            c: config.c,
            nu: config.nu,
            p: config.p,
            epsilon: config.epsilon,
            class_labels: info.levels().to_vec(),
            n_sv_per_class: members.iter().map(BTreeSet::len).collect(),
            sv,
            submodels,
        }
    }

    /// Number of pooled support vectors
    pub fn n_support_vectors(&self) -> usize {
        self.sv.len()
    }

    /// Support vector references summed over sub-models
    pub fn total_references(&self) -> usize {
        self.submodels.iter().map(|s| s.support_vectors.len()).sum()
    }

    pub fn n_classes(&self) -> usize {
        self.class_labels.len()
    }

    /// True when every sub-model carries calibration data
    pub fn has_probability(&self) -> bool {
        !self.submodels.is_empty()
            && self.submodels.iter().all(|s| {
                s.prob_a.is_some() && (!self.svm_type.is_classification() || s.prob_b.is_some())
            })
    }

    /// Laplace scale of a calibrated regression model
    pub fn svr_sigma(&self) -> Option<f64> {
        if self.svm_type.is_regression() {
            self.submodels.first().and_then(|s| s.prob_a)
        } else {
            None
        }
    }

    /// Decision value of every sub-model, in sub-model order
    ///
    /// The kernel is evaluated once per pooled support vector.
    pub fn decision_values<K: Kernel + ?Sized>(&self, kernel: &K, x: &FeatureVector) -> Vec<f64> {
        let kvalue: HashMap<usize, f64> = self
            .sv
            .iter()
            .map(|(&index, v)| (index, kernel.compute(x, v)))
            .collect();

        self.submodels
            .iter()
            .map(|sub| {
                let sum: f64 = sub
                    .support_vectors
                    .iter()
                    .map(|s| s.coefficient * kvalue.get(&s.index).copied().unwrap_or(0.0))
                    .sum();
                sum - sub.rho
            })
            .collect()
    }

    /// Label (or regression value) with the decision values behind it
    pub fn predict<K: Kernel + ?Sized>(&self, kernel: &K, x: &FeatureVector) -> Prediction {
        let decision_values = self.decision_values(kernel, x);
        let label = match self.svm_type {
            SvmType::OneClass => {
                if decision_values.first().copied().unwrap_or(0.0) > 0.0 {
                    1.0
                } else {
                    -1.0
                }
            }
            SvmType::EpsilonSvr | SvmType::NuSvr => decision_values.first().copied().unwrap_or(0.0),
            SvmType::CSvc | SvmType::NuSvc => self.vote(&decision_values),
        };
        Prediction::new(label, decision_values)
    }

    /// One-vs-one voting; ties go to the lower class index
    fn vote(&self, decision_values: &[f64]) -> f64 {
        let mut votes = vec![0usize; self.n_classes()];
        for (sub, &d) in self.submodels.iter().zip(decision_values) {
            if let Some((i, j)) = sub.classes {
                if d > 0.0 {
                    votes[i] += 1;
                } else {
                    votes[j] += 1;
                }
            }
        }
        let winner = argmax(votes.iter().map(|&v| v as f64));
        self.class_labels.get(winner).map_or(0.0, |&l| f64::from(l))
    }

    /// Label and class probabilities of a calibrated classification model
    ///
    /// Probabilities are indexed like [`ModelInfo::class_labels`].
    pub fn predict_probability<K: Kernel + ?Sized>(
        &self,
        kernel: &K,
        x: &FeatureVector,
    ) -> Option<(f64, Vec<f64>)> {
        if !self.svm_type.is_classification() || !self.has_probability() {
            return None;
        }

        let k = self.n_classes();
        let decision_values = self.decision_values(kernel, x);
        let mut pairwise = vec![vec![0.0; k]; k];
        for (sub, &d) in self.submodels.iter().zip(&decision_values) {
            let ((i, j), a, b) = (sub.classes?, sub.prob_a?, sub.prob_b?);
            let r = sigmoid_predict(d, a, b).clamp(MIN_PROB, 1.0 - MIN_PROB);
            pairwise[i][j] = r;
            pairwise[j][i] = 1.0 - r;
        }

        let probabilities = if k == 2 {
            vec![pairwise[0][1], pairwise[1][0]]
        } else {
            multiclass_probability(k, &pairwise)
        };
        let winner = argmax(probabilities.iter().copied());
        let label = f64::from(*self.class_labels.get(winner)?);
        Some((label, probabilities))
    }

    /// Check that every reference resolves, as needed for models read from disk
    pub fn validate(&self) -> Result<()> {
        let inconsistent = |what: String| -> Result<()> {
            Err(SVMError::SerializationError(format!(
                "inconsistent model: {what}"
            )))
        };
        let k = self.n_classes();

        if self.svm_type.is_classification() {
            if k == 0 {
                return inconsistent("classification model without classes".to_string());
            }
            if self.submodels.len() != k * (k - 1) / 2 {
                return inconsistent(format!(
                    "{} classes need {} sub-models, found {}",
                    k,
                    k * (k - 1) / 2,
                    self.submodels.len()
                ));
            }
            if self.n_sv_per_class.len() != k {
                return inconsistent("support vector counts do not match classes".to_string());
            }
        } else if self.submodels.len() != 1 {
            return inconsistent(format!("expected one sub-model, found {}", self.submodels.len()));
        }

        for sub in &self.submodels {
            if let Some((i, j)) = sub.classes {
                if i >= k || j >= k {
                    return inconsistent(format!("class pair ({i}, {j}) out of range"));
                }
            }
            for s in &sub.support_vectors {
                if !self.sv.contains_key(&s.index) {
                    return inconsistent(format!("support vector {} missing from pool", s.index));
                }
                if self.svm_type.is_classification() && s.class_index >= k {
                    return inconsistent(format!("class index {} out of range", s.class_index));
                }
            }
        }
        Ok(())
    }
}

/// Position of the first maximum
fn argmax(values: impl Iterator<Item = f64>) -> usize {
    let mut best = 0;
    let mut best_value = f64::NEG_INFINITY;
    for (i, v) in values.enumerate() {
        if v > best_value {
            best = i;
            best_value = v;
        }
    }
    best
}
