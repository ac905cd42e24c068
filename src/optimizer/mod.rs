//! Optimization algorithms for SVM
//!
//! This module ties problems, kernels and the SMO solver together: it splits a
//! problem into sub-problems, trains each one (optionally with probability
//! calibration), and assembles the results into a [`TrainedSVM`].

pub mod train;

pub use self::train::{train_one, Decision};

use crate::core::{
    Dataset, FeatureVector, Prediction, Result, SVMError, SVMModel, Sample, SvmConfig, SvmType,
};
use crate::kernel::Kernel;
use crate::model::ModelInfo;
use crate::probability::{binary_svc_probability, svr_probability, Calibration};
use crate::problem::{Problem, ProblemInfo, SubProblem};
use crate::solver::SolutionInfo;
use crate::utils::{complement, rng_for, shuffled_folds, stratified_folds};
use log::{info, warn};
use std::sync::Arc;

/// Stream of the fold generator used by cross-validation
const CROSS_VALIDATION_STREAM: u64 = u64::MAX;

/// Everything produced for one sub-problem
#[derive(Debug, Clone)]
pub struct SubModelFit {
    pub sub: SubProblem,
    pub decision: Decision,
    pub calibration: Option<Calibration>,
}

/// High-level SVM optimizer that integrates kernel functions and solving algorithms
pub struct SVMOptimizer<K: Kernel> {
    kernel: Arc<K>,
    config: SvmConfig,
}

impl<K: Kernel> SVMOptimizer<K> {
    /// Create a new SVM optimizer with the given kernel and configuration
    pub fn new(kernel: K, config: SvmConfig) -> Self {
        Self {
            kernel: Arc::new(kernel),
            config,
        }
    }

    /// Create a new SVM optimizer with default configuration
    pub fn with_kernel(kernel: K) -> Self {
        Self::new(kernel, SvmConfig::default())
    }

    /// Train an SVM model on the given dataset
    pub fn train<D: Dataset + ?Sized>(&self, dataset: &D) -> Result<TrainedSVM<K>> {
        self.train_problem(&Problem::from_dataset(dataset)?)
    }

    /// Train an SVM model on a slice of samples
    pub fn train_samples(&self, samples: &[Sample]) -> Result<TrainedSVM<K>> {
        self.train_problem(&Problem::from_samples(samples)?)
    }

    /// Train on a prepared problem
    pub fn train_problem(&self, problem: &Problem) -> Result<TrainedSVM<K>> {
        let info =
            ProblemInfo::new(problem.clone(), Arc::clone(&self.kernel), self.config.clone())?;
        if self.config.svm_type.is_classification() && info.n_classes() == 1 {
            warn!(
                "training data contains the single class {}; every prediction will be that class",
                info.levels()[0]
            );
        }

        let subs = info.sub_problems();
        info!(
            "training {:?} on {} instances: {} sub-problem(s)",
            self.config.svm_type,
            problem.len(),
            subs.len()
        );
        let fits = fit_all(&info, subs)?;

        let model = ModelInfo::assemble(&info, &fits);
        let solutions = fits.into_iter().map(|fit| fit.decision.solution).collect();
        Ok(TrainedSVM {
            kernel: Arc::clone(&self.kernel),
            info: model,
            solutions,
        })
    }

    /// Out-of-fold prediction for every instance of `problem`
    ///
    /// Classification folds are stratified by class. More folds than instances
    /// means leave-one-out.
    pub fn cross_validate(&self, problem: &Problem, folds: usize) -> Result<Vec<f64>> {
        if folds < 2 {
            return Err(SVMError::InvalidParameter(format!(
                "cross-validation needs at least 2 folds, got {folds}"
            )));
        }
        let l = problem.len();
        if l < 2 {
            return Err(SVMError::InvalidDataset(
                "cross-validation needs at least two instances".to_string(),
            ));
        }
        let info =
            ProblemInfo::new(problem.clone(), Arc::clone(&self.kernel), self.config.clone())?;

        let folds = if folds > l {
            warn!("{folds} folds requested for {l} instances; using leave-one-out");
            l
        } else {
            folds
        };

        let mut rng = rng_for(self.config.seed, CROSS_VALIDATION_STREAM);
        let test_sets = if self.config.svm_type.is_classification() && folds < l {
            stratified_folds(info.groups(), folds, &mut rng)
        } else {
            shuffled_folds(l, folds, &mut rng)
        };

        let mut predictions = vec![0.0; l];
        for test in test_sets.iter().filter(|t| !t.is_empty()) {
            let model = self.train_problem(&problem.subset(&complement(l, test)))?;
            for &k in test {
                predictions[k] = model.predict(problem.x(k)).label;
            }
        }
        Ok(predictions)
    }

    /// Get the optimizer configuration
    pub fn config(&self) -> &SvmConfig {
        &self.config
    }

    /// Get the kernel
    pub fn kernel(&self) -> &K {
        &self.kernel
    }
}

/// Train every sub-problem, in parallel when the `parallel` feature is on
fn fit_all<K: Kernel>(info: &ProblemInfo<K>, subs: Vec<SubProblem>) -> Result<Vec<SubModelFit>> {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        subs.into_par_iter()
            .enumerate()
            .map(|(k, sub)| fit_sub_problem(info, sub, k as u64))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        subs.into_iter()
            .enumerate()
            .map(|(k, sub)| fit_sub_problem(info, sub, k as u64))
            .collect()
    }
}

fn fit_sub_problem<K: Kernel>(
    info: &ProblemInfo<K>,
    sub: SubProblem,
    stream: u64,
) -> Result<SubModelFit> {
    let calibration = if info.config.probability {
        let mut rng = rng_for(info.config.seed, stream);
        match info.config.svm_type {
            SvmType::CSvc | SvmType::NuSvc => Some(binary_svc_probability(info, &sub, &mut rng)?),
            SvmType::EpsilonSvr | SvmType::NuSvr => Some(svr_probability(info, &sub, &mut rng)?),
            SvmType::OneClass => None,
        }
    } else {
        None
    };

    let decision = train_one(&info.problem, &sub, &info.kernel, &info.config)?;
    Ok(SubModelFit {
        sub,
        decision,
        calibration,
    })
}

/// A trained SVM model that can make predictions
pub struct TrainedSVM<K: Kernel> {
    kernel: Arc<K>,
    info: ModelInfo,
    solutions: Vec<SolutionInfo>,
}

impl<K: Kernel> TrainedSVM<K> {
    /// Wrap a model that was trained elsewhere, e.g. read from disk
    pub fn from_info(kernel: K, info: ModelInfo) -> Self {
        Self {
            kernel: Arc::new(kernel),
            info,
            solutions: Vec::new(),
        }
    }

    /// Decision value of every sub-model
    pub fn decision_values(&self, x: &FeatureVector) -> Vec<f64> {
        self.info.decision_values(&*self.kernel, x)
    }

    /// Label and class probabilities; `None` without classification calibration
    pub fn predict_probability(&self, x: &FeatureVector) -> Option<(f64, Vec<f64>)> {
        self.info.predict_probability(&*self.kernel, x)
    }

    /// Get the assembled model
    pub fn info(&self) -> &ModelInfo {
        &self.info
    }

    /// Solver outcome per sub-problem; empty for models not trained in this process
    pub fn solutions(&self) -> &[SolutionInfo] {
        &self.solutions
    }

    /// True unless some sub-problem stopped at the iteration cap
    pub fn converged(&self) -> bool {
        self.solutions.iter().all(|s| s.converged)
    }

    /// Get the kernel
    pub fn kernel(&self) -> &K {
        &self.kernel
    }
}

impl<K: Kernel> SVMModel for TrainedSVM<K> {
    fn predict(&self, x: &FeatureVector) -> Prediction {
        self.info.predict(&*self.kernel, x)
    }

    fn n_support_vectors(&self) -> usize {
        self.info.n_support_vectors()
    }
}
