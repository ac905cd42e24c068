//! Training problems and their one-vs-one decomposition
//!
//! A [`Problem`] owns the feature vectors behind an `Arc` so that every sub-problem,
//! kernel matrix and cross-validation fold can index into them without copying.
//! [`ProblemInfo`] groups instances by class, applies class weights and splits a
//! classification problem into one binary [`SubProblem`] per pair of classes.

use crate::core::{Dataset, FeatureVector, Result, SVMError, Sample, SvmConfig, SvmType};
use crate::kernel::Kernel;
use std::collections::HashMap;
use std::sync::Arc;

/// Feature vectors with one label or target per instance
#[derive(Debug, Clone)]
pub struct Problem {
    xs: Arc<[FeatureVector]>,
    /// Instance `k` is `xs[rows[k]]`
    rows: Vec<usize>,
    y: Vec<f64>,
}

impl Problem {
    /// Create a problem, checking sizes, dimensions and labels
    pub fn new(xs: Vec<FeatureVector>, y: Vec<f64>) -> Result<Self> {
        if xs.is_empty() {
            return Err(SVMError::EmptyDataset);
        }
        if xs.len() != y.len() {
            return Err(SVMError::DimensionMismatch {
                expected: xs.len(),
                actual: y.len(),
            });
        }
        let dim = xs[0].dim();
        if let Some(x) = xs.iter().find(|x| x.dim() != dim) {
            return Err(SVMError::DimensionMismatch {
                expected: dim,
                actual: x.dim(),
            });
        }
        if let Some(&label) = y.iter().find(|v| !v.is_finite()) {
            return Err(SVMError::InvalidLabel(label));
        }

        Ok(Self {
            rows: (0..xs.len()).collect(),
            xs: xs.into(),
            y,
        })
    }

    pub fn from_samples(samples: &[Sample]) -> Result<Self> {
        let xs = samples.iter().map(|s| s.features.clone()).collect();
        let y = samples.iter().map(|s| s.label).collect();
        Self::new(xs, y)
    }

    pub fn from_dataset<D: Dataset + ?Sized>(dataset: &D) -> Result<Self> {
        let samples: Vec<Sample> = (0..dataset.len()).map(|i| dataset.get_sample(i)).collect();
        Self::from_samples(&samples)
    }

    /// Number of instances
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of features
    pub fn dim(&self) -> usize {
        self.rows.first().map_or(0, |&r| self.xs[r].dim())
    }

    /// Feature vector of instance `k`
    pub fn x(&self, k: usize) -> &FeatureVector {
        &self.xs[self.rows[k]]
    }

    /// Labels or targets
    pub fn y(&self) -> &[f64] {
        &self.y
    }

    /// View of the given instances sharing the same feature storage
    pub fn subset(&self, instances: &[usize]) -> Problem {
        Problem {
            xs: Arc::clone(&self.xs),
            rows: instances.iter().map(|&k| self.rows[k]).collect(),
            y: instances.iter().map(|&k| self.y[k]).collect(),
        }
    }

    /// Shared feature storage
    pub(crate) fn features(&self) -> Arc<[FeatureVector]> {
        Arc::clone(&self.xs)
    }

    /// Storage positions of the given instances
    pub(crate) fn positions(&self, instances: &[usize]) -> Vec<usize> {
        instances.iter().map(|&k| self.rows[k]).collect()
    }
}

/// One independent solve: a list of instances with scalar labels and box bounds
#[derive(Debug, Clone)]
pub struct SubProblem {
    /// Instances of the parent problem, in solver order
    pub instances: Vec<usize>,
    /// `+1`/`-1` for classification pairs and one-class, targets for regression
    pub y: Vec<f64>,
    /// Bound for instances with `y > 0`
    pub cp: f64,
    /// Bound for instances with `y <= 0`
    pub cn: f64,
    /// Class indices `(i, j)` of a classification pair; instances of `i` carry `+1`
    pub classes: Option<(usize, usize)>,
}

impl SubProblem {
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Label signs as the solver expects them
    pub fn signs(&self) -> Vec<i8> {
        self.y.iter().map(|&v| if v > 0.0 { 1 } else { -1 }).collect()
    }

    /// Restrict to the given positions of this sub-problem
    pub fn select(&self, positions: &[usize]) -> SubProblem {
        SubProblem {
            instances: positions.iter().map(|&k| self.instances[k]).collect(),
            y: positions.iter().map(|&k| self.y[k]).collect(),
            cp: self.cp,
            cn: self.cn,
            classes: self.classes,
        }
    }
}

/// A problem prepared for training: classes, weights, kernel and solver settings
pub struct ProblemInfo<K: Kernel> {
    pub problem: Problem,
    pub kernel: Arc<K>,
    pub config: SvmConfig,
    /// Class labels in order of first appearance
    levels: Vec<i32>,
    /// Class label to position in `levels`
    index: HashMap<i32, usize>,
    /// Instances of each class, by class index
    groups: Vec<Vec<usize>>,
    /// C scaled by the class weight, by class index
    weighted_c: Vec<f64>,
}

impl<K: Kernel> ProblemInfo<K> {
    /// Validate the configuration against the problem and group the classes
    pub fn new(problem: Problem, kernel: Arc<K>, config: SvmConfig) -> Result<Self> {
        config.validate()?;

        let (levels, groups) = if config.svm_type.is_classification() {
            group_classes(problem.y())?
        } else {
            (Vec::new(), Vec::new())
        };
        let index: HashMap<i32, usize> = levels.iter().enumerate().map(|(i, &l)| (l, i)).collect();

        let mut weighted_c = vec![config.c; levels.len()];
        if config.svm_type.is_classification() {
            for &(label, weight) in &config.class_weights {
                let &class = index
                    .get(&label)
                    .ok_or(SVMError::UnknownClassWeight(label))?;
                weighted_c[class] *= weight;
            }
        }

        if config.svm_type == SvmType::NuSvc {
            for i in 0..groups.len() {
                for j in (i + 1)..groups.len() {
                    let (n1, n2) = (groups[i].len() as f64, groups[j].len() as f64);
                    if config.nu * (n1 + n2) / 2.0 > n1.min(n2) {
                        return Err(SVMError::InfeasibleNu {
                            nu: config.nu,
                            first: levels[i],
                            second: levels[j],
                        });
                    }
                }
            }
        }

        Ok(Self {
            problem,
            kernel,
            config,
            levels,
            index,
            groups,
            weighted_c,
        })
    }

    /// Class labels in training order
    pub fn levels(&self) -> &[i32] {
        &self.levels
    }

    pub fn n_classes(&self) -> usize {
        self.levels.len()
    }

    /// Position of a class label
    pub fn class_index(&self, label: i32) -> Option<usize> {
        self.index.get(&label).copied()
    }

    /// Instances carrying a class label
    pub fn instances_of(&self, label: i32) -> Option<&[usize]> {
        self.class_index(label).map(|c| self.groups[c].as_slice())
    }

    /// Instances of every class, by class index
    pub fn groups(&self) -> &[Vec<usize>] {
        &self.groups
    }

    /// C after class weighting
    pub fn weighted_c(&self, class: usize) -> f64 {
        self.weighted_c[class]
    }

    /// Independent solves making up the model
    ///
    /// Classification yields one sub-problem per class pair `(i, j)`, `i < j`, in
    /// lexicographic order. One-class and regression yield a single sub-problem.
    pub fn sub_problems(&self) -> Vec<SubProblem> {
        match self.config.svm_type {
            SvmType::CSvc | SvmType::NuSvc => {
                let k = self.levels.len();
                let mut subs = Vec::with_capacity(k * k.saturating_sub(1) / 2);
                for i in 0..k {
                    for j in (i + 1)..k {
                        let (first, second) = (&self.groups[i], &self.groups[j]);
                        let instances = first.iter().chain(second.iter()).copied().collect();
                        let y = std::iter::repeat(1.0)
                            .take(first.len())
                            .chain(std::iter::repeat(-1.0).take(second.len()))
                            .collect();
                        subs.push(SubProblem {
                            instances,
                            y,
                            cp: self.weighted_c[i],
                            cn: self.weighted_c[j],
                            classes: Some((i, j)),
                        });
                    }
                }
                subs
            }
            SvmType::OneClass => vec![SubProblem {
                instances: (0..self.problem.len()).collect(),
                y: vec![1.0; self.problem.len()],
                cp: 1.0,
                cn: 1.0,
                classes: None,
            }],
            SvmType::EpsilonSvr | SvmType::NuSvr => vec![SubProblem {
                instances: (0..self.problem.len()).collect(),
                y: self.problem.y().to_vec(),
                cp: self.config.c,
                cn: self.config.c,
                classes: None,
            }],
        }
    }
}

/// Group instances by integral class label
///
/// Labels are ordered by first appearance, except that a two-class problem seen as
/// `-1` then `+1` is reordered so that `+1` comes first.
pub fn group_classes(y: &[f64]) -> Result<(Vec<i32>, Vec<Vec<usize>>)> {
    let mut levels: Vec<i32> = Vec::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut index: HashMap<i32, usize> = HashMap::new();

    for (k, &value) in y.iter().enumerate() {
        if value.fract() != 0.0 || value.abs() > f64::from(i32::MAX) {
            return Err(SVMError::InvalidLabel(value));
        }
        let label = value as i32;
        let class = *index.entry(label).or_insert_with(|| {
            levels.push(label);
            groups.push(Vec::new());
            levels.len() - 1
        });
        groups[class].push(k);
    }

    if levels == [-1, 1] {
        levels.swap(0, 1);
        groups.swap(0, 1);
    }

    Ok((levels, groups))
}
