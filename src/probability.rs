//! Probability calibration
//!
//! Classification pairs get a Platt sigmoid fitted to cross-validated decision
//! values; pairwise probabilities are coupled into class probabilities with the
//! method of Wu, Lin and Weng (2004). Regression gets the scale of a Laplace
//! distribution fitted to cross-validated residuals.

use crate::core::Result;
use crate::kernel::Kernel;
use crate::optimizer::train_one;
use crate::problem::{ProblemInfo, SubProblem};
use crate::utils::{complement, shuffled_folds};
use log::{debug, warn};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// Folds used to produce out-of-sample decision values
pub const CALIBRATION_FOLDS: usize = 5;

/// Pairwise probabilities are clamped to `[MIN_PROB, 1 - MIN_PROB]`
pub const MIN_PROB: f64 = 1e-7;

/// Fitted calibration of one sub-model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Calibration {
    /// `P(y = +1 | f) = 1 / (1 + exp(a * f + b))`
    Sigmoid { a: f64, b: f64 },
    /// Residuals follow `exp(-|z| / sigma) / (2 * sigma)`
    Laplace { sigma: f64 },
}

/// Fit Platt's sigmoid to decision values and `+1`/`-1` labels
///
/// Newton's method with backtracking line search on the regularized targets
/// `(N+ + 1) / (N+ + 2)` and `1 / (N- + 2)`.
pub fn sigmoid_train(dec_values: &[f64], labels: &[f64]) -> (f64, f64) {
    const MAX_ITER: usize = 100;
    const MIN_STEP: f64 = 1e-10;
    const SIGMA: f64 = 1e-12;
    const EPS: f64 = 1e-5;

    let prior1 = labels.iter().filter(|&&y| y > 0.0).count() as f64;
    let prior0 = labels.len() as f64 - prior1;
    let hi_target = (prior1 + 1.0) / (prior1 + 2.0);
    let lo_target = 1.0 / (prior0 + 2.0);
    let targets: Vec<f64> = labels
        .iter()
        .map(|&y| if y > 0.0 { hi_target } else { lo_target })
        .collect();

    let objective = |a: f64, b: f64| -> f64 {
        dec_values
            .iter()
            .zip(&targets)
            .map(|(&f, &t)| {
                let fapb = f * a + b;
                if fapb >= 0.0 {
                    t * fapb + (-fapb).exp().ln_1p()
                } else {
                    (t - 1.0) * fapb + fapb.exp().ln_1p()
                }
            })
            .sum()
    };

    let mut a = 0.0;
    let mut b = ((prior0 + 1.0) / (prior1 + 1.0)).ln();
    let mut fval = objective(a, b);

    let mut iter = 0;
    while iter < MAX_ITER {
        let (mut h11, mut h22, mut h21) = (SIGMA, SIGMA, 0.0);
        let (mut g1, mut g2) = (0.0, 0.0);
        for (&f, &t) in dec_values.iter().zip(&targets) {
            let fapb = f * a + b;
            let (p, q) = if fapb >= 0.0 {
                let e = (-fapb).exp();
                (e / (1.0 + e), 1.0 / (1.0 + e))
            } else {
                let e = fapb.exp();
                (1.0 / (1.0 + e), e / (1.0 + e))
            };
            let d2 = p * q;
            h11 += f * f * d2;
            h22 += d2;
            h21 += f * d2;
            let d1 = t - p;
            g1 += f * d1;
            g2 += d1;
        }

        if g1.abs() < EPS && g2.abs() < EPS {
            break;
        }

        let det = h11 * h22 - h21 * h21;
        let da = -(h22 * g1 - h21 * g2) / det;
        let db = -(-h21 * g1 + h11 * g2) / det;
        let gd = g1 * da + g2 * db;

        let mut step = 1.0;
        while step >= MIN_STEP {
            let (new_a, new_b) = (a + step * da, b + step * db);
            let new_f = objective(new_a, new_b);
            if new_f < fval + 0.0001 * step * gd {
                a = new_a;
                b = new_b;
                fval = new_f;
                break;
            }
            step /= 2.0;
        }
        if step < MIN_STEP {
            debug!("line search failed in two-class probability estimates");
            break;
        }
        iter += 1;
    }

    if iter >= MAX_ITER {
        debug!("reached maximal iterations in two-class probability estimates");
    }
    (a, b)
}

/// Probability of the positive class for one decision value
pub fn sigmoid_predict(decision_value: f64, a: f64, b: f64) -> f64 {
    let fapb = decision_value * a + b;
    if fapb >= 0.0 {
        let e = (-fapb).exp();
        e / (1.0 + e)
    } else {
        1.0 / (1.0 + fapb.exp())
    }
}

/// Couple pairwise probabilities into `k` class probabilities
///
/// `r[i][j]` estimates `P(class i | class i or j)`.
pub fn multiclass_probability(k: usize, r: &[Vec<f64>]) -> Vec<f64> {
    let max_iter = k.max(100);
    let eps = 0.005 / k as f64;

    let mut q = vec![vec![0.0; k]; k];
    for t in 0..k {
        for j in 0..t {
            q[t][t] += r[j][t] * r[j][t];
            q[t][j] = q[j][t];
        }
        for j in (t + 1)..k {
            q[t][t] += r[j][t] * r[j][t];
            q[t][j] = -r[j][t] * r[t][j];
        }
    }

    let mut p = vec![1.0 / k as f64; k];
    let mut qp = vec![0.0; k];
    let mut iter = 0;
    while iter < max_iter {
        let mut pqp = 0.0;
        for t in 0..k {
            qp[t] = (0..k).map(|j| q[t][j] * p[j]).sum();
            pqp += p[t] * qp[t];
        }
        let max_error = qp.iter().fold(0.0_f64, |m, &v| m.max((v - pqp).abs()));
        if max_error < eps {
            break;
        }

        for t in 0..k {
            let diff = (-qp[t] + pqp) / q[t][t];
            p[t] += diff;
            pqp = (pqp + diff * (diff * q[t][t] + 2.0 * qp[t])) / (1.0 + diff) / (1.0 + diff);
            for j in 0..k {
                qp[j] = (qp[j] + diff * q[t][j]) / (1.0 + diff);
                p[j] /= 1.0 + diff;
            }
        }
        iter += 1;
    }

    if iter >= max_iter {
        debug!("exceeded max_iter in multiclass probability coupling");
    }
    p
}

/// Fit a sigmoid to out-of-sample decision values of a binary sub-problem
///
/// A fold whose training part lacks one of the classes predicts `+1` or `-1`
/// (or `0` when it is empty) for its test part instead of training.
pub fn binary_svc_probability<K: Kernel>(
    info: &ProblemInfo<K>,
    sub: &SubProblem,
    rng: &mut StdRng,
) -> Result<Calibration> {
    let l = sub.len();
    let mut dec_values = vec![0.0; l];

    for test in shuffled_folds(l, CALIBRATION_FOLDS, rng) {
        if test.is_empty() {
            continue;
        }
        let fold = sub.select(&complement(l, &test));
        let positives = fold.y.iter().filter(|&&y| y > 0.0).count();
        let negatives = fold.len() - positives;

        let fixed = match (positives, negatives) {
            (0, 0) => Some(0.0),
            (_, 0) => Some(1.0),
            (0, _) => Some(-1.0),
            _ => None,
        };
        if let Some(value) = fixed {
            for &k in &test {
                dec_values[k] = value;
            }
            continue;
        }

        let decision = train_one(&info.problem, &fold, &info.kernel, &info.config)?;
        for &k in &test {
            let x = info.problem.x(sub.instances[k]);
            dec_values[k] = decision.value(&*info.kernel, &info.problem, &fold, x);
        }
    }

    let (a, b) = sigmoid_train(&dec_values, &sub.y);
    debug!("sigmoid calibration: A = {a}, B = {b}");
    Ok(Calibration::Sigmoid { a, b })
}

/// Fit the Laplace scale of cross-validated regression residuals
///
/// Residuals beyond five standard deviations of the Laplace fit are left out
/// of the final estimate.
pub fn svr_probability<K: Kernel>(
    info: &ProblemInfo<K>,
    sub: &SubProblem,
    rng: &mut StdRng,
) -> Result<Calibration> {
    let l = sub.len();
    let mut residuals = sub.y.clone();

    for test in shuffled_folds(l, CALIBRATION_FOLDS, rng) {
        if test.is_empty() {
            continue;
        }
        let fold = sub.select(&complement(l, &test));
        if fold.is_empty() {
            continue;
        }
        let decision = train_one(&info.problem, &fold, &info.kernel, &info.config)?;
        for &k in &test {
            let x = info.problem.x(sub.instances[k]);
            residuals[k] -= decision.value(&*info.kernel, &info.problem, &fold, x);
        }
    }

    let mae = residuals.iter().map(|r| r.abs()).sum::<f64>() / l as f64;
    let std = (2.0 * mae * mae).sqrt();
    let kept: Vec<f64> = residuals
        .iter()
        .map(|r| r.abs())
        .filter(|&r| r <= 5.0 * std)
        .collect();
    if kept.len() < l {
        warn!("{} outlying residuals left out of the Laplace fit", l - kept.len());
    }
    let sigma = kept.iter().sum::<f64>() / kept.len().max(1) as f64;

    debug!(
        "probability model: target = predicted + z, z ~ Laplace with sigma = {sigma}"
    );
    Ok(Calibration::Laplace { sigma })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FeatureVector, SvmConfig, SvmType};
    use crate::kernel::LinearKernel;
    use crate::problem::Problem;
    use crate::utils::rng_for;
    use approx::assert_abs_diff_eq;
    use std::sync::Arc;

    #[test]
    fn test_sigmoid_predict_is_stable_at_extremes() {
        assert_abs_diff_eq!(sigmoid_predict(0.0, 1.0, 0.0), 0.5, epsilon = 1e-12);
        assert!(sigmoid_predict(1e6, 1.0, 0.0) >= 0.0);
        assert!(sigmoid_predict(-1e6, 1.0, 0.0) <= 1.0);
        assert!(sigmoid_predict(-1e6, 1.0, 0.0).is_finite());
        // Negative A maps large decision values to the positive class
        assert!(sigmoid_predict(3.0, -2.0, 0.0) > 0.99);
    }

    #[test]
    fn test_sigmoid_train_orders_classes() {
        let dec_values: Vec<f64> = (-10..=10).map(|v| f64::from(v) / 4.0).collect();
        let labels: Vec<f64> = dec_values
            .iter()
            .enumerate()
            .map(|(k, &f)| {
                // A little label noise keeps the fit finite
                if k == 9 || k == 12 {
                    -f.signum()
                } else if f >= 0.0 {
                    1.0
                } else {
                    -1.0
                }
            })
            .collect();

        let (a, b) = sigmoid_train(&dec_values, &labels);
        assert!(a < 0.0);
        assert!(b.is_finite());
        assert!(sigmoid_predict(2.5, a, b) > 0.8);
        assert!(sigmoid_predict(-2.5, a, b) < 0.2);
    }

    #[test]
    fn test_multiclass_probability_uniform() {
        let k = 4;
        let r = vec![vec![0.5; k]; k];
        let p = multiclass_probability(k, &r);
        for v in &p {
            assert_abs_diff_eq!(*v, 0.25, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_multiclass_probability_matches_exact_coupling() {
        let r = vec![
            vec![0.0, 0.9, 0.8],
            vec![0.1, 0.0, 0.6],
            vec![0.2, 0.4, 0.0],
        ];
        let p = multiclass_probability(3, &r);
        assert_abs_diff_eq!(p.iter().sum::<f64>(), 1.0, epsilon = 1e-6);

        // Solution of Q p = b·1 with sum(p) = 1, solved in exact arithmetic
        let exact = [0.742258, 0.109242, 0.148500];
        for (got, want) in p.iter().zip(exact) {
            assert_abs_diff_eq!(*got, want, epsilon = 5e-3);
        }
        assert!(p[0] > p[2] && p[2] > p[1]);
    }

    fn line_problem(n: usize) -> Problem {
        let xs = (0..n).map(|k| FeatureVector::new(vec![k as f64 / n as f64])).collect();
        let y = (0..n).map(|k| 2.0 * k as f64 / n as f64 + 1.0).collect();
        Problem::new(xs, y).expect("Valid problem")
    }

    #[test]
    fn test_svr_probability_gives_positive_sigma() {
        let config = SvmConfig {
            svm_type: SvmType::EpsilonSvr,
            c: 10.0,
            p: 0.05,
            ..SvmConfig::default()
        };
        let info = ProblemInfo::new(line_problem(40), Arc::new(LinearKernel::new()), config)
            .expect("Valid");
        let sub = &info.sub_problems()[0];
        let calibration =
            svr_probability(&info, sub, &mut rng_for(Some(1), 0)).expect("Calibration");
        match calibration {
            Calibration::Laplace { sigma } => assert!(sigma > 0.0 && sigma < 0.5),
            other => panic!("unexpected calibration {other:?}"),
        }
    }

    #[test]
    fn test_binary_probability_on_separable_pair() {
        let n = 30;
        let xs = (0..n)
            .map(|k| {
                let side = if k % 2 == 0 { 1.0 } else { -1.0 };
                FeatureVector::new(vec![side * (1.0 + (k % 5) as f64 * 0.2), (k % 3) as f64])
            })
            .collect();
        let y = (0..n).map(|k| if k % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let problem = Problem::new(xs, y).expect("Valid problem");
        let info = ProblemInfo::new(problem, Arc::new(LinearKernel::new()), SvmConfig::default())
            .expect("Valid");
        let sub = &info.sub_problems()[0];

        let calibration =
            binary_svc_probability(&info, sub, &mut rng_for(Some(5), 0)).expect("Calibration");
        match calibration {
            Calibration::Sigmoid { a, b } => {
                assert!(a < 0.0);
                assert!(sigmoid_predict(1.0, a, b) > 0.5);
                assert!(sigmoid_predict(-1.0, a, b) < 0.5);
            }
            other => panic!("unexpected calibration {other:?}"),
        }
    }
}
