//! Per-formulation training of one sub-problem
//!
//! Each formulation sets up the linear term, label signs, starting point and
//! bounds of the shared dual, runs the solver and maps the result back to one
//! signed coefficient per instance.

use crate::core::{FeatureVector, Result, SVMError, SvmConfig, SvmType};
use crate::kernel::Kernel;
use crate::matrix::{SvcKernelMatrix, SvrKernelMatrix};
use crate::problem::{Problem, SubProblem};
use crate::solver::{solve, SolutionInfo, SolverConfig, SolverVariant};
use log::info;
use std::sync::Arc;

/// Dual solution of one sub-problem
#[derive(Debug, Clone)]
pub struct Decision {
    /// Signed coefficient per sub-problem instance
    pub alpha: Vec<f64>,
    pub rho: f64,
    pub solution: SolutionInfo,
}

impl Decision {
    /// `sum alpha_k * k(x, x_k) - rho` over the instances of `sub`
    pub fn value<K: Kernel + ?Sized>(
        &self,
        kernel: &K,
        problem: &Problem,
        sub: &SubProblem,
        x: &FeatureVector,
    ) -> f64 {
        let sum: f64 = sub
            .instances
            .iter()
            .zip(&self.alpha)
            .filter(|&(_, &a)| a != 0.0)
            .map(|(&k, &a)| a * kernel.compute(x, problem.x(k)))
            .sum();
        sum - self.rho
    }

    /// Number of non-zero coefficients
    pub fn n_support(&self) -> usize {
        self.alpha.iter().filter(|&&a| a != 0.0).count()
    }
}

/// Train the configured formulation on one sub-problem
pub fn train_one<K: Kernel>(
    problem: &Problem,
    sub: &SubProblem,
    kernel: &Arc<K>,
    config: &SvmConfig,
) -> Result<Decision> {
    let solver = SolverConfig::from(config);
    let (alpha, solution) = match config.svm_type {
        SvmType::CSvc => solve_c_svc(problem, sub, kernel, config, &solver),
        SvmType::NuSvc => solve_nu_svc(problem, sub, kernel, config, &solver),
        SvmType::OneClass => solve_one_class(problem, sub, kernel, config, &solver),
        SvmType::EpsilonSvr => solve_epsilon_svr(problem, sub, kernel, config, &solver),
        SvmType::NuSvr => solve_nu_svr(problem, sub, kernel, config, &solver),
    }?;

    let mut n_sv = 0;
    let mut n_bsv = 0;
    for (&a, &y) in alpha.iter().zip(&sub.y) {
        if a != 0.0 {
            n_sv += 1;
            let bound = if y > 0.0 {
                solution.upper_bound_p
            } else {
                solution.upper_bound_n
            };
            if a.abs() >= bound {
                n_bsv += 1;
            }
        }
    }
    info!("obj = {}, rho = {}", solution.objective, solution.rho);
    info!("nSV = {}, nBSV = {}", n_sv, n_bsv);

    Ok(Decision {
        alpha,
        rho: solution.rho,
        solution,
    })
}

fn svc_matrix<K: Kernel>(
    problem: &Problem,
    sub: &SubProblem,
    kernel: &Arc<K>,
    y: &[i8],
    cache_size: usize,
) -> SvcKernelMatrix<K> {
    SvcKernelMatrix::new(
        Arc::clone(kernel),
        problem.features(),
        problem.positions(&sub.instances),
        y.to_vec(),
        cache_size,
    )
}

fn solve_c_svc<K: Kernel>(
    problem: &Problem,
    sub: &SubProblem,
    kernel: &Arc<K>,
    config: &SvmConfig,
    solver: &SolverConfig,
) -> Result<(Vec<f64>, SolutionInfo)> {
    let l = sub.len();
    let y = sub.signs();
    let p = vec![-1.0; l];
    let mut alpha = vec![0.0; l];

    let mut q = svc_matrix(problem, sub, kernel, &y, config.cache_size);
    let solution = solve(
        SolverVariant::Standard,
        &mut q,
        &p,
        &y,
        &mut alpha,
        sub.cp,
        sub.cn,
        solver,
    )?;

    if sub.cp == sub.cn {
        let sum: f64 = alpha.iter().sum();
        info!("nu = {}", sum / (sub.cp * l as f64));
    }
    for (a, &s) in alpha.iter_mut().zip(&y) {
        *a *= f64::from(s);
    }
    Ok((alpha, solution))
}

fn solve_nu_svc<K: Kernel>(
    problem: &Problem,
    sub: &SubProblem,
    kernel: &Arc<K>,
    config: &SvmConfig,
    solver: &SolverConfig,
) -> Result<(Vec<f64>, SolutionInfo)> {
    let l = sub.len();
    let y = sub.signs();
    let p = vec![0.0; l];

    // Spread nu * l / 2 over each class, at most 1 per variable
    let mut sum_pos = config.nu * l as f64 / 2.0;
    let mut sum_neg = sum_pos;
    let mut alpha = Vec::with_capacity(l);
    for &s in &y {
        let remaining = if s > 0 { &mut sum_pos } else { &mut sum_neg };
        let a = remaining.min(1.0);
        *remaining -= a;
        alpha.push(a);
    }

    let mut q = svc_matrix(problem, sub, kernel, &y, config.cache_size);
    let mut solution = solve(SolverVariant::Nu, &mut q, &p, &y, &mut alpha, 1.0, 1.0, solver)?;

    let r = solution.r;
    if !(r > 0.0 && r.is_finite()) {
        return Err(SVMError::InvalidParameter(format!(
            "nu = {} leaves no margin on this problem (r = {r})",
            config.nu
        )));
    }
    info!("C = {}", 1.0 / r);

    for (a, &s) in alpha.iter_mut().zip(&y) {
        *a *= f64::from(s) / r;
    }
    solution.rho /= r;
    solution.objective /= r * r;
    solution.upper_bound_p = 1.0 / r;
    solution.upper_bound_n = 1.0 / r;
    Ok((alpha, solution))
}

fn solve_one_class<K: Kernel>(
    problem: &Problem,
    sub: &SubProblem,
    kernel: &Arc<K>,
    config: &SvmConfig,
    solver: &SolverConfig,
) -> Result<(Vec<f64>, SolutionInfo)> {
    let l = sub.len();
    let total = config.nu * l as f64;
    let n = (total as usize).min(l);

    let mut alpha = vec![0.0; l];
    for a in alpha.iter_mut().take(n) {
        *a = 1.0;
    }
    if n < l {
        alpha[n] = total - n as f64;
    }

    let y = vec![1; l];
    let p = vec![0.0; l];
    let mut q = SvcKernelMatrix::one_class(
        Arc::clone(kernel),
        problem.features(),
        problem.positions(&sub.instances),
        config.cache_size,
    );
    let solution = solve(
        SolverVariant::Standard,
        &mut q,
        &p,
        &y,
        &mut alpha,
        1.0,
        1.0,
        solver,
    )?;
    Ok((alpha, solution))
}

fn solve_epsilon_svr<K: Kernel>(
    problem: &Problem,
    sub: &SubProblem,
    kernel: &Arc<K>,
    config: &SvmConfig,
    solver: &SolverConfig,
) -> Result<(Vec<f64>, SolutionInfo)> {
    let l = sub.len();
    let mut alpha2 = vec![0.0; 2 * l];
    let mut p = vec![0.0; 2 * l];
    let mut y = vec![0; 2 * l];
    for (i, &target) in sub.y.iter().enumerate() {
        p[i] = config.p - target;
        y[i] = 1;
        p[i + l] = config.p + target;
        y[i + l] = -1;
    }

    let mut q = SvrKernelMatrix::new(
        Arc::clone(kernel),
        problem.features(),
        problem.positions(&sub.instances),
        config.cache_size,
    );
    let solution = solve(
        SolverVariant::Standard,
        &mut q,
        &p,
        &y,
        &mut alpha2,
        sub.cp,
        sub.cn,
        solver,
    )?;

    let alpha: Vec<f64> = (0..l).map(|i| alpha2[i] - alpha2[i + l]).collect();
    let sum: f64 = alpha.iter().map(|a| a.abs()).sum();
    info!("nu = {}", sum / (config.c * l as f64));
    Ok((alpha, solution))
}

fn solve_nu_svr<K: Kernel>(
    problem: &Problem,
    sub: &SubProblem,
    kernel: &Arc<K>,
    config: &SvmConfig,
    solver: &SolverConfig,
) -> Result<(Vec<f64>, SolutionInfo)> {
    let l = sub.len();
    let c = config.c;
    let mut sum = c * config.nu * l as f64 / 2.0;
    let mut alpha2 = vec![0.0; 2 * l];
    let mut p = vec![0.0; 2 * l];
    let mut y = vec![0; 2 * l];
    for (i, &target) in sub.y.iter().enumerate() {
        let a = sum.min(c);
        alpha2[i] = a;
        alpha2[i + l] = a;
        sum -= a;

        p[i] = -target;
        y[i] = 1;
        p[i + l] = target;
        y[i + l] = -1;
    }

    let mut q = SvrKernelMatrix::new(
        Arc::clone(kernel),
        problem.features(),
        problem.positions(&sub.instances),
        config.cache_size,
    );
    let solution = solve(SolverVariant::Nu, &mut q, &p, &y, &mut alpha2, c, c, solver)?;
    info!("epsilon = {}", -solution.r);

    let alpha = (0..l).map(|i| alpha2[i] - alpha2[i + l]).collect();
    Ok((alpha, solution))
}
