//! SMO iteration: working set selection, pair update and termination

use super::{SolutionInfo, Solver, SolverConfig, SolverVariant, TAU};
use crate::core::{Result, SVMError};
use crate::matrix::KernelMatrix;
use log::{debug, info, warn};

/// Iteration cap used when the configuration leaves it open
pub fn default_max_iterations(len: usize) -> usize {
    len.saturating_mul(100).max(10_000_000)
}

/// Solve the dual problem over `q`
///
/// `alpha` holds a feasible starting point on entry and the solution, in the
/// caller's order, on return. `cp` and `cn` bound the variables with `y = +1`
/// and `y = -1`. Hitting the iteration cap is not an error; the returned
/// [`SolutionInfo`] reports `converged == false`.
#[allow(clippy::too_many_arguments)]
pub fn solve(
    variant: SolverVariant,
    q: &mut dyn KernelMatrix,
    p: &[f64],
    y: &[i8],
    alpha: &mut [f64],
    cp: f64,
    cn: f64,
    config: &SolverConfig,
) -> Result<SolutionInfo> {
    let len = q.len();
    if len == 0 {
        return Err(SVMError::EmptyDataset);
    }
    for actual in [p.len(), y.len(), alpha.len()] {
        if actual != len {
            return Err(SVMError::DimensionMismatch {
                expected: len,
                actual,
            });
        }
    }
    if let Some(&bad) = y.iter().find(|&&s| s != 1 && s != -1) {
        return Err(SVMError::InvalidLabel(f64::from(bad)));
    }
    if !(cp.is_finite() && cp > 0.0 && cn.is_finite() && cn > 0.0) {
        return Err(SVMError::InvalidParameter(format!(
            "upper bounds must be positive, got {cp} and {cn}"
        )));
    }
    if !(config.eps.is_finite() && config.eps > 0.0) {
        return Err(SVMError::InvalidParameter(format!(
            "eps must be positive, got {}",
            config.eps
        )));
    }
    let outside = y.iter().zip(alpha.iter()).any(|(&s, &a)| {
        let bound = if s > 0 { cp } else { cn };
        !(0.0..=bound).contains(&a)
    });
    if outside {
        return Err(SVMError::InvalidParameter(
            "initial alpha outside its box".to_string(),
        ));
    }

    let max_iterations = config
        .max_iterations
        .unwrap_or_else(|| default_max_iterations(len));

    let mut solver = Solver::new(variant, q, p, y, alpha, cp, cn, config.eps);
    let (iterations, converged) = solver.optimize(max_iterations, config.shrinking);
    Ok(solver.finish(iterations, converged, alpha))
}

impl<'a> Solver<'a> {
    /// Run SMO iterations until the violation drops below `eps` or the cap is reached
    ///
    /// Returns the number of iterations and whether the stopping criterion was met.
    pub(super) fn optimize(&mut self, max_iterations: usize, shrinking: bool) -> (usize, bool) {
        let mut counter = self.len.min(1000) + 1;
        let mut iterations = 0;

        while iterations < max_iterations {
            counter -= 1;
            if counter == 0 {
                counter = self.len.min(1000);
                if shrinking {
                    self.do_shrinking();
                }
            }

            let (i, j) = match self.select_working_set() {
                Some(pair) => pair,
                None => {
                    // Optimal on the active set; check the whole problem
                    self.reconstruct_gradient();
                    self.active_size = self.len;
                    match self.select_working_set() {
                        Some(pair) => {
                            counter = 1;
                            pair
                        }
                        None => {
                            info!("optimization finished, #iter = {iterations}");
                            return (iterations, true);
                        }
                    }
                }
            };

            iterations += 1;
            self.update(i, j);
        }

        if self.active_size < self.len {
            self.reconstruct_gradient();
            self.active_size = self.len;
        }
        // Refresh the violation over the whole problem
        self.select_working_set();
        warn!(
            "reached max number of iterations ({max_iterations}) with violation {:.3e}",
            self.violation
        );
        (iterations, false)
    }

    /// Pick the working pair, or `None` when the active set is optimal
    pub(super) fn select_working_set(&mut self) -> Option<(usize, usize)> {
        match self.variant {
            SolverVariant::Standard => self.select_working_set_standard(),
            SolverVariant::Nu => self.select_working_set_nu(),
        }
    }

    fn select_working_set_standard(&mut self) -> Option<(usize, usize)> {
        // i = argmax { -y_t grad_t | t in I_up }
        let mut gmax = f64::NEG_INFINITY;
        let mut gmax_idx = None;
        for t in 0..self.active_size {
            if self.y[t] > 0 {
                if !self.is_upper_bound(t) && -self.grad[t] >= gmax {
                    gmax = -self.grad[t];
                    gmax_idx = Some(t);
                }
            } else if !self.is_lower_bound(t) && self.grad[t] >= gmax {
                gmax = self.grad[t];
                gmax_idx = Some(t);
            }
        }

        let Some(i) = gmax_idx else {
            self.violation = 0.0;
            return None;
        };
        self.q.get_q(i, self.active_size, &mut self.q_i);

        // j = argmin of the second-order decrease over I_low with a violating gradient
        let qd = self.q.get_qd();
        let yi = f64::from(self.y[i]);
        let mut gmax2 = f64::NEG_INFINITY;
        let mut gmin_idx = None;
        let mut obj_diff_min = f64::INFINITY;
        for j in 0..self.active_size {
            let (grad_diff, quad_coef) = if self.y[j] > 0 {
                if self.is_lower_bound(j) {
                    continue;
                }
                gmax2 = gmax2.max(self.grad[j]);
                (
                    gmax + self.grad[j],
                    qd[i] + qd[j] - 2.0 * yi * self.q_i[j],
                )
            } else {
                if self.is_upper_bound(j) {
                    continue;
                }
                gmax2 = gmax2.max(-self.grad[j]);
                (
                    gmax - self.grad[j],
                    qd[i] + qd[j] + 2.0 * yi * self.q_i[j],
                )
            };

            if grad_diff > 0.0 {
                let obj_diff = -(grad_diff * grad_diff) / curvature(quad_coef);
                if obj_diff <= obj_diff_min {
                    gmin_idx = Some(j);
                    obj_diff_min = obj_diff;
                }
            }
        }

        self.violation = gmax + gmax2;
        match gmin_idx {
            Some(j) if self.violation >= self.eps => Some((i, j)),
            _ => None,
        }
    }

    fn select_working_set_nu(&mut self) -> Option<(usize, usize)> {
        let mut gmaxp = f64::NEG_INFINITY;
        let mut gmaxp_idx = None;
        let mut gmaxn = f64::NEG_INFINITY;
        let mut gmaxn_idx = None;
        for t in 0..self.active_size {
            if self.y[t] > 0 {
                if !self.is_upper_bound(t) && -self.grad[t] >= gmaxp {
                    gmaxp = -self.grad[t];
                    gmaxp_idx = Some(t);
                }
            } else if !self.is_lower_bound(t) && self.grad[t] >= gmaxn {
                gmaxn = self.grad[t];
                gmaxn_idx = Some(t);
            }
        }

        if let Some(ip) = gmaxp_idx {
            self.q.get_q(ip, self.active_size, &mut self.q_i);
        }
        if let Some(in_) = gmaxn_idx {
            self.q.get_q(in_, self.active_size, &mut self.q_j);
        }

        let qd = self.q.get_qd();
        let mut gmaxp2 = f64::NEG_INFINITY;
        let mut gmaxn2 = f64::NEG_INFINITY;
        let mut gmin_idx = None;
        let mut obj_diff_min = f64::INFINITY;
        for j in 0..self.active_size {
            let candidate = if self.y[j] > 0 {
                if self.is_lower_bound(j) {
                    continue;
                }
                gmaxp2 = gmaxp2.max(self.grad[j]);
                gmaxp_idx.map(|ip| {
                    (
                        gmaxp + self.grad[j],
                        qd[ip] + qd[j] - 2.0 * self.q_i[j],
                    )
                })
            } else {
                if self.is_upper_bound(j) {
                    continue;
                }
                gmaxn2 = gmaxn2.max(-self.grad[j]);
                gmaxn_idx.map(|in_| {
                    (
                        gmaxn - self.grad[j],
                        qd[in_] + qd[j] - 2.0 * self.q_j[j],
                    )
                })
            };

            if let Some((grad_diff, quad_coef)) = candidate {
                if grad_diff > 0.0 {
                    let obj_diff = -(grad_diff * grad_diff) / curvature(quad_coef);
                    if obj_diff <= obj_diff_min {
                        gmin_idx = Some(j);
                        obj_diff_min = obj_diff;
                    }
                }
            }
        }

        self.violation = (gmaxp + gmaxp2).max(gmaxn + gmaxn2);
        if self.violation < self.eps {
            return None;
        }
        let j = gmin_idx?;
        let i = if self.y[j] > 0 { gmaxp_idx? } else { gmaxn_idx? };
        Some((i, j))
    }

    /// Optimize the pair analytically, then update the gradient
    pub(super) fn update(&mut self, i: usize, j: usize) {
        let active = self.active_size;
        self.q.get_q(i, active, &mut self.q_i);
        self.q.get_q(j, active, &mut self.q_j);

        let qd = self.q.get_qd();
        let (qd_i, qd_j) = (qd[i], qd[j]);
        let c_i = self.c(i);
        let c_j = self.c(j);
        let old_alpha_i = self.alpha[i];
        let old_alpha_j = self.alpha[j];

        if self.y[i] != self.y[j] {
            let quad_coef = curvature(qd_i + qd_j + 2.0 * self.q_i[j]);
            let delta = (-self.grad[i] - self.grad[j]) / quad_coef;
            let diff = self.alpha[i] - self.alpha[j];
            self.alpha[i] += delta;
            self.alpha[j] += delta;

            if diff > 0.0 {
                if self.alpha[j] < 0.0 {
                    self.alpha[j] = 0.0;
                    self.alpha[i] = diff;
                }
            } else if self.alpha[i] < 0.0 {
                self.alpha[i] = 0.0;
                self.alpha[j] = -diff;
            }
            if diff > c_i - c_j {
                if self.alpha[i] > c_i {
                    self.alpha[i] = c_i;
                    self.alpha[j] = c_i - diff;
                }
            } else if self.alpha[j] > c_j {
                self.alpha[j] = c_j;
                self.alpha[i] = c_j + diff;
            }
        } else {
            let quad_coef = curvature(qd_i + qd_j - 2.0 * self.q_i[j]);
            let delta = (self.grad[i] - self.grad[j]) / quad_coef;
            let sum = self.alpha[i] + self.alpha[j];
            self.alpha[i] -= delta;
            self.alpha[j] += delta;

            if sum > c_i {
                if self.alpha[i] > c_i {
                    self.alpha[i] = c_i;
                    self.alpha[j] = sum - c_i;
                }
            } else if self.alpha[j] < 0.0 {
                self.alpha[j] = 0.0;
                self.alpha[i] = sum;
            }
            if sum > c_j {
                if self.alpha[j] > c_j {
                    self.alpha[j] = c_j;
                    self.alpha[i] = sum - c_j;
                }
            } else if self.alpha[i] < 0.0 {
                self.alpha[i] = 0.0;
                self.alpha[j] = sum;
            }
        }

        let delta_alpha_i = self.alpha[i] - old_alpha_i;
        let delta_alpha_j = self.alpha[j] - old_alpha_j;
        for k in 0..active {
            self.grad[k] += self.q_i[k] * delta_alpha_i + self.q_j[k] * delta_alpha_j;
        }

        let was_upper_i = self.is_upper_bound(i);
        let was_upper_j = self.is_upper_bound(j);
        self.update_alpha_status(i);
        self.update_alpha_status(j);

        let len = self.len;
        if was_upper_i != self.is_upper_bound(i) {
            self.q.get_q(i, len, &mut self.q_i);
            let step = if was_upper_i { -c_i } else { c_i };
            for k in 0..len {
                self.grad_bar[k] += step * self.q_i[k];
            }
        }
        if was_upper_j != self.is_upper_bound(j) {
            self.q.get_q(j, len, &mut self.q_j);
            let step = if was_upper_j { -c_j } else { c_j };
            for k in 0..len {
                self.grad_bar[k] += step * self.q_j[k];
            }
        }
    }

    /// Bias of the standard variant
    fn calculate_rho(&self) -> f64 {
        let mut ub = f64::INFINITY;
        let mut lb = f64::NEG_INFINITY;
        let mut nr_free = 0usize;
        let mut sum_free = 0.0;

        for i in 0..self.active_size {
            let yg = f64::from(self.y[i]) * self.grad[i];
            if self.is_upper_bound(i) {
                if self.y[i] < 0 {
                    ub = ub.min(yg);
                } else {
                    lb = lb.max(yg);
                }
            } else if self.is_lower_bound(i) {
                if self.y[i] > 0 {
                    ub = ub.min(yg);
                } else {
                    lb = lb.max(yg);
                }
            } else {
                nr_free += 1;
                sum_free += yg;
            }
        }

        if nr_free > 0 {
            sum_free / nr_free as f64
        } else {
            (ub + lb) / 2.0
        }
    }

    /// Bias and margin scale `(rho, r)` of the nu variant
    fn calculate_rho_nu(&self) -> (f64, f64) {
        let mut ub = [f64::INFINITY; 2];
        let mut lb = [f64::NEG_INFINITY; 2];
        let mut nr_free = [0usize; 2];
        let mut sum_free = [0.0; 2];

        for i in 0..self.active_size {
            let side = usize::from(self.y[i] < 0);
            if self.is_upper_bound(i) {
                lb[side] = lb[side].max(self.grad[i]);
            } else if self.is_lower_bound(i) {
                ub[side] = ub[side].min(self.grad[i]);
            } else {
                nr_free[side] += 1;
                sum_free[side] += self.grad[i];
            }
        }

        let side_value = |side: usize| {
            if nr_free[side] > 0 {
                sum_free[side] / nr_free[side] as f64
            } else {
                (ub[side] + lb[side]) / 2.0
            }
        };
        let r1 = side_value(0);
        let r2 = side_value(1);
        ((r1 - r2) / 2.0, (r1 + r2) / 2.0)
    }

    /// Compute rho and the objective, and write alpha back in the caller's order
    pub(super) fn finish(
        self,
        iterations: usize,
        converged: bool,
        alpha_out: &mut [f64],
    ) -> SolutionInfo {
        let (rho, r) = match self.variant {
            SolverVariant::Standard => (self.calculate_rho(), 0.0),
            SolverVariant::Nu => self.calculate_rho_nu(),
        };

        let objective = (0..self.len)
            .map(|i| self.alpha[i] * (self.grad[i] + self.p[i]))
            .sum::<f64>()
            / 2.0;

        for (position, &original) in self.active_set.iter().enumerate() {
            alpha_out[original] = self.alpha[position];
        }

        debug!(
            "solver finished: obj = {objective}, rho = {rho}, violation = {:.3e}",
            self.violation
        );

        SolutionInfo {
            objective,
            rho,
            upper_bound_p: self.cp,
            upper_bound_n: self.cn,
            r,
            iterations,
            converged,
            violation: self.violation,
        }
    }
}

/// Replace non-positive curvature by a small positive floor
fn curvature(quad_coef: f64) -> f64 {
    if quad_coef > 0.0 {
        quad_coef
    } else {
        TAU
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{kkt_violation, overlapping};
    use super::*;
    use crate::core::FeatureVector;
    use crate::kernel::{Kernel, LinearKernel, RBFKernel};
    use crate::matrix::SvcKernelMatrix;
    use approx::assert_abs_diff_eq;
    use std::sync::Arc;

    struct ZeroKernel;

    impl Kernel for ZeroKernel {
        fn compute(&self, _x: &FeatureVector, _y: &FeatureVector) -> f64 {
            0.0
        }
    }

    fn rbf_matrix(
        xs: Arc<[FeatureVector]>,
        y: &[i8],
        cache_size: usize,
    ) -> SvcKernelMatrix<RBFKernel> {
        let index = (0..xs.len()).collect();
        SvcKernelMatrix::new(Arc::new(RBFKernel::new(0.8)), xs, index, y.to_vec(), cache_size)
    }

    fn line_matrix<K: Kernel>(kernel: K, a: f64, b: f64) -> SvcKernelMatrix<K> {
        let xs: Arc<[FeatureVector]> =
            vec![FeatureVector::new(vec![a]), FeatureVector::new(vec![b])].into();
        SvcKernelMatrix::new(Arc::new(kernel), xs, vec![0, 1], vec![1, -1], 1024)
    }

    fn full_rows(q: &mut dyn KernelMatrix) -> Vec<Vec<f64>> {
        let n = q.len();
        (0..n)
            .map(|i| {
                let mut row = vec![0.0; n];
                q.get_q(i, n, &mut row);
                row
            })
            .collect()
    }

    #[test]
    fn test_default_max_iterations() {
        assert_eq!(default_max_iterations(10), 10_000_000);
        assert_eq!(default_max_iterations(1_000_000), 100_000_000);
        assert_eq!(default_max_iterations(usize::MAX), usize::MAX);
    }

    #[test]
    fn test_solve_rejects_bad_input() {
        let mut q = line_matrix(LinearKernel::new(), 1.0, -1.0);
        let config = SolverConfig::default();
        let standard = SolverVariant::Standard;
        let p = [-1.0, -1.0];

        let mut alpha = vec![0.0; 2];
        let result = solve(standard, &mut q, &p[..1], &[1, -1], &mut alpha, 1.0, 1.0, &config);
        assert!(matches!(
            result,
            Err(SVMError::DimensionMismatch {
                expected: 2,
                actual: 1
            })
        ));

        let result = solve(standard, &mut q, &p, &[1, 0], &mut alpha, 1.0, 1.0, &config);
        assert!(matches!(result, Err(SVMError::InvalidLabel(_))));

        let result = solve(standard, &mut q, &p, &[1, -1], &mut alpha, 0.0, 1.0, &config);
        assert!(matches!(result, Err(SVMError::InvalidParameter(_))));

        let mut outside = vec![2.0, 0.0];
        let result = solve(standard, &mut q, &p, &[1, -1], &mut outside, 1.0, 1.0, &config);
        assert!(matches!(result, Err(SVMError::InvalidParameter(_))));
    }

    #[test]
    fn test_two_point_problem_is_solved_in_one_step() {
        let mut q = line_matrix(LinearKernel::new(), 1.0, -1.0);
        let mut alpha = vec![0.0; 2];

        let info = solve(
            SolverVariant::Standard,
            &mut q,
            &[-1.0, -1.0],
            &[1, -1],
            &mut alpha,
            10.0,
            10.0,
            &SolverConfig::default(),
        )
        .expect("Should solve");

        assert!(info.converged);
        assert_eq!(info.iterations, 1);
        assert_abs_diff_eq!(alpha[0], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(alpha[1], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(info.rho, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(info.objective, -0.5, epsilon = 1e-12);
        assert_eq!(info.upper_bound_p, 10.0);
        assert_eq!(info.upper_bound_n, 10.0);
    }

    #[test]
    fn test_solution_satisfies_kkt_and_box() {
        let (xs, y) = overlapping(60, 11);
        let p = vec![-1.0; y.len()];
        let c = 1.0;
        let mut alpha = vec![0.0; y.len()];
        let mut q = rbf_matrix(Arc::clone(&xs), &y, 1 << 20);
        let config = SolverConfig::default();

        let info = solve(SolverVariant::Standard, &mut q, &p, &y, &mut alpha, c, c, &config)
            .expect("Should solve");
        assert!(info.converged);
        assert!(info.violation < config.eps);

        for &a in &alpha {
            assert!((0.0..=c).contains(&a));
        }
        let balance: f64 = y.iter().zip(alpha.iter()).map(|(&s, &a)| f64::from(s) * a).sum();
        assert_abs_diff_eq!(balance, 0.0, epsilon = 1e-9);

        // Rows in the caller's order, from an unpermuted matrix
        let mut fresh = rbf_matrix(xs, &y, 1 << 20);
        let rows = full_rows(&mut fresh);
        assert!(kkt_violation(&rows, &p, &y, &alpha, c) < config.eps + 1e-9);
    }

    #[test]
    fn test_shrinking_reaches_the_same_optimum() {
        let (xs, y) = overlapping(80, 5);
        let p = vec![-1.0; y.len()];

        let solve_with = |shrinking: bool| {
            let mut alpha = vec![0.0; y.len()];
            let mut q = rbf_matrix(Arc::clone(&xs), &y, 1 << 20);
            let config = SolverConfig {
                shrinking,
                ..SolverConfig::default()
            };
            let info = solve(SolverVariant::Standard, &mut q, &p, &y, &mut alpha, 0.5, 0.5, &config)
                .expect("Should solve");
            (info, alpha)
        };

        let (with, _) = solve_with(true);
        let (without, _) = solve_with(false);
        assert!(with.converged && without.converged);
        assert_abs_diff_eq!(with.objective, without.objective, epsilon = 1e-3);
        assert_abs_diff_eq!(with.rho, without.rho, epsilon = 1e-2);
    }

    #[test]
    fn test_degenerate_kernel_uses_curvature_floor() {
        let mut q = line_matrix(ZeroKernel, 1.0, 2.0);
        let mut alpha = vec![0.0; 2];

        let info = solve(
            SolverVariant::Standard,
            &mut q,
            &[-1.0, -1.0],
            &[1, -1],
            &mut alpha,
            1.0,
            1.0,
            &SolverConfig::default(),
        )
        .expect("Should solve");

        assert!(info.converged);
        assert_eq!(alpha, vec![1.0, 1.0]);
        assert!(info.rho.is_finite());
        assert!(info.objective.is_finite());
    }

    #[test]
    fn test_iteration_cap_reports_non_convergence() {
        let (xs, y) = overlapping(40, 3);
        let p = vec![-1.0; y.len()];
        let mut alpha = vec![0.0; y.len()];
        let mut q = rbf_matrix(xs, &y, 1 << 20);
        let config = SolverConfig {
            max_iterations: Some(2),
            ..SolverConfig::default()
        };

        let info = solve(SolverVariant::Standard, &mut q, &p, &y, &mut alpha, 1.0, 1.0, &config)
            .expect("Should return a best-effort solution");

        assert!(!info.converged);
        assert_eq!(info.iterations, 2);
        assert!(info.violation >= config.eps);
        assert!(alpha.iter().all(|&a| (0.0..=1.0).contains(&a)));
    }

    #[test]
    fn test_nu_variant_keeps_both_sums() {
        let (xs, y) = overlapping(40, 9);
        let n = y.len();
        let p = vec![0.0; n];
        // Feasible start: half of the budget on each class
        let per_class = n as f64 * 0.3 / 2.0;
        let mut alpha = vec![0.0; n];
        let mut remaining = [per_class; 2];
        for (a, &s) in alpha.iter_mut().zip(y.iter()) {
            let side = usize::from(s < 0);
            *a = remaining[side].min(1.0);
            remaining[side] -= *a;
        }
        let sums = |alpha: &[f64]| {
            let mut sums = [0.0; 2];
            for (&a, &s) in alpha.iter().zip(y.iter()) {
                sums[usize::from(s < 0)] += a;
            }
            sums
        };
        let before = sums(&alpha);

        let mut q = rbf_matrix(xs, &y, 1 << 20);
        let config = SolverConfig::default();
        let info = solve(SolverVariant::Nu, &mut q, &p, &y, &mut alpha, 1.0, 1.0, &config)
            .expect("Should solve");

        assert!(info.converged);
        let after = sums(&alpha);
        assert_abs_diff_eq!(before[0], after[0], epsilon = 1e-9);
        assert_abs_diff_eq!(before[1], after[1], epsilon = 1e-9);
        assert!(info.r > 0.0);
        assert!(alpha.iter().all(|&a| (0.0..=1.0).contains(&a)));
    }

    #[test]
    fn test_tiny_cache_gives_identical_solution() {
        let (xs, y) = overlapping(50, 21);
        let p = vec![-1.0; y.len()];

        let run = |cache_size: usize| {
            let mut alpha = vec![0.0; y.len()];
            let mut q = rbf_matrix(Arc::clone(&xs), &y, cache_size);
            let config = SolverConfig::default();
            solve(SolverVariant::Standard, &mut q, &p, &y, &mut alpha, 1.0, 1.0, &config)
                .expect("Should solve");
            alpha
        };

        let large = run(1 << 24);
        let tiny = run(1);
        for (a, b) in large.iter().zip(tiny.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-6);
        }
    }
}
