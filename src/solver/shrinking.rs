//! Shrinking heuristic and gradient reconstruction
//!
//! Variables at a bound whose gradient makes them unable to join the next working
//! pair are moved past `active_size` and skipped by selection and gradient updates.
//! Their gradient goes stale; it is rebuilt from `grad_bar` and the free variables
//! before the final optimality check, and once when the solver first gets within
//! `10 * eps` of the stopping criterion.

use super::{Solver, SolverVariant};
use log::debug;

impl<'a> Solver<'a> {
    pub(super) fn do_shrinking(&mut self) {
        match self.variant {
            SolverVariant::Standard => self.do_shrinking_standard(),
            SolverVariant::Nu => self.do_shrinking_nu(),
        }
    }

    fn do_shrinking_standard(&mut self) {
        // gmax1 = max { -y_i grad_i | i in I_up }, gmax2 = max { y_i grad_i | i in I_low }
        let mut gmax1 = f64::NEG_INFINITY;
        let mut gmax2 = f64::NEG_INFINITY;
        for i in 0..self.active_size {
            let g = self.grad[i];
            if self.y[i] > 0 {
                if !self.is_upper_bound(i) {
                    gmax1 = gmax1.max(-g);
                }
                if !self.is_lower_bound(i) {
                    gmax2 = gmax2.max(g);
                }
            } else {
                if !self.is_upper_bound(i) {
                    gmax2 = gmax2.max(-g);
                }
                if !self.is_lower_bound(i) {
                    gmax1 = gmax1.max(g);
                }
            }
        }

        self.maybe_unshrink(gmax1 + gmax2);
        self.compact(|solver, i| solver.be_shrunk(i, gmax1, gmax2));
    }

    fn do_shrinking_nu(&mut self) {
        // Thresholds per label sign: 1/2 for y = +1, 3/4 for y = -1
        let mut gmax1 = f64::NEG_INFINITY;
        let mut gmax2 = f64::NEG_INFINITY;
        let mut gmax3 = f64::NEG_INFINITY;
        let mut gmax4 = f64::NEG_INFINITY;
        for i in 0..self.active_size {
            let g = self.grad[i];
            if !self.is_upper_bound(i) {
                if self.y[i] > 0 {
                    gmax1 = gmax1.max(-g);
                } else {
                    gmax4 = gmax4.max(-g);
                }
            }
            if !self.is_lower_bound(i) {
                if self.y[i] > 0 {
                    gmax2 = gmax2.max(g);
                } else {
                    gmax3 = gmax3.max(g);
                }
            }
        }

        self.maybe_unshrink((gmax1 + gmax2).max(gmax3 + gmax4));
        self.compact(|solver, i| solver.be_shrunk_nu(i, gmax1, gmax2, gmax3, gmax4));
    }

    /// One-time full reconstruction once the violation gets close to `eps`
    fn maybe_unshrink(&mut self, violation: f64) {
        if !self.unshrink && violation <= self.eps * 10.0 {
            self.unshrink = true;
            self.reconstruct_gradient();
            self.active_size = self.len;
            debug!("unshrinking: gradient reconstructed for all {} variables", self.len);
        }
    }

    /// Move every variable selected by `shrink` past the end of the active set
    fn compact<F>(&mut self, shrink: F)
    where
        F: Fn(&Self, usize) -> bool,
    {
        let before = self.active_size;
        let mut i = 0;
        while i < self.active_size {
            if shrink(&*self, i) {
                self.active_size -= 1;
                while self.active_size > i {
                    if !shrink(&*self, self.active_size) {
                        self.swap_index(i, self.active_size);
                        break;
                    }
                    self.active_size -= 1;
                }
            }
            i += 1;
        }
        if self.active_size < before {
            debug!("shrinking: active set {} -> {}", before, self.active_size);
        }
    }

    fn be_shrunk(&self, i: usize, gmax1: f64, gmax2: f64) -> bool {
        let g = self.grad[i];
        if self.is_upper_bound(i) {
            if self.y[i] > 0 {
                -g > gmax1
            } else {
                -g > gmax2
            }
        } else if self.is_lower_bound(i) {
            if self.y[i] > 0 {
                g > gmax2
            } else {
                g > gmax1
            }
        } else {
            false
        }
    }

    fn be_shrunk_nu(&self, i: usize, gmax1: f64, gmax2: f64, gmax3: f64, gmax4: f64) -> bool {
        let g = self.grad[i];
        if self.is_upper_bound(i) {
            if self.y[i] > 0 {
                -g > gmax1
            } else {
                -g > gmax4
            }
        } else if self.is_lower_bound(i) {
            if self.y[i] > 0 {
                g > gmax2
            } else {
                g > gmax3
            }
        } else {
            false
        }
    }

    /// Rebuild the gradient of every inactive variable
    ///
    /// `grad[j] = grad_bar[j] + p[j] + sum over free i of alpha_i * Q[i][j]`; variables
    /// at the lower bound contribute nothing and those at the upper bound are in `grad_bar`.
    pub(super) fn reconstruct_gradient(&mut self) {
        let active = self.active_size;
        let len = self.len;
        if active == len {
            return;
        }

        for j in active..len {
            self.grad[j] = self.grad_bar[j] + self.p[j];
        }

        let nr_free = (0..active).filter(|&j| self.is_free(j)).count();
        if 2 * nr_free < active {
            debug!("few free variables ({nr_free} of {active}); disabling shrinking may be faster");
        }

        if nr_free * len > 2 * active * (len - active) {
            for i in active..len {
                self.q.get_q(i, active, &mut self.q_i);
                for j in 0..active {
                    if self.is_free(j) {
                        self.grad[i] += self.alpha[j] * self.q_i[j];
                    }
                }
            }
        } else {
            for i in 0..active {
                if !self.is_free(i) {
                    continue;
                }
                self.q.get_q(i, len, &mut self.q_i);
                let alpha_i = self.alpha[i];
                for j in active..len {
                    self.grad[j] += alpha_i * self.q_i[j];
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::overlapping;
    use super::super::{Solver, SolverVariant};
    use crate::kernel::RBFKernel;
    use crate::matrix::{KernelMatrix, SvcKernelMatrix};
    use approx::assert_abs_diff_eq;
    use std::sync::Arc;

    fn matrix(n: usize, seed: u64) -> (SvcKernelMatrix<RBFKernel>, Vec<i8>) {
        let (xs, y) = overlapping(n, seed);
        let q = SvcKernelMatrix::new(
            Arc::new(RBFKernel::new(0.8)),
            xs,
            (0..n).collect(),
            y.clone(),
            1 << 20,
        );
        (q, y)
    }

    fn snapshot(q: &mut dyn KernelMatrix) -> Vec<Vec<f64>> {
        let n = q.len();
        (0..n)
            .map(|k| {
                let mut row = vec![0.0; n];
                q.get_q(k, n, &mut row);
                row
            })
            .collect()
    }

    /// Exact gradient in position order, by direct summation
    fn direct_gradient(solver: &mut Solver<'_>) -> Vec<f64> {
        let n = solver.len;
        let mut row = vec![0.0; n];
        (0..n)
            .map(|k| {
                solver.q.get_q(k, n, &mut row);
                solver.p[k] + (0..n).map(|j| row[j] * solver.alpha[j]).sum::<f64>()
            })
            .collect()
    }

    #[test]
    fn test_reconstructed_gradient_matches_direct_sum() {
        let (mut q, y) = matrix(40, 17);
        let n = y.len();
        let p = vec![-1.0; n];
        let alpha = vec![0.0; n];
        let mut solver =
            Solver::new(SolverVariant::Standard, &mut q, &p, &y, &alpha, 0.5, 0.5, 1e-3);

        for _ in 0..15 {
            if let Some((i, j)) = solver.select_working_set() {
                solver.update(i, j);
            }
        }

        // Shrink a few bound variables by hand
        let mut shrunk = 0;
        let mut i = 0;
        while i < solver.active_size && shrunk < 5 {
            if solver.is_free(i) {
                i += 1;
            } else {
                solver.active_size -= 1;
                let last = solver.active_size;
                solver.swap_index(i, last);
                shrunk += 1;
            }
        }
        assert!(shrunk > 0);

        // Keep optimizing on the reduced set; shrunk gradients go stale
        for _ in 0..15 {
            if let Some((i, j)) = solver.select_working_set() {
                solver.update(i, j);
            }
        }

        solver.reconstruct_gradient();
        solver.active_size = solver.len;

        let reconstructed = solver.grad.clone();
        let direct = direct_gradient(&mut solver);
        for (a, b) in reconstructed.iter().zip(direct.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_shrinking_only_removes_bound_variables() {
        let (mut q, y) = matrix(60, 4);
        let n = y.len();
        let p = vec![-1.0; n];
        let alpha = vec![0.0; n];
        let mut solver =
            Solver::new(SolverVariant::Standard, &mut q, &p, &y, &alpha, 0.3, 0.3, 1e-3);

        for _ in 0..40 {
            if let Some((i, j)) = solver.select_working_set() {
                solver.update(i, j);
            }
        }
        solver.do_shrinking();

        for k in solver.active_size..solver.len {
            assert!(!solver.is_free(k));
        }
        let mut seen: Vec<usize> = solver.active_set.clone();
        seen.sort_unstable();
        assert_eq!(seen, (0..n).collect::<Vec<_>>());
    }

    #[test]
    fn test_solver_swap_twice_is_identity() {
        let (mut q, y) = matrix(12, 8);
        let n = y.len();
        let p = vec![-1.0; n];
        let alpha = vec![0.0; n];
        let mut solver =
            Solver::new(SolverVariant::Standard, &mut q, &p, &y, &alpha, 1.0, 1.0, 1e-3);
        for _ in 0..5 {
            if let Some((i, j)) = solver.select_working_set() {
                solver.update(i, j);
            }
        }

        let grad = solver.grad.clone();
        let alpha = solver.alpha.clone();
        let rows = snapshot(&mut *solver.q);
        let qd = solver.q.get_qd().to_vec();

        solver.swap_index(2, 9);
        solver.swap_index(2, 9);

        assert_eq!(solver.grad, grad);
        assert_eq!(solver.alpha, alpha);
        assert_eq!(solver.q.get_qd(), qd.as_slice());
        assert_eq!(snapshot(&mut *solver.q), rows);
    }

    #[test]
    fn test_nu_shrinking_only_removes_bound_variables() {
        let (mut q, y) = matrix(40, 12);
        let n = y.len();
        let p = vec![0.0; n];
        let mut alpha = vec![0.0; n];
        // Four variables of each class at the upper bound
        for a in alpha.iter_mut().take(8) {
            *a = 1.0;
        }
        let mut solver = Solver::new(SolverVariant::Nu, &mut q, &p, &y, &alpha, 1.0, 1.0, 1e-3);

        for _ in 0..20 {
            if let Some((i, j)) = solver.select_working_set() {
                solver.update(i, j);
            }
        }
        solver.do_shrinking();

        for k in solver.active_size..solver.len {
            assert!(!solver.is_free(k));
        }
    }
}
