//! Generalized SMO solver
//!
//! Solves the dual problem shared by every formulation:
//!
//! ```text
//! min_a  0.5 a^T Q a + p^T a
//! s.t.   y^T a = delta,  0 <= a_i <= C_i
//! ```
//!
//! using the second-order working set selection of Fan, Chen and Lin (2005). The nu
//! variant adds the constraint `e^T a = const` and selects pairs within one label class.

pub mod shrinking;
pub mod smo;

pub use self::smo::solve;

use crate::core::SvmConfig;
use crate::matrix::KernelMatrix;
use serde::{Deserialize, Serialize};

/// Floor for the curvature of a working pair
pub(crate) const TAU: f64 = 1e-12;

/// Which equality constraints the dual carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverVariant {
    /// Single constraint `y^T a = delta`
    Standard,
    /// Additionally `e^T a = const`, handled per label class
    Nu,
}

/// Stopping and heuristic settings for one solve
#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// Tolerance on the maximal violating pair
    pub eps: f64,
    pub shrinking: bool,
    /// `None` uses `max(10_000_000, 100 * len)`
    pub max_iterations: Option<usize>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            eps: 0.001,
            shrinking: true,
            max_iterations: None,
        }
    }
}

impl From<&SvmConfig> for SolverConfig {
    fn from(config: &SvmConfig) -> Self {
        Self {
            eps: config.epsilon,
            shrinking: config.shrinking,
            max_iterations: config.max_iterations,
        }
    }
}

/// Outcome of one solve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolutionInfo {
    /// Dual objective value
    pub objective: f64,
    pub rho: f64,
    /// Upper bound of the `y = +1` variables
    pub upper_bound_p: f64,
    /// Upper bound of the `y = -1` variables
    pub upper_bound_n: f64,
    /// Margin scale of the nu variant, zero otherwise
    pub r: f64,
    pub iterations: usize,
    /// False when the iteration cap was hit first
    pub converged: bool,
    /// Maximal violation seen by the last working set selection
    pub violation: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AlphaStatus {
    LowerBound,
    UpperBound,
    Free,
}

/// Working state of one solve
///
/// All per-variable arrays are indexed by position. Positions `[0, active_size)`
/// form the active set; `active_set[pos]` is the caller's index of that variable.
pub(crate) struct Solver<'a> {
    variant: SolverVariant,
    q: &'a mut dyn KernelMatrix,
    len: usize,
    active_size: usize,
    active_set: Vec<usize>,
    y: Vec<i8>,
    p: Vec<f64>,
    alpha: Vec<f64>,
    status: Vec<AlphaStatus>,
    /// Gradient of the objective, exact on the active set
    grad: Vec<f64>,
    /// `grad_bar[i] = sum over upper-bounded j of C_j * Q[i][j]`
    grad_bar: Vec<f64>,
    cp: f64,
    cn: f64,
    eps: f64,
    /// Set once the gradient has been reconstructed after nearing convergence
    unshrink: bool,
    violation: f64,
    /// Row buffers; `q_i` and `q_j` may be held at the same time
    q_i: Vec<f64>,
    q_j: Vec<f64>,
}

impl<'a> Solver<'a> {
    /// Set up the state for a feasible starting point `alpha`
    #[allow(clippy::too_many_arguments)]
    fn new(
        variant: SolverVariant,
        q: &'a mut dyn KernelMatrix,
        p: &[f64],
        y: &[i8],
        alpha: &[f64],
        cp: f64,
        cn: f64,
        eps: f64,
    ) -> Self {
        let len = q.len();
        let mut solver = Self {
            variant,
            q,
            len,
            active_size: len,
            active_set: (0..len).collect(),
            y: y.to_vec(),
            p: p.to_vec(),
            alpha: alpha.to_vec(),
            status: vec![AlphaStatus::LowerBound; len],
            grad: p.to_vec(),
            grad_bar: vec![0.0; len],
            cp,
            cn,
            eps,
            unshrink: false,
            violation: f64::INFINITY,
            q_i: vec![0.0; len],
            q_j: vec![0.0; len],
        };

        for i in 0..len {
            solver.update_alpha_status(i);
        }
        for i in 0..len {
            if solver.is_lower_bound(i) {
                continue;
            }
            solver.q.get_q(i, len, &mut solver.q_i);
            let alpha_i = solver.alpha[i];
            let c_i = solver.c(i);
            let upper = solver.is_upper_bound(i);
            for j in 0..len {
                solver.grad[j] += alpha_i * solver.q_i[j];
                if upper {
                    solver.grad_bar[j] += c_i * solver.q_i[j];
                }
            }
        }

        solver
    }

    fn c(&self, i: usize) -> f64 {
        if self.y[i] > 0 {
            self.cp
        } else {
            self.cn
        }
    }

    fn update_alpha_status(&mut self, i: usize) {
        self.status[i] = if self.alpha[i] >= self.c(i) {
            AlphaStatus::UpperBound
        } else if self.alpha[i] <= 0.0 {
            AlphaStatus::LowerBound
        } else {
            AlphaStatus::Free
        };
    }

    fn is_upper_bound(&self, i: usize) -> bool {
        self.status[i] == AlphaStatus::UpperBound
    }

    fn is_lower_bound(&self, i: usize) -> bool {
        self.status[i] == AlphaStatus::LowerBound
    }

    fn is_free(&self, i: usize) -> bool {
        self.status[i] == AlphaStatus::Free
    }

    /// Exchange two positions in the solver and in the kernel matrix
    fn swap_index(&mut self, i: usize, j: usize) {
        self.q.swap_index(i, j);
        self.y.swap(i, j);
        self.grad.swap(i, j);
        self.status.swap(i, j);
        self.alpha.swap(i, j);
        self.p.swap(i, j);
        self.active_set.swap(i, j);
        self.grad_bar.swap(i, j);
    }
}
