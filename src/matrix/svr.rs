//! Quadratic term for the regression dual
//!
//! The epsilon-insensitive dual has two variables per instance. Position `p < l`
//! is the `+1` copy of instance `p` and position `p + l` the `-1` copy, so
//! `Q[p][q] = s_p * s_q * k(x_p mod l, x_q mod l)`. Kernel rows are cached once
//! per instance; virtual rows are derived from them by sign flips.

use super::{KernelMatrix, KernelRows};
use crate::cache::CacheStats;
use crate::core::FeatureVector;
use crate::kernel::Kernel;
use std::sync::Arc;

pub struct SvrKernelMatrix<K: Kernel> {
    rows: KernelRows<K>,
    /// Sign of each virtual position
    sign: Vec<i8>,
    /// Instance of each virtual position
    real: Vec<usize>,
    qd: Vec<f64>,
}

impl<K: Kernel> SvrKernelMatrix<K> {
    /// Build the `2l` variable matrix over `xs[index[p]]`
    pub fn new(
        kernel: Arc<K>,
        xs: Arc<[FeatureVector]>,
        index: Vec<usize>,
        cache_size: usize,
    ) -> Self {
        let l = index.len();
        let rows = KernelRows::new(kernel, xs, index, cache_size);

        let sign = (0..2 * l).map(|k| if k < l { 1 } else { -1 }).collect();
        let real: Vec<usize> = (0..2 * l).map(|k| k % l).collect();
        let diagonal: Vec<f64> = (0..l).map(|k| rows.evaluate(k, k)).collect();
        let qd = real.iter().map(|&k| diagonal[k]).collect();

        Self {
            rows,
            sign,
            real,
            qd,
        }
    }
}

impl<K: Kernel> KernelMatrix for SvrKernelMatrix<K> {
    fn len(&self) -> usize {
        self.sign.len()
    }

    fn get_q(&mut self, i: usize, len: usize, out: &mut [f64]) {
        let l = self.rows.len();
        let row = self.rows.row(self.real[i], l, |_, k| k);
        let si = f64::from(self.sign[i]);
        for (j, slot) in out.iter_mut().enumerate().take(len) {
            *slot = si * f64::from(self.sign[j]) * row[self.real[j]];
        }
    }

    fn get_qd(&self) -> &[f64] {
        &self.qd
    }

    fn swap_index(&mut self, i: usize, j: usize) {
        self.sign.swap(i, j);
        self.real.swap(i, j);
        self.qd.swap(i, j);
    }

    fn cache_stats(&self) -> CacheStats {
        self.rows.cache().stats()
    }
}
