//! Quadratic term for classification and one-class problems

use super::{KernelMatrix, KernelRows};
use crate::cache::CacheStats;
use crate::core::FeatureVector;
use crate::kernel::Kernel;
use std::sync::Arc;

/// `Q[i][j] = y_i * y_j * k(x_i, x_j)`
pub struct SvcKernelMatrix<K: Kernel> {
    rows: KernelRows<K>,
    y: Vec<i8>,
    qd: Vec<f64>,
}

impl<K: Kernel> SvcKernelMatrix<K> {
    /// Build the matrix over `xs[index[p]]` with label signs `y[p]`
    pub fn new(
        kernel: Arc<K>,
        xs: Arc<[FeatureVector]>,
        index: Vec<usize>,
        y: Vec<i8>,
        cache_size: usize,
    ) -> Self {
        debug_assert_eq!(index.len(), y.len());
        let rows = KernelRows::new(kernel, xs, index, cache_size);
        let qd = (0..rows.len()).map(|i| rows.evaluate(i, i)).collect();
        Self { rows, y, qd }
    }

    /// Matrix for one-class problems: every sign is `+1`
    pub fn one_class(
        kernel: Arc<K>,
        xs: Arc<[FeatureVector]>,
        index: Vec<usize>,
        cache_size: usize,
    ) -> Self {
        let y = vec![1; index.len()];
        Self::new(kernel, xs, index, y, cache_size)
    }
}

impl<K: Kernel> KernelMatrix for SvcKernelMatrix<K> {
    fn len(&self) -> usize {
        self.y.len()
    }

    fn get_q(&mut self, i: usize, len: usize, out: &mut [f64]) {
        let y = &self.y;
        let yi = f64::from(y[i]);
        let row = self.rows.row(i, len, |j, k| yi * f64::from(y[j]) * k);
        out[..len].copy_from_slice(row);
    }

    fn get_qd(&self) -> &[f64] {
        &self.qd
    }

    fn swap_index(&mut self, i: usize, j: usize) {
        self.rows.swap_index(i, j);
        self.y.swap(i, j);
        self.qd.swap(i, j);
    }

    fn cache_stats(&self) -> CacheStats {
        self.rows.cache().stats()
    }
}
