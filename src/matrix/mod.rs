//! On-demand rows of the solver's quadratic term
//!
//! The solver never sees the kernel directly. It asks a [`KernelMatrix`] for rows of
//! `Q`, where `Q[i][j]` is the kernel value scaled by label signs. Rows are computed
//! lazily and kept in a [`RowCache`]; only the part of a row not already cached is
//! evaluated.

pub mod svc;
pub mod svr;

pub use self::svc::SvcKernelMatrix;
pub use self::svr::SvrKernelMatrix;

use crate::cache::{CacheStats, RowCache};
use crate::core::FeatureVector;
use crate::kernel::Kernel;
use std::sync::Arc;

/// Row provider consumed by the solver
pub trait KernelMatrix {
    /// Number of rows (variables of the dual problem)
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write `Q[i][0..len)` into `out[0..len)`
    fn get_q(&mut self, i: usize, len: usize, out: &mut [f64]);

    /// Diagonal of `Q`
    fn get_qd(&self) -> &[f64];

    /// Exchange positions `i` and `j` in every structure indexed by position
    fn swap_index(&mut self, i: usize, j: usize);

    /// Statistics of the underlying row cache
    fn cache_stats(&self) -> CacheStats;
}

/// Kernel evaluation over a permutable view of shared feature vectors
///
/// Position `p` refers to `xs[index[p]]`. The feature vectors are shared with the
/// problem and with every other sub-problem; only the index is owned.
pub struct KernelRows<K: Kernel> {
    kernel: Arc<K>,
    xs: Arc<[FeatureVector]>,
    index: Vec<usize>,
    cache: RowCache,
}

impl<K: Kernel> KernelRows<K> {
    pub fn new(
        kernel: Arc<K>,
        xs: Arc<[FeatureVector]>,
        index: Vec<usize>,
        cache_size: usize,
    ) -> Self {
        let cache = RowCache::new(index.len(), cache_size);
        Self {
            kernel,
            xs,
            index,
            cache,
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Kernel value between positions `i` and `j`
    pub fn evaluate(&self, i: usize, j: usize) -> f64 {
        self.kernel
            .compute(&self.xs[self.index[i]], &self.xs[self.index[j]])
    }

    /// Cached row `i` of length `len`, with missing entries set to `value(j, k(i, j))`
    pub fn row<F>(&mut self, i: usize, len: usize, value: F) -> &[f64]
    where
        F: Fn(usize, f64) -> f64,
    {
        let (data, start) = self.cache.get_data(i, len);
        if start < len {
            let xi = &self.xs[self.index[i]];
            for (j, slot) in data.iter_mut().enumerate().take(len).skip(start) {
                let k = self.kernel.compute(xi, &self.xs[self.index[j]]);
                *slot = value(j, k);
            }
        }
        &data[..len]
    }

    /// Exchange positions `i` and `j` in the view and the cache
    pub fn swap_index(&mut self, i: usize, j: usize) {
        self.cache.swap_index(i, j);
        self.index.swap(i, j);
    }

    pub fn cache(&self) -> &RowCache {
        &self.cache
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Dot-product kernel that counts its evaluations
    #[derive(Default)]
    pub struct CountingKernel {
        pub calls: AtomicUsize,
    }

    impl CountingKernel {
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Kernel for CountingKernel {
        fn compute(&self, x: &FeatureVector, y: &FeatureVector) -> f64 {
            self.calls.fetch_add(1, Ordering::SeqCst);
            x.dot(y)
        }
    }

    pub fn points(values: &[[f64; 2]]) -> Arc<[FeatureVector]> {
        values
            .iter()
            .map(|v| FeatureVector::new(v.to_vec()))
            .collect::<Vec<_>>()
            .into()
    }

    /// Full row through the trait
    pub fn full_row(q: &mut dyn KernelMatrix, i: usize) -> Vec<f64> {
        let mut out = vec![0.0; q.len()];
        let len = q.len();
        q.get_q(i, len, &mut out);
        out
    }
}
