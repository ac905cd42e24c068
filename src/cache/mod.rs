//! Kernel row cache
//!
//! Caches (possibly partial) rows of the kernel matrix under a fixed element budget.
//! A row is stored as the prefix `[0, len)` that has been computed so far; callers
//! extend it on demand and the cache evicts least-recently-used rows to make room.

use lru::LruCache;
use std::mem::size_of;

/// LRU cache of kernel matrix rows bounded by a byte budget
pub struct RowCache {
    rows: LruCache<usize, Vec<f64>>,
    /// Budget in elements
    capacity: usize,
    /// Elements still unclaimed
    available: usize,
    /// Number of rows the cache indexes
    len: usize,
    hits: u64,
    misses: u64,
}

impl RowCache {
    /// Create a cache for `len` rows with a budget of `size_bytes`
    ///
    /// The budget is floored at `4 * len` elements so that a full row always fits.
    pub fn new(len: usize, size_bytes: usize) -> Self {
        let capacity = (size_bytes / size_of::<f64>()).max(4 * len);
        Self {
            rows: LruCache::unbounded(),
            capacity,
            available: capacity,
            len,
            hits: 0,
            misses: 0,
        }
    }

    /// Fetch row `index` with at least `length` usable elements
    ///
    /// Returns the row and the number of leading elements that already hold valid
    /// data. The caller fills `[start, length)`; those values stay cached.
    pub fn get_data(&mut self, index: usize, length: usize) -> (&mut [f64], usize) {
        let mut row = self.rows.pop(&index).unwrap_or_default();
        let start = row.len();

        if length > start {
            let more = length - start;
            while self.available < more {
                match self.rows.pop_lru() {
                    Some((_, old)) => self.available += old.len(),
                    None => break,
                }
            }
            row.resize(length, 0.0);
            self.available = self.available.saturating_sub(more);
            self.misses += 1;
        } else {
            self.hits += 1;
        }

        if row.is_empty() {
            return (&mut [], 0);
        }

        let row = self.rows.get_or_insert_mut(index, || row);
        (row.as_mut_slice(), start)
    }

    /// Exchange rows `i` and `j` and the `i`-th and `j`-th element of every cached row
    ///
    /// Rows that reach `min(i, j)` but not `max(i, j)` cannot be fixed up and are evicted.
    pub fn swap_index(&mut self, i: usize, j: usize) {
        if i == j {
            return;
        }
        let (i, j) = if i < j { (i, j) } else { (j, i) };

        let row_i = self.rows.pop(&i);
        let row_j = self.rows.pop(&j);
        if let Some(row) = row_j {
            self.rows.put(i, row);
        }
        if let Some(row) = row_i {
            self.rows.put(j, row);
        }

        let mut stale = Vec::new();
        for (&key, row) in self.rows.iter_mut() {
            if row.len() > i {
                if row.len() > j {
                    row.swap(i, j);
                } else {
                    stale.push(key);
                }
            }
        }
        for key in stale {
            if let Some(row) = self.rows.pop(&key) {
                self.available += row.len();
            }
        }
    }

    /// Number of rows this cache indexes
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Budget in elements
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total number of cached elements
    pub fn used(&self) -> usize {
        self.capacity - self.available
    }

    /// Cached prefix length of row `index` without touching recency
    pub fn cached_len(&self, index: usize) -> usize {
        self.rows.peek(&index).map_or(0, Vec::len)
    }

    /// Get cache hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            capacity: self.capacity,
            used: self.used(),
            rows: self.rows.len(),
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Budget in elements
    pub capacity: usize,
    /// Cached elements
    pub used: usize,
    /// Cached rows
    pub rows: usize,
}
