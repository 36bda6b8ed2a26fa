//! Precomputed per-vector scalars and memoized kernel values
//!
//! - [`SelfCache`]: self-dot or self-sum per vector, built once and handed to
//!   whichever pipeline needs it.
//! - [`DiagonalCache`]: K(x, x) per vector.
//! - [`ProductCache`]: LRU cache for K(i, j) lookups. Kernels are symmetric,
//!   so only K(i, j) with i <= j is stored.

use crate::core::SparseVector;
use crate::kernel::{AuxKind, Kernel};
use lru::LruCache;
use rayon::prelude::*;
use std::num::NonZeroUsize;

/// One auxiliary scalar per vector, in the vectors' original order
#[derive(Debug, Clone, PartialEq)]
pub struct SelfCache {
    kind: AuxKind,
    values: Vec<f32>,
}

impl SelfCache {
    pub fn build(vectors: &[SparseVector], kind: AuxKind) -> Self {
        let values = match kind {
            AuxKind::None => Vec::new(),
            _ => vectors.par_iter().map(|v| kind.of(v)).collect(),
        };
        Self { kind, values }
    }

    pub fn kind(&self) -> AuxKind {
        self.kind
    }

    /// Device-ready array; empty when the kernel needs no auxiliary data
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Scalar for vector `i`, 0 when the kernel needs none
    pub fn get(&self, i: usize) -> f32 {
        self.values.get(i).copied().unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Kernel value of every vector with itself
#[derive(Debug, Clone, PartialEq)]
pub struct DiagonalCache {
    values: Vec<f32>,
}

impl DiagonalCache {
    pub fn build(vectors: &[SparseVector], kernel: &dyn Kernel) -> Self {
        let values = vectors.par_iter().map(|v| kernel.self_product(v)).collect();
        Self { values }
    }

    pub fn get(&self, i: usize) -> Option<f32> {
        self.values.get(i).copied()
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }
}

/// Cache key for kernel values, normalized so that i <= j
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CacheKey {
    i: usize,
    j: usize,
}

impl CacheKey {
    fn new(i: usize, j: usize) -> Self {
        if i <= j {
            Self { i, j }
        } else {
            Self { i: j, j: i }
        }
    }
}

/// LRU cache for pairwise kernel values
pub struct ProductCache {
    cache: LruCache<CacheKey, f32>,
    hits: u64,
    misses: u64,
}

impl ProductCache {
    /// Create a cache holding at most `capacity` entries (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(capacity),
            hits: 0,
            misses: 0,
        }
    }

    pub fn get(&mut self, i: usize, j: usize) -> Option<f32> {
        let key = CacheKey::new(i, j);
        if let Some(&value) = self.cache.get(&key) {
            self.hits += 1;
            Some(value)
        } else {
            self.misses += 1;
            None
        }
    }

    pub fn put(&mut self, i: usize, j: usize, value: f32) {
        self.cache.put(CacheKey::new(i, j), value);
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            capacity: self.cache.cap().get(),
            size: self.cache.len(),
        }
    }

    pub fn clear(&mut self) {
        self.cache.clear();
        self.hits = 0;
        self.misses = 0;
    }
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub capacity: usize,
    pub size: usize,
}
