//! Core type definitions for kernel evaluation

use crate::core::{Result, SVMError};
use crate::format::Format;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Prediction result containing label and decision value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    /// Predicted class label (+1 or -1)
    pub label: f32,
    /// Raw decision function value
    pub decision_value: f32,
}

impl Prediction {
    /// Create a prediction from a decision value; positive values map to +1
    pub fn from_decision(decision_value: f32) -> Self {
        let label = if decision_value > 0.0 { 1.0 } else { -1.0 };
        Self {
            label,
            decision_value,
        }
    }

    /// Get confidence as absolute value of decision value
    pub fn confidence(&self) -> f32 {
        self.decision_value.abs()
    }
}

/// Sparse vector representation with sorted, unique indices
#[derive(Clone, Debug, PartialEq)]
pub struct SparseVector {
    /// Sorted indices of non-zero elements
    pub indices: Vec<usize>,
    /// Values corresponding to indices
    pub values: Vec<f32>,
    min_dim: usize,
}

impl SparseVector {
    /// Create a new sparse vector, ensuring indices are sorted
    ///
    /// # Panics
    /// Panics if the lengths differ or an index appears twice.
    pub fn new(indices: Vec<usize>, values: Vec<f32>) -> Self {
        match Self::try_new(indices, values) {
            Ok(vector) => vector,
            Err(e) => panic!("{e}"),
        }
    }

    /// Fallible constructor used by readers that must not panic on bad input
    pub fn try_new(indices: Vec<usize>, values: Vec<f32>) -> Result<Self> {
        if indices.len() != values.len() {
            return Err(SVMError::InvalidParameter(format!(
                "Indices and values must have same length ({} != {})",
                indices.len(),
                values.len()
            )));
        }

        let mut pairs: Vec<_> = indices.into_iter().zip(values).collect();
        pairs.sort_by_key(|&(idx, _)| idx);

        if let Some(w) = pairs.windows(2).find(|w| w[0].0 == w[1].0) {
            return Err(SVMError::InvalidParameter(format!(
                "Duplicate index {} in sparse vector",
                w[0].0
            )));
        }

        let (indices, values): (Vec<_>, Vec<_>) = pairs.into_iter().unzip();
        Ok(Self {
            indices,
            values,
            min_dim: 0,
        })
    }

    /// Create an empty sparse vector
    pub fn empty() -> Self {
        Self {
            indices: Vec::new(),
            values: Vec::new(),
            min_dim: 0,
        }
    }

    /// Raise the implicit dimension to at least `min_dim`
    pub fn with_dim(mut self, min_dim: usize) -> Self {
        self.min_dim = min_dim;
        self
    }

    /// Dimension set through [`with_dim`](Self::with_dim), if any
    pub fn declared_dim(&self) -> Option<usize> {
        (self.min_dim > 0).then_some(self.min_dim)
    }

    /// Dimension: max observed index + 1, or the caller-supplied minimum
    pub fn dim(&self) -> usize {
        let observed = self.indices.last().map_or(0, |&i| i + 1);
        observed.max(self.min_dim)
    }

    /// Get the value at a specific index (0 if not present)
    pub fn get(&self, index: usize) -> f32 {
        match self.indices.binary_search(&index) {
            Ok(pos) => self.values[pos],
            Err(_) => 0.0,
        }
    }

    /// Iterate over (index, value) pairs in ascending index order
    pub fn iter(&self) -> impl Iterator<Item = (usize, f32)> + '_ {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }

    /// Compute squared L2 norm
    pub fn norm_squared(&self) -> f32 {
        self.values.iter().map(|&v| v * v).sum()
    }

    /// Sum of stored values
    pub fn sum(&self) -> f32 {
        self.values.iter().sum()
    }

    /// Scatter the vector into `dense`, which is assumed zeroed.
    ///
    /// Returns how many entries fell outside `dense` and were dropped.
    pub fn scatter_into(&self, dense: &mut [f32]) -> usize {
        let mut dropped = 0;
        for (idx, value) in self.iter() {
            match dense.get_mut(idx) {
                Some(slot) => *slot = value,
                None => dropped += 1,
            }
        }
        dropped
    }

    /// Number of non-zero elements
    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    /// Check if vector is empty
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Labelled set of sparse vectors, immutable once constructed
#[derive(Clone, Debug)]
pub struct Problem {
    elements: Vec<SparseVector>,
    labels: Vec<f32>,
}

impl Problem {
    pub fn new(elements: Vec<SparseVector>, labels: Vec<f32>) -> Result<Self> {
        if elements.len() != labels.len() {
            return Err(SVMError::InvalidDataset(format!(
                "{} elements but {} labels",
                elements.len(),
                labels.len()
            )));
        }
        Ok(Self { elements, labels })
    }

    pub fn elements(&self) -> &[SparseVector] {
        &self.elements
    }

    pub fn labels(&self) -> &[f32] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Largest dimension over all elements
    pub fn dimension(&self) -> usize {
        self.elements.iter().map(SparseVector::dim).max().unwrap_or(0)
    }
}

/// Output of a training run, read-only during evaluation
#[derive(Clone, Debug)]
pub struct TrainedModel {
    /// Training vectors retained as support vectors
    pub support_elements: Vec<SparseVector>,
    /// Position of each support vector in the training problem
    pub support_indexes: Vec<usize>,
    /// Dual coefficients, one per training element
    pub alpha: Vec<f32>,
    /// Decision threshold
    pub rho: f32,
}

impl TrainedModel {
    pub fn new(
        support_elements: Vec<SparseVector>,
        support_indexes: Vec<usize>,
        alpha: Vec<f32>,
        rho: f32,
    ) -> Result<Self> {
        if support_elements.len() != support_indexes.len() {
            return Err(SVMError::InvalidParameter(format!(
                "{} support elements but {} support indexes",
                support_elements.len(),
                support_indexes.len()
            )));
        }
        if let Some(&index) = support_indexes.iter().find(|&&i| i >= alpha.len()) {
            return Err(SVMError::IndexOutOfRange {
                index,
                len: alpha.len(),
            });
        }
        Ok(Self {
            support_elements,
            support_indexes,
            alpha,
            rho,
        })
    }

    /// Build a model from the support vectors of `problem` selected by `support_indexes`
    pub fn from_problem(
        problem: &Problem,
        support_indexes: Vec<usize>,
        alpha: Vec<f32>,
        rho: f32,
    ) -> Result<Self> {
        let support_elements = support_indexes
            .iter()
            .map(|&i| {
                problem
                    .elements()
                    .get(i)
                    .cloned()
                    .ok_or(SVMError::IndexOutOfRange {
                        index: i,
                        len: problem.len(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(support_elements, support_indexes, alpha, rho)
    }

    pub fn n_support_vectors(&self) -> usize {
        self.support_elements.len()
    }

    /// Largest dimension over the support vectors
    pub fn dimension(&self) -> usize {
        self.support_elements
            .iter()
            .map(SparseVector::dim)
            .max()
            .unwrap_or(0)
    }

    /// Common dimension of the support vectors.
    ///
    /// Vectors that declare a dimension must all declare the same one and
    /// no vector may set an index beyond it. Without declarations this is
    /// [`dimension`](Self::dimension).
    pub fn consistent_dimension(&self) -> Result<usize> {
        let mut declared = self
            .support_elements
            .iter()
            .filter_map(SparseVector::declared_dim);
        let Some(expected) = declared.next() else {
            return Ok(self.dimension());
        };
        if let Some(actual) = declared.find(|&d| d != expected) {
            return Err(SVMError::DimensionMismatch { expected, actual });
        }
        match self.dimension() {
            actual if actual > expected => Err(SVMError::DimensionMismatch { expected, actual }),
            _ => Ok(expected),
        }
    }

    /// `alpha[i] * label[i]` for each support vector, in support-vector order
    pub fn coefficients(&self, labels: &[f32]) -> Result<Vec<f32>> {
        self.support_indexes
            .iter()
            .map(|&i| {
                labels
                    .get(i)
                    .map(|&y| self.alpha[i] * y)
                    .ok_or(SVMError::IndexOutOfRange {
                        index: i,
                        len: labels.len(),
                    })
            })
            .collect()
    }
}

/// Configuration for device-backed evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    /// Device layout of the support vectors
    pub format: Format,
    /// Cooperating device threads per vector row (power of two, at most 32)
    pub threads_per_row: usize,
    /// Vectors per slice
    pub slice_size: usize,
    /// Nonzeros fetched per thread per step (SERTILP only)
    pub prefetch_size: usize,
    /// Upper bound for a single dispatch
    pub dispatch_timeout_ms: Option<u64>,
    /// Entries kept by the indexed product cache
    pub product_cache_entries: usize,
    /// Run batch prediction on the rayon pool
    pub parallel_batch: bool,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            format: Format::SlicedEllpack,
            threads_per_row: 4,
            slice_size: 64,
            prefetch_size: 2,
            dispatch_timeout_ms: None,
            product_cache_entries: 100_000,
            parallel_batch: true,
        }
    }
}

impl EvaluatorConfig {
    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    pub fn with_threads_per_row(mut self, threads_per_row: usize) -> Self {
        self.threads_per_row = threads_per_row;
        self
    }

    pub fn with_slice_size(mut self, slice_size: usize) -> Self {
        self.slice_size = slice_size;
        self
    }

    pub fn with_prefetch_size(mut self, prefetch_size: usize) -> Self {
        self.prefetch_size = prefetch_size;
        self
    }

    pub fn with_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_parallel_batch(mut self, parallel_batch: bool) -> Self {
        self.parallel_batch = parallel_batch;
        self
    }

    pub fn dispatch_timeout(&self) -> Option<Duration> {
        self.dispatch_timeout_ms.map(Duration::from_millis)
    }

    /// Check sizes before any layout is built
    pub fn validate(&self) -> Result<()> {
        if self.threads_per_row == 0
            || self.threads_per_row > 32
            || !self.threads_per_row.is_power_of_two()
        {
            return Err(SVMError::InvalidParameter(format!(
                "threads_per_row must be a power of two in 1..=32, got {}",
                self.threads_per_row
            )));
        }
        if self.slice_size == 0 {
            return Err(SVMError::InvalidParameter(
                "slice_size must be positive".to_string(),
            ));
        }
        if self.format == Format::Sertilp && self.prefetch_size == 0 {
            return Err(SVMError::InvalidParameter(
                "prefetch_size must be positive for SERTILP".to_string(),
            ));
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}
