//! Core traits for kernel evaluation

use crate::core::{Prediction, Result, SparseVector};

/// Something that turns query vectors into SVM decisions
pub trait Evaluate {
    /// Raw decision value `Σ αᵢ·yᵢ·K(sᵢ, x) - ρ` for one query
    fn decision_value(&mut self, x: &SparseVector) -> Result<f32>;

    /// Predict a single query
    fn predict(&mut self, x: &SparseVector) -> Result<Prediction> {
        self.decision_value(x).map(Prediction::from_decision)
    }

    /// Predict many independent queries, preserving input order
    fn predict_batch(&mut self, xs: &[SparseVector]) -> Result<Vec<Prediction>>;

    /// Get the number of support vectors
    fn n_support_vectors(&self) -> usize;
}
