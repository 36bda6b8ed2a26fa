//! Exponential chi-square kernel
//!
//! K(x, y) = exp(-γ * χ²(x, y)), χ² as in [`crate::kernel::chi_square`].
//! Inputs are expected to be non-negative; this is not checked.

use crate::core::SparseVector;
use crate::kernel::chi_square::{chi_square_distance, chi_square_similarity};
use crate::kernel::{AuxKind, Kernel};

#[derive(Debug, Clone, Copy)]
pub struct ExpChiSquaredKernel {
    gamma: f32,
}

impl ExpChiSquaredKernel {
    /// # Panics
    /// Panics if gamma is not positive
    pub fn new(gamma: f32) -> Self {
        assert!(gamma > 0.0, "Gamma must be positive, got: {}", gamma);
        Self { gamma }
    }

    pub fn gamma(&self) -> f32 {
        self.gamma
    }
}

impl Kernel for ExpChiSquaredKernel {
    fn compute(&self, x: &SparseVector, y: &SparseVector) -> f32 {
        (-self.gamma * chi_square_distance(x, y)).exp()
    }

    fn aux_kind(&self) -> AuxKind {
        AuxKind::SelfSum
    }

    fn compute_with_aux(&self, x: &SparseVector, y: &SparseVector, x_aux: f32, y_aux: f32) -> f32 {
        let distance = x_aux + y_aux - 4.0 * chi_square_similarity(x, y);
        (-self.gamma * distance).exp()
    }
}
