//! Gaussian kernel K(x, y) = exp(-γ·||x - y||²)
//!
//! The device evaluates the expanded form
//! `exp(-γ * (||x||² + ||y||² - 2·x^T·y))` with both squared norms served
//! from the self-dot cache, see [`Kernel::compute_with_aux`].

use crate::core::SparseVector;
use crate::kernel::linear::dot_product_sparse;
use crate::kernel::merge::union;
use crate::kernel::{AuxKind, Kernel};

#[derive(Debug, Clone, Copy)]
pub struct RbfKernel {
    gamma: f32,
}

impl RbfKernel {
    /// # Panics
    /// Panics if gamma is not positive
    pub fn new(gamma: f32) -> Self {
        assert!(gamma > 0.0, "RBF gamma must be positive, got {gamma}");
        Self { gamma }
    }

    pub fn gamma(&self) -> f32 {
        self.gamma
    }
}

impl Default for RbfKernel {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl Kernel for RbfKernel {
    fn compute(&self, x: &SparseVector, y: &SparseVector) -> f32 {
        (-self.gamma * squared_distance(x, y)).exp()
    }

    fn aux_kind(&self) -> AuxKind {
        AuxKind::SelfDot
    }

    fn compute_with_aux(&self, x: &SparseVector, y: &SparseVector, x_aux: f32, y_aux: f32) -> f32 {
        let distance = x_aux + y_aux - 2.0 * dot_product_sparse(x, y);
        (-self.gamma * distance).exp()
    }

    fn self_product(&self, _x: &SparseVector) -> f32 {
        // ||x - x||² vanishes, exp(0) == 1
        1.0
    }
}

/// ||x - y||² summed over the union of nonzeros
fn squared_distance(x: &SparseVector, y: &SparseVector) -> f32 {
    union(x, y).map(|(a, b)| (a - b) * (a - b)).sum()
}
