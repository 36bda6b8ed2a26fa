//! Linear kernel

use crate::core::SparseVector;
use crate::kernel::merge::shared;
use crate::kernel::Kernel;

/// K(x, y) = Σᵢ xᵢyᵢ over the indices both vectors set
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearKernel;

impl LinearKernel {
    pub fn new() -> Self {
        Self
    }
}

impl Kernel for LinearKernel {
    fn compute(&self, x: &SparseVector, y: &SparseVector) -> f32 {
        dot_product_sparse(x, y)
    }
}

pub(crate) fn dot_product_sparse(x: &SparseVector, y: &SparseVector) -> f32 {
    shared(x, y).map(|(a, b)| a * b).sum()
}
