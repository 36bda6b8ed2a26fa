//! Kernel trait definition

use crate::core::SparseVector;

/// Per-vector scalar a kernel needs precomputed for its device formula
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuxKind {
    /// Nothing beyond the vectors themselves
    None,
    /// Squared L2 norm `Σ xᵢ²`
    SelfDot,
    /// Sum of values `Σ xᵢ`
    SelfSum,
}

impl AuxKind {
    /// Compute the scalar for one vector
    pub fn of(self, x: &SparseVector) -> f32 {
        match self {
            AuxKind::None => 0.0,
            AuxKind::SelfDot => x.norm_squared(),
            AuxKind::SelfSum => x.sum(),
        }
    }

    pub fn is_none(self) -> bool {
        self == AuxKind::None
    }
}

/// Kernel function trait
///
/// Implementations are pure and symmetric in their two arguments.
pub trait Kernel: Send + Sync {
    /// Compute kernel value K(x, y)
    fn compute(&self, x: &SparseVector, y: &SparseVector) -> f32;

    /// Which per-vector scalar `compute_with_aux` expects
    fn aux_kind(&self) -> AuxKind {
        AuxKind::None
    }

    /// Compute K(x, y) from precomputed per-vector scalars.
    ///
    /// This is the formula the device entry points evaluate, so host and
    /// device results agree up to summation order.
    fn compute_with_aux(&self, x: &SparseVector, y: &SparseVector, x_aux: f32, y_aux: f32) -> f32 {
        let _ = (x_aux, y_aux);
        self.compute(x, y)
    }

    /// Kernel value of a vector with itself
    fn self_product(&self, x: &SparseVector) -> f32 {
        let aux = self.aux_kind().of(x);
        self.compute_with_aux(x, x, aux, aux)
    }
}
