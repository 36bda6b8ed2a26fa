//! Chi-square kernel family
//!
//! Intended for histogram data: every vector is expected to hold
//! non-negative values summing to 1. None of the kernels here check this;
//! violating inputs produce wrong values, not errors.
//!
//! - [`NormChiSquaredKernel`]: K(x, y) = Σᵢ xᵢyᵢ / (xᵢ + yᵢ)
//! - [`ChiSquaredKernel`]: K(x, y) = 1 - 2·χ²(x, y)
//!
//! where χ²(x, y) = Σᵢ (xᵢ - yᵢ)² / (xᵢ + yᵢ) over the union of nonzeros.
//! For non-negative inputs χ² = Σx + Σy - 4·Σ xᵢyᵢ/(xᵢ+yᵢ), which is the
//! form the device evaluates with the self-sum cache.
//!
//! The bare `Σ xᵢyᵢ / (xᵢ + yᵢ)` similarity is the normalized variant only;
//! the plain chi-square kernel is always the `1 - 2·χ²` form.

use crate::core::SparseVector;
use crate::kernel::merge::{shared, union};
use crate::kernel::{AuxKind, Kernel};

/// Normalized chi-square kernel, parameter free
#[derive(Debug, Clone, Copy, Default)]
pub struct NormChiSquaredKernel;

impl NormChiSquaredKernel {
    pub fn new() -> Self {
        Self
    }
}

impl Kernel for NormChiSquaredKernel {
    fn compute(&self, x: &SparseVector, y: &SparseVector) -> f32 {
        chi_square_similarity(x, y)
    }
}

/// Chi-square kernel `1 - 2·χ²(x, y)`
#[derive(Debug, Clone, Copy, Default)]
pub struct ChiSquaredKernel;

impl ChiSquaredKernel {
    pub fn new() -> Self {
        Self
    }
}

impl Kernel for ChiSquaredKernel {
    fn compute(&self, x: &SparseVector, y: &SparseVector) -> f32 {
        1.0 - 2.0 * chi_square_distance(x, y)
    }

    fn aux_kind(&self) -> AuxKind {
        AuxKind::SelfSum
    }

    fn compute_with_aux(&self, x: &SparseVector, y: &SparseVector, x_aux: f32, y_aux: f32) -> f32 {
        let distance = x_aux + y_aux - 4.0 * chi_square_similarity(x, y);
        1.0 - 2.0 * distance
    }
}

/// Σᵢ xᵢyᵢ / (xᵢ + yᵢ) over shared indices.
///
/// Indices present in only one vector contribute 0 (the product vanishes);
/// zero denominators are skipped.
pub(crate) fn chi_square_similarity(x: &SparseVector, y: &SparseVector) -> f32 {
    shared(x, y)
        .filter(|(a, b)| a + b != 0.0)
        .map(|(a, b)| a * b / (a + b))
        .sum()
}

/// χ²(x, y) = Σᵢ (xᵢ - yᵢ)² / (xᵢ + yᵢ) for xᵢ + yᵢ ≠ 0
pub(crate) fn chi_square_distance(x: &SparseVector, y: &SparseVector) -> f32 {
    union(x, y)
        .filter(|(a, b)| a + b != 0.0)
        .map(|(a, b)| (a - b) * (a - b) / (a + b))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn hist_a() -> SparseVector {
        SparseVector::new(vec![1, 2], vec![0.6, 0.4])
    }

    fn hist_b() -> SparseVector {
        SparseVector::new(vec![1, 3], vec![0.5, 0.5])
    }

    #[test]
    fn test_plain_and_normalized_variants_differ() {
        let (a, b) = (hist_a(), hist_b());
        // χ² = 0.01/1.1 + 0.4 + 0.5
        let chi2 = 0.01 / 1.1 + 0.9;

        assert_relative_eq!(ChiSquaredKernel.compute(&a, &b), 1.0 - 2.0 * chi2, epsilon = 1e-5);
        assert_relative_eq!(NormChiSquaredKernel.compute(&a, &b), 0.3 / 1.1, epsilon = 1e-6);
        assert!((ChiSquaredKernel.compute(&a, &b) - NormChiSquaredKernel.compute(&a, &b)).abs() > 0.5);
    }

    #[test]
    fn test_norm_chi_square_reference_pair() {
        // only index 1 is shared: 0.6*0.5 / 1.1
        let expected = 0.3 / 1.1;
        assert_relative_eq!(
            NormChiSquaredKernel.compute(&hist_a(), &hist_b()),
            expected,
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_norm_chi_square_identical_histogram() {
        // Σ x²/2x = Σx/2 = 0.5 for a normalized histogram
        let a = hist_a();
        assert_relative_eq!(NormChiSquaredKernel.compute(&a, &a), 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_chi_square_distance_computation() {
        let x = SparseVector::new(vec![0, 1, 2], vec![10.0, 20.0, 30.0]);
        let y = SparseVector::new(vec![0, 1, 2], vec![15.0, 10.0, 35.0]);

        let expected = 1.0 + 10.0 / 3.0 + 5.0 / 13.0;
        assert_relative_eq!(chi_square_distance(&x, &y), expected, epsilon = 1e-5);
    }

    #[test]
    fn test_chi_square_distance_disjoint() {
        let x = SparseVector::new(vec![0, 1], vec![10.0, 20.0]);
        let y = SparseVector::new(vec![2, 3], vec![15.0, 25.0]);

        assert_relative_eq!(chi_square_distance(&x, &y), 70.0, epsilon = 1e-5);
        assert_eq!(chi_square_similarity(&x, &y), 0.0);
    }

    #[test]
    fn test_chi_square_kernel_identical_is_one() {
        let a = hist_a();
        assert_relative_eq!(ChiSquaredKernel.compute(&a, &a), 1.0, epsilon = 1e-6);
        assert_relative_eq!(ChiSquaredKernel.self_product(&a), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_chi_square_aux_form_matches_direct() {
        let (a, b) = (hist_a(), hist_b());
        let direct = ChiSquaredKernel.compute(&a, &b);
        let with_aux = ChiSquaredKernel.compute_with_aux(&a, &b, a.sum(), b.sum());
        assert_relative_eq!(direct, with_aux, epsilon = 1e-5);
    }

    #[test]
    fn test_zero_denominator_is_skipped() {
        let zeros = SparseVector::new(vec![0, 1], vec![0.0, 0.0]);
        assert_eq!(chi_square_similarity(&zeros, &zeros), 0.0);
        assert_eq!(chi_square_distance(&zeros, &zeros), 0.0);
        assert!(NormChiSquaredKernel.compute(&zeros, &zeros).is_finite());
        assert_eq!(ChiSquaredKernel.compute(&zeros, &zeros), 1.0);
    }

    #[test]
    fn test_chi_square_symmetry() {
        let (a, b) = (hist_a(), hist_b());
        assert_eq!(
            NormChiSquaredKernel.compute(&a, &b),
            NormChiSquaredKernel.compute(&b, &a)
        );
        assert_eq!(
            ChiSquaredKernel.compute(&a, &b),
            ChiSquaredKernel.compute(&b, &a)
        );
    }

    #[test]
    fn test_empty_vectors() {
        let empty = SparseVector::empty();
        assert_eq!(chi_square_distance(&empty, &empty), 0.0);
        assert_eq!(chi_square_similarity(&empty, &empty), 0.0);
    }
}
