//! SERTILP transformer
//!
//! Sliced Ellpack where each thread fetches `prefetch_size` nonzeros per
//! step. Nonzero `j` of a row belongs to lane `(j / P) mod T`, prefetch slot
//! `j mod P`, step `j / (T*P)`. Inside a step, prefetch slot `p` of every
//! row and lane of the slice is laid out contiguously before slot `p + 1`.

use crate::core::{Result, SparseVector};
use crate::format::{pack, Format, SlicedLayout};

/// Convert `vectors` into SERTILP arrays
pub fn transform(
    vectors: &[SparseVector],
    threads_per_row: usize,
    slice_size: usize,
    prefetch_size: usize,
) -> Result<SlicedLayout> {
    pack(
        vectors,
        Format::Sertilp,
        threads_per_row,
        slice_size,
        prefetch_size,
    )
}
