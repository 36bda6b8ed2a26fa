//! Sliced Ellpack transformer
//!
//! Nonzero `j` of the vector at local row `r` goes to lane `j mod T` of
//! step `j / T`; a step holds one value for every (row, lane) pair of the
//! slice, `S * T` slots, so thread `r*T + lane` of a block reads offset
//! `step * S * T + r*T + lane`.

use crate::core::{Result, SparseVector};
use crate::format::{pack, Format, SlicedLayout};

/// Convert `vectors` into Sliced Ellpack arrays
pub fn transform(
    vectors: &[SparseVector],
    threads_per_row: usize,
    slice_size: usize,
) -> Result<SlicedLayout> {
    pack(
        vectors,
        Format::SlicedEllpack,
        threads_per_row,
        slice_size,
        1,
    )
}
