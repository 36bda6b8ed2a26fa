//! Device layouts for sparse vector sets
//!
//! Both layouts group vectors into slices of `slice_size` consecutive rows.
//! Within a slice every row is served by `threads_per_row` cooperating
//! device threads, and rows are padded to the slice's common width so that
//! neighbouring threads read neighbouring memory. Padding slots carry value
//! 0 and column 0 and are never read: consumers stop at `vec_length`.
//!
//! The flat arrays use the device's native widths (`f32` values, `i32`
//! indices and offsets).

pub mod sertilp;
pub mod sliced_ellpack;

use crate::core::{Result, SVMError, SparseVector};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Device block sizes are rounded up to this many threads
pub const ALIGN_GRANULE: usize = 64;

/// Which slab layout the support vectors are stored in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Format {
    /// Sliced Ellpack: one nonzero per thread per step
    #[default]
    SlicedEllpack,
    /// Sliced Ellpack with thread-interleaved prefetch of `prefetch_size` nonzeros
    Sertilp,
}

impl Format {
    pub fn name(&self) -> &'static str {
        match self {
            Format::SlicedEllpack => "SlEll",
            Format::Sertilp => "SERTILP",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Flat, padded arrays for a set of sparse vectors
#[derive(Debug, Clone, PartialEq)]
pub struct SlicedLayout {
    /// Padded nonzero values, slice after slice
    pub values: Vec<f32>,
    /// Column index of every slot in `values`
    pub col_idx: Vec<i32>,
    /// Offset of each slice; the last entry is the total length
    pub slice_start: Vec<i32>,
    /// True nonzero count per vector
    pub vec_length: Vec<i32>,
    format: Format,
    threads_per_row: usize,
    slice_size: usize,
    prefetch_size: usize,
}

impl SlicedLayout {
    /// Transform `vectors` into the requested layout.
    ///
    /// `prefetch_size` is ignored for [`Format::SlicedEllpack`].
    pub fn build(
        vectors: &[SparseVector],
        format: Format,
        threads_per_row: usize,
        slice_size: usize,
        prefetch_size: usize,
    ) -> Result<Self> {
        match format {
            Format::SlicedEllpack => {
                sliced_ellpack::transform(vectors, threads_per_row, slice_size)
            }
            Format::Sertilp => {
                sertilp::transform(vectors, threads_per_row, slice_size, prefetch_size)
            }
        }
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn threads_per_row(&self) -> usize {
        self.threads_per_row
    }

    pub fn slice_size(&self) -> usize {
        self.slice_size
    }

    /// Nonzeros fetched per thread per step (1 for Sliced Ellpack)
    pub fn prefetch_size(&self) -> usize {
        self.prefetch_size
    }

    pub fn n_vectors(&self) -> usize {
        self.vec_length.len()
    }

    pub fn n_slices(&self) -> usize {
        self.slice_start.len() - 1
    }

    /// Threads per device block rounded up to [`ALIGN_GRANULE`]
    pub fn align(&self) -> usize {
        align_for(self.threads_per_row, self.slice_size)
    }

    /// Flat offset of nonzero `j` of vector `vector`
    pub fn slot(&self, vector: usize, j: usize) -> usize {
        let slice = vector / self.slice_size;
        let row = vector % self.slice_size;
        self.slice_start[slice] as usize
            + placement(
                self.threads_per_row,
                self.slice_size,
                self.prefetch_size,
                row,
                j,
            )
    }

    /// Recover the (index, value) pairs of one vector
    pub fn decode(&self, vector: usize) -> Result<Vec<(usize, f32)>> {
        let len = self.n_vectors();
        let nnz = *self
            .vec_length
            .get(vector)
            .ok_or(SVMError::IndexOutOfRange { index: vector, len })?;

        Ok((0..nnz as usize)
            .map(|j| {
                let slot = self.slot(vector, j);
                (self.col_idx[slot] as usize, self.values[slot])
            })
            .collect())
    }

    pub fn stats(&self) -> LayoutStats {
        LayoutStats {
            vectors: self.n_vectors(),
            slices: self.n_slices(),
            nonzeros: self.vec_length.iter().map(|&l| l as usize).sum(),
            stored: self.values.len(),
        }
    }
}

/// Size summary of a layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutStats {
    pub vectors: usize,
    pub slices: usize,
    pub nonzeros: usize,
    /// Slots including padding
    pub stored: usize,
}

impl LayoutStats {
    /// Fraction of stored slots that are padding
    pub fn padding_ratio(&self) -> f64 {
        if self.stored == 0 {
            0.0
        } else {
            (self.stored - self.nonzeros) as f64 / self.stored as f64
        }
    }
}

/// Threads per block rounded up to a multiple of [`ALIGN_GRANULE`]
pub fn align_for(threads_per_row: usize, slice_size: usize) -> usize {
    (slice_size * threads_per_row).div_ceil(ALIGN_GRANULE) * ALIGN_GRANULE
}

/// Offset of nonzero `j` of local row `row` relative to its slice start.
///
/// Step `k` holds `prefetch` consecutive nonzeros for each of the
/// `threads_per_row` lanes of every row; within a step, prefetch slot `p`
/// of all rows and lanes is contiguous so a warp reads coalesced memory.
/// With `prefetch == 1` this is plain Sliced Ellpack.
pub(crate) fn placement(
    threads_per_row: usize,
    slice_size: usize,
    prefetch: usize,
    row: usize,
    j: usize,
) -> usize {
    let lanes = slice_size * threads_per_row;
    let step = j / (threads_per_row * prefetch);
    let p = j % prefetch;
    let lane = (j / prefetch) % threads_per_row;
    step * lanes * prefetch + p * lanes + row * threads_per_row + lane
}

/// Shared driver for both transformers.
///
/// Each slice is sized `slice_size * threads_per_row * prefetch * steps`
/// where `steps` covers the longest vector in the slice. The last slice is
/// sized for a full `slice_size` rows even if fewer vectors remain.
pub(crate) fn pack(
    vectors: &[SparseVector],
    format: Format,
    threads_per_row: usize,
    slice_size: usize,
    prefetch: usize,
) -> Result<SlicedLayout> {
    if threads_per_row == 0 || slice_size == 0 || prefetch == 0 {
        return Err(SVMError::InvalidParameter(format!(
            "threads_per_row, slice_size and prefetch must be positive, got {threads_per_row}, {slice_size}, {prefetch}"
        )));
    }

    let per_step = threads_per_row * prefetch;
    let mut slice_start = Vec::with_capacity(vectors.len().div_ceil(slice_size) + 1);
    let mut total = 0usize;
    slice_start.push(0);

    for slice in vectors.chunks(slice_size) {
        let max_nnz = slice.iter().map(SparseVector::nnz).max().unwrap_or(0);
        let steps = max_nnz.div_ceil(per_step);
        total += slice_size * per_step * steps;
        slice_start.push(to_i32(total, "slice offset")?);
    }

    let mut values = vec![0.0f32; total];
    let mut col_idx = vec![0i32; total];
    let mut vec_length = Vec::with_capacity(vectors.len());

    for (v, vector) in vectors.iter().enumerate() {
        let base = slice_start[v / slice_size] as usize;
        let row = v % slice_size;
        for (j, (index, value)) in vector.iter().enumerate() {
            let slot = base + placement(threads_per_row, slice_size, prefetch, row, j);
            values[slot] = value;
            col_idx[slot] = to_i32(index, "column index")?;
        }
        vec_length.push(to_i32(vector.nnz(), "vector length")?);
    }

    Ok(SlicedLayout {
        values,
        col_idx,
        slice_start,
        vec_length,
        format,
        threads_per_row,
        slice_size,
        prefetch_size: prefetch,
    })
}

fn to_i32(value: usize, what: &str) -> Result<i32> {
    i32::try_from(value).map_err(|_| {
        SVMError::InvalidParameter(format!("{what} {value} does not fit a 32-bit device integer"))
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Vectors with assorted lengths, including an empty one
    pub(crate) fn ragged_vectors() -> Vec<SparseVector> {
        (0..11)
            .map(|v| {
                let nnz = (v * 7) % 9;
                let indices: Vec<usize> = (0..nnz).map(|k| k * 3 + v).collect();
                let values: Vec<f32> = (0..nnz).map(|k| (v * 10 + k) as f32 + 0.5).collect();
                SparseVector::new(indices, values)
            })
            .collect()
    }

    /// Every slot not reachable through `decode` must be zero padding
    pub(crate) fn assert_padding_is_zero(layout: &SlicedLayout) {
        let mut used = vec![false; layout.values.len()];
        for v in 0..layout.n_vectors() {
            for j in 0..layout.vec_length[v] as usize {
                let slot = layout.slot(v, j);
                assert!(!used[slot], "slot {slot} assigned twice");
                used[slot] = true;
            }
        }
        for (slot, in_use) in used.iter().enumerate() {
            if !in_use {
                assert_eq!(layout.values[slot], 0.0, "padding slot {slot}");
                assert_eq!(layout.col_idx[slot], 0, "padding slot {slot}");
            }
        }
    }

    #[test]
    fn test_align_for() {
        assert_eq!(align_for(4, 64), 256);
        assert_eq!(align_for(2, 2), 64);
        assert_eq!(align_for(4, 17), 128);
    }

    #[test]
    fn test_placement_without_prefetch_is_lane_strided() {
        // T=2, S=2: row 1, nonzeros 0..4
        let offsets: Vec<_> = (0..4).map(|j| placement(2, 2, 1, 1, j)).collect();
        assert_eq!(offsets, vec![2, 3, 6, 7]);
    }

    #[test]
    fn test_layout_stats() {
        let vectors = ragged_vectors();
        let layout = SlicedLayout::build(&vectors, Format::SlicedEllpack, 2, 4, 1).unwrap();
        let stats = layout.stats();

        assert_eq!(stats.vectors, 11);
        assert_eq!(stats.slices, 3);
        assert_eq!(
            stats.nonzeros,
            vectors.iter().map(SparseVector::nnz).sum::<usize>()
        );
        assert!(stats.padding_ratio() > 0.0 && stats.padding_ratio() < 1.0);
    }

    #[test]
    fn test_decode_out_of_range() {
        let layout = SlicedLayout::build(&ragged_vectors(), Format::Sertilp, 2, 4, 2).unwrap();
        assert!(matches!(
            layout.decode(11),
            Err(SVMError::IndexOutOfRange { index: 11, len: 11 })
        ));
    }

    #[test]
    fn test_zero_sizes_rejected() {
        let vectors = ragged_vectors();
        assert!(SlicedLayout::build(&vectors, Format::SlicedEllpack, 0, 4, 1).is_err());
        assert!(SlicedLayout::build(&vectors, Format::SlicedEllpack, 2, 0, 1).is_err());
        assert!(SlicedLayout::build(&vectors, Format::Sertilp, 2, 4, 0).is_err());
    }

    #[test]
    fn test_format_serde_names() {
        assert_eq!(
            serde_json::to_string(&Format::SlicedEllpack).unwrap(),
            "\"sliced-ellpack\""
        );
        assert_eq!(
            serde_json::from_str::<Format>("\"sertilp\"").unwrap(),
            Format::Sertilp
        );
    }
}
