//! Device entry points, one per kernel family and layout
//!
//! Every entry point shares the layout slots `values, col_idx, vec_length,
//! slice_start`, followed by the per-vector self cache when the family needs
//! one, the query buffers and the layout sizes. SERTILP entry points take the
//! prefetch size after `align`; per-query and kernel scalars come last.
//!
//! Argument byte sizes are checked at compile time.

use crate::device::params::{params_byte_size, KernelSignature, ParamKind};
use crate::format::Format;
use crate::kernel::KernelSpec;

/// Kernel formula family evaluated by an entry point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Linear,
    Rbf,
    ChiSquared,
    NormChiSquared,
    ExpChiSquared,
}

impl Family {
    pub fn of(kernel: &KernelSpec) -> Self {
        match kernel {
            KernelSpec::Linear => Family::Linear,
            KernelSpec::Rbf { .. } => Family::Rbf,
            KernelSpec::ChiSquared => Family::ChiSquared,
            KernelSpec::NormChiSquared => Family::NormChiSquared,
            KernelSpec::ExpChiSquared { .. } => Family::ExpChiSquared,
        }
    }
}

/// A named entry point together with what it computes
#[derive(Debug)]
pub struct EntryPoint {
    pub family: Family,
    pub format: Format,
    pub signature: &'static KernelSignature,
}

macro_rules! entry_point {
    ($ident:ident = $name:literal, bytes = $size:expr, [$($slot:literal: $kind:ident),* $(,)?]) => {
        pub static $ident: KernelSignature = KernelSignature {
            name: $name,
            params: &[$(($slot, ParamKind::$kind)),*],
        };
        const _: () = assert!(params_byte_size(&[$(($slot, ParamKind::$kind)),*]) == $size);
    };
}

entry_point!(LINEAR_SLELL = "linearSlEll", bytes = 64, [
    "values": Ptr, "col_idx": Ptr, "vec_length": Ptr, "slice_start": Ptr,
    "main_vector": Ptr, "output": Ptr,
    "n": Int, "threads_per_row": Int, "slice_size": Int, "align": Int,
]);

entry_point!(LINEAR_SERTILP = "linearSERTILP", bytes = 68, [
    "values": Ptr, "col_idx": Ptr, "vec_length": Ptr, "slice_start": Ptr,
    "main_vector": Ptr, "output": Ptr,
    "n": Int, "threads_per_row": Int, "slice_size": Int, "align": Int, "prefetch": Int,
]);

entry_point!(RBF_SLELL = "rbfSlEll", bytes = 80, [
    "values": Ptr, "col_idx": Ptr, "vec_length": Ptr, "slice_start": Ptr, "self_aux": Ptr,
    "main_vector": Ptr, "output": Ptr,
    "n": Int, "threads_per_row": Int, "slice_size": Int, "align": Int,
    "main_aux": Float, "gamma": Float,
]);

entry_point!(RBF_SERTILP = "rbfSERTILP", bytes = 84, [
    "values": Ptr, "col_idx": Ptr, "vec_length": Ptr, "slice_start": Ptr, "self_aux": Ptr,
    "main_vector": Ptr, "output": Ptr,
    "n": Int, "threads_per_row": Int, "slice_size": Int, "align": Int, "prefetch": Int,
    "main_aux": Float, "gamma": Float,
]);

entry_point!(CHI2_SLELL = "chi2SlEll", bytes = 76, [
    "values": Ptr, "col_idx": Ptr, "vec_length": Ptr, "slice_start": Ptr, "self_aux": Ptr,
    "main_vector": Ptr, "output": Ptr,
    "n": Int, "threads_per_row": Int, "slice_size": Int, "align": Int,
    "main_aux": Float,
]);

entry_point!(CHI2_SERTILP = "chi2SERTILP", bytes = 80, [
    "values": Ptr, "col_idx": Ptr, "vec_length": Ptr, "slice_start": Ptr, "self_aux": Ptr,
    "main_vector": Ptr, "output": Ptr,
    "n": Int, "threads_per_row": Int, "slice_size": Int, "align": Int, "prefetch": Int,
    "main_aux": Float,
]);

entry_point!(NCHI2_SLELL = "nChi2SlEll", bytes = 64, [
    "values": Ptr, "col_idx": Ptr, "vec_length": Ptr, "slice_start": Ptr,
    "main_vector": Ptr, "output": Ptr,
    "n": Int, "threads_per_row": Int, "slice_size": Int, "align": Int,
]);

entry_point!(NCHI2_SERTILP = "nChi2SERTILP", bytes = 68, [
    "values": Ptr, "col_idx": Ptr, "vec_length": Ptr, "slice_start": Ptr,
    "main_vector": Ptr, "output": Ptr,
    "n": Int, "threads_per_row": Int, "slice_size": Int, "align": Int, "prefetch": Int,
]);

entry_point!(EXPCHI2_SLELL = "expChi2SlEll", bytes = 80, [
    "values": Ptr, "col_idx": Ptr, "vec_length": Ptr, "slice_start": Ptr, "self_aux": Ptr,
    "main_vector": Ptr, "output": Ptr,
    "n": Int, "threads_per_row": Int, "slice_size": Int, "align": Int,
    "main_aux": Float, "gamma": Float,
]);

entry_point!(EXPCHI2_SERTILP = "expChi2SERTILP", bytes = 84, [
    "values": Ptr, "col_idx": Ptr, "vec_length": Ptr, "slice_start": Ptr, "self_aux": Ptr,
    "main_vector": Ptr, "output": Ptr,
    "n": Int, "threads_per_row": Int, "slice_size": Int, "align": Int, "prefetch": Int,
    "main_aux": Float, "gamma": Float,
]);

/// All entry points exported by the kernel module
pub static ENTRY_POINTS: [EntryPoint; 10] = [
    EntryPoint { family: Family::Linear, format: Format::SlicedEllpack, signature: &LINEAR_SLELL },
    EntryPoint { family: Family::Linear, format: Format::Sertilp, signature: &LINEAR_SERTILP },
    EntryPoint { family: Family::Rbf, format: Format::SlicedEllpack, signature: &RBF_SLELL },
    EntryPoint { family: Family::Rbf, format: Format::Sertilp, signature: &RBF_SERTILP },
    EntryPoint { family: Family::ChiSquared, format: Format::SlicedEllpack, signature: &CHI2_SLELL },
    EntryPoint { family: Family::ChiSquared, format: Format::Sertilp, signature: &CHI2_SERTILP },
    EntryPoint { family: Family::NormChiSquared, format: Format::SlicedEllpack, signature: &NCHI2_SLELL },
    EntryPoint { family: Family::NormChiSquared, format: Format::Sertilp, signature: &NCHI2_SERTILP },
    EntryPoint { family: Family::ExpChiSquared, format: Format::SlicedEllpack, signature: &EXPCHI2_SLELL },
    EntryPoint { family: Family::ExpChiSquared, format: Format::Sertilp, signature: &EXPCHI2_SERTILP },
];

/// Entry point evaluating `kernel` over a layout in `format`
pub fn entry_point(kernel: &KernelSpec, format: Format) -> &'static EntryPoint {
    let family = Family::of(kernel);
    let index = match family {
        Family::Linear => 0,
        Family::Rbf => 2,
        Family::ChiSquared => 4,
        Family::NormChiSquared => 6,
        Family::ExpChiSquared => 8,
    } + match format {
        Format::SlicedEllpack => 0,
        Format::Sertilp => 1,
    };
    &ENTRY_POINTS[index]
}

pub fn find(name: &str) -> Option<&'static EntryPoint> {
    ENTRY_POINTS.iter().find(|e| e.signature.name == name)
}
