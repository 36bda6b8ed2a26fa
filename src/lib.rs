//! SVM kernel evaluation over sparse vectors for parallel accelerators
//!
//! Support vectors are packed into Sliced Ellpack or SERTILP layouts and
//! evaluated against query vectors by device entry points, one kernel value
//! per support vector per dispatch. The host reduces those values to the
//! SVM decision `Σ αᵢ·yᵢ·K(sᵢ, x) - ρ`.

pub mod cache;
pub mod core;
pub mod data;
pub mod device;
pub mod evaluator;
pub mod format;
pub mod kernel;

// Re-export main types for convenience
pub use crate::cache::{CacheStats, DiagonalCache, ProductCache, SelfCache};
pub use crate::core::traits::*;
pub use crate::core::types::*;
pub use crate::core::{Result, SVMError};
pub use crate::data::LibSVMDataset;
pub use crate::device::{Accelerator, DeviceKernel, HostAccelerator};
pub use crate::evaluator::{Evaluator, SequentialEvaluator};
pub use crate::format::{Format, SlicedLayout};
pub use crate::kernel::{Kernel, KernelSpec};

// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
