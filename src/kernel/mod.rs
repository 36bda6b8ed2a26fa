//! Kernel functions for SVM

pub mod chi_square;
pub mod exp_chi_square;
pub mod linear;
mod merge;
pub mod rbf;
pub mod spec;
pub mod traits;

pub use self::chi_square::{ChiSquaredKernel, NormChiSquaredKernel};
pub use self::exp_chi_square::ExpChiSquaredKernel;
pub use self::linear::LinearKernel;
pub use self::rbf::RbfKernel;
pub use self::spec::KernelSpec;
pub use self::traits::*;
