//! Dataset readers

pub mod libsvm;

pub use self::libsvm::LibSVMDataset;
