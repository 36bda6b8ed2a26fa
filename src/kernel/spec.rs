//! Kernel variant tags
//!
//! [`KernelSpec`] is plain data: it names a kernel family and its
//! parameters. Host kernels and device entry points are both selected from
//! it, so the two sides cannot disagree about which formula is in use.

use crate::core::{Result, SVMError};
use crate::kernel::{
    AuxKind, ChiSquaredKernel, ExpChiSquaredKernel, Kernel, LinearKernel, NormChiSquaredKernel,
    RbfKernel,
};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KernelSpec {
    Linear,
    Rbf { gamma: f32 },
    ChiSquared,
    NormChiSquared,
    ExpChiSquared { gamma: f32 },
}

impl KernelSpec {
    /// Short stable name, also the prefix of the device entry points
    pub fn name(&self) -> &'static str {
        match self {
            KernelSpec::Linear => "linear",
            KernelSpec::Rbf { .. } => "rbf",
            KernelSpec::ChiSquared => "chi2",
            KernelSpec::NormChiSquared => "nChi2",
            KernelSpec::ExpChiSquared { .. } => "expChi2",
        }
    }

    pub fn gamma(&self) -> Option<f32> {
        match *self {
            KernelSpec::Rbf { gamma } | KernelSpec::ExpChiSquared { gamma } => Some(gamma),
            _ => None,
        }
    }

    /// Per-vector scalar the device formula needs
    pub fn aux_kind(&self) -> AuxKind {
        match self {
            KernelSpec::Rbf { .. } => AuxKind::SelfDot,
            KernelSpec::ChiSquared | KernelSpec::ExpChiSquared { .. } => AuxKind::SelfSum,
            KernelSpec::Linear | KernelSpec::NormChiSquared => AuxKind::None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self.gamma() {
            Some(gamma) if !(gamma.is_finite() && gamma > 0.0) => Err(SVMError::InvalidParameter(
                format!("Gamma must be positive and finite, got: {gamma}"),
            )),
            _ => Ok(()),
        }
    }

    /// Host implementation of this kernel
    pub fn host_kernel(&self) -> Result<Box<dyn Kernel>> {
        self.validate()?;
        Ok(match *self {
            KernelSpec::Linear => Box::new(LinearKernel::new()),
            KernelSpec::Rbf { gamma } => Box::new(RbfKernel::new(gamma)),
            KernelSpec::ChiSquared => Box::new(ChiSquaredKernel::new()),
            KernelSpec::NormChiSquared => Box::new(NormChiSquaredKernel::new()),
            KernelSpec::ExpChiSquared { gamma } => Box::new(ExpChiSquaredKernel::new(gamma)),
        })
    }

    /// Candidate settings for a host-side parameter search.
    ///
    /// Gamma kernels get the usual grid 2^-15, 2^-13, ..., 2^3; parameter
    /// free kernels yield themselves.
    pub fn parameter_grid(&self) -> Vec<KernelSpec> {
        let gammas = (-15..=3).step_by(2).map(|e| 2f32.powi(e));
        match self {
            KernelSpec::Rbf { .. } => gammas.map(|gamma| KernelSpec::Rbf { gamma }).collect(),
            KernelSpec::ExpChiSquared { .. } => gammas
                .map(|gamma| KernelSpec::ExpChiSquared { gamma })
                .collect(),
            other => vec![*other],
        }
    }
}

impl fmt::Display for KernelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.gamma() {
            Some(gamma) => write!(f, "{}(gamma={})", self.name(), gamma),
            None => write!(f, "{}", self.name()),
        }
    }
}
