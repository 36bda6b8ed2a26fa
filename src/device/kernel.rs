//! Indexed kernel over a problem's elements
//!
//! Single values K(i, j) are computed on the host from the shared self cache
//! and memoized; a whole column K(·, i) goes to the device in one dispatch.

use crate::cache::{CacheStats, DiagonalCache, ProductCache};
use crate::core::{EvaluatorConfig, Problem, Result, SVMError, SparseVector};
use crate::device::pipeline::{QuerySlot, SupportBuffers};
use crate::device::{Accelerator, DeviceContext};
use crate::kernel::{Kernel, KernelSpec};
use log::info;
use std::sync::Arc;

pub struct DeviceKernel {
    spec: KernelSpec,
    host: Box<dyn Kernel>,
    problem: Arc<Problem>,
    diagonal: DiagonalCache,
    products: ProductCache,
    slot: QuerySlot,
}

impl DeviceKernel {
    /// Precompute the diagonal and upload every element of `problem`
    pub fn init(
        problem: Arc<Problem>,
        spec: KernelSpec,
        config: &EvaluatorConfig,
        accelerator: Arc<dyn Accelerator>,
    ) -> Result<Self> {
        let host = spec.host_kernel()?;
        if problem.is_empty() {
            return Err(SVMError::EmptyDataset);
        }

        let diagonal = DiagonalCache::build(problem.elements(), host.as_ref());
        let context = DeviceContext::new(accelerator)?;
        let support = SupportBuffers::upload(
            context,
            problem.elements(),
            spec,
            config,
            problem.dimension(),
        )?;
        let slot = support.query_slot()?;
        info!(
            "Kernel {} ready over {} elements",
            spec,
            problem.len()
        );

        Ok(Self {
            spec,
            host,
            problem,
            diagonal,
            products: ProductCache::new(config.product_cache_entries),
            slot,
        })
    }

    pub fn spec(&self) -> KernelSpec {
        self.spec
    }

    pub fn problem(&self) -> &Problem {
        &self.problem
    }

    pub fn diagonal(&self) -> &DiagonalCache {
        &self.diagonal
    }

    fn check(&self, index: usize) -> Result<()> {
        let len = self.problem.len();
        if index >= len {
            return Err(SVMError::IndexOutOfRange { index, len });
        }
        Ok(())
    }

    /// K(elements[i], elements[j])
    pub fn product(&mut self, i: usize, j: usize) -> Result<f32> {
        self.check(i)?;
        self.check(j)?;
        if i == j {
            return self.diagonal.get(i).ok_or(SVMError::IndexOutOfRange {
                index: i,
                len: self.diagonal.values().len(),
            });
        }
        if let Some(value) = self.products.get(i, j) {
            return Ok(value);
        }

        let elements = self.problem.elements();
        let cache = self.slot.support().self_cache();
        let value = self
            .host
            .compute_with_aux(&elements[i], &elements[j], cache.get(i), cache.get(j));
        self.products.put(i, j, value);
        Ok(value)
    }

    /// K(x, y) for vectors outside the problem
    pub fn product_vectors(&self, x: &SparseVector, y: &SparseVector) -> f32 {
        self.host.compute(x, y)
    }

    /// K(elements[k], elements[main_index]) for every k, in one dispatch
    pub fn products_for(&mut self, main_index: usize) -> Result<&[f32]> {
        self.check(main_index)?;
        let main = &self.problem.elements()[main_index];
        self.slot.products(main)
    }

    /// Not available: the device kernel is built for one fixed setting.
    /// Use [`KernelSpec::parameter_grid`] with the host kernels instead.
    pub fn parameter_selection(&self) -> Result<Vec<KernelSpec>> {
        Err(SVMError::Unsupported(format!(
            "parameter selection for device kernel {}",
            self.slot.support().entry().signature.name
        )))
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.products.stats()
    }
}
