//! Host-only reference evaluator

use crate::cache::SelfCache;
use crate::core::{Evaluate, Prediction, Result, SVMError, SparseVector, TrainedModel};
use crate::evaluator::reduce;
use crate::kernel::{Kernel, KernelSpec};
use rayon::prelude::*;

/// Evaluates decisions with the host kernels, one support vector at a time
pub struct SequentialEvaluator {
    kernel: Box<dyn Kernel>,
    support: Vec<SparseVector>,
    self_cache: SelfCache,
    coefficients: Vec<f32>,
    rho: f32,
}

impl SequentialEvaluator {
    pub fn new(spec: KernelSpec, model: &TrainedModel, labels: &[f32]) -> Result<Self> {
        if model.n_support_vectors() == 0 {
            return Err(SVMError::EmptyModel);
        }
        let kernel = spec.host_kernel()?;
        let self_cache = SelfCache::build(&model.support_elements, kernel.aux_kind());

        Ok(Self {
            coefficients: model.coefficients(labels)?,
            support: model.support_elements.clone(),
            self_cache,
            kernel,
            rho: model.rho,
        })
    }

    /// K(sᵢ, x) for every support vector, in support-vector order
    pub fn products(&self, x: &SparseVector) -> Vec<f32> {
        let x_aux = self.kernel.aux_kind().of(x);
        self.support
            .iter()
            .enumerate()
            .map(|(i, sv)| {
                self.kernel
                    .compute_with_aux(sv, x, self.self_cache.get(i), x_aux)
            })
            .collect()
    }

    pub fn decision(&self, x: &SparseVector) -> f32 {
        reduce(&self.coefficients, &self.products(x), self.rho)
    }
}

impl Evaluate for SequentialEvaluator {
    fn decision_value(&mut self, x: &SparseVector) -> Result<f32> {
        Ok(self.decision(x))
    }

    fn predict_batch(&mut self, xs: &[SparseVector]) -> Result<Vec<Prediction>> {
        Ok(xs
            .par_iter()
            .map(|x| Prediction::from_decision(self.decision(x)))
            .collect())
    }

    fn n_support_vectors(&self) -> usize {
        self.support.len()
    }
}
