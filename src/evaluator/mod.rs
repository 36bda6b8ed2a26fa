//! SVM decision evaluation
//!
//! [`Evaluator`] drives the device: `init` uploads the support vectors once,
//! then every query goes through `set_main_vector`, `dispatch` and `collect`
//! before the host reduces the kernel column to a decision value.
//! [`SequentialEvaluator`] computes the same decisions on the host and
//! serves as the reference.

pub mod sequential;

pub use self::sequential::SequentialEvaluator;

use crate::core::{
    Evaluate, EvaluatorConfig, Prediction, Result, SVMError, SparseVector, TrainedModel,
};
use crate::device::{Accelerator, DeviceContext, QuerySlot, SupportBuffers};
use crate::kernel::KernelSpec;
use log::{debug, info, warn};
use rayon::prelude::*;
use std::sync::Arc;

/// `Σ coefficients[i] * products[i] - rho`
pub fn reduce(coefficients: &[f32], products: &[f32], rho: f32) -> f32 {
    coefficients
        .iter()
        .zip(products)
        .map(|(c, k)| c * k)
        .sum::<f32>()
        - rho
}

struct Ready {
    slot: QuerySlot,
    coefficients: Arc<[f32]>,
    rho: f32,
}

impl Ready {
    fn decision_value(&mut self, x: &SparseVector) -> Result<f32> {
        let products = self.slot.products(x)?;
        Ok(reduce(&self.coefficients, products, self.rho))
    }

    fn fork(&self) -> Result<Ready> {
        Ok(Ready {
            slot: self.slot.support().query_slot()?,
            coefficients: Arc::clone(&self.coefficients),
            rho: self.rho,
        })
    }
}

enum State {
    Unconfigured,
    Ready(Box<Ready>),
    Disposed,
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            State::Unconfigured => "unconfigured",
            State::Ready(_) => "ready",
            State::Disposed => "disposed",
        }
    }
}

/// Device-backed evaluator
///
/// ```text
/// Unconfigured --init--> Ready --dispose--> Disposed
/// ```
///
/// A failed `init` also leaves the evaluator disposed; create a new one to
/// retry.
pub struct Evaluator {
    kernel: KernelSpec,
    config: EvaluatorConfig,
    accelerator: Arc<dyn Accelerator>,
    state: State,
}

impl Evaluator {
    pub fn new(
        kernel: KernelSpec,
        config: EvaluatorConfig,
        accelerator: Arc<dyn Accelerator>,
    ) -> Self {
        Self {
            kernel,
            config,
            accelerator,
            state: State::Unconfigured,
        }
    }

    pub fn kernel(&self) -> KernelSpec {
        self.kernel
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    pub fn state_name(&self) -> &'static str {
        self.state.name()
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, State::Ready(_))
    }

    /// Upload the support vectors of `model`.
    ///
    /// `labels` are the training labels the model's support indexes refer
    /// to.
    pub fn init(&mut self, model: &TrainedModel, labels: &[f32]) -> Result<()> {
        if !matches!(self.state, State::Unconfigured) {
            return Err(SVMError::InvalidState {
                expected: State::Unconfigured.name(),
                found: self.state.name(),
            });
        }

        match self.configure(model, labels) {
            Ok(ready) => {
                info!(
                    "Evaluator ready: {} support vectors, kernel {}, {} layout",
                    model.n_support_vectors(),
                    self.kernel,
                    self.config.format
                );
                self.state = State::Ready(Box::new(ready));
                Ok(())
            }
            Err(e) => {
                warn!("Evaluator init failed: {}", e);
                self.state = State::Disposed;
                Err(e)
            }
        }
    }

    fn configure(&self, model: &TrainedModel, labels: &[f32]) -> Result<Ready> {
        self.config.validate()?;
        self.kernel.validate()?;
        if model.n_support_vectors() == 0 {
            return Err(SVMError::EmptyModel);
        }
        let dimension = model.consistent_dimension()?;
        let coefficients: Arc<[f32]> = model.coefficients(labels)?.into();

        let context = DeviceContext::new(Arc::clone(&self.accelerator))?;
        let support = SupportBuffers::upload(
            context,
            &model.support_elements,
            self.kernel,
            &self.config,
            dimension,
        )?;
        Ok(Ready {
            slot: support.query_slot()?,
            coefficients,
            rho: model.rho,
        })
    }

    fn ready(&mut self) -> Result<&mut Ready> {
        match &mut self.state {
            State::Ready(ready) => Ok(&mut **ready),
            other => Err(SVMError::InvalidState {
                expected: "ready",
                found: other.name(),
            }),
        }
    }

    fn ready_ref(&self) -> Result<&Ready> {
        match &self.state {
            State::Ready(ready) => Ok(&**ready),
            other => Err(SVMError::InvalidState {
                expected: "ready",
                found: other.name(),
            }),
        }
    }

    /// Load a query into this evaluator's device buffer
    pub fn set_main_vector(&mut self, x: &SparseVector) -> Result<()> {
        self.ready()?.slot.set_main_vector(x)
    }

    pub fn dispatch(&mut self) -> Result<()> {
        self.ready()?.slot.dispatch()
    }

    /// Kernel values of every support vector against the last dispatched
    /// query
    pub fn collect(&mut self) -> Result<&[f32]> {
        self.ready()?.slot.collect()
    }

    /// A second evaluator sharing this one's device-resident support
    /// vectors, with its own query and output buffers
    pub fn fork(&self) -> Result<Evaluator> {
        let ready = self.ready_ref()?.fork()?;
        debug!("Forked evaluator");
        Ok(Evaluator {
            kernel: self.kernel,
            config: self.config.clone(),
            accelerator: Arc::clone(&self.accelerator),
            state: State::Ready(Box::new(ready)),
        })
    }

    /// Release this evaluator's device resources; safe to call repeatedly.
    ///
    /// Support buffers shared with forks stay alive until the last fork is
    /// disposed.
    pub fn dispose(&mut self) {
        if matches!(self.state, State::Disposed) {
            return;
        }
        let previous = std::mem::replace(&mut self.state, State::Disposed);
        debug!("Evaluator disposed (was {})", previous.name());
    }
}

impl Evaluate for Evaluator {
    fn decision_value(&mut self, x: &SparseVector) -> Result<f32> {
        self.ready()?.decision_value(x)
    }

    /// Parallel batches give every rayon worker its own query slot, created
    /// on the worker's first query. Serial batches reuse this evaluator's
    /// slot.
    fn predict_batch(&mut self, xs: &[SparseVector]) -> Result<Vec<Prediction>> {
        let parallel = self.config.parallel_batch;
        let ready = self.ready()?;

        if parallel {
            let shared = &*ready;
            xs.par_iter()
                .map_init(
                    || None,
                    |slot: &mut Option<Ready>, x| {
                        let worker = match slot {
                            Some(worker) => worker,
                            None => slot.insert(shared.fork()?),
                        };
                        worker.decision_value(x).map(Prediction::from_decision)
                    },
                )
                .collect()
        } else {
            xs.iter()
                .map(|x| ready.decision_value(x).map(Prediction::from_decision))
                .collect()
        }
    }

    fn n_support_vectors(&self) -> usize {
        match &self.state {
            State::Ready(ready) => ready.coefficients.len(),
            _ => 0,
        }
    }
}

impl Drop for Evaluator {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Problem;
    use crate::device::HostAccelerator;
    use approx::assert_relative_eq;

    fn histogram_model() -> (TrainedModel, Vec<f32>) {
        let problem = Problem::new(
            vec![
                SparseVector::new(vec![1, 2], vec![0.6, 0.4]),
                SparseVector::new(vec![1, 3], vec![0.5, 0.5]),
            ],
            vec![1.0, -1.0],
        )
        .unwrap();
        let model = TrainedModel::from_problem(&problem, vec![0, 1], vec![1.0, 1.0], 0.0).unwrap();
        (model, problem.labels().to_vec())
    }

    fn evaluator(kernel: KernelSpec) -> (Arc<HostAccelerator>, Evaluator) {
        let host = Arc::new(HostAccelerator::new());
        let evaluator = Evaluator::new(kernel, EvaluatorConfig::default(), host.clone());
        (host, evaluator)
    }

    #[test]
    fn test_reduce() {
        assert_relative_eq!(reduce(&[1.0, -1.0], &[0.5, 0.25], 0.1), 0.15);
        assert_eq!(reduce(&[], &[], 0.5), -0.5);
    }

    #[test]
    fn test_rbf_decision_for_reference_query() {
        let (model, labels) = histogram_model();
        let (_host, mut evaluator) = evaluator(KernelSpec::Rbf { gamma: 1.0 });
        evaluator.init(&model, &labels).unwrap();

        // K(x, sv0) = 1, K(x, sv1) = exp(-0.42)
        let x = SparseVector::new(vec![1, 2], vec![0.6, 0.4]);
        let decision = evaluator.decision_value(&x).unwrap();
        assert_relative_eq!(decision, 1.0 - (-0.42f32).exp(), epsilon = 1e-5);
        assert_eq!(evaluator.predict(&x).unwrap().label, 1.0);
    }

    #[test]
    fn test_calls_before_init_rejected() {
        let (_host, mut evaluator) = evaluator(KernelSpec::Linear);
        let x = SparseVector::new(vec![0], vec![1.0]);

        assert_eq!(evaluator.state_name(), "unconfigured");
        assert!(matches!(
            evaluator.set_main_vector(&x),
            Err(SVMError::InvalidState {
                expected: "ready",
                found: "unconfigured"
            })
        ));
        assert!(evaluator.predict(&x).is_err());
        assert!(evaluator.predict_batch(&[x]).is_err());
        assert!(evaluator.fork().is_err());
    }

    #[test]
    fn test_second_init_rejected() {
        let (model, labels) = histogram_model();
        let (_host, mut evaluator) = evaluator(KernelSpec::Linear);
        evaluator.init(&model, &labels).unwrap();
        assert!(matches!(
            evaluator.init(&model, &labels),
            Err(SVMError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_empty_model_rejected() {
        let model = TrainedModel::new(vec![], vec![], vec![], 0.0).unwrap();
        let (host, mut evaluator) = evaluator(KernelSpec::Linear);

        assert!(matches!(evaluator.init(&model, &[]), Err(SVMError::EmptyModel)));
        assert_eq!(evaluator.state_name(), "disposed");
        assert_eq!(host.live_buffers(), 0);
    }

    #[test]
    fn test_inconsistent_dimensions_rejected() {
        let support = vec![
            SparseVector::new(vec![1, 2], vec![0.6, 0.4]).with_dim(10),
            SparseVector::new(vec![0, 1], vec![0.5, 0.5]).with_dim(3),
        ];
        let model = TrainedModel::new(support, vec![0, 1], vec![1.0, 1.0], 0.0).unwrap();
        let (host, mut evaluator) = evaluator(KernelSpec::Rbf { gamma: 1.0 });

        assert!(matches!(
            evaluator.init(&model, &[1.0, -1.0]),
            Err(SVMError::DimensionMismatch {
                expected: 10,
                actual: 3
            })
        ));
        assert_eq!(evaluator.state_name(), "disposed");
        assert_eq!(host.live_buffers(), 0);
        assert_eq!(host.loaded_modules(), 0);
    }

    #[test]
    fn test_agreeing_declared_dimensions_accepted() {
        let support = vec![
            SparseVector::new(vec![1, 2], vec![0.6, 0.4]).with_dim(6),
            SparseVector::new(vec![1, 3], vec![0.5, 0.5]).with_dim(6),
        ];
        let model = TrainedModel::new(support, vec![0, 1], vec![1.0, 1.0], 0.0).unwrap();
        let (_host, mut evaluator) = evaluator(KernelSpec::Linear);

        evaluator.init(&model, &[1.0, -1.0]).unwrap();
        // index 5 fits the declared dimension and reaches the device
        let x = SparseVector::new(vec![1, 5], vec![1.0, 1.0]);
        evaluator.set_main_vector(&x).unwrap();
        evaluator.dispatch().unwrap();
        assert_eq!(evaluator.collect().unwrap(), &[0.6, 0.5]);
    }

    #[test]
    fn test_batch_slot_allocation_failure_keeps_error_class() {
        let (model, labels) = histogram_model();
        let queries = vec![
            SparseVector::new(vec![1, 2], vec![0.6, 0.4]),
            SparseVector::new(vec![3], vec![1.0]),
        ];

        // room for exactly one evaluator and nothing more
        let (sizing_host, mut sized) = evaluator(KernelSpec::Linear);
        sized.init(&model, &labels).unwrap();
        let budget = sizing_host.allocated_bytes();

        let host = Arc::new(HostAccelerator::with_memory_limit(budget));
        let mut parallel = Evaluator::new(KernelSpec::Linear, EvaluatorConfig::default(), host);
        parallel.init(&model, &labels).unwrap();
        assert!(matches!(
            parallel.predict_batch(&queries),
            Err(SVMError::AllocationFailed { .. })
        ));

        let host = Arc::new(HostAccelerator::with_memory_limit(budget));
        let mut serial = Evaluator::new(
            KernelSpec::Linear,
            EvaluatorConfig::default().with_parallel_batch(false),
            host.clone(),
        );
        serial.init(&model, &labels).unwrap();
        let predictions = serial.predict_batch(&queries).unwrap();
        assert_eq!(predictions[0].label, 1.0);
        assert_eq!(predictions[1].label, -1.0);
        assert_eq!(host.allocated_bytes(), budget);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let (model, labels) = histogram_model();
        let host = Arc::new(HostAccelerator::new());
        let mut evaluator = Evaluator::new(
            KernelSpec::Linear,
            EvaluatorConfig::default().with_threads_per_row(3),
            host,
        );
        assert!(matches!(
            evaluator.init(&model, &labels),
            Err(SVMError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_explicit_pipeline() {
        let (model, labels) = histogram_model();
        let (_host, mut evaluator) = evaluator(KernelSpec::NormChiSquared);
        evaluator.init(&model, &labels).unwrap();

        evaluator
            .set_main_vector(&SparseVector::new(vec![1], vec![0.5]))
            .unwrap();
        evaluator.dispatch().unwrap();
        let products = evaluator.collect().unwrap();
        assert_relative_eq!(products[0], 0.3 / 1.1, epsilon = 1e-6);
        assert_relative_eq!(products[1], 0.25, epsilon = 1e-6);
    }

    #[test]
    fn test_dispose_is_idempotent_and_releases_buffers() {
        let (model, labels) = histogram_model();
        let (host, mut evaluator) = evaluator(KernelSpec::Rbf { gamma: 0.5 });
        evaluator.init(&model, &labels).unwrap();
        assert!(host.live_buffers() > 0);

        evaluator.dispose();
        evaluator.dispose();
        assert_eq!(evaluator.state_name(), "disposed");
        assert_eq!(host.live_buffers(), 0);
        assert_eq!(host.loaded_modules(), 0);
        assert!(evaluator.dispatch().is_err());
        assert_eq!(evaluator.n_support_vectors(), 0);
    }

    #[test]
    fn test_fork_shares_support_buffers() {
        let (model, labels) = histogram_model();
        let (host, mut evaluator) = evaluator(KernelSpec::Linear);
        evaluator.init(&model, &labels).unwrap();
        let single = host.live_buffers();

        let mut fork = evaluator.fork().unwrap();
        // only a query and an output buffer more
        assert_eq!(host.live_buffers(), single + 2);

        let x = SparseVector::new(vec![3], vec![2.0]);
        assert_eq!(
            fork.decision_value(&x).unwrap(),
            evaluator.decision_value(&x).unwrap()
        );

        evaluator.dispose();
        assert_relative_eq!(fork.decision_value(&x).unwrap(), -1.0);
        drop(fork);
        assert_eq!(host.live_buffers(), 0);
    }
}
