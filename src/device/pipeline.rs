//! Support-vector buffers and per-query device state
//!
//! [`SupportBuffers`] is uploaded once and shared read-only through an
//! `Arc`; each worker owns a [`QuerySlot`] with its own query and output
//! buffers, so concurrent dispatches never write the same memory.

use crate::cache::SelfCache;
use crate::core::{EvaluatorConfig, Result, SVMError, SparseVector};
use crate::device::entry::{entry_point, EntryPoint};
use crate::device::params::ParamList;
use crate::device::{DeviceBuffer, DeviceContext, HostData, LaunchConfig};
use crate::format::SlicedLayout;
use crate::kernel::KernelSpec;
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;

/// Layout arrays and self cache of a vector set, resident on the device
///
/// Fields drop in declaration order: the self cache, then the layout
/// arrays from `slice_start` down to `values`, then the context.
pub struct SupportBuffers {
    self_aux: Option<DeviceBuffer>,
    slice_start: DeviceBuffer,
    vec_length: DeviceBuffer,
    col_idx: DeviceBuffer,
    values: DeviceBuffer,
    self_cache: SelfCache,
    kernel: KernelSpec,
    entry: &'static EntryPoint,
    n_vectors: usize,
    dimension: usize,
    threads_per_row: usize,
    slice_size: usize,
    prefetch_size: usize,
    align: usize,
    timeout: Option<Duration>,
    context: Arc<DeviceContext>,
}

impl SupportBuffers {
    /// Transform `vectors` into the configured layout and upload it.
    ///
    /// `dimension` is the size of the dense query buffer; every vector must
    /// fit inside it.
    pub fn upload(
        context: Arc<DeviceContext>,
        vectors: &[SparseVector],
        kernel: KernelSpec,
        config: &EvaluatorConfig,
        dimension: usize,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        kernel.validate()?;
        if vectors.is_empty() {
            return Err(SVMError::EmptyDataset);
        }
        if let Some(widest) = vectors.iter().map(SparseVector::dim).max() {
            if widest > dimension {
                return Err(SVMError::DimensionMismatch {
                    expected: dimension,
                    actual: widest,
                });
            }
        }

        let layout = SlicedLayout::build(
            vectors,
            config.format,
            config.threads_per_row,
            config.slice_size,
            config.prefetch_size,
        )?;
        let self_cache = SelfCache::build(vectors, kernel.aux_kind());
        let entry = entry_point(&kernel, config.format);

        let values = context.upload(HostData::F32(&layout.values))?;
        let col_idx = context.upload(HostData::I32(&layout.col_idx))?;
        let vec_length = context.upload(HostData::I32(&layout.vec_length))?;
        let slice_start = context.upload(HostData::I32(&layout.slice_start))?;
        let self_aux = if entry.signature.has("self_aux") {
            Some(context.upload(HostData::F32(self_cache.values()))?)
        } else {
            None
        };

        let stats = layout.stats();
        info!(
            "Uploaded {} vectors for {} as {}: {} slices, {} slots ({:.1}% padding)",
            stats.vectors,
            kernel,
            layout.format(),
            stats.slices,
            stats.stored,
            stats.padding_ratio() * 100.0
        );

        Ok(Arc::new(Self {
            self_aux,
            slice_start,
            vec_length,
            col_idx,
            values,
            self_cache,
            kernel,
            entry,
            n_vectors: vectors.len(),
            dimension,
            threads_per_row: layout.threads_per_row(),
            slice_size: layout.slice_size(),
            prefetch_size: layout.prefetch_size(),
            align: layout.align(),
            timeout: config.dispatch_timeout(),
            context,
        }))
    }

    pub fn n_vectors(&self) -> usize {
        self.n_vectors
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn kernel(&self) -> KernelSpec {
        self.kernel
    }

    pub fn entry(&self) -> &'static EntryPoint {
        self.entry
    }

    pub fn self_cache(&self) -> &SelfCache {
        &self.self_cache
    }

    pub fn launch_config(&self) -> LaunchConfig {
        LaunchConfig::for_rows(
            self.n_vectors,
            self.threads_per_row,
            self.slice_size,
            self.timeout,
        )
    }

    /// Allocate query and output buffers for one more worker
    pub fn query_slot(self: &Arc<Self>) -> Result<QuerySlot> {
        // Keep the query buffer non-empty even for all-empty support sets.
        let dense_len = self.dimension.max(1);
        let main_vector = self.context.allocate_f32(dense_len)?;
        let output = self.context.allocate_f32(self.n_vectors)?;
        let params = self.bind(&main_vector, &output)?;

        Ok(QuerySlot {
            params,
            dense: vec![0.0; dense_len],
            touched: Vec::new(),
            results: vec![0.0; self.n_vectors],
            phase: Phase::Empty,
            output,
            main_vector,
            support: Arc::clone(self),
        })
    }

    fn bind(&self, main_vector: &DeviceBuffer, output: &DeviceBuffer) -> Result<ParamList> {
        let int = |value: usize, what: &str| {
            i32::try_from(value).map_err(|_| {
                SVMError::InvalidParameter(format!("{what} {value} exceeds a device integer"))
            })
        };

        ParamList::builder(self.entry.signature)
            .ptr("values", self.values.id())?
            .ptr("col_idx", self.col_idx.id())?
            .ptr("vec_length", self.vec_length.id())?
            .ptr("slice_start", self.slice_start.id())?
            .ptr_if_declared("self_aux", self.self_aux.as_ref().map(DeviceBuffer::id))?
            .ptr("main_vector", main_vector.id())?
            .ptr("output", output.id())?
            .int("n", int(self.n_vectors, "vector count")?)?
            .int("threads_per_row", int(self.threads_per_row, "threads_per_row")?)?
            .int("slice_size", int(self.slice_size, "slice_size")?)?
            .int("align", int(self.align, "align")?)?
            .int_if_declared("prefetch", int(self.prefetch_size, "prefetch")?)?
            .float_if_declared("main_aux", 0.0)?
            .float_if_declared("gamma", self.kernel.gamma().unwrap_or(0.0))?
            .build()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Empty,
    Loaded,
    Dispatched,
}

impl Phase {
    fn name(self) -> &'static str {
        match self {
            Phase::Empty => "no query",
            Phase::Loaded => "query loaded",
            Phase::Dispatched => "dispatched",
        }
    }
}

/// One worker's query buffer, output buffer and bound arguments
pub struct QuerySlot {
    params: ParamList,
    dense: Vec<f32>,
    touched: Vec<usize>,
    results: Vec<f32>,
    phase: Phase,
    output: DeviceBuffer,
    main_vector: DeviceBuffer,
    support: Arc<SupportBuffers>,
}

impl QuerySlot {
    pub fn support(&self) -> &Arc<SupportBuffers> {
        &self.support
    }

    /// Densify `x` into the query buffer and set its per-query scalar.
    ///
    /// Indices at or beyond the support dimension cannot match any support
    /// vector and are left out of the dense buffer. On error the slot holds
    /// no query until the next successful call.
    pub fn set_main_vector(&mut self, x: &SparseVector) -> Result<()> {
        self.phase = Phase::Empty;
        for &i in &self.touched {
            self.dense[i] = 0.0;
        }
        self.touched.clear();

        let dropped = x.scatter_into(&mut self.dense);
        self.touched
            .extend(x.indices.iter().copied().filter(|&i| i < self.dense.len()));
        if dropped > 0 {
            warn!(
                "{} query entries beyond dimension {} ignored",
                dropped,
                self.support.dimension
            );
        }

        if self.params.signature().has("main_aux") {
            let aux = self.support.kernel.aux_kind().of(x);
            self.params.set_float("main_aux", aux)?;
        }
        self.main_vector.write(HostData::F32(&self.dense))?;
        self.phase = Phase::Loaded;
        Ok(())
    }

    /// Launch the entry point for the loaded query
    pub fn dispatch(&mut self) -> Result<()> {
        if self.phase == Phase::Empty {
            return Err(SVMError::InvalidState {
                expected: Phase::Loaded.name(),
                found: self.phase.name(),
            });
        }
        let config = self.support.launch_config();
        if let Err(e) = self.support.context.launch(&self.params, &config) {
            warn!("Dispatch of {} failed: {}", self.params.signature().name, e);
            self.phase = Phase::Loaded;
            return Err(e);
        }
        self.phase = Phase::Dispatched;
        Ok(())
    }

    /// Read back one kernel value per support vector
    pub fn collect(&mut self) -> Result<&[f32]> {
        if self.phase != Phase::Dispatched {
            return Err(SVMError::InvalidState {
                expected: Phase::Dispatched.name(),
                found: self.phase.name(),
            });
        }
        self.output.read_f32(&mut self.results)?;
        Ok(&self.results)
    }

    /// Load, dispatch and collect in one call
    pub fn products(&mut self, x: &SparseVector) -> Result<&[f32]> {
        self.set_main_vector(x)?;
        self.dispatch()?;
        self.collect()
    }
}
