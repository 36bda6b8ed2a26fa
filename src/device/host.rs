//! CPU implementation of the accelerator
//!
//! Runs the entry points with the device's thread decomposition: blocks of
//! `threads_per_row * slice_size` threads, row `gid / T` handled by lane
//! `gid % T`. Each lane accumulates its strided share of the row into
//! block-local scratch of `align` entries; lane 0 of the row then reduces
//! the scratch and applies the kernel's finishing formula.
//!
//! Blocks run one after another, so the dispatch timeout is checked between
//! blocks.

use crate::core::{Result, SVMError};
use crate::device::entry::{self, EntryPoint, Family};
use crate::device::params::ParamList;
use crate::device::{Accelerator, BufferId, HostData, LaunchConfig};
use crate::format::placement;
use log::{debug, trace};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Instant;

#[derive(Debug, Clone)]
enum HostBuffer {
    F32(Vec<f32>),
    I32(Vec<i32>),
}

impl HostBuffer {
    fn byte_len(&self) -> usize {
        match self {
            HostBuffer::F32(data) => data.len() * 4,
            HostBuffer::I32(data) => data.len() * 4,
        }
    }
}

#[derive(Debug, Default)]
struct Memory {
    buffers: HashMap<BufferId, HostBuffer>,
    allocated: usize,
}

/// Accelerator backed by host memory
#[derive(Debug, Default)]
pub struct HostAccelerator {
    memory: RwLock<Memory>,
    modules: Mutex<HashMap<String, usize>>,
    memory_limit: Option<usize>,
    next_id: AtomicU64,
    launches: AtomicU64,
}

impl HostAccelerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail allocations that would exceed `bytes` in total
    pub fn with_memory_limit(bytes: usize) -> Self {
        Self {
            memory_limit: Some(bytes),
            ..Self::default()
        }
    }

    pub fn live_buffers(&self) -> usize {
        self.memory.read().map_or(0, |m| m.buffers.len())
    }

    pub fn allocated_bytes(&self) -> usize {
        self.memory.read().map_or(0, |m| m.allocated)
    }

    /// Outstanding module loads across all contexts
    pub fn loaded_modules(&self) -> usize {
        self.modules.lock().map_or(0, |m| m.values().sum())
    }

    pub fn launches(&self) -> u64 {
        self.launches.load(Ordering::Relaxed)
    }

    fn insert(&self, buffer: HostBuffer) -> Result<BufferId> {
        let requested = buffer.byte_len();
        let mut memory = self.memory.write().map_err(|_| poisoned())?;

        if let Some(limit) = self.memory_limit {
            let available = limit.saturating_sub(memory.allocated);
            if requested > available {
                return Err(SVMError::AllocationFailed {
                    requested,
                    available,
                });
            }
        }

        let id = BufferId(self.next_id.fetch_add(1, Ordering::Relaxed));
        memory.allocated += requested;
        memory.buffers.insert(id, buffer);
        trace!("Allocated host buffer {:?} ({} bytes)", id, requested);
        Ok(id)
    }

    fn module_loaded(&self) -> Result<bool> {
        let modules = self.modules.lock().map_err(|_| poisoned())?;
        Ok(modules.values().any(|&count| count > 0))
    }
}

fn poisoned() -> SVMError {
    SVMError::Device("host accelerator lock poisoned".to_string())
}

fn missing(id: BufferId) -> SVMError {
    SVMError::Device(format!("unknown buffer {id:?}"))
}

impl Accelerator for HostAccelerator {
    fn load_module(&self, name: &str) -> Result<()> {
        let mut modules = self.modules.lock().map_err(|_| poisoned())?;
        *modules.entry(name.to_string()).or_insert(0) += 1;
        Ok(())
    }

    fn unload_module(&self, name: &str) -> Result<()> {
        let mut modules = self.modules.lock().map_err(|_| poisoned())?;
        match modules.get_mut(name) {
            Some(count) if *count > 0 => {
                *count -= 1;
                Ok(())
            }
            _ => Err(SVMError::Device(format!("module {name} is not loaded"))),
        }
    }

    fn upload(&self, data: HostData<'_>) -> Result<BufferId> {
        self.insert(match data {
            HostData::F32(data) => HostBuffer::F32(data.to_vec()),
            HostData::I32(data) => HostBuffer::I32(data.to_vec()),
        })
    }

    fn allocate_f32(&self, len: usize) -> Result<BufferId> {
        self.insert(HostBuffer::F32(vec![0.0; len]))
    }

    fn write(&self, buffer: BufferId, data: HostData<'_>) -> Result<()> {
        let mut memory = self.memory.write().map_err(|_| poisoned())?;
        let target = memory.buffers.get_mut(&buffer).ok_or_else(|| missing(buffer))?;
        match (target, data) {
            (HostBuffer::F32(dst), HostData::F32(src)) if dst.len() == src.len() => {
                dst.copy_from_slice(src)
            }
            (HostBuffer::I32(dst), HostData::I32(src)) if dst.len() == src.len() => {
                dst.copy_from_slice(src)
            }
            _ => {
                return Err(SVMError::Device(format!(
                    "write of {} elements does not match buffer {buffer:?}",
                    data.len()
                )))
            }
        }
        Ok(())
    }

    fn read_f32(&self, buffer: BufferId, out: &mut [f32]) -> Result<()> {
        let memory = self.memory.read().map_err(|_| poisoned())?;
        match memory.buffers.get(&buffer) {
            Some(HostBuffer::F32(src)) if src.len() == out.len() => {
                out.copy_from_slice(src);
                Ok(())
            }
            Some(_) => Err(SVMError::Device(format!(
                "read of {} floats does not match buffer {buffer:?}",
                out.len()
            ))),
            None => Err(missing(buffer)),
        }
    }

    fn free(&self, buffer: BufferId) -> Result<()> {
        let mut memory = self.memory.write().map_err(|_| poisoned())?;
        let released = memory.buffers.remove(&buffer).ok_or_else(|| missing(buffer))?;
        memory.allocated -= released.byte_len();
        Ok(())
    }

    fn launch(&self, params: &ParamList, config: &LaunchConfig) -> Result<()> {
        let signature = params.signature();
        if !self.module_loaded()? {
            return Err(SVMError::Device(format!(
                "entry point {} launched without a loaded module",
                signature.name
            )));
        }
        let entry = entry::find(signature.name).ok_or_else(|| {
            SVMError::Device(format!("module has no entry point {}", signature.name))
        })?;
        if entry.signature != signature || params.encode().len() != signature.byte_size() {
            return Err(SVMError::ParameterLayout {
                entry: signature.name,
                reason: "argument block does not match the module's signature".to_string(),
            });
        }

        let args = LaunchArgs::read(entry, params, config)?;
        let rows = {
            let memory = self.memory.read().map_err(|_| poisoned())?;
            let launch = Launch::bind(&memory, entry, &args, params)?;
            launch.run(config)?
        };

        let mut memory = self.memory.write().map_err(|_| poisoned())?;
        let output = params.ptr("output")?;
        match memory.buffers.get_mut(&output) {
            Some(HostBuffer::F32(out)) if out.len() >= rows.len() => {
                out[..rows.len()].copy_from_slice(&rows);
            }
            Some(_) => {
                return Err(SVMError::Device(format!(
                    "output buffer {output:?} cannot hold {} results",
                    rows.len()
                )))
            }
            None => return Err(missing(output)),
        }

        self.launches.fetch_add(1, Ordering::Relaxed);
        debug!(
            "{}: {} rows, {} blocks of {} threads",
            signature.name,
            rows.len(),
            config.grid_size,
            config.block_size
        );
        Ok(())
    }
}

/// Scalar arguments of one launch
struct LaunchArgs {
    rows: usize,
    threads_per_row: usize,
    slice_size: usize,
    align: usize,
    prefetch: usize,
    main_aux: f32,
    gamma: f32,
}

impl LaunchArgs {
    fn read(entry: &EntryPoint, params: &ParamList, config: &LaunchConfig) -> Result<Self> {
        let signature = entry.signature;
        let int = |name: &str| -> Result<usize> {
            let value = params.int(name)?;
            usize::try_from(value).map_err(|_| SVMError::ParameterLayout {
                entry: signature.name,
                reason: format!("'{name}' is negative ({value})"),
            })
        };

        let args = Self {
            rows: int("n")?,
            threads_per_row: int("threads_per_row")?,
            slice_size: int("slice_size")?,
            align: int("align")?,
            prefetch: if signature.has("prefetch") { int("prefetch")? } else { 1 },
            main_aux: if signature.has("main_aux") { params.float("main_aux")? } else { 0.0 },
            gamma: if signature.has("gamma") { params.float("gamma")? } else { 0.0 },
        };

        let invalid = |reason: String| SVMError::ParameterLayout {
            entry: signature.name,
            reason,
        };
        if !args.threads_per_row.is_power_of_two() || args.slice_size == 0 || args.prefetch == 0 {
            return Err(invalid(format!(
                "threads_per_row {} must be a power of two; slice_size {} and prefetch {} positive",
                args.threads_per_row, args.slice_size, args.prefetch
            )));
        }
        let threads = args.threads_per_row * args.slice_size;
        if config.block_size != threads || args.align < threads {
            return Err(invalid(format!(
                "block of {} threads with scratch {} for {} threads per slice",
                config.block_size, args.align, threads
            )));
        }
        if config.grid_size * config.block_size < args.rows * args.threads_per_row {
            return Err(invalid(format!(
                "grid of {} blocks does not cover {} rows",
                config.grid_size, args.rows
            )));
        }
        Ok(args)
    }
}

/// Buffers of one launch, borrowed from host memory
struct Launch<'a> {
    entry: &'a EntryPoint,
    args: &'a LaunchArgs,
    values: &'a [f32],
    col_idx: &'a [i32],
    vec_length: &'a [i32],
    slice_start: &'a [i32],
    self_aux: &'a [f32],
    main_vector: &'a [f32],
}

impl<'a> Launch<'a> {
    fn bind(
        memory: &'a Memory,
        entry: &'a EntryPoint,
        args: &'a LaunchArgs,
        params: &ParamList,
    ) -> Result<Self> {
        let floats = |name: &str| -> Result<&'a [f32]> {
            let id = params.ptr(name)?;
            match memory.buffers.get(&id) {
                Some(HostBuffer::F32(data)) => Ok(data.as_slice()),
                Some(HostBuffer::I32(_)) => Err(SVMError::Device(format!(
                    "'{name}' expects a float buffer"
                ))),
                None => Err(missing(id)),
            }
        };
        let ints = |name: &str| -> Result<&'a [i32]> {
            let id = params.ptr(name)?;
            match memory.buffers.get(&id) {
                Some(HostBuffer::I32(data)) => Ok(data.as_slice()),
                Some(HostBuffer::F32(_)) => Err(SVMError::Device(format!(
                    "'{name}' expects an int buffer"
                ))),
                None => Err(missing(id)),
            }
        };

        let launch = Self {
            entry,
            args,
            values: floats("values")?,
            col_idx: ints("col_idx")?,
            vec_length: ints("vec_length")?,
            slice_start: ints("slice_start")?,
            self_aux: if entry.signature.has("self_aux") {
                floats("self_aux")?
            } else {
                &[]
            },
            main_vector: floats("main_vector")?,
        };

        if launch.col_idx.len() != launch.values.len() {
            return Err(SVMError::Device(format!(
                "{}: {} column indices for {} values",
                entry.signature.name,
                launch.col_idx.len(),
                launch.values.len()
            )));
        }
        let slices = args.rows.div_ceil(args.slice_size);
        if launch.vec_length.len() < args.rows
            || launch.slice_start.len() < slices + 1
            || (entry.signature.has("self_aux") && launch.self_aux.len() < args.rows)
        {
            return Err(SVMError::Device(format!(
                "{}: layout buffers are shorter than {} rows",
                entry.signature.name, args.rows
            )));
        }
        Ok(launch)
    }

    fn run(&self, config: &LaunchConfig) -> Result<Vec<f32>> {
        let args = self.args;
        let t = args.threads_per_row;
        let mut out = vec![0.0f32; args.rows];
        let mut scratch = vec![0.0f32; args.align];
        let started = Instant::now();

        for block in 0..config.grid_size {
            if let Some(limit) = config.timeout {
                let elapsed = started.elapsed();
                if elapsed >= limit {
                    return Err(SVMError::Timeout {
                        entry: self.entry.signature.name,
                        elapsed_ms: elapsed.as_millis(),
                    });
                }
            }

            let first = block * config.block_size;
            for (tid, partial) in scratch[..config.block_size].iter_mut().enumerate() {
                let gid = first + tid;
                let row = gid / t;
                *partial = if row < args.rows {
                    self.lane_partial(row, gid % t)?
                } else {
                    0.0
                };
            }

            for tid in (0..config.block_size).step_by(t) {
                let row = (first + tid) / t;
                if row >= args.rows {
                    break;
                }
                let lanes = &mut scratch[tid..tid + t];
                let mut stride = t / 2;
                while stride > 0 {
                    for lane in 0..stride {
                        lanes[lane] += lanes[lane + stride];
                    }
                    stride /= 2;
                }
                out[row] = self.finish(row, lanes[0]);
            }
        }
        Ok(out)
    }

    /// Sum over the nonzeros of `row` owned by `lane`
    fn lane_partial(&self, row: usize, lane: usize) -> Result<f32> {
        let args = self.args;
        let (t, s, p) = (args.threads_per_row, args.slice_size, args.prefetch);
        let base = self.slice_start[row / s] as usize;
        let len = self.vec_length[row] as usize;
        let local = row % s;

        let mut acc = 0.0f32;
        let mut first = lane * p;
        while first < len {
            for j in first..(first + p).min(len) {
                let slot = base + placement(t, s, p, local, j);
                let value = *self.values.get(slot).ok_or_else(|| {
                    SVMError::Device(format!("slot {slot} beyond values of row {row}"))
                })?;
                let column = *self.col_idx.get(slot).ok_or_else(|| {
                    SVMError::Device(format!("slot {slot} beyond col_idx of row {row}"))
                })? as usize;
                let query = *self.main_vector.get(column).ok_or_else(|| {
                    SVMError::Device(format!(
                        "column {column} beyond main vector of {}",
                        self.main_vector.len()
                    ))
                })?;
                acc += self.term(value, query);
            }
            first += t * p;
        }
        Ok(acc)
    }

    fn term(&self, x: f32, y: f32) -> f32 {
        match self.entry.family {
            Family::Linear | Family::Rbf => x * y,
            Family::ChiSquared | Family::NormChiSquared | Family::ExpChiSquared => {
                let sum = x + y;
                if sum != 0.0 {
                    x * y / sum
                } else {
                    0.0
                }
            }
        }
    }

    fn finish(&self, row: usize, acc: f32) -> f32 {
        let args = self.args;
        match self.entry.family {
            Family::Linear | Family::NormChiSquared => acc,
            Family::Rbf => {
                let distance = self.self_aux[row] + args.main_aux - 2.0 * acc;
                (-args.gamma * distance).exp()
            }
            Family::ChiSquared => 1.0 - 2.0 * (self.self_aux[row] + args.main_aux - 4.0 * acc),
            Family::ExpChiSquared => {
                let distance = self.self_aux[row] + args.main_aux - 4.0 * acc;
                (-args.gamma * distance).exp()
            }
        }
    }
}
