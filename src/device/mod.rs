//! Accelerator collaborator and device-side resources
//!
//! The crate does not talk to a GPU driver directly. Everything device-side
//! goes through the [`Accelerator`] trait: upload, allocate, launch, read
//! back. [`HostAccelerator`] implements it on the CPU with the same thread
//! decomposition a device would use.
//!
//! Ownership is RAII: a [`DeviceContext`] loads the kernel module when it is
//! created and unloads it when the last [`DeviceBuffer`] holding it is gone,
//! and every buffer frees itself on drop.

pub mod entry;
pub mod host;
pub mod kernel;
pub mod params;
pub mod pipeline;

pub use entry::{entry_point, EntryPoint, Family};
pub use host::HostAccelerator;
pub use kernel::DeviceKernel;
pub use params::{KernelSignature, ParamKind, ParamList, ParamListBuilder, ParamValue};
pub use pipeline::{QuerySlot, SupportBuffers};

use crate::core::Result;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

/// Name of the module holding every entry point in [`entry::ENTRY_POINTS`]
pub const MODULE_NAME: &str = "KernelsSlicedEllpack";

/// Opaque handle to device memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

/// Host data handed to the accelerator
#[derive(Debug, Clone, Copy)]
pub enum HostData<'a> {
    F32(&'a [f32]),
    I32(&'a [i32]),
}

impl HostData<'_> {
    pub fn len(&self) -> usize {
        match self {
            HostData::F32(data) => data.len(),
            HostData::I32(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn byte_len(&self) -> usize {
        self.len() * 4
    }
}

/// Launch geometry for one dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchConfig {
    /// Threads per block
    pub block_size: usize,
    /// Number of blocks
    pub grid_size: usize,
    /// Abort the dispatch once it has run this long
    pub timeout: Option<Duration>,
}

impl LaunchConfig {
    /// One block per slice: `threads_per_row * slice_size` threads each,
    /// enough blocks to give every row its `threads_per_row` lanes
    pub fn for_rows(
        rows: usize,
        threads_per_row: usize,
        slice_size: usize,
        timeout: Option<Duration>,
    ) -> Self {
        let block_size = threads_per_row * slice_size;
        Self {
            block_size,
            grid_size: (rows * threads_per_row).div_ceil(block_size),
            timeout,
        }
    }
}

/// External accelerator runtime
///
/// Implementations must be shareable across threads; concurrent launches
/// against disjoint output buffers are allowed.
pub trait Accelerator: Send + Sync {
    fn load_module(&self, name: &str) -> Result<()>;

    fn unload_module(&self, name: &str) -> Result<()>;

    /// Copy host data into a new device buffer
    fn upload(&self, data: HostData<'_>) -> Result<BufferId>;

    /// Allocate a zeroed float buffer
    fn allocate_f32(&self, len: usize) -> Result<BufferId>;

    /// Overwrite a buffer with host data of the same length
    fn write(&self, buffer: BufferId, data: HostData<'_>) -> Result<()>;

    /// Copy a float buffer back into `out`, which must match its length
    fn read_f32(&self, buffer: BufferId, out: &mut [f32]) -> Result<()>;

    fn free(&self, buffer: BufferId) -> Result<()>;

    /// Run the entry point named by `params` and block until it finishes
    fn launch(&self, params: &ParamList, config: &LaunchConfig) -> Result<()>;
}

/// A loaded kernel module on one accelerator
pub struct DeviceContext {
    accelerator: Arc<dyn Accelerator>,
}

impl DeviceContext {
    pub fn new(accelerator: Arc<dyn Accelerator>) -> Result<Arc<Self>> {
        accelerator.load_module(MODULE_NAME)?;
        info!("Loaded device module {}", MODULE_NAME);
        Ok(Arc::new(Self { accelerator }))
    }

    pub fn accelerator(&self) -> &dyn Accelerator {
        self.accelerator.as_ref()
    }

    pub fn upload(self: &Arc<Self>, data: HostData<'_>) -> Result<DeviceBuffer> {
        let len = data.len();
        let id = self.accelerator.upload(data)?;
        Ok(DeviceBuffer {
            id,
            len,
            context: Arc::clone(self),
        })
    }

    pub fn allocate_f32(self: &Arc<Self>, len: usize) -> Result<DeviceBuffer> {
        let id = self.accelerator.allocate_f32(len)?;
        Ok(DeviceBuffer {
            id,
            len,
            context: Arc::clone(self),
        })
    }

    pub fn launch(&self, params: &ParamList, config: &LaunchConfig) -> Result<()> {
        self.accelerator.launch(params, config)
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        match self.accelerator.unload_module(MODULE_NAME) {
            Ok(()) => debug!("Unloaded device module {}", MODULE_NAME),
            Err(e) => warn!("Failed to unload device module {}: {}", MODULE_NAME, e),
        }
    }
}

/// Device memory released on drop
pub struct DeviceBuffer {
    id: BufferId,
    len: usize,
    context: Arc<DeviceContext>,
}

impl DeviceBuffer {
    pub fn id(&self) -> BufferId {
        self.id
    }

    /// Element count
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn write(&self, data: HostData<'_>) -> Result<()> {
        self.context.accelerator.write(self.id, data)
    }

    pub fn read_f32(&self, out: &mut [f32]) -> Result<()> {
        self.context.accelerator.read_f32(self.id, out)
    }
}

impl std::fmt::Debug for DeviceBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("id", &self.id)
            .field("len", &self.len)
            .finish()
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        if let Err(e) = self.context.accelerator.free(self.id) {
            warn!("Failed to free device buffer {:?}: {}", self.id, e);
        }
    }
}
