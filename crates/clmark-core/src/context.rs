//! OpenCL context and command queue for one device.
//!
//! A [`Context`] is the session object for a run. Buffers and programs
//! borrow it, so the borrow checker guarantees they are released before the
//! context itself is torn down.

use crate::device::Device;
use crate::error::ClError;
use crate::ffi::{
    self, check_cl, check_handle, ClCommandQueue, ClContext, OpenClApi, CL_QUEUE_PROFILING_ENABLE,
};

/// Options for [`Context::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextOptions {
    /// Create the queue with `CL_QUEUE_PROFILING_ENABLE` so dispatches report
    /// device-side start/end timestamps.
    pub profiling: bool,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self { profiling: true }
    }
}

/// In-order submission channel bound to one context and device.
pub struct CommandQueue {
    raw: ClCommandQueue,
    profiling: bool,
    api: &'static OpenClApi,
}

impl CommandQueue {
    pub fn profiling(&self) -> bool {
        self.profiling
    }

    pub(crate) fn raw(&self) -> ClCommandQueue {
        self.raw
    }

    pub(crate) fn api(&self) -> &'static OpenClApi {
        self.api
    }

    /// Block until every command submitted so far has completed.
    pub fn finish(&self) -> Result<(), ClError> {
        check_cl(unsafe { (self.api.finish)(self.raw) }, "clFinish")
    }
}

impl Drop for CommandQueue {
    fn drop(&mut self) {
        unsafe { (self.api.release_command_queue)(self.raw) };
    }
}

struct ContextHandle {
    raw: ClContext,
    api: &'static OpenClApi,
}

impl Drop for ContextHandle {
    fn drop(&mut self) {
        unsafe { (self.api.release_context)(self.raw) };
    }
}

/// One device, one queue, one run.
pub struct Context {
    // Field order is drop order: the queue goes before the context.
    queue: CommandQueue,
    handle: ContextHandle,
    device: Device,
}

impl Context {
    /// Create a context and its command queue on `device`.
    pub fn new(device: &Device, options: ContextOptions) -> Result<Self, ClError> {
        let api = ffi::opencl_api()?;
        let device_id = device.id().raw();

        let mut err = 0;
        let raw = unsafe {
            (api.create_context)(
                std::ptr::null(),
                1,
                &device_id,
                None,
                std::ptr::null_mut(),
                &mut err,
            )
        };
        let handle = ContextHandle { raw: check_handle(raw, err, "clCreateContext")?, api };

        let properties = if options.profiling { CL_QUEUE_PROFILING_ENABLE } else { 0 };
        let raw_queue =
            unsafe { (api.create_command_queue)(handle.raw, device_id, properties, &mut err) };
        let queue = CommandQueue {
            raw: check_handle(raw_queue, err, "clCreateCommandQueue")?,
            profiling: options.profiling,
            api,
        };

        tracing::info!(
            device = %device.name,
            kind = %device.kind,
            profiling = options.profiling,
            "context created"
        );
        Ok(Self { queue, handle, device: device.clone() })
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    pub(crate) fn raw(&self) -> ClContext {
        self.handle.raw
    }

    pub(crate) fn api(&self) -> &'static OpenClApi {
        self.handle.api
    }
}
