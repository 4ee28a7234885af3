//! Device buffers and host↔device transfers.
//!
//! A [`Buffer`] borrows its [`Context`] and is released on drop, so every
//! exit path (including `?` on an error) frees device memory before the
//! context goes away.

use std::ffi::c_void;
use std::mem::ManuallyDrop;

use crate::context::Context;
use crate::error::ClError;
use crate::ffi::{
    check_cl, check_handle, ClBitfield, ClMem, CL_MEM_READ_ONLY, CL_MEM_READ_WRITE, CL_TRUE,
};

const F32_BYTES: usize = std::mem::size_of::<f32>();

/// How kernels may access a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

impl AccessMode {
    fn flags(self) -> ClBitfield {
        match self {
            AccessMode::ReadOnly => CL_MEM_READ_ONLY,
            AccessMode::ReadWrite => CL_MEM_READ_WRITE,
        }
    }
}

/// Device-resident memory region of fixed size.
pub struct Buffer<'ctx> {
    raw: ClMem,
    nbytes: usize,
    mode: AccessMode,
    ctx: &'ctx Context,
}

impl<'ctx> Buffer<'ctx> {
    /// Allocate `nbytes` of device memory. The contents are undefined.
    pub fn new(ctx: &'ctx Context, nbytes: usize, mode: AccessMode) -> Result<Self, ClError> {
        if nbytes == 0 {
            return Err(ClError::InvalidArgument("cannot allocate a zero-sized buffer".into()));
        }
        let api = ctx.api();
        let mut err = 0;
        let raw = unsafe {
            (api.create_buffer)(ctx.raw(), mode.flags(), nbytes, std::ptr::null_mut(), &mut err)
        };
        let raw = check_handle(raw, err, "clCreateBuffer")?;
        tracing::debug!(nbytes, ?mode, "buffer allocated");
        Ok(Self { raw, nbytes, mode, ctx })
    }

    /// Allocate a buffer sized for `data` and upload it.
    pub fn from_host(ctx: &'ctx Context, data: &[f32], mode: AccessMode) -> Result<Self, ClError> {
        let buf = Self::new(ctx, data.len() * F32_BYTES, mode)?;
        buf.upload(data)?;
        Ok(buf)
    }

    /// Copy host data into the buffer.
    ///
    /// The write is blocking, and the queue is in-order, so any kernel
    /// enqueued afterwards sees the data.
    pub fn upload(&self, data: &[f32]) -> Result<(), ClError> {
        self.check_len(data.len())?;
        let queue = self.ctx.queue();
        check_cl(
            unsafe {
                (queue.api().enqueue_write_buffer)(
                    queue.raw(),
                    self.raw,
                    CL_TRUE,
                    0,
                    self.nbytes,
                    data.as_ptr() as *const c_void,
                    0,
                    std::ptr::null(),
                    std::ptr::null_mut(),
                )
            },
            "clEnqueueWriteBuffer",
        )
    }

    /// Copy the buffer back into `out`, blocking until the data is on the host.
    pub fn download(&self, out: &mut [f32]) -> Result<(), ClError> {
        self.check_len(out.len())?;
        let queue = self.ctx.queue();
        check_cl(
            unsafe {
                (queue.api().enqueue_read_buffer)(
                    queue.raw(),
                    self.raw,
                    CL_TRUE,
                    0,
                    self.nbytes,
                    out.as_mut_ptr() as *mut c_void,
                    0,
                    std::ptr::null(),
                    std::ptr::null_mut(),
                )
            },
            "clEnqueueReadBuffer",
        )
    }

    /// Download the whole buffer into a new vector.
    pub fn to_host(&self) -> Result<Vec<f32>, ClError> {
        let mut out = vec![0.0f32; self.nbytes / F32_BYTES];
        self.download(&mut out)?;
        Ok(out)
    }

    /// Release the buffer now and surface the runtime status.
    pub fn release(self) -> Result<(), ClError> {
        let this = ManuallyDrop::new(self);
        check_cl(unsafe { (this.ctx.api().release_mem_object)(this.raw) }, "clReleaseMemObject")
    }

    /// Size in bytes, fixed at creation.
    pub fn len(&self) -> usize {
        self.nbytes
    }

    pub fn is_empty(&self) -> bool {
        self.nbytes == 0
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    pub(crate) fn raw(&self) -> ClMem {
        self.raw
    }

    fn check_len(&self, floats: usize) -> Result<(), ClError> {
        let got = floats * F32_BYTES;
        if got != self.nbytes {
            return Err(ClError::SizeMismatch { expected: self.nbytes, got });
        }
        Ok(())
    }
}

impl Drop for Buffer<'_> {
    fn drop(&mut self) {
        unsafe { (self.ctx.api().release_mem_object)(self.raw) };
    }
}
