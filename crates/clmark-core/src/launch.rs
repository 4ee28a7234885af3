//! Kernel argument binding, launch geometry and timed dispatch.

use std::ffi::{c_void, CString};
use std::marker::PhantomData;
use std::time::{Duration, Instant};

use crate::context::CommandQueue;
use crate::error::ClError;
use crate::ffi::{
    check_cl, check_handle, info_scalar, ClEvent, ClKernel, ClMem, ClUint, ClUlong, OpenClApi,
    CL_KERNEL_NUM_ARGS, CL_PROFILING_COMMAND_END, CL_PROFILING_COMMAND_START,
};
use crate::memory::Buffer;
use crate::program::Program;

/// A value bound to one kernel argument slot.
#[derive(Clone, Copy)]
pub enum KernelArg<'a> {
    Buffer(&'a Buffer<'a>),
    I32(i32),
    U32(u32),
    F32(f32),
}

/// A named entry point of a built [`Program`].
///
/// `'b` is the lifetime of the buffers bound to its slots: a kernel cannot
/// outlive anything it may dispatch against.
///
/// ```compile_fail
/// # use clmark_core::{dispatch, AccessMode, Buffer, Context, KernelArg, LaunchGeometry, Program};
/// # fn run(ctx: &Context, program: &Program<'_>) -> clmark_core::Result<()> {
/// let mut kernel = program.kernel("inclusive_prefix_sum")?;
/// {
///     let input = Buffer::from_host(ctx, &[1.0], AccessMode::ReadOnly)?;
///     kernel.set_arg(0, KernelArg::Buffer(&input))?;
/// }
/// dispatch(&kernel, &LaunchGeometry::new(vec![1], None), ctx.queue())?;
/// # Ok(())
/// # }
/// ```
pub struct Kernel<'p, 'b> {
    raw: ClKernel,
    name: String,
    bound: Vec<bool>,
    program: &'p Program<'p>,
    _args: PhantomData<KernelArg<'b>>,
}

impl<'p, 'b> Kernel<'p, 'b> {
    pub(crate) fn new(program: &'p Program<'p>, name: &str) -> Result<Self, ClError> {
        let api = program.context().api();
        let c_name = CString::new(name)
            .map_err(|_| {
                ClError::InvalidArgument(format!("kernel name {:?} contains a NUL byte", name))
            })?;

        let mut err = 0;
        let raw = unsafe { (api.create_kernel)(program.raw(), c_name.as_ptr(), &mut err) };
        let raw = check_handle(raw, err, "clCreateKernel")?;
        let mut kernel = Kernel {
            raw,
            name: name.to_string(),
            bound: Vec::new(),
            program,
            _args: PhantomData,
        };

        let num_args: ClUint = unsafe {
            info_scalar(
                |size, value, size_ret| {
                    (api.get_kernel_info)(raw, CL_KERNEL_NUM_ARGS, size, value, size_ret)
                },
                "clGetKernelInfo(NUM_ARGS)",
            )?
        };
        kernel.bound = vec![false; num_args as usize];
        tracing::debug!(kernel = name, num_args, "kernel created");
        Ok(kernel)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of arguments the kernel declares.
    pub fn num_args(&self) -> usize {
        self.bound.len()
    }

    /// Bind every argument slot, in declaration order.
    pub fn bind(&mut self, args: &[KernelArg<'b>]) -> Result<(), ClError> {
        if args.len() != self.num_args() {
            return Err(ClError::ArgumentCount {
                kernel: self.name.clone(),
                expected: self.num_args(),
                got: args.len(),
            });
        }
        for (index, arg) in args.iter().enumerate() {
            self.set_arg(index, *arg)?;
        }
        Ok(())
    }

    /// Bind a single argument slot.
    pub fn set_arg(&mut self, index: usize, arg: KernelArg<'b>) -> Result<(), ClError> {
        if index >= self.num_args() {
            return Err(ClError::ArgumentCount {
                kernel: self.name.clone(),
                expected: self.num_args(),
                got: index + 1,
            });
        }
        let api = self.api();
        let code = unsafe {
            match arg {
                KernelArg::Buffer(buf) => {
                    let mem: ClMem = buf.raw();
                    set_scalar(api, self.raw, index, &mem)
                }
                KernelArg::I32(v) => set_scalar(api, self.raw, index, &v),
                KernelArg::U32(v) => set_scalar(api, self.raw, index, &v),
                KernelArg::F32(v) => set_scalar(api, self.raw, index, &v),
            }
        };
        check_cl(code, "clSetKernelArg")?;
        self.bound[index] = true;
        Ok(())
    }

    fn first_unbound(&self) -> Option<usize> {
        self.bound.iter().position(|&b| !b)
    }

    fn api(&self) -> &'static OpenClApi {
        self.program.context().api()
    }
}

unsafe fn set_scalar<T>(api: &OpenClApi, kernel: ClKernel, index: usize, value: &T) -> i32 {
    (api.set_kernel_arg)(
        kernel,
        index as ClUint,
        std::mem::size_of::<T>(),
        value as *const T as *const c_void,
    )
}

impl Drop for Kernel<'_, '_> {
    fn drop(&mut self) {
        unsafe { (self.api().release_kernel)(self.raw) };
    }
}

/// Global and local work extents for one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchGeometry {
    pub global: Vec<usize>,
    /// `None` lets the driver choose the work-group shape.
    pub local: Option<Vec<usize>>,
}

impl LaunchGeometry {
    pub fn new(global: Vec<usize>, local: Option<Vec<usize>>) -> Self {
        Self { global, local }
    }

    /// Round each extent of `global` up to a multiple of the matching `local`
    /// extent, so kernels that guard their bounds can take any problem size.
    /// A zero local extent is kept as given and left to [`validate`](Self::validate).
    pub fn tiled(global: &[usize], local: &[usize]) -> Self {
        let rounded = global
            .iter()
            .zip(local)
            .map(|(&g, &l)| if l == 0 { g } else { g.div_ceil(l) * l })
            .collect::<Vec<_>>();
        Self { global: rounded, local: Some(local.to_vec()) }
    }

    pub fn dims(&self) -> usize {
        self.global.len()
    }

    /// Total work-items per work-group, if a local extent is set.
    pub fn local_volume(&self) -> Option<usize> {
        self.local.as_ref().map(|l| l.iter().product())
    }

    /// Check rank, divisibility, and the device work-group limit.
    pub fn validate(&self, max_work_group_size: usize) -> Result<(), ClError> {
        if !(1..=3).contains(&self.dims()) {
            return Err(ClError::InvalidGeometry(format!(
                "{} dimensions, expected 1 to 3",
                self.dims()
            )));
        }
        if self.global.iter().any(|&g| g == 0) {
            return Err(ClError::InvalidGeometry(format!("empty global extent {:?}", self.global)));
        }
        if let Some(local) = &self.local {
            if local.len() != self.dims() {
                return Err(ClError::InvalidGeometry(format!(
                    "local rank {} differs from global rank {}",
                    local.len(),
                    self.dims()
                )));
            }
            let indivisible =
                self.global.iter().zip(local).find(|&(&g, &l)| l == 0 || g % l != 0);
            if let Some((g, l)) = indivisible {
                return Err(ClError::InvalidGeometry(format!(
                    "global extent {} is not a multiple of local extent {}",
                    g, l
                )));
            }
            let volume: usize = local.iter().product();
            if volume > max_work_group_size {
                return Err(ClError::InvalidGeometry(format!(
                    "work-group of {} items exceeds the device limit of {}",
                    volume, max_work_group_size
                )));
            }
        }
        Ok(())
    }
}

/// Latency of one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchTiming {
    /// Host wall-clock around enqueue and wait.
    pub host: Duration,
    /// Device-reported start→end, when the queue has profiling enabled.
    pub device: Option<Duration>,
}

struct Event {
    raw: ClEvent,
    api: &'static OpenClApi,
}

impl Event {
    fn wait(&self) -> Result<(), ClError> {
        check_cl(unsafe { (self.api.wait_for_events)(1, &self.raw) }, "clWaitForEvents")
    }

    fn profiling_counter(&self, param: ClUint, call: &'static str) -> Result<ClUlong, ClError> {
        let (api, raw) = (self.api, self.raw);
        unsafe {
            info_scalar(
                |size, value, size_ret| {
                    (api.get_event_profiling_info)(raw, param, size, value, size_ret)
                },
                call,
            )
        }
    }

    fn elapsed(&self) -> Result<Duration, ClError> {
        let start =
            self.profiling_counter(CL_PROFILING_COMMAND_START, "clGetEventProfilingInfo(START)")?;
        let end =
            self.profiling_counter(CL_PROFILING_COMMAND_END, "clGetEventProfilingInfo(END)")?;
        Ok(Duration::from_nanos(end.saturating_sub(start)))
    }
}

impl Drop for Event {
    fn drop(&mut self) {
        unsafe { (self.api.release_event)(self.raw) };
    }
}

/// Launch `kernel` over `geometry` and block until it completes.
///
/// Every argument slot must be bound. Returning only after the completion
/// event fires means at most one dispatch is ever in flight, and any
/// readback that follows sees the kernel's results.
pub fn dispatch(
    kernel: &Kernel<'_, '_>,
    geometry: &LaunchGeometry,
    queue: &CommandQueue,
) -> Result<DispatchTiming, ClError> {
    if let Some(index) = kernel.first_unbound() {
        return Err(ClError::UnboundArgument { kernel: kernel.name.clone(), index });
    }
    let device = kernel.program.context().device();
    geometry.validate(device.max_work_group_size)?;

    let api = queue.api();
    let local_ptr = geometry.local.as_ref().map_or(std::ptr::null(), |l| l.as_ptr());
    tracing::debug!(
        kernel = %kernel.name,
        global = ?geometry.global,
        local = ?geometry.local,
        "enqueue"
    );

    let start = Instant::now();
    let mut raw_event: ClEvent = std::ptr::null_mut();
    check_cl(
        unsafe {
            (api.enqueue_nd_range_kernel)(
                queue.raw(),
                kernel.raw,
                geometry.dims() as ClUint,
                std::ptr::null(),
                geometry.global.as_ptr(),
                local_ptr,
                0,
                std::ptr::null(),
                &mut raw_event,
            )
        },
        "clEnqueueNDRangeKernel",
    )?;
    let event = Event { raw: check_handle(raw_event, 0, "clEnqueueNDRangeKernel")?, api };
    event.wait()?;
    let host = start.elapsed();

    let device_time = if queue.profiling() { Some(event.elapsed()?) } else { None };
    tracing::debug!(kernel = %kernel.name, ?host, device = ?device_time, "dispatch complete");
    Ok(DispatchTiming { host, device: device_time })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiled_rounds_up() {
        let g = LaunchGeometry::tiled(&[100, 17], &[16, 16]);
        assert_eq!(g.global, vec![112, 32]);
        assert_eq!(g.local, Some(vec![16, 16]));
        assert_eq!(g.local_volume(), Some(256));
        g.validate(256).unwrap();
    }

    #[test]
    fn test_tiled_exact_multiple_unchanged() {
        let g = LaunchGeometry::tiled(&[64, 32], &[16, 2]);
        assert_eq!(g.global, vec![64, 32]);
    }

    #[test]
    fn test_tiled_zero_local_is_invalid_not_panic() {
        let g = LaunchGeometry::tiled(&[4], &[0]);
        assert_eq!(g.global, vec![4]);
        assert!(matches!(g.validate(256), Err(ClError::InvalidGeometry(_))));
    }

    #[test]
    fn test_validate_rejects_bad_geometry() {
        let rank = LaunchGeometry::new(vec![], None);
        assert!(matches!(rank.validate(256), Err(ClError::InvalidGeometry(_))));

        let four_d = LaunchGeometry::new(vec![1, 1, 1, 1], None);
        assert!(four_d.validate(256).is_err());

        let mismatched = LaunchGeometry::new(vec![16, 16], Some(vec![16]));
        assert!(mismatched.validate(256).is_err());

        let indivisible = LaunchGeometry::new(vec![100], Some(vec![16]));
        assert!(indivisible.validate(256).is_err());

        let too_large = LaunchGeometry::new(vec![64, 64], Some(vec![32, 32]));
        assert!(too_large.validate(256).is_err());
        too_large.validate(1024).unwrap();
    }

    #[test]
    fn test_driver_chosen_local() {
        let g = LaunchGeometry::new(vec![256], None);
        assert_eq!(g.local_volume(), None);
        g.validate(1).unwrap();
    }
}
