//! Runtime-loaded OpenCL entry points via dlopen.
//!
//! Nothing links against an OpenCL SDK at build time: the ICD loader
//! (`libOpenCL.so.1`, `OpenCL.dll`, or the macOS framework) is opened on first
//! use and every entry point the runtime needs is resolved once.

use std::ffi::{c_char, c_void};
use std::panic::Location;
use std::sync::OnceLock;

use libloading::Library;

use crate::error::ClError;
use crate::status::StatusCode;

// ---------------------------------------------------------------------------
// Scalar types and opaque handles
// ---------------------------------------------------------------------------

pub type ClInt = i32;
pub type ClUint = u32;
pub type ClUlong = u64;
pub type ClBool = u32;
pub type ClBitfield = u64;
pub type ClDeviceType = ClBitfield;
pub type ClContextProperties = isize;

pub type ClPlatformId = *mut c_void;
pub type ClDeviceId = *mut c_void;
pub type ClContext = *mut c_void;
pub type ClCommandQueue = *mut c_void;
pub type ClProgram = *mut c_void;
pub type ClKernel = *mut c_void;
pub type ClMem = *mut c_void;
pub type ClEvent = *mut c_void;

pub const CL_SUCCESS: ClInt = 0;
pub const CL_FALSE: ClBool = 0;
pub const CL_TRUE: ClBool = 1;

// cl_device_type bits
pub const CL_DEVICE_TYPE_CPU: ClDeviceType = 1 << 1;
pub const CL_DEVICE_TYPE_GPU: ClDeviceType = 1 << 2;
pub const CL_DEVICE_TYPE_ACCELERATOR: ClDeviceType = 1 << 3;
pub const CL_DEVICE_TYPE_ALL: ClDeviceType = 0xFFFF_FFFF;

// cl_device_info
pub const CL_DEVICE_TYPE: ClUint = 0x1000;
pub const CL_DEVICE_MAX_COMPUTE_UNITS: ClUint = 0x1002;
pub const CL_DEVICE_MAX_WORK_GROUP_SIZE: ClUint = 0x1004;
pub const CL_DEVICE_GLOBAL_MEM_SIZE: ClUint = 0x101F;
pub const CL_DEVICE_NAME: ClUint = 0x102B;
pub const CL_DEVICE_VENDOR: ClUint = 0x102C;
pub const CL_DEVICE_HOST_UNIFIED_MEMORY: ClUint = 0x1035;

// cl_command_queue_properties
pub const CL_QUEUE_PROFILING_ENABLE: ClBitfield = 1 << 1;

// cl_mem_flags
pub const CL_MEM_READ_WRITE: ClBitfield = 1 << 0;
pub const CL_MEM_READ_ONLY: ClBitfield = 1 << 2;

// cl_program_info / cl_program_build_info
pub const CL_PROGRAM_BINARY_SIZES: ClUint = 0x1165;
pub const CL_PROGRAM_BINARIES: ClUint = 0x1166;
pub const CL_PROGRAM_BUILD_LOG: ClUint = 0x1183;

// cl_kernel_info
pub const CL_KERNEL_NUM_ARGS: ClUint = 0x1191;

// cl_profiling_info
pub const CL_PROFILING_COMMAND_START: ClUint = 0x1282;
pub const CL_PROFILING_COMMAND_END: ClUint = 0x1283;

// ---------------------------------------------------------------------------
// Entry point signatures
// ---------------------------------------------------------------------------

type ContextNotify = Option<unsafe extern "C" fn(*const c_char, *const c_void, usize, *mut c_void)>;
type BuildNotify = Option<unsafe extern "C" fn(ClProgram, *mut c_void)>;

type FnGetPlatformIds = unsafe extern "C" fn(ClUint, *mut ClPlatformId, *mut ClUint) -> ClInt;
type FnGetDeviceIds = unsafe extern "C" fn(
    ClPlatformId, ClDeviceType, ClUint, *mut ClDeviceId, *mut ClUint,
) -> ClInt;
type FnGetDeviceInfo = unsafe extern "C" fn(
    ClDeviceId, ClUint, usize, *mut c_void, *mut usize,
) -> ClInt;
type FnCreateContext = unsafe extern "C" fn(
    *const ClContextProperties,
    ClUint,
    *const ClDeviceId,
    ContextNotify,
    *mut c_void,
    *mut ClInt,
) -> ClContext;
type FnReleaseContext = unsafe extern "C" fn(ClContext) -> ClInt;
type FnCreateCommandQueue = unsafe extern "C" fn(
    ClContext, ClDeviceId, ClBitfield, *mut ClInt,
) -> ClCommandQueue;
type FnReleaseCommandQueue = unsafe extern "C" fn(ClCommandQueue) -> ClInt;
type FnFinish = unsafe extern "C" fn(ClCommandQueue) -> ClInt;
type FnCreateProgramWithSource = unsafe extern "C" fn(
    ClContext, ClUint, *const *const c_char, *const usize, *mut ClInt,
) -> ClProgram;
type FnBuildProgram = unsafe extern "C" fn(
    ClProgram, ClUint, *const ClDeviceId, *const c_char, BuildNotify, *mut c_void,
) -> ClInt;
type FnGetProgramBuildInfo = unsafe extern "C" fn(
    ClProgram, ClDeviceId, ClUint, usize, *mut c_void, *mut usize,
) -> ClInt;
type FnGetProgramInfo = unsafe extern "C" fn(
    ClProgram, ClUint, usize, *mut c_void, *mut usize,
) -> ClInt;
type FnReleaseProgram = unsafe extern "C" fn(ClProgram) -> ClInt;
type FnCreateKernel = unsafe extern "C" fn(ClProgram, *const c_char, *mut ClInt) -> ClKernel;
type FnReleaseKernel = unsafe extern "C" fn(ClKernel) -> ClInt;
type FnGetKernelInfo = unsafe extern "C" fn(
    ClKernel, ClUint, usize, *mut c_void, *mut usize,
) -> ClInt;
type FnSetKernelArg = unsafe extern "C" fn(ClKernel, ClUint, usize, *const c_void) -> ClInt;
type FnCreateBuffer = unsafe extern "C" fn(
    ClContext, ClBitfield, usize, *mut c_void, *mut ClInt,
) -> ClMem;
type FnReleaseMemObject = unsafe extern "C" fn(ClMem) -> ClInt;
type FnEnqueueWriteBuffer = unsafe extern "C" fn(
    ClCommandQueue,
    ClMem,
    ClBool,        // blocking
    usize,         // offset
    usize,         // size
    *const c_void, // host ptr
    ClUint,
    *const ClEvent,
    *mut ClEvent,
) -> ClInt;
type FnEnqueueReadBuffer = unsafe extern "C" fn(
    ClCommandQueue,
    ClMem,
    ClBool,
    usize,
    usize,
    *mut c_void,
    ClUint,
    *const ClEvent,
    *mut ClEvent,
) -> ClInt;
type FnEnqueueNdRangeKernel = unsafe extern "C" fn(
    ClCommandQueue,
    ClKernel,
    ClUint,       // work_dim
    *const usize, // global offset (null)
    *const usize, // global size
    *const usize, // local size (null = driver chooses)
    ClUint,
    *const ClEvent,
    *mut ClEvent,
) -> ClInt;
type FnWaitForEvents = unsafe extern "C" fn(ClUint, *const ClEvent) -> ClInt;
type FnGetEventProfilingInfo = unsafe extern "C" fn(
    ClEvent, ClUint, usize, *mut c_void, *mut usize,
) -> ClInt;
type FnReleaseEvent = unsafe extern "C" fn(ClEvent) -> ClInt;

// ---------------------------------------------------------------------------
// Loaded API struct
// ---------------------------------------------------------------------------

pub struct OpenClApi {
    _lib: Library,
    pub get_platform_ids: FnGetPlatformIds,
    pub get_device_ids: FnGetDeviceIds,
    pub get_device_info: FnGetDeviceInfo,
    pub create_context: FnCreateContext,
    pub release_context: FnReleaseContext,
    pub create_command_queue: FnCreateCommandQueue,
    pub release_command_queue: FnReleaseCommandQueue,
    pub finish: FnFinish,
    pub create_program_with_source: FnCreateProgramWithSource,
    pub build_program: FnBuildProgram,
    pub get_program_build_info: FnGetProgramBuildInfo,
    pub get_program_info: FnGetProgramInfo,
    pub release_program: FnReleaseProgram,
    pub create_kernel: FnCreateKernel,
    pub release_kernel: FnReleaseKernel,
    pub get_kernel_info: FnGetKernelInfo,
    pub set_kernel_arg: FnSetKernelArg,
    pub create_buffer: FnCreateBuffer,
    pub release_mem_object: FnReleaseMemObject,
    pub enqueue_write_buffer: FnEnqueueWriteBuffer,
    pub enqueue_read_buffer: FnEnqueueReadBuffer,
    pub enqueue_nd_range_kernel: FnEnqueueNdRangeKernel,
    pub wait_for_events: FnWaitForEvents,
    pub get_event_profiling_info: FnGetEventProfilingInfo,
    pub release_event: FnReleaseEvent,
}

// Safety: the ICD loader's entry points are process-global and the OpenCL
// 1.2 API is thread-safe apart from clSetKernelArg, which is only reached
// through `&mut Kernel`.
unsafe impl Send for OpenClApi {}
unsafe impl Sync for OpenClApi {}

#[cfg(target_os = "windows")]
const LIBRARY_CANDIDATES: &[&str] = &["OpenCL.dll"];
#[cfg(target_os = "macos")]
const LIBRARY_CANDIDATES: &[&str] = &["/System/Library/Frameworks/OpenCL.framework/OpenCL"];
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const LIBRARY_CANDIDATES: &[&str] = &["libOpenCL.so.1", "libOpenCL.so"];

static OPENCL_API: OnceLock<Result<OpenClApi, String>> = OnceLock::new();

impl OpenClApi {
    fn try_load() -> Result<Self, String> {
        let lib = LIBRARY_CANDIDATES
            .iter()
            .find_map(|name| unsafe { Library::new(name) }.ok())
            .ok_or_else(|| format!("none of {:?} could be loaded", LIBRARY_CANDIDATES))?;

        macro_rules! sym {
            ($ty:ty, $name:literal) => {
                *lib.get::<$ty>(concat!($name, "\0").as_bytes())
                    .map_err(|e| format!("missing symbol {}: {}", $name, e))?
            };
        }

        unsafe {
            let api = OpenClApi {
                get_platform_ids: sym!(FnGetPlatformIds, "clGetPlatformIDs"),
                get_device_ids: sym!(FnGetDeviceIds, "clGetDeviceIDs"),
                get_device_info: sym!(FnGetDeviceInfo, "clGetDeviceInfo"),
                create_context: sym!(FnCreateContext, "clCreateContext"),
                release_context: sym!(FnReleaseContext, "clReleaseContext"),
                create_command_queue: sym!(FnCreateCommandQueue, "clCreateCommandQueue"),
                release_command_queue: sym!(FnReleaseCommandQueue, "clReleaseCommandQueue"),
                finish: sym!(FnFinish, "clFinish"),
                create_program_with_source: sym!(
                    FnCreateProgramWithSource,
                    "clCreateProgramWithSource"
                ),
                build_program: sym!(FnBuildProgram, "clBuildProgram"),
                get_program_build_info: sym!(FnGetProgramBuildInfo, "clGetProgramBuildInfo"),
                get_program_info: sym!(FnGetProgramInfo, "clGetProgramInfo"),
                release_program: sym!(FnReleaseProgram, "clReleaseProgram"),
                create_kernel: sym!(FnCreateKernel, "clCreateKernel"),
                release_kernel: sym!(FnReleaseKernel, "clReleaseKernel"),
                get_kernel_info: sym!(FnGetKernelInfo, "clGetKernelInfo"),
                set_kernel_arg: sym!(FnSetKernelArg, "clSetKernelArg"),
                create_buffer: sym!(FnCreateBuffer, "clCreateBuffer"),
                release_mem_object: sym!(FnReleaseMemObject, "clReleaseMemObject"),
                enqueue_write_buffer: sym!(FnEnqueueWriteBuffer, "clEnqueueWriteBuffer"),
                enqueue_read_buffer: sym!(FnEnqueueReadBuffer, "clEnqueueReadBuffer"),
                enqueue_nd_range_kernel: sym!(FnEnqueueNdRangeKernel, "clEnqueueNDRangeKernel"),
                wait_for_events: sym!(FnWaitForEvents, "clWaitForEvents"),
                get_event_profiling_info: sym!(FnGetEventProfilingInfo, "clGetEventProfilingInfo"),
                release_event: sym!(FnReleaseEvent, "clReleaseEvent"),
                _lib: lib,
            };
            Ok(api)
        }
    }
}

/// Get the runtime-loaded OpenCL API, loading it on first call.
pub fn opencl_api() -> Result<&'static OpenClApi, ClError> {
    OPENCL_API
        .get_or_init(OpenClApi::try_load)
        .as_ref()
        .map_err(|reason| ClError::RuntimeUnavailable(reason.clone()))
}

/// Whether an OpenCL ICD loader is present on this host.
pub fn is_opencl_available() -> bool {
    opencl_api().is_ok()
}

// ---------------------------------------------------------------------------
// Error checking helpers
// ---------------------------------------------------------------------------

/// Check an OpenCL status code, recording the entry point and the caller.
#[track_caller]
pub fn check_cl(code: ClInt, call: &'static str) -> Result<(), ClError> {
    if code == CL_SUCCESS {
        Ok(())
    } else {
        Err(ClError::Status {
            code: StatusCode(code),
            call,
            location: Location::caller(),
        })
    }
}

/// Check the `errcode_ret` of a create call and the returned handle together.
#[track_caller]
pub fn check_handle(
    handle: *mut c_void,
    code: ClInt,
    call: &'static str,
) -> Result<*mut c_void, ClError> {
    check_cl(code, call)?;
    if handle.is_null() {
        // Some drivers leave errcode at CL_SUCCESS on failure; treat null as invalid value.
        return Err(ClError::Status {
            code: StatusCode::INVALID_VALUE,
            call,
            location: Location::caller(),
        });
    }
    Ok(handle)
}

/// Read a fixed-size scalar through one of the `clGet*Info` queries.
///
/// # Safety
/// `T` must match the size and layout the runtime writes for `param`.
pub unsafe fn info_scalar<T: Default>(
    query: impl FnOnce(usize, *mut c_void, *mut usize) -> ClInt,
    call: &'static str,
) -> Result<T, ClError> {
    let mut value = T::default();
    check_cl(
        query(std::mem::size_of::<T>(), &mut value as *mut T as *mut c_void, std::ptr::null_mut()),
        call,
    )?;
    Ok(value)
}

/// Read a variable-length byte payload (size query, then fetch).
pub fn info_bytes(
    mut query: impl FnMut(usize, *mut c_void, *mut usize) -> ClInt,
    call: &'static str,
) -> Result<Vec<u8>, ClError> {
    let mut size: usize = 0;
    check_cl(query(0, std::ptr::null_mut(), &mut size), call)?;
    let mut buf = vec![0u8; size];
    if size > 0 {
        check_cl(query(size, buf.as_mut_ptr() as *mut c_void, std::ptr::null_mut()), call)?;
    }
    Ok(buf)
}

/// Read a NUL-terminated string payload.
pub fn info_string(
    query: impl FnMut(usize, *mut c_void, *mut usize) -> ClInt,
    call: &'static str,
) -> Result<String, ClError> {
    let bytes = info_bytes(query, call)?;
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    Ok(String::from_utf8_lossy(&bytes[..end]).trim_end().to_string())
}
