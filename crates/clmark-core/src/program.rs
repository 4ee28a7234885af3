//! Runtime kernel compilation.
//!
//! A program is one compilation unit: the rendered header followed by the
//! kernel body. The compiler's status code decides success; the build log is
//! only ever diagnostic text.

use std::ffi::{c_char, c_void, CString};
use std::panic::Location;
use std::path::{Path, PathBuf};

use crate::context::Context;
use crate::error::ClError;
use crate::ffi::{
    check_cl, check_handle, info_bytes, ClProgram, CL_PROGRAM_BINARIES, CL_PROGRAM_BINARY_SIZES,
    CL_PROGRAM_BUILD_LOG, CL_SUCCESS,
};
use crate::launch::Kernel;
use crate::status::StatusCode;

/// GEMM kernels `myGEMM1`..`myGEMM3`.
pub const GEMM_SOURCE: &str = include_str!("../kernels/gemm.cl");
/// The `inclusive_prefix_sum` kernel.
pub const PREFIX_SUM_SOURCE: &str = include_str!("../kernels/prefix_sum.cl");

/// Build logs longer than this are echoed as a compiler message.
const BUILD_LOG_NOTICE_LEN: usize = 10;

/// Options for [`Program::build`].
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Passed verbatim to `clBuildProgram`.
    pub compiler_options: String,
    /// Write the compiled binary here after a successful build.
    pub binary_dump: Option<PathBuf>,
}

/// Read kernel source text from disk.
pub fn read_source(path: &Path) -> Result<String, ClError> {
    std::fs::read_to_string(path).map_err(|e| ClError::file_access(path, e))
}

/// A program compiled for the context's device.
pub struct Program<'ctx> {
    raw: ClProgram,
    ctx: &'ctx Context,
    log: String,
}

impl<'ctx> Program<'ctx> {
    /// Compile `header` followed by `source` for the context's device.
    #[track_caller]
    pub fn build(
        ctx: &'ctx Context,
        header: &str,
        source: &str,
        options: &BuildOptions,
    ) -> Result<Self, ClError> {
        let api = ctx.api();
        let code = format!("{}\n{}", header, source);
        let strings = [code.as_ptr() as *const c_char];
        let lengths = [code.len()];

        let mut err = 0;
        let raw = unsafe {
            (api.create_program_with_source)(
                ctx.raw(),
                1,
                strings.as_ptr(),
                lengths.as_ptr(),
                &mut err,
            )
        };
        let mut program = Program {
            raw: check_handle(raw, err, "clCreateProgramWithSource")?,
            ctx,
            log: String::new(),
        };

        let opts = CString::new(options.compiler_options.as_str())
            .map_err(|_| ClError::InvalidArgument("compiler options contain a NUL byte".into()))?;
        let device_id = ctx.device().id().raw();
        let status = unsafe {
            (api.build_program)(
                program.raw,
                1,
                &device_id,
                opts.as_ptr(),
                None,
                std::ptr::null_mut(),
            )
        };

        program.log = match program.fetch_build_log() {
            Ok(log) => log,
            Err(e) => {
                tracing::warn!("could not read build log: {}", e);
                String::new()
            }
        };
        if program.log.len() > BUILD_LOG_NOTICE_LEN {
            tracing::warn!(device = %ctx.device().name, ">>> Compiler message: {}", program.log);
        }

        if status != CL_SUCCESS {
            return Err(ClError::CompileFailure {
                code: StatusCode(status),
                log: program.log.clone(),
                location: Location::caller(),
            });
        }
        tracing::info!(bytes = code.len(), "program built");

        if let Some(path) = &options.binary_dump {
            program.dump_binary(path)?;
        }
        Ok(program)
    }

    /// Compiler output for the last build. May be empty.
    pub fn build_log(&self) -> &str {
        &self.log
    }

    /// Create a kernel for the named entry point.
    pub fn kernel<'b>(&self, name: &str) -> Result<Kernel<'_, 'b>, ClError> {
        Kernel::new(self, name)
    }

    /// The compiled device binary (PTX, SPIR-V, ISA... depending on vendor).
    pub fn binary(&self) -> Result<Vec<u8>, ClError> {
        let api = self.ctx.api();
        let mut size: usize = 0;
        check_cl(
            unsafe {
                (api.get_program_info)(
                    self.raw,
                    CL_PROGRAM_BINARY_SIZES,
                    std::mem::size_of::<usize>(),
                    &mut size as *mut usize as *mut c_void,
                    std::ptr::null_mut(),
                )
            },
            "clGetProgramInfo(BINARY_SIZES)",
        )?;

        let mut binary = vec![0u8; size];
        let mut ptrs = [binary.as_mut_ptr()];
        check_cl(
            unsafe {
                (api.get_program_info)(
                    self.raw,
                    CL_PROGRAM_BINARIES,
                    std::mem::size_of_val(&ptrs),
                    ptrs.as_mut_ptr() as *mut c_void,
                    std::ptr::null_mut(),
                )
            },
            "clGetProgramInfo(BINARIES)",
        )?;
        Ok(binary)
    }

    /// Write the compiled binary to `path` for offline inspection.
    pub fn dump_binary(&self, path: &Path) -> Result<(), ClError> {
        let binary = self.binary()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ClError::file_access(parent, e))?;
        }
        std::fs::write(path, &binary).map_err(|e| ClError::file_access(path, e))?;
        tracing::info!(path = %path.display(), bytes = binary.len(), "program binary written");
        Ok(())
    }

    pub(crate) fn raw(&self) -> ClProgram {
        self.raw
    }

    pub(crate) fn context(&self) -> &'ctx Context {
        self.ctx
    }

    fn fetch_build_log(&self) -> Result<String, ClError> {
        let api = self.ctx.api();
        let device_id = self.ctx.device().id().raw();
        let bytes = info_bytes(
            |size, value, size_ret| unsafe {
                (api.get_program_build_info)(
                    self.raw,
                    device_id,
                    CL_PROGRAM_BUILD_LOG,
                    size,
                    value,
                    size_ret,
                )
            },
            "clGetProgramBuildInfo(BUILD_LOG)",
        )?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).trim().to_string())
    }
}

impl Drop for Program<'_> {
    fn drop(&mut self) {
        unsafe { (self.ctx.api().release_program)(self.raw) };
    }
}
