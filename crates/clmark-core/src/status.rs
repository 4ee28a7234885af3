//! OpenCL status codes and the terminal error reporter.
//!
//! Every status code the runtime can return maps to a symbolic name and a
//! human-readable message through one static table. Codes outside the table
//! fall back to "Unknown with code N".

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use crate::error::ClError;

/// Raw status code returned by an OpenCL entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(pub i32);

impl StatusCode {
    pub const SUCCESS: StatusCode = StatusCode(0);
    pub const DEVICE_NOT_FOUND: StatusCode = StatusCode(-1);
    pub const BUILD_PROGRAM_FAILURE: StatusCode = StatusCode(-11);
    pub const INVALID_VALUE: StatusCode = StatusCode(-30);
    pub const INVALID_KERNEL_NAME: StatusCode = StatusCode(-46);
    pub const PLATFORM_NOT_FOUND: StatusCode = StatusCode(-1001);

    /// Symbolic name (`CL_OUT_OF_RESOURCES`), if the code is known.
    pub fn symbol(self) -> Option<&'static str> {
        status_table().get(&self.0).map(|entry| entry.0)
    }

    /// Human-readable description, if the code is known.
    pub fn message(self) -> Option<&'static str> {
        status_table().get(&self.0).map(|entry| entry.1)
    }

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match status_table().get(&self.0) {
            Some((symbol, message)) => write!(f, "{} ({}, code {})", message, symbol, self.0),
            None => write!(f, "Unknown with code {}", self.0),
        }
    }
}

/// (code, symbol, message). The clBLAS range shares the table so vendor
/// BLAS errors surfacing through the same queue render the same way.
const STATUS_ENTRIES: &[(i32, &str, &str)] = &[
    (0, "CL_SUCCESS", "Success"),
    (-1, "CL_DEVICE_NOT_FOUND", "Device not found"),
    (-2, "CL_DEVICE_NOT_AVAILABLE", "Device not available"),
    (-3, "CL_COMPILER_NOT_AVAILABLE", "Compiler not available"),
    (-4, "CL_MEM_OBJECT_ALLOCATION_FAILURE", "Memory object allocation failure"),
    (-5, "CL_OUT_OF_RESOURCES", "Out of resources"),
    (-6, "CL_OUT_OF_HOST_MEMORY", "Out of host memory"),
    (-7, "CL_PROFILING_INFO_NOT_AVAILABLE", "Profiling information not available"),
    (-8, "CL_MEM_COPY_OVERLAP", "Memory copy overlap"),
    (-9, "CL_IMAGE_FORMAT_MISMATCH", "Image format mismatch"),
    (-10, "CL_IMAGE_FORMAT_NOT_SUPPORTED", "Image format not supported"),
    (-11, "CL_BUILD_PROGRAM_FAILURE", "Program build failure"),
    (-12, "CL_MAP_FAILURE", "Map failure"),
    (-30, "CL_INVALID_VALUE", "Invalid value"),
    (-31, "CL_INVALID_DEVICE_TYPE", "Invalid device type"),
    (-32, "CL_INVALID_PLATFORM", "Invalid platform"),
    (-33, "CL_INVALID_DEVICE", "Invalid device"),
    (-34, "CL_INVALID_CONTEXT", "Invalid context"),
    (-35, "CL_INVALID_QUEUE_PROPERTIES", "Invalid queue properties"),
    (-36, "CL_INVALID_COMMAND_QUEUE", "Invalid command queue"),
    (-37, "CL_INVALID_HOST_PTR", "Invalid host pointer"),
    (-38, "CL_INVALID_MEM_OBJECT", "Invalid memory object"),
    (-39, "CL_INVALID_IMAGE_FORMAT_DESCRIPTOR", "Invalid image format descriptor"),
    (-40, "CL_INVALID_IMAGE_SIZE", "Invalid image size"),
    (-41, "CL_INVALID_SAMPLER", "Invalid sampler"),
    (-42, "CL_INVALID_BINARY", "Invalid binary"),
    (-43, "CL_INVALID_BUILD_OPTIONS", "Invalid build options"),
    (-44, "CL_INVALID_PROGRAM", "Invalid program"),
    (-45, "CL_INVALID_PROGRAM_EXECUTABLE", "Invalid program executable"),
    (-46, "CL_INVALID_KERNEL_NAME", "Invalid kernel name"),
    (-47, "CL_INVALID_KERNEL_DEFINITION", "Invalid kernel definition"),
    (-48, "CL_INVALID_KERNEL", "Invalid kernel"),
    (-49, "CL_INVALID_ARG_INDEX", "Invalid argument index"),
    (-50, "CL_INVALID_ARG_VALUE", "Invalid argument value"),
    (-51, "CL_INVALID_ARG_SIZE", "Invalid argument size"),
    (-52, "CL_INVALID_KERNEL_ARGS", "Invalid kernel arguments"),
    (-53, "CL_INVALID_WORK_DIMENSION", "Invalid work dimension"),
    (-54, "CL_INVALID_WORK_GROUP_SIZE", "Invalid work group size"),
    (-55, "CL_INVALID_WORK_ITEM_SIZE", "Invalid work item size"),
    (-56, "CL_INVALID_GLOBAL_OFFSET", "Invalid global offset"),
    (-57, "CL_INVALID_EVENT_WAIT_LIST", "Invalid event wait list"),
    (-58, "CL_INVALID_EVENT", "Invalid event"),
    (-59, "CL_INVALID_OPERATION", "Invalid operation"),
    (-60, "CL_INVALID_GL_OBJECT", "Invalid OpenGL object"),
    (-61, "CL_INVALID_BUFFER_SIZE", "Invalid buffer size"),
    (-62, "CL_INVALID_MIP_LEVEL", "Invalid mip-map level"),
    (-1001, "CL_PLATFORM_NOT_FOUND_KHR", "No OpenCL platform found (no GPU available?)"),
    (-1007, "clblasInsufficientMemVecY", "*clBLAS* The memory object for Vector Y is too small"),
    (-1008, "clblasInsufficientMemVecX", "*clBLAS* The memory object for Vector X is too small"),
    (-1009, "clblasInsufficientMemMatC", "*clBLAS* The memory object for Matrix C is too small"),
    (-1010, "clblasInsufficientMemMatB", "*clBLAS* The memory object for Matrix B is too small"),
    (-1011, "clblasInsufficientMemMatA", "*clBLAS* The memory object for Matrix A is too small"),
    (-1012, "clblasInvalidIncY", "*clBLAS* The increment for a vector Y must not be 0"),
    (-1013, "clblasInvalidIncX", "*clBLAS* The increment for a vector X must not be 0"),
    (
        -1014,
        "clblasInvalidLeadDimC",
        "*clBLAS* Leading dimension C must not be less than the size of the third dimension",
    ),
    (
        -1015,
        "clblasInvalidLeadDimB",
        "*clBLAS* Leading dimension B must not be less than the size of the second dimension",
    ),
    (
        -1016,
        "clblasInvalidLeadDimA",
        "*clBLAS* Leading dimension A must not be less than the size of the first dimension",
    ),
    (-1017, "clblasInvalidDim", "*clBLAS* An input dimension (M,N,K) is invalid"),
    (-1018, "clblasInvalidVecY", "*clBLAS* Vector Y is not a valid memory object"),
    (-1019, "clblasInvalidVecX", "*clBLAS* Vector X is not a valid memory object"),
    (-1020, "clblasInvalidMatC", "*clBLAS* Matrix C is not a valid memory object"),
    (-1021, "clblasInvalidMatB", "*clBLAS* Matrix B is not a valid memory object"),
    (-1022, "clblasInvalidMatA", "*clBLAS* Matrix A is not a valid memory object"),
    (-1023, "clblasNotInitialized", "*clBLAS* Library is not initialized yet"),
    (-1024, "clblasNotImplemented", "*clBLAS* Functionality is not implemented"),
];

static STATUS_TABLE: OnceLock<HashMap<i32, (&'static str, &'static str)>> = OnceLock::new();

fn status_table() -> &'static HashMap<i32, (&'static str, &'static str)> {
    STATUS_TABLE.get_or_init(|| {
        STATUS_ENTRIES
            .iter()
            .map(|&(code, symbol, message)| (code, (symbol, message)))
            .collect()
    })
}

/// Render the one-line diagnostic `report` prints, without exiting.
pub fn diagnostic(err: &ClError) -> String {
    match err {
        ClError::Status { location, .. } | ClError::CompileFailure { location, .. } => {
            format!("-- Error at {}:{}: {}", location.file(), location.line(), err)
        }
        _ => format!("-- Error: {}", err),
    }
}

/// Log a fatal error and terminate the process.
///
/// There is no recoverable path through here: every call exits with status 1.
pub fn report(err: &ClError) -> ! {
    let line = diagnostic(err);
    tracing::error!(error = %err, "{}", line);
    if let ClError::CompileFailure { log, .. } = err {
        if !log.is_empty() {
            eprintln!(">>> Compiler message:\n{}", log);
        }
    }
    eprintln!("{}", line);
    std::process::exit(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes() {
        assert_eq!(StatusCode(-5).symbol(), Some("CL_OUT_OF_RESOURCES"));
        assert_eq!(StatusCode(-46).message(), Some("Invalid kernel name"));
        assert_eq!(
            StatusCode(-1017).message(),
            Some("*clBLAS* An input dimension (M,N,K) is invalid")
        );
        assert!(StatusCode(0).is_success());
    }

    #[test]
    fn test_unknown_code_fallback() {
        let code = StatusCode(-9999);
        assert_eq!(code.symbol(), None);
        assert_eq!(code.to_string(), "Unknown with code -9999");
    }

    #[test]
    fn test_display_includes_symbol_and_code() {
        let s = StatusCode::BUILD_PROGRAM_FAILURE.to_string();
        assert_eq!(s, "Program build failure (CL_BUILD_PROGRAM_FAILURE, code -11)");
    }

    #[test]
    fn test_table_has_no_duplicate_codes() {
        assert_eq!(status_table().len(), STATUS_ENTRIES.len());
    }

    #[test]
    fn test_diagnostic_carries_call_site() {
        let err = crate::ffi::check_cl(-38, "clEnqueueReadBuffer").unwrap_err();
        let line = diagnostic(&err);
        assert!(line.starts_with("-- Error at "), "{line}");
        assert!(line.contains("status.rs:"), "{line}");
        assert!(line.contains("Invalid memory object"), "{line}");
        assert!(line.contains("clEnqueueReadBuffer"), "{line}");
    }

    #[test]
    fn test_compile_failure_diagnostic_names_build_site() {
        let err = ClError::CompileFailure {
            code: StatusCode::BUILD_PROGRAM_FAILURE,
            log: "error: expected expression".into(),
            location: std::panic::Location::caller(),
        };
        let line = diagnostic(&err);
        assert!(line.starts_with("-- Error at "), "{line}");
        assert!(line.contains("status.rs:"), "{line}");
        assert!(line.contains("CL_BUILD_PROGRAM_FAILURE"), "{line}");
    }

    #[test]
    fn test_diagnostic_without_location() {
        let err = ClError::NoDevices;
        assert!(diagnostic(&err).starts_with("-- Error: "));
    }
}
