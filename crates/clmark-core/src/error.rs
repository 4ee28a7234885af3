use std::panic::Location;
use std::path::PathBuf;

use crate::status::StatusCode;

/// Errors raised by the OpenCL host runtime.
#[derive(Debug, thiserror::Error)]
pub enum ClError {
    #[error("OpenCL runtime not available: {0}")]
    RuntimeUnavailable(String),

    #[error("No devices found. Check OpenCL installation!")]
    NoDevices,

    #[error("Device index {index} out of range ({count} devices available)")]
    InvalidDeviceIndex { index: usize, count: usize },

    #[error("Cannot access file {}: {source}", .path.display())]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Kernel compilation failed: {code}")]
    CompileFailure {
        code: StatusCode,
        log: String,
        location: &'static Location<'static>,
    },

    #[error("{call} failed: {code}")]
    Status {
        code: StatusCode,
        call: &'static str,
        location: &'static Location<'static>,
    },

    #[error("Kernel '{kernel}' argument {index} is not bound")]
    UnboundArgument { kernel: String, index: usize },

    #[error("Kernel '{kernel}' takes {expected} arguments, got {got}")]
    ArgumentCount { kernel: String, expected: usize, got: usize },

    #[error("Invalid launch geometry: {0}")]
    InvalidGeometry(String),

    #[error("Size mismatch: buffer holds {expected} bytes, host array has {got}")]
    SizeMismatch { expected: usize, got: usize },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid kernel configuration: {0}")]
    InvalidConfig(String),

    #[error("Malformed input: {0}")]
    InvalidInput(String),

    #[error("Result mismatch at element {index}: expected {expected}, got {got}")]
    Mismatch { index: usize, expected: f32, got: f32 },
}

impl ClError {
    /// Wrap an I/O failure on `path`.
    pub fn file_access(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ClError::FileAccess { path: path.into(), source }
    }

    /// The runtime status code behind this error, when there is one.
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            ClError::Status { code, .. } | ClError::CompileFailure { code, .. } => Some(*code),
            _ => None,
        }
    }
}
