//! # clmark-core
//!
//! OpenCL host runtime for benchmarking GEMM and prefix-sum kernels.
//!
//! Provides:
//! - Runtime-loaded OpenCL entry points (no build-time SDK dependency)
//! - Device discovery ordered discrete GPU → integrated GPU → CPU
//! - Runtime kernel compilation from a typed tuning header plus kernel source
//! - Scoped device buffers released on every exit path
//! - Timed, blocking kernel dispatch with device profiling
//! - Status-code diagnostics and a terminal error reporter
//!
//! ```no_run
//! use clmark_core::{
//!     discover, BuildOptions, Context, ContextOptions, KernelConfig, Matrix, Program, GEMM_SOURCE,
//! };
//! use clmark_core::ops::{gemm, GemmVariant};
//!
//! # fn main() -> clmark_core::Result<()> {
//! let catalog = discover()?;
//! let ctx = Context::new(catalog.select(0)?, ContextOptions::default())?;
//! let config = KernelConfig::default();
//! let header = config.render_header();
//! let program = Program::build(&ctx, &header, GEMM_SOURCE, &BuildOptions::default())?;
//! let a = Matrix::new(2, 2, vec![1.0, 2.0, 3.0, 4.0])?;
//! let run = gemm(&ctx, &program, GemmVariant::Tiled, &config, &a, &a)?;
//! println!("{:?} in {:?}", run.c, run.timings.dispatch.device);
//! # Ok(())
//! # }
//! ```

pub mod ffi;
pub mod status;
pub mod error;
pub mod device;
pub mod context;
pub mod config;
pub mod program;
pub mod memory;
pub mod launch;
pub mod matrix;
pub mod ops;
pub mod reference;

pub use config::KernelConfig;
pub use context::{CommandQueue, Context, ContextOptions};
pub use device::{discover, Device, DeviceCatalog, DeviceKind};
pub use error::ClError;
pub use launch::{dispatch, DispatchTiming, Kernel, KernelArg, LaunchGeometry};
pub use matrix::Matrix;
pub use memory::{AccessMode, Buffer};
pub use program::{BuildOptions, Program, GEMM_SOURCE, PREFIX_SUM_SOURCE};
pub use status::StatusCode;

pub type Result<T> = std::result::Result<T, ClError>;
