//! GEMM and inclusive prefix-sum pipelines.
//!
//! Each workload provisions its buffers, binds the kernel in its fixed
//! argument order, dispatches, and reads the result back. The returned
//! timings separate the dispatch itself from the whole bind → dispatch →
//! readback sequence.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use crate::config::KernelConfig;
use crate::context::Context;
use crate::error::ClError;
use crate::launch::{dispatch, DispatchTiming, KernelArg, LaunchGeometry};
use crate::matrix::Matrix;
use crate::memory::{AccessMode, Buffer};
use crate::program::Program;

/// Name of the prefix-sum entry point.
pub const PREFIX_SUM_KERNEL: &str = "inclusive_prefix_sum";

/// Timings for one workload run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunTimings {
    pub dispatch: DispatchTiming,
    /// Host wall-clock from argument binding through readback.
    pub total: Duration,
}

/// GEMM kernel variant, selected by index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GemmVariant {
    /// One work-item per output element.
    Naive,
    /// Local-memory tiles of `TS x TS`.
    Tiled,
    /// Tiles, with `WPT` outputs per work-item.
    WorkPerThread,
}

impl GemmVariant {
    pub const ALL: [GemmVariant; 3] =
        [GemmVariant::Naive, GemmVariant::Tiled, GemmVariant::WorkPerThread];

    pub fn from_index(index: usize) -> Result<Self, ClError> {
        Self::ALL.get(index).copied().ok_or_else(|| {
            ClError::InvalidArgument(format!(
                "GEMM variant {} out of range (0..{})",
                index,
                Self::ALL.len()
            ))
        })
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Entry point name: variant `i` runs `myGEMM{i+1}`.
    pub fn kernel_name(self) -> String {
        format!("myGEMM{}", self.index() + 1)
    }

    /// Launch geometry for a `m x n` result. Rejects an invalid `config`.
    pub fn geometry(
        self,
        m: usize,
        n: usize,
        config: &KernelConfig,
    ) -> Result<LaunchGeometry, ClError> {
        config.validate()?;
        let ts = config.tile_size;
        let geometry = match self {
            GemmVariant::Naive | GemmVariant::Tiled => LaunchGeometry::tiled(&[m, n], &[ts, ts]),
            GemmVariant::WorkPerThread => {
                let rts = config.reduced_tile();
                let tiles = LaunchGeometry::tiled(&[m, n], &[ts, ts]);
                LaunchGeometry::new(
                    vec![tiles.global[0], tiles.global[1] / ts * rts],
                    Some(vec![ts, rts]),
                )
            }
        };
        Ok(geometry)
    }
}

impl fmt::Display for GemmVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            GemmVariant::Naive => "naive",
            GemmVariant::Tiled => "tiled",
            GemmVariant::WorkPerThread => "work-per-thread",
        };
        write!(f, "{} ({})", self.kernel_name(), label)
    }
}

impl FromStr for GemmVariant {
    type Err = ClError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let index = s.parse::<usize>().map_err(|_| {
            ClError::InvalidArgument(format!("GEMM variant must be an index, got {:?}", s))
        })?;
        Self::from_index(index)
    }
}

/// Result of [`gemm`].
#[derive(Debug, Clone)]
pub struct GemmRun {
    pub c: Matrix,
    pub timings: RunTimings,
}

/// Result of [`inclusive_prefix_sum`].
#[derive(Debug, Clone)]
pub struct ScanRun {
    pub output: Vec<f32>,
    pub timings: RunTimings,
}

fn dim_i32(name: &str, value: usize) -> Result<i32, ClError> {
    i32::try_from(value).map_err(|_| {
        ClError::InvalidArgument(format!(
            "{} = {} does not fit the kernel's int argument",
            name, value
        ))
    })
}

/// Compute `C = A * B` on the context's device.
///
/// `program` must have been built from the GEMM kernels with `config`'s header.
pub fn gemm(
    ctx: &Context,
    program: &Program<'_>,
    variant: GemmVariant,
    config: &KernelConfig,
    a: &Matrix,
    b: &Matrix,
) -> Result<GemmRun, ClError> {
    if a.cols() != b.rows() {
        return Err(ClError::InvalidArgument(format!(
            "inner dimensions differ: A is {}x{}, B is {}x{}",
            a.rows(),
            a.cols(),
            b.rows(),
            b.cols()
        )));
    }
    config.validate()?;
    let (m, k, n) = (a.rows(), a.cols(), b.cols());
    if m == 0 || n == 0 || k == 0 {
        return Err(ClError::InvalidArgument(format!("empty GEMM: M={} N={} K={}", m, n, k)));
    }
    let (m_arg, n_arg, k_arg) = (dim_i32("M", m)?, dim_i32("N", n)?, dim_i32("K", k)?);

    let buf_a = Buffer::from_host(ctx, a.as_slice(), AccessMode::ReadOnly)?;
    let buf_b = Buffer::from_host(ctx, b.as_slice(), AccessMode::ReadOnly)?;
    let buf_c = Buffer::new(ctx, m * n * std::mem::size_of::<f32>(), AccessMode::ReadWrite)?;

    let full_start = Instant::now();
    let mut kernel = program.kernel(&variant.kernel_name())?;
    kernel.bind(&[
        KernelArg::I32(m_arg),
        KernelArg::I32(n_arg),
        KernelArg::I32(k_arg),
        KernelArg::Buffer(&buf_a),
        KernelArg::Buffer(&buf_b),
        KernelArg::Buffer(&buf_c),
    ])?;

    let geometry = variant.geometry(m, n, config)?;
    let timing = dispatch(&kernel, &geometry, ctx.queue())?;
    let c = buf_c.to_host()?;
    let total = full_start.elapsed();

    tracing::info!(%variant, m, n, k, ?timing, ?total, "gemm complete");
    Ok(GemmRun {
        c: Matrix::new(m, n, c)?,
        timings: RunTimings { dispatch: timing, total },
    })
}

/// Inclusive prefix sum of `input` on the context's device.
///
/// An empty input returns an empty output without touching the device.
pub fn inclusive_prefix_sum(
    ctx: &Context,
    program: &Program<'_>,
    config: &KernelConfig,
    input: &[f32],
) -> Result<ScanRun, ClError> {
    config.validate()?;
    if input.is_empty() {
        return Ok(ScanRun {
            output: Vec::new(),
            timings: RunTimings {
                dispatch: DispatchTiming { host: Duration::ZERO, device: None },
                total: Duration::ZERO,
            },
        });
    }
    let n = dim_i32("N", input.len())?;

    let buf_in = Buffer::from_host(ctx, input, AccessMode::ReadOnly)?;
    let buf_out = Buffer::new(ctx, std::mem::size_of_val(input), AccessMode::ReadWrite)?;

    let full_start = Instant::now();
    let mut kernel = program.kernel(PREFIX_SUM_KERNEL)?;
    kernel.bind(&[KernelArg::Buffer(&buf_in), KernelArg::Buffer(&buf_out), KernelArg::I32(n)])?;

    let geometry = LaunchGeometry::new(vec![config.scan_work_size], None);
    let timing = dispatch(&kernel, &geometry, ctx.queue())?;
    let output = buf_out.to_host()?;
    let total = full_start.elapsed();

    tracing::info!(n, ?timing, ?total, "prefix sum complete");
    Ok(ScanRun { output, timings: RunTimings { dispatch: timing, total } })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_names() {
        assert_eq!(GemmVariant::from_index(0).unwrap().kernel_name(), "myGEMM1");
        assert_eq!(GemmVariant::from_index(2).unwrap().kernel_name(), "myGEMM3");
        assert!(GemmVariant::from_index(3).is_err());
        assert_eq!("1".parse::<GemmVariant>().unwrap(), GemmVariant::Tiled);
        assert!("x".parse::<GemmVariant>().is_err());
        assert_eq!(GemmVariant::Tiled.to_string(), "myGEMM2 (tiled)");
    }

    #[test]
    fn test_gemm_geometry() {
        let cfg = KernelConfig { tile_size: 16, work_per_thread: 8, ..Default::default() };

        let g = GemmVariant::Naive.geometry(100, 33, &cfg).unwrap();
        assert_eq!(g.global, vec![112, 48]);
        assert_eq!(g.local, Some(vec![16, 16]));

        let g = GemmVariant::WorkPerThread.geometry(100, 33, &cfg).unwrap();
        assert_eq!(g.global, vec![112, 6]);
        assert_eq!(g.local, Some(vec![16, 2]));
        g.validate(256).unwrap();
    }

    #[test]
    fn test_geometry_rejects_invalid_config() {
        let zero_tile = KernelConfig { tile_size: 0, ..Default::default() };
        let zero_wpt = KernelConfig { work_per_thread: 0, ..Default::default() };
        for variant in GemmVariant::ALL {
            assert!(matches!(variant.geometry(4, 4, &zero_tile), Err(ClError::InvalidConfig(_))));
            assert!(matches!(variant.geometry(4, 4, &zero_wpt), Err(ClError::InvalidConfig(_))));
        }
    }

    #[test]
    fn test_dim_i32_overflow() {
        assert_eq!(dim_i32("M", 7).unwrap(), 7);
        assert!(dim_i32("M", i32::MAX as usize + 1).is_err());
    }
}
