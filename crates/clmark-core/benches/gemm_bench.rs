//! Benchmark: OpenCL GEMM variants vs the rayon CPU reference.

use std::time::Instant;

use clmark_core::ops::{gemm, GemmVariant};
use clmark_core::{
    discover, reference, BuildOptions, Context, ContextOptions, KernelConfig, Matrix, Program,
    GEMM_SOURCE,
};

fn gflops(m: usize, n: usize, k: usize, secs: f64) -> f64 {
    (2.0 * m as f64 * n as f64 * k as f64) / secs / 1e9
}

fn bench_cpu(a: &Matrix, b: &Matrix, iters: usize) -> f64 {
    let start = Instant::now();
    for _ in 0..iters {
        let _ = reference::gemm(a, b).unwrap();
    }
    start.elapsed().as_secs_f64() / iters as f64
}

/// Mean device time per dispatch, falling back to host time.
fn bench_device(
    ctx: &Context,
    program: &Program<'_>,
    variant: GemmVariant,
    config: &KernelConfig,
    a: &Matrix,
    b: &Matrix,
    iters: usize,
) -> f64 {
    // Warmup
    let _ = gemm(ctx, program, variant, config, a, b).unwrap();
    let mut total = 0.0;
    for _ in 0..iters {
        let run = gemm(ctx, program, variant, config, a, b).unwrap();
        total += run.timings.dispatch.device.unwrap_or(run.timings.dispatch.host).as_secs_f64();
    }
    total / iters as f64
}

fn main() {
    let catalog = match discover() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Skipping GEMM benchmark: {}", e);
            return;
        }
    };
    let device = catalog.select(0).unwrap();
    let ctx = Context::new(device, ContextOptions::default()).unwrap();
    let config = KernelConfig::default();
    let header = config.render_header();
    let program = Program::build(&ctx, &header, GEMM_SOURCE, &BuildOptions::default()).unwrap();

    println!("=== clmark GEMM Benchmark ===");
    println!("Device: {}\n", device);

    println!(
        "{:<16} {:>12} {:>10} {:>12} {:>10}",
        "Size / kernel", "Time (ms)", "GF/s", "CPU (ms)", "Speedup"
    );
    println!("{}", "-".repeat(64));

    let sizes: &[(usize, usize, usize)] =
        &[(128, 128, 128), (256, 256, 256), (512, 512, 512), (1024, 1024, 1024)];
    for &(m, n, k) in sizes {
        let a_data: Vec<f32> = (0..m * k).map(|i| ((i * 7 + 3) % 13) as f32 * 0.1 - 0.6).collect();
        let b_data: Vec<f32> = (0..k * n).map(|i| ((i * 11 + 5) % 17) as f32 * 0.1 - 0.8).collect();
        let a = Matrix::new(m, k, a_data).unwrap();
        let b = Matrix::new(k, n, b_data).unwrap();

        let iters = if m <= 256 { 20 } else if m <= 512 { 5 } else { 2 };
        let cpu_s = bench_cpu(&a, &b, iters.min(3));

        println!("{}x{}x{}", m, n, k);
        for variant in GemmVariant::ALL {
            let secs = bench_device(&ctx, &program, variant, &config, &a, &b, iters);
            println!(
                "  {:<14} {:>10.3}ms {:>10.2} {:>10.3}ms {:>9.1}x",
                variant.kernel_name(),
                secs * 1000.0,
                gflops(m, n, k, secs),
                cpu_s * 1000.0,
                cpu_s / secs,
            );
        }
    }
}
