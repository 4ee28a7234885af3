use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use clmark_core::ops::{self, GemmVariant, RunTimings};
use clmark_core::program::read_source;
use clmark_core::{
    discover, reference, status, BuildOptions, Context, ContextOptions, KernelConfig, Program,
    Result, GEMM_SOURCE, PREFIX_SUM_SOURCE,
};

mod io;

/// Relative tolerance for `--verify` against the CPU reference.
const VERIFY_TOLERANCE: f32 = 1e-3;

#[derive(Parser)]
#[command(
    name = "clmark",
    about = "OpenCL GEMM and prefix-sum benchmark driver",
    long_about = "Compiles tunable OpenCL kernels at run time, runs them on the chosen device,\n\
                  and reports dispatch latency.\n\n\
                  Devices are numbered discrete GPUs first, then integrated GPUs, then CPUs.",
    version,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every workload.
#[derive(clap::Args)]
struct RunArgs {
    /// Input file
    input: PathBuf,
    /// Output file, written only when the run succeeds
    output: PathBuf,
    /// Device index from `clmark devices`
    #[arg(long, default_value = "0")]
    device: usize,
    /// Kernel source file (defaults to the built-in kernels)
    #[arg(long)]
    kernel: Option<PathBuf>,
    /// Extra header text, appended after the macros rendered from --config
    #[arg(long)]
    header: Option<PathBuf>,
    /// JSON tuning parameters
    #[arg(long)]
    config: Option<PathBuf>,
    /// Write the compiled program binary here
    #[arg(long)]
    dump_binary: Option<PathBuf>,
    /// Create the queue without device profiling
    #[arg(long)]
    no_profiling: bool,
    /// Check the result against the CPU reference
    #[arg(long)]
    verify: bool,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// List OpenCL devices in selection order
    Devices,
    /// Multiply C = A * B
    Gemm {
        #[command(flatten)]
        run: RunArgs,
        /// Kernel variant: 0 naive, 1 tiled, 2 work-per-thread
        #[arg(long, default_value = "0")]
        variant: GemmVariant,
    },
    /// Inclusive prefix sum
    Scan {
        #[command(flatten)]
        run: RunArgs,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Devices => cmd_devices(),
        Commands::Gemm { run, variant } => cmd_gemm(&run, variant),
        Commands::Scan { run } => cmd_scan(&run),
    };
    if let Err(err) = result {
        status::report(&err);
    }
}

fn cmd_devices() -> Result<()> {
    let catalog = discover()?;
    for (index, device) in catalog.iter().enumerate() {
        println!("[{}] {}", index, device);
    }
    Ok(())
}

/// Tuning parameters, program source and header text for one run.
struct Setup {
    config: KernelConfig,
    header: String,
    source: String,
    build: BuildOptions,
}

impl Setup {
    fn load(args: &RunArgs, builtin: &str) -> Result<Self> {
        let config = match &args.config {
            Some(path) => KernelConfig::from_json_file(path)?,
            None => KernelConfig::default(),
        };
        config.validate()?;
        let mut header = config.render_header();
        if let Some(path) = &args.header {
            header.push('\n');
            header.push_str(&read_source(path)?);
        }
        let source = match &args.kernel {
            Some(path) => read_source(path)?,
            None => builtin.to_string(),
        };
        let build = BuildOptions {
            compiler_options: config.compiler_options.clone(),
            binary_dump: args.dump_binary.clone(),
        };
        Ok(Self { config, header, source, build })
    }
}

fn open_context(args: &RunArgs) -> Result<Context> {
    let catalog = discover()?;
    let device = catalog.select(args.device)?;
    tracing::info!(index = args.device, %device, "selected device");
    Context::new(device, ContextOptions { profiling: !args.no_profiling })
}

fn print_timings(timings: &RunTimings) {
    let dispatch = timings.dispatch.host.as_micros();
    let total = timings.total.as_micros();
    match timings.dispatch.device {
        Some(device) => {
            println!("Time: {}\t{}\t(device {})", dispatch, total, device.as_micros())
        }
        None => println!("Time: {}\t{}", dispatch, total),
    }
}

fn cmd_gemm(args: &RunArgs, variant: GemmVariant) -> Result<()> {
    let input = io::read_gemm_input(&args.input)?;
    let setup = Setup::load(args, GEMM_SOURCE)?;
    let ctx = open_context(args)?;
    let program = Program::build(&ctx, &setup.header, &setup.source, &setup.build)?;

    let run = ops::gemm(&ctx, &program, variant, &setup.config, &input.a, &input.b)?;
    if args.verify {
        let expected = reference::gemm(&input.a, &input.b)?;
        let err = reference::compare(expected.as_slice(), run.c.as_slice(), VERIFY_TOLERANCE)?;
        tracing::info!(max_rel_err = err, "verified against CPU reference");
    }
    print_timings(&run.timings);
    io::write_gemm_output(&args.output, &run.c)
}

fn cmd_scan(args: &RunArgs) -> Result<()> {
    let input = io::read_scan_input(&args.input)?;
    if input.is_empty() {
        tracing::info!("empty input, nothing to dispatch");
        return io::write_scan_output(&args.output, &input);
    }
    let setup = Setup::load(args, PREFIX_SUM_SOURCE)?;
    let ctx = open_context(args)?;
    let program = Program::build(&ctx, &setup.header, &setup.source, &setup.build)?;

    let run = ops::inclusive_prefix_sum(&ctx, &program, &setup.config, &input)?;
    if args.verify {
        let expected = reference::inclusive_prefix_sum(&input);
        let err = reference::compare(&expected, &run.output, VERIFY_TOLERANCE)?;
        tracing::info!(max_rel_err = err, "verified against CPU reference");
    }
    print_timings(&run.timings);
    io::write_scan_output(&args.output, &run.output)
}
