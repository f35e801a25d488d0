//! Bucket allocator command-line tool
//!
//! Inspect size classes and run scripted workloads against an engine.
//!
//! # Examples
//!
//! ```bash
//! # Which class serves these sizes?
//! bucketalloc classify 1 16 17 40 4096
//!
//! # Fill, free and grow against a config file
//! bucketalloc --config engine.toml simulate --allocs 500 --size 24 --free-every 3 --grow-to 100
//!
//! # Effective configuration (defaults + file + BUCKET_ALLOC_* env)
//! bucketalloc config
//! ```

use anyhow::Context;
use bucket_alloc::{BucketEngine, EngineConfig, Error, SizeClassTable};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Fixed-size bucket allocator toolkit
#[derive(Parser, Debug)]
#[command(name = "bucketalloc")]
#[command(version = bucket_alloc::VERSION)]
#[command(about = "Fixed-size bucket allocator toolkit", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Engine configuration file (TOML)
    #[arg(long, global = true, env = "BUCKET_ALLOC_CONFIG")]
    config: Option<PathBuf>,

    /// Log directory path
    #[arg(long, global = true, default_value = "logs", env = "BUCKET_ALLOC_LOG_DIR")]
    log_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn", env = "RUST_LOG")]
    log_level: String,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Print reports as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the size class for each requested size
    Classify {
        /// Requested sizes in bytes
        #[arg(required = true, allow_negative_numbers = true)]
        sizes: Vec<isize>,
    },

    /// Run a scripted workload and print the resulting stats
    Simulate(SimulateArgs),

    /// Print the effective configuration as TOML
    Config,

    /// Show version and capabilities
    Version,
}

/// Workload parameters
#[derive(Args, Debug)]
struct SimulateArgs {
    /// Number of allocations to attempt
    #[arg(long, default_value = "100")]
    allocs: usize,

    /// Bytes per allocation
    #[arg(long, default_value = "16")]
    size: isize,

    /// Free every k-th allocation (0 = never)
    #[arg(long, default_value = "0")]
    free_every: usize,

    /// Reallocate the survivors to this many bytes
    #[arg(long)]
    grow_to: Option<isize>,

    /// Enable overflow regardless of the configuration
    #[arg(long)]
    overflow: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli)?;

    match cli.command {
        Commands::Classify { ref sizes } => classify_command(&cli, sizes),
        Commands::Simulate(ref args) => simulate_command(&cli, args),
        Commands::Config => {
            let config = load_config(&cli)?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
        Commands::Version => {
            println!("{}", BucketEngine::engine_identity());
            println!("capabilities: {:?}", BucketEngine::CAPABILITIES);
            Ok(())
        }
    }
}

/// Setup logging with rolling files and console output
fn setup_logging(cli: &Cli) -> anyhow::Result<()> {
    std::fs::create_dir_all(&cli.log_dir)
        .with_context(|| format!("creating log directory {}", cli.log_dir.display()))?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &cli.log_dir, "bucketalloc.log");

    let log_level = cli
        .log_level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::WARN);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(!cli.no_color),
        )
        .with(fmt::layer().with_writer(file_appender).with_ansi(false))
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .init();

    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<EngineConfig> {
    EngineConfig::load(cli.config.as_deref()).context("loading engine configuration")
}

fn classify_command(cli: &Cli, sizes: &[isize]) -> anyhow::Result<()> {
    let table: SizeClassTable = load_config(cli)?.size_classes()?;

    for &size in sizes {
        match table.classify(size) {
            Ok(class) if class < table.len() => println!(
                "{:>10} B -> class {:2} ({} B, {} slots)",
                size,
                class,
                table.class_size(class),
                table.capacity(class)
            ),
            Ok(class) => println!(
                "{:>10} B -> class {:2} (not configured, largest is {} B)",
                size,
                class,
                table.largest_size()
            ),
            Err(e) => println!("{:>10} B -> {}", size, e),
        }
    }
    Ok(())
}

fn simulate_command(cli: &Cli, args: &SimulateArgs) -> anyhow::Result<()> {
    let mut config = load_config(cli)?;
    config.record_stats = true;
    if args.overflow {
        config.allow_overflow = true;
    }

    let mut engine = BucketEngine::new(config)?;
    let mut live = Vec::new();
    let mut failed = 0usize;

    for i in 1..=args.allocs {
        match engine.allocate(args.size) {
            Ok(ptr) if args.free_every > 0 && i % args.free_every == 0 => engine.free(ptr)?,
            Ok(ptr) => live.push(ptr),
            Err(Error::OutOfMemory { .. }) => failed += 1,
            Err(e) => return Err(e.into()),
        }
    }
    info!(live = live.len(), failed, "Allocation phase finished");

    if let Some(new_size) = args.grow_to {
        for ptr in &mut live {
            match engine.reallocate(*ptr, new_size, args.size) {
                Ok(new_ptr) => *ptr = new_ptr,
                Err(Error::OutOfMemory { .. }) => failed += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    if failed > 0 {
        warn!(failed, "Some requests could not be served");
    }

    let stats = engine
        .stats()
        .context("stats recording is disabled")?;

    if cli.json {
        let report = serde_json::json!({
            "live": live.len(),
            "failed": failed,
            "detailed": stats.detailed_report(),
            "compact": stats.compact_report(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("live allocations: {}, failed requests: {}", live.len(), failed);
        print!("{}", stats.detailed_report());
        print!("{}", stats.compact_report());
    }
    Ok(())
}
