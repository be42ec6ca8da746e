//! forcetex CLI - run force-directed layouts headlessly.
//!
//! Loads a JSON graph, simulates until the layout cools (or a tick limit is
//! hit) and prints final positions as JSON.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use config::StrategyArg;

/// forcetex - force-directed graph layout on a raster pipeline.
#[derive(Parser, Debug)]
#[command(
    name = "ftx",
    author,
    version,
    about = "Force-directed graph layout on a raster pipeline",
    long_about = None
)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Simulate a graph and write final positions.
    Run {
        /// Graph file: {"nodes": [{"id", "x"?, "y"?}], "links": [{"source", "target"}]}.
        graph: PathBuf,

        /// Simulation config file (camelCase JSON, missing fields use defaults).
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Stop after this many ticks even if not converged.
        #[arg(short, long, default_value_t = 2000)]
        ticks: u64,

        /// Seed for reproducible layouts.
        #[arg(long, env = "FTX_SEED")]
        seed: Option<u64>,

        /// World extent, a power of two.
        #[arg(long, env = "FTX_SPACE_SIZE")]
        space_size: Option<u32>,

        /// Many-body repulsion strategy.
        #[arg(long, value_enum)]
        strategy: Option<StrategyArg>,

        /// Write positions here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Run on the GPU instead of the CPU reference device.
        #[cfg(feature = "gpu")]
        #[arg(long)]
        gpu: bool,
    },

    /// Print topology statistics for a graph file.
    Inspect {
        /// Graph file.
        graph: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup tracing based on verbosity; RUST_LOG refines it further.
    let level = if cli.quiet {
        Level::ERROR
    } else if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::from_level(level).into())
                .from_env_lossy(),
        )
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            graph,
            config,
            ticks,
            seed,
            space_size,
            strategy,
            output,
            #[cfg(feature = "gpu")]
            gpu,
        } => {
            let overrides = config::Overrides {
                seed,
                space_size,
                strategy,
            };
            let config = config::load(config.as_deref(), &overrides)?;
            let options = commands::run::RunOptions {
                graph,
                config,
                max_ticks: ticks,
                output,
                #[cfg(feature = "gpu")]
                gpu,
            };
            commands::run::execute(&options, cli.quiet)?;
        }

        Commands::Inspect { graph } => {
            commands::inspect::execute(&graph)?;
        }
    }

    Ok(())
}
