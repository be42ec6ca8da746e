//! Run command implementation.
//!
//! Loads a graph, drives the simulation frame by frame until it cools or the
//! tick limit is reached, then writes final positions.
//!
//! ```bash
//! ftx run graph.json                       # defaults, positions to stdout
//! ftx run graph.json -c sim.json -o out.json
//! FTX_SEED=7 ftx run graph.json --strategy quadtree
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use forcetex_core::{GraphInput, SimulationConfig};
use forcetex_engine::{RasterDevice, Simulation, SimulationEvent, SoftwareDevice};
use serde::Serialize;
use tracing::{debug, info};

/// Everything `ftx run` needs once arguments are resolved.
#[derive(Debug)]
pub struct RunOptions {
    pub graph: PathBuf,
    pub config: SimulationConfig,
    pub max_ticks: u64,
    pub output: Option<PathBuf>,
    #[cfg(feature = "gpu")]
    pub gpu: bool,
}

/// Document written by `ftx run`.
#[derive(Debug, Serialize)]
pub struct RunReport {
    /// Ticks actually simulated.
    pub ticks: u64,
    /// Alpha when the run stopped.
    pub alpha: f32,
    /// Whether the layout cooled below the end threshold.
    pub converged: bool,
    /// Final position per node id.
    pub positions: BTreeMap<String, [f32; 2]>,
}

/// Execute the run command.
pub fn execute(options: &RunOptions, quiet: bool) -> Result<()> {
    let graph = GraphInput::from_path(&options.graph)
        .with_context(|| format!("Failed to load graph from {}", options.graph.display()))?;

    if !quiet {
        eprintln!("📊 Graph: {}", options.graph.display());
        eprintln!(
            "   {} nodes, {} links",
            graph.nodes.len(),
            graph.links.len()
        );
    }

    #[cfg(feature = "gpu")]
    {
        if options.gpu {
            let device = pollster::block_on(forcetex_engine::GpuDevice::new())
                .context("Failed to initialize GPU device")?;
            let report = simulate(device, options, graph)?;
            return write_report(&report, options, quiet);
        }
    }

    let report = simulate(SoftwareDevice::new(), options, graph)?;
    write_report(&report, options, quiet)
}

/// Drive a simulation on `device` to completion.
pub fn simulate<D: RasterDevice>(
    device: D,
    options: &RunOptions,
    graph: GraphInput,
) -> Result<RunReport> {
    let started = Instant::now();
    let mut sim = Simulation::new(device, options.config.clone())?;
    sim.set_data(graph.nodes, graph.links)
        .context("Failed to load graph into the simulation")?;

    let mut ticks = 0u64;
    let mut converged = false;

    while sim.is_running() && ticks < options.max_ticks {
        sim.frame()?;
        for event in sim.drain_events() {
            match event {
                SimulationEvent::Tick { alpha, progress } => {
                    ticks += 1;
                    if ticks % 100 == 0 {
                        debug!(ticks, alpha, progress, "Simulation progress");
                    }
                }
                SimulationEvent::End => converged = true,
                _ => {}
            }
        }
    }

    let positions: BTreeMap<String, [f32; 2]> = sim.positions_by_id()?.into_iter().collect();

    info!(
        ticks,
        converged,
        alpha = sim.alpha(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Simulation finished"
    );

    let report = RunReport {
        ticks,
        alpha: sim.alpha(),
        converged,
        positions,
    };
    sim.destroy();
    Ok(report)
}

fn write_report(report: &RunReport, options: &RunOptions, quiet: bool) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;

    match &options.output {
        Some(path) => {
            std::fs::write(path, &json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            if !quiet {
                eprintln!("💾 Positions written to {}", path.display());
            }
        }
        None => println!("{}", json),
    }

    if !quiet {
        let status = if report.converged { "✅ converged" } else { "⏸️  tick limit reached" };
        eprintln!("{} after {} ticks (alpha {:.4})", status, report.ticks, report.alpha);
    }
    Ok(())
}
