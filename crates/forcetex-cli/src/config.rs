//! Simulation config resolution for the CLI.
//!
//! Precedence, lowest to highest: built-in defaults, the `--config` file,
//! then command-line flags (which clap already merges with `FTX_*` env vars).

use std::path::Path;

use anyhow::{Context, Result};
use clap::ValueEnum;
use forcetex_core::{ManyBodyStrategy, SimulationConfig};

/// Command-line spelling of [`ManyBodyStrategy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    BoxWalk,
    Quadtree,
}

impl From<StrategyArg> for ManyBodyStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::BoxWalk => ManyBodyStrategy::BoxWalk,
            StrategyArg::Quadtree => ManyBodyStrategy::Quadtree,
        }
    }
}

/// Values given on the command line that win over the config file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub seed: Option<u64>,
    pub space_size: Option<u32>,
    pub strategy: Option<StrategyArg>,
}

/// Load the config file (or defaults), apply overrides and validate.
pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<SimulationConfig> {
    let mut config = match path {
        Some(path) => SimulationConfig::from_path(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => SimulationConfig::default(),
    };

    if let Some(seed) = overrides.seed {
        config.seed = Some(seed);
    }
    if let Some(space_size) = overrides.space_size {
        config.space_size = space_size;
    }
    if let Some(strategy) = overrides.strategy {
        config.many_body = strategy.into();
    }

    config
        .validate()
        .context("Invalid simulation config after applying overrides")?;

    tracing::debug!(
        space_size = config.space_size,
        strategy = config.many_body.label(),
        seed = ?config.seed,
        "Resolved simulation config"
    );
    Ok(config)
}
