//! Core types shared across the forcetex workspace.
//!
//! This crate holds everything the simulation engine needs that does not
//! touch a device: the raw graph input, the topology index built from it,
//! the square-image addressing convention and the simulation configuration.
//!
//! ```text
//!  nodes + links ──▶ Topology ──▶ sorted order, degrees, adjacency groups
//!                        │
//!                        ▼
//!                  TextureLayout ──▶ index ↔ (x, y) in a square image
//! ```

mod accessor;
mod config;
mod error;
mod graph;
mod layout;
mod topology;

pub use accessor::Accessor;
pub use config::{ManyBodyStrategy, SimulationConfig};
pub use error::ConfigError;
pub use graph::{GraphInput, InputLink, InputNode};
pub use layout::{PingPong, TextureLayout};
pub use topology::{LinkDirection, Topology};

/// Result type for configuration and input loading.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Alpha below which a running simulation is considered converged.
pub const ALPHA_MIN: f32 = 0.001;
