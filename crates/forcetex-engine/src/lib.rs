//! Force-directed graph simulation on a raster pipeline.
//!
//! Every piece of simulation state lives in square RGBA float images and is
//! advanced by a fixed sequence of draw passes. A pass can only gather from
//! its source images and write (or additively blend) into a single target,
//! which is all a fixed-function GPU offers. The same passes run on the CPU
//! through [`SoftwareDevice`], and on wgpu through `GpuDevice` with the `gpu`
//! feature.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Load (per dataset)                     │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │ nodes/links │───▶│  Topology   │───▶│ link images │      │
//! │  │             │    │ (sorted idx)│    │ (ragged adj)│      │
//! │  └─────────────┘    └─────────────┘    └─────────────┘      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Tick (per frame)                      │
//! │  ┌──────────┐  ┌──────────┐  ┌──────────┐  ┌────────────┐   │
//! │  │ pyramid  │─▶│many-body │─▶│ springs, │─▶│ integrate  │   │
//! │  │  splat   │  │  (+= v)  │  │ gravity, │  │ + swap     │   │
//! │  │          │  │          │  │ center   │  │            │   │
//! │  └──────────┘  └──────────┘  └──────────┘  └────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Read back                          │
//! │  positions export, hover pick, area selection, tracking     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use forcetex_core::{InputLink, InputNode, SimulationConfig};
//! use forcetex_engine::{Simulation, SoftwareDevice};
//!
//! let config = SimulationConfig { space_size: 256, seed: Some(1), ..Default::default() };
//! let mut sim = Simulation::new(SoftwareDevice::new(), config).unwrap();
//! sim.set_data(
//!     vec![InputNode::new("a"), InputNode::new("b")],
//!     vec![InputLink::new("a", "b")],
//! ).unwrap();
//! sim.frame().unwrap();
//! assert_eq!(sim.positions().unwrap().len(), 2);
//! ```

mod cooling;
pub mod device;
mod error;
mod forces;
mod link;
mod many_body;
mod picking;
mod pyramid;
pub mod shaders;
mod simulation;
mod store;
mod tracking;

pub use cooling::{CoolingSchedule, CoolingState, SimulationEvent};
pub use device::{
    Blend, BoxWalkShape, DeviceLimits, ImageId, Pass, Program, QuadtreeShape, RasterDevice,
    SoftwareDevice,
};
#[cfg(feature = "gpu")]
pub use device::GpuDevice;
pub use error::EngineError;
pub use forces::{CenterForce, GravityForce, PointerForce};
pub use link::{link_weights, LinkForce};
pub use many_body::ManyBodyForce;
pub use picking::{Hit, Picker, Projection, Viewport, ZoomTransform};
pub use pyramid::{CenterOfMass, SpatialPyramid};
pub use simulation::Simulation;
pub use store::PositionStore;
pub use tracking::Tracker;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// One RGBA float texel, the unit of every image.
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct Texel {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Texel {
    pub const ZERO: Texel = Texel::new(0.0, 0.0, 0.0, 0.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// A position or velocity texel.
    pub const fn xy(x: f32, y: f32) -> Self {
        Self::new(x, y, 0.0, 0.0)
    }

    pub fn position(&self) -> [f32; 2] {
        [self.r, self.g]
    }
}

impl std::ops::Add for Texel {
    type Output = Texel;

    fn add(self, rhs: Texel) -> Texel {
        Texel::new(self.r + rhs.r, self.g + rhs.g, self.b + rhs.b, self.a + rhs.a)
    }
}

impl std::ops::AddAssign for Texel {
    fn add_assign(&mut self, rhs: Texel) {
        *self = *self + rhs;
    }
}

/// Blocking constructors for the wgpu backend.
#[cfg(feature = "gpu")]
pub mod sync {
    use super::*;
    use forcetex_core::SimulationConfig;

    /// Create a simulation on the default GPU adapter (blocking).
    pub fn new_gpu_simulation(config: SimulationConfig) -> Result<Simulation<GpuDevice>> {
        let device = pollster::block_on(GpuDevice::new())?;
        Simulation::new(device, config)
    }
}
