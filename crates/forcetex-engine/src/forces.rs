//! Global forces: gravity, centering and pointer repulsion.

use forcetex_core::SimulationConfig;

use crate::device::{ImageId, Pass, RasterDevice};
use crate::pyramid::CenterOfMass;
use crate::Result;

/// Pull toward the middle of the simulation space.
#[derive(Debug, Clone, Copy, Default)]
pub struct GravityForce;

impl GravityForce {
    pub fn run<D: RasterDevice>(
        &self,
        device: &mut D,
        positions: ImageId,
        velocity: ImageId,
        alpha: f32,
        config: &SimulationConfig,
        space_size: u32,
    ) -> Result<()> {
        device.execute(&Pass::Gravity {
            positions,
            strength: alpha * config.gravity,
            space_size: space_size as f32,
            target: velocity,
        })
    }
}

/// Pull toward the centroid of all points.
#[derive(Debug)]
pub struct CenterForce {
    mass: CenterOfMass,
}

impl CenterForce {
    pub fn create<D: RasterDevice>(device: &mut D, space_size: u32) -> Result<Self> {
        Ok(Self {
            mass: CenterOfMass::create(device, space_size)?,
        })
    }

    pub fn run<D: RasterDevice>(
        &self,
        device: &mut D,
        positions: ImageId,
        count: usize,
        velocity: ImageId,
        alpha: f32,
        config: &SimulationConfig,
    ) -> Result<()> {
        self.mass.rebuild(device, positions, count)?;
        device.execute(&Pass::Center {
            positions,
            centroid: self.mass.image(),
            strength: alpha * config.center,
            target: velocity,
        })
    }

    pub fn destroy<D: RasterDevice>(self, device: &mut D) {
        self.mass.destroy(device);
    }
}

/// Push away from the pointer while it drags.
#[derive(Debug, Clone, Copy, Default)]
pub struct PointerForce;

impl PointerForce {
    /// Not scaled by alpha: the push stays responsive after cooling.
    pub fn run<D: RasterDevice>(
        &self,
        device: &mut D,
        positions: ImageId,
        velocity: ImageId,
        pointer: [f32; 2],
        config: &SimulationConfig,
    ) -> Result<()> {
        device.execute(&Pass::Pointer {
            positions,
            pointer,
            strength: config.repulsion_from_mouse,
            target: velocity,
        })
    }
}
