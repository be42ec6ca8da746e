//! Position and velocity images.

use forcetex_core::{PingPong, TextureLayout, Topology};
use rand::Rng;

use crate::device::{ImageId, Pass, RasterDevice};
use crate::{Result, Texel};

/// Current/previous position images plus the per-tick velocity accumulator.
///
/// Forces read [`current`](Self::current). Integration reads `current` and
/// the velocity, writes into the other position image and swaps, so after
/// every tick `previous` holds the pre-tick positions.
#[derive(Debug)]
pub struct PositionStore {
    positions: PingPong<ImageId>,
    velocity: ImageId,
    layout: TextureLayout,
    count: usize,
    space_size: f32,
}

impl PositionStore {
    /// Upload initial positions in sorted order.
    ///
    /// Missing coordinates are drawn per axis from `space_size * [0.495, 0.505)`,
    /// visiting nodes in input order.
    pub fn create<D: RasterDevice, R: Rng>(
        device: &mut D,
        topology: &Topology,
        layout: TextureLayout,
        space_size: u32,
        rng: &mut R,
    ) -> Result<Self> {
        let space = space_size as f32;
        let mut texels = vec![Texel::ZERO; layout.alloc_side() as usize * layout.alloc_side() as usize];

        for (input, node) in topology.nodes().iter().enumerate() {
            let x = node.x.unwrap_or_else(|| space * rng.gen_range(0.495..0.505));
            let y = node.y.unwrap_or_else(|| space * rng.gen_range(0.495..0.505));
            if let Some(sorted) = topology.sorted_index_of(input) {
                texels[sorted] = Texel::xy(x, y);
            }
        }

        let side = layout.alloc_side();
        let current = device.create_image(side, Some(&texels), "positions a")?;
        let previous = device.create_image(side, Some(&texels), "positions b")?;
        let velocity = device.create_image(side, None, "velocity")?;

        Ok(Self {
            positions: PingPong::new(current, previous),
            velocity,
            layout,
            count: topology.node_count(),
            space_size: space,
        })
    }

    /// Zero the velocity accumulator.
    pub fn clear_velocity<D: RasterDevice>(&self, device: &mut D) -> Result<()> {
        device.execute(&Pass::Clear {
            target: self.velocity,
        })
    }

    /// Apply the accumulated velocity and swap position buffers.
    pub fn integrate<D: RasterDevice>(&mut self, device: &mut D, friction: f32) -> Result<()> {
        device.execute(&Pass::Integrate {
            positions: self.positions.current(),
            velocity: self.velocity,
            friction,
            space_size: self.space_size,
            target: self.positions.previous(),
        })?;
        self.positions.swap();
        Ok(())
    }

    pub fn current(&self) -> ImageId {
        self.positions.current()
    }

    pub fn previous(&self) -> ImageId {
        self.positions.previous()
    }

    pub fn velocity(&self) -> ImageId {
        self.velocity
    }

    pub fn layout(&self) -> TextureLayout {
        self.layout
    }

    /// Number of real points; texels past it are padding.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Blocking readback of current positions in sorted order.
    pub fn read<D: RasterDevice>(&self, device: &mut D) -> Result<Vec<[f32; 2]>> {
        let texels = device.read_image(self.positions.current())?;
        Ok(texels
            .iter()
            .take(self.count)
            .map(Texel::position)
            .collect())
    }

    pub fn destroy<D: RasterDevice>(self, device: &mut D) {
        for image in self.positions.both() {
            device.destroy_image(image);
        }
        device.destroy_image(self.velocity);
    }
}
