//! Cheap per-frame readback of a few chosen nodes.

use forcetex_core::{TextureLayout, Topology};

use crate::device::{ImageId, Pass, RasterDevice};
use crate::{Result, Texel};

/// Gathers the positions of tracked nodes into a small image.
#[derive(Debug)]
pub struct Tracker {
    ids: Vec<String>,
    indices: ImageId,
    output: ImageId,
}

impl Tracker {
    /// Pack the point coordinates of every known id. Unknown ids are skipped.
    pub fn create<D: RasterDevice, S: AsRef<str>>(
        device: &mut D,
        topology: &Topology,
        points: TextureLayout,
        ids: &[S],
    ) -> Result<Self> {
        let mut known = Vec::with_capacity(ids.len());
        let mut coords = Vec::with_capacity(ids.len());
        for id in ids {
            let id = id.as_ref();
            match topology.sorted_index_by_id(id) {
                Some(sorted) => {
                    known.push(id.to_string());
                    coords.push(points.coord(sorted));
                }
                None => tracing::warn!(id, "Cannot track unknown node"),
            }
        }

        let layout = TextureLayout::for_points(known.len());
        let side = layout.alloc_side();
        let mut texels = vec![Texel::ZERO; side as usize * side as usize];
        for (slot, (x, y)) in texels.iter_mut().zip(coords) {
            *slot = Texel::new(x as f32, y as f32, 1.0, 0.0);
        }

        let indices = device.create_image(side, Some(&texels), "tracked indices")?;
        let output = device.create_image(side, None, "tracked positions")?;
        Ok(Self {
            ids: known,
            indices,
            output,
        })
    }

    /// Gather current positions of every tracked node.
    pub fn update<D: RasterDevice>(&self, device: &mut D, positions: ImageId) -> Result<()> {
        device.execute(&Pass::Track {
            positions,
            indices: self.indices,
            target: self.output,
        })
    }

    /// Positions gathered by the last [`update`](Self::update), by id.
    pub fn read<D: RasterDevice>(&self, device: &mut D) -> Result<Vec<(String, [f32; 2])>> {
        let texels = device.read_image(self.output)?;
        Ok(self
            .ids
            .iter()
            .zip(texels)
            .filter(|(_, texel)| texel.b > 0.0)
            .map(|(id, texel)| (id.clone(), texel.position()))
            .collect())
    }

    /// Ids that resolved to nodes.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn destroy<D: RasterDevice>(self, device: &mut D) {
        device.destroy_image(self.indices);
        device.destroy_image(self.output);
    }
}
