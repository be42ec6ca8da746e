//! Implicit quadtree as a pyramid of cell-aggregate images.
//!
//! Level `l` has side `2^(l+1)`; each texel holds `(sum x, sum y, count, 0)`
//! of the points inside it. There are no tree nodes, the level index is the
//! tree depth.

use crate::device::{ImageId, Pass, RasterDevice};
use crate::Result;

/// One aggregate image per level from `first_level` to `log2(space_size) - 1`.
#[derive(Debug)]
pub struct SpatialPyramid {
    first_level: u32,
    levels: u32,
    space_size: f32,
    images: Vec<ImageId>,
}

impl SpatialPyramid {
    /// Allocate the levels needed by a walk starting at `first_level`.
    pub fn create<D: RasterDevice>(device: &mut D, space_size: u32, first_level: u32) -> Result<Self> {
        let levels = space_size.trailing_zeros();
        let first_level = first_level.min(levels.saturating_sub(1));
        let mut images = Vec::with_capacity((levels - first_level) as usize);
        for level in first_level..levels {
            let side = 1u32 << (level + 1);
            images.push(device.create_image(side, None, &format!("pyramid level {level}"))?);
        }
        tracing::debug!(first_level, levels, "Created spatial pyramid");

        Ok(Self {
            first_level,
            levels,
            space_size: space_size as f32,
            images,
        })
    }

    /// Re-splat the first `count` points of `positions` into every level.
    pub fn rebuild<D: RasterDevice>(&self, device: &mut D, positions: ImageId, count: usize) -> Result<()> {
        for (offset, &image) in self.images.iter().enumerate() {
            let level = self.first_level + offset as u32;
            device.execute(&Pass::Clear { target: image })?;
            device.execute(&Pass::Splat {
                positions,
                count: count as u32,
                cell_size: self.space_size / (1u32 << (level + 1)) as f32,
                target: image,
            })?;
        }
        Ok(())
    }

    /// Image of one level, if it was built.
    pub fn level(&self, level: u32) -> Option<ImageId> {
        level
            .checked_sub(self.first_level)
            .and_then(|offset| self.images.get(offset as usize))
            .copied()
    }

    /// Total levels of the space, `log2(space_size)`.
    pub fn levels(&self) -> u32 {
        self.levels
    }

    pub fn first_level(&self) -> u32 {
        self.first_level
    }

    /// Built level images, coarsest first.
    pub fn images(&self) -> &[ImageId] {
        &self.images
    }

    pub fn destroy<D: RasterDevice>(self, device: &mut D) {
        for image in self.images {
            device.destroy_image(image);
        }
    }
}

/// Sum of every position in a single texel; the centroid is `(r, g) / b`.
#[derive(Debug)]
pub struct CenterOfMass {
    image: ImageId,
    space_size: f32,
}

impl CenterOfMass {
    pub fn create<D: RasterDevice>(device: &mut D, space_size: u32) -> Result<Self> {
        Ok(Self {
            image: device.create_image(1, None, "center of mass")?,
            space_size: space_size as f32,
        })
    }

    pub fn rebuild<D: RasterDevice>(&self, device: &mut D, positions: ImageId, count: usize) -> Result<()> {
        device.execute(&Pass::Clear { target: self.image })?;
        device.execute(&Pass::Splat {
            positions,
            count: count as u32,
            cell_size: self.space_size,
            target: self.image,
        })
    }

    pub fn image(&self) -> ImageId {
        self.image
    }

    pub fn destroy<D: RasterDevice>(self, device: &mut D) {
        device.destroy_image(self.image);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SoftwareDevice, Texel};

    fn points(device: &mut SoftwareDevice) -> ImageId {
        let texels = [
            Texel::xy(1.0, 1.0),
            Texel::xy(5.0, 2.0),
            Texel::xy(30.0, 30.0),
            Texel::xy(99.0, 99.0), // padding, never splatted
        ];
        device.create_image(2, Some(&texels), "positions").unwrap()
    }

    #[test]
    fn test_every_level_holds_every_point() {
        let mut device = SoftwareDevice::new();
        let positions = points(&mut device);
        let pyramid = SpatialPyramid::create(&mut device, 32, 0).unwrap();
        assert_eq!(pyramid.levels(), 5);
        assert_eq!(pyramid.images().len(), 5);

        pyramid.rebuild(&mut device, positions, 3).unwrap();
        for level in 0..5 {
            let image = pyramid.level(level).unwrap();
            assert_eq!(device.image_side(image).unwrap(), 1 << (level + 1));
            let cells = device.read_image(image).unwrap();
            let total = cells.iter().fold(Texel::ZERO, |acc, t| acc + *t);
            assert_eq!(total, Texel::new(36.0, 33.0, 3.0, 0.0), "level {level}");
        }
    }

    #[test]
    fn test_level_cells() {
        let mut device = SoftwareDevice::new();
        let positions = points(&mut device);
        let pyramid = SpatialPyramid::create(&mut device, 32, 0).unwrap();
        pyramid.rebuild(&mut device, positions, 3).unwrap();

        // Level 1: 4x4 cells of 8 units.
        let cells = device.read_image(pyramid.level(1).unwrap()).unwrap();
        assert_eq!(cells[0], Texel::new(6.0, 3.0, 2.0, 0.0));
        assert_eq!(cells[15], Texel::new(30.0, 30.0, 1.0, 0.0));
    }

    #[test]
    fn test_partial_pyramid_skips_coarse_levels() {
        let mut device = SoftwareDevice::new();
        let pyramid = SpatialPyramid::create(&mut device, 64, 3).unwrap();
        assert_eq!(pyramid.first_level(), 3);
        assert_eq!(pyramid.images().len(), 3);
        assert!(pyramid.level(2).is_none());
        assert!(pyramid.level(5).is_some());
        assert!(pyramid.level(6).is_none());
    }

    #[test]
    fn test_center_of_mass() {
        let mut device = SoftwareDevice::new();
        let positions = points(&mut device);
        let com = CenterOfMass::create(&mut device, 32).unwrap();
        com.rebuild(&mut device, positions, 3).unwrap();
        let mass = device.read_image(com.image()).unwrap()[0];
        assert_eq!(mass, Texel::new(36.0, 33.0, 3.0, 0.0));
    }
}
