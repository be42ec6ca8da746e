//! Hover picking and rectangular area selection.
//!
//! Both are full O(N) passes over the points read back synchronously; they
//! run at most once per frame so no spatial acceleration is used.

use forcetex_core::{SimulationConfig, TextureLayout};

use crate::device::{ImageId, Pass, RasterDevice};
use crate::{Result, Texel};

/// Pan/zoom applied on top of the centred simulation space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomTransform {
    /// Scale factor.
    pub k: f32,
    /// Horizontal translation in device pixels.
    pub x: f32,
    /// Vertical translation in device pixels.
    pub y: f32,
}

impl Default for ZoomTransform {
    fn default() -> Self {
        Self {
            k: 1.0,
            x: 0.0,
            y: 0.0,
        }
    }
}

/// Screen state supplied by the interaction layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Screen width in device pixels.
    pub width: f32,
    /// Screen height in device pixels.
    pub height: f32,
    pub transform: ZoomTransform,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            transform: ZoomTransform::default(),
        }
    }

    pub fn with_transform(mut self, transform: ZoomTransform) -> Self {
        self.transform = transform;
        self
    }
}

/// Everything a picking pass needs to place a point on screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    pub screen_size: [f32; 2],
    pub transform: ZoomTransform,
    pub space_size: f32,
    pub pixel_ratio: f32,
    pub size_scale: f32,
    pub scale_on_zoom: bool,
    pub max_point_size: f32,
}

impl Projection {
    pub fn new(viewport: &Viewport, config: &SimulationConfig, space_size: u32, max_point_size: f32) -> Self {
        Self {
            screen_size: [viewport.width, viewport.height],
            transform: viewport.transform,
            space_size: space_size as f32,
            pixel_ratio: config.pixel_ratio,
            size_scale: config.node_size_scale,
            scale_on_zoom: config.scale_nodes_on_zoom,
            max_point_size,
        }
    }

    /// Simulation-space position to device pixels.
    pub fn to_screen(&self, position: [f32; 2]) -> [f32; 2] {
        let t = self.transform;
        [
            t.x + t.k * (position[0] + (self.screen_size[0] - self.space_size) / 2.0),
            t.y + t.k * (position[1] + (self.screen_size[1] - self.space_size) / 2.0),
        ]
    }

    /// On-screen diameter of a node of the given size.
    pub fn point_size(&self, size: f32) -> f32 {
        let size = size * self.size_scale;
        let zoom = if self.scale_on_zoom {
            self.transform.k
        } else {
            (self.transform.k * 0.01).clamp(1.0, 5.0)
        };
        (size * self.pixel_ratio * zoom).min(self.max_point_size)
    }
}

/// A hovered node.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub sorted_index: usize,
    pub input_index: usize,
    pub id: String,
    /// Node size as stored in the size image.
    pub size: f32,
    /// Simulation-space position.
    pub position: [f32; 2],
}

/// Result images for picking passes.
#[derive(Debug)]
pub struct Picker {
    hovered: ImageId,
    selection: ImageId,
    count: usize,
}

impl Picker {
    pub fn create<D: RasterDevice>(device: &mut D, points: TextureLayout, count: usize) -> Result<Self> {
        let hovered = device.create_image(1, None, "hovered point")?;
        let selection = device.create_image(points.alloc_side(), None, "area selection")?;
        Ok(Self {
            hovered,
            selection,
            count,
        })
    }

    /// Sorted index, stored size and position of the topmost point under
    /// `pointer`, if any.
    pub fn hover<D: RasterDevice>(
        &self,
        device: &mut D,
        positions: ImageId,
        sizes: ImageId,
        projection: Projection,
        pointer: [f32; 2],
    ) -> Result<Option<(usize, f32, [f32; 2])>> {
        device.execute(&Pass::Clear {
            target: self.hovered,
        })?;
        device.execute(&Pass::Hover {
            positions,
            sizes,
            count: self.count as u32,
            projection,
            pointer,
            target: self.hovered,
        })?;

        let result = device.read_image(self.hovered)?;
        Ok(result.first().and_then(|texel| decode_hover(*texel, self.count)))
    }

    /// Sorted indices of points inside the rectangle spanned by two corners.
    pub fn select_area<D: RasterDevice>(
        &self,
        device: &mut D,
        positions: ImageId,
        sizes: ImageId,
        projection: Projection,
        corners: [[f32; 2]; 2],
    ) -> Result<Vec<usize>> {
        let [a, b] = corners;
        let rect = [a[0].min(b[0]), a[1].min(b[1]), a[0].max(b[0]), a[1].max(b[1])];
        device.execute(&Pass::AreaSelect {
            positions,
            sizes,
            projection,
            rect,
            target: self.selection,
        })?;

        let mask = device.read_image(self.selection)?;
        Ok(mask
            .iter()
            .take(self.count)
            .enumerate()
            .filter(|(_, texel)| texel.r != 0.0)
            .map(|(index, _)| index)
            .collect())
    }

    pub fn destroy<D: RasterDevice>(self, device: &mut D) {
        device.destroy_image(self.hovered);
        device.destroy_image(self.selection);
    }
}

fn decode_hover(texel: Texel, count: usize) -> Option<(usize, f32, [f32; 2])> {
    if texel.g == 0.0 {
        return None;
    }
    let index = texel.r as usize;
    (index < count).then_some((index, texel.g, [texel.b, texel.a]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn projection(scale_on_zoom: bool, k: f32) -> Projection {
        Projection {
            screen_size: [800.0, 600.0],
            transform: ZoomTransform { k, x: 0.0, y: 0.0 },
            space_size: 1024.0,
            pixel_ratio: 2.0,
            size_scale: 1.0,
            scale_on_zoom,
            max_point_size: 64.0,
        }
    }

    #[test]
    fn test_space_centre_maps_to_screen_centre() {
        let p = projection(true, 1.0);
        assert_eq!(p.to_screen([512.0, 512.0]), [400.0, 300.0]);
    }

    #[test]
    fn test_point_size_zoom_modes() {
        assert_eq!(projection(true, 2.0).point_size(4.0), 16.0);
        // Without zoom scaling the factor is clamped to [1, 5].
        assert_eq!(projection(false, 2.0).point_size(4.0), 8.0);
        assert_eq!(projection(false, 1000.0).point_size(4.0), 40.0);
        // Clamped to the device maximum.
        assert_eq!(projection(true, 100.0).point_size(4.0), 64.0);
    }

    #[test]
    fn test_decode_hover_requires_size() {
        assert_eq!(decode_hover(Texel::ZERO, 10), None);
        assert_eq!(
            decode_hover(Texel::new(3.0, 4.0, 10.0, 20.0), 10),
            Some((3, 4.0, [10.0, 20.0]))
        );
        assert_eq!(decode_hover(Texel::new(12.0, 4.0, 0.0, 0.0), 10), None);
    }
}
