//! Raster device abstraction.
//!
//! A device owns square RGBA float images and executes [`Pass`]es against
//! them. Each pass gathers from its source images and writes one target,
//! either replacing texels or blending additively. No pass may read the
//! image it writes; stateful quantities use two images and swap.

use std::fmt;

use crate::picking::Projection;
use crate::{Result, Texel};

#[cfg(feature = "gpu")]
mod gpu;
mod software;

#[cfg(feature = "gpu")]
pub use gpu::GpuDevice;
pub use software::SoftwareDevice;

/// Handle to an image owned by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageId(pub(crate) u32);

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "image#{}", self.0)
    }
}

/// Hardware limits the engine clamps against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceLimits {
    /// Largest square image side.
    pub max_texture_side: u32,
    /// Largest point size in device pixels.
    pub max_point_size: f32,
    /// Images a single pass may sample.
    pub max_sampled_textures: u32,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            max_texture_side: 16384,
            max_point_size: 64.0,
            max_sampled_textures: u32::MAX,
        }
    }
}

/// How a pass combines its output with the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Blend {
    Replace,
    Additive,
}

/// Loop bounds for the box-walk repulsion pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxWalkShape {
    /// Pyramid levels, `log2(space_size)`.
    pub levels: u32,
    /// Upper bound on cells per box side at any level.
    pub max_cells: u32,
}

impl BoxWalkShape {
    pub fn new(levels: u32, theta: f32) -> Self {
        // A box never spans more than 2 * (theta + 1) parent cells per side,
        // i.e. 4 * (theta + 1) cells at its own level.
        let max_cells = 2 * (2.0 * (theta + 1.0)).ceil() as u32;
        Self {
            levels,
            max_cells: max_cells.max(2),
        }
    }
}

/// Shape of the unrolled quadtree walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QuadtreeShape {
    /// Coarsest level visited; its every cell is a root.
    pub root_level: u32,
    /// Pyramid levels, `log2(space_size)`.
    pub levels: u32,
}

impl QuadtreeShape {
    /// Walk over the finest `min(depth, levels)` levels.
    pub fn new(levels: u32, depth: u32) -> Self {
        Self {
            root_level: levels - depth.min(levels),
            levels,
        }
    }

    /// Number of levels visited.
    pub fn depth(&self) -> u32 {
        self.levels - self.root_level
    }
}

/// Programs generated at setup time rather than shipped as constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Program {
    QuadtreeWalk(QuadtreeShape),
}

/// One draw against one target image.
#[derive(Debug, Clone, PartialEq)]
pub enum Pass {
    /// Zero every texel.
    Clear { target: ImageId },
    /// Scatter the first `count` positions into cells of `cell_size`,
    /// accumulating `(x, y, 1, 0)` per point.
    Splat {
        positions: ImageId,
        count: u32,
        cell_size: f32,
        target: ImageId,
    },
    /// `velocity *= friction; position = clamp(position + velocity, 0, space)`.
    Integrate {
        positions: ImageId,
        velocity: ImageId,
        friction: f32,
        space_size: f32,
        target: ImageId,
    },
    /// Repulsion from the cells of one pyramid level accepted by the box walk.
    BoxWalk {
        positions: ImageId,
        random: ImageId,
        level_image: ImageId,
        level: u32,
        shape: BoxWalkShape,
        /// `alpha * repulsion`.
        strength: f32,
        theta: f32,
        space_size: f32,
        target: ImageId,
    },
    /// Repulsion from the unrolled Barnes-Hut descent over `levels`
    /// (`levels[0]` is the root level).
    QuadtreeWalk {
        positions: ImageId,
        random: ImageId,
        levels: Vec<ImageId>,
        shape: QuadtreeShape,
        /// `alpha * repulsion`.
        strength: f32,
        theta: f32,
        space_size: f32,
        target: ImageId,
    },
    /// Spring attraction along one adjacency direction.
    LinkSpring {
        positions: ImageId,
        first_links: ImageId,
        neighbors: ImageId,
        link_params: ImageId,
        max_degree: u32,
        /// `alpha * link_spring`.
        strength: f32,
        link_distance: f32,
        variation: [f32; 2],
        target: ImageId,
    },
    /// Pull toward the middle of the space.
    Gravity {
        positions: ImageId,
        /// `alpha * gravity`.
        strength: f32,
        space_size: f32,
        target: ImageId,
    },
    /// Pull toward the centroid stored in a 1x1 image.
    Center {
        positions: ImageId,
        centroid: ImageId,
        /// `alpha * center`.
        strength: f32,
        target: ImageId,
    },
    /// Inverse-square push away from the pointer.
    Pointer {
        positions: ImageId,
        pointer: [f32; 2],
        strength: f32,
        target: ImageId,
    },
    /// Scatter the first `count` points; any point under the pointer writes
    /// `(sorted index, size, x, y)` into the 1x1 target.
    Hover {
        positions: ImageId,
        sizes: ImageId,
        count: u32,
        projection: Projection,
        pointer: [f32; 2],
        target: ImageId,
    },
    /// Per-point mask of points inside `rect` (left, top, right, bottom).
    AreaSelect {
        positions: ImageId,
        sizes: ImageId,
        projection: Projection,
        rect: [f32; 4],
        target: ImageId,
    },
    /// Gather positions addressed by an index image.
    Track {
        positions: ImageId,
        indices: ImageId,
        target: ImageId,
    },
}

impl Pass {
    pub fn label(&self) -> &'static str {
        match self {
            Pass::Clear { .. } => "clear",
            Pass::Splat { .. } => "splat",
            Pass::Integrate { .. } => "integrate",
            Pass::BoxWalk { .. } => "box-walk",
            Pass::QuadtreeWalk { .. } => "quadtree-walk",
            Pass::LinkSpring { .. } => "link-spring",
            Pass::Gravity { .. } => "gravity",
            Pass::Center { .. } => "center",
            Pass::Pointer { .. } => "pointer",
            Pass::Hover { .. } => "hover",
            Pass::AreaSelect { .. } => "area-select",
            Pass::Track { .. } => "track",
        }
    }

    pub fn target(&self) -> ImageId {
        match self {
            Pass::Clear { target }
            | Pass::Splat { target, .. }
            | Pass::Integrate { target, .. }
            | Pass::BoxWalk { target, .. }
            | Pass::QuadtreeWalk { target, .. }
            | Pass::LinkSpring { target, .. }
            | Pass::Gravity { target, .. }
            | Pass::Center { target, .. }
            | Pass::Pointer { target, .. }
            | Pass::Hover { target, .. }
            | Pass::AreaSelect { target, .. }
            | Pass::Track { target, .. } => *target,
        }
    }

    /// Images the pass reads, in binding order.
    pub fn sources(&self) -> Vec<ImageId> {
        match self {
            Pass::Clear { .. } => Vec::new(),
            Pass::Splat { positions, .. }
            | Pass::Gravity { positions, .. }
            | Pass::Pointer { positions, .. } => vec![*positions],
            Pass::Integrate {
                positions,
                velocity,
                ..
            } => vec![*positions, *velocity],
            Pass::BoxWalk {
                positions,
                random,
                level_image,
                ..
            } => vec![*positions, *random, *level_image],
            Pass::QuadtreeWalk {
                positions,
                random,
                levels,
                ..
            } => {
                let mut sources = vec![*positions, *random];
                sources.extend_from_slice(levels);
                sources
            }
            Pass::LinkSpring {
                positions,
                first_links,
                neighbors,
                link_params,
                ..
            } => vec![*positions, *first_links, *neighbors, *link_params],
            Pass::Center {
                positions,
                centroid,
                ..
            } => vec![*positions, *centroid],
            Pass::Hover {
                positions, sizes, ..
            }
            | Pass::AreaSelect {
                positions, sizes, ..
            } => vec![*positions, *sizes],
            Pass::Track {
                positions, indices, ..
            } => vec![*positions, *indices],
        }
    }

    pub fn blend(&self) -> Blend {
        match self {
            Pass::Splat { .. }
            | Pass::BoxWalk { .. }
            | Pass::QuadtreeWalk { .. }
            | Pass::LinkSpring { .. }
            | Pass::Gravity { .. }
            | Pass::Center { .. }
            | Pass::Pointer { .. } => Blend::Additive,
            Pass::Clear { .. }
            | Pass::Integrate { .. }
            | Pass::Hover { .. }
            | Pass::AreaSelect { .. }
            | Pass::Track { .. } => Blend::Replace,
        }
    }

    /// Error if the target is also a source.
    pub fn check_aliasing(&self) -> Result<()> {
        let target = self.target();
        if self.sources().contains(&target) {
            return Err(crate::EngineError::AliasedTarget {
                pass: self.label(),
                image: target,
            });
        }
        Ok(())
    }
}

/// A device that stores images and executes passes.
pub trait RasterDevice {
    fn limits(&self) -> DeviceLimits;

    /// Allocate a `side x side` image, zeroed unless `initial` is given.
    fn create_image(&mut self, side: u32, initial: Option<&[Texel]>, label: &str)
        -> Result<ImageId>;

    /// Replace every texel of an image.
    fn write_image(&mut self, image: ImageId, texels: &[Texel]) -> Result<()>;

    /// Blocking readback of every texel.
    fn read_image(&mut self, image: ImageId) -> Result<Vec<Texel>>;

    fn image_side(&self, image: ImageId) -> Result<u32>;

    /// Release an image; unknown ids are ignored.
    fn destroy_image(&mut self, image: ImageId);

    /// Compile a generated program ahead of the first pass that needs it.
    fn prepare(&mut self, _program: &Program) -> Result<()> {
        Ok(())
    }

    fn execute(&mut self, pass: &Pass) -> Result<()>;
}

/// Check a texel slice matches a square image of `side`.
pub(crate) fn expect_texels(side: u32, texels: &[Texel]) -> Result<()> {
    let expected = side as usize * side as usize;
    if texels.len() != expected {
        return Err(crate::EngineError::ResourceCreation(format!(
            "expected {expected} texels for a {side}x{side} image, got {}",
            texels.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_walk_bound_grows_with_theta() {
        assert_eq!(BoxWalkShape::new(12, 1.7).max_cells, 12);
        assert_eq!(BoxWalkShape::new(12, 0.5).max_cells, 6);
    }

    #[test]
    fn test_quadtree_shape_depth_is_capped() {
        let shape = QuadtreeShape::new(8, 12);
        assert_eq!(shape.root_level, 0);
        assert_eq!(shape.depth(), 8);

        let shape = QuadtreeShape::new(12, 4);
        assert_eq!(shape.root_level, 8);
        assert_eq!(shape.depth(), 4);
    }

    #[test]
    fn test_aliasing_is_detected() {
        let pass = Pass::Integrate {
            positions: ImageId(1),
            velocity: ImageId(2),
            friction: 0.9,
            space_size: 64.0,
            target: ImageId(1),
        };
        assert!(pass.check_aliasing().is_err());

        let pass = Pass::Integrate {
            positions: ImageId(1),
            velocity: ImageId(2),
            friction: 0.9,
            space_size: 64.0,
            target: ImageId(3),
        };
        assert!(pass.check_aliasing().is_ok());
    }
}
