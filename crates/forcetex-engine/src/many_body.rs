//! Many-body repulsion over the spatial pyramid.

use forcetex_core::{ManyBodyStrategy, SimulationConfig, TextureLayout};
use rand::Rng;

use crate::device::{BoxWalkShape, ImageId, Pass, Program, QuadtreeShape, RasterDevice};
use crate::pyramid::SpatialPyramid;
use crate::{EngineError, Result, Texel};

/// Magnitude of the per-point tie-breaking jitter.
const JITTER: f32 = 1e-5;

/// Repulsion between every pair of points, approximated through the pyramid.
#[derive(Debug)]
pub struct ManyBodyForce {
    strategy: ManyBodyStrategy,
    levels: u32,
    quadtree: QuadtreeShape,
    /// Two jitter values per point in `(r, g)`.
    random: ImageId,
}

impl ManyBodyForce {
    /// Coarsest pyramid level the strategy reads.
    pub fn first_level(strategy: ManyBodyStrategy, levels: u32, quadtree_levels: u32) -> u32 {
        match strategy {
            ManyBodyStrategy::BoxWalk => 0,
            ManyBodyStrategy::Quadtree => QuadtreeShape::new(levels, quadtree_levels).root_level,
        }
    }

    /// Draw per-point jitter and compile the walk program.
    pub fn create<D: RasterDevice, R: Rng>(
        device: &mut D,
        config: &SimulationConfig,
        space_size: u32,
        points: TextureLayout,
        rng: &mut R,
    ) -> Result<Self> {
        let levels = space_size.trailing_zeros();
        let quadtree = QuadtreeShape::new(levels, config.repulsion_quadtree_levels);

        if config.many_body == ManyBodyStrategy::Quadtree {
            let limit = device.limits().max_sampled_textures;
            let needed = 2 + quadtree.depth();
            if needed > limit {
                return Err(EngineError::Capacity {
                    what: "quadtree walk sampled textures",
                    side: needed,
                    max: limit,
                });
            }
            device.prepare(&Program::QuadtreeWalk(quadtree))?;
        }

        let side = points.alloc_side();
        let texels: Vec<Texel> = (0..side as usize * side as usize)
            .map(|_| {
                let x = rng.gen_range(-1.0f32..1.0) * JITTER;
                let y = rng.gen_range(-1.0f32..1.0) * JITTER;
                Texel::xy(x, y)
            })
            .collect();
        let random = device.create_image(side, Some(&texels), "many-body jitter")?;

        tracing::debug!(
            strategy = config.many_body.label(),
            levels,
            depth = quadtree.depth(),
            "Created many-body force"
        );

        Ok(Self {
            strategy: config.many_body,
            levels,
            quadtree,
            random,
        })
    }

    /// Add repulsion to `velocity`. The pyramid must already hold `positions`.
    pub fn run<D: RasterDevice>(
        &self,
        device: &mut D,
        pyramid: &SpatialPyramid,
        positions: ImageId,
        velocity: ImageId,
        alpha: f32,
        config: &SimulationConfig,
    ) -> Result<()> {
        let strength = alpha * config.repulsion;
        let theta = config.repulsion_theta;
        let space_size = (1u32 << self.levels) as f32;

        match self.strategy {
            ManyBodyStrategy::BoxWalk => {
                let shape = BoxWalkShape::new(self.levels, theta);
                for level in 0..self.levels {
                    let level_image = pyramid
                        .level(level)
                        .ok_or_else(|| missing_level(level))?;
                    device.execute(&Pass::BoxWalk {
                        positions,
                        random: self.random,
                        level_image,
                        level,
                        shape,
                        strength,
                        theta,
                        space_size,
                        target: velocity,
                    })?;
                }
            }
            ManyBodyStrategy::Quadtree => {
                let levels = (self.quadtree.root_level..self.levels)
                    .map(|level| pyramid.level(level).ok_or_else(|| missing_level(level)))
                    .collect::<Result<Vec<_>>>()?;
                device.execute(&Pass::QuadtreeWalk {
                    positions,
                    random: self.random,
                    levels,
                    shape: self.quadtree,
                    strength,
                    theta,
                    space_size,
                    target: velocity,
                })?;
            }
        }
        Ok(())
    }

    pub fn strategy(&self) -> ManyBodyStrategy {
        self.strategy
    }

    pub fn destroy<D: RasterDevice>(self, device: &mut D) {
        device.destroy_image(self.random);
    }
}

fn missing_level(level: u32) -> EngineError {
    EngineError::PassExecution(format!("pyramid level {level} was not built"))
}
