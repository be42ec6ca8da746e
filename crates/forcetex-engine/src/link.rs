//! Spring attraction along links.
//!
//! Adjacency is ragged, so it is packed into three images per direction:
//! - `first_links` (per point): coordinate of the point's first entry in the
//!   link images and its neighbour count, `(x, y, count, 0)`.
//! - `neighbors` (per entry): the neighbour's coordinate in the point images.
//! - `link_params` (per entry): `(bias, strength, random, 0)`, fixed at load.

use forcetex_core::{LinkDirection, SimulationConfig, TextureLayout, Topology};
use rand::Rng;

use crate::device::{ImageId, Pass, RasterDevice};
use crate::{Result, Texel};

/// Per-link `(bias, strength)` from the endpoint degrees.
///
/// The bias is the neighbour's share of the combined degree, so a hub linked
/// to a leaf moves little while the leaf takes most of the pull. Strength
/// falls with the smaller degree, keeping total force on a node roughly
/// independent of how many links it has.
pub fn link_weights(degree_self: u32, degree_neighbor: u32) -> (f32, f32) {
    let total = degree_self + degree_neighbor;
    let bias = if total == 0 {
        0.5
    } else {
        degree_neighbor as f32 / total as f32
    };
    let strength = (1.0 / degree_self.min(degree_neighbor).max(1) as f32).sqrt();
    (bias, strength)
}

/// Springs for one adjacency direction.
#[derive(Debug)]
pub struct LinkForce {
    direction: LinkDirection,
    first_links: ImageId,
    neighbors: ImageId,
    link_params: ImageId,
    max_degree: u32,
}

impl LinkForce {
    /// Pack the adjacency of `direction`, drawing one rest-length random per
    /// entry in packing order.
    pub fn create<D: RasterDevice, R: Rng>(
        device: &mut D,
        topology: &Topology,
        direction: LinkDirection,
        points: TextureLayout,
        links: TextureLayout,
        rng: &mut R,
    ) -> Result<Self> {
        let point_side = points.alloc_side() as usize;
        let link_side = links.alloc_side() as usize;
        let mut first = vec![Texel::ZERO; point_side * point_side];
        let mut neighbors = vec![Texel::ZERO; link_side * link_side];
        let mut params = vec![Texel::ZERO; link_side * link_side];

        let mut cursor = 0usize;
        for (sorted, group) in topology.groups(direction).iter().enumerate() {
            let (fx, fy) = links.coord(cursor);
            first[sorted] = Texel::new(fx as f32, fy as f32, group.len() as f32, 0.0);

            let degree_self = topology.sorted_degree(sorted).unwrap_or(0);
            for &neighbor in group {
                let (nx, ny) = points.coord(neighbor);
                let degree_neighbor = topology.sorted_degree(neighbor).unwrap_or(0);
                let (bias, strength) = link_weights(degree_self, degree_neighbor);
                let random = rng.gen::<f32>();

                if let (Some(n), Some(p)) = (neighbors.get_mut(cursor), params.get_mut(cursor)) {
                    *n = Texel::xy(nx as f32, ny as f32);
                    *p = Texel::new(bias, strength, random, 0.0);
                }
                cursor += 1;
            }
        }

        let label = direction.label();
        let first_links = device.create_image(
            points.alloc_side(),
            Some(&first),
            &format!("{label} first links"),
        )?;
        let neighbors =
            device.create_image(links.alloc_side(), Some(&neighbors), &format!("{label} neighbors"))?;
        let link_params =
            device.create_image(links.alloc_side(), Some(&params), &format!("{label} link params"))?;
        let max_degree = topology.max_group_size(direction) as u32;

        tracing::debug!(direction = label, entries = cursor, max_degree, "Packed links");

        Ok(Self {
            direction,
            first_links,
            neighbors,
            link_params,
            max_degree,
        })
    }

    /// Add spring pull along this direction to `velocity`.
    pub fn run<D: RasterDevice>(
        &self,
        device: &mut D,
        positions: ImageId,
        velocity: ImageId,
        alpha: f32,
        config: &SimulationConfig,
    ) -> Result<()> {
        if self.max_degree == 0 {
            return Ok(());
        }
        device.execute(&Pass::LinkSpring {
            positions,
            first_links: self.first_links,
            neighbors: self.neighbors,
            link_params: self.link_params,
            max_degree: self.max_degree,
            strength: alpha * config.link_spring,
            link_distance: config.link_distance,
            variation: config.link_dist_random_variation_range,
            target: velocity,
        })
    }

    /// Largest neighbour count of any point in this direction.
    pub fn max_degree(&self) -> u32 {
        self.max_degree
    }

    pub fn direction(&self) -> LinkDirection {
        self.direction
    }

    pub fn destroy<D: RasterDevice>(self, device: &mut D) {
        device.destroy_image(self.first_links);
        device.destroy_image(self.neighbors);
        device.destroy_image(self.link_params);
    }
}
