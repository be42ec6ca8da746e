//! Simulation configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

/// Many-body approximation used for repulsion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ManyBodyStrategy {
    /// Per-level box shrinking over every pyramid level.
    #[default]
    BoxWalk,
    /// Barnes-Hut descent generated as a fixed loop nest.
    Quadtree,
}

impl ManyBodyStrategy {
    pub fn label(&self) -> &'static str {
        match self {
            ManyBodyStrategy::BoxWalk => "box-walk",
            ManyBodyStrategy::Quadtree => "quadtree",
        }
    }
}

/// Options consumed by the simulation engine.
///
/// Field names serialize in camelCase so configuration files written for the
/// browser build load unchanged. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SimulationConfig {
    /// World extent; must be a power of two.
    pub space_size: u32,
    /// Repulsion strategy.
    pub many_body: ManyBodyStrategy,
    /// Pull toward the middle of the space.
    pub gravity: f32,
    /// Pull toward the centroid of all points.
    pub center: f32,
    /// Many-body repulsion coefficient.
    pub repulsion: f32,
    /// Barnes-Hut acceptance threshold; larger accepts coarser cells sooner.
    pub repulsion_theta: f32,
    /// Depth of the unrolled quadtree walk, counted from the finest level.
    pub repulsion_quadtree_levels: u32,
    /// Spring coefficient.
    pub link_spring: f32,
    /// Rest length of a link before variation.
    pub link_distance: f32,
    /// Per-link rest length multiplier range `[floor, ceil]`.
    pub link_dist_random_variation_range: [f32; 2],
    /// Repulsion from the pointer during a drag.
    pub repulsion_from_mouse: f32,
    /// Velocity multiplier applied at integration (0-1).
    pub friction: f32,
    /// Cooling rate; larger is slower.
    pub decay: f32,
    /// Value alpha decays toward.
    pub alpha_target: f32,
    /// Node size used when neither an accessor nor the node provides one.
    pub node_size: f32,
    /// Multiplier applied to every node size.
    pub node_size_scale: f32,
    /// Device pixels per screen pixel.
    pub pixel_ratio: f32,
    /// Whether point sizes grow with zoom.
    pub scale_nodes_on_zoom: bool,
    /// Seed for every random draw; `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            space_size: 4096,
            many_body: ManyBodyStrategy::BoxWalk,
            gravity: 0.0,
            center: 0.0,
            repulsion: 0.1,
            repulsion_theta: 1.7,
            repulsion_quadtree_levels: 12,
            link_spring: 1.0,
            link_distance: 2.0,
            link_dist_random_variation_range: [1.0, 1.2],
            repulsion_from_mouse: 2.0,
            friction: 0.85,
            decay: 1000.0,
            alpha_target: 0.0,
            node_size: 4.0,
            node_size_scale: 1.0,
            pixel_ratio: 2.0,
            scale_nodes_on_zoom: true,
            seed: None,
        }
    }
}

impl SimulationConfig {
    /// Parse a (possibly partial) configuration document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.space_size < 2 || !self.space_size.is_power_of_two() {
            return Err(ConfigError::SpaceSize(self.space_size));
        }
        if !(self.decay > 0.0) {
            return Err(ConfigError::out_of_range("decay", "must be positive"));
        }
        if !(self.repulsion_theta > 0.0) {
            return Err(ConfigError::out_of_range("repulsionTheta", "must be positive"));
        }
        if !(0.0..=1.0).contains(&self.friction) {
            return Err(ConfigError::out_of_range("friction", "must lie in [0, 1]"));
        }
        if self.repulsion_quadtree_levels == 0 {
            return Err(ConfigError::out_of_range(
                "repulsionQuadtreeLevels",
                "must be at least 1",
            ));
        }
        let [floor, ceil] = self.link_dist_random_variation_range;
        if floor > ceil {
            return Err(ConfigError::out_of_range(
                "linkDistRandomVariationRange",
                format!("floor {floor} exceeds ceil {ceil}"),
            ));
        }
        if !(self.pixel_ratio > 0.0) {
            return Err(ConfigError::out_of_range("pixelRatio", "must be positive"));
        }
        Ok(())
    }

    /// Space size clamped to what a device with `max_side` textures can hold.
    pub fn effective_space_size(&self, max_side: u32) -> u32 {
        let cap = if max_side.is_power_of_two() {
            max_side
        } else {
            // Largest power of two below max_side.
            1u32 << (31 - max_side.max(1).leading_zeros())
        };
        if self.space_size > cap {
            tracing::warn!(
                requested = self.space_size,
                clamped = cap,
                "Space size exceeds device texture limit, clamping"
            );
            cap
        } else {
            self.space_size
        }
    }

    /// Whether switching from `self` to `next` needs every image recreated.
    pub fn requires_rebuild(&self, next: &SimulationConfig) -> bool {
        self.space_size != next.space_size
            || self.many_body != next.many_body
            || self.repulsion_quadtree_levels != next.repulsion_quadtree_levels
    }

    /// Whether switching from `self` to `next` changes resolved node sizes.
    pub fn requires_size_refresh(&self, next: &SimulationConfig) -> bool {
        self.node_size != next.node_size || self.node_size_scale != next.node_size_scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SimulationConfig::default();
        config.validate().unwrap();
        assert_eq!(config.space_size, 4096);
        assert_eq!(config.link_dist_random_variation_range, [1.0, 1.2]);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = SimulationConfig::from_json_str(
            r#"{"spaceSize": 256, "manyBody": "quadtree", "seed": 7}"#,
        )
        .unwrap();

        assert_eq!(config.space_size, 256);
        assert_eq!(config.many_body, ManyBodyStrategy::Quadtree);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.friction, 0.85);
    }

    #[test]
    fn test_rejects_non_power_of_two() {
        let err = SimulationConfig::from_json_str(r#"{"spaceSize": 1000}"#).unwrap_err();
        assert!(matches!(err, ConfigError::SpaceSize(1000)));
    }

    #[test]
    fn test_rejects_bad_ranges() {
        let mut config = SimulationConfig::default();
        config.link_dist_random_variation_range = [2.0, 1.0];
        assert!(config.validate().is_err());

        let mut config = SimulationConfig::default();
        config.friction = 1.5;
        assert!(config.validate().is_err());

        let mut config = SimulationConfig::default();
        config.decay = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_effective_space_size() {
        let config = SimulationConfig::default();
        assert_eq!(config.effective_space_size(16384), 4096);
        assert_eq!(config.effective_space_size(2048), 2048);
        assert_eq!(config.effective_space_size(3000), 2048);
    }

    #[test]
    fn test_rebuild_triggers() {
        let base = SimulationConfig::default();

        let mut next = base.clone();
        next.gravity = 0.5;
        assert!(!base.requires_rebuild(&next));

        next.repulsion_quadtree_levels = 8;
        assert!(base.requires_rebuild(&next));

        let mut sized = base.clone();
        sized.node_size = 10.0;
        assert!(base.requires_size_refresh(&sized));
    }
}
