//! CPU implementation of every pass.
//!
//! Each kernel here evaluates exactly what the matching WGSL program in
//! [`crate::shaders`] computes per texel, so this device doubles as the
//! reference the GPU backend is checked against.

use std::collections::HashMap;

use super::{
    expect_texels, BoxWalkShape, DeviceLimits, ImageId, Pass, QuadtreeShape, RasterDevice,
};
use crate::picking::Projection;
use crate::{EngineError, Result, Texel};

/// Images with more texels than this and no initial data are stored sparsely.
const SPARSE_TEXELS: usize = 1 << 20;

#[derive(Debug)]
enum Storage {
    Dense(Vec<Texel>),
    Sparse(HashMap<usize, Texel>),
}

#[derive(Debug)]
struct Image {
    side: u32,
    label: String,
    storage: Storage,
}

impl Image {
    fn texel_count(&self) -> usize {
        self.side as usize * self.side as usize
    }

    fn get(&self, index: usize) -> Texel {
        match &self.storage {
            Storage::Dense(texels) => texels.get(index).copied().unwrap_or_default(),
            Storage::Sparse(texels) => texels.get(&index).copied().unwrap_or_default(),
        }
    }

    fn at(&self, x: u32, y: u32) -> Texel {
        if x >= self.side || y >= self.side {
            return Texel::ZERO;
        }
        self.get(y as usize * self.side as usize + x as usize)
    }

    fn write(&mut self, index: usize, value: Texel, additive: bool) {
        match &mut self.storage {
            Storage::Dense(texels) => {
                if let Some(slot) = texels.get_mut(index) {
                    if additive {
                        *slot += value;
                    } else {
                        *slot = value;
                    }
                }
            }
            Storage::Sparse(texels) => {
                if additive {
                    *texels.entry(index).or_default() += value;
                } else if value == Texel::ZERO {
                    texels.remove(&index);
                } else {
                    texels.insert(index, value);
                }
            }
        }
    }

    fn clear(&mut self) {
        match &mut self.storage {
            Storage::Dense(texels) => texels.fill(Texel::ZERO),
            Storage::Sparse(texels) => texels.clear(),
        }
    }

    fn to_vec(&self) -> Vec<Texel> {
        match &self.storage {
            Storage::Dense(texels) => texels.clone(),
            Storage::Sparse(texels) => {
                let mut dense = vec![Texel::ZERO; self.texel_count()];
                for (&index, &texel) in texels {
                    dense[index] = texel;
                }
                dense
            }
        }
    }
}

/// Reference device evaluating passes on the CPU.
#[derive(Debug)]
pub struct SoftwareDevice {
    images: Vec<Option<Image>>,
    limits: DeviceLimits,
    passes_executed: u64,
}

impl Default for SoftwareDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareDevice {
    pub fn new() -> Self {
        Self::with_limits(DeviceLimits::default())
    }

    /// A device reporting custom limits, e.g. to exercise capacity checks.
    pub fn with_limits(limits: DeviceLimits) -> Self {
        Self {
            images: Vec::new(),
            limits,
            passes_executed: 0,
        }
    }

    /// Total passes executed so far.
    pub fn passes_executed(&self) -> u64 {
        self.passes_executed
    }

    /// Images currently allocated.
    pub fn live_images(&self) -> usize {
        self.images.iter().filter(|slot| slot.is_some()).count()
    }

    fn image(&self, id: ImageId) -> Result<&Image> {
        self.images
            .get(id.0 as usize)
            .and_then(Option::as_ref)
            .ok_or(EngineError::UnknownImage(id))
    }

    fn image_mut(&mut self, id: ImageId) -> Result<&mut Image> {
        self.images
            .get_mut(id.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(EngineError::UnknownImage(id))
    }

    fn run(&self, pass: &Pass, out: &mut Image) -> Result<()> {
        let additive = matches!(pass.blend(), super::Blend::Additive);
        match pass {
            Pass::Clear { .. } => out.clear(),
            Pass::Splat {
                positions,
                count,
                cell_size,
                ..
            } => {
                let positions = self.image(*positions)?;
                let last = (out.side - 1) as f32;
                for index in 0..(*count as usize).min(positions.texel_count()) {
                    let p = positions.get(index);
                    let cx = (p.r / cell_size).floor().clamp(0.0, last) as usize;
                    let cy = (p.g / cell_size).floor().clamp(0.0, last) as usize;
                    out.write(cy * out.side as usize + cx, Texel::new(p.r, p.g, 1.0, 0.0), true);
                }
            }
            Pass::Integrate {
                positions,
                velocity,
                friction,
                space_size,
                ..
            } => {
                let positions = self.image(*positions)?;
                let velocity = self.image(*velocity)?;
                for index in 0..out.texel_count() {
                    let p = positions.get(index);
                    let v = velocity.get(index);
                    let x = (p.r + v.r * friction).clamp(0.0, *space_size);
                    let y = (p.g + v.g * friction).clamp(0.0, *space_size);
                    out.write(index, Texel::new(x, y, p.b, p.a), false);
                }
            }
            Pass::BoxWalk {
                positions,
                random,
                level_image,
                level,
                shape,
                strength,
                theta,
                space_size,
                ..
            } => {
                let positions = self.image(*positions)?;
                let random = self.image(*random)?;
                let cells = self.image(*level_image)?;
                let walk = BoxWalk {
                    cells,
                    level: *level,
                    shape: *shape,
                    strength: *strength,
                    theta: *theta,
                    space_size: *space_size,
                };
                for index in 0..out.texel_count() {
                    let p = positions.get(index).position();
                    let jitter = random.get(index).position();
                    let add = walk.accumulate(p, jitter);
                    out.write(index, Texel::xy(-add[0], -add[1]), additive);
                }
            }
            Pass::QuadtreeWalk {
                positions,
                random,
                levels,
                shape,
                strength,
                theta,
                space_size,
                ..
            } => {
                let positions = self.image(*positions)?;
                let random = self.image(*random)?;
                let levels = levels
                    .iter()
                    .map(|id| self.image(*id))
                    .collect::<Result<Vec<_>>>()?;
                if levels.len() != shape.depth() as usize {
                    return Err(EngineError::PassExecution(format!(
                        "quadtree walk expects {} levels, got {}",
                        shape.depth(),
                        levels.len()
                    )));
                }
                let walk = QuadtreeWalk {
                    levels,
                    shape: *shape,
                    strength: *strength,
                    theta: *theta,
                    space_size: *space_size,
                };
                let mut stack = Vec::new();
                for index in 0..out.texel_count() {
                    let p = positions.get(index).position();
                    let jitter = random.get(index).position();
                    let add = walk.accumulate(p, jitter, &mut stack);
                    out.write(index, Texel::xy(-add[0], -add[1]), additive);
                }
            }
            Pass::LinkSpring {
                positions,
                first_links,
                neighbors,
                link_params,
                max_degree,
                strength,
                link_distance,
                variation,
                ..
            } => {
                let positions = self.image(*positions)?;
                let first_links = self.image(*first_links)?;
                let neighbors = self.image(*neighbors)?;
                let link_params = self.image(*link_params)?;
                let link_side = neighbors.side as usize;
                for index in 0..out.texel_count() {
                    let p = positions.get(index);
                    let first = first_links.get(index);
                    let count = (first.b as u32).min(*max_degree) as usize;
                    let start = first.g as usize * link_side + first.r as usize;
                    let mut v = [0.0f32; 2];
                    for link in start..start + count {
                        let neighbor = neighbors.get(link);
                        let q = positions.at(neighbor.r as u32, neighbor.g as u32);
                        let params = link_params.get(link);
                        let rest = (params.b * (variation[1] - variation[0]) + variation[0])
                            * link_distance;
                        let d = [q.r - p.r, q.g - p.g];
                        let dist = (d[0] * d[0] + d[1] * d[1]).sqrt().max(rest * 0.99);
                        if dist <= 0.0 {
                            continue;
                        }
                        let pull = (dist - rest) / dist * strength * params.g * params.r;
                        v[0] += d[0] * pull;
                        v[1] += d[1] * pull;
                    }
                    out.write(index, Texel::xy(v[0], v[1]), additive);
                }
            }
            Pass::Gravity {
                positions,
                strength,
                space_size,
                ..
            } => {
                let positions = self.image(*positions)?;
                let half = space_size / 2.0;
                let k = strength * 0.1;
                for index in 0..out.texel_count() {
                    let p = positions.get(index);
                    out.write(index, Texel::xy((half - p.r) * k, (half - p.g) * k), additive);
                }
            }
            Pass::Center {
                positions,
                centroid,
                strength,
                ..
            } => {
                let positions = self.image(*positions)?;
                let mass = self.image(*centroid)?.get(0);
                if mass.b <= 0.0 {
                    return Ok(());
                }
                let c = [mass.r / mass.b, mass.g / mass.b];
                let k = strength * 0.01;
                for index in 0..out.texel_count() {
                    let p = positions.get(index);
                    out.write(index, Texel::xy((c[0] - p.r) * k, (c[1] - p.g) * k), additive);
                }
            }
            Pass::Pointer {
                positions,
                pointer,
                strength,
                ..
            } => {
                let positions = self.image(*positions)?;
                for index in 0..out.texel_count() {
                    let p = positions.get(index);
                    let d = [p.r - pointer[0], p.g - pointer[1]];
                    let len = (d[0] * d[0] + d[1] * d[1]).sqrt();
                    if len <= 0.0 {
                        continue;
                    }
                    let l = len.max(10.0);
                    let push = 100.0 * strength / (l * l) / len;
                    out.write(index, Texel::xy(d[0] * push, d[1] * push), additive);
                }
            }
            Pass::Hover {
                positions,
                sizes,
                count,
                projection,
                pointer,
                ..
            } => {
                let positions = self.image(*positions)?;
                let sizes = self.image(*sizes)?;
                for index in 0..(*count as usize).min(positions.texel_count()) {
                    let p = positions.get(index);
                    let size = sizes.get(index).r;
                    if hovers(projection, p.position(), size, *pointer) {
                        out.write(0, Texel::new(index as f32, size, p.r, p.g), false);
                    }
                }
            }
            Pass::AreaSelect {
                positions,
                sizes,
                projection,
                rect,
                ..
            } => {
                let positions = self.image(*positions)?;
                let sizes = self.image(*sizes)?;
                for index in 0..out.texel_count() {
                    let p = positions.get(index);
                    let size = sizes.get(index).r;
                    let selected = inside_area(projection, p.position(), size, *rect);
                    let flag = if selected { 1.0 } else { 0.0 };
                    out.write(index, Texel::new(flag, 0.0, p.r, p.g), false);
                }
            }
            Pass::Track {
                positions, indices, ..
            } => {
                let positions = self.image(*positions)?;
                let indices = self.image(*indices)?;
                for index in 0..out.texel_count() {
                    let tracked = indices.get(index);
                    let value = if tracked.b > 0.0 {
                        let p = positions.at(tracked.r as u32, tracked.g as u32);
                        Texel::new(p.r, p.g, 1.0, 1.0)
                    } else {
                        Texel::ZERO
                    };
                    out.write(index, value, false);
                }
            }
        }
        Ok(())
    }
}

impl RasterDevice for SoftwareDevice {
    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn create_image(
        &mut self,
        side: u32,
        initial: Option<&[Texel]>,
        label: &str,
    ) -> Result<ImageId> {
        if side == 0 || side > self.limits.max_texture_side {
            return Err(EngineError::ResourceCreation(format!(
                "{label}: side {side} outside 1..={}",
                self.limits.max_texture_side
            )));
        }
        let texel_count = side as usize * side as usize;
        let storage = match initial {
            Some(texels) => {
                expect_texels(side, texels)?;
                Storage::Dense(texels.to_vec())
            }
            None if texel_count > SPARSE_TEXELS => Storage::Sparse(HashMap::new()),
            None => Storage::Dense(vec![Texel::ZERO; texel_count]),
        };

        let id = ImageId(self.images.len() as u32);
        self.images.push(Some(Image {
            side,
            label: label.to_string(),
            storage,
        }));
        tracing::trace!(%id, side, label, "Created image");
        Ok(id)
    }

    fn write_image(&mut self, image: ImageId, texels: &[Texel]) -> Result<()> {
        let target = self.image_mut(image)?;
        expect_texels(target.side, texels)?;
        target.storage = Storage::Dense(texels.to_vec());
        Ok(())
    }

    fn read_image(&mut self, image: ImageId) -> Result<Vec<Texel>> {
        Ok(self.image(image)?.to_vec())
    }

    fn image_side(&self, image: ImageId) -> Result<u32> {
        Ok(self.image(image)?.side)
    }

    fn destroy_image(&mut self, image: ImageId) {
        if let Some(slot) = self.images.get_mut(image.0 as usize) {
            *slot = None;
        }
    }

    fn execute(&mut self, pass: &Pass) -> Result<()> {
        pass.check_aliasing()?;
        let target = pass.target();

        // Lift the target out of the arena so sources can be borrowed freely.
        let mut out = self
            .images
            .get_mut(target.0 as usize)
            .and_then(Option::take)
            .ok_or(EngineError::UnknownImage(target))?;
        let result = self.run(pass, &mut out);
        tracing::trace!(pass = pass.label(), target = %out.label, "Executed pass");
        self.images[target.0 as usize] = Some(out);

        self.passes_executed += 1;
        result
    }
}

// =============================================================================
// Repulsion kernels
// =============================================================================

/// Velocity contribution pulling `p` toward a cell's centroid; the caller
/// subtracts it to repel. Empty cells and coincident centroids contribute
/// nothing.
fn cell_contribution(cell: Texel, p: [f32; 2], jitter: [f32; 2], strength: f32) -> [f32; 2] {
    if cell.b <= 0.0 {
        return [0.0, 0.0];
    }
    let d = [cell.r / cell.b - p[0], cell.g / cell.b - p[1]];
    let l2 = d[0] * d[0] + d[1] * d[1];
    if l2 <= 0.0 {
        return [0.0, 0.0];
    }
    let k = strength * cell.b / l2.max(1.0);
    let add = [d[0] * k, d[1] * k];
    [add[0] + add[0] * jitter[0], add[1] + add[1] * jitter[1]]
}

/// Shrink a box `(left, top, right, bottom)` around `p` by whole cells until
/// each side is within `theta` cells of the point.
fn shrink_box(b: [f32; 4], p: [f32; 2], cell: f32, theta: f32) -> [f32; 4] {
    let n_left = ((p[0] - b[0]) / cell - theta).floor().max(0.0);
    let n_top = ((p[1] - b[1]) / cell - theta).floor().max(0.0);
    let n_right = ((b[2] - p[0]) / cell - theta).floor().max(0.0);
    let n_bottom = ((b[3] - p[1]) / cell - theta).floor().max(0.0);
    [
        b[0] + n_left * cell,
        b[1] + n_top * cell,
        b[2] - n_right * cell,
        b[3] - n_bottom * cell,
    ]
}

struct BoxWalk<'a> {
    cells: &'a Image,
    level: u32,
    shape: BoxWalkShape,
    strength: f32,
    theta: f32,
    space_size: f32,
}

impl BoxWalk<'_> {
    fn accumulate(&self, p: [f32; 2], jitter: [f32; 2]) -> [f32; 2] {
        let mut outer = [0.0, 0.0, self.space_size, self.space_size];
        for i in 0..self.level {
            let cell = self.space_size / (1u32 << (i + 1)) as f32;
            outer = shrink_box(outer, p, cell, self.theta);
        }
        let cell = self.space_size / (1u32 << (self.level + 1)) as f32;
        let last = self.level + 1 >= self.shape.levels;
        let inner = shrink_box(outer, p, cell, self.theta);

        let x0 = (outer[0] / cell).round() as i64;
        let y0 = (outer[1] / cell).round() as i64;
        let width = ((outer[2] / cell).round() as i64 - x0).clamp(0, self.shape.max_cells as i64);
        let height = ((outer[3] / cell).round() as i64 - y0).clamp(0, self.shape.max_cells as i64);
        let inner_cells = [
            (inner[0] / cell).round() as i64,
            (inner[1] / cell).round() as i64,
            (inner[2] / cell).round() as i64,
            (inner[3] / cell).round() as i64,
        ];

        let mut add = [0.0f32; 2];
        for dy in 0..height {
            for dx in 0..width {
                let (cx, cy) = (x0 + dx, y0 + dy);
                let in_inner = cx >= inner_cells[0]
                    && cx < inner_cells[2]
                    && cy >= inner_cells[1]
                    && cy < inner_cells[3];
                if in_inner && !last {
                    continue;
                }
                let texel = self.cells.at(cx as u32, cy as u32);
                let c = cell_contribution(texel, p, jitter, self.strength);
                add[0] += c[0];
                add[1] += c[1];
            }
        }
        add
    }
}

struct QuadtreeWalk<'a> {
    /// `levels[0]` is the root level.
    levels: Vec<&'a Image>,
    shape: QuadtreeShape,
    strength: f32,
    theta: f32,
    space_size: f32,
}

impl QuadtreeWalk<'_> {
    fn accumulate(&self, p: [f32; 2], jitter: [f32; 2], stack: &mut Vec<(u32, u32, u32)>) -> [f32; 2] {
        let depth = self.shape.depth();
        let root_side = 1u32 << (self.shape.root_level + 1);
        let mut add = [0.0f32; 2];

        stack.clear();
        // Reverse pushes so cells pop in the same order the generated loops visit them.
        for x in (0..root_side).rev() {
            for y in (0..root_side).rev() {
                stack.push((0, x, y));
            }
        }

        while let Some((depth_index, x, y)) = stack.pop() {
            let texel = self.levels[depth_index as usize].at(x, y);
            if texel.b <= 0.0 {
                continue;
            }
            let level = self.shape.root_level + depth_index;
            let width = self.space_size / (1u32 << (level + 1)) as f32;
            let d = [texel.r / texel.b - p[0], texel.g / texel.b - p[1]];
            let l2 = d[0] * d[0] + d[1] * d[1];

            if depth_index + 1 >= depth || width * width / self.theta < l2 {
                let c = cell_contribution(texel, p, jitter, self.strength);
                add[0] += c[0];
                add[1] += c[1];
                continue;
            }
            for k in (0..4u32).rev() {
                stack.push((depth_index + 1, x * 2 + (k & 1), y * 2 + (k >> 1)));
            }
        }
        add
    }
}

// =============================================================================
// Picking kernels
// =============================================================================

fn hovers(projection: &Projection, position: [f32; 2], size: f32, pointer: [f32; 2]) -> bool {
    let screen = projection.to_screen(position);
    let radius = 0.5 * projection.point_size(size);
    let dx = screen[0] - pointer[0];
    let dy = screen[1] - pointer[1];
    (dx * dx + dy * dy).sqrt() < radius
}

fn inside_area(projection: &Projection, position: [f32; 2], size: f32, rect: [f32; 4]) -> bool {
    let screen = projection.to_screen(position);
    let radius = 0.5 * projection.point_size(size);
    screen[0] >= rect[0] - radius
        && screen[0] <= rect[2] + radius
        && screen[1] >= rect[1] - radius
        && screen[1] <= rect[3] + radius
}

#[cfg(test)]
mod tests {
    use super::*;

    fn positions(device: &mut SoftwareDevice, points: &[[f32; 2]], side: u32) -> ImageId {
        let mut texels = vec![Texel::ZERO; (side * side) as usize];
        for (i, p) in points.iter().enumerate() {
            texels[i] = Texel::xy(p[0], p[1]);
        }
        device.create_image(side, Some(&texels), "positions").unwrap()
    }

    #[test]
    fn test_splat_sums_positions_and_counts() {
        let mut device = SoftwareDevice::new();
        let pos = positions(&mut device, &[[1.0, 1.0], [3.0, 2.0], [7.0, 7.0], [8.0, 8.0]], 2);
        let level = device.create_image(2, None, "level").unwrap();

        device
            .execute(&Pass::Splat {
                positions: pos,
                count: 4,
                cell_size: 4.0,
                target: level,
            })
            .unwrap();

        let cells = device.read_image(level).unwrap();
        assert_eq!(cells[0], Texel::new(4.0, 3.0, 2.0, 0.0));
        // x = 8 sits on the far border and is clamped into the last cell.
        assert_eq!(cells[3], Texel::new(15.0, 15.0, 2.0, 0.0));
        assert_eq!(cells[1].b, 0.0);
    }

    #[test]
    fn test_splat_skips_padding_texels() {
        let mut device = SoftwareDevice::new();
        let pos = positions(&mut device, &[[1.0, 1.0], [2.0, 2.0], [3.0, 3.0]], 2);
        let level = device.create_image(1, None, "mass").unwrap();

        device
            .execute(&Pass::Splat {
                positions: pos,
                count: 3,
                cell_size: 8.0,
                target: level,
            })
            .unwrap();

        assert_eq!(device.read_image(level).unwrap()[0].b, 3.0);
    }

    #[test]
    fn test_integrate_applies_friction_and_clamps() {
        let mut device = SoftwareDevice::new();
        let pos = positions(&mut device, &[[10.0, 10.0], [60.0, 1.0]], 2);
        let vel = device
            .create_image(
                2,
                Some(&[Texel::xy(2.0, -4.0), Texel::xy(10.0, -10.0), Texel::ZERO, Texel::ZERO]),
                "velocity",
            )
            .unwrap();
        let out = device.create_image(2, None, "next").unwrap();

        device
            .execute(&Pass::Integrate {
                positions: pos,
                velocity: vel,
                friction: 0.5,
                space_size: 64.0,
                target: out,
            })
            .unwrap();

        let next = device.read_image(out).unwrap();
        assert_eq!(next[0].position(), [11.0, 8.0]);
        assert_eq!(next[1].position(), [64.0, 0.0]);
    }

    #[test]
    fn test_execute_rejects_aliased_target() {
        let mut device = SoftwareDevice::new();
        let pos = positions(&mut device, &[[1.0, 1.0]], 1);
        let err = device
            .execute(&Pass::Gravity {
                positions: pos,
                strength: 1.0,
                space_size: 8.0,
                target: pos,
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::AliasedTarget { .. }));
        // The image survives the rejected pass.
        assert_eq!(device.read_image(pos).unwrap()[0].position(), [1.0, 1.0]);
    }

    #[test]
    fn test_unknown_and_destroyed_images() {
        let mut device = SoftwareDevice::new();
        let image = device.create_image(1, None, "tmp").unwrap();
        device.destroy_image(image);
        assert!(matches!(
            device.read_image(image),
            Err(EngineError::UnknownImage(_))
        ));
        assert_eq!(device.live_images(), 0);
        assert!(device.create_image(0, None, "empty").is_err());
    }

    #[test]
    fn test_large_images_are_sparse() {
        let mut device = SoftwareDevice::new();
        let big = device.create_image(2048, None, "level").unwrap();
        let pos = positions(&mut device, &[[5.0, 5.0]], 1);

        device
            .execute(&Pass::Splat {
                positions: pos,
                count: 1,
                cell_size: 1.0,
                target: big,
            })
            .unwrap();

        let texels = device.read_image(big).unwrap();
        assert_eq!(texels.len(), 2048 * 2048);
        assert_eq!(texels[5 * 2048 + 5], Texel::new(5.0, 5.0, 1.0, 0.0));
    }

    #[test]
    fn test_cell_contribution_law() {
        // A single point 10 units to the right with mass 2.
        let cell = Texel::new(20.0, 0.0, 2.0, 0.0);
        let add = cell_contribution(cell, [0.0, 0.0], [0.0, 0.0], 1.0);
        // strength * mass / distance along the unit direction.
        assert!((add[0] - 0.2).abs() < 1e-6);
        assert_eq!(add[1], 0.0);

        assert_eq!(cell_contribution(Texel::ZERO, [0.0, 0.0], [0.0, 0.0], 1.0), [0.0, 0.0]);
        let same = Texel::new(3.0, 3.0, 1.0, 0.0);
        assert_eq!(cell_contribution(same, [3.0, 3.0], [0.0, 0.0], 1.0), [0.0, 0.0]);
    }

    #[test]
    fn test_shrink_box_keeps_point_inside() {
        let b = shrink_box([0.0, 0.0, 64.0, 64.0], [5.0, 60.0], 8.0, 0.5);
        assert!(b[0] <= 5.0 && 5.0 <= b[2]);
        assert!(b[1] <= 60.0 && 60.0 <= b[3]);
        assert_eq!(b, [0.0, 56.0, 16.0, 64.0]);
    }
}
