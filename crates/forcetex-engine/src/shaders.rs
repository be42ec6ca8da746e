//! WGSL programs for every pass.
//!
//! All programs share one layout: binding 0 is a uniform block of four
//! `vec4<f32>` parameters, bindings 1.. are the pass's source images in the
//! order given by [`Pass::sources`]. Fullscreen programs run `fs_main` once
//! per target texel; scatter programs run one vertex per point and draw a
//! one-pixel point.
//!
//! The unrolled quadtree walk is not a constant: [`quadtree_walk_source`]
//! generates a loop nest whose depth matches the pyramid, since the raster
//! pipeline has no call stack to recurse on.

use std::fmt::Write;

use crate::device::{Blend, Pass, QuadtreeShape};

/// Declarations shared by every program.
pub const PRELUDE: &str = r#"
struct Params {
    a: vec4<f32>,
    b: vec4<f32>,
    c: vec4<f32>,
    d: vec4<f32>,
}

@group(0) @binding(0) var<uniform> params: Params;

struct Scatter {
    @builtin(position) position: vec4<f32>,
    @location(0) value: vec4<f32>,
}

@vertex
fn vs_fullscreen(@builtin(vertex_index) vertex: u32) -> @builtin(position) vec4<f32> {
    let uv = vec2<f32>(f32((vertex << 1u) & 2u), f32(vertex & 2u));
    return vec4<f32>(uv * 2.0 - 1.0, 0.0, 1.0);
}

@fragment
fn fs_scatter(v: Scatter) -> @location(0) vec4<f32> {
    return v.value;
}

fn texel_coord(frag: vec4<f32>) -> vec2<i32> {
    return vec2<i32>(floor(frag.xy));
}

fn point_coord(index: u32, side: u32) -> vec2<i32> {
    return vec2<i32>(i32(index % side), i32(index / side));
}

// Clip-space centre of texel `cell` in a square target of `side` texels.
fn cell_to_clip(cell: vec2<f32>, side: f32) -> vec4<f32> {
    let ndc = (cell + 0.5) / side * 2.0 - 1.0;
    return vec4<f32>(ndc.x, -ndc.y, 0.0, 1.0);
}
"#;

/// Repulsion law shared by both many-body programs.
const REPULSION: &str = r#"
// Velocity toward a cell centroid; callers subtract it to repel.
fn cell_contribution(cell: vec4<f32>, p: vec2<f32>, jitter: vec2<f32>, strength: f32) -> vec2<f32> {
    if (cell.z <= 0.0) {
        return vec2<f32>(0.0);
    }
    let d = cell.xy / cell.z - p;
    let l2 = dot(d, d);
    if (l2 <= 0.0) {
        return vec2<f32>(0.0);
    }
    let add = d * (strength * cell.z / max(l2, 1.0));
    return add + add * jitter;
}
"#;

/// Screen projection shared by the picking programs.
///
/// params.a: (k, tx, ty, pixel ratio)
/// params.b: (screen width, screen height, space size, max point size)
/// params.c: (size scale, scale on zoom, _, _)
const PROJECTION: &str = r#"
fn to_screen(p: vec2<f32>) -> vec2<f32> {
    return params.a.yz + params.a.x * (p + (params.b.xy - params.b.z) / 2.0);
}

fn point_size(size: f32) -> f32 {
    var zoom = params.a.x;
    if (params.c.y == 0.0) {
        zoom = clamp(params.a.x * 0.01, 1.0, 5.0);
    }
    return min(size * params.c.x * params.a.w * zoom, params.b.w);
}
"#;

/// params.a: (cell size, target side)
pub const SPLAT: &str = r#"
@group(0) @binding(1) var positions: texture_2d<f32>;

@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> Scatter {
    let side = textureDimensions(positions).x;
    let p = textureLoad(positions, point_coord(index, side), 0).xy;
    let cell = clamp(floor(p / params.a.x), vec2<f32>(0.0), vec2<f32>(params.a.y - 1.0));
    var out: Scatter;
    out.position = cell_to_clip(cell, params.a.y);
    out.value = vec4<f32>(p, 1.0, 0.0);
    return out;
}
"#;

/// params.a: (friction, space size)
pub const INTEGRATE: &str = r#"
@group(0) @binding(1) var positions: texture_2d<f32>;
@group(0) @binding(2) var velocity: texture_2d<f32>;

@fragment
fn fs_main(@builtin(position) frag: vec4<f32>) -> @location(0) vec4<f32> {
    let c = texel_coord(frag);
    let p = textureLoad(positions, c, 0);
    let v = textureLoad(velocity, c, 0).xy * params.a.x;
    let next = clamp(p.xy + v, vec2<f32>(0.0), vec2<f32>(params.a.y));
    return vec4<f32>(next, p.zw);
}
"#;

/// params.a: (strength, theta, space size, level)
/// params.b: (levels, max cells per side)
pub const BOX_WALK: &str = r#"
@group(0) @binding(1) var positions: texture_2d<f32>;
@group(0) @binding(2) var random_values: texture_2d<f32>;
@group(0) @binding(3) var level_cells: texture_2d<f32>;

fn shrink_box(b: vec4<f32>, p: vec2<f32>, cell: f32, theta: f32) -> vec4<f32> {
    let near = max(vec2<f32>(0.0), floor((p - b.xy) / cell - theta));
    let far = max(vec2<f32>(0.0), floor((b.zw - p) / cell - theta));
    return vec4<f32>(b.xy + near * cell, b.zw - far * cell);
}

@fragment
fn fs_main(@builtin(position) frag: vec4<f32>) -> @location(0) vec4<f32> {
    let c = texel_coord(frag);
    let p = textureLoad(positions, c, 0).xy;
    let jitter = textureLoad(random_values, c, 0).xy;
    let strength = params.a.x;
    let theta = params.a.y;
    let space = params.a.z;
    let level = u32(params.a.w);
    let levels = u32(params.b.x);
    let max_cells = i32(params.b.y);

    var outer = vec4<f32>(0.0, 0.0, space, space);
    for (var i = 0u; i < level; i++) {
        outer = shrink_box(outer, p, space / f32(1u << (i + 1u)), theta);
    }
    let cell = space / f32(1u << (level + 1u));
    let last = level + 1u >= levels;
    let inner = vec4<i32>(round(shrink_box(outer, p, cell, theta) / cell));
    let start = vec2<i32>(round(outer.xy / cell));
    let size = clamp(vec2<i32>(round(outer.zw / cell)) - start, vec2<i32>(0), vec2<i32>(max_cells));

    var add = vec2<f32>(0.0);
    for (var dy = 0; dy < max_cells; dy++) {
        if (dy >= size.y) {
            break;
        }
        for (var dx = 0; dx < max_cells; dx++) {
            if (dx >= size.x) {
                break;
            }
            let xy = start + vec2<i32>(dx, dy);
            let in_inner = all(xy >= inner.xy) && all(xy < inner.zw);
            if (in_inner && !last) {
                continue;
            }
            add += cell_contribution(textureLoad(level_cells, xy, 0), p, jitter, strength);
        }
    }
    return vec4<f32>(-add, 0.0, 0.0);
}
"#;

/// params.a: (strength, link distance, variation floor, variation ceil)
/// params.b: (max degree)
pub const LINK_SPRING: &str = r#"
@group(0) @binding(1) var positions: texture_2d<f32>;
@group(0) @binding(2) var first_links: texture_2d<f32>;
@group(0) @binding(3) var neighbors: texture_2d<f32>;
@group(0) @binding(4) var link_params: texture_2d<f32>;

@fragment
fn fs_main(@builtin(position) frag: vec4<f32>) -> @location(0) vec4<f32> {
    let c = texel_coord(frag);
    let p = textureLoad(positions, c, 0).xy;
    let first = textureLoad(first_links, c, 0);
    let link_side = textureDimensions(neighbors).x;
    let count = min(u32(first.z), u32(params.b.x));
    let start = u32(first.y) * link_side + u32(first.x);

    var v = vec2<f32>(0.0);
    for (var j = 0u; j < count; j++) {
        let link = point_coord(start + j, link_side);
        let neighbor = textureLoad(neighbors, link, 0).xy;
        let q = textureLoad(positions, vec2<i32>(neighbor), 0).xy;
        let weights = textureLoad(link_params, link, 0);
        let rest = (weights.z * (params.a.w - params.a.z) + params.a.z) * params.a.y;
        let d = q - p;
        let dist = max(length(d), rest * 0.99);
        if (dist <= 0.0) {
            continue;
        }
        v += d * ((dist - rest) / dist * params.a.x * weights.y * weights.x);
    }
    return vec4<f32>(v, 0.0, 0.0);
}
"#;

/// params.a: (strength, space size)
pub const GRAVITY: &str = r#"
@group(0) @binding(1) var positions: texture_2d<f32>;

@fragment
fn fs_main(@builtin(position) frag: vec4<f32>) -> @location(0) vec4<f32> {
    let p = textureLoad(positions, texel_coord(frag), 0).xy;
    return vec4<f32>((vec2<f32>(params.a.y / 2.0) - p) * params.a.x * 0.1, 0.0, 0.0);
}
"#;

/// params.a: (strength)
pub const CENTER: &str = r#"
@group(0) @binding(1) var positions: texture_2d<f32>;
@group(0) @binding(2) var center_mass: texture_2d<f32>;

@fragment
fn fs_main(@builtin(position) frag: vec4<f32>) -> @location(0) vec4<f32> {
    let mass = textureLoad(center_mass, vec2<i32>(0, 0), 0);
    if (mass.z <= 0.0) {
        return vec4<f32>(0.0);
    }
    let p = textureLoad(positions, texel_coord(frag), 0).xy;
    return vec4<f32>((mass.xy / mass.z - p) * params.a.x * 0.01, 0.0, 0.0);
}
"#;

/// params.a: (pointer x, pointer y, strength)
pub const POINTER: &str = r#"
@group(0) @binding(1) var positions: texture_2d<f32>;

@fragment
fn fs_main(@builtin(position) frag: vec4<f32>) -> @location(0) vec4<f32> {
    let p = textureLoad(positions, texel_coord(frag), 0).xy;
    let d = p - params.a.xy;
    let len = length(d);
    if (len <= 0.0) {
        return vec4<f32>(0.0);
    }
    let l = max(len, 10.0);
    return vec4<f32>(d * (100.0 * params.a.z / (l * l) / len), 0.0, 0.0);
}
"#;

/// Projection in params.a-c, params.d: (pointer x, pointer y)
pub const HOVER: &str = r#"
@group(0) @binding(1) var positions: texture_2d<f32>;
@group(0) @binding(2) var sizes: texture_2d<f32>;

@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> Scatter {
    let coord = point_coord(index, textureDimensions(positions).x);
    let p = textureLoad(positions, coord, 0).xy;
    let size = textureLoad(sizes, coord, 0).x;
    var out: Scatter;
    out.value = vec4<f32>(f32(index), size, p);
    // Misses are placed outside the clip volume and never rasterized.
    out.position = vec4<f32>(2.0, 2.0, 0.0, 1.0);
    if (distance(to_screen(p), params.d.xy) < 0.5 * point_size(size)) {
        out.position = vec4<f32>(0.0, 0.0, 0.0, 1.0);
    }
    return out;
}
"#;

/// Projection in params.a-c, params.d: (left, top, right, bottom)
pub const AREA_SELECT: &str = r#"
@group(0) @binding(1) var positions: texture_2d<f32>;
@group(0) @binding(2) var sizes: texture_2d<f32>;

@fragment
fn fs_main(@builtin(position) frag: vec4<f32>) -> @location(0) vec4<f32> {
    let c = texel_coord(frag);
    let p = textureLoad(positions, c, 0).xy;
    let radius = 0.5 * point_size(textureLoad(sizes, c, 0).x);
    let s = to_screen(p);
    let rect = params.d;
    let inside = s.x >= rect.x - radius && s.x <= rect.z + radius
        && s.y >= rect.y - radius && s.y <= rect.w + radius;
    return vec4<f32>(select(0.0, 1.0, inside), 0.0, p);
}
"#;

pub const TRACK: &str = r#"
@group(0) @binding(1) var positions: texture_2d<f32>;
@group(0) @binding(2) var indices: texture_2d<f32>;

@fragment
fn fs_main(@builtin(position) frag: vec4<f32>) -> @location(0) vec4<f32> {
    let tracked = textureLoad(indices, texel_coord(frag), 0);
    if (tracked.z <= 0.0) {
        return vec4<f32>(0.0);
    }
    let p = textureLoad(positions, vec2<i32>(tracked.xy), 0).xy;
    return vec4<f32>(p, 1.0, 1.0);
}
"#;

/// Every compiled program, keyed for pipeline caching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderProgram {
    Splat,
    Integrate,
    BoxWalk,
    QuadtreeWalk(QuadtreeShape),
    LinkSpring,
    Gravity,
    Center,
    Pointer,
    Hover,
    AreaSelect,
    Track,
}

impl ShaderProgram {
    /// Program executing `pass`; `None` for clears, which need no draw.
    pub fn for_pass(pass: &Pass) -> Option<Self> {
        let program = match pass {
            Pass::Clear { .. } => return None,
            Pass::Splat { .. } => ShaderProgram::Splat,
            Pass::Integrate { .. } => ShaderProgram::Integrate,
            Pass::BoxWalk { .. } => ShaderProgram::BoxWalk,
            Pass::QuadtreeWalk { shape, .. } => ShaderProgram::QuadtreeWalk(*shape),
            Pass::LinkSpring { .. } => ShaderProgram::LinkSpring,
            Pass::Gravity { .. } => ShaderProgram::Gravity,
            Pass::Center { .. } => ShaderProgram::Center,
            Pass::Pointer { .. } => ShaderProgram::Pointer,
            Pass::Hover { .. } => ShaderProgram::Hover,
            Pass::AreaSelect { .. } => ShaderProgram::AreaSelect,
            Pass::Track { .. } => ShaderProgram::Track,
        };
        Some(program)
    }

    /// Scatter programs draw one point per source point.
    pub fn is_scatter(&self) -> bool {
        matches!(self, ShaderProgram::Splat | ShaderProgram::Hover)
    }

    pub fn blend(&self) -> Blend {
        match self {
            ShaderProgram::Integrate
            | ShaderProgram::Hover
            | ShaderProgram::AreaSelect
            | ShaderProgram::Track => Blend::Replace,
            _ => Blend::Additive,
        }
    }

    /// Number of image bindings after the uniform block.
    pub fn texture_count(&self) -> u32 {
        match self {
            ShaderProgram::Splat | ShaderProgram::Gravity | ShaderProgram::Pointer => 1,
            ShaderProgram::Integrate
            | ShaderProgram::Center
            | ShaderProgram::Hover
            | ShaderProgram::AreaSelect
            | ShaderProgram::Track => 2,
            ShaderProgram::BoxWalk => 3,
            ShaderProgram::LinkSpring => 4,
            ShaderProgram::QuadtreeWalk(shape) => 2 + shape.depth(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ShaderProgram::Splat => "splat",
            ShaderProgram::Integrate => "integrate",
            ShaderProgram::BoxWalk => "box-walk",
            ShaderProgram::QuadtreeWalk(_) => "quadtree-walk",
            ShaderProgram::LinkSpring => "link-spring",
            ShaderProgram::Gravity => "gravity",
            ShaderProgram::Center => "center",
            ShaderProgram::Pointer => "pointer",
            ShaderProgram::Hover => "hover",
            ShaderProgram::AreaSelect => "area-select",
            ShaderProgram::Track => "track",
        }
    }

    /// Complete WGSL module.
    pub fn source(&self) -> String {
        let body = match self {
            ShaderProgram::Splat => SPLAT,
            ShaderProgram::Integrate => INTEGRATE,
            ShaderProgram::BoxWalk => return format!("{PRELUDE}{REPULSION}{BOX_WALK}"),
            ShaderProgram::QuadtreeWalk(shape) => return quadtree_walk_source(*shape),
            ShaderProgram::LinkSpring => LINK_SPRING,
            ShaderProgram::Gravity => GRAVITY,
            ShaderProgram::Center => CENTER,
            ShaderProgram::Pointer => POINTER,
            ShaderProgram::Hover => return format!("{PRELUDE}{PROJECTION}{HOVER}"),
            ShaderProgram::AreaSelect => return format!("{PRELUDE}{PROJECTION}{AREA_SELECT}"),
            ShaderProgram::Track => TRACK,
        };
        format!("{PRELUDE}{body}")
    }
}

/// Generate the unrolled Barnes-Hut walk for a pyramid shape.
///
/// Binding `3 + k` holds pyramid level `root_level + k`. Every root cell is
/// visited; a non-empty cell whose width satisfies `width² / theta < d²` is
/// applied as a whole, otherwise its four children are visited one loop
/// deeper. Cells of the finest level are applied unconditionally.
///
/// params.a: (strength, theta, space size)
pub fn quadtree_walk_source(shape: QuadtreeShape) -> String {
    let depth = shape.depth().max(1);
    let root_side = 1u32 << (shape.root_level + 1);
    let mut src = String::with_capacity(4096);

    src.push_str(PRELUDE);
    src.push_str(REPULSION);
    src.push_str("\n@group(0) @binding(1) var positions: texture_2d<f32>;\n");
    src.push_str("@group(0) @binding(2) var random_values: texture_2d<f32>;\n");
    for k in 0..depth {
        let _ = writeln!(
            src,
            "@group(0) @binding({}) var level_{k}: texture_2d<f32>;",
            3 + k
        );
    }

    src.push_str(
        r#"
@fragment
fn fs_main(@builtin(position) frag: vec4<f32>) -> @location(0) vec4<f32> {
    let c = texel_coord(frag);
    let p = textureLoad(positions, c, 0).xy;
    let jitter = textureLoad(random_values, c, 0).xy;
    let strength = params.a.x;
    let theta = params.a.y;
"#,
    );
    let _ = writeln!(
        src,
        "    let width_0 = params.a.z / {}.0;",
        root_side
    );
    for k in 1..depth {
        let _ = writeln!(src, "    let width_{k} = width_{} / 2.0;", k - 1);
    }

    src.push_str("    var add = vec2<f32>(0.0);\n");
    let _ = writeln!(src, "    for (var x0 = 0u; x0 < {root_side}u; x0++) {{");
    let _ = writeln!(src, "    for (var y0 = 0u; y0 < {root_side}u; y0++) {{");
    src.push_str("        let cell_0 = vec2<u32>(x0, y0);\n");
    emit_visit(&mut src, 0, depth, 2);
    src.push_str("    }\n    }\n");
    src.push_str("    return vec4<f32>(-add, 0.0, 0.0);\n}\n");
    src
}

fn emit_visit(src: &mut String, k: u32, depth: u32, indent: usize) {
    let pad = "    ".repeat(indent);
    let _ = writeln!(src, "{pad}let mass_{k} = textureLoad(level_{k}, cell_{k}, 0);");
    let _ = writeln!(src, "{pad}if (mass_{k}.z > 0.0) {{");

    if k + 1 >= depth {
        let _ = writeln!(
            src,
            "{pad}    add += cell_contribution(mass_{k}, p, jitter, strength);"
        );
    } else {
        let next = k + 1;
        let _ = writeln!(src, "{pad}    let d_{k} = mass_{k}.xy / mass_{k}.z - p;");
        let _ = writeln!(
            src,
            "{pad}    if (width_{k} * width_{k} / theta < dot(d_{k}, d_{k})) {{"
        );
        let _ = writeln!(
            src,
            "{pad}        add += cell_contribution(mass_{k}, p, jitter, strength);"
        );
        let _ = writeln!(src, "{pad}    }} else {{");
        let _ = writeln!(
            src,
            "{pad}        for (var q{next} = 0u; q{next} < 4u; q{next}++) {{"
        );
        let _ = writeln!(
            src,
            "{pad}            let cell_{next} = cell_{k} * 2u + vec2<u32>(q{next} & 1u, q{next} >> 1u);"
        );
        emit_visit(src, next, depth, indent + 3);
        let _ = writeln!(src, "{pad}        }}");
        let _ = writeln!(src, "{pad}    }}");
    }
    let _ = writeln!(src, "{pad}}}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{BoxWalkShape, ImageId};
    use crate::picking::{Projection, ZoomTransform};

    fn id(n: u32) -> ImageId {
        ImageId(n)
    }

    fn projection() -> Projection {
        Projection {
            screen_size: [100.0, 100.0],
            transform: ZoomTransform::default(),
            space_size: 64.0,
            pixel_ratio: 1.0,
            size_scale: 1.0,
            scale_on_zoom: true,
            max_point_size: 64.0,
        }
    }

    fn sample_passes() -> Vec<Pass> {
        vec![
            Pass::Splat { positions: id(0), count: 4, cell_size: 8.0, target: id(9) },
            Pass::Integrate { positions: id(0), velocity: id(1), friction: 0.8, space_size: 64.0, target: id(9) },
            Pass::BoxWalk {
                positions: id(0),
                random: id(1),
                level_image: id(2),
                level: 1,
                shape: BoxWalkShape::new(6, 1.0),
                strength: 0.1,
                theta: 1.0,
                space_size: 64.0,
                target: id(9),
            },
            Pass::QuadtreeWalk {
                positions: id(0),
                random: id(1),
                levels: vec![id(2), id(3), id(4)],
                shape: QuadtreeShape::new(6, 3),
                strength: 0.1,
                theta: 1.0,
                space_size: 64.0,
                target: id(9),
            },
            Pass::LinkSpring {
                positions: id(0),
                first_links: id(1),
                neighbors: id(2),
                link_params: id(3),
                max_degree: 2,
                strength: 1.0,
                link_distance: 2.0,
                variation: [1.0, 1.2],
                target: id(9),
            },
            Pass::Gravity { positions: id(0), strength: 0.1, space_size: 64.0, target: id(9) },
            Pass::Center { positions: id(0), centroid: id(1), strength: 0.1, target: id(9) },
            Pass::Pointer { positions: id(0), pointer: [1.0, 1.0], strength: 2.0, target: id(9) },
            Pass::Hover {
                positions: id(0),
                sizes: id(1),
                count: 4,
                projection: projection(),
                pointer: [0.0, 0.0],
                target: id(9),
            },
            Pass::AreaSelect {
                positions: id(0),
                sizes: id(1),
                projection: projection(),
                rect: [0.0, 0.0, 10.0, 10.0],
                target: id(9),
            },
            Pass::Track { positions: id(0), indices: id(1), target: id(9) },
        ]
    }

    #[test]
    fn test_bindings_match_pass_sources() {
        for pass in sample_passes() {
            let program = ShaderProgram::for_pass(&pass).unwrap();
            let sources = pass.sources().len() as u32;
            assert_eq!(program.texture_count(), sources, "{}", program.label());

            assert_eq!(program.blend(), pass.blend(), "{}", program.label());

            let src = program.source();
            let last = format!("@binding({})", sources);
            assert!(src.contains(&last), "{} lacks {last}", program.label());
            let beyond = format!("@binding({})", sources + 1);
            assert!(!src.contains(&beyond), "{} declares {beyond}", program.label());
        }
        assert!(ShaderProgram::for_pass(&Pass::Clear { target: id(0) }).is_none());
    }

    #[test]
    fn test_entry_points() {
        for pass in sample_passes() {
            let program = ShaderProgram::for_pass(&pass).unwrap();
            let src = program.source();
            if program.is_scatter() {
                assert!(src.contains("fn vs_main"));
            } else {
                assert!(src.contains("fn fs_main"));
            }
        }
    }

    #[test]
    fn test_quadtree_source_nests_one_loop_per_level() {
        let src = quadtree_walk_source(QuadtreeShape::new(8, 4));
        // Root level 4 has 32x32 cells.
        assert!(src.contains("x0 < 32u"));
        assert!(src.contains("var level_3: texture_2d<f32>"));
        assert!(!src.contains("level_4"));
        assert!(src.contains("for (var q3 = 0u; q3 < 4u; q3++)"));
        assert!(!src.contains("q4"));
        assert_eq!(src.matches("cell_contribution(mass_").count(), 4);

        let open = src.matches('{').count();
        let close = src.matches('}').count();
        assert_eq!(open, close);
    }

    #[test]
    fn test_single_level_quadtree_applies_directly() {
        let src = quadtree_walk_source(QuadtreeShape::new(5, 1));
        assert!(src.contains("x0 < 32u"));
        assert!(!src.contains("q1"));
        assert_eq!(src.matches("cell_contribution(mass_0").count(), 1);
    }
}
