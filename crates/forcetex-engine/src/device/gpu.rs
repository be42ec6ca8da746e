//! wgpu implementation of the raster device.
//!
//! Images are `Rgba32Float` textures usable as both render target and
//! `textureLoad` source. Each pass is one render pass with one draw:
//! a fullscreen triangle, or a point list for scatter programs. Additive
//! passes use one-one blending, which needs `FLOAT32_BLENDABLE`.

use std::borrow::Cow;
use std::collections::HashMap;

use super::{expect_texels, Blend, DeviceLimits, ImageId, Pass, Program, RasterDevice};
use crate::picking::Projection;
use crate::shaders::ShaderProgram;
use crate::{EngineError, Result, Texel};

const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;
const TEXEL_BYTES: u32 = std::mem::size_of::<Texel>() as u32;
/// Point-size ceiling reported to picking, the same 64px fallback the
/// WebGL renderer used. wgpu draws one-pixel points and exposes no limit.
const MAX_POINT_SIZE: f32 = 64.0;

/// Uniform block shared by every program: four `vec4<f32>`.
type Uniforms = [[f32; 4]; 4];

#[derive(Debug)]
struct GpuImage {
    side: u32,
    label: String,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

#[derive(Debug)]
struct Pipeline {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

/// Raster device backed by a wgpu adapter.
#[derive(Debug)]
pub struct GpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    limits: DeviceLimits,
    images: Vec<Option<GpuImage>>,
    uniforms: wgpu::Buffer,
    pipelines: HashMap<ShaderProgram, Pipeline>,
}

impl GpuDevice {
    /// Open the default high-performance adapter.
    pub async fn new() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| EngineError::Device("No suitable GPU adapter found".into()))?;

        tracing::info!("Using GPU adapter: {:?}", adapter.get_info());

        if !adapter.features().contains(wgpu::Features::FLOAT32_BLENDABLE) {
            return Err(EngineError::Device(
                "adapter cannot blend into 32-bit float targets".into(),
            ));
        }

        let adapter_limits = adapter.limits();
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Force Simulation Device"),
                    required_features: wgpu::Features::FLOAT32_BLENDABLE,
                    required_limits: adapter_limits.clone(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .map_err(|e| EngineError::Device(e.to_string()))?;

        let limits = DeviceLimits {
            max_texture_side: adapter_limits.max_texture_dimension_2d,
            max_point_size: MAX_POINT_SIZE,
            max_sampled_textures: adapter_limits.max_sampled_textures_per_shader_stage,
        };

        let uniforms = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Pass Uniforms"),
            size: std::mem::size_of::<Uniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Ok(Self {
            device,
            queue,
            limits,
            images: Vec::new(),
            uniforms,
            pipelines: HashMap::new(),
        })
    }

    fn image(&self, id: ImageId) -> Result<&GpuImage> {
        self.images
            .get(id.0 as usize)
            .and_then(Option::as_ref)
            .ok_or(EngineError::UnknownImage(id))
    }

    fn ensure_pipeline(&mut self, program: ShaderProgram) -> Result<()> {
        if !self.pipelines.contains_key(&program) {
            let pipeline = self.build_pipeline(program)?;
            tracing::debug!(program = program.label(), "Compiled pipeline");
            self.pipelines.insert(program, pipeline);
        }
        Ok(())
    }

    fn build_pipeline(&self, program: ShaderProgram) -> Result<Pipeline> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(program.label()),
                source: wgpu::ShaderSource::Wgsl(Cow::Owned(program.source())),
            });

        let visibility = wgpu::ShaderStages::VERTEX_FRAGMENT;
        let mut entries = vec![wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }];
        for binding in 1..=program.texture_count() {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding,
                visibility,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
        }

        let bind_group_layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(program.label()),
                entries: &entries,
            });

        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(program.label()),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

        let (vertex_entry, fragment_entry, topology) = if program.is_scatter() {
            ("vs_main", "fs_scatter", wgpu::PrimitiveTopology::PointList)
        } else {
            ("vs_fullscreen", "fs_main", wgpu::PrimitiveTopology::TriangleList)
        };
        let additive = wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::One,
            dst_factor: wgpu::BlendFactor::One,
            operation: wgpu::BlendOperation::Add,
        };
        let blend = match program.blend() {
            Blend::Additive => Some(wgpu::BlendState {
                color: additive,
                alpha: additive,
            }),
            Blend::Replace => None,
        };

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(program.label()),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some(vertex_entry),
                    compilation_options: Default::default(),
                    buffers: &[],
                },
                primitive: wgpu::PrimitiveState {
                    topology,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some(fragment_entry),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: FORMAT,
                        blend,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                multiview: None,
                cache: None,
            });

        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(EngineError::ResourceCreation(format!(
                "{} pipeline: {error}",
                program.label()
            )));
        }

        Ok(Pipeline {
            pipeline,
            bind_group_layout,
        })
    }

    /// Pack a pass's scalars into the shared uniform layout.
    fn uniforms(&self, pass: &Pass) -> Result<Uniforms> {
        let mut u: Uniforms = [[0.0; 4]; 4];
        match pass {
            Pass::Clear { .. } => {}
            Pass::Splat {
                cell_size, target, ..
            } => {
                let side = self.image(*target)?.side as f32;
                u[0] = [*cell_size, side, 0.0, 0.0];
            }
            Pass::Integrate {
                friction,
                space_size,
                ..
            } => u[0] = [*friction, *space_size, 0.0, 0.0],
            Pass::BoxWalk {
                level,
                shape,
                strength,
                theta,
                space_size,
                ..
            } => {
                u[0] = [*strength, *theta, *space_size, *level as f32];
                u[1] = [shape.levels as f32, shape.max_cells as f32, 0.0, 0.0];
            }
            Pass::QuadtreeWalk {
                strength,
                theta,
                space_size,
                ..
            } => u[0] = [*strength, *theta, *space_size, 0.0],
            Pass::LinkSpring {
                max_degree,
                strength,
                link_distance,
                variation,
                ..
            } => {
                u[0] = [*strength, *link_distance, variation[0], variation[1]];
                u[1] = [*max_degree as f32, 0.0, 0.0, 0.0];
            }
            Pass::Gravity {
                strength,
                space_size,
                ..
            } => u[0] = [*strength, *space_size, 0.0, 0.0],
            Pass::Center { strength, .. } => u[0] = [*strength, 0.0, 0.0, 0.0],
            Pass::Pointer {
                pointer, strength, ..
            } => u[0] = [pointer[0], pointer[1], *strength, 0.0],
            Pass::Hover {
                projection,
                pointer,
                ..
            } => {
                pack_projection(&mut u, projection);
                u[3] = [pointer[0], pointer[1], 0.0, 0.0];
            }
            Pass::AreaSelect {
                projection, rect, ..
            } => {
                pack_projection(&mut u, projection);
                u[3] = *rect;
            }
            Pass::Track { .. } => {}
        }
        Ok(u)
    }

    fn vertex_count(pass: &Pass) -> u32 {
        match pass {
            Pass::Splat { count, .. } | Pass::Hover { count, .. } => *count,
            _ => 3,
        }
    }
}

fn pack_projection(u: &mut Uniforms, projection: &Projection) {
    let t = projection.transform;
    u[0] = [t.k, t.x, t.y, projection.pixel_ratio];
    u[1] = [
        projection.screen_size[0],
        projection.screen_size[1],
        projection.space_size,
        projection.max_point_size,
    ];
    let scale_on_zoom = if projection.scale_on_zoom { 1.0 } else { 0.0 };
    u[2] = [projection.size_scale, scale_on_zoom, 0.0, 0.0];
}

impl RasterDevice for GpuDevice {
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

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: extent(side),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let id = ImageId(self.images.len() as u32);
        self.images.push(Some(GpuImage {
            side,
            label: label.to_string(),
            texture,
            view,
        }));
        if let Some(texels) = initial {
            self.write_image(id, texels)?;
        }
        tracing::trace!(%id, side, label, "Created texture");
        Ok(id)
    }

    fn write_image(&mut self, image: ImageId, texels: &[Texel]) -> Result<()> {
        let target = self.image(image)?;
        expect_texels(target.side, texels)?;
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(texels),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(target.side * TEXEL_BYTES),
                rows_per_image: Some(target.side),
            },
            extent(target.side),
        );
        Ok(())
    }

    fn read_image(&mut self, image: ImageId) -> Result<Vec<Texel>> {
        let source = self.image(image)?;
        let side = source.side;
        let row_bytes = side * TEXEL_BYTES;
        let padded_row = row_bytes.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
            * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Staging"),
            size: padded_row as u64 * side as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &source.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(side),
                },
            },
            extent(side),
        );
        self.queue.submit(Some(encoder.finish()));

        let buffer_slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        self.device.poll(wgpu::Maintain::Wait);

        rx.recv()
            .map_err(|_| EngineError::Readback("Channel closed".into()))?
            .map_err(|e| EngineError::Readback(e.to_string()))?;

        let mut texels = Vec::with_capacity(side as usize * side as usize);
        {
            let data = buffer_slice.get_mapped_range();
            for row in data.chunks(padded_row as usize) {
                texels.extend_from_slice(bytemuck::cast_slice(&row[..row_bytes as usize]));
            }
        }
        staging.unmap();

        Ok(texels)
    }

    fn image_side(&self, image: ImageId) -> Result<u32> {
        Ok(self.image(image)?.side)
    }

    fn destroy_image(&mut self, image: ImageId) {
        if let Some(slot) = self.images.get_mut(image.0 as usize) {
            if let Some(gpu_image) = slot.take() {
                gpu_image.texture.destroy();
            }
        }
    }

    fn prepare(&mut self, program: &Program) -> Result<()> {
        match program {
            Program::QuadtreeWalk(shape) => self.ensure_pipeline(ShaderProgram::QuadtreeWalk(*shape)),
        }
    }

    fn execute(&mut self, pass: &Pass) -> Result<()> {
        pass.check_aliasing()?;

        let program = ShaderProgram::for_pass(pass);
        if let Some(program) = program {
            self.ensure_pipeline(program)?;
            let uniforms = self.uniforms(pass)?;
            self.queue
                .write_buffer(&self.uniforms, 0, bytemuck::bytes_of(&uniforms));
        }

        let target = self.image(pass.target())?;
        let sources = pass
            .sources()
            .into_iter()
            .map(|id| self.image(id).map(|image| &image.view))
            .collect::<Result<Vec<_>>>()?;

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(pass.label()),
            });
        {
            let load = match program {
                None => wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                Some(_) => wgpu::LoadOp::Load,
            };
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(pass.label()),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            if let Some(pipeline) = program.and_then(|p| self.pipelines.get(&p)) {
                let mut entries = vec![wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.uniforms.as_entire_binding(),
                }];
                for (offset, view) in sources.iter().enumerate() {
                    entries.push(wgpu::BindGroupEntry {
                        binding: offset as u32 + 1,
                        resource: wgpu::BindingResource::TextureView(view),
                    });
                }
                let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(pass.label()),
                    layout: &pipeline.bind_group_layout,
                    entries: &entries,
                });

                let vertices = Self::vertex_count(pass);
                if vertices > 0 {
                    render_pass.set_pipeline(&pipeline.pipeline);
                    render_pass.set_bind_group(0, &bind_group, &[]);
                    render_pass.draw(0..vertices, 0..1);
                }
            }
        }
        self.queue.submit(Some(encoder.finish()));
        tracing::trace!(pass = pass.label(), target = %target.label, "Executed pass");
        Ok(())
    }
}

fn extent(side: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: side,
        height: side,
        depth_or_array_layers: 1,
    }
}
