use rendkit_core::cubemap::CubeFaceSet;
use rendkit_core::image::Image;
use rendkit_core::render::{
    ChannelFormat, DrawCall, DrawTarget, Primitive, ProgramDesc, ProgramId, RenderError,
    Renderer, TargetId, TextureBinding, TextureId, UniformValue, Uniforms, QUAD_POSITIONS,
    QUAD_UVS,
};
use wgpu::util::DeviceExt;

use crate::context::GpuContext;
use crate::shaders::{self, FragmentProgram, TextureKind};

/// Every texture and target lives on the GPU as four 32-bit float channels.
/// Narrower [`ChannelFormat`]s are trimmed on readback.
const GPU_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;
const TEXEL_BYTES: u32 = 16;

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
}

impl QuadVertex {
    const ATTRIBS: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2];

    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}

pub fn quad_vertices() -> [QuadVertex; 4] {
    std::array::from_fn(|i| QuadVertex {
        position: QUAD_POSITIONS[i],
        uv: QUAD_UVS[i],
    })
}

struct GpuProgram {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    fragment: &'static FragmentProgram,
}

struct GpuTexture {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
    kind: TextureKind,
}

struct GpuTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
    format: ChannelFormat,
}

/// Headless wgpu implementation of [`Renderer`].
///
/// The display is an offscreen RGBA target of the requested size; read it
/// with [`WgpuRenderer::read_display`].
pub struct WgpuRenderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    quad_buffer: wgpu::Buffer,
    sampler: wgpu::Sampler,
    programs: Vec<GpuProgram>,
    targets: Vec<GpuTarget>,
    textures: Vec<GpuTexture>,
    display: GpuTarget,
}

impl WgpuRenderer {
    pub fn new(context: GpuContext, display_size: (u32, u32)) -> Result<Self, RenderError> {
        let GpuContext { device, queue, .. } = context;

        let quad_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Quad Vertex Buffer"),
            contents: bytemuck::cast_slice(&quad_vertices()),
            usage: wgpu::BufferUsages::VERTEX,
        });

        // Float32 textures are not filterable without an optional feature.
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Nearest Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let (width, height) = display_size;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let display = create_target(&device, "Display", width, height, ChannelFormat::Rgba32F);
        if let Some(e) = pollster::block_on(device.pop_error_scope()) {
            return Err(RenderError::AllocationFailed(format!(
                "display {}x{}: {}",
                width, height, e
            )));
        }
        tracing::info!("Headless display: {}x{}", width, height);

        Ok(Self {
            device,
            queue,
            quad_buffer,
            sampler,
            programs: Vec::new(),
            targets: Vec::new(),
            textures: Vec::new(),
            display,
        })
    }

    /// Read back the display as an RGBA image.
    pub fn read_display(&mut self) -> Result<Image, RenderError> {
        read_target(&self.device, &self.queue, &self.display)
    }

    fn target(&self, id: TargetId) -> Result<&GpuTarget, RenderError> {
        self.targets
            .get(id.0)
            .ok_or_else(|| RenderError::UnknownHandle(format!("{:?}", id)))
    }

    fn texture(&self, id: TextureId) -> Result<&GpuTexture, RenderError> {
        self.textures
            .get(id.0)
            .ok_or_else(|| RenderError::UnknownHandle(format!("{:?}", id)))
    }

    fn input_view(&self, binding: TextureBinding) -> Result<(&wgpu::TextureView, TextureKind), RenderError> {
        match binding {
            TextureBinding::Texture(id) | TextureBinding::Cubemap(id) => {
                let texture = self.texture(id)?;
                Ok((&texture.view, texture.kind))
            }
            TextureBinding::Target(id) => Ok((&self.target(id)?.view, TextureKind::D2)),
        }
    }

    fn upload(
        &mut self,
        label: &str,
        width: u32,
        height: u32,
        layers: &[&Image],
        kind: TextureKind,
    ) -> Result<TextureId, RenderError> {
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: layers.len() as u32,
        };

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: GPU_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        for (layer, image) in layers.iter().enumerate() {
            let rgba = expand_to_rgba(image);
            self.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d {
                        x: 0,
                        y: 0,
                        z: layer as u32,
                    },
                    aspect: wgpu::TextureAspect::All,
                },
                bytemuck::cast_slice(&rgba),
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(width * TEXEL_BYTES),
                    rows_per_image: Some(height),
                },
                wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
            );
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(label),
            dimension: Some(kind.view_dimension()),
            ..Default::default()
        });

        if let Some(e) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(RenderError::UploadFailed(format!("{}: {}", label, e)));
        }

        self.textures.push(GpuTexture {
            _texture: texture,
            view,
            kind,
        });
        Ok(TextureId(self.textures.len() - 1))
    }
}

impl Renderer for WgpuRenderer {
    fn compile(&mut self, desc: &ProgramDesc) -> Result<ProgramId, RenderError> {
        let vertex = shaders::vertex(desc.vertex).ok_or_else(|| {
            RenderError::CompileFailed(format!("unknown vertex shader {}", desc.vertex))
        })?;
        let fragment = shaders::fragment(desc.fragment).ok_or_else(|| {
            RenderError::CompileFailed(format!("unknown fragment shader {}", desc.fragment))
        })?;

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let program = create_program(&self.device, vertex, fragment);
        if let Some(e) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(RenderError::CompileFailed(format!("{}: {}", desc.fragment, e)));
        }

        tracing::debug!("Compiled program: {} + {}", desc.vertex, desc.fragment);
        self.programs.push(program);
        Ok(ProgramId(self.programs.len() - 1))
    }

    fn allocate_target(
        &mut self,
        width: u32,
        height: u32,
        format: ChannelFormat,
    ) -> Result<TargetId, RenderError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let target = create_target(&self.device, "Offscreen Target", width, height, format);
        if let Some(e) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(RenderError::AllocationFailed(format!(
                "{}x{} {:?}: {}",
                width, height, format, e
            )));
        }
        tracing::debug!("Allocated {}x{} {:?} target", width, height, format);
        self.targets.push(target);
        Ok(TargetId(self.targets.len() - 1))
    }

    fn upload_texture(&mut self, image: &Image) -> Result<TextureId, RenderError> {
        if !(1..=4).contains(&image.channels()) {
            return Err(RenderError::UploadFailed(format!(
                "cannot upload {} channels",
                image.channels()
            )));
        }
        self.upload(
            "Texture",
            image.width() as u32,
            image.height() as u32,
            &[image],
            TextureKind::D2,
        )
    }

    fn upload_cubemap(&mut self, faces: &CubeFaceSet) -> Result<TextureId, RenderError> {
        let shape = faces.face_shape();
        if shape.width != shape.height {
            return Err(RenderError::UploadFailed(format!(
                "cube faces must be square, got {}",
                shape
            )));
        }
        if !(1..=4).contains(&shape.channels) {
            return Err(RenderError::UploadFailed(format!(
                "cannot upload {} channels",
                shape.channels
            )));
        }
        let layers: Vec<&Image> = faces.iter().map(|(_, image)| image).collect();
        self.upload(
            "Cubemap",
            shape.width as u32,
            shape.height as u32,
            &layers,
            TextureKind::Cube,
        )
    }

    fn draw(&mut self, call: &DrawCall) -> Result<(), RenderError> {
        if call.primitive != Primitive::TriangleStrip || call.depth_test {
            return Err(RenderError::DrawFailed(
                "only depth-less triangle strips are supported".to_string(),
            ));
        }

        let program = self
            .programs
            .get(call.program.0)
            .ok_or_else(|| RenderError::UnknownHandle(format!("{:?}", call.program)))?;

        let target = match call.target {
            DrawTarget::Offscreen(id) => self.target(id)?,
            DrawTarget::Display => &self.display,
        };
        let (vw, vh) = call.viewport;
        if vw == 0 || vh == 0 || vw > target.width || vh > target.height {
            return Err(RenderError::DrawFailed(format!(
                "viewport {}x{} does not fit a {}x{} target",
                vw, vh, target.width, target.height
            )));
        }

        let binding = match call.uniforms.get(program.fragment.texture_uniform) {
            Some(UniformValue::Texture(binding)) => *binding,
            _ => {
                return Err(RenderError::DrawFailed(format!(
                    "{} requires a texture bound to {}",
                    program.fragment.id, program.fragment.texture_uniform
                )))
            }
        };
        let (input_view, kind) = self.input_view(binding)?;
        if kind != program.fragment.texture {
            return Err(RenderError::DrawFailed(format!(
                "{} expects a {:?} texture, got {:?}",
                program.fragment.id, program.fragment.texture, kind
            )));
        }

        let params = pack_params(program.fragment.params, &call.uniforms)?;

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let params_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Params Uniform Buffer"),
                contents: bytemuck::cast_slice(&params),
                usage: wgpu::BufferUsages::UNIFORM,
            });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Draw Bind Group"),
            layout: &program.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(input_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Draw Encoder"),
            });
        {
            let load = if call.clear {
                wgpu::LoadOp::Clear(wgpu::Color::BLACK)
            } else {
                wgpu::LoadOp::Load
            };
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Full-screen Pass"),
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
            pass.set_viewport(0.0, 0.0, vw as f32, vh as f32, 0.0, 1.0);
            pass.set_pipeline(&program.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.set_vertex_buffer(0, self.quad_buffer.slice(..));
            pass.draw(0..call.vertex_count, 0..1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));

        if let Some(e) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(RenderError::DrawFailed(format!("{}: {}", program.fragment.id, e)));
        }
        Ok(())
    }

    fn read_pixels(&mut self, target: TargetId) -> Result<Image, RenderError> {
        let target = self.target(target)?;
        read_target(&self.device, &self.queue, target)
    }

    fn display_size(&self) -> (u32, u32) {
        (self.display.width, self.display.height)
    }
}

// ---------------------------------------------------------------------------
// Resource creation
// ---------------------------------------------------------------------------

fn create_target(
    device: &wgpu::Device,
    label: &str,
    width: u32,
    height: u32,
    format: ChannelFormat,
) -> GpuTarget {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: GPU_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    GpuTarget {
        texture,
        view,
        width,
        height,
        format,
    }
}

fn create_program(
    device: &wgpu::Device,
    vertex: &str,
    fragment: &'static FragmentProgram,
) -> GpuProgram {
    let shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(fragment.id),
        source: wgpu::ShaderSource::Wgsl(shaders::module_source(vertex, fragment).into()),
    });

    let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Program Bind Group Layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    view_dimension: fragment.texture.view_dimension(),
                    multisampled: false,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
                count: None,
            },
        ],
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Program Pipeline Layout"),
        bind_group_layouts: &[&bind_group_layout],
        push_constant_ranges: &[],
    });

    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(fragment.id),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &shader_module,
            entry_point: Some("vs_main"),
            buffers: &[QuadVertex::desc()],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader_module,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: GPU_FORMAT,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleStrip,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    });

    GpuProgram {
        pipeline,
        bind_group_layout,
        fragment,
    }
}

// ---------------------------------------------------------------------------
// Readback
// ---------------------------------------------------------------------------

fn read_target(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    target: &GpuTarget,
) -> Result<Image, RenderError> {
    let (width, height) = (target.width, target.height);
    let padded = padded_bytes_per_row(width);

    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Readback Buffer"),
        size: (padded * height) as wgpu::BufferAddress,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Readback Encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture: &target.texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &staging,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    queue.submit(std::iter::once(encoder.finish()));

    let slice = staging.slice(..);
    let (sender, receiver) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    device.poll(wgpu::Maintain::Wait);
    receiver
        .recv()
        .map_err(|e| RenderError::ReadbackFailed(e.to_string()))?
        .map_err(|e| RenderError::ReadbackFailed(e.to_string()))?;

    let channels = target.format.channels();
    let pixels = {
        let data = slice.get_mapped_range();
        unpad_rows(&data, width, height, padded, channels)
    };
    staging.unmap();

    Image::from_vec(height as usize, width as usize, channels, pixels)
        .map_err(|e| RenderError::ReadbackFailed(e.to_string()))
}

pub fn padded_bytes_per_row(width: u32) -> u32 {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    let unpadded = width * TEXEL_BYTES;
    unpadded.div_ceil(align) * align
}

/// Strip row padding from RGBA float data, keeping the first `channels`
/// channels of every texel.
pub fn unpad_rows(data: &[u8], width: u32, height: u32, padded: u32, channels: usize) -> Vec<f32> {
    let row_bytes = (width * TEXEL_BYTES) as usize;
    let mut out = Vec::with_capacity(width as usize * height as usize * channels);
    for row in 0..height as usize {
        let start = row * padded as usize;
        for texel in data[start..start + row_bytes].chunks_exact(TEXEL_BYTES as usize) {
            for value in texel.chunks_exact(4).take(channels) {
                out.push(bytemuck::pod_read_unaligned::<f32>(value));
            }
        }
    }
    out
}

/// Widen an image to RGBA. Missing color channels are zero and a missing
/// alpha is one; a single channel is replicated to gray.
pub fn expand_to_rgba(image: &Image) -> Vec<f32> {
    let mut out = Vec::with_capacity(image.height() * image.width() * 4);
    for pixel in image.pixels() {
        let texel = match *pixel {
            [v] => [v, v, v, 1.0],
            [r, g] => [r, g, 0.0, 1.0],
            [r, g, b] => [r, g, b, 1.0],
            [r, g, b, a, ..] => [r, g, b, a],
            [] => [0.0, 0.0, 0.0, 1.0],
        };
        out.extend_from_slice(&texel);
    }
    out
}

/// Pack the named uniforms into one vec4 slot each, in `names` order.
pub fn pack_params(names: &[&str], uniforms: &Uniforms) -> Result<Vec<[f32; 4]>, RenderError> {
    let mut slots = Vec::with_capacity(names.len().max(1));
    for name in names {
        let slot = match uniforms.get(name) {
            Some(UniformValue::Int(v)) => [*v as f32, 0.0, 0.0, 0.0],
            Some(UniformValue::Float(v)) => [*v, 0.0, 0.0, 0.0],
            Some(UniformValue::Vec2([x, y])) => [*x, *y, 0.0, 0.0],
            Some(UniformValue::Vec4(v)) => *v,
            Some(UniformValue::Texture(_)) => {
                return Err(RenderError::DrawFailed(format!(
                    "{} is a texture, expected a value",
                    name
                )))
            }
            None => return Err(RenderError::DrawFailed(format!("missing uniform {}", name))),
        };
        slots.push(slot);
    }
    if slots.is_empty() {
        slots.push([0.0; 4]);
    }
    Ok(slots)
}
