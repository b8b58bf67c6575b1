//! Headless wgpu-Implementierung des `GpuContext`.
//!
//! Verwaltet Haupt-, Pick- und OIT-Targets, zeichnet das Schnittebenen-Quad,
//! komponiert die OIT-Akkumulation und liest einzelne Pick-Pixel zurück.
//! Layer holen sich Device, Queue, Views und den passenden Pipeline-Zustand
//! über die öffentlichen Zugriffsmethoden.

use super::gpu::{
    BlendMode, ClearRequest, CullFace, GpuContext, RasterState, RenderTarget, StencilCompare,
    StencilOp,
};
use crate::error::ViewerError;
use crate::shared::options::SECTION_CAP_COLOR;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};
use std::collections::HashMap;
use std::sync::{mpsc, Arc};

/// Farbformat des Haupt-Targets.
pub const MAIN_COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
/// Depth/Stencil-Format von Haupt- und OIT-Target.
pub const DEPTH_STENCIL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24PlusStencil8;
/// Pick-ID-Format (4 Bytes little-endian).
pub const PICK_ID_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Uint;
/// Bevorzugtes Format der Pick-Normalen.
pub const PICK_NORMAL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;
/// Ersatz für Adapter, die `Rgba32Float` nicht als Render-Target erlauben.
pub const PICK_NORMAL_FALLBACK_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
/// Depth-Format des Pick-Targets (kopierbar für den Read-back).
pub const PICK_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
/// Farb-Akkumulation für OIT.
pub const OIT_ACCUM_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
/// Alpha-Akkumulation für OIT.
pub const OIT_ALPHA_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R16Float;

/// Uniforms des Schnittebenen-Quads.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct QuadUniforms {
    view_proj: [[f32; 4]; 4],
    color: [f32; 4],
}

/// Vertex des Schnittebenen-Quads.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct QuadVertex {
    /// Position in Weltkoordinaten
    pub position: [f32; 3],
}

impl QuadVertex {
    /// Beschreibt das Vertex-Layout für wgpu.
    pub const fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x3,
            }],
        }
    }
}

struct Target {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl Target {
    fn new(
        device: &wgpu::Device,
        label: &str,
        format: wgpu::TextureFormat,
        width: u32,
        height: u32,
        usage: wgpu::TextureUsages,
    ) -> Self {
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
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view }
    }
}

/// Wählt das erste Normalen-Format, das `renderable` akzeptiert.
pub fn select_pick_normal_format(
    renderable: impl Fn(wgpu::TextureFormat) -> bool,
) -> Option<wgpu::TextureFormat> {
    [PICK_NORMAL_FORMAT, PICK_NORMAL_FALLBACK_FORMAT]
        .into_iter()
        .find(|format| renderable(*format))
}

/// Dekodiert eine ausgelesene Normale im Format `format`.
pub fn decode_pick_normal(format: wgpu::TextureFormat, bytes: &[u8]) -> Option<Vec3> {
    match format {
        wgpu::TextureFormat::Rgba32Float => {
            let normal: [f32; 4] = bytemuck::pod_read_unaligned(bytes.get(..16)?);
            Some(Vec3::new(normal[0], normal[1], normal[2]))
        }
        wgpu::TextureFormat::Rgba16Float => {
            let halves: [u16; 4] = bytemuck::pod_read_unaligned(bytes.get(..8)?);
            let [x, y, z, _] = halves.map(|bits| half::f16::from_bits(bits).to_f32());
            Some(Vec3::new(x, y, z))
        }
        _ => None,
    }
}

fn bytes_per_normal(format: wgpu::TextureFormat) -> usize {
    match format {
        wgpu::TextureFormat::Rgba16Float => 8,
        _ => 16,
    }
}

fn is_renderable(adapter: &wgpu::Adapter, format: wgpu::TextureFormat) -> bool {
    adapter
        .get_texture_format_features(format)
        .allowed_usages
        .contains(wgpu::TextureUsages::RENDER_ATTACHMENT)
}

/// Alle Offscreen-Targets in Viewport-Größe.
struct Targets {
    main_color: Target,
    main_depth: Target,
    pick_id: Target,
    pick_normal: Target,
    pick_depth: Target,
    oit_accum: Target,
    oit_alpha: Target,
    oit_depth: Target,
}

impl Targets {
    fn new(
        device: &wgpu::Device,
        width: u32,
        height: u32,
        normal_format: wgpu::TextureFormat,
    ) -> Self {
        use wgpu::TextureUsages as U;
        Self {
            main_color: Target::new(device, "Main Color", MAIN_COLOR_FORMAT, width, height, U::COPY_SRC),
            main_depth: Target::new(device, "Main Depth", DEPTH_STENCIL_FORMAT, width, height, U::empty()),
            pick_id: Target::new(device, "Pick Id", PICK_ID_FORMAT, width, height, U::COPY_SRC),
            pick_normal: Target::new(device, "Pick Normal", normal_format, width, height, U::COPY_SRC),
            pick_depth: Target::new(device, "Pick Depth", PICK_DEPTH_FORMAT, width, height, U::COPY_SRC),
            oit_accum: Target::new(device, "OIT Accum", OIT_ACCUM_FORMAT, width, height, U::TEXTURE_BINDING),
            oit_alpha: Target::new(device, "OIT Alpha", OIT_ALPHA_FORMAT, width, height, U::TEXTURE_BINDING),
            oit_depth: Target::new(device, "OIT Depth", DEPTH_STENCIL_FORMAT, width, height, U::empty()),
        }
    }
}

/// wgpu-Kontext ohne Surface (Offscreen-Rendering).
pub struct WgpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    width: u32,
    height: u32,
    pick_normal_format: wgpu::TextureFormat,
    bound: RenderTarget,
    state: RasterState,
    clip_plane: Vec4,
    clip_plane_buffer: wgpu::Buffer,
    cap_color: [f32; 4],
    targets: Targets,
    quad_shader: wgpu::ShaderModule,
    quad_layout: wgpu::PipelineLayout,
    quad_uniforms: wgpu::Buffer,
    quad_vertices: wgpu::Buffer,
    quad_bind_group: wgpu::BindGroup,
    quad_pipelines: HashMap<RasterState, wgpu::RenderPipeline>,
    composite_pipeline: wgpu::RenderPipeline,
    composite_bind_group_layout: wgpu::BindGroupLayout,
    composite_bind_group: wgpu::BindGroup,
    readback: wgpu::Buffer,
}

impl WgpuContext {
    /// Erstellt einen Kontext auf dem ersten verfügbaren Adapter.
    ///
    /// Ohne Adapter oder Device gibt es `ViewerError::GpuUnavailable`,
    /// ebenso wenn der Adapter die Pick- oder OIT-Targets nicht rendern kann.
    pub fn new_headless(width: u32, height: u32) -> Result<Self, ViewerError> {
        pollster::block_on(Self::request(width, height))
    }

    async fn request(width: u32, height: u32) -> Result<Self, ViewerError> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| ViewerError::GpuUnavailable(e.to_string()))?;
        log::info!("GPU-Adapter: {}", adapter.get_info().name);

        let downlevel = adapter.get_downlevel_capabilities();
        if !downlevel
            .flags
            .contains(wgpu::DownlevelFlags::DEPTH_TEXTURE_AND_BUFFER_COPIES)
        {
            return Err(ViewerError::GpuUnavailable(
                "Adapter kann Depth-Texturen nicht kopieren".into(),
            ));
        }
        for format in [OIT_ACCUM_FORMAT, OIT_ALPHA_FORMAT] {
            if !is_renderable(&adapter, format) {
                return Err(ViewerError::GpuUnavailable(format!(
                    "{format:?} ist kein Render-Target"
                )));
            }
        }
        let normal_format = select_pick_normal_format(|format| is_renderable(&adapter, format))
            .ok_or_else(|| {
                ViewerError::GpuUnavailable("kein renderbares Normalen-Format".into())
            })?;
        if normal_format != PICK_NORMAL_FORMAT {
            log::warn!("Pick-Normalen mit reduzierter Genauigkeit: {:?}", normal_format);
        }

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Viewer Device"),
                ..Default::default()
            })
            .await
            .map_err(|e| ViewerError::GpuUnavailable(e.to_string()))?;
        device.on_uncaptured_error(Arc::new(|error: wgpu::Error| {
            log::error!("wgpu-Fehler: {}", error);
        }));

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let context = Self::from_device(device, queue, width, height, normal_format);
        if let Some(error) = context.device.pop_error_scope().await {
            return Err(ViewerError::GpuUnavailable(error.to_string()));
        }
        Ok(context)
    }

    /// Erstellt einen Kontext auf einem vorhandenen Device.
    ///
    /// `pick_normal_format` muss als Render-Target erlaubt sein, siehe
    /// [`select_pick_normal_format`].
    pub fn from_device(
        device: wgpu::Device,
        queue: wgpu::Queue,
        width: u32,
        height: u32,
        pick_normal_format: wgpu::TextureFormat,
    ) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let targets = Targets::new(&device, width, height, pick_normal_format);

        // Schnittebenen-Quad
        let quad_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Section Quad Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("section_quad.wgsl").into()),
        });
        let quad_uniforms = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Section Quad Uniforms"),
            size: std::mem::size_of::<QuadUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let quad_vertices = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Section Quad Vertices"),
            size: (std::mem::size_of::<QuadVertex>() * 4) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let quad_bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Section Quad Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let quad_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Section Quad Bind Group"),
            layout: &quad_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: quad_uniforms.as_entire_binding(),
            }],
        });
        let quad_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Section Quad Pipeline Layout"),
            bind_group_layouts: &[&quad_bind_group_layout],
            push_constant_ranges: &[],
        });

        // OIT-Komposition
        let composite_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("OIT Composite Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("oit_composite.wgsl").into()),
        });
        let texture_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: false },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        let composite_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("OIT Composite Bind Group Layout"),
                entries: &[texture_entry(0), texture_entry(1)],
            });
        let composite_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("OIT Composite Pipeline Layout"),
            bind_group_layouts: &[&composite_bind_group_layout],
            push_constant_ranges: &[],
        });
        let composite_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("OIT Composite Pipeline"),
            layout: Some(&composite_layout),
            vertex: wgpu::VertexState {
                module: &composite_shader,
                entry_point: Some("vs_composite"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &composite_shader,
                entry_point: Some("fs_composite"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: MAIN_COLOR_FORMAT,
                    blend: Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });
        let composite_bind_group =
            Self::create_composite_bind_group(&device, &composite_bind_group_layout, &targets);

        let clip_plane_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Clip Plane"),
            size: std::mem::size_of::<[f32; 4]>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Pick Readback"),
            size: wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            device,
            queue,
            width,
            height,
            pick_normal_format,
            bound: RenderTarget::Main,
            state: RasterState::DEFAULT,
            clip_plane: crate::core::DISABLED_PLANE,
            clip_plane_buffer,
            cap_color: SECTION_CAP_COLOR,
            targets,
            quad_shader,
            quad_layout,
            quad_uniforms,
            quad_vertices,
            quad_bind_group,
            quad_pipelines: HashMap::new(),
            composite_pipeline,
            composite_bind_group_layout,
            composite_bind_group,
            readback,
        }
    }

    fn create_composite_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        targets: &Targets,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("OIT Composite Bind Group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&targets.oit_accum.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&targets.oit_alpha.view),
                },
            ],
        })
    }

    /// Setzt die Farbe der Schnittfläche.
    pub fn set_section_cap_color(&mut self, rgba: [f32; 4]) {
        self.cap_color = rgba;
    }

    /// wgpu-Device.
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// wgpu-Queue.
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Uniform-Buffer mit der aktuellen Clip-Ebene (für Layer-Shader).
    pub fn clip_plane_buffer(&self) -> &wgpu::Buffer {
        &self.clip_plane_buffer
    }

    /// Textur des Haupt-Targets (z.B. für Screenshots).
    pub fn main_color_texture(&self) -> &wgpu::Texture {
        &self.targets.main_color.texture
    }

    /// Farb-Views des gebundenen Targets in Attachment-Reihenfolge.
    pub fn color_views(&self) -> Vec<&wgpu::TextureView> {
        match self.bound {
            RenderTarget::Main => vec![&self.targets.main_color.view],
            RenderTarget::Pick => vec![&self.targets.pick_id.view, &self.targets.pick_normal.view],
            RenderTarget::Oit => vec![&self.targets.oit_accum.view, &self.targets.oit_alpha.view],
        }
    }

    /// Depth-View des gebundenen Targets.
    pub fn depth_view(&self) -> &wgpu::TextureView {
        match self.bound {
            RenderTarget::Main => &self.targets.main_depth.view,
            RenderTarget::Pick => &self.targets.pick_depth.view,
            RenderTarget::Oit => &self.targets.oit_depth.view,
        }
    }

    /// Farbformate eines Targets in Attachment-Reihenfolge.
    pub fn color_formats(&self, target: RenderTarget) -> Vec<wgpu::TextureFormat> {
        match target {
            RenderTarget::Main => vec![MAIN_COLOR_FORMAT],
            RenderTarget::Pick => vec![PICK_ID_FORMAT, self.pick_normal_format],
            RenderTarget::Oit => vec![OIT_ACCUM_FORMAT, OIT_ALPHA_FORMAT],
        }
    }

    /// Tatsächlich gewähltes Format der Pick-Normalen.
    pub fn pick_normal_format(&self) -> wgpu::TextureFormat {
        self.pick_normal_format
    }

    /// Depth-Format eines Targets.
    pub fn depth_format(target: RenderTarget) -> wgpu::TextureFormat {
        match target {
            RenderTarget::Pick => PICK_DEPTH_FORMAT,
            RenderTarget::Main | RenderTarget::Oit => DEPTH_STENCIL_FORMAT,
        }
    }

    /// Depth/Stencil-Zustand einer Pipeline für `state`.
    pub fn depth_stencil_state(
        state: &RasterState,
        format: wgpu::TextureFormat,
    ) -> wgpu::DepthStencilState {
        let stencil = match (state.stencil, format.has_stencil_aspect()) {
            (Some(s), true) => {
                let face = wgpu::StencilFaceState {
                    compare: match s.compare {
                        StencilCompare::Always => wgpu::CompareFunction::Always,
                        StencilCompare::Equal => wgpu::CompareFunction::Equal,
                        StencilCompare::NotEqual => wgpu::CompareFunction::NotEqual,
                    },
                    fail_op: wgpu::StencilOperation::Keep,
                    depth_fail_op: wgpu::StencilOperation::Keep,
                    pass_op: match s.pass_op {
                        StencilOp::Keep => wgpu::StencilOperation::Keep,
                        StencilOp::Replace => wgpu::StencilOperation::Replace,
                        StencilOp::Increment => wgpu::StencilOperation::IncrementClamp,
                        StencilOp::Decrement => wgpu::StencilOperation::DecrementClamp,
                    },
                };
                wgpu::StencilState {
                    front: face,
                    back: face,
                    read_mask: 0xff,
                    write_mask: s.write_mask,
                }
            }
            _ => wgpu::StencilState::default(),
        };

        wgpu::DepthStencilState {
            format,
            depth_write_enabled: state.depth_write,
            depth_compare: if state.depth_test {
                wgpu::CompareFunction::LessEqual
            } else {
                wgpu::CompareFunction::Always
            },
            stencil,
            bias: wgpu::DepthBiasState::default(),
        }
    }

    /// Blend-Zustand für `blend`.
    pub fn blend_state(blend: BlendMode) -> Option<wgpu::BlendState> {
        match blend {
            BlendMode::Off => None,
            BlendMode::Additive => {
                let one = wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::One,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                };
                Some(wgpu::BlendState { color: one, alpha: one })
            }
            BlendMode::PremultipliedAlpha => Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
        }
    }

    /// Cull-Mode für `cull`.
    pub fn cull_mode(cull: Option<CullFace>) -> Option<wgpu::Face> {
        cull.map(|face| match face {
            CullFace::Front => wgpu::Face::Front,
            CullFace::Back => wgpu::Face::Back,
        })
    }

    /// Farb-Schreibmaske für `state`.
    pub fn color_write_mask(state: &RasterState) -> wgpu::ColorWrites {
        if state.color_writes {
            wgpu::ColorWrites::ALL
        } else {
            wgpu::ColorWrites::empty()
        }
    }

    fn quad_pipeline(&mut self, state: RasterState) -> &wgpu::RenderPipeline {
        let device = &self.device;
        let shader = &self.quad_shader;
        let layout = &self.quad_layout;
        self.quad_pipelines.entry(state).or_insert_with(|| {
            log::debug!("Section-Quad-Pipeline für {:?}", state);
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Section Quad Pipeline"),
                layout: Some(layout),
                vertex: wgpu::VertexState {
                    module: shader,
                    entry_point: Some("vs_quad"),
                    buffers: &[QuadVertex::desc()],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: shader,
                    entry_point: Some("fs_quad"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: MAIN_COLOR_FORMAT,
                        blend: Self::blend_state(state.blend),
                        write_mask: Self::color_write_mask(&state),
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleStrip,
                    cull_mode: Self::cull_mode(state.cull),
                    ..Default::default()
                },
                depth_stencil: Some(Self::depth_stencil_state(&state, DEPTH_STENCIL_FORMAT)),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        })
    }

    fn read_pixel(
        &self,
        texture: &wgpu::Texture,
        aspect: wgpu::TextureAspect,
        x: u32,
        y: u32,
        bytes_per_pixel: usize,
    ) -> Result<Vec<u8>, ViewerError> {
        if x >= self.width || y >= self.height {
            return Err(ViewerError::Readback(format!(
                "Pixel ({x}, {y}) außerhalb von {}x{}",
                self.width, self.height
            )));
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Pick Readback"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x, y, z: 0 },
                aspect,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &self.readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT),
                    rows_per_image: Some(1),
                },
            },
            wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(Some(encoder.finish()));

        let slice = self.readback.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| ViewerError::Readback(e.to_string()))?;
        rx.recv()
            .map_err(|e| ViewerError::Readback(e.to_string()))?
            .map_err(|e| ViewerError::Readback(e.to_string()))?;

        let bytes = {
            let data = slice.get_mapped_range();
            data[..bytes_per_pixel].to_vec()
        };
        self.readback.unmap();
        Ok(bytes)
    }
}

impl GpuContext for WgpuContext {
    fn set_viewport(&mut self, width: u32, height: u32) {
        let (width, height) = (width.max(1), height.max(1));
        if (width, height) == (self.width, self.height) {
            return;
        }
        log::info!("Viewport {}x{} → {}x{}", self.width, self.height, width, height);
        self.width = width;
        self.height = height;
        self.targets = Targets::new(&self.device, width, height, self.pick_normal_format);
        self.composite_bind_group = Self::create_composite_bind_group(
            &self.device,
            &self.composite_bind_group_layout,
            &self.targets,
        );
    }

    fn bind_target(&mut self, target: RenderTarget) {
        self.bound = target;
    }

    fn bound_target(&self) -> RenderTarget {
        self.bound
    }

    fn clear(&mut self, request: ClearRequest) {
        let color_load = match request.color {
            Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                r: r as f64,
                g: g as f64,
                b: b as f64,
                a: a as f64,
            }),
            None => wgpu::LoadOp::Load,
        };
        let depth_load = if request.depth {
            wgpu::LoadOp::Clear(1.0)
        } else {
            wgpu::LoadOp::Load
        };
        let stencil_load = if request.stencil {
            wgpu::LoadOp::Clear(0)
        } else {
            wgpu::LoadOp::Load
        };
        let has_stencil = Self::depth_format(self.bound).has_stencil_aspect();

        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = self
            .color_views()
            .into_iter()
            .map(|view| {
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: color_load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })
            })
            .collect();

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Clear"),
            });
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Clear Pass"),
                color_attachments: &color_attachments,
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: self.depth_view(),
                    depth_ops: Some(wgpu::Operations {
                        load: depth_load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: has_stencil.then_some(wgpu::Operations {
                        load: stencil_load,
                        store: wgpu::StoreOp::Store,
                    }),
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }
        self.queue.submit(Some(encoder.finish()));
    }

    fn apply_state(&mut self, state: RasterState) {
        self.state = state;
    }

    fn state(&self) -> RasterState {
        self.state
    }

    fn set_clip_plane(&mut self, plane: Vec4) {
        self.clip_plane = plane;
        self.queue
            .write_buffer(&self.clip_plane_buffer, 0, bytemuck::bytes_of(&plane.to_array()));
    }

    fn clip_plane(&self) -> Vec4 {
        self.clip_plane
    }

    fn draw_section_quad(&mut self, corners: &[Vec3; 4], view_projection: Mat4) {
        if self.bound != RenderTarget::Main {
            log::debug!("Section-Quad nur im Haupt-Target, gebunden: {:?}", self.bound);
            return;
        }

        let uniforms = QuadUniforms {
            view_proj: view_projection.to_cols_array_2d(),
            color: self.cap_color,
        };
        let vertices = corners.map(|c| QuadVertex {
            position: c.to_array(),
        });
        self.queue
            .write_buffer(&self.quad_uniforms, 0, bytemuck::bytes_of(&uniforms));
        self.queue
            .write_buffer(&self.quad_vertices, 0, bytemuck::cast_slice(&vertices));

        let state = self.state;
        let reference = state.stencil.map(|s| s.reference).unwrap_or(0);
        let pipeline = self.quad_pipeline(state).clone();

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Section Quad"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Section Quad Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.targets.main_color.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.targets.main_depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    }),
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&pipeline);
            pass.set_stencil_reference(reference);
            pass.set_bind_group(0, &self.quad_bind_group, &[]);
            pass.set_vertex_buffer(0, self.quad_vertices.slice(..));
            pass.draw(0..4, 0..1);
        }
        self.queue.submit(Some(encoder.finish()));
    }

    fn composite_oit(&mut self) {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("OIT Composite"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("OIT Composite Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.targets.main_color.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.composite_pipeline);
            pass.set_bind_group(0, &self.composite_bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
        self.queue.submit(Some(encoder.finish()));
    }

    fn read_pick_color(&mut self, x: u32, y: u32) -> Result<[u8; 4], ViewerError> {
        let bytes = self.read_pixel(&self.targets.pick_id.texture, wgpu::TextureAspect::All, x, y, 4)?;
        Ok([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    fn read_pick_normal(&mut self, x: u32, y: u32) -> Result<Vec3, ViewerError> {
        let format = self.pick_normal_format;
        let bytes = self.read_pixel(
            &self.targets.pick_normal.texture,
            wgpu::TextureAspect::All,
            x,
            y,
            bytes_per_normal(format),
        )?;
        decode_pick_normal(format, &bytes)
            .ok_or_else(|| ViewerError::Readback(format!("Normalen-Format {format:?}")))
    }

    fn read_pick_depth(&mut self, x: u32, y: u32) -> Result<f32, ViewerError> {
        let bytes = self.read_pixel(
            &self.targets.pick_depth.texture,
            wgpu::TextureAspect::DepthOnly,
            x,
            y,
            4,
        )?;
        Ok(bytemuck::pod_read_unaligned::<f32>(&bytes[..4]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::gpu::StencilState;

    #[test]
    fn stencil_state_maps_ops() {
        let state = RasterState {
            stencil: Some(StencilState::always(StencilOp::Increment)),
            ..RasterState::DEFAULT
        };
        let ds = WgpuContext::depth_stencil_state(&state, DEPTH_STENCIL_FORMAT);
        assert_eq!(ds.stencil.front.pass_op, wgpu::StencilOperation::IncrementClamp);
        assert_eq!(ds.stencil.write_mask, 0xff);
        assert_eq!(ds.depth_compare, wgpu::CompareFunction::LessEqual);
    }

    #[test]
    fn pick_depth_has_no_stencil() {
        let state = RasterState {
            stencil: Some(StencilState::test(StencilCompare::Equal)),
            ..RasterState::DEFAULT
        };
        let ds = WgpuContext::depth_stencil_state(&state, PICK_DEPTH_FORMAT);
        assert_eq!(ds.stencil, wgpu::StencilState::default());
    }

    #[test]
    fn additive_blend_is_one_one() {
        let blend = WgpuContext::blend_state(BlendMode::Additive).expect("Blend gesetzt");
        assert_eq!(blend.color.src_factor, wgpu::BlendFactor::One);
        assert_eq!(blend.color.dst_factor, wgpu::BlendFactor::One);
        assert!(WgpuContext::blend_state(BlendMode::Off).is_none());
    }

    #[test]
    fn normal_format_falls_back_to_half_floats() {
        let chosen = select_pick_normal_format(|f| f != wgpu::TextureFormat::Rgba32Float);
        assert_eq!(chosen, Some(PICK_NORMAL_FALLBACK_FORMAT));
        assert_eq!(select_pick_normal_format(|_| true), Some(PICK_NORMAL_FORMAT));
        assert_eq!(select_pick_normal_format(|_| false), None);
    }

    #[test]
    fn half_float_normal_decodes() {
        let halves = [0.0f32, -1.0, 0.5, 0.0].map(|v| half::f16::from_f32(v).to_bits());
        let bytes: Vec<u8> = bytemuck::cast_slice(&halves).to_vec();
        let normal = decode_pick_normal(wgpu::TextureFormat::Rgba16Float, &bytes)
            .expect("8 Bytes reichen");
        assert_eq!(normal, Vec3::new(0.0, -1.0, 0.5));
        assert!(decode_pick_normal(wgpu::TextureFormat::Rgba32Float, &bytes).is_none());
    }

    #[test]
    fn headless_context_reports_missing_gpu_or_reads_back() {
        // Auf Maschinen ohne Adapter ist der Fehler selbst das erwartete Verhalten
        match WgpuContext::new_headless(4, 4) {
            Ok(mut ctx) => {
                assert_eq!(ctx.color_formats(RenderTarget::Pick)[1], ctx.pick_normal_format());
                ctx.bind_target(RenderTarget::Pick);
                ctx.clear(ClearRequest::all([0.0; 4]));
                assert_eq!(ctx.read_pick_color(1, 1).ok(), Some([0, 0, 0, 0]));
                assert!(ctx.read_pick_color(9, 9).is_err());
            }
            Err(err) => assert!(matches!(err, ViewerError::GpuUnavailable(_))),
        }
    }
}
