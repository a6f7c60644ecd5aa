use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use log::{debug, error, info, warn};
use naga::front::wgsl;
use naga::valid::{Capabilities, ValidationFlags, Validator};
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::error::SetupError;
use crate::render::frame::Frame;
use crate::render::texture::{TextureBackend, TextureId, TextureManager};
use crate::runtime::dispatch::Presenter;
use crate::scene::layout::Rect;

pub const SPRITE_SHADER: &str = include_str!("sprite.wgsl");

const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

pub struct GpuTexture {
    texture: wgpu::Texture,
    _view: wgpu::TextureView,
    bind_group: wgpu::BindGroup,
}

/// wgpu-backed storage for the texture manager. Each texture carries the
/// bind group the sprite pipeline samples it through.
pub struct WgpuTextures {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
}

impl WgpuTextures {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        let layout = create_texture_bind_group_layout(&device);
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("facecast-sprite-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Self {
            device,
            queue,
            layout,
            sampler,
        }
    }

    pub fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.layout
    }
}

impl TextureBackend for WgpuTextures {
    type Texture = Arc<GpuTexture>;

    fn allocate(
        &self,
        label: &str,
        width: u32,
        height: u32,
        pixels: Option<&[u8]>,
    ) -> Self::Texture {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TEXTURE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        if let Some(pixels) = pixels {
            write_texture(&self.queue, &texture, width, height, pixels);
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group =
            self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("facecast-sprite-texture-bind-group"),
                layout: &self.layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::Sampler(&self.sampler),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&view),
                    },
                ],
            });

        Arc::new(GpuTexture {
            texture,
            _view: view,
            bind_group,
        })
    }

    fn write(
        &self,
        texture: &Self::Texture,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) {
        write_texture(&self.queue, &texture.texture, width, height, pixels);
    }

    fn free(&self, texture: Self::Texture) {
        texture.texture.destroy();
    }
}

fn write_texture(
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    width: u32,
    height: u32,
    pixels: &[u8],
) {
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        pixels,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * width),
            rows_per_image: Some(height),
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct SpriteUniforms {
    transform: [[f32; 4]; 4],
    color: [f32; 4],
}

/// Per-drawable uniform block. A sprite is drawn at most once per frame.
pub struct Sprite {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

struct SpriteRenderer {
    pipeline: wgpu::RenderPipeline,
    uniform_layout: wgpu::BindGroupLayout,
}

impl SpriteRenderer {
    fn new(
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
        texture_layout: &wgpu::BindGroupLayout,
    ) -> Result<Self, String> {
        validate_shader(SPRITE_SHADER)
            .map_err(|err| format!("sprite shader is invalid: {}", err))?;

        let uniform_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("facecast-sprite-uniform-layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX
                        | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(
                            std::mem::size_of::<SpriteUniforms>() as u64,
                        ),
                    },
                    count: None,
                }],
            });

        let pipeline = create_sprite_pipeline(
            device,
            format,
            &uniform_layout,
            texture_layout,
        );

        Ok(Self {
            pipeline,
            uniform_layout,
        })
    }
}

fn create_sprite_pipeline(
    device: &wgpu::Device,
    format: wgpu::TextureFormat,
    uniform_layout: &wgpu::BindGroupLayout,
    texture_layout: &wgpu::BindGroupLayout,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("facecast-sprite-shader"),
        source: wgpu::ShaderSource::Wgsl(SPRITE_SHADER.into()),
    });

    let layout =
        device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("facecast-sprite-pipeline-layout"),
            bind_group_layouts: &[uniform_layout, texture_layout],
            push_constant_ranges: &[],
        });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("facecast-sprite-pipeline"),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            buffers: &[],
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleStrip,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            unclipped_depth: false,
            polygon_mode: wgpu::PolygonMode::Fill,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
        cache: None,
    })
}

fn create_texture_bind_group_layout(
    device: &wgpu::Device,
) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("facecast-sprite-texture-layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(
                    wgpu::SamplerBindingType::Filtering,
                ),
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float {
                        filterable: true,
                    },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
        ],
    })
}

/// The GPU context. Lives on the event-loop thread; every graphics call in
/// the process goes through it.
pub struct Gpu {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,
    textures: TextureManager<WgpuTextures>,
    sprites: SpriteRenderer,
    frame: Option<Frame>,
    clear_color: wgpu::Color,
}

impl Gpu {
    pub fn new(window: Arc<Window>) -> Result<Self, SetupError> {
        let instance =
            wgpu::Instance::new(&wgpu::InstanceDescriptor::default());

        let surface = instance.create_surface(window.clone()).map_err(|err| {
            SetupError::new(format!("failed to create surface: {}", err))
        })?;

        let adapter = pollster::block_on(instance.request_adapter(
            &wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: Some(&surface),
            },
        ))
        .map_err(|err| {
            SetupError::new(format!("no usable GPU adapter: {}", err))
        })?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("facecast-device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::default(),
            },
        ))
        .map_err(|err| {
            SetupError::new(format!("failed to open GPU device: {}", err))
        })?;

        let size = window.inner_size();
        let width = size.width.max(1);
        let height = size.height.max(1);

        let caps = surface.get_capabilities(&adapter);
        let format = choose_surface_format(&caps.formats).ok_or_else(|| {
            SetupError::new("surface has no supported formats")
        })?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width,
            height,
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        surface.configure(&device, &surface_config);

        let device = Arc::new(device);
        let queue = Arc::new(queue);

        let backend = WgpuTextures::new(device.clone(), queue.clone());
        let sprites =
            SpriteRenderer::new(&device, format, backend.bind_group_layout())
                .map_err(SetupError::new)?;

        info!(
            "gpu ready: {} ({:?}), surface {}x{} {:?}",
            adapter.get_info().name,
            adapter.get_info().backend,
            width,
            height,
            format
        );

        Ok(Self {
            device,
            queue,
            surface,
            surface_config,
            textures: TextureManager::new(backend),
            sprites,
            frame: None,
            clear_color: wgpu::Color::BLACK,
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn size(&self) -> [u32; 2] {
        [self.surface_config.width, self.surface_config.height]
    }

    pub fn textures(&self) -> &TextureManager<WgpuTextures> {
        &self.textures
    }

    pub fn set_clear_color(&mut self, color: wgpu::Color) {
        self.clear_color = color;
    }

    pub fn create_sprite(&self, label: &str) -> Sprite {
        let uniforms = SpriteUniforms {
            transform: Mat4::IDENTITY.to_cols_array_2d(),
            color: [1.0; 4],
        };

        let buffer =
            self.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(label),
                    contents: bytemuck::bytes_of(&uniforms),
                    usage: wgpu::BufferUsages::UNIFORM
                        | wgpu::BufferUsages::COPY_DST,
                });

        let bind_group =
            self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &self.sprites.uniform_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                }],
            });

        Sprite { buffer, bind_group }
    }

    /// Records one textured quad into the current frame. `transform` maps
    /// the unit quad (-1..1) into clip space of `viewport`.
    pub fn draw_sprite(
        &mut self,
        sprite: &Sprite,
        texture: TextureId,
        viewport: Rect,
        transform: Mat4,
        color: [f32; 4],
    ) {
        let Some(frame) = self.frame.as_mut() else {
            return;
        };
        let Some([x, y, w, h]) = clamp_viewport(viewport, frame.size()) else {
            return;
        };
        let Some(texture) = self.textures.texture(texture) else {
            debug!("skipping sprite with released texture {:?}", texture);
            return;
        };

        let uniforms = SpriteUniforms {
            transform: transform.to_cols_array_2d(),
            color,
        };
        self.queue
            .write_buffer(&sprite.buffer, 0, bytemuck::bytes_of(&uniforms));

        let target_view = frame.surface_view.clone();
        let mut pass =
            frame.encoder().begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("facecast-sprite"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target_view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

        pass.set_pipeline(&self.sprites.pipeline);
        pass.set_viewport(x, y, w, h, 0.0, 1.0);
        pass.set_bind_group(0, &sprite.bind_group, &[]);
        pass.set_bind_group(1, &texture.bind_group, &[]);
        pass.draw(0..4, 0..1);
    }
}

impl Presenter for Gpu {
    fn resize(&mut self, size: [u32; 2]) {
        if size[0] == 0 || size[1] == 0 {
            return;
        }

        self.surface_config.width = size[0];
        self.surface_config.height = size[1];
        self.surface.configure(&self.device, &self.surface_config);
    }

    fn begin_frame(&mut self) -> bool {
        // A frame left over from an aborted traversal is dropped unsubmitted.
        self.frame = None;

        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.surface_config);
                return false;
            }
            Err(wgpu::SurfaceError::Timeout) => {
                warn!("surface timeout while acquiring frame");
                return false;
            }
            Err(err) => {
                error!("failed to acquire surface texture: {}", err);
                return false;
            }
        };

        let mut frame = Frame::new(&self.device, self.queue.clone(), output);
        frame.clear(self.clear_color);
        self.frame = Some(frame);
        true
    }

    fn present(&mut self) {
        if let Some(frame) = self.frame.take() {
            frame.submit();
        }
    }

    fn release_resources(&mut self) {
        self.frame = None;
        self.textures.release_all();
    }
}

fn choose_surface_format(
    formats: &[wgpu::TextureFormat],
) -> Option<wgpu::TextureFormat> {
    formats
        .iter()
        .copied()
        .find(|f| *f == wgpu::TextureFormat::Bgra8UnormSrgb)
        .or_else(|| formats.first().copied())
}

/// Clamps `rect` to the render target. `None` when nothing is visible.
pub fn clamp_viewport(rect: Rect, target: [u32; 2]) -> Option<[f32; 4]> {
    let x0 = rect.x.max(0.0);
    let y0 = rect.y.max(0.0);
    let x1 = (rect.x + rect.width).min(target[0] as f32);
    let y1 = (rect.y + rect.height).min(target[1] as f32);

    if x1 - x0 < 1.0 || y1 - y0 < 1.0 {
        return None;
    }

    Some([x0, y0, x1 - x0, y1 - y0])
}

pub fn validate_shader(source: &str) -> Result<(), String> {
    let module = wgsl::parse_str(source).map_err(|err| err.to_string())?;

    let mut validator =
        Validator::new(ValidationFlags::all(), Capabilities::all());

    validator
        .validate(&module)
        .map_err(|err| err.to_string())
        .map(|_| ())
}
