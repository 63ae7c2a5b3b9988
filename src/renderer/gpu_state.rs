/// wgpu backend
///
/// One textured-quad pipeline with alpha blending and no depth buffer, so
/// draw order is paint order. Each queued draw gets its own slot in a
/// dynamic-offset uniform buffer holding its view-projection matrix and
/// world offset.

use std::collections::HashMap;
use std::num::NonZeroU64;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use glam::{Mat4, Vec3};
use wgpu::util::DeviceExt;

use super::error::{asset_decode_error, gpu_operation_error, validate_mesh, RendererErrorContext};
use super::vertex::{DrawUniform, Vertex};
use super::{resolve_texture_path, AssetLoader, ModelHandle, Renderer, TextureHandle};
use crate::camera::Camera;
use crate::error::{initialization_error, EngineError, EngineResult};

/// Draws past this many in one frame are dropped
const MAX_DRAWS: usize = 1024;

const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.5,
    g: 0.8,
    b: 1.0,
    a: 1.0,
};

struct GpuTexture {
    _texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
}

struct GpuModel {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    texture: Option<TextureHandle>,
}

struct QueuedDraw {
    model: ModelHandle,
    uniform: DrawUniform,
}

pub struct GpuState {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    pipeline: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    uniform_stride: u64,
    texture_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    textures: HashMap<TextureHandle, GpuTexture>,
    models: HashMap<ModelHandle, GpuModel>,
    default_texture: Option<TextureHandle>,
    next_id: u32,
    draws: Vec<QueuedDraw>,
    dropped_draws: u64,
    textures_dir: PathBuf,
    frames_rendered: u64,
}

impl GpuState {
    pub fn new(window: Arc<winit::window::Window>, textures_dir: PathBuf, vsync: bool) -> EngineResult<Self> {
        pollster::block_on(Self::new_async(window, textures_dir, vsync))
    }

    async fn new_async(window: Arc<winit::window::Window>, textures_dir: PathBuf, vsync: bool) -> EngineResult<Self> {
        log::info!("[GpuState::new] Starting GPU initialization");
        let size = window.inner_size();

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .map_err(|e| initialization_error("surface", e))?;

        let adapter = match instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
        {
            Some(adapter) => adapter,
            None => {
                log::warn!("[GpuState::new] No high-performance adapter found, trying fallback");
                instance
                    .request_adapter(&wgpu::RequestAdapterOptions {
                        power_preference: wgpu::PowerPreference::LowPower,
                        compatible_surface: Some(&surface),
                        force_fallback_adapter: true,
                    })
                    .await
                    .ok_or_else(|| initialization_error("adapter", "no compatible GPU adapter"))?
            }
        };
        let info = adapter.get_info();
        log::info!("[GpuState::new] Adapter: {} ({:?}, {:?})", info.name, info.device_type, info.backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Skyrunner Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_webgl2_defaults().using_resolution(adapter.limits()),
                },
                None,
            )
            .await
            .map_err(|e| initialization_error("device", e))?;

        device.on_uncaptured_error(Box::new(|error| {
            log::error!("[GPU] Uncaptured device error: {:?}", error);
        }));

        let surface_caps = surface.get_capabilities(&adapter);
        let Some(&first_format) = surface_caps.formats.first() else {
            return Err(initialization_error("surface", "no supported surface formats"));
        };
        let format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .unwrap_or(first_format);
        let present_mode = if vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        };
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        log::info!(
            "[GpuState::new] Surface {}x{} {:?} {:?}",
            config.width,
            config.height,
            format,
            present_mode
        );

        let uniform_size = std::mem::size_of::<DrawUniform>() as u64;
        let alignment = u64::from(device.limits().min_uniform_buffer_offset_alignment).max(1);
        let uniform_stride = uniform_size.div_ceil(alignment) * alignment;

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Draw Uniform Buffer"),
            size: uniform_stride * MAX_DRAWS as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("draw_uniform_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: NonZeroU64::new(uniform_size),
                },
                count: None,
            }],
        });

        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("draw_uniform_bind_group"),
            layout: &uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &uniform_buffer,
                    offset: 0,
                    size: NonZeroU64::new(uniform_size),
                }),
            }],
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("texture_bind_group_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Sprite Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Quad Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/quad.wgsl").into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Quad Pipeline Layout"),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Quad Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[Vertex::desc()],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
        });

        log::info!("[GpuState::new] Pipeline ready");

        Ok(Self {
            surface,
            device,
            queue,
            config,
            pipeline,
            uniform_buffer,
            uniform_bind_group,
            uniform_stride,
            texture_layout,
            sampler,
            textures: HashMap::new(),
            models: HashMap::new(),
            default_texture: None,
            next_id: 1,
            draws: Vec::with_capacity(MAX_DRAWS),
            dropped_draws: 0,
            textures_dir,
            frames_rendered: 0,
        })
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn upload_rgba(&mut self, label: &str, width: u32, height: u32, pixels: &[u8]) -> TextureHandle {
        let extent = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            pixels,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            extent,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &self.texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        let handle = TextureHandle(self.next_id());
        self.textures.insert(
            handle,
            GpuTexture {
                _texture: texture,
                bind_group,
            },
        );
        handle
    }

    /// Encode and submit all queued draws
    fn submit_draws(&mut self, draws: &[QueuedDraw]) -> EngineResult<()> {
        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(e @ (wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated)) => {
                self.surface.configure(&self.device, &self.config);
                return Err(gpu_operation_error("acquire frame", e));
            }
            Err(e) => return Err(gpu_operation_error("acquire frame", e)),
        };
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());

        if !draws.is_empty() {
            let stride = self.uniform_stride as usize;
            let mut bytes = vec![0u8; stride * draws.len()];
            for (i, draw) in draws.iter().enumerate() {
                let src = bytemuck::bytes_of(&draw.uniform);
                bytes[i * stride..i * stride + src.len()].copy_from_slice(src);
            }
            self.queue.write_buffer(&self.uniform_buffer, 0, &bytes);
        }

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Frame Encoder"),
        });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Frame Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            render_pass.set_pipeline(&self.pipeline);

            for (i, draw) in draws.iter().enumerate() {
                let Some(model) = self.models.get(&draw.model) else {
                    continue;
                };
                let texture = model
                    .texture
                    .or(self.default_texture)
                    .and_then(|handle| self.textures.get(&handle));
                let Some(texture) = texture else {
                    continue;
                };

                let offset = (i as u64 * self.uniform_stride) as u32;
                render_pass.set_bind_group(0, &self.uniform_bind_group, &[offset]);
                render_pass.set_bind_group(1, &texture.bind_group, &[]);
                render_pass.set_vertex_buffer(0, model.vertex_buffer.slice(..));
                render_pass.set_index_buffer(model.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                render_pass.draw_indexed(0..model.index_count, 0, 0..1);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}

impl Renderer for GpuState {
    fn init(&mut self) -> EngineResult<()> {
        if self.default_texture.is_none() {
            self.create_default_texture();
        }
        Ok(())
    }

    fn begin_frame(&mut self) {
        self.draws.clear();
    }

    fn render(&mut self, model: ModelHandle, position: Vec3, camera: Option<&Camera>) {
        if self.draws.len() >= MAX_DRAWS {
            self.dropped_draws += 1;
            if self.dropped_draws.is_power_of_two() {
                log::warn!("[GpuState::render] Draw limit {} reached, {} draws dropped", MAX_DRAWS, self.dropped_draws);
            }
            return;
        }

        let view_proj = camera.map(Camera::view_projection).unwrap_or(Mat4::IDENTITY);
        self.draws.push(QueuedDraw {
            model,
            uniform: DrawUniform {
                view_proj: view_proj.to_cols_array_2d(),
                offset: position.extend(0.0).to_array(),
            },
        });
    }

    fn end_frame(&mut self) -> EngineResult<()> {
        let draws = std::mem::take(&mut self.draws);
        let result = self.submit_draws(&draws);
        self.draws = draws;
        self.draws.clear();

        self.frames_rendered += 1;
        if self.frames_rendered == 1 {
            log::info!("[GpuState::end_frame] First frame presented");
        }
        result
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }

        let max = self.device.limits().max_texture_dimension_2d;
        if width > max || height > max {
            log::warn!(
                "[GpuState::resize] {}x{} exceeds GPU texture limit {}, clamping",
                width,
                height,
                max
            );
        }
        self.config.width = width.min(max);
        self.config.height = height.min(max);
        self.surface.configure(&self.device, &self.config);
    }

    fn cleanup(&mut self) {
        self.draws.clear();
        let _ = self.device.poll(wgpu::Maintain::Wait);
        log::info!("[GpuState::cleanup] Renderer stopped after {} frames", self.frames_rendered);
    }
}

impl AssetLoader for GpuState {
    fn load_texture(&mut self, path: &Path) -> EngineResult<TextureHandle> {
        let resolved = resolve_texture_path(path, &self.textures_dir)?;
        let image = image::open(&resolved)
            .map_err(|e| asset_decode_error(&resolved, e))?
            .to_rgba8();
        let (width, height) = image.dimensions();
        let label = resolved.display().to_string();
        Ok(self.upload_rgba(&label, width, height, image.as_raw()))
    }

    fn create_default_texture(&mut self) -> TextureHandle {
        if let Some(texture) = self.default_texture {
            return texture;
        }
        let texture = self.upload_rgba("Default Texture", 1, 1, &[255, 255, 255, 255]);
        self.default_texture = Some(texture);
        texture
    }

    fn load_model(&mut self, vertices: &[f32], uvs: &[f32], indices: &[u32]) -> EngineResult<ModelHandle> {
        validate_mesh(vertices, uvs, indices)?;
        if indices.is_empty() {
            return Err(gpu_operation_error("load_model", "empty index buffer"));
        }

        let interleaved = Vertex::interleave(vertices, uvs);
        let vertex_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Model Vertex Buffer"),
            contents: bytemuck::cast_slice(&interleaved),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Model Index Buffer"),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        let index_count = u32::try_from(indices.len()).renderer_context("load_model")?;

        let handle = ModelHandle(self.next_id());
        self.models.insert(
            handle,
            GpuModel {
                vertex_buffer,
                index_buffer,
                index_count,
                texture: None,
            },
        );
        Ok(handle)
    }

    fn set_model_texture(&mut self, model: ModelHandle, texture: TextureHandle) -> EngineResult<()> {
        if !self.textures.contains_key(&texture) {
            return Err(gpu_operation_error("set_model_texture", format!("unknown texture {}", texture.0)));
        }
        let gpu_model = self
            .models
            .get_mut(&model)
            .ok_or(EngineError::UnknownModel { id: model.0 })?;
        gpu_model.texture = Some(texture);
        Ok(())
    }

    fn release_model(&mut self, model: ModelHandle) {
        if let Some(gpu_model) = self.models.remove(&model) {
            gpu_model.vertex_buffer.destroy();
            gpu_model.index_buffer.destroy();
        }
    }

    fn cleanup(&mut self) {
        let models = self.models.len();
        for (_, gpu_model) in self.models.drain() {
            gpu_model.vertex_buffer.destroy();
            gpu_model.index_buffer.destroy();
        }
        let textures = self.textures.len();
        self.textures.clear();
        self.default_texture = None;
        log::info!("[GpuState::cleanup] Released {} models and {} textures", models, textures);
    }
}
