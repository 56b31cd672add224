use std::{collections::HashMap, fs, path::Path};

use anyhow::{anyhow, Context, Result};
use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use wgpu::util::DeviceExt;
use wgpu::{
    AddressMode, BindGroupDescriptor, BindGroupEntry, BindGroupLayout, BindGroupLayoutDescriptor,
    BindGroupLayoutEntry, BindingResource, BindingType, Buffer, BufferBindingType, BufferUsages,
    ColorTargetState, ColorWrites, CommandEncoderDescriptor, CompareFunction, CompositeAlphaMode,
    DepthBiasState, DepthStencilState, DeviceDescriptor, Extent3d, FilterMode, FragmentState,
    IndexFormat, Instance, LoadOp, MultisampleState, Operations, Origin3d, PipelineLayout,
    PipelineLayoutDescriptor, PresentMode, PrimitiveState, RenderPassColorAttachment,
    RenderPassDepthStencilAttachment, RenderPassDescriptor, RenderPipeline,
    RenderPipelineDescriptor, RequestAdapterOptions, Sampler, SamplerBindingType,
    SamplerDescriptor, ShaderModule, ShaderModuleDescriptor, ShaderSource, StencilState,
    SurfaceConfiguration, TexelCopyBufferLayout, TexelCopyTextureInfo, TextureAspect,
    TextureDescriptor, TextureDimension, TextureFormat, TextureSampleType, TextureUsages,
    TextureView, TextureViewDescriptor, TextureViewDimension, VertexState,
};
use winit::{dpi::PhysicalSize, window::Window};

use crate::assets::TextureLoader;
use crate::error::{BatchError, BatchResult};

use super::backend::{PipelineState, RenderBackend, ShaderId, PROJECTION_UNIFORM, SLOT_UNIFORMS};
use super::slots::MAX_TEXTURE_SLOTS;
use super::text::Font;
use super::texture::{Texture, TextureId};
use super::vertex::Vertex;
use super::viewport::ViewportRect;

const DEFAULT_SHADER: &str = include_str!("batch2d.wgsl");
const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;
/// Binding of the sampler, after the uniform block and the texture units.
const SAMPLER_BINDING: u32 = MAX_TEXTURE_SLOTS as u32 + 1;
const BIND_GROUP_ENTRIES: usize = MAX_TEXTURE_SLOTS + 2;

/// CPU copy of the shader's uniform block.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct ShaderUniforms {
    pr_matrix: [[f32; 4]; 4],
    /// Texture unit per slot, packed four to a row.
    units: [[i32; 4]; 4],
}

impl Default for ShaderUniforms {
    fn default() -> Self {
        Self {
            pr_matrix: Mat4::IDENTITY.to_cols_array_2d(),
            units: [[0; 4]; 4],
        }
    }
}

struct ShaderProgram {
    module: ShaderModule,
    uniforms: ShaderUniforms,
    uniform_buffer: Buffer,
    pipelines: HashMap<PipelineState, RenderPipeline>,
}

struct TextureEntry {
    /// The underlying GPU texture. Must be kept alive for the view to be valid.
    #[allow(dead_code)]
    texture: wgpu::Texture,
    view: TextureView,
    size: (u32, u32),
    render_target: bool,
}

struct DepthBuffer {
    #[allow(dead_code)]
    texture: wgpu::Texture,
    view: TextureView,
    size: (u32, u32),
}

struct Geometry {
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    max_vertices: usize,
    index_count: u32,
}

/// Swapchain image acquired by [`WgpuBackend::begin_frame`].
struct Frame {
    surface_texture: Option<wgpu::SurfaceTexture>,
    view: TextureView,
}

impl Drop for Frame {
    fn drop(&mut self) {
        // A frame that was never ended still has to hand its image back.
        if let Some(surface_texture) = self.surface_texture.take() {
            surface_texture.present();
        }
    }
}

/// [`RenderBackend`] over a wgpu surface, plus the texture and shader
/// providers the batch draws with.
pub struct WgpuBackend<'window> {
    surface: wgpu::Surface<'window>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface_config: SurfaceConfiguration,
    present_mode: PresentMode,
    bind_group_layout: BindGroupLayout,
    pipeline_layout: PipelineLayout,
    sampler: Sampler,
    white: TextureEntry,
    textures: HashMap<TextureId, TextureEntry>,
    next_texture_id: u32,
    shaders: HashMap<ShaderId, ShaderProgram>,
    next_shader_id: u32,
    geometry: Option<Geometry>,
    depth: Option<DepthBuffer>,
    frame: Option<Frame>,
    target: Option<TextureId>,
    viewport: ViewportRect,
    current: Option<(ShaderId, PipelineState)>,
    bound: [Option<TextureId>; MAX_TEXTURE_SLOTS],
}

impl<'window> WgpuBackend<'window> {
    pub fn new(window: &'window Window, vsync: bool) -> Result<Self> {
        let instance = Instance::default();
        let surface = instance.create_surface(window)?;

        let adapter = pollster::block_on(instance.request_adapter(&RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))?;

        let (device, queue) = pollster::block_on(adapter.request_device(&DeviceDescriptor {
            label: Some("batch2d-device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            experimental_features: Default::default(),
            memory_hints: Default::default(),
            trace: wgpu::Trace::Off,
        }))?;

        let size = window.inner_size();
        let capabilities = surface.get_capabilities(&adapter);
        let format = capabilities
            .formats
            .iter()
            .copied()
            .find(|format| format.is_srgb())
            .or_else(|| capabilities.formats.first().copied())
            .ok_or_else(|| anyhow!("Surface reports no supported formats"))?;

        let present_mode = choose_present_mode(&capabilities.present_modes, vsync);
        let alpha_mode = choose_alpha_mode(&capabilities.alpha_modes);

        let surface_config = SurfaceConfiguration {
            usage: TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        let bind_group_layout = create_bind_group_layout(&device);
        let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("batch2d-pipeline-layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        // The batch samples pixel art; no filtering between texels.
        let sampler = device.create_sampler(&SamplerDescriptor {
            label: Some("batch2d-sampler"),
            address_mode_u: AddressMode::ClampToEdge,
            address_mode_v: AddressMode::ClampToEdge,
            address_mode_w: AddressMode::ClampToEdge,
            mag_filter: FilterMode::Nearest,
            min_filter: FilterMode::Nearest,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            ..Default::default()
        });

        let white = upload_rgba(
            &device,
            &queue,
            &[255, 255, 255, 255],
            1,
            1,
            TextureFormat::Rgba8UnormSrgb,
        );

        log::info!(
            "wgpu backend ready: {}x{} {:?}, {:?}",
            surface_config.width,
            surface_config.height,
            format,
            present_mode
        );

        Ok(Self {
            surface,
            device,
            queue,
            surface_config,
            present_mode,
            bind_group_layout,
            pipeline_layout,
            sampler,
            white,
            textures: HashMap::new(),
            next_texture_id: 1,
            shaders: HashMap::new(),
            next_shader_id: 1,
            geometry: None,
            depth: None,
            frame: None,
            target: None,
            viewport: ViewportRect::new(0, 0, size.width.max(1), size.height.max(1)),
            current: None,
            bound: [None; MAX_TEXTURE_SLOTS],
        })
    }

    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }

        self.surface_config.width = new_size.width;
        self.surface_config.height = new_size.height;
        self.surface_config.present_mode = self.present_mode;
        self.surface.configure(&self.device, &self.surface_config);
    }

    pub fn surface_size(&self) -> (u32, u32) {
        (self.surface_config.width, self.surface_config.height)
    }

    /// Acquires the next swapchain image. Batches targeting the window draw into it.
    pub fn begin_frame(&mut self) -> Result<()> {
        if self.frame.is_some() {
            return Err(anyhow!("Frame already in progress"));
        }
        loop {
            match self.surface.get_current_texture() {
                Ok(surface_texture) => {
                    let view = surface_texture
                        .texture
                        .create_view(&TextureViewDescriptor::default());
                    self.frame = Some(Frame {
                        surface_texture: Some(surface_texture),
                        view,
                    });
                    return Ok(());
                }
                Err(e) => match e {
                    wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => {
                        self.surface.configure(&self.device, &self.surface_config);
                        continue;
                    }
                    wgpu::SurfaceError::Timeout => {
                        continue;
                    }
                    wgpu::SurfaceError::OutOfMemory => {
                        return Err(anyhow!("Surface ran out of memory"));
                    }
                    wgpu::SurfaceError::Other => {
                        return Err(anyhow!("Surface error: Other"));
                    }
                },
            }
        }
    }

    /// Presents the image acquired by `begin_frame`.
    pub fn end_frame(&mut self) -> Result<()> {
        let mut frame = self
            .frame
            .take()
            .ok_or_else(|| anyhow!("No frame in progress"))?;
        let surface_texture = frame
            .surface_texture
            .take()
            .ok_or_else(|| anyhow!("Frame already presented"))?;
        surface_texture.present();
        Ok(())
    }

    /// Clears the whole window to `color` (0..1 channels).
    pub fn clear(&mut self, color: [f32; 4]) -> Result<()> {
        let frame = self
            .frame
            .as_ref()
            .ok_or_else(|| anyhow!("clear() called outside begin_frame/end_frame"))?;
        clear_view(&self.device, &self.queue, &frame.view, color);
        Ok(())
    }

    /// Clears a render target created with [`Self::create_render_target`].
    pub fn clear_target(&mut self, target: &Texture, color: [f32; 4]) -> Result<()> {
        let entry = self
            .textures
            .get(&target.id)
            .filter(|e| e.render_target)
            .ok_or_else(|| anyhow!("{:?} is not a render target", target.id))?;
        clear_view(&self.device, &self.queue, &entry.view, color);
        Ok(())
    }

    // Textures

    pub fn load_texture_from_file(&mut self, path: impl AsRef<Path>) -> Result<Texture> {
        let path = path.as_ref();
        let data = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        self.load_texture_from_bytes(&data)
    }

    pub fn load_texture_from_bytes(&mut self, bytes: &[u8]) -> Result<Texture> {
        let image = image::load_from_memory(bytes)?.to_rgba8();
        let (width, height) = image.dimensions();
        self.load_texture_from_rgba(&image, width, height)
    }

    /// Uploads raw RGBA8 pixels; `data` must be `width * height * 4` bytes.
    pub fn load_texture_from_rgba(&mut self, data: &[u8], width: u32, height: u32) -> Result<Texture> {
        let expected = width as usize * height as usize * 4;
        if data.len() != expected || width == 0 || height == 0 {
            return Err(anyhow!(
                "RGBA data is {} bytes, expected {expected} for {width}x{height}",
                data.len()
            ));
        }
        let entry = upload_rgba(
            &self.device,
            &self.queue,
            data,
            width,
            height,
            TextureFormat::Rgba8UnormSrgb,
        );
        Ok(self.register(entry))
    }

    /// Creates an off-screen color target that batches can draw into and later sample.
    pub fn create_render_target(&mut self, width: u32, height: u32) -> Result<Texture> {
        let (width, height) = (width.max(1), height.max(1));
        let texture = self.device.create_texture(&TextureDescriptor {
            label: Some("render-target"),
            size: Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: self.surface_config.format,
            usage: TextureUsages::RENDER_ATTACHMENT
                | TextureUsages::TEXTURE_BINDING
                | TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&TextureViewDescriptor::default());
        Ok(self.register(TextureEntry {
            texture,
            view,
            size: (width, height),
            render_target: true,
        }))
    }

    pub fn texture_size(&self, id: TextureId) -> Option<(u32, u32)> {
        self.textures.get(&id).map(|t| t.size)
    }

    pub fn dispose_texture(&mut self, texture: &Texture) {
        if self.textures.remove(&texture.id).is_none() {
            log::warn!("dispose of unknown texture {:?}", texture.id);
        }
    }

    /// Rasterizes ASCII glyphs from TTF/OTF bytes into textures owned by this backend.
    pub fn load_font_from_bytes(&mut self, bytes: &[u8], pixel_size: f32) -> Result<Font> {
        Font::from_bytes(bytes, pixel_size, |pixels, width, height| {
            self.load_texture_from_rgba(pixels, width, height)
        })
    }

    pub fn dispose_font(&mut self, font: &Font) {
        for texture in font.textures() {
            self.dispose_texture(&texture);
        }
    }

    fn register(&mut self, entry: TextureEntry) -> Texture {
        let id = TextureId::new(self.next_texture_id);
        self.next_texture_id += 1;
        let (width, height) = entry.size;
        self.textures.insert(id, entry);
        Texture::new(id, width, height)
    }

    // Shaders

    /// Compiles a WGSL program with the same bindings and entry points as the
    /// built-in shader (`vs_main`, `fs_main`).
    pub fn create_shader(&mut self, label: &str, wgsl: &str) -> Result<ShaderId> {
        let module = self.device.create_shader_module(ShaderModuleDescriptor {
            label: Some(label),
            source: ShaderSource::Wgsl(wgsl.into()),
        });
        let uniforms = ShaderUniforms::default();
        let uniform_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("batch2d-uniforms"),
                contents: bytemuck::bytes_of(&uniforms),
                usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            });

        let id = ShaderId(self.next_shader_id);
        self.next_shader_id += 1;
        self.shaders.insert(
            id,
            ShaderProgram {
                module,
                uniforms,
                uniform_buffer,
                pipelines: HashMap::new(),
            },
        );
        log::debug!("compiled shader {label} as {id:?}");
        Ok(id)
    }

    fn program_mut(&mut self, shader: ShaderId) -> BatchResult<&mut ShaderProgram> {
        self.shaders
            .get_mut(&shader)
            .ok_or(BatchError::UnknownShader(shader))
    }

    fn ensure_pipeline(&mut self, shader: ShaderId, state: PipelineState) -> BatchResult<()> {
        let format = self.surface_config.format;
        let program = self
            .shaders
            .get(&shader)
            .ok_or(BatchError::UnknownShader(shader))?;
        if program.pipelines.contains_key(&state) {
            return Ok(());
        }
        let pipeline = create_batch_pipeline(
            &self.device,
            &self.pipeline_layout,
            &program.module,
            format,
            state,
        );
        self.program_mut(shader)?.pipelines.insert(state, pipeline);
        Ok(())
    }

    fn ensure_depth(&mut self, size: (u32, u32)) {
        if self.depth.as_ref().is_some_and(|d| d.size == size) {
            return;
        }
        let texture = self.device.create_texture(&TextureDescriptor {
            label: Some("batch2d-depth"),
            size: Extent3d {
                width: size.0,
                height: size.1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&TextureViewDescriptor::default());
        self.depth = Some(DepthBuffer {
            texture,
            view,
            size,
        });
    }

    fn target_size(&self) -> BatchResult<(u32, u32)> {
        match self.target {
            Some(id) => self
                .textures
                .get(&id)
                .map(|e| e.size)
                .ok_or(BatchError::UnknownTexture(id)),
            None => Ok(self.surface_size()),
        }
    }
}

impl RenderBackend for WgpuBackend<'_> {
    fn create_geometry(&mut self, max_vertices: usize, indices: &[u32]) -> BatchResult<()> {
        let vertex_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("batch2d-vertices"),
            size: (max_vertices * std::mem::size_of::<Vertex>()) as u64,
            usage: BufferUsages::VERTEX | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let index_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("batch2d-indices"),
                contents: bytemuck::cast_slice(indices),
                usage: BufferUsages::INDEX,
            });
        self.geometry = Some(Geometry {
            vertex_buffer,
            index_buffer,
            max_vertices,
            index_count: indices.len() as u32,
        });
        Ok(())
    }

    fn release_geometry(&mut self) {
        if let Some(geometry) = self.geometry.take() {
            geometry.vertex_buffer.destroy();
            geometry.index_buffer.destroy();
        }
    }

    fn create_default_shader(&mut self) -> BatchResult<ShaderId> {
        Ok(self.create_shader("batch2d-default", DEFAULT_SHADER)?)
    }

    fn dispose_shader(&mut self, shader: ShaderId) {
        if self.shaders.remove(&shader).is_none() {
            log::warn!("dispose of unknown shader {shader:?}");
        }
    }

    fn write_vertices(&mut self, vertices: &[Vertex]) -> BatchResult<()> {
        let geometry = self
            .geometry
            .as_ref()
            .ok_or_else(|| anyhow!("vertex buffer not allocated"))?;
        if vertices.len() > geometry.max_vertices {
            return Err(anyhow!(
                "{} vertices exceed buffer of {}",
                vertices.len(),
                geometry.max_vertices
            )
            .into());
        }
        self.queue
            .write_buffer(&geometry.vertex_buffer, 0, bytemuck::cast_slice(vertices));
        Ok(())
    }

    fn set_target(&mut self, target: Option<TextureId>) -> BatchResult<()> {
        if let Some(id) = target {
            match self.textures.get(&id) {
                Some(entry) if entry.render_target => {}
                Some(_) => return Err(anyhow!("{id:?} is not a render target").into()),
                None => return Err(BatchError::UnknownTexture(id)),
            }
        }
        self.target = target;
        Ok(())
    }

    fn set_viewport(&mut self, rect: ViewportRect) {
        self.viewport = rect;
    }

    fn use_shader(&mut self, shader: ShaderId, state: PipelineState) -> BatchResult<()> {
        self.ensure_pipeline(shader, state)?;
        self.current = Some((shader, state));
        Ok(())
    }

    fn upload_mat4(&mut self, shader: ShaderId, name: &str, value: &Mat4) -> BatchResult<()> {
        let program = self.program_mut(shader)?;
        if name != PROJECTION_UNIFORM {
            return Err(BatchError::UnknownUniform {
                name: name.to_owned(),
            });
        }
        program.uniforms.pr_matrix = value.to_cols_array_2d();
        Ok(())
    }

    fn upload_int(&mut self, shader: ShaderId, name: &str, value: i32) -> BatchResult<()> {
        let program = self.program_mut(shader)?;
        let slot = SLOT_UNIFORMS
            .iter()
            .position(|n| *n == name)
            .ok_or_else(|| BatchError::UnknownUniform {
                name: name.to_owned(),
            })?;
        program.uniforms.units[slot / 4][slot % 4] = value;
        Ok(())
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureId) -> BatchResult<()> {
        if !self.textures.contains_key(&texture) {
            return Err(BatchError::UnknownTexture(texture));
        }
        let slot = self
            .bound
            .get_mut(unit as usize)
            .ok_or_else(|| anyhow!("texture unit {unit} out of range"))?;
        *slot = Some(texture);
        Ok(())
    }

    fn unbind_textures(&mut self) {
        self.bound = [None; MAX_TEXTURE_SLOTS];
    }

    fn draw_indexed(&mut self, index_count: u32) -> BatchResult<()> {
        let (shader, state) = self
            .current
            .ok_or_else(|| anyhow!("draw issued with no shader in use"))?;
        let target_size = self.target_size()?;
        if state.depth_test {
            self.ensure_depth(target_size);
        }

        let geometry = self
            .geometry
            .as_ref()
            .ok_or_else(|| anyhow!("geometry buffers not allocated"))?;
        if index_count > geometry.index_count {
            return Err(anyhow!(
                "draw of {index_count} indices exceeds table of {}",
                geometry.index_count
            )
            .into());
        }
        let program = self
            .shaders
            .get(&shader)
            .ok_or(BatchError::UnknownShader(shader))?;
        let pipeline = program
            .pipelines
            .get(&state)
            .ok_or_else(|| anyhow!("pipeline for {state:?} not built"))?;
        self.queue.write_buffer(
            &program.uniform_buffer,
            0,
            bytemuck::bytes_of(&program.uniforms),
        );

        let color_view = match self.target {
            Some(id) => {
                &self
                    .textures
                    .get(&id)
                    .ok_or(BatchError::UnknownTexture(id))?
                    .view
            }
            None => {
                &self
                    .frame
                    .as_ref()
                    .ok_or_else(|| anyhow!("window batch submitted outside begin_frame/end_frame"))?
                    .view
            }
        };

        let views = resolve_units(
            &self.bound,
            |id| self.textures.get(&id).map(|e| &e.view),
            &self.white.view,
        );
        let entries: [BindGroupEntry; BIND_GROUP_ENTRIES] =
            std::array::from_fn(|binding| match binding {
                0 => BindGroupEntry {
                    binding: 0,
                    resource: program.uniform_buffer.as_entire_binding(),
                },
                b if b == SAMPLER_BINDING as usize => BindGroupEntry {
                    binding: SAMPLER_BINDING,
                    resource: BindingResource::Sampler(&self.sampler),
                },
                unit => BindGroupEntry {
                    binding: unit as u32,
                    resource: BindingResource::TextureView(views[unit - 1]),
                },
            });
        let bind_group = self.device.create_bind_group(&BindGroupDescriptor {
            label: Some("batch2d-bind-group"),
            layout: &self.bind_group_layout,
            entries: &entries,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&CommandEncoderDescriptor {
                label: Some("batch2d-encoder"),
            });
        {
            let depth_stencil_attachment = if state.depth_test {
                self.depth.as_ref().map(|depth| RenderPassDepthStencilAttachment {
                    view: &depth.view,
                    depth_ops: Some(Operations {
                        load: LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                })
            } else {
                None
            };
            let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("batch2d-pass"),
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: color_view,
                    resolve_target: None,
                    ops: Operations {
                        load: LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment,
                multiview_mask: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            let (x, y, width, height) = clamp_viewport(self.viewport, target_size);
            pass.set_viewport(x, y, width, height, 0.0, 1.0);
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.set_vertex_buffer(0, geometry.vertex_buffer.slice(..));
            pass.set_index_buffer(geometry.index_buffer.slice(..), IndexFormat::Uint32);
            pass.draw_indexed(0..index_count, 0, 0..1);
        }
        // One submission per draw keeps each batch's buffer writes ahead of its draw.
        self.queue.submit(Some(encoder.finish()));
        Ok(())
    }
}

impl TextureLoader for WgpuBackend<'_> {
    fn load_texture_from_file(&mut self, path: &Path) -> Result<Texture> {
        WgpuBackend::load_texture_from_file(self, path)
    }

    fn load_texture_from_bytes(&mut self, bytes: &[u8]) -> Result<Texture> {
        WgpuBackend::load_texture_from_bytes(self, bytes)
    }

    fn load_font_from_bytes(&mut self, bytes: &[u8], pixel_size: f32) -> Result<Font> {
        WgpuBackend::load_font_from_bytes(self, bytes, pixel_size)
    }

    fn dispose_texture(&mut self, texture: &Texture) {
        WgpuBackend::dispose_texture(self, texture);
    }
}

/// Resource for each texture unit; empty or stale units get `fallback`.
fn resolve_units<'a, T>(
    bound: &[Option<TextureId>; MAX_TEXTURE_SLOTS],
    lookup: impl Fn(TextureId) -> Option<&'a T>,
    fallback: &'a T,
) -> [&'a T; MAX_TEXTURE_SLOTS] {
    std::array::from_fn(|unit| bound[unit].and_then(&lookup).unwrap_or(fallback))
}

/// Viewport rectangle clipped to the attachment, as wgpu requires.
///
/// Window viewports arrive already clipped by `ViewportMapper`; this guards
/// render targets smaller than the rect handed in.
fn clamp_viewport(rect: ViewportRect, target: (u32, u32)) -> (f32, f32, f32, f32) {
    let (tw, th) = (target.0 as f32, target.1 as f32);
    let x = (rect.x as f32).clamp(0.0, tw);
    let y = (rect.y as f32).clamp(0.0, th);
    let width = (rect.width as f32).min(tw - x).max(1.0);
    let height = (rect.height as f32).min(th - y).max(1.0);
    (x.min(tw - 1.0), y.min(th - 1.0), width, height)
}

fn clear_view(device: &wgpu::Device, queue: &wgpu::Queue, view: &TextureView, color: [f32; 4]) {
    let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor {
        label: Some("clear-encoder"),
    });
    {
        let _pass = encoder.begin_render_pass(&RenderPassDescriptor {
            label: Some("clear-pass"),
            color_attachments: &[Some(RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: Operations {
                    load: LoadOp::Clear(wgpu::Color {
                        r: color[0] as f64,
                        g: color[1] as f64,
                        b: color[2] as f64,
                        a: color[3] as f64,
                    }),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            multiview_mask: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
    }
    queue.submit(Some(encoder.finish()));
}

fn upload_rgba(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    data: &[u8],
    width: u32,
    height: u32,
    format: TextureFormat,
) -> TextureEntry {
    let size = Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };

    let texture = device.create_texture(&TextureDescriptor {
        label: Some("texture"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: TextureDimension::D2,
        format,
        usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
        view_formats: &[],
    });

    queue.write_texture(
        TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: Origin3d::ZERO,
            aspect: TextureAspect::All,
        },
        data,
        TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * width),
            rows_per_image: Some(height),
        },
        size,
    );

    let view = texture.create_view(&TextureViewDescriptor::default());
    TextureEntry {
        texture,
        view,
        size: (width, height),
        render_target: false,
    }
}

fn create_bind_group_layout(device: &wgpu::Device) -> BindGroupLayout {
    let mut entries = Vec::with_capacity(MAX_TEXTURE_SLOTS + 2);
    entries.push(BindGroupLayoutEntry {
        binding: 0,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty: BindingType::Buffer {
            ty: BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: std::num::NonZeroU64::new(
                std::mem::size_of::<ShaderUniforms>() as u64,
            ),
        },
        count: None,
    });
    for unit in 0..MAX_TEXTURE_SLOTS as u32 {
        entries.push(BindGroupLayoutEntry {
            binding: unit + 1,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: BindingType::Texture {
                sample_type: TextureSampleType::Float { filterable: true },
                view_dimension: TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        });
    }
    entries.push(BindGroupLayoutEntry {
        binding: SAMPLER_BINDING,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: BindingType::Sampler(SamplerBindingType::Filtering),
        count: None,
    });

    device.create_bind_group_layout(&BindGroupLayoutDescriptor {
        label: Some("batch2d-bind-group-layout"),
        entries: &entries,
    })
}

fn create_batch_pipeline(
    device: &wgpu::Device,
    layout: &PipelineLayout,
    module: &ShaderModule,
    format: TextureFormat,
    state: PipelineState,
) -> RenderPipeline {
    let blend = if state.blending {
        Some(wgpu::BlendState::ALPHA_BLENDING)
    } else {
        Some(wgpu::BlendState::REPLACE)
    };
    let depth_stencil = state.depth_test.then(|| DepthStencilState {
        format: DEPTH_FORMAT,
        depth_write_enabled: true,
        depth_compare: CompareFunction::LessEqual,
        stencil: StencilState::default(),
        bias: DepthBiasState::default(),
    });

    device.create_render_pipeline(&RenderPipelineDescriptor {
        label: Some("batch2d-pipeline"),
        layout: Some(layout),
        vertex: VertexState {
            module,
            entry_point: Some("vs_main"),
            buffers: &[Vertex::layout()],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(FragmentState {
            module,
            entry_point: Some("fs_main"),
            targets: &[Some(ColorTargetState {
                format,
                blend,
                write_mask: ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: PrimitiveState::default(),
        depth_stencil,
        multisample: MultisampleState::default(),
        multiview_mask: None,
        cache: None,
    })
}

fn choose_present_mode(modes: &[PresentMode], vsync: bool) -> PresentMode {
    if vsync {
        modes
            .iter()
            .copied()
            .find(|mode| matches!(mode, PresentMode::Fifo | PresentMode::FifoRelaxed))
            .unwrap_or(PresentMode::Fifo)
    } else {
        modes
            .iter()
            .copied()
            .find(|mode| matches!(mode, PresentMode::Immediate | PresentMode::Mailbox))
            .unwrap_or(PresentMode::Immediate)
    }
}

fn choose_alpha_mode(modes: &[CompositeAlphaMode]) -> CompositeAlphaMode {
    modes
        .iter()
        .copied()
        .find(|mode| matches!(mode, CompositeAlphaMode::Auto))
        .unwrap_or_else(|| modes.first().copied().unwrap_or(CompositeAlphaMode::Opaque))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_block_matches_shader_layout() {
        assert_eq!(std::mem::size_of::<ShaderUniforms>(), 128);
        assert!(DEFAULT_SHADER.contains("@binding(17) var atlas_sampler"));
    }

    #[test]
    fn vsync_prefers_fifo() {
        let modes = [PresentMode::Immediate, PresentMode::Fifo];
        assert_eq!(choose_present_mode(&modes, true), PresentMode::Fifo);
        assert_eq!(choose_present_mode(&modes, false), PresentMode::Immediate);
    }

    #[test]
    fn units_fall_back_for_empty_and_stale_slots() {
        let live: HashMap<TextureId, u32> =
            [(TextureId::new(1), 10), (TextureId::new(2), 20)].into_iter().collect();
        let fallback = 0;
        let mut bound = [None; MAX_TEXTURE_SLOTS];
        bound[0] = Some(TextureId::new(2));
        bound[1] = Some(TextureId::new(1));
        bound[2] = Some(TextureId::new(9));

        let units = resolve_units(&bound, |id| live.get(&id), &fallback);
        assert_eq!(units.len(), MAX_TEXTURE_SLOTS);
        assert_eq!((*units[0], *units[1], *units[2], *units[15]), (20, 10, 0, 0));
    }

    #[test]
    fn bind_group_covers_every_binding() {
        assert_eq!(BIND_GROUP_ENTRIES, SAMPLER_BINDING as usize + 1);
    }

    #[test]
    fn viewport_is_clipped_to_target() {
        let rect = ViewportRect::new(0, 152, 1280, 720);
        assert_eq!(clamp_viewport(rect, (1280, 1024)), (0.0, 152.0, 1280.0, 720.0));
        let oversized = ViewportRect::new(-10, 0, 2000, 2000);
        assert_eq!(clamp_viewport(oversized, (100, 50)), (0.0, 0.0, 100.0, 50.0));
    }
}
