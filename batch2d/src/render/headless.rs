//! In-memory backend that records every submission instead of drawing it.
//!
//! Used by the test suite and by tools that want to inspect what a frame
//! would have sent to the GPU.

use std::{collections::HashMap, fs, path::Path};

use anyhow::Context;
use glam::Mat4;
use image::GenericImageView;

use crate::assets::TextureLoader;

use crate::error::{BatchError, BatchResult};

use super::backend::{PipelineState, RenderBackend, ShaderId, PROJECTION_UNIFORM, SLOT_UNIFORMS};
use super::slots::MAX_TEXTURE_SLOTS;
use super::text::Font;
use super::texture::{Texture, TextureId};
use super::vertex::Vertex;
use super::viewport::ViewportRect;

/// Snapshot of the state captured by one `draw_indexed` call.
#[derive(Clone, Debug)]
pub struct DrawSubmission {
    pub index_count: u32,
    pub vertices: Vec<Vertex>,
    /// Texture bound to each unit, in unit order.
    pub bound_textures: Vec<Option<TextureId>>,
    pub projection: Option<Mat4>,
    /// Values of the `tex1..tex16` uniforms that were set, keyed by uniform name.
    pub slot_units: HashMap<String, i32>,
    pub viewport: ViewportRect,
    pub target: Option<TextureId>,
    pub shader: ShaderId,
    pub state: PipelineState,
}

impl DrawSubmission {
    /// Number of texture units with something bound.
    pub fn bound_texture_count(&self) -> usize {
        self.bound_textures.iter().filter(|t| t.is_some()).count()
    }

    pub fn quad_count(&self) -> usize {
        self.index_count as usize / 6
    }
}

#[derive(Default)]
struct ShaderRecord {
    uniforms: Vec<String>,
    mat4s: HashMap<String, Mat4>,
    ints: HashMap<String, i32>,
}

/// Backend with no GPU behind it.
pub struct HeadlessBackend {
    textures: HashMap<TextureId, (u32, u32)>,
    next_texture_id: u32,
    shaders: HashMap<ShaderId, ShaderRecord>,
    next_shader_id: u32,
    geometry_capacity: Option<usize>,
    index_table: Vec<u32>,
    vertices: Vec<Vertex>,
    bound: [Option<TextureId>; MAX_TEXTURE_SLOTS],
    viewport: ViewportRect,
    target: Option<TextureId>,
    current: Option<(ShaderId, PipelineState)>,
    submissions: Vec<DrawSubmission>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self {
            textures: HashMap::new(),
            next_texture_id: 1,
            shaders: HashMap::new(),
            next_shader_id: 1,
            geometry_capacity: None,
            index_table: Vec::new(),
            vertices: Vec::new(),
            bound: [None; MAX_TEXTURE_SLOTS],
            viewport: ViewportRect::default(),
            target: None,
            current: None,
            submissions: Vec::new(),
        }
    }

    /// Registers a texture of the given size and returns it.
    pub fn create_texture(&mut self, width: u32, height: u32) -> Texture {
        let id = TextureId::new(self.next_texture_id);
        self.next_texture_id += 1;
        self.textures.insert(id, (width.max(1), height.max(1)));
        Texture::new(id, width.max(1), height.max(1))
    }

    pub fn dispose_texture(&mut self, texture: &Texture) {
        self.textures.remove(&texture.id);
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Registers a shader exposing the given uniform names.
    pub fn create_shader<'a>(&mut self, uniforms: impl IntoIterator<Item = &'a str>) -> ShaderId {
        let id = ShaderId(self.next_shader_id);
        self.next_shader_id += 1;
        let record = ShaderRecord {
            uniforms: uniforms.into_iter().map(str::to_owned).collect(),
            ..ShaderRecord::default()
        };
        self.shaders.insert(id, record);
        id
    }

    pub fn submissions(&self) -> &[DrawSubmission] {
        &self.submissions
    }

    /// Returns and forgets everything recorded so far.
    pub fn take_submissions(&mut self) -> Vec<DrawSubmission> {
        std::mem::take(&mut self.submissions)
    }

    pub fn has_geometry(&self) -> bool {
        self.geometry_capacity.is_some()
    }

    pub fn index_table(&self) -> &[u32] {
        &self.index_table
    }

    pub fn shader_count(&self) -> usize {
        self.shaders.len()
    }

    fn shader_mut(&mut self, shader: ShaderId) -> BatchResult<&mut ShaderRecord> {
        self.shaders
            .get_mut(&shader)
            .ok_or(BatchError::UnknownShader(shader))
    }
}

impl TextureLoader for HeadlessBackend {
    fn load_texture_from_file(&mut self, path: &Path) -> anyhow::Result<Texture> {
        let bytes =
            fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        self.load_texture_from_bytes(&bytes)
    }

    /// Decodes the image for its size; the pixels are dropped.
    fn load_texture_from_bytes(&mut self, bytes: &[u8]) -> anyhow::Result<Texture> {
        let (width, height) = image::load_from_memory(bytes)?.dimensions();
        Ok(self.create_texture(width, height))
    }

    fn load_font_from_bytes(&mut self, bytes: &[u8], pixel_size: f32) -> anyhow::Result<Font> {
        Font::from_bytes(bytes, pixel_size, |_, width, height| {
            Ok(self.create_texture(width, height))
        })
    }

    fn dispose_texture(&mut self, texture: &Texture) {
        HeadlessBackend::dispose_texture(self, texture);
    }
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn check_uniform(record: &ShaderRecord, name: &str) -> BatchResult<()> {
    if record.uniforms.iter().any(|u| u == name) {
        Ok(())
    } else {
        Err(BatchError::UnknownUniform {
            name: name.to_owned(),
        })
    }
}

impl RenderBackend for HeadlessBackend {
    fn create_geometry(&mut self, max_vertices: usize, indices: &[u32]) -> BatchResult<()> {
        self.geometry_capacity = Some(max_vertices);
        self.index_table = indices.to_vec();
        self.vertices = Vec::with_capacity(max_vertices);
        Ok(())
    }

    fn release_geometry(&mut self) {
        self.geometry_capacity = None;
        self.index_table.clear();
        self.vertices.clear();
    }

    fn create_default_shader(&mut self) -> BatchResult<ShaderId> {
        let names = std::iter::once(PROJECTION_UNIFORM).chain(SLOT_UNIFORMS);
        Ok(self.create_shader(names))
    }

    fn dispose_shader(&mut self, shader: ShaderId) {
        self.shaders.remove(&shader);
    }

    fn write_vertices(&mut self, vertices: &[Vertex]) -> BatchResult<()> {
        let capacity = self
            .geometry_capacity
            .ok_or_else(|| anyhow::anyhow!("vertex storage not allocated"))?;
        if vertices.len() > capacity {
            return Err(anyhow::anyhow!(
                "{} vertices written into storage for {capacity}",
                vertices.len()
            )
            .into());
        }
        self.vertices.clear();
        self.vertices.extend_from_slice(vertices);
        Ok(())
    }

    fn set_target(&mut self, target: Option<TextureId>) -> BatchResult<()> {
        if let Some(id) = target {
            if !self.textures.contains_key(&id) {
                return Err(BatchError::UnknownTexture(id));
            }
        }
        self.target = target;
        Ok(())
    }

    fn set_viewport(&mut self, rect: ViewportRect) {
        self.viewport = rect;
    }

    fn use_shader(&mut self, shader: ShaderId, state: PipelineState) -> BatchResult<()> {
        self.shader_mut(shader)?;
        self.current = Some((shader, state));
        Ok(())
    }

    fn upload_mat4(&mut self, shader: ShaderId, name: &str, value: &Mat4) -> BatchResult<()> {
        let record = self.shader_mut(shader)?;
        check_uniform(record, name)?;
        record.mat4s.insert(name.to_owned(), *value);
        Ok(())
    }

    fn upload_int(&mut self, shader: ShaderId, name: &str, value: i32) -> BatchResult<()> {
        let record = self.shader_mut(shader)?;
        check_uniform(record, name)?;
        record.ints.insert(name.to_owned(), value);
        Ok(())
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureId) -> BatchResult<()> {
        if !self.textures.contains_key(&texture) {
            return Err(BatchError::UnknownTexture(texture));
        }
        let slot = self
            .bound
            .get_mut(unit as usize)
            .ok_or_else(|| anyhow::anyhow!("texture unit {unit} out of range"))?;
        *slot = Some(texture);
        Ok(())
    }

    fn unbind_textures(&mut self) {
        self.bound = [None; MAX_TEXTURE_SLOTS];
    }

    fn draw_indexed(&mut self, index_count: u32) -> BatchResult<()> {
        let (shader, state) = self
            .current
            .ok_or_else(|| anyhow::anyhow!("draw issued with no shader in use"))?;
        if index_count as usize > self.index_table.len() {
            return Err(anyhow::anyhow!(
                "draw of {index_count} indices exceeds table of {}",
                self.index_table.len()
            )
            .into());
        }
        let record = self.shader_mut(shader)?;
        let projection = record.mat4s.get(PROJECTION_UNIFORM).copied();
        let slot_units = record.ints.clone();
        let vertex_count = index_count as usize / 6 * 4;

        self.submissions.push(DrawSubmission {
            index_count,
            vertices: self.vertices[..vertex_count.min(self.vertices.len())].to_vec(),
            bound_textures: self.bound.to_vec(),
            projection,
            slot_units,
            viewport: self.viewport,
            target: self.target,
            shader,
            state,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_shader_knows_batch_uniforms() {
        let mut backend = HeadlessBackend::new();
        let shader = backend.create_default_shader().unwrap();
        backend
            .upload_mat4(shader, "pr_matrix", &Mat4::IDENTITY)
            .unwrap();
        backend.upload_int(shader, "tex16", 15).unwrap();
        let err = backend.upload_int(shader, "tex17", 16).unwrap_err();
        assert!(matches!(err, BatchError::UnknownUniform { name } if name == "tex17"));
    }

    #[test]
    fn unknown_textures_are_rejected() {
        let mut backend = HeadlessBackend::new();
        let tex = backend.create_texture(4, 4);
        backend.bind_texture(0, tex.id).unwrap();
        backend.dispose_texture(&tex);
        assert!(matches!(
            backend.bind_texture(0, tex.id),
            Err(BatchError::UnknownTexture(_))
        ));
    }

    #[test]
    fn write_past_capacity_fails() {
        let mut backend = HeadlessBackend::new();
        backend.create_geometry(4, &[0, 1, 2, 2, 3, 0]).unwrap();
        let vertices = vec![Vertex::default(); 8];
        assert!(backend.write_vertices(&vertices).is_err());
        assert!(backend.write_vertices(&vertices[..4]).is_ok());
    }
}
