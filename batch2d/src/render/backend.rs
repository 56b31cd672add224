use glam::Mat4;

use crate::error::BatchResult;

use super::texture::TextureId;
use super::vertex::Vertex;
use super::viewport::ViewportRect;

/// Identifier of a shader program owned by a backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ShaderId(pub(crate) u32);

impl ShaderId {
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Fixed-function state selected at `begin`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PipelineState {
    pub blending: bool,
    pub depth_test: bool,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self {
            blending: true,
            depth_test: false,
        }
    }
}

/// Uniform receiving the projection matrix.
pub const PROJECTION_UNIFORM: &str = "pr_matrix";

/// Uniforms receiving the texture unit for slots 1..=16, in slot order.
pub const SLOT_UNIFORMS: [&str; 16] = [
    "tex1", "tex2", "tex3", "tex4", "tex5", "tex6", "tex7", "tex8", "tex9", "tex10", "tex11",
    "tex12", "tex13", "tex14", "tex15", "tex16",
];

/// GPU operations the batch controller needs.
///
/// Calls arrive in a fixed order for every submission: `write_vertices`,
/// `set_target`, `set_viewport`, `use_shader`, the uniform uploads and texture
/// binds, `draw_indexed`, then `unbind_textures`.
pub trait RenderBackend {
    /// Allocates vertex storage for `max_vertices` and uploads the static index table.
    fn create_geometry(&mut self, max_vertices: usize, indices: &[u32]) -> BatchResult<()>;

    /// Frees what `create_geometry` allocated.
    fn release_geometry(&mut self);

    /// Builds the built-in 2D shader.
    fn create_default_shader(&mut self) -> BatchResult<ShaderId>;

    fn dispose_shader(&mut self, shader: ShaderId);

    /// Replaces the contents of the vertex storage, starting at vertex 0.
    fn write_vertices(&mut self, vertices: &[Vertex]) -> BatchResult<()>;

    /// Selects the color target; `None` is the window.
    fn set_target(&mut self, target: Option<TextureId>) -> BatchResult<()>;

    fn set_viewport(&mut self, rect: ViewportRect);

    fn use_shader(&mut self, shader: ShaderId, state: PipelineState) -> BatchResult<()>;

    fn upload_mat4(&mut self, shader: ShaderId, name: &str, value: &Mat4) -> BatchResult<()>;

    fn upload_int(&mut self, shader: ShaderId, name: &str, value: i32) -> BatchResult<()>;

    /// Binds `texture` to texture unit `unit`.
    fn bind_texture(&mut self, unit: u32, texture: TextureId) -> BatchResult<()>;

    fn unbind_textures(&mut self);

    /// Draws `index_count` indices from the start of the index table.
    fn draw_indexed(&mut self, index_count: u32) -> BatchResult<()>;
}
