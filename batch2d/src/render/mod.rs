mod backend;
mod batch;
mod geometry;
mod headless;
pub mod quad;
mod slots;
mod text;
mod texture;
mod vertex;
mod viewport;
mod wgpu_backend;

pub use backend::{PipelineState, RenderBackend, ShaderId, PROJECTION_UNIFORM, SLOT_UNIFORMS};
pub use batch::{BatchRenderer, BeginOptions, FrameStats};
pub use geometry::{build_index_table, GeometryBuffer, QUAD_INDICES};
pub use headless::{DrawSubmission, HeadlessBackend};
pub use slots::{TextureSlotTable, MAX_TEXTURE_SLOTS};
pub use text::{Font, Glyph, GlyphLayout, PlacedGlyph, GLYPH_COUNT};
pub use texture::{FlipFlags, Texture, TextureId};
pub use vertex::{Vertex, INDICES_PER_QUAD, VERTICES_PER_QUAD};
pub use viewport::{letterbox, AspectMode, StretchMode, ViewportMapper, ViewportRect};
pub use wgpu_backend::WgpuBackend;
