use bytemuck::{Pod, Zeroable};
use wgpu::vertex_attr_array;

/// One corner of a batched quad.
///
/// `texture_slot` is integer-valued; 0 means the quad is untextured and the
/// shader uses `color` alone.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 2],
    pub color: [f32; 4],
    pub uv: [f32; 2],
    pub texture_slot: f32,
}

impl Vertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 4] =
        vertex_attr_array![0 => Float32x2, 1 => Float32x4, 2 => Float32x2, 3 => Float32];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// Vertices written per quad.
pub const VERTICES_PER_QUAD: usize = 4;
/// Indices consumed per quad.
pub const INDICES_PER_QUAD: usize = 6;
