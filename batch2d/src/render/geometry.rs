//! CPU side of the batch's vertex stream and its static index pattern.

use crate::error::{BatchError, BatchResult};

use super::vertex::{Vertex, INDICES_PER_QUAD, VERTICES_PER_QUAD};

/// Index pattern for one quad, relative to its first vertex.
pub const QUAD_INDICES: [u32; INDICES_PER_QUAD] = [0, 1, 2, 2, 3, 0];

/// Fixed-capacity vertex region written once per batch.
///
/// Storage is allocated at construction and never grows. Writes go through a
/// cursor that is checked against capacity before every quad.
pub struct GeometryBuffer {
    vertices: Vec<Vertex>,
    cursor: usize,
    max_sprites: usize,
    open: bool,
}

impl GeometryBuffer {
    pub fn new(max_sprites: usize) -> Self {
        Self {
            vertices: vec![Vertex::default(); max_sprites * VERTICES_PER_QUAD],
            cursor: 0,
            max_sprites,
            open: false,
        }
    }

    /// Opens the region for writing and discards whatever the previous batch left.
    pub fn open(&mut self) {
        self.cursor = 0;
        self.open = true;
    }

    /// Closes the region and returns the vertices written since `open`.
    pub fn close(&mut self) -> &[Vertex] {
        self.open = false;
        &self.vertices[..self.cursor]
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn max_sprites(&self) -> usize {
        self.max_sprites
    }

    pub fn quad_count(&self) -> usize {
        self.cursor / VERTICES_PER_QUAD
    }

    pub fn remaining_quads(&self) -> usize {
        self.max_sprites - self.quad_count()
    }

    pub fn is_full(&self) -> bool {
        self.remaining_quads() == 0
    }

    /// Vertices written so far in the open region.
    pub fn written(&self) -> &[Vertex] {
        &self.vertices[..self.cursor]
    }

    /// Writes one quad at the cursor and advances it by four vertices.
    pub fn push_quad(&mut self, quad: &[Vertex; VERTICES_PER_QUAD]) -> BatchResult<()> {
        debug_assert!(self.open, "geometry buffer written while closed");
        let end = self.cursor + VERTICES_PER_QUAD;
        if end > self.vertices.len() {
            return Err(BatchError::GeometryOverflow {
                capacity: self.max_sprites,
            });
        }
        self.vertices[self.cursor..end].copy_from_slice(quad);
        self.cursor = end;
        Ok(())
    }
}

/// Builds the static index table for `max_sprites` quads.
pub fn build_index_table(max_sprites: usize) -> Vec<u32> {
    let mut indices = Vec::with_capacity(max_sprites * INDICES_PER_QUAD);
    for quad in 0..max_sprites {
        let base = (quad * VERTICES_PER_QUAD) as u32;
        indices.extend(QUAD_INDICES.iter().map(|i| base + i));
    }
    indices
}
