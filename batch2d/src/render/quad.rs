//! Vertex generation for every quad variant the batch draws.
//!
//! All functions here are pure: they compute four vertices in the fixed
//! top-left, bottom-left, bottom-right, top-right order and leave writing and
//! index bookkeeping to the batch controller.

use crate::math::{Rect, Vec2};

use super::texture::{FlipFlags, Texture};
use super::vertex::Vertex;

/// Texture coordinates for the four corners of a quad.
pub type UvSet = [[f32; 2]; 4];

pub const DEFAULT_UVS: UvSet = [[0.0, 0.0], [0.0, 1.0], [1.0, 1.0], [1.0, 0.0]];
pub const FLIP_HORIZONTAL_UVS: UvSet = [[1.0, 0.0], [1.0, 1.0], [0.0, 1.0], [0.0, 0.0]];
pub const FLIP_VERTICAL_UVS: UvSet = [[0.0, 1.0], [0.0, 0.0], [1.0, 0.0], [1.0, 1.0]];
pub const FLIP_BOTH_UVS: UvSet = [[1.0, 1.0], [1.0, 0.0], [0.0, 0.0], [0.0, 1.0]];

/// Opaque white, the tint of untinted textured quads.
pub const WHITE: [f32; 4] = [1.0, 1.0, 1.0, 1.0];

/// Selects the precomputed whole-texture UV table for a flip state.
pub fn uv_table(flip: FlipFlags) -> &'static UvSet {
    let horizontal = flip.contains(FlipFlags::HORIZONTAL);
    let vertical = flip.contains(FlipFlags::VERTICAL);
    match (horizontal, vertical) {
        (false, false) => &DEFAULT_UVS,
        (true, false) => &FLIP_HORIZONTAL_UVS,
        (false, true) => &FLIP_VERTICAL_UVS,
        (true, true) => &FLIP_BOTH_UVS,
    }
}

/// UVs for a source rectangle in texture pixels, mirrored per `texture.flip`.
pub fn region_uvs(texture: &Texture, source: Rect) -> UvSet {
    let (width, height) = texture.size();
    let width = width.max(1.0);
    let height = height.max(1.0);

    let mut u0 = source.x / width;
    let mut u1 = source.right() / width;
    let mut v0 = source.y / height;
    let mut v1 = source.bottom() / height;

    if texture.flip.contains(FlipFlags::HORIZONTAL) {
        std::mem::swap(&mut u0, &mut u1);
    }
    if texture.flip.contains(FlipFlags::VERTICAL) {
        std::mem::swap(&mut v0, &mut v1);
    }

    [[u0, v0], [u0, v1], [u1, v1], [u1, v0]]
}

fn vertex(position: Vec2, uv: [f32; 2], color: [f32; 4], slot: f32) -> Vertex {
    Vertex {
        position: position.into(),
        color,
        uv,
        texture_slot: slot,
    }
}

fn from_corners(corners: [Vec2; 4], uvs: &UvSet, color: [f32; 4], slot: u32) -> [Vertex; 4] {
    let slot = slot as f32;
    [
        vertex(corners[0], uvs[0], color, slot),
        vertex(corners[1], uvs[1], color, slot),
        vertex(corners[2], uvs[2], color, slot),
        vertex(corners[3], uvs[3], color, slot),
    ]
}

/// Axis-aligned textured quad covering `dest`.
pub fn textured_quad(dest: Rect, uvs: &UvSet, color: [f32; 4], slot: u32) -> [Vertex; 4] {
    from_corners(dest.corners(), uvs, color, slot)
}

/// Textured quad covering `dest`, rotated by `degrees` around `origin`.
///
/// A zero angle takes the same path as [`textured_quad`] without touching any
/// trigonometry.
pub fn rotated_quad(
    dest: Rect,
    origin: Vec2,
    degrees: f32,
    uvs: &UvSet,
    color: [f32; 4],
    slot: u32,
) -> [Vertex; 4] {
    if degrees == 0.0 {
        return textured_quad(dest, uvs, color, slot);
    }
    let (sin, cos) = degrees.to_radians().sin_cos();
    let corners = dest.corners().map(|c| c.rotate_about(origin, sin, cos));
    from_corners(corners, uvs, color, slot)
}

/// Flat colored rectangle. Slot 0 tells the shader to ignore the UVs.
pub fn rect_quad(dest: Rect, color: [f32; 4]) -> [Vertex; 4] {
    from_corners(dest.corners(), &DEFAULT_UVS, color, 0)
}

/// Center of `dest`, the default rotation origin.
pub fn center_of(dest: Rect) -> Vec2 {
    Vec2::new(dest.x + dest.width / 2.0, dest.y + dest.height / 2.0)
}
