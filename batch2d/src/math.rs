use glam::{Mat4, Vec2 as GlamVec2};
use serde::{Deserialize, Serialize};

/// 2D vector type used throughout Batch2D.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };
    pub const ONE: Self = Self { x: 1.0, y: 1.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn to_glam(&self) -> GlamVec2 {
        GlamVec2::new(self.x, self.y)
    }

    /// Computes the distance between two points.
    pub fn distance(self, rhs: Self) -> f32 {
        (self - rhs).length()
    }

    /// Rotates this point around `origin` by a precomputed sine/cosine pair.
    pub fn rotate_about(self, origin: Self, sin: f32, cos: f32) -> Self {
        let dx = self.x - origin.x;
        let dy = self.y - origin.y;
        Self::new(
            cos * dx - sin * dy + origin.x,
            sin * dx + cos * dy + origin.y,
        )
    }
}

impl From<(f32, f32)> for Vec2 {
    fn from(value: (f32, f32)) -> Self {
        Self {
            x: value.0,
            y: value.1,
        }
    }
}

impl From<Vec2> for [f32; 2] {
    fn from(value: Vec2) -> Self {
        [value.x, value.y]
    }
}

impl std::ops::Add for Vec2 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl std::ops::Sub for Vec2 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl std::ops::Mul<f32> for Vec2 {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self::Output {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

impl std::ops::Div<f32> for Vec2 {
    type Output = Self;

    fn div(self, rhs: f32) -> Self::Output {
        Self::new(self.x / rhs, self.y / rhs)
    }
}

/// Axis-aligned rectangle in pixel or logical units (top-left origin).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= self.x && point.x < self.right() && point.y >= self.y && point.y < self.bottom()
    }

    /// Corners in emission order: top-left, bottom-left, bottom-right, top-right.
    pub fn corners(&self) -> [Vec2; 4] {
        [
            Vec2::new(self.x, self.y),
            Vec2::new(self.x, self.bottom()),
            Vec2::new(self.right(), self.bottom()),
            Vec2::new(self.right(), self.y),
        ]
    }
}

/// RGBA color with 0..=255 channels, the unit callers tint with.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Self = Self::rgba(255.0, 255.0, 255.0, 255.0);
    pub const BLACK: Self = Self::rgba(0.0, 0.0, 0.0, 255.0);
    pub const RED: Self = Self::rgba(255.0, 0.0, 0.0, 255.0);
    pub const GREEN: Self = Self::rgba(0.0, 255.0, 0.0, 255.0);
    pub const BLUE: Self = Self::rgba(0.0, 0.0, 255.0, 255.0);

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self::rgba(r, g, b, 255.0)
    }

    /// Channels divided by 255, as written into vertices.
    pub fn normalized(&self) -> [f32; 4] {
        [self.r / 255.0, self.g / 255.0, self.b / 255.0, self.a / 255.0]
    }

    /// Packs into `0xAABBGGRR`.
    pub fn to_u32(&self) -> u32 {
        let channel = |v: f32| v.clamp(0.0, 255.0) as u32;
        channel(self.a) << 24 | channel(self.b) << 16 | channel(self.g) << 8 | channel(self.r)
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

/// Orthographic projection over a top-left origin rectangle, y pointing down.
pub fn orthographic(left: f32, right: f32, bottom: f32, top: f32) -> Mat4 {
    Mat4::orthographic_rh_gl(left, right, bottom, top, -10.0, 10.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_normalizes_by_255() {
        assert_eq!(Color::RED.normalized(), [1.0, 0.0, 0.0, 1.0]);
        let half = Color::rgba(51.0, 102.0, 204.0, 0.0).normalized();
        assert!((half[0] - 0.2).abs() < 1e-6);
        assert!((half[1] - 0.4).abs() < 1e-6);
        assert!((half[2] - 0.8).abs() < 1e-6);
        assert_eq!(half[3], 0.0);
    }

    #[test]
    fn color_packs_abgr() {
        assert_eq!(Color::rgba(1.0, 2.0, 3.0, 4.0).to_u32(), 0x04030201);
    }

    #[test]
    fn rect_corners_follow_winding() {
        let corners = Rect::new(10.0, 20.0, 5.0, 8.0).corners();
        assert_eq!(corners[0], Vec2::new(10.0, 20.0));
        assert_eq!(corners[1], Vec2::new(10.0, 28.0));
        assert_eq!(corners[2], Vec2::new(15.0, 28.0));
        assert_eq!(corners[3], Vec2::new(15.0, 20.0));
    }

    #[test]
    fn rotate_quarter_turn() {
        let p = Vec2::new(2.0, 1.0).rotate_about(Vec2::new(1.0, 1.0), 1.0, 0.0);
        assert!(p.distance(Vec2::new(1.0, 2.0)) < 1e-6);
    }

    #[test]
    fn orthographic_maps_corners_to_clip_space() {
        let proj = orthographic(0.0, 800.0, 600.0, 0.0);
        let top_left = proj.project_point3(glam::Vec3::new(0.0, 0.0, 0.0));
        let bottom_right = proj.project_point3(glam::Vec3::new(800.0, 600.0, 0.0));
        assert!((top_left.x + 1.0).abs() < 1e-6 && (top_left.y - 1.0).abs() < 1e-6);
        assert!((bottom_right.x - 1.0).abs() < 1e-6 && (bottom_right.y + 1.0).abs() < 1e-6);
    }
}
