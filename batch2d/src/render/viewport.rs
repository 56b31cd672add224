//! Mapping between the virtual (design) resolution and the physical window.
//!
//! The mapper owns the OS viewport rectangle and the orthographic projection
//! the batch uploads on every `end`, and inverts the same mapping for pointer
//! coordinates so that picking agrees with what was drawn.

use glam::Mat4;
use serde::{Deserialize, Serialize};

use crate::math::{orthographic, Rect, Vec2};

/// How the virtual resolution is fitted to the window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StretchMode {
    /// Draw 1:1 in window pixels; the virtual size follows the window.
    None,
    /// Keep the OS viewport at full window size and letterbox the projection.
    StretchProjection,
    /// Shrink the OS viewport to the letterboxed rectangle.
    #[default]
    StretchViewport,
}

/// Which dimension is authoritative when letterboxing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AspectMode {
    /// No letterboxing; the virtual area is stretched over the whole window.
    None,
    /// Largest rectangle of the virtual aspect that fits inside the window.
    #[default]
    Keep,
    /// Full window width; height follows the aspect and may be cropped.
    KeepWidth,
    /// Full window height; width follows the aspect and may be cropped.
    KeepHeight,
}

/// A rectangle in whole physical pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ViewportRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl ViewportRect {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }

    pub fn to_rect(&self) -> Rect {
        Rect::new(
            self.x as f32,
            self.y as f32,
            self.width as f32,
            self.height as f32,
        )
    }

    /// Intersection with a `width` x `height` surface anchored at the origin.
    pub fn clip_to(&self, (width, height): (u32, u32)) -> Self {
        let x0 = self.x.max(0);
        let y0 = self.y.max(0);
        let x1 = (self.x + self.width as i32).min(width as i32);
        let y1 = (self.y + self.height as i32).min(height as i32);
        Self {
            x: x0,
            y: y0,
            width: (x1 - x0).max(1) as u32,
            height: (y1 - y0).max(1) as u32,
        }
    }

    fn from_rect(rect: Rect) -> Self {
        Self {
            x: rect.x.round() as i32,
            y: rect.y.round() as i32,
            width: rect.width.round().max(1.0) as u32,
            height: rect.height.round().max(1.0) as u32,
        }
    }
}

/// Fits a rectangle of `aspect` (width / height) inside `outer`, centered.
///
/// `Keep` tries the full width first and falls back to the full height when the
/// derived height would not fit.
pub fn letterbox(outer_width: f32, outer_height: f32, aspect: f32, mode: AspectMode) -> Rect {
    let (width, height) = match mode {
        AspectMode::None => (outer_width, outer_height),
        AspectMode::Keep => {
            let height = outer_width / aspect;
            if height > outer_height {
                (outer_height * aspect, outer_height)
            } else {
                (outer_width, height)
            }
        }
        AspectMode::KeepWidth => (outer_width, outer_width / aspect),
        AspectMode::KeepHeight => (outer_height * aspect, outer_height),
    };
    Rect::new(
        (outer_width - width) / 2.0,
        (outer_height - height) / 2.0,
        width,
        height,
    )
}

/// Viewport and projection state for one render surface.
#[derive(Clone, Debug)]
pub struct ViewportMapper {
    stretch: StretchMode,
    aspect: AspectMode,
    design: Rect,
    physical: (u32, u32),
    viewport: ViewportRect,
    content: Rect,
    projection: Mat4,
}

impl ViewportMapper {
    /// Creates a mapper for a virtual rectangle; the window starts at the same size.
    pub fn new(virtual_x: f32, virtual_y: f32, virtual_width: u32, virtual_height: u32) -> Self {
        let width = virtual_width.max(1);
        let height = virtual_height.max(1);
        let mut mapper = Self {
            stretch: StretchMode::default(),
            aspect: AspectMode::default(),
            design: Rect::new(virtual_x, virtual_y, width as f32, height as f32),
            physical: (width, height),
            viewport: ViewportRect::new(0, 0, width, height),
            content: Rect::new(0.0, 0.0, width as f32, height as f32),
            projection: Mat4::IDENTITY,
        };
        mapper.recompute();
        mapper
    }

    pub fn stretch_mode(&self) -> StretchMode {
        self.stretch
    }

    pub fn aspect_mode(&self) -> AspectMode {
        self.aspect
    }

    pub fn set_stretch_mode(&mut self, mode: StretchMode) {
        if self.stretch != mode {
            log::info!("viewport stretch mode {:?} -> {:?}", self.stretch, mode);
            self.stretch = mode;
            self.recompute();
        }
    }

    pub fn set_aspect_mode(&mut self, mode: AspectMode) {
        if self.aspect != mode {
            log::info!("viewport aspect mode {:?} -> {:?}", self.aspect, mode);
            self.aspect = mode;
            self.recompute();
        }
    }

    /// Window resize notification. Zero sizes are treated as one pixel.
    pub fn resize(&mut self, physical_width: u32, physical_height: u32) {
        self.physical = (physical_width.max(1), physical_height.max(1));
        self.recompute();
    }

    /// Changes the design resolution. Zero sizes are treated as one unit.
    pub fn set_virtual_resolution(&mut self, width: u32, height: u32) {
        self.design.width = width.max(1) as f32;
        self.design.height = height.max(1) as f32;
        self.recompute();
    }

    pub fn set_virtual_origin(&mut self, x: f32, y: f32) {
        self.design.x = x;
        self.design.y = y;
        self.recompute();
    }

    pub fn physical_size(&self) -> (u32, u32) {
        self.physical
    }

    /// The virtual rectangle currently in effect.
    ///
    /// Under [`StretchMode::None`] this is the window itself.
    pub fn virtual_rect(&self) -> Rect {
        match self.stretch {
            StretchMode::None => {
                Rect::new(0.0, 0.0, self.physical.0 as f32, self.physical.1 as f32)
            }
            _ => self.design,
        }
    }

    /// OS viewport rectangle in window pixels.
    pub fn viewport_rect(&self) -> ViewportRect {
        self.viewport
    }

    /// Where the virtual rectangle lands in window pixels.
    ///
    /// `KeepWidth` and `KeepHeight` can push it past the window edges; the
    /// viewport then covers only the visible part.
    pub fn content_rect(&self) -> Rect {
        self.content
    }

    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    /// Window pixels per virtual unit along each axis.
    pub fn scale(&self) -> Vec2 {
        let virt = self.virtual_rect();
        Vec2::new(self.content.width / virt.width, self.content.height / virt.height)
    }

    /// Maps a window-space pointer position to virtual coordinates.
    pub fn screen_to_virtual(&self, screen: Vec2) -> Vec2 {
        let virt = self.virtual_rect();
        let scale = self.scale();
        Vec2::new(
            virt.x + (screen.x - self.content.x) / scale.x,
            virt.y + (screen.y - self.content.y) / scale.y,
        )
    }

    /// Maps virtual coordinates back to window pixels.
    pub fn virtual_to_screen(&self, point: Vec2) -> Vec2 {
        let virt = self.virtual_rect();
        let scale = self.scale();
        Vec2::new(
            self.content.x + (point.x - virt.x) * scale.x,
            self.content.y + (point.y - virt.y) * scale.y,
        )
    }

    fn recompute(&mut self) {
        let (width, height) = (self.physical.0 as f32, self.physical.1 as f32);
        let window = Rect::new(0.0, 0.0, width, height);
        let design = self.design;
        let aspect = design.width / design.height;

        match self.stretch {
            StretchMode::None => {
                self.viewport = ViewportRect::new(0, 0, self.physical.0, self.physical.1);
                self.content = window;
                self.projection = orthographic(0.0, width, height, 0.0);
            }
            StretchMode::StretchViewport => {
                let boxed = ViewportRect::from_rect(letterbox(width, height, aspect, self.aspect));
                self.content = boxed.to_rect();
                self.viewport = boxed.clip_to(self.physical);
                // Overscan past the window edge is cut from the projection, not squeezed.
                let visible = self.viewport.to_rect();
                let sx = self.content.width / design.width;
                let sy = self.content.height / design.height;
                let left = design.x + (visible.x - self.content.x) / sx;
                let top = design.y + (visible.y - self.content.y) / sy;
                self.projection = orthographic(
                    left,
                    left + visible.width / sx,
                    top + visible.height / sy,
                    top,
                );
            }
            StretchMode::StretchProjection => {
                let boxed = letterbox(width, height, aspect, self.aspect);
                let sx = boxed.width / design.width;
                let sy = boxed.height / design.height;
                let left = design.x - boxed.x / sx;
                let top = design.y - boxed.y / sy;
                self.viewport = ViewportRect::new(0, 0, self.physical.0, self.physical.1);
                self.content = boxed;
                self.projection = orthographic(left, left + width / sx, top + height / sy, top);
            }
        }
    }
}
