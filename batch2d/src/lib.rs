//! Batch2D - a 2D sprite batch renderer with virtual-resolution viewport mapping.
//!
//! Draw calls issued between `begin` and `end` are packed into one vertex
//! stream and submitted with as few draws as the 16 texture units allow.

pub mod assets;
pub mod config;
pub mod engine;
pub mod error;
pub mod input;
pub mod math;
pub mod render;

pub use crate::assets::{AssetManager, TextureLoader};
pub use crate::config::{BatchConfig, EngineConfig, OverflowPolicy};
pub use crate::engine::{Engine, EngineContext, Game};
pub use crate::error::{BatchError, BatchResult};
pub use crate::input::InputState;
pub use crate::math::{Color, Rect, Vec2};
pub use crate::render::{
    AspectMode, BatchRenderer, BeginOptions, FlipFlags, Font, HeadlessBackend, StretchMode,
    Texture, TextureId, WgpuBackend,
};
pub use winit::{event::MouseButton, keyboard::KeyCode};
