use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::{BatchError, BatchResult};
use crate::render::{AspectMode, StretchMode};

/// Sprites one batch can hold before it must be submitted.
pub const DEFAULT_MAX_SPRITES: usize = 20_000;

/// What a draw does when the geometry buffer has no room for another quad.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Fail the draw with `GeometryOverflow` and write nothing.
    #[default]
    Error,
    /// Submit what is buffered and continue in a fresh batch.
    Flush,
}

/// Settings for a `BatchRenderer`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub max_sprites: usize,
    pub virtual_x: f32,
    pub virtual_y: f32,
    pub virtual_width: u32,
    pub virtual_height: u32,
    pub stretch_mode: StretchMode,
    pub aspect_mode: AspectMode,
    pub overflow: OverflowPolicy,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_sprites: DEFAULT_MAX_SPRITES,
            virtual_x: 0.0,
            virtual_y: 0.0,
            virtual_width: 960,
            virtual_height: 540,
            stretch_mode: StretchMode::default(),
            aspect_mode: AspectMode::default(),
            overflow: OverflowPolicy::default(),
        }
    }
}

impl BatchConfig {
    /// Config for a virtual rectangle at the origin.
    pub fn new(virtual_width: u32, virtual_height: u32) -> Self {
        Self {
            virtual_width,
            virtual_height,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_virtual_origin(mut self, x: f32, y: f32) -> Self {
        self.virtual_x = x;
        self.virtual_y = y;
        self
    }

    #[must_use]
    pub fn with_max_sprites(mut self, max_sprites: usize) -> Self {
        self.max_sprites = max_sprites;
        self
    }

    #[must_use]
    pub fn with_stretch_mode(mut self, mode: StretchMode) -> Self {
        self.stretch_mode = mode;
        self
    }

    #[must_use]
    pub fn with_aspect_mode(mut self, mode: AspectMode) -> Self {
        self.aspect_mode = mode;
        self
    }

    #[must_use]
    pub fn with_overflow(mut self, policy: OverflowPolicy) -> Self {
        self.overflow = policy;
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("parsing batch config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading batch config {}", path.display()))?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Rejects settings the renderer cannot run with.
    ///
    /// Zero virtual sizes are accepted here and coerced to one downstream.
    pub fn validate(&self) -> BatchResult<()> {
        if self.max_sprites == 0 {
            return Err(BatchError::InvalidConfig(
                "max_sprites must be at least 1".into(),
            ));
        }
        if (self.max_sprites * 4) > u32::MAX as usize {
            return Err(BatchError::InvalidConfig(format!(
                "max_sprites {} exceeds the 32-bit index range",
                self.max_sprites
            )));
        }
        if !self.virtual_x.is_finite() || !self.virtual_y.is_finite() {
            return Err(BatchError::InvalidConfig(
                "virtual origin must be finite".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration values for the engine window and runtime behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub vsync: bool,
    pub batch: BatchConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            title: "Batch2D".into(),
            width: 1280,
            height: 720,
            vsync: true,
            batch: BatchConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_batch_limits() {
        let config = BatchConfig::default();
        assert_eq!(config.max_sprites, 20_000);
        assert_eq!(config.stretch_mode, StretchMode::StretchViewport);
        assert_eq!(config.aspect_mode, AspectMode::Keep);
        assert_eq!(config.overflow, OverflowPolicy::Error);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = BatchConfig::from_json_str(
            r#"{ "virtual_width": 800, "virtual_height": 600, "stretch_mode": "stretch_projection", "overflow": "flush" }"#,
        )
        .unwrap();
        assert_eq!(config.virtual_width, 800);
        assert_eq!(config.virtual_height, 600);
        assert_eq!(config.stretch_mode, StretchMode::StretchProjection);
        assert_eq!(config.overflow, OverflowPolicy::Flush);
        assert_eq!(config.max_sprites, DEFAULT_MAX_SPRITES);
    }

    #[test]
    fn zero_sprites_is_rejected() {
        let err = BatchConfig::from_json_str(r#"{ "max_sprites": 0 }"#).unwrap_err();
        assert!(err.to_string().contains("max_sprites"));
        assert!(BatchConfig::new(10, 10).with_max_sprites(0).validate().is_err());
    }

    #[test]
    fn json_round_trip_keeps_modes() {
        let config = BatchConfig::new(320, 200)
            .with_aspect_mode(AspectMode::KeepHeight)
            .with_virtual_origin(5.0, -5.0);
        let json = config.to_json_string().unwrap();
        assert_eq!(BatchConfig::from_json_str(&json).unwrap(), config);
    }
}
