use thiserror::Error;

use crate::render::{ShaderId, TextureId};

/// Errors surfaced by the batch renderer.
///
/// Only integration bugs end up here. Texture-slot exhaustion is handled by an
/// implicit flush and null textures are skipped, so neither is an error.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("begin() called while a batch is already active")]
    AlreadyActive,
    #[error("no active batch; call begin() first")]
    NotActive,
    #[error("geometry buffer full ({capacity} sprites per batch)")]
    GeometryOverflow { capacity: usize },
    #[error("unknown texture {0:?}")]
    UnknownTexture(TextureId),
    #[error("unknown shader {0:?}")]
    UnknownShader(ShaderId),
    #[error("shader has no uniform named `{name}`")]
    UnknownUniform { name: String },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type BatchResult<T> = std::result::Result<T, BatchError>;
