use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;

use crate::render::{Font, Texture};

/// Anything that can turn image files into batch textures.
pub trait TextureLoader {
    fn load_texture_from_file(&mut self, path: &Path) -> Result<Texture>;
    fn load_texture_from_bytes(&mut self, bytes: &[u8]) -> Result<Texture>;
    fn load_font_from_bytes(&mut self, bytes: &[u8], pixel_size: f32) -> Result<Font>;
    fn dispose_texture(&mut self, texture: &Texture);
}

/// Caches textures and fonts by key so each is uploaded once.
pub struct AssetManager {
    textures: HashMap<String, Texture>,
    fonts: HashMap<String, Font>,
}

impl AssetManager {
    pub fn new() -> Self {
        Self {
            textures: HashMap::new(),
            fonts: HashMap::new(),
        }
    }

    /// Loads a texture from a file path, returning the cached one if the path was seen before.
    pub fn load_texture(&mut self, loader: &mut impl TextureLoader, path: &str) -> Result<Texture> {
        if let Some(texture) = self.textures.get(path) {
            return Ok(*texture);
        }

        let texture = loader.load_texture_from_file(Path::new(path))?;
        log::debug!("loaded texture {path} ({}x{})", texture.width, texture.height);
        self.textures.insert(path.to_string(), texture);
        Ok(texture)
    }

    /// Like [`Self::load_texture`], but a failed load yields a null texture that
    /// every draw call skips.
    pub fn load_texture_or_null(&mut self, loader: &mut impl TextureLoader, path: &str) -> Texture {
        self.load_texture(loader, path).unwrap_or_else(|err| {
            log::warn!("texture {path} failed to load: {err:#}");
            Texture::default()
        })
    }

    /// Loads encoded image bytes, cached under `key`.
    pub fn load_texture_from_bytes(
        &mut self,
        loader: &mut impl TextureLoader,
        key: &str,
        bytes: &[u8],
    ) -> Result<Texture> {
        if let Some(texture) = self.textures.get(key) {
            return Ok(*texture);
        }

        let texture = loader.load_texture_from_bytes(bytes)?;
        self.textures.insert(key.to_string(), texture);
        Ok(texture)
    }

    /// Rasterizes a font from TTF/OTF bytes, cached under `key`.
    ///
    /// The size is part of the first load only; reuse a key per size.
    pub fn load_font_from_bytes(
        &mut self,
        loader: &mut impl TextureLoader,
        key: &str,
        bytes: &[u8],
        pixel_size: f32,
    ) -> Result<&Font> {
        if !self.fonts.contains_key(key) {
            let font = loader.load_font_from_bytes(bytes, pixel_size)?;
            self.fonts.insert(key.to_string(), font);
        }
        self.fonts
            .get(key)
            .ok_or_else(|| anyhow::anyhow!("font {key} missing after load"))
    }

    pub fn get_texture(&self, key: &str) -> Option<Texture> {
        self.textures.get(key).copied()
    }

    pub fn get_font(&self, key: &str) -> Option<&Font> {
        self.fonts.get(key)
    }

    pub fn has_texture(&self, key: &str) -> bool {
        self.textures.contains_key(key)
    }

    /// Drops one texture from the cache and frees it.
    pub fn unload_texture(&mut self, loader: &mut impl TextureLoader, key: &str) {
        if let Some(texture) = self.textures.remove(key) {
            loader.dispose_texture(&texture);
        }
    }

    /// Frees every cached texture and font.
    pub fn clear(&mut self, loader: &mut impl TextureLoader) {
        for (_, texture) in self.textures.drain() {
            loader.dispose_texture(&texture);
        }
        for (_, font) in self.fonts.drain() {
            for texture in font.textures() {
                loader.dispose_texture(&texture);
            }
        }
    }
}

impl Default for AssetManager {
    fn default() -> Self {
        Self::new()
    }
}
