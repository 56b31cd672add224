use bitflags::bitflags;

/// Opaque identifier of a texture owned by a backend. Zero means "no texture".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub(crate) u32);

impl TextureId {
    pub const NULL: Self = Self(0);

    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

bitflags! {
    /// Mirroring applied when a texture is sampled.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct FlipFlags: u32 {
        const HORIZONTAL = 1;
        const VERTICAL = 2;
    }
}

/// A texture as seen by the batch renderer: identity, pixel size and flip state.
///
/// The batch only reads these fields; the loader that produced the texture owns
/// the GPU resource behind `id`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Texture {
    pub id: TextureId,
    pub width: u32,
    pub height: u32,
    pub flip: FlipFlags,
}

impl Texture {
    pub fn new(id: TextureId, width: u32, height: u32) -> Self {
        Self {
            id,
            width,
            height,
            flip: FlipFlags::empty(),
        }
    }

    /// Returns a copy carrying the given flip flags.
    #[must_use]
    pub fn flipped(mut self, flip: FlipFlags) -> Self {
        self.flip = flip;
        self
    }

    /// True when the texture stands for a failed load and draws should be skipped.
    pub fn is_null(&self) -> bool {
        self.id.is_null()
    }

    pub fn size(&self) -> (f32, f32) {
        (self.width as f32, self.height as f32)
    }
}
