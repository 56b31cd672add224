use super::texture::TextureId;

/// Texture units a single submission may reference.
pub const MAX_TEXTURE_SLOTS: usize = 16;

/// Per-batch mapping from texture identity to a 1-based slot.
///
/// Slot 0 is reserved for untextured quads and never handed out. Lookups are a
/// linear scan; the table never holds more than [`MAX_TEXTURE_SLOTS`] entries.
#[derive(Clone, Debug)]
pub struct TextureSlotTable {
    textures: [TextureId; MAX_TEXTURE_SLOTS],
    count: usize,
}

impl TextureSlotTable {
    pub fn new() -> Self {
        Self {
            textures: [TextureId::NULL; MAX_TEXTURE_SLOTS],
            count: 0,
        }
    }

    pub fn clear(&mut self) {
        self.count = 0;
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count == MAX_TEXTURE_SLOTS
    }

    /// Slot already assigned to `texture` in this batch.
    pub fn lookup(&self, texture: TextureId) -> Option<u32> {
        self.textures[..self.count]
            .iter()
            .position(|&t| t == texture)
            .map(|i| i as u32 + 1)
    }

    /// Returns the slot for `texture`, inserting it if absent.
    ///
    /// `None` means the texture is new and the table is full; the caller must
    /// flush and retry against a cleared table.
    pub fn submit(&mut self, texture: TextureId) -> Option<u32> {
        if let Some(slot) = self.lookup(texture) {
            return Some(slot);
        }
        if self.is_full() {
            return None;
        }
        self.textures[self.count] = texture;
        self.count += 1;
        Some(self.count as u32)
    }

    /// `(slot, texture)` pairs in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, TextureId)> + '_ {
        self.textures[..self.count]
            .iter()
            .enumerate()
            .map(|(i, &t)| (i as u32 + 1, t))
    }
}

impl Default for TextureSlotTable {
    fn default() -> Self {
        Self::new()
    }
}
