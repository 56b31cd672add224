//! Bitmap fonts for the batch: one texture per ASCII glyph plus a layout walker.

use std::{cell::RefCell, collections::HashSet};

use ab_glyph::{Font as _, FontArc, Glyph as AbGlyph, PxScale, ScaleFont};
use anyhow::{anyhow, Result};

use crate::math::Vec2;

use super::texture::Texture;

/// Characters a font can hold, indexed by ASCII code.
pub const GLYPH_COUNT: usize = 128;

/// Glyph whose top edge defines the shared baseline of a line.
const REFERENCE_GLYPH: char = 'T';

/// Per-character metrics and bitmap.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Glyph {
    /// Bitmap texture; null for glyphs with no ink such as space.
    pub texture: Texture,
    /// Offset from the pen position to the bitmap's left edge (x) and from the
    /// baseline up to its top edge (y).
    pub bearing: Vec2,
    /// Horizontal advance in 26.6 fixed point.
    pub advance: u32,
}

impl Glyph {
    /// Advance in whole pixels.
    pub fn advance_px(&self) -> f32 {
        (self.advance >> 6) as f32
    }
}

/// One positioned glyph produced by [`Font::layout`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlacedGlyph {
    pub texture: Texture,
    pub position: Vec2,
}

/// A fixed ASCII glyph table.
#[derive(Clone, Debug)]
pub struct Font {
    glyphs: Vec<Option<Glyph>>,
    line_height: f32,
    reference_bearing: f32,
    /// Characters already reported as missing.
    missing: RefCell<HashSet<char>>,
}

impl Font {
    /// Builds a font from already uploaded glyphs.
    ///
    /// Characters outside ASCII are ignored.
    pub fn from_glyphs(glyphs: impl IntoIterator<Item = (char, Glyph)>, line_height: f32) -> Self {
        let mut table = vec![None; GLYPH_COUNT];
        for (ch, glyph) in glyphs {
            if ch.is_ascii() {
                table[ch as usize] = Some(glyph);
            }
        }
        let mut font = Self {
            glyphs: table,
            line_height,
            reference_bearing: 0.0,
            missing: RefCell::default(),
        };
        font.reference_bearing = font.compute_reference_bearing();
        font
    }

    /// Rasterizes ASCII 0..127 from TTF/OTF bytes at `pixel_size`.
    ///
    /// `upload` receives white RGBA8 coverage bitmaps and returns the texture
    /// the batch will draw.
    pub fn from_bytes(
        bytes: &[u8],
        pixel_size: f32,
        mut upload: impl FnMut(&[u8], u32, u32) -> Result<Texture>,
    ) -> Result<Self> {
        let font = FontArc::try_from_vec(bytes.to_vec())
            .map_err(|e| anyhow!("Failed to load font: {e}"))?;
        let scale = PxScale::from(pixel_size);
        let scaled = font.as_scaled(scale);

        let mut glyphs = Vec::with_capacity(GLYPH_COUNT);
        for code in 0..GLYPH_COUNT as u8 {
            let ch = code as char;
            let id = font.glyph_id(ch);
            if id.0 == 0 {
                continue;
            }
            let advance = (scaled.h_advance(id).max(0.0) * 64.0).round() as u32;
            let outlined = scaled.outline_glyph(AbGlyph {
                id,
                scale,
                position: ab_glyph::point(0.0, 0.0),
            });

            let glyph = match outlined {
                Some(outlined) => {
                    let bounds = outlined.px_bounds();
                    let width = bounds.width().ceil() as u32;
                    let height = bounds.height().ceil() as u32;
                    if width == 0 || height == 0 {
                        Glyph {
                            advance,
                            ..Glyph::default()
                        }
                    } else {
                        let mut pixels = vec![0u8; (width * height * 4) as usize];
                        outlined.draw(|x, y, coverage| {
                            if x < width && y < height {
                                let idx = ((y * width + x) * 4) as usize;
                                pixels[idx..idx + 3].fill(255);
                                pixels[idx + 3] = (coverage.clamp(0.0, 1.0) * 255.0) as u8;
                            }
                        });
                        Glyph {
                            texture: upload(&pixels, width, height)?,
                            bearing: Vec2::new(bounds.min.x, -bounds.min.y),
                            advance,
                        }
                    }
                }
                None => Glyph {
                    advance,
                    ..Glyph::default()
                },
            };
            glyphs.push((ch, glyph));
        }

        let line_height = (scaled.height() + scaled.line_gap()).ceil();
        log::info!(
            "rasterized {} glyphs at {pixel_size}px (line height {line_height})",
            glyphs.len()
        );
        Ok(Self::from_glyphs(glyphs, line_height))
    }

    pub fn glyph(&self, ch: char) -> Option<&Glyph> {
        if !ch.is_ascii() {
            return None;
        }
        self.glyphs[ch as usize].as_ref()
    }

    pub fn line_height(&self) -> f32 {
        self.line_height
    }

    /// Every texture the font owns, for disposal.
    pub fn textures(&self) -> impl Iterator<Item = Texture> + '_ {
        self.glyphs
            .iter()
            .flatten()
            .map(|g| g.texture)
            .filter(|t| !t.is_null())
    }

    /// Width of the widest line of `text` in pixels.
    pub fn measure(&self, text: &str) -> f32 {
        text.split('\n')
            .map(|line| {
                line.chars()
                    .filter_map(|ch| self.glyph(ch))
                    .map(Glyph::advance_px)
                    .sum::<f32>()
            })
            .fold(0.0, f32::max)
    }

    /// Positions each glyph of `text` with its top-left corner, starting at `origin`.
    pub fn layout<'a>(&'a self, text: &'a str, origin: Vec2) -> GlyphLayout<'a> {
        GlyphLayout {
            font: self,
            chars: text.chars(),
            origin,
            cursor: origin,
        }
    }

    /// Characters `layout` has skipped for lack of a glyph, sorted.
    pub fn missing_glyphs(&self) -> Vec<char> {
        let mut chars: Vec<char> = self.missing.borrow().iter().copied().collect();
        chars.sort_unstable();
        chars
    }

    fn report_missing(&self, ch: char) {
        if self.missing.borrow_mut().insert(ch) {
            log::warn!("no glyph for {ch:?}, skipping");
        }
    }

    fn compute_reference_bearing(&self) -> f32 {
        if let Some(glyph) = self.glyph(REFERENCE_GLYPH) {
            return glyph.bearing.y;
        }
        self.glyphs
            .iter()
            .flatten()
            .map(|g| g.bearing.y)
            .fold(0.0, f32::max)
    }
}

/// Iterator returned by [`Font::layout`].
pub struct GlyphLayout<'a> {
    font: &'a Font,
    chars: std::str::Chars<'a>,
    origin: Vec2,
    cursor: Vec2,
}

impl Iterator for GlyphLayout<'_> {
    type Item = PlacedGlyph;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let ch = self.chars.next()?;
            if ch == '\n' {
                self.cursor.x = self.origin.x;
                self.cursor.y += self.font.line_height;
                continue;
            }
            let Some(glyph) = self.font.glyph(ch) else {
                self.font.report_missing(ch);
                continue;
            };
            let pen = self.cursor;
            self.cursor.x += glyph.advance_px();
            if glyph.texture.is_null() {
                continue;
            }
            let y_offset = ((self.font.reference_bearing - glyph.bearing.y) + 1.0).max(0.0);
            return Some(PlacedGlyph {
                texture: glyph.texture,
                position: Vec2::new(pen.x + glyph.bearing.x, pen.y + y_offset),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::texture::TextureId;

    fn glyph(id: u32, w: u32, h: u32, bearing: (f32, f32), advance_px: u32) -> Glyph {
        Glyph {
            texture: Texture::new(TextureId::new(id), w, h),
            bearing: Vec2::new(bearing.0, bearing.1),
            advance: advance_px << 6,
        }
    }

    fn font() -> Font {
        Font::from_glyphs(
            [
                ('T', glyph(1, 8, 10, (0.0, 10.0), 9)),
                ('o', glyph(2, 6, 6, (1.0, 6.0), 7)),
                ('p', glyph(3, 6, 9, (1.0, 6.0), 7)),
                (' ', Glyph { advance: 4 << 6, ..Glyph::default() }),
            ],
            14.0,
        )
    }

    #[test]
    fn advance_uses_integer_pixels() {
        let g = Glyph {
            advance: (7 << 6) + 40,
            ..Glyph::default()
        };
        assert_eq!(g.advance_px(), 7.0);
    }

    #[test]
    fn baseline_aligns_to_reference_glyph() {
        let font = font();
        let placed: Vec<_> = font.layout("To", Vec2::new(100.0, 50.0)).collect();
        assert_eq!(placed.len(), 2);
        assert_eq!(placed[0].position, Vec2::new(100.0, 51.0));
        // 'o' starts 4px lower than 'T' plus the shared pixel
        assert_eq!(placed[1].position, Vec2::new(110.0, 55.0));
    }

    #[test]
    fn blank_glyphs_advance_without_output() {
        let font = font();
        let placed: Vec<_> = font.layout("T T", Vec2::new(0.0, 0.0)).collect();
        assert_eq!(placed.len(), 2);
        assert_eq!(placed[1].position.x, 13.0);
    }

    #[test]
    fn newline_returns_to_origin() {
        let font = font();
        let placed: Vec<_> = font.layout("T\nT", Vec2::new(5.0, 0.0)).collect();
        assert_eq!(placed[1].position, Vec2::new(5.0, 15.0));
    }

    #[test]
    fn unknown_characters_are_skipped() {
        let font = font();
        let placed: Vec<_> = font.layout("TéT", Vec2::new(0.0, 0.0)).collect();
        assert_eq!(placed.len(), 2);
        assert_eq!(placed[1].position.x, 9.0);
    }

    #[test]
    fn missing_characters_are_reported_once() {
        let font = font();
        assert!(font.missing_glyphs().is_empty());
        for _ in 0..3 {
            let placed = font.layout("T\té\tT", Vec2::new(0.0, 0.0)).count();
            assert_eq!(placed, 2);
        }
        assert_eq!(font.missing_glyphs(), vec!['\t', 'é']);
    }

    #[test]
    fn measure_sums_advances_of_widest_line() {
        let font = font();
        assert_eq!(font.measure("To p"), 27.0);
        assert_eq!(font.measure("T\nTo"), 16.0);
        assert_eq!(font.measure(""), 0.0);
    }

    #[test]
    fn reference_falls_back_to_tallest_glyph() {
        let font = Font::from_glyphs([('o', glyph(2, 6, 6, (0.0, 6.0), 7))], 10.0);
        let placed: Vec<_> = font.layout("o", Vec2::new(0.0, 0.0)).collect();
        assert_eq!(placed[0].position.y, 1.0);
    }
}
