//! Support for decoding `.GR` sprite containers (`OBJECTS.GR`, `TMOBJ.GR`,
//! cursors, switches, ...).
//!
//! A `.GR` file is an offset table over bitmap-header-prefixed images. Three
//! bitmap encodings exist: 8-bit uncompressed, 4-bit uncompressed and 4-bit
//! RLE; the 4-bit ones go through a 16-entry auxiliary palette. Pixel index 0
//! is transparent in every encoding.
//!
//! Rows are stored bottom-to-top, so decoding flips vertically. Critter
//! frames are the other way around -- see [`super::critter`] -- and mixing
//! the two conventions up produces upside-down images, not errors.

use anyhow::{Context, Result, bail};
use bytes::Bytes;
use image::RgbaImage;
use tracing::warn;

use crate::format::buffer::FileBuffer;
use crate::format::graphics::palette::{AuxPalette, Palette};
use crate::format::graphics::rle::{self, NibbleReader};

/// Bitmap encoding, from the first header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitmapType {
    /// One palette index byte per pixel.
    Uncompressed8 = 0x04,
    /// RLE-compressed nibble stream through an aux palette.
    Rle4 = 0x08,
    /// Packed nibbles through an aux palette.
    Uncompressed4 = 0x0A,
}

/// One sprite: decode metadata plus the raw pre-decode payload.
#[derive(Debug, Clone)]
pub struct SpriteImage {
    pub index: u16,
    pub width: u8,
    pub height: u8,
    pub bitmap_type: BitmapType,
    /// Auxiliary palette selector; only present for the 4-bit encodings.
    pub aux_palette: Option<u8>,
    pub data: Bytes,
}

/// A parsed `.GR` container. Sprites that failed to decode are carried as
/// `None` so indices keep lining up with the game's object ids.
#[derive(Debug)]
pub struct SpriteFile {
    pub format: u8,
    sprites: Vec<Option<SpriteImage>>,
}

impl SpriteFile {
    pub fn parse(data: Bytes) -> Result<SpriteFile> {
        let buf = FileBuffer::new(data);
        let format = buf.u8_at(0).context("Reading sprite file format byte")?;
        let count = buf.u16_at(1).context("Reading sprite count")?;

        let mut sprites = Vec::with_capacity(count as usize);
        for index in 0..count {
            let offset = buf
                .u32_at(3 + index as usize * 4)
                .with_context(|| format!("Reading offset of sprite {index}"))?;
            match parse_bitmap(&buf, index, offset as usize) {
                Ok(sprite) => sprites.push(Some(sprite)),
                Err(err) => {
                    // one bad sprite must not abort the rest of the file
                    warn!(index, "skipping undecodable sprite: {:#}", err);
                    sprites.push(None);
                }
            }
        }

        Ok(SpriteFile { format, sprites })
    }

    pub fn len(&self) -> usize {
        self.sprites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sprites.is_empty()
    }

    pub fn get(&self, index: u16) -> Option<&SpriteImage> {
        self.sprites.get(index as usize)?.as_ref()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SpriteImage> {
        self.sprites.iter().flatten()
    }
}

fn parse_bitmap(buf: &FileBuffer, index: u16, offset: usize) -> Result<SpriteImage> {
    let bitmap_type = match buf.u8_at(offset)? {
        0x04 => BitmapType::Uncompressed8,
        0x08 => BitmapType::Rle4,
        0x0A => BitmapType::Uncompressed4,
        other => bail!("unknown bitmap type {:#04x}", other),
    };
    let width = buf.u8_at(offset + 1)?;
    let height = buf.u8_at(offset + 2)?;
    let pixels = width as usize * height as usize;

    let (aux_palette, data) = match bitmap_type {
        BitmapType::Uncompressed8 => {
            // the stored data size is redundant for this encoding
            (None, buf.slice(offset + 5, pixels)?)
        }
        BitmapType::Uncompressed4 | BitmapType::Rle4 => {
            let aux = buf.u8_at(offset + 3)?;
            // the data size field counts nibbles
            let nibbles = buf.u16_at(offset + 4)? as usize;
            (Some(aux), buf.slice(offset + 6, nibbles.div_ceil(2))?)
        }
    };

    Ok(SpriteImage {
        index,
        width,
        height,
        bitmap_type,
        aux_palette,
        data,
    })
}

impl SpriteImage {
    pub fn expected_pixels(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Raw palette indices in file order (bottom row first).
    fn indices(&self) -> Vec<u8> {
        match self.bitmap_type {
            BitmapType::Uncompressed8 => self.data.to_vec(),
            BitmapType::Uncompressed4 => {
                let mut reader = NibbleReader::new(&self.data);
                let mut out = Vec::with_capacity(self.expected_pixels());
                while out.len() < self.expected_pixels() {
                    let Some(code) = rle::CodeReader::next(&mut reader) else {
                        break;
                    };
                    out.push(code as u8);
                }
                out.resize(self.expected_pixels(), 0);
                out
            }
            BitmapType::Rle4 => rle::decode(
                &mut NibbleReader::new(&self.data),
                self.expected_pixels(),
            ),
        }
    }

    /// Decode into RGBA, flipping the bottom-up rows. 4-bit pixels go
    /// through the sprite's auxiliary palette; raw index 0 stays transparent
    /// either way.
    pub fn decode(&self, palette: &Palette, aux_palettes: &[AuxPalette]) -> Result<RgbaImage> {
        let aux = match self.aux_palette {
            Some(aux) => Some(
                aux_palettes
                    .get(aux as usize)
                    .with_context(|| format!("aux palette {aux} out of range"))?,
            ),
            None => None,
        };

        let width = self.width as usize;
        let height = self.height as usize;
        let mut image = RgbaImage::new(self.width as u32, self.height as u32);
        if width == 0 || height == 0 {
            return Ok(image);
        }
        let indices = self.indices();
        for (row_index, row) in indices.chunks_exact(width).enumerate().take(height) {
            // bottom-up storage
            let y = (height - 1 - row_index) as u32;
            for (x, &raw) in row.iter().enumerate() {
                let pixel = if raw == 0 {
                    image::Rgba([0, 0, 0, 0])
                } else {
                    let main_index = match aux {
                        Some(aux) => *aux
                            .indices
                            .get(raw as usize)
                            .with_context(|| format!("pixel value {raw} outside the aux palette"))?,
                        None => raw,
                    };
                    palette.rgba(main_index)
                };
                image.put_pixel(x as u32, y, pixel);
            }
        }
        Ok(image)
    }
}
