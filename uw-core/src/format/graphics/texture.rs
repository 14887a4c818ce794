//! Support for decoding `.TR` wall/floor texture containers.
//!
//! The simplest of the graphics formats: square 8-bit bitmaps behind an
//! offset table, no compression, no header per bitmap, rows top-to-bottom.
//! Textures tile the world geometry, so there is no transparent index.

use anyhow::{Context, Result};
use bytes::Bytes;
use image::RgbaImage;
use tracing::warn;

use crate::format::buffer::FileBuffer;
use crate::format::graphics::palette::Palette;

#[derive(Debug)]
pub struct TextureFile {
    pub format: u8,
    /// Edge length; all textures in a file are square and equally sized.
    pub size: u8,
    textures: Vec<Option<Bytes>>,
}

impl TextureFile {
    pub fn parse(data: Bytes) -> Result<TextureFile> {
        let buf = FileBuffer::new(data);
        let format = buf.u8_at(0).context("Reading texture file format byte")?;
        let size = buf.u8_at(1).context("Reading texture size")?;
        let count = buf.u16_at(2).context("Reading texture count")?;
        let pixels = size as usize * size as usize;

        let mut textures = Vec::with_capacity(count as usize);
        for index in 0..count {
            let offset = buf
                .u32_at(4 + index as usize * 4)
                .with_context(|| format!("Reading offset of texture {index}"))?;
            match buf.slice(offset as usize, pixels) {
                Ok(data) => textures.push(Some(data)),
                Err(err) => {
                    warn!(index, "skipping truncated texture: {err}");
                    textures.push(None);
                }
            }
        }

        Ok(TextureFile {
            format,
            size,
            textures,
        })
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    /// Decode one texture. Fully opaque; rows are already top-down.
    pub fn decode(&self, index: u16, palette: &Palette) -> Option<RgbaImage> {
        let data = self.textures.get(index as usize)?.as_ref()?;
        let size = self.size as u32;
        let mut image = RgbaImage::new(size, size);
        for (i, &raw) in data.iter().enumerate() {
            let x = i as u32 % size;
            let y = i as u32 / size;
            image.put_pixel(x, y, palette.rgba_opaque(raw));
        }
        Some(image)
    }
}
