//! Support for decoding critter animation pages (`CR*` files).
//!
//! Structurally similar to `.GR` sprites but a distinct codec: a page starts
//! with a slot directory mapping creature slots to animations, animation
//! segments of 8 frame indices each, its own 32-entry auxiliary palettes,
//! and then an offset table over frame-header-prefixed pixel data.
//!
//! Frames are compressed with the same repeat/run scheme as sprites but
//! using 5-bit codes out of an MSB-first bit buffer, and rows are stored
//! top-to-bottom -- no vertical flip, unlike `.GR`. Both differences are
//! facts of the shipped data, not choices.

use std::io::Cursor;

use anyhow::{Context, Result, bail};
use binrw::BinRead;
use bytes::Bytes;
use image::RgbaImage;
use tracing::warn;

use crate::format::buffer::FileBuffer;
use crate::format::graphics::palette::Palette;
use crate::format::graphics::rle::{self, QuintetReader};

/// Frame compression byte for the 5-bit RLE scheme; the only one the data
/// uses.
const COMPRESSION_RLE5: u8 = 0x06;

pub const CRITTER_AUX_COLORS: usize = 32;

/// An unused entry in the slot or segment tables.
pub const UNUSED: u8 = 0xFF;

#[derive(BinRead, Debug, Clone, Copy)]
#[br(little)]
struct FrameHeader {
    width: u8,
    height: u8,
    hotspot_x: u8,
    hotspot_y: u8,
    compression: u8,
    /// Payload length in 5-bit codes.
    data_size: u16,
}

/// One animation frame: header fields plus the raw RLE payload.
#[derive(Debug, Clone)]
pub struct CritterFrame {
    pub index: u16,
    pub width: u8,
    pub height: u8,
    pub hotspot_x: u8,
    pub hotspot_y: u8,
    pub compression: u8,
    pub data: Bytes,
}

/// One critter page: directory plus frames. Frames that failed to parse stay
/// as `None` so segment frame indices keep lining up.
#[derive(Debug)]
pub struct CritterPage {
    pub slot_base: u8,
    /// Slot → animation segment index; [`UNUSED`] entries are holes.
    pub slots: Vec<u8>,
    /// Animation segments, 8 frame indices each.
    pub segments: Vec<[u8; 8]>,
    aux_palettes: Vec<[u8; CRITTER_AUX_COLORS]>,
    frames: Vec<Option<CritterFrame>>,
}

impl CritterPage {
    pub fn parse(data: Bytes) -> Result<CritterPage> {
        let buf = FileBuffer::new(data.clone());
        let mut cur = Cursor::new(data.as_ref());

        let slot_base = u8::read_le(&mut cur).context("Reading slot base")?;
        let slot_count = u8::read_le(&mut cur).context("Reading slot count")?;
        let mut slots = Vec::with_capacity(slot_count as usize);
        for _ in 0..slot_count {
            slots.push(u8::read_le(&mut cur).context("Reading slot table")?);
        }

        let segment_count = u8::read_le(&mut cur).context("Reading segment count")?;
        let mut segments = Vec::with_capacity(segment_count as usize);
        for i in 0..segment_count {
            segments.push(
                <[u8; 8]>::read_le(&mut cur).with_context(|| format!("Reading segment {i}"))?,
            );
        }

        let aux_count = u8::read_le(&mut cur).context("Reading aux palette count")?;
        let mut aux_palettes = Vec::with_capacity(aux_count as usize);
        for i in 0..aux_count {
            aux_palettes.push(
                <[u8; CRITTER_AUX_COLORS]>::read_le(&mut cur)
                    .with_context(|| format!("Reading aux palette {i}"))?,
            );
        }

        let frame_count = u16::read_le(&mut cur).context("Reading frame count")?;
        let mut offsets = Vec::with_capacity(frame_count as usize);
        for i in 0..frame_count {
            offsets
                .push(u16::read_le(&mut cur).with_context(|| format!("Reading frame {i} offset"))?);
        }

        let mut frames = Vec::with_capacity(frame_count as usize);
        for (i, offset) in offsets.into_iter().enumerate() {
            match parse_frame(&buf, i as u16, offset as usize) {
                Ok(frame) => frames.push(Some(frame)),
                Err(err) => {
                    warn!(index = i, "skipping undecodable critter frame: {:#}", err);
                    frames.push(None);
                }
            }
        }

        Ok(CritterPage {
            slot_base,
            slots,
            segments,
            aux_palettes,
            frames,
        })
    }

    pub fn aux_palette(&self, index: usize) -> Option<&[u8; CRITTER_AUX_COLORS]> {
        self.aux_palettes.get(index)
    }

    pub fn aux_palette_count(&self) -> usize {
        self.aux_palettes.len()
    }

    pub fn frame(&self, index: u16) -> Option<&CritterFrame> {
        self.frames.get(index as usize)?.as_ref()
    }

    pub fn frames(&self) -> impl Iterator<Item = &CritterFrame> {
        self.frames.iter().flatten()
    }
}

fn parse_frame(buf: &FileBuffer, index: u16, offset: usize) -> Result<CritterFrame> {
    let header_bytes = buf.slice(offset, 7)?;
    let header = FrameHeader::read_le(&mut Cursor::new(header_bytes.as_ref()))
        .context("Reading frame header")?;
    // 5-bit codes, packed
    let payload_len = (header.data_size as usize * 5).div_ceil(8);
    let data = buf.slice(offset + 7, payload_len)?;
    Ok(CritterFrame {
        index,
        width: header.width,
        height: header.height,
        hotspot_x: header.hotspot_x,
        hotspot_y: header.hotspot_y,
        compression: header.compression,
        data,
    })
}

impl CritterFrame {
    pub fn expected_pixels(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Decode into RGBA through one of the page's 32-entry aux palettes.
    /// Rows come out in stored order (top-down). Raw index 0 is transparent.
    pub fn decode(
        &self,
        palette: &Palette,
        aux_palette: &[u8; CRITTER_AUX_COLORS],
    ) -> Result<RgbaImage> {
        if self.compression != COMPRESSION_RLE5 {
            bail!("unknown frame compression {:#04x}", self.compression);
        }
        let mut image = RgbaImage::new(self.width as u32, self.height as u32);
        if self.width == 0 || self.height == 0 {
            return Ok(image);
        }
        let indices = rle::decode(&mut QuintetReader::new(&self.data), self.expected_pixels());
        for (row_index, row) in indices.chunks_exact(self.width as usize).enumerate() {
            for (x, &raw) in row.iter().enumerate() {
                let pixel = if raw == 0 {
                    image::Rgba([0, 0, 0, 0])
                } else {
                    palette.rgba(aux_palette[raw as usize])
                };
                image.put_pixel(x as u32, row_index as u32, pixel);
            }
        }
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::{CritterPage, UNUSED};
    use crate::format::graphics::palette::parse_main_palettes;

    /// Pack 5-bit codes MSB-first.
    fn quintets(codes: &[u16]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut acc = 0u32;
        let mut acc_bits = 0;
        for &code in codes {
            acc = (acc << 5) | code as u32;
            acc_bits += 5;
            while acc_bits >= 8 {
                acc_bits -= 8;
                out.push((acc >> acc_bits) as u8);
            }
        }
        if acc_bits > 0 {
            out.push((acc << (8 - acc_bits)) as u8);
        }
        out
    }

    fn page(frame_codes: &[&[u16]]) -> Bytes {
        let mut data = vec![
            0x40, // slot base
            2,    // 2 slots
            0,
            UNUSED,
            1, // 1 segment
            0,
            1,
            UNUSED,
            UNUSED,
            UNUSED,
            UNUSED,
            UNUSED,
            UNUSED,
            1, // 1 aux palette
        ];
        // aux palette: entry n maps to main index 0x20 + n
        data.extend((0..32).map(|n| 0x20 + n as u8));
        data.extend_from_slice(&(frame_codes.len() as u16).to_le_bytes());
        let mut offset = data.len() + frame_codes.len() * 2;
        let mut bodies = Vec::new();
        for codes in frame_codes {
            data.extend_from_slice(&(offset as u16).to_le_bytes());
            let payload = quintets(codes);
            let mut body = vec![2, 2, 1, 1, 0x06];
            body.extend_from_slice(&(codes.len() as u16).to_le_bytes());
            body.extend_from_slice(&payload);
            offset += body.len();
            bodies.push(body);
        }
        for body in bodies {
            data.extend_from_slice(&body);
        }
        Bytes::from(data)
    }

    #[test]
    fn parses_directory_and_frames() {
        // 2×2 frame: repeat 3×4, run of 1 literal 0
        let page = CritterPage::parse(page(&[&[3, 4, 1, 0]])).unwrap();
        assert_eq!(page.slot_base, 0x40);
        assert_eq!(page.slots, [0, UNUSED]);
        assert_eq!(page.segments.len(), 1);
        assert_eq!(page.segments[0][..2], [0, 1]);
        assert_eq!(page.aux_palette_count(), 1);

        let frame = page.frame(0).unwrap();
        assert_eq!((frame.width, frame.height), (2, 2));
        assert_eq!((frame.hotspot_x, frame.hotspot_y), (1, 1));
    }

    #[test]
    fn frames_decode_top_down_through_the_aux_palette() {
        // rows stored top-down: [7, 7], [7, 0]
        let page = CritterPage::parse(page(&[&[3, 7, 1, 0]])).unwrap();
        let palette = {
            let mut pal = vec![0u8; 768];
            pal[(0x20 + 7) * 3] = 63;
            parse_main_palettes(&Bytes::from(pal)).unwrap().remove(0)
        };

        let frame = page.frame(0).unwrap();
        let image = frame.decode(&palette, page.aux_palette(0).unwrap()).unwrap();
        // no flip: the repeat run fills the *top* row first
        assert_eq!(image.get_pixel(0, 0).0, [252, 0, 0, 255]);
        assert_eq!(image.get_pixel(1, 1).0, [0, 0, 0, 0]);
    }

    #[test]
    fn nonsense_payload_size_skips_the_frame() {
        // data_size claims 200 codes but the file ends right after the header
        let mut raw = page(&[&[3, 4, 1, 0]]).to_vec();
        let len = raw.len();
        raw[len - 5] = 200; // patch the frame's data_size low byte
        let page = CritterPage::parse(Bytes::from(raw)).unwrap();
        assert!(page.frame(0).is_none());
    }
}
