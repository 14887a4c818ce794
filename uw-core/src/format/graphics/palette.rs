//! Palette tables.
//!
//! `PALS.DAT` is a bare concatenation of 256-color VGA palettes, 3 bytes per
//! color with 6-bit components (scaled ×4 here once, at parse time).
//! `ALLPALS.DAT` is a bare concatenation of 16-byte auxiliary palettes that
//! remap 4-bit pixel values into the main palette.

use anyhow::{Result, ensure};
use bytes::Bytes;
use image::Rgba;

pub const PALETTE_COLORS: usize = 256;
const MAIN_PALETTE_LEN: usize = PALETTE_COLORS * 3;

pub const AUX_PALETTE_COLORS: usize = 16;

/// One 256-color main palette, components already scaled to 0..=255.
#[derive(Debug, Clone)]
pub struct Palette {
    colors: [[u8; 3]; PALETTE_COLORS],
}

impl Palette {
    /// Color for a sprite pixel. Index 0 is the transparent index, always
    /// mapped to a fully transparent pixel.
    pub fn rgba(&self, index: u8) -> Rgba<u8> {
        if index == 0 {
            Rgba([0, 0, 0, 0])
        } else {
            self.rgba_opaque(index)
        }
    }

    /// Color without the transparent-index rule (wall textures are opaque).
    pub fn rgba_opaque(&self, index: u8) -> Rgba<u8> {
        let [r, g, b] = self.colors[index as usize];
        Rgba([r, g, b, 0xFF])
    }
}

/// A 16-entry remap into the main palette, used by 4-bit sprites.
#[derive(Debug, Clone, Copy)]
pub struct AuxPalette {
    pub indices: [u8; AUX_PALETTE_COLORS],
}

pub fn parse_main_palettes(data: &Bytes) -> Result<Vec<Palette>> {
    ensure!(
        !data.is_empty() && data.len() % MAIN_PALETTE_LEN == 0,
        "main palette file length {} is not a multiple of {}",
        data.len(),
        MAIN_PALETTE_LEN
    );
    Ok(data
        .chunks_exact(MAIN_PALETTE_LEN)
        .map(|chunk| {
            let mut colors = [[0u8; 3]; PALETTE_COLORS];
            for (color, raw) in colors.iter_mut().zip(chunk.chunks_exact(3)) {
                // 6-bit VGA components
                *color = [raw[0] << 2, raw[1] << 2, raw[2] << 2];
            }
            Palette { colors }
        })
        .collect())
}

pub fn parse_aux_palettes(data: &Bytes) -> Result<Vec<AuxPalette>> {
    ensure!(
        !data.is_empty() && data.len() % AUX_PALETTE_COLORS == 0,
        "aux palette file length {} is not a multiple of {}",
        data.len(),
        AUX_PALETTE_COLORS
    );
    Ok(data
        .chunks_exact(AUX_PALETTE_COLORS)
        .map(|chunk| AuxPalette {
            indices: chunk.try_into().expect("16-byte chunk"),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use image::Rgba;

    use super::{parse_aux_palettes, parse_main_palettes};

    #[test]
    fn scales_six_bit_components() {
        let mut data = vec![0u8; 768];
        // color 1 = full-intensity VGA white
        data[3..6].copy_from_slice(&[63, 63, 63]);
        let palettes = parse_main_palettes(&Bytes::from(data)).unwrap();
        assert_eq!(palettes.len(), 1);
        assert_eq!(palettes[0].rgba(1), Rgba([252, 252, 252, 0xFF]));
    }

    #[test]
    fn index_zero_is_transparent_but_not_for_textures() {
        let palettes = parse_main_palettes(&Bytes::from(vec![21u8; 768])).unwrap();
        assert_eq!(palettes[0].rgba(0), Rgba([0, 0, 0, 0]));
        assert_eq!(palettes[0].rgba_opaque(0), Rgba([84, 84, 84, 0xFF]));
    }

    #[test]
    fn aux_palettes_split_every_16_bytes() {
        let data: Vec<u8> = (0..32).collect();
        let palettes = parse_aux_palettes(&Bytes::from(data)).unwrap();
        assert_eq!(palettes.len(), 2);
        assert_eq!(palettes[1].indices[0], 16);
    }

    #[test]
    fn odd_lengths_fail() {
        assert!(parse_main_palettes(&Bytes::from(vec![0u8; 100])).is_err());
        assert!(parse_aux_palettes(&Bytes::from(vec![0u8; 17])).is_err());
    }
}
