//! Tilemap word layout.
//!
//! Every tile is two little-endian `u16` words. Word 0 packs the tile shape,
//! floor height/texture and a couple of flags; word 1 packs the wall texture
//! and the head of the tile's object chain.

use num_derive::FromPrimitive;
use num_traits::FromPrimitive as _;
use proc_bitfield::bitfield;
use serde::Serialize;
use tracing::warn;

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct TileWord0(pub u16) : Debug {
        pub kind: u16 @ 0..4,
        pub floor_height: u16 @ 4..8,
        pub unknown_flag: bool @ 8,
        pub no_magic: bool @ 9,
        pub floor_texture: u16 @ 10..14,
        pub has_door: bool @ 14,
    }
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct TileWord1(pub u16) : Debug {
        pub wall_texture: u16 @ 0..6,
        pub first_object_index: u16 @ 6..16,
    }
}

/// Tile shape. Diagonals name the open corner, slopes the direction the
/// floor rises towards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, Serialize)]
pub enum TileKind {
    Solid = 0,
    Open = 1,
    DiagonalSe = 2,
    DiagonalSw = 3,
    DiagonalNe = 4,
    DiagonalNw = 5,
    SlopeN = 6,
    SlopeS = 7,
    SlopeE = 8,
    SlopeW = 9,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Tile {
    pub x: u8,
    pub y: u8,
    pub kind: TileKind,
    pub floor_height: u8,
    pub floor_texture: u8,
    pub wall_texture: u8,
    pub no_magic: bool,
    pub has_door: bool,
    /// Head of the object chain on this tile; 0 means no objects here.
    pub first_object_index: u16,
    pub unknown_flag: bool,
}

impl Tile {
    pub fn unpack(x: u8, y: u8, word0: TileWord0, word1: TileWord1) -> Tile {
        let kind = TileKind::from_u16(word0.kind()).unwrap_or_else(|| {
            warn!(x, y, kind = word0.kind(), "unknown tile shape, treating as solid");
            TileKind::Solid
        });
        Tile {
            x,
            y,
            kind,
            floor_height: word0.floor_height() as u8,
            floor_texture: word0.floor_texture() as u8,
            wall_texture: word1.wall_texture() as u8,
            no_magic: word0.no_magic(),
            has_door: word0.has_door(),
            first_object_index: word1.first_object_index(),
            unknown_flag: word0.unknown_flag(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Tile, TileKind, TileWord0, TileWord1};

    #[test]
    fn tile_words_round_trip() {
        let word0 = TileWord0(0)
            .with_kind(TileKind::DiagonalNe as u16)
            .with_floor_height(13)
            .with_no_magic(true)
            .with_floor_texture(9)
            .with_has_door(true);
        let word1 = TileWord1(0)
            .with_wall_texture(63)
            .with_first_object_index(1023);

        assert_eq!(word0.kind(), 4);
        assert_eq!(word0.floor_height(), 13);
        assert!(word0.no_magic());
        assert!(!word0.unknown_flag());
        assert_eq!(word0.floor_texture(), 9);
        assert!(word0.has_door());
        assert_eq!(word1.wall_texture(), 63);
        assert_eq!(word1.first_object_index(), 1023);

        let tile = Tile::unpack(3, 7, word0, word1);
        assert_eq!(tile.kind, TileKind::DiagonalNe);
        assert_eq!(tile.floor_height, 13);
        assert_eq!(tile.wall_texture, 63);
        assert_eq!(tile.first_object_index, 1023);
    }

    #[test]
    fn unknown_tile_kind_degrades_to_solid() {
        let tile = Tile::unpack(0, 0, TileWord0(0).with_kind(15), TileWord1(0));
        assert_eq!(tile.kind, TileKind::Solid);
    }
}
