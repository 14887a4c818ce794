//! Support for the game's graphics formats.
//!
//! Everything is palette-indexed: the main palettes live in `PALS.DAT`,
//! 16-entry auxiliary palettes for 4-bit sprites in `ALLPALS.DAT`, and
//! critter pages embed their own 32-entry auxiliary palettes. The codecs
//! themselves split into object sprites (`.GR`, bottom-up rows), wall/floor
//! textures (`.TR`, raw 8-bit) and critter animation frames (5-bit RLE,
//! top-down rows).

pub mod palette;
pub mod rle;

pub mod critter;
pub mod sprite;
pub mod texture;
