//! Support for decoding a level block out of `LEV.ARK`.
//!
//! One block holds a 64×64 tilemap followed by two fixed-stride object
//! tables (mobile and static). After decoding both, the tile object chains
//! are walked to stamp every placed object with its map coordinates -- the
//! records themselves do not store them.

mod object;
mod tile;

use std::collections::BTreeMap;
use std::io::Cursor;

use anyhow::{Context, Result};
use binrw::BinRead;
use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, warn};

pub use object::{Amount, GameObject, MobileState, ObjectKind};
pub use tile::{Tile, TileKind};
// exposed for bit-exact packing in tests and tooling
pub use object::{MobileGoalWord, MobileHomeWord, MobileLevelWord};
pub use object::{ObjectWord0, ObjectWord1, ObjectWord2, ObjectWord3};
pub use tile::{TileWord0, TileWord1};

use crate::format::buffer::FileBuffer;

pub const TILEMAP_DIM: usize = 64;

const TILE_STRIDE: usize = 4;
const MOBILE_OFFSET: usize = 0x4000;
const MOBILE_COUNT: usize = 256;
const MOBILE_STRIDE: usize = 27;
const STATIC_OFFSET: usize = 0x5B00;
const STATIC_COUNT: usize = 768;
const STATIC_STRIDE: usize = 8;

/// Bytes a block must have for the tables we decode. Real blocks are 31752
/// bytes; the tail past the static table holds data we do not interpret.
const MIN_BLOCK_LEN: usize = STATIC_OFFSET + STATIC_COUNT * STATIC_STRIDE;

#[derive(Debug, Serialize)]
pub struct Level {
    pub level_num: u16,
    /// Row-major, `TILEMAP_DIM` × `TILEMAP_DIM`.
    tiles: Vec<Tile>,
    pub objects: BTreeMap<u16, GameObject>,
}

impl Level {
    /// Decode one `LEV.ARK` block. An empty or truncated block yields
    /// `Ok(None)`: "no data for this level" rather than a batch-aborting
    /// error.
    pub fn parse(level_num: u16, data: &Bytes) -> Result<Option<Level>> {
        if data.is_empty() {
            return Ok(None);
        }
        if data.len() < MIN_BLOCK_LEN {
            warn!(
                level_num,
                len = data.len(),
                "level block too short for its object tables, skipping"
            );
            return Ok(None);
        }

        let buf = FileBuffer::new(data.clone());

        let mut tiles = Vec::with_capacity(TILEMAP_DIM * TILEMAP_DIM);
        for y in 0..TILEMAP_DIM {
            for x in 0..TILEMAP_DIM {
                let offset = (y * TILEMAP_DIM + x) * TILE_STRIDE;
                let word0 = buf.u16_at(offset).context("Reading tilemap")?;
                let word1 = buf.u16_at(offset + 2).context("Reading tilemap")?;
                tiles.push(Tile::unpack(
                    x as u8,
                    y as u8,
                    tile::TileWord0(word0),
                    tile::TileWord1(word1),
                ));
            }
        }

        let mut objects = BTreeMap::new();
        for slot in 0..MOBILE_COUNT {
            let record = buf
                .slice(MOBILE_OFFSET + slot * MOBILE_STRIDE, MOBILE_STRIDE)
                .context("Slicing mobile object record")?;
            let raw = object::RawMobile::read_le(&mut Cursor::new(record.as_ref()))
                .with_context(|| format!("Reading mobile object record {slot}"))?;
            if raw.words == [0; 4] {
                continue;
            }
            let index = slot as u16;
            objects.insert(
                index,
                GameObject::unpack(index, raw.words, Some(MobileState::unpack(&raw))),
            );
        }
        for slot in 0..STATIC_COUNT {
            let record = buf
                .slice(STATIC_OFFSET + slot * STATIC_STRIDE, STATIC_STRIDE)
                .context("Slicing static object record")?;
            let raw = object::RawStatic::read_le(&mut Cursor::new(record.as_ref()))
                .with_context(|| format!("Reading static object record {slot}"))?;
            if raw.words == [0; 4] {
                continue;
            }
            let index = (MOBILE_COUNT + slot) as u16;
            objects.insert(index, GameObject::unpack(index, raw.words, None));
        }

        stamp_positions(&tiles, &mut objects);

        Ok(Some(Level {
            level_num,
            tiles,
            objects,
        }))
    }

    pub fn tile(&self, x: usize, y: usize) -> &Tile {
        assert!(x < TILEMAP_DIM && y < TILEMAP_DIM);
        &self.tiles[y * TILEMAP_DIM + x]
    }

    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.iter()
    }

    pub fn object(&self, index: u16) -> Option<&GameObject> {
        self.objects.get(&index)
    }
}

/// Walk every tile's object chain and stamp the visited objects with the
/// tile's coordinates. A per-walk visited set terminates cycles in corrupt
/// data; a chain also ends at index 0 or at a missing record.
fn stamp_positions(tiles: &[Tile], objects: &mut BTreeMap<u16, GameObject>) {
    for tile in tiles {
        if tile.first_object_index == 0 {
            continue;
        }
        let mut seen = [false; 1024];
        let mut index = tile.first_object_index;
        while index != 0 {
            if seen[index as usize] {
                warn!(
                    x = tile.x,
                    y = tile.y,
                    index,
                    "cycle in tile object chain, stopping the walk"
                );
                break;
            }
            seen[index as usize] = true;
            let Some(object) = objects.get_mut(&index) else {
                warn!(
                    x = tile.x,
                    y = tile.y,
                    index,
                    "tile object chain points at an empty slot, stopping the walk"
                );
                break;
            };
            if object.tile.is_none() {
                object.tile = Some((tile.x, tile.y));
            } else {
                debug!(index, "object reachable from more than one tile chain");
            }
            index = object.next_index;
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::object::{ObjectWord0, ObjectWord2};
    use super::tile::{TileWord0, TileWord1};
    use super::{
        Level, MIN_BLOCK_LEN, MOBILE_OFFSET, MOBILE_STRIDE, STATIC_OFFSET, STATIC_STRIDE,
        TILE_STRIDE, TILEMAP_DIM,
    };
    use crate::format::map::{ObjectKind, TileKind};

    struct BlockBuilder {
        data: Vec<u8>,
    }

    impl BlockBuilder {
        fn new() -> Self {
            Self {
                data: vec![0; MIN_BLOCK_LEN],
            }
        }

        fn tile(&mut self, x: usize, y: usize, word0: TileWord0, word1: TileWord1) -> &mut Self {
            let offset = (y * TILEMAP_DIM + x) * TILE_STRIDE;
            self.data[offset..offset + 2].copy_from_slice(&word0.0.to_le_bytes());
            self.data[offset + 2..offset + 4].copy_from_slice(&word1.0.to_le_bytes());
            self
        }

        fn object(&mut self, index: u16, item_id: u16, next_index: u16) -> &mut Self {
            let offset = if index < 256 {
                MOBILE_OFFSET + index as usize * MOBILE_STRIDE
            } else {
                STATIC_OFFSET + (index as usize - 256) * STATIC_STRIDE
            };
            let word0 = ObjectWord0(0).with_item_id(item_id).0;
            let word2 = ObjectWord2(0).with_next_index(next_index).0;
            self.data[offset..offset + 2].copy_from_slice(&word0.to_le_bytes());
            self.data[offset + 4..offset + 6].copy_from_slice(&word2.to_le_bytes());
            self
        }

        fn build(&self) -> Bytes {
            Bytes::from(self.data.clone())
        }
    }

    #[test]
    fn empty_and_truncated_blocks_have_no_data() {
        assert!(Level::parse(0, &Bytes::new()).unwrap().is_none());
        assert!(
            Level::parse(0, &Bytes::from(vec![0; 1000]))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn decodes_tiles_and_skips_empty_object_slots() {
        let mut builder = BlockBuilder::new();
        builder
            .tile(
                5,
                9,
                TileWord0(0)
                    .with_kind(TileKind::Open as u16)
                    .with_floor_height(3)
                    .with_has_door(true),
                TileWord1(0).with_wall_texture(17),
            )
            .object(300, 0x145, 0);
        let level = Level::parse(2, &builder.build()).unwrap().unwrap();

        assert_eq!(level.level_num, 2);
        let tile = level.tile(5, 9);
        assert_eq!(tile.kind, TileKind::Open);
        assert_eq!(tile.floor_height, 3);
        assert!(tile.has_door);
        assert_eq!(tile.wall_texture, 17);

        // every all-zero record is an empty slot
        assert_eq!(level.objects.len(), 1);
        let object = level.object(300).unwrap();
        assert_eq!(object.kind(), ObjectKind::Door);
        assert!(object.mobile.is_none());
    }

    #[test]
    fn chain_walk_stamps_coordinates() {
        let mut builder = BlockBuilder::new();
        builder
            .tile(10, 20, TileWord0(0), TileWord1(0).with_first_object_index(2))
            .object(2, 0x40, 700)
            .object(700, 0x10, 0)
            // not part of any chain
            .object(701, 0x11, 0);
        let level = Level::parse(0, &builder.build()).unwrap().unwrap();

        assert_eq!(level.object(2).unwrap().tile, Some((10, 20)));
        assert_eq!(level.object(700).unwrap().tile, Some((10, 20)));
        assert_eq!(level.object(701).unwrap().tile, None);
        // mobile range records carry creature state
        assert!(level.object(2).unwrap().mobile.is_some());
    }

    #[test]
    fn chain_cycles_terminate_and_stamp_once() {
        let mut builder = BlockBuilder::new();
        builder
            .tile(1, 1, TileWord0(0), TileWord1(0).with_first_object_index(500))
            .object(500, 0x10, 501)
            .object(501, 0x11, 500);
        let level = Level::parse(0, &builder.build()).unwrap().unwrap();

        assert_eq!(level.object(500).unwrap().tile, Some((1, 1)));
        assert_eq!(level.object(501).unwrap().tile, Some((1, 1)));
    }

    #[test]
    fn chain_to_missing_record_stops() {
        let mut builder = BlockBuilder::new();
        builder
            .tile(0, 3, TileWord0(0), TileWord1(0).with_first_object_index(600))
            .object(600, 0x12, 999);
        let level = Level::parse(0, &builder.build()).unwrap().unwrap();
        assert_eq!(level.object(600).unwrap().tile, Some((0, 3)));
        assert!(level.object(999).is_none());
    }
}
