//! Object record layout.
//!
//! A level carries up to 1024 objects in one table split in two ranges:
//! indices 0..256 are "mobile" objects (everything NPC-capable, 27-byte
//! records) and 256..1024 are "static" objects (8-byte records). Both start
//! with the same four packed header words; mobile records append 19 bytes of
//! creature state.
//!
//! Objects do not store their own map position. A tile's
//! `first_object_index` anchors a singly-linked chain threaded through
//! `next_index`, and chain membership is the only source of an object's tile
//! coordinates.

use binrw::BinRead;
use proc_bitfield::bitfield;
use serde::Serialize;

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct ObjectWord0(pub u16) : Debug {
        pub item_id: u16 @ 0..9,
        // the top flag bit doubles as the enchantment bit
        pub flags: u16 @ 9..13,
        pub is_enchanted: bool @ 12,
        pub door_dir: bool @ 13,
        pub is_invisible: bool @ 14,
        pub is_quantity: bool @ 15,
    }
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct ObjectWord1(pub u16) : Debug {
        pub z_pos: u16 @ 0..7,
        pub heading: u16 @ 7..10,
        pub y_pos: u16 @ 10..13,
        pub x_pos: u16 @ 13..16,
    }
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct ObjectWord2(pub u16) : Debug {
        pub quality: u16 @ 0..6,
        pub next_index: u16 @ 6..16,
    }
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct ObjectWord3(pub u16) : Debug {
        pub owner: u16 @ 0..6,
        pub quantity_or_link: u16 @ 6..16,
    }
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct MobileGoalWord(pub u16) : Debug {
        pub goal: u16 @ 0..4,
        pub goal_target: u16 @ 4..12,
    }
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct MobileLevelWord(pub u16) : Debug {
        pub level: u16 @ 0..4,
        pub attitude: u16 @ 13..15,
    }
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct MobileHomeWord(pub u16) : Debug {
        pub home_y: u16 @ 4..10,
        pub home_x: u16 @ 10..16,
    }
}

/// A mobile (27-byte) record as stored in the level block.
#[derive(BinRead, Debug, Clone, Copy)]
#[br(little)]
pub(super) struct RawMobile {
    pub words: [u16; 4],
    pub hp: u8,
    _unk9: [u8; 2],
    pub goal: u16,
    pub level: u16,
    _unk15: [u8; 7],
    pub home: u16,
    _unk24: u8,
    pub hunger: u8,
    pub whoami: u8,
}

/// A static (8-byte) record.
#[derive(BinRead, Debug, Clone, Copy)]
#[br(little)]
pub(super) struct RawStatic {
    pub words: [u16; 4],
}

/// Creature state carried only by mobile records.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MobileState {
    pub hp: u8,
    pub goal: u8,
    pub goal_target: u8,
    pub level: u8,
    pub attitude: u8,
    pub home_x: u8,
    pub home_y: u8,
    pub hunger: u8,
    /// Conversation slot ("whoami") in `CNV.ARK`; 0 means no conversation.
    pub conversation_slot: u8,
}

/// Broad object category, decided purely by `item_id` range. Every extractor
/// downstream keys off these ranges, so they must match the engine exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ObjectKind {
    Npc,
    Container,
    Door,
    Trap,
    Trigger,
    Other,
}

/// The `quantity_or_link` field holds either a count or a link to another
/// object record, depending on the `is_quantity` bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Amount {
    Quantity(u16),
    Link(u16),
}

#[derive(Debug, Clone, Serialize)]
pub struct GameObject {
    /// Index into the level-wide object table (mobile 0..256, static
    /// 256..1024).
    pub index: u16,
    pub item_id: u16,
    pub flags: u8,
    pub is_enchanted: bool,
    pub door_dir: bool,
    pub is_invisible: bool,
    pub is_quantity: bool,
    pub z_pos: u8,
    pub heading: u8,
    /// Position within the tile, 0..8.
    pub y_pos: u8,
    pub x_pos: u8,
    pub quality: u8,
    /// Next object in the tile chain; 0 terminates the chain.
    pub next_index: u16,
    pub owner: u8,
    pub quantity_or_link: u16,
    pub mobile: Option<MobileState>,
    /// Tile coordinates, stamped while walking the tile chains. `None` for
    /// objects not reachable from any tile (e.g. chained inside containers).
    pub tile: Option<(u8, u8)>,
}

impl GameObject {
    pub(super) fn unpack(index: u16, words: [u16; 4], mobile: Option<MobileState>) -> GameObject {
        let word0 = ObjectWord0(words[0]);
        let word1 = ObjectWord1(words[1]);
        let word2 = ObjectWord2(words[2]);
        let word3 = ObjectWord3(words[3]);
        GameObject {
            index,
            item_id: word0.item_id(),
            flags: word0.flags() as u8,
            is_enchanted: word0.is_enchanted(),
            door_dir: word0.door_dir(),
            is_invisible: word0.is_invisible(),
            is_quantity: word0.is_quantity(),
            z_pos: word1.z_pos() as u8,
            heading: word1.heading() as u8,
            y_pos: word1.y_pos() as u8,
            x_pos: word1.x_pos() as u8,
            quality: word2.quality() as u8,
            next_index: word2.next_index(),
            owner: word3.owner() as u8,
            quantity_or_link: word3.quantity_or_link(),
            mobile,
            tile: None,
        }
    }

    pub fn kind(&self) -> ObjectKind {
        match self.item_id {
            0x40..=0x7F => ObjectKind::Npc,
            0x80..=0x8F => ObjectKind::Container,
            0x140..=0x14F => ObjectKind::Door,
            0x180..=0x19F => ObjectKind::Trap,
            0x1A0..=0x1BF => ObjectKind::Trigger,
            _ => ObjectKind::Other,
        }
    }

    pub fn is_npc(&self) -> bool {
        self.kind() == ObjectKind::Npc
    }

    pub fn is_container(&self) -> bool {
        self.kind() == ObjectKind::Container
    }

    pub fn is_door(&self) -> bool {
        self.kind() == ObjectKind::Door
    }

    pub fn is_trap(&self) -> bool {
        self.kind() == ObjectKind::Trap
    }

    pub fn is_trigger(&self) -> bool {
        self.kind() == ObjectKind::Trigger
    }

    pub fn amount(&self) -> Amount {
        if self.is_quantity {
            Amount::Quantity(self.quantity_or_link)
        } else {
            Amount::Link(self.quantity_or_link)
        }
    }
}

impl MobileState {
    pub(super) fn unpack(raw: &RawMobile) -> MobileState {
        let goal = MobileGoalWord(raw.goal);
        let level = MobileLevelWord(raw.level);
        let home = MobileHomeWord(raw.home);
        MobileState {
            hp: raw.hp,
            goal: goal.goal() as u8,
            goal_target: goal.goal_target() as u8,
            level: level.level() as u8,
            attitude: level.attitude() as u8,
            home_x: home.home_x() as u8,
            home_y: home.home_y() as u8,
            hunger: raw.hunger,
            conversation_slot: raw.whoami,
        }
    }
}
