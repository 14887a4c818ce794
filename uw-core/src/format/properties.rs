//! Support for the object property tables (`COMOBJ.DAT` and `OBJECTS.DAT`).
//!
//! Both files are plain fixed-stride record tables: `COMOBJ.DAT` has one
//! 11-byte record per object type id, `OBJECTS.DAT` packs one table per
//! object class at fixed file offsets. Only part of the bytes have a known
//! meaning; the rest ride along raw.

use std::io::Cursor;

use anyhow::{Context, Result, ensure};
use binrw::BinRead;
use bytes::Bytes;
use proc_bitfield::bitfield;
use serde::Serialize;

use crate::format::buffer::FileBuffer;

const COMMON_HEADER_LEN: usize = 2;
const COMMON_STRIDE: usize = 11;

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct MassWord(pub u16) : Debug {
        /// Mass in 0.1 stone units.
        pub mass: u16 @ 0..12,
        pub pickable: bool @ 12,
        pub flags: u16 @ 13..16,
    }
}

/// Properties shared by every object type.
#[derive(Debug, Clone, Serialize)]
pub struct CommonObjectProperties {
    pub item_id: u16,
    pub height: u8,
    /// Mass in 0.1 stone units.
    pub mass: u16,
    pub pickable: bool,
    pub value: u16,
    pub quality_class: u8,
    pub quality_type: u8,
    /// The whole 11-byte record, mostly unmapped.
    pub raw: [u8; COMMON_STRIDE],
}

#[derive(Debug)]
pub struct CommonProperties {
    records: Vec<CommonObjectProperties>,
}

impl CommonProperties {
    pub fn parse(data: Bytes) -> Result<CommonProperties> {
        ensure!(
            data.len() >= COMMON_HEADER_LEN,
            "common object properties file is too short"
        );
        let count = (data.len() - COMMON_HEADER_LEN) / COMMON_STRIDE;
        let mut records = Vec::with_capacity(count);
        for item_id in 0..count {
            let offset = COMMON_HEADER_LEN + item_id * COMMON_STRIDE;
            let raw: [u8; COMMON_STRIDE] = data[offset..offset + COMMON_STRIDE]
                .try_into()
                .expect("stride-sized slice");
            let mass_word = MassWord(u16::from_le_bytes([raw[1], raw[2]]));
            records.push(CommonObjectProperties {
                item_id: item_id as u16,
                height: raw[0],
                mass: mass_word.mass(),
                pickable: mass_word.pickable(),
                value: u16::from_le_bytes([raw[3], raw[4]]),
                quality_class: raw[6],
                quality_type: raw[10],
                raw,
            });
        }
        Ok(CommonProperties { records })
    }

    pub fn get(&self, item_id: u16) -> Option<&CommonObjectProperties> {
        self.records.get(item_id as usize)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommonObjectProperties> {
        self.records.iter()
    }
}

// Class table layout inside OBJECTS.DAT. Offsets are fixed; each table
// immediately follows the previous one.
const MELEE_OFFSET: usize = 0x02;
const MELEE_COUNT: usize = 16;
const RANGED_OFFSET: usize = 0x82;
const RANGED_COUNT: usize = 16;
const ARMOUR_OFFSET: usize = 0xB2;
const ARMOUR_COUNT: usize = 32;
const CRITTER_OFFSET: usize = 0x132;
const CRITTER_COUNT: usize = 64;
const CRITTER_STRIDE: usize = 48;
const CONTAINER_OFFSET: usize = 0xD32;
const CONTAINER_COUNT: usize = 16;
const LIGHT_OFFSET: usize = 0xD62;
const LIGHT_COUNT: usize = 8;
const CLASS_TABLE_END: usize = 0xD72;

#[derive(BinRead, Debug, Clone, Copy, Serialize)]
#[br(little)]
pub struct MeleeWeaponProperties {
    pub slash_damage: u8,
    pub bash_damage: u8,
    pub stab_damage: u8,
    _unk3: [u8; 3],
    pub skill_type: u8,
    pub durability: u8,
}

#[derive(BinRead, Debug, Clone, Copy, Serialize)]
#[br(little)]
pub struct RangedWeaponProperties {
    pub ammo_id: u16,
    pub durability: u8,
}

#[derive(BinRead, Debug, Clone, Copy, Serialize)]
#[br(little)]
pub struct ArmourProperties {
    pub protection: u8,
    pub durability: u8,
    _unk2: u8,
    pub category: u8,
}

/// Critter combat/behavior stats. 48 bytes per record, largely unmapped.
#[derive(BinRead, Debug, Clone, Copy, Serialize)]
#[br(little)]
pub struct CritterProperties {
    pub level: u8,
    #[serde(serialize_with = "serialize_raw_bytes")]
    _raw: [u8; CRITTER_STRIDE - 1],
}

/// serde implements `Serialize` for arrays only up to length 32, so the raw
/// critter blob is serialized through its slice view instead.
fn serialize_raw_bytes<S>(
    bytes: &[u8; CRITTER_STRIDE - 1],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    bytes.as_slice().serialize(serializer)
}

#[derive(BinRead, Debug, Clone, Copy, Serialize)]
#[br(little)]
pub struct ContainerProperties {
    /// Capacity in 0.1 stone units; 0 means unlimited.
    pub capacity: u8,
    /// Category of objects the container accepts.
    pub accepts: u8,
    pub slots: u8,
}

#[derive(BinRead, Debug, Clone, Copy, Serialize)]
#[br(little)]
pub struct LightSourceProperties {
    pub brightness: u8,
    pub duration: u8,
}

/// All per-class tables from `OBJECTS.DAT`.
#[derive(Debug, Serialize)]
pub struct ClassProperties {
    pub melee_weapons: Vec<MeleeWeaponProperties>,
    pub ranged_weapons: Vec<RangedWeaponProperties>,
    pub armour: Vec<ArmourProperties>,
    pub critters: Vec<CritterProperties>,
    pub containers: Vec<ContainerProperties>,
    pub light_sources: Vec<LightSourceProperties>,
}

fn read_table<T>(buf: &FileBuffer, offset: usize, count: usize, stride: usize) -> Result<Vec<T>>
where
    T: for<'a> BinRead<Args<'a> = ()>,
{
    let mut records = Vec::with_capacity(count);
    for i in 0..count {
        let record = buf.slice(offset + i * stride, stride)?;
        records.push(T::read_le(&mut Cursor::new(record.as_ref()))?);
    }
    Ok(records)
}

impl ClassProperties {
    pub fn parse(data: Bytes) -> Result<ClassProperties> {
        ensure!(
            data.len() >= CLASS_TABLE_END,
            "class properties file is too short: {} bytes",
            data.len()
        );
        let buf = FileBuffer::new(data);
        Ok(ClassProperties {
            melee_weapons: read_table(&buf, MELEE_OFFSET, MELEE_COUNT, 8)
                .context("Reading melee weapon table")?,
            ranged_weapons: read_table(&buf, RANGED_OFFSET, RANGED_COUNT, 3)
                .context("Reading ranged weapon table")?,
            armour: read_table(&buf, ARMOUR_OFFSET, ARMOUR_COUNT, 4)
                .context("Reading armour table")?,
            critters: read_table(&buf, CRITTER_OFFSET, CRITTER_COUNT, CRITTER_STRIDE)
                .context("Reading critter table")?,
            containers: read_table(&buf, CONTAINER_OFFSET, CONTAINER_COUNT, 3)
                .context("Reading container table")?,
            light_sources: read_table(&buf, LIGHT_OFFSET, LIGHT_COUNT, 2)
                .context("Reading light source table")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::{CLASS_TABLE_END, ClassProperties, CommonProperties};

    #[test]
    fn common_records_decode_in_place() {
        let mut data = vec![0u8; 2];
        // record 0: height 7, mass 0x123 pickable, value 400, classes 3/9
        let mut record = [0u8; 11];
        record[0] = 7;
        record[1..3].copy_from_slice(&(0x123u16 | 1 << 12).to_le_bytes());
        record[3..5].copy_from_slice(&400u16.to_le_bytes());
        record[6] = 3;
        record[10] = 9;
        data.extend_from_slice(&record);
        data.extend_from_slice(&[0u8; 11]);

        let props = CommonProperties::parse(Bytes::from(data)).unwrap();
        assert_eq!(props.len(), 2);
        let first = props.get(0).unwrap();
        assert_eq!(first.height, 7);
        assert_eq!(first.mass, 0x123);
        assert!(first.pickable);
        assert_eq!(first.value, 400);
        assert_eq!(first.quality_class, 3);
        assert_eq!(first.quality_type, 9);
        assert!(!props.get(1).unwrap().pickable);
        assert!(props.get(2).is_none());
    }

    #[test]
    fn class_tables_sit_at_fixed_offsets() {
        let mut data = vec![0u8; CLASS_TABLE_END];
        // melee weapon 1: slash/bash/stab 10/20/30
        data[0x02 + 8] = 10;
        data[0x02 + 9] = 20;
        data[0x02 + 10] = 30;
        // armour 2: protection 5
        data[0xB2 + 2 * 4] = 5;
        // container 3: capacity 80
        data[0xD32 + 3 * 3] = 80;
        // light source 7: brightness 4
        data[0xD62 + 7 * 2] = 4;

        let props = ClassProperties::parse(Bytes::from(data)).unwrap();
        assert_eq!(props.melee_weapons.len(), 16);
        assert_eq!(props.melee_weapons[1].slash_damage, 10);
        assert_eq!(props.melee_weapons[1].bash_damage, 20);
        assert_eq!(props.melee_weapons[1].stab_damage, 30);
        assert_eq!(props.armour[2].protection, 5);
        assert_eq!(props.critters.len(), 64);
        assert_eq!(props.containers[3].capacity, 80);
        assert_eq!(props.light_sources[7].brightness, 4);
    }

    #[test]
    fn short_files_fail() {
        assert!(CommonProperties::parse(Bytes::from_static(&[0])).is_err());
        assert!(ClassProperties::parse(Bytes::from(vec![0u8; 100])).is_err());
    }
}
