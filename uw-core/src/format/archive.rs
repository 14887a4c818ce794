//! Support for the ARK container format, which holds level data (`LEV.ARK`)
//! and conversation bytecode (`CNV.ARK`).
//!
//! The container is just a slot table: a `u16` block count followed by one
//! `u32` file offset per slot. There is no stored length anywhere; a block
//! ends where the next one (by file offset) begins, or at end of file for the
//! last one. A slot offset of 0 means the slot is unused, which is common --
//! most conversation slots are empty.

use std::collections::BTreeMap;

use anyhow::{Context, Result, ensure};
use bytes::Bytes;
use itertools::Itertools;

use crate::format::buffer::FileBuffer;

/// One block cut out of the container.
#[derive(Debug, Clone)]
pub struct ArkBlock {
    pub slot: u16,
    pub offset: u32,
    pub data: Bytes,
}

impl ArkBlock {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A parsed ARK container. The whole slot table is read eagerly; block data
/// is sliced zero-copy out of the file buffer.
#[derive(Debug)]
pub struct ArkFile {
    slot_count: u16,
    blocks: BTreeMap<u16, ArkBlock>,
}

impl ArkFile {
    pub fn parse(data: Bytes) -> Result<ArkFile> {
        let buf = FileBuffer::new(data);
        let slot_count = buf.u16_at(0).context("Reading ark slot count")?;

        let mut present = Vec::new();
        for slot in 0..slot_count {
            let offset = buf
                .u32_at(2 + slot as usize * 4)
                .with_context(|| format!("Reading ark slot {slot} offset"))?;
            if offset != 0 {
                ensure!(
                    (offset as usize) <= buf.len(),
                    "ark slot {} points at offset {:#x}, past the end of the file ({:#x} bytes)",
                    slot,
                    offset,
                    buf.len()
                );
                present.push((slot, offset));
            }
        }

        // Stable sort: slots sharing an offset keep their slot order, and each
        // block runs up to the next *distinct* offset (or EOF).
        let present = present
            .into_iter()
            .sorted_by_key(|&(_, offset)| offset)
            .collect_vec();

        let mut blocks = BTreeMap::new();
        for (i, &(slot, offset)) in present.iter().enumerate() {
            let end = present[i..]
                .iter()
                .map(|&(_, o)| o)
                .find(|&o| o > offset)
                .unwrap_or(buf.len() as u32);
            let data = buf
                .slice(offset as usize, (end - offset) as usize)
                .with_context(|| format!("Slicing ark slot {slot}"))?;
            blocks.insert(slot, ArkBlock { slot, offset, data });
        }

        Ok(ArkFile { slot_count, blocks })
    }

    /// Number of declared slots, used and unused.
    pub fn slot_count(&self) -> u16 {
        self.slot_count
    }

    /// Look up one slot. Unused slots return `None`; that is an expected case,
    /// not an error.
    pub fn block(&self, slot: u16) -> Option<&ArkBlock> {
        self.blocks.get(&slot)
    }

    /// All used blocks, in slot order.
    pub fn blocks(&self) -> impl Iterator<Item = &ArkBlock> {
        self.blocks.values()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::ArkFile;

    fn ark(slot_offsets: &[u32], file_len: usize) -> Bytes {
        let mut data = Vec::new();
        data.extend_from_slice(&(slot_offsets.len() as u16).to_le_bytes());
        for &offset in slot_offsets {
            data.extend_from_slice(&offset.to_le_bytes());
        }
        assert!(data.len() <= file_len);
        data.resize(file_len, 0xAA);
        Bytes::from(data)
    }

    #[test]
    fn sizes_are_gaps_between_sorted_offsets() {
        // Slot 0 absent, slot 1 at 100, slot 2 at 50, file is 200 bytes long.
        let ark = ArkFile::parse(ark(&[0, 100, 50], 200)).unwrap();

        assert_eq!(ark.slot_count(), 3);
        assert!(ark.block(0).is_none());
        assert_eq!(ark.block(2).unwrap().len(), 50);
        assert_eq!(ark.block(1).unwrap().len(), 100);
    }

    #[test]
    fn last_block_runs_to_eof() {
        let ark = ArkFile::parse(ark(&[30, 40], 64)).unwrap();
        assert_eq!(ark.block(0).unwrap().len(), 10);
        assert_eq!(ark.block(1).unwrap().len(), 24);
    }

    #[test]
    fn out_of_range_slot_is_absent() {
        let ark = ArkFile::parse(ark(&[30], 64)).unwrap();
        assert!(ark.block(7).is_none());
    }

    #[test]
    fn duplicate_offsets_run_to_next_distinct_offset() {
        let ark = ArkFile::parse(ark(&[30, 30, 50], 64)).unwrap();
        assert_eq!(ark.block(0).unwrap().len(), 20);
        assert_eq!(ark.block(1).unwrap().len(), 20);
        assert_eq!(ark.block(2).unwrap().len(), 14);
    }

    #[test]
    fn offset_past_eof_fails_the_parse() {
        assert!(ArkFile::parse(ark(&[500], 64)).is_err());
    }

    #[test]
    fn truncated_slot_table_fails_the_parse() {
        let mut data = Vec::new();
        data.extend_from_slice(&4u16.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        // declares 4 slots but only stores one offset
        assert!(ArkFile::parse(Bytes::from(data)).is_err());
    }
}
