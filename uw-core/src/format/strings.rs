//! Support for the compressed string pack (`STRINGS.PAK`).
//!
//! All game text lives in one file, split into numbered blocks (object names,
//! NPC dialogue, scroll texts, ...). Strings are addressed as
//! `(block number, index within block)` by everything else in the game, so
//! preserving in-block indices exactly is load-bearing.
//!
//! The compression is a game-specific Huffman scheme: the file starts with a
//! flat array of tree nodes (the root is the *last* node), followed by a block
//! directory and per-block string offset tables. Each string is decoded
//! independently by walking the tree over an MSB-first bitstream until the
//! terminator symbol `'|'` is produced.

use std::collections::BTreeMap;
use std::io::Cursor;

use anyhow::{Context, Result, bail, ensure};
use binrw::BinRead;
use bytes::Bytes;
use tracing::warn;

use crate::format::buffer::FileBuffer;

/// The symbol that ends every string. Never part of the decoded output.
const STRING_TERMINATOR: u8 = b'|';

/// Defensive cap on symbols per string. The shipped data never comes close;
/// a malformed tree could otherwise loop forever.
const MAX_STRING_LEN: usize = 4096;

#[derive(BinRead, Debug, Clone, Copy)]
#[br(little)]
struct HuffmanNode {
    symbol: u8,
    // stored in the file, never needed for decoding
    _parent: u8,
    left: u8,
    right: u8,
}

impl HuffmanNode {
    fn is_leaf(&self) -> bool {
        self.left == 0xFF && self.right == 0xFF
    }
}

#[derive(BinRead, Debug, Clone, Copy)]
#[br(little)]
struct DirectoryEntry {
    block_number: u16,
    offset: u32,
}

/// One decoded string block.
#[derive(Debug, Clone)]
pub struct StringBlock {
    pub block_number: u16,
    strings: Vec<String>,
}

impl StringBlock {
    pub fn get(&self, index: usize) -> Option<&str> {
        self.strings.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.strings.iter().map(String::as_str)
    }
}

/// The fully decoded string pack.
#[derive(Debug)]
pub struct StringPack {
    blocks: BTreeMap<u16, StringBlock>,
}

impl StringPack {
    pub fn parse(data: Bytes) -> Result<StringPack> {
        let buf = FileBuffer::new(data.clone());
        let mut cur = Cursor::new(data.as_ref());

        let node_count = u16::read_le(&mut cur).context("Reading huffman node count")?;
        ensure!(node_count != 0, "string pack has an empty huffman tree");
        let mut nodes = Vec::with_capacity(node_count as usize);
        for i in 0..node_count {
            nodes.push(
                HuffmanNode::read_le(&mut cur)
                    .with_context(|| format!("Reading huffman node {i}"))?,
            );
        }

        let dir_count = u16::read_le(&mut cur).context("Reading block directory count")?;
        let mut entries = Vec::with_capacity(dir_count as usize);
        for i in 0..dir_count {
            entries.push(
                DirectoryEntry::read_le(&mut cur)
                    .with_context(|| format!("Reading block directory entry {i}"))?,
            );
        }

        let mut blocks = BTreeMap::new();
        for entry in entries {
            // offset 0 marks an absent block
            if entry.offset == 0 {
                continue;
            }
            let block = parse_block(&nodes, &buf, entry)
                .with_context(|| format!("Parsing string block {:#06x}", entry.block_number))?;
            blocks.insert(entry.block_number, block);
        }

        Ok(StringPack { blocks })
    }

    pub fn block(&self, number: u16) -> Option<&StringBlock> {
        self.blocks.get(&number)
    }

    pub fn blocks(&self) -> impl Iterator<Item = &StringBlock> {
        self.blocks.values()
    }
}

fn parse_block(
    nodes: &[HuffmanNode],
    buf: &FileBuffer,
    entry: DirectoryEntry,
) -> Result<StringBlock> {
    let base = entry.offset as usize;
    let count = buf.u16_at(base).context("Reading string count")? as usize;
    let header_size = 2 + count * 2;

    let mut strings = Vec::with_capacity(count);
    for i in 0..count {
        let rel = buf
            .u16_at(base + 2 + i * 2)
            .with_context(|| format!("Reading offset of string {i}"))? as usize;
        let start = base + header_size + rel;
        match decode_string(nodes, buf.as_slice(), start) {
            Ok(string) => strings.push(string),
            Err(err) => {
                // Keep the slot so in-block indices stay stable.
                warn!(
                    block = entry.block_number,
                    index = i,
                    "failed to decode string: {:#}",
                    err
                );
                strings.push(String::new());
            }
        }
    }

    Ok(StringBlock {
        block_number: entry.block_number,
        strings,
    })
}

/// MSB-first bit reader over a byte slice.
struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    bit: u32,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0, bit: 0 }
    }

    fn next_bit(&mut self) -> Option<bool> {
        let byte = *self.data.get(self.pos)?;
        let bit = byte & (0x80 >> self.bit) != 0;
        self.bit += 1;
        if self.bit == 8 {
            self.bit = 0;
            self.pos += 1;
        }
        Some(bit)
    }
}

/// Decode a single string starting at `offset`. Deterministic: the same
/// offset always yields the same string.
fn decode_string(nodes: &[HuffmanNode], data: &[u8], offset: usize) -> Result<String> {
    let root = nodes.len() - 1;
    let mut bits = BitReader::new(data.get(offset..).unwrap_or(&[]));
    let mut out = String::new();

    loop {
        let mut node = &nodes[root];
        while !node.is_leaf() {
            let Some(bit) = bits.next_bit() else {
                bail!("ran out of data before the string terminator");
            };
            let next = if bit { node.right } else { node.left } as usize;
            node = nodes
                .get(next)
                .with_context(|| format!("huffman node index {next} out of range"))?;
        }
        if node.symbol == STRING_TERMINATOR {
            break;
        }
        out.push(node.symbol as char);
        ensure!(
            out.len() <= MAX_STRING_LEN,
            "string decode overran {} symbols without a terminator",
            MAX_STRING_LEN
        );
    }

    Ok(out)
}
