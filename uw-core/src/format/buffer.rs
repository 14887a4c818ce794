//! Bounds-checked access to an in-memory game file.
//!
//! Most of the game's formats are driven by offset tables, so parsers need
//! random access on top of the sequential [`binrw`] reads. This wrapper makes
//! every such access fallible instead of panicking on short or corrupt files.
//! All multi-byte reads are little-endian.

use bytes::Bytes;
use snafu::{Snafu, ensure};

/// A read past the end of the file buffer.
#[derive(Debug, Snafu)]
#[snafu(display(
    "read of {len} bytes at offset {offset} is out of bounds (buffer is {size} bytes)"
))]
pub struct OutOfBounds {
    pub offset: usize,
    pub len: usize,
    pub size: usize,
}

/// An immutable view of a fully loaded game file.
#[derive(Debug, Clone)]
pub struct FileBuffer {
    data: Bytes,
}

impl FileBuffer {
    pub fn new(data: Bytes) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    fn check(&self, offset: usize, len: usize) -> Result<(), OutOfBounds> {
        let end = offset.checked_add(len);
        ensure!(
            end.is_some_and(|end| end <= self.data.len()),
            OutOfBoundsSnafu {
                offset,
                len,
                size: self.data.len()
            }
        );
        Ok(())
    }

    pub fn u8_at(&self, offset: usize) -> Result<u8, OutOfBounds> {
        self.check(offset, 1)?;
        Ok(self.data[offset])
    }

    pub fn u16_at(&self, offset: usize) -> Result<u16, OutOfBounds> {
        self.check(offset, 2)?;
        Ok(u16::from_le_bytes([self.data[offset], self.data[offset + 1]]))
    }

    pub fn u32_at(&self, offset: usize) -> Result<u32, OutOfBounds> {
        self.check(offset, 4)?;
        Ok(u32::from_le_bytes([
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
            self.data[offset + 3],
        ]))
    }

    /// Zero-copy slice of `len` bytes starting at `offset`.
    pub fn slice(&self, offset: usize, len: usize) -> Result<Bytes, OutOfBounds> {
        self.check(offset, len)?;
        Ok(self.data.slice(offset..offset + len))
    }
}
