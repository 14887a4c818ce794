//! This crate implements the core functionality of the underworld toolkit
//!
//! This mostly includes parsers for the game's binary data files: chunked
//! archives, the compressed string pack, level maps, object properties,
//! graphics and conversation bytecode.
//!
//! Parsers only ever read; nothing in this crate writes back to game files.

#![allow(clippy::uninlined_format_args)]

pub mod format;
