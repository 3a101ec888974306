//! Index Module
//!
//! Durable mapping from key to the store location of its latest value.
//!
//! ## Responsibilities
//! - Point lookups for reads that miss the journal
//! - Lossy upserts that surface overwritten locations for reclamation
//! - Growing the mapped region before it runs out of room
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ Header (64 bytes)                            │
//! │   Magic: "RINGKVIX" (8) | RecordCount: u64   │
//! ├──────────────────────────────────────────────┤
//! │ Record 0                                     │
//! │   [Key: 4 + 2048][Location: 24]              │
//! │ ... repeated RecordCount times ...           │
//! ├──────────────────────────────────────────────┤
//! │ Unused headroom (grown in chunks)            │
//! └──────────────────────────────────────────────┘
//! ```
//! The header sits at a fixed offset, so the map is found again after every
//! remap without relying on addresses.

mod table;

pub use table::Index;

use crate::types::{KEY_INLINE_SIZE, LOCATION_SIZE};

/// Magic bytes identifying a RingKV index file
pub(crate) const MAGIC: &[u8; 8] = b"RINGKVIX";

/// Header size, including padding
pub(crate) const HEADER_SIZE: u64 = 64;

/// Size of one key → location record
pub const RECORD_SIZE: u64 = (KEY_INLINE_SIZE + LOCATION_SIZE) as u64;
