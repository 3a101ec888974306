//! Journal entry definitions
//!
//! Defines the fixed-size slot holding one journal record.

use crate::types::{Key, Location, KEY_INLINE_SIZE, LOCATION_SIZE};

const IDENT_SIZE: usize = 8;
const CRC_SIZE: usize = 4;

const KEY_AT: usize = IDENT_SIZE;
const LOCATION_AT: usize = KEY_AT + KEY_INLINE_SIZE;
const CRC_AT: usize = LOCATION_AT + LOCATION_SIZE;

/// Size of one on-disk journal slot
pub const SLOT_SIZE: usize = CRC_AT + CRC_SIZE;

/// A single journal record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    /// Sequence ident, increasing by one per push modulo `capacity + 1`
    pub ident: u64,

    pub key: Key,

    pub location: Location,
}

impl JournalEntry {
    pub fn new(ident: u64, key: Key, location: Location) -> Self {
        Self { ident, key, location }
    }

    /// Encode into a full slot image
    pub fn encode(&self) -> [u8; SLOT_SIZE] {
        let mut slot = [0u8; SLOT_SIZE];
        slot[0..IDENT_SIZE].copy_from_slice(&self.ident.to_le_bytes());
        self.key.encode_inline(&mut slot[KEY_AT..LOCATION_AT]);
        self.location.encode(&mut slot[LOCATION_AT..CRC_AT]);
        let crc = crc32fast::hash(&slot[..CRC_AT]);
        slot[CRC_AT..].copy_from_slice(&crc.to_le_bytes());
        slot
    }

    /// Decode a slot image.
    ///
    /// Returns `None` for a short slot, a checksum mismatch or an
    /// out-of-range key length: such a slot was never completely written.
    pub fn decode(slot: &[u8]) -> Option<Self> {
        if slot.len() < SLOT_SIZE {
            return None;
        }
        let stored = u32::from_le_bytes(slot[CRC_AT..SLOT_SIZE].try_into().ok()?);
        if crc32fast::hash(&slot[..CRC_AT]) != stored {
            return None;
        }
        Some(Self {
            ident: u64::from_le_bytes(slot[0..IDENT_SIZE].try_into().ok()?),
            key: Key::decode_inline(&slot[KEY_AT..LOCATION_AT])?,
            location: Location::decode(&slot[LOCATION_AT..CRC_AT])?,
        })
    }
}
