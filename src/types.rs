//! Core data types shared by the journal, index and store.
//!
//! Both on-disk structures that hold keys (journal slots and index records)
//! use fixed-width encodings so any record can be addressed by slot number:
//!
//! ```text
//! Key (inline):   [Len: u32][Bytes: MAX_KEY_LEN, zero padded]
//! Location:       [File: u64][Offset: u64][Length: u64]
//! ```
//! All integers are little-endian.

use std::borrow::Borrow;
use std::fmt;

use crate::error::{KvError, Result};

/// Longest key accepted by the engine
pub const MAX_KEY_LEN: usize = 2048;

/// Encoded size of a key: length prefix + fixed buffer
pub const KEY_INLINE_SIZE: usize = 4 + MAX_KEY_LEN;

/// Encoded size of a location
pub const LOCATION_SIZE: usize = 24;

// =============================================================================
// Key
// =============================================================================

/// An immutable key of at most `MAX_KEY_LEN` bytes.
///
/// Ordering is lexicographic by byte, a strict prefix sorting first.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key(Vec<u8>);

impl Key {
    /// Build a key, rejecting anything longer than `MAX_KEY_LEN`
    pub fn new(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > MAX_KEY_LEN {
            return Err(KvError::InvalidArgument(format!(
                "key of {} bytes exceeds the {} byte limit",
                bytes.len(),
                MAX_KEY_LEN
            )));
        }
        Ok(Self(bytes.to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Write the inline form into `out[..KEY_INLINE_SIZE]`
    pub(crate) fn encode_inline(&self, out: &mut [u8]) {
        let out = &mut out[..KEY_INLINE_SIZE];
        out[0..4].copy_from_slice(&(self.0.len() as u32).to_le_bytes());
        out[4..4 + self.0.len()].copy_from_slice(&self.0);
        out[4 + self.0.len()..].fill(0);
    }

    /// Read the inline form; `None` if the length prefix is out of range
    pub(crate) fn decode_inline(buf: &[u8]) -> Option<Self> {
        let len = u32::from_le_bytes(buf.get(0..4)?.try_into().ok()?) as usize;
        if len > MAX_KEY_LEN {
            return None;
        }
        Some(Self(buf.get(4..4 + len)?.to_vec()))
    }
}

impl Borrow<[u8]> for Key {
    fn borrow(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({:?})", String::from_utf8_lossy(&self.0))
    }
}

// =============================================================================
// Location
// =============================================================================

/// A byte range inside one store segment file.
///
/// Produced only by the store; everywhere else it is an opaque handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location {
    pub file: u64,
    pub offset: u64,
    pub length: u64,
}

impl Location {
    pub fn new(file: u64, offset: u64, length: u64) -> Self {
        Self { file, offset, length }
    }

    /// One past the last byte covered
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }

    /// True if both ranges live in the same file and share at least one byte
    pub fn overlaps(&self, other: &Location) -> bool {
        self.file == other.file && self.offset < other.end() && other.offset < self.end()
    }

    pub(crate) fn encode(&self, out: &mut [u8]) {
        out[0..8].copy_from_slice(&self.file.to_le_bytes());
        out[8..16].copy_from_slice(&self.offset.to_le_bytes());
        out[16..24].copy_from_slice(&self.length.to_le_bytes());
    }

    pub(crate) fn decode(buf: &[u8]) -> Option<Self> {
        let word = |at: usize| -> Option<u64> {
            Some(u64::from_le_bytes(buf.get(at..at + 8)?.try_into().ok()?))
        };
        Some(Self {
            file: word(0)?,
            offset: word(8)?,
            length: word(16)?,
        })
    }
}
