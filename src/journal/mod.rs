//! Journal Module
//!
//! The write-ahead log: the durability boundary of a write.
//!
//! ## Responsibilities
//! - Record `(key, location)` pairs before they reach the index
//! - Serve the freshest not-yet-drained writes to readers
//! - Apply backpressure when the drainer falls behind
//! - Rebuild the queue after a crash
//!
//! ## File Format
//! A fixed number of fixed-size slots, written in order and wrapping back to
//! slot 0 after the last one:
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Slot 0                                                       │
//! │ ┌───────────┬──────────────────────┬─────────────┬─────────┐ │
//! │ │ Ident (8) │ Key (4 + 2048)       │ Location(24)│ CRC (4) │ │
//! │ └───────────┴──────────────────────┴─────────────┴─────────┘ │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Slot 1 ...                                                   │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Slot capacity-1                                              │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod entry;
mod log;
mod recovery;

pub use entry::{JournalEntry, SLOT_SIZE};
pub use log::{Journal, JournalBatch, PendingWrite};
pub use recovery::{restore, RestoredLog};
