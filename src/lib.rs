//! # RingKV
//!
//! An embedded key-value storage engine with:
//! - A fixed-capacity circular journal as the durability boundary
//! - A memory-mapped index from key to value location
//! - Segment-file value storage with best-fit reuse of freed space
//! - A background sync worker that drains the journal into the index
//!
//! ## Architecture Overview
//!
//! ```text
//!           write(key, value)                 read(key)
//!                  │                              │
//!      ┌───────────▼───────────┐      ┌───────────▼───────────┐
//!      │  Store::append        │      │  Journal::fetch       │
//!      │  (value → location)   │      │  (newest first)       │
//!      └───────────┬───────────┘      └───────────┬───────────┘
//!                  │                        miss  │
//!      ┌───────────▼───────────┐      ┌───────────▼───────────┐
//!      │  Journal::push        │      │  Index::get           │
//!      │  (durable here)       │      └───────────┬───────────┘
//!      └───────────┬───────────┘                  │
//!                  │                  ┌───────────▼───────────┐
//!      ┌───────────▼───────────┐      │  Store::fetch         │
//!      │  Sync worker          │      └───────────────────────┘
//!      │  dedupe → lossy_put   │
//!      │  → persist → free_up  │
//!      └───────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod types;

pub mod engine;
pub mod index;
pub mod journal;
pub mod store;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::{Config, JournalSyncStrategy};
pub use engine::{EngineRace, Visitor};
pub use error::{KvError, Result};
pub use types::{Key, Location, MAX_KEY_LEN};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of RingKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
