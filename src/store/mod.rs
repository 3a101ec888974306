//! Store Module
//!
//! Variable-length value storage with in-place reuse of freed regions.
//!
//! ## Responsibilities
//! - Place values into segment files with best-fit reuse of holes
//! - Read values back by location
//! - Take back regions that newer writes superseded
//! - Recompute free space from the live locations after a restart
//!
//! ## Layout
//! ```text
//! STORE/
//!   ├── 0      [value][value][ hole ][value] ... up to segment_max_size
//!   ├── 1
//!   └── ...
//! ```
//! Segments hold raw value bytes only; everything needed to find a value
//! lives in the journal and the index.

mod free_space;
mod segment;

pub use free_space::FreeSpace;
pub use segment::Store;
