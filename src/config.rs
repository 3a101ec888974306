//! Configuration for RingKV
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{KvError, Result};

/// Main configuration for a RingKV instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── JOURNAL        (circular write-ahead log)
    ///     ├── INDEX          (memory-mapped key → location map)
    ///     └── STORE/         (numbered value segments: 0, 1, 2, ...)
    pub data_dir: PathBuf,

    /// Largest accepted value (in bytes)
    pub max_value_len: usize,

    /// Capacity of one segment file (in bytes)
    pub segment_max_size: u64,

    // -------------------------------------------------------------------------
    // Journal Configuration
    // -------------------------------------------------------------------------
    /// Number of fixed-size slots in the circular journal
    pub journal_capacity: usize,

    /// Once the queue is within this many entries of capacity, writers nudge
    /// the sync worker
    pub journal_backoff: usize,

    /// Sync strategy: how often to fsync the journal
    pub journal_sync_strategy: JournalSyncStrategy,

    /// Bounded wait of a writer blocked on a full journal
    pub writer_wait_timeout: Duration,

    /// Bounded wait of the sync worker between drains
    pub sync_wait_timeout: Duration,

    // -------------------------------------------------------------------------
    // Index Configuration
    // -------------------------------------------------------------------------
    /// Size of a freshly created index file (in bytes)
    pub index_initial_size: u64,

    /// Grow the index once fewer than this many bytes are free
    pub index_grow_threshold: u64,

    /// Bytes added to the index file on each growth
    pub index_grow_chunk: u64,
}

/// Journal sync strategy
///
/// Every push reaches the operating system before it returns; the strategy
/// only controls when the file is additionally fsynced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalSyncStrategy {
    /// fsync after every write, including the value bytes (safest, slowest)
    EveryWrite,

    /// fsync after N unsynced entries (balanced durability/performance)
    EveryNEntries { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./ringkv_data"),
            max_value_len: 5_120_000,
            segment_max_size: 10_000_000,
            journal_capacity: 128,
            journal_backoff: 16,
            journal_sync_strategy: JournalSyncStrategy::EveryNEntries { count: 100 },
            writer_wait_timeout: Duration::from_millis(1),
            sync_wait_timeout: Duration::from_micros(100),
            index_initial_size: 1024 * 1024,        // 1 MB
            index_grow_threshold: 65536 * 16,       // 1 MB
            index_grow_chunk: 65536 * 256,          // 16 MB
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject combinations the engine can not run with
    pub fn validate(&self) -> Result<()> {
        if self.journal_capacity == 0 {
            return Err(KvError::Config("journal_capacity must be at least 1".into()));
        }
        if self.journal_backoff >= self.journal_capacity {
            return Err(KvError::Config(format!(
                "journal_backoff ({}) must be smaller than journal_capacity ({})",
                self.journal_backoff, self.journal_capacity
            )));
        }
        if let JournalSyncStrategy::EveryNEntries { count: 0 } = self.journal_sync_strategy {
            return Err(KvError::Config("sync every 0 entries is meaningless".into()));
        }
        if self.segment_max_size == 0 {
            return Err(KvError::Config("segment_max_size must be positive".into()));
        }
        if self.max_value_len as u64 > self.segment_max_size {
            return Err(KvError::Config(format!(
                "max_value_len ({}) exceeds segment_max_size ({})",
                self.max_value_len, self.segment_max_size
            )));
        }
        if self.index_grow_chunk == 0 || self.index_initial_size == 0 {
            return Err(KvError::Config("index sizes must be positive".into()));
        }
        if self.writer_wait_timeout.is_zero() || self.sync_wait_timeout.is_zero() {
            return Err(KvError::Config("wait timeouts must be non-zero".into()));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the largest accepted value length (in bytes)
    pub fn max_value_len(mut self, len: usize) -> Self {
        self.config.max_value_len = len;
        self
    }

    /// Set the per-segment capacity (in bytes)
    pub fn segment_max_size(mut self, size: u64) -> Self {
        self.config.segment_max_size = size;
        self
    }

    /// Set the number of journal slots
    pub fn journal_capacity(mut self, slots: usize) -> Self {
        self.config.journal_capacity = slots;
        self
    }

    /// Set the journal backoff margin
    pub fn journal_backoff(mut self, slots: usize) -> Self {
        self.config.journal_backoff = slots;
        self
    }

    /// Set the journal sync strategy
    pub fn journal_sync_strategy(mut self, strategy: JournalSyncStrategy) -> Self {
        self.config.journal_sync_strategy = strategy;
        self
    }

    pub fn writer_wait_timeout(mut self, timeout: Duration) -> Self {
        self.config.writer_wait_timeout = timeout;
        self
    }

    pub fn sync_wait_timeout(mut self, timeout: Duration) -> Self {
        self.config.sync_wait_timeout = timeout;
        self
    }

    /// Set the size of a fresh index file (in bytes)
    pub fn index_initial_size(mut self, size: u64) -> Self {
        self.config.index_initial_size = size;
        self
    }

    /// Set the free-space threshold that triggers index growth (in bytes)
    pub fn index_grow_threshold(mut self, size: u64) -> Self {
        self.config.index_grow_threshold = size;
        self
    }

    /// Set the index growth increment (in bytes)
    pub fn index_grow_chunk(mut self, size: u64) -> Self {
        self.config.index_grow_chunk = size;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
