//! Error types for RingKV
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using KvError
pub type Result<T> = std::result::Result<T, KvError>;

/// Unified error type for RingKV operations
#[derive(Debug, Error)]
pub enum KvError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The journal slot was written and queued, but forcing it to disk failed.
    /// The write is not rolled back.
    #[error("Journal sync failed after the entry was recorded: {0}")]
    Unsynced(std::io::Error),

    // -------------------------------------------------------------------------
    // Lookup Errors
    // -------------------------------------------------------------------------
    #[error("Key not found")]
    NotFound,

    // -------------------------------------------------------------------------
    // Argument Errors
    // -------------------------------------------------------------------------
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // -------------------------------------------------------------------------
    // Index / Storage Errors
    // -------------------------------------------------------------------------
    #[error("Index error: {0}")]
    Index(String),

    #[error("Storage error: {0}")]
    Storage(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl KvError {
    /// True when a read found no value for the key
    pub fn is_not_found(&self) -> bool {
        matches!(self, KvError::NotFound)
    }

    /// True when the write took effect even though an error was reported
    pub fn is_recorded(&self) -> bool {
        matches!(self, KvError::Unsynced(_))
    }
}
