//! Store
//!
//! Value bytes in capped-size segment files named `0`, `1`, `2`, ...

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::config::{Config, JournalSyncStrategy};
use crate::error::{KvError, Result};
use crate::types::{Key, Location};

use super::FreeSpace;

/// Manages value storage across segment files
///
/// ## Concurrency:
/// - `free_space`: placement bookkeeping, released before any file I/O
/// - `file_lock`: serializes opening/creating segment handles only
/// - Each operation works on its own handle, so reads and writes to
///   disjoint regions proceed in parallel
pub struct Store {
    /// Directory holding the segment files
    base_dir: PathBuf,

    free_space: Mutex<FreeSpace>,

    file_lock: Mutex<()>,

    segment_max_size: u64,

    /// fsync value bytes before returning from `append`
    sync_writes: bool,
}

impl Store {
    /// Open or create the store directory.
    ///
    /// Existing segments are discovered so new ones continue after the
    /// highest id. The free-space set starts empty until `rebuild_free_space`.
    pub fn open(path: &Path, config: &Config) -> Result<Self> {
        fs::create_dir_all(path)?;

        let mut next_file = 0;
        let mut segments = 0usize;
        for entry in fs::read_dir(path)? {
            let file_path = entry?.path();
            if file_path.is_file() {
                if let Some(id) = Self::parse_segment_id(&file_path) {
                    next_file = next_file.max(id + 1);
                    segments += 1;
                }
            }
        }

        tracing::info!("Store opened: {} segments, next segment {}", segments, next_file);

        Ok(Self {
            base_dir: path.to_path_buf(),
            free_space: Mutex::new(FreeSpace::new(config.segment_max_size, next_file)),
            file_lock: Mutex::new(()),
            segment_max_size: config.segment_max_size,
            sync_writes: config.journal_sync_strategy == JournalSyncStrategy::EveryWrite,
        })
    }

    /// Write `value` somewhere and return where it landed
    pub fn append(&self, key: Key, value: &[u8]) -> Result<(Key, Location)> {
        let length = value.len() as u64;
        if length > self.segment_max_size {
            return Err(KvError::Storage(format!(
                "value of {} bytes does not fit a {} byte segment",
                length, self.segment_max_size
            )));
        }
        if length == 0 {
            return Ok((key, Location::new(0, 0, 0)));
        }

        let location = self.free_space.lock().allocate(length);

        let written = self.open_segment(location.file).and_then(|mut file| {
            file.seek(SeekFrom::Start(location.offset))?;
            file.write_all(value)?;
            if self.sync_writes {
                file.sync_data()?;
            }
            Ok(())
        });

        if let Err(e) = written {
            self.free_space.lock().release(location);
            return Err(e);
        }

        Ok((key, location))
    }

    /// Read exactly `location.length` bytes back
    pub fn fetch(&self, location: &Location) -> Result<Vec<u8>> {
        let mut value = vec![0u8; location.length as usize];
        if location.length == 0 {
            return Ok(value);
        }

        let mut file = self.open_segment(location.file)?;
        file.seek(SeekFrom::Start(location.offset))?;
        file.read_exact(&mut value)?;
        Ok(value)
    }

    /// Return regions for reuse by later appends
    pub fn free_up<'a>(&self, locations: impl IntoIterator<Item = &'a Location>) {
        let mut free_space = self.free_space.lock();
        for location in locations {
            free_space.release(*location);
        }
    }

    /// Derive the free-space set from every location still in use.
    ///
    /// Run once at open, before any append.
    pub fn rebuild_free_space(&self, used: impl IntoIterator<Item = Location>) {
        let mut free_space = self.free_space.lock();
        let next_file = free_space.next_file();
        free_space.rebuild(next_file, used);

        tracing::info!(
            "Free space rebuilt: {} regions, {} bytes, next segment {}",
            free_space.regions().len(),
            free_space.free_bytes(),
            free_space.next_file()
        );
    }

    /// Snapshot of the free regions
    pub fn free_regions(&self) -> Vec<Location> {
        self.free_space.lock().regions()
    }

    /// Get the store directory path
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Open a segment for read/write, creating it on first access
    fn open_segment(&self, id: u64) -> Result<File> {
        let _guard = self.file_lock.lock();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(self.segment_path(id))?;
        Ok(file)
    }

    fn segment_path(&self, id: u64) -> PathBuf {
        self.base_dir.join(id.to_string())
    }

    /// Parse a segment id from its file name
    /// "42" → Some(42)
    fn parse_segment_id(path: &Path) -> Option<u64> {
        path.file_name()?.to_str()?.parse().ok()
    }
}
