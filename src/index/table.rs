//! Index implementation
//!
//! Fixed-width records in a memory-mapped file, with an ordered map over
//! them rebuilt at open.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use memmap2::{MmapMut, MmapOptions};

use crate::config::Config;
use crate::error::{KvError, Result};
use crate::types::{Key, Location, KEY_INLINE_SIZE, LOCATION_SIZE};

use super::{HEADER_SIZE, MAGIC, RECORD_SIZE};

/// Where a key's record lives and what it currently points at
#[derive(Debug, Clone, Copy)]
struct Slot {
    record: u64,
    location: Location,
}

/// Durable key → location map.
///
/// Not internally synchronized: the engine wraps it in an RwLock (shared for
/// lookups, exclusive for drains and growth).
pub struct Index {
    path: PathBuf,
    file: File,
    mmap: MmapMut,
    entries: BTreeMap<Key, Slot>,
    record_count: u64,
    grow_threshold: u64,
    grow_chunk: u64,
}

impl Index {
    /// Open or create the index file.
    ///
    /// A missing, truncated or foreign file is replaced by a fresh region of
    /// `index_initial_size` bytes.
    pub fn open(path: &Path, config: &Config) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        let initial_size = config.index_initial_size.max(HEADER_SIZE + RECORD_SIZE);
        let on_disk = file.metadata().map(|meta| meta.len()).unwrap_or(0);

        let mut mmap = if on_disk >= HEADER_SIZE {
            map(&file)?
        } else {
            file.set_len(initial_size)?;
            let mut fresh = map(&file)?;
            format_header(&mut fresh);
            fresh
        };

        if mmap[..MAGIC.len()] != MAGIC[..] {
            tracing::warn!("Index header at {} unrecognized, reformatting", path.display());
            drop(mmap);
            file.set_len(0)?;
            file.set_len(initial_size)?;
            mmap = map(&file)?;
            format_header(&mut mmap);
        }

        let mut index = Self {
            path: path.to_path_buf(),
            file,
            mmap,
            entries: BTreeMap::new(),
            record_count: 0,
            grow_threshold: config.index_grow_threshold,
            grow_chunk: config.index_grow_chunk,
        };
        index.load();

        tracing::info!(
            "Index loaded: {} entries, {} bytes mapped",
            index.entries.len(),
            index.mmap.len()
        );
        Ok(index)
    }

    /// Current location for `key`
    pub fn get(&self, key: &[u8]) -> Option<Location> {
        self.entries.get(key).map(|slot| slot.location)
    }

    /// Insert or overwrite, surfacing the replaced location once.
    pub fn lossy_put(&mut self, key: Key, location: Location) -> Result<Option<Location>> {
        if let Some(slot) = self.entries.get_mut(&key) {
            let previous = std::mem::replace(&mut slot.location, location);
            let record = slot.record;
            self.write_location(record, location);
            return Ok(Some(previous));
        }

        if self.free_bytes() < RECORD_SIZE {
            self.grow(self.grow_chunk.max(RECORD_SIZE))?;
        }

        let record = self.record_count;
        self.write_key(record, &key);
        self.write_location(record, location);
        self.record_count += 1;
        self.write_count();

        self.entries.insert(key, Slot { record, location });
        Ok(None)
    }

    /// Flush the mapped region to disk
    pub fn persist(&self) -> Result<()> {
        self.mmap.flush()?;
        Ok(())
    }

    /// Grow the backing file when headroom drops below the threshold.
    ///
    /// Returns whether the region was remapped.
    pub fn check_free_space(&mut self) -> Result<bool> {
        if self.free_bytes() >= self.grow_threshold {
            return Ok(false);
        }
        self.grow(self.grow_chunk)?;
        Ok(true)
    }

    /// All mapped locations, in key order
    pub fn locations(&self) -> impl Iterator<Item = Location> + '_ {
        self.entries.values().map(|slot| slot.location)
    }

    /// All entries, in key order
    pub fn iter(&self) -> impl Iterator<Item = (&Key, Location)> + '_ {
        self.entries.iter().map(|(key, slot)| (key, slot.location))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Size of the mapped region in bytes
    pub fn mapped_size(&self) -> u64 {
        self.mmap.len() as u64
    }

    /// Unused bytes after the last record
    pub fn free_bytes(&self) -> u64 {
        (self.mmap.len() as u64).saturating_sub(HEADER_SIZE + self.record_count * RECORD_SIZE)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn load(&mut self) {
        let stored = read_u64(&self.mmap, MAGIC.len());
        let fits = (self.mmap.len() as u64 - HEADER_SIZE) / RECORD_SIZE;
        if stored > fits {
            tracing::warn!("Index claims {} records but only {} fit, truncating", stored, fits);
        }
        self.record_count = stored.min(fits);

        for record in 0..self.record_count {
            let at = record_offset(record);
            let key = Key::decode_inline(&self.mmap[at..at + KEY_INLINE_SIZE]);
            let location = Location::decode(&self.mmap[at + KEY_INLINE_SIZE..at + RECORD_SIZE as usize]);
            match (key, location) {
                (Some(key), Some(location)) => {
                    self.entries.insert(key, Slot { record, location });
                }
                _ => tracing::warn!("Skipping unreadable index record {}", record),
            }
        }
    }

    fn grow(&mut self, by: u64) -> Result<()> {
        self.mmap.flush()?;
        let new_len = self.mmap.len() as u64 + by;
        self.file.set_len(new_len)?;
        self.mmap = map(&self.file)?;

        if self.free_bytes() < RECORD_SIZE {
            return Err(KvError::Index(format!(
                "grew to {} bytes but no room for a record",
                new_len
            )));
        }
        tracing::debug!("Index grown to {} bytes", new_len);
        Ok(())
    }

    fn write_key(&mut self, record: u64, key: &Key) {
        let at = record_offset(record);
        key.encode_inline(&mut self.mmap[at..at + KEY_INLINE_SIZE]);
    }

    fn write_location(&mut self, record: u64, location: Location) {
        let at = record_offset(record) + KEY_INLINE_SIZE;
        location.encode(&mut self.mmap[at..at + LOCATION_SIZE]);
    }

    fn write_count(&mut self) {
        let at = MAGIC.len();
        self.mmap[at..at + 8].copy_from_slice(&self.record_count.to_le_bytes());
    }
}

impl Drop for Index {
    fn drop(&mut self) {
        if let Err(e) = self.mmap.flush() {
            tracing::error!("Failed to flush index {}: {}", self.path.display(), e);
        }
    }
}

fn map(file: &File) -> Result<MmapMut> {
    // SAFETY: the index file belongs to this engine directory and is only
    // resized through `&mut Index`, after which the map is replaced.
    let mmap = unsafe { MmapOptions::new().map_mut(file)? };
    Ok(mmap)
}

fn format_header(mmap: &mut MmapMut) {
    mmap[..HEADER_SIZE as usize].fill(0);
    mmap[..MAGIC.len()].copy_from_slice(MAGIC);
}

fn record_offset(record: u64) -> usize {
    (HEADER_SIZE + record * RECORD_SIZE) as usize
}

fn read_u64(buf: &[u8], at: usize) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(word)
}
