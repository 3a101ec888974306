//! Journal
//!
//! The circular on-disk log paired with its in-memory mirror queue.

use std::collections::{HashSet, VecDeque};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::Duration;

use parking_lot::{Condvar, Mutex, RwLock, RwLockWriteGuard};

use crate::config::{Config, JournalSyncStrategy};
use crate::error::{KvError, Result};
use crate::types::{Key, Location};

use super::recovery::{self, RestoredLog};
use super::{JournalEntry, SLOT_SIZE};

/// A write waiting in the queue to be drained into the index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingWrite {
    pub key: Key,
    pub location: Location,

    /// Whether this location may be reclaimed once superseded.
    ///
    /// False only for recovered entries overwritten by a later recovered
    /// entry for the same key: their space was released before the restart.
    pub reclaimable: bool,
}

/// State guarded by the journal lock: the queue and the on-disk cursor
struct JournalState {
    queue: VecDeque<PendingWrite>,
    file: File,
    cursor: usize,
    next_ident: u64,
    unsynced: usize,
}

/// Fixed-capacity write-ahead log.
///
/// ## Concurrency:
/// - `state`: one RwLock over the queue and the file cursor. Pushes and
///   drains take it exclusively, `fetch` shares it.
/// - `notify_sync` / `notify_writers`: wake-up hints paired with `signal`.
///   Every wait is bounded, so a missed notification only costs one timeout.
pub struct Journal {
    state: RwLock<JournalState>,
    signal: Mutex<()>,
    notify_sync: Condvar,
    notify_writers: Condvar,
    capacity: usize,
    backoff: usize,
    sync_strategy: JournalSyncStrategy,
    writer_wait: Duration,
    sync_wait: Duration,
}

impl Journal {
    /// Open or create the journal and restore its queue from disk
    pub fn open(path: &Path, config: &Config) -> Result<Self> {
        let capacity = config.journal_capacity;
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        let mut image = Vec::new();
        (&mut file)
            .take((capacity * SLOT_SIZE) as u64)
            .read_to_end(&mut image)?;

        let slots: Vec<Option<JournalEntry>> =
            image.chunks(SLOT_SIZE).map(JournalEntry::decode).collect();
        let RestoredLog {
            entries,
            cursor,
            next_ident,
            discarded,
        } = recovery::restore(&slots, capacity);

        if discarded > 0 {
            tracing::warn!("Journal recovery dropped {} unverifiable slots", discarded);
        }
        tracing::info!(
            "Journal restored: {} entries, cursor at slot {}, next ident {}",
            entries.len(),
            cursor,
            next_ident
        );

        Ok(Self {
            state: RwLock::new(JournalState {
                queue: mark_reclaimable(entries),
                file,
                cursor,
                next_ident,
                unsynced: 0,
            }),
            signal: Mutex::new(()),
            notify_sync: Condvar::new(),
            notify_writers: Condvar::new(),
            capacity,
            backoff: config.journal_backoff,
            sync_strategy: config.journal_sync_strategy,
            writer_wait: config.writer_wait_timeout,
            sync_wait: config.sync_wait_timeout,
        })
    }

    /// Durably append an entry.
    ///
    /// Blocks, in bounded waits, while the queue is full. Returns once the
    /// entry is queued and written to its slot.
    pub fn push(&self, key: Key, location: Location) -> Result<()> {
        loop {
            {
                let mut state = self.state.write();
                let queued = state.queue.len();

                if queued + self.backoff >= self.capacity {
                    self.notify_sync.notify_one();
                }

                if queued < self.capacity {
                    return self.append(&mut state, key, location);
                }
            }

            let mut signal = self.signal.lock();
            self.notify_writers.wait_for(&mut signal, self.writer_wait);
        }
    }

    /// Write the slot at the cursor, then queue the entry.
    ///
    /// Once the slot bytes are written the entry is replayable, so it is
    /// queued even if the sync fails. That failure is reported as
    /// `KvError::Unsynced`.
    fn append(&self, state: &mut JournalState, key: Key, location: Location) -> Result<()> {
        let entry = JournalEntry::new(state.next_ident, key, location);

        state
            .file
            .seek(SeekFrom::Start((state.cursor * SLOT_SIZE) as u64))?;
        state.file.write_all(&entry.encode())?;

        state.next_ident = (state.next_ident + 1) % (self.capacity as u64 + 1);
        state.cursor = (state.cursor + 1) % self.capacity;
        state.queue.push_back(PendingWrite {
            key: entry.key,
            location: entry.location,
            reclaimable: true,
        });

        state.unsynced += 1;
        let due = match self.sync_strategy {
            JournalSyncStrategy::EveryWrite => true,
            JournalSyncStrategy::EveryNEntries { count } => state.unsynced >= count,
        };
        if due {
            state.file.sync_data().map_err(KvError::Unsynced)?;
            state.unsynced = 0;
        }

        Ok(())
    }

    /// Most recent queued location for `key`, newest first
    pub fn fetch(&self, key: &[u8]) -> Option<Location> {
        let state = self.state.read();
        state
            .queue
            .iter()
            .rev()
            .find(|pending| pending.key.as_bytes() == key)
            .map(|pending| pending.location)
    }

    /// Block the drainer until nudged or the sync timeout elapses, then hand
    /// out the queue under the exclusive lock
    pub fn wait_for_data(&self) -> JournalBatch<'_> {
        self.notify_writers.notify_all();
        {
            let mut signal = self.signal.lock();
            self.notify_sync.wait_for(&mut signal, self.sync_wait);
        }

        JournalBatch {
            journal: self,
            state: self.state.write(),
        }
    }

    /// Wake the drainer without pushing anything
    pub fn wake_drainer(&self) {
        self.notify_sync.notify_all();
    }

    /// Number of entries waiting to be drained
    pub fn pending_len(&self) -> usize {
        self.state.read().queue.len()
    }

    /// Snapshot of the queue, oldest to newest
    pub fn pending(&self) -> Vec<PendingWrite> {
        self.state.read().queue.iter().cloned().collect()
    }

    /// Locations still owned by queued writes
    pub fn reclaimable_locations(&self) -> Vec<Location> {
        self.state
            .read()
            .queue
            .iter()
            .filter(|pending| pending.reclaimable)
            .map(|pending| pending.location)
            .collect()
    }

    /// Force buffered journal writes to disk
    pub fn sync(&self) -> Result<()> {
        let mut state = self.state.write();
        state.file.sync_data()?;
        state.unsynced = 0;
        Ok(())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Exclusive access to the queue for one drain.
///
/// Writers and readers of the journal wait until the batch is cleared or
/// dropped. Dropping without `clear` keeps the entries for the next drain.
pub struct JournalBatch<'a> {
    journal: &'a Journal,
    state: RwLockWriteGuard<'a, JournalState>,
}

impl JournalBatch<'_> {
    pub fn entries(&self) -> impl Iterator<Item = &PendingWrite> {
        self.state.queue.iter()
    }

    pub fn len(&self) -> usize {
        self.state.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.queue.is_empty()
    }

    /// Drop the drained entries and wake blocked writers
    pub fn clear(mut self) {
        self.state.queue.clear();
        let journal = self.journal;
        drop(self);
        journal.notify_writers.notify_all();
    }
}

/// Recovered entries overwritten later in the same window lost their space
/// before the restart
fn mark_reclaimable(entries: Vec<JournalEntry>) -> VecDeque<PendingWrite> {
    let mut seen = HashSet::new();
    let mut queue: VecDeque<PendingWrite> = entries
        .into_iter()
        .rev()
        .map(|entry| PendingWrite {
            reclaimable: seen.insert(entry.key.clone()),
            key: entry.key,
            location: entry.location,
        })
        .collect();
    queue.make_contiguous().reverse();
    queue
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_journal(dir: &TempDir) -> Journal {
        let config = Config::builder()
            .journal_capacity(8)
            .journal_backoff(1)
            .journal_sync_strategy(JournalSyncStrategy::EveryWrite)
            .build();
        Journal::open(&dir.path().join("JOURNAL"), &config).unwrap()
    }

    fn key(name: &str) -> Key {
        Key::new(name.as_bytes()).unwrap()
    }

    /// Point the journal at a device file to make one step of `append` fail
    fn redirect(journal: &Journal, device: &str) {
        journal.state.write().file = OpenOptions::new().write(true).open(device).unwrap();
    }

    #[test]
    fn test_failed_slot_write_queues_nothing() {
        let dir = TempDir::new().unwrap();
        let journal = open_journal(&dir);
        journal.push(key("a"), Location::new(0, 0, 4)).unwrap();

        // Writes to /dev/full fail with ENOSPC
        redirect(&journal, "/dev/full");
        let result = journal.push(key("b"), Location::new(0, 4, 4));

        assert!(matches!(result, Err(KvError::Io(_))));
        assert!(!result.unwrap_err().is_recorded());
        assert_eq!(journal.pending_len(), 1);
        assert_eq!(journal.fetch(b"b"), None);
        assert_eq!(journal.state.read().cursor, 1);
    }

    #[test]
    fn test_failed_sync_keeps_written_entry() {
        let dir = TempDir::new().unwrap();
        let journal = open_journal(&dir);
        journal.push(key("a"), Location::new(0, 0, 4)).unwrap();

        // /dev/null accepts writes but rejects fdatasync
        redirect(&journal, "/dev/null");
        let result = journal.push(key("b"), Location::new(0, 4, 4));

        assert!(matches!(result, Err(KvError::Unsynced(_))));
        assert!(result.unwrap_err().is_recorded());
        assert_eq!(journal.pending_len(), 2);
        assert_eq!(journal.fetch(b"b"), Some(Location::new(0, 4, 4)));

        let state = journal.state.read();
        assert_eq!(state.cursor, 2);
        assert_eq!(state.next_ident, 2);
    }
}
