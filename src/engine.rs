//! Engine Module
//!
//! The storage engine that coordinates the journal, index and store.
//!
//! ## Responsibilities
//! - Open the on-disk structures and rebuild free space
//! - Serve concurrent writes and reads
//! - Run the sync worker that drains the journal into the index
//! - Reclaim store regions that newer writes superseded

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Mutex, RwLock};

use crate::config::Config;
use crate::error::{KvError, Result};
use crate::index::Index;
use crate::journal::{Journal, JournalBatch};
use crate::store::Store;
use crate::types::{Key, Location};

/// Receives the pairs visited by `EngineRace::range`
pub trait Visitor {
    fn visit(&mut self, key: &[u8], value: &[u8]);
}

/// State shared between callers and the sync worker
struct Shared {
    config: Config,
    journal: Journal,
    index: RwLock<Index>,
    store: Store,
    reclaimer: Mutex<Reclaimer>,
    halt: AtomicBool,
}

/// Decides which regions a drain may hand back to the store.
///
/// A region the index replaced stays reserved until the index change that
/// dropped it is persisted. Until then a crash would bring the old mapping
/// back.
#[derive(Debug, Default)]
struct Reclaimer {
    deferred: HashSet<Location>,
}

impl Reclaimer {
    /// Regions that are safe to free after a drain.
    ///
    /// `persisted` tells whether the index was flushed. Without a flush the
    /// replaced regions are held back for the next successful drain, and the
    /// in-batch superseded ones are dropped: the retained batch finds them
    /// again.
    fn settle(
        &mut self,
        persisted: bool,
        replaced: HashSet<Location>,
        superseded: HashSet<Location>,
    ) -> HashSet<Location> {
        if !persisted {
            self.deferred.extend(replaced);
            return HashSet::new();
        }

        let mut freed: HashSet<Location> = self.deferred.drain().collect();
        freed.extend(replaced);
        freed.extend(superseded);
        freed
    }

    fn deferred(&self) -> usize {
        self.deferred.len()
    }
}

/// The main storage engine
///
/// ## Concurrency Model
///
/// - **Writes**: append to the store, then push to the journal. The journal
///   lock linearizes writes; the index is not touched.
/// - **Reads**: journal queue under a shared lock, then the index under a
///   shared lock. The value is read with no lock held.
/// - **Sync worker**: the only index writer. Holds the journal batch for
///   the whole drain and takes the index, then the store, one at a time.
///   Nothing locks the journal while holding the index or the store.
pub struct EngineRace {
    shared: Arc<Shared>,
    sync_worker: Option<JoinHandle<()>>,
}

impl EngineRace {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const JOURNAL_FILE: &'static str = "JOURNAL";
    const INDEX_FILE: &'static str = "INDEX";
    const STORE_DIR: &'static str = "STORE";

    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Create the data directory
    /// 2. Restore the journal queue
    /// 3. Map the index
    /// 4. Open the store and rebuild its free space from the index and the
    ///    restored queue
    /// 5. Start the sync worker
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;

        let journal = Journal::open(&config.data_dir.join(Self::JOURNAL_FILE), &config)?;
        let index = Index::open(&config.data_dir.join(Self::INDEX_FILE), &config)?;
        let store = Store::open(&config.data_dir.join(Self::STORE_DIR), &config)?;

        store.rebuild_free_space(
            index
                .locations()
                .chain(journal.reclaimable_locations()),
        );

        let shared = Arc::new(Shared {
            config,
            journal,
            index: RwLock::new(index),
            store,
            reclaimer: Mutex::new(Reclaimer::default()),
            halt: AtomicBool::new(false),
        });

        let worker_state = Arc::clone(&shared);
        let sync_worker = thread::Builder::new()
            .name("ringkv-sync".to_string())
            .spawn(move || worker_state.run_sync_worker())?;

        tracing::info!("Engine opened at {}", shared.config.data_dir.display());

        Ok(Self {
            shared,
            sync_worker: Some(sync_worker),
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    /// Store a value.
    ///
    /// Durable once the journal push returns; the index catches up in the
    /// background. A `KvError::Unsynced` error means the value was recorded
    /// and is visible, but may not survive a crash.
    pub fn write(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let key = Key::new(key)?;
        if value.len() > self.shared.config.max_value_len {
            return Err(KvError::InvalidArgument(format!(
                "value of {} bytes exceeds the {} byte limit",
                value.len(),
                self.shared.config.max_value_len
            )));
        }

        let (key, location) = self.shared.store.append(key, value)?;
        if let Err(e) = self.shared.journal.push(key, location) {
            // A recorded entry still owns its region
            if !e.is_recorded() {
                self.shared.store.free_up(&[location]);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Read the latest value for `key`
    ///
    /// Search order:
    /// 1. Journal queue (writes not yet drained)
    /// 2. Index
    ///
    /// The location is resolved under a lock but the value bytes are read
    /// after it is released. If a concurrent overwrite is drained and its old
    /// region reused by another write in between, the returned bytes may
    /// belong to that other write.
    pub fn read(&self, key: &[u8]) -> Result<Vec<u8>> {
        match self.location_of(key)? {
            Some(location) => self.shared.store.fetch(&location),
            None => Err(KvError::NotFound),
        }
    }

    /// Where the latest value for `key` lives, if anywhere
    pub fn location_of(&self, key: &[u8]) -> Result<Option<Location>> {
        let key = Key::new(key)?;
        if let Some(location) = self.shared.journal.fetch(key.as_bytes()) {
            return Ok(Some(location));
        }
        Ok(self.shared.index.read().get(key.as_bytes()))
    }

    /// Visit every pair in `[lower, upper)`.
    ///
    /// Range scans are not supported by this engine: the call validates its
    /// bounds and visits nothing. Empty bounds mean unbounded.
    pub fn range(&self, lower: &[u8], upper: &[u8], _visitor: &mut dyn Visitor) -> Result<()> {
        Key::new(lower)?;
        Key::new(upper)?;
        Ok(())
    }

    /// Stop the sync worker after a final drain and flush everything
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        let Some(worker) = self.sync_worker.take() else {
            return Ok(());
        };

        self.shared.halt.store(true, Ordering::SeqCst);
        self.shared.journal.wake_drainer();
        if worker.join().is_err() {
            tracing::error!("Sync worker panicked");
        }

        self.shared.index.read().persist()?;
        self.shared.journal.sync()?;
        tracing::info!("Engine closed at {}", self.shared.config.data_dir.display());
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.shared.config.data_dir
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Writes waiting in the journal queue
    pub fn pending_writes(&self) -> usize {
        self.shared.journal.pending_len()
    }

    /// Number of keys in the index
    pub fn index_len(&self) -> usize {
        self.shared.index.read().len()
    }

    /// Snapshot of the store's free regions
    pub fn free_regions(&self) -> Vec<Location> {
        self.shared.store.free_regions()
    }

    /// Every key in the index with its location, in key order
    pub fn index_entries(&self) -> Vec<(Key, Location)> {
        self.shared
            .index
            .read()
            .iter()
            .map(|(key, location)| (key.clone(), location))
            .collect()
    }
}

impl Drop for EngineRace {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::error!("Engine shutdown failed: {}", e);
        }
    }
}

impl Shared {
    fn run_sync_worker(&self) {
        tracing::debug!("Sync worker started");
        loop {
            let batch = self.journal.wait_for_data();
            if let Err(e) = self.drain(batch) {
                tracing::error!("Journal drain failed, retrying: {}", e);
            }
            if self.halt.load(Ordering::SeqCst) {
                break;
            }
        }
        tracing::debug!("Sync worker stopped");
    }

    /// Apply a batch to the index and reclaim what it superseded.
    ///
    /// On failure the batch stays queued for the next pass and nothing is
    /// freed. Regions are only reclaimed after the index is persisted.
    fn drain(&self, batch: JournalBatch<'_>) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        // Last write per key wins; earlier ones in the batch are superseded
        let mut superseded: HashSet<Location> = HashSet::new();
        let mut net: Vec<(&Key, Location, bool)> = Vec::with_capacity(batch.len());
        let mut slot_of: HashMap<&Key, usize> = HashMap::with_capacity(batch.len());
        for pending in batch.entries() {
            match slot_of.get(&pending.key) {
                Some(&slot) => {
                    let (_, previous, reclaimable) = net[slot];
                    if reclaimable && previous != pending.location {
                        superseded.insert(previous);
                    }
                    net[slot] = (&pending.key, pending.location, pending.reclaimable);
                }
                None => {
                    slot_of.insert(&pending.key, net.len());
                    net.push((&pending.key, pending.location, pending.reclaimable));
                }
            }
        }

        let mut replaced: HashSet<Location> = HashSet::new();
        let applied = {
            let mut index = self.index.write();
            Self::apply(&mut index, &net, &mut replaced).and_then(|()| index.persist())
        };
        let updates = net.len();

        let freed = self
            .reclaimer
            .lock()
            .settle(applied.is_ok(), replaced, superseded);

        match applied {
            Ok(()) => {
                self.store.free_up(&freed);

                let drained = batch.len();
                batch.clear();
                tracing::debug!(
                    "Journal drained: {} entries, {} index updates, {} regions freed",
                    drained,
                    updates,
                    freed.len()
                );
                Ok(())
            }
            Err(e) => {
                drop(batch);
                tracing::warn!(
                    "Holding {} replaced regions until the index is persisted",
                    self.reclaimer.lock().deferred()
                );
                Err(e)
            }
        }
    }

    fn apply(
        index: &mut Index,
        net: &[(&Key, Location, bool)],
        replaced: &mut HashSet<Location>,
    ) -> Result<()> {
        index.check_free_space()?;
        for &(key, location, _) in net {
            if let Some(previous) = index.lossy_put(key.clone(), location)? {
                if previous != location {
                    replaced.insert(previous);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(locations: &[Location]) -> HashSet<Location> {
        locations.iter().copied().collect()
    }

    #[test]
    fn test_settle_frees_replaced_and_superseded_after_persist() {
        let mut reclaimer = Reclaimer::default();
        let replaced = Location::new(0, 0, 10);
        let superseded = Location::new(0, 10, 5);

        let freed = reclaimer.settle(true, set(&[replaced]), set(&[superseded]));

        assert_eq!(freed, set(&[replaced, superseded]));
        assert_eq!(reclaimer.deferred(), 0);
    }

    #[test]
    fn test_settle_frees_nothing_when_persist_failed() {
        let mut reclaimer = Reclaimer::default();
        let replaced = Location::new(0, 0, 10);
        let superseded = Location::new(0, 10, 5);

        let freed = reclaimer.settle(false, set(&[replaced]), set(&[superseded]));

        assert!(freed.is_empty());
        assert_eq!(reclaimer.deferred(), 1);
    }

    #[test]
    fn test_deferred_regions_released_by_next_persist() {
        let mut reclaimer = Reclaimer::default();
        let first = Location::new(0, 0, 10);
        let second = Location::new(1, 0, 10);

        // The retry no longer sees `first` as replaced: the index already
        // points past it in memory
        reclaimer.settle(false, set(&[first]), HashSet::new());
        reclaimer.settle(false, set(&[second]), HashSet::new());
        let freed = reclaimer.settle(true, HashSet::new(), HashSet::new());

        assert_eq!(freed, set(&[first, second]));
        assert_eq!(reclaimer.deferred(), 0);
        assert!(reclaimer.settle(true, HashSet::new(), HashSet::new()).is_empty());
    }

    #[test]
    fn test_settle_deduplicates_regions() {
        let mut reclaimer = Reclaimer::default();
        let region = Location::new(2, 64, 8);

        reclaimer.settle(false, set(&[region]), HashSet::new());
        let freed = reclaimer.settle(true, set(&[region]), set(&[region]));

        assert_eq!(freed.len(), 1);
    }
}
