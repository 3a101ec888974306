//! Free-space allocator
//!
//! Best-fit placement over reusable regions of the segment files.

use std::collections::{BTreeMap, BTreeSet};

use crate::types::Location;

/// A reusable byte range, ordered by length first so a range query from
/// `(required, 0, 0)` yields the best fit
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct FreeRegion {
    length: u64,
    file: u64,
    offset: u64,
}

impl FreeRegion {
    fn location(&self) -> Location {
        Location::new(self.file, self.offset, self.length)
    }
}

/// Free regions plus the id of the next segment to open
#[derive(Debug)]
pub struct FreeSpace {
    regions: BTreeSet<FreeRegion>,
    next_file: u64,
    segment_max_size: u64,
}

impl FreeSpace {
    pub fn new(segment_max_size: u64, next_file: u64) -> Self {
        Self {
            regions: BTreeSet::new(),
            next_file,
            segment_max_size,
        }
    }

    /// Reserve `length` bytes.
    ///
    /// Takes the smallest region that fits and returns the remainder to the
    /// set. Without one, a new segment is started and its unused tail becomes
    /// a free region. `length` must not exceed the segment size.
    pub fn allocate(&mut self, length: u64) -> Location {
        debug_assert!(length <= self.segment_max_size);

        let probe = FreeRegion {
            length,
            file: 0,
            offset: 0,
        };
        let best = self.regions.range(probe..).next().copied();

        match best {
            Some(region) => {
                self.regions.remove(&region);
                let left = region.length - length;
                if left > 0 {
                    self.regions.insert(FreeRegion {
                        length: left,
                        file: region.file,
                        offset: region.offset + length,
                    });
                }
                Location::new(region.file, region.offset, length)
            }
            None => {
                let file = self.next_file;
                self.next_file += 1;
                let tail = self.segment_max_size - length;
                if tail > 0 {
                    self.regions.insert(FreeRegion {
                        length: tail,
                        file,
                        offset: length,
                    });
                }
                Location::new(file, 0, length)
            }
        }
    }

    /// Return a region for reuse. Empty regions are ignored.
    pub fn release(&mut self, location: Location) {
        if location.length == 0 {
            return;
        }
        self.regions.insert(FreeRegion {
            length: location.length,
            file: location.file,
            offset: location.offset,
        });
    }

    /// Replace the set with the gaps left by `used` in every segment below
    /// `next_file`.
    ///
    /// Each segment is assumed to span `[0, segment_max_size)`. Overlapping
    /// or duplicate used ranges are merged before subtraction.
    pub fn rebuild(&mut self, next_file: u64, used: impl IntoIterator<Item = Location>) {
        let mut per_file: BTreeMap<u64, Vec<(u64, u64)>> = BTreeMap::new();
        let mut next_file = next_file;

        for location in used.into_iter().filter(|loc| loc.length > 0) {
            next_file = next_file.max(location.file + 1);
            per_file
                .entry(location.file)
                .or_default()
                .push((location.offset, location.end()));
        }

        self.regions.clear();
        self.next_file = next_file;

        for file in 0..next_file {
            let mut ranges = per_file.remove(&file).unwrap_or_default();
            ranges.sort_unstable();

            let mut cursor = 0;
            for (start, end) in ranges {
                if start > cursor {
                    self.insert_gap(file, cursor, start);
                }
                cursor = cursor.max(end);
            }
            self.insert_gap(file, cursor, self.segment_max_size);
        }
    }

    /// Snapshot of all free regions as locations
    pub fn regions(&self) -> Vec<Location> {
        self.regions.iter().map(FreeRegion::location).collect()
    }

    /// Total free bytes across all regions
    pub fn free_bytes(&self) -> u64 {
        self.regions.iter().map(|region| region.length).sum()
    }

    pub fn next_file(&self) -> u64 {
        self.next_file
    }

    fn insert_gap(&mut self, file: u64, start: u64, end: u64) {
        let end = end.min(self.segment_max_size);
        if end > start {
            self.regions.insert(FreeRegion {
                length: end - start,
                file,
                offset: start,
            });
        }
    }
}
