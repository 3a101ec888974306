//! Journal Recovery
//!
//! Rebuilds the in-memory queue from the slots of the circular log.
//!
//! Idents advance by one per push modulo `capacity + 1`, one more value than
//! there are slots. After the log has wrapped, the slot that is about to be
//! overwritten therefore never carries the successor ident of the slot before
//! it, and the first such break marks the oldest entry.

use super::JournalEntry;

/// Result of scanning the on-disk log
#[derive(Debug)]
pub struct RestoredLog {
    /// Valid entries, oldest to newest
    pub entries: Vec<JournalEntry>,

    /// Slot the next push writes to
    pub cursor: usize,

    /// Ident the next push carries
    pub next_ident: u64,

    /// Slots that held no verifiable entry
    pub discarded: usize,
}

/// Restore the replay order from decoded slots.
///
/// `slots` holds at most `capacity` items in physical order; `None` marks a
/// slot whose contents could not be validated. Fewer than `capacity` slots
/// means the log never wrapped.
pub fn restore(slots: &[Option<JournalEntry>], capacity: usize) -> RestoredLog {
    let modulus = capacity as u64 + 1;

    if slots.len() < capacity {
        // Never wrapped: the valid prefix, in physical order
        let valid = slots.iter().take_while(|slot| slot.is_some()).count();
        let entries: Vec<JournalEntry> = slots[..valid].iter().flatten().cloned().collect();
        let next_ident = entries
            .last()
            .map(|newest| (newest.ident + 1) % modulus)
            .unwrap_or(0);

        return RestoredLog {
            entries,
            cursor: valid,
            next_ident,
            discarded: slots.len() - valid,
        };
    }

    let slots = &slots[..capacity];

    // No break means the log is exactly full and slot 0 is the oldest
    let start = (1..capacity)
        .find(|&i| !follows(&slots[i - 1], &slots[i], modulus))
        .unwrap_or(0);

    let mut entries = Vec::with_capacity(capacity);
    let mut newest = None;
    for step in 0..capacity {
        let pos = (start + step) % capacity;
        if let Some(entry) = &slots[pos] {
            entries.push(entry.clone());
            newest = Some((pos, entry.ident));
        }
    }

    let (cursor, next_ident) = match newest {
        Some((pos, ident)) => ((pos + 1) % capacity, (ident + 1) % modulus),
        None => (0, 0),
    };

    RestoredLog {
        discarded: capacity - entries.len(),
        entries,
        cursor,
        next_ident,
    }
}

fn follows(prev: &Option<JournalEntry>, cur: &Option<JournalEntry>, modulus: u64) -> bool {
    match (prev, cur) {
        (Some(prev), Some(cur)) => cur.ident == (prev.ident + 1) % modulus,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Key, Location};

    fn entry(seq: u64, ident: u64) -> JournalEntry {
        let key = Key::new(format!("key-{}", seq).as_bytes()).unwrap();
        JournalEntry::new(ident, key, Location::new(0, seq * 10, 10))
    }

    /// Lay out `pushes` entries the way the live journal writes them
    fn simulate(capacity: usize, pushes: u64) -> (Vec<Option<JournalEntry>>, Vec<JournalEntry>) {
        let modulus = capacity as u64 + 1;
        let mut slots: Vec<Option<JournalEntry>> = Vec::new();
        let mut written = Vec::new();
        for seq in 0..pushes {
            let e = entry(seq, seq % modulus);
            let pos = (seq % capacity as u64) as usize;
            if pos == slots.len() {
                slots.push(Some(e.clone()));
            } else {
                slots[pos] = Some(e.clone());
            }
            written.push(e);
        }
        (slots, written)
    }

    #[test]
    fn test_empty_log() {
        let restored = restore(&[], 8);
        assert!(restored.entries.is_empty());
        assert_eq!(restored.cursor, 0);
        assert_eq!(restored.next_ident, 0);
    }

    #[test]
    fn test_replay_matches_last_window_for_every_fill_level() {
        let capacity = 5;
        for pushes in 0..(capacity as u64 * 4) {
            let (slots, written) = simulate(capacity, pushes);
            let restored = restore(&slots, capacity);

            let keep = written.len().min(capacity);
            let expected = &written[written.len() - keep..];
            assert_eq!(restored.entries, expected, "pushes = {}", pushes);
            assert_eq!(restored.cursor, (pushes % capacity as u64) as usize);
            assert_eq!(restored.next_ident, pushes % (capacity as u64 + 1));
            assert_eq!(restored.discarded, 0);
        }
    }

    #[test]
    fn test_wrap_point_starts_replay() {
        // Slots 0-1 hold the new generation, 2-3 the previous one
        let slots = vec![Some(entry(4, 4)), Some(entry(5, 0)), Some(entry(2, 2)), Some(entry(3, 3))];
        let restored = restore(&slots, 4);

        let order: Vec<u64> = restored.entries.iter().map(|e| e.ident).collect();
        assert_eq!(order, vec![2, 3, 4, 0]);
        assert_eq!(restored.cursor, 2);
        assert_eq!(restored.next_ident, 1);
    }

    #[test]
    fn test_resumed_ident_is_not_held_by_a_readable_entry() {
        for pushes in 0..20u64 {
            let (slots, _) = simulate(4, pushes);
            let restored = restore(&slots, 4);
            assert!(
                restored.entries.iter().all(|e| e.ident != restored.next_ident),
                "pushes = {}",
                pushes
            );
        }
    }

    #[test]
    fn test_exactly_full_log_resumes_at_slot_zero() {
        let (slots, written) = simulate(4, 4);
        let restored = restore(&slots, 4);
        assert_eq!(restored.entries, written);
        assert_eq!(restored.cursor, 0);
        assert_eq!(restored.next_ident, 4);
    }

    #[test]
    fn test_torn_tail_before_wrap_is_dropped() {
        let (mut slots, written) = simulate(8, 3);
        slots.push(None);
        let restored = restore(&slots, 8);
        assert_eq!(restored.entries, written);
        assert_eq!(restored.cursor, 3);
        assert_eq!(restored.discarded, 1);
    }

    #[test]
    fn test_torn_slot_at_wrap_point_is_dropped() {
        // 6 pushes into 4 slots, the 7th torn while overwriting slot 2
        let (mut slots, written) = simulate(4, 6);
        slots[2] = None;
        let restored = restore(&slots, 4);

        assert_eq!(restored.entries, &written[3..]);
        assert_eq!(restored.cursor, 2);
        assert_eq!(restored.next_ident, 6 % 5);
        assert_eq!(restored.discarded, 1);
    }

    #[test]
    fn test_torn_first_slot_after_full_log() {
        let (mut slots, written) = simulate(4, 4);
        slots[0] = None;
        let restored = restore(&slots, 4);

        assert_eq!(restored.entries, &written[1..]);
        assert_eq!(restored.cursor, 0);
        assert_eq!(restored.next_ident, 4);
    }
}
