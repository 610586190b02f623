use crate::model::{overlaps, JournalEntry};
use std::collections::VecDeque;
use std::time::Instant;

/// Completed items still relevant as dedup context.
///
/// Owned by the worker thread alone. Entries are appended in completion order,
/// so `ended_at` never decreases from front to back.
#[derive(Debug)]
pub struct Journal<T> {
    entries: VecDeque<JournalEntry<T>>,
}

impl<T> Journal<T> {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Results of every entry that finished after `started_at`, in completion order
    pub fn overlapping(&self, started_at: Instant) -> Vec<&T> {
        self.entries
            .iter()
            .filter(|entry| overlaps(started_at, entry.ended_at))
            .map(|entry| &entry.result)
            .collect()
    }

    pub fn append(&mut self, entry: JournalEntry<T>) {
        debug_assert!(
            self.entries
                .back()
                .map_or(true, |last| last.ended_at <= entry.ended_at),
            "journal entries must be appended in completion order"
        );
        self.entries.push_back(entry);
    }

    /// Drop every entry no pending submission can overlap.
    ///
    /// `earliest_pending` is the smallest start time among queued and in-flight
    /// submissions; `None` means nothing is pending and the journal empties.
    /// Returns the number of entries removed.
    pub fn prune(&mut self, earliest_pending: Option<Instant>) -> usize {
        let before = self.entries.len();
        match earliest_pending {
            None => self.entries.clear(),
            Some(started_at) => {
                // An entry that ended no later than the earliest pending start
                // cannot overlap any pending submission, and neither can any
                // entry that ended before it.
                while self
                    .entries
                    .front()
                    .is_some_and(|entry| !overlaps(started_at, entry.ended_at))
                {
                    self.entries.pop_front();
                }
            }
        }
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &JournalEntry<T>> {
        self.entries.iter()
    }
}

impl<T> Default for Journal<T> {
    fn default() -> Self {
        Self::new()
    }
}
