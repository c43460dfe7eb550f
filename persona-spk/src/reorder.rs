//! In-order release of out-of-order completions

use std::collections::BTreeMap;

/// Holds completed items until every lower sequence index has been released
#[derive(Debug)]
pub struct ReorderBuffer<T> {
    next: u64,
    pending: BTreeMap<u64, T>,
}

impl<T> ReorderBuffer<T> {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    pub fn starting_at(next: u64) -> Self {
        Self {
            next,
            pending: BTreeMap::new(),
        }
    }

    /// Store a completion. Returns false when `sequence` was already
    /// released or is already buffered; the item is dropped in that case.
    pub fn insert(&mut self, sequence: u64, item: T) -> bool {
        if sequence < self.next || self.pending.contains_key(&sequence) {
            return false;
        }
        self.pending.insert(sequence, item);
        true
    }

    /// Next item in sequence order, if it has completed
    pub fn pop_ready(&mut self) -> Option<T> {
        let item = self.pending.remove(&self.next)?;
        self.next += 1;
        Some(item)
    }

    /// Longest run of consecutive completed items starting at the next expected index
    pub fn drain_ready(&mut self) -> Vec<T> {
        std::iter::from_fn(|| self.pop_ready()).collect()
    }

    pub fn next_sequence(&self) -> u64 {
        self.next
    }

    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

impl<T> Default for ReorderBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}
