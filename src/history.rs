//! Bounded undo/redo history of region-list snapshots

use chrono::{DateTime, Utc};

use crate::constants;
use crate::types::Region;

/// Point-in-time copy of a layout's region list
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub regions: Vec<Region>,
    pub taken_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(regions: Vec<Region>) -> Self {
        Self {
            regions,
            taken_at: Utc::now(),
        }
    }

    /// True when both lists show the same regions in the same order
    pub fn same_content(&self, regions: &[Region]) -> bool {
        self.regions.len() == regions.len()
            && self.regions.iter().zip(regions).all(|(a, b)| a.same_content(b))
    }
}

/// The last entry of `past` is the present; `future` holds undone states
#[derive(Debug)]
pub struct SnapshotHistory {
    past: Vec<Snapshot>,
    future: Vec<Snapshot>,
    max_entries: usize,
}

impl Default for SnapshotHistory {
    fn default() -> Self {
        Self::new(constants::history::LIMIT)
    }
}

impl SnapshotHistory {
    pub fn new(max_entries: usize) -> Self {
        Self {
            past: Vec::new(),
            future: Vec::new(),
            max_entries: max_entries.max(2),
        }
    }

    /// Drop all history and start again from `base`
    pub fn reset(&mut self, base: Vec<Region>) {
        self.past.clear();
        self.future.clear();
        self.past.push(Snapshot::new(base));
    }

    /// Record the present. Returns false when it matches the latest snapshot
    pub fn record(&mut self, regions: &[Region]) -> bool {
        if self.past.last().is_some_and(|s| s.same_content(regions)) {
            return false;
        }
        self.past.push(Snapshot::new(regions.to_vec()));
        self.future.clear();

        if self.past.len() > self.max_entries {
            self.past.remove(0);
        }
        true
    }

    /// Step back one snapshot, returning the state to show
    pub fn undo(&mut self) -> Option<&Snapshot> {
        if self.past.len() < 2 {
            return None;
        }
        let present = self.past.pop()?;
        self.future.push(present);
        self.past.last()
    }

    /// Step forward one snapshot, returning the state to show
    pub fn redo(&mut self) -> Option<&Snapshot> {
        let next = self.future.pop()?;
        self.past.push(next);
        self.past.last()
    }

    /// Most recent snapshot (the recorded present)
    pub fn latest(&self) -> Option<&Snapshot> {
        self.past.last()
    }

    pub fn can_undo(&self) -> bool {
        self.past.len() >= 2
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    pub fn len(&self) -> usize {
        self.past.len() + self.future.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rewrite a region id in every stored snapshot
    pub fn rename_region(&mut self, old: &str, new: &str) {
        for snapshot in self.past.iter_mut().chain(self.future.iter_mut()) {
            for region in snapshot.regions.iter_mut().filter(|r| r.id == old) {
                region.id = new.to_string();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::tests::region;

    fn state(col: u32) -> Vec<Region> {
        vec![region("a", 0, col, 2, 4)]
    }

    #[test]
    fn test_undo_needs_two_snapshots() {
        let mut history = SnapshotHistory::default();
        history.reset(state(0));
        assert!(!history.can_undo());
        assert!(history.undo().is_none());
    }

    #[test]
    fn test_undo_then_redo() {
        let mut history = SnapshotHistory::default();
        history.reset(state(0));
        history.record(&state(1));
        history.record(&state(2));

        let undone = history.undo().unwrap();
        assert_eq!(undone.regions[0].grid_col, 1);
        assert!(history.can_redo());

        let redone = history.redo().unwrap();
        assert_eq!(redone.regions[0].grid_col, 2);
        assert!(!history.can_redo());
    }

    #[test]
    fn test_record_skips_duplicates() {
        let mut history = SnapshotHistory::default();
        history.reset(state(0));
        assert!(!history.record(&state(0)));
        assert!(history.record(&state(1)));
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_record_clears_redo() {
        let mut history = SnapshotHistory::default();
        history.reset(state(0));
        history.record(&state(1));
        history.undo();
        assert!(history.can_redo());

        history.record(&state(5));
        assert!(!history.can_redo());
    }

    #[test]
    fn test_history_is_bounded() {
        let mut history = SnapshotHistory::new(5);
        history.reset(state(0));
        for col in 1..=8 {
            history.record(&state(col));
        }
        assert_eq!(history.len(), 5);

        let mut undone = 0;
        while history.undo().is_some() {
            undone += 1;
        }
        assert_eq!(undone, 4);
        assert_eq!(history.past[0].regions[0].grid_col, 4);
    }

    #[test]
    fn test_rename_region() {
        let mut history = SnapshotHistory::default();
        history.reset(state(0));
        history.record(&state(1));
        history.undo();
        history.rename_region("a", "b");
        assert_eq!(history.past[0].regions[0].id, "b");
        assert_eq!(history.future[0].regions[0].id, "b");
    }
}
