//! Client-side region store
//!
//! Holds the cached region list of every loaded layout together with the
//! per-region sync state, the queue of edits waiting for the server and the
//! undo/redo history. The store performs no I/O: the controller drains
//! [`PendingUpdate`]s, sends them, and reports the outcome back through
//! [`RegionStore::commit_update`], [`RegionStore::reject_update`] or
//! [`RegionStore::fail_update`].
//!
//! Edits to one region are serialized: at most one update per region is in
//! flight, later edits wait in that region's queue.

mod sync;

pub use sync::{Conflict, PendingUpdate, Resolution, SyncState};

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::constants;
use crate::error::{LayoutError, LayoutResult};
use crate::grid::GridSpec;
use crate::history::SnapshotHistory;
use crate::types::{GridPosition, LayoutId, Region, RegionId, RegionPatch};

/// Key in `Region::config` holding the position to restore on expand
pub const RESTORE_POINT_KEY: &str = "collapsed_from";

/// Store handle shared between a controller and its background tasks
pub type SharedRegionStore = Arc<Mutex<RegionStore>>;

/// Lock a shared store. Poisoning is ignored: every store method leaves the
/// cache consistent before it can panic
pub fn lock(store: &SharedRegionStore) -> MutexGuard<'_, RegionStore> {
    store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Regions removed or brought back by an undo/redo step. Updated regions are
/// queued like any other edit; these need a delete or a create instead.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SnapshotChanges {
    pub removed: Vec<RegionId>,
    pub restored: Vec<Region>,
}

#[derive(Debug)]
struct LayoutEntry {
    regions: Vec<Region>,
    sync: HashMap<RegionId, SyncState>,
    queues: HashMap<RegionId, VecDeque<RegionPatch>>,
    in_flight: HashSet<RegionId>,
    history: SnapshotHistory,
}

impl LayoutEntry {
    fn new(regions: Vec<Region>, history_limit: usize) -> Self {
        let mut history = SnapshotHistory::new(history_limit);
        history.reset(regions.clone());
        let sync = regions
            .iter()
            .map(|r| (r.id.clone(), SyncState::Committed))
            .collect();
        Self {
            regions,
            sync,
            queues: HashMap::new(),
            in_flight: HashSet::new(),
            history,
        }
    }

    fn index_of(&self, id: &str) -> LayoutResult<usize> {
        self.regions
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| LayoutError::UnknownRegion(id.to_string()))
    }

    fn state(&self, id: &str) -> SyncState {
        self.sync.get(id).cloned().unwrap_or(SyncState::Committed)
    }

    fn enqueue(&mut self, id: &str, patch: RegionPatch) {
        self.queues.entry(id.to_string()).or_default().push_back(patch);
        self.sync.insert(id.to_string(), SyncState::Pending);
    }

    fn forget(&mut self, id: &str) {
        self.sync.remove(id);
        self.queues.remove(id);
        self.in_flight.remove(id);
    }
}

/// Explicit, injectable container for the region cache of any number of layouts
#[derive(Debug)]
pub struct RegionStore {
    layouts: HashMap<LayoutId, LayoutEntry>,
    history_limit: usize,
}

impl Default for RegionStore {
    fn default() -> Self {
        Self::new(constants::history::LIMIT)
    }
}

impl RegionStore {
    pub fn new(history_limit: usize) -> Self {
        Self {
            layouts: HashMap::new(),
            history_limit,
        }
    }

    pub fn shared(self) -> SharedRegionStore {
        Arc::new(Mutex::new(self))
    }

    fn entry(&self, layout_id: &str) -> LayoutResult<&LayoutEntry> {
        self.layouts.get(layout_id).ok_or(LayoutError::MissingLayout)
    }

    fn entry_mut(&mut self, layout_id: &str) -> LayoutResult<&mut LayoutEntry> {
        self.layouts.get_mut(layout_id).ok_or(LayoutError::MissingLayout)
    }

    /// Replace the cached regions of a layout with a fresh server copy
    pub fn load_layout(&mut self, layout_id: &str, regions: Vec<Region>) {
        info!(layout = %layout_id, regions = regions.len(), "Loaded layout into store");
        self.layouts
            .insert(layout_id.to_string(), LayoutEntry::new(regions, self.history_limit));
    }

    pub fn unload_layout(&mut self, layout_id: &str) {
        self.layouts.remove(layout_id);
    }

    pub fn has_layout(&self, layout_id: &str) -> bool {
        self.layouts.contains_key(layout_id)
    }

    pub fn regions(&self, layout_id: &str) -> LayoutResult<&[Region]> {
        Ok(&self.entry(layout_id)?.regions)
    }

    pub fn region(&self, layout_id: &str, id: &str) -> LayoutResult<&Region> {
        let entry = self.entry(layout_id)?;
        Ok(&entry.regions[entry.index_of(id)?])
    }

    pub fn sync_state(&self, layout_id: &str, id: &str) -> LayoutResult<SyncState> {
        let entry = self.entry(layout_id)?;
        entry.index_of(id)?;
        Ok(entry.state(id))
    }

    /// Add a region confirmed by the server
    pub fn insert_region(&mut self, layout_id: &str, region: Region) -> LayoutResult<()> {
        let entry = self.entry_mut(layout_id)?;
        entry.sync.insert(region.id.clone(), SyncState::Committed);
        match entry.regions.iter_mut().find(|r| r.id == region.id) {
            Some(existing) => *existing = region,
            None => entry.regions.push(region),
        }
        Ok(())
    }

    /// Put a region back at `index`, e.g. after a failed delete
    pub fn insert_region_at(&mut self, layout_id: &str, index: usize, region: Region) -> LayoutResult<()> {
        let entry = self.entry_mut(layout_id)?;
        entry.sync.insert(region.id.clone(), SyncState::Committed);
        let index = index.min(entry.regions.len());
        entry.regions.insert(index, region);
        Ok(())
    }

    pub fn position_of(&self, layout_id: &str, id: &str) -> LayoutResult<usize> {
        self.entry(layout_id)?.index_of(id)
    }

    /// Drop a region and everything queued for it
    pub fn remove_region(&mut self, layout_id: &str, id: &str) -> LayoutResult<Region> {
        let entry = self.entry_mut(layout_id)?;
        let index = entry.index_of(id)?;
        entry.forget(id);
        Ok(entry.regions.remove(index))
    }

    /// Apply an edit optimistically and queue it for the server
    pub fn update_region(&mut self, layout_id: &str, id: &str, patch: RegionPatch) -> LayoutResult<()> {
        if patch.is_empty() {
            return Ok(());
        }
        let entry = self.entry_mut(layout_id)?;
        let index = entry.index_of(id)?;
        if entry.state(id).is_conflicted() {
            return Err(LayoutError::Conflicted(id.to_string()));
        }
        patch.apply_to(&mut entry.regions[index]);
        entry.enqueue(id, patch);
        debug!(layout = %layout_id, region = %id, "Queued optimistic region update");
        Ok(())
    }

    /// Collapse or expand a region. Collapsing remembers the current position
    /// in the region config; expanding puts the region back there
    pub fn toggle_collapse(&mut self, layout_id: &str, id: &str, spec: &GridSpec) -> LayoutResult<bool> {
        let region = self.region(layout_id, id)?;
        let mut config = match &region.config {
            Value::Object(map) => map.clone(),
            _ => Default::default(),
        };

        let patch = if region.is_collapsed {
            let restore = restore_point(region).unwrap_or_else(|| region.position());
            config.remove(RESTORE_POINT_KEY);
            RegionPatch {
                is_collapsed: Some(false),
                config: Some(Value::Object(config)),
                ..RegionPatch::position(spec.clamp(restore))
            }
        } else {
            config.insert(RESTORE_POINT_KEY.to_string(), serde_json::to_value(region.position()).unwrap_or_default());
            RegionPatch {
                is_collapsed: Some(true),
                row_span: Some(1),
                config: Some(Value::Object(config)),
                ..Default::default()
            }
        };
        let collapsed = patch.is_collapsed == Some(true);
        self.update_region(layout_id, id, patch)?;
        Ok(collapsed)
    }

    /// Updates ready to send: one per region with queued edits and nothing in
    /// flight. Queued edits for a region are coalesced into one patch
    pub fn take_ready_updates(&mut self, layout_id: &str) -> LayoutResult<Vec<PendingUpdate>> {
        let entry = self.entry_mut(layout_id)?;
        let mut ready = Vec::new();
        for region in &entry.regions {
            if entry.in_flight.contains(&region.id) {
                continue;
            }
            let Some(queue) = entry.queues.get_mut(&region.id) else {
                continue;
            };
            let Some(mut patch) = queue.pop_front() else {
                continue;
            };
            while let Some(later) = queue.pop_front() {
                patch.merge(&later);
            }
            queue.push_back(patch.clone());
            ready.push(PendingUpdate {
                layout_id: layout_id.to_string(),
                region_id: region.id.clone(),
                patch,
                expected_version: region.version,
            });
        }
        for update in &ready {
            entry.in_flight.insert(update.region_id.clone());
        }
        Ok(ready)
    }

    pub fn has_pending(&self, layout_id: &str) -> bool {
        self.entry(layout_id)
            .map(|e| e.queues.values().any(|q| !q.is_empty()))
            .unwrap_or(false)
    }

    /// The server accepted `update` and answered with `server`
    pub fn commit_update(&mut self, update: &PendingUpdate, server: Region) -> LayoutResult<()> {
        let entry = self.entry_mut(&update.layout_id)?;
        entry.in_flight.remove(&update.region_id);
        let Ok(index) = entry.index_of(&update.region_id) else {
            debug!(region = %update.region_id, "Commit for region that was removed locally");
            return Ok(());
        };

        let queue = entry.queues.entry(update.region_id.clone()).or_default();
        queue.pop_front();
        if queue.is_empty() {
            entry.queues.remove(&update.region_id);
            entry.regions[index] = server;
            entry.sync.insert(update.region_id.clone(), SyncState::Committed);
        } else {
            let region = &mut entry.regions[index];
            region.version = server.version;
            region.updated_at = server.updated_at;
        }
        Ok(())
    }

    /// The server refused `update` because its copy moved on
    pub fn reject_update(&mut self, update: &PendingUpdate, remote: Region) -> LayoutResult<Conflict> {
        let entry = self.entry_mut(&update.layout_id)?;
        entry.in_flight.remove(&update.region_id);
        let index = entry.index_of(&update.region_id)?;
        entry.queues.remove(&update.region_id);

        let conflict = Conflict::new(entry.regions[index].clone(), remote);
        warn!(
            region = %update.region_id,
            local_version = conflict.local_version(),
            remote_version = conflict.remote_version(),
            "Region update conflicts with server copy"
        );
        entry
            .sync
            .insert(update.region_id.clone(), SyncState::Conflicted(conflict.clone()));
        Ok(conflict)
    }

    /// The update never reached the server; keep it queued for the next sync
    pub fn fail_update(&mut self, update: &PendingUpdate) -> LayoutResult<()> {
        let entry = self.entry_mut(&update.layout_id)?;
        entry.in_flight.remove(&update.region_id);
        Ok(())
    }

    /// The server refused `update` outright; drop the queued edits so the
    /// next reconcile can restore the server copy
    pub fn discard_pending(&mut self, update: &PendingUpdate) -> LayoutResult<()> {
        let entry = self.entry_mut(&update.layout_id)?;
        entry.in_flight.remove(&update.region_id);
        entry.queues.remove(&update.region_id);
        if entry.index_of(&update.region_id).is_ok() {
            entry.sync.insert(update.region_id.clone(), SyncState::Committed);
        }
        Ok(())
    }

    pub fn conflicts(&self, layout_id: &str) -> LayoutResult<Vec<Conflict>> {
        let entry = self.entry(layout_id)?;
        Ok(entry
            .regions
            .iter()
            .filter_map(|r| match entry.sync.get(&r.id) {
                Some(SyncState::Conflicted(conflict)) => Some(conflict.clone()),
                _ => None,
            })
            .collect())
    }

    fn take_conflict(&mut self, layout_id: &str, id: &str) -> LayoutResult<(usize, Conflict)> {
        let entry = self.entry_mut(layout_id)?;
        let index = entry.index_of(id)?;
        match entry.state(id) {
            SyncState::Conflicted(conflict) => Ok((index, conflict)),
            _ => Err(LayoutError::NoConflict(id.to_string())),
        }
    }

    /// Apply the user's choice for a conflicted region. A merged position is
    /// clamped into `spec`
    pub fn resolve_conflict(
        &mut self,
        layout_id: &str,
        id: &str,
        resolution: Resolution,
        spec: &GridSpec,
    ) -> LayoutResult<()> {
        let (index, conflict) = self.take_conflict(layout_id, id)?;
        let entry = self.entry_mut(layout_id)?;
        info!(region = %id, ?resolution, "Resolving region conflict");

        let (region, patch) = match resolution {
            Resolution::KeepRemote => (conflict.remote, RegionPatch::default()),
            Resolution::KeepLocal => {
                let mut local = conflict.local;
                local.version = conflict.remote.version;
                let patch = RegionPatch::from_region(&local);
                (local, patch)
            }
            Resolution::Merge(mut patch) => {
                let mut merged = conflict.remote;
                patch.apply_to(&mut merged);
                let clamped = spec.clamp(merged.position());
                if patch.touches_position() && clamped != merged.position() {
                    merged.set_position(clamped);
                    patch.merge(&RegionPatch::position(clamped));
                }
                (merged, patch)
            }
        };

        entry.regions[index] = region;
        entry.queues.remove(id);
        if patch.is_empty() {
            entry.sync.insert(id.to_string(), SyncState::Committed);
        } else {
            entry.enqueue(id, patch);
        }
        Ok(())
    }

    /// Dismiss a conflict without choosing: the region falls back to the
    /// server copy
    pub fn clear_conflict(&mut self, layout_id: &str, id: &str) -> LayoutResult<Conflict> {
        let (index, conflict) = self.take_conflict(layout_id, id)?;
        let entry = self.entry_mut(layout_id)?;
        entry.regions[index] = conflict.remote.clone();
        entry.sync.insert(id.to_string(), SyncState::Committed);
        info!(region = %id, "Cleared region conflict");
        Ok(conflict)
    }

    /// Merge a fresh server listing into the cache. Committed regions adopt the
    /// server copy, regions added elsewhere appear and committed regions deleted
    /// elsewhere vanish. Regions with local edits are left for the next flush
    pub fn reconcile(&mut self, layout_id: &str, server: Vec<Region>) -> LayoutResult<()> {
        let entry = self.entry_mut(layout_id)?;
        let server_ids: HashSet<RegionId> = server.iter().map(|r| r.id.clone()).collect();

        let stale: Vec<RegionId> = entry
            .regions
            .iter()
            .filter(|r| !server_ids.contains(&r.id) && entry.state(&r.id) == SyncState::Committed)
            .map(|r| r.id.clone())
            .collect();
        for id in &stale {
            entry.forget(id);
        }
        entry.regions.retain(|r| !stale.contains(&r.id));

        for remote in server {
            match entry.regions.iter().position(|r| r.id == remote.id) {
                Some(index) => {
                    let idle = entry.state(&remote.id) == SyncState::Committed
                        && !entry.in_flight.contains(&remote.id);
                    if idle {
                        entry.regions[index] = remote;
                    }
                }
                None => {
                    entry.sync.insert(remote.id.clone(), SyncState::Committed);
                    entry.regions.push(remote);
                }
            }
        }
        Ok(())
    }

    /// Give a region the id the server assigned when it was re-created
    pub fn rename_region(&mut self, layout_id: &str, old: &str, server: Region) -> LayoutResult<()> {
        let entry = self.entry_mut(layout_id)?;
        let index = entry.index_of(old)?;
        entry.forget(old);
        entry.history.rename_region(old, &server.id);
        entry.sync.insert(server.id.clone(), SyncState::Committed);
        entry.regions[index] = server;
        Ok(())
    }

    /// Push the current region list onto the undo history
    pub fn save_layout_snapshot(&mut self, layout_id: &str) -> LayoutResult<bool> {
        let entry = self.entry_mut(layout_id)?;
        let recorded = entry.history.record(&entry.regions);
        if recorded {
            debug!(layout = %layout_id, "Saved layout snapshot");
        }
        Ok(recorded)
    }

    pub fn can_undo(&self, layout_id: &str) -> bool {
        self.entry(layout_id)
            .map(|e| e.history.can_undo() || e.has_unsaved_changes())
            .unwrap_or(false)
    }

    pub fn can_redo(&self, layout_id: &str) -> bool {
        self.entry(layout_id).map(|e| e.history.can_redo()).unwrap_or(false)
    }

    pub fn undo_layout(&mut self, layout_id: &str) -> bool {
        self.undo_layout_changes(layout_id).is_some()
    }

    pub fn redo_layout(&mut self, layout_id: &str) -> bool {
        self.redo_layout_changes(layout_id).is_some()
    }

    /// Step back one snapshot. Unsaved edits are recorded first so redo can
    /// return to them
    pub fn undo_layout_changes(&mut self, layout_id: &str) -> Option<SnapshotChanges> {
        let entry = self.layouts.get_mut(layout_id)?;
        entry.history.record(&entry.regions);
        let target = entry.history.undo()?.regions.clone();
        Some(entry.apply_snapshot(target))
    }

    pub fn redo_layout_changes(&mut self, layout_id: &str) -> Option<SnapshotChanges> {
        let entry = self.layouts.get_mut(layout_id)?;
        let target = entry.history.redo()?.regions.clone();
        Some(entry.apply_snapshot(target))
    }
}

impl LayoutEntry {
    /// Unsaved edits since the last snapshot
    fn has_unsaved_changes(&self) -> bool {
        self.history.latest().is_some_and(|s| !s.same_content(&self.regions))
    }

    /// Replace the region list with a snapshot, queueing patches for regions
    /// that still exist. Conflicted regions keep their current state
    fn apply_snapshot(&mut self, target: Vec<Region>) -> SnapshotChanges {
        let mut changes = SnapshotChanges::default();
        let target_ids: HashSet<&str> = target.iter().map(|r| r.id.as_str()).collect();

        for region in &self.regions {
            if !target_ids.contains(region.id.as_str()) && !self.state(&region.id).is_conflicted() {
                changes.removed.push(region.id.clone());
            }
        }

        let mut next = Vec::with_capacity(target.len());
        let mut patches = Vec::new();
        for mut wanted in target {
            match self.regions.iter().find(|r| r.id == wanted.id) {
                Some(current) if self.state(&current.id).is_conflicted() => next.push(current.clone()),
                Some(current) => {
                    let patch = RegionPatch::diff(current, &wanted);
                    wanted.version = current.version;
                    if !patch.is_empty() {
                        patches.push((wanted.id.clone(), patch));
                    }
                    next.push(wanted);
                }
                None => {
                    changes.restored.push(wanted.clone());
                    next.push(wanted);
                }
            }
        }

        // conflicted regions missing from the snapshot stay on screen
        for region in &self.regions {
            if self.state(&region.id).is_conflicted() && !next.iter().any(|r| r.id == region.id) {
                next.push(region.clone());
            }
        }

        for id in &changes.removed {
            self.forget(id);
        }
        self.regions = next;
        for (id, patch) in patches {
            self.enqueue(&id, patch);
        }
        changes
    }
}

fn restore_point(region: &Region) -> Option<GridPosition> {
    region
        .config
        .get(RESTORE_POINT_KEY)
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}
