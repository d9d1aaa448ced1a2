//! Layout controller
//!
//! The single entry point a dashboard UI talks to. Every mutation is applied
//! to the shared [`RegionStore`] first and reaches the server through a
//! debounced flush; undo snapshots are debounced the same way. Failures
//! leave the previous state in place and are reported as toasts.

mod events;
mod flush;

pub use events::{EventSink, LayoutEvent, ToastLevel};
pub use flush::{flush_layout, FlushReport};

use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use crate::api::{ApiResult, LayoutApi};
use crate::config::EngineSettings;
use crate::constants::grid::{DEFAULT_COL_SPAN, DEFAULT_ROW_SPAN};
use crate::error::{ApiError, LayoutError, LayoutResult};
use crate::export::LayoutExport;
use crate::grid::{visible_regions, GridMetrics, VisibleWindow};
use crate::scheduler::Debouncer;
use crate::store::{lock, Conflict, RegionStore, Resolution, SharedRegionStore, SnapshotChanges, SyncState};
use crate::templates::role_defaults;
use crate::types::{
    GridPosition, Layout, LayoutId, LayoutVersion, NewRegion, Region, RegionId, RegionPatch, RegionType, UserRole,
};

pub struct LayoutController<A: LayoutApi> {
    api: Arc<A>,
    store: SharedRegionStore,
    layout_id: Option<LayoutId>,
    settings: EngineSettings,
    persist: Debouncer,
    snapshots: Debouncer,
    events: EventSink,
}

impl<A: LayoutApi> LayoutController<A> {
    pub fn new(api: Arc<A>, store: SharedRegionStore, settings: EngineSettings) -> Self {
        Self {
            api,
            store,
            layout_id: None,
            persist: Debouncer::new("persist", settings.debounce),
            snapshots: Debouncer::new("snapshot", settings.debounce),
            settings,
            events: EventSink::default(),
        }
    }

    /// Controller with a private store and default settings
    pub fn with_api(api: A) -> Self {
        Self::new(Arc::new(api), RegionStore::default().shared(), EngineSettings::default())
    }

    /// Route events to a new channel, replacing any previous subscriber
    pub fn subscribe(&mut self) -> UnboundedReceiver<LayoutEvent> {
        let (sink, rx) = EventSink::channel();
        self.events = sink;
        rx
    }

    pub fn api(&self) -> &Arc<A> {
        &self.api
    }

    pub fn store(&self) -> &SharedRegionStore {
        &self.store
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn layout_id(&self) -> Option<&str> {
        self.layout_id.as_deref()
    }

    fn require_layout(&self) -> LayoutResult<LayoutId> {
        self.layout_id.clone().ok_or(LayoutError::MissingLayout)
    }

    /// Toast an API failure and hand it back as a layout error
    fn report<T>(&self, action: &str, result: ApiResult<T>) -> LayoutResult<T> {
        result.map_err(|e| {
            self.events.toast(ToastLevel::Error, format!("Failed to {action}: {e}"));
            LayoutError::from(e)
        })
    }

    /// Load (creating on first use) the default layout of `user_id`
    pub async fn load_default(&mut self, user_id: &str) -> LayoutResult<Layout> {
        let layout = self.report("load layout", self.api.get_or_create_default_layout(user_id).await)?;
        self.load(&layout.id).await?;
        Ok(layout)
    }

    /// Make `layout_id` the active layout. Queued edits of the active layout
    /// are flushed first. Reloading a layout the store already holds merges
    /// the server copy in, so conflicts and unsent edits survive
    pub async fn load(&mut self, layout_id: &str) -> LayoutResult<()> {
        if let Some(previous) = self.layout_id.clone() {
            self.flush().await?;
            if previous != layout_id {
                self.snapshots.cancel(&previous);
            }
        }

        let regions = self.report("load regions", self.api.list_regions(layout_id).await)?;
        {
            let mut store = lock(&self.store);
            if store.has_layout(layout_id) {
                store.reconcile(layout_id, regions)?;
            } else {
                store.load_layout(layout_id, regions);
            }
        }
        self.layout_id = Some(layout_id.to_string());
        Ok(())
    }

    pub fn regions(&self) -> Vec<Region> {
        let Some(layout_id) = &self.layout_id else {
            return Vec::new();
        };
        lock(&self.store)
            .regions(layout_id)
            .map(<[Region]>::to_vec)
            .unwrap_or_default()
    }

    pub fn region(&self, id: &str) -> LayoutResult<Region> {
        let layout_id = self.require_layout()?;
        lock(&self.store).region(&layout_id, id).cloned()
    }

    pub fn sync_state(&self, id: &str) -> LayoutResult<SyncState> {
        let layout_id = self.require_layout()?;
        lock(&self.store).sync_state(&layout_id, id)
    }

    /// Regions to render for the given scroll window
    pub fn visible_regions(&self, metrics: &GridMetrics, window: &VisibleWindow) -> Vec<Region> {
        let regions = self.regions();
        visible_regions(&regions, metrics, window).into_iter().cloned().collect()
    }

    fn schedule_snapshot(&self, layout_id: &str) {
        let store = Arc::clone(&self.store);
        let layout = layout_id.to_string();
        let scheduled = self.snapshots.schedule(layout_id, async move {
            let saved = lock(&store).save_layout_snapshot(&layout);
            if let Err(e) = saved {
                debug!(layout = %layout, error = %e, "Skipped layout snapshot");
            }
        });
        if !scheduled && let Err(e) = lock(&self.store).save_layout_snapshot(layout_id) {
            debug!(layout = %layout_id, error = %e, "Skipped layout snapshot");
        }
    }

    /// Debounce a flush and a snapshot after a local edit
    fn schedule_sync(&self, layout_id: &str) {
        let api = Arc::clone(&self.api);
        let store = Arc::clone(&self.store);
        let events = self.events.clone();
        let layout = layout_id.to_string();
        self.persist.schedule(layout_id, async move {
            if let Err(e) = flush_layout(api.as_ref(), &store, &layout, &events).await {
                events.toast(ToastLevel::Error, format!("Failed to save layout: {e}"));
            }
        });
        self.schedule_snapshot(layout_id);
    }

    /// Create a region of `region_type`. Without a position it goes to the
    /// first free slot; an explicit position is clamped into the grid
    pub async fn add_region(&self, region_type: RegionType, position: Option<GridPosition>) -> LayoutResult<Region> {
        let layout_id = self.require_layout()?;
        let grid = self.settings.grid;
        let position = match position {
            Some(pos) => grid.clamp(pos),
            None => {
                let free = {
                    let store = lock(&self.store);
                    grid.find_free_position(store.regions(&layout_id)?, DEFAULT_ROW_SPAN, DEFAULT_COL_SPAN)
                };
                free.ok_or(LayoutError::GridFull {
                    rows: DEFAULT_ROW_SPAN,
                    cols: DEFAULT_COL_SPAN,
                })?
            }
        };

        let new = NewRegion::new(region_type.clone(), position).with_widget(region_type.as_str());
        let region = self.report("add region", self.api.create_region(&layout_id, new).await)?;
        lock(&self.store).insert_region(&layout_id, region.clone())?;
        info!(
            layout = %layout_id,
            region = %region.id,
            region_type = %region.region_type,
            row = region.grid_row,
            col = region.grid_col,
            "Added region"
        );
        self.schedule_snapshot(&layout_id);
        Ok(region)
    }

    /// Remove a region. The region is put back if the server refuses
    pub async fn remove_region(&self, id: &str) -> LayoutResult<Region> {
        let layout_id = self.require_layout()?;
        let (index, removed) = {
            let mut store = lock(&self.store);
            let index = store.position_of(&layout_id, id)?;
            (index, store.remove_region(&layout_id, id)?)
        };

        match self.api.delete_region(&layout_id, id).await {
            Ok(()) | Err(ApiError::NotFound(_)) => {
                info!(layout = %layout_id, region = %id, "Removed region");
                self.schedule_snapshot(&layout_id);
                Ok(removed)
            }
            Err(e) => {
                lock(&self.store).insert_region_at(&layout_id, index, removed)?;
                self.events.toast(ToastLevel::Error, format!("Failed to remove region: {e}"));
                Err(e.into())
            }
        }
    }

    /// Change the position of an unlocked region, clamped into the grid
    fn edit_position(&self, id: &str, edit: impl FnOnce(GridPosition) -> GridPosition) -> LayoutResult<GridPosition> {
        let layout_id = self.require_layout()?;
        let position = {
            let mut store = lock(&self.store);
            let region = store.region(&layout_id, id)?;
            if region.is_locked {
                return Err(LayoutError::RegionLocked(id.to_string()));
            }
            let position = self.settings.grid.clamp(edit(region.position()));
            store.update_region(&layout_id, id, RegionPatch::position(position))?;
            position
        };
        self.schedule_sync(&layout_id);
        Ok(position)
    }

    pub fn update_region_position(&self, id: &str, row: u32, col: u32) -> LayoutResult<GridPosition> {
        self.edit_position(id, |pos| GridPosition { row, col, ..pos })
    }

    pub fn update_region_size(&self, id: &str, row_span: u32, col_span: u32) -> LayoutResult<GridPosition> {
        self.edit_position(id, |pos| GridPosition {
            row_span,
            col_span,
            ..pos
        })
    }

    /// Returns true when the region is now collapsed
    pub fn toggle_collapse(&self, id: &str) -> LayoutResult<bool> {
        let layout_id = self.require_layout()?;
        let collapsed = lock(&self.store).toggle_collapse(&layout_id, id, &self.settings.grid)?;
        self.schedule_sync(&layout_id);
        Ok(collapsed)
    }

    /// Returns true when the region is now locked
    pub fn toggle_lock(&self, id: &str) -> LayoutResult<bool> {
        let layout_id = self.require_layout()?;
        let locked = {
            let mut store = lock(&self.store);
            let locked = !store.region(&layout_id, id)?.is_locked;
            let patch = RegionPatch {
                is_locked: Some(locked),
                ..Default::default()
            };
            store.update_region(&layout_id, id, patch)?;
            locked
        };
        self.schedule_sync(&layout_id);
        Ok(locked)
    }

    pub fn update_region_config(&self, id: &str, config: Value) -> LayoutResult<()> {
        let layout_id = self.require_layout()?;
        let patch = RegionPatch {
            config: Some(config),
            ..Default::default()
        };
        lock(&self.store).update_region(&layout_id, id, patch)?;
        self.schedule_sync(&layout_id);
        Ok(())
    }

    /// Send queued edits now instead of waiting for the debounce
    pub async fn flush(&self) -> LayoutResult<FlushReport> {
        let layout_id = self.require_layout()?;
        self.persist.cancel(&layout_id);
        flush_layout(self.api.as_ref(), &self.store, &layout_id, &self.events).await
    }

    pub fn has_pending(&self) -> bool {
        self.layout_id
            .as_deref()
            .is_some_and(|id| lock(&self.store).has_pending(id))
    }

    pub fn conflicts(&self) -> LayoutResult<Vec<Conflict>> {
        let layout_id = self.require_layout()?;
        lock(&self.store).conflicts(&layout_id)
    }

    /// Apply the user's decision and send the result right away
    pub async fn resolve_conflict(&self, id: &str, resolution: Resolution) -> LayoutResult<FlushReport> {
        let layout_id = self.require_layout()?;
        lock(&self.store).resolve_conflict(&layout_id, id, resolution, &self.settings.grid)?;
        self.events.emit(LayoutEvent::ConflictResolved(id.to_string()));
        self.flush().await
    }

    /// Drop a conflict and fall back to the server copy
    pub fn clear_conflict(&self, id: &str) -> LayoutResult<Conflict> {
        let layout_id = self.require_layout()?;
        let conflict = lock(&self.store).clear_conflict(&layout_id, id)?;
        self.events.emit(LayoutEvent::ConflictResolved(id.to_string()));
        Ok(conflict)
    }

    /// Record the current regions as an undo step immediately
    pub fn save_snapshot(&self) -> LayoutResult<bool> {
        let layout_id = self.require_layout()?;
        self.snapshots.cancel(&layout_id);
        lock(&self.store).save_layout_snapshot(&layout_id)
    }

    pub fn can_undo(&self) -> bool {
        self.layout_id
            .as_deref()
            .is_some_and(|id| lock(&self.store).can_undo(id))
    }

    pub fn can_redo(&self) -> bool {
        self.layout_id
            .as_deref()
            .is_some_and(|id| lock(&self.store).can_redo(id))
    }

    pub async fn undo(&self) -> LayoutResult<bool> {
        let layout_id = self.require_layout()?;
        self.snapshots.cancel(&layout_id);
        let changes = lock(&self.store).undo_layout_changes(&layout_id);
        match changes {
            Some(changes) => {
                self.push_changes(&layout_id, changes).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn redo(&self) -> LayoutResult<bool> {
        let layout_id = self.require_layout()?;
        self.snapshots.cancel(&layout_id);
        let changes = lock(&self.store).redo_layout_changes(&layout_id);
        match changes {
            Some(changes) => {
                self.push_changes(&layout_id, changes).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Bring the server in line after an undo or redo: delete regions that
    /// vanished, re-create regions that came back, then send queued patches.
    /// A region that cannot be re-created is dropped again and the first
    /// failure is returned once the rest has been sent
    async fn push_changes(&self, layout_id: &str, changes: SnapshotChanges) -> LayoutResult<FlushReport> {
        let mut first_error = None;

        for id in &changes.removed {
            match self.api.delete_region(layout_id, id).await {
                Ok(()) | Err(ApiError::NotFound(_)) => {}
                Err(e) => {
                    self.events
                        .toast(ToastLevel::Error, format!("Failed to delete region {id}: {e}"));
                    first_error.get_or_insert(e);
                }
            }
        }

        for region in changes.restored {
            match self.api.create_region(layout_id, NewRegion::from_region(&region)).await {
                Ok(created) => {
                    debug!(old = %region.id, new = %created.id, "Re-created region");
                    lock(&self.store).rename_region(layout_id, &region.id, created)?;
                }
                Err(e) => {
                    lock(&self.store).remove_region(layout_id, &region.id)?;
                    self.events
                        .toast(ToastLevel::Error, format!("Failed to restore region {}: {e}", region.id));
                    first_error.get_or_insert(e);
                }
            }
        }

        self.persist.cancel(layout_id);
        let report = flush_layout(self.api.as_ref(), &self.store, layout_id, &self.events).await?;
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(report),
        }
    }

    /// Replace every region with the template for `role`
    pub async fn load_role_defaults(&self, role: UserRole) -> LayoutResult<Vec<Region>> {
        info!(%role, "Applying role defaults");
        self.replace_regions(role_defaults(role)).await
    }

    /// Create `regions` on the server, then drop the old ones. A failed create
    /// rolls back what was already created and leaves the layout untouched
    async fn replace_regions(&self, regions: Vec<NewRegion>) -> LayoutResult<Vec<Region>> {
        let layout_id = self.require_layout()?;
        let existing: Vec<RegionId> = lock(&self.store)
            .regions(&layout_id)?
            .iter()
            .map(|r| r.id.clone())
            .collect();

        let mut created = Vec::with_capacity(regions.len());
        for new in regions {
            match self.api.create_region(&layout_id, new).await {
                Ok(region) => created.push(region),
                Err(e) => {
                    for region in &created {
                        if let Err(cleanup) = self.api.delete_region(&layout_id, &region.id).await {
                            warn!(region = %region.id, error = %cleanup, "Failed to roll back created region");
                        }
                    }
                    self.events
                        .toast(ToastLevel::Error, format!("Failed to replace regions: {e}"));
                    return Err(e.into());
                }
            }
        }

        for id in &existing {
            match self.api.delete_region(&layout_id, id).await {
                Ok(()) | Err(ApiError::NotFound(_)) => {}
                Err(e) => warn!(region = %id, error = %e, "Failed to delete replaced region"),
            }
        }

        self.persist.cancel(&layout_id);
        self.snapshots.cancel(&layout_id);
        {
            let mut store = lock(&self.store);
            store.save_layout_snapshot(&layout_id)?;
            for id in &existing {
                if store.remove_region(&layout_id, id).is_err() {
                    debug!(region = %id, "Replaced region already gone");
                }
            }
            for region in &created {
                store.insert_region(&layout_id, region.clone())?;
            }
            store.save_layout_snapshot(&layout_id)?;
        }
        info!(layout = %layout_id, removed = existing.len(), added = created.len(), "Replaced layout regions");
        Ok(created)
    }

    /// Re-fetch regions from the server. Regions without local edits adopt the
    /// server copy; regions with local edits keep them until the next flush
    pub async fn resync(&self) -> LayoutResult<()> {
        let layout_id = self.require_layout()?;
        let server = self.report("sync layout", self.api.list_regions(&layout_id).await)?;
        lock(&self.store).reconcile(&layout_id, server)?;
        Ok(())
    }

    pub fn export_layout(&self) -> LayoutResult<LayoutExport> {
        let layout_id = self.require_layout()?;
        Ok(LayoutExport::new(&layout_id, self.regions(), &self.settings.grid))
    }

    /// Replace the active layout with the regions of `export`. Invalid files
    /// are refused before anything changes
    pub async fn import_layout(&self, export: &LayoutExport) -> LayoutResult<Vec<Region>> {
        self.require_layout()?;
        if let Err(e) = export.validate(&self.settings.grid) {
            self.events.toast(ToastLevel::Error, format!("Import failed: {e}"));
            return Err(e);
        }
        info!(source = %export.layout_id, regions = export.regions.len(), "Importing layout");
        self.replace_regions(export.new_regions()).await
    }

    pub async fn list_versions(&self) -> LayoutResult<Vec<LayoutVersion>> {
        let layout_id = self.require_layout()?;
        self.report("list versions", self.api.list_versions(&layout_id).await)
    }

    /// Store the current layout as a version. Queued edits are sent first so
    /// the version matches what is on screen
    pub async fn create_version(&self, label: &str) -> LayoutResult<LayoutVersion> {
        let layout_id = self.require_layout()?;
        self.flush().await?;
        let version = self.report("create version", self.api.create_version(&layout_id, label).await)?;
        info!(layout = %layout_id, version = %version.id, label = %label, "Created layout version");
        Ok(version)
    }

    pub async fn publish_version(&self, version_id: &str) -> LayoutResult<LayoutVersion> {
        let layout_id = self.require_layout()?;
        self.report("publish version", self.api.publish_version(&layout_id, version_id).await)
    }

    /// Replace the live regions with a stored version. Local edits not yet
    /// sent are discarded and the undo history starts over. Refused while a
    /// conflict is open
    pub async fn revert_to_version(&self, version_id: &str) -> LayoutResult<Vec<Region>> {
        let layout_id = self.require_layout()?;
        let open = lock(&self.store).conflicts(&layout_id)?;
        if let Some(conflict) = open.first() {
            self.events.toast(
                ToastLevel::Warning,
                format!("Resolve the conflict on region {} before reverting", conflict.region_id),
            );
            return Err(LayoutError::Conflicted(conflict.region_id.clone()));
        }
        self.persist.cancel(&layout_id);
        self.snapshots.cancel(&layout_id);
        let regions = self.report(
            "revert layout",
            self.api.revert_to_version(&layout_id, version_id).await,
        )?;
        lock(&self.store).load_layout(&layout_id, regions.clone());
        Ok(regions)
    }

    /// Flush outstanding edits and shut the controller down
    pub async fn close(self) -> LayoutResult<FlushReport> {
        if self.layout_id.is_none() {
            return Ok(FlushReport::default());
        }
        self.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MemoryLayoutApi;
    use crate::grid::GridSpec;
    use serde_json::json;
    use std::time::Duration;

    async fn controller() -> LayoutController<MemoryLayoutApi> {
        let mut controller = LayoutController::with_api(MemoryLayoutApi::new(GridSpec::default()));
        controller.load_default("user-1").await.unwrap();
        controller
    }

    fn analytics() -> RegionType {
        RegionType::from(RegionType::ANALYTICS)
    }

    async fn server_regions(controller: &LayoutController<MemoryLayoutApi>) -> Vec<Region> {
        let layout_id = controller.layout_id().unwrap().to_string();
        controller.api().list_regions(&layout_id).await.unwrap()
    }

    #[tokio::test]
    async fn test_add_region_requires_layout() {
        let controller = LayoutController::with_api(MemoryLayoutApi::new(GridSpec::default()));
        let err = controller.add_region(analytics(), None).await.unwrap_err();
        assert!(matches!(err, LayoutError::MissingLayout));
        assert!(err.is_validation());
        assert!(controller.regions().is_empty());
    }

    #[tokio::test]
    async fn test_collapse_twice_restores_original_position() {
        let controller = controller().await;
        assert!(controller.regions().is_empty());
        let region = controller
            .add_region(analytics(), Some(GridPosition::at(0, 0)))
            .await
            .unwrap();
        assert_eq!(controller.regions().len(), 1);
        assert_eq!(region.region_type, analytics());
        assert_eq!((region.grid_row, region.grid_col), (0, 0));
        assert!(!region.is_collapsed);
        assert!(!region.is_locked);

        assert!(controller.toggle_collapse(&region.id).unwrap());
        let collapsed = controller.region(&region.id).unwrap();
        assert!(collapsed.is_collapsed);
        assert_eq!(collapsed.row_span, 1);

        assert!(!controller.toggle_collapse(&region.id).unwrap());
        let expanded = controller.region(&region.id).unwrap();
        assert!(!expanded.is_collapsed);
        assert_eq!(expanded.position(), GridPosition::at(0, 0));
        assert_eq!(expanded.config, json!({}));

        controller.flush().await.unwrap();
        assert!(server_regions(&controller).await[0].same_content(&expanded));
    }

    #[tokio::test]
    async fn test_add_region_uses_first_free_slot() {
        let controller = controller().await;
        let first = controller.add_region(analytics(), None).await.unwrap();
        let second = controller.add_region(analytics(), None).await.unwrap();
        assert_eq!(first.position(), GridPosition::at(0, 0));
        assert_eq!(second.position(), GridPosition::at(0, DEFAULT_COL_SPAN));
        assert_eq!(second.widget_type.as_deref(), Some("analytics"));
    }

    #[tokio::test]
    async fn test_add_region_clamps_position() {
        let controller = controller().await;
        let region = controller
            .add_region(analytics(), Some(GridPosition::new(20, 11, 2, 4)))
            .await
            .unwrap();
        assert_eq!(region.position(), GridPosition::new(10, 8, 2, 4));
    }

    #[tokio::test]
    async fn test_full_grid_is_reported() {
        let controller = controller().await;
        controller
            .add_region(analytics(), Some(GridPosition::new(0, 0, 12, 12)))
            .await
            .unwrap();
        let err = controller.add_region(analytics(), None).await.unwrap_err();
        assert!(matches!(err, LayoutError::GridFull { .. }));
    }

    #[tokio::test]
    async fn test_locked_region_refuses_move_and_resize() {
        let controller = controller().await;
        let region = controller.add_region(analytics(), None).await.unwrap();
        assert!(controller.toggle_lock(&region.id).unwrap());

        let err = controller.update_region_position(&region.id, 3, 3).unwrap_err();
        assert!(matches!(err, LayoutError::RegionLocked(_)));
        let err = controller.update_region_size(&region.id, 4, 4).unwrap_err();
        assert!(matches!(err, LayoutError::RegionLocked(_)));
        assert_eq!(controller.region(&region.id).unwrap().position(), region.position());
    }

    #[tokio::test]
    async fn test_move_and_resize_are_clamped() {
        let controller = controller().await;
        let region = controller.add_region(analytics(), None).await.unwrap();

        let moved = controller.update_region_position(&region.id, 3, 20).unwrap();
        assert_eq!(moved, GridPosition::new(3, 8, 2, 4));
        let resized = controller.update_region_size(&region.id, 2, 12).unwrap();
        assert_eq!(resized, GridPosition::new(3, 0, 2, 12));

        let report = controller.flush().await.unwrap();
        assert_eq!(report.committed, 1);
        assert_eq!(server_regions(&controller).await[0].position(), resized);
    }

    #[tokio::test(start_paused = true)]
    async fn test_edits_are_flushed_after_debounce() {
        let controller = controller().await;
        let region = controller.add_region(analytics(), None).await.unwrap();
        controller.update_region_position(&region.id, 4, 0).unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(server_regions(&controller).await[0].grid_row, 0);
        assert!(controller.has_pending());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(server_regions(&controller).await[0].grid_row, 4);
        assert!(!controller.has_pending());
        assert_eq!(controller.sync_state(&region.id).unwrap(), SyncState::Committed);
    }

    #[tokio::test]
    async fn test_failed_remove_restores_region() {
        let mut controller = controller().await;
        let mut events = controller.subscribe();
        let first = controller.add_region(analytics(), None).await.unwrap();
        controller.add_region(analytics(), None).await.unwrap();

        controller.api().fail_next_requests(1);
        assert!(controller.remove_region(&first.id).await.is_err());
        assert_eq!(controller.regions()[0].id, first.id);
        assert!(matches!(
            events.try_recv().unwrap(),
            LayoutEvent::Toast {
                level: ToastLevel::Error,
                ..
            }
        ));

        controller.remove_region(&first.id).await.unwrap();
        assert_eq!(controller.regions().len(), 1);
        assert_eq!(server_regions(&controller).await.len(), 1);
    }

    #[tokio::test]
    async fn test_conflict_resolved_with_local_copy() {
        let mut controller = controller().await;
        let mut events = controller.subscribe();
        let region = controller.add_region(analytics(), None).await.unwrap();
        let layout_id = controller.layout_id().unwrap().to_string();
        controller
            .api()
            .apply_remote_edit(&layout_id, &region.id, &RegionPatch::position(GridPosition::at(6, 0)))
            .unwrap();

        controller.update_region_position(&region.id, 2, 2).unwrap();
        let report = controller.flush().await.unwrap();
        assert_eq!(report.conflicts, vec![region.id.clone()]);
        assert!(matches!(events.try_recv().unwrap(), LayoutEvent::ConflictDetected(_)));

        let conflicts = controller.conflicts().unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].remote.grid_row, 6);
        assert!(controller.update_region_position(&region.id, 1, 1).is_err());

        let report = controller
            .resolve_conflict(&region.id, Resolution::KeepLocal)
            .await
            .unwrap();
        assert_eq!(report.committed, 1);
        assert!(controller.conflicts().unwrap().is_empty());
        let server = &server_regions(&controller).await[0];
        assert_eq!((server.grid_row, server.grid_col), (2, 2));
        assert_eq!(server.version, 3);
    }

    #[tokio::test]
    async fn test_clear_conflict_falls_back_to_server() {
        let controller = controller().await;
        let region = controller.add_region(analytics(), None).await.unwrap();
        let layout_id = controller.layout_id().unwrap().to_string();
        controller
            .api()
            .apply_remote_edit(&layout_id, &region.id, &RegionPatch::position(GridPosition::at(6, 0)))
            .unwrap();
        controller.update_region_position(&region.id, 2, 2).unwrap();
        controller.flush().await.unwrap();

        let conflict = controller.clear_conflict(&region.id).unwrap();
        assert_eq!(conflict.local.grid_row, 2);
        assert_eq!(controller.region(&region.id).unwrap().grid_row, 6);
        assert!(matches!(
            controller.clear_conflict(&region.id),
            Err(LayoutError::NoConflict(_))
        ));
    }

    /// Region `b` conflicted, region `a` moved but not yet sent
    async fn conflict_and_pending_edit(controller: &LayoutController<MemoryLayoutApi>) -> (Region, Region) {
        let a = controller.add_region(analytics(), None).await.unwrap();
        let b = controller.add_region(analytics(), None).await.unwrap();
        let layout_id = controller.layout_id().unwrap().to_string();
        controller
            .api()
            .apply_remote_edit(&layout_id, &b.id, &RegionPatch::position(GridPosition::at(6, 0)))
            .unwrap();
        controller.update_region_position(&b.id, 2, 8).unwrap();
        controller.flush().await.unwrap();
        assert_eq!(controller.conflicts().unwrap().len(), 1);

        controller.update_region_position(&a.id, 5, 0).unwrap();
        (a, b)
    }

    #[tokio::test]
    async fn test_reloading_active_layout_keeps_conflicts_and_edits() {
        let mut controller = controller().await;
        let (a, b) = conflict_and_pending_edit(&controller).await;
        let layout_id = controller.layout_id().unwrap().to_string();

        controller.load(&layout_id).await.unwrap();

        let conflicts = controller.conflicts().unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].region_id, b.id);
        assert_eq!(controller.region(&a.id).unwrap().grid_row, 5);
        let server = server_regions(&controller).await;
        assert_eq!(server.iter().find(|r| r.id == a.id).unwrap().grid_row, 5);
    }

    #[tokio::test]
    async fn test_revert_refused_while_conflicted() {
        let controller = controller().await;
        let version = controller.create_version("empty").await.unwrap();
        let (_, b) = conflict_and_pending_edit(&controller).await;

        let err = controller.revert_to_version(&version.id).await.unwrap_err();
        assert!(matches!(err, LayoutError::Conflicted(id) if id == b.id));
        assert_eq!(controller.conflicts().unwrap().len(), 1);
        assert_eq!(controller.regions().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_restore_drops_region_and_reports_error() {
        let controller = controller().await;
        let region = controller.add_region(analytics(), None).await.unwrap();
        controller.save_snapshot().unwrap();
        controller.remove_region(&region.id).await.unwrap();

        controller.api().fail_next_requests(1);
        let err = controller.undo().await.unwrap_err();
        assert!(matches!(err, LayoutError::Api(ApiError::Network(_))));
        assert!(controller.regions().is_empty());
        assert!(server_regions(&controller).await.is_empty());
        assert!(controller.region(&region.id).is_err());
    }

    #[tokio::test]
    async fn test_undo_and_redo_reach_the_server() {
        let controller = controller().await;
        let region = controller.add_region(analytics(), None).await.unwrap();
        controller.save_snapshot().unwrap();
        controller.update_region_position(&region.id, 5, 4).unwrap();

        assert!(controller.undo().await.unwrap());
        assert_eq!(controller.region(&region.id).unwrap().position(), region.position());
        assert_eq!(server_regions(&controller).await[0].position(), region.position());
        assert!(controller.can_redo());

        assert!(controller.redo().await.unwrap());
        let server = &server_regions(&controller).await[0];
        assert_eq!((server.grid_row, server.grid_col), (5, 4));
        assert!(!controller.can_redo());
    }

    #[tokio::test]
    async fn test_undo_recreates_removed_region() {
        let controller = controller().await;
        let region = controller.add_region(analytics(), None).await.unwrap();
        controller.save_snapshot().unwrap();
        controller.remove_region(&region.id).await.unwrap();
        assert!(server_regions(&controller).await.is_empty());

        assert!(controller.undo().await.unwrap());
        let restored = controller.regions();
        assert_eq!(restored.len(), 1);
        assert_ne!(restored[0].id, region.id);
        assert!(restored[0].same_content(&Region {
            id: restored[0].id.clone(),
            ..region.clone()
        }));
        assert_eq!(server_regions(&controller).await[0].id, restored[0].id);

        assert!(controller.redo().await.unwrap());
        assert!(controller.regions().is_empty());
        assert!(server_regions(&controller).await.is_empty());
    }

    #[tokio::test]
    async fn test_role_defaults_replace_regions_and_undo() {
        let controller = controller().await;
        controller.add_region(analytics(), None).await.unwrap();
        controller.save_snapshot().unwrap();

        let created = controller.load_role_defaults(UserRole::Technician).await.unwrap();
        assert_eq!(created.len(), role_defaults(UserRole::Technician).len());
        assert_eq!(controller.regions(), created);
        assert_eq!(server_regions(&controller).await.len(), created.len());

        assert!(controller.undo().await.unwrap());
        let regions = controller.regions();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].region_type, analytics());
        assert_eq!(server_regions(&controller).await.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_role_defaults_leave_layout_untouched() {
        let controller = controller().await;
        let region = controller.add_region(analytics(), None).await.unwrap();
        controller.api().fail_next_requests(1);

        assert!(controller.load_role_defaults(UserRole::Manager).await.is_err());
        assert_eq!(controller.regions(), vec![region.clone()]);
        assert_eq!(server_regions(&controller).await, vec![region]);
    }

    #[tokio::test]
    async fn test_export_then_import_into_another_layout() {
        let source = controller().await;
        source.load_role_defaults(UserRole::Dispatcher).await.unwrap();
        let export = source.export_layout().unwrap();
        let json = export.to_json().unwrap();

        let mut target = LayoutController::with_api(MemoryLayoutApi::new(GridSpec::default()));
        target.load_default("user-2").await.unwrap();
        let imported = target
            .import_layout(&LayoutExport::from_json(&json).unwrap())
            .await
            .unwrap();

        assert_eq!(imported.len(), export.regions.len());
        for (copy, original) in imported.iter().zip(&export.regions) {
            assert_eq!(copy.region_type, original.region_type);
            assert_eq!(copy.position(), original.position());
        }
    }

    #[tokio::test]
    async fn test_invalid_import_changes_nothing() {
        let controller = controller().await;
        let region = controller.add_region(analytics(), None).await.unwrap();
        let mut export = controller.export_layout().unwrap();
        export.version = 99;

        let err = controller.import_layout(&export).await.unwrap_err();
        assert!(matches!(err, LayoutError::InvalidImport(_)));
        assert_eq!(controller.regions(), vec![region]);
    }

    #[tokio::test]
    async fn test_revert_to_version() {
        let controller = controller().await;
        let region = controller.add_region(analytics(), None).await.unwrap();
        let version = controller.create_version("before move").await.unwrap();
        assert_eq!(version.regions.len(), 1);

        controller.update_region_position(&region.id, 6, 0).unwrap();
        controller.flush().await.unwrap();
        controller.publish_version(&version.id).await.unwrap();
        assert!(controller.list_versions().await.unwrap()[0].is_published);

        let reverted = controller.revert_to_version(&version.id).await.unwrap();
        assert_eq!(reverted[0].grid_row, 0);
        assert_eq!(controller.region(&region.id).unwrap().grid_row, 0);
        assert!(!controller.can_undo());
    }

    #[tokio::test]
    async fn test_resync_picks_up_remote_changes() {
        let controller = controller().await;
        let region = controller.add_region(analytics(), None).await.unwrap();
        let layout_id = controller.layout_id().unwrap().to_string();
        controller
            .api()
            .apply_remote_edit(&layout_id, &region.id, &RegionPatch::position(GridPosition::at(3, 0)))
            .unwrap();

        controller.resync().await.unwrap();
        let synced = controller.region(&region.id).unwrap();
        assert_eq!(synced.grid_row, 3);
        assert_eq!(synced.version, 2);
    }
}
