//! In-process layout server with optional JSON persistence

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use super::{ApiResult, LayoutApi};
use crate::error::ApiError;
use crate::grid::GridSpec;
use crate::types::{Layout, LayoutVersion, NewRegion, Region, RegionPatch};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredLayout {
    layout: Layout,
    #[serde(default)]
    regions: Vec<Region>,
    #[serde(default)]
    versions: Vec<LayoutVersion>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct ServerState {
    #[serde(default)]
    layouts: HashMap<String, StoredLayout>,
    #[serde(default)]
    next_id: u64,
}

impl ServerState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn layout_mut(&mut self, layout_id: &str) -> ApiResult<&mut StoredLayout> {
        self.layouts
            .get_mut(layout_id)
            .ok_or_else(|| ApiError::NotFound(format!("layout {layout_id}")))
    }
}

impl StoredLayout {
    fn touch(&mut self) {
        self.layout.version += 1;
        self.layout.updated_at = Utc::now();
    }

    fn region_mut(&mut self, region_id: &str) -> ApiResult<&mut Region> {
        self.regions
            .iter_mut()
            .find(|r| r.id == region_id)
            .ok_or_else(|| ApiError::NotFound(format!("region {region_id}")))
    }
}

/// Layout server kept in memory. Enforces grid bounds and region versions
/// the way the remote service does
#[derive(Debug, Default)]
pub struct MemoryLayoutApi {
    state: Mutex<ServerState>,
    grid: GridSpec,
    failures: AtomicUsize,
}

impl MemoryLayoutApi {
    pub fn new(grid: GridSpec) -> Self {
        Self {
            state: Mutex::new(ServerState::default()),
            grid,
            failures: AtomicUsize::new(0),
        }
    }

    /// Load server state from a JSON data file, starting empty if it is missing
    pub fn load(path: &Path, grid: GridSpec) -> Result<Self> {
        let api = Self::new(grid);
        if !path.exists() {
            info!(path = %path.display(), "Data file not found, starting with empty layouts");
            return Ok(api);
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read layout data from {:?}", path))?;
        let state: ServerState = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse layout data from {:?}", path))?;
        info!(path = %path.display(), layouts = state.layouts.len(), "Loaded layout data");
        *api.state() = state;
        Ok(api)
    }

    /// Write server state to a JSON data file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data directory {:?}", parent))?;
        }
        let json = serde_json::to_string_pretty(&*self.state())
            .context("Failed to serialize layout data to JSON")?;
        fs::write(path, json).with_context(|| format!("Failed to write layout data to {:?}", path))?;
        debug!(path = %path.display(), "Saved layout data");
        Ok(())
    }

    /// Make the next `count` requests fail with a network error
    pub fn fail_next_requests(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Edit a region as another client would, bumping its version
    pub fn apply_remote_edit(&self, layout_id: &str, region_id: &str, patch: &RegionPatch) -> ApiResult<Region> {
        let mut state = self.state();
        let stored = state.layout_mut(layout_id)?;
        let region = stored.region_mut(region_id)?;
        patch.apply_to(region);
        region.version += 1;
        region.updated_at = Utc::now();
        let region = region.clone();
        stored.touch();
        Ok(region)
    }

    fn state(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_network(&self) -> ApiResult<()> {
        let injected = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match injected {
            Ok(_) => Err(ApiError::Network("connection reset".to_string())),
            Err(_) => Ok(()),
        }
    }

    fn check_bounds(&self, region: &Region) -> ApiResult<()> {
        if self.grid.contains(region.position()) {
            Ok(())
        } else {
            Err(ApiError::Rejected(format!(
                "region {} at row {} col {} span {}x{} is outside the grid",
                region.id, region.grid_row, region.grid_col, region.row_span, region.col_span
            )))
        }
    }
}

impl LayoutApi for MemoryLayoutApi {
    async fn get_or_create_default_layout(&self, user_id: &str) -> ApiResult<Layout> {
        self.check_network()?;
        let mut state = self.state();
        if let Some(existing) = state
            .layouts
            .values()
            .find(|l| l.layout.user_id == user_id && l.layout.is_default)
        {
            return Ok(existing.layout.clone());
        }

        let now = Utc::now();
        let layout = Layout {
            id: state.next_id("layout"),
            user_id: user_id.to_string(),
            name: "Default".to_string(),
            is_default: true,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        info!(user = %user_id, layout = %layout.id, "Created default layout");
        state.layouts.insert(
            layout.id.clone(),
            StoredLayout {
                layout: layout.clone(),
                regions: Vec::new(),
                versions: Vec::new(),
            },
        );
        Ok(layout)
    }

    async fn get_layout(&self, layout_id: &str) -> ApiResult<Layout> {
        self.check_network()?;
        Ok(self.state().layout_mut(layout_id)?.layout.clone())
    }

    async fn list_regions(&self, layout_id: &str) -> ApiResult<Vec<Region>> {
        self.check_network()?;
        Ok(self.state().layout_mut(layout_id)?.regions.clone())
    }

    async fn create_region(&self, layout_id: &str, new: NewRegion) -> ApiResult<Region> {
        self.check_network()?;
        let mut state = self.state();
        let id = state.next_id("region");
        let stored = state.layout_mut(layout_id)?;
        let now = Utc::now();
        let mut region = Region {
            id,
            layout_id: layout_id.to_string(),
            region_type: new.region_type,
            grid_row: 0,
            grid_col: 0,
            row_span: 1,
            col_span: 1,
            is_collapsed: new.is_collapsed,
            is_locked: new.is_locked,
            config: new.config,
            widget_type: new.widget_type,
            widget_config: new.widget_config,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        region.set_position(new.position);
        self.check_bounds(&region)?;
        stored.regions.push(region.clone());
        stored.touch();
        Ok(region)
    }

    async fn update_region(
        &self,
        layout_id: &str,
        region_id: &str,
        patch: &RegionPatch,
        expected_version: u64,
    ) -> ApiResult<Region> {
        self.check_network()?;
        let mut state = self.state();
        let stored = state.layout_mut(layout_id)?;
        let current = stored.region_mut(region_id)?;
        if current.version != expected_version {
            return Err(ApiError::VersionMismatch {
                remote: Box::new(current.clone()),
            });
        }

        let mut updated = current.clone();
        patch.apply_to(&mut updated);
        self.check_bounds(&updated)?;
        updated.version += 1;
        updated.updated_at = Utc::now();
        *current = updated.clone();
        stored.touch();
        Ok(updated)
    }

    async fn delete_region(&self, layout_id: &str, region_id: &str) -> ApiResult<()> {
        self.check_network()?;
        let mut state = self.state();
        let stored = state.layout_mut(layout_id)?;
        let before = stored.regions.len();
        stored.regions.retain(|r| r.id != region_id);
        if stored.regions.len() == before {
            return Err(ApiError::NotFound(format!("region {region_id}")));
        }
        stored.touch();
        Ok(())
    }

    async fn list_versions(&self, layout_id: &str) -> ApiResult<Vec<LayoutVersion>> {
        self.check_network()?;
        Ok(self.state().layout_mut(layout_id)?.versions.clone())
    }

    async fn create_version(&self, layout_id: &str, label: &str) -> ApiResult<LayoutVersion> {
        self.check_network()?;
        let mut state = self.state();
        let id = state.next_id("version");
        let stored = state.layout_mut(layout_id)?;
        let version = LayoutVersion {
            id,
            layout_id: layout_id.to_string(),
            version_number: stored.versions.len() as u32 + 1,
            label: label.to_string(),
            regions: stored.regions.clone(),
            is_published: false,
            created_at: Utc::now(),
        };
        stored.versions.push(version.clone());
        Ok(version)
    }

    async fn publish_version(&self, layout_id: &str, version_id: &str) -> ApiResult<LayoutVersion> {
        self.check_network()?;
        let mut state = self.state();
        let stored = state.layout_mut(layout_id)?;
        if !stored.versions.iter().any(|v| v.id == version_id) {
            return Err(ApiError::NotFound(format!("version {version_id}")));
        }
        let mut published = None;
        for version in stored.versions.iter_mut() {
            version.is_published = version.id == version_id;
            if version.is_published {
                published = Some(version.clone());
            }
        }
        published.ok_or_else(|| ApiError::NotFound(format!("version {version_id}")))
    }

    async fn revert_to_version(&self, layout_id: &str, version_id: &str) -> ApiResult<Vec<Region>> {
        self.check_network()?;
        let mut state = self.state();
        let stored = state.layout_mut(layout_id)?;
        let target = stored
            .versions
            .iter()
            .find(|v| v.id == version_id)
            .ok_or_else(|| ApiError::NotFound(format!("version {version_id}")))?
            .regions
            .clone();

        let now = Utc::now();
        let reverted: Vec<Region> = target
            .into_iter()
            .map(|mut region| {
                let live_version = stored
                    .regions
                    .iter()
                    .find(|r| r.id == region.id)
                    .map_or(0, |r| r.version);
                region.version = live_version.max(region.version) + 1;
                region.updated_at = now;
                region
            })
            .collect();
        stored.regions = reverted.clone();
        stored.touch();
        info!(layout = %layout_id, version = %version_id, "Reverted layout to stored version");
        Ok(reverted)
    }
}
