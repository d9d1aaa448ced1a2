//! Core data types shared by the store, the API client and the controller

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::constants;

pub type RegionId = String;
pub type LayoutId = String;

/// Kind of content hosted by a region (widget family)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionType(pub String);

impl RegionType {
    pub const ANALYTICS: &'static str = "analytics";
    pub const KPI: &'static str = "kpi";
    pub const SCHEDULE: &'static str = "schedule";
    pub const BILLING: &'static str = "billing";
    pub const CUSTOMERS: &'static str = "customers";
    pub const REPORTS: &'static str = "reports";
    pub const KNOWLEDGE_BASE: &'static str = "knowledge_base";
    pub const ACTIVITY: &'static str = "activity";
    pub const ROUTES: &'static str = "routes";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RegionType {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Grid placement of a region: origin cell plus span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridPosition {
    pub row: u32,
    pub col: u32,
    pub row_span: u32,
    pub col_span: u32,
}

impl GridPosition {
    pub fn new(row: u32, col: u32, row_span: u32, col_span: u32) -> Self {
        Self { row, col, row_span, col_span }
    }

    /// Position at `(row, col)` with the default span for new regions
    pub fn at(row: u32, col: u32) -> Self {
        Self::new(
            row,
            col,
            constants::grid::DEFAULT_ROW_SPAN,
            constants::grid::DEFAULT_COL_SPAN,
        )
    }

    pub fn bottom(&self) -> u32 {
        self.row + self.row_span
    }

    pub fn right(&self) -> u32 {
        self.col + self.col_span
    }
}

/// A positioned, resizable tile in the dashboard grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: RegionId,
    pub layout_id: LayoutId,
    pub region_type: RegionType,
    pub grid_row: u32,
    pub grid_col: u32,
    pub row_span: u32,
    pub col_span: u32,
    #[serde(default)]
    pub is_collapsed: bool,
    #[serde(default)]
    pub is_locked: bool,
    #[serde(default = "empty_config")]
    pub config: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub widget_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub widget_config: Option<Value>,
    /// Server revision, bumped on every accepted update
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn empty_config() -> Value {
    Value::Object(Default::default())
}

impl Region {
    pub fn position(&self) -> GridPosition {
        GridPosition::new(self.grid_row, self.grid_col, self.row_span, self.col_span)
    }

    pub fn set_position(&mut self, pos: GridPosition) {
        self.grid_row = pos.row;
        self.grid_col = pos.col;
        self.row_span = pos.row_span;
        self.col_span = pos.col_span;
    }

    /// Compare everything a user can see or edit, ignoring server bookkeeping
    /// (`version` and timestamps)
    pub fn same_content(&self, other: &Region) -> bool {
        self.id == other.id
            && self.region_type == other.region_type
            && self.position() == other.position()
            && self.is_collapsed == other.is_collapsed
            && self.is_locked == other.is_locked
            && self.config == other.config
            && self.widget_type == other.widget_type
            && self.widget_config == other.widget_config
    }
}

/// Payload for creating a region; the server assigns id, version and timestamps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRegion {
    pub region_type: RegionType,
    pub position: GridPosition,
    #[serde(default)]
    pub is_collapsed: bool,
    #[serde(default)]
    pub is_locked: bool,
    #[serde(default = "empty_config")]
    pub config: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub widget_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub widget_config: Option<Value>,
}

impl NewRegion {
    pub fn new(region_type: RegionType, position: GridPosition) -> Self {
        Self {
            region_type,
            position,
            is_collapsed: false,
            is_locked: false,
            config: empty_config(),
            widget_type: None,
            widget_config: None,
        }
    }

    pub fn with_widget(mut self, widget_type: &str) -> Self {
        self.widget_type = Some(widget_type.to_string());
        self
    }

    /// Copy of an existing region's content, used when re-creating or importing
    pub fn from_region(region: &Region) -> Self {
        Self {
            region_type: region.region_type.clone(),
            position: region.position(),
            is_collapsed: region.is_collapsed,
            is_locked: region.is_locked,
            config: region.config.clone(),
            widget_type: region.widget_type.clone(),
            widget_config: region.widget_config.clone(),
        }
    }
}

/// Partial update of a region; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_row: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_col: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_span: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub col_span: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_collapsed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_locked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
    /// `Some(None)` clears the widget
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "clearable")]
    pub widget_type: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "clearable")]
    pub widget_config: Option<Option<Value>>,
}

/// A present field, `null` included, is an edit
fn clearable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl RegionPatch {
    pub fn position(pos: GridPosition) -> Self {
        Self {
            grid_row: Some(pos.row),
            grid_col: Some(pos.col),
            row_span: Some(pos.row_span),
            col_span: Some(pos.col_span),
            ..Default::default()
        }
    }

    /// Patch that rewrites every editable field to match `region`
    pub fn from_region(region: &Region) -> Self {
        Self {
            is_collapsed: Some(region.is_collapsed),
            is_locked: Some(region.is_locked),
            config: Some(region.config.clone()),
            widget_type: Some(region.widget_type.clone()),
            widget_config: Some(region.widget_config.clone()),
            ..Self::position(region.position())
        }
    }

    pub fn touches_position(&self) -> bool {
        self.grid_row.is_some() || self.grid_col.is_some() || self.row_span.is_some() || self.col_span.is_some()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Fold `later` into `self`; fields set in `later` win
    pub fn merge(&mut self, later: &RegionPatch) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if later.$field.is_some() {
                    self.$field = later.$field.clone();
                })*
            };
        }
        take!(
            grid_row,
            grid_col,
            row_span,
            col_span,
            is_collapsed,
            is_locked,
            config,
            widget_type,
            widget_config
        );
    }

    pub fn apply_to(&self, region: &mut Region) {
        if let Some(v) = self.grid_row {
            region.grid_row = v;
        }
        if let Some(v) = self.grid_col {
            region.grid_col = v;
        }
        if let Some(v) = self.row_span {
            region.row_span = v;
        }
        if let Some(v) = self.col_span {
            region.col_span = v;
        }
        if let Some(v) = self.is_collapsed {
            region.is_collapsed = v;
        }
        if let Some(v) = self.is_locked {
            region.is_locked = v;
        }
        if let Some(v) = &self.config {
            region.config = v.clone();
        }
        if let Some(v) = &self.widget_type {
            region.widget_type = v.clone();
        }
        if let Some(v) = &self.widget_config {
            region.widget_config = v.clone();
        }
    }

    /// Patch turning `from` into `to`, touching only fields that differ
    pub fn diff(from: &Region, to: &Region) -> Self {
        let mut patch = Self::default();
        if from.grid_row != to.grid_row {
            patch.grid_row = Some(to.grid_row);
        }
        if from.grid_col != to.grid_col {
            patch.grid_col = Some(to.grid_col);
        }
        if from.row_span != to.row_span {
            patch.row_span = Some(to.row_span);
        }
        if from.col_span != to.col_span {
            patch.col_span = Some(to.col_span);
        }
        if from.is_collapsed != to.is_collapsed {
            patch.is_collapsed = Some(to.is_collapsed);
        }
        if from.is_locked != to.is_locked {
            patch.is_locked = Some(to.is_locked);
        }
        if from.config != to.config {
            patch.config = Some(to.config.clone());
        }
        if from.widget_type != to.widget_type {
            patch.widget_type = Some(to.widget_type.clone());
        }
        if from.widget_config != to.widget_config {
            patch.widget_config = Some(to.widget_config.clone());
        }
        patch
    }
}

/// A user's collection of regions plus versioning metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    pub id: LayoutId,
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Stored copy of a layout's region list on the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutVersion {
    pub id: String,
    pub layout_id: LayoutId,
    pub version_number: u32,
    pub label: String,
    pub regions: Vec<Region>,
    #[serde(default)]
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
}

/// Role used to pick a default dashboard template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    Manager,
    Technician,
    Dispatcher,
    Sales,
}

impl UserRole {
    pub const ALL: [UserRole; 5] = [
        UserRole::Admin,
        UserRole::Manager,
        UserRole::Technician,
        UserRole::Dispatcher,
        UserRole::Sales,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Manager => "manager",
            UserRole::Technician => "technician",
            UserRole::Dispatcher => "dispatcher",
            UserRole::Sales => "sales",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        UserRole::ALL
            .into_iter()
            .find(|role| role.as_str() == lowered)
            .ok_or_else(|| format!("unknown role '{s}'"))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn region(id: &str, row: u32, col: u32, row_span: u32, col_span: u32) -> Region {
        let now = Utc::now();
        Region {
            id: id.to_string(),
            layout_id: "layout-1".to_string(),
            region_type: RegionType::from(RegionType::ANALYTICS),
            grid_row: row,
            grid_col: col,
            row_span,
            col_span,
            is_collapsed: false,
            is_locked: false,
            config: empty_config(),
            widget_type: None,
            widget_config: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_patch_merge_later_wins() {
        let mut first = RegionPatch {
            grid_row: Some(1),
            grid_col: Some(2),
            ..Default::default()
        };
        let second = RegionPatch {
            grid_col: Some(5),
            is_locked: Some(true),
            ..Default::default()
        };
        first.merge(&second);

        assert_eq!(first.grid_row, Some(1));
        assert_eq!(first.grid_col, Some(5));
        assert_eq!(first.is_locked, Some(true));
        assert_eq!(first.row_span, None);
    }

    #[test]
    fn test_patch_diff_then_apply_reaches_target() {
        let from = region("a", 0, 0, 2, 4);
        let mut to = from.clone();
        to.grid_row = 3;
        to.col_span = 6;
        to.is_collapsed = true;

        let patch = RegionPatch::diff(&from, &to);
        assert_eq!(patch.grid_col, None);

        let mut applied = from.clone();
        patch.apply_to(&mut applied);
        assert!(applied.same_content(&to));
    }

    #[test]
    fn test_diff_clears_removed_widget() {
        let mut from = region("a", 0, 0, 2, 4);
        from.widget_type = Some("chart".to_string());
        from.widget_config = Some(serde_json::json!({ "series": 3 }));
        let to = region("a", 0, 0, 2, 4);

        let patch = RegionPatch::diff(&from, &to);
        assert_eq!(patch.widget_type, Some(None));
        assert_eq!(patch.widget_config, Some(None));

        // null must survive the trip to the server as a clear, not a no-op
        let sent: RegionPatch = serde_json::from_str(&serde_json::to_string(&patch).unwrap()).unwrap();
        assert_eq!(sent.widget_type, Some(None));

        let mut applied = from.clone();
        sent.apply_to(&mut applied);
        assert!(applied.same_content(&to));
    }

    #[test]
    fn test_patch_without_widget_fields_leaves_them() {
        let patch: RegionPatch = serde_json::from_str(r#"{ "grid_row": 2 }"#).unwrap();
        assert_eq!(patch.widget_type, None);
        let mut target = region("a", 0, 0, 2, 4);
        target.widget_type = Some("chart".to_string());
        patch.apply_to(&mut target);
        assert_eq!(target.widget_type.as_deref(), Some("chart"));
    }

    #[test]
    fn test_empty_patch() {
        assert!(RegionPatch::default().is_empty());
        assert!(!RegionPatch::position(GridPosition::at(0, 0)).is_empty());
    }

    #[test]
    fn test_same_content_ignores_version() {
        let a = region("a", 0, 0, 2, 4);
        let mut b = a.clone();
        b.version = 9;
        assert!(a.same_content(&b));
        b.grid_col = 1;
        assert!(!a.same_content(&b));
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("Technician".parse::<UserRole>(), Ok(UserRole::Technician));
        assert_eq!(" admin ".parse::<UserRole>(), Ok(UserRole::Admin));
        assert!("janitor".parse::<UserRole>().is_err());
    }

    #[test]
    fn test_region_json_uses_snake_case_fields() {
        let json = serde_json::to_value(region("a", 1, 2, 3, 4)).unwrap();
        assert_eq!(json["grid_row"], 1);
        assert_eq!(json["col_span"], 4);
        assert_eq!(json["region_type"], "analytics");
        assert!(json.get("widget_type").is_none());
    }
}
