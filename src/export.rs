//! Layout export/import file format
//!
//! An export is the region list wrapped in a small envelope:
//! `{ layoutId, regions, version, exportedAt, metadata }`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::constants;
use crate::error::{LayoutError, LayoutResult};
use crate::grid::GridSpec;
use crate::types::{LayoutId, NewRegion, Region};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetadata {
    pub region_count: usize,
    pub grid_columns: u32,
    #[serde(default)]
    pub exported_by: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutExport {
    pub layout_id: LayoutId,
    pub regions: Vec<Region>,
    /// Envelope format version
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    pub metadata: ExportMetadata,
}

impl LayoutExport {
    pub fn new(layout_id: &str, regions: Vec<Region>, grid: &GridSpec) -> Self {
        Self {
            layout_id: layout_id.to_string(),
            metadata: ExportMetadata {
                region_count: regions.len(),
                grid_columns: grid.columns,
                exported_by: concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION")).to_string(),
            },
            regions,
            version: constants::export::FORMAT_VERSION,
            exported_at: Utc::now(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> LayoutResult<Self> {
        serde_json::from_str(json).map_err(|e| LayoutError::InvalidImport(e.to_string()))
    }

    /// Check the envelope before anything is replaced
    pub fn validate(&self, grid: &GridSpec) -> LayoutResult<()> {
        if self.version != constants::export::FORMAT_VERSION {
            return Err(LayoutError::InvalidImport(format!(
                "unsupported export version {} (expected {})",
                self.version,
                constants::export::FORMAT_VERSION
            )));
        }
        if self.metadata.region_count != self.regions.len() {
            return Err(LayoutError::InvalidImport(format!(
                "metadata lists {} regions but file contains {}",
                self.metadata.region_count,
                self.regions.len()
            )));
        }
        if self.metadata.grid_columns != grid.columns {
            return Err(LayoutError::InvalidImport(format!(
                "exported for a {}-column grid, this grid has {}",
                self.metadata.grid_columns, grid.columns
            )));
        }

        let mut seen = HashSet::new();
        for region in &self.regions {
            if !seen.insert(region.id.as_str()) {
                return Err(LayoutError::InvalidImport(format!("duplicate region id {}", region.id)));
            }
            if !grid.contains(region.position()) {
                return Err(LayoutError::InvalidImport(format!(
                    "region {} ({}) is outside the grid",
                    region.id, region.region_type
                )));
            }
        }
        Ok(())
    }

    /// Creation payloads for the imported regions, in file order
    pub fn new_regions(&self) -> Vec<NewRegion> {
        self.regions.iter().map(NewRegion::from_region).collect()
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        let json = self.to_json().context("Failed to serialize layout export")?;
        fs::write(path, json).with_context(|| format!("Failed to write export to {:?}", path))?;
        info!(path = %path.display(), regions = self.regions.len(), "Exported layout");
        Ok(())
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read export from {:?}", path))?;
        let export = Self::from_json(&contents)
            .with_context(|| format!("Failed to parse export from {:?}", path))?;
        Ok(export)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::tests::region;

    fn sample() -> LayoutExport {
        LayoutExport::new(
            "layout-1",
            vec![region("a", 0, 0, 2, 4), region("b", 2, 4, 3, 8)],
            &GridSpec::default(),
        )
    }

    #[test]
    fn test_envelope_uses_camel_case_keys() {
        let json: serde_json::Value = serde_json::from_str(&sample().to_json().unwrap()).unwrap();
        assert_eq!(json["layoutId"], "layout-1");
        assert_eq!(json["version"], 1);
        assert!(json.get("exportedAt").is_some());
        assert_eq!(json["metadata"]["regionCount"], 2);
        assert_eq!(json["metadata"]["gridColumns"], 12);
        assert_eq!(json["regions"][1]["grid_col"], 4);
    }

    #[test]
    fn test_parse_and_validate() {
        let export = sample();
        let parsed = LayoutExport::from_json(&export.to_json().unwrap()).unwrap();
        assert_eq!(parsed, export);
        parsed.validate(&GridSpec::default()).unwrap();
    }

    #[test]
    fn test_malformed_json_is_invalid_import() {
        let err = LayoutExport::from_json("{\"layoutId\": 3}").unwrap_err();
        assert!(matches!(err, LayoutError::InvalidImport(_)));
        assert!(err.is_validation());
    }

    #[test]
    fn test_validate_rejects_bad_files() {
        let grid = GridSpec::default();

        let mut wrong_version = sample();
        wrong_version.version = 7;
        assert!(wrong_version.validate(&grid).is_err());

        let mut out_of_bounds = sample();
        out_of_bounds.regions[0].grid_col = 10;
        assert!(out_of_bounds.validate(&grid).is_err());

        let mut miscounted = sample();
        miscounted.metadata.region_count = 5;
        assert!(miscounted.validate(&grid).is_err());

        let mut duplicated = sample();
        duplicated.regions[1].id = "a".to_string();
        assert!(duplicated.validate(&grid).is_err());
    }

    #[test]
    fn test_new_regions_keep_types_and_positions() {
        let export = sample();
        let created = export.new_regions();
        assert_eq!(created.len(), 2);
        assert_eq!(created[1].position, export.regions[1].position());
        assert_eq!(created[1].region_type, export.regions[1].region_type);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layout.json");
        let export = sample();
        export.write_to(&path).unwrap();
        assert_eq!(LayoutExport::read_from(&path).unwrap(), export);
    }
}
