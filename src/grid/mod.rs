//! Dashboard grid: bounds, placement, pixel geometry, zoom/pan and virtualization

mod geometry;
mod viewport;
mod virtualize;

pub use geometry::{GridMetrics, Rect};
pub use viewport::Viewport;
pub use virtualize::{visible_regions, VisibleWindow};

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::types::{GridPosition, Region};

/// Logical grid bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSpec {
    pub columns: u32,
    pub max_rows: u32,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self {
            columns: constants::grid::COLUMNS,
            max_rows: constants::grid::MAX_ROWS,
        }
    }
}

impl GridSpec {
    pub fn contains(&self, pos: GridPosition) -> bool {
        pos.row_span >= 1
            && pos.col_span >= 1
            && pos.right() <= self.columns
            && pos.bottom() <= self.max_rows
    }

    /// Force a position inside the grid: spans first, then the origin
    pub fn clamp(&self, pos: GridPosition) -> GridPosition {
        let col_span = pos.col_span.clamp(1, self.columns.max(1));
        let row_span = pos.row_span.clamp(1, self.max_rows.max(1));
        GridPosition {
            row: pos.row.min(self.max_rows.saturating_sub(row_span)),
            col: pos.col.min(self.columns.saturating_sub(col_span)),
            row_span,
            col_span,
        }
    }

    /// First slot (row-major) where a region of the given span fits without
    /// overlapping any expanded region
    pub fn find_free_position(
        &self,
        regions: &[Region],
        row_span: u32,
        col_span: u32,
    ) -> Option<GridPosition> {
        let shape = self.clamp(GridPosition::new(0, 0, row_span, col_span));
        for row in 0..=self.max_rows.saturating_sub(shape.row_span) {
            for col in 0..=self.columns.saturating_sub(shape.col_span) {
                let candidate = GridPosition { row, col, ..shape };
                if !regions
                    .iter()
                    .any(|r| !r.is_collapsed && overlaps(candidate, r.position()))
                {
                    return Some(candidate);
                }
            }
        }
        None
    }
}

pub fn overlaps(a: GridPosition, b: GridPosition) -> bool {
    a.col < b.right() && b.col < a.right() && a.row < b.bottom() && b.row < a.bottom()
}

/// Pairs of region ids whose cells overlap
pub fn find_collisions(regions: &[Region]) -> Vec<(String, String)> {
    let mut collisions = Vec::new();
    for (i, a) in regions.iter().enumerate() {
        for b in &regions[i + 1..] {
            if overlaps(a.position(), b.position()) {
                collisions.push((a.id.clone(), b.id.clone()));
            }
        }
    }
    collisions
}
