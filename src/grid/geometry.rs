//! Grid cell to pixel arithmetic

use serde::{Deserialize, Serialize};

use super::GridSpec;
use crate::constants;
use crate::types::{GridPosition, Region};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn left(&self) -> f32 {
        self.x
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn top(&self) -> f32 {
        self.y
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn intersects_rows(&self, top: f32, bottom: f32) -> bool {
        self.top() < bottom && self.bottom() > top
    }
}

/// Pixel metrics of the rendered grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridMetrics {
    pub columns: u32,
    pub row_height: f32,
    pub gap: f32,
    pub container_width: f32,
}

impl Default for GridMetrics {
    fn default() -> Self {
        Self {
            columns: constants::grid::COLUMNS,
            row_height: constants::grid::ROW_HEIGHT,
            gap: constants::grid::GAP,
            container_width: constants::grid::CONTAINER_WIDTH,
        }
    }
}

impl GridMetrics {
    pub fn column_width(&self) -> f32 {
        let columns = self.columns.max(1) as f32;
        let gaps = self.gap * (columns - 1.0);
        ((self.container_width - gaps) / columns).max(0.0)
    }

    /// Pixel rectangle covered by a grid position
    pub fn rect_for(&self, pos: GridPosition) -> Rect {
        let col_width = self.column_width();
        let col_span = pos.col_span.max(1) as f32;
        let row_span = pos.row_span.max(1) as f32;
        Rect {
            x: pos.col as f32 * (col_width + self.gap),
            y: pos.row as f32 * (self.row_height + self.gap),
            width: col_span * col_width + (col_span - 1.0) * self.gap,
            height: row_span * self.row_height + (row_span - 1.0) * self.gap,
        }
    }

    pub fn region_rect(&self, region: &Region) -> Rect {
        self.rect_for(region.position())
    }

    /// Height needed to show every region
    pub fn content_height(&self, regions: &[Region]) -> f32 {
        regions
            .iter()
            .map(|r| self.region_rect(r).bottom())
            .fold(0.0, f32::max)
    }

    /// Map a dropped pixel position to the nearest cell, keeping the span in bounds
    pub fn snap_to_cell(&self, x: f32, y: f32, pos: GridPosition, spec: &GridSpec) -> GridPosition {
        let col_pitch = self.column_width() + self.gap;
        let row_pitch = self.row_height + self.gap;
        let col = if col_pitch > 0.0 { (x / col_pitch).round().max(0.0) as u32 } else { 0 };
        let row = if row_pitch > 0.0 { (y / row_pitch).round().max(0.0) as u32 } else { 0 };
        spec.clamp(GridPosition { row, col, ..pos })
    }
}
