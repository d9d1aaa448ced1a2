//! Windowed rendering for large dashboards

use super::GridMetrics;
use crate::constants::virtualization;
use crate::types::Region;

/// Vertical slice of the grid currently on screen
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibleWindow {
    pub scroll_top: f32,
    pub height: f32,
    pub overscan: f32,
    pub threshold: usize,
}

impl VisibleWindow {
    pub fn new(scroll_top: f32, height: f32) -> Self {
        Self {
            scroll_top,
            height,
            overscan: virtualization::OVERSCAN,
            threshold: virtualization::THRESHOLD,
        }
    }
}

/// Regions to render. Every region is returned until the count exceeds the
/// threshold; past that only regions intersecting the window (plus overscan)
pub fn visible_regions<'a>(
    regions: &'a [Region],
    metrics: &GridMetrics,
    window: &VisibleWindow,
) -> Vec<&'a Region> {
    if regions.len() <= window.threshold {
        return regions.iter().collect();
    }
    let top = window.scroll_top - window.overscan;
    let bottom = window.scroll_top + window.height + window.overscan;
    regions
        .iter()
        .filter(|r| metrics.region_rect(r).intersects_rows(top, bottom))
        .collect()
}
