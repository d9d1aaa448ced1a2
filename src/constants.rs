//! Application-wide constants
//!
//! This module contains the magic numbers and string literals used throughout
//! the layout engine, providing a single source of truth for default values.

/// Dashboard grid constants
pub mod grid {
    /// Number of columns in the dashboard grid
    pub const COLUMNS: u32 = 12;

    /// Number of rows a region may extend to
    pub const MAX_ROWS: u32 = 12;

    /// Height of a single grid row in pixels
    pub const ROW_HEIGHT: f32 = 80.0;

    /// Gap between rows and columns in pixels
    pub const GAP: f32 = 16.0;

    /// Container width used when no viewport width is known
    pub const CONTAINER_WIDTH: f32 = 1200.0;

    /// Default span for regions added without an explicit size
    pub const DEFAULT_ROW_SPAN: u32 = 2;
    pub const DEFAULT_COL_SPAN: u32 = 4;
}

/// Virtualized grid constants
pub mod virtualization {
    /// Region count above which only the visible window is rendered
    pub const THRESHOLD: usize = 50;

    /// Extra pixels rendered above and below the viewport
    pub const OVERSCAN: f32 = 200.0;
}

/// Zoom and pan constants
pub mod zoom {
    pub const MIN: f32 = 0.25;
    pub const MAX: f32 = 2.0;
    pub const STEP: f32 = 0.1;
    pub const DEFAULT: f32 = 1.0;
}

/// Undo/redo history constants
pub mod history {
    /// Maximum snapshots kept per layout
    pub const LIMIT: usize = 50;
}

/// Persistence timing constants
pub mod persistence {
    /// Delay before batched region changes are written to the server
    pub const DEBOUNCE_MS: u64 = 500;
}

/// Export file constants
pub mod export {
    /// Current export envelope format version
    pub const FORMAT_VERSION: u32 = 1;
}

/// Configuration file locations
pub mod config {
    /// Directory name under the platform config dir
    pub const APP_DIR: &str = "region-layout";

    /// Settings filename
    pub const FILENAME: &str = "settings.json";

    /// Data filename holding the local layout server state
    pub const DATA_FILENAME: &str = "layouts.json";
}
