//! Grid dashboard layout engine
//!
//! Regions live on a 12-column grid. Edits are applied optimistically to a
//! [`store::RegionStore`], persisted through a [`api::LayoutApi`] with
//! per-region versions, and can be undone. [`controller::LayoutController`]
//! is the entry point for a dashboard UI.

#![forbid(unsafe_code)]

pub mod api;
pub mod config;
pub mod constants;
pub mod controller;
pub mod error;
pub mod export;
pub mod grid;
pub mod history;
pub mod scheduler;
pub mod store;
pub mod templates;
pub mod types;

pub use api::{LayoutApi, MemoryLayoutApi};
pub use controller::{FlushReport, LayoutController, LayoutEvent, ToastLevel};
pub use error::{ApiError, LayoutError, LayoutResult};
pub use export::LayoutExport;
pub use store::{Conflict, RegionStore, Resolution, SyncState};
pub use types::{GridPosition, Layout, NewRegion, Region, RegionPatch, RegionType, UserRole};
