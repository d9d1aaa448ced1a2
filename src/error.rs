//! Error types for the layout engine
//!
//! Three categories are distinguished: validation errors (the operation is
//! aborted before any state changes), API errors from the layout server, and
//! conflicts which always wait for an explicit user decision.

use thiserror::Error;

use crate::types::{Region, RegionId};

/// Errors returned by a [`crate::api::LayoutApi`] implementation
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The update was based on a stale region version
    #[error("version mismatch: server has version {}", remote.version)]
    VersionMismatch { remote: Box<Region> },

    #[error("{0} not found")]
    NotFound(String),

    /// The server refused the payload (out of bounds, malformed)
    #[error("rejected by server: {0}")]
    Rejected(String),

    /// Transport failure; the request may be retried on the next sync
    #[error("network error: {0}")]
    Network(String),
}

/// Errors surfaced by the store and the layout controller
#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("no layout loaded")]
    MissingLayout,

    #[error("region {0} not found")]
    UnknownRegion(RegionId),

    #[error("region {0} is locked")]
    RegionLocked(RegionId),

    #[error("region {0} has an unresolved conflict")]
    Conflicted(RegionId),

    #[error("region {0} has no conflict to resolve")]
    NoConflict(RegionId),

    #[error("no free space for a {rows}x{cols} region")]
    GridFull { rows: u32, cols: u32 },

    #[error("invalid import: {0}")]
    InvalidImport(String),

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl LayoutError {
    /// Validation failures abort the operation before anything is sent
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            LayoutError::MissingLayout
                | LayoutError::UnknownRegion(_)
                | LayoutError::RegionLocked(_)
                | LayoutError::GridFull { .. }
                | LayoutError::InvalidImport(_)
        )
    }
}

pub type LayoutResult<T> = std::result::Result<T, LayoutError>;
