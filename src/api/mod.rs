//! Remote layout API
//!
//! The layout server is a collaborator: the engine only relies on the
//! operations in [`LayoutApi`]. [`MemoryLayoutApi`] implements them in-process
//! and can persist its state to a JSON file, which is what the CLI uses.

mod memory;

pub use memory::MemoryLayoutApi;

use std::future::Future;

use crate::error::ApiError;
use crate::types::{Layout, LayoutVersion, NewRegion, Region, RegionPatch};

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// REST-style layout endpoints
pub trait LayoutApi: Send + Sync + 'static {
    /// Default layout of a user, created on first access
    fn get_or_create_default_layout(&self, user_id: &str) -> impl Future<Output = ApiResult<Layout>> + Send;

    fn get_layout(&self, layout_id: &str) -> impl Future<Output = ApiResult<Layout>> + Send;

    fn list_regions(&self, layout_id: &str) -> impl Future<Output = ApiResult<Vec<Region>>> + Send;

    fn create_region(
        &self,
        layout_id: &str,
        region: NewRegion,
    ) -> impl Future<Output = ApiResult<Region>> + Send;

    /// Apply `patch` if the stored region is still at `expected_version`,
    /// otherwise fail with [`ApiError::VersionMismatch`]
    fn update_region(
        &self,
        layout_id: &str,
        region_id: &str,
        patch: &RegionPatch,
        expected_version: u64,
    ) -> impl Future<Output = ApiResult<Region>> + Send;

    fn delete_region(&self, layout_id: &str, region_id: &str) -> impl Future<Output = ApiResult<()>> + Send;

    fn list_versions(&self, layout_id: &str) -> impl Future<Output = ApiResult<Vec<LayoutVersion>>> + Send;

    /// Store the current region list as a new version
    fn create_version(&self, layout_id: &str, label: &str) -> impl Future<Output = ApiResult<LayoutVersion>> + Send;

    fn publish_version(
        &self,
        layout_id: &str,
        version_id: &str,
    ) -> impl Future<Output = ApiResult<LayoutVersion>> + Send;

    /// Replace the live regions with a stored version, returning the new list
    fn revert_to_version(
        &self,
        layout_id: &str,
        version_id: &str,
    ) -> impl Future<Output = ApiResult<Vec<Region>>> + Send;
}
