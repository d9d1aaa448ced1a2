//! Per-region synchronization state with the layout server

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{LayoutId, Region, RegionId, RegionPatch};

/// Where a region stands relative to the server copy
#[derive(Debug, Clone, PartialEq)]
pub enum SyncState {
    /// Local copy matches the last server response
    Committed,
    /// Local edits are queued or in flight
    Pending,
    /// The server rejected an edit because it changed underneath us
    Conflicted(Conflict),
}

impl SyncState {
    pub fn is_conflicted(&self) -> bool {
        matches!(self, SyncState::Conflicted(_))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, SyncState::Pending)
    }
}

/// A divergence between the optimistic local region and the server's copy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub region_id: RegionId,
    pub local: Region,
    pub remote: Region,
    pub detected_at: DateTime<Utc>,
}

impl Conflict {
    pub fn new(local: Region, remote: Region) -> Self {
        Self {
            region_id: local.id.clone(),
            local,
            remote,
            detected_at: Utc::now(),
        }
    }

    pub fn local_version(&self) -> u64 {
        self.local.version
    }

    pub fn remote_version(&self) -> u64 {
        self.remote.version
    }

    /// Fields where the two copies disagree, as a patch over the remote copy
    pub fn local_changes(&self) -> RegionPatch {
        RegionPatch::diff(&self.remote, &self.local)
    }
}

/// User decision for a conflict
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    KeepLocal,
    KeepRemote,
    /// Apply the given fields on top of the remote copy
    Merge(RegionPatch),
}

/// A queued write ready to be sent to the server
#[derive(Debug, Clone, PartialEq)]
pub struct PendingUpdate {
    pub layout_id: LayoutId,
    pub region_id: RegionId,
    pub patch: RegionPatch,
    /// Server version the patch was computed against
    pub expected_version: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::tests::region;

    #[test]
    fn test_conflict_versions_and_changes() {
        let mut local = region("a", 0, 3, 2, 4);
        local.version = 2;
        let mut remote = region("a", 0, 0, 2, 4);
        remote.version = 3;

        let conflict = Conflict::new(local, remote);
        assert_eq!(conflict.region_id, "a");
        assert_eq!(conflict.local_version(), 2);
        assert_eq!(conflict.remote_version(), 3);
        assert_eq!(
            conflict.local_changes(),
            RegionPatch {
                grid_col: Some(3),
                ..Default::default()
            }
        );
    }
}
