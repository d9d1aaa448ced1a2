//! Sending queued region edits to the layout server

use tracing::{debug, info, warn};

use super::events::{EventSink, LayoutEvent, ToastLevel};
use crate::api::LayoutApi;
use crate::error::{ApiError, LayoutResult};
use crate::store::{lock, SharedRegionStore};
use crate::types::RegionId;

/// Outcome of one flush
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FlushReport {
    pub committed: usize,
    pub conflicts: Vec<RegionId>,
    /// Updates that never reached the server and stay queued
    pub failed: usize,
    /// Updates the server refused; the region was reloaded from the server
    pub rejected: usize,
}

impl FlushReport {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty() && self.failed == 0 && self.rejected == 0
    }
}

/// Send every ready update of a layout until the queues drain or a request
/// fails. The store lock is never held across a request.
pub async fn flush_layout<A: LayoutApi>(
    api: &A,
    store: &SharedRegionStore,
    layout_id: &str,
    events: &EventSink,
) -> LayoutResult<FlushReport> {
    let mut report = FlushReport::default();
    let mut needs_reload = false;

    loop {
        let ready = lock(store).take_ready_updates(layout_id)?;
        if ready.is_empty() {
            break;
        }
        debug!(layout = %layout_id, updates = ready.len(), "Flushing region updates");

        let mut stalled = false;
        for update in ready {
            let outcome = api
                .update_region(&update.layout_id, &update.region_id, &update.patch, update.expected_version)
                .await;
            match outcome {
                Ok(server) => {
                    lock(store).commit_update(&update, server)?;
                    report.committed += 1;
                }
                Err(ApiError::VersionMismatch { remote }) => {
                    let rejected = lock(store).reject_update(&update, *remote);
                    match rejected {
                        Ok(conflict) => {
                            report.conflicts.push(update.region_id.clone());
                            events.emit(LayoutEvent::ConflictDetected(conflict));
                        }
                        Err(e) => debug!(region = %update.region_id, error = %e, "Conflict for vanished region"),
                    }
                }
                Err(ApiError::NotFound(what)) => {
                    let removed = lock(store).remove_region(layout_id, &update.region_id);
                    if removed.is_ok() {
                        events.toast(ToastLevel::Warning, format!("{what} was deleted elsewhere"));
                    }
                }
                Err(ApiError::Rejected(reason)) => {
                    lock(store).discard_pending(&update)?;
                    report.rejected += 1;
                    needs_reload = true;
                    events.toast(ToastLevel::Error, format!("Update refused: {reason}"));
                }
                Err(ApiError::Network(reason)) => {
                    lock(store).fail_update(&update)?;
                    report.failed += 1;
                    stalled = true;
                    events.toast(ToastLevel::Error, format!("Failed to save layout: {reason}"));
                }
            }
        }

        if stalled {
            break;
        }
    }

    if needs_reload {
        match api.list_regions(layout_id).await {
            Ok(server) => lock(store).reconcile(layout_id, server)?,
            Err(e) => warn!(layout = %layout_id, error = %e, "Failed to reload refused regions"),
        }
    }

    if report.committed > 0 {
        info!(layout = %layout_id, committed = report.committed, "Layout synced");
        events.emit(LayoutEvent::Synced {
            layout_id: layout_id.to_string(),
            committed: report.committed,
        });
    }
    Ok(report)
}
