//! Notifications emitted by the layout controller

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{error, info, warn};

use crate::store::Conflict;
use crate::types::{LayoutId, RegionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LayoutEvent {
    /// Short user-facing message
    Toast { level: ToastLevel, message: String },
    ConflictDetected(Conflict),
    ConflictResolved(RegionId),
    /// A flush finished and `committed` updates reached the server
    Synced { layout_id: LayoutId, committed: usize },
}

/// Optional sender half of the event channel. Without a subscriber events are
/// only logged
#[derive(Debug, Clone, Default)]
pub struct EventSink(Option<UnboundedSender<LayoutEvent>>);

impl EventSink {
    pub fn channel() -> (Self, UnboundedReceiver<LayoutEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self(Some(tx)), rx)
    }

    pub fn emit(&self, event: LayoutEvent) {
        if let Some(tx) = &self.0
            && tx.send(event).is_err()
        {
            warn!("Layout event receiver dropped");
        }
    }

    pub fn toast(&self, level: ToastLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            ToastLevel::Info => info!(toast = %message),
            ToastLevel::Warning => warn!(toast = %message),
            ToastLevel::Error => error!(toast = %message),
        }
        self.emit(LayoutEvent::Toast { level, message });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toast_reaches_subscriber() {
        let (sink, mut rx) = EventSink::channel();
        sink.toast(ToastLevel::Warning, "slow network");
        assert_eq!(
            rx.try_recv().unwrap(),
            LayoutEvent::Toast {
                level: ToastLevel::Warning,
                message: "slow network".to_string()
            }
        );
    }

    #[test]
    fn test_sink_without_subscriber_is_silent() {
        EventSink::default().toast(ToastLevel::Error, "nobody listens");
    }

    #[test]
    fn test_dropped_receiver_does_not_panic() {
        let (sink, rx) = EventSink::channel();
        drop(rx);
        sink.emit(LayoutEvent::ConflictResolved("a".to_string()));
    }
}
