//! User-visible tracking status

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// The phase the tracker is in, as surfaced to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "camelCase")]
pub enum TrackingStatus {
    /// Not tracking (torn down or never started).
    Idle,
    /// Watches armed, waiting for the app to look ready.
    Waiting,
    /// App ready, watching normally.
    Tracking,
    /// A send was seen; waiting for the chat to materialize.
    Pending,
    /// A capture just saved; `total` counts stored conversations.
    Saved { total: usize },
    /// A pending capture was abandoned.
    Cancelled { warning: String },
    /// Something user-relevant failed.
    Error { message: String },
}

impl TrackingStatus {
    /// Stable lowercase phase name, used in logs.
    pub fn phase_name(&self) -> &'static str {
        match self {
            TrackingStatus::Idle => "idle",
            TrackingStatus::Waiting => "waiting",
            TrackingStatus::Tracking => "tracking",
            TrackingStatus::Pending => "pending",
            TrackingStatus::Saved { .. } => "saved",
            TrackingStatus::Cancelled { .. } => "cancelled",
            TrackingStatus::Error { .. } => "error",
        }
    }
}

/// Publishes status transitions on a watch channel and the log.
#[derive(Debug)]
pub struct StatusIndicator {
    tx: watch::Sender<TrackingStatus>,
}

impl StatusIndicator {
    pub fn new() -> (Self, watch::Receiver<TrackingStatus>) {
        let (tx, rx) = watch::channel(TrackingStatus::Idle);
        (Self { tx }, rx)
    }

    /// Record a transition. Re-setting the current status is a no-op.
    pub fn set(&self, status: TrackingStatus) {
        if *self.tx.borrow() == status {
            return;
        }
        match &status {
            TrackingStatus::Saved { total } => {
                tracing::info!(total, "conversation saved");
            }
            TrackingStatus::Cancelled { warning } => {
                tracing::warn!(%warning, "capture cancelled");
            }
            TrackingStatus::Error { message } => {
                tracing::error!(%message, "tracking error");
            }
            other => {
                tracing::info!(phase = other.phase_name(), "status changed");
            }
        }
        let _ = self.tx.send(status);
    }

    pub fn current(&self) -> TrackingStatus {
        self.tx.borrow().clone()
    }
}
