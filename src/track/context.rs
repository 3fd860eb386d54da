//! Shared tracking state

use chrono::{DateTime, Utc};

use crate::page::ConversationEntry;

/// In-flight capture details, held while a send is pending.
#[derive(Debug, Clone)]
pub struct CaptureState {
    /// URL of the placeholder page where the send happened.
    pub origin_url: String,
    pub started_at: DateTime<Utc>,
    /// Chat id assigned by the app once the URL materializes.
    pub chat_id: Option<String>,
    /// Most recent conversation-list snapshot since arming.
    pub snapshot: Option<Vec<ConversationEntry>>,
}

/// The engine's mutable tracking state.
///
/// Owned by the dispatcher task; every change happens between awaits, so
/// each event observes the effects of all events before it.
#[derive(Debug)]
pub struct TrackingContext {
    /// True while the tracker holds live watches.
    pub active: bool,
    /// Tab visibility as last reported.
    pub visible: bool,
    /// Set on a qualifying send from a placeholder page; cleared by
    /// completion, cancellation, or teardown.
    pub new_chat_pending: bool,
    /// Present exactly while `new_chat_pending`.
    pub capture: Option<CaptureState>,
    /// True from capture dispatch until its save completion arrives.
    pub save_in_flight: bool,
    /// Teardown generation. Async completions carrying an older epoch
    /// are stale and must be dropped.
    pub epoch: u64,
    /// URL from the most recent mutation signal.
    pub current_url: Option<String>,
    /// Document title as last scraped.
    pub page_title: Option<String>,
    /// Model label as last scraped.
    pub model_label: Option<String>,
}

impl TrackingContext {
    pub fn new() -> Self {
        Self {
            active: false,
            visible: true,
            new_chat_pending: false,
            capture: None,
            save_in_flight: false,
            epoch: 0,
            current_url: None,
            page_title: None,
            model_label: None,
        }
    }

    /// Mark a capture pending, anchored at the placeholder it started on.
    pub fn begin_capture(&mut self, origin_url: String) {
        self.new_chat_pending = true;
        self.capture = Some(CaptureState {
            origin_url,
            started_at: Utc::now(),
            chat_id: None,
            snapshot: None,
        });
    }

    /// Drop any in-flight capture and the pending flag with it.
    pub fn clear_capture(&mut self) {
        self.new_chat_pending = false;
        self.capture = None;
        self.save_in_flight = false;
    }

    /// Full teardown: clears capture state, deactivates, and advances the
    /// epoch so completions dispatched before the teardown no longer
    /// apply. Returns the new epoch.
    pub fn teardown(&mut self) -> u64 {
        self.clear_capture();
        self.active = false;
        self.epoch += 1;
        self.epoch
    }
}

impl Default for TrackingContext {
    fn default() -> Self {
        Self::new()
    }
}
