//! Watch registry
//!
//! The engine arms at most one conversation-list watch and one URL watch
//! at a time; incoming page signals are offered to the registry, which
//! fires the matching callback. The list watch fires exactly once and
//! disarms itself; the URL watch fires on every change from the last URL
//! it saw. Handles disconnect idempotently, and a watch disconnected out
//! from under the registry is pruned silently on the next offer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::page::ConversationEntry;

/// Which watch a handle controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchKind {
    ConversationList,
    UrlChange,
}

impl WatchKind {
    fn name(&self) -> &'static str {
        match self {
            WatchKind::ConversationList => "conversation-list",
            WatchKind::UrlChange => "url-change",
        }
    }
}

/// Disconnect handle for one armed watch.
///
/// Cloneable; disconnecting any clone disarms the watch. Disconnecting an
/// already-disconnected handle is a no-op.
#[derive(Debug, Clone)]
pub struct ObserverHandle {
    kind: WatchKind,
    connected: Arc<AtomicBool>,
}

impl ObserverHandle {
    fn new(kind: WatchKind) -> Self {
        Self {
            kind,
            connected: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn kind(&self) -> WatchKind {
        self.kind
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            tracing::trace!(watch = self.kind.name(), "watch disconnected");
        }
    }
}

/// A change of page URL as seen by the URL watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlPair {
    pub previous: String,
    pub current: String,
}

pub type ListCallback = Box<dyn FnOnce(Vec<ConversationEntry>) + Send>;
pub type UrlCallback = Box<dyn FnMut(UrlPair) + Send>;

struct ListWatch {
    handle: ObserverHandle,
    on_found: ListCallback,
}

struct UrlWatch {
    handle: ObserverHandle,
    on_change: UrlCallback,
}

/// Holds the armed watches and the URL baseline.
#[derive(Default)]
pub struct ObserverRegistry {
    list_watch: Option<ListWatch>,
    url_watch: Option<UrlWatch>,
    /// Last URL the URL watch saw. Survives [`cleanup_all_observers`] so
    /// re-arming doesn't manufacture a transition, cleared by
    /// [`complete_cleanup`].
    ///
    /// [`cleanup_all_observers`]: ObserverRegistry::cleanup_all_observers
    /// [`complete_cleanup`]: ObserverRegistry::complete_cleanup
    last_url: Option<String>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the conversation-list watch. `on_found` fires once, on the
    /// next list snapshot, then the watch disarms itself; the caller
    /// re-arms if it wants more. Arming while armed replaces the previous
    /// watch.
    pub fn watch_for_conversation_list(&mut self, on_found: ListCallback) -> ObserverHandle {
        if let Some(old) = self.list_watch.take() {
            old.handle.disconnect();
        }
        let handle = ObserverHandle::new(WatchKind::ConversationList);
        self.list_watch = Some(ListWatch {
            handle: handle.clone(),
            on_found,
        });
        tracing::debug!("conversation-list watch armed");
        handle
    }

    /// Arm the URL watch. `on_change` fires for every offered URL that
    /// differs from the last one seen. Arming while armed replaces the
    /// previous watch but keeps the baseline.
    pub fn watch_url_changes(&mut self, on_change: UrlCallback) -> ObserverHandle {
        if let Some(old) = self.url_watch.take() {
            old.handle.disconnect();
        }
        let handle = ObserverHandle::new(WatchKind::UrlChange);
        self.url_watch = Some(UrlWatch {
            handle: handle.clone(),
            on_change,
        });
        tracing::debug!("url-change watch armed");
        handle
    }

    /// Offer a conversation-list snapshot. Consumes the list watch if it
    /// is armed and still connected.
    pub fn observe_list(&mut self, conversations: &[ConversationEntry]) {
        let Some(watch) = self.list_watch.take() else {
            return;
        };
        if !watch.handle.is_connected() {
            // Disconnected behind our back; prune without firing
            return;
        }
        watch.handle.disconnect();
        tracing::debug!(
            entries = conversations.len(),
            "conversation-list watch fired"
        );
        (watch.on_found)(conversations.to_vec());
    }

    /// Offer a mutation's URL. Fires the URL watch when it differs from
    /// the baseline, then advances the baseline. The first URL offered
    /// after the baseline was cleared only seeds it.
    pub fn observe_url(&mut self, url: &str) {
        if self
            .url_watch
            .as_ref()
            .is_some_and(|w| !w.handle.is_connected())
        {
            self.url_watch = None;
        }
        let Some(watch) = self.url_watch.as_mut() else {
            return;
        };

        match self.last_url.as_deref() {
            None => {
                self.last_url = Some(url.to_string());
            }
            Some(previous) if previous == url => {}
            Some(previous) => {
                let pair = UrlPair {
                    previous: previous.to_string(),
                    current: url.to_string(),
                };
                self.last_url = Some(url.to_string());
                (watch.on_change)(pair);
            }
        }
    }

    /// Seed or clear the URL baseline without firing anything.
    pub fn set_last_url(&mut self, url: Option<String>) {
        self.last_url = url;
    }

    pub fn last_url(&self) -> Option<&str> {
        self.last_url.as_deref()
    }

    /// True when the URL watch is armed and still connected.
    pub fn url_watch_armed(&self) -> bool {
        self.url_watch
            .as_ref()
            .is_some_and(|w| w.handle.is_connected())
    }

    /// True when the list watch is armed and still connected.
    pub fn list_watch_armed(&self) -> bool {
        self.list_watch
            .as_ref()
            .is_some_and(|w| w.handle.is_connected())
    }

    /// Disarm just the list watch.
    pub fn disarm_list_watch(&mut self) {
        if let Some(watch) = self.list_watch.take() {
            watch.handle.disconnect();
        }
    }

    /// Disarm both watches but keep the URL baseline. Safe to call at any
    /// time, in any state, repeatedly.
    pub fn cleanup_all_observers(&mut self) {
        if let Some(watch) = self.list_watch.take() {
            watch.handle.disconnect();
        }
        if let Some(watch) = self.url_watch.take() {
            watch.handle.disconnect();
        }
    }

    /// Disarm everything and forget the URL baseline. For teardown, where
    /// whatever page comes next must start fresh. Idempotent.
    pub fn complete_cleanup(&mut self) {
        self.cleanup_all_observers();
        self.last_url = None;
    }
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("list_watch_armed", &self.list_watch_armed())
            .field("url_watch_armed", &self.url_watch_armed())
            .field("last_url", &self.last_url)
            .finish()
    }
}
