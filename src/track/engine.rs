//! The tracker engine
//!
//! A single dispatcher task owns all tracking state and consumes the probe
//! feed in arrival order: mutation batches drive the URL watch, list
//! snapshots the list watch, clicks the send filter, visibility changes
//! the re-init path. Saves run off-loop and report back on the command
//! channel stamped with the epoch they started under; a completion from
//! an older epoch arrived after teardown and is dropped.

use std::path::PathBuf;
use std::time::Instant;

use chrono::SecondsFormat;
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc, watch};
use uuid::Uuid;

use crate::config::Config;
use crate::control::{self, Outbound, OutboundEvent};
use crate::nav::{Transition, UrlClassifier};
use crate::page::{
    ClickSignal, ControlRequest, ConversationEntry, FeedLine, MutationSignal, PageMetaSignal,
    PageSignal, VisibilitySignal,
};
use crate::store::{ChangeNotice, ConversationRecord, HistoryStore, KvStore};
use crate::track::context::TrackingContext;
use crate::track::gem::GemDetector;
use crate::track::observer::{ObserverRegistry, UrlPair};
use crate::track::send::SendClickFilter;
use crate::track::status::{StatusIndicator, TrackingStatus};
use crate::track::watchdog::{HealthHandle, HealthSnapshot};
use crate::util::{self, LogCache, LOG_CONFIG_KEY};

/// Commands handled by the engine between feed lines.
#[derive(Debug)]
pub enum EngineCommand {
    /// Re-run the initialization path.
    Reinit { reason: ReinitReason },
    /// An off-loop save finished.
    SaveCompleted {
        epoch: u64,
        result: Result<usize, String>,
    },
}

/// Why a re-initialization was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReinitReason {
    /// The page became visible again.
    Visibility,
    /// The URL watch was found disconnected while tracking was active.
    WatchLost,
    /// A visible page stopped producing signals.
    SignalStall,
}

impl ReinitReason {
    pub fn name(&self) -> &'static str {
        match self {
            ReinitReason::Visibility => "visibility",
            ReinitReason::WatchLost => "watchLost",
            ReinitReason::SignalStall => "signalStall",
        }
    }
}

/// What a watch callback saw. Callbacks queue these instead of touching
/// the engine, and the engine drains the queue after each signal, so
/// handler effects apply in the order the underlying events occurred.
#[derive(Debug)]
enum WatchFired {
    UrlChanged(UrlPair),
    ListFound(Vec<ConversationEntry>),
}

/// Cloneable handle to a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    cmd_tx: mpsc::UnboundedSender<EngineCommand>,
    status_rx: watch::Receiver<TrackingStatus>,
    health: HealthHandle,
}

impl EngineHandle {
    /// Ask the engine to rebuild its watches.
    pub fn request_reinit(&self, reason: ReinitReason) {
        let _ = self.cmd_tx.send(EngineCommand::Reinit { reason });
    }

    /// Sender for engine commands, for wiring up the crash detector.
    pub fn command_sender(&self) -> mpsc::UnboundedSender<EngineCommand> {
        self.cmd_tx.clone()
    }

    pub fn status(&self) -> TrackingStatus {
        self.status_rx.borrow().clone()
    }

    pub fn status_receiver(&self) -> watch::Receiver<TrackingStatus> {
        self.status_rx.clone()
    }

    pub fn health(&self) -> HealthHandle {
        self.health.clone()
    }
}

/// The dispatcher. Owns every piece of tracking state; nothing here is
/// shared, so handlers mutate freely between awaits.
pub struct TrackerEngine {
    classifier: UrlClassifier,
    send_filter: SendClickFilter,
    fallback_level: String,
    ctx: TrackingContext,
    observers: ObserverRegistry,
    gems: GemDetector,
    status: StatusIndicator,
    store: KvStore,
    history: HistoryStore,
    log_cache: LogCache,
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    cmd_tx: mpsc::UnboundedSender<EngineCommand>,
    cmd_rx: mpsc::UnboundedReceiver<EngineCommand>,
    fired_tx: mpsc::UnboundedSender<WatchFired>,
    fired_rx: mpsc::UnboundedReceiver<WatchFired>,
    health: HealthHandle,
    last_signal_at: Option<Instant>,
}

impl TrackerEngine {
    pub fn new(
        config: &Config,
        store: KvStore,
        outbound_tx: mpsc::UnboundedSender<Outbound>,
    ) -> (Self, EngineHandle) {
        let classifier = config.classifier();
        let (status, status_rx) = StatusIndicator::new();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        let health = HealthHandle::default();
        let history = HistoryStore::new(store.clone());

        let handle = EngineHandle {
            cmd_tx: cmd_tx.clone(),
            status_rx,
            health: health.clone(),
        };

        let engine = Self {
            classifier: classifier.clone(),
            send_filter: SendClickFilter::new(&config.send_patterns),
            fallback_level: config.log_level.clone(),
            ctx: TrackingContext::new(),
            observers: ObserverRegistry::new(),
            gems: GemDetector::new(classifier),
            status,
            store,
            history,
            log_cache: LogCache::new(),
            outbound_tx,
            cmd_tx,
            cmd_rx,
            fired_tx,
            fired_rx,
            health,
            last_signal_at: None,
        };
        (engine, handle)
    }

    /// Consume the feed until it ends.
    pub async fn run(mut self, mut feed_rx: mpsc::Receiver<FeedLine>) {
        let mut changes = self.store.subscribe();
        // Storage may carry a log level overriding the config default
        self.log_cache.apply(&self.store, &self.fallback_level);
        self.reinitialize("startup");
        self.publish_health();

        loop {
            tokio::select! {
                line = feed_rx.recv() => match line {
                    Some(FeedLine::Signal(signal)) => self.handle_signal(signal),
                    Some(FeedLine::Request(request)) => self.handle_request(request).await,
                    None => break,
                },
                Some(cmd) = self.cmd_rx.recv() => self.handle_command(cmd),
                notice = changes.recv() => match notice {
                    Ok(notice) => self.handle_storage_change(notice),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "storage change notices lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {}
                },
            }
            self.publish_health();
        }
        // Let an in-flight save finish before reporting the final status.
        // Teardown clears the flag, so this only ever waits on a completion
        // that is guaranteed to arrive.
        while self.ctx.save_in_flight {
            match self.cmd_rx.recv().await {
                Some(cmd) => self.handle_command(cmd),
                None => break,
            }
        }
        self.finalize();
    }

    fn handle_signal(&mut self, signal: PageSignal) {
        self.last_signal_at = Some(Instant::now());
        match signal {
            PageSignal::Mutation(mutation) => self.handle_mutation(mutation),
            PageSignal::ConversationList(list) => {
                self.observers.observe_list(&list.conversations);
            }
            PageSignal::Click(click) => self.handle_click(click),
            PageSignal::Visibility(visibility) => self.handle_visibility(visibility),
            PageSignal::PageMeta(meta) => self.handle_page_meta(meta),
            PageSignal::Unknown => tracing::trace!("ignoring unrecognized signal"),
        }
        self.drain_watch_fires();
    }

    fn handle_command(&mut self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::Reinit { reason } => {
                tracing::info!(reason = reason.name(), "re-initialization requested");
                let _ = self
                    .outbound_tx
                    .send(Outbound::Event(OutboundEvent::ReattachRequested {
                        reason: reason.name().to_string(),
                    }));
                self.reinitialize(reason.name());
            }
            EngineCommand::SaveCompleted { epoch, result } => {
                self.handle_save_completed(epoch, result);
            }
        }
        self.drain_watch_fires();
    }

    fn handle_mutation(&mut self, signal: MutationSignal) {
        tracing::trace!(
            url = %signal.url,
            added = signal.nodes_added,
            removed = signal.nodes_removed,
            "mutation batch"
        );
        self.ctx.current_url = Some(signal.url.clone());
        self.gems.reset(&signal.url);
        self.observers.observe_url(&signal.url);
    }

    fn handle_click(&mut self, click: ClickSignal) {
        // Runs on every click; the cheap filter rejects almost all of them
        if !self.send_filter.matches(&click.target, &click.ancestors) {
            return;
        }
        if !self.ctx.active {
            tracing::trace!("send click ignored while torn down");
            return;
        }
        if self.ctx.new_chat_pending {
            tracing::debug!("send click while a capture is already pending");
            return;
        }
        let Some(url) = self.ctx.current_url.clone() else {
            tracing::debug!("send click before any mutation reported a URL");
            return;
        };
        if !self.classifier.is_new_chat_placeholder(&url) {
            // Sends inside an existing chat leave nothing to capture: the
            // conversation is already identifiable by its URL
            tracing::trace!(url = %url, "send click inside an existing chat");
            return;
        }

        tracing::info!(url = %url, "send click on a new-chat page, starting capture");
        self.ctx.begin_capture(url);
        self.arm_list_watch();
        self.set_status(TrackingStatus::Pending);
    }

    fn handle_visibility(&mut self, signal: VisibilitySignal) {
        self.ctx.visible = signal.visible;
        if signal.visible {
            tracing::debug!("page visible again, re-initializing watches");
            self.reinitialize("visibility");
        } else {
            tracing::trace!("page hidden");
        }
    }

    fn handle_page_meta(&mut self, meta: PageMetaSignal) {
        if let Some(model) = meta.model {
            self.ctx.model_label = Some(model);
        }
        if let Some(title) = meta.title {
            self.ctx.page_title = Some(title);
        }
        if let Some(name) = meta.gem_name {
            self.gems.set_name(name);
        }
    }

    /// Apply queued watch callbacks. A handler may re-arm watches whose
    /// callbacks queue further entries; the loop runs those too.
    fn drain_watch_fires(&mut self) {
        while let Ok(fired) = self.fired_rx.try_recv() {
            match fired {
                WatchFired::UrlChanged(pair) => self.handle_url_change(pair),
                WatchFired::ListFound(entries) => self.handle_list_found(entries),
            }
        }
    }

    fn handle_url_change(&mut self, pair: UrlPair) {
        if self.classifier.is_same_chat(&pair.previous, &pair.current) {
            tracing::trace!(url = %pair.current, "url churn within the same chat");
            return;
        }

        let transition = self
            .classifier
            .classify_transition(&pair.previous, &pair.current);
        tracing::debug!(
            previous = %pair.previous,
            current = %pair.current,
            transition = %transition,
            "page navigation observed"
        );

        match transition {
            Transition::NewChat | Transition::WithinGem => {
                if self.ctx.new_chat_pending {
                    self.assign_chat_id(&pair.current);
                } else {
                    self.set_status(TrackingStatus::Tracking);
                }
            }
            Transition::Unrelated => self.handle_unrelated(&pair),
        }
    }

    /// The pending chat got its URL. Completes the capture if a snapshot
    /// already arrived, otherwise keeps the list watch armed for one.
    fn assign_chat_id(&mut self, url: &str) {
        let Some(chat_id) = self.classifier.extract_chat_id(url) else {
            return;
        };
        tracing::info!(chat_id = %chat_id, "pending chat materialized");
        if let Some(capture) = self.ctx.capture.as_mut() {
            capture.chat_id = Some(chat_id);
        }
        if !self.try_complete_capture() && !self.observers.list_watch_armed() {
            self.arm_list_watch();
        }
    }

    fn handle_list_found(&mut self, entries: Vec<ConversationEntry>) {
        if self.ctx.new_chat_pending {
            tracing::debug!(entries = entries.len(), "list snapshot during capture");
            if let Some(capture) = self.ctx.capture.as_mut() {
                capture.snapshot = Some(entries);
            }
            if !self.try_complete_capture() {
                // Chat id not known yet; keep watching for the next snapshot
                self.arm_list_watch();
            }
        } else {
            tracing::debug!(entries = entries.len(), "conversation list found");
            self.set_status(TrackingStatus::Tracking);
        }
    }

    fn handle_unrelated(&mut self, pair: &UrlPair) {
        if self.ctx.new_chat_pending {
            let warning = format!(
                "Navigation to {} interrupted an unsaved chat; the conversation was not recorded",
                pair.current
            );
            tracing::warn!("{warning}");
            self.set_status(TrackingStatus::Cancelled { warning });
        } else {
            self.set_status(TrackingStatus::Idle);
        }
        self.teardown("unrelated navigation");
    }

    /// Build the record for the pending capture and hand it to a blocking
    /// save. Returns false while the capture is not yet identifiable.
    fn try_complete_capture(&mut self) -> bool {
        let Some(capture) = self.ctx.capture.as_ref() else {
            return false;
        };
        let Some(chat_id) = capture.chat_id.clone() else {
            return false;
        };
        let Some(snapshot) = capture.snapshot.as_ref() else {
            return false;
        };

        let matching = snapshot
            .iter()
            .find(|entry| entry.chat_id.as_deref() == Some(chat_id.as_str()));
        let title = matching
            .and_then(|entry| entry.title.clone())
            .or_else(|| snapshot.iter().find_map(|entry| entry.title.clone()))
            .or_else(|| self.ctx.page_title.clone());

        let record = ConversationRecord {
            timestamp: capture
                .started_at
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            model: self
                .ctx
                .model_label
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
            id: Some(Uuid::new_v4()),
            title,
            url: self.ctx.current_url.clone(),
            chat_id: Some(chat_id.clone()),
            gem: self.gems.current(),
            extra: serde_json::Map::new(),
        };

        tracing::info!(
            chat_id = %chat_id,
            origin = %capture.origin_url,
            "capture complete, saving conversation"
        );
        self.ctx.save_in_flight = true;
        let history = self.history.clone();
        let cmd_tx = self.cmd_tx.clone();
        let epoch = self.ctx.epoch;
        tokio::task::spawn_blocking(move || {
            let result = history.append(record).map_err(|e| e.to_string());
            let _ = cmd_tx.send(EngineCommand::SaveCompleted { epoch, result });
        });
        true
    }

    fn handle_save_completed(&mut self, epoch: u64, result: Result<usize, String>) {
        if epoch != self.ctx.epoch {
            tracing::debug!(
                save_epoch = epoch,
                current_epoch = self.ctx.epoch,
                "stale save completion dropped"
            );
            return;
        }
        self.ctx.save_in_flight = false;
        match result {
            Ok(total) => {
                tracing::info!(total, "conversation saved");
                self.ctx.clear_capture();
                self.set_status(TrackingStatus::Saved { total });
            }
            Err(message) => {
                tracing::error!("failed to save conversation: {message}");
                self.ctx.clear_capture();
                self.set_status(TrackingStatus::Error {
                    message: format!("failed to save conversation: {message}"),
                });
            }
        }
    }

    async fn handle_request(&mut self, request: ControlRequest) {
        tracing::debug!(action = %request.action, "control request");
        let reply = match request.action.as_str() {
            control::ACTION_GET_PAGE_INFO => {
                let data = control::page_info(
                    self.ctx.current_url.as_deref(),
                    &self.classifier,
                    self.gems.current(),
                );
                Outbound::ok_response(request.id, Some(data))
            }
            control::ACTION_INVALIDATE_LOG_CONFIG => {
                self.log_cache.invalidate();
                let config = self.log_cache.apply(&self.store, &self.fallback_level);
                Outbound::ok_response(request.id, Some(json!({ "level": config.level })))
            }
            control::ACTION_OPEN_HISTORY_PAGE => {
                self.export_history(request.id, &request.params).await
            }
            other => {
                tracing::warn!(action = other, "unknown control action");
                Outbound::error_response(request.id, format!("unknown action: {other}"))
            }
        };
        let _ = self.outbound_tx.send(reply);
    }

    async fn export_history(
        &mut self,
        id: Value,
        params: &serde_json::Map<String, Value>,
    ) -> Outbound {
        let dir = params
            .get("out")
            .and_then(|v| v.as_str())
            .map(PathBuf::from)
            .unwrap_or_else(util::exports_dir);
        let history = self.history.clone();
        let exported = tokio::task::spawn_blocking(move || history.export(&dir)).await;
        match exported {
            Ok(Ok(path)) => {
                tracing::info!(path = %path.display(), "history exported");
                Outbound::ok_response(id, Some(json!({ "path": path })))
            }
            Ok(Err(e)) => {
                tracing::error!("history export failed: {e}");
                self.set_status(TrackingStatus::Error {
                    message: format!("history export failed: {e}"),
                });
                Outbound::error_response(id, e.to_string())
            }
            Err(e) => {
                tracing::error!("history export task failed: {e}");
                Outbound::error_response(id, "export task failed")
            }
        }
    }

    fn handle_storage_change(&mut self, notice: ChangeNotice) {
        if notice.key == LOG_CONFIG_KEY {
            self.log_cache.invalidate();
            let refreshed = self.log_cache.apply(&self.store, &self.fallback_level);
            tracing::debug!(level = %refreshed.level, "log config refreshed from storage");
        }
        let _ = self
            .outbound_tx
            .send(Outbound::Event(OutboundEvent::StorageChanged(notice)));
    }

    /// The init path shared by startup, visibility changes, and watchdog
    /// nudges: drop whatever watches remain and arm fresh ones. A pending
    /// capture survives; the baseline resets to the current URL so time
    /// spent hidden never manufactures a transition.
    fn reinitialize(&mut self, reason: &str) {
        tracing::info!(reason, "initializing tracking watches");
        self.observers.cleanup_all_observers();
        self.observers.set_last_url(self.ctx.current_url.clone());
        if let Some(url) = self.ctx.current_url.clone() {
            self.gems.reset(&url);
        }
        self.ctx.active = true;
        self.last_signal_at = Some(Instant::now());

        let tx = self.fired_tx.clone();
        self.observers.watch_url_changes(Box::new(move |pair| {
            let _ = tx.send(WatchFired::UrlChanged(pair));
        }));
        self.arm_list_watch();

        if self.ctx.new_chat_pending {
            self.set_status(TrackingStatus::Pending);
        } else {
            self.set_status(TrackingStatus::Waiting);
        }
    }

    fn arm_list_watch(&mut self) {
        let tx = self.fired_tx.clone();
        self.observers
            .watch_for_conversation_list(Box::new(move |entries| {
                let _ = tx.send(WatchFired::ListFound(entries));
            }));
    }

    fn teardown(&mut self, reason: &str) {
        tracing::info!(reason, "tearing down tracking watches");
        self.observers.complete_cleanup();
        self.gems.clear();
        let epoch = self.ctx.teardown();
        tracing::debug!(epoch, "teardown complete");
    }

    fn set_status(&mut self, status: TrackingStatus) {
        if self.status.current() == status {
            return;
        }
        self.status.set(status.clone());
        let _ = self
            .outbound_tx
            .send(Outbound::Event(OutboundEvent::Status { status }));
    }

    fn publish_health(&self) {
        self.health.store(HealthSnapshot {
            active: self.ctx.active,
            visible: self.ctx.visible,
            pending: self.ctx.new_chat_pending,
            url_watch_armed: self.observers.url_watch_armed(),
            list_watch_armed: self.observers.list_watch_armed(),
            last_signal: self.last_signal_at,
        });
    }

    /// Feed EOF. A capture still pending at this point is lost, and the
    /// user is told so.
    fn finalize(&mut self) {
        if self.ctx.new_chat_pending {
            let warning =
                "Feed ended with an unsaved chat; the conversation was not recorded".to_string();
            tracing::warn!("{warning}");
            self.set_status(TrackingStatus::Cancelled { warning });
        } else {
            self.set_status(TrackingStatus::Idle);
        }
        self.teardown("feed ended");
        self.publish_health();
        tracing::info!("tracker engine stopped");
    }
}
