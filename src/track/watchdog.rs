//! Background liveness checks for the tracking pipeline
//!
//! Watches can silently die: the page replaces the container the list
//! watch was attached to, or the feed goes quiet while the page claims
//! to be visible. The crash detector polls a shared health snapshot and
//! asks the engine to reattach when the pipeline looks dead. An engine
//! that tore itself down on purpose is left alone.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use super::engine::{EngineCommand, ReinitReason};

/// Timing knobs for the crash detector
#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    /// How often to inspect the health snapshot
    pub check_interval: Duration,
    /// How long a visible page may stay silent before it counts as stalled.
    /// Also the minimum spacing between two reattach requests.
    pub stall_after: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(15),
            stall_after: Duration::from_secs(60),
        }
    }
}

/// Point-in-time view of the pipeline, published by the engine
#[derive(Debug, Clone)]
pub struct HealthSnapshot {
    pub active: bool,
    pub visible: bool,
    pub pending: bool,
    pub url_watch_armed: bool,
    pub list_watch_armed: bool,
    pub last_signal: Option<Instant>,
}

impl Default for HealthSnapshot {
    fn default() -> Self {
        Self {
            active: false,
            visible: true,
            pending: false,
            url_watch_armed: false,
            list_watch_armed: false,
            last_signal: None,
        }
    }
}

/// Shared slot the engine writes snapshots into
#[derive(Clone, Default)]
pub struct HealthHandle {
    slot: Arc<Mutex<HealthSnapshot>>,
}

impl HealthHandle {
    pub fn store(&self, snapshot: HealthSnapshot) {
        *self.slot.lock() = snapshot;
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        self.slot.lock().clone()
    }
}

/// Periodic liveness check over the engine's health snapshot
pub struct CrashDetector {
    shutdown_tx: Option<watch::Sender<bool>>,
}

impl CrashDetector {
    /// Start the periodic check in a background task.
    pub fn init(
        config: WatchdogConfig,
        health: HealthHandle,
        engine_tx: mpsc::UnboundedSender<EngineCommand>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let watchdog = Watchdog {
            config,
            health,
            engine_tx,
            shutdown_rx,
        };
        tokio::spawn(watchdog.run());
        Self {
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Stop the periodic check.
    pub fn cleanup(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
    }
}

impl Drop for CrashDetector {
    fn drop(&mut self) {
        self.cleanup();
    }
}

struct Watchdog {
    config: WatchdogConfig,
    health: HealthHandle,
    engine_tx: mpsc::UnboundedSender<EngineCommand>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Watchdog {
    async fn run(mut self) {
        let mut interval = tokio::time::interval(self.config.check_interval);
        // Skip the first immediate tick
        interval.tick().await;

        let mut last_nudge: Option<Instant> = None;

        loop {
            tokio::select! {
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    if !self.check(&mut last_nudge) {
                        break;
                    }
                }
            }
        }
        tracing::debug!("Crash detector stopped");
    }

    /// One liveness check. Returns false when the engine is gone and the
    /// detector should stop.
    fn check(&self, last_nudge: &mut Option<Instant>) -> bool {
        let health = self.health.snapshot();

        // Inactive means the engine tore down deliberately. Nothing to revive.
        if !health.active {
            return true;
        }

        // Space out reattach requests; a reinit needs time to take effect.
        if last_nudge.is_some_and(|at| at.elapsed() < self.config.stall_after) {
            return true;
        }

        if !health.url_watch_armed {
            tracing::warn!("URL watch detached while tracking is active, requesting reattach");
            *last_nudge = Some(Instant::now());
            return self.nudge(ReinitReason::WatchLost);
        }

        let stalled = health
            .last_signal
            .map_or(true, |at| at.elapsed() >= self.config.stall_after);
        if health.visible && stalled {
            tracing::warn!(
                stall_after_secs = self.config.stall_after.as_secs(),
                "No signals from a visible page, requesting reattach"
            );
            *last_nudge = Some(Instant::now());
            return self.nudge(ReinitReason::SignalStall);
        }

        true
    }

    fn nudge(&self, reason: ReinitReason) -> bool {
        self.engine_tx.send(EngineCommand::Reinit { reason }).is_ok()
    }
}
