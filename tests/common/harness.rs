//! Engine harness over an in-memory feed
//!
//! Runs a real [`TrackerEngine`] on its own task, wired the same way the
//! binary wires it, and exposes the channels a test needs to drive it and
//! observe what it says.

use std::path::Path;
use std::time::Duration;

use gemwatch::config::Config;
use gemwatch::control::{Outbound, OutboundEvent};
use gemwatch::page::FeedLine;
use gemwatch::store::{HistoryStore, KvStore};
use gemwatch::track::{EngineHandle, TrackerEngine, TrackingStatus};
use tempfile::TempDir;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// How long a test waits on the engine before giving up.
pub const WAIT: Duration = Duration::from_secs(5);

/// A running engine plus everything needed to talk to it.
pub struct TestTracker {
    feed_tx: mpsc::Sender<FeedLine>,
    outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    pub handle: EngineHandle,
    status_rx: watch::Receiver<TrackingStatus>,
    pub store: KvStore,
    engine: JoinHandle<()>,
    dir: TempDir,
}

impl TestTracker {
    /// Start an engine with the default configuration in a fresh data dir.
    pub fn start() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let store =
            KvStore::open(dir.path().join("storage.json")).expect("failed to open storage");
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (engine, handle) = TrackerEngine::new(&config, store.clone(), outbound_tx);
        let status_rx = handle.status_receiver();
        let (feed_tx, feed_rx) = mpsc::channel(256);
        let engine = tokio::spawn(engine.run(feed_rx));
        Self {
            feed_tx,
            outbound_rx,
            handle,
            status_rx,
            store,
            engine,
            dir,
        }
    }

    /// History reader over the same storage blob the engine writes.
    pub fn history(&self) -> HistoryStore {
        HistoryStore::new(self.store.clone())
    }

    pub fn data_dir(&self) -> &Path {
        self.dir.path()
    }

    /// Feed one line to the engine.
    pub async fn feed(&self, line: FeedLine) {
        self.feed_tx.send(line).await.expect("engine feed closed");
    }

    pub async fn feed_all(&self, lines: impl IntoIterator<Item = FeedLine>) {
        for line in lines {
            self.feed(line).await;
        }
    }

    /// Wait until the status matches, returning the matching status.
    pub async fn wait_for_status(
        &mut self,
        expect: impl Fn(&TrackingStatus) -> bool,
    ) -> TrackingStatus {
        loop {
            let current = self.status_rx.borrow_and_update().clone();
            if expect(&current) {
                return current;
            }
            timeout(WAIT, self.status_rx.changed())
                .await
                .expect("timed out waiting for a status change")
                .expect("engine dropped its status channel");
        }
    }

    /// Next outbound line of any kind.
    pub async fn next_outbound(&mut self) -> Outbound {
        timeout(WAIT, self.outbound_rx.recv())
            .await
            .expect("timed out waiting for outbound traffic")
            .expect("outbound channel closed")
    }

    /// Next response, skipping interleaved events.
    pub async fn next_response(&mut self) -> Outbound {
        loop {
            match self.next_outbound().await {
                response @ Outbound::Response { .. } => return response,
                Outbound::Event(_) => {}
            }
        }
    }

    /// Next event matching the predicate, skipping everything else.
    pub async fn wait_for_event(
        &mut self,
        expect: impl Fn(&OutboundEvent) -> bool,
    ) -> OutboundEvent {
        loop {
            if let Outbound::Event(event) = self.next_outbound().await {
                if expect(&event) {
                    return event;
                }
            }
        }
    }

    /// Close the feed and wait for the engine to finish.
    pub async fn shutdown(self) {
        let TestTracker {
            feed_tx,
            engine,
            dir,
            ..
        } = self;
        drop(feed_tx);
        timeout(WAIT, engine)
            .await
            .expect("engine did not stop after feed EOF")
            .expect("engine task panicked");
        // The data dir outlives the engine so a save racing EOF still has
        // somewhere to land.
        drop(dir);
    }
}
