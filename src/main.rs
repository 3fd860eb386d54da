use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use gemwatch::config::Config;
use gemwatch::control;
use gemwatch::page::{self, FeedReader, TapeRecorder};
use gemwatch::store::{HistoryStore, ImportMode, KvStore};
use gemwatch::track::{CrashDetector, TrackerEngine};
use gemwatch::util;

/// Conversation history tracker for the Gemini web app.
///
/// Consumes a JSONL signal feed from an in-page probe, classifies
/// navigation, and records finished conversations into flat storage.
#[derive(Debug, Parser)]
#[command(name = "gemwatch", version, about)]
struct Cli {
    /// Data directory (defaults to ~/.gemwatch)
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Track a live signal feed
    Run {
        /// Read the feed from a file or FIFO instead of stdin
        #[arg(long, value_name = "PATH")]
        feed: Option<PathBuf>,

        /// Record the raw feed to a signal tape
        #[arg(long, value_name = "PATH")]
        record: Option<PathBuf>,
    },
    /// Drive the tracker from a recorded signal tape
    Replay {
        /// Tape file produced by `run --record`
        tape: PathBuf,

        /// Honor the recorded inter-line timing
        #[arg(long)]
        timing: bool,
    },
    /// Export stored history as a pretty-printed JSON file
    Export {
        /// Directory to write into (defaults to <data-dir>/exports)
        #[arg(long, value_name = "DIR")]
        out: Option<PathBuf>,
    },
    /// Import a history JSON file
    Import {
        /// JSON array of conversation records
        file: PathBuf,

        /// Replace stored history instead of merging
        #[arg(long)]
        replace: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    util::init_data_dir(cli.data_dir.clone());

    let config = Config::load();
    util::init_logging(&config.log_level).context("failed to initialize logging")?;

    match cli.command {
        Command::Run { feed, record } => run_tracker(config, feed, record).await,
        Command::Replay { tape, timing } => run_replay(config, tape, timing).await,
        Command::Export { out } => export_history(out),
        Command::Import { file, replace } => import_history(&file, replace),
    }
}

async fn run_tracker(
    config: Config,
    feed: Option<PathBuf>,
    record: Option<PathBuf>,
) -> Result<()> {
    let store = KvStore::open_default().context("failed to open storage")?;

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let writer = control::spawn_writer(outbound_rx, tokio::io::stdout());

    let (engine, handle) = TrackerEngine::new(&config, store, outbound_tx);
    let mut watchdog = CrashDetector::init(
        config.watchdog.clone(),
        handle.health(),
        handle.command_sender(),
    );

    let recorder = match &record {
        Some(path) => {
            Some(TapeRecorder::create(path).context("failed to create the signal tape")?)
        }
        None => None,
    };

    let (feed_tx, feed_rx) = mpsc::channel(256);
    let reader = tokio::spawn(async move {
        match feed {
            Some(path) => {
                let file = tokio::fs::File::open(&path).await?;
                FeedReader::pump(file, feed_tx, recorder).await
            }
            None => FeedReader::pump(tokio::io::stdin(), feed_tx, recorder).await,
        }
    });

    engine.run(feed_rx).await;
    watchdog.cleanup();

    reader
        .await
        .context("feed reader panicked")?
        .context("feed reader failed")?;
    let _ = writer.await;
    Ok(())
}

async fn run_replay(config: Config, tape: PathBuf, timing: bool) -> Result<()> {
    let store = KvStore::open_default().context("failed to open storage")?;

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let writer = control::spawn_writer(outbound_rx, tokio::io::stdout());

    let (engine, handle) = TrackerEngine::new(&config, store, outbound_tx);
    let mut watchdog = CrashDetector::init(
        config.watchdog.clone(),
        handle.health(),
        handle.command_sender(),
    );

    let (feed_tx, feed_rx) = mpsc::channel(256);
    let replayer = tokio::spawn(async move { page::replay(&tape, feed_tx, timing).await });

    engine.run(feed_rx).await;
    watchdog.cleanup();

    replayer
        .await
        .context("tape replay panicked")?
        .context("tape replay failed")?;
    let _ = writer.await;
    Ok(())
}

fn export_history(out: Option<PathBuf>) -> Result<()> {
    let store = KvStore::open_default().context("failed to open storage")?;
    let history = HistoryStore::new(store);
    let dir = out.unwrap_or_else(util::exports_dir);
    let path = history.export(&dir).context("failed to export history")?;
    println!("{}", path.display());
    Ok(())
}

fn import_history(file: &PathBuf, replace: bool) -> Result<()> {
    let store = KvStore::open_default().context("failed to open storage")?;
    let history = HistoryStore::new(store);
    let mode = if replace {
        ImportMode::Replace
    } else {
        ImportMode::Merge
    };
    let outcome = history
        .import(file, mode)
        .context("failed to import history")?;
    println!(
        "imported {} of {} records ({} skipped)",
        outcome.added, outcome.total, outcome.skipped
    );
    Ok(())
}
