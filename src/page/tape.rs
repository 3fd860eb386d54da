//! Signal tape recording and replay
//!
//! A tape is a JSONL file: a header line followed by one entry per raw
//! feed line, each stamped with a sequence number and a millisecond offset
//! from recording start. Entries keep the raw line verbatim, so replays
//! see byte-for-byte what the live tracker saw, including lines it could
//! not parse at the time.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::page::signal::FeedLine;

pub const SIGNAL_TAPE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TapeJsonlLine {
    Header {
        schema_version: u32,
        created_at_ms: u64,
    },
    Entry {
        seq: u64,
        ts_ms: u64,
        line: String,
    },
}

/// One recorded feed line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapeEntry {
    pub seq: u64,
    /// Milliseconds since recording started.
    pub ts_ms: u64,
    /// The raw feed line, verbatim.
    pub line: String,
}

/// A fully loaded tape.
#[derive(Debug, Clone)]
pub struct SignalTape {
    pub schema_version: u32,
    pub created_at_ms: u64,
    pub entries: Vec<TapeEntry>,
}

impl SignalTape {
    pub fn read_from_path(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);

        let mut schema_version: Option<u32> = None;
        let mut created_at_ms: Option<u64> = None;
        let mut entries = Vec::new();

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let parsed: TapeJsonlLine =
                serde_json::from_str(&line).map_err(|e| io::Error::other(format!("{e}")))?;
            match parsed {
                TapeJsonlLine::Header {
                    schema_version: v,
                    created_at_ms: t,
                } => {
                    if idx != 0 {
                        return Err(io::Error::other("tape header must be the first JSONL line"));
                    }
                    schema_version = Some(v);
                    created_at_ms = Some(t);
                }
                TapeJsonlLine::Entry { seq, ts_ms, line } => {
                    entries.push(TapeEntry { seq, ts_ms, line });
                }
            }
        }

        let schema_version =
            schema_version.ok_or_else(|| io::Error::other("missing tape header"))?;
        let created_at_ms =
            created_at_ms.ok_or_else(|| io::Error::other("missing tape header timestamp"))?;

        Ok(Self {
            schema_version,
            created_at_ms,
            entries,
        })
    }
}

/// Appends raw feed lines to a tape file as they arrive.
///
/// Cloneable so the feed reader can own one while the caller keeps another
/// handle; all clones share the underlying writer.
#[derive(Clone)]
pub struct TapeRecorder {
    inner: Arc<TapeRecorderInner>,
}

struct TapeRecorderInner {
    started: Instant,
    seq: AtomicU64,
    writer: Mutex<BufWriter<File>>,
}

impl TapeRecorder {
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        let header = TapeJsonlLine::Header {
            schema_version: SIGNAL_TAPE_SCHEMA_VERSION,
            created_at_ms: now_ms(),
        };
        writeln!(
            writer,
            "{}",
            serde_json::to_string(&header).map_err(io::Error::other)?
        )?;
        writer.flush()?;
        Ok(Self {
            inner: Arc::new(TapeRecorderInner {
                started: Instant::now(),
                seq: AtomicU64::new(1),
                writer: Mutex::new(writer),
            }),
        })
    }

    pub fn append_raw(&self, raw: &str) -> io::Result<()> {
        let entry = TapeJsonlLine::Entry {
            seq: self.inner.seq.fetch_add(1, Ordering::SeqCst),
            ts_ms: self.inner.started.elapsed().as_millis() as u64,
            line: raw.to_string(),
        };
        let json = serde_json::to_string(&entry).map_err(io::Error::other)?;
        let mut writer = self.inner.writer.lock();
        writeln!(writer, "{json}")?;
        writer.flush()?;
        Ok(())
    }
}

/// Feed a recorded tape back into the engine's channel.
///
/// With `timing` set, inter-line gaps from the recording are reproduced;
/// otherwise entries are delivered as fast as the engine takes them.
/// Unparseable entries are logged and skipped, same as the live feed.
pub async fn replay(path: &Path, tx: mpsc::Sender<FeedLine>, timing: bool) -> io::Result<()> {
    let tape = SignalTape::read_from_path(path)?;
    tracing::info!(
        entries = tape.entries.len(),
        schema_version = tape.schema_version,
        "replaying signal tape"
    );

    let mut last_ts = 0u64;
    for entry in tape.entries {
        if timing {
            let delta = entry.ts_ms.saturating_sub(last_ts);
            if delta > 0 {
                tokio::time::sleep(Duration::from_millis(delta)).await;
            }
            last_ts = entry.ts_ms;
        }
        match serde_json::from_str::<FeedLine>(&entry.line) {
            Ok(event) => {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!("Skipping unparseable tape entry {}: {e}", entry.seq);
            }
        }
    }

    Ok(())
}

fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
