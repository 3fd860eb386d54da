//! JSONL feed reader
//!
//! Pumps probe output (stdin or a file) into the engine's channel, one
//! parsed [`FeedLine`] per JSON line. A malformed line is logged and
//! skipped so a glitching probe cannot take the tracker down with it.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;

use crate::page::signal::FeedLine;
use crate::page::tape::TapeRecorder;

/// Reader for the line-delimited probe feed.
pub struct FeedReader;

impl FeedReader {
    /// Read feed lines from `input` and send them to `tx`.
    ///
    /// When a `recorder` is given, every non-blank raw line is appended to
    /// the tape before parsing, so even lines we fail to parse are kept
    /// for replay. Returns on EOF or when the receiver hangs up.
    pub async fn pump<R>(
        input: R,
        tx: mpsc::Sender<FeedLine>,
        recorder: Option<TapeRecorder>,
    ) -> std::io::Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let reader = BufReader::new(input);
        let mut lines = reader.lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            tracing::trace!("feed raw line: {}", &line);

            if let Some(rec) = &recorder {
                if let Err(e) = rec.append_raw(&line) {
                    tracing::warn!("Failed to record feed line: {e}");
                }
            }

            match serde_json::from_str::<FeedLine>(&line) {
                Ok(event) => {
                    if tx.send(event).await.is_err() {
                        // Receiver dropped, exit gracefully
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to parse feed line: {e}. Line: {line}");
                    // Continue processing - don't fail on single parse error
                }
            }
        }

        Ok(())
    }
}
