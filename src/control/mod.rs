//! Control surface for host-side callers
//!
//! Requests arrive on the feed as `{"type":"request", "id", "action", ...}`
//! lines. Everything going the other way is serialized here: responses
//! paired to a request id, and unsolicited events (status changes, storage
//! notices, reattach requests) that callers subscribe to by reading the
//! output stream.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::nav::UrlClassifier;
use crate::store::{ChangeNotice, GemInfo};
use crate::track::TrackingStatus;

pub const ACTION_GET_PAGE_INFO: &str = "getPageInfo";
pub const ACTION_INVALIDATE_LOG_CONFIG: &str = "invalidateLogConfigCache";
pub const ACTION_OPEN_HISTORY_PAGE: &str = "openHistoryPage";

/// A line written to the outbound stream
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Outbound {
    /// Reply to a control request, matched by `id`
    #[serde(rename_all = "camelCase")]
    Response {
        id: Value,
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Unsolicited notification
    Event(OutboundEvent),
}

impl Outbound {
    pub fn ok_response(id: Value, data: Option<Value>) -> Self {
        Outbound::Response {
            id,
            ok: true,
            data,
            error: None,
        }
    }

    pub fn error_response(id: Value, message: impl Into<String>) -> Self {
        Outbound::Response {
            id,
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum OutboundEvent {
    /// The tracking status changed
    Status { status: TrackingStatus },
    /// A storage key changed value
    StorageChanged(ChangeNotice),
    /// The engine wants the page-side feed re-established
    ReattachRequested { reason: String },
}

/// Answer for `getPageInfo`: what kind of page the tracker currently
/// sees. `cached_gem` is trusted only while its id still matches the
/// URL; a stale cache falls back to the bare id from the URL.
pub fn page_info(
    url: Option<&str>,
    classifier: &UrlClassifier,
    cached_gem: Option<GemInfo>,
) -> Value {
    let is_chat = url.is_some_and(|u| classifier.is_chat_url(u));
    let url_gem = url.and_then(|u| classifier.extract_gem_id(u));
    let is_gem = url_gem.is_some();

    let gem_info = match url_gem {
        None => Value::Null,
        Some(id) => {
            let info = match cached_gem {
                Some(info) if info.gem_id.as_deref() == Some(id.as_str()) => info,
                _ => GemInfo {
                    gem_id: Some(id),
                    name: None,
                },
            };
            serde_json::to_value(info).unwrap_or(Value::Null)
        }
    };

    json!({
        "url": url.unwrap_or(""),
        "isGeminiChat": is_chat,
        "isGem": is_gem,
        "gemInfo": gem_info,
    })
}

/// Drain outbound messages onto a byte stream, one JSON line each.
/// Stops when the channel closes or the stream rejects a write.
pub fn spawn_writer<W>(
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    mut out: W,
) -> tokio::task::JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let mut line = match serde_json::to_vec(&message) {
                Ok(line) => line,
                Err(e) => {
                    tracing::warn!("Failed to encode outbound message: {e}");
                    continue;
                }
            };
            line.push(b'\n');
            if out.write_all(&line).await.is_err() {
                break;
            }
            let _ = out.flush().await;
        }
    })
}
