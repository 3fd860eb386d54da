//! Wire vocabulary for the page-probe feed
//!
//! The in-page probe reports what it sees as one JSON object per line.
//! Each line is either a [`PageSignal`] (something happened in the page) or
//! a [`ControlRequest`] (the embedder wants something from the tracker).
//! Unknown signal kinds deserialize to [`PageSignal::Unknown`] so older
//! trackers survive newer probes.

use serde::{Deserialize, Serialize};

/// One line of the probe feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FeedLine {
    /// An observation from the page.
    Signal(PageSignal),
    /// A request from the embedder, answered on the outbound stream.
    Request(ControlRequest),
}

/// An observation from the page, tagged by kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "camelCase")]
pub enum PageSignal {
    /// A body-wide DOM mutation batch, with the page URL at the time it
    /// was delivered.
    Mutation(MutationSignal),

    /// A fresh snapshot of the sidebar conversation list.
    ConversationList(ConversationListSignal),

    /// A click somewhere in the page, with its ancestor element chain.
    Click(ClickSignal),

    /// The tab became visible or hidden.
    Visibility(VisibilitySignal),

    /// Page-level metadata the probe scraped outside any mutation batch.
    PageMeta(PageMetaSignal),

    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationSignal {
    pub url: String,
    #[serde(default)]
    pub nodes_added: u64,
    #[serde(default)]
    pub nodes_removed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationListSignal {
    #[serde(default)]
    pub conversations: Vec<ConversationEntry>,
}

/// A single row of the sidebar conversation list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationEntry {
    /// Chat id the probe extracted from the row's link, if it could.
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickSignal {
    /// Selector-ish descriptor of the clicked element.
    pub target: String,
    /// Descriptors of the ancestor chain, innermost first.
    #[serde(default)]
    pub ancestors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisibilitySignal {
    pub visible: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetaSignal {
    /// Model label from the model picker, e.g. "2.5 Flash".
    #[serde(default)]
    pub model: Option<String>,
    /// Gem display name, when the page shows one.
    #[serde(default)]
    pub gem_name: Option<String>,
    /// Document title.
    #[serde(default)]
    pub title: Option<String>,
}

/// A request arriving in-band on the feed.
///
/// The action is kept as a string so unrecognized actions still parse and
/// can be answered with an error response instead of being dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlRequest {
    /// Caller-chosen correlation id, echoed back in the response.
    pub id: serde_json::Value,
    pub action: String,
    #[serde(default, flatten)]
    pub params: serde_json::Map<String, serde_json::Value>,
}
