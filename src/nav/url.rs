//! URL grammar for the Gemini web app
//!
//! Recognizes the handful of path shapes the tracker cares about:
//! - `/app`: the app root, which doubles as the new-chat placeholder
//! - `/app/c/{chat_id}`: a chat view
//! - `/gem/{gem_id}` or `/gem/{gem_id}/homepage`: a Gem homepage
//! - `/gem/{gem_id}/chat/{chat_id}`: a chat inside a Gem
//!
//! An optional `/u/{digits}` account prefix is stripped before matching so
//! multi-account sessions classify the same as the default account.

use url::Url;

/// Host the production app is served from.
pub const DEFAULT_APP_HOST: &str = "gemini.google.com";

/// What a recognized URL points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageKind {
    /// The app root (new-chat placeholder).
    AppRoot,
    /// A chat view outside any Gem.
    Chat { chat_id: String },
    /// A Gem's homepage (the Gem's own new-chat placeholder).
    GemHomepage { gem_id: String },
    /// A chat inside a Gem.
    GemChat { gem_id: String, chat_id: String },
    /// On the app host but not a shape we track (settings, etc.).
    Other,
}

/// A parsed app URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageUrl {
    /// Lowercased host.
    pub host: String,
    pub kind: PageKind,
    /// Gem id taken from a leading `/gem/{id}` prefix, even when the rest
    /// of the path is unrecognized.
    pub gem_scope: Option<String>,
}

/// Pure URL predicates and extractors over the grammar above.
///
/// Holds nothing but the optional host filter, so cloning is free and every
/// method is a pure function of its arguments.
#[derive(Debug, Clone)]
pub struct UrlClassifier {
    host: Option<String>,
}

impl Default for UrlClassifier {
    fn default() -> Self {
        Self::with_host(DEFAULT_APP_HOST)
    }
}

impl UrlClassifier {
    /// Classifier that only accepts URLs on the given host.
    pub fn with_host(host: impl Into<String>) -> Self {
        Self {
            host: Some(host.into().to_ascii_lowercase()),
        }
    }

    /// Classifier that accepts any host (useful for tests and embedders
    /// pointing at a staging deployment).
    pub fn any_host() -> Self {
        Self { host: None }
    }

    /// Parse a raw URL into the app grammar.
    ///
    /// Returns `None` for anything outside it: empty strings, non-http(s)
    /// schemes, unparseable URLs, or a host the filter rejects. Callers
    /// treat `None` as "unrelated page", the safe default.
    pub fn parse(&self, raw: &str) -> Option<PageUrl> {
        if raw.is_empty() {
            return None;
        }
        let url = Url::parse(raw).ok()?;
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }
        let host = url.host_str()?.to_ascii_lowercase();
        if let Some(expected) = &self.host {
            if &host != expected {
                return None;
            }
        }

        let mut segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|p| !p.is_empty()).collect())
            .unwrap_or_default();

        // Account prefix: https://host/u/1/app
        if segments.len() >= 2
            && segments[0] == "u"
            && segments[1].chars().all(|c| c.is_ascii_digit())
        {
            segments.drain(..2);
        }

        let gem_scope = match segments.as_slice() {
            ["gem", id, ..] if is_valid_id(id) => Some((*id).to_string()),
            _ => None,
        };

        let kind = match segments.as_slice() {
            ["app"] => PageKind::AppRoot,
            ["app", "c", id] if is_valid_id(id) => PageKind::Chat {
                chat_id: (*id).to_string(),
            },
            ["gem", id] if is_valid_id(id) => PageKind::GemHomepage {
                gem_id: (*id).to_string(),
            },
            ["gem", id, "homepage"] if is_valid_id(id) => PageKind::GemHomepage {
                gem_id: (*id).to_string(),
            },
            ["gem", id, "chat", chat] if is_valid_id(id) && is_valid_id(chat) => {
                PageKind::GemChat {
                    gem_id: (*id).to_string(),
                    chat_id: (*chat).to_string(),
                }
            }
            _ => PageKind::Other,
        };

        Some(PageUrl {
            host,
            kind,
            gem_scope,
        })
    }

    /// True when the URL is a chat view (plain or inside a Gem).
    pub fn is_chat_url(&self, raw: &str) -> bool {
        matches!(
            self.parse(raw).map(|u| u.kind),
            Some(PageKind::Chat { .. }) | Some(PageKind::GemChat { .. })
        )
    }

    /// True when the URL is a Gem homepage.
    pub fn is_gem_homepage_url(&self, raw: &str) -> bool {
        matches!(
            self.parse(raw).map(|u| u.kind),
            Some(PageKind::GemHomepage { .. })
        )
    }

    /// True when the URL is a chat inside a Gem.
    pub fn is_gem_chat_url(&self, raw: &str) -> bool {
        matches!(
            self.parse(raw).map(|u| u.kind),
            Some(PageKind::GemChat { .. })
        )
    }

    /// True when the URL is somewhere a send click can start a new chat:
    /// the app root or a Gem homepage.
    pub fn is_new_chat_placeholder(&self, raw: &str) -> bool {
        matches!(
            self.parse(raw).map(|u| u.kind),
            Some(PageKind::AppRoot) | Some(PageKind::GemHomepage { .. })
        )
    }

    /// Extract the Gem id from any `/gem/{id}` path.
    ///
    /// Returns `None` when the pattern doesn't match, including every
    /// malformed input.
    pub fn extract_gem_id(&self, raw: &str) -> Option<String> {
        self.parse(raw)?.gem_scope
    }

    /// Extract the chat id from a chat view URL.
    pub fn extract_chat_id(&self, raw: &str) -> Option<String> {
        match self.parse(raw)?.kind {
            PageKind::Chat { chat_id } | PageKind::GemChat { chat_id, .. } => Some(chat_id),
            _ => None,
        }
    }

    /// True when both URLs resolve to the same chat (same chat id in the
    /// same Gem context). Hash/query churn on an open chat lands here.
    pub fn is_same_chat(&self, previous: &str, current: &str) -> bool {
        match (self.chat_key(previous), self.chat_key(current)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// (gem id, chat id) key identifying a chat view.
    fn chat_key(&self, raw: &str) -> Option<(Option<String>, String)> {
        match self.parse(raw)?.kind {
            PageKind::Chat { chat_id } => Some((None, chat_id)),
            PageKind::GemChat { gem_id, chat_id } => Some((Some(gem_id), chat_id)),
            _ => None,
        }
    }
}

/// Ids are non-empty and URL-safe: letters, digits, `-`, `_`.
fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
