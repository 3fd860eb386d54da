//! Classification of URL transitions
//!
//! Every observed URL change is sorted into exactly one [`Transition`]
//! variant. The classifier is total: malformed or foreign input never
//! panics, it lands in [`Transition::Unrelated`].

use super::url::{PageKind, UrlClassifier};

/// How one URL relates to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Navigation inside a single Gem: from the Gem's homepage or one of
    /// its chats into a chat of the same Gem.
    WithinGem,
    /// The new-chat placeholder resolved into a concrete chat URL on the
    /// same host.
    NewChat,
    /// Everything else: cross-host, cross-Gem, unrecognized or malformed.
    Unrelated,
}

impl Transition {
    /// Stable lowercase name, used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Transition::WithinGem => "within-gem",
            Transition::NewChat => "new-chat",
            Transition::Unrelated => "unrelated",
        }
    }
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl UrlClassifier {
    /// Classify the move from `previous` to `current`.
    ///
    /// Total over all string pairs. Same-chat churn is not a transition;
    /// callers filter it with [`UrlClassifier::is_same_chat`] first.
    pub fn classify_transition(&self, previous: &str, current: &str) -> Transition {
        let (Some(prev), Some(cur)) = (self.parse(previous), self.parse(current)) else {
            return Transition::Unrelated;
        };
        if prev.host != cur.host {
            return Transition::Unrelated;
        }

        match (&prev.kind, &cur.kind) {
            (
                PageKind::GemHomepage { gem_id: from }
                | PageKind::GemChat {
                    gem_id: from,
                    ..
                },
                PageKind::GemChat { gem_id: to, .. },
            ) if from == to => Transition::WithinGem,
            (PageKind::AppRoot, PageKind::Chat { .. }) => Transition::NewChat,
            _ => Transition::Unrelated,
        }
    }
}
