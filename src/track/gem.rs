//! Gem identity tracking
//!
//! Gem pages only reveal their display name through page metadata, which
//! arrives separately from navigation. The detector pairs the two: the id
//! comes from the URL, the name from whatever metadata showed up while
//! that id was current. Moving to a different gem discards the old name.

use crate::nav::UrlClassifier;
use crate::store::GemInfo;

#[derive(Debug)]
pub struct GemDetector {
    classifier: UrlClassifier,
    gem_id: Option<String>,
    name: Option<String>,
}

impl GemDetector {
    pub fn new(classifier: UrlClassifier) -> Self {
        Self {
            classifier,
            gem_id: None,
            name: None,
        }
    }

    /// Re-derive the gem id from a page URL. A change of gem invalidates
    /// any previously learned name.
    pub fn reset(&mut self, url: &str) {
        let next = self.classifier.extract_gem_id(url);
        if next != self.gem_id {
            tracing::debug!(gem_id = ?next, "Gem context changed");
            self.gem_id = next;
            self.name = None;
        }
    }

    /// Record the gem name from page metadata. Ignored outside gem pages,
    /// where a name would have nothing to attach to.
    pub fn set_name(&mut self, name: impl Into<String>) {
        if self.gem_id.is_some() {
            self.name = Some(name.into());
        }
    }

    pub fn gem_id(&self) -> Option<&str> {
        self.gem_id.as_deref()
    }

    /// The identity to stamp on a saved conversation, if the page is a
    /// gem page.
    pub fn current(&self) -> Option<GemInfo> {
        self.gem_id.as_ref().map(|id| GemInfo {
            gem_id: Some(id.clone()),
            name: self.name.clone(),
        })
    }

    pub fn clear(&mut self) {
        self.gem_id = None;
        self.name = None;
    }
}
