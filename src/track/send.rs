//! Send-click recognition
//!
//! Click signals carry selector-style descriptors for the clicked element
//! and its ancestors. A click qualifies as "the user sent a prompt" when
//! any descriptor in the chain, up to a fixed depth, matches one of the
//! send patterns.

use regex::Regex;

/// How far up the ancestor chain to look, counting the target itself.
const MAX_CHAIN_DEPTH: usize = 12;

/// Descriptor patterns recognizing the app's send control.
// Keep patterns simple: the Rust `regex` crate doesn't support look-behind.
pub const DEFAULT_SEND_PATTERNS: &[&str] = &[
    r"(?i)send[-_ ]?button",
    r#"(?i)aria-label=['"]?send"#,
    r#"(?i)data-test-id=['"]?send"#,
];

/// Matches click descriptor chains against the send patterns.
#[derive(Debug)]
pub struct SendClickFilter {
    patterns: Vec<Regex>,
}

impl SendClickFilter {
    /// Compile a filter from pattern sources. An invalid pattern is
    /// logged and skipped rather than rejecting the whole set.
    pub fn new<S: AsRef<str>>(sources: &[S]) -> Self {
        let patterns = sources
            .iter()
            .filter_map(|source| match Regex::new(source.as_ref()) {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::warn!(
                        pattern = source.as_ref(),
                        "Skipping invalid send pattern: {e}"
                    );
                    None
                }
            })
            .collect();
        Self { patterns }
    }

    /// True when the target or any ancestor within the depth limit
    /// matches a send pattern.
    pub fn matches(&self, target: &str, ancestors: &[String]) -> bool {
        std::iter::once(target)
            .chain(ancestors.iter().map(String::as_str))
            .take(MAX_CHAIN_DEPTH)
            .any(|descriptor| self.patterns.iter().any(|re| re.is_match(descriptor)))
    }
}

impl Default for SendClickFilter {
    fn default() -> Self {
        Self::new(DEFAULT_SEND_PATTERNS)
    }
}
