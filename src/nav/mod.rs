//! URL parsing and transition classification

pub mod transition;
pub mod url;

pub use transition::Transition;
pub use url::{PageKind, PageUrl, UrlClassifier, DEFAULT_APP_HOST};
