pub mod config;
pub mod control;
pub mod nav;
pub mod page;
pub mod store;
pub mod track;
pub mod util;

pub use config::Config;
pub use control::{Outbound, OutboundEvent};
pub use nav::{Transition, UrlClassifier};
pub use page::{FeedLine, FeedReader, PageSignal};
pub use store::{ConversationRecord, HistoryStore, KvStore};
pub use track::{CrashDetector, EngineHandle, TrackerEngine, TrackingStatus};
