//! Probe feed: wire vocabulary, reader, and tape

pub mod feed;
pub mod signal;
pub mod tape;

pub use feed::FeedReader;
pub use signal::{
    ClickSignal, ControlRequest, ConversationEntry, ConversationListSignal, FeedLine,
    MutationSignal, PageMetaSignal, PageSignal, VisibilitySignal,
};
pub use tape::{replay, SignalTape, TapeRecorder, SIGNAL_TAPE_SCHEMA_VERSION};
