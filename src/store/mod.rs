//! Persistence: flat key-value blob and conversation history

pub mod history;
pub mod kv;

pub use history::{
    ConversationRecord, GemInfo, HistoryStore, ImportMode, ImportOutcome, HISTORY_KEY,
};
pub use kv::{ChangeNotice, KvStore, StoreError};
