//! Conversation history over the key-value store
//!
//! History is a JSON array under one well-known key. Records carry a
//! flattened `extra` map so fields written by other tools survive a
//! load/save cycle here byte-for-byte: import then export gives back the
//! same key/value set per record.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::kv::{KvStore, StoreError};

/// Storage key holding the history array.
pub const HISTORY_KEY: &str = "conversationHistory";

/// Gem identity attached to a record captured inside a Gem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GemInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gem_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// One captured conversation.
///
/// `timestamp` stays a string: we only ever generate it, and foreign
/// records round-trip without reformatting someone else's timezone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    /// RFC 3339 capture time.
    pub timestamp: String,
    /// Model label at capture time, e.g. "2.5 Flash".
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gem: Option<GemInfo>,
    /// Fields we don't model, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// How an import combines with existing history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    /// Keep existing records, add incoming ones that aren't already known.
    Merge,
    /// Drop existing history and take the imported array as-is.
    Replace,
}

/// What an import did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportOutcome {
    pub added: usize,
    pub skipped: usize,
    pub total: usize,
}

/// History operations over a [`KvStore`].
#[derive(Debug, Clone)]
pub struct HistoryStore {
    kv: KvStore,
}

impl HistoryStore {
    pub fn new(kv: KvStore) -> Self {
        Self { kv }
    }

    /// Load the full history array. Missing key means empty history.
    pub fn load(&self) -> Result<Vec<ConversationRecord>, StoreError> {
        Ok(self.kv.get_as(HISTORY_KEY)?.unwrap_or_default())
    }

    /// Append one record and return the new total.
    pub fn append(&self, record: ConversationRecord) -> Result<usize, StoreError> {
        let mut records = self.load()?;
        records.push(record);
        let total = records.len();
        self.kv.set(HISTORY_KEY, serde_json::to_value(&records)?)?;
        Ok(total)
    }

    /// Write the history array as pretty JSON into `dir`, named
    /// `gemini-history-YYYY-MM-DD.json`, and return the file path.
    pub fn export(&self, dir: &Path) -> Result<PathBuf, StoreError> {
        let records = self.load()?;
        fs::create_dir_all(dir)?;
        let name = format!("gemini-history-{}.json", chrono::Local::now().format("%Y-%m-%d"));
        let path = dir.join(name);
        fs::write(&path, serde_json::to_string_pretty(&records)?)?;
        Ok(path)
    }

    /// Import a JSON array of records from `file`.
    pub fn import(&self, file: &Path, mode: ImportMode) -> Result<ImportOutcome, StoreError> {
        let contents = fs::read_to_string(file)?;
        let incoming: Vec<ConversationRecord> = serde_json::from_str(&contents)?;

        match mode {
            ImportMode::Replace => {
                let total = incoming.len();
                self.kv.set(HISTORY_KEY, serde_json::to_value(&incoming)?)?;
                Ok(ImportOutcome {
                    added: total,
                    skipped: 0,
                    total,
                })
            }
            ImportMode::Merge => {
                let mut records = self.load()?;
                let mut added = 0;
                let mut skipped = 0;
                for record in incoming {
                    if records.iter().any(|known| same_conversation(known, &record)) {
                        skipped += 1;
                    } else {
                        records.push(record);
                        added += 1;
                    }
                }
                let total = records.len();
                self.kv.set(HISTORY_KEY, serde_json::to_value(&records)?)?;
                Ok(ImportOutcome {
                    added,
                    skipped,
                    total,
                })
            }
        }
    }
}

/// Two records describe the same conversation when their chat ids match,
/// falling back to record ids for entries without one.
fn same_conversation(a: &ConversationRecord, b: &ConversationRecord) -> bool {
    if let (Some(x), Some(y)) = (&a.chat_id, &b.chat_id) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (&a.id, &b.id) {
        return x == y;
    }
    false
}
