use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One tracked user. `last_updated` is epoch millis of the last crawl start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: String,
    pub last_updated: Option<i64>,
}

/// One user having completed one show. Identity is `(user_id, item_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedAssociation {
    pub user_id: String,
    pub item_id: String,
    pub score: Option<u8>,
}

impl WatchedAssociation {
    pub fn from_entry(user_id: &str, entry: &WatchEntry) -> Self {
        Self {
            user_id: user_id.to_string(),
            item_id: entry.item_id.clone(),
            score: entry.score,
        }
    }

    /// Compound key used as the dedup boundary
    pub fn key(&self) -> String {
        crate::idempotency::association_key(&self.user_id, &self.item_id)
    }
}

/// Status codes as reported by the upstream list endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WatchStatus {
    Watching,
    Completed,
    OnHold,
    Dropped,
    PlanToWatch,
    Other(i64),
}

impl WatchStatus {
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => WatchStatus::Watching,
            2 => WatchStatus::Completed,
            3 => WatchStatus::OnHold,
            4 => WatchStatus::Dropped,
            6 => WatchStatus::PlanToWatch,
            other => WatchStatus::Other(other),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, WatchStatus::Completed)
    }
}

/// One row of a user's watch history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchEntry {
    pub item_id: String,
    pub status: WatchStatus,
    pub score: Option<u8>,
}

impl WatchEntry {
    pub fn new(item_id: impl Into<String>, status: WatchStatus, score: Option<u8>) -> Self {
        Self {
            item_id: item_id.into(),
            status,
            score,
        }
    }

    pub fn completed(item_id: impl Into<String>, score: Option<u8>) -> Self {
        Self::new(item_id, WatchStatus::Completed, score)
    }
}

/// Ordered entries returned by a single upstream fetch
pub type Page = Vec<WatchEntry>;

/// Which list the upstream endpoint is asked for. This pipeline only crawls anime lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WatchCategory {
    #[default]
    Anime,
}

impl WatchCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatchCategory::Anime => "anime",
        }
    }

    /// JSON field carrying the item id in list entries
    pub fn id_field(&self) -> &'static str {
        match self {
            WatchCategory::Anime => "anime_id",
        }
    }
}

/// Result of a conditional write that reached the store.
///
/// Store errors travel separately as `Err(StoreError)`, giving callers the
/// three outcomes applied / condition failed / failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    ConditionFailed,
}

/// A named counter with its dimensions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricEvent {
    pub name: &'static str,
    pub value: u64,
    pub unit: &'static str,
    pub dimensions: BTreeMap<&'static str, String>,
}

impl MetricEvent {
    pub fn count(name: &'static str, value: u64) -> Self {
        Self {
            name,
            value,
            unit: crate::common::constants::UNIT_COUNT,
            dimensions: BTreeMap::new(),
        }
    }

    pub fn with_dimension(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.dimensions.insert(key, value.into());
        self
    }
}
