use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::app::ports::{UserStore, WatchedStore};
use crate::common::error::{StoreError, StoreResult};
use crate::common::types::{UserRecord, WatchedAssociation, WriteOutcome};

/// In-memory user records for development/testing.
/// The mutex makes each conditional update atomic within the process.
#[derive(Default)]
pub struct InMemoryUserStore {
    users: Arc<Mutex<HashMap<String, UserRecord>>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, user_id: &str) -> Option<UserRecord> {
        self.users.lock().ok()?.get(user_id).cloned()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn mark_if_stale(&self, user_id: &str, now_ms: i64, threshold_ms: i64) -> StoreResult<WriteOutcome> {
        if user_id.is_empty() {
            return Err(StoreError::InvalidKey("empty user id".into()));
        }
        let mut users = self.users.lock().map_err(|_| StoreError::Poisoned)?;
        let record = users.entry(user_id.to_string()).or_insert_with(|| UserRecord {
            user_id: user_id.to_string(),
            last_updated: None,
        });

        match record.last_updated {
            Some(last) if last >= threshold_ms => Ok(WriteOutcome::ConditionFailed),
            _ => {
                record.last_updated = Some(now_ms);
                debug!("Marked user {} at {}", user_id, now_ms);
                Ok(WriteOutcome::Applied)
            }
        }
    }
}

/// In-memory watched associations keyed by the compound association key
#[derive(Default)]
pub struct InMemoryWatchedStore {
    associations: Arc<Mutex<HashMap<String, WatchedAssociation>>>,
}

impl InMemoryWatchedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.associations.lock().map(|a| a.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, user_id: &str, item_id: &str) -> Option<WatchedAssociation> {
        let key = crate::idempotency::association_key(user_id, item_id);
        self.associations.lock().ok()?.get(&key).cloned()
    }
}

#[async_trait]
impl WatchedStore for InMemoryWatchedStore {
    async fn insert_if_absent(&self, association: &WatchedAssociation) -> StoreResult<WriteOutcome> {
        let mut associations = self.associations.lock().map_err(|_| StoreError::Poisoned)?;
        let key = association.key();
        if associations.contains_key(&key) {
            return Ok(WriteOutcome::ConditionFailed);
        }
        associations.insert(key, association.clone());
        debug!("Stored association {} -> {}", association.user_id, association.item_id);
        Ok(WriteOutcome::Applied)
    }
}
