use async_trait::async_trait;

use crate::common::error::{FetchError, StoreResult};
use crate::common::types::{MetricEvent, Page, WatchCategory, WatchedAssociation, WriteOutcome};

// Upstream-side ports
#[async_trait]
pub trait WatchlistSource: Send + Sync {
    async fn fetch_page(
        &self,
        user_id: &str,
        offset: usize,
        category: WatchCategory,
    ) -> Result<Page, FetchError>;
}

// Store-side ports
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Set `last_updated = now_ms` iff the record is absent or `last_updated < threshold_ms`.
    /// Must be a single atomic operation at the store.
    async fn mark_if_stale(
        &self,
        user_id: &str,
        now_ms: i64,
        threshold_ms: i64,
    ) -> StoreResult<WriteOutcome>;
}

#[async_trait]
pub trait WatchedStore: Send + Sync {
    /// Insert iff no association exists for the same (user, item) key.
    async fn insert_if_absent(&self, association: &WatchedAssociation) -> StoreResult<WriteOutcome>;
}

/// Fire-and-forget counter emission. Implementations log their own failures.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn emit(&self, events: Vec<MetricEvent>);
}

pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}
