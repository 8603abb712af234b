use std::sync::Arc;

use tracing::{debug, error, info};

use crate::app::ports::WatchedStore;
use crate::app::telemetry::Telemetry;
use crate::common::constants::{
    PUT_WATCHED_ANIME_COUNT, PUT_WATCHED_ANIME_DUPLICATE_COUNT, PUT_WATCHED_ANIME_FAILURE_COUNT,
};
use crate::common::types::{WatchEntry, WatchedAssociation, WriteOutcome};

/// Outcome counts for one or more pages
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriteTally {
    pub new: u64,
    pub duplicate: u64,
    pub failed: u64,
}

impl WriteTally {
    pub fn attempted(&self) -> u64 {
        self.new + self.duplicate + self.failed
    }

    pub fn absorb(&mut self, other: WriteTally) {
        self.new += other.new;
        self.duplicate += other.duplicate;
        self.failed += other.failed;
    }
}

/// Persists completed entries as conditional inserts keyed by (user, item)
pub struct DedupWriter {
    store: Arc<dyn WatchedStore>,
    telemetry: Telemetry,
}

impl DedupWriter {
    pub fn new(store: Arc<dyn WatchedStore>, telemetry: Telemetry) -> Self {
        Self { store, telemetry }
    }

    /// Writes every completed entry in `page`; other statuses are skipped silently.
    /// A failed entry never stops the rest of the page. Counters go out in one call per page.
    pub async fn persist_completed(&self, user_id: &str, page: &[WatchEntry]) -> WriteTally {
        let mut tally = WriteTally::default();

        for entry in page.iter().filter(|e| e.status.is_completed()) {
            if entry.item_id.trim().is_empty() {
                error!(user_id, ?entry, "completed entry without item id");
                tally.failed += 1;
                continue;
            }

            let association = WatchedAssociation::from_entry(user_id, entry);
            match self.store.insert_if_absent(&association).await {
                Ok(WriteOutcome::Applied) => {
                    info!(user_id, item_id = %entry.item_id, score = ?entry.score, "stored watched association");
                    tally.new += 1;
                }
                Ok(WriteOutcome::ConditionFailed) => {
                    debug!(user_id, item_id = %entry.item_id, "watched association already stored");
                    tally.duplicate += 1;
                }
                Err(e) => {
                    error!(user_id, item_id = %entry.item_id, error = %e, "failed to store watched association");
                    tally.failed += 1;
                }
            }
        }

        self.telemetry
            .counts(&[
                (PUT_WATCHED_ANIME_COUNT, tally.new),
                (PUT_WATCHED_ANIME_DUPLICATE_COUNT, tally.duplicate),
                (PUT_WATCHED_ANIME_FAILURE_COUNT, tally.failed),
            ])
            .await;

        tally
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::{StoreError, StoreResult};
    use crate::common::types::WatchStatus;
    use crate::infra::in_memory_store::InMemoryWatchedStore;
    use crate::infra::metrics_sink::MemorySink;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records every attempt; fails the listed item ids with a store error
    struct ScriptedStore {
        attempts: Mutex<Vec<String>>,
        fail_items: Vec<&'static str>,
    }

    impl ScriptedStore {
        fn failing(fail_items: Vec<&'static str>) -> Self {
            Self {
                attempts: Mutex::new(Vec::new()),
                fail_items,
            }
        }

        fn attempts(&self) -> Vec<String> {
            self.attempts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl WatchedStore for ScriptedStore {
        async fn insert_if_absent(&self, association: &WatchedAssociation) -> StoreResult<WriteOutcome> {
            self.attempts.lock().unwrap().push(association.item_id.clone());
            if self.fail_items.contains(&association.item_id.as_str()) {
                return Err(StoreError::Poisoned);
            }
            Ok(WriteOutcome::Applied)
        }
    }

    fn writer(store: Arc<dyn WatchedStore>, sink: Arc<MemorySink>) -> DedupWriter {
        DedupWriter::new(store, Telemetry::new(sink, "test-region"))
    }

    #[tokio::test]
    async fn test_second_write_is_duplicate() {
        let store = Arc::new(InMemoryWatchedStore::new());
        let sink = Arc::new(MemorySink::new());
        let writer = writer(store.clone(), sink.clone());
        let page = vec![WatchEntry::completed("a1", Some(8))];

        let first = writer.persist_completed("u1", &page).await;
        let second = writer.persist_completed("u1", &page).await;

        assert_eq!(first, WriteTally { new: 1, duplicate: 0, failed: 0 });
        assert_eq!(second, WriteTally { new: 0, duplicate: 1, failed: 0 });
        assert_eq!(store.len(), 1);
        assert_eq!(sink.total(PUT_WATCHED_ANIME_COUNT), 1);
        assert_eq!(sink.total(PUT_WATCHED_ANIME_DUPLICATE_COUNT), 1);
    }

    #[tokio::test]
    async fn test_duplicate_does_not_overwrite_score() {
        let store = Arc::new(InMemoryWatchedStore::new());
        let writer = writer(store.clone(), Arc::new(MemorySink::new()));

        writer.persist_completed("u1", &[WatchEntry::completed("a1", Some(8))]).await;
        writer.persist_completed("u1", &[WatchEntry::completed("a1", Some(3))]).await;

        assert_eq!(store.get("u1", "a1").and_then(|a| a.score), Some(8));
    }

    #[tokio::test]
    async fn test_only_completed_entries_are_written() {
        let store = Arc::new(ScriptedStore::failing(vec![]));
        let writer = writer(store.clone(), Arc::new(MemorySink::new()));
        let page = vec![
            WatchEntry::completed("a1", None),
            WatchEntry::new("a2", WatchStatus::Watching, None),
            WatchEntry::new("a3", WatchStatus::Dropped, Some(2)),
            WatchEntry::completed("a4", Some(7)),
        ];

        let tally = writer.persist_completed("u1", &page).await;

        assert_eq!(store.attempts(), vec!["a1", "a4"]);
        assert_eq!(tally.attempted(), 2);
        assert_eq!(tally.failed, 0);
    }

    #[tokio::test]
    async fn test_failure_does_not_short_circuit_page() {
        let store = Arc::new(ScriptedStore::failing(vec!["a2"]));
        let sink = Arc::new(MemorySink::new());
        let writer = writer(store.clone(), sink.clone());
        let page = vec![
            WatchEntry::completed("a1", None),
            WatchEntry::completed("a2", None),
            WatchEntry::completed("a3", None),
        ];

        let tally = writer.persist_completed("u1", &page).await;

        assert_eq!(store.attempts(), vec!["a1", "a2", "a3"]);
        assert_eq!(tally, WriteTally { new: 2, duplicate: 0, failed: 1 });
        assert_eq!(sink.total(PUT_WATCHED_ANIME_FAILURE_COUNT), 1);
    }

    #[tokio::test]
    async fn test_counters_emitted_once_per_page() {
        let store = Arc::new(InMemoryWatchedStore::new());
        let sink = Arc::new(MemorySink::new());
        let writer = writer(store, sink.clone());
        let page: Vec<_> = (0..5).map(|i| WatchEntry::completed(format!("a{i}"), None)).collect();

        let tally = writer.persist_completed("u1", &page).await;

        assert_eq!(sink.emit_calls(), 1);
        assert_eq!(tally.attempted(), 5);
        let conserved = sink.total(PUT_WATCHED_ANIME_COUNT)
            + sink.total(PUT_WATCHED_ANIME_DUPLICATE_COUNT)
            + sink.total(PUT_WATCHED_ANIME_FAILURE_COUNT);
        assert_eq!(conserved, 5);
    }

    #[tokio::test]
    async fn test_blank_item_id_counts_as_failure() {
        let store = Arc::new(ScriptedStore::failing(vec![]));
        let writer = writer(store.clone(), Arc::new(MemorySink::new()));

        let tally = writer
            .persist_completed("u1", &[WatchEntry::completed("", None), WatchEntry::completed("a1", None)])
            .await;

        assert_eq!(store.attempts(), vec!["a1"]);
        assert_eq!(tally, WriteTally { new: 1, duplicate: 0, failed: 1 });
    }
}
