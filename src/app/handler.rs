use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, warn, Instrument};

use crate::app::pagination_crawler::{CrawlSummary, PaginationCrawler};
use crate::app::staleness_gate::StalenessGate;
use crate::app::telemetry::Telemetry;
use crate::common::constants::INVALID_WORK_ITEM_COUNT;

/// Queue delivery shaped like the upstream queue's batch event
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<QueueRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueRecord {
    #[serde(rename = "messageId", default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Raw user identifier
    pub body: String,
}

impl QueueEvent {
    pub fn from_user_ids<I, S>(user_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            records: user_ids
                .into_iter()
                .map(|id| QueueRecord {
                    message_id: None,
                    body: id.into(),
                })
                .collect(),
        }
    }
}

/// What happened to one work item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkOutcome {
    Crawled(CrawlSummary),
    Skipped,
    Invalid,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub received: usize,
    pub crawled: usize,
    pub skipped: usize,
    pub invalid: usize,
    pub associations_new: u64,
}

/// Entry point for work items. Holds no per-user state; every call is independent.
pub struct WatchlistHandler {
    gate: StalenessGate,
    crawler: PaginationCrawler,
    telemetry: Telemetry,
    max_concurrent_users: usize,
}

impl WatchlistHandler {
    pub fn new(
        gate: StalenessGate,
        crawler: PaginationCrawler,
        telemetry: Telemetry,
        max_concurrent_users: usize,
    ) -> Self {
        Self {
            gate,
            crawler,
            telemetry,
            max_concurrent_users: max_concurrent_users.max(1),
        }
    }

    /// Gate one user and crawl them if eligible. Never fails; problems are logged and counted.
    pub async fn handle_user(&self, raw_user_id: &str) -> WorkOutcome {
        let user_id = raw_user_id.trim();
        if user_id.is_empty() {
            warn!("dropping work item with blank user id");
            self.telemetry.count(INVALID_WORK_ITEM_COUNT, 1).await;
            return WorkOutcome::Invalid;
        }

        let span = tracing::info_span!(
            "crawl",
            user_id = %user_id,
            invocation_id = %uuid::Uuid::new_v4()
        );

        async {
            if !self.gate.check_and_mark_crawlable(user_id).await {
                return WorkOutcome::Skipped;
            }
            WorkOutcome::Crawled(self.crawler.crawl_and_store(user_id).await)
        }
        .instrument(span)
        .await
    }

    /// Process every record of a delivery. Records run concurrently up to the configured bound;
    /// one record's failure never affects another.
    pub async fn handle_batch(&self, event: QueueEvent) -> BatchSummary {
        let received = event.records.len();
        info!(received, "handling work item batch");

        let outcomes: Vec<WorkOutcome> = stream::iter(event.records)
            .map(|record| async move { self.handle_user(&record.body).await })
            .buffer_unordered(self.max_concurrent_users)
            .collect()
            .await;

        let mut summary = BatchSummary {
            received,
            ..BatchSummary::default()
        };
        for outcome in outcomes {
            match outcome {
                WorkOutcome::Crawled(crawl) => {
                    summary.crawled += 1;
                    summary.associations_new += crawl.writes.new;
                }
                WorkOutcome::Skipped => summary.skipped += 1,
                WorkOutcome::Invalid => summary.invalid += 1,
            }
        }

        info!(
            received = summary.received,
            crawled = summary.crawled,
            skipped = summary.skipped,
            invalid = summary.invalid,
            "batch finished"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_event_parses_records() {
        let raw = r#"{"Records":[{"messageId":"m-1","body":"u1"},{"body":"u2","attributes":{}}]}"#;
        let event: QueueEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.records.len(), 2);
        assert_eq!(event.records[0].message_id.as_deref(), Some("m-1"));
        assert_eq!(event.records[1].body, "u2");
    }

    #[test]
    fn test_queue_event_without_records_is_empty() {
        let event: QueueEvent = serde_json::from_str("{}").unwrap();
        assert!(event.records.is_empty());
    }
}
