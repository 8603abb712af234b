use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::app::dedup_writer::{DedupWriter, WriteTally};
use crate::app::ports::WatchlistSource;
use crate::app::telemetry::Telemetry;
use crate::common::constants::{WATCH_LIST_FAILURE_COUNT, WATCH_LIST_PAGE_COUNT};
use crate::common::error::FetchError;
use crate::common::types::WatchCategory;

/// How a user's pagination ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlEnd {
    /// A page shorter than (or not a multiple of) the page size
    ShortPage,
    /// An empty page, or an unreadable page after a full one
    Exhausted,
    /// A fetch failed; remaining pages were abandoned
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlSummary {
    pub pages: u64,
    pub entries: u64,
    pub next_offset: usize,
    pub writes: WriteTally,
    pub end: CrawlEnd,
}

/// Walks a user's watch history page by page, handing each page to the writer
pub struct PaginationCrawler {
    source: Arc<dyn WatchlistSource>,
    writer: DedupWriter,
    telemetry: Telemetry,
    page_size: usize,
    category: WatchCategory,
}

impl PaginationCrawler {
    pub fn new(
        source: Arc<dyn WatchlistSource>,
        writer: DedupWriter,
        telemetry: Telemetry,
        page_size: usize,
    ) -> Self {
        Self {
            source,
            writer,
            telemetry,
            page_size: page_size.max(1),
            category: WatchCategory::Anime,
        }
    }

    /// A page ends the crawl unless its length is an exact positive multiple of the page size.
    /// The upstream's real ceiling is undocumented, so equality with one constant is not enough.
    pub fn is_final_page(&self, page_len: usize) -> bool {
        page_len == 0 || page_len % self.page_size != 0
    }

    /// Fetches from offset 0 until a final page, writing each page before fetching the next.
    /// Never retries; a failed fetch ends this user's crawl and the pages already written stay.
    pub async fn crawl_and_store(&self, user_id: &str) -> CrawlSummary {
        let mut offset = 0usize;
        let mut pages = 0u64;
        let mut entries = 0u64;
        let mut writes = WriteTally::default();

        let end = loop {
            let page = match self.source.fetch_page(user_id, offset, self.category).await {
                Ok(page) => page,
                Err(FetchError::Malformed(reason)) if offset > 0 => {
                    // A full last page is followed by whatever the upstream sends past the end.
                    debug!(user_id, offset, %reason, "unreadable page after a full page, treating as end of list");
                    break CrawlEnd::Exhausted;
                }
                Err(e) => {
                    warn!(user_id, offset, kind = e.kind(), error = %e, "watchlist fetch failed, abandoning user");
                    self.telemetry.count(WATCH_LIST_FAILURE_COUNT, 1).await;
                    break CrawlEnd::Aborted;
                }
            };

            pages += 1;
            self.telemetry.count(WATCH_LIST_PAGE_COUNT, 1).await;

            let page_len = page.len();
            if page_len == 0 {
                break CrawlEnd::Exhausted;
            }

            entries += page_len as u64;
            writes.absorb(self.writer.persist_completed(user_id, &page).await);

            if self.is_final_page(page_len) {
                break CrawlEnd::ShortPage;
            }
            offset += page_len;
        };

        info!(
            user_id,
            pages,
            entries,
            new = writes.new,
            duplicate = writes.duplicate,
            failed = writes.failed,
            ?end,
            "crawl finished"
        );

        CrawlSummary {
            pages,
            entries,
            next_offset: offset,
            writes,
            end,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{Page, WatchEntry, WatchStatus};
    use crate::infra::in_memory_store::InMemoryWatchedStore;
    use crate::infra::metrics_sink::MemorySink;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Serves scripted responses in order and records requested offsets
    struct ScriptedSource {
        responses: Mutex<VecDeque<Result<Page, FetchError>>>,
        offsets: Mutex<Vec<usize>>,
    }

    impl ScriptedSource {
        fn new(responses: Vec<Result<Page, FetchError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                offsets: Mutex::new(Vec::new()),
            })
        }

        fn pages_of(lens: &[usize]) -> Arc<Self> {
            let mut next_id = 0;
            let responses: Vec<Result<Page, FetchError>> = lens
                .iter()
                .map(|&len| {
                    let page: Page = (0..len)
                        .map(|_| {
                            next_id += 1;
                            WatchEntry::completed(format!("a{next_id}"), None)
                        })
                        .collect();
                    Ok(page)
                })
                .collect();
            Self::new(responses)
        }

        fn offsets(&self) -> Vec<usize> {
            self.offsets.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl WatchlistSource for ScriptedSource {
        async fn fetch_page(&self, _: &str, offset: usize, category: WatchCategory) -> Result<Page, FetchError> {
            assert_eq!(category, WatchCategory::Anime);
            self.offsets.lock().unwrap().push(offset);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn crawler(source: Arc<dyn WatchlistSource>, sink: Arc<MemorySink>, page_size: usize) -> PaginationCrawler {
        let telemetry = Telemetry::new(sink, "test-region");
        let writer = DedupWriter::new(Arc::new(InMemoryWatchedStore::new()), telemetry.clone());
        PaginationCrawler::new(source, writer, telemetry, page_size)
    }

    #[tokio::test]
    async fn test_stops_on_short_page() {
        let source = ScriptedSource::pages_of(&[100, 100, 47]);
        let sink = Arc::new(MemorySink::new());
        let summary = crawler(source.clone(), sink.clone(), 100).crawl_and_store("u1").await;

        assert_eq!(source.offsets(), vec![0, 100, 200]);
        assert_eq!(summary.end, CrawlEnd::ShortPage);
        assert_eq!(summary.entries, 247);
        assert_eq!(summary.writes.new, 247);
        assert_eq!(sink.total(WATCH_LIST_FAILURE_COUNT), 0);
    }

    #[tokio::test]
    async fn test_stops_on_empty_page_after_full_pages() {
        let source = ScriptedSource::pages_of(&[100, 100, 100, 0]);
        let summary = crawler(source.clone(), Arc::new(MemorySink::new()), 100)
            .crawl_and_store("u1")
            .await;

        assert_eq!(source.offsets(), vec![0, 100, 200, 300]);
        assert_eq!(summary.end, CrawlEnd::Exhausted);
        assert_eq!(summary.pages, 4);
    }

    #[tokio::test]
    async fn test_larger_upstream_pages_keep_paginating() {
        // Upstream serving 300 per page while configured for 100
        let source = ScriptedSource::pages_of(&[300, 300, 12]);
        let summary = crawler(source.clone(), Arc::new(MemorySink::new()), 100)
            .crawl_and_store("u1")
            .await;

        assert_eq!(source.offsets(), vec![0, 300, 600]);
        assert_eq!(summary.entries, 612);
    }

    #[tokio::test]
    async fn test_non_multiple_page_is_final() {
        let source = ScriptedSource::pages_of(&[150, 100]);
        crawler(source.clone(), Arc::new(MemorySink::new()), 100)
            .crawl_and_store("u1")
            .await;

        assert_eq!(source.offsets(), vec![0]);
    }

    #[tokio::test]
    async fn test_empty_first_page_stops_without_failure() {
        let source = ScriptedSource::pages_of(&[0]);
        let sink = Arc::new(MemorySink::new());
        let summary = crawler(source.clone(), sink.clone(), 100).crawl_and_store("u1").await;

        assert_eq!(source.offsets(), vec![0]);
        assert_eq!(summary.end, CrawlEnd::Exhausted);
        assert_eq!(summary.next_offset, 0);
        assert_eq!(sink.total(WATCH_LIST_FAILURE_COUNT), 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_aborts_user_without_retry() {
        let full: Page = (0..100).map(|i| WatchEntry::completed(format!("a{i}"), None)).collect();
        let source = ScriptedSource::new(vec![Ok(full), Err(FetchError::RateLimited)]);
        let sink = Arc::new(MemorySink::new());
        let summary = crawler(source.clone(), sink.clone(), 100).crawl_and_store("u1").await;

        assert_eq!(source.offsets(), vec![0, 100]);
        assert_eq!(summary.end, CrawlEnd::Aborted);
        assert_eq!(summary.writes.new, 100);
        assert_eq!(sink.total(WATCH_LIST_FAILURE_COUNT), 1);
    }

    #[tokio::test]
    async fn test_malformed_page_after_full_page_is_end_of_list() {
        let full: Page = (0..100).map(|i| WatchEntry::completed(format!("a{i}"), None)).collect();
        let source = ScriptedSource::new(vec![Ok(full), Err(FetchError::Malformed("not a list".into()))]);
        let sink = Arc::new(MemorySink::new());
        let summary = crawler(source, sink.clone(), 100).crawl_and_store("u1").await;

        assert_eq!(summary.end, CrawlEnd::Exhausted);
        assert_eq!(sink.total(WATCH_LIST_FAILURE_COUNT), 0);
    }

    #[tokio::test]
    async fn test_malformed_first_page_is_failure() {
        let source = ScriptedSource::new(vec![Err(FetchError::Malformed("html".into()))]);
        let sink = Arc::new(MemorySink::new());
        let summary = crawler(source, sink.clone(), 100).crawl_and_store("u1").await;

        assert_eq!(summary.end, CrawlEnd::Aborted);
        assert_eq!(sink.total(WATCH_LIST_FAILURE_COUNT), 1);
    }

    #[tokio::test]
    async fn test_offset_advances_by_page_length_not_completed_count() {
        let page: Page = (0..100)
            .map(|i| {
                let status = if i % 2 == 0 { WatchStatus::Completed } else { WatchStatus::PlanToWatch };
                WatchEntry::new(format!("a{i}"), status, None)
            })
            .collect();
        let source = ScriptedSource::new(vec![Ok(page), Ok(Vec::new())]);
        let summary = crawler(source.clone(), Arc::new(MemorySink::new()), 100)
            .crawl_and_store("u1")
            .await;

        assert_eq!(source.offsets(), vec![0, 100]);
        assert_eq!(summary.writes.new, 50);
    }
}
