use std::sync::Arc;

use crate::app::dedup_writer::DedupWriter;
use crate::app::handler::WatchlistHandler;
use crate::app::pagination_crawler::PaginationCrawler;
use crate::app::ports::{Clock, MetricsSink, SystemClock, UserStore, WatchedStore, WatchlistSource};
use crate::app::staleness_gate::StalenessGate;
use crate::app::telemetry::Telemetry;
use crate::config::Config;
use crate::infra::in_memory_store::{InMemoryUserStore, InMemoryWatchedStore};
use crate::infra::mal_client::MalClient;
use crate::infra::metrics_sink::RecorderSink;
use crate::infra::rate_limiter::{Limits, RateLimiter};
use crate::infra::sqlite_store::SqliteStore;

/// The collaborators a handler is wired from
pub struct Components {
    pub source: Arc<dyn WatchlistSource>,
    pub users: Arc<dyn UserStore>,
    pub watched: Arc<dyn WatchedStore>,
    pub sink: Arc<dyn MetricsSink>,
    pub clock: Arc<dyn Clock>,
}

impl Components {
    /// Production wiring: upstream HTTP client, SQLite (or in-memory) stores, recorder-backed metrics
    pub fn from_config(config: &Config, in_memory: bool) -> anyhow::Result<Self> {
        let limiter = RateLimiter::new(Limits {
            requests_per_min: Some(config.requests_per_min),
            concurrency: Some(config.max_concurrent_users as u32),
        });
        let source = Arc::new(MalClient::new(
            &config.upstream_base_url,
            config.request_timeout(),
            limiter,
        )?);

        let (users, watched) = if in_memory {
            let users: Arc<dyn UserStore> = Arc::new(InMemoryUserStore::new());
            let watched: Arc<dyn WatchedStore> = Arc::new(InMemoryWatchedStore::new());
            (users, watched)
        } else {
            let store = Arc::new(SqliteStore::open(
                &config.db_path,
                &config.user_table,
                &config.watched_table,
            )?);
            let users: Arc<dyn UserStore> = store.clone();
            let watched: Arc<dyn WatchedStore> = store;
            (users, watched)
        };

        Ok(Self {
            source,
            users,
            watched,
            sink: Arc::new(RecorderSink::new(config.namespace.clone())),
            clock: Arc::new(SystemClock),
        })
    }
}

/// Assemble gate, writer and crawler into a handler
pub fn build_handler(config: &Config, components: Components) -> WatchlistHandler {
    let telemetry = Telemetry::new(components.sink, config.region.clone());
    let gate = StalenessGate::new(
        components.users,
        components.clock,
        telemetry.clone(),
        config.stale_window(),
    );
    let writer = DedupWriter::new(components.watched, telemetry.clone());
    let crawler = PaginationCrawler::new(components.source, writer, telemetry.clone(), config.page_size);
    WatchlistHandler::new(gate, crawler, telemetry, config.max_concurrent_users)
}
