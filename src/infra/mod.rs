pub mod in_memory_store;
pub mod mal_client;
pub mod metrics_sink;
pub mod rate_limiter;
pub mod sqlite_store;
