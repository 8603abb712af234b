//! Incremental watchlist crawler.
//!
//! A work item is one user id. The [`app::staleness_gate`] decides with a single
//! conditional update whether the user may be crawled, the
//! [`app::pagination_crawler`] walks their list page by page, and the
//! [`app::dedup_writer`] stores each completed show exactly once.

pub mod app;
pub mod common;
pub mod config;
pub mod idempotency;
pub mod infra;
pub mod observability;
pub mod pipeline;
