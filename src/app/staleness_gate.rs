use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::app::ports::{Clock, UserStore};
use crate::app::telemetry::Telemetry;
use crate::common::constants::{CRAWLABLE_USER_COUNT, DUPLICATE_USER_COUNT, UNCRAWLABLE_USER_COUNT};
use crate::common::types::WriteOutcome;

/// Decides whether a user may be crawled now, marking them fresh in the same step.
///
/// The check and the mark are one conditional update at the user store, so two
/// invocations for the same user, even in different processes, cannot both pass.
pub struct StalenessGate {
    store: Arc<dyn UserStore>,
    clock: Arc<dyn Clock>,
    telemetry: Telemetry,
    stale_window: Duration,
}

impl StalenessGate {
    pub fn new(
        store: Arc<dyn UserStore>,
        clock: Arc<dyn Clock>,
        telemetry: Telemetry,
        stale_window: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            telemetry,
            stale_window,
        }
    }

    /// `true` iff the user was new or stale and is now marked fresh.
    /// Store errors resolve to `false`: a missed crawl is picked up next cycle.
    pub async fn check_and_mark_crawlable(&self, user_id: &str) -> bool {
        let now = self.clock.now_millis();
        let window_ms = i64::try_from(self.stale_window.as_millis()).unwrap_or(i64::MAX);
        let threshold = now.saturating_sub(window_ms);

        match self.store.mark_if_stale(user_id, now, threshold).await {
            Ok(WriteOutcome::Applied) => {
                info!(user_id, "user is new or stale, marked for crawl");
                self.telemetry.count(CRAWLABLE_USER_COUNT, 1).await;
                true
            }
            Ok(WriteOutcome::ConditionFailed) => {
                debug!(user_id, "user crawled within the stale window, skipping");
                self.telemetry.count(DUPLICATE_USER_COUNT, 1).await;
                false
            }
            Err(e) => {
                error!(user_id, error = %e, "staleness check failed, not crawling");
                self.telemetry.count(UNCRAWLABLE_USER_COUNT, 1).await;
                false
            }
        }
    }
}
