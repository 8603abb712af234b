/// Counter names emitted to the metrics sink.
/// These names are the contract with dashboards and alarms; do not rename casually.
// Staleness gate
pub const CRAWLABLE_USER_COUNT: &str = "CrawlableUserCount";
pub const DUPLICATE_USER_COUNT: &str = "DuplicateUserCount";
pub const UNCRAWLABLE_USER_COUNT: &str = "UncrawlableUserCount";

// Pagination crawler
pub const WATCH_LIST_FAILURE_COUNT: &str = "WatchListFailureCount";
pub const WATCH_LIST_PAGE_COUNT: &str = "WatchListPageCount";

// Dedup writer
pub const PUT_WATCHED_ANIME_COUNT: &str = "PutWatchedAnimeCount";
pub const PUT_WATCHED_ANIME_DUPLICATE_COUNT: &str = "PutWatchedAnimeDuplicateCount";
pub const PUT_WATCHED_ANIME_FAILURE_COUNT: &str = "PutWatchedAnimeFailureCount";

// Entry point
pub const INVALID_WORK_ITEM_COUNT: &str = "InvalidWorkItemCount";

/// Every counter this crate emits, used to describe them at recorder install time
pub const ALL_COUNTERS: [(&str, &str); 9] = [
    (CRAWLABLE_USER_COUNT, "Users that passed the staleness gate and were marked fresh"),
    (DUPLICATE_USER_COUNT, "Users rejected by the gate because they were already fresh"),
    (UNCRAWLABLE_USER_COUNT, "Users rejected by the gate because the user store failed"),
    (WATCH_LIST_FAILURE_COUNT, "Watchlist fetches that failed and aborted a user's pagination"),
    (WATCH_LIST_PAGE_COUNT, "Watchlist pages fetched from the upstream source"),
    (PUT_WATCHED_ANIME_COUNT, "New watched associations persisted"),
    (PUT_WATCHED_ANIME_DUPLICATE_COUNT, "Watched associations that already existed"),
    (PUT_WATCHED_ANIME_FAILURE_COUNT, "Watched association writes that failed"),
    (INVALID_WORK_ITEM_COUNT, "Work items rejected before gating (blank user id)"),
];

pub const DIMENSION_REGION: &str = "Region";
pub const UNIT_COUNT: &str = "Count";

// Defaults
pub const DEFAULT_NAMESPACE: &str = "AniML";
pub const DEFAULT_REGION: &str = "local";
pub const DEFAULT_PAGE_SIZE: usize = 100;
pub const DEFAULT_STALE_WINDOW_DAYS: u32 = 90;
pub const DEFAULT_DB_PATH: &str = "data/animl.db";
pub const DEFAULT_USER_TABLE: &str = "malUser";
pub const DEFAULT_WATCHED_TABLE: &str = "malWatched";
pub const DEFAULT_UPSTREAM_BASE_URL: &str = "https://myanimelist.net";
pub const DEFAULT_REQUESTS_PER_MIN: u64 = 30;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MAX_CONCURRENT_USERS: usize = 4;

pub const MILLIS_PER_DAY: i64 = 1000 * 60 * 60 * 24;
