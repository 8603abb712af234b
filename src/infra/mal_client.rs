use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::app::ports::WatchlistSource;
use crate::common::error::{ConfigError, FetchError};
use crate::common::types::{Page, WatchCategory, WatchEntry, WatchStatus};
use crate::infra::rate_limiter::RateLimiter;

/// Status filter meaning "all lists" on the upstream endpoint
const ALL_STATUSES: &str = "7";
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// Reads a user's list through the upstream `load.json` endpoint
pub struct MalClient {
    client: reqwest::Client,
    base_url: Url,
    limiter: RateLimiter,
}

impl MalClient {
    pub fn new(base_url: &str, timeout: Duration, limiter: RateLimiter) -> Result<Self, ConfigError> {
        let base_url = Url::parse(base_url).map_err(|e| ConfigError::Invalid {
            key: "upstream_base_url",
            message: e.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ConfigError::Invalid {
                key: "upstream_base_url",
                message: format!("'{base_url}' cannot be a base URL"),
            });
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ConfigError::Invalid {
                key: "request_timeout_secs",
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            base_url,
            limiter,
        })
    }

    pub fn list_url(&self, user_id: &str, offset: usize, category: WatchCategory) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .push(&format!("{}list", category.as_str()))
                .push(user_id)
                .push("load.json");
        }
        url.query_pairs_mut()
            .append_pair("offset", &offset.to_string())
            .append_pair("status", ALL_STATUSES);
        url
    }
}

#[async_trait]
impl WatchlistSource for MalClient {
    #[instrument(skip(self, category), fields(category = category.as_str()))]
    async fn fetch_page(&self, user_id: &str, offset: usize, category: WatchCategory) -> Result<Page, FetchError> {
        let url = self.list_url(user_id, offset, category);
        let _permit = self.limiter.acquire().await;

        let t0 = std::time::Instant::now();
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited);
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }
        let bytes = resp.bytes().await?;
        let page = parse_page(&bytes, category)?;
        debug!(
            entries = page.len(),
            bytes = bytes.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "fetched watchlist page"
        );
        Ok(page)
    }
}

/// Decode one `load.json` body. The body must be a JSON array; rows that cannot be read
/// are kept as entries with an empty id so the page length still matches what was sent.
pub fn parse_page(body: &[u8], category: WatchCategory) -> Result<Page, FetchError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| FetchError::Malformed(format!("invalid JSON: {e}")))?;
    let rows = value
        .as_array()
        .ok_or_else(|| FetchError::Malformed("expected a JSON array of list entries".into()))?;

    Ok(rows.iter().map(|row| parse_entry(row, category)).collect())
}

fn parse_entry(row: &Value, category: WatchCategory) -> WatchEntry {
    let item_id = match &row[category.id_field()] {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => String::new(),
    };
    let status = as_i64(&row["status"])
        .map(WatchStatus::from_code)
        .unwrap_or(WatchStatus::Other(-1));
    // 0 means "not rated"
    let score = as_i64(&row["score"])
        .filter(|s| *s > 0)
        .and_then(|s| u8::try_from(s).ok());

    WatchEntry {
        item_id,
        status,
        score,
    }
}

fn as_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> MalClient {
        MalClient::new("https://myanimelist.net", Duration::from_secs(5), RateLimiter::unlimited()).unwrap()
    }

    #[test]
    fn test_list_url() {
        let url = client().list_url("some_user", 300, WatchCategory::Anime);
        assert_eq!(
            url.as_str(),
            "https://myanimelist.net/animelist/some_user/load.json?offset=300&status=7"
        );
    }

    #[test]
    fn test_list_url_escapes_user_id() {
        let url = client().list_url("a b/c", 0, WatchCategory::Anime);
        assert_eq!(
            url.as_str(),
            "https://myanimelist.net/animelist/a%20b%2Fc/load.json?offset=0&status=7"
        );
    }

    #[test]
    fn test_rejects_bad_base_url() {
        assert!(MalClient::new("not a url", Duration::from_secs(5), RateLimiter::unlimited()).is_err());
    }

    #[test]
    fn test_parse_page() {
        let body = br#"[
            {"anime_id": 1, "status": 2, "score": 8},
            {"anime_id": "20", "status": "1", "score": 0},
            {"anime_id": 5114, "status": 6}
        ]"#;
        let page = parse_page(body, WatchCategory::Anime).unwrap();
        assert_eq!(
            page,
            vec![
                WatchEntry::completed("1", Some(8)),
                WatchEntry::new("20", WatchStatus::Watching, None),
                WatchEntry::new("5114", WatchStatus::PlanToWatch, None),
            ]
        );
    }

    #[test]
    fn test_parse_page_keeps_unreadable_rows() {
        let body = br#"[{"status": 2}, {"anime_id": 3, "status": 2}]"#;
        let page = parse_page(body, WatchCategory::Anime).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].item_id, "");
        assert_eq!(page[1].item_id, "3");
    }

    #[test]
    fn test_parse_page_rejects_non_array() {
        assert!(matches!(
            parse_page(br#"{"errors":[{"message":"invalid request"}]}"#, WatchCategory::Anime),
            Err(FetchError::Malformed(_))
        ));
        assert!(matches!(
            parse_page(b"<html></html>", WatchCategory::Anime),
            Err(FetchError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_empty_page() {
        assert!(parse_page(b"[]", WatchCategory::Anime).unwrap().is_empty());
    }
}
