use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::common::constants::*;
use crate::common::error::ConfigError;
use crate::infra::sqlite_store::is_valid_table_name;

/// Runtime configuration: defaults, then an optional TOML file, then environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub db_path: PathBuf,
    pub user_table: String,
    pub watched_table: String,
    pub region: String,
    pub namespace: String,
    pub stale_window_days: u32,
    pub page_size: usize,
    pub upstream_base_url: String,
    pub requests_per_min: u64,
    pub request_timeout_secs: u64,
    pub max_concurrent_users: usize,
    pub pushgateway_url: Option<String>,
}

/// TOML overlay; every key optional
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub db_path: Option<PathBuf>,
    pub user_table: Option<String>,
    pub watched_table: Option<String>,
    pub region: Option<String>,
    pub namespace: Option<String>,
    pub stale_window_days: Option<u32>,
    pub page_size: Option<usize>,
    pub upstream_base_url: Option<String>,
    pub requests_per_min: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub max_concurrent_users: Option<usize>,
    pub pushgateway_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            user_table: DEFAULT_USER_TABLE.to_string(),
            watched_table: DEFAULT_WATCHED_TABLE.to_string(),
            region: DEFAULT_REGION.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            stale_window_days: DEFAULT_STALE_WINDOW_DAYS,
            page_size: DEFAULT_PAGE_SIZE,
            upstream_base_url: DEFAULT_UPSTREAM_BASE_URL.to_string(),
            requests_per_min: DEFAULT_REQUESTS_PER_MIN,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_concurrent_users: DEFAULT_MAX_CONCURRENT_USERS,
            pushgateway_url: None,
        }
    }
}

impl Config {
    /// Load `.env`, the optional TOML file, and the process environment.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let mut config = Config::default();
        if let Some(path) = config_path {
            let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.display().to_string(),
                source,
            })?;
            config.apply_file(toml::from_str(&content)?);
        }
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_file(&mut self, file: FileConfig) {
        if let Some(v) = file.db_path {
            self.db_path = v;
        }
        if let Some(v) = file.user_table {
            self.user_table = v;
        }
        if let Some(v) = file.watched_table {
            self.watched_table = v;
        }
        if let Some(v) = file.region {
            self.region = v;
        }
        if let Some(v) = file.namespace {
            self.namespace = v;
        }
        if let Some(v) = file.stale_window_days {
            self.stale_window_days = v;
        }
        if let Some(v) = file.page_size {
            self.page_size = v;
        }
        if let Some(v) = file.upstream_base_url {
            self.upstream_base_url = v;
        }
        if let Some(v) = file.requests_per_min {
            self.requests_per_min = v;
        }
        if let Some(v) = file.request_timeout_secs {
            self.request_timeout_secs = v;
        }
        if let Some(v) = file.max_concurrent_users {
            self.max_concurrent_users = v;
        }
        if file.pushgateway_url.is_some() {
            self.pushgateway_url = file.pushgateway_url;
        }
    }

    /// Apply environment overrides through `lookup` so tests need not touch the real environment
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("ANIML_DB_PATH") {
            self.db_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("MAL_USER_TABLE_NAME") {
            self.user_table = v;
        }
        if let Some(v) = lookup("MAL_WATCHED_TABLE_NAME") {
            self.watched_table = v;
        }
        if let Some(v) = lookup("REGION") {
            self.region = v;
        }
        if let Some(v) = lookup("NAMESPACE") {
            self.namespace = v;
        }
        if let Some(v) = lookup("ANIML_STALE_WINDOW_DAYS") {
            self.stale_window_days = parse_env("stale_window_days", &v)?;
        }
        if let Some(v) = lookup("ANIML_PAGE_SIZE") {
            self.page_size = parse_env("page_size", &v)?;
        }
        if let Some(v) = lookup("ANIML_UPSTREAM_BASE_URL") {
            self.upstream_base_url = v;
        }
        if let Some(v) = lookup("ANIML_REQUESTS_PER_MIN") {
            self.requests_per_min = parse_env("requests_per_min", &v)?;
        }
        if let Some(v) = lookup("ANIML_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_env("request_timeout_secs", &v)?;
        }
        if let Some(v) = lookup("ANIML_MAX_CONCURRENT_USERS") {
            self.max_concurrent_users = parse_env("max_concurrent_users", &v)?;
        }
        if let Some(v) = lookup("ANIML_PUSHGATEWAY_URL") {
            self.pushgateway_url = Some(v).filter(|u| !u.trim().is_empty());
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(invalid("page_size", "must be greater than zero"));
        }
        if self.stale_window_days == 0 {
            return Err(invalid("stale_window_days", "must be greater than zero"));
        }
        if self.max_concurrent_users == 0 {
            return Err(invalid("max_concurrent_users", "must be greater than zero"));
        }
        for (key, name) in [("user_table", &self.user_table), ("watched_table", &self.watched_table)] {
            if !is_valid_table_name(name) {
                return Err(invalid(
                    key,
                    "must be ASCII letters, digits or '_', not starting with a digit",
                ));
            }
        }
        if self.region.trim().is_empty() {
            return Err(invalid("region", "must not be empty"));
        }
        Ok(())
    }

    pub fn stale_window(&self) -> Duration {
        Duration::from_millis(self.stale_window_days as u64 * MILLIS_PER_DAY as u64)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn invalid(key: &'static str, message: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        message: message.to_string(),
    }
}

fn parse_env<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        message: format!("'{value}': {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.page_size, 100);
        assert_eq!(config.stale_window(), Duration::from_secs(90 * 24 * 60 * 60));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = Config::default();
        let file: FileConfig = toml::from_str(
            r#"
            region = "eu-west-1"
            page_size = 300
            "#,
        )
        .unwrap();
        config.apply_file(file);
        config
            .apply_env(env(&[("REGION", "us-west-2"), ("MAL_USER_TABLE_NAME", "users")]))
            .unwrap();

        assert_eq!(config.region, "us-west-2");
        assert_eq!(config.page_size, 300);
        assert_eq!(config.user_table, "users");
    }

    #[test]
    fn test_rejects_bad_numbers() {
        let mut config = Config::default();
        let err = config.apply_env(env(&[("ANIML_PAGE_SIZE", "lots")])).unwrap_err();
        assert!(err.to_string().contains("page_size"));
    }

    #[test]
    fn test_validate_rejects_zero_page_size() {
        let config = Config {
            page_size: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_table_names_the_store_cannot_open() {
        let config = Config {
            user_table: "1users".to_string(),
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("user_table"));
        assert!(crate::infra::sqlite_store::SqliteStore::open_in_memory("1users", "malWatched").is_err());
    }

    #[test]
    fn test_unknown_file_keys_are_rejected() {
        assert!(toml::from_str::<FileConfig>("pagesize = 3").is_err());
    }
}
