use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use crate::app::ports::{UserStore, WatchedStore};
use crate::common::error::{StoreError, StoreResult};
use crate::common::types::{UserRecord, WatchedAssociation, WriteOutcome};

/// SQLite-backed user and association tables.
///
/// Every mutation is a single statement whose conflict clause carries the condition,
/// so the check and the write cannot interleave with another process. Mutations run on
/// the blocking pool: a busy database must not stall other users sharing the executor.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    user_table: String,
    watched_table: String,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(db_path: P, user_table: &str, watched_table: &str) -> StoreResult<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Self::with_connection(conn, user_table, watched_table)
    }

    pub fn open_in_memory(user_table: &str, watched_table: &str) -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?, user_table, watched_table)
    }

    fn with_connection(conn: Connection, user_table: &str, watched_table: &str) -> StoreResult<Self> {
        for name in [user_table, watched_table] {
            if !is_valid_table_name(name) {
                return Err(StoreError::InvalidKey(format!("table name '{name}'")));
            }
        }
        conn.execute_batch(&format!(
            r#"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS {user_table} (
                mal_id        TEXT PRIMARY KEY,
                last_updated  INTEGER
            );
            CREATE TABLE IF NOT EXISTS {watched_table} (
                watched_id  TEXT PRIMARY KEY,
                mal_id      TEXT NOT NULL,
                anime_id    TEXT NOT NULL,
                score       INTEGER,
                created_at  INTEGER NOT NULL
            );
            "#
        ))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            user_table: user_table.to_string(),
            watched_table: watched_table.to_string(),
        })
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Run `f` against the connection on the blocking pool
    async fn with_conn_blocking<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&conn)
        })
        .await?
    }

    pub fn get_user(&self, user_id: &str) -> StoreResult<Option<UserRecord>> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                &format!("SELECT mal_id, last_updated FROM {} WHERE mal_id = ?1", self.user_table),
                params![user_id],
                |row| {
                    Ok(UserRecord {
                        user_id: row.get(0)?,
                        last_updated: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    pub fn get_association(&self, user_id: &str, item_id: &str) -> StoreResult<Option<WatchedAssociation>> {
        let key = crate::idempotency::association_key(user_id, item_id);
        let conn = self.lock()?;
        let association = conn
            .query_row(
                &format!(
                    "SELECT mal_id, anime_id, score FROM {} WHERE watched_id = ?1",
                    self.watched_table
                ),
                params![key],
                |row| {
                    let score: Option<i64> = row.get(2)?;
                    Ok(WatchedAssociation {
                        user_id: row.get(0)?,
                        item_id: row.get(1)?,
                        score: score.and_then(|s| u8::try_from(s).ok()),
                    })
                },
            )
            .optional()?;
        Ok(association)
    }

    pub fn count_associations(&self, user_id: &str) -> StoreResult<u64> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE mal_id = ?1", self.watched_table),
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }
}

/// Table names are interpolated into SQL, so only plain identifiers are allowed
pub fn is_valid_table_name(name: &str) -> bool {
    !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit())
}

fn outcome(changed: usize) -> WriteOutcome {
    if changed == 0 {
        WriteOutcome::ConditionFailed
    } else {
        WriteOutcome::Applied
    }
}

#[async_trait]
impl UserStore for SqliteStore {
    async fn mark_if_stale(&self, user_id: &str, now_ms: i64, threshold_ms: i64) -> StoreResult<WriteOutcome> {
        if user_id.is_empty() {
            return Err(StoreError::InvalidKey("empty user id".into()));
        }
        let sql = format!(
            "INSERT INTO {t} (mal_id, last_updated) VALUES (?1, ?2)
             ON CONFLICT(mal_id) DO UPDATE SET last_updated = excluded.last_updated
             WHERE {t}.last_updated IS NULL OR {t}.last_updated < ?3",
            t = self.user_table
        );
        let user_id = user_id.to_string();
        self.with_conn_blocking(move |conn| {
            let changed = conn.execute(&sql, params![user_id, now_ms, threshold_ms])?;
            Ok(outcome(changed))
        })
        .await
    }
}

#[async_trait]
impl WatchedStore for SqliteStore {
    async fn insert_if_absent(&self, association: &WatchedAssociation) -> StoreResult<WriteOutcome> {
        let sql = format!(
            "INSERT INTO {} (watched_id, mal_id, anime_id, score, created_at) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(watched_id) DO NOTHING",
            self.watched_table
        );
        let key = association.key();
        let association = association.clone();
        let created_at = chrono::Utc::now().timestamp_millis();
        self.with_conn_blocking(move |conn| {
            let changed = conn.execute(
                &sql,
                params![
                    key,
                    association.user_id,
                    association.item_id,
                    association.score.map(i64::from),
                    created_at
                ],
            )?;
            Ok(outcome(changed))
        })
        .await
    }
}
