//! Durable SQLite-backed cache store.
//!
//! A single `cache` table keyed by string, surviving process restarts.
//! Consistent with the [`CacheStore`](super::CacheStore) contract, nothing
//! here returns an error: open-time problems are the only fallible path
//! (the caller decides whether to fall back to a memory store), and every
//! per-operation failure is logged and swallowed.

use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, OptionalExtension, params};

use super::CacheStore;

/// Key/value cache persisted in a SQLite file.
#[derive(Debug)]
pub struct SqliteCacheStore {
    conn: Mutex<Connection>,
}

impl SqliteCacheStore {
    /// Open (or create) the cache database at `path`.
    ///
    /// # Errors
    ///
    /// Returns the underlying rusqlite error when the file cannot be
    /// opened or the schema cannot be applied.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Open an in-memory database, useful for tests and ephemeral runs.
    ///
    /// # Errors
    ///
    /// Returns the underlying rusqlite error when the schema cannot be
    /// applied.
    pub fn open_in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, rusqlite::Error> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS cache (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at_ms INTEGER NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn now_ms() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
    }

    /// Remove every entry. Used by cache administration, not by the engine.
    pub fn clear(&self) {
        let Ok(conn) = self.conn.lock() else {
            tracing::warn!("cache connection lock poisoned; skipping clear");
            return;
        };
        if let Err(e) = conn.execute("DELETE FROM cache", []) {
            tracing::warn!(error = %e, "failed to clear cache");
        }
    }

    /// Number of stored entries, or `None` when the query fails.
    #[must_use]
    pub fn len(&self) -> Option<usize> {
        let conn = self.conn.lock().ok()?;
        conn.query_row("SELECT COUNT(*) FROM cache", [], |row| row.get::<_, i64>(0))
            .ok()
            .and_then(|n| usize::try_from(n).ok())
    }

    /// Whether the store currently holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len().is_none_or(|n| n == 0)
    }
}

impl CacheStore for SqliteCacheStore {
    fn get(&self, key: &str) -> Option<String> {
        let conn = match self.conn.lock() {
            Ok(conn) => conn,
            Err(_) => {
                tracing::warn!(key, "cache connection lock poisoned; treating as miss");
                return None;
            }
        };

        match conn
            .query_row(
                "SELECT value FROM cache WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
        {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, error = %e, "cache read failed; treating as miss");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) {
        let conn = match self.conn.lock() {
            Ok(conn) => conn,
            Err(_) => {
                tracing::warn!(key, "cache connection lock poisoned; dropping write");
                return;
            }
        };

        let result = conn.execute(
            "INSERT INTO cache (key, value, updated_at_ms) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at_ms = ?3",
            params![key, value, Self::now_ms()],
        );

        if let Err(e) = result {
            tracing::warn!(key, error = %e, "cache write failed; dropping");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn get_set_roundtrip() {
        let store = SqliteCacheStore::open_in_memory().expect("open");
        assert!(store.get("a").is_none());

        store.set("a", "one");
        assert_eq!(store.get("a").as_deref(), Some("one"));

        store.set("a", "two");
        assert_eq!(store.get("a").as_deref(), Some("two"));
    }

    #[test]
    fn survives_reopen_on_disk() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("cache.db");

        {
            let store = SqliteCacheStore::open(&path).expect("open");
            store.set("assigned-incidents-7", r#"[{"id":"inc-1"}]"#);
        }

        let reopened = SqliteCacheStore::open(&path).expect("reopen");
        assert_eq!(
            reopened.get("assigned-incidents-7").as_deref(),
            Some(r#"[{"id":"inc-1"}]"#)
        );
    }

    #[test]
    fn clear_removes_everything() {
        let store = SqliteCacheStore::open_in_memory().expect("open");
        store.set("a", "1");
        store.set("b", "2");
        assert_eq!(store.len(), Some(2));

        store.clear();
        assert!(store.is_empty());
        assert!(store.get("a").is_none());
    }
}
