//! Best-effort durable cache for the last-known incident list.
//!
//! The cache is a fallback, never an authority: every operation is
//! infallible at the trait boundary, and implementations log failures and
//! degrade to a miss or a no-op. Keys are namespaced per team so switching
//! teams cannot leak another team's list.

mod memory;
mod sqlite;

pub use memory::MemoryCacheStore;
pub use sqlite::SqliteCacheStore;

use crate::model::Incident;

/// Async-agnostic key/value persistence used by the engine.
///
/// Implementations must never panic or surface I/O errors to the caller;
/// a failed read is a miss, a failed write is a logged no-op.
pub trait CacheStore: Send + Sync {
    /// Fetch the raw value for `key`, or `None` on miss or failure.
    fn get(&self, key: &str) -> Option<String>;

    /// Persist `value` under `key`, best effort.
    fn set(&self, key: &str, value: &str);
}

/// Cache key for a team's assigned-incident list.
#[must_use]
pub fn list_key(team_id: &str) -> String {
    format!("assigned-incidents-{team_id}")
}

/// Cache key for a team's last-refreshed stamp.
#[must_use]
pub fn stamp_key(team_id: &str) -> String {
    format!("assigned-incidents-{team_id}-refreshed-at")
}

/// Load and decode the cached list for a team.
///
/// Decode failures are treated as misses: the cache holds whatever an
/// older build wrote, and a stale schema must never break a refresh.
#[must_use]
pub fn load_cached_list(store: &dyn CacheStore, team_id: &str) -> Option<Vec<Incident>> {
    let raw = store.get(&list_key(team_id))?;
    match serde_json::from_str(&raw) {
        Ok(list) => Some(list),
        Err(e) => {
            tracing::warn!(team_id, error = %e, "cached incident list failed to decode; ignoring");
            None
        }
    }
}

/// Encode and persist the list for a team, best effort.
pub fn store_cached_list(store: &dyn CacheStore, team_id: &str, incidents: &[Incident]) {
    match serde_json::to_string(incidents) {
        Ok(encoded) => store.set(&list_key(team_id), &encoded),
        Err(e) => {
            tracing::warn!(team_id, error = %e, "failed to encode incident list for cache");
        }
    }
}

/// Record the wall-clock time of the last successful authoritative refresh.
pub fn stamp_refresh(store: &dyn CacheStore, team_id: &str, refreshed_at_ms: i64) {
    store.set(&stamp_key(team_id), &refreshed_at_ms.to_string());
}

/// Read back the last-refreshed stamp, if one was recorded.
#[must_use]
pub fn last_refresh_stamp(store: &dyn CacheStore, team_id: &str) -> Option<i64> {
    store.get(&stamp_key(team_id))?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Incident;

    #[test]
    fn keys_are_namespaced_per_team() {
        assert_eq!(list_key("7"), "assigned-incidents-7");
        assert_eq!(list_key("12"), "assigned-incidents-12");
        assert_ne!(list_key("7"), list_key("12"));
        assert_ne!(list_key("7"), stamp_key("7"));
    }

    #[test]
    fn list_roundtrip_through_store() {
        let store = MemoryCacheStore::new();
        let incidents = vec![Incident {
            id: "inc-1".to_string(),
            ..Incident::default()
        }];

        store_cached_list(&store, "7", &incidents);
        let loaded = load_cached_list(&store, "7").expect("cached list");
        assert_eq!(loaded, incidents);

        // A different team's namespace stays empty.
        assert!(load_cached_list(&store, "8").is_none());
    }

    #[test]
    fn corrupt_cache_entry_is_a_miss() {
        let store = MemoryCacheStore::new();
        store.set(&list_key("7"), "{not json");
        assert!(load_cached_list(&store, "7").is_none());
    }

    #[test]
    fn refresh_stamp_roundtrips() {
        let store = MemoryCacheStore::new();
        assert!(last_refresh_stamp(&store, "7").is_none());

        stamp_refresh(&store, "7", 1_709_280_000_000);
        assert_eq!(last_refresh_stamp(&store, "7"), Some(1_709_280_000_000));
    }
}
