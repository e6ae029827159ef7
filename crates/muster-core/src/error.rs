//! Error taxonomy for the synchronization engine.
//!
//! The split that matters to a host is degraded vs blocking: a degraded
//! error means "the list you are looking at is stale but real, show a
//! banner"; a blocking error means there is nothing trustworthy to show.
//! Cache I/O failures never appear here at all: the cache is advisory and
//! its failures are logged and swallowed at the store boundary.

use thiserror::Error;

/// Failure of a single authoritative fetch attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The request never produced a response (DNS, connect, timeout).
    #[error("network request failed: {0}")]
    Network(String),

    /// The endpoint answered with a non-success status. The message has
    /// already been through the error-body extraction rules.
    #[error("{message}")]
    Backend { status: u16, message: String },

    /// The endpoint answered 2xx but the body did not decode.
    #[error("malformed response body: {0}")]
    Decode(String),
}

/// Engine-level status surfaced to the host after a refresh.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Offline with nothing cached: the only truly empty-handed state.
    #[error("You're offline and no cached data is available.")]
    OfflineNoData,

    /// Offline, serving the durable cache.
    #[error("You're currently offline. Using cached data.")]
    OfflineUsingCache,

    /// Fetch failed but the in-memory list is intact.
    #[error("Network error. Using existing data: {source_message}")]
    StaleUsingMemory { source_message: String },

    /// Fetch failed with nothing in memory; the durable cache stepped in.
    #[error("Network error. Using cached data: {source_message}")]
    StaleUsingCache { source_message: String },

    /// Fetch failed and no fallback was available.
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl SyncError {
    /// True when last-good data is still on screen and this error is only
    /// an explanatory banner.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        matches!(
            self,
            Self::OfflineUsingCache
                | Self::StaleUsingMemory { .. }
                | Self::StaleUsingCache { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degraded_split_matches_taxonomy() {
        assert!(SyncError::OfflineUsingCache.is_degraded());
        assert!(
            SyncError::StaleUsingMemory {
                source_message: "x".to_string()
            }
            .is_degraded()
        );
        assert!(
            SyncError::StaleUsingCache {
                source_message: "x".to_string()
            }
            .is_degraded()
        );
        assert!(!SyncError::OfflineNoData.is_degraded());
        assert!(
            !SyncError::Fetch(FetchError::Network("down".to_string())).is_degraded()
        );
    }

    #[test]
    fn fetch_error_messages_carry_source_detail() {
        let err = SyncError::StaleUsingMemory {
            source_message: "502 from gateway".to_string(),
        };
        assert!(err.to_string().contains("502 from gateway"));
        assert!(err.to_string().starts_with("Network error."));
    }

    #[test]
    fn backend_error_displays_extracted_message_only() {
        let err = FetchError::Backend {
            status: 503,
            message: "maintenance window".to_string(),
        };
        assert_eq!(err.to_string(), "maintenance window");
    }
}
