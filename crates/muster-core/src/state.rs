//! Shared in-memory state for one engine instance.
//!
//! All previously-ambient mutable state (list, loading flag, error slot,
//! last-refresh stamp) lives here, owned by the engine and shared with its
//! background workers through an `Arc`. The `disposed` flag is the
//! teardown guard: once set, every mutation becomes a no-op so
//! late-arriving async results cannot write into a stopped engine.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::SyncError;
use crate::model::Incident;

/// Read-only view handed to the host's display layer.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSnapshot {
    pub incidents: Vec<Incident>,
    pub loading: bool,
    pub error: Option<SyncError>,
    /// Wall-clock millis of the last successful authoritative refresh.
    pub last_refreshed_ms: Option<i64>,
}

/// Mutable engine state behind one mutex per concern.
#[derive(Debug, Default)]
pub struct ListState {
    incidents: Mutex<Vec<Incident>>,
    error: Mutex<Option<SyncError>>,
    last_refreshed_ms: Mutex<Option<i64>>,
    loading: AtomicBool,
    disposed: AtomicBool,
}

impl ListState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bar (or re-allow) state mutation. Set on engine teardown.
    pub fn set_disposed(&self, disposed: bool) {
        self.disposed.store(disposed, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Whether the visible list is currently empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.incidents.lock().map_or(true, |list| list.is_empty())
    }

    /// Ids of every tracked incident, resolved fresh on each call.
    #[must_use]
    pub fn tracked_ids(&self) -> HashSet<String> {
        self.incidents.lock().map_or_else(
            |_| HashSet::new(),
            |list| list.iter().map(|incident| incident.id.clone()).collect(),
        )
    }

    /// Look up one incident by id.
    #[must_use]
    pub fn find(&self, incident_id: &str) -> Option<Incident> {
        self.incidents
            .lock()
            .ok()?
            .iter()
            .find(|incident| incident.id == incident_id)
            .cloned()
    }

    /// Replace the list wholesale. The reconciler owns this path.
    pub fn replace_list(&self, incidents: Vec<Incident>) {
        if self.is_disposed() {
            tracing::debug!("dropping list replacement after teardown");
            return;
        }
        if let Ok(mut list) = self.incidents.lock() {
            *list = incidents;
        }
    }

    /// Mutate the list in place; the closure returns whether it changed
    /// anything. No-op after teardown.
    pub fn with_list<R>(&self, f: impl FnOnce(&mut Vec<Incident>) -> R) -> Option<R> {
        if self.is_disposed() {
            tracing::debug!("dropping list mutation after teardown");
            return None;
        }
        self.incidents.lock().ok().map(|mut list| f(&mut list))
    }

    pub fn set_loading(&self, loading: bool) {
        self.loading.store(loading, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    pub fn set_error(&self, error: Option<SyncError>) {
        if self.is_disposed() {
            return;
        }
        if let Ok(mut slot) = self.error.lock() {
            *slot = error;
        }
    }

    pub fn set_last_refreshed(&self, refreshed_at_ms: i64) {
        if self.is_disposed() {
            return;
        }
        if let Ok(mut slot) = self.last_refreshed_ms.lock() {
            *slot = Some(refreshed_at_ms);
        }
    }

    /// Consistent point-in-time view for the host.
    #[must_use]
    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            incidents: self.incidents.lock().map_or_else(|_| Vec::new(), |l| l.clone()),
            loading: self.is_loading(),
            error: self.error.lock().ok().and_then(|slot| slot.clone()),
            last_refreshed_ms: self.last_refreshed_ms.lock().ok().and_then(|slot| *slot),
        }
    }
}
