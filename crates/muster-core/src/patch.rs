//! Instant patch path: minimum-latency updates that bypass the coalescer.
//!
//! New assignments and status flips on incident records must show up in
//! well under a second, so they are applied straight to the in-memory list
//! from the feed snapshot and mirrored into the cache by a detached
//! background write. The next authoritative refresh supersedes whatever
//! this path wrote; last-write-wins on the list is the contract.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::{self, CacheStore};
use crate::feed::event::{id_field, number_field, text_field};
use crate::model::{self, Incident};

/// A partial incident record keyed by id.
///
/// `None` fields are "not carried by this patch" and leave the target's
/// value alone; present fields overwrite.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncidentPatch {
    pub id: String,
    pub status: Option<String>,
    pub incident_type: Option<String>,
    pub location_address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub mobile_number: Option<String>,
    pub created_at: Option<String>,
    pub responded_at: Option<String>,
    pub resolved_at: Option<String>,
}

impl IncidentPatch {
    /// Build a full patch from a feed snapshot of an incident row.
    /// Returns `None` when the snapshot has no usable id.
    #[must_use]
    pub fn from_snapshot(row: &Value) -> Option<Self> {
        let id = id_field(row, "id")?;
        Some(Self {
            id,
            status: text_field(row, "status").map(str::to_string),
            incident_type: text_field(row, "incident_type").map(str::to_string),
            location_address: text_field(row, "location_address").map(str::to_string),
            latitude: number_field(row, "latitude"),
            longitude: number_field(row, "longitude"),
            first_name: text_field(row, "first_name").map(str::to_string),
            last_name: text_field(row, "last_name").map(str::to_string),
            mobile_number: text_field(row, "mobile_number").map(str::to_string),
            created_at: text_field(row, "created_at").map(str::to_string),
            responded_at: text_field(row, "responded_at").map(str::to_string),
            resolved_at: text_field(row, "resolved_at").map(str::to_string),
        })
    }

    /// Narrow patch for updates to an already-tracked incident: status and
    /// lifecycle timestamps only.
    #[must_use]
    pub fn field_update(row: &Value) -> Option<Self> {
        let id = id_field(row, "id")?;
        Some(Self {
            id,
            status: text_field(row, "status").map(str::to_string),
            responded_at: text_field(row, "responded_at").map(str::to_string),
            resolved_at: text_field(row, "resolved_at").map(str::to_string),
            ..Self::default()
        })
    }

    /// Whether this patch carries enough to stand in as a new list entry.
    ///
    /// Requires both a type and a creation timestamp; anything thinner
    /// would insert a placeholder the sort invariant cannot place.
    #[must_use]
    pub const fn can_insert(&self) -> bool {
        self.incident_type.is_some() && self.created_at.is_some()
    }

    /// Shallow-merge the carried fields into an existing incident.
    pub fn merge_into(&self, target: &mut Incident) {
        debug_assert_eq!(self.id, target.id);
        if let Some(v) = &self.status {
            target.status.clone_from(v);
        }
        if let Some(v) = &self.incident_type {
            target.incident_type = Some(v.clone());
        }
        if let Some(v) = &self.location_address {
            target.location_address = Some(v.clone());
        }
        if let Some(v) = self.latitude {
            target.latitude = Some(v);
        }
        if let Some(v) = self.longitude {
            target.longitude = Some(v);
        }
        if let Some(v) = &self.first_name {
            target.first_name = Some(v.clone());
        }
        if let Some(v) = &self.last_name {
            target.last_name = Some(v.clone());
        }
        if let Some(v) = &self.mobile_number {
            target.mobile_number = Some(v.clone());
        }
        if let Some(v) = &self.created_at {
            target.created_at.clone_from(v);
        }
        if let Some(v) = &self.responded_at {
            target.responded_at = Some(v.clone());
        }
        if let Some(v) = &self.resolved_at {
            target.resolved_at = Some(v.clone());
        }
    }

    /// Materialize a brand-new incident from this patch. `None` unless
    /// [`can_insert`](Self::can_insert) holds.
    #[must_use]
    pub fn materialize(&self) -> Option<Incident> {
        if !self.can_insert() {
            return None;
        }
        let mut incident = Incident {
            id: self.id.clone(),
            ..Incident::default()
        };
        self.merge_into(&mut incident);
        Some(incident)
    }
}

/// What applying a patch did to the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchEffect {
    /// Merged into an existing entry.
    Merged,
    /// Inserted as a new entry.
    Inserted,
    /// Unknown id and the patch was too thin to insert; list untouched.
    Skipped,
}

/// Apply a patch to a list, re-establishing the sort invariant on change.
pub fn apply_patch(incidents: &mut Vec<Incident>, patch: &IncidentPatch) -> PatchEffect {
    if let Some(existing) = incidents.iter_mut().find(|i| i.id == patch.id) {
        patch.merge_into(existing);
        model::sort_incidents(incidents);
        return PatchEffect::Merged;
    }

    match patch.materialize() {
        Some(incident) => {
            incidents.insert(0, incident);
            model::sort_incidents(incidents);
            PatchEffect::Inserted
        }
        None => {
            tracing::debug!(
                incident_id = %patch.id,
                "patch for unknown incident lacks the new-entry field set; skipping"
            );
            PatchEffect::Skipped
        }
    }
}

/// Mirror a patch into the cached list on a detached thread.
///
/// The caller's in-memory update has already happened; this write has its
/// own error boundary and can neither block nor fail the caller. The
/// handle is returned for tests; production callers drop it.
pub fn mirror_patch_to_cache(
    store: Arc<dyn CacheStore>,
    team_id: String,
    patch: IncidentPatch,
) -> Option<JoinHandle<()>> {
    thread::Builder::new()
        .name("muster-cache-mirror".to_string())
        .spawn(move || {
            let Some(mut cached) = cache::load_cached_list(store.as_ref(), &team_id) else {
                // Nothing cached yet; the next full refresh seeds it.
                return;
            };
            if apply_patch(&mut cached, &patch) != PatchEffect::Skipped {
                cache::store_cached_list(store.as_ref(), &team_id, &cached);
            }
        })
        .map_err(|e| tracing::warn!(error = %e, "failed to spawn cache mirror thread"))
        .ok()
}
