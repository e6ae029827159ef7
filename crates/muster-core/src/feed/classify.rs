//! Relevance classification for change-feed events.
//!
//! Classification is a pure function of the event plus the local context:
//! the team this engine serves, the signed-in actor, and the set of
//! incident ids currently tracked in memory. The tracked set must be read
//! from live engine state at dispatch time; handlers never capture it.

use std::collections::HashSet;

use super::event::{FeedEvent, RecordTable, id_field};

/// Local context resolved at dispatch time.
#[derive(Debug)]
pub struct LocalContext<'a> {
    /// Team whose assignments this engine mirrors.
    pub team_id: &'a str,
    /// Signed-in responder, used to match field reports they authored.
    pub actor_id: Option<&'a str>,
    /// Ids of incidents currently in the in-memory list.
    pub tracked: &'a HashSet<String>,
}

impl LocalContext<'_> {
    fn is_local_team(&self, row_team: Option<&str>) -> bool {
        row_team == Some(self.team_id)
    }
}

/// What a feed event means to this engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relevance {
    /// The incident just became assigned to the local team.
    Assigned { incident_id: String },
    /// An already-assigned incident's record changed.
    StillAssigned { incident_id: String },
    /// The incident left the local team (reassignment or delete).
    Unassigned { incident_id: String },
    /// A field report owned by the local actor or linked to a tracked
    /// incident changed. `incident_id` is set when the link is tracked.
    ReportChanged { incident_id: Option<String> },
    /// A finalized report now references a tracked incident.
    Finalized { incident_id: String },
    /// Nothing the engine cares about; dropped without side effects.
    Irrelevant,
}

/// Classify one event against the live local context.
#[must_use]
pub fn classify(event: &FeedEvent, cx: &LocalContext<'_>) -> Relevance {
    match event.table {
        RecordTable::Incidents => classify_incident(event, cx),
        RecordTable::FieldReports => classify_field_report(event, cx),
        RecordTable::FinalizedReports => classify_finalized_report(event, cx),
    }
}

fn classify_incident(event: &FeedEvent, cx: &LocalContext<'_>) -> Relevance {
    let Some(incident_id) = event.record_id() else {
        tracing::debug!("incident event without usable id; dropping");
        return Relevance::Irrelevant;
    };

    let new_team = event.new.as_ref().and_then(|row| id_field(row, "team_id"));
    let old_team = event.old.as_ref().and_then(|row| id_field(row, "team_id"));
    let is_local = cx.is_local_team(new_team.as_deref());
    let was_local = cx.is_local_team(old_team.as_deref());

    if is_local && !was_local {
        // Covers brand-new rows and reassignment from another team; the
        // new snapshot's team reference is inspected even when the id is
        // not yet tracked.
        Relevance::Assigned { incident_id }
    } else if is_local {
        Relevance::StillAssigned { incident_id }
    } else if was_local {
        Relevance::Unassigned { incident_id }
    } else {
        Relevance::Irrelevant
    }
}

fn classify_field_report(event: &FeedEvent, cx: &LocalContext<'_>) -> Relevance {
    let mut owned = false;
    let mut tracked_incident: Option<String> = None;

    for row in [event.new.as_ref(), event.old.as_ref()].into_iter().flatten() {
        if let (Some(actor), Some(author)) = (cx.actor_id, id_field(row, "submitted_by")) {
            if author == actor {
                owned = true;
            }
        }
        if tracked_incident.is_none() {
            if let Some(incident_id) = id_field(row, "incident_id") {
                if cx.tracked.contains(&incident_id) {
                    tracked_incident = Some(incident_id);
                }
            }
        }
    }

    if owned || tracked_incident.is_some() {
        Relevance::ReportChanged {
            incident_id: tracked_incident,
        }
    } else {
        Relevance::Irrelevant
    }
}

fn classify_finalized_report(event: &FeedEvent, cx: &LocalContext<'_>) -> Relevance {
    let referenced = event
        .new
        .as_ref()
        .and_then(|row| id_field(row, "incident_id"))
        .or_else(|| {
            event
                .old
                .as_ref()
                .and_then(|row| id_field(row, "incident_id"))
        });

    match referenced {
        Some(incident_id) if cx.tracked.contains(&incident_id) => {
            Relevance::Finalized { incident_id }
        }
        _ => Relevance::Irrelevant,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::event::FeedEventType;
    use serde_json::json;

    fn cx<'a>(tracked: &'a HashSet<String>) -> LocalContext<'a> {
        LocalContext {
            team_id: "7",
            actor_id: Some("user-1"),
            tracked,
        }
    }

    fn incident_event(old: Option<serde_json::Value>, new: Option<serde_json::Value>) -> FeedEvent {
        FeedEvent {
            event_type: FeedEventType::Update,
            table: RecordTable::Incidents,
            old,
            new,
        }
    }

    // === incident table ===================================================

    #[test]
    fn new_assignment_is_detected_without_tracking() {
        let tracked = HashSet::new();
        let event = incident_event(
            Some(json!({"id": "inc-1", "team_id": null})),
            Some(json!({"id": "inc-1", "team_id": 7})),
        );
        assert_eq!(
            classify(&event, &cx(&tracked)),
            Relevance::Assigned {
                incident_id: "inc-1".to_string()
            }
        );
    }

    #[test]
    fn reassignment_from_other_team_counts_as_assignment() {
        let tracked = HashSet::new();
        let event = incident_event(
            Some(json!({"id": "inc-1", "team_id": 3})),
            Some(json!({"id": "inc-1", "team_id": "7"})),
        );
        assert_eq!(
            classify(&event, &cx(&tracked)),
            Relevance::Assigned {
                incident_id: "inc-1".to_string()
            }
        );
    }

    #[test]
    fn still_assigned_update() {
        let tracked = HashSet::from(["inc-1".to_string()]);
        let event = incident_event(
            Some(json!({"id": "inc-1", "team_id": 7, "status": "pending"})),
            Some(json!({"id": "inc-1", "team_id": 7, "status": "responded"})),
        );
        assert_eq!(
            classify(&event, &cx(&tracked)),
            Relevance::StillAssigned {
                incident_id: "inc-1".to_string()
            }
        );
    }

    #[test]
    fn unassignment_covers_reassignment_and_delete() {
        let tracked = HashSet::from(["inc-1".to_string()]);

        let moved = incident_event(
            Some(json!({"id": "inc-1", "team_id": 7})),
            Some(json!({"id": "inc-1", "team_id": 9})),
        );
        assert_eq!(
            classify(&moved, &cx(&tracked)),
            Relevance::Unassigned {
                incident_id: "inc-1".to_string()
            }
        );

        let deleted = FeedEvent {
            event_type: FeedEventType::Delete,
            table: RecordTable::Incidents,
            old: Some(json!({"id": "inc-1", "team_id": 7})),
            new: None,
        };
        assert_eq!(
            classify(&deleted, &cx(&tracked)),
            Relevance::Unassigned {
                incident_id: "inc-1".to_string()
            }
        );
    }

    #[test]
    fn other_team_event_is_irrelevant() {
        let tracked = HashSet::new();
        let event = incident_event(
            Some(json!({"id": "inc-1", "team_id": 3})),
            Some(json!({"id": "inc-1", "team_id": 4})),
        );
        assert_eq!(classify(&event, &cx(&tracked)), Relevance::Irrelevant);
    }

    #[test]
    fn missing_id_is_dropped() {
        let tracked = HashSet::new();
        let event = incident_event(None, Some(json!({"team_id": 7})));
        assert_eq!(classify(&event, &cx(&tracked)), Relevance::Irrelevant);
    }

    // === field-report table ===============================================

    #[test]
    fn own_report_is_relevant_even_when_unlinked() {
        let tracked = HashSet::new();
        let event = FeedEvent {
            event_type: FeedEventType::Insert,
            table: RecordTable::FieldReports,
            old: None,
            new: Some(json!({"id": "fr-1", "submitted_by": "user-1", "incident_id": "inc-99"})),
        };
        assert_eq!(
            classify(&event, &cx(&tracked)),
            Relevance::ReportChanged { incident_id: None }
        );
    }

    #[test]
    fn linked_report_resolves_tracked_incident() {
        let tracked = HashSet::from(["inc-2".to_string()]);
        let event = FeedEvent {
            event_type: FeedEventType::Update,
            table: RecordTable::FieldReports,
            old: Some(json!({"id": "fr-1", "submitted_by": "someone-else", "incident_id": "inc-2"})),
            new: Some(json!({"id": "fr-1", "submitted_by": "someone-else", "incident_id": "inc-2"})),
        };
        assert_eq!(
            classify(&event, &cx(&tracked)),
            Relevance::ReportChanged {
                incident_id: Some("inc-2".to_string())
            }
        );
    }

    #[test]
    fn unrelated_report_is_irrelevant() {
        let tracked = HashSet::from(["inc-2".to_string()]);
        let event = FeedEvent {
            event_type: FeedEventType::Update,
            table: RecordTable::FieldReports,
            old: None,
            new: Some(json!({"id": "fr-1", "submitted_by": "someone-else", "incident_id": "inc-5"})),
        };
        assert_eq!(classify(&event, &cx(&tracked)), Relevance::Irrelevant);
    }

    // === finalized-report table ===========================================

    #[test]
    fn finalization_of_tracked_incident_is_relevant() {
        let tracked = HashSet::from(["inc-2".to_string()]);
        let event = FeedEvent {
            event_type: FeedEventType::Insert,
            table: RecordTable::FinalizedReports,
            old: None,
            new: Some(json!({"id": 42, "incident_id": "inc-2"})),
        };
        assert_eq!(
            classify(&event, &cx(&tracked)),
            Relevance::Finalized {
                incident_id: "inc-2".to_string()
            }
        );
    }

    #[test]
    fn finalization_of_untracked_incident_is_irrelevant() {
        let tracked = HashSet::new();
        let event = FeedEvent {
            event_type: FeedEventType::Insert,
            table: RecordTable::FinalizedReports,
            old: None,
            new: Some(json!({"id": 42, "incident_id": "inc-2"})),
        };
        assert_eq!(classify(&event, &cx(&tracked)), Relevance::Irrelevant);
    }
}
