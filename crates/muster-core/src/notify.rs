//! Notification projection: field-level diffs into dispatch notices.
//!
//! A pure layer over feed events. It never touches engine state; it only
//! decides whether a diff is worth telling a human about and, when it is,
//! packages the notice the alerting layer consumes. Noise suppression
//! lives here: terminal statuses never notify, and a record whose only
//! material change is `resolved_at` appearing stays silent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::feed::event::{FeedEventType, id_field, number_field, text_field};
use crate::model::{Incident, is_terminal_status};

/// The two classes of notification this engine raises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchKind {
    /// An incident just became this team's responsibility.
    Assignment,
    /// A tracked incident moved to a new non-terminal status.
    StatusChange,
}

impl DispatchKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Assignment => "assignment",
            Self::StatusChange => "status_change",
        }
    }
}

/// A notification handed to the host's alerting layer.
///
/// `id` is synthetic and stable per emission (source record id plus the
/// emission time) so downstream consumers can de-duplicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchNotice {
    pub id: String,
    pub kind: DispatchKind,
    pub incident_id: String,
    pub team_id: String,
    pub report_id: Option<String>,
    pub reporter_name: String,
    pub incident_type: Option<String>,
    pub location_address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub reported_at: Option<String>,
    pub responded_at: Option<String>,
    pub old_status: Option<String>,
    pub new_status: Option<String>,
    pub previous_team_id: Option<String>,
    pub emitted_at: String,
}

/// Decide whether an incident-table diff notifies, and how.
///
/// Returns `None` for anything that should stay silent, including the
/// `resolved_at` suppression rule.
#[must_use]
pub fn classify_incident_diff(
    old: Option<&Value>,
    new: Option<&Value>,
    local_team: &str,
) -> Option<DispatchKind> {
    let new = new?;

    // Suppression: resolved_at flipping from absent to present is the
    // backend recording resolution; notifying here would be pure noise.
    let resolved_filled = text_field(new, "resolved_at").is_some()
        && old.is_none_or(|row| text_field(row, "resolved_at").is_none());
    if resolved_filled {
        tracing::debug!("suppressing notification for resolved_at transition");
        return None;
    }

    let new_team = id_field(new, "team_id");
    let old_team = old.and_then(|row| id_field(row, "team_id"));
    let is_local = new_team.as_deref() == Some(local_team);
    let was_local = old_team.as_deref() == Some(local_team);

    if is_local && !was_local {
        return Some(DispatchKind::Assignment);
    }

    if is_local {
        let old_status = old.and_then(|row| text_field(row, "status"));
        let new_status = text_field(new, "status");
        if let (Some(old_status), Some(new_status)) = (old_status, new_status) {
            if old_status != new_status && !is_terminal_status(new_status) {
                return Some(DispatchKind::StatusChange);
            }
        }
    }

    None
}

/// Build the notice for a qualifying incident-table event.
#[must_use]
pub fn incident_notice(
    old: Option<&Value>,
    new: &Value,
    kind: DispatchKind,
    local_team: &str,
    emitted_at: DateTime<Utc>,
) -> Option<DispatchNotice> {
    let incident_id = id_field(new, "id")?;
    let reporter_name = reporter_from_row(new);

    Some(DispatchNotice {
        id: format!("incident-{incident_id}-{}", emitted_at.timestamp_millis()),
        kind,
        incident_id,
        team_id: local_team.to_string(),
        report_id: None,
        reporter_name,
        incident_type: text_field(new, "incident_type").map(str::to_string),
        location_address: text_field(new, "location_address").map(str::to_string),
        latitude: number_field(new, "latitude"),
        longitude: number_field(new, "longitude"),
        reported_at: text_field(new, "created_at").map(str::to_string),
        responded_at: text_field(new, "responded_at").map(str::to_string),
        old_status: old.and_then(|row| text_field(row, "status")).map(str::to_string),
        new_status: text_field(new, "status").map(str::to_string),
        previous_team_id: old.and_then(|row| id_field(row, "team_id")),
        emitted_at: emitted_at.to_rfc3339(),
    })
}

/// Decide whether a field-report diff notifies.
///
/// A new report on a tracked incident reads as an assignment-class event
/// (work just landed on this team); a report status change notifies unless
/// the new status is terminal.
#[must_use]
pub fn classify_report_diff(
    event_type: FeedEventType,
    old: Option<&Value>,
    new: Option<&Value>,
) -> Option<DispatchKind> {
    let new = new?;

    match event_type {
        FeedEventType::Insert => Some(DispatchKind::Assignment),
        FeedEventType::Update => {
            let old_status = old.and_then(|row| text_field(row, "status"));
            let new_status = text_field(new, "status")?;
            if old_status != Some(new_status) && !is_terminal_status(new_status) {
                Some(DispatchKind::StatusChange)
            } else {
                None
            }
        }
        FeedEventType::Delete => None,
    }
}

/// Build the notice for a qualifying field-report event, enriched from the
/// tracked incident the report belongs to.
#[must_use]
pub fn report_notice(
    old: Option<&Value>,
    new: &Value,
    kind: DispatchKind,
    incident: &Incident,
    local_team: &str,
    emitted_at: DateTime<Utc>,
) -> Option<DispatchNotice> {
    let report_id = id_field(new, "id")?;

    Some(DispatchNotice {
        id: format!("report-{report_id}-{}", emitted_at.timestamp_millis()),
        kind,
        incident_id: incident.id.clone(),
        team_id: local_team.to_string(),
        report_id: Some(report_id),
        reporter_name: incident.reporter_display_name(),
        incident_type: incident.incident_type.clone(),
        location_address: incident.location_address.clone(),
        latitude: incident.latitude,
        longitude: incident.longitude,
        reported_at: Some(incident.created_at.clone()),
        responded_at: incident.responded_at.clone(),
        old_status: old.and_then(|row| text_field(row, "status")).map(str::to_string),
        new_status: text_field(new, "status").map(str::to_string),
        previous_team_id: None,
        emitted_at: emitted_at.to_rfc3339(),
    })
}

fn reporter_from_row(row: &Value) -> String {
    let joined = format!(
        "{} {}",
        text_field(row, "first_name").unwrap_or(""),
        text_field(row, "last_name").unwrap_or("")
    );
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        "Unknown reporter".to_string()
    } else {
        trimmed.to_string()
    }
}
