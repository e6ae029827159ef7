//! Incident records and the visible-list ordering rules.
//!
//! An [`Incident`] is the backend's dispatched-event record as this engine
//! sees it: identity, an opaque status string, reporter contact fields, the
//! lifecycle timestamps, and an optional nested [`FieldReport`]. Timestamps
//! stay as the RFC 3339 strings the backend formats; they are parsed on
//! demand for ordering so an unparsable value degrades to "sorts last"
//! instead of failing the whole list.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Reverse;

/// Statuses treated as terminal for notification purposes.
///
/// The engine otherwise treats `status` as an opaque backend-defined string.
pub const TERMINAL_STATUSES: [&str; 2] = ["resolved", "completed"];

/// Returns true when `status` is in the terminal set (case-insensitive).
#[must_use]
pub fn is_terminal_status(status: &str) -> bool {
    TERMINAL_STATUSES
        .iter()
        .any(|t| status.eq_ignore_ascii_case(t))
}

/// A responder-authored report tied to one incident.
///
/// Once `finalized_report_id` is set the owning incident leaves this
/// engine's visible scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldReport {
    pub id: String,
    pub status: String,
    pub updated_at: Option<String>,
    pub synced_at: Option<String>,
    pub notes: Option<String>,
    pub patient_payload: Option<Value>,
    pub incident_payload: Option<Value>,
    pub injury_payload: Option<Value>,
    pub finalized_report_id: Option<i64>,
}

impl Default for FieldReport {
    fn default() -> Self {
        Self {
            id: String::new(),
            status: String::new(),
            updated_at: None,
            synced_at: None,
            notes: None,
            patient_payload: None,
            incident_payload: None,
            injury_payload: None,
            finalized_report_id: None,
        }
    }
}

/// One assigned incident as tracked by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Incident {
    pub id: String,
    pub status: String,
    pub incident_type: Option<String>,
    pub location_address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub mobile_number: Option<String>,
    pub created_at: String,
    pub responded_at: Option<String>,
    pub resolved_at: Option<String>,
    pub field_report: Option<FieldReport>,
}

impl Default for Incident {
    fn default() -> Self {
        Self {
            id: String::new(),
            status: "pending".to_string(),
            incident_type: None,
            location_address: None,
            latitude: None,
            longitude: None,
            first_name: None,
            last_name: None,
            mobile_number: None,
            created_at: String::new(),
            responded_at: None,
            resolved_at: None,
            field_report: None,
        }
    }
}

impl Incident {
    /// The instant this incident sorts by: `responded_at` when present,
    /// otherwise `created_at`.
    ///
    /// Presence wins over parseability: a present-but-unparsable
    /// `responded_at` makes the whole entry sort last, it does not fall
    /// back to `created_at`.
    #[must_use]
    pub fn sort_timestamp(&self) -> Option<DateTime<Utc>> {
        let raw = self.responded_at.as_deref().unwrap_or(&self.created_at);
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }

    /// Whether this incident's field report has been finalized, removing it
    /// from the visible scope.
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.field_report
            .as_ref()
            .is_some_and(|r| r.finalized_report_id.is_some())
    }

    /// Reporter name for display and notifications.
    #[must_use]
    pub fn reporter_display_name(&self) -> String {
        let joined = format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or(""),
            self.last_name.as_deref().unwrap_or("")
        );
        let trimmed = joined.trim();
        if trimmed.is_empty() {
            "Unknown reporter".to_string()
        } else {
            trimmed.to_string()
        }
    }
}

/// Sort a list into the visible order: descending by
/// `responded_at ?? created_at`, unparsable-timestamp entries last, ties
/// keeping their relative order (stable sort).
pub fn sort_incidents(incidents: &mut [Incident]) {
    // Reverse(None) > Reverse(Some(_)), so unparsable entries sink to the end
    // while parsable ones order newest-first.
    incidents.sort_by_key(|incident| Reverse(incident.sort_timestamp()));
}

/// Drop incidents whose field report links to a finalized report.
pub fn retain_visible(incidents: &mut Vec<Incident>) {
    incidents.retain(|incident| !incident.is_finalized());
}
