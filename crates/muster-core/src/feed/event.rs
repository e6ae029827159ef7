//! Wire types for the change-data-capture stream.
//!
//! Every event carries an operation, the source record family, and the old
//! and new row snapshots as loosely-typed JSON. Snapshots stay `Value`s on
//! purpose: the feed mirrors backend tables whose schemas drift, and the
//! engine only ever reads a handful of fields from them.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// The three operations a change event can describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedEventType {
    Insert,
    Update,
    Delete,
}

impl FeedEventType {
    pub const ALL: [Self; 3] = [Self::Insert, Self::Update, Self::Delete];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for FeedEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown event-type string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEventType {
    pub raw: String,
}

impl fmt::Display for UnknownEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown feed event type '{}': expected insert, update, or delete",
            self.raw
        )
    }
}

impl std::error::Error for UnknownEventType {}

impl FromStr for FeedEventType {
    type Err = UnknownEventType;

    // Feed backends disagree on casing (some publish `INSERT`), so parsing
    // is case-insensitive while serialization stays lowercase.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "insert" => Ok(Self::Insert),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            _ => Err(UnknownEventType { raw: s.to_string() }),
        }
    }
}

impl Serialize for FeedEventType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FeedEventType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// The three record families the subscription covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordTable {
    /// The incident records themselves.
    Incidents,
    /// Responder-authored field reports.
    FieldReports,
    /// Terminal finalized reports; a link removes an incident from scope.
    FinalizedReports,
}

impl RecordTable {
    pub const ALL: [Self; 3] = [Self::Incidents, Self::FieldReports, Self::FinalizedReports];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Incidents => "incidents",
            Self::FieldReports => "field_reports",
            Self::FinalizedReports => "finalized_reports",
        }
    }
}

impl fmt::Display for RecordTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown table name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTable {
    pub raw: String,
}

impl fmt::Display for UnknownTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown record table '{}': expected incidents, field_reports, or finalized_reports",
            self.raw
        )
    }
}

impl std::error::Error for UnknownTable {}

impl FromStr for RecordTable {
    type Err = UnknownTable;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "incidents" => Ok(Self::Incidents),
            "field_reports" => Ok(Self::FieldReports),
            "finalized_reports" => Ok(Self::FinalizedReports),
            _ => Err(UnknownTable { raw: s.to_string() }),
        }
    }
}

impl Serialize for RecordTable {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RecordTable {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// One change-data-capture event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedEvent {
    pub event_type: FeedEventType,
    pub table: RecordTable,
    #[serde(default)]
    pub old: Option<Value>,
    #[serde(default)]
    pub new: Option<Value>,
}

impl FeedEvent {
    /// The id of the affected record, preferring the new snapshot.
    #[must_use]
    pub fn record_id(&self) -> Option<String> {
        self.new
            .as_ref()
            .and_then(|row| id_field(row, "id"))
            .or_else(|| self.old.as_ref().and_then(|row| id_field(row, "id")))
    }
}

/// Read an id-like field, normalizing backend numeric ids to strings so
/// comparisons never depend on whether a table uses integer or uuid keys.
#[must_use]
pub fn id_field(row: &Value, key: &str) -> Option<String> {
    match row.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Read a non-null, non-empty string field from a snapshot.
#[must_use]
pub fn text_field<'a>(row: &'a Value, key: &str) -> Option<&'a str> {
    match row.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.as_str()),
        _ => None,
    }
}

/// Read a numeric field, accepting the stringly-typed numbers some
/// backends emit for latitude/longitude columns.
#[must_use]
pub fn number_field(row: &Value, key: &str) -> Option<f64> {
    match row.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // === enums ============================================================

    #[test]
    fn event_type_roundtrip() {
        for et in FeedEventType::ALL {
            let parsed: FeedEventType = et.as_str().parse().expect("parse");
            assert_eq!(parsed, et);
            assert_eq!(
                serde_json::to_string(&et).expect("serialize"),
                format!("\"{}\"", et.as_str())
            );
        }
    }

    #[test]
    fn event_type_parses_uppercase() {
        assert_eq!("INSERT".parse::<FeedEventType>(), Ok(FeedEventType::Insert));
        assert_eq!("Update".parse::<FeedEventType>(), Ok(FeedEventType::Update));
    }

    #[test]
    fn event_type_rejects_unknown() {
        let err = "upsert".parse::<FeedEventType>().expect_err("should fail");
        assert_eq!(err.raw, "upsert");
        assert!(err.to_string().contains("insert, update, or delete"));
    }

    #[test]
    fn table_roundtrip() {
        for table in RecordTable::ALL {
            let parsed: RecordTable = table.as_str().parse().expect("parse");
            assert_eq!(parsed, table);
        }
    }

    #[test]
    fn table_rejects_unknown() {
        assert!("users".parse::<RecordTable>().is_err());
    }

    // === event decoding ===================================================

    #[test]
    fn decodes_wire_event() {
        let event: FeedEvent = serde_json::from_value(json!({
            "event_type": "update",
            "table": "incidents",
            "old": {"id": "inc-1", "status": "pending"},
            "new": {"id": "inc-1", "status": "responded"},
        }))
        .expect("decode");

        assert_eq!(event.event_type, FeedEventType::Update);
        assert_eq!(event.table, RecordTable::Incidents);
        assert_eq!(event.record_id().as_deref(), Some("inc-1"));
    }

    #[test]
    fn record_id_falls_back_to_old_snapshot() {
        let event = FeedEvent {
            event_type: FeedEventType::Delete,
            table: RecordTable::Incidents,
            old: Some(json!({"id": "inc-9"})),
            new: None,
        };
        assert_eq!(event.record_id().as_deref(), Some("inc-9"));
    }

    #[test]
    fn record_id_missing_when_snapshots_unusable() {
        let event = FeedEvent {
            event_type: FeedEventType::Update,
            table: RecordTable::Incidents,
            old: Some(json!({"id": null})),
            new: Some(json!({"status": "pending"})),
        };
        assert!(event.record_id().is_none());
    }

    // === snapshot accessors ===============================================

    #[test]
    fn id_field_normalizes_numbers() {
        let row = json!({"team_id": 7, "id": "inc-1"});
        assert_eq!(id_field(&row, "team_id").as_deref(), Some("7"));
        assert_eq!(id_field(&row, "id").as_deref(), Some("inc-1"));
        assert!(id_field(&row, "missing").is_none());
    }

    #[test]
    fn number_field_accepts_strings() {
        let row = json!({"latitude": "14.5995", "longitude": 120.9842, "bad": "north"});
        assert_eq!(number_field(&row, "latitude"), Some(14.5995));
        assert_eq!(number_field(&row, "longitude"), Some(120.9842));
        assert!(number_field(&row, "bad").is_none());
    }
}
