//! Query-endpoint response decoding.
//!
//! The engine consumes the team-scoped assigned-incident endpoint through
//! the [`IncidentSource`](crate::reconcile::IncidentSource) trait; this
//! module owns the transport-agnostic half of that contract. A concrete
//! HTTP binding hands over status, content type, and raw body and gets back
//! either the incident list or a message that has been through the
//! error-extraction precedence: JSON `error` field, JSON `message` field,
//! plain-text body, the fixed 429 throttling message, then the bare status.

use serde::Deserialize;
use serde_json::Value;

use crate::error::FetchError;
use crate::model::Incident;

/// Friendly message substituted for an otherwise-bare 429.
pub const THROTTLED_MESSAGE: &str = "Too many requests. Please wait a moment and try again.";

/// A raw response from the query endpoint, before interpretation.
#[derive(Debug, Clone)]
pub struct QueryResponse {
    pub status: u16,
    pub content_type: String,
    pub body: String,
}

#[derive(Debug, Deserialize)]
struct IncidentListBody {
    #[serde(default)]
    incidents: Vec<Incident>,
}

impl QueryResponse {
    #[must_use]
    pub fn new(status: u16, content_type: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: content_type.into(),
            body: body.into(),
        }
    }

    /// Whether the status is in the 2xx success range.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Interpret the response as the assigned-incident list.
    ///
    /// A missing or non-array `incidents` field decodes as an empty list;
    /// the endpoint owns its schema and this engine stays tolerant of it.
    ///
    /// # Errors
    ///
    /// [`FetchError::Backend`] for non-2xx statuses (message extracted per
    /// the module rules), [`FetchError::Decode`] for unparsable 2xx bodies.
    pub fn into_incidents(self) -> Result<Vec<Incident>, FetchError> {
        if !self.is_success() {
            return Err(FetchError::Backend {
                status: self.status,
                message: self.error_message(),
            });
        }

        let parsed: IncidentListBody =
            serde_json::from_str(&self.body).map_err(|e| FetchError::Decode(e.to_string()))?;
        Ok(parsed.incidents)
    }

    /// Extract the most useful human-readable message from a failure
    /// response.
    #[must_use]
    pub fn error_message(&self) -> String {
        if self.content_type.contains("application/json") {
            if let Ok(value) = serde_json::from_str::<Value>(&self.body) {
                if let Some(error) = value.get("error").and_then(Value::as_str) {
                    return error.to_string();
                }
                if let Some(message) = value.get("message").and_then(Value::as_str) {
                    return message.to_string();
                }
            }
        }

        let text = self.body.trim();
        if !text.is_empty() {
            return text.to_string();
        }

        if self.status == 429 {
            return THROTTLED_MESSAGE.to_string();
        }

        format!("Request failed with status {}", self.status)
    }
}
