//! HTTP binding for the query endpoint.
//!
//! The core crate interprets responses ([`QueryResponse`]); this module
//! only moves bytes with `ureq` and maps transport failures.

use std::time::Duration;

use muster_core::backend::QueryResponse;
use muster_core::error::FetchError;
use muster_core::model::Incident;
use muster_core::reconcile::IncidentSource;

/// [`IncidentSource`] over HTTP.
#[derive(Debug)]
pub struct HttpIncidentSource {
    base_url: String,
    token: Option<String>,
    agent: ureq::Agent,
}

impl HttpIncidentSource {
    #[must_use]
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(15))
            .build();
        Self {
            base_url: base_url.into(),
            token,
            agent,
        }
    }

    fn assigned_url(&self, team_id: &str) -> String {
        format!(
            "{}/teams/{team_id}/assigned-incidents",
            self.base_url.trim_end_matches('/')
        )
    }
}

impl IncidentSource for HttpIncidentSource {
    fn fetch_assigned(&self, team_id: &str) -> Result<Vec<Incident>, FetchError> {
        let url = self.assigned_url(team_id);
        let mut request = self
            .agent
            .get(&url)
            .set("Accept", "application/json")
            .set("Cache-Control", "no-store")
            .set("User-Agent", "muster-cli");

        if let Some(token) = &self.token {
            request = request.set("Authorization", &format!("Bearer {token}"));
        }

        let response = match request.call() {
            Ok(response) => response,
            // Non-2xx still carries a body worth extracting.
            Err(ureq::Error::Status(_, response)) => response,
            Err(ureq::Error::Transport(transport)) => {
                return Err(FetchError::Network(transport.to_string()));
            }
        };

        to_query_response(response).into_incidents()
    }
}

fn to_query_response(response: ureq::Response) -> QueryResponse {
    let status = response.status();
    let content_type = response.content_type().to_string();
    let body = response.into_string().unwrap_or_default();
    QueryResponse::new(status, content_type, body)
}
