//! Client for a json-server style REST backend.
//!
//! Collections are read with `GET /incidents`, `/technicians`, `/teams` and
//! `/notifications`; single incidents are updated with `PATCH /incidents/{id}`
//! or replaced with `PUT /incidents/{id}`. Every mutating call answers with an
//! [`ApiResponse`] instead of an error, so callers can report per-incident
//! outcomes.

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::models::{Incident, IncidentStatus, Notification, Team, Technician};
use crate::store::ItsmData;
use crate::{Error, Result};

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

const USER_AGENT: &str = concat!("itsm/", env!("CARGO_PKG_VERSION"));

/// Outcome of one API call.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self {
                success: true,
                data: Some(data),
                error: None,
            },
            Err(e) => Self {
                success: false,
                data: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Where loaded data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Api,
    Local,
}

/// HTTP client for the REST backend.
pub struct ApiClient {
    base_url: String,
    agent: ureq::Agent,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        debug!(%url, "GET");
        let response = self.agent.get(&url).call().map_err(http_error)?;
        response
            .into_json()
            .map_err(|e| Error::Http(format!("invalid response from {}: {}", url, e)))
    }

    fn send_json<T: DeserializeOwned>(
        &self,
        method: &str,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T> {
        let url = self.url(path);
        debug!(%url, method, "sending");
        let response = self
            .agent
            .request(method, &url)
            .send_json(body)
            .map_err(http_error)?;
        response
            .into_json()
            .map_err(|e| Error::Http(format!("invalid response from {}: {}", url, e)))
    }

    pub fn fetch_incidents(&self) -> ApiResponse<Vec<Incident>> {
        ApiResponse::from_result(self.get_json("incidents"))
    }

    pub fn fetch_technicians(&self) -> ApiResponse<Vec<Technician>> {
        ApiResponse::from_result(self.get_json("technicians"))
    }

    pub fn fetch_teams(&self) -> ApiResponse<Vec<Team>> {
        ApiResponse::from_result(self.get_json("teams"))
    }

    pub fn fetch_notifications(&self) -> ApiResponse<Vec<Notification>> {
        ApiResponse::from_result(self.get_json("notifications"))
    }

    /// Load incidents, technicians and teams. Fails if any of them cannot be fetched.
    ///
    /// Notifications and audit entries are local state and are not pulled.
    pub fn load_data(&self) -> Result<ItsmData> {
        let incidents: Vec<Incident> = self.get_json("incidents")?;
        let technicians: Vec<Technician> = self.get_json("technicians")?;
        let teams: Vec<Team> = self.get_json("teams")?;
        Ok(ItsmData::from_parts(
            incidents,
            technicians,
            teams,
            Vec::new(),
            Vec::new(),
        ))
    }

    /// `PATCH /incidents/{id}` with a new status.
    pub fn update_incident_status(&self, id: &str, status: IncidentStatus) -> ApiResponse<Incident> {
        let body = serde_json::json!({
            "status": status,
            "updatedAt": chrono::Utc::now(),
        });
        ApiResponse::from_result(self.send_json("PATCH", &format!("incidents/{}", id), body))
    }

    /// `PATCH /incidents/{id}` with the incident's status and resolution fields.
    pub fn resolve_incident(&self, incident: &Incident) -> ApiResponse<Incident> {
        let body = serde_json::json!({
            "status": incident.status,
            "resolvedAt": incident.resolved_at,
            "resolutionCode": incident.resolution_code,
            "resolutionNotes": incident.resolution_notes,
            "updatedAt": incident.updated_at,
        });
        ApiResponse::from_result(
            self.send_json("PATCH", &format!("incidents/{}", incident.id), body),
        )
    }

    /// `PATCH /incidents/{id}` with a new team and technician.
    pub fn assign_incident(
        &self,
        id: &str,
        team: &str,
        technician: Option<&str>,
    ) -> ApiResponse<Incident> {
        let body = serde_json::json!({
            "assignedTo": team,
            "assignee": technician,
            "updatedAt": chrono::Utc::now(),
        });
        ApiResponse::from_result(self.send_json("PATCH", &format!("incidents/{}", id), body))
    }

    /// `PUT /incidents/{id}` with the full record.
    pub fn push_incident(&self, incident: &Incident) -> ApiResponse<Incident> {
        let result = serde_json::to_value(incident)
            .map_err(Error::from)
            .and_then(|body| self.send_json("PUT", &format!("incidents/{}", incident.id), body));
        ApiResponse::from_result(result)
    }
}

fn http_error(e: ureq::Error) -> Error {
    match e {
        ureq::Error::Status(code, resp) => {
            let body = resp.into_string().unwrap_or_default();
            Error::Http(format!("HTTP {}: {}", code, body.trim()))
        }
        e => Error::Http(e.to_string()),
    }
}

/// Load from the API when a client is given, falling back to `fallback` on failure.
pub fn load_with_fallback<F>(client: Option<&ApiClient>, fallback: F) -> Result<(ItsmData, DataSource)>
where
    F: FnOnce() -> Result<ItsmData>,
{
    if let Some(client) = client {
        match client.load_data() {
            Ok(data) => return Ok((data, DataSource::Api)),
            Err(e) => {
                warn!(url = client.base_url(), error = %e, "API unavailable, using local data");
            }
        }
    }
    Ok((fallback()?, DataSource::Local))
}
