use serde::Serialize;
use std::path::Path;
use tracing::warn;

use super::{Output, json, open_data};
use crate::api::{ApiClient, DataSource, load_with_fallback};
use crate::bulk::BulkFailure;
use crate::config::ResolvedConfig;
use crate::{Error, Result};

fn client(config: &ResolvedConfig, url: Option<&str>) -> Result<ApiClient> {
    let url = url.or(config.api_url()).ok_or_else(|| {
        Error::Config("no API URL (use --url, --api-url, ITSM_API_URL or api-url config)".into())
    })?;
    Ok(ApiClient::new(url))
}

#[derive(Serialize)]
pub struct SyncPullResult {
    pub url: String,
    /// `local` when the backend could not be reached and nothing changed
    pub source: DataSource,
    pub incidents: usize,
    pub technicians: usize,
    pub teams: usize,
    pub written: usize,
}

impl Output for SyncPullResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        match self.source {
            DataSource::Api => format!(
                "Pulled {} incident(s), {} technician(s), {} team(s) from {}",
                self.incidents, self.technicians, self.teams, self.url
            ),
            DataSource::Local => format!(
                "{} is unavailable; kept local data ({} incident(s))",
                self.url, self.incidents
            ),
        }
    }
}

/// Replace incidents, technicians and teams with the backend's copy.
///
/// Notifications and the audit trail stay local. When the backend cannot be
/// reached the local data is left untouched.
pub fn sync_pull(data_dir: &Path, config: &ResolvedConfig, url: Option<&str>) -> Result<SyncPullResult> {
    let client = client(config, url)?;
    let (mut storage, mut data) = open_data(data_dir)?;

    let (pulled, source) = load_with_fallback(Some(&client), || Ok(Default::default()))?;
    let mut result = SyncPullResult {
        url: client.base_url().to_string(),
        source,
        incidents: data.incidents().len(),
        technicians: data.technicians().len(),
        teams: data.teams().len(),
        written: 0,
    };
    if source == DataSource::Local {
        return Ok(result);
    }

    result.incidents = pulled.incidents().len();
    result.technicians = pulled.technicians().len();
    result.teams = pulled.teams().len();

    data.replace_reference_data(pulled);
    data.record_audit(
        config.actor(),
        "sync.pull",
        None,
        serde_json::json!({
            "url": result.url,
            "incidents": result.incidents,
            "technicians": result.technicians,
            "teams": result.teams,
        }),
        chrono::Utc::now(),
    );
    result.written = storage.persist(&mut data)?;
    Ok(result)
}

#[derive(Serialize)]
pub struct SyncPushResult {
    pub url: String,
    pub pushed: usize,
    pub failures: Vec<BulkFailure>,
}

impl Output for SyncPushResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let mut lines = vec![format!("Pushed {} incident(s) to {}", self.pushed, self.url)];
        for failure in &self.failures {
            lines.push(format!("  {}: {}", failure.incident_id, failure.reason));
        }
        lines.join("\n")
    }
}

/// Send full incident records to the backend. An empty `ids` pushes every incident.
pub fn sync_push(
    data_dir: &Path,
    config: &ResolvedConfig,
    url: Option<&str>,
    ids: &[String],
) -> Result<SyncPushResult> {
    let client = client(config, url)?;
    let (_, data) = open_data(data_dir)?;

    let targets: Vec<String> = if ids.is_empty() {
        data.incidents().iter().map(|i| i.id.clone()).collect()
    } else {
        ids.to_vec()
    };

    let mut result = SyncPushResult {
        url: client.base_url().to_string(),
        pushed: 0,
        failures: Vec::new(),
    };
    for id in targets {
        let Some(incident) = data.incident(&id) else {
            result.failures.push(BulkFailure {
                reason: format!("Incident not found: {}", id),
                incident_id: id,
            });
            continue;
        };
        let response = client.push_incident(incident);
        if response.success {
            result.pushed += 1;
        } else {
            let reason = response.error.unwrap_or_else(|| "unknown error".to_string());
            warn!(incident = %id, error = %reason, "push to API failed");
            result.failures.push(BulkFailure {
                incident_id: id,
                reason,
            });
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Resolved, ValueSource};
    use crate::test_utils::{TestEnv, serve};
    use std::net::TcpListener;

    fn unreachable_url() -> String {
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        format!("http://127.0.0.1:{}", port)
    }

    #[test]
    fn test_pull_requires_url() {
        let env = TestEnv::new();
        env.init_storage();
        assert!(matches!(
            sync_pull(env.data_path(), &ResolvedConfig::default(), None),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_pull_keeps_local_data_when_unreachable() {
        let env = TestEnv::new();
        env.init_storage();
        crate::commands::team_add(env.data_path(), "admin", "Network", None).unwrap();

        let mut config = ResolvedConfig::default();
        config.api_url = Some(Resolved::new(unreachable_url(), ValueSource::CliFlag));
        let result = sync_pull(env.data_path(), &config, None).unwrap();

        assert_eq!(result.source, DataSource::Local);
        assert_eq!(result.teams, 1);
        assert_eq!(result.written, 0);
        assert_eq!(crate::commands::team_list(env.data_path()).unwrap().count, 1);
    }

    #[test]
    fn test_pull_replaces_reference_data_on_disk() {
        let env = TestEnv::new();
        env.init_storage();
        crate::commands::team_add(env.data_path(), "admin", "Legacy", None).unwrap();
        crate::commands::incident_create(
            env.data_path(),
            "alice",
            crate::commands::NewIncident {
                title: "Local only".into(),
                ..Default::default()
            },
        )
        .unwrap();

        // No /notifications route: the pull only needs the three collections
        let (url, server) = serve(vec![
            (
                200,
                r#"[{"id":"INC0100","title":"VPN down","status":"New","priority":"P2","createdAt":"2026-03-02T08:00:00Z","updatedAt":"2026-03-02T08:00:00Z"}]"#.to_string(),
            ),
            (200, "[]".to_string()),
            (200, r#"[{"id":"team-1","name":"Network"}]"#.to_string()),
        ]);
        let result = sync_pull(env.data_path(), &ResolvedConfig::default(), Some(&url)).unwrap();
        assert_eq!(result.source, DataSource::Api);
        assert_eq!(result.incidents, 1);
        assert_eq!(server.join().unwrap().len(), 3);

        let list = crate::commands::incident_list(env.data_path(), None, None, None).unwrap();
        let ids: Vec<&str> = list.incidents.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["INC0100"]);
        let teams = crate::commands::team_list(env.data_path()).unwrap();
        assert_eq!(teams.count, 1);
        assert_eq!(teams.teams[0].name, "Network");

        // The audit trail stays local and records the pull
        let log = crate::commands::log(env.data_path(), None).unwrap();
        assert!(log.entries.iter().any(|e| e.action == "sync.pull"));
        assert!(log.entries.iter().any(|e| e.action == "incident.create"));
    }

    #[test]
    fn test_push_reports_missing_and_unreachable() {
        let env = TestEnv::new();
        env.init_storage();
        crate::commands::incident_create(
            env.data_path(),
            "alice",
            crate::commands::NewIncident {
                title: "VPN".into(),
                ..Default::default()
            },
        )
        .unwrap();

        let url = unreachable_url();
        let result = sync_push(
            env.data_path(),
            &ResolvedConfig::default(),
            Some(&url),
            &["INC0001".to_string(), "INC0404".to_string()],
        )
        .unwrap();
        assert_eq!(result.pushed, 0);
        assert_eq!(result.failures.len(), 2);
        assert!(result.failures[1].reason.contains("not found"));
    }
}
