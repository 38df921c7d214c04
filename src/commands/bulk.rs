use serde::Serialize;
use std::path::Path;
use tracing::warn;

use super::{Output, json, open_data};
use crate::api::{ApiClient, ApiResponse};
use crate::bulk::{BulkAction, BulkFailure, BulkOutcome, BulkProcessor, BulkProgress, BulkRejection, BulkSummary};
use crate::config::ResolvedConfig;
use crate::models::Incident;
use crate::store::ItsmData;
use crate::{Error, Result};

/// Outcome of mirroring a batch to the REST backend.
#[derive(Debug, Serialize)]
pub struct PushReport {
    pub url: String,
    pub pushed: usize,
    pub failures: Vec<BulkFailure>,
}

#[derive(Debug, Serialize)]
pub struct BulkCommandResult {
    #[serde(flatten)]
    pub summary: BulkSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push: Option<PushReport>,
}

impl Output for BulkCommandResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let s = &self.summary;
        let mut lines = vec![format!(
            "Bulk {}: {} succeeded, {} failed ({} total)",
            s.action, s.succeeded, s.failed, s.total
        )];
        for failure in &s.failures {
            lines.push(format!("  {}: {}", failure.incident_id, failure.reason));
        }
        if let Some(push) = &self.push {
            lines.push(format!(
                "Pushed {} of {} to {}",
                push.pushed,
                s.succeeded,
                push.url
            ));
            for failure in &push.failures {
                lines.push(format!("  {}: {}", failure.incident_id, failure.reason));
            }
        }
        lines.join("\n")
    }
}

/// Select `ids`, apply `action` and persist the result.
///
/// `progress` runs after every item. With `push`, each incident that was
/// updated locally is then sent to the REST backend; push failures are
/// reported separately and never change the local summary.
pub fn bulk_run<F>(
    data_dir: &Path,
    config: &ResolvedConfig,
    ids: &[String],
    action: BulkAction,
    push: bool,
    progress: F,
) -> Result<BulkCommandResult>
where
    F: FnMut(&BulkProgress<'_>),
{
    let client = if push {
        let url = config.api_url().ok_or_else(|| {
            Error::Config("--push needs an API URL (--api-url, ITSM_API_URL or api-url config)".into())
        })?;
        Some(ApiClient::new(url))
    } else {
        None
    };

    let (mut storage, mut data) = open_data(data_dir)?;
    let processor = BulkProcessor::new(config.actor()).with_item_delay(config.bulk_item_delay());
    processor.select_all(ids);
    let selected = processor.selection();

    let summary = match processor.execute(&mut data, &action, progress) {
        BulkOutcome::Completed(summary) => summary,
        BulkOutcome::Rejected(BulkRejection::AlreadyRunning) => return Err(Error::AlreadyRunning),
        BulkOutcome::Rejected(rejection) => {
            return Err(Error::InvalidInput(rejection.to_string()));
        }
    };
    storage.persist(&mut data)?;

    let push = client.map(|client| {
        let updated = selected
            .iter()
            .filter(|id| !summary.failures.iter().any(|f| &f.incident_id == *id));
        push_updates(&client, &data, &action, updated)
    });

    Ok(BulkCommandResult { summary, push })
}

fn push_updates<'a>(
    client: &ApiClient,
    data: &ItsmData,
    action: &BulkAction,
    ids: impl Iterator<Item = &'a String>,
) -> PushReport {
    let mut report = PushReport {
        url: client.base_url().to_string(),
        pushed: 0,
        failures: Vec::new(),
    };
    for id in ids {
        let Some(incident) = data.incident(id) else {
            continue;
        };
        let response: ApiResponse<Incident> = match action {
            BulkAction::Close { .. } => client.resolve_incident(incident),
            BulkAction::Assign { .. } => client.assign_incident(
                id,
                incident.assigned_to.as_deref().unwrap_or_default(),
                incident.assignee.as_deref(),
            ),
            BulkAction::Priority { .. } | BulkAction::Note { .. } => client.push_incident(incident),
        };
        if response.success {
            report.pushed += 1;
        } else {
            let reason = response.error.unwrap_or_else(|| "unknown error".to_string());
            warn!(incident = %id, error = %reason, "push to API failed");
            report.failures.push(BulkFailure {
                incident_id: id.clone(),
                reason,
            });
        }
    }
    report
}
