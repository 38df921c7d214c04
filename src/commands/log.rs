use serde::Serialize;
use std::path::Path;

use super::{Output, json};
use crate::Result;
use crate::models::AuditEntry;
use crate::storage::Storage;

#[derive(Serialize)]
pub struct LogResult {
    pub entries: Vec<AuditEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filtered_by: Option<String>,
}

impl Output for LogResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.entries.is_empty() {
            return match &self.filtered_by {
                Some(id) => format!("No audit entries for {}.", id),
                None => "No audit entries.".to_string(),
            };
        }
        self.entries
            .iter()
            .map(|e| {
                format!(
                    "{} {:<14} {:<16} {} {}",
                    e.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    e.actor,
                    e.action,
                    e.incident_id.as_deref().unwrap_or("-"),
                    e.details
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Audit trail, oldest first, optionally for one incident.
pub fn log(data_dir: &Path, incident_id: Option<&str>) -> Result<LogResult> {
    let storage = Storage::open(data_dir)?;
    Ok(LogResult {
        entries: storage.audit_entries(incident_id)?,
        filtered_by: incident_id.map(str::to_string),
    })
}
