//! Command implementations for the itsm CLI.
//!
//! Each command opens the data directory, works on an [`ItsmData`] store and
//! returns a result struct that renders as JSON or as human-readable text.
//! Commands are organized by entity type:
//! - `system` - init, status and compaction of the data directory
//! - `incident` - create, list, show and annotate incidents
//! - `directory` - technicians and teams
//! - `bulk` - bulk operations over a list of incidents
//! - `sla` - one-shot SLA scans and the `sla watch` loop
//! - `notification` - the notification list
//! - `log` - the audit trail
//! - `config` - configuration get/set/list
//! - `sync` - exchange with the REST backend

mod bulk;
mod config;
mod directory;
mod incident;
mod log;
mod notification;
mod sla;
mod sync;
mod system;

pub use bulk::{BulkCommandResult, PushReport, bulk_run};
pub use config::{ConfigEntry, ConfigGetResult, ConfigListResult, ConfigSetResult};
pub use config::{config_get, config_list, config_set};
pub use directory::{TeamList, TechnicianList, team_add, team_list, technician_add, technician_list};
pub use incident::{
    IncidentCreated, IncidentList, IncidentNoted, IncidentShow, NewIncident, incident_create,
    incident_list, incident_note, incident_show,
};
pub use log::{LogResult, log};
pub use notification::{
    DismissResult, NotificationList, NotificationRead, notification_dismiss_all,
    notification_list, notification_read,
};
pub use sla::{SlaCheckResult, WatchResult, sla_check, sla_watch, toast};
pub use sync::{SyncPullResult, SyncPushResult, sync_pull, sync_push};
pub use system::{InitResult, StatusResult, system_compact, system_init, system_status};

use serde::Serialize;
use std::path::Path;

use crate::Result;
use crate::storage::Storage;
use crate::store::ItsmData;

/// Command results that can be serialized to JSON or formatted for humans.
pub trait Output {
    /// Serialize to JSON string.
    fn to_json(&self) -> String;

    /// Format for human-readable output.
    fn to_human(&self) -> String;
}

/// Serialize a result, falling back to an error object if serialization fails.
fn json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }).to_string())
}

/// Open storage and load the full store.
fn open_data(data_dir: &Path) -> Result<(Storage, ItsmData)> {
    let storage = Storage::open(data_dir)?;
    let data = storage.load_data()?;
    Ok((storage, data))
}

/// Result of `system compact`.
#[derive(Debug, Default, Serialize)]
pub struct CompactResult {
    /// Incident records left after compaction
    pub incidents_compacted: usize,
    pub original_entries: usize,
    pub final_entries: usize,
    pub space_saved_bytes: usize,
}

impl Output for CompactResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!(
            "Compacted storage: {} -> {} entries ({} incidents), saved {} bytes",
            self.original_entries,
            self.final_entries,
            self.incidents_compacted,
            self.space_saved_bytes
        )
    }
}
