use serde::Serialize;
use std::path::Path;

use super::{CompactResult, Output, json};
use crate::Result;
use crate::models::IncidentStatus;
use crate::storage::Storage;

#[derive(Serialize)]
pub struct InitResult {
    pub initialized: bool,
    pub data_dir: String,
}

impl Output for InitResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.initialized {
            format!("Initialized itsm data directory at {}", self.data_dir)
        } else {
            format!("Already initialized at {}", self.data_dir)
        }
    }
}

/// Initialize the data directory. Running it again leaves existing data alone.
pub fn system_init(data_dir: &Path) -> Result<InitResult> {
    let already = Storage::exists(data_dir);
    let mut storage = Storage::init(data_dir)?;
    if already {
        storage.rebuild_cache()?;
    }
    Ok(InitResult {
        initialized: !already,
        data_dir: data_dir.display().to_string(),
    })
}

#[derive(Serialize)]
pub struct StatusResult {
    pub version: &'static str,
    pub commit: &'static str,
    pub built_at: &'static str,
    pub data_dir: String,
    pub total: usize,
    pub open: usize,
    /// Count per status key, in workflow order; zero counts are left out
    pub by_status: Vec<StatusCount>,
    pub unread_notifications: usize,
    pub technicians: usize,
    pub teams: usize,
}

#[derive(Serialize)]
pub struct StatusCount {
    pub status: String,
    pub count: usize,
}

impl Output for StatusResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let mut lines = vec![
            format!("itsm {} ({}, built {})", self.version, self.commit, self.built_at),
            format!("Data directory: {}", self.data_dir),
            format!("Incidents: {} ({} open)", self.total, self.open),
        ];
        for count in &self.by_status {
            lines.push(format!("  {:<12} {}", count.status, count.count));
        }
        lines.push(format!("Technicians: {}", self.technicians));
        lines.push(format!("Teams: {}", self.teams));
        lines.push(format!("Unread notifications: {}", self.unread_notifications));
        lines.join("\n")
    }
}

pub fn system_status(data_dir: &Path) -> Result<StatusResult> {
    let storage = Storage::open(data_dir)?;
    let counts = storage.count_by_status()?;
    let data = storage.load_data()?;

    let mut by_status = Vec::new();
    let mut open = 0;
    for status in IncidentStatus::all() {
        let count = counts
            .iter()
            .find(|(key, _)| key == status.as_key())
            .map(|(_, n)| *n)
            .unwrap_or(0);
        if count == 0 {
            continue;
        }
        if !status.is_terminal() {
            open += count;
        }
        by_status.push(StatusCount {
            status: status.to_string(),
            count,
        });
    }

    Ok(StatusResult {
        version: env!("CARGO_PKG_VERSION"),
        commit: env!("ITSM_GIT_COMMIT"),
        built_at: env!("ITSM_BUILD_TIMESTAMP"),
        data_dir: data_dir.display().to_string(),
        total: by_status.iter().map(|c| c.count).sum(),
        open,
        by_status,
        unread_notifications: storage.unread_notifications()?,
        technicians: data.technicians().len(),
        teams: data.teams().len(),
    })
}

pub fn system_compact(data_dir: &Path) -> Result<CompactResult> {
    let mut storage = Storage::open(data_dir)?;
    storage.compact()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestEnv;

    #[test]
    fn test_init_is_idempotent() {
        let env = TestEnv::new();
        let first = system_init(env.data_path()).unwrap();
        assert!(first.initialized);
        let second = system_init(env.data_path()).unwrap();
        assert!(!second.initialized);
    }

    #[test]
    fn test_status_requires_init() {
        let env = TestEnv::new();
        assert!(matches!(
            system_status(env.data_path()),
            Err(crate::Error::NotInitialized)
        ));
    }
}
