use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

use super::{Output, json, open_data};
use crate::config::ResolvedConfig;
use crate::models::{Notification, NotificationType};
use crate::scheduler::SlaMonitor;
use crate::sla::{ScanReport, SlaPolicy, check_sla_warnings};
use crate::store;
use crate::{Error, Result};

fn policy(config: &ResolvedConfig) -> SlaPolicy {
    SlaPolicy {
        warning_fraction: config.sla_warning_fraction(),
    }
}

/// Render one raised notification the way a toast would show it.
pub fn toast(notification: &Notification) -> String {
    let marker = match notification.notification_type {
        NotificationType::SlaBreached => "!!",
        _ => "!",
    };
    format!("{} {}: {}", marker, notification.title, notification.message)
}

#[derive(Serialize)]
pub struct SlaCheckResult {
    #[serde(flatten)]
    pub report: ScanReport,
    pub warnings: usize,
    pub breaches: usize,
}

impl Output for SlaCheckResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let mut lines = vec![format!(
            "Checked {} open incident(s): {} warning(s), {} breach(es)",
            self.report.evaluated, self.warnings, self.breaches
        )];
        lines.extend(self.report.raised.iter().map(|n| format!("  {}", toast(n))));
        lines.join("\n")
    }
}

/// Run one SLA scan at `at` (default: now) and persist any notifications.
pub fn sla_check(
    data_dir: &Path,
    config: &ResolvedConfig,
    at: Option<DateTime<Utc>>,
) -> Result<SlaCheckResult> {
    let (mut storage, mut data) = open_data(data_dir)?;
    let report = check_sla_warnings(&mut data, at.unwrap_or_else(Utc::now), &policy(config));
    storage.persist(&mut data)?;
    Ok(SlaCheckResult {
        warnings: report.warnings(),
        breaches: report.breaches(),
        report,
    })
}

#[derive(Serialize)]
pub struct WatchResult {
    pub scans: u64,
    pub warnings: usize,
    pub breaches: usize,
    pub interval_secs: u64,
}

impl Output for WatchResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!(
            "Stopped after {} scan(s): {} warning(s), {} breach(es)",
            self.scans, self.warnings, self.breaches
        )
    }
}

/// Scan on a timer until Ctrl-C or until `max_scans` scans have run.
///
/// The store is reloaded from disk before every scan so incidents changed by
/// other `itsm` processes are seen. Every scan is persisted before `on_report`
/// sees it.
pub fn sla_watch<F>(
    data_dir: &Path,
    config: &ResolvedConfig,
    max_scans: Option<u64>,
    mut on_report: F,
) -> Result<WatchResult>
where
    F: FnMut(&ScanReport),
{
    let interval: Duration = config.sla_scan_interval();
    if interval.is_zero() {
        return Err(Error::InvalidInput("scan interval must be positive".into()));
    }

    let (storage, data) = open_data(data_dir)?;
    let shared = data.into_shared();
    let storage = Arc::new(Mutex::new(storage));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let (tx, mut rx) = mpsc::unbounded_channel::<ScanReport>();
        let mut monitor = SlaMonitor::new(shared.clone(), policy(config));

        let reload_storage = Arc::clone(&storage);
        monitor.before_scan(move |data| {
            let mut storage = reload_storage.lock().unwrap_or_else(PoisonError::into_inner);
            // Flush first so a failed persist is retried, not lost
            storage.persist(data)?;
            *data = storage.load_data()?;
            Ok(())
        });

        let persist_store = shared.clone();
        monitor.on_scan(move |report| {
            {
                let mut data = store::lock(&persist_store);
                let mut storage = storage.lock().unwrap_or_else(PoisonError::into_inner);
                storage.persist(&mut data)?;
            }
            tx.send(report.clone())
                .map_err(|_| Error::Other("SLA watch receiver closed".into()))
        });

        monitor.start(interval)?;
        info!(interval_secs = interval.as_secs(), "watching SLA deadlines");

        let mut result = WatchResult {
            scans: 0,
            warnings: 0,
            breaches: 0,
            interval_secs: interval.as_secs(),
        };

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                Some(report) = rx.recv() => {
                    result.scans += 1;
                    result.warnings += report.warnings();
                    result.breaches += report.breaches();
                    on_report(&report);
                    if max_scans.is_some_and(|max| result.scans >= max) {
                        break;
                    }
                }
                _ = &mut ctrl_c => {
                    info!("interrupted");
                    break;
                }
            }
        }

        monitor.stop();
        Ok::<_, Error>(result)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{NewIncident, incident_create, notification_list};
    use crate::config::{Resolved, ValueSource};
    use crate::models::{IncidentStatus, Priority};
    use crate::storage::Storage;
    use crate::test_utils::TestEnv;

    fn seed_p1(env: &TestEnv) {
        env.init_storage();
        incident_create(
            env.data_path(),
            "alice",
            NewIncident {
                title: "Core switch down".into(),
                priority: Priority::P1,
                ..Default::default()
            },
        )
        .unwrap();
    }

    #[test]
    fn test_check_persists_warning_once() {
        let env = TestEnv::new();
        seed_p1(&env);
        let at = Utc::now() + chrono::Duration::minutes(186);

        let first = sla_check(env.data_path(), &ResolvedConfig::default(), Some(at)).unwrap();
        assert_eq!(first.warnings, 1);
        assert_eq!(first.breaches, 0);

        let second = sla_check(env.data_path(), &ResolvedConfig::default(), Some(at)).unwrap();
        assert!(second.report.raised.is_empty());

        let list = notification_list(env.data_path(), false, None).unwrap();
        assert_eq!(list.notifications.len(), 1);
        assert_eq!(list.unread, 1);
    }

    #[test]
    fn test_check_breach_after_deadline() {
        let env = TestEnv::new();
        seed_p1(&env);
        let at = Utc::now() + chrono::Duration::hours(5);

        let result = sla_check(env.data_path(), &ResolvedConfig::default(), Some(at)).unwrap();
        assert_eq!(result.breaches, 1);
        assert!(toast(&result.report.raised[0]).starts_with("!! SLA breached: INC0001"));
    }

    #[test]
    fn test_watch_sees_incidents_created_between_scans() {
        let env = TestEnv::new();
        seed_p1(&env);
        let mut config = ResolvedConfig::default();
        config.sla_scan_interval = Resolved::new(1, ValueSource::CliFlag);
        let mut evaluated = Vec::new();

        sla_watch(env.data_path(), &config, Some(2), |report| {
            evaluated.push(report.evaluated);
            if evaluated.len() == 1 {
                incident_create(
                    env.data_path(),
                    "bob",
                    NewIncident {
                        title: "Mail queue stuck".into(),
                        priority: Priority::P2,
                        ..Default::default()
                    },
                )
                .unwrap();
            }
        })
        .unwrap();

        assert_eq!(evaluated, vec![1, 2]);
    }

    #[test]
    fn test_watch_drops_incidents_closed_elsewhere() {
        let env = TestEnv::new();
        seed_p1(&env);
        let mut config = ResolvedConfig::default();
        config.sla_scan_interval = Resolved::new(1, ValueSource::CliFlag);
        let mut evaluated = Vec::new();

        sla_watch(env.data_path(), &config, Some(2), |report| {
            evaluated.push(report.evaluated);
            if evaluated.len() == 1 {
                let mut storage = Storage::open(env.data_path()).unwrap();
                let mut data = storage.load_data().unwrap();
                data.update_incident("INC0001", |incident| {
                    incident.status = IncidentStatus::Closed;
                    Ok(())
                })
                .unwrap();
                storage.persist(&mut data).unwrap();
            }
        })
        .unwrap();

        assert_eq!(evaluated, vec![1, 0]);
    }

    #[test]
    fn test_watch_stops_after_max_scans() {
        let env = TestEnv::new();
        seed_p1(&env);
        let mut reports = 0;

        let result = sla_watch(env.data_path(), &ResolvedConfig::default(), Some(1), |_| {
            reports += 1;
        })
        .unwrap();

        assert_eq!(result.scans, 1);
        assert_eq!(reports, 1);
        assert_eq!(result.interval_secs, 60);
    }
}
