//! SLA deadline scan.
//!
//! [`check_sla_warnings`] walks every open incident that has an SLA target and
//! raises at most one warning and one breach notification per incident:
//!
//! - Past the deadline: an `sla-breached` notification, unless one exists.
//! - Less than the warning threshold of the window left (25% by default): an
//!   `sla-warning`, unless a warning or a breach already exists.
//!
//! The scan only appends notifications. Incidents are never modified.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::models::{Notification, NotificationType};
use crate::store::ItsmData;

/// Default warning threshold, as a fraction of the SLA window.
pub const DEFAULT_WARNING_FRACTION: f64 = 0.25;

/// Thresholds applied by the scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlaPolicy {
    /// Warn once less than this fraction of the window remains
    pub warning_fraction: f64,
}

impl Default for SlaPolicy {
    fn default() -> Self {
        Self {
            warning_fraction: DEFAULT_WARNING_FRACTION,
        }
    }
}

impl SlaPolicy {
    /// Build a policy from a percentage (25 -> 0.25).
    pub fn from_percent(percent: u8) -> Self {
        Self {
            warning_fraction: f64::from(percent) / 100.0,
        }
    }
}

/// Outcome of one scan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    pub scanned_at: DateTime<Utc>,
    /// Open incidents with a usable SLA window
    pub evaluated: usize,
    /// Notifications raised by this scan, in the order they were raised
    pub raised: Vec<Notification>,
}

impl ScanReport {
    pub fn warnings(&self) -> usize {
        self.count(NotificationType::SlaWarning)
    }

    pub fn breaches(&self) -> usize {
        self.count(NotificationType::SlaBreached)
    }

    fn count(&self, kind: NotificationType) -> usize {
        self.raised
            .iter()
            .filter(|n| n.notification_type == kind)
            .count()
    }
}

struct Candidate {
    id: String,
    title: String,
    sla_target: DateTime<Utc>,
    window: Duration,
}

/// Scan every open incident against its SLA target at instant `now`.
pub fn check_sla_warnings(store: &mut ItsmData, now: DateTime<Utc>, policy: &SlaPolicy) -> ScanReport {
    let candidates: Vec<Candidate> = store
        .incidents()
        .iter()
        .filter(|i| i.is_open())
        .filter_map(|i| {
            let sla_target = i.sla_target?;
            let window = sla_target - i.created_at;
            if window <= Duration::zero() {
                debug!(incident = %i.id, "skipping incident with non-positive SLA window");
                return None;
            }
            Some(Candidate {
                id: i.id.clone(),
                title: i.title.clone(),
                sla_target,
                window,
            })
        })
        .collect();

    let mut report = ScanReport {
        scanned_at: now,
        evaluated: candidates.len(),
        raised: Vec::new(),
    };

    for candidate in candidates {
        let link = Notification::incident_link(&candidate.id);
        let remaining = candidate.sla_target - now;

        if remaining < Duration::zero() {
            if !store.has_notification(NotificationType::SlaBreached, &link) {
                let notification = store.push_notification(
                    NotificationType::SlaBreached,
                    format!("SLA breached: {}", candidate.id),
                    format!(
                        "{} ({}) is {} past its SLA target",
                        candidate.id,
                        candidate.title,
                        format_remaining(-remaining)
                    ),
                    Some(link),
                    now,
                );
                info!(incident = %candidate.id, "SLA breached");
                report.raised.push(notification);
            }
            continue;
        }

        let threshold_ms = policy.warning_fraction * candidate.window.num_milliseconds() as f64;
        if (remaining.num_milliseconds() as f64) < threshold_ms
            && !store.has_notification(NotificationType::SlaWarning, &link)
            && !store.has_notification(NotificationType::SlaBreached, &link)
        {
            let notification = store.push_notification(
                NotificationType::SlaWarning,
                format!("SLA warning: {}", candidate.id),
                format!(
                    "{} ({}) has {} remaining",
                    candidate.id,
                    candidate.title,
                    format_remaining(remaining)
                ),
                Some(link),
                now,
            );
            info!(incident = %candidate.id, remaining = %format_remaining(remaining), "SLA warning");
            report.raised.push(notification);
        }
    }

    report
}

/// Format a duration as "2h 15m" or "45m". Negative durations format as "0m".
pub fn format_remaining(remaining: Duration) -> String {
    let minutes = remaining.num_minutes().max(0);
    let hours = minutes / 60;
    if hours > 0 {
        format!("{}h {}m", hours, minutes % 60)
    } else {
        format!("{}m", minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Incident, IncidentStatus, Priority};
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap()
    }

    /// One P1 incident opened at T0 with a 4h window.
    fn store_with_p1() -> ItsmData {
        let mut store = ItsmData::new();
        store
            .insert_incident(Incident::opened_at(
                "INC0001".into(),
                "Core switch down".into(),
                Priority::P1,
                t0(),
            ))
            .unwrap();
        store
    }

    fn at_hours(hours: f64) -> DateTime<Utc> {
        t0() + Duration::milliseconds((hours * 3_600_000.0) as i64)
    }

    fn count(store: &ItsmData, kind: NotificationType) -> usize {
        store
            .notifications()
            .iter()
            .filter(|n| n.notification_type == kind)
            .count()
    }

    #[test]
    fn test_warning_raised_once() {
        let mut store = store_with_p1();
        let policy = SlaPolicy::default();

        let first = check_sla_warnings(&mut store, at_hours(3.1), &policy);
        assert_eq!(first.warnings(), 1);
        assert_eq!(first.evaluated, 1);
        let warning = &store.notifications()[0];
        assert_eq!(warning.link.as_deref(), Some("#/incidents/INC0001"));
        assert!(warning.message.contains("54m remaining"));
        assert!(!warning.read);

        for _ in 0..3 {
            let again = check_sla_warnings(&mut store, at_hours(3.1), &policy);
            assert!(again.raised.is_empty());
        }
        assert_eq!(count(&store, NotificationType::SlaWarning), 1);
    }

    #[test]
    fn test_no_warning_above_threshold() {
        let mut store = store_with_p1();
        let report = check_sla_warnings(&mut store, at_hours(2.9), &SlaPolicy::default());
        assert!(report.raised.is_empty());
        assert!(store.notifications().is_empty());
    }

    #[test]
    fn test_breach_after_warning_and_never_warns_again() {
        let mut store = store_with_p1();
        let policy = SlaPolicy::default();

        check_sla_warnings(&mut store, at_hours(3.5), &policy);
        let report = check_sla_warnings(&mut store, at_hours(4.5), &policy);
        assert_eq!(report.breaches(), 1);

        check_sla_warnings(&mut store, at_hours(5.0), &policy);
        assert_eq!(count(&store, NotificationType::SlaBreached), 1);
        assert_eq!(count(&store, NotificationType::SlaWarning), 1);
        // Newest first
        assert_eq!(
            store.notifications()[0].notification_type,
            NotificationType::SlaBreached
        );
    }

    #[test]
    fn test_breach_suppresses_later_warning() {
        let mut store = store_with_p1();
        let policy = SlaPolicy::default();

        // First scan happens after the deadline: breach only
        check_sla_warnings(&mut store, at_hours(6.0), &policy);
        assert_eq!(count(&store, NotificationType::SlaBreached), 1);

        // Deadline pushed out externally; the incident is back inside the warning band
        store
            .update_incident("INC0001", |i| {
                i.sla_target = Some(at_hours(7.0));
                Ok(())
            })
            .unwrap();
        check_sla_warnings(&mut store, at_hours(6.5), &policy);
        assert_eq!(count(&store, NotificationType::SlaWarning), 0);
    }

    #[test]
    fn test_terminal_incidents_are_ignored() {
        let mut store = store_with_p1();
        store
            .update_incident("INC0001", |i| {
                i.status = IncidentStatus::Resolved;
                Ok(())
            })
            .unwrap();
        let report = check_sla_warnings(&mut store, at_hours(10.0), &SlaPolicy::default());
        assert_eq!(report.evaluated, 0);
        assert!(store.notifications().is_empty());
    }

    #[test]
    fn test_malformed_and_missing_targets_are_skipped() {
        let mut store = store_with_p1();
        let mut inverted = Incident::opened_at("INC0002".into(), "Bad".into(), Priority::P2, t0());
        inverted.sla_target = Some(t0() - Duration::hours(1));
        store.insert_incident(inverted).unwrap();

        let mut untracked = Incident::opened_at("INC0003".into(), "None".into(), Priority::P3, t0());
        untracked.sla_target = None;
        store.insert_incident(untracked).unwrap();

        let report = check_sla_warnings(&mut store, at_hours(10.0), &SlaPolicy::default());
        assert_eq!(report.evaluated, 1);
        assert_eq!(report.breaches(), 1);
        assert!(!store.has_notification(
            NotificationType::SlaBreached,
            &Notification::incident_link("INC0002")
        ));
    }

    #[test]
    fn test_scan_does_not_modify_incidents() {
        let mut store = store_with_p1();
        let before = store.incident("INC0001").unwrap().clone();
        store.take_changes();

        check_sla_warnings(&mut store, at_hours(3.5), &SlaPolicy::default());

        assert_eq!(store.incident("INC0001").unwrap(), &before);
        assert!(
            store
                .take_changes()
                .iter()
                .all(|c| matches!(c, crate::store::StoreChange::NotificationAdded(_)))
        );
    }

    #[test]
    fn test_custom_threshold() {
        let mut store = store_with_p1();
        // 50%: 1.9h left of 4h is inside the band
        let report = check_sla_warnings(&mut store, at_hours(2.1), &SlaPolicy::from_percent(50));
        assert_eq!(report.warnings(), 1);
    }

    #[test]
    fn test_format_remaining() {
        assert_eq!(format_remaining(Duration::minutes(135)), "2h 15m");
        assert_eq!(format_remaining(Duration::minutes(45)), "45m");
        assert_eq!(format_remaining(Duration::hours(3)), "3h 0m");
        assert_eq!(format_remaining(Duration::seconds(30)), "0m");
        assert_eq!(format_remaining(Duration::minutes(-10)), "0m");
    }
}
