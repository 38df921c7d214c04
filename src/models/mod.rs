//! Data models for service-desk entities.
//!
//! This module defines the core data structures:
//! - `Incident` - Tickets with status, priority, assignment, notes and an SLA deadline
//! - `Note` - Append-only journal entries embedded in an incident
//! - `Notification` - Bell-icon entries (SLA warnings, assignments, approvals)
//! - `Technician` / `Team` - Assignment targets
//! - `AuditEntry` - Record of every mutation applied by the console
//!
//! Incidents, technicians and teams serialize in camelCase because that is the
//! wire shape of the REST backend they are exchanged with.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Incident status in the service-desk workflow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IncidentStatus {
    #[default]
    New,
    Assigned,
    #[serde(rename = "In Progress")]
    InProgress,
    Pending,
    Resolved,
    Closed,
    Cancelled,
}

impl IncidentStatus {
    /// Returns true for statuses that end the incident lifecycle.
    ///
    /// Terminal incidents are ignored by the SLA scan.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            IncidentStatus::Resolved | IncidentStatus::Closed | IncidentStatus::Cancelled
        )
    }

    /// Get all statuses.
    pub fn all() -> &'static [IncidentStatus] {
        &[
            IncidentStatus::New,
            IncidentStatus::Assigned,
            IncidentStatus::InProgress,
            IncidentStatus::Pending,
            IncidentStatus::Resolved,
            IncidentStatus::Closed,
            IncidentStatus::Cancelled,
        ]
    }

    /// Key used in the SQLite cache.
    pub fn as_key(&self) -> &'static str {
        match self {
            IncidentStatus::New => "new",
            IncidentStatus::Assigned => "assigned",
            IncidentStatus::InProgress => "in_progress",
            IncidentStatus::Pending => "pending",
            IncidentStatus::Resolved => "resolved",
            IncidentStatus::Closed => "closed",
            IncidentStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IncidentStatus::New => "New",
            IncidentStatus::Assigned => "Assigned",
            IncidentStatus::InProgress => "In Progress",
            IncidentStatus::Pending => "Pending",
            IncidentStatus::Resolved => "Resolved",
            IncidentStatus::Closed => "Closed",
            IncidentStatus::Cancelled => "Cancelled",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for IncidentStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', ' '], "_").as_str() {
            "new" => Ok(IncidentStatus::New),
            "assigned" => Ok(IncidentStatus::Assigned),
            "in_progress" | "inprogress" => Ok(IncidentStatus::InProgress),
            "pending" => Ok(IncidentStatus::Pending),
            "resolved" => Ok(IncidentStatus::Resolved),
            "closed" => Ok(IncidentStatus::Closed),
            "cancelled" | "canceled" => Ok(IncidentStatus::Cancelled),
            _ => Err(format!("Unknown incident status: {}", s)),
        }
    }
}

/// Incident priority, P1 being the most urgent.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Priority {
    P1,
    P2,
    #[default]
    P3,
    P4,
}

impl Priority {
    /// Default resolution window used when an incident is opened without an
    /// explicit SLA.
    pub fn default_resolution_window(&self) -> Duration {
        match self {
            Priority::P1 => Duration::hours(4),
            Priority::P2 => Duration::hours(8),
            Priority::P3 => Duration::hours(24),
            Priority::P4 => Duration::hours(72),
        }
    }

    /// Human label for the priority.
    pub fn label(&self) -> &'static str {
        match self {
            Priority::P1 => "Critical",
            Priority::P2 => "High",
            Priority::P3 => "Medium",
            Priority::P4 => "Low",
        }
    }

    /// Numeric rank (1-4) used in the SQLite cache.
    pub fn rank(&self) -> u8 {
        match self {
            Priority::P1 => 1,
            Priority::P2 => 2,
            Priority::P3 => 3,
            Priority::P4 => 4,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.rank())
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "p1" | "1" | "critical" => Ok(Priority::P1),
            "p2" | "2" | "high" => Ok(Priority::P2),
            "p3" | "3" | "medium" => Ok(Priority::P3),
            "p4" | "4" | "low" => Ok(Priority::P4),
            _ => Err(format!("Invalid priority: {} (expected P1-P4)", s)),
        }
    }
}

/// Kind of journal entry on an incident.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NoteType {
    #[default]
    WorkNote,
    Assignment,
    PriorityChange,
    Resolution,
}

impl fmt::Display for NoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NoteType::WorkNote => "work-note",
            NoteType::Assignment => "assignment",
            NoteType::PriorityChange => "priority-change",
            NoteType::Resolution => "resolution",
        };
        write!(f, "{}", s)
    }
}

/// A journal entry embedded in an incident. Notes are append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    #[serde(rename = "type", default)]
    pub note_type: NoteType,
    pub author: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// A service-desk ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    /// Incident number (e.g., "INC0001")
    pub id: String,

    /// Short description
    pub title: String,

    /// Detailed description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Service category (e.g., "Network", "Email")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// Person who reported the incident
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller: Option<String>,

    #[serde(default)]
    pub status: IncidentStatus,

    #[serde(default)]
    pub priority: Priority,

    /// Assignment group (team name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,

    /// Individual technician working the incident
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,

    /// Journal, oldest first
    #[serde(default)]
    pub notes: Vec<Note>,

    /// Absolute resolution deadline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sla_target: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_code: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_notes: Option<String>,
}

impl Incident {
    /// Create a new incident opened now, with the priority's default SLA window.
    pub fn new(id: String, title: String, priority: Priority) -> Self {
        Self::opened_at(id, title, priority, Utc::now())
    }

    /// Create a new incident opened at the given instant.
    pub fn opened_at(id: String, title: String, priority: Priority, at: DateTime<Utc>) -> Self {
        Self {
            id,
            title,
            description: None,
            category: None,
            caller: None,
            status: IncidentStatus::New,
            priority,
            assigned_to: None,
            assignee: None,
            notes: Vec::new(),
            sla_target: Some(at + priority.default_resolution_window()),
            created_at: at,
            updated_at: at,
            resolved_at: None,
            resolution_code: None,
            resolution_notes: None,
        }
    }

    /// Returns true while the incident still counts against its SLA.
    pub fn is_open(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Append a journal entry and bump `updated_at`.
    pub fn append_note(
        &mut self,
        note_type: NoteType,
        author: &str,
        content: impl Into<String>,
        at: DateTime<Utc>,
    ) {
        self.notes.push(Note {
            note_type,
            author: author.to_string(),
            content: content.into(),
            timestamp: at,
        });
        self.updated_at = at;
    }
}

/// Category of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationType {
    SlaWarning,
    SlaBreached,
    Assignment,
    CabApproval,
    ChangeScheduled,
    Escalation,
}

impl NotificationType {
    /// Get all notification types.
    pub fn all() -> &'static [NotificationType] {
        &[
            NotificationType::SlaWarning,
            NotificationType::SlaBreached,
            NotificationType::Assignment,
            NotificationType::CabApproval,
            NotificationType::ChangeScheduled,
            NotificationType::Escalation,
        ]
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NotificationType::SlaWarning => "sla-warning",
            NotificationType::SlaBreached => "sla-breached",
            NotificationType::Assignment => "assignment",
            NotificationType::CabApproval => "cab-approval",
            NotificationType::ChangeScheduled => "change-scheduled",
            NotificationType::Escalation => "escalation",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for NotificationType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "sla-warning" => Ok(NotificationType::SlaWarning),
            "sla-breached" => Ok(NotificationType::SlaBreached),
            "assignment" => Ok(NotificationType::Assignment),
            "cab-approval" => Ok(NotificationType::CabApproval),
            "change-scheduled" => Ok(NotificationType::ChangeScheduled),
            "escalation" => Ok(NotificationType::Escalation),
            _ => Err(format!("Unknown notification type: {}", s)),
        }
    }
}

/// An entry in the notification list (newest first).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Unique identifier (e.g., "ntf-1a2b3c")
    pub id: String,

    #[serde(rename = "type")]
    pub notification_type: NotificationType,

    pub title: String,

    pub message: String,

    /// Console route the notification points at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,

    pub timestamp: DateTime<Utc>,

    #[serde(default)]
    pub read: bool,
}

impl Notification {
    /// Console route for an incident; SLA notifications are deduplicated on it.
    pub fn incident_link(incident_id: &str) -> String {
        format!("#/incidents/{}", incident_id)
    }
}

/// A member of the service desk who can be assigned incidents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Technician {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Team name this technician belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
}

/// An assignment group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A record of one mutation applied by the console.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    /// Unique identifier (e.g., "aud-1a2b3c")
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    /// Action name (e.g., "bulk.close", "incident.create")
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incident_id: Option<String>,
    #[serde(default)]
    pub details: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_incident_status_serialization() {
        let json = serde_json::to_string(&IncidentStatus::InProgress).unwrap();
        assert_eq!(json, r#""In Progress""#);

        let status: IncidentStatus = serde_json::from_str(r#""Closed""#).unwrap();
        assert_eq!(status, IncidentStatus::Closed);
    }

    #[test]
    fn test_incident_status_from_str() {
        assert_eq!(
            "in-progress".parse::<IncidentStatus>().unwrap(),
            IncidentStatus::InProgress
        );
        assert_eq!(
            "In Progress".parse::<IncidentStatus>().unwrap(),
            IncidentStatus::InProgress
        );
        assert_eq!(
            "canceled".parse::<IncidentStatus>().unwrap(),
            IncidentStatus::Cancelled
        );
        assert!("bogus".parse::<IncidentStatus>().is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        let terminal: Vec<_> = IncidentStatus::all()
            .iter()
            .filter(|s| s.is_terminal())
            .collect();
        assert_eq!(
            terminal,
            vec![
                &IncidentStatus::Resolved,
                &IncidentStatus::Closed,
                &IncidentStatus::Cancelled
            ]
        );
    }

    #[test]
    fn test_priority_parse_and_order() {
        assert_eq!("P1".parse::<Priority>().unwrap(), Priority::P1);
        assert_eq!("2".parse::<Priority>().unwrap(), Priority::P2);
        assert_eq!("low".parse::<Priority>().unwrap(), Priority::P4);
        assert!("P5".parse::<Priority>().is_err());
        assert!(Priority::P1 < Priority::P4);
        assert_eq!(Priority::P2.to_string(), "P2");
    }

    #[test]
    fn test_new_incident_gets_default_sla() {
        let opened = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let incident =
            Incident::opened_at("INC0001".into(), "VPN down".into(), Priority::P1, opened);
        assert_eq!(incident.sla_target, Some(opened + Duration::hours(4)));
        assert_eq!(incident.status, IncidentStatus::New);
        assert!(incident.is_open());
    }

    #[test]
    fn test_incident_wire_shape_is_camel_case() {
        let incident = Incident::new("INC0001".into(), "Printer jam".into(), Priority::P3);
        let value = serde_json::to_value(&incident).unwrap();
        assert!(value.get("slaTarget").is_some());
        assert!(value.get("createdAt").is_some());
        assert!(value.get("resolvedAt").is_none());
    }

    #[test]
    fn test_incident_defaults_from_minimal_json() {
        let json = r#"{"id":"INC0042","title":"Email","createdAt":"2026-01-01T00:00:00Z","updatedAt":"2026-01-01T00:00:00Z"}"#;
        let incident: Incident = serde_json::from_str(json).unwrap();
        assert_eq!(incident.priority, Priority::P3);
        assert_eq!(incident.status, IncidentStatus::New);
        assert!(incident.notes.is_empty());
        assert!(incident.sla_target.is_none());
    }

    #[test]
    fn test_append_note_bumps_updated_at() {
        let opened = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let later = opened + Duration::minutes(5);
        let mut incident =
            Incident::opened_at("INC0001".into(), "Disk full".into(), Priority::P2, opened);
        incident.append_note(NoteType::WorkNote, "alice", "Cleared /tmp", later);
        assert_eq!(incident.notes.len(), 1);
        assert_eq!(incident.updated_at, later);

        let json = serde_json::to_string(&incident.notes[0]).unwrap();
        assert!(json.contains(r#""type":"work-note""#));
    }

    #[test]
    fn test_notification_type_roundtrip() {
        for kind in NotificationType::all() {
            let json = serde_json::to_string(kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind));
            assert_eq!(kind.to_string().parse::<NotificationType>().unwrap(), *kind);
        }
    }

    #[test]
    fn test_notification_incident_link() {
        assert_eq!(Notification::incident_link("INC0007"), "#/incidents/INC0007");
    }
}
