//! In-memory data store shared by the console's components.
//!
//! `ItsmData` owns every collection the console works with. Other modules never
//! reach into its fields; they go through the mutation methods below, each of
//! which records a [`StoreChange`] so the storage layer can persist exactly
//! what changed.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::models::{AuditEntry, Incident, Notification, NotificationType, Team, Technician};
use crate::storage::generate_id;
use crate::{Error, Result};

/// Store shared between the bulk processor, the SLA monitor and the CLI.
pub type SharedStore = Arc<Mutex<ItsmData>>;

/// Lock a shared store, recovering the data if a previous holder panicked.
pub fn lock(store: &SharedStore) -> MutexGuard<'_, ItsmData> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A pending change that has not been written to storage yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StoreChange {
    IncidentUpserted(String),
    TechnicianAdded(String),
    TeamAdded(String),
    NotificationAdded(String),
    NotificationUpdated(String),
    NotificationsCleared,
    /// Incidents, technicians and teams were replaced wholesale
    ReferenceDataReplaced,
    AuditAppended(String),
}

/// The console's data store.
#[derive(Debug, Default)]
pub struct ItsmData {
    incidents: Vec<Incident>,
    technicians: Vec<Technician>,
    teams: Vec<Team>,
    /// Newest first
    notifications: Vec<Notification>,
    /// `(type, link)` of every notification, for O(1) duplicate checks
    notification_index: HashSet<(NotificationType, String)>,
    audit_log: Vec<AuditEntry>,
    changes: Vec<StoreChange>,
    id_seq: u64,
}

impl ItsmData {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from already-persisted collections. No changes are recorded.
    pub fn from_parts(
        incidents: Vec<Incident>,
        technicians: Vec<Technician>,
        teams: Vec<Team>,
        mut notifications: Vec<Notification>,
        audit_log: Vec<AuditEntry>,
    ) -> Self {
        notifications.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        let notification_index = notifications
            .iter()
            .filter_map(|n| n.link.clone().map(|link| (n.notification_type, link)))
            .collect();

        Self {
            incidents,
            technicians,
            teams,
            notifications,
            notification_index,
            audit_log,
            changes: Vec::new(),
            id_seq: 0,
        }
    }

    /// Wrap the store for sharing with the SLA monitor.
    pub fn into_shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }

    // === Incidents ===

    pub fn incidents(&self) -> &[Incident] {
        &self.incidents
    }

    /// Get an incident by ID.
    pub fn incident(&self, id: &str) -> Option<&Incident> {
        self.incidents.iter().find(|i| i.id == id)
    }

    /// Insert a new incident.
    pub fn insert_incident(&mut self, incident: Incident) -> Result<()> {
        if self.incident(&incident.id).is_some() {
            return Err(Error::InvalidInput(format!(
                "Incident already exists: {}",
                incident.id
            )));
        }
        self.changes
            .push(StoreChange::IncidentUpserted(incident.id.clone()));
        self.incidents.push(incident);
        Ok(())
    }

    /// Apply a mutation to one incident.
    ///
    /// The closure works on a copy; the stored incident is only replaced when
    /// the closure succeeds, so a failed mutation leaves no partial edits.
    pub fn update_incident<T, F>(&mut self, id: &str, mutate: F) -> Result<T>
    where
        F: FnOnce(&mut Incident) -> Result<T>,
    {
        let slot = self
            .incidents
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| Error::NotFound(format!("Incident not found: {}", id)))?;

        let mut draft = slot.clone();
        let value = mutate(&mut draft)?;
        *slot = draft;

        self.changes
            .push(StoreChange::IncidentUpserted(id.to_string()));
        Ok(value)
    }

    /// Next sequential incident number (e.g., "INC0007").
    pub fn next_incident_id(&self) -> String {
        let highest = self
            .incidents
            .iter()
            .filter_map(|i| i.id.strip_prefix("INC"))
            .filter_map(|n| n.parse::<u32>().ok())
            .max()
            .unwrap_or(0);
        format!("INC{:04}", highest + 1)
    }

    // === Technicians and teams ===

    pub fn technicians(&self) -> &[Technician] {
        &self.technicians
    }

    /// Find a technician by ID or by (case-insensitive) name.
    pub fn find_technician(&self, key: &str) -> Option<&Technician> {
        self.technicians
            .iter()
            .find(|t| t.id == key || t.name.eq_ignore_ascii_case(key))
    }

    /// Register a technician. Names must be unique.
    pub fn add_technician(
        &mut self,
        name: &str,
        email: Option<String>,
        team: Option<String>,
    ) -> Result<Technician> {
        if self.find_technician(name).is_some() {
            return Err(Error::InvalidInput(format!(
                "Technician already exists: {}",
                name
            )));
        }
        let technician = Technician {
            id: self.unique_id("tech", name),
            name: name.to_string(),
            email,
            team,
        };
        self.changes
            .push(StoreChange::TechnicianAdded(technician.id.clone()));
        self.technicians.push(technician.clone());
        Ok(technician)
    }

    pub fn teams(&self) -> &[Team] {
        &self.teams
    }

    /// Find a team by ID or by (case-insensitive) name.
    pub fn find_team(&self, key: &str) -> Option<&Team> {
        self.teams
            .iter()
            .find(|t| t.id == key || t.name.eq_ignore_ascii_case(key))
    }

    /// Register a team. Names must be unique.
    pub fn add_team(&mut self, name: &str, description: Option<String>) -> Result<Team> {
        if self.find_team(name).is_some() {
            return Err(Error::InvalidInput(format!("Team already exists: {}", name)));
        }
        let team = Team {
            id: self.unique_id("team", name),
            name: name.to_string(),
            description,
        };
        self.changes.push(StoreChange::TeamAdded(team.id.clone()));
        self.teams.push(team.clone());
        Ok(team)
    }

    // === Notifications ===

    /// Notifications, newest first.
    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn notification(&self, id: &str) -> Option<&Notification> {
        self.notifications.iter().find(|n| n.id == id)
    }

    pub fn unread_count(&self) -> usize {
        self.notifications.iter().filter(|n| !n.read).count()
    }

    /// Whether a notification of this type already points at `link`.
    pub fn has_notification(&self, notification_type: NotificationType, link: &str) -> bool {
        self.notification_index
            .contains(&(notification_type, link.to_string()))
    }

    /// Prepend a new unread notification and return it.
    pub fn push_notification(
        &mut self,
        notification_type: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
        link: Option<String>,
        at: DateTime<Utc>,
    ) -> Notification {
        let title = title.into();
        let notification = Notification {
            id: self.unique_id("ntf", &title),
            notification_type,
            title,
            message: message.into(),
            link,
            timestamp: at,
            read: false,
        };

        if let Some(link) = &notification.link {
            self.notification_index
                .insert((notification_type, link.clone()));
        }
        debug!(id = %notification.id, kind = %notification_type, "notification added");
        self.changes
            .push(StoreChange::NotificationAdded(notification.id.clone()));
        self.notifications.insert(0, notification.clone());
        notification
    }

    /// Mark one notification as read.
    pub fn mark_read(&mut self, id: &str) -> Result<Notification> {
        let notification = self
            .notifications
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| Error::NotFound(format!("Notification not found: {}", id)))?;
        if !notification.read {
            notification.read = true;
            self.changes
                .push(StoreChange::NotificationUpdated(id.to_string()));
        }
        Ok(notification.clone())
    }

    /// Remove every notification. Returns how many were dismissed.
    pub fn dismiss_all(&mut self) -> usize {
        let count = self.notifications.len();
        self.notifications.clear();
        self.notification_index.clear();
        self.changes.push(StoreChange::NotificationsCleared);
        count
    }

    // === Audit log ===

    pub fn audit_log(&self) -> &[AuditEntry] {
        &self.audit_log
    }

    /// Append an audit entry and return its ID.
    pub fn record_audit(
        &mut self,
        actor: &str,
        action: &str,
        incident_id: Option<&str>,
        details: serde_json::Value,
        at: DateTime<Utc>,
    ) -> String {
        let entry = AuditEntry {
            id: self.unique_id("aud", action),
            timestamp: at,
            actor: actor.to_string(),
            action: action.to_string(),
            incident_id: incident_id.map(str::to_string),
            details,
        };
        let id = entry.id.clone();
        self.changes.push(StoreChange::AuditAppended(id.clone()));
        self.audit_log.push(entry);
        id
    }

    // === Change journal ===

    /// Drain the changes recorded since the last call.
    pub fn take_changes(&mut self) -> Vec<StoreChange> {
        std::mem::take(&mut self.changes)
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    /// Replace incidents, technicians and teams with another store's (e.g. data
    /// pulled from the REST backend). Records missing from `other` are dropped,
    /// on disk as well once persisted.
    pub fn replace_reference_data(&mut self, other: ItsmData) {
        self.incidents = other.incidents;
        self.technicians = other.technicians;
        self.teams = other.teams;

        self.changes.push(StoreChange::ReferenceDataReplaced);

        for incident in &self.incidents {
            self.changes
                .push(StoreChange::IncidentUpserted(incident.id.clone()));
        }
        for technician in &self.technicians {
            self.changes
                .push(StoreChange::TechnicianAdded(technician.id.clone()));
        }
        for team in &self.teams {
            self.changes.push(StoreChange::TeamAdded(team.id.clone()));
        }
    }

    fn unique_id(&mut self, prefix: &str, seed: &str) -> String {
        loop {
            self.id_seq += 1;
            let id = generate_id(prefix, &format!("{}:{}", seed, self.id_seq));
            let taken = match prefix {
                "ntf" => self.notifications.iter().any(|n| n.id == id),
                "aud" => self.audit_log.iter().any(|a| a.id == id),
                "tech" => self.technicians.iter().any(|t| t.id == id),
                "team" => self.teams.iter().any(|t| t.id == id),
                _ => false,
            };
            if !taken {
                return id;
            }
        }
    }
}
