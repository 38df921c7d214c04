//! Bulk operations over a selection of incidents.
//!
//! A [`BulkProcessor`] holds the user's selection set and applies one
//! [`BulkAction`] to every selected incident:
//!
//! - Items are processed one at a time, in selection order.
//! - Each item is fault-isolated: a missing incident or a rejected mutation
//!   counts as one failure and the batch moves on. Nothing is retried and
//!   nothing is rolled back.
//! - Only one batch may run at a time. A second `execute` while a batch is in
//!   flight is rejected and has no other effect.
//! - The selection is cleared once a batch completes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::models::{IncidentStatus, NoteType, Notification, NotificationType, Priority};
use crate::store::ItsmData;
use crate::{Error, Result};

/// A mutation applied to every incident in the selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum BulkAction {
    /// Route incidents to a team and, optionally, a technician.
    Assign {
        team: String,
        technician: Option<String>,
        note: Option<String>,
    },
    /// Close incidents with a resolution code.
    Close {
        resolution_code: String,
        resolution_notes: Option<String>,
    },
    /// Change priority.
    Priority {
        priority: Priority,
        reason: Option<String>,
    },
    /// Append a work note.
    Note { content: String },
}

impl BulkAction {
    /// Short action name used in logs and audit entries.
    pub fn name(&self) -> &'static str {
        match self {
            BulkAction::Assign { .. } => "assign",
            BulkAction::Close { .. } => "close",
            BulkAction::Priority { .. } => "priority",
            BulkAction::Note { .. } => "note",
        }
    }

    /// Check required fields before any incident is touched.
    pub fn validate(&self, store: &ItsmData) -> Result<()> {
        match self {
            BulkAction::Assign {
                team, technician, ..
            } => {
                if team.trim().is_empty() {
                    return Err(Error::InvalidInput("Assignment team is required".into()));
                }
                if store.find_team(team).is_none() {
                    return Err(Error::NotFound(format!("Team not found: {}", team)));
                }
                if let Some(tech) = technician {
                    if store.find_technician(tech).is_none() {
                        return Err(Error::NotFound(format!("Technician not found: {}", tech)));
                    }
                }
            }
            BulkAction::Close {
                resolution_code, ..
            } => {
                if resolution_code.trim().is_empty() {
                    return Err(Error::InvalidInput("Resolution code is required".into()));
                }
            }
            BulkAction::Priority { .. } => {}
            BulkAction::Note { content } => {
                if content.trim().is_empty() {
                    return Err(Error::InvalidInput("Note text is required".into()));
                }
            }
        }
        Ok(())
    }
}

/// Why a batch was not started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum BulkRejection {
    /// Another batch is in flight
    AlreadyRunning,
    /// Nothing is selected
    EmptySelection,
    /// The action failed validation
    Invalid(String),
}

impl std::fmt::Display for BulkRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BulkRejection::AlreadyRunning => write!(f, "a bulk operation is already running"),
            BulkRejection::EmptySelection => write!(f, "no incidents selected"),
            BulkRejection::Invalid(msg) => write!(f, "{}", msg),
        }
    }
}

/// One incident that could not be updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkFailure {
    pub incident_id: String,
    pub reason: String,
}

/// Aggregate result of a completed batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkSummary {
    pub action: String,
    pub succeeded: usize,
    pub failed: usize,
    pub total: usize,
    pub failures: Vec<BulkFailure>,
}

/// Result of calling [`BulkProcessor::execute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkOutcome {
    Completed(BulkSummary),
    Rejected(BulkRejection),
}

/// Progress report emitted after each item.
#[derive(Debug, Clone, Copy)]
pub struct BulkProgress<'a> {
    /// 1-based position of the item just processed
    pub index: usize,
    pub total: usize,
    pub incident_id: &'a str,
    pub succeeded: bool,
}

/// Clears the in-flight flag when the batch ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Applies bulk actions to the selected incidents.
pub struct BulkProcessor {
    selection: Mutex<Vec<String>>,
    running: AtomicBool,
    actor: String,
    item_delay: Duration,
}

impl BulkProcessor {
    /// Create a processor acting on behalf of `actor`.
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            selection: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
            actor: actor.into(),
            item_delay: Duration::ZERO,
        }
    }

    /// Pause between items (lets an interactive progress display repaint).
    pub fn with_item_delay(mut self, delay: Duration) -> Self {
        self.item_delay = delay;
        self
    }

    /// Add an incident to the selection. Returns false if it was already selected.
    pub fn select(&self, incident_id: &str) -> bool {
        let mut selection = self.selection_guard();
        if selection.iter().any(|id| id == incident_id) {
            return false;
        }
        selection.push(incident_id.to_string());
        true
    }

    /// Select several incidents, keeping first-seen order.
    pub fn select_all<I, S>(&self, incident_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for id in incident_ids {
            self.select(id.as_ref());
        }
    }

    /// Remove an incident from the selection. Returns false if it was not selected.
    pub fn deselect(&self, incident_id: &str) -> bool {
        let mut selection = self.selection_guard();
        let before = selection.len();
        selection.retain(|id| id != incident_id);
        selection.len() != before
    }

    /// Drop the whole selection. Does not interrupt a running batch.
    pub fn clear_selection(&self) {
        self.selection_guard().clear();
    }

    /// Snapshot of the current selection, in order.
    pub fn selection(&self) -> Vec<String> {
        self.selection_guard().clone()
    }

    /// Whether a batch is currently in flight.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Apply `action` to every selected incident.
    ///
    /// `progress` is called once per item, after the item has been processed.
    /// Per-item errors never escape: they are counted in the summary.
    pub fn execute<F>(&self, store: &mut ItsmData, action: &BulkAction, mut progress: F) -> BulkOutcome
    where
        F: FnMut(&BulkProgress<'_>),
    {
        let Some(_in_flight) = InFlight::acquire(&self.running) else {
            warn!(action = action.name(), "bulk operation rejected: already running");
            return BulkOutcome::Rejected(BulkRejection::AlreadyRunning);
        };

        let items = self.selection();
        if items.is_empty() {
            debug!(action = action.name(), "bulk operation skipped: empty selection");
            return BulkOutcome::Rejected(BulkRejection::EmptySelection);
        }

        if let Err(e) = action.validate(store) {
            warn!(action = action.name(), error = %e, "bulk operation rejected: invalid input");
            return BulkOutcome::Rejected(BulkRejection::Invalid(e.to_string()));
        }

        let total = items.len();
        info!(action = action.name(), total, "bulk operation started");

        let mut summary = BulkSummary {
            action: action.name().to_string(),
            succeeded: 0,
            failed: 0,
            total,
            failures: Vec::new(),
        };

        for (index, incident_id) in items.iter().enumerate() {
            if index > 0 && !self.item_delay.is_zero() {
                std::thread::sleep(self.item_delay);
            }

            let succeeded = match self.apply(store, action, incident_id, Utc::now()) {
                Ok(()) => {
                    summary.succeeded += 1;
                    true
                }
                Err(e) => {
                    warn!(incident = %incident_id, error = %e, "bulk item failed");
                    summary.failed += 1;
                    summary.failures.push(BulkFailure {
                        incident_id: incident_id.clone(),
                        reason: e.to_string(),
                    });
                    false
                }
            };

            progress(&BulkProgress {
                index: index + 1,
                total,
                incident_id,
                succeeded,
            });
        }

        self.clear_selection();
        info!(
            action = action.name(),
            succeeded = summary.succeeded,
            failed = summary.failed,
            total,
            "bulk operation completed"
        );
        BulkOutcome::Completed(summary)
    }

    fn apply(
        &self,
        store: &mut ItsmData,
        action: &BulkAction,
        incident_id: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let actor = self.actor.as_str();

        let details = match action {
            BulkAction::Assign {
                team,
                technician,
                note,
            } => {
                let team_name = store
                    .find_team(team)
                    .map(|t| t.name.clone())
                    .unwrap_or_else(|| team.clone());
                let tech_name = technician
                    .as_deref()
                    .and_then(|t| store.find_technician(t))
                    .map(|t| t.name.clone());

                store.update_incident(incident_id, |incident| {
                    if incident.status.is_terminal() {
                        return Err(Error::InvalidInput(format!(
                            "Cannot assign a {} incident",
                            incident.status
                        )));
                    }
                    incident.assigned_to = Some(team_name.clone());
                    incident.assignee = tech_name.clone();
                    if incident.status == IncidentStatus::New {
                        incident.status = IncidentStatus::Assigned;
                    }
                    let target = match &tech_name {
                        Some(tech) => format!("{} ({})", tech, team_name),
                        None => team_name.clone(),
                    };
                    incident.append_note(
                        NoteType::Assignment,
                        actor,
                        format!("Assigned to {}", target),
                        now,
                    );
                    if let Some(note) = note.as_deref().filter(|n| !n.trim().is_empty()) {
                        incident.append_note(NoteType::WorkNote, actor, note, now);
                    }
                    Ok(())
                })?;

                if let Some(tech) = &tech_name {
                    store.push_notification(
                        NotificationType::Assignment,
                        format!("{} assigned", incident_id),
                        format!("{} has been assigned to {}", incident_id, tech),
                        Some(Notification::incident_link(incident_id)),
                        now,
                    );
                }
                serde_json::json!({ "team": team_name, "technician": tech_name })
            }

            BulkAction::Close {
                resolution_code,
                resolution_notes,
            } => {
                store.update_incident(incident_id, |incident| {
                    if incident.status == IncidentStatus::Closed {
                        return Err(Error::InvalidInput(format!(
                            "Incident {} is already closed",
                            incident.id
                        )));
                    }
                    incident.status = IncidentStatus::Closed;
                    incident.resolved_at.get_or_insert(now);
                    incident.resolution_code = Some(resolution_code.clone());
                    incident.resolution_notes = resolution_notes.clone();
                    let content = match resolution_notes {
                        Some(notes) => format!("Closed ({}): {}", resolution_code, notes),
                        None => format!("Closed ({})", resolution_code),
                    };
                    incident.append_note(NoteType::Resolution, actor, content, now);
                    Ok(())
                })?;
                serde_json::json!({ "resolution_code": resolution_code })
            }

            BulkAction::Priority { priority, reason } => {
                let previous = store.update_incident(incident_id, |incident| {
                    let previous = incident.priority;
                    incident.priority = *priority;
                    let mut content = format!("Priority changed from {} to {}", previous, priority);
                    if let Some(reason) = reason.as_deref().filter(|r| !r.trim().is_empty()) {
                        content.push_str(": ");
                        content.push_str(reason);
                    }
                    incident.append_note(NoteType::PriorityChange, actor, content, now);
                    Ok(previous)
                })?;
                serde_json::json!({
                    "from": previous.to_string(),
                    "to": priority.to_string(),
                    "reason": reason,
                })
            }

            BulkAction::Note { content } => {
                store.update_incident(incident_id, |incident| {
                    incident.append_note(NoteType::WorkNote, actor, content.as_str(), now);
                    Ok(())
                })?;
                serde_json::json!({ "note": content })
            }
        };

        store.record_audit(
            actor,
            &format!("bulk.{}", action.name()),
            Some(incident_id),
            details,
            now,
        );
        Ok(())
    }

    fn selection_guard(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.selection.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
