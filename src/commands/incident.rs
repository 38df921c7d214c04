use chrono::{Duration, Utc};
use serde::Serialize;
use std::path::Path;

use super::{Output, json, open_data};
use crate::models::{Incident, IncidentStatus, NoteType, Priority};
use crate::sla::format_remaining;
use crate::storage::Storage;
use crate::{Error, Result};

/// Fields for a new incident.
#[derive(Debug, Default)]
pub struct NewIncident {
    pub title: String,
    pub priority: Priority,
    pub description: Option<String>,
    pub category: Option<String>,
    pub caller: Option<String>,
    /// Override the priority's default resolution window
    pub sla_hours: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct IncidentCreated {
    pub id: String,
    pub title: String,
    pub priority: Priority,
    pub sla_target: Option<chrono::DateTime<Utc>>,
}

impl Output for IncidentCreated {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        match self.sla_target {
            Some(target) => format!(
                "Created {} [{}] {} (SLA due {})",
                self.id,
                self.priority,
                self.title,
                target.format("%Y-%m-%d %H:%M UTC")
            ),
            None => format!("Created {} [{}] {}", self.id, self.priority, self.title),
        }
    }
}

fn sla_out_of_range(hours: f64) -> Error {
    Error::InvalidInput(format!("SLA hours out of range: {}", hours))
}

pub fn incident_create(data_dir: &Path, actor: &str, new: NewIncident) -> Result<IncidentCreated> {
    if new.title.trim().is_empty() {
        return Err(Error::InvalidInput("Incident title is required".into()));
    }
    let window = match new.sla_hours {
        Some(hours) if !hours.is_finite() || hours <= 0.0 => {
            return Err(Error::InvalidInput(format!(
                "SLA hours must be positive, got {}",
                hours
            )));
        }
        Some(hours) => Some(
            Duration::try_milliseconds((hours * 3_600_000.0) as i64)
                .ok_or_else(|| sla_out_of_range(hours))?,
        ),
        None => None,
    };

    let (mut storage, mut data) = open_data(data_dir)?;
    let now = Utc::now();
    let mut incident = Incident::opened_at(data.next_incident_id(), new.title, new.priority, now);
    incident.description = new.description;
    incident.category = new.category;
    incident.caller = new.caller;
    if let Some(window) = window {
        let target = now
            .checked_add_signed(window)
            .ok_or_else(|| sla_out_of_range(window.num_hours() as f64))?;
        incident.sla_target = Some(target);
    }

    let created = IncidentCreated {
        id: incident.id.clone(),
        title: incident.title.clone(),
        priority: incident.priority,
        sla_target: incident.sla_target,
    };
    data.insert_incident(incident)?;
    data.record_audit(
        actor,
        "incident.create",
        Some(&created.id),
        serde_json::json!({ "title": created.title, "priority": created.priority }),
        now,
    );
    storage.persist(&mut data)?;
    Ok(created)
}

#[derive(Serialize)]
pub struct IncidentList {
    pub incidents: Vec<Incident>,
    pub count: usize,
}

impl Output for IncidentList {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.incidents.is_empty() {
            return "No incidents found.".to_string();
        }
        let now = Utc::now();
        let mut lines = vec![format!("{} incident(s):", self.count)];
        for incident in &self.incidents {
            let assigned = match (&incident.assigned_to, &incident.assignee) {
                (Some(team), Some(tech)) => format!("{} / {}", team, tech),
                (Some(team), None) => team.clone(),
                (None, Some(tech)) => tech.clone(),
                (None, None) => "unassigned".to_string(),
            };
            let sla = match incident.sla_target {
                Some(target) if incident.is_open() && target < now => "SLA breached".to_string(),
                Some(target) if incident.is_open() => {
                    format!("{} left", format_remaining(target - now))
                }
                _ => String::new(),
            };
            lines.push(format!(
                "  {} [{}] {:<12} {} ({}) {}",
                incident.id,
                incident.priority,
                incident.status.to_string(),
                incident.title,
                assigned,
                sla
            ));
        }
        lines.join("\n")
    }
}

pub fn incident_list(
    data_dir: &Path,
    status: Option<&str>,
    priority: Option<&str>,
    assigned: Option<&str>,
) -> Result<IncidentList> {
    let status = status
        .map(|s| s.parse::<IncidentStatus>())
        .transpose()
        .map_err(Error::InvalidInput)?;
    let priority = priority
        .map(|p| p.parse::<Priority>())
        .transpose()
        .map_err(Error::InvalidInput)?;

    let storage = Storage::open(data_dir)?;
    let incidents = storage.list_incidents(status, priority, assigned)?;
    Ok(IncidentList {
        count: incidents.len(),
        incidents,
    })
}

#[derive(Serialize)]
pub struct IncidentShow {
    #[serde(flatten)]
    pub incident: Incident,
}

impl Output for IncidentShow {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let i = &self.incident;
        let mut lines = vec![
            format!("{} {}", i.id, i.title),
            format!("  Status:   {}", i.status),
            format!("  Priority: {} ({})", i.priority, i.priority.label()),
        ];
        if let Some(category) = &i.category {
            lines.push(format!("  Category: {}", category));
        }
        if let Some(caller) = &i.caller {
            lines.push(format!("  Caller:   {}", caller));
        }
        if let Some(team) = &i.assigned_to {
            lines.push(format!("  Team:     {}", team));
        }
        if let Some(tech) = &i.assignee {
            lines.push(format!("  Assignee: {}", tech));
        }
        if let Some(target) = i.sla_target {
            lines.push(format!("  SLA due:  {}", target.format("%Y-%m-%d %H:%M UTC")));
        }
        if let Some(code) = &i.resolution_code {
            lines.push(format!("  Resolved: {}", code));
        }
        if let Some(description) = &i.description {
            lines.push(String::new());
            lines.push(format!("  {}", description));
        }
        if !i.notes.is_empty() {
            lines.push(String::new());
            lines.push("  Notes:".to_string());
            for note in &i.notes {
                lines.push(format!(
                    "    {} {} [{}] {}",
                    note.timestamp.format("%Y-%m-%d %H:%M"),
                    note.author,
                    note.note_type,
                    note.content
                ));
            }
        }
        lines.join("\n")
    }
}

pub fn incident_show(data_dir: &Path, id: &str) -> Result<IncidentShow> {
    let storage = Storage::open(data_dir)?;
    Ok(IncidentShow {
        incident: storage.get_incident(id)?,
    })
}

#[derive(Serialize)]
pub struct IncidentNoted {
    pub id: String,
    pub notes: usize,
}

impl Output for IncidentNoted {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!("Added note to {} ({} notes)", self.id, self.notes)
    }
}

pub fn incident_note(data_dir: &Path, actor: &str, id: &str, content: &str) -> Result<IncidentNoted> {
    if content.trim().is_empty() {
        return Err(Error::InvalidInput("Note text is required".into()));
    }
    let (mut storage, mut data) = open_data(data_dir)?;
    let now = Utc::now();
    let notes = data.update_incident(id, |incident| {
        incident.append_note(NoteType::WorkNote, actor, content, now);
        Ok(incident.notes.len())
    })?;
    data.record_audit(
        actor,
        "incident.note",
        Some(id),
        serde_json::json!({ "note": content }),
        now,
    );
    storage.persist(&mut data)?;
    Ok(IncidentNoted {
        id: id.to_string(),
        notes,
    })
}
