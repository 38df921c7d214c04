use chrono::Utc;
use serde::Serialize;
use std::path::Path;

use super::{Output, json, open_data};
use crate::models::{Team, Technician};
use crate::{Error, Result};

impl Output for Technician {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let mut line = format!("{} {}", self.id, self.name);
        if let Some(team) = &self.team {
            line.push_str(&format!(" ({})", team));
        }
        if let Some(email) = &self.email {
            line.push_str(&format!(" <{}>", email));
        }
        line
    }
}

impl Output for Team {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        match &self.description {
            Some(description) => format!("{} {}: {}", self.id, self.name, description),
            None => format!("{} {}", self.id, self.name),
        }
    }
}

pub fn technician_add(
    data_dir: &Path,
    actor: &str,
    name: &str,
    email: Option<String>,
    team: Option<String>,
) -> Result<Technician> {
    if name.trim().is_empty() {
        return Err(Error::InvalidInput("Technician name is required".into()));
    }
    let (mut storage, mut data) = open_data(data_dir)?;
    let team = match team {
        Some(key) => Some(
            data.find_team(&key)
                .map(|t| t.name.clone())
                .ok_or_else(|| Error::NotFound(format!("Team not found: {}", key)))?,
        ),
        None => None,
    };
    let technician = data.add_technician(name.trim(), email, team)?;
    data.record_audit(
        actor,
        "technician.add",
        None,
        serde_json::json!({ "id": technician.id, "name": technician.name }),
        Utc::now(),
    );
    storage.persist(&mut data)?;
    Ok(technician)
}

#[derive(Serialize)]
pub struct TechnicianList {
    pub technicians: Vec<Technician>,
    pub count: usize,
}

impl Output for TechnicianList {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.technicians.is_empty() {
            return "No technicians.".to_string();
        }
        let mut lines = vec![format!("{} technician(s):", self.count)];
        lines.extend(self.technicians.iter().map(|t| format!("  {}", t.to_human())));
        lines.join("\n")
    }
}

pub fn technician_list(data_dir: &Path, team: Option<&str>) -> Result<TechnicianList> {
    let (_, data) = open_data(data_dir)?;
    let technicians: Vec<Technician> = data
        .technicians()
        .iter()
        .filter(|t| match team {
            Some(team) => t
                .team
                .as_deref()
                .is_some_and(|name| name.eq_ignore_ascii_case(team)),
            None => true,
        })
        .cloned()
        .collect();
    Ok(TechnicianList {
        count: technicians.len(),
        technicians,
    })
}

pub fn team_add(
    data_dir: &Path,
    actor: &str,
    name: &str,
    description: Option<String>,
) -> Result<Team> {
    if name.trim().is_empty() {
        return Err(Error::InvalidInput("Team name is required".into()));
    }
    let (mut storage, mut data) = open_data(data_dir)?;
    let team = data.add_team(name.trim(), description)?;
    data.record_audit(
        actor,
        "team.add",
        None,
        serde_json::json!({ "id": team.id, "name": team.name }),
        Utc::now(),
    );
    storage.persist(&mut data)?;
    Ok(team)
}

#[derive(Serialize)]
pub struct TeamList {
    pub teams: Vec<Team>,
    pub count: usize,
}

impl Output for TeamList {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.teams.is_empty() {
            return "No teams.".to_string();
        }
        let mut lines = vec![format!("{} team(s):", self.count)];
        lines.extend(self.teams.iter().map(|t| format!("  {}", t.to_human())));
        lines.join("\n")
    }
}

pub fn team_list(data_dir: &Path) -> Result<TeamList> {
    let (_, data) = open_data(data_dir)?;
    Ok(TeamList {
        count: data.teams().len(),
        teams: data.teams().to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestEnv;

    #[test]
    fn test_technician_requires_known_team() {
        let env = TestEnv::new();
        env.init_storage();

        let missing = technician_add(env.data_path(), "admin", "Jules", None, Some("Network".into()));
        assert!(matches!(missing, Err(Error::NotFound(_))));

        team_add(env.data_path(), "admin", "Network", None).unwrap();
        let tech =
            technician_add(env.data_path(), "admin", "Jules", None, Some("network".into())).unwrap();
        assert_eq!(tech.team.as_deref(), Some("Network"));
        assert!(tech.id.starts_with("tech-"));

        let listed = technician_list(env.data_path(), Some("NETWORK")).unwrap();
        assert_eq!(listed.count, 1);
    }

    #[test]
    fn test_duplicate_team_rejected() {
        let env = TestEnv::new();
        env.init_storage();
        team_add(env.data_path(), "admin", "Desktop", Some("Laptops".into())).unwrap();
        assert!(team_add(env.data_path(), "admin", "desktop", None).is_err());
        assert_eq!(team_list(env.data_path()).unwrap().count, 1);
    }
}
