use serde::Serialize;
use std::path::Path;

use super::{Output, json, open_data};
use crate::models::{Notification, NotificationType};
use crate::{Error, Result};

#[derive(Serialize)]
pub struct NotificationList {
    /// Newest first
    pub notifications: Vec<Notification>,
    pub unread: usize,
}

impl Output for NotificationList {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.notifications.is_empty() {
            return "No notifications.".to_string();
        }
        let mut lines = vec![format!(
            "{} notification(s), {} unread:",
            self.notifications.len(),
            self.unread
        )];
        for n in &self.notifications {
            lines.push(format!(
                "  {} {} {} [{}] {}",
                if n.read { " " } else { "*" },
                n.id,
                n.timestamp.format("%Y-%m-%d %H:%M"),
                n.notification_type,
                n.title
            ));
            lines.push(format!("      {}", n.message));
        }
        lines.join("\n")
    }
}

pub fn notification_list(
    data_dir: &Path,
    unread_only: bool,
    notification_type: Option<&str>,
) -> Result<NotificationList> {
    let notification_type = notification_type
        .map(|t| t.parse::<NotificationType>())
        .transpose()
        .map_err(Error::InvalidInput)?;

    let (_, data) = open_data(data_dir)?;
    let notifications = data
        .notifications()
        .iter()
        .filter(|n| !unread_only || !n.read)
        .filter(|n| notification_type.is_none_or(|t| n.notification_type == t))
        .cloned()
        .collect();
    Ok(NotificationList {
        notifications,
        unread: data.unread_count(),
    })
}

#[derive(Serialize)]
pub struct NotificationRead {
    #[serde(flatten)]
    pub notification: Notification,
    pub unread: usize,
}

impl Output for NotificationRead {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!(
            "Marked {} as read ({} unread)",
            self.notification.id, self.unread
        )
    }
}

pub fn notification_read(data_dir: &Path, id: &str) -> Result<NotificationRead> {
    let (mut storage, mut data) = open_data(data_dir)?;
    let notification = data.mark_read(id)?;
    storage.persist(&mut data)?;
    Ok(NotificationRead {
        notification,
        unread: data.unread_count(),
    })
}

#[derive(Serialize)]
pub struct DismissResult {
    pub dismissed: usize,
}

impl Output for DismissResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!("Dismissed {} notification(s)", self.dismissed)
    }
}

pub fn notification_dismiss_all(data_dir: &Path) -> Result<DismissResult> {
    let (mut storage, mut data) = open_data(data_dir)?;
    let dismissed = data.dismiss_all();
    storage.persist(&mut data)?;
    Ok(DismissResult { dismissed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{NewIncident, incident_create, sla_check};
    use crate::config::ResolvedConfig;
    use crate::models::Priority;
    use crate::test_utils::TestEnv;
    use chrono::{Duration, Utc};

    fn seed_breach(env: &TestEnv) {
        env.init_storage();
        incident_create(
            env.data_path(),
            "alice",
            NewIncident {
                title: "Database down".into(),
                priority: Priority::P1,
                ..Default::default()
            },
        )
        .unwrap();
        sla_check(
            env.data_path(),
            &ResolvedConfig::default(),
            Some(Utc::now() + Duration::hours(6)),
        )
        .unwrap();
    }

    #[test]
    fn test_read_and_filter() {
        let env = TestEnv::new();
        seed_breach(&env);

        let list = notification_list(env.data_path(), false, Some("sla-breached")).unwrap();
        assert_eq!(list.notifications.len(), 1);
        let id = list.notifications[0].id.clone();

        let read = notification_read(env.data_path(), &id).unwrap();
        assert!(read.notification.read);
        assert_eq!(read.unread, 0);

        let unread = notification_list(env.data_path(), true, None).unwrap();
        assert!(unread.notifications.is_empty());

        assert!(notification_list(env.data_path(), false, Some("bogus")).is_err());
        assert!(matches!(
            notification_read(env.data_path(), "ntf-000000"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_dismiss_all_clears_and_allows_new_scans() {
        let env = TestEnv::new();
        seed_breach(&env);

        let dismissed = notification_dismiss_all(env.data_path()).unwrap();
        assert_eq!(dismissed.dismissed, 1);
        assert!(
            notification_list(env.data_path(), false, None)
                .unwrap()
                .notifications
                .is_empty()
        );
    }
}
