//! Storage layer for service-desk data.
//!
//! Everything lives under one data directory:
//! - JSONL files for append-only data (incidents.jsonl, technicians.jsonl,
//!   teams.jsonl, notifications.jsonl, audit.jsonl). A record may appear many
//!   times; the last line with a given id wins.
//! - SQLite for indexed incident queries (cache.db), rebuilt from JSONL on demand.

use crate::commands::CompactResult;
use crate::models::{AuditEntry, Incident, IncidentStatus, Notification, Priority, Team, Technician};
use crate::store::{ItsmData, StoreChange};
use crate::{Error, Result};
use rusqlite::{params, Connection};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const INCIDENTS_FILE: &str = "incidents.jsonl";
const TECHNICIANS_FILE: &str = "technicians.jsonl";
const TEAMS_FILE: &str = "teams.jsonl";
const NOTIFICATIONS_FILE: &str = "notifications.jsonl";
const AUDIT_FILE: &str = "audit.jsonl";

const DATA_FILES: [&str; 5] = [
    INCIDENTS_FILE,
    TECHNICIANS_FILE,
    TEAMS_FILE,
    NOTIFICATIONS_FILE,
    AUDIT_FILE,
];

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "ITSM_DATA_DIR";

/// Storage manager for one data directory.
pub struct Storage {
    /// Root directory holding the JSONL files and the cache
    pub root: PathBuf,
    /// SQLite connection for indexed queries
    conn: Connection,
}

impl Storage {
    /// Open existing storage.
    pub fn open(data_dir: &Path) -> Result<Self> {
        if !Self::exists(data_dir) {
            return Err(Error::NotInitialized);
        }

        let conn = Connection::open(data_dir.join("cache.db"))?;
        Self::init_schema(&conn)?;

        Ok(Self {
            root: data_dir.to_path_buf(),
            conn,
        })
    }

    /// Initialize storage in `data_dir`. Safe to run on an existing directory.
    pub fn init(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir)?;

        for file in DATA_FILES {
            let path = data_dir.join(file);
            if !path.exists() {
                File::create(&path)?;
            }
        }

        let conn = Connection::open(data_dir.join("cache.db"))?;
        Self::init_schema(&conn)?;

        Ok(Self {
            root: data_dir.to_path_buf(),
            conn,
        })
    }

    /// Check whether `data_dir` has been initialized.
    pub fn exists(data_dir: &Path) -> bool {
        data_dir.join("cache.db").exists() && data_dir.join(INCIDENTS_FILE).exists()
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS incidents (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'new',
                priority INTEGER NOT NULL DEFAULT 3,
                assigned_to TEXT,
                assignee TEXT,
                sla_target TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_incidents_status ON incidents(status);
            CREATE INDEX IF NOT EXISTS idx_incidents_priority ON incidents(priority);

            CREATE TABLE IF NOT EXISTS notifications (
                id TEXT PRIMARY KEY,
                type TEXT NOT NULL,
                link TEXT,
                read INTEGER NOT NULL DEFAULT 0,
                timestamp TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Root directory of this storage.
    pub fn root(&self) -> &Path {
        &self.root
    }

    // === Loading and persisting the store ===

    /// Load every collection into a fresh store.
    pub fn load_data(&self) -> Result<ItsmData> {
        let incidents = read_latest::<Incident>(&self.root.join(INCIDENTS_FILE), |i| &i.id)?;
        let technicians =
            read_latest::<Technician>(&self.root.join(TECHNICIANS_FILE), |t| &t.id)?;
        let teams = read_latest::<Team>(&self.root.join(TEAMS_FILE), |t| &t.id)?;
        let notifications =
            read_latest::<Notification>(&self.root.join(NOTIFICATIONS_FILE), |n| &n.id)?;
        let audit_log = read_latest::<AuditEntry>(&self.root.join(AUDIT_FILE), |a| &a.id)?;

        debug!(
            incidents = incidents.len(),
            notifications = notifications.len(),
            "loaded data"
        );
        Ok(ItsmData::from_parts(
            incidents,
            technicians,
            teams,
            notifications,
            audit_log,
        ))
    }

    /// Write every pending change in `data` and update the cache.
    ///
    /// Returns the number of records written.
    pub fn persist(&mut self, data: &mut ItsmData) -> Result<usize> {
        let changes = data.take_changes();
        let mut written: HashSet<StoreChange> = HashSet::new();
        let mut count = 0;

        for change in changes {
            if written.contains(&change) {
                continue;
            }
            match &change {
                StoreChange::IncidentUpserted(id) => {
                    if let Some(incident) = data.incident(id) {
                        self.append(INCIDENTS_FILE, incident)?;
                        self.cache_incident(incident)?;
                        count += 1;
                    }
                }
                StoreChange::TechnicianAdded(id) => {
                    if let Some(tech) = data.technicians().iter().find(|t| &t.id == id) {
                        self.append(TECHNICIANS_FILE, tech)?;
                        count += 1;
                    }
                }
                StoreChange::TeamAdded(id) => {
                    if let Some(team) = data.teams().iter().find(|t| &t.id == id) {
                        self.append(TEAMS_FILE, team)?;
                        count += 1;
                    }
                }
                StoreChange::NotificationAdded(id) | StoreChange::NotificationUpdated(id) => {
                    if let Some(notification) = data.notification(id) {
                        self.append(NOTIFICATIONS_FILE, notification)?;
                        self.cache_notification(notification)?;
                        count += 1;
                    }
                }
                StoreChange::NotificationsCleared => {
                    File::create(self.root.join(NOTIFICATIONS_FILE))?;
                    self.conn.execute("DELETE FROM notifications", [])?;
                    // Anything added after the clear must be written again
                    written.clear();
                    count += 1;
                    continue;
                }
                StoreChange::ReferenceDataReplaced => {
                    for file in [INCIDENTS_FILE, TECHNICIANS_FILE, TEAMS_FILE] {
                        File::create(self.root.join(file))?;
                    }
                    self.conn.execute("DELETE FROM incidents", [])?;
                    written.clear();
                    count += 1;
                    continue;
                }
                StoreChange::AuditAppended(id) => {
                    if let Some(entry) = data.audit_log().iter().rev().find(|a| &a.id == id) {
                        self.append(AUDIT_FILE, entry)?;
                        count += 1;
                    }
                }
            }
            written.insert(change);
        }

        debug!(records = count, "persisted changes");
        Ok(count)
    }

    fn append<T: Serialize>(&self, file: &str, record: &T) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.root.join(file))?;
        let json = serde_json::to_string(record)?;
        writeln!(file, "{}", json)?;
        Ok(())
    }

    // === Queries ===

    /// Get the latest version of an incident.
    pub fn get_incident(&self, id: &str) -> Result<Incident> {
        read_latest::<Incident>(&self.root.join(INCIDENTS_FILE), |i| &i.id)?
            .into_iter()
            .find(|i| i.id == id)
            .ok_or_else(|| Error::NotFound(format!("Incident not found: {}", id)))
    }

    /// List incidents through the cache, most urgent first.
    ///
    /// `assigned` matches either the team or the technician (case-insensitive).
    pub fn list_incidents(
        &self,
        status: Option<IncidentStatus>,
        priority: Option<Priority>,
        assigned: Option<&str>,
    ) -> Result<Vec<Incident>> {
        let mut sql = String::from("SELECT id FROM incidents WHERE 1=1");
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(s) = status {
            sql.push_str(" AND status = ?");
            params_vec.push(Box::new(s.as_key()));
        }
        if let Some(p) = priority {
            sql.push_str(" AND priority = ?");
            params_vec.push(Box::new(p.rank()));
        }
        if let Some(a) = assigned {
            sql.push_str(" AND (assigned_to = ? COLLATE NOCASE OR assignee = ? COLLATE NOCASE)");
            params_vec.push(Box::new(a.to_string()));
            params_vec.push(Box::new(a.to_string()));
        }

        sql.push_str(" ORDER BY priority ASC, created_at ASC");

        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let ids: Vec<String> = stmt
            .query_map(params_refs.as_slice(), |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();

        let mut by_id: HashMap<String, Incident> =
            read_latest::<Incident>(&self.root.join(INCIDENTS_FILE), |i| &i.id)?
                .into_iter()
                .map(|i| (i.id.clone(), i))
                .collect();

        Ok(ids.into_iter().filter_map(|id| by_id.remove(&id)).collect())
    }

    /// Incident counts per status key, from the cache.
    pub fn count_by_status(&self) -> Result<Vec<(String, usize)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM incidents GROUP BY status ORDER BY status")?;
        let counts = stmt
            .query_map([], |row| {
                let count: i64 = row.get(1)?;
                Ok((row.get::<_, String>(0)?, count as usize))
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(counts)
    }

    /// Number of unread notifications, from the cache.
    pub fn unread_notifications(&self) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM notifications WHERE read = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Audit entries, oldest first, optionally for one incident.
    pub fn audit_entries(&self, incident_id: Option<&str>) -> Result<Vec<AuditEntry>> {
        let entries = read_latest::<AuditEntry>(&self.root.join(AUDIT_FILE), |a| &a.id)?;
        Ok(match incident_id {
            Some(id) => entries
                .into_iter()
                .filter(|e| e.incident_id.as_deref() == Some(id))
                .collect(),
            None => entries,
        })
    }

    // === Cache maintenance ===

    /// Rebuild the SQLite cache from JSONL files.
    pub fn rebuild_cache(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            DELETE FROM incidents;
            DELETE FROM notifications;
            "#,
        )?;

        for incident in read_latest::<Incident>(&self.root.join(INCIDENTS_FILE), |i| &i.id)? {
            self.cache_incident(&incident)?;
        }
        for notification in
            read_latest::<Notification>(&self.root.join(NOTIFICATIONS_FILE), |n| &n.id)?
        {
            self.cache_notification(&notification)?;
        }
        Ok(())
    }

    fn cache_incident(&self, incident: &Incident) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT OR REPLACE INTO incidents
            (id, title, status, priority, assigned_to, assignee, sla_target, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                incident.id,
                incident.title,
                incident.status.as_key(),
                incident.priority.rank(),
                incident.assigned_to,
                incident.assignee,
                incident.sla_target.map(|t| t.to_rfc3339()),
                incident.created_at.to_rfc3339(),
                incident.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn cache_notification(&self, notification: &Notification) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT OR REPLACE INTO notifications (id, type, link, read, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                notification.id,
                notification.notification_type.to_string(),
                notification.link,
                notification.read,
                notification.timestamp.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Compact the JSONL files by keeping only the latest version of each record.
    pub fn compact(&mut self) -> Result<CompactResult> {
        let mut result = CompactResult::default();

        let incidents = self.compact_file::<Incident>(INCIDENTS_FILE, |i| &i.id)?;
        result.incidents_compacted = incidents.final_entries;
        result.absorb(incidents);
        result.absorb(self.compact_file::<Technician>(TECHNICIANS_FILE, |t| &t.id)?);
        result.absorb(self.compact_file::<Team>(TEAMS_FILE, |t| &t.id)?);
        result.absorb(self.compact_file::<Notification>(NOTIFICATIONS_FILE, |n| &n.id)?);
        result.absorb(self.compact_file::<AuditEntry>(AUDIT_FILE, |a| &a.id)?);

        self.rebuild_cache()?;
        Ok(result)
    }

    fn compact_file<T>(&self, name: &str, key: impl Fn(&T) -> &str) -> Result<FileCompaction>
    where
        T: Serialize + DeserializeOwned,
    {
        let path = self.root.join(name);
        if !path.exists() {
            return Ok(FileCompaction::default());
        }

        let original_size = fs::metadata(&path).map(|m| m.len() as usize).unwrap_or(0);
        let original_entries = count_lines(&path)?;
        let latest = read_latest::<T>(&path, key)?;

        let backup_path = self.root.join(format!("{}.bak", name));
        fs::copy(&path, &backup_path)?;

        let mut file = File::create(&path)?;
        for record in &latest {
            let json = serde_json::to_string(record)?;
            writeln!(file, "{}", json)?;
        }

        let new_size = fs::metadata(&path).map(|m| m.len() as usize).unwrap_or(0);
        let _ = fs::remove_file(&backup_path);

        Ok(FileCompaction {
            original_entries,
            final_entries: latest.len(),
            original_size,
            new_size,
        })
    }
}

#[derive(Debug, Default)]
struct FileCompaction {
    original_entries: usize,
    final_entries: usize,
    original_size: usize,
    new_size: usize,
}

impl CompactResult {
    fn absorb(&mut self, file: FileCompaction) {
        self.original_entries += file.original_entries;
        self.final_entries += file.final_entries;
        self.space_saved_bytes += file.original_size.saturating_sub(file.new_size);
    }
}

/// Read a JSONL file keeping the last version of each record, in first-seen order.
///
/// Lines that fail to parse are skipped with a warning.
fn read_latest<T: DeserializeOwned>(path: &Path, key: impl Fn(&T) -> &str) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let reader = BufReader::new(File::open(path)?);
    let mut records: Vec<T> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = match serde_json::from_str::<T>(&line) {
            Ok(record) => record,
            Err(e) => {
                warn!(file = %path.display(), line = lineno + 1, error = %e, "skipping malformed record");
                continue;
            }
        };
        let id = key(&record).to_string();
        match positions.get(&id) {
            Some(&pos) => records[pos] = record,
            None => {
                positions.insert(id, records.len());
                records.push(record);
            }
        }
    }

    Ok(records)
}

fn count_lines(path: &Path) -> Result<usize> {
    let reader = BufReader::new(File::open(path)?);
    let mut count = 0;
    for line in reader.lines() {
        if !line?.trim().is_empty() {
            count += 1;
        }
    }
    Ok(count)
}

/// Resolve the data directory.
///
/// Precedence: explicit path (the `--data-dir` flag), then `ITSM_DATA_DIR`,
/// then `<platform data dir>/itsm`.
pub fn resolve_data_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Ok(path) = std::env::var(DATA_DIR_ENV) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    let data_dir = dirs::data_dir()
        .ok_or_else(|| Error::Other("Could not determine data directory".to_string()))?;
    Ok(data_dir.join("itsm"))
}

/// Generate an ID for a notification, audit entry, technician or team.
///
/// Format: `<prefix>-<6 hex chars>`
pub fn generate_id(prefix: &str, seed: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hasher.update(
        chrono::Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or(0)
            .to_le_bytes(),
    );
    let hash = hasher.finalize();
    let hash_hex = format!("{:x}", hash);
    format!("{}-{}", prefix, &hash_hex[..6])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NotificationType;
    use crate::test_utils::TestEnv;
    use chrono::Utc;

    fn seed(storage: &mut Storage) -> ItsmData {
        let mut data = storage.load_data().unwrap();
        let mut a = Incident::new("INC0001".into(), "VPN down".into(), Priority::P1);
        a.assigned_to = Some("Network".into());
        data.insert_incident(a).unwrap();
        data.insert_incident(Incident::new("INC0002".into(), "Printer".into(), Priority::P4))
            .unwrap();
        data.insert_incident(Incident::new("INC0003".into(), "Email".into(), Priority::P2))
            .unwrap();
        storage.persist(&mut data).unwrap();
        data
    }

    #[test]
    fn test_open_uninitialized_fails() {
        let env = TestEnv::new();
        assert!(matches!(
            Storage::open(env.data_path()),
            Err(Error::NotInitialized)
        ));
        assert!(!Storage::exists(env.data_path()));
    }

    #[test]
    fn test_init_creates_files() {
        let env = TestEnv::new();
        env.init_storage();
        for file in DATA_FILES {
            assert!(env.data_path().join(file).exists(), "{} missing", file);
        }
        assert!(Storage::exists(env.data_path()));
        // Re-running init keeps existing data
        Storage::init(env.data_path()).unwrap();
    }

    #[test]
    fn test_persist_and_reload_latest_version_wins() {
        let env = TestEnv::new();
        let mut storage = env.init_storage();
        let mut data = seed(&mut storage);

        data.update_incident("INC0002", |i| {
            i.status = IncidentStatus::Pending;
            Ok(())
        })
        .unwrap();
        storage.persist(&mut data).unwrap();

        let reloaded = env.open_storage().load_data().unwrap();
        assert_eq!(reloaded.incidents().len(), 3);
        assert_eq!(
            reloaded.incident("INC0002").unwrap().status,
            IncidentStatus::Pending
        );
        assert_eq!(count_lines(&env.data_path().join(INCIDENTS_FILE)).unwrap(), 4);
    }

    #[test]
    fn test_persist_without_changes_writes_nothing() {
        let env = TestEnv::new();
        let mut storage = env.init_storage();
        let mut data = seed(&mut storage);
        assert_eq!(storage.persist(&mut data).unwrap(), 0);
    }

    #[test]
    fn test_list_incidents_filters_and_orders() {
        let env = TestEnv::new();
        let mut storage = env.init_storage();
        seed(&mut storage);

        let all = storage.list_incidents(None, None, None).unwrap();
        let ids: Vec<_> = all.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["INC0001", "INC0003", "INC0002"]);

        let p4 = storage.list_incidents(None, Some(Priority::P4), None).unwrap();
        assert_eq!(p4.len(), 1);
        assert_eq!(p4[0].id, "INC0002");

        let network = storage.list_incidents(None, None, Some("network")).unwrap();
        assert_eq!(network.len(), 1);

        let closed = storage
            .list_incidents(Some(IncidentStatus::Closed), None, None)
            .unwrap();
        assert!(closed.is_empty());
    }

    #[test]
    fn test_dismiss_all_persists() {
        let env = TestEnv::new();
        let mut storage = env.init_storage();
        let mut data = seed(&mut storage);

        data.push_notification(
            NotificationType::SlaWarning,
            "old",
            "m",
            Some(Notification::incident_link("INC0001")),
            Utc::now(),
        );
        data.dismiss_all();
        let kept = data.push_notification(
            NotificationType::SlaBreached,
            "new",
            "m",
            Some(Notification::incident_link("INC0001")),
            Utc::now(),
        );
        storage.persist(&mut data).unwrap();

        let reloaded = storage.load_data().unwrap();
        assert_eq!(reloaded.notifications().len(), 1);
        assert_eq!(reloaded.notifications()[0].id, kept.id);
        assert_eq!(storage.unread_notifications().unwrap(), 1);
    }

    #[test]
    fn test_compact_keeps_latest_versions() {
        let env = TestEnv::new();
        let mut storage = env.init_storage();
        let mut data = seed(&mut storage);
        for _ in 0..3 {
            data.update_incident("INC0001", |i| {
                i.priority = Priority::P2;
                Ok(())
            })
            .unwrap();
            storage.persist(&mut data).unwrap();
        }

        let result = storage.compact().unwrap();
        assert_eq!(result.incidents_compacted, 3);
        assert_eq!(result.original_entries, 6);
        assert_eq!(result.final_entries, 3);
        assert!(result.space_saved_bytes > 0);

        let reloaded = storage.load_data().unwrap();
        assert_eq!(reloaded.incident("INC0001").unwrap().priority, Priority::P2);
    }

    #[test]
    fn test_compact_covers_audit_log() {
        let env = TestEnv::new();
        let mut storage = env.init_storage();
        let mut data = seed(&mut storage);
        data.record_audit("alice", "bulk.note", Some("INC0001"), serde_json::json!({}), Utc::now());
        storage.persist(&mut data).unwrap();

        let mut file = OpenOptions::new()
            .append(true)
            .open(env.data_path().join(AUDIT_FILE))
            .unwrap();
        writeln!(file, "{{not json").unwrap();
        drop(file);

        storage.compact().unwrap();
        assert_eq!(count_lines(&env.data_path().join(AUDIT_FILE)).unwrap(), 1);
        assert_eq!(storage.audit_entries(Some("INC0001")).unwrap().len(), 1);
    }

    #[test]
    fn test_replaced_reference_data_survives_reload() {
        let env = TestEnv::new();
        let mut storage = env.init_storage();
        let mut data = seed(&mut storage);
        data.add_team("Old team", None).unwrap();
        storage.persist(&mut data).unwrap();

        let mut pulled = ItsmData::new();
        pulled
            .insert_incident(Incident::new("INC0042".into(), "Pulled".into(), Priority::P3))
            .unwrap();
        pulled.add_team("Network", None).unwrap();
        data.replace_reference_data(pulled);
        storage.persist(&mut data).unwrap();

        let reloaded = env.open_storage().load_data().unwrap();
        let ids: Vec<&str> = reloaded.incidents().iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["INC0042"]);
        assert_eq!(reloaded.teams().len(), 1);
        assert_eq!(reloaded.teams()[0].name, "Network");
        assert!(reloaded.technicians().is_empty());

        let listed = storage.list_incidents(None, None, None).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "INC0042");
    }

    #[test]
    fn test_rebuild_cache_restores_index() {
        let env = TestEnv::new();
        let mut storage = env.init_storage();
        seed(&mut storage);

        storage.conn.execute("DELETE FROM incidents", []).unwrap();
        assert!(storage.list_incidents(None, None, None).unwrap().is_empty());

        storage.rebuild_cache().unwrap();
        assert_eq!(storage.list_incidents(None, None, None).unwrap().len(), 3);
        let counts = storage.count_by_status().unwrap();
        assert_eq!(counts, vec![("new".to_string(), 3)]);
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let env = TestEnv::new();
        let mut storage = env.init_storage();
        seed(&mut storage);

        let mut file = OpenOptions::new()
            .append(true)
            .open(env.data_path().join(INCIDENTS_FILE))
            .unwrap();
        writeln!(file, "{{not json").unwrap();

        assert_eq!(storage.load_data().unwrap().incidents().len(), 3);
    }

    #[test]
    fn test_audit_entries_filter_by_incident() {
        let env = TestEnv::new();
        let mut storage = env.init_storage();
        let mut data = seed(&mut storage);
        data.record_audit("alice", "bulk.note", Some("INC0001"), serde_json::json!({}), Utc::now());
        data.record_audit("alice", "bulk.note", Some("INC0002"), serde_json::json!({}), Utc::now());
        storage.persist(&mut data).unwrap();

        assert_eq!(storage.audit_entries(None).unwrap().len(), 2);
        let one = storage.audit_entries(Some("INC0002")).unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].actor, "alice");
    }

    #[test]
    fn test_resolve_data_dir_prefers_explicit() {
        let explicit = Path::new("/tmp/itsm-explicit");
        assert_eq!(resolve_data_dir(Some(explicit)).unwrap(), explicit);
    }

    #[test]
    #[serial_test::serial]
    fn test_resolve_data_dir_from_env() {
        // SAFETY: We're in a test environment and this test runs serially
        unsafe { std::env::set_var(DATA_DIR_ENV, "/tmp/itsm-from-env") };
        let resolved = resolve_data_dir(None).unwrap();
        unsafe { std::env::remove_var(DATA_DIR_ENV) };

        assert_eq!(resolved, PathBuf::from("/tmp/itsm-from-env"));
    }

    #[test]
    fn test_generate_id_format() {
        let id = generate_id("ntf", "test seed");
        assert!(id.starts_with("ntf-"));
        assert_eq!(id.len(), 10); // "ntf-" + 6 hex chars
        assert!(id[4..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_id_uniqueness() {
        let id1 = generate_id("aud", "seed1");
        let id2 = generate_id("aud", "seed2");
        assert_ne!(id1, id2);
    }
}
