use crate::db::{Database, StoreSnapshot};
use crate::models::{AppUsageRecord, FocusSession, Reminder, Task, UserPreferences};
use crate::timeutil::to_local;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tracing::{info, warn};

pub const BACKUP_VERSION: i64 = 1;

const DEVICE_ID_FILE: &str = "device_id";
const REQUIRED_SECTIONS: [&str; 5] = ["tasks", "app_usage", "focus_sessions", "reminders", "preferences"];

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("backup has no version field")]
    MissingVersion,
    #[error("unsupported backup version {0} (supported: 1..={BACKUP_VERSION})")]
    UnsupportedVersion(i64),
    #[error("backup is missing the `{0}` section")]
    MissingSection(&'static str),
    #[error("malformed backup: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("focus session {0} has a score or actual duration but is not completed")]
    IncompleteSession(String),
    #[error("failed to read backup: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section<T> {
    pub data: Vec<T>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupDocument {
    pub version: i64,
    pub timestamp: i64,
    pub device_id: String,
    pub tasks: Section<Task>,
    #[serde(rename = "app_usage")]
    pub app_usage: Section<AppUsageRecord>,
    #[serde(rename = "focus_sessions")]
    pub focus_sessions: Section<FocusSession>,
    pub reminders: Section<Reminder>,
    pub preferences: UserPreferences,
}

impl BackupDocument {
    pub fn from_snapshot(snapshot: StoreSnapshot, device_id: &str, now: i64) -> Self {
        Self {
            version: BACKUP_VERSION,
            timestamp: now,
            device_id: device_id.to_string(),
            tasks: Section { data: snapshot.tasks },
            app_usage: Section { data: snapshot.app_usage },
            focus_sessions: Section { data: snapshot.focus_sessions },
            reminders: Section { data: snapshot.reminders },
            preferences: snapshot.preferences,
        }
    }

    pub fn into_snapshot(self) -> StoreSnapshot {
        StoreSnapshot {
            tasks: self.tasks.data,
            app_usage: self.app_usage.data,
            focus_sessions: self.focus_sessions.data,
            reminders: self.reminders.data,
            preferences: self.preferences,
        }
    }
}

/// Checks version and sections before decoding the records.
pub fn parse(raw: &str) -> Result<BackupDocument, BackupError> {
    let value: Value = serde_json::from_str(raw)?;

    let version = value
        .get("version")
        .and_then(Value::as_i64)
        .ok_or(BackupError::MissingVersion)?;
    if !(1..=BACKUP_VERSION).contains(&version) {
        return Err(BackupError::UnsupportedVersion(version));
    }

    if let Some(missing) = REQUIRED_SECTIONS
        .iter()
        .find(|section| value.get(**section).is_none())
    {
        return Err(BackupError::MissingSection(missing));
    }

    let document: BackupDocument = serde_json::from_value(value)?;
    if let Some(session) = document
        .focus_sessions
        .data
        .iter()
        .find(|session| !session.is_consistent())
    {
        return Err(BackupError::IncompleteSession(session.id.clone()));
    }

    Ok(document)
}

pub fn validate_file(path: &Path) -> Result<BackupDocument, BackupError> {
    parse(&fs::read_to_string(path)?)
}

pub fn backup_file_name(now: i64) -> String {
    format!("darwesh_backup_{}.json", to_local(now).format("%Y%m%d_%H%M%S"))
}

/// Writes the whole store to `path` and stamps `lastBackupTime`.
pub fn export(db: &mut Database, path: &Path, device_id: &str, now: i64) -> Result<BackupDocument> {
    let document = BackupDocument::from_snapshot(db.snapshot()?, device_id, now);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create backup directory: {}", parent.display()))?;
    }

    let content = serde_json::to_string_pretty(&document).context("Failed to serialize backup")?;
    fs::write(path, content)
        .with_context(|| format!("Failed to write backup file: {}", path.display()))?;
    crate::config::set_mode_600(path)?;

    db.set_last_backup_time(now)?;
    info!(path = %path.display(), "backup created");

    Ok(document)
}

/// Replaces the store with the backup contents. Nothing is touched unless
/// the whole document validates.
pub fn restore(db: &mut Database, path: &Path) -> Result<BackupDocument> {
    let document = validate_file(path)
        .with_context(|| format!("Invalid backup file: {}", path.display()))?;

    db.replace_all(&document.clone().into_snapshot())?;
    info!(
        path = %path.display(),
        tasks = document.tasks.data.len(),
        apps = document.app_usage.data.len(),
        "backup restored"
    );

    Ok(document)
}

/// Backup files in `dir`, newest first.
pub fn list_backups(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files = fs::read_dir(dir)
        .with_context(|| format!("Failed to read backup directory: {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
        .map(|path| {
            let modified = fs::metadata(&path)
                .and_then(|meta| meta.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, path)
        })
        .collect::<Vec<_>>();

    files.sort_by(|left, right| right.cmp(left));
    Ok(files.into_iter().map(|(_, path)| path).collect())
}

/// Keeps the newest `max_backups` files and deletes the rest.
pub fn prune_backups(dir: &Path, max_backups: usize) -> Result<usize> {
    let mut removed = 0;

    for path in list_backups(dir)?.into_iter().skip(max_backups) {
        match fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(error) => warn!(error = %error, path = %path.display(), "failed to delete old backup"),
        }
    }

    Ok(removed)
}

/// Exports into `dir` under a timestamped name, then drops the oldest
/// files beyond `max_backups`.
pub fn export_rotating(
    db: &mut Database,
    dir: &Path,
    device_id: &str,
    max_backups: usize,
    now: i64,
) -> Result<PathBuf> {
    let path = dir.join(backup_file_name(now));
    export(db, &path, device_id, now)?;

    let removed = prune_backups(dir, max_backups.max(1))?;
    if removed > 0 {
        info!(removed, dir = %dir.display(), "old backups pruned");
    }

    Ok(path)
}

pub fn should_perform_backup(prefs: &UserPreferences, now: i64) -> bool {
    if !prefs.auto_backup_enabled {
        return false;
    }

    let Some(period) = prefs.backup_frequency.period() else {
        return false;
    };

    prefs
        .last_backup_time
        .is_none_or(|last| now - last >= period)
}

/// Stable per-install identifier stored next to the config file.
pub fn device_id(root: &Path) -> Result<String> {
    let path = root.join(DEVICE_ID_FILE);
    if let Ok(existing) = fs::read_to_string(&path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return Ok(trimmed.to_string());
        }
    }

    let id = uuid::Uuid::new_v4().to_string();
    fs::create_dir_all(root)
        .with_context(|| format!("Failed to create directory: {}", root.display()))?;
    fs::write(&path, &id)
        .with_context(|| format!("Failed to write device id: {}", path.display()))?;

    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::{
        BackupDocument, BackupError, backup_file_name, export, export_rotating, list_backups, parse, prune_backups,
        restore, should_perform_backup,
    };
    use crate::db::{Database, StoreSnapshot};
    use crate::models::{
        AppCategory, AppUsageRecord, BackupFrequency, FocusSession, SessionKind, Task, TaskPriority, UserPreferences,
    };
    use crate::timeutil::DAY_MS;
    use std::fs;

    fn seeded() -> Database {
        let db = Database::open_in_memory().expect("db");
        db.insert_task(&Task::new("Ship", "", TaskPriority::High, None, 1))
            .expect("task");
        db.upsert_app(&AppUsageRecord::new("com.a", "A", AppCategory::Gaming, 1))
            .expect("app");
        db
    }

    #[test]
    fn export_then_restore_reproduces_the_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(backup_file_name(10));
        let mut source = seeded();

        export(&mut source, &path, "device-1", 10).expect("export");
        assert_eq!(source.preferences().expect("prefs").last_backup_time, Some(10));

        let mut target = Database::open_in_memory().expect("target");
        target
            .insert_task(&Task::new("stale", "", TaskPriority::Low, None, 0))
            .expect("stale");
        let document = restore(&mut target, &path).expect("restore");

        assert_eq!(document.device_id, "device-1");
        let restored = target.snapshot().expect("snapshot");
        let original = source.snapshot().expect("snapshot");
        assert_eq!(restored.tasks, original.tasks);
        assert_eq!(restored.app_usage, original.app_usage);
    }

    #[test]
    fn rejects_future_versions_and_missing_sections() {
        let future = r#"{"version": 2, "tasks": {"data": []}}"#;
        assert!(matches!(parse(future), Err(BackupError::UnsupportedVersion(2))));
        assert!(matches!(parse(r#"{"tasks": {}}"#), Err(BackupError::MissingVersion)));

        let partial = r#"{"version": 1, "timestamp": 0, "deviceId": "x",
            "tasks": {"data": []}, "app_usage": {"data": []},
            "focus_sessions": {"data": []}, "preferences": {}}"#;
        assert!(matches!(parse(partial), Err(BackupError::MissingSection("reminders"))));
        assert!(matches!(parse("not json"), Err(BackupError::Malformed(_))));
    }

    #[test]
    fn invalid_backup_leaves_store_untouched() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.json");
        fs::write(&path, r#"{"version": 1, "tasks": {"data": []}}"#).expect("write");

        let mut db = seeded();
        let before = db.snapshot().expect("before");
        assert!(restore(&mut db, &path).is_err());
        assert_eq!(db.snapshot().expect("after"), before);
    }

    #[test]
    fn sessions_with_completion_data_must_be_completed() {
        let mut session = FocusSession::start(SessionKind::Focus, 1_000, 0, Vec::new());
        session.focus_score = Some(90);
        let snapshot = StoreSnapshot {
            focus_sessions: vec![session.clone()],
            ..StoreSnapshot::default()
        };
        let raw = serde_json::to_string(&BackupDocument::from_snapshot(snapshot, "x", 0)).expect("serialize");

        match parse(&raw) {
            Err(BackupError::IncompleteSession(id)) => assert_eq!(id, session.id),
            other => panic!("unexpected parse result: {other:?}"),
        }
    }

    #[test]
    fn empty_preferences_section_restores_defaults() {
        let raw = r#"{"version": 1, "timestamp": 0, "deviceId": "x",
            "tasks": {"data": []}, "app_usage": {"data": []},
            "focus_sessions": {"data": []}, "reminders": {"data": []}, "preferences": {}}"#;
        let document = parse(raw).expect("parse");
        assert_eq!(document.preferences, UserPreferences::default());
    }

    #[test]
    fn prune_keeps_newest_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in ["darwesh_backup_1.json", "darwesh_backup_2.json", "darwesh_backup_3.json", "notes.txt"] {
            fs::write(dir.path().join(name), "{}").expect("write");
        }

        assert_eq!(list_backups(dir.path()).expect("list").len(), 3);
        assert_eq!(prune_backups(dir.path(), 2).expect("prune"), 1);
        assert_eq!(list_backups(dir.path()).expect("list").len(), 2);
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn rotating_export_keeps_the_configured_count() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut db = seeded();

        for second in 0..3 {
            export_rotating(&mut db, dir.path(), "device-1", 2, 1_000 * (1 + second)).expect("export");
        }

        let files = list_backups(dir.path()).expect("list");
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|path| validate(path)));
    }

    fn validate(path: &std::path::Path) -> bool {
        super::validate_file(path).is_ok()
    }

    #[test]
    fn backup_due_follows_frequency() {
        let mut prefs = UserPreferences::default();
        assert!(should_perform_backup(&prefs, 0));

        prefs.last_backup_time = Some(0);
        prefs.backup_frequency = BackupFrequency::Daily;
        assert!(!should_perform_backup(&prefs, DAY_MS - 1));
        assert!(should_perform_backup(&prefs, DAY_MS));

        prefs.backup_frequency = BackupFrequency::Never;
        assert!(!should_perform_backup(&prefs, 10 * DAY_MS));

        prefs.backup_frequency = BackupFrequency::Daily;
        prefs.auto_backup_enabled = false;
        assert!(!should_perform_backup(&prefs, 10 * DAY_MS));
    }
}
