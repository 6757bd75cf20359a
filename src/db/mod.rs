mod app_usage;
mod events;
mod preferences;
pub mod queries;
mod reminders;
mod sessions;
mod tasks;

use crate::analyzer::aggregator::Credit;
use crate::models::{
    AppCategory, AppUsageRecord, FocusSession, Reminder, Task, UsageEvent, UsageEventKind, UserPreferences,
};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{Connection, params};
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;

pub type SharedDatabase = Arc<Mutex<Database>>;

#[derive(Debug, Clone, Serialize)]
pub struct ReportMetaRow {
    pub id: i64,
    pub date: String,
    pub generated_at: i64,
    pub md_path: String,
    pub json_path: String,
}

/// Full contents of the restorable tables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreSnapshot {
    pub tasks: Vec<Task>,
    pub app_usage: Vec<AppUsageRecord>,
    pub focus_sessions: Vec<FocusSession>,
    pub reminders: Vec<Reminder>,
    pub preferences: UserPreferences,
}

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create DB directory: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite DB: {}", path.display()))?;
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .context("Failed to set SQLite busy timeout")?;

        let database = Self { conn };
        database.init_schema()?;

        Ok(database)
    }

    pub fn open_shared(path: &Path) -> Result<SharedDatabase> {
        Ok(Arc::new(Mutex::new(Self::open(path)?)))
    }

    #[cfg(test)]
    pub fn execute_raw(&self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql).context("Failed to execute SQL")
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let database = Self {
            conn: Connection::open_in_memory().context("Failed to open in-memory DB")?,
        };
        database.init_schema()?;
        Ok(database)
    }

    pub fn init_schema(&self) -> Result<()> {
        queries::schema_statements()
            .iter()
            .try_for_each(|statement| {
                self.conn
                    .execute(statement, [])
                    .context("Failed to initialize schema")
                    .map(|_| ())
            })
    }

    pub fn snapshot(&self) -> Result<StoreSnapshot> {
        Ok(StoreSnapshot {
            tasks: self.all_tasks()?,
            app_usage: self.all_app_usage()?,
            focus_sessions: self.all_sessions()?,
            reminders: self.all_reminders()?,
            preferences: self.preferences()?,
        })
    }

    /// Clears every restorable table and inserts the snapshot, all in one
    /// transaction.
    pub fn replace_all(&mut self, snapshot: &StoreSnapshot) -> Result<()> {
        let transaction = self
            .conn
            .transaction()
            .context("Failed to start transaction")?;

        queries::RESTORABLE_TABLES.iter().try_for_each(|table| {
            transaction
                .execute(&format!("DELETE FROM {table}"), [])
                .with_context(|| format!("Failed to clear table {table}"))
                .map(|_| ())
        })?;

        snapshot
            .tasks
            .iter()
            .try_for_each(|task| tasks::insert(&transaction, task))?;
        snapshot
            .app_usage
            .iter()
            .try_for_each(|app| app_usage::upsert(&transaction, app))?;
        snapshot
            .focus_sessions
            .iter()
            .try_for_each(|session| sessions::insert(&transaction, session))?;
        snapshot
            .reminders
            .iter()
            .try_for_each(|reminder| reminders::insert(&transaction, reminder))?;
        preferences::write(&transaction, &snapshot.preferences)?;

        transaction
            .commit()
            .context("Failed to commit restore")?;
        Ok(())
    }

    /// Writes one monitor poll atomically. Totals from an earlier day are
    /// zeroed, events appended, newly seen apps registered and credits added.
    /// Nothing is kept when any step fails.
    pub fn record_tick<F>(&mut self, events: &[UsageEvent], credits: &[Credit], now: i64, categorize: F) -> Result<()>
    where
        F: Fn(&str) -> AppCategory,
    {
        let transaction = self
            .conn
            .transaction()
            .context("Failed to start transaction")?;

        app_usage::reset_stale_usage(&transaction, now)?;
        events
            .iter()
            .try_for_each(|event| events::insert(&transaction, event))?;

        let seen = events
            .iter()
            .filter(|event| event.kind == UsageEventKind::Foreground)
            .map(|event| event.package_name.as_str())
            .chain(credits.iter().map(|credit| credit.package_name.as_str()));
        for package_name in seen {
            app_usage::register(&transaction, package_name, package_name, categorize(package_name), now)?;
        }

        for credit in credits {
            app_usage::add_usage(&transaction, &credit.package_name, credit.duration(), credit.to)?;
        }

        transaction
            .commit()
            .context("Failed to commit monitor tick")?;
        Ok(())
    }

    pub fn latest_report_meta(&self) -> Result<Option<ReportMetaRow>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, date, generated_at, md_path, json_path FROM reports ORDER BY date DESC LIMIT 1",
                [],
                |row| {
                    Ok(ReportMetaRow {
                        id: row.get(0)?,
                        date: row.get(1)?,
                        generated_at: row.get(2)?,
                        md_path: row.get(3)?,
                        json_path: row.get(4)?,
                    })
                },
            )
            .ok();

        Ok(row)
    }

    pub fn upsert_report_meta(
        &self,
        date: NaiveDate,
        generated_at: i64,
        md_path: &str,
        json_path: &str,
    ) -> Result<()> {
        let date_str = date.format("%Y-%m-%d").to_string();
        self.conn
            .execute(
                "INSERT INTO reports (date, generated_at, md_path, json_path)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(date)
                 DO UPDATE SET generated_at=excluded.generated_at, md_path=excluded.md_path, json_path=excluded.json_path",
                params![date_str, generated_at, md_path, json_path],
            )
            .context("Failed to upsert report metadata")?;

        Ok(())
    }
}

/// Locks the shared store, recovering the guard if a holder panicked.
pub fn lock(db: &SharedDatabase) -> MutexGuard<'_, Database> {
    match db.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("Database mutex was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

fn json_list(raw: String) -> Vec<String> {
    serde_json::from_str(&raw).unwrap_or_default()
}

fn json_text(items: &[String]) -> Result<String> {
    serde_json::to_string(items).context("Failed to serialize list column")
}

#[cfg(test)]
mod tests {
    use super::{Database, StoreSnapshot};
    use crate::analyzer::aggregator::Credit;
    use crate::models::{AppCategory, AppUsageRecord, Task, TaskPriority, UsageEvent, UserPreferences};
    use crate::timeutil::{DAY_MS, now_millis, start_of_day};

    #[test]
    fn open_creates_parent_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("darwesh.db");

        Database::open(&path).expect("open db");
        assert!(path.exists());
        Database::open(&path).expect("reopen db");
    }

    #[test]
    fn replace_all_swaps_every_table() {
        let mut db = Database::open_in_memory().expect("db");
        db.insert_task(&Task::new("old", "", TaskPriority::Low, None, 0))
            .expect("insert task");

        let snapshot = StoreSnapshot {
            tasks: vec![Task::new("new", "", TaskPriority::High, None, 1)],
            app_usage: vec![AppUsageRecord::new("com.a", "A", AppCategory::Gaming, 1)],
            preferences: UserPreferences {
                is_dark_mode: true,
                ..UserPreferences::default()
            },
            ..StoreSnapshot::default()
        };
        db.replace_all(&snapshot).expect("replace");

        let restored = db.snapshot().expect("snapshot");
        assert_eq!(restored.tasks, snapshot.tasks);
        assert_eq!(restored.app_usage, snapshot.app_usage);
        assert!(restored.preferences.is_dark_mode);
    }

    #[test]
    fn record_tick_registers_credits_and_drops_stale_totals() {
        let mut db = Database::open_in_memory().expect("db");
        let now = now_millis();
        let yesterday = start_of_day(now) - DAY_MS;
        db.ensure_app("com.old", "Old", AppCategory::Gaming, yesterday).expect("old");
        db.increment_app_usage("com.old", 5_000, yesterday).expect("old usage");

        let events = vec![UsageEvent::foreground("com.editor", now - 2_000)];
        let credits = vec![Credit {
            package_name: "com.editor".to_string(),
            from: now - 2_000,
            to: now,
        }];
        db.record_tick(&events, &credits, now, |_| AppCategory::Productivity)
            .expect("tick");

        let editor = db.app_usage("com.editor").expect("load").expect("registered");
        assert_eq!(editor.category, AppCategory::Productivity);
        assert_eq!(editor.total_usage_today, 2_000);
        assert_eq!(db.app_usage("com.old").expect("load").expect("exists").total_usage_today, 0);
        assert_eq!(db.usage_events_between(now - DAY_MS, now + 1).expect("events").len(), 1);
    }

    #[test]
    fn failed_record_tick_keeps_nothing() {
        let mut db = Database::open_in_memory().expect("db");
        db.ensure_app("com.a", "A", AppCategory::Gaming, 0).expect("app");
        db.execute_raw("DROP TABLE usage_events").expect("drop");

        let credits = vec![Credit {
            package_name: "com.a".to_string(),
            from: 0,
            to: 1_000,
        }];
        let result = db.record_tick(&[UsageEvent::foreground("com.b", 500)], &credits, 1_000, |_| AppCategory::Other);
        assert!(result.is_err());

        assert_eq!(db.app_usage("com.a").expect("load").expect("exists").total_usage_today, 0);
        assert!(db.app_usage("com.b").expect("load").is_none());
    }
}
