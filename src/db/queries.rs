pub const CREATE_APP_USAGE: &str = r#"
CREATE TABLE IF NOT EXISTS app_usage (
  package_name      TEXT PRIMARY KEY,
  app_name          TEXT NOT NULL,
  category          TEXT NOT NULL DEFAULT 'OTHER',
  daily_limit       INTEGER NOT NULL DEFAULT 0,
  is_blocked        INTEGER NOT NULL DEFAULT 0,
  is_whitelisted    INTEGER NOT NULL DEFAULT 0,
  total_usage_today INTEGER NOT NULL DEFAULT 0,
  last_usage_time   INTEGER NOT NULL DEFAULT 0,
  updated_at        INTEGER NOT NULL
);
"#;

pub const CREATE_FOCUS_SESSIONS: &str = r#"
CREATE TABLE IF NOT EXISTS focus_sessions (
  id                 TEXT PRIMARY KEY,
  start_time         INTEGER NOT NULL,
  end_time           INTEGER,
  duration           INTEGER NOT NULL,
  actual_duration    INTEGER,
  type               TEXT NOT NULL DEFAULT 'FOCUS',
  is_completed       INTEGER NOT NULL DEFAULT 0,
  was_interrupted    INTEGER NOT NULL DEFAULT 0,
  interruption_count INTEGER NOT NULL DEFAULT 0,
  focus_score        INTEGER,
  notes              TEXT NOT NULL DEFAULT '',
  associated_tasks   TEXT NOT NULL DEFAULT '[]',
  created_at         INTEGER NOT NULL
);
"#;

pub const CREATE_TASKS: &str = r#"
CREATE TABLE IF NOT EXISTS tasks (
  id           TEXT PRIMARY KEY,
  title        TEXT NOT NULL,
  description  TEXT NOT NULL DEFAULT '',
  priority     TEXT NOT NULL DEFAULT 'MEDIUM',
  due_date     INTEGER,
  is_completed INTEGER NOT NULL DEFAULT 0,
  created_at   INTEGER NOT NULL,
  updated_at   INTEGER NOT NULL
);
"#;

pub const CREATE_REMINDERS: &str = r#"
CREATE TABLE IF NOT EXISTS reminders (
  id                     TEXT PRIMARY KEY,
  title                  TEXT NOT NULL,
  description            TEXT NOT NULL DEFAULT '',
  time                   INTEGER NOT NULL,
  type                   TEXT NOT NULL DEFAULT 'ONE_TIME',
  repeat_interval        TEXT,
  custom_repeat_interval INTEGER,
  is_enabled             INTEGER NOT NULL DEFAULT 1,
  last_triggered         INTEGER,
  next_trigger           INTEGER,
  associated_task_id     TEXT,
  priority               TEXT NOT NULL DEFAULT 'NORMAL',
  tags                   TEXT NOT NULL DEFAULT '[]',
  created_at             INTEGER NOT NULL,
  updated_at             INTEGER NOT NULL
);
"#;

pub const CREATE_USER_PREFERENCES: &str = r#"
CREATE TABLE IF NOT EXISTS user_preferences (
  id         INTEGER PRIMARY KEY CHECK (id = 1),
  data       TEXT NOT NULL,
  updated_at INTEGER NOT NULL
);
"#;

pub const CREATE_USAGE_EVENTS: &str = r#"
CREATE TABLE IF NOT EXISTS usage_events (
  id           INTEGER PRIMARY KEY AUTOINCREMENT,
  package_name TEXT NOT NULL,
  kind         TEXT NOT NULL,
  timestamp    INTEGER NOT NULL
);
"#;

pub const CREATE_EMERGENCY_OVERRIDES: &str = r#"
CREATE TABLE IF NOT EXISTS emergency_overrides (
  id           INTEGER PRIMARY KEY AUTOINCREMENT,
  package_name TEXT NOT NULL,
  started_at   INTEGER NOT NULL
);
"#;

pub const CREATE_REPORTS: &str = r#"
CREATE TABLE IF NOT EXISTS reports (
  id           INTEGER PRIMARY KEY AUTOINCREMENT,
  date         TEXT NOT NULL UNIQUE,
  generated_at INTEGER NOT NULL,
  md_path      TEXT NOT NULL,
  json_path    TEXT NOT NULL
);
"#;

pub const INDEX_USAGE_EVENTS_TIMESTAMP: &str =
    "CREATE INDEX IF NOT EXISTS idx_usage_events_timestamp ON usage_events(timestamp);";

pub const INDEX_FOCUS_SESSIONS_START: &str =
    "CREATE INDEX IF NOT EXISTS idx_focus_sessions_start ON focus_sessions(start_time);";

pub const INDEX_TASKS_DUE: &str = "CREATE INDEX IF NOT EXISTS idx_tasks_due ON tasks(due_date);";

pub const INDEX_REMINDERS_NEXT: &str =
    "CREATE INDEX IF NOT EXISTS idx_reminders_next ON reminders(next_trigger);";

pub const INDEX_OVERRIDES_PACKAGE: &str =
    "CREATE INDEX IF NOT EXISTS idx_overrides_package ON emergency_overrides(package_name, started_at);";

pub fn schema_statements() -> Vec<&'static str> {
    vec![
        CREATE_APP_USAGE,
        CREATE_FOCUS_SESSIONS,
        CREATE_TASKS,
        CREATE_REMINDERS,
        CREATE_USER_PREFERENCES,
        CREATE_USAGE_EVENTS,
        CREATE_EMERGENCY_OVERRIDES,
        CREATE_REPORTS,
        INDEX_USAGE_EVENTS_TIMESTAMP,
        INDEX_FOCUS_SESSIONS_START,
        INDEX_TASKS_DUE,
        INDEX_REMINDERS_NEXT,
        INDEX_OVERRIDES_PACKAGE,
    ]
}

/// Tables replaced wholesale by a restore, children first.
pub const RESTORABLE_TABLES: &[&str] = &[
    "reminders",
    "focus_sessions",
    "tasks",
    "app_usage",
    "user_preferences",
];
