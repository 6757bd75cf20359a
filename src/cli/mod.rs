pub mod apps;
pub mod focus;
pub mod records;
pub mod storage;

use crate::config::Config;
use crate::db::Database;
use crate::timeutil::{now_millis, parse_local_datetime};
use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "darwesh",
    about = "Local digital wellbeing: app limits, focus sessions, tasks and reminders"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create the config file, data directories and database.
    Init {
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    Status,
    Doctor,
    /// Run the usage monitor, reminder alarms and daily jobs until Ctrl-C.
    Service,
    Report {
        #[arg(long)]
        date: Option<String>,
    },
    App {
        #[command(subcommand)]
        command: AppCommands,
    },
    Focus {
        #[command(subcommand)]
        command: FocusCommands,
    },
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },
    Reminder {
        #[command(subcommand)]
        command: ReminderCommands,
    },
    Prefs {
        #[command(subcommand)]
        command: PrefsCommands,
    },
    Backup {
        #[command(subcommand)]
        command: BackupCommands,
    },
    Usage {
        #[command(subcommand)]
        command: UsageCommands,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    Set { key: String, value: String },
    Get { key: String },
}

#[derive(Debug, Subcommand)]
pub enum AppCommands {
    List {
        #[arg(long)]
        category: Option<String>,
        #[arg(long, default_value_t = false)]
        blocked: bool,
        #[arg(long, default_value_t = false)]
        over_limit: bool,
        #[arg(long, default_value_t = false)]
        whitelisted: bool,
        /// Show only the N most used apps.
        #[arg(long)]
        top: Option<usize>,
    },
    Show {
        package: String,
    },
    /// Start tracking an app before it is first seen.
    Add {
        package: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        category: Option<String>,
    },
    /// Daily limit in minutes, 0 removes it.
    Limit {
        package: String,
        minutes: i64,
    },
    Block {
        package: String,
    },
    Unblock {
        package: String,
    },
    Whitelist {
        package: String,
        #[arg(long, default_value_t = false)]
        remove: bool,
    },
    /// Print the category for a package, or store one with --set.
    Classify {
        package: String,
        #[arg(long)]
        set: Option<String>,
    },
    /// Suggest a daily limit from recent usage.
    Recommend {
        package: String,
        #[arg(long, default_value_t = 7)]
        days: i64,
    },
    /// Evaluate the blocking policy for a package right now.
    Check {
        package: String,
    },
    Stats,
    /// Grant a five minute emergency override.
    Override {
        package: String,
    },
    Delete {
        package: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum FocusCommands {
    Start {
        /// focus, short-break, long-break, or break to follow the long-break cycle.
        #[arg(long, default_value = "focus")]
        kind: String,
        /// Defaults to the preference for the session kind.
        #[arg(long)]
        minutes: Option<i64>,
        #[arg(long = "task")]
        tasks: Vec<String>,
    },
    /// Complete the given session, or the running one.
    Complete {
        id: Option<String>,
        #[arg(long, default_value_t = 0)]
        interruptions: u32,
        #[arg(long, default_value_t = false)]
        interrupted: bool,
    },
    List {
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long)]
        kind: Option<String>,
    },
    Delete {
        id: String,
    },
    /// today, week, month or all.
    Stats {
        #[arg(long, default_value = "all")]
        period: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum TaskCommands {
    Add {
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        priority: Option<String>,
        /// Local time, `YYYY-MM-DD HH:MM`.
        #[arg(long)]
        due: Option<String>,
    },
    List {
        #[arg(long)]
        sort: Option<String>,
        #[arg(long, default_value_t = false)]
        all: bool,
        #[arg(long, default_value_t = false)]
        overdue: bool,
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        priority: Option<String>,
        /// Tasks due today.
        #[arg(long, default_value_t = false)]
        today: bool,
    },
    Toggle {
        id: String,
    },
    Priority {
        id: String,
        priority: String,
    },
    Delete {
        id: String,
    },
    ClearCompleted,
}

#[derive(Debug, Subcommand)]
pub enum ReminderCommands {
    Add {
        title: String,
        /// Local time, `YYYY-MM-DD HH:MM`.
        #[arg(long)]
        at: String,
        #[arg(long, default_value = "")]
        description: String,
        /// daily, weekly, monthly or custom.
        #[arg(long)]
        repeat: Option<String>,
        /// Period for `--repeat custom`.
        #[arg(long)]
        every_minutes: Option<i64>,
        #[arg(long)]
        priority: Option<String>,
        #[arg(long)]
        task: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    List {
        #[arg(long, default_value_t = false)]
        upcoming: bool,
        #[arg(long)]
        priority: Option<String>,
        #[arg(long)]
        task: Option<String>,
    },
    Toggle {
        id: String,
    },
    Delete {
        id: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum PrefsCommands {
    Show,
    Set { key: String, value: String },
    Reset,
}

#[derive(Debug, Subcommand)]
pub enum BackupCommands {
    /// Export every table. Defaults to a timestamped file in the backup dir.
    Create {
        #[arg(long)]
        path: Option<String>,
    },
    Restore {
        path: String,
    },
    Validate {
        path: String,
    },
    List,
}

#[derive(Debug, Subcommand)]
pub enum UsageCommands {
    /// Per-app foreground time from recorded events.
    Aggregate {
        #[arg(long)]
        date: Option<String>,
        #[arg(long, default_value_t = 1)]
        days: i64,
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
}

/// Opens the store with usage totals from an earlier day cleared.
pub fn open_database(config: &Config) -> Result<Database> {
    let database = Database::open(&config.db_path)?;
    database.reset_stale_usage(now_millis())?;
    Ok(database)
}

pub fn parse_optional_date(input: Option<String>) -> Result<NaiveDate> {
    input
        .as_deref()
        .map(|date| {
            NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .with_context(|| format!("Invalid date format: {date}. Example: 2026-02-18"))
        })
        .transpose()?
        .map_or_else(|| Ok(Local::now().date_naive()), Ok)
}

pub fn parse_when(input: &str) -> Result<i64> {
    parse_local_datetime(input)
        .with_context(|| format!("Invalid time: {input}. Example: 2026-02-18 09:30"))
}

/// `count` units of `unit_ms` in ms, rejecting inputs that overflow.
pub fn span_ms(count: i64, unit_ms: i64, flag: &str) -> Result<i64> {
    count
        .checked_mul(unit_ms)
        .with_context(|| format!("{flag} is too large: {count}"))
}

/// Start of a window of `count` units ending at `end`.
pub fn window_start(end: i64, count: i64, unit_ms: i64, flag: &str) -> Result<i64> {
    span_ms(count, unit_ms, flag)?
        .checked_neg()
        .and_then(|span| end.checked_add(span))
        .with_context(|| format!("{flag} is too large: {count}"))
}

/// CLI rendering of a read-modify-write result.
pub fn report_change(changed: bool, what: &str, id: &str) {
    if changed {
        println!("{what}: {id}");
    } else {
        println!("not found: {id}");
    }
}
