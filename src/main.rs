mod analyzer;
mod backup;
mod cli;
mod collector;
mod config;
mod db;
mod models;
mod notifier;
mod policy;
mod scheduler;
mod scoring;
mod timeutil;

use crate::analyzer::categorizer::CategoryRules;
use crate::cli::{Cli, Commands, ConfigCommands};
use crate::collector::window::{ActiveWindowSource, window_access_available};
use crate::collector::{SharedEnforcer, UsageMonitor, lock_enforcer, run_usage_monitor};
use crate::config::{Config, parse_hhmm};
use crate::db::{Database, SharedDatabase, lock};
use crate::notifier::{Channel, Notification, PreferenceGate, SharedGate};
use crate::policy::Enforcer;
use crate::scheduler::{AlarmScheduler, ReminderSync, handle_reminder_fired, reschedule_reminders, sleep_or_shutdown};
use crate::timeutil::{format_duration, format_duration_long, now_millis, start_of_day, to_local};
use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime};
use clap::Parser;
use std::sync::{Arc, Mutex};
use tokio::signal;
use tokio::sync::watch;
use tokio::time::Duration;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

const REMINDER_SYNC_SECONDS: u64 = 60;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { force } => handle_init(force),
        Commands::Config { command } => handle_config_command(command),
        Commands::Status => handle_status(),
        Commands::Doctor => handle_doctor(),
        Commands::Service => {
            let config = load_config()?;
            run_service(config).await
        }
        Commands::Report { date } => handle_report(date),
        Commands::App { command } => cli::apps::handle_app_command(command, &load_config()?),
        Commands::Focus { command } => cli::focus::handle_focus_command(command, &load_config()?),
        Commands::Task { command } => cli::records::handle_task_command(command, &load_config()?),
        Commands::Reminder { command } => cli::records::handle_reminder_command(command, &load_config()?),
        Commands::Prefs { command } => cli::storage::handle_prefs_command(command, &load_config()?),
        Commands::Backup { command } => cli::storage::handle_backup_command(command, &load_config()?),
        Commands::Usage { command } => cli::apps::handle_usage_command(command, &load_config()?),
    }
}

fn handle_init(force: bool) -> Result<()> {
    let config_path = Config::config_path();
    let config = if config_path.exists() && !force {
        println!("config.json already exists: {}", config_path.display());
        Config::load()?
    } else {
        let config = Config::default();
        config.save()?;
        println!("config.json written: {}", config_path.display());
        config
    };

    config.ensure_bootstrap_files()?;
    let mut database = Database::open(&config.db_path)?;
    database.update_preferences(now_millis(), |prefs| {
        prefs.first_launch = false;
        Ok(())
    })?;
    let device_id = backup::device_id(&Config::root_dir())?;

    println!("Darwesh initialized");
    println!("- database: {}", config.db_path.display());
    println!("- reports: {}", config.report_dir.display());
    println!("- backups: {}", config.backup_dir.display());
    println!("- categories: {}", config.categories_path.display());
    println!("- device_id: {device_id}");
    println!("Run `darwesh service` to start tracking.");

    Ok(())
}

fn handle_config_command(command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Set { key, value } => {
            let mut config = load_or_default_config()?;
            config.set_value(&key, &value)?;
            config.ensure_bootstrap_files()?;
            config.save()?;

            println!("Config saved: {key} = {value}");
            Ok(())
        }
        ConfigCommands::Get { key } => {
            let config = load_config()?;
            let value = config
                .get_value(&key)
                .with_context(|| format!("Unsupported config key: {key}"))?;

            println!("{value}");
            Ok(())
        }
    }
}

fn handle_status() -> Result<()> {
    let config = load_config()?;
    let database = cli::open_database(&config)?;
    let prefs = database.preferences()?;
    let now = now_millis();

    println!("Darwesh status");
    println!(
        "- last_event_at: {}",
        database
            .latest_usage_event()?
            .map(|event| format!("{} ({})", to_local(event.timestamp).format("%Y-%m-%d %H:%M:%S"), event.package_name))
            .unwrap_or_else(|| "none".to_string())
    );
    println!("- screen_time_today: {}", format_duration_long(database.total_screen_time()?));
    println!("- over_limit_apps: {}", database.over_limit_apps()?.len());
    println!(
        "- focus_session: {}",
        database
            .active_session(now)?
            .filter(|session| session.is_running_at(now))
            .map(|session| format!("{} running, {} left", session.kind, format_duration(session.planned_end() - now)))
            .unwrap_or_else(|| "none".to_string())
    );
    println!("- upcoming_reminders: {}", database.upcoming_reminders(now)?.len());
    println!("- overdue_tasks: {}", database.overdue_tasks(now)?.len());
    println!(
        "- focus_time_today: {}",
        format_duration_long(database.focus_time_between(start_of_day(now), now)?)
    );
    println!(
        "- latest_report: {}",
        database
            .latest_report_meta()?
            .map(|meta| format!("{} ({})", meta.date, meta.md_path))
            .unwrap_or_else(|| "none".to_string())
    );
    println!(
        "- last_backup_at: {}",
        prefs
            .last_backup_time
            .map(|at| to_local(at).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "never".to_string())
    );

    Ok(())
}

fn handle_doctor() -> Result<()> {
    let config_path = Config::config_path();
    let mut issues = Vec::new();

    if config_path.exists() {
        println!("[OK] config.json found: {}", config_path.display());
    } else {
        println!("[WARN] config.json not found: {}", config_path.display());
        issues.push("config missing".to_string());
    }

    let config = load_or_default_config()?;

    match Database::open(&config.db_path) {
        Ok(_) => println!("[OK] SQLite reachable: {}", config.db_path.display()),
        Err(error) => {
            println!("[WARN] SQLite check failed: {error}");
            issues.push("db unreachable".to_string());
        }
    }

    for (label, dir) in [("report", &config.report_dir), ("backup", &config.backup_dir)] {
        if dir.exists() {
            println!("[OK] {label} dir exists: {}", dir.display());
        } else {
            println!("[WARN] {label} dir missing: {}", dir.display());
            issues.push(format!("{label} dir missing"));
        }
    }

    if let Err(error) = config.parse_report_time() {
        println!("[WARN] invalid report_time setting: {error}");
        issues.push("invalid report_time".to_string());
    } else {
        println!("[OK] report_time format valid: {}", config.report_time);
    }

    match CategoryRules::load(&config.categories_path) {
        Ok(_) => println!("[OK] category rules loaded: {}", config.categories_path.display()),
        Err(error) => {
            println!("[WARN] category rules unreadable, built-in tables only: {error}");
            issues.push("category rules invalid".to_string());
        }
    }

    if window_access_available() {
        println!("[OK] foreground app sampling available");
    } else {
        println!("[WARN] foreground app sampling unavailable (window access or xdotool missing)");
        issues.push("window access missing".to_string());
    }

    if issues.is_empty() {
        println!("doctor result: no issues");
    } else {
        println!("doctor result: {} warning(s)", issues.len());
    }

    Ok(())
}

fn handle_report(date: Option<String>) -> Result<()> {
    let config = load_config()?;
    let target_date = cli::parse_optional_date(date)?;
    let db = Database::open_shared(&config.db_path)?;
    let rules = load_category_rules(&config)?;
    let gate: SharedGate = Arc::new(PreferenceGate::new(notifier::from_config(config.desktop_notifications)));

    run_daily_pipeline(&config, &db, &rules, &gate, target_date)
}

async fn run_service(config: Config) -> Result<()> {
    config.ensure_bootstrap_files()?;
    let db = Database::open_shared(&config.db_path)?;
    let stale = lock(&db).reset_stale_usage(now_millis())?;
    if stale > 0 {
        info!(apps = stale, "cleared usage totals from an earlier day");
    }

    let shared_config = Arc::new(config);
    let rules = Arc::new(load_category_rules(&shared_config)?);
    let enforcer: SharedEnforcer = Arc::new(Mutex::new(Enforcer::new()));
    let gate: SharedGate = Arc::new(PreferenceGate::new(notifier::from_config(
        shared_config.desktop_notifications,
    )));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let monitor = UsageMonitor::new(
        ActiveWindowSource::new(),
        Arc::clone(&db),
        Arc::clone(&rules),
        Arc::clone(&enforcer),
        Arc::clone(&gate),
        now_millis(),
    );

    let alarms = AlarmScheduler::new();
    reschedule_reminders(&db, &alarms, now_millis())?;
    if alarms.is_empty() {
        debug!("no reminder alarms pending");
    }

    info!("Darwesh service started");

    let alarm_loop = alarms.run(
        |id, fired_at| {
            if let Err(error) = handle_reminder_fired(&db, gate.as_ref(), id, fired_at) {
                error!(error = %error, reminder = id, "failed to handle reminder");
            }
        },
        shutdown_rx.clone(),
    );

    let sync_loop = {
        let mut shutdown = shutdown_rx.clone();
        let (db, alarms) = (&db, &alarms);
        async move {
            let mut sync = ReminderSync::new();
            while !sleep_or_shutdown(Duration::from_secs(REMINDER_SYNC_SECONDS), &mut shutdown).await {
                match sync.sync(db, alarms, now_millis()) {
                    Ok(count) => debug!(scheduled = count, pending = alarms.len(), "reminders synced"),
                    Err(error) => error!(error = %error, "reminder sync failed"),
                }
            }
        }
    };

    let reset_job = scheduler::run_daily_job(
        "daily-reset",
        || Ok(NaiveTime::MIN),
        |date| {
            let db = Arc::clone(&db);
            let enforcer = Arc::clone(&enforcer);
            let retention_days = shared_config.retention_days;
            async move { reset_day(&db, &enforcer, retention_days, date) }
        },
        shutdown_rx.clone(),
    );

    let report_job = scheduler::run_daily_job(
        "daily-report",
        || {
            let report_time = Config::load()
                .map(|runtime| runtime.report_time)
                .unwrap_or_else(|_| shared_config.report_time.clone());

            parse_hhmm(&report_time)
        },
        |date| {
            let config = Arc::clone(&shared_config);
            let db = Arc::clone(&db);
            let rules = Arc::clone(&rules);
            let gate = Arc::clone(&gate);
            async move {
                let runtime_config = Config::load().unwrap_or_else(|_| (*config).clone());
                run_daily_pipeline(&runtime_config, &db, &rules, &gate, date)?;
                run_auto_backup(&runtime_config, &db)
            }
        },
        shutdown_rx.clone(),
    );

    let signal_listener = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("shutdown signal received"),
            Err(error) => error!(error = %error, "failed to listen for shutdown signal"),
        }
        let _ = shutdown_tx.send(true);
    };

    tokio::join!(
        run_usage_monitor(monitor, shared_config.poll_millis, shutdown_rx.clone()),
        alarm_loop,
        sync_loop,
        reset_job,
        report_job,
        signal_listener
    );

    alarms.stop();
    info!("Darwesh service stopped");
    Ok(())
}

/// Local midnight: usage-today counters and override budgets start over.
fn reset_day(db: &SharedDatabase, enforcer: &SharedEnforcer, retention_days: u32, date: NaiveDate) -> Result<()> {
    let (apps, pruned) = {
        let database = lock(db);
        let apps = database.reset_daily_usage()?;
        let pruned = database.cleanup_old_usage_events(retention_days, now_millis())?;
        (apps, pruned)
    };
    lock_enforcer(enforcer).reset_day();

    info!(date = %date, apps, pruned_events = pruned, "daily usage reset");
    Ok(())
}

fn run_daily_pipeline(
    config: &Config,
    db: &SharedDatabase,
    rules: &CategoryRules,
    gate: &SharedGate,
    date: NaiveDate,
) -> Result<()> {
    let (report, saved) = analyzer::generate_and_store_report(config, db, rules, date)?;

    if config.notify_on_report {
        let now = now_millis();
        let (prefs, focus_active) = {
            let database = lock(db);
            (database.preferences()?, database.session_covering(now)?.is_some())
        };
        let notification = Notification::new(
            Channel::Productivity,
            format!("Daily report {}", report.date),
            format!(
                "Productivity score {}, screen time {}",
                report.productivity_score,
                format_duration_long(report.screen_time_ms)
            ),
        );
        gate.deliver(&prefs, &notification, now, focus_active);
    }

    println!("Report generated: {}", report.date);
    println!("- Markdown: {}", saved.markdown_path.display());
    println!("- JSON: {}", saved.json_path.display());

    Ok(())
}

fn run_auto_backup(config: &Config, db: &SharedDatabase) -> Result<()> {
    let now = now_millis();
    let mut database = lock(db);
    if !backup::should_perform_backup(&database.preferences()?, now) {
        debug!("automatic backup not due");
        return Ok(());
    }

    let device_id = backup::device_id(&Config::root_dir())?;
    let path = backup::export_rotating(&mut database, &config.backup_dir, &device_id, config.max_backups, now)?;
    info!(path = %path.display(), "automatic backup written");

    Ok(())
}

fn load_category_rules(config: &Config) -> Result<CategoryRules> {
    CategoryRules::load(&config.categories_path).with_context(|| {
        format!(
            "Failed to load category rules: {}",
            config.categories_path.display()
        )
    })
}

fn load_or_default_config() -> Result<Config> {
    Config::load().or_else(|_| {
        let config = Config::default();
        config.ensure_bootstrap_files()?;
        config.save()?;
        Ok(config)
    })
}

fn load_config() -> Result<Config> {
    Config::load().with_context(|| "Config file not found. Run `darwesh init` first.".to_string())
}
