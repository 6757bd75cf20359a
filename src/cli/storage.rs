use super::{BackupCommands, PrefsCommands, open_database};
use crate::backup;
use crate::config::{Config, expand_home};
use crate::models::UserPreferences;
use crate::timeutil::{days_between, format_date, now_millis};
use anyhow::{Context, Result};

pub fn handle_prefs_command(command: PrefsCommands, config: &Config) -> Result<()> {
    let mut database = open_database(config)?;
    let now = now_millis();

    match command {
        PrefsCommands::Show => {
            let prefs = database.preferences()?;
            for key in UserPreferences::KEYS {
                let value = prefs.get_value(key).unwrap_or_else(|| "-".to_string());
                println!("{key} = {value}");
            }
            Ok(())
        }
        PrefsCommands::Set { key, value } => {
            let prefs = database.update_preferences(now, |prefs| prefs.set_value(&key, &value))?;
            let stored = prefs
                .get_value(&key)
                .with_context(|| format!("Unsupported preference key: {key}"))?;
            println!("Preference saved: {key} = {stored}");
            Ok(())
        }
        PrefsCommands::Reset => {
            database.reset_preferences(now)?;
            println!("Preferences reset to defaults");
            Ok(())
        }
    }
}

pub fn handle_backup_command(command: BackupCommands, config: &Config) -> Result<()> {
    let now = now_millis();

    match command {
        BackupCommands::Create { path } => {
            let mut database = open_database(config)?;
            let device_id = backup::device_id(&Config::root_dir())?;

            let written = match path {
                Some(raw) => {
                    let target = expand_home(&raw);
                    backup::export(&mut database, &target, &device_id, now)?;
                    target
                }
                None => backup::export_rotating(
                    &mut database,
                    &config.backup_dir,
                    &device_id,
                    config.max_backups,
                    now,
                )?,
            };
            println!("Backup written: {}", written.display());
            Ok(())
        }
        BackupCommands::Restore { path } => {
            let mut database = open_database(config)?;
            let document = backup::restore(&mut database, &expand_home(&path))?;

            println!(
                "Backup restored from {} ({})",
                format_date(document.timestamp, database.preferences()?.date_format),
                document.device_id
            );
            println!("- tasks: {}", document.tasks.data.len());
            println!("- apps: {}", document.app_usage.data.len());
            println!("- focus_sessions: {}", document.focus_sessions.data.len());
            println!("- reminders: {}", document.reminders.data.len());
            println!("- age_days: {}", days_between(document.timestamp, now));
            Ok(())
        }
        BackupCommands::Validate { path } => {
            let path = expand_home(&path);
            match backup::validate_file(&path) {
                Ok(document) => println!(
                    "[OK] version {} with {} task(s), {} app(s), {} session(s), {} reminder(s)",
                    document.version,
                    document.tasks.data.len(),
                    document.app_usage.data.len(),
                    document.focus_sessions.data.len(),
                    document.reminders.data.len()
                ),
                Err(error) => println!("[WARN] invalid backup {}: {error}", path.display()),
            }
            Ok(())
        }
        BackupCommands::List => {
            let files = backup::list_backups(&config.backup_dir)?;
            if files.is_empty() {
                println!("no backups in {}", config.backup_dir.display());
            }
            for file in files {
                println!("{}", file.display());
            }
            Ok(())
        }
    }
}
