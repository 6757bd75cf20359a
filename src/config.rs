use anyhow::{Context, Result, anyhow, bail};
use chrono::NaiveTime;
use dirs::home_dir;
use serde::{Deserialize, Serialize};
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

const APP_DIR: &str = ".Darwesh";
const CONFIG_FILE: &str = "config.json";
const CATEGORIES_FILE: &str = "categories.json";
const DEFAULT_REPORT_TIME: &str = "23:30";
const MIN_POLL_MILLIS: u64 = 250;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub poll_millis: u64,
    pub report_time: String,
    pub report_dir: PathBuf,
    pub categories_path: PathBuf,
    pub db_path: PathBuf,
    pub backup_dir: PathBuf,
    pub max_backups: usize,
    pub retention_days: u32,
    pub notify_on_report: bool,
    pub desktop_notifications: bool,
}

impl Default for Config {
    fn default() -> Self {
        let root = default_root_dir();

        Self {
            poll_millis: 1_000,
            report_time: DEFAULT_REPORT_TIME.to_string(),
            report_dir: root.join("reports"),
            categories_path: root.join(CATEGORIES_FILE),
            db_path: root.join("db").join("darwesh.db"),
            backup_dir: root.join("backups"),
            max_backups: 5,
            retention_days: 90,
            notify_on_report: true,
            desktop_notifications: true,
        }
    }
}

impl Config {
    pub fn root_dir() -> PathBuf {
        default_root_dir()
    }

    pub fn config_path() -> PathBuf {
        default_root_dir().join(CONFIG_FILE)
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.poll_millis = config.poll_millis.max(MIN_POLL_MILLIS);

        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        set_mode_600(path)?;

        Ok(())
    }

    /// Creates every directory the service writes to and seeds the
    /// category overrides file.
    pub fn ensure_bootstrap_files(&self) -> Result<()> {
        if let Some(parent) = self.db_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create DB directory: {}", parent.display()))?;
        }

        for dir in [&self.report_dir, &self.backup_dir] {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }

        if !self.categories_path.exists() {
            if let Some(parent) = self.categories_path.parent() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create directory: {}", parent.display())
                })?;
            }
            fs::write(
                &self.categories_path,
                include_str!("../assets/categories.json"),
            )
            .with_context(|| {
                format!(
                    "Failed to create default categories file: {}",
                    self.categories_path.display()
                )
            })?;
            set_mode_600(&self.categories_path)?;
        }

        Ok(())
    }

    pub fn parse_report_time(&self) -> Result<NaiveTime> {
        parse_hhmm(&self.report_time)
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let normalized = normalize_config_key(key);

        match normalized {
            "poll_millis" => {
                let parsed = value
                    .parse::<u64>()
                    .map_err(|_| anyhow!("poll_millis must be a number"))?;
                if parsed < MIN_POLL_MILLIS {
                    bail!("poll_millis must be at least {MIN_POLL_MILLIS}");
                }
                self.poll_millis = parsed;
            }
            "report_time" => {
                parse_hhmm(value)?;
                self.report_time = value.to_string();
            }
            "report_dir" => self.report_dir = expand_home(value),
            "categories_path" => self.categories_path = expand_home(value),
            "db_path" => self.db_path = expand_home(value),
            "backup_dir" => self.backup_dir = expand_home(value),
            "max_backups" => {
                self.max_backups = value
                    .parse::<usize>()
                    .map_err(|_| anyhow!("max_backups must be a number"))?
                    .max(1);
            }
            "retention_days" => {
                self.retention_days = value
                    .parse::<u32>()
                    .map_err(|_| anyhow!("retention_days must be a number"))?;
            }
            "notify_on_report" => {
                self.notify_on_report = value
                    .parse::<bool>()
                    .map_err(|_| anyhow!("notify_on_report must be true/false"))?;
            }
            "desktop_notifications" => {
                self.desktop_notifications = value
                    .parse::<bool>()
                    .map_err(|_| anyhow!("desktop_notifications must be true/false"))?;
            }
            _ => {
                bail!(
                    "Unsupported config key: {key}. Supported keys: poll_millis|monitor.poll_millis, report_time|report.time, report_dir|report.dir, categories_path|categories.path, db_path|db.path, backup_dir|backup.dir, max_backups|backup.max, retention_days|retention.days, notify_on_report|report.notify, desktop_notifications|notify.desktop"
                );
            }
        }

        Ok(())
    }

    pub fn get_value(&self, key: &str) -> Option<String> {
        match normalize_config_key(key) {
            "poll_millis" => Some(self.poll_millis.to_string()),
            "report_time" => Some(self.report_time.clone()),
            "report_dir" => Some(self.report_dir.display().to_string()),
            "categories_path" => Some(self.categories_path.display().to_string()),
            "db_path" => Some(self.db_path.display().to_string()),
            "backup_dir" => Some(self.backup_dir.display().to_string()),
            "max_backups" => Some(self.max_backups.to_string()),
            "retention_days" => Some(self.retention_days.to_string()),
            "notify_on_report" => Some(self.notify_on_report.to_string()),
            "desktop_notifications" => Some(self.desktop_notifications.to_string()),
            _ => None,
        }
    }
}

fn normalize_config_key(key: &str) -> &str {
    match key {
        "poll_millis" | "monitor.poll_millis" => "poll_millis",
        "report_time" | "report.time" => "report_time",
        "report_dir" | "report.dir" => "report_dir",
        "categories_path" | "categories.path" => "categories_path",
        "db_path" | "db.path" => "db_path",
        "backup_dir" | "backup.dir" => "backup_dir",
        "max_backups" | "backup.max" => "max_backups",
        "retention_days" | "retention.days" => "retention_days",
        "notify_on_report" | "report.notify" => "notify_on_report",
        "desktop_notifications" | "notify.desktop" => "desktop_notifications",
        _ => key,
    }
}

pub fn parse_hhmm(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .with_context(|| format!("Invalid time format: {value}. Example: 23:30 (24-hour format)"))
}

pub fn expand_home(raw: &str) -> PathBuf {
    raw.strip_prefix("~/")
        .and_then(|stripped| home_dir().map(|home| home.join(stripped)))
        .unwrap_or_else(|| PathBuf::from(raw))
}

fn default_root_dir() -> PathBuf {
    home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

pub(crate) fn set_mode_600(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to set file permissions: {}", path.display()))?;
    }

    Ok(())
}
