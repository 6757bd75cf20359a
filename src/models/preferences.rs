use super::{SessionKind, TaskPriority};
use crate::timeutil::{DAY_MS, MINUTE_MS};
use anyhow::{Result, anyhow, bail};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeFormat {
    #[serde(rename = "HOURS_12")]
    Hours12,
    #[serde(rename = "HOURS_24")]
    Hours24,
}

text_enum!(TimeFormat {
    Hours12 => "HOURS_12",
    Hours24 => "HOURS_24",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DateFormat {
    Iso,
    Us,
    Eu,
}

text_enum!(DateFormat {
    Iso => "ISO",
    Us => "US",
    Eu => "EU",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskSortOption {
    CreationDate,
    DueDate,
    Priority,
    Alphabetical,
}

text_enum!(TaskSortOption {
    CreationDate => "CREATION_DATE",
    DueDate => "DUE_DATE",
    Priority => "PRIORITY",
    Alphabetical => "ALPHABETICAL",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackupFrequency {
    Daily,
    Weekly,
    Monthly,
    Never,
}

text_enum!(BackupFrequency {
    Daily => "DAILY",
    Weekly => "WEEKLY",
    Monthly => "MONTHLY",
    Never => "NEVER",
});

impl BackupFrequency {
    pub fn period(self) -> Option<i64> {
        match self {
            Self::Daily => Some(DAY_MS),
            Self::Weekly => Some(7 * DAY_MS),
            Self::Monthly => Some(30 * DAY_MS),
            Self::Never => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserPreferences {
    pub is_dark_mode: bool,
    pub accent_color: String,

    pub is_notifications_enabled: bool,
    pub notification_sound: bool,
    pub notification_vibration: bool,
    pub quiet_hours_enabled: bool,
    pub quiet_hours_start: u32,
    pub quiet_hours_end: u32,

    /// Minutes.
    pub pomodoro_length: u32,
    pub short_break_length: u32,
    pub long_break_length: u32,
    pub long_break_interval: u32,
    pub auto_start_breaks: bool,
    pub auto_start_pomodoros: bool,

    pub is_strict_mode_enabled: bool,
    pub block_notifications: bool,
    pub allow_emergency_override: bool,
    pub emergency_override_limit: u32,

    pub language: String,
    pub time_format: TimeFormat,
    pub date_format: DateFormat,

    pub show_screen_time: bool,
    pub show_focus_score: bool,
    pub show_productivity_tips: bool,
    pub show_weekly_report: bool,

    pub default_task_priority: TaskPriority,
    pub show_completed_tasks: bool,
    pub sort_tasks_by: TaskSortOption,

    pub auto_backup_enabled: bool,
    pub backup_frequency: BackupFrequency,
    pub last_backup_time: Option<i64>,

    pub first_launch: bool,
    pub last_update_version: Option<String>,
    pub updated_at: i64,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            is_dark_mode: false,
            accent_color: "#2196F3".to_string(),
            is_notifications_enabled: true,
            notification_sound: true,
            notification_vibration: true,
            quiet_hours_enabled: false,
            quiet_hours_start: 22,
            quiet_hours_end: 7,
            pomodoro_length: 25,
            short_break_length: 5,
            long_break_length: 15,
            long_break_interval: 4,
            auto_start_breaks: false,
            auto_start_pomodoros: false,
            is_strict_mode_enabled: false,
            block_notifications: false,
            allow_emergency_override: true,
            emergency_override_limit: 3,
            language: "en".to_string(),
            time_format: TimeFormat::Hours24,
            date_format: DateFormat::Iso,
            show_screen_time: true,
            show_focus_score: true,
            show_productivity_tips: true,
            show_weekly_report: true,
            default_task_priority: TaskPriority::Medium,
            show_completed_tasks: true,
            sort_tasks_by: TaskSortOption::DueDate,
            auto_backup_enabled: true,
            backup_frequency: BackupFrequency::Weekly,
            last_backup_time: None,
            first_launch: true,
            last_update_version: None,
            updated_at: 0,
        }
    }
}

impl UserPreferences {
    /// Planned length of a new session of `kind`, in ms.
    pub fn session_length(&self, kind: SessionKind) -> i64 {
        let minutes = match kind {
            SessionKind::Focus => self.pomodoro_length,
            SessionKind::ShortBreak => self.short_break_length,
            SessionKind::LongBreak => self.long_break_length,
        };

        if minutes == 0 {
            kind.default_duration()
        } else {
            i64::from(minutes) * MINUTE_MS
        }
    }

    /// True when `hour` falls in the quiet window, which may wrap midnight.
    pub fn is_quiet_hour(&self, hour: u32) -> bool {
        if !self.quiet_hours_enabled {
            return false;
        }

        let (start, end) = (self.quiet_hours_start, self.quiet_hours_end);
        if start == end {
            false
        } else if start < end {
            (start..end).contains(&hour)
        } else {
            hour >= start || hour < end
        }
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let key = normalize_preference_key(key);
        match key {
            "is_dark_mode" => self.is_dark_mode = parse_bool(key, value)?,
            "accent_color" => {
                let color = value.trim();
                if !color.starts_with('#') || !matches!(color.len(), 7 | 9) {
                    bail!("accent_color must look like #RRGGBB");
                }
                self.accent_color = color.to_string();
            }
            "is_notifications_enabled" => self.is_notifications_enabled = parse_bool(key, value)?,
            "notification_sound" => self.notification_sound = parse_bool(key, value)?,
            "notification_vibration" => self.notification_vibration = parse_bool(key, value)?,
            "quiet_hours_enabled" => self.quiet_hours_enabled = parse_bool(key, value)?,
            "quiet_hours_start" => self.quiet_hours_start = parse_hour(key, value)?,
            "quiet_hours_end" => self.quiet_hours_end = parse_hour(key, value)?,
            "pomodoro_length" => self.pomodoro_length = parse_minutes(key, value)?,
            "short_break_length" => self.short_break_length = parse_minutes(key, value)?,
            "long_break_length" => self.long_break_length = parse_minutes(key, value)?,
            "long_break_interval" => self.long_break_interval = parse_minutes(key, value)?,
            "auto_start_breaks" => self.auto_start_breaks = parse_bool(key, value)?,
            "auto_start_pomodoros" => self.auto_start_pomodoros = parse_bool(key, value)?,
            "is_strict_mode_enabled" => self.is_strict_mode_enabled = parse_bool(key, value)?,
            "block_notifications" => self.block_notifications = parse_bool(key, value)?,
            "allow_emergency_override" => self.allow_emergency_override = parse_bool(key, value)?,
            "emergency_override_limit" => {
                self.emergency_override_limit = value
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| anyhow!("emergency_override_limit must be a number"))?;
            }
            "language" => {
                let language = value.trim();
                if language.is_empty() {
                    bail!("language must not be empty");
                }
                self.language = language.to_string();
            }
            "time_format" => self.time_format = value.parse()?,
            "date_format" => self.date_format = value.parse()?,
            "show_screen_time" => self.show_screen_time = parse_bool(key, value)?,
            "show_focus_score" => self.show_focus_score = parse_bool(key, value)?,
            "show_productivity_tips" => self.show_productivity_tips = parse_bool(key, value)?,
            "show_weekly_report" => self.show_weekly_report = parse_bool(key, value)?,
            "default_task_priority" => self.default_task_priority = value.parse()?,
            "show_completed_tasks" => self.show_completed_tasks = parse_bool(key, value)?,
            "sort_tasks_by" => self.sort_tasks_by = value.parse()?,
            "auto_backup_enabled" => self.auto_backup_enabled = parse_bool(key, value)?,
            "backup_frequency" => self.backup_frequency = value.parse()?,
            "first_launch" => self.first_launch = parse_bool(key, value)?,
            _ => bail!("Unsupported preference key: {key}. Run `darwesh prefs show` for the list"),
        }

        Ok(())
    }

    pub fn get_value(&self, key: &str) -> Option<String> {
        let value = match normalize_preference_key(key) {
            "is_dark_mode" => self.is_dark_mode.to_string(),
            "accent_color" => self.accent_color.clone(),
            "is_notifications_enabled" => self.is_notifications_enabled.to_string(),
            "notification_sound" => self.notification_sound.to_string(),
            "notification_vibration" => self.notification_vibration.to_string(),
            "quiet_hours_enabled" => self.quiet_hours_enabled.to_string(),
            "quiet_hours_start" => self.quiet_hours_start.to_string(),
            "quiet_hours_end" => self.quiet_hours_end.to_string(),
            "pomodoro_length" => self.pomodoro_length.to_string(),
            "short_break_length" => self.short_break_length.to_string(),
            "long_break_length" => self.long_break_length.to_string(),
            "long_break_interval" => self.long_break_interval.to_string(),
            "auto_start_breaks" => self.auto_start_breaks.to_string(),
            "auto_start_pomodoros" => self.auto_start_pomodoros.to_string(),
            "is_strict_mode_enabled" => self.is_strict_mode_enabled.to_string(),
            "block_notifications" => self.block_notifications.to_string(),
            "allow_emergency_override" => self.allow_emergency_override.to_string(),
            "emergency_override_limit" => self.emergency_override_limit.to_string(),
            "language" => self.language.clone(),
            "time_format" => self.time_format.to_string(),
            "date_format" => self.date_format.to_string(),
            "show_screen_time" => self.show_screen_time.to_string(),
            "show_focus_score" => self.show_focus_score.to_string(),
            "show_productivity_tips" => self.show_productivity_tips.to_string(),
            "show_weekly_report" => self.show_weekly_report.to_string(),
            "default_task_priority" => self.default_task_priority.to_string(),
            "show_completed_tasks" => self.show_completed_tasks.to_string(),
            "sort_tasks_by" => self.sort_tasks_by.to_string(),
            "auto_backup_enabled" => self.auto_backup_enabled.to_string(),
            "backup_frequency" => self.backup_frequency.to_string(),
            "last_backup_time" => self
                .last_backup_time
                .map(|value| value.to_string())
                .unwrap_or_else(|| "never".to_string()),
            "first_launch" => self.first_launch.to_string(),
            "last_update_version" => self.last_update_version.clone().unwrap_or_default(),
            _ => return None,
        };

        Some(value)
    }

    pub const KEYS: &'static [&'static str] = &[
        "is_dark_mode",
        "accent_color",
        "is_notifications_enabled",
        "notification_sound",
        "notification_vibration",
        "quiet_hours_enabled",
        "quiet_hours_start",
        "quiet_hours_end",
        "pomodoro_length",
        "short_break_length",
        "long_break_length",
        "long_break_interval",
        "auto_start_breaks",
        "auto_start_pomodoros",
        "is_strict_mode_enabled",
        "block_notifications",
        "allow_emergency_override",
        "emergency_override_limit",
        "language",
        "time_format",
        "date_format",
        "show_screen_time",
        "show_focus_score",
        "show_productivity_tips",
        "show_weekly_report",
        "default_task_priority",
        "show_completed_tasks",
        "sort_tasks_by",
        "auto_backup_enabled",
        "backup_frequency",
        "last_backup_time",
        "first_launch",
        "last_update_version",
    ];
}

fn normalize_preference_key(key: &str) -> &str {
    match key {
        "theme.dark" | "dark_mode" => "is_dark_mode",
        "theme.accent" => "accent_color",
        "notifications.enabled" => "is_notifications_enabled",
        "notifications.sound" => "notification_sound",
        "notifications.vibration" => "notification_vibration",
        "quiet_hours.enabled" => "quiet_hours_enabled",
        "quiet_hours.start" => "quiet_hours_start",
        "quiet_hours.end" => "quiet_hours_end",
        "focus.length" | "timer.pomodoro" => "pomodoro_length",
        "timer.short_break" => "short_break_length",
        "timer.long_break" => "long_break_length",
        "timer.long_break_interval" => "long_break_interval",
        "blocking.strict" | "strict_mode" => "is_strict_mode_enabled",
        "blocking.override" => "allow_emergency_override",
        "blocking.override_limit" => "emergency_override_limit",
        "tasks.default_priority" => "default_task_priority",
        "tasks.sort" => "sort_tasks_by",
        "backup.auto" => "auto_backup_enabled",
        "backup.frequency" => "backup_frequency",
        _ => key,
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    value
        .trim()
        .parse::<bool>()
        .map_err(|_| anyhow!("{key} must be true/false"))
}

fn parse_hour(key: &str, value: &str) -> Result<u32> {
    let hour = value
        .trim()
        .parse::<u32>()
        .map_err(|_| anyhow!("{key} must be an hour between 0 and 23"))?;
    if hour > 23 {
        bail!("{key} must be an hour between 0 and 23");
    }
    Ok(hour)
}

fn parse_minutes(key: &str, value: &str) -> Result<u32> {
    let minutes = value
        .trim()
        .parse::<u32>()
        .map_err(|_| anyhow!("{key} must be a positive number"))?;
    if minutes == 0 {
        bail!("{key} must be a positive number");
    }
    Ok(minutes)
}

#[cfg(test)]
mod tests {
    use super::{BackupFrequency, TimeFormat, UserPreferences};
    use crate::models::SessionKind;
    use crate::timeutil::MINUTE_MS;

    #[test]
    fn session_length_follows_preferences() {
        let mut prefs = UserPreferences {
            pomodoro_length: 50,
            ..UserPreferences::default()
        };
        assert_eq!(prefs.session_length(SessionKind::Focus), 50 * MINUTE_MS);
        assert_eq!(prefs.session_length(SessionKind::ShortBreak), 5 * MINUTE_MS);

        prefs.long_break_length = 0;
        assert_eq!(
            prefs.session_length(SessionKind::LongBreak),
            SessionKind::LongBreak.default_duration()
        );
    }

    #[test]
    fn quiet_hours_wrap_midnight() {
        let prefs = UserPreferences {
            quiet_hours_enabled: true,
            ..UserPreferences::default()
        };

        assert!(prefs.is_quiet_hour(23));
        assert!(prefs.is_quiet_hour(3));
        assert!(!prefs.is_quiet_hour(7));
        assert!(!prefs.is_quiet_hour(12));
        assert!(!UserPreferences::default().is_quiet_hour(23));
    }

    #[test]
    fn set_value_accepts_aliases_and_rejects_garbage() {
        let mut prefs = UserPreferences::default();

        prefs.set_value("backup.frequency", "daily").expect("alias");
        assert_eq!(prefs.backup_frequency, BackupFrequency::Daily);

        prefs.set_value("time_format", "hours-12").expect("enum");
        assert_eq!(prefs.time_format, TimeFormat::Hours12);

        assert!(prefs.set_value("quiet_hours_start", "24").is_err());
        assert!(prefs.set_value("pomodoro_length", "0").is_err());
        assert!(prefs.set_value("nope", "1").is_err());
    }

    #[test]
    fn every_listed_key_is_readable() {
        let prefs = UserPreferences::default();
        for key in UserPreferences::KEYS {
            assert!(prefs.get_value(key).is_some(), "missing key {key}");
        }
    }

    #[test]
    fn missing_json_fields_fall_back_to_defaults() {
        let prefs: UserPreferences =
            serde_json::from_str(r#"{"isDarkMode":true,"timeFormat":"HOURS_12"}"#).expect("parse");
        assert!(prefs.is_dark_mode);
        assert_eq!(prefs.time_format, TimeFormat::Hours12);
        assert_eq!(prefs.pomodoro_length, 25);
    }
}
