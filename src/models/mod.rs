/// Stored enums are persisted as their upper-case wire names, the same text
/// serde produces for backups.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = anyhow::Error;

            fn from_str(raw: &str) -> anyhow::Result<Self> {
                let normalized = raw.trim().to_uppercase().replace(['-', ' '], "_");
                match normalized.as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => anyhow::bail!(
                        "Unsupported {} value: {raw}. Expected one of: {}",
                        stringify!($name),
                        [$($text),+].join(", ")
                    ),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                formatter.write_str(self.as_str())
            }
        }

        impl rusqlite::types::ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
                Ok(rusqlite::types::ToSqlOutput::from(self.as_str()))
            }
        }

        impl rusqlite::types::FromSql for $name {
            fn column_result(
                value: rusqlite::types::ValueRef<'_>,
            ) -> rusqlite::types::FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|error: anyhow::Error| rusqlite::types::FromSqlError::Other(error.into()))
            }
        }
    };
}

mod focus;
mod preferences;
mod reminder;
mod task;
mod usage;

pub use focus::{FocusSession, SessionCompletion, SessionKind};
pub use preferences::{BackupFrequency, DateFormat, TaskSortOption, TimeFormat, UserPreferences};
pub use reminder::{Reminder, ReminderKind, ReminderPriority, RepeatInterval};
pub use task::{Task, TaskPriority};
pub use usage::{AppCategory, AppUsageRecord, UsageEvent, UsageEventKind};
