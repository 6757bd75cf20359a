use crate::timeutil::DAY_MS;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReminderKind {
    OneTime,
    Repeating,
    LocationBased,
}

text_enum!(ReminderKind {
    OneTime => "ONE_TIME",
    Repeating => "REPEATING",
    LocationBased => "LOCATION_BASED",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RepeatInterval {
    Daily,
    Weekly,
    Monthly,
    Custom,
}

text_enum!(RepeatInterval {
    Daily => "DAILY",
    Weekly => "WEEKLY",
    Monthly => "MONTHLY",
    Custom => "CUSTOM",
});

impl RepeatInterval {
    /// Fixed period in millis; `Custom` carries its own period.
    pub fn period(self) -> Option<i64> {
        match self {
            Self::Daily => Some(DAY_MS),
            Self::Weekly => Some(7 * DAY_MS),
            Self::Monthly => Some(30 * DAY_MS),
            Self::Custom => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReminderPriority {
    Low,
    Normal,
    High,
    Urgent,
}

text_enum!(ReminderPriority {
    Low => "LOW",
    Normal => "NORMAL",
    High => "HIGH",
    Urgent => "URGENT",
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    pub id: String,
    pub title: String,
    pub description: String,
    pub time: i64,
    #[serde(rename = "type")]
    pub kind: ReminderKind,
    pub repeat_interval: Option<RepeatInterval>,
    pub custom_repeat_interval: Option<i64>,
    pub is_enabled: bool,
    pub last_triggered: Option<i64>,
    pub next_trigger: Option<i64>,
    pub associated_task_id: Option<String>,
    pub priority: ReminderPriority,
    pub tags: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Reminder {
    pub fn new(title: &str, time: i64, now: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.trim().to_string(),
            description: String::new(),
            time,
            kind: ReminderKind::OneTime,
            repeat_interval: None,
            custom_repeat_interval: None,
            is_enabled: true,
            last_triggered: None,
            next_trigger: Some(time),
            associated_task_id: None,
            priority: ReminderPriority::Normal,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn repeating(mut self, interval: RepeatInterval, custom: Option<i64>) -> Self {
        self.kind = ReminderKind::Repeating;
        self.repeat_interval = Some(interval);
        self.custom_repeat_interval = custom;
        self
    }

    /// Effective repeat period, `None` for one-time reminders or a missing
    /// custom period.
    pub fn repeat_period(&self) -> Option<i64> {
        if self.kind != ReminderKind::Repeating {
            return None;
        }

        match self.repeat_interval? {
            RepeatInterval::Custom => self.custom_repeat_interval,
            interval => interval.period(),
        }
    }

    /// First trigger strictly after `now`. One-time reminders in the past
    /// have none.
    pub fn next_trigger_after(&self, now: i64) -> Option<i64> {
        if self.time > now {
            return Some(self.time);
        }

        let period = self.repeat_period().filter(|period| *period > 0)?;
        let elapsed_periods = (now - self.time) / period + 1;
        Some(self.time + elapsed_periods * period)
    }
}

#[cfg(test)]
mod tests {
    use super::{Reminder, RepeatInterval};
    use crate::timeutil::{DAY_MS, HOUR_MS};

    #[test]
    fn one_time_reminder_in_the_past_has_no_next_trigger() {
        let reminder = Reminder::new("Stretch", 1_000, 0);
        assert_eq!(reminder.next_trigger_after(500), Some(1_000));
        assert_eq!(reminder.next_trigger_after(1_000), None);
    }

    #[test]
    fn repeating_reminder_rolls_forward_past_now() {
        let reminder = Reminder::new("Water", 0, 0).repeating(RepeatInterval::Daily, None);

        assert_eq!(reminder.next_trigger_after(0), Some(DAY_MS));
        assert_eq!(reminder.next_trigger_after(DAY_MS + 1), Some(2 * DAY_MS));
        assert_eq!(reminder.next_trigger_after(3 * DAY_MS), Some(4 * DAY_MS));
    }

    #[test]
    fn custom_interval_requires_a_positive_period() {
        let custom = Reminder::new("Posture", 0, 0).repeating(RepeatInterval::Custom, Some(2 * HOUR_MS));
        assert_eq!(custom.next_trigger_after(HOUR_MS), Some(2 * HOUR_MS));

        let missing = Reminder::new("Posture", 0, 0).repeating(RepeatInterval::Custom, None);
        assert_eq!(missing.next_trigger_after(HOUR_MS), None);

        let zero = Reminder::new("Posture", 0, 0).repeating(RepeatInterval::Custom, Some(0));
        assert_eq!(zero.next_trigger_after(HOUR_MS), None);
    }
}
