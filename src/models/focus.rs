use crate::timeutil::MINUTE_MS;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionKind {
    #[serde(alias = "POMODORO")]
    Focus,
    ShortBreak,
    LongBreak,
}

text_enum!(SessionKind {
    Focus => "FOCUS",
    ShortBreak => "SHORT_BREAK",
    LongBreak => "LONG_BREAK",
});

impl SessionKind {
    pub fn default_duration(self) -> i64 {
        match self {
            Self::Focus => 25 * MINUTE_MS,
            Self::ShortBreak => 5 * MINUTE_MS,
            Self::LongBreak => 15 * MINUTE_MS,
        }
    }

    /// Break that follows the `focus_count`-th focus session of the day.
    /// Every `long_break_interval`-th one earns a long break; 0 disables them.
    pub fn next_break(focus_count: usize, long_break_interval: u32) -> Self {
        let interval = long_break_interval as usize;
        if interval > 0 && focus_count > 0 && focus_count % interval == 0 {
            Self::LongBreak
        } else {
            Self::ShortBreak
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusSession {
    pub id: String,
    pub start_time: i64,
    pub end_time: Option<i64>,
    #[serde(rename = "duration")]
    pub planned_duration: i64,
    pub actual_duration: Option<i64>,
    #[serde(rename = "type")]
    pub kind: SessionKind,
    pub is_completed: bool,
    pub was_interrupted: bool,
    pub interruption_count: u32,
    pub focus_score: Option<u8>,
    pub notes: String,
    pub associated_tasks: Vec<String>,
    pub created_at: i64,
}

/// Values recorded when a session reaches its terminal state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionCompletion {
    pub end_time: i64,
    pub actual_duration: i64,
    pub was_interrupted: bool,
    pub interruption_count: u32,
}

impl FocusSession {
    pub fn start(kind: SessionKind, planned_duration: i64, now: i64, tasks: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            start_time: now,
            end_time: None,
            planned_duration,
            actual_duration: None,
            kind,
            is_completed: false,
            was_interrupted: false,
            interruption_count: 0,
            focus_score: None,
            notes: String::new(),
            associated_tasks: tasks,
            created_at: now,
        }
    }

    /// Planned end of a still-running session.
    pub fn planned_end(&self) -> i64 {
        self.start_time + self.planned_duration
    }

    /// Score and actual duration exist only once a session is completed.
    pub fn is_consistent(&self) -> bool {
        self.is_completed || (self.focus_score.is_none() && self.actual_duration.is_none())
    }

    pub fn is_running_at(&self, now: i64) -> bool {
        !self.is_completed && self.start_time <= now && now < self.planned_end()
    }

    /// Applies the terminal transition. Returns `None` when the session was
    /// already completed.
    pub fn completed(&self, completion: SessionCompletion) -> Option<Self> {
        if self.is_completed {
            return None;
        }

        let mut next = Self {
            end_time: Some(completion.end_time),
            actual_duration: Some(completion.actual_duration.max(0)),
            is_completed: true,
            was_interrupted: completion.was_interrupted,
            interruption_count: completion.interruption_count,
            ..self.clone()
        };
        next.focus_score = Some(crate::scoring::focus_score(&next));

        Some(next)
    }
}
