use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskPriority {
    High,
    Medium,
    Low,
}

text_enum!(TaskPriority {
    High => "HIGH",
    Medium => "MEDIUM",
    Low => "LOW",
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    pub priority: TaskPriority,
    pub due_date: Option<i64>,
    pub is_completed: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Task {
    pub fn new(title: &str, description: &str, priority: TaskPriority, due_date: Option<i64>, now: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.trim().to_string(),
            description: description.to_string(),
            priority,
            due_date,
            is_completed: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_overdue(&self, now: i64) -> bool {
        !self.is_completed && self.due_date.is_some_and(|due| due < now)
    }
}
