use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppCategory {
    SocialMedia,
    Productivity,
    Entertainment,
    Gaming,
    Communication,
    Education,
    Other,
}

text_enum!(AppCategory {
    SocialMedia => "SOCIAL_MEDIA",
    Productivity => "PRODUCTIVITY",
    Entertainment => "ENTERTAINMENT",
    Gaming => "GAMING",
    Communication => "COMMUNICATION",
    Education => "EDUCATION",
    Other => "OTHER",
});

impl AppCategory {
    /// Lenient parse used for user-supplied category names; anything
    /// unrecognised lands in `Other`.
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "social" | "social_media" | "social-media" | "sns" => Self::SocialMedia,
            "productivity" | "work" | "development" => Self::Productivity,
            "entertainment" | "video" | "music" => Self::Entertainment,
            "gaming" | "games" | "game" => Self::Gaming,
            "communication" | "chat" | "messaging" => Self::Communication,
            "education" | "learning" | "research" => Self::Education,
            _ => Self::Other,
        }
    }

    /// Categories restricted while a focus session applies.
    pub fn is_distracting(self) -> bool {
        matches!(self, Self::SocialMedia | Self::Entertainment | Self::Gaming)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::SocialMedia => "Social media",
            Self::Productivity => "Productivity",
            Self::Entertainment => "Entertainment",
            Self::Gaming => "Gaming",
            Self::Communication => "Communication",
            Self::Education => "Education",
            Self::Other => "Other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppUsageRecord {
    pub package_name: String,
    pub app_name: String,
    /// Milliseconds per day, 0 = unlimited.
    pub daily_limit: i64,
    pub is_blocked: bool,
    pub last_usage_time: i64,
    pub total_usage_today: i64,
    pub updated_at: i64,
    pub is_whitelisted: bool,
    pub category: AppCategory,
}

impl AppUsageRecord {
    pub fn new(package_name: &str, app_name: &str, category: AppCategory, now: i64) -> Self {
        Self {
            package_name: package_name.to_string(),
            app_name: app_name.to_string(),
            daily_limit: 0,
            is_blocked: false,
            last_usage_time: 0,
            total_usage_today: 0,
            updated_at: now,
            is_whitelisted: false,
            category,
        }
    }

    pub fn has_limit(&self) -> bool {
        self.daily_limit > 0
    }

    pub fn is_over_limit(&self) -> bool {
        self.has_limit() && self.total_usage_today >= self.daily_limit
    }

    pub fn remaining_today(&self) -> Option<i64> {
        self.has_limit()
            .then(|| (self.daily_limit - self.total_usage_today).max(0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UsageEventKind {
    Foreground,
    Background,
}

text_enum!(UsageEventKind {
    Foreground => "FOREGROUND",
    Background => "BACKGROUND",
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageEvent {
    pub package_name: String,
    pub kind: UsageEventKind,
    pub timestamp: i64,
}

impl UsageEvent {
    pub fn foreground(package_name: &str, timestamp: i64) -> Self {
        Self {
            package_name: package_name.to_string(),
            kind: UsageEventKind::Foreground,
            timestamp,
        }
    }

    pub fn background(package_name: &str, timestamp: i64) -> Self {
        Self {
            package_name: package_name.to_string(),
            kind: UsageEventKind::Background,
            timestamp,
        }
    }
}
