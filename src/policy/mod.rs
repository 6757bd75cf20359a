mod enforcer;

pub use enforcer::{Enforcement, Enforcer};

use crate::analyzer::aggregator::DailyUsagePattern;
use crate::models::{AppCategory, AppUsageRecord, FocusSession};
use crate::timeutil::{HOUR_MS, MINUTE_MS, SECOND_MS, format_duration_long};
use serde::Serialize;

pub const GRACE_PERIOD_MS: i64 = 30 * SECOND_MS;
pub const EMERGENCY_OVERRIDE_MS: i64 = 5 * MINUTE_MS;
pub const OVERRIDE_COOLDOWN_MS: i64 = HOUR_MS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockReason {
    ManuallyBlocked,
    DailyLimit,
    FocusSession,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockNotification {
    pub title: String,
    pub message: String,
}

impl BlockReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ManuallyBlocked => "MANUALLY_BLOCKED",
            Self::DailyLimit => "DAILY_LIMIT",
            Self::FocusSession => "FOCUS_SESSION",
        }
    }

    pub fn notification(self, app: &AppUsageRecord) -> BlockNotification {
        let (title, message) = match self {
            Self::ManuallyBlocked => ("App Blocked", format!("{} is currently blocked", app.app_name)),
            Self::DailyLimit => (
                "Daily Limit Reached",
                format!(
                    "You've reached your daily limit of {} for {}",
                    format_duration_long(app.daily_limit),
                    app.app_name
                ),
            ),
            Self::FocusSession => (
                "Focus Session Active",
                format!("Stay focused! {} is blocked during focus sessions", app.app_name),
            ),
        };

        BlockNotification {
            title: title.to_string(),
            message,
        }
    }
}

/// Block decision for an app outside focus sessions. Whitelisting wins over
/// every other flag; a zero limit means unlimited.
pub fn should_block(app: &AppUsageRecord, _now: i64) -> Option<BlockReason> {
    if app.is_whitelisted {
        None
    } else if app.is_blocked {
        Some(BlockReason::ManuallyBlocked)
    } else if app.is_over_limit() {
        Some(BlockReason::DailyLimit)
    } else {
        None
    }
}

pub fn should_block_during_focus_session(app: &AppUsageRecord, session: Option<&FocusSession>) -> bool {
    let Some(session) = session else {
        return false;
    };
    if !session.is_completed || app.is_whitelisted {
        return false;
    }

    app.category.is_distracting()
}

/// Combined decision used by the monitor: the regular rules first, then the
/// focus-session rule.
pub fn block_reason(app: &AppUsageRecord, session: Option<&FocusSession>, now: i64) -> Option<BlockReason> {
    should_block(app, now).or_else(|| {
        should_block_during_focus_session(app, session).then_some(BlockReason::FocusSession)
    })
}

/// `last_override_at` is 0 when the app was never overridden.
pub fn can_override(
    app: &AppUsageRecord,
    override_count_today: u32,
    override_limit: u32,
    last_override_at: i64,
    now: i64,
) -> bool {
    if !app.is_blocked && !app.has_limit() {
        return true;
    }
    if override_count_today >= override_limit {
        return false;
    }

    now - last_override_at >= OVERRIDE_COOLDOWN_MS
}

pub fn grace_period_end(block_start: i64) -> i64 {
    block_start + GRACE_PERIOD_MS
}

pub fn emergency_override_end(override_start: i64) -> i64 {
    override_start + EMERGENCY_OVERRIDE_MS
}

pub fn recommended_limit(average_usage: i64, category: AppCategory) -> i64 {
    let factor = match category {
        AppCategory::SocialMedia => 0.5,
        AppCategory::Entertainment => 0.6,
        AppCategory::Gaming => 0.4,
        AppCategory::Productivity => 0.8,
        _ => 0.7,
    };

    (average_usage as f64 * factor) as i64
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockingStats {
    pub total_blocked_apps: usize,
    pub apps_with_limits: usize,
    pub apps_over_limit: usize,
}

pub fn blocking_stats(apps: &[AppUsageRecord]) -> BlockingStats {
    BlockingStats {
        total_blocked_apps: apps.iter().filter(|app| app.is_blocked).count(),
        apps_with_limits: apps.iter().filter(|app| app.has_limit()).count(),
        apps_over_limit: apps.iter().filter(|app| app.is_over_limit()).count(),
    }
}

/// Hour range; `end_hour` may be smaller than `start_hour` when it wraps
/// past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRange {
    pub start_hour: u32,
    pub end_hour: u32,
}

const WORKING_HOURS: std::ops::RangeInclusive<u32> = 9..=17;

/// Overnight block plus the quiet working hours, contiguous hours merged.
pub fn suggest_blocking_schedule(pattern: &DailyUsagePattern) -> Vec<TimeRange> {
    let mut ranges = vec![TimeRange {
        start_hour: 23,
        end_hour: 6,
    }];
    ranges.extend(
        pattern
            .quiet_hours
            .iter()
            .filter(|hour| WORKING_HOURS.contains(*hour))
            .map(|hour| TimeRange {
                start_hour: *hour,
                end_hour: hour + 1,
            }),
    );

    merge_contiguous(ranges)
}

fn merge_contiguous(mut ranges: Vec<TimeRange>) -> Vec<TimeRange> {
    ranges.sort_by_key(|range| range.start_hour);

    let mut merged: Vec<TimeRange> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last_mut() {
            Some(last) if last.end_hour == range.start_hour => last.end_hour = range.end_hour,
            _ => merged.push(range),
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::aggregator::analyze_daily_pattern;
    use crate::models::{SessionCompletion, SessionKind};

    fn app(category: AppCategory) -> AppUsageRecord {
        AppUsageRecord::new("com.example", "Example", category, 0)
    }

    fn completed_session() -> FocusSession {
        FocusSession::start(SessionKind::Focus, 1_000, 0, Vec::new())
            .completed(SessionCompletion {
                end_time: 1_000,
                actual_duration: 1_000,
                was_interrupted: false,
                interruption_count: 0,
            })
            .expect("completed")
    }

    #[test]
    fn whitelisted_app_is_never_blocked() {
        let record = AppUsageRecord {
            is_whitelisted: true,
            is_blocked: true,
            daily_limit: 1,
            total_usage_today: 100,
            ..app(AppCategory::SocialMedia)
        };

        assert_eq!(should_block(&record, 0), None);
        assert!(!should_block_during_focus_session(&record, Some(&completed_session())));
        assert_eq!(block_reason(&record, Some(&completed_session()), 0), None);
    }

    #[test]
    fn limit_is_reached_at_exact_boundary() {
        let record = AppUsageRecord {
            daily_limit: 60_000,
            total_usage_today: 60_000,
            ..app(AppCategory::Other)
        };
        assert_eq!(should_block(&record, 0), Some(BlockReason::DailyLimit));

        let below = AppUsageRecord {
            total_usage_today: 59_999,
            ..record.clone()
        };
        assert_eq!(should_block(&below, 0), None);

        let unlimited = AppUsageRecord {
            daily_limit: 0,
            total_usage_today: i64::MAX,
            ..record
        };
        assert_eq!(should_block(&unlimited, 0), None);
    }

    #[test]
    fn manual_block_precedes_limit() {
        let record = AppUsageRecord {
            is_blocked: true,
            daily_limit: 10,
            total_usage_today: 20,
            ..app(AppCategory::Other)
        };
        assert_eq!(should_block(&record, 0), Some(BlockReason::ManuallyBlocked));
    }

    #[test]
    fn focus_sessions_only_restrict_distracting_categories() {
        let session = completed_session();
        let running = FocusSession::start(SessionKind::Focus, 1_000, 0, Vec::new());

        assert!(should_block_during_focus_session(&app(AppCategory::Gaming), Some(&session)));
        assert!(should_block_during_focus_session(&app(AppCategory::Entertainment), Some(&session)));
        assert!(!should_block_during_focus_session(&app(AppCategory::Productivity), Some(&session)));
        assert!(!should_block_during_focus_session(&app(AppCategory::Gaming), Some(&running)));
        assert!(!should_block_during_focus_session(&app(AppCategory::Gaming), None));
        assert_eq!(
            block_reason(&app(AppCategory::SocialMedia), Some(&session), 0),
            Some(BlockReason::FocusSession)
        );
    }

    #[test]
    fn override_rules() {
        let free = app(AppCategory::Other);
        assert!(can_override(&free, 10, 3, 0, 0));

        let blocked = AppUsageRecord {
            is_blocked: true,
            ..app(AppCategory::Other)
        };
        assert!(!can_override(&blocked, 3, 3, 0, 10 * HOUR_MS));
        assert!(can_override(&blocked, 1, 3, 0, HOUR_MS));
        assert!(!can_override(&blocked, 1, 3, HOUR_MS, HOUR_MS + 59 * MINUTE_MS));
        assert!(can_override(&blocked, 1, 3, HOUR_MS, 2 * HOUR_MS));
    }

    #[test]
    fn grace_and_override_windows() {
        assert_eq!(grace_period_end(1_000), 31_000);
        assert_eq!(emergency_override_end(0), 300_000);
    }

    #[test]
    fn recommended_limits_per_category() {
        assert_eq!(recommended_limit(100 * MINUTE_MS, AppCategory::Gaming), 40 * MINUTE_MS);
        assert_eq!(recommended_limit(100 * MINUTE_MS, AppCategory::SocialMedia), 50 * MINUTE_MS);
        assert_eq!(recommended_limit(100 * MINUTE_MS, AppCategory::Education), 70 * MINUTE_MS);
        assert_eq!(recommended_limit(3, AppCategory::SocialMedia), 1);
    }

    #[test]
    fn notification_texts() {
        let record = AppUsageRecord {
            app_name: "Instagram".to_string(),
            daily_limit: 30 * MINUTE_MS,
            ..app(AppCategory::SocialMedia)
        };

        let limit = BlockReason::DailyLimit.notification(&record);
        assert_eq!(limit.title, "Daily Limit Reached");
        assert_eq!(limit.message, "You've reached your daily limit of 30 min for Instagram");
        assert_eq!(BlockReason::ManuallyBlocked.notification(&record).message, "Instagram is currently blocked");
    }

    #[test]
    fn stats_count_blocked_and_limited_apps() {
        let apps = vec![
            AppUsageRecord {
                is_blocked: true,
                ..app(AppCategory::Other)
            },
            AppUsageRecord {
                daily_limit: 10,
                total_usage_today: 10,
                ..app(AppCategory::Other)
            },
            AppUsageRecord {
                daily_limit: 10,
                ..app(AppCategory::Other)
            },
        ];

        assert_eq!(
            blocking_stats(&apps),
            BlockingStats {
                total_blocked_apps: 1,
                apps_with_limits: 2,
                apps_over_limit: 1,
            }
        );
    }

    #[test]
    fn schedule_merges_contiguous_quiet_hours() {
        let mut hours = [HOUR_MS; 24];
        for hour in [9, 10, 11, 15] {
            hours[hour] = 0;
        }
        hours[3] = 0;

        let schedule = suggest_blocking_schedule(&analyze_daily_pattern(&hours));
        assert_eq!(
            schedule,
            vec![
                TimeRange { start_hour: 9, end_hour: 12 },
                TimeRange { start_hour: 15, end_hour: 16 },
                TimeRange { start_hour: 23, end_hour: 6 },
            ]
        );
    }
}
