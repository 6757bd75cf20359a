use crate::models::{FocusSession, SessionKind, Task, TaskPriority};
use crate::timeutil::{HOUR_MS, MINUTE_MS, hour_of_day, local_date};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

const PRODUCTIVE_DAY_MS: i64 = 25 * MINUTE_MS;
const FOCUS_TARGET_MS: f64 = (8 * HOUR_MS) as f64;
const TASK_TARGET: f64 = 10.0;

/// 0-100. Only completed sessions with a positive planned duration score.
pub fn focus_score(session: &FocusSession) -> u8 {
    if !session.is_completed || session.planned_duration <= 0 {
        return 0;
    }

    let base = if session.was_interrupted { 70.0 } else { 100.0 };
    let penalty = f64::from(session.interruption_count) * 5.0;
    let ratio = session.actual_duration.unwrap_or_default() as f64 / session.planned_duration as f64;

    ((base - penalty) * ratio).round().clamp(0.0, 100.0) as u8
}

/// Weighted 40/30/30 score. The focus and task terms are left unclamped and
/// only the sum is bounded.
pub fn productivity_score(focus_ms: i64, completed_tasks: u32, screen_ms: i64, distracting_ms: i64) -> u8 {
    let focus = focus_ms as f64 / FOCUS_TARGET_MS * 40.0;
    let tasks = f64::from(completed_tasks) / TASK_TARGET * 30.0;
    let screen = screen_time_ratio(screen_ms, distracting_ms) * 30.0;

    (focus + tasks + screen).round().clamp(0.0, 100.0) as u8
}

fn screen_time_ratio(screen_ms: i64, distracting_ms: i64) -> f64 {
    if screen_ms <= 0 {
        return 0.0;
    }

    ((screen_ms - distracting_ms) as f64 / screen_ms as f64).clamp(0.0, 1.0)
}

/// Consecutive days, ending today, with at least 25 minutes of completed
/// session time. A day that does not qualify yet ends the streak, today
/// included.
pub fn calculate_streak(sessions: &[FocusSession], today: NaiveDate) -> u32 {
    let per_day = sessions
        .iter()
        .filter(|session| session.is_completed)
        .fold(HashMap::<NaiveDate, i64>::new(), |mut acc, session| {
            *acc.entry(local_date(session.start_time)).or_insert(0) +=
                session.actual_duration.unwrap_or_default();
            acc
        });

    let mut streak = 0;
    let mut day = Some(today);
    while let Some(current) = day {
        let total = per_day.get(&current).copied().unwrap_or_default();
        if total < PRODUCTIVE_DAY_MS {
            break;
        }
        streak += 1;
        day = current.pred_opt();
    }

    streak
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusMetrics {
    pub completed_sessions: usize,
    pub total_focus_time: i64,
    pub average_focus_score: f64,
}

pub fn analyze_focus_sessions(sessions: &[FocusSession]) -> FocusMetrics {
    let completed = sessions
        .iter()
        .filter(|session| session.is_completed)
        .collect::<Vec<_>>();

    let total_focus_time = sessions
        .iter()
        .map(|session| session.actual_duration.unwrap_or_default())
        .sum::<i64>();

    let average_focus_score = if completed.is_empty() {
        0.0
    } else {
        completed
            .iter()
            .map(|session| f64::from(focus_score(session)))
            .sum::<f64>()
            / completed.len() as f64
    };

    FocusMetrics {
        completed_sessions: completed.len(),
        total_focus_time,
        average_focus_score,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMetrics {
    pub completion_rate: f64,
    pub priority_distribution: BTreeMap<TaskPriority, usize>,
}

/// Percentage of completed tasks, 0 for an empty list.
pub fn completion_rate(tasks: &[Task]) -> f64 {
    if tasks.is_empty() {
        return 0.0;
    }

    let completed = tasks.iter().filter(|task| task.is_completed).count();
    completed as f64 / tasks.len() as f64 * 100.0
}

pub fn analyze_tasks(tasks: &[Task]) -> TaskMetrics {
    let priority_distribution = tasks.iter().fold(BTreeMap::new(), |mut acc, task| {
        *acc.entry(task.priority).or_insert(0) += 1;
        acc
    });

    TaskMetrics {
        completion_rate: completion_rate(tasks),
        priority_distribution,
    }
}

/// Local hour with the most completed focus time.
pub fn most_productive_hour(sessions: &[FocusSession]) -> Option<u32> {
    let per_hour = sessions
        .iter()
        .filter(|session| session.is_completed && session.kind == SessionKind::Focus)
        .fold(BTreeMap::<u32, i64>::new(), |mut acc, session| {
            *acc.entry(hour_of_day(session.start_time)).or_insert(0) +=
                session.actual_duration.unwrap_or_default();
            acc
        });

    per_hour
        .into_iter()
        .filter(|(_, total)| *total > 0)
        .fold(None, |best: Option<(u32, i64)>, (hour, total)| match best {
            Some((_, best_total)) if best_total >= total => best,
            _ => Some((hour, total)),
        })
        .map(|(hour, _)| hour)
}
