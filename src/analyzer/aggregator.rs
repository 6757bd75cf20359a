use crate::analyzer::categorizer::CategoryRules;
use crate::models::{AppCategory, UsageEvent, UsageEventKind};
use crate::timeutil::{DAY_MS, HOUR_MS, MINUTE_MS, hour_of_day, start_of_day};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Hours with less usage than this count as quiet.
const QUIET_HOUR_THRESHOLD_MS: i64 = 10 * MINUTE_MS;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppUsageSummary {
    pub total_foreground_duration: i64,
    pub last_used_timestamp: i64,
    pub launch_count: u32,
}

/// A span of foreground time attributed to one app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credit {
    pub package_name: String,
    pub from: i64,
    pub to: i64,
}

impl Credit {
    pub fn duration(&self) -> i64 {
        self.to - self.from
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transition {
    pub credit: Option<Credit>,
    pub launched: bool,
}

/// Foreground state machine shared by batch aggregation and the live monitor.
#[derive(Debug, Clone)]
pub struct ForegroundTracker {
    current: Option<String>,
    last_transition: i64,
}

impl ForegroundTracker {
    pub fn new(start: i64) -> Self {
        Self {
            current: None,
            last_transition: start,
        }
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Feeds one event. Returns `None` when the event is older than the last
    /// transition and was skipped.
    pub fn apply(&mut self, event: &UsageEvent) -> Option<Transition> {
        if event.timestamp < self.last_transition {
            return None;
        }

        let transition = match event.kind {
            UsageEventKind::Foreground => {
                let credit = self.credit_current(event.timestamp);
                self.current = Some(event.package_name.clone());
                self.last_transition = event.timestamp;
                Transition {
                    credit,
                    launched: true,
                }
            }
            UsageEventKind::Background => {
                if self.current.as_deref() != Some(event.package_name.as_str()) {
                    return Some(Transition::default());
                }

                let credit = self.credit_current(event.timestamp);
                self.current = None;
                self.last_transition = event.timestamp;
                Transition {
                    credit,
                    launched: false,
                }
            }
        };

        Some(transition)
    }

    /// Credits time elapsed for the current app without a transition.
    pub fn checkpoint(&mut self, now: i64) -> Option<Credit> {
        if now <= self.last_transition {
            return None;
        }

        let credit = self.credit_current(now);
        self.last_transition = now;
        credit
    }

    /// Closes the window, crediting a still-current app up to `end`.
    pub fn close(self, end: i64) -> Option<Credit> {
        if end < self.last_transition {
            return None;
        }
        self.credit_current(end)
    }

    fn credit_current(&self, at: i64) -> Option<Credit> {
        self.current.as_ref().map(|package_name| Credit {
            package_name: package_name.clone(),
            from: self.last_transition,
            to: at,
        })
    }
}

/// Per-app foreground totals for events inside `[start, end)`.
pub fn aggregate(events: &[UsageEvent], start: i64, end: i64) -> BTreeMap<String, AppUsageSummary> {
    let mut summaries = BTreeMap::<String, AppUsageSummary>::new();
    replay(events, start, end, |credit, launched| {
        if let Some(credit) = credit {
            let entry = summaries.entry(credit.package_name.clone()).or_default();
            entry.total_foreground_duration += credit.duration();
            entry.last_used_timestamp = credit.to;
        }
        if let Some(package_name) = launched {
            summaries.entry(package_name.to_string()).or_default().launch_count += 1;
        }
    });

    summaries
}

/// Foreground time per local hour of day, splitting spans that cross hours.
pub fn hourly_usage(events: &[UsageEvent], start: i64, end: i64) -> [i64; 24] {
    let mut hours = [0_i64; 24];
    replay(events, start, end, |credit, _| {
        if let Some(credit) = credit {
            let mut cursor = credit.from;
            while cursor < credit.to {
                let hour_start = start_of_day(cursor) + i64::from(hour_of_day(cursor)) * HOUR_MS;
                let boundary = (hour_start + HOUR_MS).min(credit.to).max(cursor + 1);
                hours[hour_of_day(cursor) as usize] += boundary - cursor;
                cursor = boundary;
            }
        }
    });

    hours
}

fn replay<F>(events: &[UsageEvent], start: i64, end: i64, mut visit: F)
where
    F: FnMut(Option<&Credit>, Option<&str>),
{
    let mut tracker = ForegroundTracker::new(start);

    for event in events
        .iter()
        .filter(|event| event.timestamp >= start && event.timestamp < end)
    {
        let Some(transition) = tracker.apply(event) else {
            continue;
        };
        let launched = transition.launched.then_some(event.package_name.as_str());
        visit(transition.credit.as_ref(), launched);
    }

    if let Some(credit) = tracker.close(end) {
        visit(Some(&credit), None);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyUsagePattern {
    pub hourly_usage: BTreeMap<u32, i64>,
    pub peak_usage_hour: u32,
    pub quiet_hours: Vec<u32>,
}

pub fn analyze_daily_pattern(hourly: &[i64; 24]) -> DailyUsagePattern {
    let hourly_usage = (0_u32..24)
        .zip(hourly.iter().copied())
        .collect::<BTreeMap<_, _>>();

    // Earliest hour wins ties.
    let peak_usage_hour = hourly_usage
        .iter()
        .fold((0_u32, i64::MIN), |best, (hour, usage)| {
            if *usage > best.1 { (*hour, *usage) } else { best }
        })
        .0;

    let quiet_hours = hourly_usage
        .iter()
        .filter(|(_, usage)| **usage < QUIET_HOUR_THRESHOLD_MS)
        .map(|(hour, _)| *hour)
        .collect();

    DailyUsagePattern {
        hourly_usage,
        peak_usage_hour,
        quiet_hours,
    }
}

/// Average daily foreground time across the window, at least one day.
pub fn daily_average_usage(usage: &BTreeMap<String, AppUsageSummary>, start: i64, end: i64) -> i64 {
    let days = ((end - start) / DAY_MS).max(1);
    let total = usage
        .values()
        .map(|summary| summary.total_foreground_duration)
        .sum::<i64>();
    total / days
}

/// Foreground time per category. A category stored for the app wins over
/// the rules.
pub fn category_totals(
    usage: &BTreeMap<String, AppUsageSummary>,
    stored: &BTreeMap<String, AppCategory>,
    rules: &CategoryRules,
) -> BTreeMap<AppCategory, i64> {
    usage.iter().fold(BTreeMap::new(), |mut acc, (package_name, summary)| {
        let category = stored
            .get(package_name)
            .copied()
            .unwrap_or_else(|| rules.categorize(package_name));
        *acc.entry(category).or_insert(0) += summary.total_foreground_duration;
        acc
    })
}

/// Apps ordered by foreground time, ties broken by name.
pub fn top_apps(usage: &BTreeMap<String, AppUsageSummary>, n: usize) -> Vec<(String, AppUsageSummary)> {
    let mut items = usage
        .iter()
        .map(|(name, summary)| (name.clone(), *summary))
        .collect::<Vec<_>>();

    items.sort_by(|left, right| {
        right
            .1
            .total_foreground_duration
            .cmp(&left.1.total_foreground_duration)
            .then_with(|| left.0.cmp(&right.0))
    });
    items.into_iter().take(n).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fg(app: &str, at: i64) -> UsageEvent {
        UsageEvent::foreground(app, at)
    }

    fn bg(app: &str, at: i64) -> UsageEvent {
        UsageEvent::background(app, at)
    }

    #[test]
    fn aggregates_simple_sequence() {
        let events = vec![fg("A", 0), bg("A", 1_000), fg("B", 1_000), bg("B", 5_000)];
        let usage = aggregate(&events, 0, 5_000);

        assert_eq!(usage["A"].total_foreground_duration, 1_000);
        assert_eq!(usage["A"].launch_count, 1);
        assert_eq!(usage["A"].last_used_timestamp, 1_000);
        assert_eq!(usage["B"].total_foreground_duration, 4_000);
        assert_eq!(usage["B"].last_used_timestamp, 5_000);
        assert_eq!(aggregate(&events, 0, 5_000), usage);
    }

    #[test]
    fn switching_apps_credits_previous_foreground() {
        let events = vec![fg("A", 0), fg("B", 300), fg("A", 700)];
        let usage = aggregate(&events, 0, 1_000);

        assert_eq!(usage["A"].total_foreground_duration, 600);
        assert_eq!(usage["A"].launch_count, 2);
        assert_eq!(usage["B"].total_foreground_duration, 400);
    }

    #[test]
    fn repeated_foreground_keeps_accumulating() {
        let events = vec![fg("A", 0), fg("A", 400)];
        let usage = aggregate(&events, 0, 1_000);

        assert_eq!(usage["A"].total_foreground_duration, 1_000);
        assert_eq!(usage["A"].launch_count, 2);
    }

    #[test]
    fn malformed_events_are_skipped() {
        let events = vec![
            fg("A", -5),
            fg("A", 100),
            bg("B", 200),
            fg("C", 50),
            bg("A", 600),
            fg("D", 2_000),
        ];
        let usage = aggregate(&events, 0, 1_000);

        assert_eq!(usage.len(), 1);
        assert_eq!(usage["A"].total_foreground_duration, 500);
    }

    #[test]
    fn tracker_checkpoint_credits_without_transition() {
        let mut tracker = ForegroundTracker::new(0);
        tracker.apply(&fg("A", 100)).expect("applied");

        let credit = tracker.checkpoint(400).expect("credited");
        assert_eq!(credit.duration(), 300);
        assert_eq!(tracker.current(), Some("A"));
        assert!(tracker.checkpoint(400).is_none());

        let transition = tracker.apply(&bg("A", 500)).expect("applied");
        assert_eq!(transition.credit.map(|credit| credit.duration()), Some(100));
        assert!(tracker.apply(&fg("A", 450)).is_none());
    }

    #[test]
    fn hourly_usage_matches_total() {
        let start = start_of_day(crate::timeutil::now_millis());
        let events = vec![fg("A", start + 30 * MINUTE_MS), bg("A", start + 90 * MINUTE_MS)];
        let hours = hourly_usage(&events, start, start + DAY_MS);

        assert_eq!(hours.iter().sum::<i64>(), HOUR_MS);
        let pattern = analyze_daily_pattern(&hours);
        assert!(!pattern.quiet_hours.contains(&pattern.peak_usage_hour));
        assert_eq!(pattern.hourly_usage.len(), 24);
    }

    #[test]
    fn pattern_peak_prefers_earliest_hour() {
        let mut hours = [0_i64; 24];
        hours[9] = HOUR_MS;
        hours[14] = HOUR_MS;
        hours[20] = 5 * MINUTE_MS;

        let pattern = analyze_daily_pattern(&hours);
        assert_eq!(pattern.peak_usage_hour, 9);
        assert!(pattern.quiet_hours.contains(&20));
        assert!(!pattern.quiet_hours.contains(&14));
    }

    #[test]
    fn totals_and_rankings() {
        let events = vec![
            fg("com.whatsapp", 0),
            fg("com.todoist", 3_000),
            fg("com.instagram.android", 4_000),
        ];
        let usage = aggregate(&events, 0, 10_000);

        let totals = category_totals(&usage, &BTreeMap::new(), &CategoryRules::default());
        assert_eq!(totals[&AppCategory::SocialMedia], 9_000);
        assert_eq!(totals[&AppCategory::Productivity], 1_000);

        let stored = BTreeMap::from([("com.whatsapp".to_string(), AppCategory::Productivity)]);
        let reclassified = category_totals(&usage, &stored, &CategoryRules::default());
        assert_eq!(reclassified[&AppCategory::SocialMedia], 6_000);
        assert_eq!(reclassified[&AppCategory::Productivity], 4_000);

        let top = top_apps(&usage, 2);
        assert_eq!(top[0].0, "com.instagram.android");
        assert_eq!(top[1].0, "com.whatsapp");

        assert_eq!(daily_average_usage(&usage, 0, 2 * DAY_MS), 5_000);
    }
}
