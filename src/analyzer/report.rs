use crate::analyzer::aggregator::{self, AppUsageSummary};
use crate::analyzer::categorizer::CategoryRules;
use crate::models::{AppCategory, FocusSession, SessionKind, UsageEvent};
use crate::scoring;
use crate::timeutil::{HOUR_MS, MINUTE_MS, format_duration_long, to_local};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const TOP_APPS: usize = 5;
const DISTRACTION_ALERT_MS: i64 = 90 * MINUTE_MS;
const LOW_ACTIVITY_MS: i64 = HOUR_MS;
const INTERRUPTION_ALERT: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportMetric {
    pub name: String,
    pub duration_ms: i64,
    pub launches: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyReport {
    pub date: String,
    pub generated_at: String,
    pub screen_time_ms: i64,
    pub distracting_ms: i64,
    pub categories: BTreeMap<AppCategory, i64>,
    pub top_apps: Vec<ReportMetric>,
    pub peak_usage_hour: Option<u32>,
    pub focus_time_ms: i64,
    pub completed_sessions: usize,
    pub interrupted_sessions: usize,
    pub average_focus_score: f64,
    pub streak_days: u32,
    pub completed_tasks: u32,
    pub productivity_score: u8,
    pub over_limit_apps: Vec<String>,
    pub anomalies: Vec<String>,
}

/// Everything a daily report is computed from, read from the store in
/// one pass.
#[derive(Debug, Clone, Default)]
pub struct ReportInputs {
    pub window: (i64, i64),
    pub events: Vec<UsageEvent>,
    pub day_sessions: Vec<FocusSession>,
    pub all_sessions: Vec<FocusSession>,
    pub completed_tasks: u32,
    pub over_limit_apps: Vec<String>,
    /// Categories recorded per app, including manual reclassification.
    pub stored_categories: BTreeMap<String, AppCategory>,
}

#[derive(Debug)]
pub struct SavedReport {
    pub markdown_path: PathBuf,
    pub json_path: PathBuf,
}

pub fn build_daily_report(
    date: NaiveDate,
    inputs: &ReportInputs,
    rules: &CategoryRules,
    generated_at: i64,
) -> DailyReport {
    let (start, end) = inputs.window;
    let usage = aggregator::aggregate(&inputs.events, start, end);
    let categories = aggregator::category_totals(&usage, &inputs.stored_categories, rules);

    let screen_time_ms = usage
        .values()
        .map(|summary| summary.total_foreground_duration)
        .sum::<i64>();
    let distracting_ms = categories
        .iter()
        .filter(|(category, _)| category.is_distracting())
        .map(|(_, duration)| *duration)
        .sum::<i64>();

    let hourly = aggregator::hourly_usage(&inputs.events, start, end);
    let peak_usage_hour =
        (screen_time_ms > 0).then(|| aggregator::analyze_daily_pattern(&hourly).peak_usage_hour);

    let focus_sessions = inputs
        .day_sessions
        .iter()
        .filter(|session| session.kind == SessionKind::Focus)
        .cloned()
        .collect::<Vec<_>>();
    let focus = scoring::analyze_focus_sessions(&focus_sessions);
    let interrupted_sessions = focus_sessions
        .iter()
        .filter(|session| session.was_interrupted)
        .count();

    let streak_days = scoring::calculate_streak(&inputs.all_sessions, date);
    let productivity_score = scoring::productivity_score(
        focus.total_focus_time,
        inputs.completed_tasks,
        screen_time_ms,
        distracting_ms,
    );

    let top_apps = top_metrics(&usage);
    let anomalies = detect_anomalies(
        screen_time_ms,
        distracting_ms,
        interrupted_sessions,
        &inputs.over_limit_apps,
    );

    DailyReport {
        date: date.format("%Y-%m-%d").to_string(),
        generated_at: to_local(generated_at).to_rfc3339(),
        screen_time_ms,
        distracting_ms,
        categories,
        top_apps,
        peak_usage_hour,
        focus_time_ms: focus.total_focus_time,
        completed_sessions: focus.completed_sessions,
        interrupted_sessions,
        average_focus_score: focus.average_focus_score,
        streak_days,
        completed_tasks: inputs.completed_tasks,
        productivity_score,
        over_limit_apps: inputs.over_limit_apps.clone(),
        anomalies,
    }
}

fn top_metrics(usage: &BTreeMap<String, AppUsageSummary>) -> Vec<ReportMetric> {
    aggregator::top_apps(usage, TOP_APPS)
        .into_iter()
        .map(|(name, summary)| ReportMetric {
            name,
            duration_ms: summary.total_foreground_duration,
            launches: summary.launch_count,
        })
        .collect()
}

fn detect_anomalies(
    screen_time_ms: i64,
    distracting_ms: i64,
    interrupted_sessions: usize,
    over_limit_apps: &[String],
) -> Vec<String> {
    let distraction_alert = (distracting_ms >= DISTRACTION_ALERT_MS).then(|| {
        format!(
            "Distracting app usage is high: {}",
            format_duration_long(distracting_ms)
        )
    });

    let limit_alert = (!over_limit_apps.is_empty())
        .then(|| format!("Daily limit reached for: {}", over_limit_apps.join(", ")));

    let interruption_alert = (interrupted_sessions >= INTERRUPTION_ALERT)
        .then(|| format!("{interrupted_sessions} focus sessions were interrupted"));

    let low_activity_alert = (screen_time_ms < LOW_ACTIVITY_MS)
        .then(|| "Total tracked screen time is below 1 hour".to_string());

    [distraction_alert, limit_alert, interruption_alert, low_activity_alert]
        .into_iter()
        .flatten()
        .collect()
}

pub fn render_markdown(report: &DailyReport) -> String {
    let distracting_ratio = ratio(report.distracting_ms, report.screen_time_ms);

    let most_used_app = report
        .top_apps
        .first()
        .map(|metric| format!("{} ({})", metric.name, format_duration_long(metric.duration_ms)))
        .unwrap_or_else(|| "None".to_string());

    let peak_hour = report
        .peak_usage_hour
        .map(|hour| format!("{hour:02}:00"))
        .unwrap_or_else(|| "-".to_string());

    let category_rows = AppCategory::ALL
        .iter()
        .map(|category| {
            let duration = report.categories.get(category).copied().unwrap_or_default();
            format!(
                "| {} | {} | {:.0}% |",
                category.label(),
                format_duration_long(duration),
                ratio(duration, report.screen_time_ms)
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let app_rows = if report.top_apps.is_empty() {
        "- No data".to_string()
    } else {
        report
            .top_apps
            .iter()
            .enumerate()
            .map(|(index, metric)| {
                format!(
                    "{}. {} - {} ({} launches)",
                    index + 1,
                    metric.name,
                    format_duration_long(metric.duration_ms),
                    metric.launches
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let anomaly_rows = if report.anomalies.is_empty() {
        "- No notable anomaly detected".to_string()
    } else {
        report
            .anomalies
            .iter()
            .map(|entry| format!("- {entry}"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "# Daily Wellbeing Report - {}\n\n## Summary\n- Productivity score: {}/100\n- Screen time: {}\n- Distracting apps: {:.0}%\n- Most used app: {}\n- Peak usage hour: {}\n\n## Focus\n- Focus time: {}\n- Completed sessions: {} ({} interrupted)\n- Average focus score: {:.0}\n- Streak: {} day(s)\n- Completed tasks: {}\n\n## Time by Category\n| Category | Time | Ratio |\n|----------|------|-------|\n{}\n\n## Top Apps ({})\n{}\n\n## Anomalies\n{}\n",
        report.date,
        report.productivity_score,
        format_duration_long(report.screen_time_ms),
        distracting_ratio,
        most_used_app,
        peak_hour,
        format_duration_long(report.focus_time_ms),
        report.completed_sessions,
        report.interrupted_sessions,
        report.average_focus_score,
        report.streak_days,
        report.completed_tasks,
        category_rows,
        TOP_APPS,
        app_rows,
        anomaly_rows
    )
}

fn ratio(part: i64, total: i64) -> f64 {
    if total <= 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

pub fn save_report_files(report: &DailyReport, report_dir: &Path) -> Result<SavedReport> {
    fs::create_dir_all(report_dir).with_context(|| {
        format!(
            "Failed to create report directory: {}",
            report_dir.display()
        )
    })?;

    let markdown_path = report_dir.join(format!("{}.md", report.date));
    let json_path = report_dir.join(format!("{}.json", report.date));

    fs::write(&markdown_path, render_markdown(report)).with_context(|| {
        format!(
            "Failed to write Markdown report: {}",
            markdown_path.display()
        )
    })?;

    let json_content =
        serde_json::to_string_pretty(report).context("Failed to serialize report JSON")?;
    fs::write(&json_path, json_content)
        .with_context(|| format!("Failed to write JSON report: {}", json_path.display()))?;

    Ok(SavedReport {
        markdown_path,
        json_path,
    })
}

#[cfg(test)]
mod tests {
    use super::{ReportInputs, build_daily_report, render_markdown, save_report_files};
    use crate::analyzer::categorizer::CategoryRules;
    use crate::models::{AppCategory, FocusSession, SessionCompletion, SessionKind, UsageEvent};
    use crate::timeutil::{HOUR_MS, MINUTE_MS, day_bounds};
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 10).expect("date")
    }

    fn inputs() -> ReportInputs {
        let (start, end) = day_bounds(date());
        let at = start + 9 * HOUR_MS;
        let session = FocusSession::start(SessionKind::Focus, 25 * MINUTE_MS, at, Vec::new())
            .completed(SessionCompletion {
                end_time: at + 25 * MINUTE_MS,
                actual_duration: 25 * MINUTE_MS,
                was_interrupted: false,
                interruption_count: 0,
            })
            .expect("completed");

        ReportInputs {
            window: (start, end),
            events: vec![
                UsageEvent::foreground("com.instagram.android", at),
                UsageEvent::foreground("com.notion", at + 2 * HOUR_MS),
                UsageEvent::background("com.notion", at + 3 * HOUR_MS),
            ],
            day_sessions: vec![session.clone()],
            all_sessions: vec![session],
            completed_tasks: 5,
            over_limit_apps: vec!["com.instagram.android".to_string()],
            stored_categories: BTreeMap::new(),
        }
    }

    #[test]
    fn report_combines_usage_focus_and_tasks() {
        let report = build_daily_report(date(), &inputs(), &CategoryRules::default(), 0);

        assert_eq!(report.date, "2026-03-10");
        assert_eq!(report.screen_time_ms, 3 * HOUR_MS);
        assert_eq!(report.distracting_ms, 2 * HOUR_MS);
        assert_eq!(report.categories.get(&AppCategory::Productivity), Some(&HOUR_MS));
        assert_eq!(report.top_apps[0].name, "com.instagram.android");
        assert_eq!(report.top_apps[0].launches, 1);
        assert_eq!(report.peak_usage_hour, Some(9));
        assert_eq!(report.focus_time_ms, 25 * MINUTE_MS);
        assert_eq!(report.streak_days, 1);
        assert_eq!(report.completed_sessions, 1);
        // 25m/8h*40 + 5/10*30 + (1h/3h)*30
        assert_eq!(report.productivity_score, 27);
        assert!(report.anomalies.iter().any(|entry| entry.starts_with("Distracting")));
        assert!(report.anomalies.iter().any(|entry| entry.contains("Daily limit")));
    }

    #[test]
    fn stored_category_overrides_the_rules() {
        let mut inputs = inputs();
        inputs
            .stored_categories
            .insert("com.instagram.android".to_string(), AppCategory::Education);

        let report = build_daily_report(date(), &inputs, &CategoryRules::default(), 0);
        assert_eq!(report.distracting_ms, 0);
        assert_eq!(report.categories.get(&AppCategory::Education), Some(&(2 * HOUR_MS)));
    }

    #[test]
    fn empty_day_renders_and_saves() {
        let (start, end) = day_bounds(date());
        let inputs = ReportInputs {
            window: (start, end),
            ..ReportInputs::default()
        };
        let report = build_daily_report(date(), &inputs, &CategoryRules::default(), 0);

        assert_eq!(report.peak_usage_hour, None);
        assert_eq!(report.productivity_score, 0);
        let markdown = render_markdown(&report);
        assert!(markdown.contains("# Daily Wellbeing Report - 2026-03-10"));
        assert!(markdown.contains("- No data"));

        let dir = tempfile::tempdir().expect("tempdir");
        let saved = save_report_files(&report, dir.path()).expect("save");
        assert!(saved.markdown_path.exists());
        let json = std::fs::read_to_string(saved.json_path).expect("json");
        assert!(json.contains("\"productivity_score\": 0"));
    }
}
