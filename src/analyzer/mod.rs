pub mod aggregator;
pub mod categorizer;
pub mod report;

use crate::analyzer::categorizer::CategoryRules;
use crate::analyzer::report::{DailyReport, ReportInputs, SavedReport};
use crate::config::Config;
use crate::db::{SharedDatabase, lock};
use crate::timeutil::{day_bounds, now_millis};
use anyhow::Result;
use chrono::NaiveDate;

/// Reads the day's records under one lock, then renders and stores the
/// report without holding it.
pub fn generate_and_store_report(
    config: &Config,
    db: &SharedDatabase,
    rules: &CategoryRules,
    date: NaiveDate,
) -> Result<(DailyReport, SavedReport)> {
    let now = now_millis();
    let (start, end) = day_bounds(date);
    let window = (start, end.min(now.max(start)));

    let inputs = {
        let database = lock(db);
        ReportInputs {
            window,
            events: database.usage_events_between(window.0, window.1)?,
            day_sessions: database.sessions_between(start, end)?,
            all_sessions: database.completed_sessions()?,
            completed_tasks: database.completed_task_count_between(start, end)?,
            over_limit_apps: database
                .over_limit_apps()?
                .into_iter()
                .map(|app| app.app_name)
                .collect(),
            stored_categories: database
                .all_app_usage()?
                .into_iter()
                .map(|app| (app.package_name, app.category))
                .collect(),
        }
    };

    let report = report::build_daily_report(date, &inputs, rules, now);
    let saved = report::save_report_files(&report, &config.report_dir)?;

    lock(db).upsert_report_meta(
        date,
        now,
        &saved.markdown_path.display().to_string(),
        &saved.json_path.display().to_string(),
    )?;

    Ok((report, saved))
}

#[cfg(test)]
mod tests {
    use super::generate_and_store_report;
    use crate::analyzer::categorizer::CategoryRules;
    use crate::config::Config;
    use crate::db::{Database, lock};
    use crate::models::UsageEvent;
    use crate::timeutil::{HOUR_MS, day_bounds};
    use chrono::NaiveDate;
    use std::sync::{Arc, Mutex};

    #[test]
    fn past_day_report_is_written_and_indexed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config {
            report_dir: dir.path().join("reports"),
            ..Config::default()
        };
        let db = Arc::new(Mutex::new(Database::open_in_memory().expect("db")));
        let date = NaiveDate::from_ymd_opt(2025, 6, 2).expect("date");
        let (start, _) = day_bounds(date);
        lock(&db)
            .insert_usage_events(&[
                UsageEvent::foreground("com.netflix.mediaclient", start + HOUR_MS),
                UsageEvent::background("com.netflix.mediaclient", start + 3 * HOUR_MS),
            ])
            .expect("events");

        let (report, saved) =
            generate_and_store_report(&config, &db, &CategoryRules::default(), date).expect("report");

        assert_eq!(report.screen_time_ms, 2 * HOUR_MS);
        assert!(saved.json_path.exists());
        let meta = lock(&db).latest_report_meta().expect("meta").expect("stored");
        assert_eq!(meta.date, "2025-06-02");
    }
}
