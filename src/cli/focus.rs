use super::{FocusCommands, open_database, report_change, span_ms};
use crate::config::Config;
use crate::models::{FocusSession, SessionCompletion, SessionKind};
use crate::scoring::{analyze_focus_sessions, calculate_streak, focus_score, most_productive_hour};
use crate::timeutil::{
    MINUTE_MS, end_of_month, end_of_week, format_date, format_duration_long, format_time, local_date, now_millis,
    start_of_day, start_of_month, start_of_week,
};
use anyhow::{Result, bail};

pub fn handle_focus_command(command: FocusCommands, config: &Config) -> Result<()> {
    let mut database = open_database(config)?;
    let now = now_millis();

    match command {
        FocusCommands::Start { kind, minutes, tasks } => {
            let prefs = database.preferences()?;
            let kind = if kind.trim().eq_ignore_ascii_case("break") {
                let focus_today = database.focus_sessions_between(start_of_day(now), now + 1)?;
                SessionKind::next_break(focus_today, prefs.long_break_interval)
            } else {
                kind.parse::<SessionKind>()?
            };
            if let Some(running) = database.running_session()? {
                if running.is_running_at(now) {
                    bail!(
                        "A {} session is already running until {}",
                        running.kind,
                        format_time(running.planned_end(), prefs.time_format)
                    );
                }
            }

            let planned = match minutes {
                Some(value) if value <= 0 => bail!("--minutes must be positive"),
                Some(value) => {
                    let planned = span_ms(value, MINUTE_MS, "--minutes")?;
                    if now.checked_add(planned).is_none() {
                        bail!("--minutes is too large: {value}");
                    }
                    planned
                }
                None => prefs.session_length(kind),
            };

            let session = FocusSession::start(kind, planned, now, tasks);
            database.insert_session(&session)?;
            println!(
                "{} session started: {} (until {})",
                session.kind,
                session.id,
                format_time(session.planned_end(), prefs.time_format)
            );
            Ok(())
        }
        FocusCommands::Complete {
            id,
            interruptions,
            interrupted,
        } => {
            let session = match id {
                Some(id) => database.session(&id)?,
                None => database.running_session()?,
            };
            let Some(session) = session else {
                println!("not found: no running session");
                return Ok(());
            };

            let completion = SessionCompletion {
                end_time: now,
                actual_duration: now - session.start_time,
                was_interrupted: interrupted || interruptions > 0,
                interruption_count: interruptions,
            };
            let changed = database.complete_session(&session.id, completion)?;
            if !changed && session.is_completed {
                println!("already completed: {}", session.id);
                return Ok(());
            }
            report_change(changed, "completed", &session.id);

            if let Some(stored) = database.session(&session.id)? {
                println!(
                    "- duration: {}",
                    format_duration_long(stored.actual_duration.unwrap_or_default())
                );
                println!("- focus_score: {}", focus_score(&stored));
            }
            Ok(())
        }
        FocusCommands::List { limit, kind } => {
            let prefs = database.preferences()?;
            let sessions = match kind {
                Some(raw) => database.sessions_by_kind(raw.parse::<SessionKind>()?)?,
                None => database.all_sessions()?,
            };
            if sessions.is_empty() {
                println!("no focus sessions");
            }

            for session in sessions.iter().take(limit) {
                let status = if session.is_completed {
                    format!("score {}", session.focus_score.unwrap_or_default())
                } else if session.is_running_at(now) {
                    "running".to_string()
                } else {
                    "open".to_string()
                };
                println!(
                    "{} {} {} {:<11} {:>10} {}",
                    session.id,
                    format_date(session.start_time, prefs.date_format),
                    format_time(session.start_time, prefs.time_format),
                    session.kind.as_str(),
                    format_duration_long(session.actual_duration.unwrap_or(session.planned_duration)),
                    status
                );
            }
            Ok(())
        }
        FocusCommands::Delete { id } => {
            report_change(database.delete_session(&id)?, "deleted", &id);
            Ok(())
        }
        FocusCommands::Stats { period } => {
            let sessions = database.completed_sessions()?;
            let in_period = match period_bounds(&period, now)? {
                Some((from, to)) => database
                    .sessions_between(from, to)?
                    .into_iter()
                    .filter(|session| session.is_completed)
                    .collect(),
                None => sessions.clone(),
            };
            let metrics = analyze_focus_sessions(&in_period);

            println!("Focus stats ({period})");
            println!("- completed_sessions: {}", metrics.completed_sessions);
            println!("- total_focus_time: {}", format_duration_long(metrics.total_focus_time));
            println!("- average_focus_score: {:.1}", metrics.average_focus_score);
            println!("- streak_days: {}", calculate_streak(&sessions, local_date(now)));
            match most_productive_hour(&in_period) {
                Some(hour) => println!("- most_productive_hour: {hour:02}:00"),
                None => println!("- most_productive_hour: none"),
            }
            Ok(())
        }
    }
}

/// `[from, to]` of the named period around `now`; `None` for all time.
fn period_bounds(period: &str, now: i64) -> Result<Option<(i64, i64)>> {
    let bounds = match period.trim().to_lowercase().as_str() {
        "all" => None,
        "today" => Some((start_of_day(now), now + 1)),
        "week" => Some((start_of_week(now), end_of_week(now) + 1)),
        "month" => Some((start_of_month(now), end_of_month(now) + 1)),
        other => bail!("Unsupported period: {other}. Expected one of: today, week, month, all"),
    };
    Ok(bounds)
}

#[cfg(test)]
mod tests {
    use super::period_bounds;
    use crate::timeutil::now_millis;

    #[test]
    fn periods_enclose_now() {
        let now = now_millis();
        for period in ["today", "week", "month"] {
            let (from, to) = period_bounds(period, now).expect("valid").expect("bounded");
            assert!(from <= now && now < to, "{period}");
        }
        assert_eq!(period_bounds("all", now).expect("valid"), None);
        assert!(period_bounds("year", now).is_err());
    }
}
