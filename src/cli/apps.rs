use super::{AppCommands, UsageCommands, open_database, parse_optional_date, report_change, span_ms, window_start};
use crate::analyzer::aggregator::{
    aggregate, analyze_daily_pattern, daily_average_usage, hourly_usage, top_apps,
};
use crate::analyzer::categorizer::CategoryRules;
use crate::config::Config;
use crate::db::Database;
use crate::models::{AppCategory, AppUsageRecord};
use crate::policy::{self, Enforcer};
use crate::timeutil::{DAY_MS, MINUTE_MS, day_bounds, format_duration_long, now_millis, start_of_day};
use anyhow::{Result, bail};
use std::collections::BTreeMap;

pub fn handle_app_command(command: AppCommands, config: &Config) -> Result<()> {
    let rules = CategoryRules::load_or_default(&config.categories_path);
    let database = open_database(config)?;
    let now = now_millis();

    match command {
        AppCommands::List {
            category,
            blocked,
            over_limit,
            whitelisted,
            top,
        } => {
            let apps = if let Some(limit) = top {
                database.most_used_apps(limit)?
            } else if let Some(raw) = category {
                database.apps_by_category(raw.parse::<AppCategory>()?)?
            } else if blocked {
                database.blocked_apps()?
            } else if over_limit {
                database.over_limit_apps()?
            } else if whitelisted {
                database.whitelisted_apps()?
            } else {
                database.all_app_usage()?
            };

            if apps.is_empty() {
                println!("no apps recorded");
            }
            for app in &apps {
                print_app_line(app);
            }
            Ok(())
        }
        AppCommands::Show { package } => {
            let Some(app) = database.app_usage(&package)? else {
                println!("not found: {package}");
                return Ok(());
            };

            println!("{} ({})", app.app_name, app.package_name);
            println!("- category: {}", app.category.label());
            println!("- today: {}", format_duration_long(app.total_usage_today));
            match app.remaining_today() {
                Some(remaining) => println!(
                    "- daily_limit: {} ({} left)",
                    format_duration_long(app.daily_limit),
                    format_duration_long(remaining)
                ),
                None => println!("- daily_limit: none"),
            }
            println!("- blocked: {}", app.is_blocked);
            println!("- whitelisted: {}", app.is_whitelisted);
            Ok(())
        }
        AppCommands::Add {
            package,
            name,
            category,
        } => {
            if database.app_usage(&package)?.is_some() {
                bail!("Already tracked: {package}");
            }
            let category = match category {
                Some(raw) => raw.parse::<AppCategory>()?,
                None => rules.categorize(&package),
            };
            let name = name.unwrap_or_else(|| package.clone());

            database.upsert_app(&AppUsageRecord::new(&package, &name, category, now))?;
            println!("tracking {package} as {}", category.label());
            Ok(())
        }
        AppCommands::Limit { package, minutes } => {
            if minutes < 0 {
                bail!("Limit must be zero or more minutes");
            }
            track(&database, &rules, &package, now)?;
            let changed = database.set_app_daily_limit(&package, span_ms(minutes, MINUTE_MS, "minutes")?)?;
            if minutes == 0 {
                report_change(changed, "limit removed", &package);
            } else {
                report_change(changed, &format!("limit set to {minutes} min"), &package);
            }
            Ok(())
        }
        AppCommands::Block { package } => {
            track(&database, &rules, &package, now)?;
            report_change(database.set_app_blocked(&package, true)?, "blocked", &package);
            Ok(())
        }
        AppCommands::Unblock { package } => {
            report_change(database.set_app_blocked(&package, false)?, "unblocked", &package);
            Ok(())
        }
        AppCommands::Whitelist { package, remove } => {
            if remove {
                report_change(
                    database.set_app_whitelisted(&package, false)?,
                    "removed from whitelist",
                    &package,
                );
            } else {
                track(&database, &rules, &package, now)?;
                report_change(database.set_app_whitelisted(&package, true)?, "whitelisted", &package);
            }
            Ok(())
        }
        AppCommands::Classify { package, set } => {
            match set {
                Some(raw) => {
                    let category = raw.parse::<AppCategory>()?;
                    track(&database, &rules, &package, now)?;
                    report_change(
                        database.set_app_category(&package, category)?,
                        &format!("category set to {}", category.label()),
                        &package,
                    );
                }
                None => {
                    let category = rules.categorize(&package);
                    println!("{package}: {} ({})", category.label(), category.as_str());
                }
            }
            Ok(())
        }
        AppCommands::Recommend { package, days } => {
            if days <= 0 {
                bail!("--days must be positive");
            }
            let end = now;
            let start = window_start(start_of_day(now), days - 1, DAY_MS, "--days")?;
            let events = database.usage_events_between(start, end)?;
            let usage: BTreeMap<_, _> = aggregate(&events, start, end)
                .into_iter()
                .filter(|(name, _)| *name == package)
                .collect();

            let average = daily_average_usage(&usage, start, end);
            let category = database
                .app_usage(&package)?
                .map(|app| app.category)
                .unwrap_or_else(|| rules.categorize(&package));
            let limit = policy::recommended_limit(average, category);

            println!("{package}");
            println!("- average_per_day: {}", format_duration_long(average));
            println!("- recommended_limit: {}", format_duration_long(limit));
            Ok(())
        }
        AppCommands::Check { package } => {
            let app = database
                .app_usage(&package)?
                .unwrap_or_else(|| AppUsageRecord::new(&package, &package, rules.categorize(&package), now));
            let session = database.session_covering(now)?;

            match policy::block_reason(&app, session.as_ref(), now) {
                Some(reason) => {
                    let notice = reason.notification(&app);
                    println!("blocked: {} ({})", notice.title, reason.as_str());
                    println!("{}", notice.message);
                }
                None => println!("allowed: {package}"),
            }
            Ok(())
        }
        AppCommands::Stats => {
            let apps = database.all_app_usage()?;
            let stats = policy::blocking_stats(&apps);

            println!("Blocking stats");
            println!("- blocked_apps: {}", stats.total_blocked_apps);
            println!("- apps_with_limits: {}", stats.apps_with_limits);
            println!("- apps_over_limit: {}", stats.apps_over_limit);
            println!("- screen_time_today: {}", format_duration_long(database.total_screen_time()?));
            for (category, total) in database.category_usage()? {
                println!("  {:<14} {}", category.label(), format_duration_long(total));
            }
            Ok(())
        }
        AppCommands::Override { package } => grant_override(&database, &package, now),
        AppCommands::Delete { package } => {
            report_change(database.delete_app(&package)?, "deleted", &package);
            Ok(())
        }
    }
}

/// Manual edits on an app nobody has used yet still need a record.
fn track(database: &Database, rules: &CategoryRules, package: &str, now: i64) -> Result<()> {
    database.ensure_app(package, package, rules.categorize(package), now)?;
    Ok(())
}

fn grant_override(database: &Database, package: &str, now: i64) -> Result<()> {
    let Some(app) = database.app_usage(package)? else {
        println!("not found: {package}");
        return Ok(());
    };
    let prefs = database.preferences()?;

    let mut enforcer = Enforcer::new();
    for (name, started_at) in database.overrides_since(start_of_day(now))? {
        enforcer.note_override(&name, started_at);
    }

    match enforcer.request_override(&app, &prefs, now) {
        Some(until) => {
            database.record_override(package, now)?;
            println!(
                "override granted for {} min ({}/{} today)",
                (until - now) / MINUTE_MS,
                enforcer.overrides_today(package),
                prefs.emergency_override_limit
            );
        }
        None => println!("override refused: {package}"),
    }
    Ok(())
}

fn print_app_line(app: &AppUsageRecord) {
    let limit = if app.has_limit() {
        format_duration_long(app.daily_limit)
    } else {
        "-".to_string()
    };
    let mut flags = Vec::new();
    if app.is_blocked {
        flags.push("blocked");
    }
    if app.is_whitelisted {
        flags.push("whitelisted");
    }
    if app.is_over_limit() {
        flags.push("over-limit");
    }

    println!(
        "{:<40} {:<14} {:>12} / {:<12} {}",
        app.package_name,
        app.category.label(),
        format_duration_long(app.total_usage_today),
        limit,
        flags.join(",")
    );
}

pub fn handle_usage_command(command: UsageCommands, config: &Config) -> Result<()> {
    match command {
        UsageCommands::Aggregate { date, days, top } => {
            if days <= 0 {
                bail!("--days must be positive");
            }
            let last = parse_optional_date(date)?;
            let (_, end) = day_bounds(last);
            let start = window_start(end, days, DAY_MS, "--days")?;
            let end = end.min(now_millis());

            let database = open_database(config)?;
            let events = database.usage_events_between(start, end)?;
            let usage = aggregate(&events, start, end);
            let pattern = analyze_daily_pattern(&hourly_usage(&events, start, end));

            println!("Usage through {last} ({days} day(s))");
            println!("- daily_average: {}", format_duration_long(daily_average_usage(&usage, start, end)));
            println!("- peak_hour: {:02}:00", pattern.peak_usage_hour);
            for (name, summary) in top_apps(&usage, top) {
                println!(
                    "  {:<40} {:>12} {:>4} launch(es)",
                    name,
                    format_duration_long(summary.total_foreground_duration),
                    summary.launch_count
                );
            }

            let schedule = policy::suggest_blocking_schedule(&pattern)
                .iter()
                .map(|range| format!("{:02}-{:02}", range.start_hour, range.end_hour))
                .collect::<Vec<_>>();
            println!("- suggested_blocking: {}", schedule.join(", "));
            Ok(())
        }
    }
}
