use super::{ReminderCommands, TaskCommands, open_database, parse_when, report_change};
use crate::config::Config;
use crate::models::{
    Reminder, ReminderPriority, RepeatInterval, Task, TaskPriority, TaskSortOption, UserPreferences,
};
use crate::scoring::analyze_tasks;
use crate::timeutil::{MINUTE_MS, end_of_day, format_date, format_time, is_same_day, now_millis, start_of_day};
use anyhow::{Result, bail};

pub fn handle_task_command(command: TaskCommands, config: &Config) -> Result<()> {
    let mut database = open_database(config)?;
    let now = now_millis();

    match command {
        TaskCommands::Add {
            title,
            description,
            priority,
            due,
        } => {
            if title.trim().is_empty() {
                bail!("Task title must not be empty");
            }
            let prefs = database.preferences()?;
            let priority = match priority {
                Some(raw) => raw.parse::<TaskPriority>()?,
                None => prefs.default_task_priority,
            };
            let due_date = due.as_deref().map(parse_when).transpose()?;

            let task = Task::new(&title, &description, priority, due_date, now);
            database.insert_task(&task)?;
            println!("task added: {}", task.id);
            Ok(())
        }
        TaskCommands::List {
            sort,
            all,
            overdue,
            search,
            priority,
            today,
        } => {
            let prefs = database.preferences()?;
            let tasks = if overdue {
                database.overdue_tasks(now)?
            } else if today {
                database.tasks_due_between(start_of_day(now), end_of_day(now) + 1)?
            } else if let Some(raw) = priority {
                database.tasks_by_priority(raw.parse::<TaskPriority>()?)?
            } else if let Some(query) = search {
                database.search_tasks(&query)?
            } else {
                let sort = match sort {
                    Some(raw) => raw.parse::<TaskSortOption>()?,
                    None => prefs.sort_tasks_by,
                };
                database.tasks_sorted(sort, all || prefs.show_completed_tasks)?
            };

            if tasks.is_empty() {
                println!("no tasks");
            }
            for task in &tasks {
                print_task_line(task, &prefs, now);
            }

            let metrics = analyze_tasks(&database.all_tasks()?);
            println!("completion rate: {:.0}%", metrics.completion_rate);
            Ok(())
        }
        TaskCommands::Toggle { id } => {
            report_change(database.toggle_task_completed(&id)?, "toggled", &id);
            Ok(())
        }
        TaskCommands::Priority { id, priority } => {
            let priority = priority.parse::<TaskPriority>()?;
            report_change(
                database.update_task_priority(&id, priority)?,
                &format!("priority set to {priority}"),
                &id,
            );
            Ok(())
        }
        TaskCommands::Delete { id } => {
            report_change(database.delete_task(&id)?, "deleted", &id);
            Ok(())
        }
        TaskCommands::ClearCompleted => {
            println!("removed {} completed task(s)", database.delete_completed_tasks()?);
            Ok(())
        }
    }
}

fn print_task_line(task: &Task, prefs: &UserPreferences, now: i64) {
    let mark = if task.is_completed { "x" } else { " " };
    let due = task
        .due_date
        .map(|due| {
            let day = if is_same_day(due, now) {
                "today".to_string()
            } else {
                format_date(due, prefs.date_format)
            };
            format!("{day} {}", format_time(due, prefs.time_format))
        })
        .unwrap_or_else(|| "-".to_string());
    let overdue = if task.is_overdue(now) { " overdue" } else { "" };

    println!(
        "[{mark}] {} {:<6} {:<18} {}{overdue}",
        task.id, task.priority.as_str(), due, task.title
    );
}

pub fn handle_reminder_command(command: ReminderCommands, config: &Config) -> Result<()> {
    let mut database = open_database(config)?;
    let now = now_millis();

    match command {
        ReminderCommands::Add {
            title,
            at,
            description,
            repeat,
            every_minutes,
            priority,
            task,
            tags,
        } => {
            if title.trim().is_empty() {
                bail!("Reminder title must not be empty");
            }

            let mut reminder = Reminder::new(&title, parse_when(&at)?, now);
            reminder.description = description;
            reminder.tags = tags;
            if let Some(raw) = priority {
                reminder.priority = raw.parse::<ReminderPriority>()?;
            }
            if let Some(task_id) = task {
                if database.task(&task_id)?.is_none() {
                    bail!("Unknown task: {task_id}");
                }
                reminder.associated_task_id = Some(task_id);
            }
            if let Some(raw) = repeat {
                reminder = build_repeat(reminder, raw.parse::<RepeatInterval>()?, every_minutes)?;
            }
            reminder.next_trigger = reminder.next_trigger_after(now);

            database.insert_reminder(&reminder)?;
            println!("reminder added: {}", reminder.id);
            if reminder.next_trigger.is_none() {
                println!("note: trigger time is in the past and the reminder does not repeat");
            }
            Ok(())
        }
        ReminderCommands::List {
            upcoming,
            priority,
            task,
        } => {
            let prefs = database.preferences()?;
            let reminders = if upcoming {
                database.upcoming_reminders(now)?
            } else if let Some(task_id) = task {
                database.reminders_for_task(&task_id)?
            } else if let Some(raw) = priority {
                database.reminders_by_priority(raw.parse::<ReminderPriority>()?)?
            } else {
                database.all_reminders()?
            };

            if reminders.is_empty() {
                println!("no reminders");
            }
            for reminder in &reminders {
                let next = reminder
                    .next_trigger
                    .map(|at| format!("{} {}", format_date(at, prefs.date_format), format_time(at, prefs.time_format)))
                    .unwrap_or_else(|| "-".to_string());
                let state = if reminder.is_enabled { "on " } else { "off" };
                println!(
                    "{} {state} {:<8} {:<18} {}",
                    reminder.id, reminder.priority.as_str(), next, reminder.title
                );
            }
            Ok(())
        }
        ReminderCommands::Toggle { id } => {
            report_change(database.toggle_reminder_enabled(&id)?, "toggled", &id);
            Ok(())
        }
        ReminderCommands::Delete { id } => {
            report_change(database.delete_reminder(&id)?, "deleted", &id);
            Ok(())
        }
    }
}

fn build_repeat(reminder: Reminder, interval: RepeatInterval, every_minutes: Option<i64>) -> Result<Reminder> {
    let custom = match (interval, every_minutes) {
        (RepeatInterval::Custom, Some(minutes)) if minutes > 0 => Some(minutes * MINUTE_MS),
        (RepeatInterval::Custom, _) => bail!("--repeat custom needs a positive --every-minutes"),
        _ => None,
    };

    Ok(reminder.repeating(interval, custom))
}

#[cfg(test)]
mod tests {
    use super::build_repeat;
    use crate::models::{Reminder, RepeatInterval};
    use crate::timeutil::MINUTE_MS;

    #[test]
    fn custom_repeat_requires_a_period() {
        let base = Reminder::new("Water", 1_000, 0);

        let custom = build_repeat(base.clone(), RepeatInterval::Custom, Some(90)).expect("custom");
        assert_eq!(custom.repeat_period(), Some(90 * MINUTE_MS));

        assert!(build_repeat(base.clone(), RepeatInterval::Custom, None).is_err());
        assert!(build_repeat(base, RepeatInterval::Custom, Some(0)).is_err());
    }
}
