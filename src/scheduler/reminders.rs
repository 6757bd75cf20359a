use super::Scheduler;
use crate::db::{SharedDatabase, lock};
use crate::models::{Reminder, ReminderKind};
use crate::notifier::{Channel, Notification, Notifier, PreferenceGate};
use anyhow::Result;
use std::collections::HashSet;
use tracing::{debug, info, warn};

fn register(reminders: &[Reminder], scheduler: &dyn Scheduler, now: i64) -> Vec<String> {
    reminders
        .iter()
        .filter_map(|reminder| {
            if reminder.kind == ReminderKind::LocationBased {
                debug!(reminder = %reminder.id, "location reminders have no trigger source");
                return None;
            }

            let next = reminder.next_trigger_after(now)?;
            match scheduler.schedule_at(&reminder.id, next, reminder.repeat_period()) {
                Ok(()) => Some(reminder.id.clone()),
                Err(error) => {
                    warn!(reminder = %reminder.id, error = %error, "failed to schedule reminder");
                    None
                }
            }
        })
        .collect()
}

/// Registers every enabled reminder that still has a future trigger.
/// Safe to call repeatedly: registrations replace by id.
pub fn reschedule_reminders(db: &SharedDatabase, scheduler: &dyn Scheduler, now: i64) -> Result<Vec<String>> {
    let reminders = lock(db).enabled_reminders()?;
    let registered = register(&reminders, scheduler, now);

    info!(registered = registered.len(), enabled = reminders.len(), "reminders scheduled");
    Ok(registered)
}

/// Keeps the alarm table in step with reminders edited while the service
/// runs.
#[derive(Debug, Default)]
pub struct ReminderSync {
    known: HashSet<String>,
}

impl ReminderSync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sync(&mut self, db: &SharedDatabase, scheduler: &dyn Scheduler, now: i64) -> Result<usize> {
        let reminders = lock(db).enabled_reminders()?;
        let enabled = reminders
            .iter()
            .map(|reminder| reminder.id.as_str())
            .collect::<HashSet<_>>();

        for stale in self.known.iter().filter(|id| !enabled.contains(id.as_str())) {
            scheduler.cancel(stale);
        }

        self.known = register(&reminders, scheduler, now).into_iter().collect();
        Ok(self.known.len())
    }
}

/// Records the firing and notifies. `Ok(false)` when the reminder was
/// deleted or disabled after it was scheduled.
pub fn handle_reminder_fired<N: Notifier>(
    db: &SharedDatabase,
    gate: &PreferenceGate<N>,
    id: &str,
    fired_at: i64,
) -> Result<bool> {
    let (reminder, prefs, focus_active) = {
        let mut database = lock(db);
        let Some(reminder) = database.reminder(id)? else {
            return Ok(false);
        };
        if !reminder.is_enabled {
            return Ok(false);
        }

        database.record_reminder_fired(id, fired_at)?;
        let focus_active = database.session_covering(fired_at)?.is_some();
        (reminder, database.preferences()?, focus_active)
    };

    let body = if reminder.description.trim().is_empty() {
        "Reminder".to_string()
    } else {
        reminder.description.clone()
    };
    let notification = Notification::new(Channel::TaskReminder, &reminder.title, body)
        .with_priority(reminder.priority)
        .with_action("Complete")
        .with_action("Snooze");

    let delivered = gate.deliver(&prefs, &notification, fired_at, focus_active);
    info!(reminder = %reminder.id, delivered, "reminder fired");

    Ok(true)
}
