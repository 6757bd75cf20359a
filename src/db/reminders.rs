use super::{Database, json_list, json_text};
use crate::models::{Reminder, ReminderPriority};
use crate::timeutil::now_millis;
use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};

const COLUMNS: &str = "id, title, description, time, type, repeat_interval, custom_repeat_interval, is_enabled, last_triggered, next_trigger, associated_task_id, priority, tags, created_at, updated_at";

pub(super) fn insert(conn: &Connection, reminder: &Reminder) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO reminders ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
        ),
        params![
            reminder.id,
            reminder.title,
            reminder.description,
            reminder.time,
            reminder.kind,
            reminder.repeat_interval,
            reminder.custom_repeat_interval,
            reminder.is_enabled,
            reminder.last_triggered,
            reminder.next_trigger,
            reminder.associated_task_id,
            reminder.priority,
            json_text(&reminder.tags)?,
            reminder.created_at,
            reminder.updated_at,
        ],
    )
    .with_context(|| format!("Failed to insert reminder: {}", reminder.id))?;

    Ok(())
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<Reminder> {
    Ok(Reminder {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        time: row.get(3)?,
        kind: row.get(4)?,
        repeat_interval: row.get(5)?,
        custom_repeat_interval: row.get(6)?,
        is_enabled: row.get(7)?,
        last_triggered: row.get(8)?,
        next_trigger: row.get(9)?,
        associated_task_id: row.get(10)?,
        priority: row.get(11)?,
        tags: json_list(row.get(12)?),
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

impl Database {
    fn query_reminders(&self, filter: &str, params: impl rusqlite::Params) -> Result<Vec<Reminder>> {
        let mut statement = self
            .conn
            .prepare(&format!("SELECT {COLUMNS} FROM reminders {filter} ORDER BY time ASC"))?;

        let rows = statement
            .query_map(params, from_row)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query reminders")?;

        Ok(rows)
    }

    pub fn insert_reminder(&self, reminder: &Reminder) -> Result<()> {
        insert(&self.conn, reminder)
    }

    pub fn reminder(&self, id: &str) -> Result<Option<Reminder>> {
        self.conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM reminders WHERE id = ?1"),
                params![id],
                from_row,
            )
            .optional()
            .with_context(|| format!("Failed to load reminder: {id}"))
    }

    pub fn all_reminders(&self) -> Result<Vec<Reminder>> {
        self.query_reminders("", [])
    }

    pub fn enabled_reminders(&self) -> Result<Vec<Reminder>> {
        self.query_reminders("WHERE is_enabled = 1", [])
    }

    pub fn upcoming_reminders(&self, now: i64) -> Result<Vec<Reminder>> {
        self.query_reminders(
            "WHERE is_enabled = 1 AND next_trigger IS NOT NULL AND next_trigger > ?1",
            params![now],
        )
    }

    pub fn reminders_for_task(&self, task_id: &str) -> Result<Vec<Reminder>> {
        self.query_reminders("WHERE associated_task_id = ?1", params![task_id])
    }

    pub fn reminders_by_priority(&self, priority: ReminderPriority) -> Result<Vec<Reminder>> {
        self.query_reminders("WHERE priority = ?1", params![priority])
    }

    /// Flips the enabled flag. `Ok(false)` when the reminder does not exist.
    pub fn toggle_reminder_enabled(&mut self, id: &str) -> Result<bool> {
        let transaction = self
            .conn
            .transaction()
            .context("Failed to start transaction")?;

        let current = transaction
            .query_row(
                "SELECT is_enabled FROM reminders WHERE id = ?1",
                params![id],
                |row| row.get::<_, bool>(0),
            )
            .optional()
            .with_context(|| format!("Failed to load reminder: {id}"))?;

        let Some(current) = current else {
            return Ok(false);
        };

        transaction
            .execute(
                "UPDATE reminders SET is_enabled = ?1, updated_at = ?2 WHERE id = ?3",
                params![!current, now_millis(), id],
            )
            .context("Failed to toggle reminder")?;

        transaction
            .commit()
            .context("Failed to commit reminder toggle")?;
        Ok(true)
    }

    /// Records a firing and stores the next trigger, if any. `Ok(false)`
    /// when the reminder does not exist.
    pub fn record_reminder_fired(&mut self, id: &str, fired_at: i64) -> Result<bool> {
        let transaction = self
            .conn
            .transaction()
            .context("Failed to start transaction")?;

        let existing = transaction
            .query_row(
                &format!("SELECT {COLUMNS} FROM reminders WHERE id = ?1"),
                params![id],
                from_row,
            )
            .optional()
            .with_context(|| format!("Failed to load reminder: {id}"))?;

        let Some(reminder) = existing else {
            return Ok(false);
        };

        let next_trigger = reminder.next_trigger_after(fired_at);
        transaction
            .execute(
                "UPDATE reminders SET last_triggered = ?1, next_trigger = ?2, updated_at = ?1 WHERE id = ?3",
                params![fired_at, next_trigger, id],
            )
            .context("Failed to record reminder firing")?;

        transaction
            .commit()
            .context("Failed to commit reminder firing")?;
        Ok(true)
    }

    pub fn delete_reminder(&self, id: &str) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM reminders WHERE id = ?1", params![id])
            .with_context(|| format!("Failed to delete reminder: {id}"))?;

        Ok(deleted > 0)
    }
}
