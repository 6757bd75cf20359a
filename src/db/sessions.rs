use super::{Database, json_list, json_text};
use crate::models::{FocusSession, SessionCompletion, SessionKind};
use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};

const COLUMNS: &str = "id, start_time, end_time, duration, actual_duration, type, is_completed, was_interrupted, interruption_count, focus_score, notes, associated_tasks, created_at";

pub(super) fn insert(conn: &Connection, session: &FocusSession) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO focus_sessions ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
        ),
        params![
            session.id,
            session.start_time,
            session.end_time,
            session.planned_duration,
            session.actual_duration,
            session.kind,
            session.is_completed,
            session.was_interrupted,
            session.interruption_count,
            session.focus_score,
            session.notes,
            json_text(&session.associated_tasks)?,
            session.created_at,
        ],
    )
    .with_context(|| format!("Failed to insert focus session: {}", session.id))?;

    Ok(())
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<FocusSession> {
    Ok(FocusSession {
        id: row.get(0)?,
        start_time: row.get(1)?,
        end_time: row.get(2)?,
        planned_duration: row.get(3)?,
        actual_duration: row.get(4)?,
        kind: row.get(5)?,
        is_completed: row.get(6)?,
        was_interrupted: row.get(7)?,
        interruption_count: row.get(8)?,
        focus_score: row.get(9)?,
        notes: row.get(10)?,
        associated_tasks: json_list(row.get(11)?),
        created_at: row.get(12)?,
    })
}

impl Database {
    fn query_sessions(&self, filter: &str, params: impl rusqlite::Params) -> Result<Vec<FocusSession>> {
        let mut statement = self.conn.prepare(&format!(
            "SELECT {COLUMNS} FROM focus_sessions {filter} ORDER BY start_time DESC"
        ))?;

        let rows = statement
            .query_map(params, from_row)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query focus sessions")?;

        Ok(rows)
    }

    pub fn insert_session(&self, session: &FocusSession) -> Result<()> {
        insert(&self.conn, session)
    }

    pub fn session(&self, id: &str) -> Result<Option<FocusSession>> {
        self.conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM focus_sessions WHERE id = ?1"),
                params![id],
                from_row,
            )
            .optional()
            .with_context(|| format!("Failed to load focus session: {id}"))
    }

    pub fn all_sessions(&self) -> Result<Vec<FocusSession>> {
        self.query_sessions("", [])
    }

    pub fn completed_sessions(&self) -> Result<Vec<FocusSession>> {
        self.query_sessions("WHERE is_completed = 1", [])
    }

    pub fn sessions_by_kind(&self, kind: SessionKind) -> Result<Vec<FocusSession>> {
        self.query_sessions("WHERE type = ?1", params![kind])
    }

    /// Sessions that started inside `[from, to)`.
    pub fn sessions_between(&self, from: i64, to: i64) -> Result<Vec<FocusSession>> {
        self.query_sessions("WHERE start_time >= ?1 AND start_time < ?2", params![from, to])
    }

    /// Most recent focus session whose planned window contains `now`.
    ///
    /// Completed sessions are included, so a session completed before its
    /// planned end keeps focus blocking on until that end.
    pub fn session_covering(&self, now: i64) -> Result<Option<FocusSession>> {
        self.query_sessions(
            "WHERE type = 'FOCUS' AND start_time <= ?1 AND start_time + duration > ?1",
            params![now],
        )
        .map(|sessions| sessions.into_iter().next())
    }

    /// Most recent uncompleted session of any kind whose planned window
    /// contains `now`.
    pub fn active_session(&self, now: i64) -> Result<Option<FocusSession>> {
        self.query_sessions(
            "WHERE is_completed = 0 AND start_time <= ?1 AND start_time + duration > ?1",
            params![now],
        )
        .map(|sessions| sessions.into_iter().next())
    }

    pub fn running_session(&self) -> Result<Option<FocusSession>> {
        self.query_sessions("WHERE is_completed = 0", [])
            .map(|sessions| sessions.into_iter().next())
    }

    /// Applies the terminal transition. `Ok(false)` when the session does
    /// not exist or was already completed.
    pub fn complete_session(&mut self, id: &str, completion: SessionCompletion) -> Result<bool> {
        let transaction = self
            .conn
            .transaction()
            .context("Failed to start transaction")?;

        let existing = transaction
            .query_row(
                &format!("SELECT {COLUMNS} FROM focus_sessions WHERE id = ?1"),
                params![id],
                from_row,
            )
            .optional()
            .with_context(|| format!("Failed to load focus session: {id}"))?;

        let Some(completed) = existing.and_then(|session| session.completed(completion)) else {
            return Ok(false);
        };

        transaction
            .execute(
                "UPDATE focus_sessions
                 SET end_time = ?1, actual_duration = ?2, is_completed = 1, was_interrupted = ?3,
                     interruption_count = ?4, focus_score = ?5
                 WHERE id = ?6",
                params![
                    completed.end_time,
                    completed.actual_duration,
                    completed.was_interrupted,
                    completed.interruption_count,
                    completed.focus_score,
                    id,
                ],
            )
            .context("Failed to complete focus session")?;

        transaction
            .commit()
            .context("Failed to commit session completion")?;
        Ok(true)
    }

    /// Focus sessions that started inside `[from, to)`.
    pub fn focus_sessions_between(&self, from: i64, to: i64) -> Result<usize> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM focus_sessions WHERE type = 'FOCUS' AND start_time >= ?1 AND start_time < ?2",
                params![from, to],
                |row| row.get::<_, i64>(0),
            )
            .map(|count| usize::try_from(count).unwrap_or_default())
            .context("Failed to count focus sessions")
    }

    pub fn focus_time_between(&self, from: i64, to: i64) -> Result<i64> {
        self.conn
            .query_row(
                "SELECT COALESCE(SUM(actual_duration), 0) FROM focus_sessions
                 WHERE is_completed = 1 AND type = 'FOCUS' AND start_time >= ?1 AND start_time < ?2",
                params![from, to],
                |row| row.get(0),
            )
            .context("Failed to sum focus time")
    }

    pub fn delete_session(&self, id: &str) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM focus_sessions WHERE id = ?1", params![id])
            .with_context(|| format!("Failed to delete focus session: {id}"))?;

        Ok(deleted > 0)
    }
}
