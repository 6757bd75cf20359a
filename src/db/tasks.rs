use super::Database;
use crate::models::{Task, TaskPriority, TaskSortOption};
use crate::timeutil::now_millis;
use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};

const COLUMNS: &str = "id, title, description, priority, due_date, is_completed, created_at, updated_at";

pub(super) fn insert(conn: &Connection, task: &Task) -> Result<()> {
    conn.execute(
        &format!("INSERT INTO tasks ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
        params![
            task.id,
            task.title,
            task.description,
            task.priority,
            task.due_date,
            task.is_completed,
            task.created_at,
            task.updated_at,
        ],
    )
    .with_context(|| format!("Failed to insert task: {}", task.id))?;

    Ok(())
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        priority: row.get(3)?,
        due_date: row.get(4)?,
        is_completed: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn order_clause(sort: TaskSortOption) -> &'static str {
    match sort {
        TaskSortOption::CreationDate => "created_at DESC",
        TaskSortOption::DueDate => "due_date IS NULL, due_date ASC, created_at DESC",
        TaskSortOption::Priority => {
            "CASE priority WHEN 'HIGH' THEN 0 WHEN 'MEDIUM' THEN 1 ELSE 2 END, due_date IS NULL, due_date ASC"
        }
        TaskSortOption::Alphabetical => "title COLLATE NOCASE ASC",
    }
}

impl Database {
    fn query_tasks(&self, filter: &str, order: &str, params: impl rusqlite::Params) -> Result<Vec<Task>> {
        let mut statement = self
            .conn
            .prepare(&format!("SELECT {COLUMNS} FROM tasks {filter} ORDER BY {order}"))?;

        let rows = statement
            .query_map(params, from_row)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query tasks")?;

        Ok(rows)
    }

    pub fn insert_task(&self, task: &Task) -> Result<()> {
        insert(&self.conn, task)
    }

    pub fn task(&self, id: &str) -> Result<Option<Task>> {
        self.conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM tasks WHERE id = ?1"),
                params![id],
                from_row,
            )
            .optional()
            .with_context(|| format!("Failed to load task: {id}"))
    }

    pub fn all_tasks(&self) -> Result<Vec<Task>> {
        self.query_tasks("", order_clause(TaskSortOption::CreationDate), [])
    }

    pub fn tasks_sorted(&self, sort: TaskSortOption, include_completed: bool) -> Result<Vec<Task>> {
        let filter = if include_completed { "" } else { "WHERE is_completed = 0" };
        self.query_tasks(filter, order_clause(sort), [])
    }

    pub fn tasks_by_priority(&self, priority: TaskPriority) -> Result<Vec<Task>> {
        self.query_tasks("WHERE priority = ?1", "created_at DESC", params![priority])
    }

    pub fn overdue_tasks(&self, now: i64) -> Result<Vec<Task>> {
        self.query_tasks(
            "WHERE due_date IS NOT NULL AND due_date < ?1 AND is_completed = 0",
            "due_date ASC",
            params![now],
        )
    }

    pub fn tasks_due_between(&self, from: i64, to: i64) -> Result<Vec<Task>> {
        self.query_tasks("WHERE due_date >= ?1 AND due_date < ?2", "due_date ASC", params![from, to])
    }

    pub fn search_tasks(&self, query: &str) -> Result<Vec<Task>> {
        let pattern = format!("%{}%", query.trim());
        self.query_tasks(
            "WHERE title LIKE ?1 OR description LIKE ?1",
            "created_at DESC",
            params![pattern],
        )
    }

    /// Tasks whose completion was last recorded inside `[from, to)`.
    pub fn completed_task_count_between(&self, from: i64, to: i64) -> Result<u32> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM tasks WHERE is_completed = 1 AND updated_at >= ?1 AND updated_at < ?2",
                params![from, to],
                |row| row.get(0),
            )
            .context("Failed to count completed tasks")
    }

    /// Flips the completion flag. `Ok(false)` when the task does not exist.
    pub fn toggle_task_completed(&mut self, id: &str) -> Result<bool> {
        let transaction = self
            .conn
            .transaction()
            .context("Failed to start transaction")?;

        let current = transaction
            .query_row(
                "SELECT is_completed FROM tasks WHERE id = ?1",
                params![id],
                |row| row.get::<_, bool>(0),
            )
            .optional()
            .with_context(|| format!("Failed to load task: {id}"))?;

        let Some(current) = current else {
            return Ok(false);
        };

        transaction
            .execute(
                "UPDATE tasks SET is_completed = ?1, updated_at = ?2 WHERE id = ?3",
                params![!current, now_millis(), id],
            )
            .context("Failed to toggle task")?;

        transaction
            .commit()
            .context("Failed to commit task toggle")?;
        Ok(true)
    }

    pub fn update_task_priority(&self, id: &str, priority: TaskPriority) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                "UPDATE tasks SET priority = ?1, updated_at = ?2 WHERE id = ?3",
                params![priority, now_millis(), id],
            )
            .with_context(|| format!("Failed to update task priority: {id}"))?;

        Ok(changed > 0)
    }

    pub fn delete_task(&self, id: &str) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM tasks WHERE id = ?1", params![id])
            .with_context(|| format!("Failed to delete task: {id}"))?;

        Ok(deleted > 0)
    }

    pub fn delete_completed_tasks(&self) -> Result<usize> {
        self.conn
            .execute("DELETE FROM tasks WHERE is_completed = 1", [])
            .context("Failed to clear completed tasks")
    }
}
