use super::Database;
use crate::models::UserPreferences;
use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};

pub(super) fn write(conn: &Connection, prefs: &UserPreferences) -> Result<()> {
    let data = serde_json::to_string(prefs).context("Failed to serialize preferences")?;
    conn.execute(
        "INSERT INTO user_preferences (id, data, updated_at) VALUES (1, ?1, ?2)
         ON CONFLICT(id) DO UPDATE SET data=excluded.data, updated_at=excluded.updated_at",
        params![data, prefs.updated_at],
    )
    .context("Failed to write preferences")?;

    Ok(())
}

fn read(conn: &Connection) -> Result<Option<UserPreferences>> {
    let data = conn
        .query_row("SELECT data FROM user_preferences WHERE id = 1", [], |row| {
            row.get::<_, String>(0)
        })
        .optional()
        .context("Failed to read preferences")?;

    data.map(|raw| serde_json::from_str(&raw).context("Failed to parse stored preferences"))
        .transpose()
}

impl Database {
    /// The singleton preferences row, created with defaults on first access.
    pub fn preferences(&self) -> Result<UserPreferences> {
        if let Some(prefs) = read(&self.conn)? {
            return Ok(prefs);
        }

        let prefs = UserPreferences::default();
        write(&self.conn, &prefs)?;
        Ok(prefs)
    }

    /// Read-modify-write of the preferences row in one transaction. The
    /// row is left untouched when `update` fails.
    pub fn update_preferences<F>(&mut self, now: i64, update: F) -> Result<UserPreferences>
    where
        F: FnOnce(&mut UserPreferences) -> Result<()>,
    {
        let transaction = self
            .conn
            .transaction()
            .context("Failed to start transaction")?;

        let mut prefs = read(&transaction)?.unwrap_or_default();
        update(&mut prefs)?;
        prefs.updated_at = now;
        write(&transaction, &prefs)?;

        transaction
            .commit()
            .context("Failed to commit preferences")?;
        Ok(prefs)
    }

    pub fn reset_preferences(&self, now: i64) -> Result<UserPreferences> {
        let prefs = UserPreferences {
            updated_at: now,
            ..UserPreferences::default()
        };
        write(&self.conn, &prefs)?;
        Ok(prefs)
    }

    pub fn set_last_backup_time(&mut self, at: i64) -> Result<UserPreferences> {
        self.update_preferences(at, |prefs| {
            prefs.last_backup_time = Some(at);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;
    use crate::models::{BackupFrequency, UserPreferences};

    #[test]
    fn defaults_created_on_first_access() {
        let db = Database::open_in_memory().expect("db");
        assert_eq!(db.preferences().expect("prefs"), UserPreferences::default());
    }

    #[test]
    fn failed_update_leaves_row_untouched() {
        let mut db = Database::open_in_memory().expect("db");

        let updated = db
            .update_preferences(5, |prefs| prefs.set_value("backup_frequency", "DAILY"))
            .expect("update");
        assert_eq!(updated.backup_frequency, BackupFrequency::Daily);
        assert_eq!(updated.updated_at, 5);

        assert!(db.update_preferences(6, |prefs| prefs.set_value("pomodoro_length", "zero")).is_err());
        assert_eq!(db.preferences().expect("prefs").updated_at, 5);

        db.set_last_backup_time(9).expect("backup time");
        assert_eq!(db.preferences().expect("prefs").last_backup_time, Some(9));

        let reset = db.reset_preferences(10).expect("reset");
        assert_eq!(reset.backup_frequency, BackupFrequency::Weekly);
        assert_eq!(db.preferences().expect("prefs").last_backup_time, None);
    }
}
