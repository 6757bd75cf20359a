use super::Database;
use crate::models::{AppCategory, AppUsageRecord};
use crate::timeutil::{now_millis, start_of_day};
use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::collections::BTreeMap;

const COLUMNS: &str = "package_name, app_name, category, daily_limit, is_blocked, is_whitelisted, total_usage_today, last_usage_time, updated_at";

pub(super) fn upsert(conn: &Connection, app: &AppUsageRecord) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO app_usage ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(package_name) DO UPDATE SET
               app_name=excluded.app_name, category=excluded.category, daily_limit=excluded.daily_limit,
               is_blocked=excluded.is_blocked, is_whitelisted=excluded.is_whitelisted,
               total_usage_today=excluded.total_usage_today, last_usage_time=excluded.last_usage_time,
               updated_at=excluded.updated_at"
        ),
        params![
            app.package_name,
            app.app_name,
            app.category,
            app.daily_limit,
            app.is_blocked,
            app.is_whitelisted,
            app.total_usage_today,
            app.last_usage_time,
            app.updated_at,
        ],
    )
    .with_context(|| format!("Failed to upsert app usage: {}", app.package_name))?;

    Ok(())
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<AppUsageRecord> {
    Ok(AppUsageRecord {
        package_name: row.get(0)?,
        app_name: row.get(1)?,
        category: row.get(2)?,
        daily_limit: row.get(3)?,
        is_blocked: row.get(4)?,
        is_whitelisted: row.get(5)?,
        total_usage_today: row.get(6)?,
        last_usage_time: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

pub(super) fn register(conn: &Connection, package_name: &str, app_name: &str, category: AppCategory, now: i64) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO app_usage (package_name, app_name, category, updated_at) VALUES (?1, ?2, ?3, ?4)",
        params![package_name, app_name, category, now],
    )
    .with_context(|| format!("Failed to register app: {package_name}"))?;

    Ok(())
}

/// Adds `delta_ms` to the app's total for the day of `used_at`. A total
/// last touched on an earlier day starts again from zero.
pub(super) fn add_usage(conn: &Connection, package_name: &str, delta_ms: i64, used_at: i64) -> Result<bool> {
    let current = conn
        .query_row(
            "SELECT total_usage_today, last_usage_time FROM app_usage WHERE package_name = ?1",
            params![package_name],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
        )
        .optional()
        .context("Failed to read usage total")?;

    let Some((total, last_used)) = current else {
        return Ok(false);
    };
    let base = if last_used < start_of_day(used_at) { 0 } else { total };

    conn.execute(
        "UPDATE app_usage SET total_usage_today = ?1, last_usage_time = ?2, updated_at = ?2 WHERE package_name = ?3",
        params![base.saturating_add(delta_ms.max(0)), used_at, package_name],
    )
    .context("Failed to increment usage")?;

    Ok(true)
}

pub(super) fn reset_stale_usage(conn: &Connection, now: i64) -> Result<usize> {
    conn.execute(
        "UPDATE app_usage SET total_usage_today = 0 WHERE total_usage_today > 0 AND last_usage_time < ?1",
        params![start_of_day(now)],
    )
    .context("Failed to reset stale usage totals")
}

impl Database {
    fn query_apps(&self, filter: &str, params: impl rusqlite::Params) -> Result<Vec<AppUsageRecord>> {
        let mut statement = self.conn.prepare(&format!(
            "SELECT {COLUMNS} FROM app_usage {filter} ORDER BY total_usage_today DESC, package_name ASC"
        ))?;

        let rows = statement
            .query_map(params, from_row)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query app usage")?;

        Ok(rows)
    }

    pub fn all_app_usage(&self) -> Result<Vec<AppUsageRecord>> {
        self.query_apps("", [])
    }

    pub fn app_usage(&self, package_name: &str) -> Result<Option<AppUsageRecord>> {
        self.conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM app_usage WHERE package_name = ?1"),
                params![package_name],
                from_row,
            )
            .optional()
            .with_context(|| format!("Failed to load app usage: {package_name}"))
    }

    pub fn upsert_app(&self, app: &AppUsageRecord) -> Result<()> {
        upsert(&self.conn, app)
    }

    /// Returns the stored record, creating it first if the app is new.
    pub fn ensure_app(
        &self,
        package_name: &str,
        app_name: &str,
        category: AppCategory,
        now: i64,
    ) -> Result<AppUsageRecord> {
        register(&self.conn, package_name, app_name, category, now)?;

        self.app_usage(package_name)?
            .with_context(|| format!("App disappeared after insert: {package_name}"))
    }

    pub fn blocked_apps(&self) -> Result<Vec<AppUsageRecord>> {
        self.query_apps("WHERE is_blocked = 1", [])
    }

    pub fn whitelisted_apps(&self) -> Result<Vec<AppUsageRecord>> {
        self.query_apps("WHERE is_whitelisted = 1", [])
    }

    pub fn apps_by_category(&self, category: AppCategory) -> Result<Vec<AppUsageRecord>> {
        self.query_apps("WHERE category = ?1", params![category])
    }

    pub fn over_limit_apps(&self) -> Result<Vec<AppUsageRecord>> {
        self.query_apps("WHERE daily_limit > 0 AND total_usage_today >= daily_limit", [])
    }

    pub fn most_used_apps(&self, limit: usize) -> Result<Vec<AppUsageRecord>> {
        self.query_apps("WHERE total_usage_today > 0", [])
            .map(|apps| apps.into_iter().take(limit).collect())
    }

    fn update_app_column(&self, package_name: &str, column: &str, value: impl rusqlite::ToSql) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                &format!("UPDATE app_usage SET {column} = ?1, updated_at = ?2 WHERE package_name = ?3"),
                params![value, now_millis(), package_name],
            )
            .with_context(|| format!("Failed to update {column} for {package_name}"))?;

        Ok(changed > 0)
    }

    pub fn set_app_blocked(&self, package_name: &str, blocked: bool) -> Result<bool> {
        self.update_app_column(package_name, "is_blocked", blocked)
    }

    pub fn set_app_whitelisted(&self, package_name: &str, whitelisted: bool) -> Result<bool> {
        self.update_app_column(package_name, "is_whitelisted", whitelisted)
    }

    pub fn set_app_daily_limit(&self, package_name: &str, limit_ms: i64) -> Result<bool> {
        self.update_app_column(package_name, "daily_limit", limit_ms.max(0))
    }

    pub fn set_app_category(&self, package_name: &str, category: AppCategory) -> Result<bool> {
        self.update_app_column(package_name, "category", category)
    }

    /// Adds foreground time to today's total. `Ok(false)` when the app is
    /// unknown.
    pub fn increment_app_usage(&mut self, package_name: &str, delta_ms: i64, used_at: i64) -> Result<bool> {
        let transaction = self
            .conn
            .transaction()
            .context("Failed to start transaction")?;

        if !add_usage(&transaction, package_name, delta_ms, used_at)? {
            return Ok(false);
        }

        transaction
            .commit()
            .context("Failed to commit usage increment")?;
        Ok(true)
    }

    pub fn reset_daily_usage(&self) -> Result<usize> {
        self.conn
            .execute("UPDATE app_usage SET total_usage_today = 0", [])
            .context("Failed to reset daily usage")
    }

    /// Zeroes totals whose last use falls before the local day of `now`.
    pub fn reset_stale_usage(&self, now: i64) -> Result<usize> {
        reset_stale_usage(&self.conn, now)
    }

    pub fn total_screen_time(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COALESCE(SUM(total_usage_today), 0) FROM app_usage", [], |row| row.get(0))
            .context("Failed to sum screen time")
    }

    pub fn category_usage(&self) -> Result<BTreeMap<AppCategory, i64>> {
        let mut statement = self.conn.prepare(
            "SELECT category, SUM(total_usage_today) FROM app_usage GROUP BY category",
        )?;

        let rows = statement
            .query_map([], |row| Ok((row.get::<_, AppCategory>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<Result<BTreeMap<_, _>, _>>()
            .context("Failed to query category usage")?;

        Ok(rows)
    }

    pub fn delete_app(&self, package_name: &str) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM app_usage WHERE package_name = ?1", params![package_name])
            .with_context(|| format!("Failed to delete app: {package_name}"))?;

        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;
    use crate::models::AppCategory;
    use crate::timeutil::{DAY_MS, MINUTE_MS, now_millis, start_of_day};

    #[test]
    fn ensure_app_is_idempotent() {
        let db = Database::open_in_memory().expect("db");
        let first = db
            .ensure_app("com.whatsapp", "WhatsApp", AppCategory::SocialMedia, 10)
            .expect("create");
        db.set_app_daily_limit("com.whatsapp", 1_000).expect("limit");

        let second = db
            .ensure_app("com.whatsapp", "Renamed", AppCategory::Other, 20)
            .expect("existing");
        assert_eq!(first.app_name, second.app_name);
        assert_eq!(second.daily_limit, 1_000);
        assert_eq!(second.category, AppCategory::SocialMedia);
    }

    #[test]
    fn increment_reports_unknown_apps() {
        let mut db = Database::open_in_memory().expect("db");
        assert!(!db.increment_app_usage("com.ghost", 100, 1).expect("no-op"));

        db.ensure_app("com.a", "A", AppCategory::Gaming, 0).expect("create");
        assert!(db.increment_app_usage("com.a", 600, 5).expect("increment"));
        assert!(db.increment_app_usage("com.a", 400, 9).expect("increment"));

        let app = db.app_usage("com.a").expect("load").expect("exists");
        assert_eq!(app.total_usage_today, 1_000);
        assert_eq!(app.last_usage_time, 9);
    }

    #[test]
    fn filtered_queries_and_reset() {
        let mut db = Database::open_in_memory().expect("db");
        db.ensure_app("com.a", "A", AppCategory::Gaming, 0).expect("a");
        db.ensure_app("com.b", "B", AppCategory::Productivity, 0).expect("b");
        db.set_app_daily_limit("com.a", 500).expect("limit");
        db.increment_app_usage("com.a", 500, 1).expect("usage");
        db.increment_app_usage("com.b", 200, 1).expect("usage");
        assert!(db.set_app_blocked("com.b", true).expect("block"));
        assert!(!db.set_app_blocked("com.ghost", true).expect("missing"));

        assert_eq!(db.over_limit_apps().expect("over")[0].package_name, "com.a");
        assert_eq!(db.blocked_apps().expect("blocked")[0].package_name, "com.b");
        assert_eq!(db.apps_by_category(AppCategory::Gaming).expect("cat").len(), 1);
        assert_eq!(db.total_screen_time().expect("total"), 700);
        assert_eq!(db.category_usage().expect("cats")[&AppCategory::Productivity], 200);
        assert_eq!(db.most_used_apps(1).expect("top")[0].package_name, "com.a");

        assert_eq!(db.reset_daily_usage().expect("reset"), 2);
        assert_eq!(db.total_screen_time().expect("total"), 0);
        assert!(db.delete_app("com.a").expect("delete"));
        assert!(db.app_usage("com.a").expect("load").is_none());
    }

    #[test]
    fn totals_from_an_earlier_day_do_not_carry_over() {
        let mut db = Database::open_in_memory().expect("db");
        let today = now_millis();
        let two_days_ago = start_of_day(today) - 2 * DAY_MS;

        db.ensure_app("com.game", "Game", AppCategory::Gaming, two_days_ago).expect("game");
        db.ensure_app("com.chat", "Chat", AppCategory::Communication, two_days_ago).expect("chat");
        db.increment_app_usage("com.game", MINUTE_MS, two_days_ago).expect("old usage");
        db.increment_app_usage("com.chat", MINUTE_MS, two_days_ago).expect("old usage");

        db.increment_app_usage("com.game", 1_000, today).expect("new usage");
        assert_eq!(db.app_usage("com.game").expect("load").expect("exists").total_usage_today, 1_000);

        assert_eq!(db.reset_stale_usage(today).expect("reset"), 1);
        assert_eq!(db.app_usage("com.chat").expect("load").expect("exists").total_usage_today, 0);
        assert_eq!(db.total_screen_time().expect("total"), 1_000);
    }
}
