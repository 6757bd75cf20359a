use super::Database;
use crate::models::UsageEvent;
use crate::timeutil::DAY_MS;
use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};

pub(super) fn insert(conn: &Connection, event: &UsageEvent) -> Result<()> {
    conn.execute(
        "INSERT INTO usage_events (package_name, kind, timestamp) VALUES (?1, ?2, ?3)",
        params![event.package_name, event.kind, event.timestamp],
    )
    .context("Failed to insert usage event")?;

    Ok(())
}

impl Database {
    #[cfg(test)]
    pub fn insert_usage_events(&mut self, events: &[UsageEvent]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        let transaction = self
            .conn
            .transaction()
            .context("Failed to start transaction")?;

        events.iter().try_for_each(|event| insert(&transaction, event))?;

        transaction
            .commit()
            .context("Failed to commit usage events")?;
        Ok(())
    }

    /// Events in `[from, to)` in the order they were observed.
    pub fn usage_events_between(&self, from: i64, to: i64) -> Result<Vec<UsageEvent>> {
        let mut statement = self.conn.prepare(
            "SELECT package_name, kind, timestamp
             FROM usage_events
             WHERE timestamp >= ?1 AND timestamp < ?2
             ORDER BY timestamp ASC, id ASC",
        )?;

        let rows = statement
            .query_map(params![from, to], |row| {
                Ok(UsageEvent {
                    package_name: row.get(0)?,
                    kind: row.get(1)?,
                    timestamp: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query usage events")?;

        Ok(rows)
    }

    pub fn latest_usage_event(&self) -> Result<Option<UsageEvent>> {
        self.conn
            .query_row(
                "SELECT package_name, kind, timestamp FROM usage_events ORDER BY timestamp DESC, id DESC LIMIT 1",
                [],
                |row| {
                    Ok(UsageEvent {
                        package_name: row.get(0)?,
                        kind: row.get(1)?,
                        timestamp: row.get(2)?,
                    })
                },
            )
            .optional()
            .context("Failed to load latest usage event")
    }

    pub fn cleanup_old_usage_events(&self, retention_days: u32, now: i64) -> Result<usize> {
        let threshold = now - i64::from(retention_days) * DAY_MS;

        self.conn
            .execute("DELETE FROM usage_events WHERE timestamp < ?1", params![threshold])
            .context("Failed to clean up old usage events")
    }

    pub fn record_override(&self, package_name: &str, started_at: i64) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO emergency_overrides (package_name, started_at) VALUES (?1, ?2)",
                params![package_name, started_at],
            )
            .with_context(|| format!("Failed to record override for {package_name}"))?;

        Ok(())
    }

    /// Overrides granted since `since`, oldest first.
    pub fn overrides_since(&self, since: i64) -> Result<Vec<(String, i64)>> {
        let mut statement = self.conn.prepare(
            "SELECT package_name, started_at FROM emergency_overrides WHERE started_at >= ?1 ORDER BY started_at ASC",
        )?;

        let rows = statement
            .query_map(params![since], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query overrides")?;

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;
    use crate::models::UsageEvent;
    use crate::timeutil::DAY_MS;

    #[test]
    fn events_round_trip_in_order_and_expire() {
        let mut db = Database::open_in_memory().expect("db");
        let events = vec![
            UsageEvent::foreground("com.a", 10),
            UsageEvent::background("com.a", 20),
            UsageEvent::foreground("com.b", 20),
        ];
        db.insert_usage_events(&events).expect("insert");

        assert_eq!(db.usage_events_between(0, 100).expect("between"), events);
        assert_eq!(db.usage_events_between(15, 20).expect("between").len(), 0);
        assert_eq!(db.latest_usage_event().expect("latest"), Some(events[2].clone()));

        assert_eq!(db.cleanup_old_usage_events(1, 2 * DAY_MS).expect("cleanup"), 3);
        assert!(db.latest_usage_event().expect("latest").is_none());
    }

    #[test]
    fn overrides_are_listed_oldest_first() {
        let db = Database::open_in_memory().expect("db");
        db.record_override("com.b", 30).expect("b");
        db.record_override("com.a", 10).expect("a");

        let overrides = db.overrides_since(5).expect("since");
        assert_eq!(overrides, vec![("com.a".to_string(), 10), ("com.b".to_string(), 30)]);
        assert_eq!(db.overrides_since(20).expect("since").len(), 1);
    }
}
