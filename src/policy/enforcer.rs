use super::{BlockReason, can_override, emergency_override_end, grace_period_end};
use crate::models::{AppUsageRecord, UserPreferences};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enforcement {
    Allowed,
    /// Block decided but not yet enforced.
    Grace { reason: BlockReason, until: i64 },
    Enforced { reason: BlockReason, since: i64 },
    Overridden { reason: BlockReason, until: i64 },
}

#[derive(Debug, Clone, Copy)]
struct ActiveBlock {
    started_at: i64,
    override_until: Option<i64>,
    /// Set once grace or an override has lapsed; a re-applied block skips
    /// the grace period.
    enforced_since: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default)]
struct OverrideLog {
    count_today: u32,
    last_started_at: i64,
}

/// Turns block decisions into enforcement state over time.
#[derive(Debug, Default)]
pub struct Enforcer {
    blocks: HashMap<String, ActiveBlock>,
    overrides: HashMap<String, OverrideLog>,
}

impl Enforcer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evaluate(&mut self, package_name: &str, reason: Option<BlockReason>, now: i64) -> Enforcement {
        let Some(reason) = reason else {
            self.blocks.remove(package_name);
            return Enforcement::Allowed;
        };

        let block = self
            .blocks
            .entry(package_name.to_string())
            .or_insert(ActiveBlock {
                started_at: now,
                override_until: None,
                enforced_since: None,
            });

        // A persisted override may predate the block itself.
        if let Some(log) = self.overrides.get(package_name) {
            let until = emergency_override_end(log.last_started_at);
            if log.last_started_at > 0 && now < until {
                block.override_until = Some(block.override_until.map_or(until, |known| known.max(until)));
            }
        }

        if let Some(until) = block.override_until {
            if now < until {
                return Enforcement::Overridden { reason, until };
            }
            block.override_until = None;
            block.enforced_since = Some(until);
        }

        let grace_end = grace_period_end(block.started_at);
        if block.enforced_since.is_none() && now < grace_end {
            return Enforcement::Grace {
                reason,
                until: grace_end,
            };
        }

        let since = *block.enforced_since.get_or_insert(grace_end);
        Enforcement::Enforced { reason, since }
    }

    /// Grants an emergency override when preferences and the per-day budget
    /// allow it. Returns the override end.
    pub fn request_override(&mut self, app: &AppUsageRecord, prefs: &UserPreferences, now: i64) -> Option<i64> {
        if !prefs.allow_emergency_override {
            return None;
        }

        let log = self.overrides.get(&app.package_name).copied().unwrap_or_default();
        if !can_override(app, log.count_today, prefs.emergency_override_limit, log.last_started_at, now) {
            return None;
        }

        self.note_override(&app.package_name, now);
        let until = emergency_override_end(now);
        if let Some(block) = self.blocks.get_mut(&app.package_name) {
            block.override_until = Some(until);
        }

        Some(until)
    }

    /// Records an override granted elsewhere, e.g. loaded from the store.
    /// Replaying an already-known override is a no-op.
    pub fn note_override(&mut self, package_name: &str, started_at: i64) {
        let log = self.overrides.entry(package_name.to_string()).or_default();
        if started_at <= log.last_started_at {
            return;
        }

        log.count_today += 1;
        log.last_started_at = started_at;
    }

    pub fn overrides_today(&self, package_name: &str) -> u32 {
        self.overrides
            .get(package_name)
            .map(|log| log.count_today)
            .unwrap_or_default()
    }

    /// Day rollover: per-day override counts start again. The cooldown since
    /// the last override still applies.
    pub fn reset_day(&mut self) {
        for log in self.overrides.values_mut() {
            log.count_today = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Enforcement, Enforcer};
    use crate::models::{AppCategory, AppUsageRecord, UserPreferences};
    use crate::policy::{BlockReason, EMERGENCY_OVERRIDE_MS, GRACE_PERIOD_MS, OVERRIDE_COOLDOWN_MS};

    fn blocked_app() -> AppUsageRecord {
        AppUsageRecord {
            is_blocked: true,
            ..AppUsageRecord::new("com.game", "Game", AppCategory::Gaming, 0)
        }
    }

    #[test]
    fn grace_period_precedes_enforcement() {
        let mut enforcer = Enforcer::new();
        let reason = Some(BlockReason::ManuallyBlocked);

        assert_eq!(
            enforcer.evaluate("com.game", reason, 1_000),
            Enforcement::Grace {
                reason: BlockReason::ManuallyBlocked,
                until: 1_000 + GRACE_PERIOD_MS,
            }
        );
        assert!(matches!(
            enforcer.evaluate("com.game", reason, 1_000 + GRACE_PERIOD_MS),
            Enforcement::Enforced { .. }
        ));
        assert_eq!(enforcer.evaluate("com.game", None, 50_000), Enforcement::Allowed);
        assert!(matches!(
            enforcer.evaluate("com.game", reason, 60_000),
            Enforcement::Grace { .. }
        ));
    }

    #[test]
    fn override_expires_and_block_reapplies_without_grace() {
        let mut enforcer = Enforcer::new();
        let prefs = UserPreferences::default();
        let reason = Some(BlockReason::ManuallyBlocked);
        let start = OVERRIDE_COOLDOWN_MS;

        enforcer.evaluate("com.game", reason, start);
        let until = enforcer
            .request_override(&blocked_app(), &prefs, start + 1)
            .expect("override granted");
        assert_eq!(until, start + 1 + EMERGENCY_OVERRIDE_MS);

        assert!(matches!(
            enforcer.evaluate("com.game", reason, start + 2),
            Enforcement::Overridden { .. }
        ));
        assert!(matches!(
            enforcer.evaluate("com.game", reason, until),
            Enforcement::Enforced { .. }
        ));
    }

    #[test]
    fn override_budget_and_cooldown() {
        let mut enforcer = Enforcer::new();
        let prefs = UserPreferences {
            emergency_override_limit: 2,
            ..UserPreferences::default()
        };
        let app = blocked_app();
        let hour = OVERRIDE_COOLDOWN_MS;

        assert!(enforcer.request_override(&app, &prefs, hour).is_some());
        assert!(enforcer.request_override(&app, &prefs, hour + 1).is_none());
        assert!(enforcer.request_override(&app, &prefs, 2 * hour).is_some());
        assert!(enforcer.request_override(&app, &prefs, 5 * hour).is_none());
        assert_eq!(enforcer.overrides_today("com.game"), 2);

        enforcer.reset_day();
        assert!(enforcer.request_override(&app, &prefs, 6 * hour).is_some());

        let strict = UserPreferences {
            allow_emergency_override: false,
            ..UserPreferences::default()
        };
        assert!(Enforcer::new().request_override(&app, &strict, hour).is_none());
    }

    #[test]
    fn replayed_overrides_are_counted_once() {
        let mut enforcer = Enforcer::new();
        enforcer.note_override("com.game", 10);
        enforcer.note_override("com.game", 10);
        enforcer.note_override("com.game", 5);
        assert_eq!(enforcer.overrides_today("com.game"), 1);

        assert!(matches!(
            enforcer.evaluate("com.game", Some(BlockReason::DailyLimit), 20),
            Enforcement::Overridden { .. }
        ));
    }
}
