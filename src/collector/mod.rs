pub mod window;

use crate::analyzer::aggregator::{Credit, ForegroundTracker};
use crate::analyzer::categorizer::CategoryRules;
use crate::db::{SharedDatabase, lock};
use crate::models::{AppUsageRecord, FocusSession, ReminderPriority, SessionKind, UsageEvent, UserPreferences};
use crate::notifier::{Channel, Notification, SharedGate};
use crate::policy::{self, Enforcement, Enforcer};
use crate::timeutil::{now_millis, start_of_day};
use anyhow::Result;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{error, info, warn};

/// Platform collaborator reporting foreground/background transitions.
pub trait UsageSource: Send {
    /// Events observed since the previous poll, oldest first.
    fn poll(&mut self, now: i64) -> Result<Vec<UsageEvent>>;
}

pub type SharedEnforcer = Arc<Mutex<Enforcer>>;

pub fn lock_enforcer(enforcer: &SharedEnforcer) -> MutexGuard<'_, Enforcer> {
    match enforcer.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickOutcome {
    pub credited_ms: i64,
    pub foreground: Option<String>,
    pub enforcement: Enforcement,
}

pub struct UsageMonitor<S> {
    source: S,
    db: SharedDatabase,
    rules: Arc<CategoryRules>,
    enforcer: SharedEnforcer,
    gate: SharedGate,
    tracker: ForegroundTracker,
    /// Polled events not yet persisted.
    pending: Vec<UsageEvent>,
    notified_block: Option<(String, i64)>,
    active_session: Option<FocusSession>,
}

impl<S: UsageSource> UsageMonitor<S> {
    pub fn new(
        source: S,
        db: SharedDatabase,
        rules: Arc<CategoryRules>,
        enforcer: SharedEnforcer,
        gate: SharedGate,
        now: i64,
    ) -> Self {
        Self {
            source,
            db,
            rules,
            enforcer,
            gate,
            tracker: ForegroundTracker::new(now),
            pending: Vec::new(),
            notified_block: None,
            active_session: None,
        }
    }

    /// One poll cycle: persist events, credit usage, and evaluate the
    /// blocking policy for the foreground app under a single store lock.
    ///
    /// The tracker only advances once the store write commits, so a failed
    /// tick is replayed in full by the next one.
    pub fn tick(&mut self, now: i64) -> Result<TickOutcome> {
        self.pending.extend(self.source.poll(now)?);
        let events = std::mem::take(&mut self.pending);

        let mut tracker = self.tracker.clone();
        let mut credits = events
            .iter()
            .filter_map(|event| tracker.apply(event))
            .filter_map(|transition| transition.credit)
            .collect::<Vec<_>>();
        credits.extend(tracker.checkpoint(now));

        let foreground = tracker.current().map(str::to_string);

        let (prefs, blocking_session, active_session, foreground_app) = {
            let mut database = lock(&self.db);
            let rules = &self.rules;
            let recorded = database.record_tick(&events, &credits, now, |package_name| rules.categorize(package_name));
            if let Err(error) = recorded {
                self.pending = events;
                return Err(error);
            }
            self.tracker = tracker;

            let overrides = database.overrides_since(start_of_day(now))?;
            {
                let mut enforcer = lock_enforcer(&self.enforcer);
                for (package_name, started_at) in overrides {
                    enforcer.note_override(&package_name, started_at);
                }
            }

            let foreground_app = match &foreground {
                Some(package_name) => database.app_usage(package_name)?,
                None => None,
            };

            (
                database.preferences()?,
                database.session_covering(now)?,
                database.active_session(now)?,
                foreground_app,
            )
        };
        let focus_active = blocking_session.is_some();

        let enforcement = match &foreground_app {
            Some(app) => {
                let reason = policy::block_reason(app, blocking_session.as_ref(), now);
                lock_enforcer(&self.enforcer).evaluate(&app.package_name, reason, now)
            }
            None => Enforcement::Allowed,
        };

        if let (Some(app), Enforcement::Enforced { reason, since }) = (&foreground_app, &enforcement) {
            self.on_enforced(app, *reason, *since, &prefs, focus_active, now);
        }

        self.track_sessions(active_session, &prefs, focus_active, now)?;

        Ok(TickOutcome {
            credited_ms: credits.iter().map(Credit::duration).sum(),
            foreground,
            enforcement,
        })
    }

    fn on_enforced(
        &mut self,
        app: &AppUsageRecord,
        reason: policy::BlockReason,
        since: i64,
        prefs: &UserPreferences,
        focus_active: bool,
        now: i64,
    ) {
        let key = (app.package_name.clone(), since);
        if self.notified_block.as_ref() == Some(&key) {
            return;
        }
        self.notified_block = Some(key);

        if prefs.is_strict_mode_enabled {
            warn!(app = %app.package_name, reason = reason.as_str(), "strict mode: blocked app must be closed");
        } else {
            info!(app = %app.package_name, reason = reason.as_str(), "block enforced");
        }

        let text = reason.notification(app);
        let mut notification =
            Notification::new(Channel::AppLimit, text.title, text.message).with_priority(ReminderPriority::High);
        if prefs.allow_emergency_override && !prefs.is_strict_mode_enabled {
            notification = notification.with_action("Extend Time");
        }
        self.gate.deliver(prefs, &notification, now, focus_active);
    }

    /// Announces the end of the previously running session and, when the
    /// preferences ask for it, starts the next one of the cycle.
    fn track_sessions(
        &mut self,
        active: Option<FocusSession>,
        prefs: &UserPreferences,
        focus_active: bool,
        now: i64,
    ) -> Result<()> {
        let ended = match (&self.active_session, &active) {
            (Some(previous), None) => Some(previous.clone()),
            (Some(previous), Some(current)) if previous.id != current.id => Some(previous.clone()),
            _ => None,
        };
        self.active_session = active;

        let Some(finished) = ended else {
            return Ok(());
        };

        let (title, body) = match finished.kind {
            SessionKind::Focus => ("Focus session finished", "Time for a break!"),
            SessionKind::ShortBreak | SessionKind::LongBreak => ("Break finished", "Ready to focus again?"),
        };
        self.gate
            .deliver(prefs, &Notification::new(Channel::FocusSession, title, body), now, focus_active);

        if self.active_session.is_none() {
            self.active_session = self.start_next_session(&finished, prefs, now)?;
        }
        Ok(())
    }

    fn start_next_session(
        &self,
        finished: &FocusSession,
        prefs: &UserPreferences,
        now: i64,
    ) -> Result<Option<FocusSession>> {
        let database = lock(&self.db);
        let kind = match finished.kind {
            SessionKind::Focus if prefs.auto_start_breaks => {
                let focus_today = database.focus_sessions_between(start_of_day(finished.start_time), now + 1)?;
                SessionKind::next_break(focus_today, prefs.long_break_interval)
            }
            SessionKind::ShortBreak | SessionKind::LongBreak if prefs.auto_start_pomodoros => SessionKind::Focus,
            _ => return Ok(None),
        };

        let next = FocusSession::start(kind, prefs.session_length(kind), now, Vec::new());
        database.insert_session(&next)?;
        info!(kind = kind.as_str(), id = %next.id, "session started automatically");
        Ok(Some(next))
    }

    /// Persists anything still pending and credits the foreground app up to
    /// `now`.
    pub fn finish(self, now: i64) -> Result<()> {
        let Self {
            db,
            rules,
            mut tracker,
            pending,
            ..
        } = self;

        if pending.is_empty() {
            if let Some(credit) = tracker.close(now) {
                lock(&db).increment_app_usage(&credit.package_name, credit.duration(), credit.to)?;
            }
            return Ok(());
        }

        let mut credits = pending
            .iter()
            .filter_map(|event| tracker.apply(event))
            .filter_map(|transition| transition.credit)
            .collect::<Vec<_>>();
        credits.extend(tracker.close(now));
        lock(&db).record_tick(&pending, &credits, now, |package_name| rules.categorize(package_name))
    }
}

pub async fn run_usage_monitor<S: UsageSource>(
    mut monitor: UsageMonitor<S>,
    poll_millis: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(Duration::from_millis(poll_millis));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(poll_millis, "usage monitor started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }

        if *shutdown.borrow() {
            break;
        }

        if let Err(error) = monitor.tick(now_millis()) {
            error!(error = %error, "usage monitor tick failed");
        }
    }

    if let Err(error) = monitor.finish(now_millis()) {
        error!(error = %error, "failed to credit final usage span");
    }
    info!("usage monitor stopped");
}

#[cfg(test)]
mod tests {
    use super::{UsageMonitor, UsageSource, run_usage_monitor};
    use crate::analyzer::categorizer::CategoryRules;
    use crate::db::{Database, lock};
    use crate::models::{AppCategory, FocusSession, SessionKind, UsageEvent};
    use crate::notifier::{Notification, Notifier, PreferenceGate};
    use crate::policy::{BlockReason, Enforcement, Enforcer, GRACE_PERIOD_MS};
    use crate::timeutil::{DAY_MS, MINUTE_MS, now_millis, start_of_day};
    use anyhow::Result;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use tokio::sync::watch;
    use tokio::time::{Duration, timeout};

    struct Scripted(VecDeque<Vec<UsageEvent>>);

    impl UsageSource for Scripted {
        fn poll(&mut self, _now: i64) -> Result<Vec<UsageEvent>> {
            Ok(self.0.pop_front().unwrap_or_default())
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Notification>>);

    impl Notifier for Recorder {
        fn notify(&self, notification: &Notification) {
            if let Ok(mut seen) = self.0.lock() {
                seen.push(notification.clone());
            }
        }
    }

    fn monitor(script: Vec<Vec<UsageEvent>>) -> (UsageMonitor<Scripted>, Arc<Mutex<Database>>, Arc<Recorder>) {
        let db = Arc::new(Mutex::new(Database::open_in_memory().expect("db")));
        let recorder = Arc::new(Recorder::default());
        let notifier: Arc<dyn Notifier> = recorder.clone();
        let monitor = UsageMonitor::new(
            Scripted(script.into()),
            Arc::clone(&db),
            Arc::new(CategoryRules::default()),
            Arc::new(Mutex::new(Enforcer::new())),
            Arc::new(PreferenceGate::new(notifier)),
            0,
        );
        (monitor, db, recorder)
    }

    #[test]
    fn credits_foreground_time_and_registers_apps() {
        let (mut monitor, db, _) = monitor(vec![
            vec![UsageEvent::foreground("org.telegram.messenger", 1_000)],
            vec![],
            vec![UsageEvent::background("org.telegram.messenger", 4_000)],
        ]);

        monitor.tick(1_000).expect("tick");
        assert_eq!(monitor.tick(2_500).expect("tick").credited_ms, 1_500);
        assert_eq!(monitor.tick(5_000).expect("tick").credited_ms, 1_500);

        let app = lock(&db).app_usage("org.telegram.messenger").expect("load").expect("exists");
        assert_eq!(app.total_usage_today, 3_000);
        assert_eq!(app.category, AppCategory::Communication);
        assert_eq!(lock(&db).usage_events_between(0, 10_000).expect("events").len(), 2);
    }

    #[test]
    fn over_limit_app_is_enforced_after_grace_and_notified_once() {
        let (mut monitor, db, recorder) = monitor(vec![vec![UsageEvent::foreground("com.game", 0)]]);
        {
            let database = lock(&db);
            database
                .ensure_app("com.game", "Game", AppCategory::Gaming, 0)
                .expect("app");
            database.set_app_daily_limit("com.game", MINUTE_MS).expect("limit");
        }
        lock(&db).increment_app_usage("com.game", MINUTE_MS, 0).expect("usage");

        let first = monitor.tick(0).expect("tick");
        assert!(matches!(first.enforcement, Enforcement::Grace { reason: BlockReason::DailyLimit, .. }));

        let enforced = monitor.tick(GRACE_PERIOD_MS).expect("tick");
        assert!(matches!(enforced.enforcement, Enforcement::Enforced { .. }));
        monitor.tick(GRACE_PERIOD_MS + 1_000).expect("tick");

        let seen = recorder.0.lock().expect("lock");
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].title, "Daily Limit Reached");
    }

    #[test]
    fn focus_session_end_is_announced() {
        let (mut monitor, db, recorder) = monitor(vec![]);
        let session = FocusSession::start(SessionKind::Focus, MINUTE_MS, 0, Vec::new());
        lock(&db).insert_session(&session).expect("session");

        monitor.tick(1_000).expect("during");
        assert!(recorder.0.lock().expect("lock").is_empty());

        monitor.tick(MINUTE_MS + 1).expect("after");
        assert_eq!(recorder.0.lock().expect("lock")[0].title, "Focus session finished");
    }

    #[test]
    fn break_end_is_announced_with_its_own_text() {
        let (mut monitor, db, recorder) = monitor(vec![]);
        let session = FocusSession::start(SessionKind::ShortBreak, MINUTE_MS, 0, Vec::new());
        lock(&db).insert_session(&session).expect("session");

        monitor.tick(1_000).expect("during");
        monitor.tick(MINUTE_MS + 1).expect("after");

        let seen = recorder.0.lock().expect("lock");
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].title, "Break finished");
        assert_eq!(seen[0].body, "Ready to focus again?");
    }

    #[test]
    fn finished_focus_session_starts_the_next_break_when_enabled() {
        let (mut monitor, db, _) = monitor(vec![]);
        {
            let mut database = lock(&db);
            database
                .update_preferences(0, |prefs| {
                    prefs.set_value("auto_start_breaks", "true")?;
                    prefs.set_value("long_break_interval", "1")
                })
                .expect("prefs");
            database
                .insert_session(&FocusSession::start(SessionKind::Focus, MINUTE_MS, 0, Vec::new()))
                .expect("session");
        }

        monitor.tick(1_000).expect("during");
        monitor.tick(MINUTE_MS + 1).expect("after");

        let next = lock(&db).active_session(MINUTE_MS + 2).expect("load").expect("auto-started");
        assert_eq!(next.kind, SessionKind::LongBreak);
        assert_eq!(next.start_time, MINUTE_MS + 1);
    }

    #[test]
    fn usage_from_an_earlier_day_does_not_trigger_the_limit() {
        let now = now_millis();
        let (mut monitor, db, _) = monitor(vec![vec![UsageEvent::foreground("com.game", now)]]);
        let two_days_ago = start_of_day(now) - 2 * DAY_MS;
        {
            let mut database = lock(&db);
            database
                .ensure_app("com.game", "Game", AppCategory::Gaming, two_days_ago)
                .expect("app");
            database.set_app_daily_limit("com.game", MINUTE_MS).expect("limit");
            database
                .increment_app_usage("com.game", MINUTE_MS, two_days_ago)
                .expect("old usage");
        }

        let outcome = monitor.tick(now).expect("tick");
        assert_eq!(outcome.enforcement, Enforcement::Allowed);
        assert_eq!(
            lock(&db).app_usage("com.game").expect("load").expect("exists").total_usage_today,
            0
        );
    }

    #[test]
    fn failed_tick_is_replayed_without_losing_time() {
        let (mut monitor, db, _) = monitor(vec![
            vec![UsageEvent::foreground("com.a", 0)],
            vec![UsageEvent::foreground("com.b", 500)],
        ]);
        monitor.tick(0).expect("first");

        lock(&db).execute_raw("DROP TABLE usage_events").expect("drop");
        assert!(monitor.tick(1_000).is_err());

        lock(&db).init_schema().expect("recreate");
        monitor.tick(2_000).expect("replay");

        let database = lock(&db);
        assert_eq!(database.app_usage("com.a").expect("load").expect("a").total_usage_today, 500);
        assert_eq!(database.app_usage("com.b").expect("load").expect("b").total_usage_today, 1_500);
        assert_eq!(database.usage_events_between(0, 10_000).expect("events").len(), 1);
    }

    #[tokio::test]
    async fn loop_exits_on_shutdown_and_credits_final_span() {
        let (monitor, db, _) = monitor(vec![vec![UsageEvent::foreground("Code", crate::timeutil::now_millis())]]);
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(run_usage_monitor(monitor, 20, rx));
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).expect("shutdown");

        timeout(Duration::from_secs(2), handle)
            .await
            .expect("monitor stops")
            .expect("joined");
        assert!(lock(&db).app_usage("Code").expect("load").is_some());
    }
}
