use crate::timeutil::now_millis;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::{Notify, watch};
use tokio::time::{Duration, sleep};
use tracing::{debug, info};

const MAX_IDLE_WAIT_MS: i64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("alarm time is in the past")]
    InvalidTime,
    #[error("repeat interval must be positive")]
    InvalidInterval,
    #[error("scheduler is stopped")]
    Stopped,
}

pub trait Scheduler: Send + Sync {
    /// Registers or replaces the alarm for `id`.
    fn schedule_at(&self, id: &str, time: i64, repeat: Option<i64>) -> Result<(), ScheduleError>;

    /// Returns whether an alarm was registered.
    fn cancel(&self, id: &str) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Alarm {
    time: i64,
    repeat: Option<i64>,
}

impl Alarm {
    fn next_after(self, now: i64) -> Option<i64> {
        let period = self.repeat?;
        Some(self.time + ((now - self.time) / period + 1) * period)
    }
}

/// In-process alarm table driven by a tokio task.
#[derive(Default)]
pub struct AlarmScheduler {
    alarms: Mutex<HashMap<String, Alarm>>,
    changed: Notify,
    stopped: AtomicBool,
}

impl AlarmScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn alarms(&self) -> MutexGuard<'_, HashMap<String, Alarm>> {
        match self.alarms.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn len(&self) -> usize {
        self.alarms().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    pub fn next_fire_time(&self, id: &str) -> Option<i64> {
        self.alarms().get(id).map(|alarm| alarm.time)
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.changed.notify_one();
    }

    /// Removes every alarm due at `now`, re-arming repeating ones, and
    /// returns the fired ids with their scheduled times.
    fn take_due(&self, now: i64) -> Vec<(String, i64)> {
        let mut alarms = self.alarms();
        let due = alarms
            .iter()
            .filter(|(_, alarm)| alarm.time <= now)
            .map(|(id, alarm)| (id.clone(), *alarm))
            .collect::<Vec<_>>();

        for (id, alarm) in &due {
            match alarm.next_after(now) {
                Some(next) => {
                    if let Some(entry) = alarms.get_mut(id) {
                        entry.time = next;
                    }
                }
                None => {
                    alarms.remove(id);
                }
            }
        }

        let mut fired = due
            .into_iter()
            .map(|(id, alarm)| (id, alarm.time))
            .collect::<Vec<_>>();
        fired.sort_by_key(|(_, time)| *time);
        fired
    }

    fn earliest(&self) -> Option<i64> {
        self.alarms().values().map(|alarm| alarm.time).min()
    }

    /// Fires alarms until `shutdown` flips to true. Callbacks run outside
    /// the alarm table lock, so they may reschedule.
    pub async fn run<F>(&self, mut on_fire: F, mut shutdown: watch::Receiver<bool>)
    where
        F: FnMut(&str, i64),
    {
        info!(alarms = self.len(), "alarm scheduler started");

        loop {
            if *shutdown.borrow() || self.stopped.load(Ordering::SeqCst) {
                break;
            }

            let now = now_millis();
            for (id, scheduled) in self.take_due(now) {
                debug!(id = %id, scheduled, "alarm fired");
                on_fire(&id, scheduled);
            }

            let wait_ms = self
                .earliest()
                .map_or(MAX_IDLE_WAIT_MS, |next| (next - now_millis()).clamp(0, MAX_IDLE_WAIT_MS));

            tokio::select! {
                _ = sleep(Duration::from_millis(wait_ms as u64)) => {}
                _ = self.changed.notified() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        self.stopped.store(true, Ordering::SeqCst);
        info!("alarm scheduler stopped");
    }
}

impl Scheduler for AlarmScheduler {
    fn schedule_at(&self, id: &str, time: i64, repeat: Option<i64>) -> Result<(), ScheduleError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(ScheduleError::Stopped);
        }
        if repeat.is_some_and(|period| period <= 0) {
            return Err(ScheduleError::InvalidInterval);
        }

        let now = now_millis();
        let alarm = Alarm { time, repeat };
        let time = if time > now {
            time
        } else {
            alarm.next_after(now).ok_or(ScheduleError::InvalidTime)?
        };

        if let Some(previous) = self.alarms().insert(id.to_string(), Alarm { time, repeat }) {
            debug!(id, previous = previous.time, time, "alarm replaced");
        }
        self.changed.notify_one();

        Ok(())
    }

    fn cancel(&self, id: &str) -> bool {
        let removed = self.alarms().remove(id).is_some();
        if removed {
            self.changed.notify_one();
        } else {
            debug!(id, "cancel requested for unknown alarm");
        }
        removed
    }
}
