mod alarm;
mod reminders;

pub use alarm::{AlarmScheduler, Scheduler};
pub use reminders::{ReminderSync, handle_reminder_fired, reschedule_reminders};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Local, LocalResult, NaiveDate, NaiveTime, TimeZone};
use std::future::Future;
use tokio::sync::watch;
use tokio::time::{Duration, sleep};
use tracing::{error, info};

const RESCHEDULE_POLL_SECONDS: u64 = 30;

/// Runs `task` once a day at the local time returned by `time_provider`.
/// The provider is re-read every poll so config edits apply without a
/// restart.
pub async fn run_daily_job<S, F, Fut>(
    name: &'static str,
    mut time_provider: S,
    mut task: F,
    mut shutdown: watch::Receiver<bool>,
) where
    S: FnMut() -> Result<NaiveTime>,
    F: FnMut(NaiveDate) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut last_logged = None;
    let poll = Duration::from_secs(RESCHEDULE_POLL_SECONDS);

    loop {
        let target = match time_provider() {
            Ok(value) => value,
            Err(error) => {
                error!(error = %error, job = name, "failed to load job schedule");
                if sleep_or_shutdown(poll, &mut shutdown).await {
                    break;
                }
                continue;
            }
        };

        let delay = match until_next_local(target, Local::now()) {
            Ok(value) => value,
            Err(error) => {
                error!(error = %error, job = name, "failed to compute next run");
                if sleep_or_shutdown(poll, &mut shutdown).await {
                    break;
                }
                continue;
            }
        };

        if last_logged != Some(target) {
            info!(job = name, seconds = delay.as_secs(), at = %target.format("%H:%M"), "next run scheduled");
            last_logged = Some(target);
        }

        if delay > poll {
            if sleep_or_shutdown(poll, &mut shutdown).await {
                break;
            }
            continue;
        }

        if sleep_or_shutdown(delay, &mut shutdown).await {
            break;
        }

        let date = Local::now().date_naive();
        if let Err(error) = task(date).await {
            error!(error = %error, job = name, date = %date, "scheduled job failed");
        }

        if sleep_or_shutdown(Duration::from_secs(1), &mut shutdown).await {
            break;
        }
    }

    info!(job = name, "daily job stopped");
}

/// Returns true when shutdown was requested before `duration` elapsed.
pub async fn sleep_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return true;
    }

    let changed = tokio::select! {
        _ = sleep(duration) => return false,
        changed = shutdown.changed() => changed,
    };

    changed.is_err() || *shutdown.borrow()
}

/// Time from `now` until the next local occurrence of `target`. Skips
/// forward a day when the wall-clock time does not exist today.
pub fn until_next_local(target: NaiveTime, now: DateTime<Local>) -> Result<Duration> {
    let today = now.date_naive();

    let candidate_today = match Local.from_local_datetime(&today.and_time(target)) {
        LocalResult::Single(datetime) => datetime,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => next_day_at(today, target)?,
    };

    let next_run = if candidate_today > now {
        candidate_today
    } else {
        next_day_at(today, target)?
    };

    (next_run - now)
        .to_std()
        .context("Failed to compute next execution delay")
}

fn next_day_at(today: NaiveDate, target: NaiveTime) -> Result<DateTime<Local>> {
    let tomorrow = today + ChronoDuration::days(1);
    Local
        .from_local_datetime(&tomorrow.and_time(target))
        .earliest()
        .context("Failed to convert next execution time")
}

#[cfg(test)]
mod tests {
    use super::{run_daily_job, sleep_or_shutdown, until_next_local};
    use chrono::{Local, NaiveTime, TimeZone};
    use tokio::sync::watch;
    use tokio::time::{Duration, timeout};

    #[test]
    fn next_run_is_later_today_or_tomorrow() {
        let now = Local
            .with_ymd_and_hms(2026, 3, 10, 12, 0, 0)
            .single()
            .expect("local time");

        let evening = NaiveTime::from_hms_opt(23, 30, 0).expect("time");
        let delay = until_next_local(evening, now).expect("delay");
        assert_eq!(delay.as_secs(), (11 * 60 + 30) * 60);

        let morning = NaiveTime::from_hms_opt(6, 0, 0).expect("time");
        let delay = until_next_local(morning, now).expect("delay");
        assert_eq!(delay.as_secs(), 18 * 3600);

        let noon = NaiveTime::from_hms_opt(12, 0, 0).expect("time");
        assert_eq!(until_next_local(noon, now).expect("delay").as_secs(), 24 * 3600);
    }

    #[tokio::test]
    async fn shutdown_interrupts_sleep_and_job_loop() {
        let (tx, mut rx) = watch::channel(false);
        tx.send(true).expect("send");
        assert!(sleep_or_shutdown(Duration::from_secs(60), &mut rx).await);

        let (tx, rx) = watch::channel(false);
        let job = tokio::spawn(run_daily_job(
            "test",
            || Ok(NaiveTime::from_hms_opt(3, 0, 0).expect("time")),
            |_| async { Ok(()) },
            rx,
        ));

        tx.send(true).expect("send");
        timeout(Duration::from_secs(2), job)
            .await
            .expect("job stops")
            .expect("joined");
    }
}
