use crate::models::{ReminderPriority, UserPreferences};
use crate::timeutil::hour_of_day;
#[cfg(any(target_os = "macos", target_os = "linux"))]
use std::process::{Command, Stdio};
use std::sync::Arc;
#[cfg(target_os = "macos")]
use tracing::warn;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    FocusSession,
    TaskReminder,
    AppLimit,
    Productivity,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FocusSession => "focus_session",
            Self::TaskReminder => "task_reminder",
            Self::AppLimit => "app_limit",
            Self::Productivity => "productivity",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub channel: Channel,
    pub title: String,
    pub body: String,
    pub priority: ReminderPriority,
    pub actions: Vec<String>,
}

impl Notification {
    pub fn new(channel: Channel, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            channel,
            title: title.into(),
            body: body.into(),
            priority: ReminderPriority::Normal,
            actions: Vec::new(),
        }
    }

    pub fn with_priority(mut self, priority: ReminderPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.actions.push(action.into());
        self
    }
}

/// Fire-and-forget delivery. Failures are logged, never returned.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification);
}

impl<N: Notifier + ?Sized> Notifier for Arc<N> {
    fn notify(&self, notification: &Notification) {
        (**self).notify(notification);
    }
}

/// Desktop delivery when enabled, log lines otherwise.
pub fn from_config(desktop_notifications: bool) -> Arc<dyn Notifier> {
    if desktop_notifications {
        Arc::new(DesktopNotifier)
    } else {
        Arc::new(LogNotifier)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) {
        info!(
            channel = notification.channel.as_str(),
            priority = %notification.priority,
            "{}: {}",
            notification.title,
            notification.body
        );
    }
}

/// Native desktop notifications, falling back to the log when no notifier
/// binary is available.
#[derive(Debug, Default, Clone, Copy)]
pub struct DesktopNotifier;

impl Notifier for DesktopNotifier {
    fn notify(&self, notification: &Notification) {
        if !send_native(notification) {
            LogNotifier.notify(notification);
        }
    }
}

#[cfg(target_os = "macos")]
fn send_native(notification: &Notification) -> bool {
    let mut args = vec![
        "-title".to_string(),
        notification.title.clone(),
        "-message".to_string(),
        notification.body.clone(),
        "-group".to_string(),
        notification.channel.as_str().to_string(),
    ];
    if !notification.actions.is_empty() {
        args.push("-actions".to_string());
        args.push(notification.actions.join(","));
    }

    let notified = Command::new("terminal-notifier")
        .args(&args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false);

    if notified {
        return true;
    }

    let script = "on run argv\n display notification (item 2 of argv) with title (item 1 of argv)\nend run";
    match Command::new("osascript")
        .arg("-e")
        .arg(script)
        .arg(&notification.title)
        .arg(&notification.body)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
    {
        Ok(status) => status.success(),
        Err(error) => {
            warn!(error = %error, "failed to show macOS notification");
            false
        }
    }
}

#[cfg(target_os = "linux")]
fn send_native(notification: &Notification) -> bool {
    let urgency = match notification.priority {
        ReminderPriority::Low => "low",
        ReminderPriority::Normal => "normal",
        ReminderPriority::High | ReminderPriority::Urgent => "critical",
    };

    match Command::new("notify-send")
        .args(["--app-name", "Darwesh", "--urgency", urgency])
        .arg(&notification.title)
        .arg(&notification.body)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
    {
        Ok(status) => status.success(),
        Err(error) => {
            debug!(error = %error, "notify-send unavailable");
            false
        }
    }
}

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
fn send_native(_notification: &Notification) -> bool {
    false
}

pub type SharedGate = Arc<PreferenceGate<Arc<dyn Notifier>>>;

/// Applies the user's notification preferences before delivery.
pub struct PreferenceGate<N> {
    inner: N,
}

impl<N: Notifier> PreferenceGate<N> {
    pub fn new(inner: N) -> Self {
        Self { inner }
    }

    /// Delivers unless preferences suppress it. Returns whether it was sent.
    pub fn deliver(
        &self,
        prefs: &UserPreferences,
        notification: &Notification,
        now: i64,
        focus_active: bool,
    ) -> bool {
        if !allows(prefs, notification, hour_of_day(now), focus_active) {
            debug!(
                channel = notification.channel.as_str(),
                title = %notification.title,
                "notification suppressed by preferences"
            );
            return false;
        }

        self.inner.notify(notification);
        true
    }
}

/// Urgent notifications bypass quiet hours and focus muting, never the
/// global switch.
pub fn allows(prefs: &UserPreferences, notification: &Notification, hour: u32, focus_active: bool) -> bool {
    if !prefs.is_notifications_enabled {
        return false;
    }
    if notification.priority == ReminderPriority::Urgent {
        return true;
    }
    if prefs.is_quiet_hour(hour) {
        return false;
    }

    // While focusing, only focus and blocking alerts get through.
    !(prefs.block_notifications
        && focus_active
        && !matches!(notification.channel, Channel::FocusSession | Channel::AppLimit))
}
