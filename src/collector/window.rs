use super::UsageSource;
use crate::models::UsageEvent;
use anyhow::Result;

/// Name of the frontmost application, if the platform exposes one.
pub fn frontmost_app() -> Option<String> {
    #[cfg(target_os = "macos")]
    {
        return run_command(
            "osascript",
            &[
                "-e",
                "tell application \"System Events\" to get name of first application process whose frontmost is true",
            ],
        );
    }

    #[cfg(target_os = "linux")]
    {
        return run_command("xdotool", &["getactivewindow", "getwindowclassname"]);
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        None
    }
}

pub fn window_access_available() -> bool {
    frontmost_app().is_some()
}

#[cfg(any(target_os = "macos", target_os = "linux"))]
fn run_command(program: &str, args: &[&str]) -> Option<String> {
    let output = std::process::Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }

    let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!value.is_empty()).then_some(value)
}

/// Samples the frontmost application each poll and turns changes into
/// foreground/background transitions.
pub struct ActiveWindowSource<F = fn() -> Option<String>> {
    sample: F,
    current: Option<String>,
}

impl ActiveWindowSource {
    pub fn new() -> Self {
        Self::with_sampler(frontmost_app)
    }
}

impl Default for ActiveWindowSource {
    fn default() -> Self {
        Self::new()
    }
}

impl<F> ActiveWindowSource<F>
where
    F: FnMut() -> Option<String>,
{
    pub fn with_sampler(sample: F) -> Self {
        Self {
            sample,
            current: None,
        }
    }

    fn transition(&mut self, next: Option<String>, now: i64) -> Vec<UsageEvent> {
        if next == self.current {
            return Vec::new();
        }

        let mut events = Vec::with_capacity(2);
        if let Some(previous) = self.current.take() {
            events.push(UsageEvent::background(&previous, now));
        }
        if let Some(app) = &next {
            events.push(UsageEvent::foreground(app, now));
        }

        self.current = next;
        events
    }
}

impl<F> UsageSource for ActiveWindowSource<F>
where
    F: FnMut() -> Option<String> + Send,
{
    fn poll(&mut self, now: i64) -> Result<Vec<UsageEvent>> {
        let next = (self.sample)();
        Ok(self.transition(next, now))
    }
}
