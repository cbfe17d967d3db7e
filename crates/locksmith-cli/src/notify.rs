use std::{io::Write, process::Command};

use chrono::Duration;
use locksmith_core::secret::{ExpirationStatus, Secret};
use tracing::debug;

use crate::config::NotificationMethod;

/// Warns about secrets that are expiring or already expired.
pub struct Notifier {
    method: NotificationMethod,
    threshold: Duration,
}

impl Notifier {
    pub fn new(method: NotificationMethod, threshold: Duration) -> Self {
        Self { method, threshold }
    }

    /// Emit a warning for `secret` if it is not valid. Returns the message sent.
    pub fn notify_expiration(
        &self,
        key: &str,
        secret: &Secret,
        stderr: &mut impl Write,
    ) -> Option<String> {
        if self.method == NotificationMethod::Silent {
            return None;
        }
        let status = secret.status(self.threshold);
        if status == ExpirationStatus::Valid {
            return None;
        }

        let message = format_message(key, secret.time_until_expiration(), status);
        match self.method {
            NotificationMethod::Stderr => {
                let _ = writeln!(stderr, "{message}");
            }
            NotificationMethod::NativeNotification => send_native(&message),
            NotificationMethod::Silent => {}
        }
        Some(message)
    }
}

pub fn format_message(key: &str, time_left: Duration, status: ExpirationStatus) -> String {
    if status == ExpirationStatus::Expired {
        return format!("Warning: Secret '{key}' expired {} ago", format_duration(-time_left));
    }
    format!("Warning: Secret '{key}' expires in {}", format_duration(time_left))
}

/// Coarse rendering: whole days, else hours, else minutes.
pub fn format_duration(d: Duration) -> String {
    if d.num_days() > 0 {
        return format!("{} days", d.num_days());
    }
    if d.num_hours() > 0 {
        return format!("{} hours", d.num_hours());
    }
    format!("{} minutes", d.num_minutes())
}

fn send_native(message: &str) {
    let result = if cfg!(target_os = "macos") {
        Command::new("osascript")
            .arg("-e")
            .arg(format!(
                "display notification {} with title \"Locksmith\"",
                applescript_quote(message)
            ))
            .status()
    } else {
        Command::new("notify-send").arg("Locksmith").arg(message).status()
    };
    if let Err(err) = result {
        debug!(error = %err, "native notification unavailable");
    }
}

/// Quote a string as an AppleScript literal so message text cannot inject script.
fn applescript_quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}
