use std::{borrow::Cow, io::Write};

use chrono::{DateTime, Duration, Utc};
use color_eyre::{
    eyre::{eyre, WrapErr},
    Result,
};
use locksmith_core::{
    cache::SecretCache,
    secret::{ExpirationStatus, SecretMetadata},
    store::CredentialStore,
};
use locksmith_lifecycle::Locksmith;
use serde::Serialize;
use tracing::warn;
use zeroize::Zeroizing;

use crate::{
    config::Config,
    duration::parse_duration,
    notify::Notifier,
};

/// Execute `add`: store a secret that expires after `expires`.
pub fn add<S: CredentialStore, C: SecretCache>(
    locksmith: &Locksmith<S, C>,
    key: &str,
    secret: String,
    expires: &str,
    out: &mut impl Write,
) -> Result<()> {
    let secret = Zeroizing::new(secret);
    let lifetime = parse_duration(expires).wrap_err("invalid expiration duration")?;
    let lifetime = Duration::from_std(lifetime).wrap_err("invalid expiration duration")?;
    let expires_at = Utc::now()
        .checked_add_signed(lifetime)
        .ok_or_else(|| eyre!("invalid expiration duration: too far in the future"))?;

    locksmith
        .set(key, secret.as_bytes(), expires_at)
        .wrap_err("error saving secret")?;

    writeln!(
        out,
        "Successfully saved secret '{key}' (expires at {})",
        expires_at.format("%Y-%m-%d %H:%M UTC")
    )?;
    Ok(())
}

#[derive(Serialize)]
struct GetOutput<'a> {
    key: &'a str,
    value: Cow<'a, str>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    expires_in: String,
    is_expired: bool,
    is_expiring: bool,
}

/// Execute `get`: print the value (or JSON) on `out`, warnings on `err`.
pub fn get<S: CredentialStore, C: SecretCache>(
    locksmith: &Locksmith<S, C>,
    key: &str,
    json: bool,
    config: &Config,
    out: &mut impl Write,
    err: &mut impl Write,
) -> Result<()> {
    let threshold = threshold_or_default(config);
    let secret = locksmith
        .get_with_metadata(key)
        .wrap_err("error retrieving secret")?;

    if json {
        let time_left = secret.time_until_expiration();
        let doc = GetOutput {
            key,
            value: String::from_utf8_lossy(secret.value()),
            created_at: secret.created_at(),
            expires_at: secret.expires_at(),
            expires_in: format_precise(time_left),
            is_expired: secret.is_expired(),
            is_expiring: secret.status(threshold) == ExpirationStatus::Expiring,
        };
        let rendered = Zeroizing::new(serde_json::to_string_pretty(&doc)?);
        writeln!(out, "{}", rendered.as_str())?;
        return Ok(());
    }

    if config.notifications.show_on_get {
        Notifier::new(config.notifications.method, threshold).notify_expiration(key, &secret, err);
    }
    out.write_all(secret.value())?;
    writeln!(out)?;
    Ok(())
}

/// Execute `list`: table of keys with cached metadata.
pub fn list<S: CredentialStore, C: SecretCache>(
    locksmith: &Locksmith<S, C>,
    config: &Config,
    out: &mut impl Write,
) -> Result<()> {
    let items = locksmith.list().wrap_err("error listing secrets")?;
    if items.is_empty() {
        writeln!(out, "No secrets stored.")?;
        return Ok(());
    }

    let threshold = threshold_or_default(config);
    writeln!(
        out,
        "{:<30} {:<20} {:<20} {:<12}",
        "KEY", "CREATED", "EXPIRES", "STATUS"
    )?;
    writeln!(out, "{}", "-".repeat(84))?;

    for (key, metadata) in &items {
        match metadata {
            None => writeln!(
                out,
                "{:<30} {:<20} {:<20} {:<12}",
                truncate(key, 30),
                "N/A",
                "N/A",
                "Unknown"
            )?,
            Some(metadata) => writeln!(
                out,
                "{:<30} {:<20} {:<20} {}",
                truncate(key, 30),
                metadata.created_at.format("%Y-%m-%d").to_string(),
                metadata.expires_at.format("%Y-%m-%d").to_string(),
                status_display(metadata, threshold, config.notifications.show_on_list)
            )?,
        }
    }
    Ok(())
}

/// Execute `delete`.
pub fn delete<S: CredentialStore, C: SecretCache>(
    locksmith: &Locksmith<S, C>,
    key: &str,
    out: &mut impl Write,
) -> Result<()> {
    locksmith.delete(key).wrap_err("error deleting secret")?;
    writeln!(out, "Successfully deleted secret '{key}'")?;
    Ok(())
}

/// Summon provider contract: raw value, no trailing newline.
pub fn summon<S: CredentialStore, C: SecretCache>(
    locksmith: &Locksmith<S, C>,
    secret_id: &str,
    out: &mut impl Write,
) -> Result<()> {
    let value = locksmith.get(secret_id)?;
    out.write_all(&value)?;
    out.flush()?;
    Ok(())
}

/// `719h59m59s` style, whole seconds, leading zero units dropped.
fn format_precise(d: Duration) -> String {
    let secs = d.num_seconds();
    let sign = if secs < 0 { "-" } else { "" };
    let secs = secs.unsigned_abs();
    let (h, m, s) = (secs / 3600, secs % 3600 / 60, secs % 60);
    if h > 0 {
        format!("{sign}{h}h{m}m{s}s")
    } else if m > 0 {
        format!("{sign}{m}m{s}s")
    } else {
        format!("{sign}{s}s")
    }
}

fn threshold_or_default(config: &Config) -> Duration {
    config.expiring_threshold().unwrap_or_else(|err| {
        warn!(error = %err, "invalid expiring_threshold; using 7d");
        Duration::days(7)
    })
}

fn status_display(metadata: &SecretMetadata, threshold: Duration, show: bool) -> &'static str {
    if !show {
        return "";
    }
    match metadata.status(threshold) {
        ExpirationStatus::Expired => "❌ Expired",
        ExpirationStatus::Expiring => "⚠️  Expiring",
        ExpirationStatus::Valid => "✓  Valid",
    }
}

fn truncate(s: &str, max_chars: usize) -> Cow<'_, str> {
    if s.chars().count() <= max_chars {
        return Cow::Borrowed(s);
    }
    let head: String = s.chars().take(max_chars.saturating_sub(3)).collect();
    Cow::Owned(format!("{head}..."))
}
