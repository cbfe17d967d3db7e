//! Human duration grammar shared by `--expires` and `expiring_threshold`.
//!
//! Accepts an integer count with a calendar unit (`d`, `w`, `mo`, `y`) or a
//! sequence of clock parts (`1h30m`, `45s`, `250ms`). Case-insensitive.

use std::time::Duration;

use thiserror::Error;

const DAY: u64 = 24 * 60 * 60;

/// Calendar units; `mo` must be tried before the clock grammar sees `m`.
const CALENDAR_UNITS: [(&str, u64); 4] = [
    ("mo", 30 * DAY),
    ("y", 365 * DAY),
    ("w", 7 * DAY),
    ("d", DAY),
];

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid duration {input:?}: {reason}")]
pub struct DurationError {
    input: String,
    reason: &'static str,
}

pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let fail = |reason| DurationError {
        input: input.to_string(),
        reason,
    };

    let normalized = input.trim().to_ascii_lowercase();
    if normalized.is_empty() {
        return Err(fail("empty"));
    }

    for (suffix, seconds) in CALENDAR_UNITS {
        if let Some(count) = normalized.strip_suffix(suffix) {
            if !count.is_empty() && count.bytes().all(|b| b.is_ascii_digit()) {
                let count: u64 = count.parse().map_err(|_| fail("count too large"))?;
                return count
                    .checked_mul(seconds)
                    .map(Duration::from_secs)
                    .ok_or_else(|| fail("count too large"));
            }
        }
    }

    parse_clock(&normalized).map_err(fail)
}

fn parse_clock(mut rest: &str) -> Result<Duration, &'static str> {
    let mut total = Duration::ZERO;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        if digits == 0 {
            return Err("expected a number");
        }
        let count: u64 = rest[..digits].parse().map_err(|_| "count too large")?;
        rest = &rest[digits..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];

        let part = match unit {
            "h" => count.checked_mul(3600).map(Duration::from_secs),
            "m" => count.checked_mul(60).map(Duration::from_secs),
            "s" => Some(Duration::from_secs(count)),
            "ms" => Some(Duration::from_millis(count)),
            "" => return Err("missing unit"),
            _ => return Err("unknown unit"),
        }
        .ok_or("count too large")?;
        total = total.checked_add(part).ok_or("count too large")?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    const HOUR: u64 = 3600;

    #[test]
    fn parses_clock_and_calendar_units() {
        let cases = [
            ("1h", HOUR),
            ("30m", 30 * 60),
            ("5s", 5),
            ("1d", DAY),
            ("7d", 7 * DAY),
            ("2w", 14 * DAY),
            ("1mo", 30 * DAY),
            ("1y", 365 * DAY),
            ("24h", 24 * HOUR),
            ("1h30m", HOUR + 30 * 60),
        ];
        for (input, secs) in cases {
            assert_eq!(
                parse_duration(input).expect(input),
                Duration::from_secs(secs),
                "{input}"
            );
        }
    }

    #[test]
    fn is_case_insensitive() {
        assert_eq!(parse_duration("3D").unwrap(), Duration::from_secs(3 * DAY));
        assert_eq!(parse_duration("1MO").unwrap(), Duration::from_secs(30 * DAY));
        assert_eq!(parse_duration("2H").unwrap(), Duration::from_secs(2 * HOUR));
    }

    #[test]
    fn milliseconds_are_not_months() {
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
    }

    #[test]
    fn rejects_garbage() {
        for input in ["", "   ", "invalid", "d", "mo", "12", "1x", "-1d", "1.5h", "h1"] {
            assert!(parse_duration(input).is_err(), "{input:?}");
        }
    }

    #[test]
    fn rejects_overflow() {
        assert!(parse_duration("99999999999999999999d").is_err());
        assert!(parse_duration("18446744073709551615y").is_err());
    }

    proptest! {
        #[test]
        fn never_panics_on_arbitrary_input(input in any::<String>()) {
            let _ = parse_duration(&input);
        }

        #[test]
        fn day_counts_scale_exactly(n in 0u64..=1_000_000) {
            prop_assert_eq!(
                parse_duration(&format!("{n}d")).unwrap(),
                Duration::from_secs(n * DAY)
            );
        }

        #[test]
        fn clock_parts_add_up(h in 0u64..10_000, m in 0u64..10_000, s in 0u64..10_000) {
            prop_assert_eq!(
                parse_duration(&format!("{h}h{m}m{s}s")).unwrap(),
                Duration::from_secs(h * 3600 + m * 60 + s)
            );
        }
    }
}
