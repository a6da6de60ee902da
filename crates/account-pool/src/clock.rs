//! Cooldown clock
//!
//! Pure functions mapping an allocation time to its expiry. Times are wall-clock
//! `SystemTime` values persisted as decimal epoch seconds, so a cooldown started
//! before a restart is still honoured after it.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::record::CooldownEntry;

/// Default mandatory wait between allocation and release (24 hours).
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(86_400);

const NANOS_DIGITS: usize = 9;

/// Instant at which an allocation made at `allocated_at` leaves cooldown.
pub fn expiry(allocated_at: SystemTime, cooldown: Duration) -> SystemTime {
    allocated_at + cooldown
}

/// Whether `entry` has served its full cooldown at `now`.
///
/// A `now` earlier than the allocation time (clock stepped backwards) is never
/// treated as expired.
pub fn is_expired(entry: &CooldownEntry, now: SystemTime, cooldown: Duration) -> bool {
    match now.duration_since(entry.allocated_at()) {
        Ok(elapsed) => elapsed >= cooldown,
        Err(_) => false,
    }
}

/// Time left before `entry` becomes eligible for release; zero once expired.
pub fn remaining(entry: &CooldownEntry, now: SystemTime, cooldown: Duration) -> Duration {
    expiry(entry.allocated_at(), cooldown)
        .duration_since(now)
        .unwrap_or(Duration::ZERO)
}

/// Render a timestamp as decimal epoch seconds, e.g. `1700000000.25`.
///
/// Exact to the nanosecond with trailing zeros dropped, so
/// `parse_epoch(format_epoch(t)) == t` and a rewrite never shifts a stored time.
pub fn format_epoch(time: SystemTime) -> String {
    let since = time.duration_since(UNIX_EPOCH).unwrap_or_default();
    let nanos = since.subsec_nanos();
    if nanos == 0 {
        return since.as_secs().to_string();
    }
    let fraction = format!("{nanos:09}");
    format!("{}.{}", since.as_secs(), fraction.trim_end_matches('0'))
}

/// Parse decimal epoch seconds (`1700000000` or `1700000000.123456`).
///
/// Parsed without going through `f64`. Digits beyond nanosecond precision are
/// truncated. Signs, exponents and anything else non-decimal yield `None`.
pub fn parse_epoch(text: &str) -> Option<SystemTime> {
    let text = text.trim();
    let (whole, fraction) = match text.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (text, ""),
    };
    if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let secs: u64 = whole.parse().ok()?;
    let mut digits: String = fraction.chars().take(NANOS_DIGITS).collect();
    while digits.len() < NANOS_DIGITS {
        digits.push('0');
    }
    let nanos: u32 = digits.parse().ok()?;

    UNIX_EPOCH.checked_add(Duration::new(secs, nanos))
}
