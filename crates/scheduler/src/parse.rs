//! Natural-language schedule parsing.
//!
//! Accepted forms:
//! - `"every 30 seconds|minutes|hours|days"` and `"every minute|hour|day"`
//! - `"daily at 9:00"`, `"daily at 2pm"`, `"every day at 14:30"`
//! - `"in 5 minutes"`, `"in 2 hours"`
//! - a raw 5-field cron expression (`"*/15 * * * *"`)
//! - an RFC 3339 instant (`"2026-03-01T10:00:00Z"`)

use chrono::{DateTime, Utc};
use roost_core::schedule::TriggerSpec;

/// Parse a schedule string relative to `now` (one-shot forms need it).
pub fn parse_schedule(input: &str, now: DateTime<Utc>) -> Result<TriggerSpec, String> {
    let text = input.trim().to_lowercase();

    if let Some(spec) = parse_every(&text) {
        return Ok(spec);
    }
    if let Some(spec) = parse_daily(&text)? {
        return Ok(spec);
    }
    if let Some(spec) = parse_in(&text, now)? {
        return Ok(spec);
    }
    if text.split_whitespace().count() == 5 {
        let spec = TriggerSpec::Cron { expr: text.clone() };
        crate::trigger::validate(&spec)?;
        return Ok(spec);
    }
    if let Ok(at) = DateTime::parse_from_rfc3339(input.trim()) {
        return Ok(TriggerSpec::Once {
            at: at.with_timezone(&Utc),
        });
    }

    Err(format!(
        "couldn't parse schedule '{input}'; try 'every 30 minutes', 'daily at 9:00', \
         'in 10 minutes', or a 5-field cron expression"
    ))
}

fn unit_seconds(unit: &str) -> Option<u64> {
    match unit.trim_end_matches('s') {
        "second" | "sec" => Some(1),
        "minute" | "min" => Some(60),
        "hour" | "hr" => Some(3600),
        "day" => Some(86400),
        _ => None,
    }
}

/// `every N <unit>` and `every <unit>`.
fn parse_every(text: &str) -> Option<TriggerSpec> {
    let rest = text.strip_prefix("every ")?;
    let mut parts = rest.split_whitespace();
    let first = parts.next()?;

    let (amount, unit) = match first.parse::<u64>() {
        Ok(n) => (n, parts.next()?),
        Err(_) => (1, first),
    };
    // "every day at 9" is a daily schedule, not an interval.
    if parts.next().is_some() {
        return None;
    }

    let secs = amount.checked_mul(unit_seconds(unit)?)?;
    if secs == 0 {
        return None;
    }
    Some(TriggerSpec::Interval { secs })
}

/// `daily at H[:MM][am|pm]` and `every day at ...` — lowered to cron.
fn parse_daily(text: &str) -> Result<Option<TriggerSpec>, String> {
    let rest = if let Some(rest) = text.strip_prefix("daily") {
        rest
    } else if let Some(rest) = text.strip_prefix("every day") {
        rest
    } else if let Some(rest) = text.strip_prefix("everyday") {
        rest
    } else {
        return Ok(None);
    };

    let time = rest.trim().trim_start_matches("at").trim();
    if time.is_empty() {
        // Default morning slot.
        return Ok(Some(TriggerSpec::Cron {
            expr: "0 9 * * *".into(),
        }));
    }

    let (clock, meridiem) = if let Some(t) = time.strip_suffix("pm") {
        (t.trim(), Some("pm"))
    } else if let Some(t) = time.strip_suffix("am") {
        (t.trim(), Some("am"))
    } else {
        (time, None)
    };

    let (hour_str, minute_str) = match clock.split_once(':') {
        Some((h, m)) => (h, m),
        None => (clock, "0"),
    };
    let mut hour: u32 = hour_str
        .trim()
        .parse()
        .map_err(|_| format!("invalid hour in '{text}'"))?;
    let minute: u32 = minute_str
        .trim()
        .parse()
        .map_err(|_| format!("invalid minute in '{text}'"))?;

    match meridiem {
        Some("pm") if hour < 12 => hour += 12,
        Some("am") if hour == 12 => hour = 0,
        _ => {}
    }
    if hour > 23 || minute > 59 {
        return Err(format!("invalid time of day in '{text}'"));
    }

    Ok(Some(TriggerSpec::Cron {
        expr: format!("{minute} {hour} * * *"),
    }))
}

/// `in N <unit>` — a one-shot relative to now.
fn parse_in(text: &str, now: DateTime<Utc>) -> Result<Option<TriggerSpec>, String> {
    let Some(rest) = text.strip_prefix("in ") else {
        return Ok(None);
    };
    let mut parts = rest.split_whitespace();
    let amount: u64 = match parts.next().and_then(|n| n.parse().ok()) {
        Some(n) => n,
        None => return Ok(None),
    };
    let Some(secs) = parts.next().and_then(unit_seconds) else {
        return Ok(None);
    };
    let offset = amount
        .checked_mul(secs)
        .ok_or_else(|| format!("offset too large in '{text}'"))?;
    Ok(Some(TriggerSpec::Once {
        at: now + chrono::Duration::seconds(offset as i64),
    }))
}
