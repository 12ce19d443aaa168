//! Trigger evaluation: when is a task next due?
//!
//! Recomputation is always strictly forward from the supplied instant,
//! never by replaying missed ticks — a process outage produces at most
//! one catch-up firing per task.

use chrono::{DateTime, Utc};
use cron::Schedule;
use roost_core::schedule::TriggerSpec;
use std::str::FromStr;

/// Compute the next due instant strictly after `now`.
///
/// `None` means the trigger will never fire again (a one-shot whose
/// instant has passed); the caller disables the task.
pub fn next_due_after(spec: &TriggerSpec, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match spec {
        TriggerSpec::Interval { secs } => {
            let secs = (*secs).max(1) as i64;
            Some(now + chrono::Duration::seconds(secs))
        }
        TriggerSpec::Cron { expr } => {
            let schedule = parse_cron(expr).ok()?;
            schedule.after(&now).next()
        }
        TriggerSpec::Once { at } => {
            if *at > now {
                Some(*at)
            } else {
                None
            }
        }
    }
}

/// Validate a trigger at definition time so bad expressions fail on
/// `task add`, not silently at fire time.
pub fn validate(spec: &TriggerSpec) -> Result<(), String> {
    match spec {
        TriggerSpec::Interval { secs } => {
            if *secs == 0 {
                return Err("interval must be at least 1 second".into());
            }
            Ok(())
        }
        TriggerSpec::Cron { expr } => {
            parse_cron(expr).map(|_| ()).map_err(|e| e.to_string())
        }
        TriggerSpec::Once { .. } => Ok(()),
    }
}

/// The initial due instant for a freshly created task.
pub fn initial_due(spec: &TriggerSpec, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match spec {
        // A fresh one-shot may be scheduled for an instant that is already
        // past; fire it on the next heartbeat rather than never.
        TriggerSpec::Once { at } => Some(*at),
        _ => next_due_after(spec, now),
    }
}

/// Parse a 5-field cron expression (minute hour dom month dow). The cron
/// crate wants a seconds field; pin it to zero.
fn parse_cron(expr: &str) -> Result<Schedule, cron::error::Error> {
    let five_field = expr.split_whitespace().count() == 5;
    let with_seconds = if five_field {
        format!("0 {expr}")
    } else {
        expr.to_string()
    };
    Schedule::from_str(&with_seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn interval_advances_from_now_not_from_the_missed_tick() {
        let spec = TriggerSpec::Interval { secs: 60 };
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let next = next_due_after(&spec, now).unwrap();
        assert_eq!(next, now + chrono::Duration::seconds(60));
    }

    #[test]
    fn cron_daily_at_nine() {
        let spec = TriggerSpec::Cron {
            expr: "0 9 * * *".into(),
        };
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let next = next_due_after(&spec, now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap());
    }

    #[test]
    fn cron_same_day_when_still_ahead() {
        let spec = TriggerSpec::Cron {
            expr: "30 18 * * *".into(),
        };
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let next = next_due_after(&spec, now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 1, 18, 30, 0).unwrap());
    }

    #[test]
    fn once_in_the_future_fires_once() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let spec = TriggerSpec::Once { at };
        let before = at - chrono::Duration::hours(1);
        assert_eq!(next_due_after(&spec, before), Some(at));
        // After it passed, never again.
        assert_eq!(next_due_after(&spec, at), None);
    }

    #[test]
    fn zero_interval_is_invalid() {
        assert!(validate(&TriggerSpec::Interval { secs: 0 }).is_err());
        assert!(validate(&TriggerSpec::Interval { secs: 1 }).is_ok());
    }

    #[test]
    fn bad_cron_is_invalid() {
        assert!(
            validate(&TriggerSpec::Cron {
                expr: "not a cron".into()
            })
            .is_err()
        );
        assert!(
            validate(&TriggerSpec::Cron {
                expr: "*/5 * * * *".into()
            })
            .is_ok()
        );
    }

    #[test]
    fn initial_due_keeps_past_one_shots_firable() {
        let at = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(initial_due(&TriggerSpec::Once { at }, now), Some(at));
    }
}
