//! 5-field cron parsing + forward-scan next-fire computation, built from
//! scratch: no crate in the retrieved pack provides this, and the teacher's
//! own `schedule.rs::compute_next_run` explicitly punts on `Schedule::Cron`
//! ("parsing support planned for a future phase"). A field-set parser plus
//! a minute-by-minute forward scan is the minimal correct approach.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};

use crate::error::{Result, SchedulerError};

/// How far forward `next_fire_after` will scan before giving up — guards
/// against a degenerate expression (e.g. `31 2 30 2 *`, Feb 30th) spinning
/// forever.
const MAX_SCAN_MINUTES: i64 = 4 * 366 * 24 * 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    minute: FieldSet,
    hour: FieldSet,
    day_of_month: FieldSet,
    month: FieldSet,
    day_of_week: FieldSet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FieldSet {
    values: Vec<u32>,
}

impl FieldSet {
    fn contains(&self, v: u32) -> bool {
        self.values.contains(&v)
    }

    fn parse(field: &str, min: u32, max: u32) -> Result<Self> {
        if field == "*" {
            return Ok(Self { values: (min..=max).collect() });
        }

        let mut values = Vec::new();
        for part in field.split(',') {
            let (range_part, step) = match part.split_once('/') {
                Some((r, s)) => (
                    r,
                    s.parse::<u32>()
                        .map_err(|_| SchedulerError::InvalidSchedule(format!("bad step in cron field: {part}")))?,
                ),
                None => (part, 1),
            };

            let (lo, hi) = if range_part == "*" {
                (min, max)
            } else if let Some((a, b)) = range_part.split_once('-') {
                let a: u32 = a
                    .parse()
                    .map_err(|_| SchedulerError::InvalidSchedule(format!("bad range in cron field: {part}")))?;
                let b: u32 = b
                    .parse()
                    .map_err(|_| SchedulerError::InvalidSchedule(format!("bad range in cron field: {part}")))?;
                (a, b)
            } else {
                let v: u32 = range_part
                    .parse()
                    .map_err(|_| SchedulerError::InvalidSchedule(format!("bad value in cron field: {part}")))?;
                (v, v)
            };

            if lo < min || hi > max || lo > hi {
                return Err(SchedulerError::InvalidSchedule(format!(
                    "cron field '{part}' out of range [{min}, {max}]"
                )));
            }

            let mut v = lo;
            while v <= hi {
                values.push(v);
                v += step;
            }
        }
        values.sort_unstable();
        values.dedup();
        Ok(Self { values })
    }
}

impl CronSchedule {
    /// Parse a standard 5-field cron expression: `minute hour day-of-month
    /// month day-of-week`.
    pub fn parse(expression: &str) -> Result<Self> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(SchedulerError::InvalidSchedule(format!(
                "cron expression must have 5 fields, got {}: '{expression}'",
                fields.len()
            )));
        }
        Ok(Self {
            minute: FieldSet::parse(fields[0], 0, 59)?,
            hour: FieldSet::parse(fields[1], 0, 23)?,
            day_of_month: FieldSet::parse(fields[2], 1, 31)?,
            month: FieldSet::parse(fields[3], 1, 12)?,
            day_of_week: FieldSet::parse(fields[4], 0, 6)?,
        })
    }

    fn matches(&self, dt: DateTime<Utc>) -> bool {
        self.minute.contains(dt.minute())
            && self.hour.contains(dt.hour())
            && self.day_of_month.contains(dt.day())
            && self.month.contains(dt.month())
            && self.day_of_week.contains(dt.weekday().num_days_from_sunday())
    }

    /// First minute-aligned instant strictly after `from` that matches this
    /// schedule.
    pub fn next_fire_after(&self, from: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let mut candidate = (from + Duration::minutes(1))
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .ok_or_else(|| SchedulerError::InvalidSchedule("could not align candidate to minute boundary".into()))?;

        for _ in 0..MAX_SCAN_MINUTES {
            if self.matches(candidate) {
                return Ok(candidate);
            }
            candidate += Duration::minutes(1);
        }
        Err(SchedulerError::InvalidSchedule(format!(
            "cron expression never matches within the scan horizon ({MAX_SCAN_MINUTES} minutes)"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn nightly_three_am_fires_at_three_am() {
        let cron = CronSchedule::parse("0 3 * * *").unwrap();
        let from = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let next = cron.next_fire_after(from).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 2, 3, 0, 0).unwrap());
    }

    #[test]
    fn fires_later_same_day_when_still_ahead() {
        let cron = CronSchedule::parse("0 3 * * *").unwrap();
        let from = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let next = cron.next_fire_after(from).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 1, 3, 0, 0).unwrap());
    }

    #[test]
    fn every_fifteen_minutes_step_syntax() {
        let cron = CronSchedule::parse("*/15 * * * *").unwrap();
        let from = Utc.with_ymd_and_hms(2026, 1, 1, 0, 1, 0).unwrap();
        let next = cron.next_fire_after(from).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 1, 0, 15, 0).unwrap());
    }

    #[test]
    fn weekday_range_and_list() {
        // Monday-Friday at 9:00.
        let cron = CronSchedule::parse("0 9 * * 1-5").unwrap();
        // 2026-01-03 is a Saturday.
        let from = Utc.with_ymd_and_hms(2026, 1, 3, 0, 0, 0).unwrap();
        let next = cron.next_fire_after(from).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap());
    }

    #[test]
    fn malformed_expression_is_rejected() {
        assert!(CronSchedule::parse("not a cron").is_err());
        assert!(CronSchedule::parse("60 * * * *").is_err());
    }
}
