//! Off-peak window gating (spec §4.5/§5): a task may declare a
//! `[start, end)` time-of-day window it's only allowed to run in. Handles
//! windows that cross midnight (`start > end`) correctly.

use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffPeakWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl OffPeakWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Whether `now`'s time-of-day falls inside this window.
    pub fn contains(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        let t = now.time();
        if self.start <= self.end {
            t >= self.start && t < self.end
        } else {
            // Crosses midnight, e.g. 22:00-04:00: inside if at/after start
            // OR before end.
            t >= self.start || t < self.end
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn at(hour: u32, minute: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, hour, minute, 0).unwrap()
    }

    #[test]
    fn same_day_window() {
        let w = OffPeakWindow::new(NaiveTime::from_hms_opt(1, 0, 0).unwrap(), NaiveTime::from_hms_opt(5, 0, 0).unwrap());
        assert!(!w.contains(at(0, 30)));
        assert!(w.contains(at(1, 0)));
        assert!(w.contains(at(3, 0)));
        assert!(!w.contains(at(5, 0)));
    }

    #[test]
    fn midnight_crossing_window() {
        let w = OffPeakWindow::new(
            NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(4, 0, 0).unwrap(),
        );
        assert!(w.contains(at(23, 0)));
        assert!(w.contains(at(2, 0)));
        assert!(!w.contains(at(12, 0)));
        assert!(!w.contains(at(4, 0)));
    }
}
