//! Shared accumulator primitives used by all three monitors:
//!  - [ScalarCounter] turns raw monotonic-ish counter readings into clamped
//!    deltas, absorbing counter resets after a reboot.
//!  - [Rollover] detects calendar day/month boundaries between the mutable
//!    tail record and the current wall clock.
//!  - [Flushed] is the ingest outcome the persistence layer acts on: either
//!    an idempotent rewrite of the tail record or a day rollover that
//!    finalizes the old record and opens a zero-seeded one.

pub mod frequency;

use chrono::{DateTime, Local};

use crate::utils::time::{same_day, same_month};

/// Tracks the last raw counter value seen and produces deltas from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalarCounter {
    baseline: u64,
}

impl ScalarCounter {
    pub fn new(baseline: u64) -> Self {
        Self { baseline }
    }

    /// Returns the delta since the previous reading and moves the baseline
    /// forward. A raw value below the baseline means the OS counter restarted
    /// (reboot, interface re-creation); the delta is clamped to zero instead
    /// of propagating a negative adjustment.
    pub fn advance(&mut self, raw: u64) -> u64 {
        let delta = raw.saturating_sub(self.baseline);
        self.baseline = raw;
        delta
    }

    pub fn baseline(&self) -> u64 {
        self.baseline
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rollover {
    /// Still within the calendar day of the tail record.
    Same,
    /// The day changed but the month did not.
    Day,
    /// Both day and month changed.
    Month,
}

impl Rollover {
    pub fn between(last: DateTime<Local>, now: DateTime<Local>) -> Self {
        if same_day(last, now) {
            Rollover::Same
        } else if same_month(last, now) {
            Rollover::Day
        } else {
            Rollover::Month
        }
    }

    pub fn crossed_day(&self) -> bool {
        !matches!(self, Rollover::Same)
    }
}

/// Result of ingesting a sample into an accumulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flushed<R> {
    /// Same-day update: the mutable tail record is rewritten in place.
    Updated(R),
    /// Day rollover: `finalized` is the last value the old record will ever
    /// hold, `opened` is the freshly seeded record for the new day.
    RolledOver { finalized: R, opened: R },
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use crate::utils::time::parse_stamp;

    use super::*;

    #[test]
    fn test_scalar_counter_delta() {
        let mut counter = ScalarCounter::new(100);
        assert_eq!(counter.advance(1000), 900);
        assert_eq!(counter.baseline(), 1000);
        assert_eq!(counter.advance(1000), 0);
    }

    #[test]
    fn test_scalar_counter_clamps_reset() {
        let mut counter = ScalarCounter::new(5_000_000);
        // Reboot: the raw counter restarts near zero.
        assert_eq!(counter.advance(120), 0);
        // Accumulation resumes from the new baseline.
        assert_eq!(counter.advance(620), 500);
    }

    #[test]
    fn test_rollover_same_day() -> Result<()> {
        let last = parse_stamp("2024-03-01 10:00:00")?;
        let now = parse_stamp("2024-03-01 23:59:59")?;
        assert_eq!(Rollover::between(last, now), Rollover::Same);
        assert!(!Rollover::between(last, now).crossed_day());
        Ok(())
    }

    #[test]
    fn test_rollover_day() -> Result<()> {
        let last = parse_stamp("2024-03-01 23:59:09")?;
        let now = parse_stamp("2024-03-02 00:00:09")?;
        assert_eq!(Rollover::between(last, now), Rollover::Day);
        Ok(())
    }

    #[test]
    fn test_rollover_month() -> Result<()> {
        let last = parse_stamp("2024-01-31 23:59:50")?;
        let now = parse_stamp("2024-02-01 00:00:10")?;
        assert_eq!(Rollover::between(last, now), Rollover::Month);
        assert!(Rollover::between(last, now).crossed_day());
        Ok(())
    }
}
