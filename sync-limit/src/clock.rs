use std::fmt::Debug;
use std::time::Duration;

use chrono::Timelike;
use chrono::Utc;

/// Wall-clock source for minute-window bookkeeping.
///
/// Window resets are aligned to wall-clock minute boundaries and sync
/// payloads carry the sender's second-of-minute, so both need the real time
/// of day rather than a monotonic instant.
pub trait WindowClock: Debug + Send + Sync {
    /// Seconds elapsed in the current wall-clock minute, `0..=59`.
    fn second_of_minute(&self) -> u32;

    /// Time remaining until the next wall-clock minute boundary.
    fn until_next_minute(&self) -> Duration;
}

/// The system clock, in UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl WindowClock for SystemClock {
    fn second_of_minute(&self) -> u32 {
        // Leap seconds report 60; fold them into the last second.
        Utc::now().second().min(59)
    }

    fn until_next_minute(&self) -> Duration {
        let now = Utc::now();
        let into_minute = Duration::from_secs(u64::from(now.second().min(59)))
            + Duration::from_nanos(u64::from(now.nanosecond() % 1_000_000_000));
        Duration::from_secs(60).saturating_sub(into_minute)
    }
}

/// A clock frozen at a given second of the minute.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    second: u32,
}

impl FixedClock {
    pub fn new(second: u32) -> Self {
        Self {
            second: second.min(59),
        }
    }
}

impl WindowClock for FixedClock {
    fn second_of_minute(&self) -> u32 {
        self.second
    }

    fn until_next_minute(&self) -> Duration {
        Duration::from_secs(u64::from(60 - self.second))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use more_asserts::assert_gt;
    use more_asserts::assert_le;

    #[test]
    fn system_clock_stays_in_range() {
        let clock = SystemClock;

        assert_le!(clock.second_of_minute(), 59);

        let wait = clock.until_next_minute();
        assert_gt!(wait, Duration::ZERO);
        assert_le!(wait, Duration::from_secs(60));
    }

    #[test]
    fn fixed_clock_counts_down_to_the_boundary() {
        assert_eq!(FixedClock::new(0).until_next_minute(), Duration::from_secs(60));
        assert_eq!(FixedClock::new(45).until_next_minute(), Duration::from_secs(15));
        assert_eq!(FixedClock::new(75).second_of_minute(), 59);
    }
}
