use core::fmt;

use serde::Serialize;

/// A point in time, in milliseconds since an arbitrary epoch.
///
/// Simulations usually start at zero while live forwarders count from 1970.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Timestamp {
    pub ms: u64,
}

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp { ms: 0 };

    pub fn from_millis(ms: u64) -> Self {
        Self { ms }
    }

    pub fn adding(&self, ms: u64) -> Self {
        Self {
            ms: self.ms.saturating_add(ms),
        }
    }

    pub fn removing(&self, ms: u64) -> Self {
        Self {
            ms: self.ms.saturating_sub(ms),
        }
    }

    pub fn difference(&self, other: &Self) -> Option<u64> {
        self.ms.checked_sub(other.ms)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.ms)
    }
}

pub trait Clock {
    fn now(&mut self) -> Timestamp;
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Timestamp,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self { now: start }
    }

    pub fn advance(&mut self, ms: u64) {
        self.now = self.now.adding(ms);
    }

    pub fn set(&mut self, now: Timestamp) {
        // Time never goes backwards
        self.now = self.now.max(now);
    }
}

impl Clock for ManualClock {
    fn now(&mut self) -> Timestamp {
        self.now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_arithmetic() {
        let t = Timestamp::from_millis(100);
        assert_eq!(t.adding(50).ms, 150);
        assert_eq!(t.removing(150).ms, 0);
        assert_eq!(t.adding(u64::MAX).ms, u64::MAX);
        assert_eq!(t.adding(50).difference(&t), Some(50));
        assert_eq!(t.difference(&t.adding(1)), None);
    }

    #[test]
    fn test_manual_clock_is_monotonic() {
        let mut clock = ManualClock::new(Timestamp::from_millis(10));
        clock.advance(5);
        assert_eq!(clock.now().ms, 15);
        clock.set(Timestamp::from_millis(12));
        assert_eq!(clock.now().ms, 15);
        clock.set(Timestamp::from_millis(40));
        assert_eq!(clock.now().ms, 40);
    }
}
