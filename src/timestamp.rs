//! Monotonic instants used to arm and evaluate the ack and incomplete-session
//! timers.
use core::ops::Add;
use core::time::Duration;

/// Milliseconds since a clock-chosen epoch. Only meaningful relative to
/// other `Instant`s produced by the same [`Clock`].
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Default)]
pub struct Instant(u64);

impl Instant {
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Instant(millis)
    }

    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    #[must_use]
    pub fn checked_duration_since(self, earlier: Instant) -> Option<Duration> {
        self.0.checked_sub(earlier.0).map(Duration::from_millis)
    }
}

impl Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, rhs: Duration) -> Instant {
        #[allow(clippy::cast_possible_truncation)]
        Instant(self.0 + rhs.as_millis() as u64)
    }
}

/// A monotonic millisecond clock. Implementations must never return a
/// smaller `Instant` than one already returned.
pub trait Clock {
    fn now(&self) -> Instant;
}

#[cfg(feature = "std")]
extern crate std;

/// `Clock` backed by `std::time::Instant`, for hosts that have an OS clock.
#[cfg(feature = "std")]
pub struct StdClock {
    start: std::time::Instant,
}

#[cfg(feature = "std")]
impl StdClock {
    #[must_use]
    pub fn new() -> Self {
        StdClock {
            start: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl Clock for StdClock {
    fn now(&self) -> Instant {
        #[allow(clippy::cast_possible_truncation)]
        Instant::from_millis(self.start.elapsed().as_millis() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instant_add_duration() {
        let t = Instant::from_millis(100) + Duration::from_millis(50);
        assert_eq!(t.as_millis(), 150);
    }

    #[test]
    fn checked_duration_since_rejects_going_backwards() {
        let earlier = Instant::from_millis(100);
        let later = Instant::from_millis(150);
        assert_eq!(
            later.checked_duration_since(earlier),
            Some(Duration::from_millis(50))
        );
        assert_eq!(earlier.checked_duration_since(later), None);
    }

    #[cfg(feature = "std")]
    #[test]
    fn std_clock_is_monotonic_nondecreasing() {
        let clock = StdClock::new();
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }
}
