//! Acknowledgement engine (component D): the armed/sent state machine a
//! [`crate::reassembler::ReassemblySession`] carries, and the SAR ACK PDU
//! payload it produces.
//!
//! ```text
//! Idle ──[first seg arrives]──► Awaiting (timer armed)
//! Awaiting ──[more segs, incomplete]──► Awaiting
//! Awaiting ──[all segs received, before deadline]──► Sent (immediate ack) ──► Idle
//! Awaiting ──[timer fires]──► Sent (scheduled ack) ──► Idle
//! ```
//! Per §9's redesign note this state lives on each session, not on a single
//! per-direction field: two senders whose segments interleave each get an
//! independent timer and `blockAckSent` flag.
use crate::timestamp::Instant;
use core::time::Duration;

#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub enum AckState {
    #[default]
    Idle,
    Awaiting,
    Sent,
}

/// A session's ack-timer bookkeeping: current state plus the deadline it
/// armed, if any.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub struct AckTimer {
    pub state: AckState,
    pub deadline: Option<Instant>,
}

impl AckTimer {
    /// Arms the timer on arrival of a session's first segment, for `delay`
    /// computed from the observed TTL (`150 + 50*TTL` ms by default, see
    /// [`SarConfig::ack_delay_ms`]).
    pub fn arm(&mut self, now: Instant, delay: Duration) -> Instant {
        let deadline = now + delay;
        self.state = AckState::Awaiting;
        self.deadline = Some(deadline);
        deadline
    }

    /// Early-completion path: all segments arrived before the scheduled
    /// deadline. Returns whether an immediate ack should be emitted (false
    /// if one was already sent for this session).
    pub fn complete_early(&mut self) -> bool {
        if self.state == AckState::Awaiting {
            self.state = AckState::Sent;
            self.deadline = None;
            true
        } else {
            false
        }
    }

    /// The armed deadline elapsed. Returns whether a scheduled ack should
    /// be emitted now.
    pub fn fire(&mut self) -> bool {
        if self.state == AckState::Awaiting {
            self.state = AckState::Sent;
            self.deadline = None;
            true
        } else {
            false
        }
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.state == AckState::Awaiting
    }

    #[must_use]
    pub fn has_sent(&self) -> bool {
        self.state == AckState::Sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SarConfig;

    #[test]
    fn arms_with_ttl_scaled_delay() {
        let mut timer = AckTimer::default();
        let config = SarConfig::default();
        let deadline = timer.arm(
            Instant::from_millis(0),
            Duration::from_millis(u64::from(config.ack_delay_ms(5))),
        );
        assert_eq!(deadline, Instant::from_millis(400));
        assert!(timer.is_armed());
    }

    #[test]
    fn early_completion_fires_once() {
        let mut timer = AckTimer::default();
        timer.arm(Instant::from_millis(0), Duration::from_millis(150));
        assert!(timer.complete_early());
        assert!(timer.has_sent());
        // A second completion attempt (e.g. late duplicate re-triggering
        // the same session) must not emit a second ack.
        assert!(!timer.complete_early());
    }

    #[test]
    fn timer_fire_is_a_noop_once_sent() {
        let mut timer = AckTimer::default();
        timer.arm(Instant::from_millis(0), Duration::from_millis(150));
        assert!(timer.complete_early());
        assert!(!timer.fire());
    }

    #[test]
    fn idle_timer_never_fires() {
        let mut timer = AckTimer::default();
        assert!(!timer.fire());
        assert!(!timer.complete_early());
    }
}
