//! Scheduling abstraction the ack engine (§4.4) and the incomplete-session
//! sweep (§4.5) use to arm and fire deadlines, without this crate committing
//! to one async runtime.
use crate::scheduler::TimeQueue;
use crate::timestamp::Instant;
use alloc::collections::BTreeSet;
use alloc::vec::Vec;
use core::time::Duration;

/// A deadline scheduler parameterized over an opaque `Token` identifying
/// what fired. `post_delayed`/`cancel` mirror the original source's
/// `postDelayed`/`cancelAll` capability, narrowed to per-timer cancellation.
pub trait TimerScheduler<Token> {
    type Handle: Copy + Eq;

    fn post_delayed(&mut self, now: Instant, delay: Duration, token: Token) -> Self::Handle;
    fn cancel(&mut self, handle: Self::Handle);
    /// Every non-cancelled deadline due at or before `now`, soonest first.
    fn poll(&mut self, now: Instant) -> Vec<Token>;
}

/// Deterministic, non-sleeping scheduler: a deadline only ever fires when
/// the caller advances `now` past it by calling [`Self::poll`]. No real
/// sleeping happens, which is what makes this usable in tests and as the
/// facade's default.
#[derive(Debug)]
pub struct VirtualScheduler<Token: Eq> {
    queue: TimeQueue<(u64, Token)>,
    cancelled: BTreeSet<u64>,
    next_handle: u64,
}

impl<Token: Eq> Default for VirtualScheduler<Token> {
    fn default() -> Self {
        VirtualScheduler {
            queue: TimeQueue::new(),
            cancelled: BTreeSet::new(),
            next_handle: 0,
        }
    }
}

impl<Token: Eq> VirtualScheduler<Token> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl<Token: Eq> TimerScheduler<Token> for VirtualScheduler<Token> {
    type Handle = u64;

    fn post_delayed(&mut self, now: Instant, delay: Duration, token: Token) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.queue.push(now + delay, (handle, token));
        handle
    }

    fn cancel(&mut self, handle: u64) {
        self.cancelled.insert(handle);
    }

    fn poll(&mut self, now: Instant) -> Vec<Token> {
        self.queue
            .drain_ready(now)
            .into_iter()
            .filter(|(handle, _)| !self.cancelled.remove(handle))
            .map(|(_, token)| token)
            .collect()
    }
}

/// Schedules real `tokio::time::sleep` tasks; fired tokens are delivered
/// through an unbounded channel that [`TimerScheduler::poll`] drains
/// without blocking. `cancel` aborts the underlying `JoinHandle`, matching
/// the original source's `cancelAll` capability at per-timer granularity.
#[cfg(feature = "tokio-scheduler")]
pub mod tokio_scheduler {
    use super::TimerScheduler;
    use crate::timestamp::Instant;
    use alloc::collections::BTreeMap;
    use alloc::vec::Vec;
    use core::time::Duration;

    extern crate std;

    pub struct TokioScheduler<Token: Send + 'static> {
        tx: tokio::sync::mpsc::UnboundedSender<Token>,
        rx: tokio::sync::mpsc::UnboundedReceiver<Token>,
        handles: BTreeMap<u64, tokio::task::JoinHandle<()>>,
        next_handle: u64,
    }

    impl<Token: Send + 'static> TokioScheduler<Token> {
        #[must_use]
        pub fn new() -> Self {
            let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
            TokioScheduler {
                tx,
                rx,
                handles: BTreeMap::new(),
                next_handle: 0,
            }
        }
    }

    impl<Token: Send + 'static> Default for TokioScheduler<Token> {
        fn default() -> Self {
            Self::new()
        }
    }

    impl<Token: Send + 'static> TimerScheduler<Token> for TokioScheduler<Token> {
        type Handle = u64;

        fn post_delayed(&mut self, _now: Instant, delay: Duration, token: Token) -> u64 {
            let handle = self.next_handle;
            self.next_handle += 1;
            let tx = self.tx.clone();
            let join = tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = tx.send(token);
            });
            self.handles.insert(handle, join);
            handle
        }

        fn cancel(&mut self, handle: u64) {
            if let Some(join) = self.handles.remove(&handle) {
                join.abort();
            }
        }

        fn poll(&mut self, _now: Instant) -> Vec<Token> {
            let mut fired = Vec::new();
            while let Ok(token) = self.rx.try_recv() {
                fired.push(token);
            }
            fired
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Copy, Clone, Eq, PartialEq, Debug)]
    enum Token {
        Ack,
        Incomplete,
    }

    #[test]
    fn fires_only_due_deadlines() {
        let mut scheduler = VirtualScheduler::new();
        let t0 = Instant::from_millis(0);
        scheduler.post_delayed(t0, Duration::from_millis(400), Token::Ack);
        scheduler.post_delayed(t0, Duration::from_millis(10_000), Token::Incomplete);

        assert!(scheduler.poll(Instant::from_millis(399)).is_empty());
        assert_eq!(
            scheduler.poll(Instant::from_millis(400)),
            alloc::vec![Token::Ack]
        );
        assert_eq!(
            scheduler.poll(Instant::from_millis(10_000)),
            alloc::vec![Token::Incomplete]
        );
    }

    #[test]
    fn cancelled_deadline_never_fires() {
        let mut scheduler = VirtualScheduler::new();
        let t0 = Instant::from_millis(0);
        let handle = scheduler.post_delayed(t0, Duration::from_millis(400), Token::Ack);
        scheduler.cancel(handle);
        assert!(scheduler.poll(Instant::from_millis(400)).is_empty());
    }
}
