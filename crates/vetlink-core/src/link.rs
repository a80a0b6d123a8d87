//! Connection lifecycle shared by every long-lived transport.
//!
//! A [`Link`] does not know what it carries. It tracks the observable
//! [`ConnectionState`], owns the [`Backoff`] and hands out a *generation*
//! for every transport it asks the driver to open. Results tagged with an
//! older generation belong to a torn-down transport and are reported as
//! stale, so a late callback from a dead socket can never flip the state of
//! its replacement.
//!
//! # State Machine
//!
//! ```text
//! ┌──────────────┐  start   ┌────────────┐  opened  ┌───────────┐
//! │ Disconnected │─────────>│ Connecting │─────────>│ Connected │
//! └──────────────┘          └────────────┘          └───────────┘
//!        ↑                      ↑     │ failed            │ failed
//!        │ give up   poll_retry │     ↓                   │
//!        │                  ┌──────────────┐              │
//!        └──────────────────│ Reconnecting │<─────────────┘
//!                           └──────────────┘
//! ```

use std::{
    fmt,
    ops::{Add, Sub},
    time::Duration,
};

use crate::reconnect::{Backoff, ReconnectPolicy};

/// Observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Nothing open, nothing scheduled
    Disconnected,
    /// Transport requested, not yet usable
    Connecting,
    /// Transport usable
    Connected,
    /// Waiting for a scheduled retry
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        };
        f.write_str(label)
    }
}

/// Outcome of reporting a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkFailure {
    /// Failure belonged to an older transport; nothing changed
    Stale,
    /// Retry scheduled after `delay`
    Retry {
        /// Wait before the next attempt
        delay: Duration,
        /// One-based number of the upcoming attempt
        attempt: u32,
    },
    /// Retry budget spent; the link stays disconnected
    GaveUp {
        /// Failures since the last successful connection
        attempts: u32,
    },
}

/// Lifecycle tracker for one logical connection.
#[derive(Debug, Clone)]
pub struct Link<I> {
    state: ConnectionState,
    backoff: Backoff,
    generation: u64,
    retry_at: Option<I>,
    exhausted: bool,
}

impl<I> Link<I>
where
    I: Copy + Ord + Sub<Output = Duration> + Add<Duration, Output = I>,
{
    /// Create a disconnected link.
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            backoff: Backoff::new(policy),
            generation: 0,
            retry_at: None,
            exhausted: false,
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Generation of the current (or most recent) transport.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether `generation` names the live transport.
    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
            && matches!(self.state, ConnectionState::Connecting | ConnectionState::Connected)
    }

    /// Failures since the last successful connection.
    pub fn attempts(&self) -> u32 {
        self.backoff.attempt()
    }

    /// When the pending retry fires, if one is scheduled.
    pub fn retry_at(&self) -> Option<I> {
        self.retry_at
    }

    /// Whether the link gave up after spending its retry budget.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Start connecting on behalf of the user.
    ///
    /// Resets the retry budget. Returns the generation the driver should
    /// open, or `None` if a transport is already open or being opened.
    pub fn start(&mut self) -> Option<u64> {
        if matches!(self.state, ConnectionState::Connecting | ConnectionState::Connected) {
            return None;
        }

        self.backoff.reset();
        self.exhausted = false;
        Some(self.begin_attempt())
    }

    /// Transport of `generation` became usable.
    ///
    /// Returns `false` (and changes nothing) for a stale generation.
    pub fn opened(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.state != ConnectionState::Connecting {
            return false;
        }

        self.state = ConnectionState::Connected;
        self.backoff.reset();
        true
    }

    /// Transport of `generation` failed or closed.
    ///
    /// Schedules a retry at `now + max(backoff delay, floor)`. `floor` lets a
    /// server-advertised retry hint lengthen the wait.
    pub fn failed(&mut self, generation: u64, now: I, floor: Option<Duration>) -> LinkFailure {
        if !self.is_current(generation) {
            return LinkFailure::Stale;
        }

        match self.backoff.next_delay() {
            Some(delay) => {
                let delay = floor.map_or(delay, |floor| delay.max(floor));
                self.state = ConnectionState::Reconnecting;
                self.retry_at = Some(now + delay);
                LinkFailure::Retry { delay, attempt: self.backoff.attempt() }
            },
            None => {
                self.state = ConnectionState::Disconnected;
                self.retry_at = None;
                self.exhausted = true;
                LinkFailure::GaveUp { attempts: self.backoff.attempt() }
            },
        }
    }

    /// Fire the scheduled retry if it is due.
    ///
    /// Returns the generation the driver should open.
    pub fn poll_retry(&mut self, now: I) -> Option<u64> {
        match self.retry_at {
            Some(at) if now >= at => {
                debug_assert_eq!(self.state, ConnectionState::Reconnecting);
                Some(self.begin_attempt())
            },
            _ => None,
        }
    }

    /// Tear the link down. In-flight results for the old generation become
    /// stale.
    pub fn close(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.retry_at = None;
        self.generation = self.generation.wrapping_add(1);
    }

    fn begin_attempt(&mut self) -> u64 {
        self.generation = self.generation.wrapping_add(1);
        self.state = ConnectionState::Connecting;
        self.retry_at = None;
        self.generation
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Instant;

    use super::*;

    fn link(max_attempts: Option<u32>) -> Link<Instant> {
        Link::new(ReconnectPolicy {
            base_delay: Duration::from_secs(1),
            multiplier: 2,
            max_delay: Duration::from_secs(30),
            max_attempts,
        })
    }

    #[test]
    fn start_is_single_flight() {
        let mut link = link(None);
        let generation = link.start().unwrap();
        assert_eq!(link.state(), ConnectionState::Connecting);
        assert_eq!(link.start(), None);

        assert!(link.opened(generation));
        assert_eq!(link.start(), None);
    }

    #[test]
    fn failure_schedules_retry_with_backoff() {
        let t0 = Instant::now();
        let mut link = link(None);
        let g1 = link.start().unwrap();

        assert_eq!(link.failed(g1, t0, None), LinkFailure::Retry {
            delay: Duration::from_secs(1),
            attempt: 1
        });
        assert_eq!(link.state(), ConnectionState::Reconnecting);
        assert_eq!(link.poll_retry(t0 + Duration::from_millis(999)), None);

        let g2 = link.poll_retry(t0 + Duration::from_secs(1)).unwrap();
        assert_ne!(g1, g2);
        assert_eq!(link.failed(g2, t0, None), LinkFailure::Retry {
            delay: Duration::from_secs(2),
            attempt: 2
        });
    }

    #[test]
    fn success_resets_backoff() {
        let t0 = Instant::now();
        let mut link = link(None);
        let g1 = link.start().unwrap();
        link.failed(g1, t0, None);
        let g2 = link.poll_retry(t0 + Duration::from_secs(1)).unwrap();
        assert!(link.opened(g2));
        assert_eq!(link.attempts(), 0);

        assert_eq!(link.failed(g2, t0, None), LinkFailure::Retry {
            delay: Duration::from_secs(1),
            attempt: 1
        });
    }

    #[test]
    fn stale_generation_ignored() {
        let t0 = Instant::now();
        let mut link = link(None);
        let g1 = link.start().unwrap();
        link.close();

        assert_eq!(link.failed(g1, t0, None), LinkFailure::Stale);
        assert!(!link.opened(g1));
        assert_eq!(link.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn gives_up_after_budget() {
        let t0 = Instant::now();
        let mut link = link(Some(2));
        let mut generation = link.start().unwrap();

        for _ in 0..2 {
            assert!(matches!(link.failed(generation, t0, None), LinkFailure::Retry { .. }));
            generation = link.poll_retry(t0 + Duration::from_secs(60)).unwrap();
        }

        assert_eq!(link.failed(generation, t0, None), LinkFailure::GaveUp { attempts: 2 });
        assert!(link.is_exhausted());
        assert_eq!(link.poll_retry(t0 + Duration::from_secs(600)), None);

        // An explicit start gets a fresh budget.
        assert!(link.start().is_some());
        assert!(!link.is_exhausted());
    }

    #[test]
    fn floor_lengthens_delay() {
        let t0 = Instant::now();
        let mut link = link(None);
        let generation = link.start().unwrap();

        let outcome = link.failed(generation, t0, Some(Duration::from_secs(5)));
        assert_eq!(outcome, LinkFailure::Retry { delay: Duration::from_secs(5), attempt: 1 });
        assert_eq!(link.retry_at(), Some(t0 + Duration::from_secs(5)));
    }
}
