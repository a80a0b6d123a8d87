//! Property tests for reconnect backoff and event dedup.

#![allow(clippy::unwrap_used)]

use std::time::{Duration, Instant};

use proptest::prelude::*;
use vetlink_core::{
    Backoff, ConnectionState, DedupConfig, DedupFilter, Link, LinkFailure, ReconnectPolicy,
};

fn policy(base_ms: u64, max_ms: u64, max_attempts: Option<u32>) -> ReconnectPolicy {
    ReconnectPolicy {
        base_delay: Duration::from_millis(base_ms),
        multiplier: 2,
        max_delay: Duration::from_millis(max_ms),
        max_attempts,
    }
}

proptest! {
    /// Delays double from the base until they hit the cap, then stay there.
    #[test]
    fn delays_double_until_capped(base_ms in 1u64..5_000, cap_factor in 1u64..64, attempts in 1u32..40) {
        let max_ms = base_ms * cap_factor;
        let mut backoff = Backoff::new(policy(base_ms, max_ms, None));

        let mut previous = Duration::ZERO;
        for n in 0..attempts {
            let delay = backoff.next_delay().unwrap();
            let expected = 2u64
                .checked_pow(n)
                .and_then(|f| base_ms.checked_mul(f))
                .map_or(max_ms, |ms| ms.min(max_ms));
            prop_assert_eq!(delay, Duration::from_millis(expected));
            prop_assert!(delay >= previous);
            previous = delay;
        }
    }

    /// A bounded policy yields exactly `max_attempts` delays.
    #[test]
    fn bounded_policy_runs_out(max_attempts in 0u32..10) {
        let mut backoff = Backoff::new(policy(100, 10_000, Some(max_attempts)));
        let mut yielded = 0;
        while backoff.next_delay().is_some() {
            yielded += 1;
            prop_assert!(yielded <= max_attempts);
        }
        prop_assert_eq!(yielded, max_attempts);
        prop_assert!(backoff.is_exhausted());
    }

    /// A successful connection restarts the sequence at the base delay.
    #[test]
    fn success_resets_counter(failures in 1usize..8) {
        let mut now = Instant::now();
        let mut link = Link::new(policy(1_000, 30_000, None));
        let mut generation = link.start().unwrap();

        for _ in 0..failures {
            let LinkFailure::Retry { delay, .. } = link.failed(generation, now, None) else {
                return Err(TestCaseError::fail("unbounded policy gave up"));
            };
            now += delay;
            generation = link.poll_retry(now).unwrap();
        }

        prop_assert!(link.opened(generation));
        prop_assert_eq!(link.state(), ConnectionState::Connected);
        prop_assert_eq!(link.attempts(), 0);

        let failure = link.failed(generation, now, None);
        prop_assert_eq!(failure, LinkFailure::Retry { delay: Duration::from_secs(1), attempt: 1 });
    }

    /// Within the window an identity is accepted once; after the retention
    /// period it is new again.
    #[test]
    fn identity_applied_once_per_window(repeats in 1usize..20, gap_ms in 0u64..3_000) {
        let mut now = Instant::now();
        let mut filter = DedupFilter::new(DedupConfig::default());
        let step = Duration::from_millis(gap_ms / repeats as u64);

        prop_assert!(filter.check("notice:5".to_string(), now));
        for _ in 0..repeats {
            now += step;
            prop_assert!(!filter.check("notice:5".to_string(), now));
        }

        now += Duration::from_secs(10);
        prop_assert!(filter.check("notice:5".to_string(), now));
    }
}

#[test]
fn stale_generation_cannot_fail_live_link() {
    let now = Instant::now();
    let mut link = Link::new(ReconnectPolicy::chat());
    let old = link.start().unwrap();
    link.close();
    let live = link.start().unwrap();

    assert_eq!(link.failed(old, now, None), LinkFailure::Stale);
    assert!(link.is_current(live));
}
