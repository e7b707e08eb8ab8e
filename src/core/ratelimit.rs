// src/core/ratelimit.rs
//! Request quota shared by worker threads.
//!
//! A `max_calls` burst is available up front and refills evenly across `window`.
//! `acquire` blocks the calling worker until the quota admits it, so pool width and
//! quota stay independent knobs.

use std::num::NonZeroU32;
use std::thread;
use std::time::Duration;

use governor::clock::{Clock, DefaultClock};
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

pub struct RequestQuota<C: Clock = DefaultClock> {
    limiter: RateLimiter<NotKeyed, InMemoryState, C, NoOpMiddleware<C::Instant>>,
    clock: C,
}

impl RequestQuota<DefaultClock> {
    pub fn new(max_calls: usize, window: Duration) -> Self {
        Self::with_clock(max_calls, window, DefaultClock::default())
    }
}

impl<C: Clock> RequestQuota<C> {
    pub fn with_clock(max_calls: usize, window: Duration, clock: C) -> Self {
        let burst = NonZeroU32::new(u32::try_from(max_calls).unwrap_or(u32::MAX)).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::with_period(window / burst.get())
            .unwrap_or_else(|| Quota::per_second(burst))
            .allow_burst(burst);
        Self { limiter: RateLimiter::direct_with_clock(quota, &clock), clock }
    }

    /// Grant a call now or report how long until the next one is admitted.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        self.limiter.check().map_err(|not_until| not_until.wait_time_from(self.clock.now()))
    }

    pub fn acquire(&self) {
        while let Err(wait) = self.try_acquire() {
            thread::sleep(wait.max(Duration::from_millis(1)));
        }
    }
}

#[cfg(test)]
mod tests {
    use governor::clock::FakeRelativeClock;

    use super::*;

    #[test]
    fn burst_then_even_refill() {
        let clock = FakeRelativeClock::default();
        let quota = RequestQuota::with_clock(2, Duration::from_secs(10), clock.clone());
        assert!(quota.try_acquire().is_ok());
        assert!(quota.try_acquire().is_ok());
        assert_eq!(quota.try_acquire(), Err(Duration::from_secs(5)));

        clock.advance(Duration::from_secs(5));
        assert!(quota.try_acquire().is_ok());
        assert!(quota.try_acquire().is_err());
    }

    #[test]
    fn zero_quota_still_admits_one_call() {
        let quota = RequestQuota::with_clock(0, Duration::from_secs(60), FakeRelativeClock::default());
        assert!(quota.try_acquire().is_ok());
        assert!(quota.try_acquire().is_err());
    }
}
