//! Process-wide rate limiting for the upstream API
//!
//! Two nested quotas apply to every call: a short burst window (e.g. 20 per
//! second) and a sustained window (e.g. 100 per two minutes). A permit needs a
//! token from both buckets at the same instant.
//!
//! Each spent token comes back exactly one bucket period after it was spent,
//! so no window of that period ever sees more than `capacity` permits. That is
//! how the upstream counts, and a continuously refilling bucket would let up
//! to twice the capacity through one window.
//!
//! A pair of `governor` limiters can't stand in for this: each one spends its
//! own quota, so a caller could take a short-bucket token and then stall on
//! the long bucket while still holding it.

use std::collections::VecDeque;
use std::time::Duration;

use log::debug;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};

use crate::config::{BucketConfig, RateLimitConfig};

/// One quota: `capacity` tokens, each returned `period` after use
#[derive(Debug)]
struct Bucket {
    capacity: usize,
    period: Duration,
    spent: VecDeque<Instant>,
}

impl Bucket {
    fn new(config: BucketConfig) -> Self {
        let capacity = config.capacity.max(1) as usize;
        Self {
            capacity,
            period: config.period(),
            spent: VecDeque::with_capacity(capacity),
        }
    }

    fn refill(&mut self, now: Instant) {
        while let Some(&at) = self.spent.front() {
            if now.duration_since(at) >= self.period {
                self.spent.pop_front();
            } else {
                break;
            }
        }
    }

    fn tokens(&self) -> usize {
        self.capacity - self.spent.len()
    }

    /// Time until the next token returns (zero if one is available)
    fn wait_time(&self, now: Instant) -> Duration {
        if self.tokens() > 0 {
            return Duration::ZERO;
        }
        self.spent
            .front()
            .map(|at| (*at + self.period).saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }

    fn take(&mut self, now: Instant) {
        self.spent.push_back(now);
    }
}

#[derive(Debug)]
struct Buckets {
    short: Bucket,
    long: Bucket,
}

/// Dual-bucket limiter shared by every resolution in the process
pub struct RateLimiter {
    buckets: Mutex<Buckets>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            buckets: Mutex::new(Buckets {
                short: Bucket::new(config.short),
                long: Bucket::new(config.long),
            }),
        }
    }

    /// Wait until both buckets have a token, then spend one from each.
    ///
    /// The lock is released while sleeping; woken callers queue on the fair
    /// mutex, which keeps service roughly in arrival order. Never fails; a
    /// starved caller just waits.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut buckets = self.buckets.lock().await;
                let now = Instant::now();
                buckets.short.refill(now);
                buckets.long.refill(now);

                if buckets.short.tokens() > 0 && buckets.long.tokens() > 0 {
                    buckets.short.take(now);
                    buckets.long.take(now);
                    return;
                }

                buckets
                    .short
                    .wait_time(now)
                    .max(buckets.long.wait_time(now))
            };
            debug!("Rate limit reached, waiting {:?} for a permit", wait);
            sleep(wait).await;
        }
    }

    /// Tokens currently available as `(short, long)`
    pub async fn available(&self) -> (usize, usize) {
        let mut buckets = self.buckets.lock().await;
        let now = Instant::now();
        buckets.short.refill(now);
        buckets.long.refill(now);
        (buckets.short.tokens(), buckets.long.tokens())
    }
}
