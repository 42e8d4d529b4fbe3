//! Token bucket shared by every caller that talks to a rate-limited service.

use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::NonPositiveSetting;

/// Refills at `rate_per_sec` tokens per second up to `burst` tokens. One
/// instance is shared (behind an `Arc`) by all concurrent callers, so they
/// contend for a single budget.
#[derive(Debug)]
pub struct TokenBucket {
    rate_per_sec: f64,
    burst: f64,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// `burst` is raised to at least one token.
    pub fn new(rate_per_sec: f64, burst: u32) -> Result<Self, NonPositiveSetting> {
        let rate_per_sec = NonPositiveSetting::check("requests_per_sec", rate_per_sec)?;
        let burst = f64::from(burst.max(1));
        Ok(Self {
            rate_per_sec,
            burst,
            state: Mutex::new(BucketState {
                tokens: burst,
                last_refill: Instant::now(),
            }),
        })
    }

    /// Takes a token if one is available, otherwise returns how long until
    /// the next one.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let mut state = self.state.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate_per_sec).min(self.burst);
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            Ok(())
        } else {
            let missing = 1.0 - state.tokens;
            Err(Duration::try_from_secs_f64(missing / self.rate_per_sec).unwrap_or(Duration::MAX))
        }
    }

    /// Blocks until a token is available.
    pub fn acquire(&self) {
        while let Err(wait) = self.try_acquire() {
            thread::sleep(wait);
        }
    }
}
