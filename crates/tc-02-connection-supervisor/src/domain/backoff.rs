//! Exponential restart backoff with jitter.
//!
//! ```text
//! base(n)  = min(max, min_backoff * 2^n)
//! delay(n) = min(max, base(n) * (1 + r * random_factor))     r ∈ [0, 1)
//! ```
//!
//! With `random_factor <= 1` the jittered delay never exceeds the next base,
//! so successive delays are non-decreasing whatever `r` is drawn.

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub min_backoff: Duration,
    pub max_backoff: Duration,
    pub random_factor: f64,
}

impl BackoffPolicy {
    pub fn new(min_backoff: Duration, max_backoff: Duration, random_factor: f64) -> Self {
        Self {
            min_backoff,
            max_backoff,
            random_factor: random_factor.clamp(0.0, 1.0),
        }
    }

    fn base(&self, restart: u32) -> Duration {
        // 2^31 already saturates any realistic configuration.
        let factor = 2u32.saturating_pow(restart.min(31));
        self.min_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// Delay before restart number `restart` (0-based), for a given random
    /// draw `r` in `[0, 1)`.
    pub fn delay_with(&self, restart: u32, r: f64) -> Duration {
        let base = self.base(restart);
        let jitter = 1.0 + r.clamp(0.0, 1.0) * self.random_factor;
        base.mul_f64(jitter).min(self.max_backoff)
    }

    pub fn delay(&self, restart: u32) -> Duration {
        let r: f64 = rand::thread_rng().gen();
        self.delay_with(restart, r)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(5), 1.0)
    }
}
