//! Token-bucket arithmetic for a single principal.
//!
//! A bucket holds up to `capacity` tokens and regains `rate` tokens per second.
//! Each admitted action spends one token. Time is passed in explicitly, so the
//! bucket itself never reads a clock and is trivially deterministic under test.
//!
//! # Preconditions
//!
//! `rate` must be finite and > 0 and `capacity` must be >= 1. The bucket does not
//! re-check this; [`Limit::new`](crate::Limit::new) rejects bad values before
//! they can reach a bucket.

use std::time::Duration;

/// Refill/consume state for one principal.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenBucket {
    tokens: f64,
    capacity: u32,
    rate: f64,
    last_refill: Duration,
}

impl TokenBucket {
    /// A full bucket (`tokens == capacity`) as of `now`.
    pub fn new(rate: f64, capacity: u32, now: Duration) -> Self {
        Self { tokens: f64::from(capacity), capacity, rate, last_refill: now }
    }

    /// Refill for the time elapsed since the last refill, then try to spend one token.
    pub fn try_acquire(&mut self, now: Duration) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Change the refill rate.
    ///
    /// Time elapsed before `now` is credited at the old rate, so a change never
    /// rewrites history. Accumulated tokens are kept as they are.
    pub fn set_rate(&mut self, rate: f64, now: Duration) {
        self.refill(now);
        self.rate = rate;
    }

    /// Change the capacity.
    ///
    /// Tokens are clamped down when the new capacity is smaller and otherwise
    /// preserved exactly; they are never rescaled.
    pub fn set_burst(&mut self, capacity: u32, now: Duration) {
        self.refill(now);
        self.capacity = capacity;
        self.tokens = self.tokens.min(f64::from(capacity));
    }

    /// Time until at least one token is available as of `now`. Does not mutate.
    ///
    /// Rounded up to the next nanosecond, so waiting exactly this long is
    /// always enough. Saturates at `Duration::MAX` for vanishingly small rates.
    pub fn delay(&self, now: Duration) -> Duration {
        let available = self.tokens_at(now);
        if available >= 1.0 {
            return Duration::ZERO;
        }
        ceil_duration(((1.0 - available) / self.rate).max(0.0))
    }

    /// Tokens that would be available at `now`, without committing the refill.
    pub fn tokens_at(&self, now: Duration) -> f64 {
        let elapsed = now.saturating_sub(self.last_refill).as_secs_f64();
        (self.tokens + elapsed * self.rate).min(f64::from(self.capacity))
    }

    /// Tokens as of the last refill.
    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    fn refill(&mut self, now: Duration) {
        // A clock that steps backwards counts as no elapsed time.
        if now <= self.last_refill {
            return;
        }
        self.tokens = self.tokens_at(now);
        self.last_refill = now;
    }
}

fn ceil_duration(secs: f64) -> Duration {
    let whole = secs.trunc();
    if !whole.is_finite() || whole >= u64::MAX as f64 {
        return Duration::MAX;
    }
    let nanos = ((secs - whole) * 1e9).ceil() as u64;
    Duration::from_secs(whole as u64).saturating_add(Duration::from_nanos(nanos))
}
