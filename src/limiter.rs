//! Per-principal admission control.
//!
//! [`RateLimiter`] composes the token bucket, the optional limit source, the
//! bucket registry and the eviction sweep behind two calls:
//!
//! - [`allow`](RateLimiter::allow) consumes a token for a principal and answers
//!   yes or no, immediately.
//! - [`retry_after`](RateLimiter::retry_after) estimates how long a denied
//!   principal should wait, without consuming anything.
//!
//! # Locking
//!
//! One mutex guards the whole registry. Every `allow` and `retry_after`, for any
//! principal, runs under it, so calls are linearized. Per-call work is O(1),
//! except for the call that happens to trigger a sweep, which pays O(n) in the
//! number of tracked principals. Event sinks run after the lock is released.
//!
//! # Example
//!
//! ```
//! use tollgate::{Limit, RateLimiter};
//!
//! let limiter = RateLimiter::new(Limit::new(1.0, 2).unwrap()).unwrap();
//! assert!(limiter.allow("u1"));
//! assert!(limiter.allow("u1"));
//! assert!(!limiter.allow("u1"));
//! assert!(limiter.allow("u2"));
//! ```

use crate::clock::{Clock, MonotonicClock};
use crate::config::{Limit, LimiterConfig};
use crate::error::ConfigError;
use crate::registry::{BucketRegistry, EntrySnapshot, SweepStats};
use crate::source::RateLimitSource;
use crate::telemetry::{EventSink, LimiterEvent, LogSink};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Token-bucket rate limiter keyed by principal.
///
/// Clones share the same registry via `Arc`; independently constructed limiters
/// never share state.
#[derive(Clone)]
pub struct RateLimiter {
    registry: Arc<Mutex<BucketRegistry>>,
    config: LimiterConfig,
    source: Option<Arc<dyn RateLimitSource>>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .field("has_source", &self.source.is_some())
            .field("clock", &self.clock)
            .field("sink", &self.sink)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    /// Limiter applying `limit` to every principal, with default sweep settings.
    ///
    /// Errors if the limit has a rate that is not finite and > 0, or a zero burst.
    pub fn new(limit: Limit) -> Result<Self, ConfigError> {
        Ok(Self::with_config(LimiterConfig::new(limit)?))
    }

    /// Limiter from an explicit, validated config.
    ///
    /// # Examples
    /// ```
    /// use tollgate::{LimiterConfig, RateLimiter};
    /// use std::time::Duration;
    ///
    /// let config = LimiterConfig::builder()
    ///     .rate(10.0)
    ///     .burst(20)
    ///     .cleanup_interval(Duration::from_secs(60))
    ///     .stale_ttl(Duration::from_secs(600))
    ///     .build()
    ///     .unwrap();
    /// let limiter = RateLimiter::with_config(config);
    /// assert!(limiter.allow("tenant-7"));
    /// ```
    pub fn with_config(config: LimiterConfig) -> Self {
        Self {
            registry: Arc::new(Mutex::new(BucketRegistry::new())),
            config,
            source: None,
            clock: Arc::new(MonotonicClock::default()),
            sink: Arc::new(LogSink),
        }
    }

    /// Consult `source` for per-principal limits. Principals it answers `None`
    /// for fall back to the static limit.
    pub fn with_source<S: RateLimitSource + 'static>(mut self, source: S) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Like [`with_source`](Self::with_source), for a source that is already
    /// shared as a trait object (e.g. also handed to an admin endpoint).
    pub fn with_shared_source(mut self, source: Arc<dyn RateLimitSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Override the clock (useful for deterministic tests). Set it before the
    /// first call; readings from different clocks are not comparable.
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Replace the default [`LogSink`].
    pub fn with_sink<S: EventSink + 'static>(mut self, sink: S) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    /// Try to admit one action for `principal`.
    ///
    /// Resolves the effective limit, creates a full bucket on first sight,
    /// applies a changed limit in place, refills and consumes. May run the
    /// eviction sweep before returning. Never errors, never blocks on anything
    /// but the registry lock.
    pub fn allow(&self, principal: &str) -> bool {
        let mut events: [Option<LimiterEvent>; 3] = [None, None, None];
        let allowed = {
            let mut registry = self.lock();
            let now = self.clock.now();
            let limit = self.resolve(principal);

            let [reconfigured, denied, swept] = &mut events;
            let allowed = registry.with_entry(principal, limit, now, |entry, created| {
                if created {
                    tracing::debug!(
                        target: "tollgate::limiter",
                        principal = %principal,
                        rate = limit.rate,
                        burst = limit.burst,
                        "tracking new principal"
                    );
                }

                let current = entry.limit();
                if current != limit {
                    entry.reconfigure(limit, now);
                    *reconfigured = Some(LimiterEvent::Reconfigured {
                        principal: principal.to_owned(),
                        from: current,
                        to: limit,
                    });
                }

                let allowed = entry.admit(now);
                if !allowed {
                    *denied = Some(LimiterEvent::Denied {
                        principal: principal.to_owned(),
                        retry_after: entry.bucket().delay(now),
                    });
                }
                allowed
            });

            let sweep = registry.sweep_if_due(
                now,
                self.config.cleanup_interval(),
                self.config.stale_ttl(),
            );
            *swept = sweep.map(|s| LimiterEvent::Swept {
                removed: s.removed,
                remaining: s.remaining,
            });
            allowed
        };

        for event in events.iter().flatten() {
            self.sink.emit(event);
        }
        allowed
    }

    /// How long `principal` should wait before its next `allow` can succeed.
    ///
    /// Read-only: never creates an entry and never consumes a token. Unknown
    /// principals get `Duration::ZERO`, since there is no history to estimate
    /// from. Uses the bucket's currently configured rate.
    pub fn retry_after(&self, principal: &str) -> Duration {
        let registry = self.lock();
        let now = self.clock.now();
        registry.get(principal).map_or(Duration::ZERO, |entry| entry.bucket().delay(now))
    }

    /// [`retry_after`](Self::retry_after) rounded up to whole seconds with a floor
    /// of 1, ready for a `Retry-After` header.
    pub fn retry_after_secs(&self, principal: &str) -> u64 {
        ceil_secs(self.retry_after(principal))
    }

    /// Outcome of the most recent `allow` for `principal`, if it is tracked.
    pub fn last_decision(&self, principal: &str) -> Option<bool> {
        self.lock().get(principal).and_then(|entry| entry.last_decision())
    }

    /// Whether `principal` currently has a bucket.
    pub fn contains(&self, principal: &str) -> bool {
        self.lock().contains(principal)
    }

    /// Number of tracked principals.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Point-in-time view of every tracked principal, sorted by principal.
    pub fn snapshot(&self) -> Vec<EntrySnapshot> {
        let registry = self.lock();
        registry.snapshot(self.clock.now())
    }

    /// Run an eviction sweep now, regardless of the cleanup interval.
    pub fn sweep_now(&self) -> SweepStats {
        let stats = {
            let mut registry = self.lock();
            registry.sweep(self.clock.now(), self.config.stale_ttl())
        };
        self.sink.emit(&LimiterEvent::Swept { removed: stats.removed, remaining: stats.remaining });
        stats
    }

    fn resolve(&self, principal: &str) -> Limit {
        self.source
            .as_ref()
            .and_then(|source| source.limit(principal))
            .filter(|limit| limit.validate().is_ok())
            .unwrap_or_else(|| self.config.limit())
    }

    fn lock(&self) -> MutexGuard<'_, BucketRegistry> {
        // Registry state is plain arithmetic and stays consistent even if a
        // holder panicked, so a poisoned lock is safe to reuse.
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Round up to whole seconds, never below 1. Saturates at `u64::MAX`.
pub(crate) fn ceil_secs(wait: Duration) -> u64 {
    let secs = wait.as_secs().saturating_add(u64::from(wait.subsec_nanos() > 0));
    secs.max(1)
}
