//! Principal → bucket map owned by a [`RateLimiter`](crate::RateLimiter).
//!
//! The registry itself is not synchronized. The limiter keeps it behind a single
//! mutex and every method here is called with that mutex held.

use crate::bucket::TokenBucket;
use crate::config::Limit;
use std::collections::HashMap;
use std::time::Duration;

/// One tracked principal.
#[derive(Debug, Clone)]
pub struct BucketEntry {
    bucket: TokenBucket,
    last_used: Duration,
    last_decision: Option<bool>,
}

impl BucketEntry {
    fn new(limit: Limit, now: Duration) -> Self {
        Self {
            bucket: TokenBucket::new(limit.rate, limit.burst, now),
            last_used: now,
            last_decision: None,
        }
    }

    /// Limit the bucket is currently configured with.
    pub fn limit(&self) -> Limit {
        Limit { rate: self.bucket.rate(), burst: self.bucket.capacity() }
    }

    /// Apply a new limit in place, keeping accumulated tokens (clamped to the new burst).
    pub fn reconfigure(&mut self, limit: Limit, now: Duration) {
        if self.bucket.rate() != limit.rate {
            self.bucket.set_rate(limit.rate, now);
        }
        if self.bucket.capacity() != limit.burst {
            self.bucket.set_burst(limit.burst, now);
        }
    }

    /// Record use at `now`, refill, and try to spend a token.
    pub fn admit(&mut self, now: Duration) -> bool {
        self.last_used = self.last_used.max(now);
        let allowed = self.bucket.try_acquire(now);
        self.last_decision = Some(allowed);
        allowed
    }

    pub fn bucket(&self) -> &TokenBucket {
        &self.bucket
    }

    pub fn last_used(&self) -> Duration {
        self.last_used
    }

    /// Outcome of the most recent `admit`; kept for diagnostics only.
    pub fn last_decision(&self) -> Option<bool> {
        self.last_decision
    }
}

/// Result of one eviction sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    /// Entries removed as stale.
    pub removed: usize,
    /// Entries still tracked afterwards.
    pub remaining: usize,
}

/// Point-in-time view of one entry.
#[derive(Debug, Clone, PartialEq)]
pub struct EntrySnapshot {
    pub principal: String,
    /// Tokens available at the time of the snapshot.
    pub tokens: f64,
    pub limit: Limit,
    pub last_decision: Option<bool>,
    /// Time since the entry was last used.
    pub idle: Duration,
}

/// Map from principal to [`BucketEntry`] plus sweep bookkeeping.
#[derive(Debug, Default)]
pub struct BucketRegistry {
    entries: HashMap<String, BucketEntry>,
    last_cleanup: Option<Duration>,
}

impl BucketRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` on the entry for `principal`, first creating a full bucket seeded
    /// from `limit` if there is none. The flag passed to `f` is `true` when the
    /// entry was created by this call.
    ///
    /// The principal is only copied into an owned key on creation.
    pub fn with_entry<R>(
        &mut self,
        principal: &str,
        limit: Limit,
        now: Duration,
        f: impl FnOnce(&mut BucketEntry, bool) -> R,
    ) -> R {
        if let Some(entry) = self.entries.get_mut(principal) {
            return f(entry, false);
        }
        let entry = self
            .entries
            .entry(principal.to_owned())
            .or_insert_with(|| BucketEntry::new(limit, now));
        f(entry, true)
    }

    pub fn get(&self, principal: &str) -> Option<&BucketEntry> {
        self.entries.get(principal)
    }

    pub fn contains(&self, principal: &str) -> bool {
        self.entries.contains_key(principal)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sweep if more than `interval` has passed since the last one.
    ///
    /// The first call only starts the interval; there is nothing old enough to
    /// evict before any sweep bookkeeping exists.
    pub fn sweep_if_due(
        &mut self,
        now: Duration,
        interval: Duration,
        ttl: Duration,
    ) -> Option<SweepStats> {
        match self.last_cleanup {
            None => {
                self.last_cleanup = Some(now);
                None
            }
            Some(last) if now.saturating_sub(last) > interval => Some(self.sweep(now, ttl)),
            Some(_) => None,
        }
    }

    /// Remove every entry idle for longer than `ttl`.
    pub fn sweep(&mut self, now: Duration, ttl: Duration) -> SweepStats {
        let before = self.entries.len();
        self.entries.retain(|_, entry| now.saturating_sub(entry.last_used) <= ttl);
        self.last_cleanup = Some(now);
        SweepStats { removed: before - self.entries.len(), remaining: self.entries.len() }
    }

    /// Snapshot of all entries, sorted by principal.
    pub fn snapshot(&self, now: Duration) -> Vec<EntrySnapshot> {
        let mut out: Vec<EntrySnapshot> = self
            .entries
            .iter()
            .map(|(principal, entry)| EntrySnapshot {
                principal: principal.clone(),
                tokens: entry.bucket.tokens_at(now),
                limit: entry.limit(),
                last_decision: entry.last_decision,
                idle: now.saturating_sub(entry.last_used),
            })
            .collect();
        out.sort_by(|a, b| a.principal.cmp(&b.principal));
        out
    }
}
