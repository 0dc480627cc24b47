//! Limiter events and the sinks that consume them.
//!
//! The limiter reports denials, live reconfigurations and eviction sweeps as
//! [`LimiterEvent`]s. Events flow through an [`EventSink`], which can log them,
//! keep them for inspection, or discard them.
//!
//! Sinks are called synchronously from `allow`, after the registry lock has been
//! released. They must not block, and any failure inside a sink is the sink's
//! own business: nothing is reported back to the limiter.
//!
//! ```rust
//! use tollgate::telemetry::{EventSink, LimiterEvent, MemorySink};
//! use std::time::Duration;
//!
//! let sink = MemorySink::new();
//! sink.emit(&LimiterEvent::Denied {
//!     principal: "198.51.100.7".into(),
//!     retry_after: Duration::from_millis(250),
//! });
//! assert_eq!(sink.len(), 1);
//! ```

use crate::config::Limit;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Events emitted by a [`RateLimiter`](crate::RateLimiter).
#[derive(Debug, Clone, PartialEq)]
pub enum LimiterEvent {
    /// A call to `allow` was denied.
    Denied {
        /// Principal that was denied.
        principal: String,
        /// Wait until the next token, as seen at the time of denial.
        retry_after: Duration,
    },
    /// An existing bucket picked up a different limit from the source.
    Reconfigured {
        /// Principal whose bucket changed.
        principal: String,
        /// Limit before the change.
        from: Limit,
        /// Limit after the change.
        to: Limit,
    },
    /// An eviction sweep finished.
    Swept {
        /// Entries removed as stale.
        removed: usize,
        /// Entries still tracked.
        remaining: usize,
    },
}

impl fmt::Display for LimiterEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimiterEvent::Denied { principal, retry_after } => {
                write!(f, "Denied(principal={}, retry_after={:?})", principal, retry_after)
            }
            LimiterEvent::Reconfigured { principal, from, to } => write!(
                f,
                "Reconfigured(principal={}, rate={}->{}, burst={}->{})",
                principal, from.rate, to.rate, from.burst, to.burst
            ),
            LimiterEvent::Swept { removed, remaining } => {
                write!(f, "Swept(removed={}, remaining={})", removed, remaining)
            }
        }
    }
}

/// Consumer of limiter events.
pub trait EventSink: Send + Sync + fmt::Debug {
    /// Observe one event. Must return promptly and must not panic.
    fn emit(&self, event: &LimiterEvent);
}

impl<S: EventSink + ?Sized> EventSink for Arc<S> {
    fn emit(&self, event: &LimiterEvent) {
        (**self).emit(event)
    }
}

/// A no-op sink that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &LimiterEvent) {}
}

/// A sink that logs events using the `tracing` crate.
///
/// Denials are logged at `warn`, sweeps at `info`, reconfigurations at `debug`.
/// With no subscriber installed this costs next to nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: &LimiterEvent) {
        match event {
            LimiterEvent::Denied { principal, retry_after } => {
                tracing::warn!(
                    target: "tollgate::limiter",
                    principal = %principal,
                    retry_after_ms = u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX),
                    "rate limit exceeded"
                );
            }
            LimiterEvent::Reconfigured { principal, from, to } => {
                tracing::debug!(
                    target: "tollgate::limiter",
                    principal = %principal,
                    old_rate = from.rate,
                    new_rate = to.rate,
                    old_burst = from.burst,
                    new_burst = to.burst,
                    "bucket limit updated"
                );
            }
            LimiterEvent::Swept { removed, remaining } => {
                tracing::info!(
                    target: "tollgate::limiter",
                    removed = *removed,
                    remaining = *remaining,
                    "evicted stale rate limit buckets"
                );
            }
        }
    }
}

/// A sink that keeps events in memory, dropping the oldest once full.
///
/// Meant for tests and debugging endpoints. Clones share the same buffer.
#[derive(Clone, Debug)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<LimiterEvent>>>,
    capacity: usize,
    evicted: Arc<AtomicU64>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            capacity: capacity.max(1),
            evicted: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Snapshot of the retained events, oldest first.
    pub fn events(&self) -> Vec<LimiterEvent> {
        self.lock().clone()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of events dropped because the buffer was full.
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<LimiterEvent>> {
        // A panic elsewhere while holding the lock leaves a valid Vec behind.
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &LimiterEvent) {
        let mut events = self.lock();
        if events.len() >= self.capacity {
            events.remove(0);
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
        events.push(event.clone());
    }
}
